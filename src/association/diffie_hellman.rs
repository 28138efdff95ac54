use std::fmt::{Debug, Display};

use lazy_static::lazy_static;
use num_bigint::{BigUint, RandBigInt};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use super::AssociationType;
use crate::helpers::{base64_btwoc, base64_to_biguint, btwoc};
use crate::types::{codes, ErrorKind, OpenIdError, OpenIdReturnType};

/// 1024 bit safe prime from OpenID 2.0 Appendix B
pub const DEFAULT_MODULUS_HEX: &str = "DCF93A0B883972EC0E19989AC5A2CE310E1D37717E8D9571BB7623731866E61EF75A2E27898B057F9891C2E27A639C3F29B60814581CD3B2CA3986D2683705577D45C2E7E52DC81C7A171876E5CEA74B1448BFDFAF18828EFD2519F14E45E3826634AF1949E5B535CC829A483B8A76223E5D490A257F05BDFF16F2FB22C583AB";

/// Default generator
pub const DEFAULT_GENERATOR: u32 = 2;

lazy_static! {
    static ref DEFAULT_MODULUS: BigUint =
        BigUint::parse_bytes(DEFAULT_MODULUS_HEX.as_bytes(), 16).unwrap_or_default();
}

/// How the MAC key travels in an association response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationSessionType {
    /// MAC key in the clear. Only acceptable over TLS.
    NoEncryption,
    /// MAC key encrypted with a SHA-1 hashed Diffie-Hellman secret
    DhSha1,
    /// MAC key encrypted with a SHA-256 hashed Diffie-Hellman secret
    DhSha256,
}

impl AssociationSessionType {
    /// Wire name. OpenID 1.x sends an empty session type for no-encryption, see [Self::as_openid1_str].
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationSessionType::NoEncryption => "no-encryption",
            AssociationSessionType::DhSha1 => "DH-SHA1",
            AssociationSessionType::DhSha256 => "DH-SHA256",
        }
    }

    /// Wire name used in OpenID 1.x messages
    pub fn as_openid1_str(&self) -> &'static str {
        match self {
            AssociationSessionType::NoEncryption => "",
            other => other.as_str(),
        }
    }

    /// Parses the wire name. A missing or empty value is `no-encryption` (OpenID 1.x).
    pub fn parse(value: Option<&str>) -> OpenIdReturnType<AssociationSessionType> {
        match value.unwrap_or_default() {
            "" | "no-encryption" => Ok(AssociationSessionType::NoEncryption),
            "DH-SHA1" => Ok(AssociationSessionType::DhSha1),
            "DH-SHA256" => Ok(AssociationSessionType::DhSha256),
            other => Err(Box::new(OpenIdError::new_association_error(
                ErrorKind::Protocol,
                codes::UNSUPPORTED_TYPE,
                format!("unsupported session type: {other}"),
            ))),
        }
    }

    /// Whether this session can carry a key for `assoc_type`
    pub fn is_compatible_with(&self, assoc_type: AssociationType) -> bool {
        match self {
            AssociationSessionType::NoEncryption => true,
            AssociationSessionType::DhSha1 => assoc_type == AssociationType::HmacSha1,
            AssociationSessionType::DhSha256 => assoc_type == AssociationType::HmacSha256,
        }
    }

    /// The session that matches `assoc_type` in strength
    pub fn for_association(assoc_type: AssociationType) -> AssociationSessionType {
        match assoc_type {
            AssociationType::HmacSha1 => AssociationSessionType::DhSha1,
            AssociationType::HmacSha256 => AssociationSessionType::DhSha256,
        }
    }

    /// Whether the session uses Diffie-Hellman
    pub fn is_diffie_hellman(&self) -> bool {
        !matches!(self, AssociationSessionType::NoEncryption)
    }
}

impl Display for AssociationSessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # DiffieHellmanSession
/// Ephemeral key pair for one association negotiation.
///
/// A session derives exactly one shared secret and is dropped afterwards.
pub struct DiffieHellmanSession {
    session_type: AssociationSessionType,
    modulus: BigUint,
    generator: BigUint,
    private_key: BigUint,
    public_key: BigUint,
}

impl DiffieHellmanSession {
    /// Creates a session with a fresh key pair over `modulus` and `generator`
    pub fn create(
        session_type: AssociationSessionType,
        modulus: BigUint,
        generator: BigUint,
    ) -> OpenIdReturnType<Self> {
        if !session_type.is_diffie_hellman() {
            return Err(Box::new(OpenIdError::new_association_error(
                ErrorKind::Configuration,
                codes::UNSUPPORTED_TYPE,
                format!("{session_type} is not a Diffie-Hellman session type"),
            )));
        }

        let invalid_parameters = || {
            Box::new(OpenIdError::new_association_error(
                ErrorKind::Protocol,
                codes::INVALID_DH_PARAMETERS,
                "modulus must be greater than 3 and the generator in (1, p - 1)",
            ))
        };

        if modulus <= BigUint::from(3u32) {
            return Err(invalid_parameters());
        }

        let one = BigUint::from(1u32);
        let p_minus_one = &modulus - &one;

        if generator <= one || generator >= p_minus_one {
            return Err(invalid_parameters());
        }

        let private_key = rand::thread_rng().gen_biguint_range(&one, &p_minus_one);
        let public_key = generator.modpow(&private_key, &modulus);

        Ok(Self {
            session_type,
            modulus,
            generator,
            private_key,
            public_key,
        })
    }

    /// Creates a session over the OpenID default modulus and generator
    pub fn create_default(session_type: AssociationSessionType) -> OpenIdReturnType<Self> {
        Self::create(
            session_type,
            DEFAULT_MODULUS.clone(),
            BigUint::from(DEFAULT_GENERATOR),
        )
    }

    /// Creates a session from the base64 btwoc `dh_modulus` and `dh_gen` of an association
    /// request, falling back to the defaults for missing values
    pub fn from_request_parameters(
        session_type: AssociationSessionType,
        modulus: Option<&str>,
        generator: Option<&str>,
    ) -> OpenIdReturnType<Self> {
        let modulus = match modulus {
            Some(m) => base64_to_biguint(m, "dh_modulus")?,
            None => DEFAULT_MODULUS.clone(),
        };
        let generator = match generator {
            Some(g) => base64_to_biguint(g, "dh_gen")?,
            None => BigUint::from(DEFAULT_GENERATOR),
        };

        Self::create(session_type, modulus, generator)
    }

    /// The session type
    pub fn session_type(&self) -> AssociationSessionType {
        self.session_type
    }

    /// Our public key `g^x mod p`
    pub fn public_key(&self) -> &BigUint {
        &self.public_key
    }

    /// Our public key, base64 of its btwoc form
    pub fn public_key_base64(&self) -> String {
        base64_btwoc(&self.public_key)
    }

    /// The modulus, base64 of its btwoc form
    pub fn modulus_base64(&self) -> String {
        base64_btwoc(&self.modulus)
    }

    /// The generator, base64 of its btwoc form
    pub fn generator_base64(&self) -> String {
        base64_btwoc(&self.generator)
    }

    /// Whether the session uses the default modulus and generator
    pub fn uses_default_parameters(&self) -> bool {
        self.modulus == *DEFAULT_MODULUS && self.generator == BigUint::from(DEFAULT_GENERATOR)
    }

    /// Digest length of the session hash in bytes
    pub fn digest_length(&self) -> usize {
        match self.session_type {
            AssociationSessionType::DhSha256 => 32,
            _ => 20,
        }
    }

    /// `H(btwoc(peer^x mod p))`
    fn hashed_shared_secret(&self, peer_public_key: &BigUint) -> OpenIdReturnType<Vec<u8>> {
        let one = BigUint::from(1u32);

        if *peer_public_key <= one || *peer_public_key >= &self.modulus - &one {
            return Err(Box::new(OpenIdError::new_association_error(
                ErrorKind::Protocol,
                codes::INVALID_DH_PARAMETERS,
                "peer public key is out of range",
            )));
        }

        let shared = peer_public_key.modpow(&self.private_key, &self.modulus);
        let shared = btwoc(&shared);

        Ok(match self.session_type {
            AssociationSessionType::DhSha256 => Sha256::digest(&shared).to_vec(),
            _ => Sha1::digest(&shared).to_vec(),
        })
    }

    fn xor_with_secret(
        &self,
        key: &[u8],
        peer_public_key: &BigUint,
    ) -> OpenIdReturnType<Vec<u8>> {
        let secret = self.hashed_shared_secret(peer_public_key)?;

        if secret.len() != key.len() {
            return Err(Box::new(OpenIdError::new_association_error(
                ErrorKind::Protocol,
                codes::KEY_LENGTH_MISMATCH,
                format!(
                    "{} secret is {} bytes, mac key is {} bytes",
                    self.session_type,
                    secret.len(),
                    key.len()
                ),
            )));
        }

        Ok(secret.iter().zip(key).map(|(s, k)| s ^ k).collect())
    }

    /// `H(shared) XOR mac_key`. The key must be exactly as long as the session digest.
    pub fn encrypt_mac_key(
        &self,
        mac_key: &[u8],
        peer_public_key: &BigUint,
    ) -> OpenIdReturnType<Vec<u8>> {
        self.xor_with_secret(mac_key, peer_public_key)
    }

    /// Inverse of [Self::encrypt_mac_key]
    pub fn decrypt_mac_key(
        &self,
        encrypted_mac_key: &[u8],
        peer_public_key: &BigUint,
    ) -> OpenIdReturnType<Vec<u8>> {
        self.xor_with_secret(encrypted_mac_key, peer_public_key)
    }
}

impl Debug for DiffieHellmanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffieHellmanSession")
            .field("session_type", &self.session_type)
            .field("modulus", &self.modulus)
            .field("generator", &self.generator)
            .field("private_key", &"[redacted]")
            .field("public_key", &self.public_key)
            .finish()
    }
}
