use std::fmt::{Debug, Display};

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use tracing::warn;

use crate::helpers::{constant_time_eq, now};
use crate::types::{codes, ErrorKind, OpenIdError, OpenIdReturnType};

/// Handle reserved for [Association::Failed]
pub const FAILED_ASSOCIATION_HANDLE: &str = " ";

/// MAC algorithm of an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationType {
    /// `HMAC-SHA1`
    HmacSha1,
    /// `HMAC-SHA256`
    HmacSha256,
}

impl AssociationType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationType::HmacSha1 => "HMAC-SHA1",
            AssociationType::HmacSha256 => "HMAC-SHA256",
        }
    }

    /// Parses the wire name
    pub fn parse(value: &str) -> OpenIdReturnType<AssociationType> {
        match value {
            "HMAC-SHA1" => Ok(AssociationType::HmacSha1),
            "HMAC-SHA256" => Ok(AssociationType::HmacSha256),
            other => Err(Box::new(OpenIdError::new_association_error(
                ErrorKind::Protocol,
                codes::UNSUPPORTED_TYPE,
                format!("unsupported association type: {other}"),
            ))),
        }
    }

    /// Size of the MAC key in bytes
    pub fn key_length(&self) -> usize {
        match self {
            AssociationType::HmacSha1 => 20,
            AssociationType::HmacSha256 => 32,
        }
    }
}

impl Display for AssociationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Association
/// A shared secret between a relying party and a provider.
///
/// Associations are immutable. Renewing one means creating a new value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Association {
    /// A usable association
    Established {
        /// MAC algorithm
        assoc_type: AssociationType,
        /// Opaque handle
        handle: String,
        /// Raw MAC key
        mac_key: Vec<u8>,
        /// Unix timestamp after which the association is unusable
        expiry: i64,
    },
    /// Negotiation the provider declined. Remembered until `expiry` so it is not retried.
    Failed {
        /// Unix timestamp after which negotiation may be attempted again
        expiry: i64,
    },
}

impl Association {
    /// Creates an association with a fresh random MAC key that expires `lifetime` seconds from now
    pub fn generate(assoc_type: AssociationType, handle: impl Into<String>, lifetime: i64) -> Self {
        let mut mac_key = vec![0u8; assoc_type.key_length()];
        rand::thread_rng().fill_bytes(&mut mac_key);

        Association::Established {
            assoc_type,
            handle: handle.into(),
            mac_key,
            expiry: now() + lifetime,
        }
    }

    /// Creates an association from a negotiated key. The key must match the algorithm's size.
    pub fn from_key(
        assoc_type: AssociationType,
        handle: impl Into<String>,
        mac_key: Vec<u8>,
        expiry: i64,
    ) -> OpenIdReturnType<Self> {
        if mac_key.len() != assoc_type.key_length() {
            return Err(Box::new(OpenIdError::new_association_error(
                ErrorKind::Protocol,
                codes::KEY_LENGTH_MISMATCH,
                format!(
                    "{assoc_type} requires a {} byte key, got {}",
                    assoc_type.key_length(),
                    mac_key.len()
                ),
            )));
        }

        Ok(Association::Established {
            assoc_type,
            handle: handle.into(),
            mac_key,
            expiry,
        })
    }

    /// Sentinel for a declined negotiation, valid for `lifetime` seconds
    pub fn failed(lifetime: i64) -> Self {
        Association::Failed {
            expiry: now() + lifetime,
        }
    }

    /// Opaque handle, [FAILED_ASSOCIATION_HANDLE] for failed associations
    pub fn handle(&self) -> &str {
        match self {
            Association::Established { handle, .. } => handle,
            Association::Failed { .. } => FAILED_ASSOCIATION_HANDLE,
        }
    }

    /// MAC algorithm, none for failed associations
    pub fn assoc_type(&self) -> Option<AssociationType> {
        match self {
            Association::Established { assoc_type, .. } => Some(*assoc_type),
            Association::Failed { .. } => None,
        }
    }

    /// Raw MAC key, none for failed associations
    pub fn mac_key(&self) -> Option<&[u8]> {
        match self {
            Association::Established { mac_key, .. } => Some(mac_key),
            Association::Failed { .. } => None,
        }
    }

    /// Unix timestamp of expiry
    pub fn expiry(&self) -> i64 {
        match self {
            Association::Established { expiry, .. } | Association::Failed { expiry } => *expiry,
        }
    }

    /// Checks if the association is the failed sentinel
    pub fn is_failed(&self) -> bool {
        matches!(self, Association::Failed { .. })
    }

    /// Seconds left before expiry at `at`, never negative
    pub fn expires_in(&self, at: i64) -> i64 {
        (self.expiry() - at).max(0)
    }

    /// Whether the association has expired at the current wall-clock time
    pub fn has_expired(&self) -> bool {
        self.has_expired_at(now())
    }

    /// Whether the association has expired at `at`
    pub fn has_expired_at(&self, at: i64) -> bool {
        at >= self.expiry()
    }

    /// Computes the raw HMAC of `data`
    pub fn sign(&self, data: &[u8]) -> OpenIdReturnType<Vec<u8>> {
        let (assoc_type, mac_key) = match self {
            Association::Established {
                assoc_type,
                mac_key,
                ..
            } => (assoc_type, mac_key),
            Association::Failed { .. } => {
                return Err(Box::new(OpenIdError::new_association_error(
                    ErrorKind::Configuration,
                    codes::SIGNING_FAILED,
                    "a failed association can not sign",
                )))
            }
        };

        let signing_failed = |e: hmac::digest::InvalidLength| {
            Box::new(OpenIdError::new_association_error(
                ErrorKind::Crypto,
                codes::SIGNING_FAILED,
                format!("could not initialise {assoc_type}: {e}"),
            ))
        };

        match assoc_type {
            AssociationType::HmacSha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(mac_key).map_err(signing_failed)?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            AssociationType::HmacSha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(mac_key).map_err(signing_failed)?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        }
    }

    /// HMAC of the UTF-8 bytes of `text`, base64 encoded
    pub fn sign_text(&self, text: &str) -> OpenIdReturnType<String> {
        Ok(STANDARD.encode(self.sign(text.as_bytes())?))
    }

    /// Checks `signature` (base64) against the signature of `text`.
    ///
    /// The comparison takes the same time wherever the first differing byte is. Empty values and
    /// values of different length are rejected without comparing.
    pub fn verify_signature(&self, text: &str, signature: &str) -> bool {
        if signature.is_empty() {
            return false;
        }

        match self.sign_text(text) {
            Ok(expected) => constant_time_eq(expected.as_bytes(), signature.as_bytes()),
            Err(e) => {
                warn!(handle = self.handle(), error = %e, "signature verification failed");
                false
            }
        }
    }
}

impl Debug for Association {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Association::Established {
                assoc_type,
                handle,
                expiry,
                ..
            } => f
                .debug_struct("Association")
                .field("assoc_type", assoc_type)
                .field("handle", handle)
                .field("mac_key", &"[redacted]")
                .field("expiry", expiry)
                .finish(),
            Association::Failed { expiry } => f
                .debug_struct("FailedAssociation")
                .field("expiry", expiry)
                .finish(),
        }
    }
}
