use base64::{engine::general_purpose::STANDARD, Engine};

use super::{Message, ProtocolMessage, ProtocolVersion, MODE_ASSOCIATE};
use crate::association::{
    Association, AssociationSessionType, AssociationType, DiffieHellmanSession,
};
use crate::helpers::{base64_decode, base64_to_biguint};
use crate::types::{codes, ErrorKind, OpenIdError, OpenIdReturnType};

/// `error_code` of an association error response
pub const UNSUPPORTED_TYPE_ERROR_CODE: &str = "unsupported-type";

fn check_combination(
    version: ProtocolVersion,
    assoc_type: AssociationType,
    session_type: AssociationSessionType,
) -> OpenIdReturnType<()> {
    if !session_type.is_compatible_with(assoc_type) {
        return Err(Box::new(OpenIdError::new_association_error(
            ErrorKind::Protocol,
            codes::UNSUPPORTED_TYPE,
            format!("{session_type} can not carry a {assoc_type} key"),
        )));
    }

    if !version.is_version2()
        && (assoc_type != AssociationType::HmacSha1
            || session_type == AssociationSessionType::DhSha256)
    {
        return Err(Box::new(OpenIdError::new_association_error(
            ErrorKind::Protocol,
            codes::UNSUPPORTED_TYPE,
            format!("OpenID 1.x does not support {assoc_type} over {session_type}"),
        )));
    }

    Ok(())
}

/// # AssociationRequest
/// `associate` request a relying party posts to a provider.
#[derive(Debug, Clone)]
pub struct AssociationRequest {
    message: Message,
    assoc_type: AssociationType,
    session_type: AssociationSessionType,
}

impl AssociationRequest {
    /// Builds a request for `assoc_type`. With `dh` the key is requested over that
    /// Diffie-Hellman session, without it in the clear.
    pub fn create(
        version: ProtocolVersion,
        assoc_type: AssociationType,
        dh: Option<&DiffieHellmanSession>,
    ) -> OpenIdReturnType<Self> {
        let session_type = dh
            .map(DiffieHellmanSession::session_type)
            .unwrap_or(AssociationSessionType::NoEncryption);

        check_combination(version, assoc_type, session_type)?;

        let mut message = Message::new(version);
        message.set("mode", MODE_ASSOCIATE);
        message.set("assoc_type", assoc_type.as_str());

        if version.is_version2() {
            message.set("session_type", session_type.as_str());
        } else if session_type.is_diffie_hellman() {
            message.set("session_type", session_type.as_openid1_str());
        }

        if let Some(dh) = dh {
            if !dh.uses_default_parameters() {
                message.set("dh_modulus", dh.modulus_base64());
                message.set("dh_gen", dh.generator_base64());
            }
            message.set("dh_consumer_public", dh.public_key_base64());
        }

        Ok(Self {
            message,
            assoc_type,
            session_type,
        })
    }

    /// Reads a received request
    pub fn from_message(message: Message) -> OpenIdReturnType<Self> {
        message.expect_mode(&[MODE_ASSOCIATE])?;

        let assoc_type = AssociationType::parse(message.required("assoc_type")?)?;

        let session_type = if message.is_version2() {
            AssociationSessionType::parse(Some(message.required("session_type")?))?
        } else {
            AssociationSessionType::parse(message.get("session_type"))?
        };

        let request = Self {
            message,
            assoc_type,
            session_type,
        };
        request.validate()?;
        Ok(request)
    }

    /// Requested MAC algorithm
    pub fn assoc_type(&self) -> AssociationType {
        self.assoc_type
    }

    /// Requested session type
    pub fn session_type(&self) -> AssociationSessionType {
        self.session_type
    }

    /// Protocol version
    pub fn version(&self) -> ProtocolVersion {
        self.message.version()
    }

    /// `dh_modulus`, base64 btwoc
    pub fn dh_modulus(&self) -> Option<&str> {
        self.message.get("dh_modulus")
    }

    /// `dh_gen`, base64 btwoc
    pub fn dh_gen(&self) -> Option<&str> {
        self.message.get("dh_gen")
    }

    /// `dh_consumer_public`, base64 btwoc
    pub fn dh_consumer_public(&self) -> Option<&str> {
        self.message.get("dh_consumer_public")
    }
}

impl ProtocolMessage for AssociationRequest {
    fn message(&self) -> &Message {
        &self.message
    }

    fn validate(&self) -> OpenIdReturnType<()> {
        self.message.validate_parameters()?;
        self.message.expect_mode(&[MODE_ASSOCIATE])?;
        self.message.require_all(&["assoc_type"])?;

        if self.message.is_version2() {
            self.message.require_all(&["session_type"])?;
        }

        check_combination(self.version(), self.assoc_type, self.session_type)?;

        if self.session_type.is_diffie_hellman() {
            self.message.require_all(&["dh_consumer_public"])?;
        }

        Ok(())
    }
}

/// # AssociationResponse
/// Successful `associate` response carrying the MAC key.
#[derive(Debug, Clone)]
pub struct AssociationResponse {
    message: Message,
    assoc_type: AssociationType,
    session_type: AssociationSessionType,
}

impl AssociationResponse {
    /// Answers `request` with `association`, encrypting the key when a Diffie-Hellman session
    /// was requested. `now` is the current unix time.
    pub fn create(
        request: &AssociationRequest,
        association: &Association,
        now: i64,
    ) -> OpenIdReturnType<Self> {
        let mac_key = association.mac_key().ok_or_else(|| {
            Box::new(OpenIdError::new_association_error(
                ErrorKind::Configuration,
                codes::SIGNING_FAILED,
                "a failed association can not be handed out",
            ))
        })?;

        let mut message = Message::new(request.version());
        message.set("assoc_handle", association.handle());
        message.set("assoc_type", request.assoc_type.as_str());

        if request.version().is_version2() {
            message.set("session_type", request.session_type.as_str());
        } else if request.session_type.is_diffie_hellman() {
            message.set("session_type", request.session_type.as_openid1_str());
        }

        message.set("expires_in", association.expires_in(now).to_string());

        if request.session_type.is_diffie_hellman() {
            let dh = DiffieHellmanSession::from_request_parameters(
                request.session_type,
                request.dh_modulus(),
                request.dh_gen(),
            )?;

            let consumer_public = base64_to_biguint(
                request.dh_consumer_public().unwrap_or_default(),
                "dh_consumer_public",
            )?;

            let encrypted = dh.encrypt_mac_key(mac_key, &consumer_public)?;

            message.set("dh_server_public", dh.public_key_base64());
            message.set("enc_mac_key", STANDARD.encode(encrypted));
        } else {
            message.set("mac_key", STANDARD.encode(mac_key));
        }

        Ok(Self {
            message,
            assoc_type: request.assoc_type,
            session_type: request.session_type,
        })
    }

    /// Reads the response to `request`. The provider must answer with the requested types.
    pub fn from_message(message: Message, request: &AssociationRequest) -> OpenIdReturnType<Self> {
        let assoc_type = AssociationType::parse(message.required("assoc_type")?)?;
        let session_type = AssociationSessionType::parse(message.get("session_type"))?;

        if assoc_type != request.assoc_type || session_type != request.session_type {
            return Err(Box::new(OpenIdError::new_association_error(
                ErrorKind::Protocol,
                codes::UNSUPPORTED_TYPE,
                format!(
                    "requested {} over {}, got {assoc_type} over {session_type}",
                    request.assoc_type, request.session_type
                ),
            )));
        }

        let response = Self {
            message,
            assoc_type,
            session_type,
        };
        response.validate()?;
        Ok(response)
    }

    /// Handle of the new association
    pub fn assoc_handle(&self) -> Option<&str> {
        self.message.get("assoc_handle")
    }

    /// MAC algorithm
    pub fn assoc_type(&self) -> AssociationType {
        self.assoc_type
    }

    /// Session type
    pub fn session_type(&self) -> AssociationSessionType {
        self.session_type
    }

    /// Extracts the association, decrypting the key with `dh` when the session used
    /// Diffie-Hellman. The expiry is `now + expires_in`.
    pub fn association(
        &self,
        dh: Option<&DiffieHellmanSession>,
        now: i64,
    ) -> OpenIdReturnType<Association> {
        let expires_in = self
            .message
            .required("expires_in")?
            .parse::<i64>()
            .ok()
            .filter(|e| *e >= 0)
            .ok_or_else(|| {
                Box::new(OpenIdError::new_message_error(
                    codes::INVALID_PARAMETER,
                    "expires_in is not a non negative integer",
                ))
            })?;

        let mac_key = if self.session_type.is_diffie_hellman() {
            let dh = dh.ok_or_else(|| {
                Box::new(OpenIdError::new_association_error(
                    ErrorKind::Configuration,
                    codes::INVALID_DH_PARAMETERS,
                    "the Diffie-Hellman session of the request is required",
                ))
            })?;

            let server_public =
                base64_to_biguint(self.message.required("dh_server_public")?, "dh_server_public")?;
            let encrypted = base64_decode(self.message.required("enc_mac_key")?, "enc_mac_key")?;

            dh.decrypt_mac_key(&encrypted, &server_public)?
        } else {
            base64_decode(self.message.required("mac_key")?, "mac_key")?
        };

        Association::from_key(
            self.assoc_type,
            self.message.required("assoc_handle")?,
            mac_key,
            now + expires_in,
        )
    }
}

impl ProtocolMessage for AssociationResponse {
    fn message(&self) -> &Message {
        &self.message
    }

    fn validate(&self) -> OpenIdReturnType<()> {
        self.message.validate_parameters()?;
        self.message
            .require_all(&["assoc_handle", "assoc_type", "expires_in"])?;

        if self.message.is_version2() {
            self.message.require_all(&["session_type"])?;
        }

        if self.session_type.is_diffie_hellman() {
            self.message
                .require_all(&["dh_server_public", "enc_mac_key"])?;
        } else {
            self.message.require_all(&["mac_key"])?;
        }

        if self.assoc_handle().is_some_and(|h| h.is_empty() || h.len() > 255) {
            return Err(Box::new(OpenIdError::new_message_error(
                codes::INVALID_PARAMETER,
                "assoc_handle must be 1 to 255 characters",
            )));
        }

        Ok(())
    }
}

/// # AssociationError
/// `unsupported-type` answer to an association request, optionally suggesting a combination
/// the provider accepts.
#[derive(Debug, Clone)]
pub struct AssociationError {
    message: Message,
}

impl AssociationError {
    /// Builds the error. Only OpenID 2.0 has this message.
    pub fn create(
        error: &str,
        suggestion: Option<(AssociationType, AssociationSessionType)>,
    ) -> Self {
        let mut message = Message::new(ProtocolVersion::OpenId2);
        message.set("error", error);
        message.set("error_code", UNSUPPORTED_TYPE_ERROR_CODE);

        if let Some((assoc_type, session_type)) = suggestion {
            message.set("assoc_type", assoc_type.as_str());
            message.set("session_type", session_type.as_str());
        }

        Self { message }
    }

    /// Reads a received error
    pub fn from_message(message: Message) -> OpenIdReturnType<Self> {
        let error = Self { message };
        error.validate()?;
        Ok(error)
    }

    /// Checks if a direct response is an association error
    pub fn is_association_error(message: &Message) -> bool {
        message.get("error_code") == Some(UNSUPPORTED_TYPE_ERROR_CODE)
    }

    /// Human readable error
    pub fn error(&self) -> &str {
        self.message.get("error").unwrap_or_default()
    }

    /// The combination the provider suggests. Unknown names yield none.
    pub fn suggestion(&self) -> Option<(AssociationType, AssociationSessionType)> {
        let assoc_type = AssociationType::parse(self.message.get("assoc_type")?).ok()?;
        let session_type = AssociationSessionType::parse(self.message.get("session_type")).ok()?;

        session_type
            .is_compatible_with(assoc_type)
            .then_some((assoc_type, session_type))
    }
}

impl ProtocolMessage for AssociationError {
    fn message(&self) -> &Message {
        &self.message
    }

    fn validate(&self) -> OpenIdReturnType<()> {
        self.message.validate_parameters()?;
        self.message.require_all(&["error", "error_code"])?;

        if !Self::is_association_error(&self.message) {
            return Err(Box::new(OpenIdError::new_message_error(
                codes::INVALID_PARAMETER,
                "error_code of an association error must be unsupported-type",
            )));
        }

        Ok(())
    }
}
