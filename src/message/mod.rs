//! # Message Model
//! Protocol messages, their wire forms, extensions and signatures.

mod associate;
mod authentication;
mod error;
pub mod extensions;
#[allow(clippy::module_inception)]
mod message;
mod parameter_list;
mod verification;

pub use associate::{
    AssociationError, AssociationRequest, AssociationResponse, UNSUPPORTED_TYPE_ERROR_CODE,
};
pub use authentication::{
    AuthFailure, AuthFailureKind, AuthRequest, AuthRequestParams, AuthSuccess, AuthSuccessParams,
    MAX_NONCE_LENGTH,
};
pub use error::{DirectError, IndirectError};
pub use message::{Message, ProtocolVersion, OPENID10_NS, OPENID11_NS, OPENID2_NS, SREG_ALIAS};
pub use parameter_list::{ParameterList, OPENID_PREFIX};
pub use verification::{VerifyRequest, VerifyResponse};

use extensions::ExtensionRegistry;

use crate::types::{codes, OpenIdError, OpenIdReturnType};

/// `associate`
pub const MODE_ASSOCIATE: &str = "associate";
/// `checkid_setup`
pub const MODE_CHECKID_SETUP: &str = "checkid_setup";
/// `checkid_immediate`
pub const MODE_CHECKID_IMMEDIATE: &str = "checkid_immediate";
/// `id_res`
pub const MODE_ID_RES: &str = "id_res";
/// `cancel`
pub const MODE_CANCEL: &str = "cancel";
/// `setup_needed`
pub const MODE_SETUP_NEEDED: &str = "setup_needed";
/// `error`
pub const MODE_ERROR: &str = "error";
/// `check_authentication`
pub const MODE_CHECK_AUTHENTICATION: &str = "check_authentication";

/// # ProtocolMessage
/// Behaviour shared by every concrete message.
pub trait ProtocolMessage {
    /// The underlying parameters
    fn message(&self) -> &Message;

    /// Checks required fields and message specific rules
    fn validate(&self) -> OpenIdReturnType<()>;

    /// Key-value form, for direct responses
    fn key_value_form(&self) -> String {
        self.message().key_value_form()
    }

    /// `openid.` prefixed pairs, for indirect messages and direct requests
    fn wire_parameters(&self) -> Vec<(String, String)> {
        self.message().wire_parameters()
    }
}

/// A message received by a provider or at a relying party's return url, typed by its mode
#[derive(Debug, Clone)]
pub enum OpenIdMessage {
    /// `associate`
    AssociationRequest(AssociationRequest),
    /// `checkid_setup` or `checkid_immediate`
    AuthRequest(AuthRequest),
    /// Positive `id_res`
    AuthSuccess(AuthSuccess),
    /// `cancel`, `setup_needed` or 1.x `id_res` with `user_setup_url`
    AuthFailure(AuthFailure),
    /// `error`
    IndirectError(IndirectError),
    /// `check_authentication`
    VerifyRequest(VerifyRequest),
}

impl OpenIdMessage {
    /// Types and validates `message` by its mode
    pub fn from_message(message: Message, registry: &ExtensionRegistry) -> OpenIdReturnType<Self> {
        let mode = message.mode().map(str::to_string);

        Ok(match mode.as_deref() {
            Some(MODE_ASSOCIATE) => {
                OpenIdMessage::AssociationRequest(AssociationRequest::from_message(message)?)
            }
            Some(MODE_CHECKID_SETUP) | Some(MODE_CHECKID_IMMEDIATE) => {
                OpenIdMessage::AuthRequest(AuthRequest::from_message(message)?)
            }
            Some(MODE_CHECK_AUTHENTICATION) => {
                OpenIdMessage::VerifyRequest(VerifyRequest::from_message(message)?)
            }
            Some(MODE_ERROR) => OpenIdMessage::IndirectError(IndirectError::from_message(message)?),
            _ if AuthFailure::is_failure(&message) => {
                OpenIdMessage::AuthFailure(AuthFailure::from_message(message)?)
            }
            Some(MODE_ID_RES) => {
                OpenIdMessage::AuthSuccess(AuthSuccess::from_message(message, registry)?)
            }
            other => {
                return Err(Box::new(OpenIdError::new_message_error(
                    codes::INVALID_MODE,
                    format!("unknown mode {other:?}"),
                )))
            }
        })
    }

    /// Parses and types `openid.` prefixed request parameters
    pub fn from_request_parameters<K, V>(
        pairs: impl IntoIterator<Item = (K, V)>,
        registry: &ExtensionRegistry,
    ) -> OpenIdReturnType<Self>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let params = ParameterList::from_request_parameters(pairs)?;
        Self::from_message(Message::from_parameters(params)?, registry)
    }
}
