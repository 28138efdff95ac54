use thiserror::Error;

use super::http_client::HttpResponse;

/// Broad category of a failure. Callers use it to decide whether retrying makes sense:
/// transport failures are plausibly transient, protocol violations are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The fetcher could not complete the request or the server answered unexpectedly
    Transport,
    /// A document or message could not be parsed
    Parse,
    /// The peer violated the protocol
    Protocol,
    /// A cryptographic operation failed
    Crypto,
    /// The library was configured or called with unusable input
    Configuration,
}

/// # ErrorDetail
/// Stable machine readable `code` plus a human readable `message`
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct ErrorDetail {
    /// Category of the error
    pub kind: ErrorKind,
    /// Stable snake_case error code
    pub code: &'static str,
    /// Description
    pub message: String,
}

impl ErrorDetail {
    pub(crate) fn new(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }
}

/// # OpenIdError
/// Error returned to the user of this library. The variant names the component that raised it.
#[derive(Debug, Error)]
pub enum OpenIdError {
    /// Raised by identifier parsing and the discovery engine.
    /// Keeps the response that caused the failure when there was one.
    #[error("discovery error: {0}")]
    Discovery(ErrorDetail, Option<HttpResponse>),
    /// Raised by association negotiation, Diffie-Hellman sessions and association stores
    #[error("association error: {0}")]
    Association(ErrorDetail),
    /// Raised while building, parsing or validating protocol messages
    #[error("message error: {0}")]
    Message(ErrorDetail),
    /// Raised by the relying party orchestration
    #[error("consumer error: {0}")]
    Consumer(ErrorDetail),
    /// Raised by the provider orchestration
    #[error("server error: {0}")]
    Server(ErrorDetail),
}

/// Result type used across the crate
pub type OpenIdReturnType<T> = Result<T, Box<OpenIdError>>;

impl OpenIdError {
    pub(crate) fn new_discovery_error(
        kind: ErrorKind,
        code: &'static str,
        message: impl Into<String>,
        response: Option<HttpResponse>,
    ) -> Self {
        Self::Discovery(ErrorDetail::new(kind, code, message), response)
    }

    pub(crate) fn new_association_error(
        kind: ErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Association(ErrorDetail::new(kind, code, message))
    }

    pub(crate) fn new_message_error(code: &'static str, message: impl Into<String>) -> Self {
        Self::Message(ErrorDetail::new(ErrorKind::Protocol, code, message))
    }

    pub(crate) fn new_message_parse_error(code: &'static str, message: impl Into<String>) -> Self {
        Self::Message(ErrorDetail::new(ErrorKind::Parse, code, message))
    }

    pub(crate) fn new_consumer_error(
        kind: ErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Consumer(ErrorDetail::new(kind, code, message))
    }

    pub(crate) fn new_server_error(
        kind: ErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Server(ErrorDetail::new(kind, code, message))
    }

    /// Returns the [ErrorDetail] regardless of the variant
    pub fn detail(&self) -> &ErrorDetail {
        match self {
            Self::Discovery(detail, _)
            | Self::Association(detail)
            | Self::Message(detail)
            | Self::Consumer(detail)
            | Self::Server(detail) => detail,
        }
    }

    /// Stable code of the error
    pub fn code(&self) -> &'static str {
        self.detail().code
    }

    /// Category of the error
    pub fn kind(&self) -> ErrorKind {
        self.detail().kind
    }

    /// The response that triggered a discovery error, if any
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Self::Discovery(_, response) => response.as_ref(),
            _ => None,
        }
    }

    /// Checks if the error is a discovery error
    pub fn is_discovery_error(&self) -> bool {
        matches!(self, Self::Discovery(..))
    }

    /// Checks if the error is an association error
    pub fn is_association_error(&self) -> bool {
        matches!(self, Self::Association(_))
    }

    /// Checks if the error is a message error
    pub fn is_message_error(&self) -> bool {
        matches!(self, Self::Message(_))
    }

    /// Checks if the error is a consumer error
    pub fn is_consumer_error(&self) -> bool {
        matches!(self, Self::Consumer(_))
    }

    /// Checks if the error is a server error
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

/// Error codes shared by more than one component
pub mod codes {
    /// Identifier could not be parsed
    pub const INVALID_IDENTIFIER: &str = "invalid_identifier";
    /// The fetcher failed to complete a request
    pub const TRANSPORT_ERROR: &str = "transport_error";
    /// Unexpected status code
    pub const UNEXPECTED_STATUS: &str = "unexpected_status";
    /// Response is structurally unusable, eg duplicate X-XRDS-Location headers
    pub const INVALID_RESPONSE: &str = "invalid_response";
    /// Response body exceeds the configured cap
    pub const BODY_TOO_LARGE: &str = "body_too_large";
    /// Malformed XRDS or HTML
    pub const PARSE_ERROR: &str = "parse_error";
    /// Discovery completed without finding endpoints
    pub const NO_ENDPOINTS: &str = "no_endpoints";
    /// XRI identifier without a configured resolver
    pub const XRI_UNSUPPORTED: &str = "xri_unsupported";

    /// Unsupported association or session type
    pub const UNSUPPORTED_TYPE: &str = "unsupported_type";
    /// XOR of the mac key against the DH secret had mismatching lengths
    pub const KEY_LENGTH_MISMATCH: &str = "key_length_mismatch";
    /// HMAC computation failed
    pub const SIGNING_FAILED: &str = "signing_failed";
    /// Invalid Diffie-Hellman parameters
    pub const INVALID_DH_PARAMETERS: &str = "invalid_dh_parameters";
    /// No unique handle could be generated
    pub const HANDLE_COLLISION: &str = "handle_collision";

    /// A required field is missing
    pub const MISSING_FIELD: &str = "missing_field";
    /// A parameter can not be re-encoded
    pub const INVALID_PARAMETER: &str = "invalid_parameter";
    /// Unexpected `openid.mode`
    pub const INVALID_MODE: &str = "invalid_mode";
    /// OpenID 1.x / 2.0 fields are mixed
    pub const VERSION_MISMATCH: &str = "version_mismatch";
    /// A URL field is not an absolute URL
    pub const INVALID_URL: &str = "invalid_url";
    /// A field that must be signed is not
    pub const UNSIGNED_FIELD: &str = "unsigned_field";
    /// Invalid `response_nonce`
    pub const INVALID_NONCE: &str = "invalid_nonce";
    /// identity/claimed_id co-presence violated
    pub const INVALID_IDENTITY: &str = "invalid_identity";
    /// Extension related failures
    pub const EXTENSION_ERROR: &str = "extension_error";
    /// Unparseable key-value or url encoded input
    pub const MALFORMED_MESSAGE: &str = "malformed_message";

    /// Signature does not verify
    pub const INVALID_SIGNATURE: &str = "invalid_signature";
    /// `return_to` does not match the url the response arrived at
    pub const RETURN_TO_MISMATCH: &str = "return_to_mismatch";
    /// Asserted identifier does not match discovered information
    pub const DISCOVERY_MISMATCH: &str = "discovery_mismatch";
    /// `return_to` is outside the realm
    pub const REALM_MISMATCH: &str = "realm_mismatch";
    /// The provider answered with an error
    pub const PROVIDER_ERROR: &str = "provider_error";
}
