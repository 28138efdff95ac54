use super::{AuthSuccess, Message, ProtocolMessage, ProtocolVersion, MODE_CHECK_AUTHENTICATION};
use crate::association::Association;
use crate::types::OpenIdReturnType;

/// # VerifyRequest
/// `check_authentication` request: an assertion echoed back to the provider that signed it
/// with a private association.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    message: Message,
}

impl VerifyRequest {
    /// Copies every parameter of `assertion` and switches the mode
    pub fn from_auth_success(assertion: &AuthSuccess) -> Self {
        let mut message = assertion.message().clone();
        message.set("mode", MODE_CHECK_AUTHENTICATION);
        Self { message }
    }

    /// Reads a received request
    pub fn from_message(message: Message) -> OpenIdReturnType<Self> {
        let request = Self { message };
        request.validate()?;
        Ok(request)
    }

    /// `assoc_handle`
    pub fn assoc_handle(&self) -> Option<&str> {
        self.message.get("assoc_handle")
    }

    /// `invalidate_handle`
    pub fn invalidate_handle(&self) -> Option<&str> {
        self.message.get("invalidate_handle")
    }

    /// `response_nonce`
    pub fn response_nonce(&self) -> Option<&str> {
        self.message.get("response_nonce")
    }

    /// Checks the echoed signature against `association`
    pub fn verify_signature(&self, association: &Association) -> bool {
        let signed = self.message.signed_fields();

        match (
            self.message.signature_text(&signed),
            self.message.get("sig"),
        ) {
            (Ok(text), Some(signature)) => association.verify_signature(&text, signature),
            _ => false,
        }
    }
}

impl ProtocolMessage for VerifyRequest {
    fn message(&self) -> &Message {
        &self.message
    }

    fn validate(&self) -> OpenIdReturnType<()> {
        self.message.validate_parameters()?;
        self.message.expect_mode(&[MODE_CHECK_AUTHENTICATION])?;
        self.message.require_all(&["assoc_handle", "signed", "sig"])
    }
}

/// # VerifyResponse
/// Answer to a [VerifyRequest].
#[derive(Debug, Clone)]
pub struct VerifyResponse {
    message: Message,
}

impl VerifyResponse {
    /// Builds the answer. `invalidate_handle` tells the relying party to drop an association.
    pub fn create(version: ProtocolVersion, is_valid: bool, invalidate_handle: Option<&str>) -> Self {
        let mut message = Message::new(version);
        message.set("is_valid", if is_valid { "true" } else { "false" });
        message.set_optional("invalidate_handle", invalidate_handle);
        Self { message }
    }

    /// Reads a received answer
    pub fn from_message(message: Message) -> OpenIdReturnType<Self> {
        let response = Self { message };
        response.validate()?;
        Ok(response)
    }

    /// Whether the provider confirmed the signature
    pub fn is_valid(&self) -> bool {
        self.message.get("is_valid") == Some("true")
    }

    /// Handle the relying party must forget
    pub fn invalidate_handle(&self) -> Option<&str> {
        self.message.get("invalidate_handle")
    }
}

impl ProtocolMessage for VerifyResponse {
    fn message(&self) -> &Message {
        &self.message
    }

    fn validate(&self) -> OpenIdReturnType<()> {
        self.message.validate_parameters()?;
        self.message.require_all(&["is_valid"])
    }
}
