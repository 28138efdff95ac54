use url::Url;

use super::{Message, ProtocolMessage, ProtocolVersion, MODE_ERROR};
use crate::types::OpenIdReturnType;

/// # DirectError
/// Error answer to a direct request, sent as key-value form with HTTP status 400.
#[derive(Debug, Clone)]
pub struct DirectError {
    message: Message,
}

impl DirectError {
    /// Builds the error
    pub fn create(version: ProtocolVersion, error: &str) -> Self {
        let mut message = Message::new(version);
        message.set("error", error);
        Self { message }
    }

    /// Adds contact information of the provider
    pub fn with_contact(mut self, contact: &str) -> Self {
        self.message.set("contact", contact);
        self
    }

    /// Adds a reference, eg a support ticket number
    pub fn with_reference(mut self, reference: &str) -> Self {
        self.message.set("reference", reference);
        self
    }

    /// Reads a received error
    pub fn from_message(message: Message) -> OpenIdReturnType<Self> {
        let error = Self { message };
        error.validate()?;
        Ok(error)
    }

    /// Human readable error
    pub fn error(&self) -> &str {
        self.message.get("error").unwrap_or_default()
    }

    /// `error_code`
    pub fn error_code(&self) -> Option<&str> {
        self.message.get("error_code")
    }
}

impl ProtocolMessage for DirectError {
    fn message(&self) -> &Message {
        &self.message
    }

    fn validate(&self) -> OpenIdReturnType<()> {
        self.message.validate_parameters()?;
        self.message.require_all(&["error"])
    }
}

/// # IndirectError
/// `error` mode message returned to the relying party through the user agent.
#[derive(Debug, Clone)]
pub struct IndirectError {
    message: Message,
}

impl IndirectError {
    /// Builds the error
    pub fn create(version: ProtocolVersion, error: &str) -> Self {
        let mut message = Message::new(version);
        message.set("mode", MODE_ERROR);
        message.set("error", error);
        Self { message }
    }

    /// Reads a received error
    pub fn from_message(message: Message) -> OpenIdReturnType<Self> {
        let error = Self { message };
        error.validate()?;
        Ok(error)
    }

    /// Human readable error
    pub fn error(&self) -> &str {
        self.message.get("error").unwrap_or_default()
    }

    /// Url that sends the user agent to `return_to` with this error
    pub fn destination_url(&self, return_to: &Url) -> Url {
        self.message.destination_url(return_to)
    }
}

impl ProtocolMessage for IndirectError {
    fn message(&self) -> &Message {
        &self.message
    }

    fn validate(&self) -> OpenIdReturnType<()> {
        self.message.validate_parameters()?;
        self.message.expect_mode(&[MODE_ERROR])?;
        self.message.require_all(&["error"])
    }
}
