use crate::message::AuthSuccess;
use crate::types::{OpenIdError, ServiceEndpoint};

/// An assertion that passed every check
#[derive(Debug, Clone)]
pub struct VerifiedAssertion {
    /// The identifier the user proved to own, as asserted. None for identifier-less assertions.
    pub verified_id: Option<String>,
    /// The endpoint the assertion was checked against
    pub endpoint: ServiceEndpoint,
    /// The assertion, for reading extensions
    pub assertion: AuthSuccess,
}

/// # VerificationResult
/// Outcome of checking a provider response. Every outcome is explicit, failures included.
#[derive(Debug)]
pub enum VerificationResult {
    /// Positive assertion that verified
    Success(Box<VerifiedAssertion>),
    /// The user cancelled
    Cancelled,
    /// An immediate request needs user interaction
    SetupNeeded {
        /// Where to send the user (OpenID 1.x)
        user_setup_url: Option<String>,
    },
    /// The response is invalid or failed verification
    Failed(Box<OpenIdError>),
}

impl VerificationResult {
    /// Checks for a verified positive assertion
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationResult::Success(_))
    }

    /// The verified identifier
    pub fn verified_id(&self) -> Option<&str> {
        match self {
            VerificationResult::Success(verified) => verified.verified_id.as_deref(),
            _ => None,
        }
    }

    /// Why verification failed
    pub fn failure(&self) -> Option<&OpenIdError> {
        match self {
            VerificationResult::Failed(e) => Some(e),
            _ => None,
        }
    }
}
