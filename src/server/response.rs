use url::Url;

use crate::message::{
    AssociationError, AssociationResponse, AuthFailure, AuthSuccess, DirectError, ProtocolMessage,
    VerifyResponse,
};
use crate::types::OpenIdReturnType;

/// # DirectResponse
/// Body of a provider answer to a direct request
#[derive(Debug, Clone)]
pub enum DirectResponse {
    /// Association created
    Association(AssociationResponse),
    /// Association type not supported
    AssociationError(AssociationError),
    /// Result of `check_authentication`
    Verify(VerifyResponse),
    /// The request was invalid
    Error(DirectError),
}

impl DirectResponse {
    /// Http status code to answer with
    pub fn status_code(&self) -> u16 {
        match self {
            DirectResponse::Association(_) | DirectResponse::Verify(_) => 200,
            DirectResponse::AssociationError(_) | DirectResponse::Error(_) => 400,
        }
    }

    /// Key-value form body
    pub fn key_value_form(&self) -> String {
        match self {
            DirectResponse::Association(m) => m.key_value_form(),
            DirectResponse::AssociationError(m) => m.key_value_form(),
            DirectResponse::Verify(m) => m.key_value_form(),
            DirectResponse::Error(m) => m.key_value_form(),
        }
    }
}

/// # AuthResponse
/// Provider answer to an authentication request, delivered through the user agent
#[derive(Debug, Clone)]
pub enum AuthResponse {
    /// Signed positive assertion
    Success(AuthSuccess),
    /// Negative assertion
    Failure {
        /// The answer
        failure: AuthFailure,
        /// `return_to` of the request
        return_to: Url,
    },
}

impl AuthResponse {
    /// Where to redirect the user agent
    pub fn destination_url(&self) -> OpenIdReturnType<Url> {
        match self {
            AuthResponse::Success(success) => success.destination_url(),
            AuthResponse::Failure { failure, return_to } => Ok(failure.destination_url(return_to)),
        }
    }
}
