use super::{Identifier, OpenIdError, OpenIdReturnType, ServiceEndpoint};

/// # DiscoveryOutcome
/// Result of one discovery call. Built once by the discovery engine and not modified afterwards.
#[derive(Debug)]
pub struct DiscoveryOutcome {
    identifier: Identifier,
    endpoints: Vec<ServiceEndpoint>,
    normalized_identifier: Option<Identifier>,
    failure: Option<Box<OpenIdError>>,
}

impl DiscoveryOutcome {
    pub(crate) fn success(
        identifier: Identifier,
        endpoints: Vec<ServiceEndpoint>,
        normalized_identifier: Option<Identifier>,
    ) -> Self {
        Self {
            identifier,
            endpoints,
            normalized_identifier,
            failure: None,
        }
    }

    pub(crate) fn failure(identifier: Identifier, cause: Box<OpenIdError>) -> Self {
        Self {
            identifier,
            endpoints: vec![],
            normalized_identifier: None,
            failure: Some(cause),
        }
    }

    /// The identifier discovery was run on
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Discovered endpoints, most preferred first
    pub fn endpoints(&self) -> &[ServiceEndpoint] {
        &self.endpoints
    }

    /// The identifier after following redirects
    pub fn normalized_identifier(&self) -> Option<&Identifier> {
        self.normalized_identifier.as_ref()
    }

    /// Whether discovery found at least one endpoint
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && !self.endpoints.is_empty()
    }

    /// Why discovery failed
    pub fn failure_cause(&self) -> Option<&OpenIdError> {
        self.failure.as_deref()
    }

    /// Consumes the outcome, returning the endpoints or the failure cause
    pub fn into_endpoints(self) -> OpenIdReturnType<Vec<ServiceEndpoint>> {
        match self.failure {
            Some(cause) => Err(cause),
            None => Ok(self.endpoints),
        }
    }
}
