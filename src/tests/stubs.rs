use std::sync::Mutex;

use url::Url;

use crate::types::{
    codes, ErrorKind, Identifier, OpenIdError, OpenIdReturnType, ServiceEndpoint, ServiceType,
    XrdsParser, XriResolver,
};

/// Returns canned endpoints for one expected document
pub struct StubXrdsParser {
    pub expected_document: Option<String>,
    pub endpoints: Vec<ServiceEndpoint>,
    pub calls: Mutex<usize>,
}

impl StubXrdsParser {
    pub fn new(endpoints: Vec<ServiceEndpoint>) -> Self {
        Self {
            expected_document: None,
            endpoints,
            calls: Mutex::new(0),
        }
    }

    pub fn expect_document(mut self, document: impl Into<String>) -> Self {
        self.expected_document = Some(document.into());
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl XrdsParser for StubXrdsParser {
    fn parse_xrds(
        &self,
        xml: &str,
        target_types: &[ServiceType],
    ) -> OpenIdReturnType<Vec<ServiceEndpoint>> {
        *self.calls.lock().unwrap() += 1;

        if let Some(expected) = &self.expected_document {
            assert_eq!(xml, expected);
        }

        if xml == "<malformed" {
            return Err(Box::new(OpenIdError::new_discovery_error(
                ErrorKind::Parse,
                codes::PARSE_ERROR,
                "unclosed tag",
                None,
            )));
        }

        Ok(self
            .endpoints
            .iter()
            .filter(|e| target_types.contains(&e.service_type))
            .cloned()
            .collect())
    }
}

pub struct StubXriResolver {
    pub endpoints: Vec<ServiceEndpoint>,
}

impl XriResolver for StubXriResolver {
    fn discover(&self, _xri: &Identifier) -> OpenIdReturnType<Vec<ServiceEndpoint>> {
        Ok(self.endpoints.clone())
    }
}

pub fn endpoint(url: &str, service_type: ServiceType) -> ServiceEndpoint {
    ServiceEndpoint::new(Url::parse(url).unwrap(), service_type)
}

pub fn fixed_now() -> i64 {
    1_700_000_000
}
