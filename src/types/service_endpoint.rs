use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use url::Url;

use super::Identifier;

/// Type URI of an OpenID 2.0 OP Identifier element (OP-driven identifier selection)
pub const TYPE_OPENID2_OP_SELECT: &str = "http://specs.openid.net/auth/2.0/server";
/// Type URI of an OpenID 2.0 Claimed Identifier element
pub const TYPE_OPENID2_SIGNON: &str = "http://specs.openid.net/auth/2.0/signon";
/// Type URI of an OpenID 1.1 service
pub const TYPE_OPENID11_SIGNON: &str = "http://openid.net/signon/1.1";
/// Type URI of an OpenID 1.0 service
pub const TYPE_OPENID10_SIGNON: &str = "http://openid.net/signon/1.0";
/// Type URI of a Relying Party return_to endpoint
pub const TYPE_OPENID2_RP: &str = "http://specs.openid.net/auth/2.0/return_to";

/// Placeholder claimed id / identity used when the OP selects the identifier
pub const IDENTIFIER_SELECT: &str = "http://specs.openid.net/auth/2.0/identifier_select";

/// Protocol version advertised by a discovered service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    /// OpenID 1.0 signon
    OpenId10,
    /// OpenID 1.1 signon
    OpenId11,
    /// OpenID 2.0 claimed identifier signon
    OpenId2Signon,
    /// OpenID 2.0 OP identifier
    OpenId2OpSelect,
    /// OpenID 2.0 relying party endpoint
    OpenId2Rp,
}

impl ServiceType {
    /// The XRDS `<Type>` URI
    pub fn type_uri(&self) -> &'static str {
        match self {
            ServiceType::OpenId10 => TYPE_OPENID10_SIGNON,
            ServiceType::OpenId11 => TYPE_OPENID11_SIGNON,
            ServiceType::OpenId2Signon => TYPE_OPENID2_SIGNON,
            ServiceType::OpenId2OpSelect => TYPE_OPENID2_OP_SELECT,
            ServiceType::OpenId2Rp => TYPE_OPENID2_RP,
        }
    }

    /// Looks up the service type of an XRDS `<Type>` URI
    pub fn from_type_uri(uri: &str) -> Option<ServiceType> {
        match uri {
            TYPE_OPENID10_SIGNON => Some(ServiceType::OpenId10),
            TYPE_OPENID11_SIGNON => Some(ServiceType::OpenId11),
            TYPE_OPENID2_SIGNON => Some(ServiceType::OpenId2Signon),
            TYPE_OPENID2_OP_SELECT => Some(ServiceType::OpenId2OpSelect),
            TYPE_OPENID2_RP => Some(ServiceType::OpenId2Rp),
            _ => None,
        }
    }

    /// Whether messages to this service use the OpenID 2.0 protocol
    pub fn is_version2(&self) -> bool {
        matches!(
            self,
            ServiceType::OpenId2Signon | ServiceType::OpenId2OpSelect | ServiceType::OpenId2Rp
        )
    }

    /// Rank used when merging endpoints of different types. Lower sorts first.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            ServiceType::OpenId2OpSelect => 0,
            ServiceType::OpenId2Signon => 1,
            ServiceType::OpenId11 | ServiceType::OpenId10 => 2,
            ServiceType::OpenId2Rp => 3,
        }
    }
}

/// # ServiceEndpoint
/// A single discovered service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// OP endpoint url (or RP return_to url for [ServiceType::OpenId2Rp])
    pub endpoint: Url,
    /// Identifier the user claims
    pub claimed_identifier: Option<Identifier>,
    /// OP-local identifier (`openid.delegate` / `LocalID`)
    pub delegate: Option<String>,
    /// Protocol version
    pub service_type: ServiceType,
    /// `priority` attribute of the `<Service>` element
    pub service_priority: Option<u32>,
    /// `priority` attribute of the `<URI>` element
    pub uri_priority: Option<u32>,
    /// Other `<Type>` URIs listed on the service, eg extension namespaces
    pub extension_types: Vec<String>,
}

impl ServiceEndpoint {
    /// Creates an endpoint without priorities or extension types
    pub fn new(endpoint: Url, service_type: ServiceType) -> Self {
        Self {
            endpoint,
            claimed_identifier: None,
            delegate: None,
            service_type,
            service_priority: None,
            uri_priority: None,
            extension_types: vec![],
        }
    }

    /// Sets the claimed identifier
    pub fn with_claimed_identifier(mut self, claimed_identifier: Identifier) -> Self {
        self.claimed_identifier = Some(claimed_identifier);
        self
    }

    /// Sets the OP-local identifier
    pub fn with_delegate(mut self, delegate: impl Into<String>) -> Self {
        self.delegate = Some(delegate.into());
        self
    }

    /// Sets the service and uri priorities
    pub fn with_priorities(mut self, service: Option<u32>, uri: Option<u32>) -> Self {
        self.service_priority = service;
        self.uri_priority = uri;
        self
    }

    /// Whether this service speaks OpenID 2.0
    pub fn is_version2(&self) -> bool {
        self.service_type.is_version2()
    }

    /// Whether the OP selects the identifier
    pub fn is_op_select(&self) -> bool {
        self.service_type == ServiceType::OpenId2OpSelect
    }

    /// The identifier sent to the OP as `openid.identity`: the delegate when there is one,
    /// the claimed identifier otherwise
    pub fn local_identifier(&self) -> Option<String> {
        self.delegate.clone().or_else(|| {
            self.claimed_identifier
                .as_ref()
                .map(|c| c.as_str().to_string())
        })
    }

    /// Whether the service lists `type_uri` among its types
    pub fn supports_extension(&self, type_uri: &str) -> bool {
        self.extension_types.iter().any(|t| t == type_uri)
    }
}

fn compare_priority(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Orders endpoints: OP-select first, then 2.0 signon, then OpenID 1.x; within a type by
/// service priority then uri priority. The sort is stable so document order breaks ties.
pub fn sort_endpoints(endpoints: &mut [ServiceEndpoint]) {
    endpoints.sort_by(|a, b| {
        a.service_type
            .rank()
            .cmp(&b.service_type.rank())
            .then_with(|| compare_priority(a.service_priority, b.service_priority))
            .then_with(|| compare_priority(a.uri_priority, b.uri_priority))
    });
}
