//! # Types Module
//! Identifiers, endpoints, errors, options and the interfaces of external collaborators

mod discovery_outcome;
mod errors;
pub mod http_client;
mod identifier;
mod options;
mod parsers;
mod service_endpoint;

pub use discovery_outcome::DiscoveryOutcome;
pub use errors::{codes, ErrorDetail, ErrorKind, OpenIdError, OpenIdReturnType};
pub use http_client::{HttpMethod, HttpRequest, HttpResponse, OpenIdHttpClient};
pub use identifier::Identifier;
pub use options::{ConsumerOptions, DiscoveryOptions, RealmOptions, ServerOptions};
pub use parsers::{HtmlLinks, HtmlParser, XrdsParser, XriResolver};
pub use service_endpoint::{
    sort_endpoints, ServiceEndpoint, ServiceType, IDENTIFIER_SELECT, TYPE_OPENID10_SIGNON,
    TYPE_OPENID11_SIGNON, TYPE_OPENID2_OP_SELECT, TYPE_OPENID2_RP, TYPE_OPENID2_SIGNON,
};
