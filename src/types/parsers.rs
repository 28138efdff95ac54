//! # Parser and resolver interfaces
//! The discovery engine does not parse XML or resolve XRIs itself; it consumes these traits.

use super::{Identifier, OpenIdReturnType, ServiceEndpoint, ServiceType};

/// OpenID links found in the `<head>` of an HTML document
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HtmlLinks {
    /// `<link rel="openid2.provider">`
    pub op2_endpoint: Option<String>,
    /// `<link rel="openid2.local_id">`
    pub op2_local_id: Option<String>,
    /// `<link rel="openid.server">`
    pub op1_endpoint: Option<String>,
    /// `<link rel="openid.delegate">`
    pub op1_delegate: Option<String>,
}

/// Extracts discovery information from HTML documents.
///
/// Implementations must fail (rather than guess) on documents with more than one `<head>` or more
/// than one `X-XRDS-Location` meta declaration.
pub trait HtmlParser: Send + Sync {
    /// Value of `<meta http-equiv="X-XRDS-Location" content="...">`, if present
    fn parse_html_meta_xrds_location(&self, html: &str) -> OpenIdReturnType<Option<String>>;

    /// OpenID `<link>` elements
    fn parse_html_links(&self, html: &str) -> OpenIdReturnType<HtmlLinks>;
}

/// Turns an XRDS document into service endpoints.
pub trait XrdsParser: Send + Sync {
    /// Parses `xml` and returns the services whose type is one of `target_types`.
    ///
    /// The result must be ordered by service priority, then uri priority, then document order,
    /// with the priorities reported on each [ServiceEndpoint]. Malformed documents are an error.
    fn parse_xrds(
        &self,
        xml: &str,
        target_types: &[ServiceType],
    ) -> OpenIdReturnType<Vec<ServiceEndpoint>>;
}

/// Resolves XRI identifiers.
pub trait XriResolver: Send + Sync {
    /// Resolves `xri` and returns its OpenID services. Claimed identifiers should be set to the
    /// canonical id of the XRI.
    fn discover(&self, xri: &Identifier) -> OpenIdReturnType<Vec<ServiceEndpoint>>;
}
