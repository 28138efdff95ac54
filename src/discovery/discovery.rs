use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use super::RegexHtmlParser;
use crate::helpers::validate_url;
use crate::http::{discovery_error, expect_status, request_async};
use crate::types::{
    codes, sort_endpoints, DiscoveryOptions, DiscoveryOutcome, ErrorKind, HtmlParser, HttpMethod,
    HttpRequest, HttpResponse, Identifier, OpenIdError, OpenIdHttpClient, OpenIdReturnType,
    ServiceEndpoint, ServiceType, XrdsParser, XriResolver,
};

/// `Accept` header of Yadis GET requests
pub const YADIS_ACCEPT: &str =
    "application/xrds+xml, text/html; q=0.3, application/xhtml+xml; q=0.5";

/// Media type of XRDS documents
pub const XRDS_CONTENT_TYPE: &str = "application/xrds+xml";

/// Header pointing at the XRDS document of a Yadis identifier
pub const XRDS_LOCATION_HEADER: &str = "x-xrds-location";

/// Service types a relying party looks for
pub const CONSUMER_SERVICE_TYPES: [ServiceType; 4] = [
    ServiceType::OpenId2OpSelect,
    ServiceType::OpenId2Signon,
    ServiceType::OpenId11,
    ServiceType::OpenId10,
];

/// Endpoints found by Yadis discovery
#[derive(Debug, Clone)]
pub struct YadisResult {
    /// Ranked endpoints
    pub endpoints: Vec<ServiceEndpoint>,
    /// The identifier url after redirects
    pub normalized_url: Url,
    /// Where the XRDS document came from
    pub xrds_url: Url,
}

fn invalid_response(message: impl Into<String>, response: Option<HttpResponse>) -> Box<OpenIdError> {
    Box::new(OpenIdError::new_discovery_error(
        ErrorKind::Protocol,
        codes::INVALID_RESPONSE,
        message,
        response,
    ))
}

fn no_endpoints(message: impl Into<String>) -> Box<OpenIdError> {
    Box::new(OpenIdError::new_discovery_error(
        ErrorKind::Protocol,
        codes::NO_ENDPOINTS,
        message,
        None,
    ))
}

/// Where a Yadis probe pointed
enum YadisPointer {
    Location(Url),
    Document(String),
}

/// Reads the XRDS pointer of a probe response. Two `X-XRDS-Location` headers are a hard failure.
fn xrds_pointer(response: &HttpResponse) -> OpenIdReturnType<Option<YadisPointer>> {
    let locations = response.header_values(XRDS_LOCATION_HEADER);

    if locations.len() > 1 {
        return Err(invalid_response(
            format!(
                "{} sent {} X-XRDS-Location headers",
                response.final_url,
                locations.len()
            ),
            Some(response.clone()),
        ));
    }

    if let Some(location) = locations.first() {
        let url = response
            .final_url
            .join(location.trim())
            .map_err(|_| invalid_response(format!("invalid X-XRDS-Location {location}"), None))?;
        return Ok(Some(YadisPointer::Location(url)));
    }

    Ok(None)
}

fn is_xrds(response: &HttpResponse) -> bool {
    response.content_type().as_deref() == Some(XRDS_CONTENT_TYPE)
}

/// # Discovery
/// Finds the OpenID services of an identifier.
///
/// Url identifiers go through Yadis (HEAD, GET, XRDS retrieval) with HTML `<link>` discovery as
/// the fallback. XRIs are handed to the configured [XriResolver]. XML parsing is delegated to
/// the configured [XrdsParser].
#[derive(Clone)]
pub struct Discovery {
    xrds_parser: Arc<dyn XrdsParser>,
    html_parser: Arc<dyn HtmlParser>,
    xri_resolver: Option<Arc<dyn XriResolver>>,
    options: DiscoveryOptions,
}

impl Discovery {
    /// Creates an engine that parses XRDS documents with `xrds_parser`
    pub fn new(xrds_parser: Arc<dyn XrdsParser>) -> Self {
        Self {
            xrds_parser,
            html_parser: Arc::new(RegexHtmlParser),
            xri_resolver: None,
            options: DiscoveryOptions::default(),
        }
    }

    /// Replaces the HTML parser
    pub fn with_html_parser(mut self, html_parser: Arc<dyn HtmlParser>) -> Self {
        self.html_parser = html_parser;
        self
    }

    /// Enables XRI identifiers
    pub fn with_xri_resolver(mut self, xri_resolver: Arc<dyn XriResolver>) -> Self {
        self.xri_resolver = Some(xri_resolver);
        self
    }

    /// Replaces the request limits
    pub fn with_options(mut self, options: DiscoveryOptions) -> Self {
        self.options = options;
        self
    }

    /// Request limits
    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    fn request(&self, url: Url, method: HttpMethod, max_redirects: usize) -> HttpRequest {
        HttpRequest::new(url)
            .method(method)
            .max_redirects(max_redirects)
            .max_body_size(self.options.max_body_size)
            .timeout(self.options.timeout)
    }

    /// # Discover
    /// Discovers the OpenID provider services of `identifier`.
    ///
    /// The outcome is a failure when nothing usable was found. HTML link discovery runs when
    /// Yadis finds nothing, unless Yadis failed on a malformed or oversized response. Claimed
    /// identifiers of signon endpoints found for a url are set to the url after redirects.
    pub async fn discover_async<T>(&self, identifier: &Identifier, http_client: &T) -> DiscoveryOutcome
    where
        T: OpenIdHttpClient,
    {
        match identifier {
            Identifier::Xri(_) => self.discover_xri(identifier),
            Identifier::Url(url) => self.discover_url(identifier, url, http_client).await,
        }
    }

    fn discover_xri(&self, identifier: &Identifier) -> DiscoveryOutcome {
        let Some(resolver) = &self.xri_resolver else {
            return DiscoveryOutcome::failure(
                identifier.clone(),
                Box::new(OpenIdError::new_discovery_error(
                    ErrorKind::Configuration,
                    codes::XRI_UNSUPPORTED,
                    format!("no XRI resolver configured for {identifier}"),
                    None,
                )),
            );
        };

        let mut endpoints = match resolver.discover(identifier) {
            Ok(endpoints) => endpoints,
            Err(e) => return DiscoveryOutcome::failure(identifier.clone(), e),
        };

        endpoints.retain(|e| CONSUMER_SERVICE_TYPES.contains(&e.service_type));
        sort_endpoints(&mut endpoints);

        if endpoints.is_empty() {
            return DiscoveryOutcome::failure(
                identifier.clone(),
                no_endpoints(format!("{identifier} has no OpenID services")),
            );
        }

        info!(identifier = %identifier, endpoints = endpoints.len(), "xri discovered");
        DiscoveryOutcome::success(identifier.clone(), endpoints, Some(identifier.clone()))
    }

    async fn discover_url<T>(
        &self,
        identifier: &Identifier,
        url: &Url,
        http_client: &T,
    ) -> DiscoveryOutcome
    where
        T: OpenIdHttpClient,
    {
        let yadis_failure = match self
            .yadis_discover_async(url, &CONSUMER_SERVICE_TYPES, self.options.max_redirects, http_client)
            .await
        {
            Ok(result) => {
                let normalized = Identifier::from_url(result.normalized_url);
                let endpoints = fill_claimed_identifiers(result.endpoints, &normalized);

                info!(identifier = %identifier, endpoints = endpoints.len(), "yadis discovered");
                return DiscoveryOutcome::success(identifier.clone(), endpoints, Some(normalized));
            }
            Err(e) => e,
        };

        debug!(identifier = %identifier, error = %yadis_failure, "yadis discovery failed");

        if !self.options.html_fallback || is_hard_failure(&yadis_failure) {
            return DiscoveryOutcome::failure(identifier.clone(), yadis_failure);
        }

        match self.html_discover_async(url, http_client).await {
            Ok((endpoints, normalized)) if !endpoints.is_empty() => {
                info!(identifier = %identifier, endpoints = endpoints.len(), "html discovered");
                DiscoveryOutcome::success(identifier.clone(), endpoints, Some(normalized))
            }
            Ok(_) => DiscoveryOutcome::failure(identifier.clone(), yadis_failure),
            Err(e) => {
                debug!(identifier = %identifier, error = %e, "html discovery failed");
                DiscoveryOutcome::failure(identifier.clone(), yadis_failure)
            }
        }
    }

    /// # Yadis Discovery
    /// Runs the Yadis chain on `url` and returns the services of `target_types`.
    ///
    /// 1. HEAD `url`. One `X-XRDS-Location` header (or an XRDS content type) gives the document
    ///    location. Transport errors and non 200 answers fall through to GET.
    /// 2. GET `url`. An XRDS body is used as is, otherwise the location comes from the header
    ///    or the HTML `<meta http-equiv="X-XRDS-Location">` tag. Failures here are fatal.
    /// 3. GET the location. Failures here are fatal.
    ///
    /// More than one `X-XRDS-Location` header and oversized bodies are hard failures at any step.
    pub async fn yadis_discover_async<T>(
        &self,
        url: &Url,
        target_types: &[ServiceType],
        max_redirects: usize,
        http_client: &T,
    ) -> OpenIdReturnType<YadisResult>
    where
        T: OpenIdHttpClient,
    {
        let mut normalized_url = url.clone();
        let mut pointer = None;

        let head = self.request(url.clone(), HttpMethod::HEAD, max_redirects);

        match request_async(head, http_client, discovery_error).await {
            Ok(response) if response.status_code == 200 => {
                normalized_url = response.final_url.clone();
                pointer = xrds_pointer(&response)?;

                if pointer.is_none() && is_xrds(&response) {
                    pointer = Some(YadisPointer::Location(response.final_url.clone()));
                }
            }
            Ok(response) => {
                debug!(url = %url, status = response.status_code, "yadis HEAD answered non 200");
            }
            Err(e) if e.code() == codes::BODY_TOO_LARGE => return Err(e),
            Err(e) => {
                debug!(url = %url, error = %e, "yadis HEAD failed");
            }
        }

        if pointer.is_none() {
            let get = self
                .request(url.clone(), HttpMethod::GET, max_redirects)
                .header("accept", YADIS_ACCEPT);

            let response = request_async(get, http_client, discovery_error).await?;
            let response = expect_status(response, 200, discovery_error)?;
            normalized_url = response.final_url.clone();

            let locations = response.header_values(XRDS_LOCATION_HEADER).len();
            let body = response.body.clone().unwrap_or_default();

            pointer = if is_xrds(&response) && locations <= 1 {
                Some(YadisPointer::Document(body))
            } else if let Some(found) = xrds_pointer(&response)? {
                Some(found)
            } else {
                self.html_parser
                    .parse_html_meta_xrds_location(&body)?
                    .map(|location| {
                        response.final_url.join(&location).map_err(|_| {
                            invalid_response(format!("invalid meta XRDS location {location}"), None)
                        })
                    })
                    .transpose()?
                    .map(YadisPointer::Location)
            };
        }

        let (document, xrds_url) = match pointer {
            Some(YadisPointer::Document(document)) => (document, normalized_url.clone()),
            Some(YadisPointer::Location(location)) => {
                let get = self
                    .request(location.clone(), HttpMethod::GET, max_redirects)
                    .header("accept", XRDS_CONTENT_TYPE);

                let response = request_async(get, http_client, discovery_error).await?;
                let response = expect_status(response, 200, discovery_error)?;

                let xrds_url = response.final_url.clone();
                let document = response.body.ok_or_else(|| {
                    invalid_response(format!("XRDS document at {location} is empty"), None)
                })?;

                (document, xrds_url)
            }
            None => return Err(no_endpoints(format!("{url} does not point to an XRDS document"))),
        };

        let mut endpoints = self.xrds_parser.parse_xrds(&document, target_types)?;
        endpoints.retain(|e| target_types.contains(&e.service_type));
        sort_endpoints(&mut endpoints);

        if endpoints.is_empty() {
            return Err(no_endpoints(format!(
                "XRDS document at {xrds_url} lists no matching services"
            )));
        }

        Ok(YadisResult {
            endpoints,
            normalized_url,
            xrds_url,
        })
    }

    /// # HTML Discovery
    /// Reads `openid2.provider`, `openid2.local_id`, `openid.server` and `openid.delegate` links
    /// from the page at `url`. Returns the endpoints and the url after redirects.
    pub async fn html_discover_async<T>(
        &self,
        url: &Url,
        http_client: &T,
    ) -> OpenIdReturnType<(Vec<ServiceEndpoint>, Identifier)>
    where
        T: OpenIdHttpClient,
    {
        let get = self
            .request(url.clone(), HttpMethod::GET, self.options.max_redirects)
            .header("accept", "text/html, application/xhtml+xml");

        let response = request_async(get, http_client, discovery_error).await?;
        let response = expect_status(response, 200, discovery_error)?;

        let claimed = Identifier::from_url(response.final_url.clone());
        let links = self
            .html_parser
            .parse_html_links(response.body.as_deref().unwrap_or_default())?;

        let mut endpoints = vec![];

        let candidates = [
            (links.op2_endpoint, links.op2_local_id, ServiceType::OpenId2Signon),
            (links.op1_endpoint, links.op1_delegate, ServiceType::OpenId11),
        ];

        for (endpoint, delegate, service_type) in candidates {
            let Some(endpoint) = endpoint else {
                continue;
            };

            let Some(endpoint_url) = validate_url(&endpoint) else {
                warn!(endpoint, "ignoring invalid provider link");
                continue;
            };

            let mut service =
                ServiceEndpoint::new(endpoint_url, service_type).with_claimed_identifier(claimed.clone());
            if let Some(delegate) = delegate {
                service = service.with_delegate(delegate);
            }

            endpoints.push(service);
        }

        Ok((endpoints, claimed))
    }

    /// # Relying Party Discovery
    /// Yadis discovery of the `return_to` services of a realm, without following redirects
    pub async fn discover_rp_async<T>(
        &self,
        realm_url: &Url,
        http_client: &T,
    ) -> OpenIdReturnType<Vec<ServiceEndpoint>>
    where
        T: OpenIdHttpClient,
    {
        self.yadis_discover_async(realm_url, &[ServiceType::OpenId2Rp], 0, http_client)
            .await
            .map(|result| result.endpoints)
    }
}

/// Failures that end discovery without trying the HTML fallback
fn is_hard_failure(error: &OpenIdError) -> bool {
    [codes::INVALID_RESPONSE, codes::BODY_TOO_LARGE, codes::PARSE_ERROR].contains(&error.code())
}

/// Sets the claimed identifier of signon endpoints that do not carry one
fn fill_claimed_identifiers(
    endpoints: Vec<ServiceEndpoint>,
    normalized: &Identifier,
) -> Vec<ServiceEndpoint> {
    endpoints
        .into_iter()
        .map(|mut endpoint| {
            if !endpoint.is_op_select() && endpoint.claimed_identifier.is_none() {
                endpoint.claimed_identifier = Some(normalized.clone());
            }
            endpoint
        })
        .collect()
}

impl Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("xri_resolver", &self.xri_resolver.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
