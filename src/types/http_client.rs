//! # Http Client Interface for Custom Http Clients

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use url::Url;

use crate::helpers::string_map_to_form_url_encoded;

/// The Http methods used by the protocol
#[derive(Debug, Default, Clone, Copy)]
#[cfg_attr(test, derive(PartialEq))]
pub enum HttpMethod {
    /// The GET method is used to retrieve data from a server.
    #[default]
    GET,
    /// The HEAD method is used to retrieve only the headers of a resource, without the actual data.
    HEAD,
    /// The POST method is used to submit data to a server.
    POST,
}

/// # HttpRequest
/// A request the library asks the [OpenIdHttpClient] to perform
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Url of the request
    pub url: Url,
    /// Http method of the request
    pub method: HttpMethod,
    /// Headers that are sent in the request. Header names are lowercase.
    pub headers: HashMap<String, Vec<String>>,
    /// The request body to be sent
    pub body: Option<String>,
    /// Maximum number of redirects the client may follow. `0` disables redirects.
    pub max_redirects: usize,
    /// Maximum number of body bytes the client should read
    pub max_body_size: usize,
    /// Request timeout
    pub timeout: Duration,
}

impl HttpRequest {
    pub(crate) fn new(url: Url) -> Self {
        Self {
            url,
            method: HttpMethod::GET,
            headers: HashMap::new(),
            body: None,
            max_redirects: 10,
            max_body_size: 100_000,
            timeout: Duration::from_secs(10),
        }
    }

    pub(crate) fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub(crate) fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_lowercase();
        let value = value.into();

        if let Some(values) = self.headers.get_mut(&name) {
            values.push(value);
        } else {
            self.headers.insert(name, vec![value]);
        }
        self
    }

    pub(crate) fn form(mut self, form: &[(String, String)]) -> Self {
        let form_body = string_map_to_form_url_encoded(form);
        self.headers.insert(
            "content-type".to_string(),
            vec!["application/x-www-form-urlencoded".to_string()],
        );
        self.body = Some(form_body);
        self
    }

    pub(crate) fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub(crate) fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub(crate) fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Represents an HTTP response received from a server.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code of the response (e.g., 200 for success, 404 for Not Found).
    pub status_code: u16,
    /// Response headers. Names are lowercase, a header sent more than once keeps every value.
    pub headers: HashMap<String, Vec<String>>,
    /// The optional body content of the response. None if there is no body content.
    pub body: Option<String>,
    /// Url the response was served from, after redirects
    pub final_url: Url,
    /// Set when the client stopped reading because the body was larger than
    /// [HttpRequest::max_body_size]
    pub body_size_exceeded: bool,
}

impl HttpResponse {
    /// All values of the header `name` (case insensitive)
    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers
            .get(&name.to_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// First value of the header `name` (case insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).first().map(|v| v.as_str())
    }

    /// The media type of the response without parameters, lowercased
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_lowercase()
        })
    }
}

/// This trait defines the interface for making HTTP requests used by the OpenID library.
/// Users who need custom HTTP clients need to implement this trait.
pub trait OpenIdHttpClient {
    /// Makes an HTTP request using the provided HttpRequest object.
    ///
    /// The client is expected to honour [HttpRequest::max_redirects], stop reading the body after
    /// [HttpRequest::max_body_size] bytes (setting [HttpResponse::body_size_exceeded]) and apply
    /// [HttpRequest::timeout].
    ///
    ///  * On success, the result is `Ok(HttpResponse)` containing the HTTP response, whatever its status.
    ///  * On a transport failure, the result is `Err(String)` with an error message describing the failure.
    fn request(
        &self,
        req: HttpRequest,
    ) -> impl std::future::Future<Output = Result<HttpResponse, String>> + Send;
}
