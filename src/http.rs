use tracing::debug;

use crate::types::{
    codes, ErrorKind, HttpRequest, HttpResponse, OpenIdError, OpenIdHttpClient, OpenIdReturnType,
};

/// Builds the component specific error for a failed request
pub(crate) type ErrorFactory =
    fn(ErrorKind, &'static str, String, Option<HttpResponse>) -> OpenIdError;

pub(crate) fn discovery_error(
    kind: ErrorKind,
    code: &'static str,
    message: String,
    response: Option<HttpResponse>,
) -> OpenIdError {
    OpenIdError::new_discovery_error(kind, code, message, response)
}

pub(crate) fn consumer_error(
    kind: ErrorKind,
    code: &'static str,
    message: String,
    _: Option<HttpResponse>,
) -> OpenIdError {
    OpenIdError::new_consumer_error(kind, code, message)
}

/// Sends `request` and enforces the body size cap on the response.
///
/// Any status code is returned as `Ok`; use [expect_status] when only one is acceptable.
pub(crate) async fn request_async<T>(
    request: HttpRequest,
    http_client: &T,
    error: ErrorFactory,
) -> OpenIdReturnType<HttpResponse>
where
    T: OpenIdHttpClient,
{
    let max_body_size = request.max_body_size;
    let url = request.url.to_string();

    debug!(method = ?request.method, url = %url, "sending request");

    let response = http_client.request(request).await.map_err(|e| {
        Box::new(error(
            ErrorKind::Transport,
            codes::TRANSPORT_ERROR,
            format!("request to {url} failed: {e}"),
            None,
        ))
    })?;

    let body_len = response.body.as_ref().map(|b| b.len()).unwrap_or_default();

    if response.body_size_exceeded || body_len > max_body_size {
        return Err(Box::new(error(
            ErrorKind::Protocol,
            codes::BODY_TOO_LARGE,
            format!("response from {url} exceeds the maximum size of {max_body_size} bytes"),
            Some(response),
        )));
    }

    Ok(response)
}

#[inline]
pub(crate) fn expect_status(
    response: HttpResponse,
    expected: u16,
    error: ErrorFactory,
) -> OpenIdReturnType<HttpResponse> {
    if response.status_code != expected {
        return Err(Box::new(error(
            ErrorKind::Transport,
            codes::UNEXPECTED_STATUS,
            format!("expected {expected}, got: {}", response.status_code),
            Some(response),
        )));
    }
    Ok(response)
}
