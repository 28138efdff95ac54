//! Default Http Client

use reqwest::{redirect::Policy, ClientBuilder, Method, Response};
use std::collections::HashMap;

use crate::types::http_client::{HttpMethod, HttpRequest, HttpResponse, OpenIdHttpClient};

/// The default HttpClient, backed by [reqwest]
pub struct DefaultHttpClient;

impl DefaultHttpClient {
    async fn to_response(mut response: Response, max_body_size: usize) -> HttpResponse {
        let status_code = response.status().as_u16();
        let final_url = response.url().clone();

        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_lowercase())
                    .or_default()
                    .push(value.to_string());
            }
        }

        let mut bytes = Vec::new();
        let mut body_size_exceeded = false;

        while let Ok(Some(chunk)) = response.chunk().await {
            if bytes.len() + chunk.len() > max_body_size {
                body_size_exceeded = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = match String::from_utf8_lossy(&bytes) {
            b if b.is_empty() => None,
            b => Some(b.into_owned()),
        };

        HttpResponse {
            status_code,
            headers,
            body,
            final_url,
            body_size_exceeded,
        }
    }
}

impl OpenIdHttpClient for DefaultHttpClient {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, String> {
        let redirect = match req.max_redirects {
            0 => Policy::none(),
            n => Policy::limited(n),
        };

        let client = ClientBuilder::new()
            .redirect(redirect)
            .timeout(req.timeout)
            .build()
            .map_err(|e| format!("{e}"))?;

        let method = match req.method {
            HttpMethod::GET => Method::GET,
            HttpMethod::HEAD => Method::HEAD,
            HttpMethod::POST => Method::POST,
        };

        let mut req_builder = client.request(method, req.url);

        if let Some(body) = req.body {
            req_builder = req_builder.body(body);
        }

        for (name, values) in req.headers {
            for value in values {
                req_builder = req_builder.header(name.clone(), value);
            }
        }

        req_builder = req_builder.header("User-Agent", "openid-engine");

        match req_builder.send().await {
            Ok(res) => Ok(Self::to_response(res, req.max_body_size).await),
            Err(e) => Err(format!("{e}")),
        }
    }
}
