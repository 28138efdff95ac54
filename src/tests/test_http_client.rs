use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use url::Url;

use crate::{
    helpers::form_url_encoded_to_string_map,
    message::ParameterList,
    server::{DirectResponse, ServerManager},
    types::{HttpMethod, HttpRequest, HttpResponse, OpenIdHttpClient},
};

pub struct TestHttpReqRes {
    pub url: Url,
    pub method: HttpMethod,
    pub headers: HashMap<String, Vec<String>>,
    pub form_params: Vec<(String, String)>,
    pub max_redirects: Option<usize>,

    pub response_status_code: u16,
    pub response_headers: HashMap<String, Vec<String>>,
    pub response_body: Option<String>,
    pub response_final_url: Option<Url>,
    pub response_body_size_exceeded: bool,
    pub transport_error: Option<String>,
}

impl TestHttpReqRes {
    pub fn new(url: impl Into<String>) -> Self {
        TestHttpReqRes {
            url: Url::parse(&url.into()).unwrap(),
            method: HttpMethod::GET,
            headers: HashMap::new(),
            form_params: vec![],
            max_redirects: None,
            response_status_code: 200,
            response_headers: HashMap::new(),
            response_body: None,
            response_final_url: None,
            response_body_size_exceeded: false,
            transport_error: None,
        }
    }

    pub fn assert_request_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn assert_request_header(mut self, key: impl Into<String>, value: Vec<String>) -> Self {
        self.headers.insert(key.into(), value);
        self
    }

    pub fn assert_request_form_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.form_params.push((key.into(), value.into()));
        self
    }

    pub fn assert_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = Some(max_redirects);
        self
    }

    pub fn set_response_body(mut self, response_body: impl Into<String>) -> Self {
        self.response_body = Some(response_body.into());
        self
    }

    pub fn set_response_status_code(mut self, response_status_code: u16) -> Self {
        self.response_status_code = response_status_code;
        self
    }

    pub fn set_response_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response_headers
            .entry(name.into().to_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    pub fn set_response_content_type_header(self, ct: impl Into<String>) -> Self {
        self.set_response_header("content-type", ct)
    }

    pub fn set_response_final_url(mut self, url: impl Into<String>) -> Self {
        self.response_final_url = Some(Url::parse(&url.into()).unwrap());
        self
    }

    pub fn set_response_body_size_exceeded(mut self) -> Self {
        self.response_body_size_exceeded = true;
        self
    }

    pub fn set_transport_error(mut self, error: impl Into<String>) -> Self {
        self.transport_error = Some(error.into());
        self
    }

    pub fn build(self) -> TestHttpClient {
        TestHttpClient::new().add(self)
    }
}

pub struct TestHttpClient {
    req_res: Mutex<VecDeque<TestHttpReqRes>>,
}

impl TestHttpClient {
    pub fn new() -> Self {
        Self {
            req_res: Mutex::new(VecDeque::with_capacity(5)),
        }
    }

    pub fn add(self, req_res: TestHttpReqRes) -> Self {
        self.req_res.lock().unwrap().push_back(req_res);
        self
    }

    pub fn assert(&self) {
        assert!(
            self.req_res.lock().unwrap().is_empty(),
            "All requests not fullfilled"
        );
    }
}

impl OpenIdHttpClient for TestHttpClient {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, String> {
        let req_res = self
            .req_res
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected request to {}", req.url));

        assert_eq!(req.url, req_res.url);
        assert_eq!(req.method, req_res.method);

        for (key, value) in &req_res.headers {
            assert_eq!(req.headers.get(key), Some(value), "header {key}");
        }

        if !req_res.form_params.is_empty() {
            let form = form_url_encoded_to_string_map(req.body.as_deref().unwrap_or_default());
            for param in &req_res.form_params {
                assert!(form.contains(param), "form param {param:?} missing");
            }
        }

        if let Some(max_redirects) = req_res.max_redirects {
            assert_eq!(req.max_redirects, max_redirects);
        }

        if let Some(error) = req_res.transport_error {
            return Err(error);
        }

        Ok(HttpResponse {
            status_code: req_res.response_status_code,
            headers: req_res.response_headers,
            body: req_res.response_body,
            final_url: req_res.response_final_url.unwrap_or(req.url),
            body_size_exceeded: req_res.response_body_size_exceeded,
        })
    }
}

/// Answers direct requests with a [ServerManager], like a provider endpoint would
pub struct ServerHttpClient<'a> {
    pub server: &'a ServerManager,
    pub requests: Mutex<Vec<String>>,
}

impl<'a> ServerHttpClient<'a> {
    pub fn new(server: &'a ServerManager) -> Self {
        Self {
            server,
            requests: Mutex::new(vec![]),
        }
    }

    pub fn modes(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl OpenIdHttpClient for ServerHttpClient<'_> {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, String> {
        assert_eq!(req.method, HttpMethod::POST);
        assert_eq!(req.max_redirects, 0);

        let params = ParameterList::from_url_encoded(req.body.as_deref().unwrap_or_default())
            .map_err(|e| e.to_string())?;

        let mode = params.get("mode").unwrap_or_default().to_string();
        self.requests.lock().unwrap().push(mode.clone());

        let response: DirectResponse = match mode.as_str() {
            "associate" => self
                .server
                .association_response(params, req.url.scheme() == "https"),
            "check_authentication" => self.server.verify(params),
            other => panic!("unexpected direct request mode {other}"),
        };

        Ok(HttpResponse {
            status_code: response.status_code(),
            headers: HashMap::from([(
                "content-type".to_string(),
                vec!["text/plain".to_string()],
            )]),
            body: Some(response.key_value_form()),
            final_url: req.url,
            body_size_exceeded: false,
        })
    }
}
