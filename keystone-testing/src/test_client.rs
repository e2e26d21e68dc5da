// In-memory test client

use keystone_core::{Error, ErrorKind, HttpMethod, HttpRequest, HttpResponse, Router};
use std::collections::HashMap;
use std::sync::Arc;

/// Drives a [`Router`] without a network transport.
#[derive(Clone)]
pub struct TestClient {
    router: Arc<Router>,
}

impl TestClient {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    pub fn from_shared(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::GET, path))
            .await
    }

    pub async fn post(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::POST, path).body(body))
            .await
    }

    pub async fn put(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::PUT, path).body(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::DELETE, path))
            .await
    }

    pub async fn patch(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::PATCH, path).body(body))
            .await
    }

    /// POST a JSON document.
    pub async fn post_json<T: serde::Serialize>(&self, path: &str, data: &T) -> TestResponse {
        match TestRequestBuilder::new(HttpMethod::POST, path).json(data) {
            Ok(builder) => self.send(builder).await,
            Err(error) => TestResponse::Error(error),
        }
    }

    /// Send a fully built request.
    pub async fn send(&self, builder: TestRequestBuilder) -> TestResponse {
        self.request(builder.build()).await
    }

    /// Route a raw request; routing errors are kept unrendered.
    pub async fn request(&self, request: HttpRequest) -> TestResponse {
        match self.router.route(request).await {
            Ok(response) => TestResponse::Success(response),
            Err(error) => TestResponse::Error(error),
        }
    }
}

/// Builder for test requests
pub struct TestRequestBuilder {
    method: HttpMethod,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    query_params: Vec<(String, String)>,
}

impl TestRequestBuilder {
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
            query_params: Vec::new(),
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a `Cookie` header entry, appending to earlier cookies.
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        let pair = format!("{}={}", name, value);
        self.headers
            .entry("Cookie".to_string())
            .and_modify(|cookies| {
                cookies.push_str("; ");
                cookies.push_str(&pair);
            })
            .or_insert(pair);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn json<T: serde::Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data).map_err(|e| Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// URL-encoded form body.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = encode_pairs(fields.iter().copied()).into_bytes();
        self.headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        self
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    /// The request as a transport would hand it to the router.
    pub fn build(self) -> HttpRequest {
        let path = if self.query_params.is_empty() {
            self.path
        } else {
            let query = encode_pairs(
                self.query_params
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            );
            let separator = if self.path.contains('?') { '&' } else { '?' };
            format!("{}{}{}", self.path, separator, query)
        };

        let mut request = HttpRequest::new(self.method.as_str().to_string(), path);
        request.headers = self.headers;
        request.body = self.body;
        request
    }
}

/// `application/x-www-form-urlencoded` encoding, shared by query and form.
fn encode_pairs<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let pairs: Vec<(&str, &str)> = pairs.collect();
    serde_urlencoded::to_string(&pairs).unwrap_or_default()
}

/// Response from a test request
#[derive(Debug)]
pub enum TestResponse {
    Success(HttpResponse),
    /// The router failed before any handler produced a response.
    Error(Error),
}

impl TestResponse {
    /// Assert the response is successful
    pub fn assert_success(&self) -> &HttpResponse {
        match self {
            TestResponse::Success(response) => response,
            TestResponse::Error(error) => {
                panic!("Expected success response, got error: {:?}", error)
            }
        }
    }

    /// Assert the router failed
    pub fn assert_error(&self) -> &Error {
        match self {
            TestResponse::Error(error) => error,
            TestResponse::Success(response) => {
                panic!("Expected router error, got status {}", response.status)
            }
        }
    }

    /// The status, rendering router errors as a transport would.
    pub fn status(&self) -> u16 {
        match self {
            TestResponse::Success(response) => response.status,
            TestResponse::Error(error) => error.status_code(),
        }
    }

    pub fn body_string(&self) -> Option<String> {
        match self {
            TestResponse::Success(response) => String::from_utf8(response.body.clone()).ok(),
            TestResponse::Error(_) => None,
        }
    }

    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        match self {
            TestResponse::Success(response) => serde_json::from_slice(&response.body)
                .map_err(|e| format!("Serialization error: {}", e)),
            TestResponse::Error(error) => Err(format!("{:?}", error)),
        }
    }

    /// Header lookup, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&String> {
        match self {
            TestResponse::Success(response) => response
                .headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .map(|(_, value)| value),
            TestResponse::Error(_) => None,
        }
    }

    /// The error kind, from the router error or the `error.kind` body field.
    pub fn error_kind(&self) -> Option<String> {
        match self {
            TestResponse::Error(error) => Some(error.kind().as_str().to_string()),
            TestResponse::Success(_) => {
                let body: serde_json::Value = self.body_json().ok()?;
                body["error"]["kind"].as_str().map(str::to_string)
            }
        }
    }

    /// Whether the error kind equals `kind`.
    pub fn is_error_kind(&self, kind: ErrorKind) -> bool {
        self.error_kind().as_deref() == Some(kind.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = TestRequestBuilder::new(HttpMethod::GET, "/test")
            .header("Authorization", "Bearer token")
            .query("q", "a b")
            .query("page", "2")
            .cookie("session", "abc")
            .cookie("theme", "dark")
            .build();

        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/test?q=a+b&page=2");
        assert_eq!(req.header("authorization"), Some(&"Bearer token".to_string()));
        assert_eq!(req.cookie("theme").as_deref(), Some("dark"));
        assert_eq!(req.cookie("session").as_deref(), Some("abc"));
    }

    #[test]
    fn test_form_body() {
        let req = TestRequestBuilder::new(HttpMethod::POST, "/login")
            .form(&[("user", "alice"), ("note", "x&y")])
            .build();

        assert_eq!(req.form_field("note").as_deref(), Some("x&y"));
        assert_eq!(
            req.header("content-type").map(String::as_str),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_router_error_kind() {
        let response = TestResponse::Error(Error::RouteNotFound("GET /x".to_string()));
        assert_eq!(response.status(), 404);
        assert!(response.is_error_kind(ErrorKind::NotFound));
        assert!(response.body_string().is_none());
    }

    #[test]
    fn test_rendered_error_kind() {
        let response = TestResponse::Success(Error::Coercion("id".to_string()).to_response(false));
        assert_eq!(response.status(), 400);
        assert_eq!(response.error_kind().as_deref(), Some("coercion"));
        assert!(TestResponse::Success(HttpResponse::ok()).error_kind().is_none());
    }
}
