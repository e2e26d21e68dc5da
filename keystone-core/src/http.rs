// HTTP request and response types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP request wrapper
///
/// The transport fills in the parts it owns (method, path, headers, body) and
/// the router fills in `path_params` and `query_params` after matching.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    pub fn new(method: String, path: String) -> Self {
        Self {
            method,
            path,
            headers: HashMap::new(),
            body: Vec::new(),
            path_params: HashMap::new(),
            query_params: HashMap::new(),
        }
    }

    pub fn from_parts(
        method: String,
        path: String,
        headers: HashMap<String, String>,
        body: Vec<u8>,
        path_params: HashMap<String, String>,
        query_params: HashMap<String, String>,
    ) -> Self {
        Self {
            method,
            path,
            headers,
            body,
            path_params,
            query_params,
        }
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }

    /// Get a path parameter by name
    pub fn param(&self, name: &str) -> Option<&String> {
        self.path_params.get(name)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Get a header by name, ignoring ASCII case
    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Get a cookie from the `Cookie` header
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.header("cookie")?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| key.trim() == name)
            .map(|(_, value)| value.trim().trim_matches('"').to_string())
    }

    /// Get a field from an URL-encoded form body
    pub fn form_field(&self, name: &str) -> Option<String> {
        let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(&self.body).ok()?;
        fields
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// HTTP response wrapper
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body = text.into().into_bytes();
        self.headers.insert(
            "Content-Type".to_string(),
            "text/plain; charset=utf-8".to_string(),
        );
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// JSON response helper
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T: Serialize>(pub T);

impl<T: Serialize> Json<T> {
    pub fn into_response(self) -> Result<HttpResponse, crate::Error> {
        HttpResponse::ok().with_json(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> HttpRequest {
        let mut req = HttpRequest::new("POST".to_string(), "/login".to_string());
        req.headers.insert(
            "Cookie".to_string(),
            "session=abc123; theme=\"dark\"".to_string(),
        );
        req.headers
            .insert("X-Trace-Id".to_string(), "t-1".to_string());
        req.body = b"user=alice&remember=on&note=hello+world".to_vec();
        req
    }

    #[test]
    fn test_header_case_insensitive() {
        let req = request();
        assert_eq!(req.header("x-trace-id"), Some(&"t-1".to_string()));
        assert_eq!(req.header("X-TRACE-ID"), Some(&"t-1".to_string()));
        assert!(req.header("x-missing").is_none());
    }

    #[test]
    fn test_cookie_lookup() {
        let req = request();
        assert_eq!(req.cookie("session").as_deref(), Some("abc123"));
        assert_eq!(req.cookie("theme").as_deref(), Some("dark"));
        assert!(req.cookie("missing").is_none());
    }

    #[test]
    fn test_form_field() {
        let req = request();
        assert_eq!(req.form_field("user").as_deref(), Some("alice"));
        assert_eq!(req.form_field("note").as_deref(), Some("hello world"));
        assert!(req.form_field("missing").is_none());
    }

    #[test]
    fn test_response_helpers() {
        let text = HttpResponse::ok().with_text("hi");
        assert_eq!(text.body_string(), "hi");
        assert_eq!(
            text.headers.get("Content-Type").map(String::as_str),
            Some("text/plain; charset=utf-8")
        );

        let json = Json(serde_json::json!({"a": 1})).into_response().unwrap();
        assert!(json.is_success());
        assert_eq!(json.body_string(), r#"{"a":1}"#);
    }
}
