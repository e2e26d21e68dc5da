// Transport boundary and a minimal in-process router

use crate::{Error, HttpMethod, HttpRequest, HttpResponse};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// Future returned by a route handler
pub type HandlerFuture = BoxFuture<'static, Result<HttpResponse, Error>>;

/// A route handler function type
pub type HandlerFn = Arc<dyn Fn(HttpRequest) -> HandlerFuture + Send + Sync>;

/// Anything that can register `(verb, path, handler)` triples.
pub trait Transport {
    fn add_route(&mut self, method: HttpMethod, path: &str, handler: HandlerFn);
}

/// Route definition with handler
#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub handler: HandlerFn,
}

/// First-match router over `:name` patterns.
#[derive(Default)]
pub struct Router {
    pub routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Match the request and run its handler.
    pub async fn route(&self, mut request: HttpRequest) -> Result<HttpResponse, Error> {
        let (path, query_string) = match request.path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (request.path.clone(), None),
        };

        if let Some(query) = query_string {
            request.query_params.extend(parse_query_string(&query));
        }

        for route in &self.routes {
            if !route.method.matches(&request.method) {
                continue;
            }

            if let Some(params) = match_path(&route.path, &path) {
                tracing::trace!(
                    method = %request.method,
                    path = %path,
                    pattern = %route.path,
                    "Matched route"
                );
                request.path_params = params;
                return (route.handler)(request).await;
            }
        }

        Err(Error::RouteNotFound(format!("{} {}", request.method, path)))
    }

    /// Like [`Router::route`], with errors rendered as responses.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        match self.route(request).await {
            Ok(response) => response,
            Err(err) => err.to_response(false),
        }
    }
}

impl Transport for Router {
    fn add_route(&mut self, method: HttpMethod, path: &str, handler: HandlerFn) {
        let path = if path.is_empty() { "/" } else { path };
        self.routes.push(Route {
            method,
            path: path.to_string(),
            handler,
        });
    }
}

/// Match a route pattern against a request path, capturing `:name` segments.
fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(param_name) = pattern_part.strip_prefix(':') {
            params.insert(param_name.to_string(), path_part.to_string());
        } else if pattern_part != path_part {
            return None;
        }
    }

    Some(params)
}

/// Decode a query string; for repeated keys the last value wins.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_default()
}
