//! Request context capability.
//!
//! The binder never touches a concrete request type. It reads request data
//! through [`RequestContext`], which a transport implements for whatever it
//! hands to the dispatcher. [`HttpRequest`] implements it out of the box.
//!
//! Actions that need more than their declared parameters can ask for the
//! context itself by declaring a parameter of type [`ParamType::Context`].
//!
//! [`ParamType::Context`]: crate::metadata::ParamType::Context

use crate::{Error, HttpRequest};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Shared handle to a live request context.
pub type ContextHandle = Arc<dyn RequestContext>;

/// Read access to a live request.
#[async_trait]
pub trait RequestContext: Send + Sync {
    /// Request method as sent by the client.
    fn method(&self) -> &str;

    /// Request path without the query string.
    fn path(&self) -> &str;

    /// A path parameter captured by the transport's route matcher.
    fn path_param(&self, name: &str) -> Option<String>;

    /// A decoded query-string parameter.
    fn query(&self, name: &str) -> Option<String>;

    /// A header value. Lookup ignores ASCII case.
    fn header(&self, name: &str) -> Option<String>;

    /// A cookie value.
    fn cookie(&self, name: &str) -> Option<String>;

    /// A field of an URL-encoded form body.
    fn form_value(&self, name: &str) -> Option<String>;

    /// The raw request payload.
    ///
    /// This is the only suspension point of parameter binding; transports
    /// that stream bodies apply their own timeout and cancellation here.
    async fn body(&self) -> Result<Bytes, Error>;
}

#[async_trait]
impl RequestContext for HttpRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn path(&self) -> &str {
        self.path.split_once('?').map(|(p, _)| p).unwrap_or(&self.path)
    }

    fn path_param(&self, name: &str) -> Option<String> {
        self.param(name).cloned()
    }

    fn query(&self, name: &str) -> Option<String> {
        HttpRequest::query(self, name).cloned()
    }

    fn header(&self, name: &str) -> Option<String> {
        HttpRequest::header(self, name).cloned()
    }

    fn cookie(&self, name: &str) -> Option<String> {
        HttpRequest::cookie(self, name)
    }

    fn form_value(&self, name: &str) -> Option<String> {
        self.form_field(name)
    }

    async fn body(&self) -> Result<Bytes, Error> {
        Ok(Bytes::copy_from_slice(&self.body))
    }
}
