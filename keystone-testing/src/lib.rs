//! Testing utilities for Keystone controllers.
//!
//! - **TestClient** drives a [`Router`](keystone_core::Router) in memory
//! - **Assertions** for status, headers, JSON bodies and error kinds
//! - **CallRecorder** logs lifecycle and action calls across a dispatch
//!
//! ## Quick Start
//!
//! ```
//! use keystone_core::{HandlerFuture, HttpMethod, HttpRequest, HttpResponse, Router, Transport};
//! use keystone_testing::*;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut router = Router::new();
//! router.add_route(
//!     HttpMethod::GET,
//!     "/hello",
//!     Arc::new(|_req: HttpRequest| -> HandlerFuture {
//!         Box::pin(async { Ok(HttpResponse::ok().with_text("Hello!")) })
//!     }),
//! );
//!
//! let client = TestClient::new(router);
//! let response = client.get("/hello").await;
//! assert_status(&response, 200);
//! assert_eq!(response.body_string(), Some("Hello!".to_string()));
//! # });
//! ```
//!
//! ## Recording Lifecycle Calls
//!
//! ```
//! use keystone_testing::CallRecorder;
//!
//! let recorder = CallRecorder::new();
//! recorder.record("init");
//! recorder.record("finish");
//!
//! assert_eq!(recorder.count("finish"), 1);
//! recorder.assert_sequence(&["init", "finish"]);
//! ```

mod assertions;
mod recorder;
mod test_client;

pub use assertions::{
    assert_body_contains, assert_client_error, assert_error_kind, assert_header, assert_json,
    assert_server_error, assert_status, assert_success,
};
pub use recorder::CallRecorder;
pub use test_client::{TestClient, TestRequestBuilder, TestResponse};

// Re-export common testing utilities
pub use tokio::test as tokio_test;
