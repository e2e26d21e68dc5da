// Test assertions for dispatch responses

use crate::TestResponse;
use keystone_core::ErrorKind;

/// Assert that a response has a specific status code
pub fn assert_status(response: &TestResponse, expected: u16) {
    let actual = response.status();
    assert_eq!(
        actual, expected,
        "Expected status {}, got {} ({:?})",
        expected, actual, response
    );
}

/// Assert that a response body contains JSON matching expected value
pub fn assert_json<T>(response: &TestResponse, expected: &T)
where
    T: serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
{
    let actual: T = match response.body_json() {
        Ok(actual) => actual,
        Err(error) => panic!("Failed to deserialize response body: {}", error),
    };
    assert_eq!(actual, *expected, "JSON bodies do not match");
}

/// Assert that a response has a specific header
pub fn assert_header(response: &TestResponse, key: &str, expected: &str) {
    let actual = response.header(key).map(|s| s.as_str());
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        key,
        expected,
        actual
    );
}

/// Assert that a response failed with the given error kind.
pub fn assert_error_kind(response: &TestResponse, expected: ErrorKind) {
    let actual = response.error_kind();
    assert_eq!(
        actual.as_deref(),
        Some(expected.as_str()),
        "Expected error kind '{}', got {:?}",
        expected,
        actual
    );
}

/// Assert that a response body contains a string
pub fn assert_body_contains(response: &TestResponse, expected: &str) {
    let body = response.body_string().unwrap_or_default();
    assert!(
        body.contains(expected),
        "Expected body to contain '{}', but it didn't. Body: {}",
        expected,
        body
    );
}

/// Assert that a response is successful (2xx status)
pub fn assert_success(response: &TestResponse) {
    let status = response.status();
    assert!(
        (200..300).contains(&status),
        "Expected successful status (2xx), got {}",
        status
    );
}

/// Assert that a response is a client error (4xx status)
pub fn assert_client_error(response: &TestResponse) {
    let status = response.status();
    assert!(
        (400..500).contains(&status),
        "Expected client error status (4xx), got {}",
        status
    );
}

/// Assert that a response is a server error (5xx status)
pub fn assert_server_error(response: &TestResponse) {
    let status = response.status();
    assert!(
        (500..600).contains(&status),
        "Expected server error status (5xx), got {}",
        status
    );
}
