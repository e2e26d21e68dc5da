// Error types for the Keystone dispatch core

use crate::HttpResponse;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Coercion error: {0}")]
    Coercion(String),

    #[error("Invocation error: {0}")]
    Invocation(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Route not found: {0}")]
    RouteNotFound(String),
}

/// Classification of an [`Error`], used for logging and the client-visible
/// error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Metadata,
    Conflict,
    Validation,
    Coercion,
    Invocation,
    Serialization,
    Application,
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Metadata => "metadata",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Coercion => "coercion",
            ErrorKind::Invocation => "invocation",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Application => "application",
            ErrorKind::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Shorthand for an application error with an explicit status.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Error::Http {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(404, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(400, message)
    }

    /// Get the taxonomy kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Metadata(_) => ErrorKind::Metadata,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Coercion(_) => ErrorKind::Coercion,
            Error::Invocation(_) => ErrorKind::Invocation,
            Error::Deserialization(_) | Error::Serialization(_) => ErrorKind::Serialization,
            Error::Http { .. } => ErrorKind::Application,
            Error::RouteNotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::Coercion(_) | Error::Deserialization(_) => 400,
            Error::RouteNotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Http { status, .. } => *status,
            Error::Metadata(_) | Error::Invocation(_) | Error::Serialization(_) => 500,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// The message without the kind prefix added by `Display`.
    pub fn message(&self) -> &str {
        match self {
            Error::Metadata(m)
            | Error::Conflict(m)
            | Error::Validation(m)
            | Error::Coercion(m)
            | Error::Invocation(m)
            | Error::Deserialization(m)
            | Error::Serialization(m)
            | Error::RouteNotFound(m) => m,
            Error::Http { message, .. } => message,
        }
    }

    /// Render the uniform client-visible error response.
    ///
    /// Server-side messages are withheld unless `expose_internal` is set.
    pub fn to_response(&self, expose_internal: bool) -> HttpResponse {
        #[derive(Serialize)]
        struct Body<'a> {
            error: Detail<'a>,
        }

        #[derive(Serialize)]
        struct Detail<'a> {
            kind: ErrorKind,
            status: u16,
            message: &'a str,
        }

        let status = self.status_code();
        let message = if self.is_server_error() && !expose_internal {
            "internal server error"
        } else {
            self.message()
        };

        let body = Body {
            error: Detail {
                kind: self.kind(),
                status,
                message,
            },
        };

        match HttpResponse::new(status).with_json(&body) {
            Ok(response) => response,
            Err(_) => HttpResponse::new(status).with_body(message.as_bytes().to_vec()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_statuses() {
        assert_eq!(Error::Validation("x".into()).status_code(), 400);
        assert_eq!(Error::Coercion("x".into()).status_code(), 400);
        assert_eq!(Error::Invocation("x".into()).status_code(), 500);
        assert_eq!(Error::Conflict("x".into()).status_code(), 409);
        assert_eq!(Error::not_found("user").status_code(), 404);

        assert_eq!(
            Error::Deserialization("x".into()).kind(),
            ErrorKind::Serialization
        );
        assert_eq!(
            Error::Serialization("x".into()).kind(),
            ErrorKind::Serialization
        );
        assert!(Error::Serialization("x".into()).is_server_error());
        assert!(Error::Deserialization("x".into()).is_client_error());
    }

    #[test]
    fn test_response_shape() {
        let response = Error::Coercion("'abc' is not a valid i64".into()).to_response(false);
        assert_eq!(response.status, 400);

        let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(json["error"]["kind"], "coercion");
        assert_eq!(json["error"]["status"], 400);
        assert_eq!(json["error"]["message"], "'abc' is not a valid i64");
    }

    #[test]
    fn test_internal_message_hidden() {
        let err = Error::Invocation("action 'show' panicked: boom".into());

        let hidden = err.to_response(false);
        let json: serde_json::Value = serde_json::from_slice(&hidden.body).unwrap();
        assert_eq!(json["error"]["message"], "internal server error");

        let exposed = err.to_response(true);
        let json: serde_json::Value = serde_json::from_slice(&exposed.body).unwrap();
        assert_eq!(json["error"]["message"], "action 'show' panicked: boom");
    }
}
