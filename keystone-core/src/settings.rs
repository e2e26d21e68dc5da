//! Dispatch settings.

use serde::{Deserialize, Serialize};

/// Settings consumed by the binder and the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Include server-side error messages in client responses.
    pub expose_internal_errors: bool,
    /// Upper bound for body payloads; `None` means unlimited.
    pub max_body_bytes: Option<usize>,
}

impl DispatchSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings suited to local development: internal errors are visible.
    pub fn development() -> Self {
        Self {
            expose_internal_errors: true,
            max_body_bytes: None,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    pub fn with_expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }
}
