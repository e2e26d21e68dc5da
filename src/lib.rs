// Keystone - annotation-driven controller dispatch for Rust
//
// Route metadata comes from marker tags on controller types or from
// directives in their doc comments. Requests are bound to typed parameters
// and dispatched through a guarded controller lifecycle.

// Re-export core functionality
pub use keystone_core::*;

// Logging setup
pub use keystone_log as log;
pub use keystone_log::{LogConfig, LogFormat, LogLevel, LogOutput};

// Re-export optional crates
#[cfg(feature = "config")]
pub use keystone_config;

#[cfg(feature = "testing")]
pub use keystone_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Actions,
        Annotated,
        AppHandle,
        Args,
        CommentExtractor,
        ContextHandle,
        Controller,
        Dispatcher,
        Error,
        ErrorKind,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        Json,
        Marker,
        Middleware,
        ParamType,
        Registry,
        RequestContext,
        RouteDescriptor,
        Router,
        SourceManifest,
        TagExtractor,
        Transport,
    };

    #[cfg(feature = "config")]
    pub use keystone_config::{ConfigService, KeystoneConfig};

    #[cfg(feature = "testing")]
    pub use keystone_testing::{CallRecorder, TestClient};
}
