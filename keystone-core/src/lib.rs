// Core library for the Keystone dispatch framework
// Metadata extraction, the route registry, parameter binding and dispatch.

pub mod app;
pub mod binder;
pub mod comments;
pub mod context;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod metadata;
pub mod registry;
pub mod reply;
pub mod settings;
pub mod tags;
pub mod transport;

// Re-export commonly used types
pub use app::{AppHandle, SharedState};
pub use binder::{Args, BoundValue, FromBound, ParameterBinder};
pub use comments::{CommentExtractor, ExtractedController, SourceManifest};
pub use context::{ContextHandle, RequestContext};
pub use controller::{Actions, Controller};
pub use dispatcher::{
    DispatchOutcome, DispatchState, Dispatcher, DispatcherBuilder, Middleware,
};
pub use error::*;
pub use http::*;
pub use metadata::{
    AnnotationSource, BodyType, ControllerDescriptor, ControllerKind, HttpMethod, ParamSource,
    ParamType, ParameterDescriptor, RouteDescriptor, TagMap,
};
pub use registry::{Registry, RegistrySnapshot, RouteKey};
pub use reply::{IntoReply, Reply};
pub use settings::DispatchSettings;
pub use tags::{Annotated, Marker, TagExtractor};
pub use transport::{HandlerFn, HandlerFuture, Route, Router, Transport};
