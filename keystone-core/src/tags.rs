//! Structural tag extraction and the fluent route builder.
//!
//! Controller-level metadata comes from a closed set of [`Marker`]s attached
//! to the type through [`Annotated`]. Route-level metadata is never inferred;
//! the application declares each action explicitly at startup:
//!
//! ```no_run
//! use keystone_core::tags::{Annotated, Marker, TagExtractor};
//! use keystone_core::{HttpMethod, ParamType, Registry};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct UserController;
//!
//! impl Annotated for UserController {
//!     const MARKERS: &'static [Marker] =
//!         &[Marker::RestController, Marker::RequestMapping("/users")];
//! }
//!
//! # fn main() -> Result<(), keystone_core::Error> {
//! let registry = Arc::new(Registry::new());
//! let users = TagExtractor::new(registry.clone()).controller::<UserController>()?;
//! users
//!     .route(HttpMethod::GET, "show", "/:id")
//!     .path_param("id", ParamType::I64)
//!     .query("verbose", ParamType::Bool, false, Some("false"))
//!     .register()?;
//! # Ok(())
//! # }
//! ```

use crate::metadata::{
    normalize_base_path, AnnotationSource, BodyType, ControllerDescriptor, ControllerKind,
    HttpMethod, ParamSource, ParamType, ParameterDescriptor, RouteDescriptor,
};
use crate::{Error, Registry};
use std::sync::Arc;

/// Closed vocabulary of controller-level markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    RestController,
    Controller,
    /// Base path shared by every route of the controller.
    RequestMapping(&'static str),
    Service,
    Repository,
    Component,
    /// Free-form key/value tag.
    Tag(&'static str, &'static str),
}

impl Marker {
    fn kind(&self) -> Option<(ControllerKind, Option<&'static str>)> {
        match self {
            Marker::RestController => Some((ControllerKind::Rest, None)),
            Marker::Controller => Some((ControllerKind::Mvc, None)),
            Marker::Service => Some((ControllerKind::Component, Some("service"))),
            Marker::Repository => Some((ControllerKind::Component, Some("repository"))),
            Marker::Component => Some((ControllerKind::Component, Some("component"))),
            Marker::RequestMapping(_) | Marker::Tag(..) => None,
        }
    }
}

/// Markers attached to a type.
pub trait Annotated {
    const MARKERS: &'static [Marker];
}

/// Build the controller descriptor for a tagged type.
pub fn extract_controller<C: Annotated + ?Sized>() -> Result<ControllerDescriptor, Error> {
    let type_path = std::any::type_name::<C>();

    let mut kind: Option<(ControllerKind, Option<&'static str>)> = None;
    let mut base_path: Option<&'static str> = None;
    let mut tags = Vec::new();

    for marker in C::MARKERS {
        if let Some(found) = marker.kind() {
            match kind {
                Some(existing) if existing != found => {
                    return Err(Error::Metadata(format!(
                        "{} carries conflicting kind markers",
                        type_path
                    )));
                }
                _ => kind = Some(found),
            }
            continue;
        }

        match marker {
            Marker::RequestMapping(path) => {
                if base_path.replace(path).is_some() {
                    return Err(Error::Metadata(format!(
                        "{} carries more than one RequestMapping marker",
                        type_path
                    )));
                }
            }
            Marker::Tag(key, value) => tags.push((*key, *value)),
            _ => {}
        }
    }

    let Some((kind, stereotype)) = kind else {
        return Err(Error::Metadata(format!(
            "{} has no controller or component marker",
            type_path
        )));
    };

    let base_path = normalize_base_path(base_path.unwrap_or(""))
        .map_err(|e| Error::Metadata(format!("{}: {}", type_path, e.message())))?;

    let mut descriptor =
        ControllerDescriptor::for_type_path(type_path, kind, AnnotationSource::StructuralTag)
            .with_base_path(base_path);
    if let Some(stereotype) = stereotype {
        descriptor
            .tags
            .insert("stereotype".to_string(), stereotype.to_string());
    }
    for (key, value) in tags {
        descriptor.tags.insert(key.to_string(), value.to_string());
    }

    Ok(descriptor)
}

/// Entry point of tag-based registration.
#[derive(Clone)]
pub struct TagExtractor {
    registry: Arc<Registry>,
}

impl TagExtractor {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Extract and register a tagged controller.
    pub fn controller<C: Annotated + ?Sized>(&self) -> Result<ControllerHandle, Error> {
        let descriptor = extract_controller::<C>()?;
        let controller = self.registry.merge_controller(descriptor)?;
        Ok(ControllerHandle {
            registry: self.registry.clone(),
            controller,
        })
    }

    /// Register a controller without markers.
    pub fn manual_controller(
        &self,
        namespace: &str,
        type_name: &str,
        kind: ControllerKind,
        base_path: &str,
    ) -> Result<ControllerHandle, Error> {
        let descriptor =
            ControllerDescriptor::new(namespace, type_name, kind, AnnotationSource::Manual)
                .with_base_path(normalize_base_path(base_path)?);
        let controller = self.registry.register_controller(descriptor)?;
        Ok(ControllerHandle {
            registry: self.registry.clone(),
            controller,
        })
    }
}

/// A registered controller that routes can be declared on.
#[derive(Clone)]
pub struct ControllerHandle {
    registry: Arc<Registry>,
    controller: Arc<ControllerDescriptor>,
}

impl ControllerHandle {
    pub fn descriptor(&self) -> &ControllerDescriptor {
        &self.controller
    }

    /// Start declaring one action.
    pub fn route(&self, method: HttpMethod, action: &str, suffix: &str) -> RouteBuilder {
        let mut route = RouteDescriptor::new(
            method,
            self.controller.qualified_name(),
            action,
            suffix,
            AnnotationSource::Manual,
        );
        route.base_path = self.controller.base_path.clone();

        RouteBuilder {
            registry: self.registry.clone(),
            route,
        }
    }

    pub fn get(&self, action: &str, suffix: &str) -> RouteBuilder {
        self.route(HttpMethod::GET, action, suffix)
    }

    pub fn post(&self, action: &str, suffix: &str) -> RouteBuilder {
        self.route(HttpMethod::POST, action, suffix)
    }

    pub fn put(&self, action: &str, suffix: &str) -> RouteBuilder {
        self.route(HttpMethod::PUT, action, suffix)
    }

    pub fn delete(&self, action: &str, suffix: &str) -> RouteBuilder {
        self.route(HttpMethod::DELETE, action, suffix)
    }

    pub fn patch(&self, action: &str, suffix: &str) -> RouteBuilder {
        self.route(HttpMethod::PATCH, action, suffix)
    }
}

/// Fluent declaration of one route. Nothing is published until
/// [`RouteBuilder::register`] succeeds.
#[must_use = "a route is only published by calling register()"]
pub struct RouteBuilder {
    registry: Arc<Registry>,
    route: RouteDescriptor,
}

impl RouteBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.route.description = Some(description.into());
        self
    }

    /// Append a fully specified parameter.
    pub fn param(mut self, param: ParameterDescriptor) -> Self {
        self.route.params.push(param);
        self
    }

    /// A required path segment.
    pub fn path_param(self, name: &str, param_type: ParamType) -> Self {
        self.param(ParameterDescriptor::path(name, param_type))
    }

    /// A query parameter. A default makes the parameter optional.
    pub fn query(
        self,
        name: &str,
        param_type: ParamType,
        required: bool,
        default_value: Option<&str>,
    ) -> Self {
        self.param(sourced(
            name,
            ParamSource::Query,
            param_type,
            required,
            default_value,
        ))
    }

    pub fn form(self, name: &str, param_type: ParamType, required: bool) -> Self {
        self.param(sourced(name, ParamSource::Form, param_type, required, None))
    }

    pub fn header(self, name: &str, param_type: ParamType, required: bool) -> Self {
        self.param(sourced(name, ParamSource::Header, param_type, required, None))
    }

    pub fn cookie(self, name: &str, param_type: ParamType, required: bool) -> Self {
        self.param(sourced(name, ParamSource::Cookie, param_type, required, None))
    }

    /// A required body decoded into `T`.
    pub fn body<T>(self, name: &str) -> Self
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        self.param(ParameterDescriptor::new(
            name,
            ParamSource::Body,
            ParamType::Body(BodyType::typed::<T>()),
        ))
    }

    /// A body bound as a `serde_json::Value`.
    pub fn body_json(self, name: &str, required: bool) -> Self {
        self.param(
            ParameterDescriptor::new(
                name,
                ParamSource::Body,
                ParamType::Body(BodyType::untyped("Value")),
            )
            .required(required),
        )
    }

    /// Bind the request context itself.
    pub fn context(self, name: &str) -> Self {
        self.param(ParameterDescriptor::context(name))
    }

    pub fn middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.route.middleware.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.route.tags.insert(key.into(), value.into());
        self
    }

    /// The descriptor as declared so far.
    pub fn descriptor(&self) -> &RouteDescriptor {
        &self.route
    }

    /// Validate and publish the route.
    pub fn register(self) -> Result<Arc<RouteDescriptor>, Error> {
        self.registry.register(self.route)
    }
}

fn sourced(
    name: &str,
    source: ParamSource,
    param_type: ParamType,
    required: bool,
    default_value: Option<&str>,
) -> ParameterDescriptor {
    let param = ParameterDescriptor::new(name, source, param_type).required(required);
    match default_value {
        Some(value) => param.default_value(value),
        None => param,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Default)]
    struct UserController;

    impl Annotated for UserController {
        const MARKERS: &'static [Marker] = &[
            Marker::RestController,
            Marker::RequestMapping("/users/"),
            Marker::Tag("team", "identity"),
        ];
    }

    struct Untagged;

    impl Annotated for Untagged {
        const MARKERS: &'static [Marker] = &[Marker::RequestMapping("/x")];
    }

    struct Confused;

    impl Annotated for Confused {
        const MARKERS: &'static [Marker] = &[Marker::RestController, Marker::Service];
    }

    struct TwoBases;

    impl Annotated for TwoBases {
        const MARKERS: &'static [Marker] = &[
            Marker::Controller,
            Marker::RequestMapping("/a"),
            Marker::RequestMapping("/b"),
        ];
    }

    struct Billing;

    impl Annotated for Billing {
        const MARKERS: &'static [Marker] = &[Marker::Service];
    }

    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct NewUser {
        name: String,
    }

    #[test]
    fn test_extract_controller() {
        let descriptor = extract_controller::<UserController>().unwrap();
        assert_eq!(descriptor.type_name, "UserController");
        assert_eq!(descriptor.kind, ControllerKind::Rest);
        assert_eq!(descriptor.base_path, "/users");
        assert_eq!(descriptor.source, AnnotationSource::StructuralTag);
        assert_eq!(descriptor.tags.get("team").map(String::as_str), Some("identity"));
        assert!(descriptor.namespace.ends_with("tags::tests"));
    }

    #[test]
    fn test_extract_component_stereotype() {
        let descriptor = extract_controller::<Billing>().unwrap();
        assert_eq!(descriptor.kind, ControllerKind::Component);
        assert_eq!(
            descriptor.tags.get("stereotype").map(String::as_str),
            Some("service")
        );
        assert_eq!(descriptor.base_path, "");
    }

    #[test]
    fn test_extract_errors() {
        assert!(matches!(
            extract_controller::<Untagged>(),
            Err(Error::Metadata(_))
        ));
        assert!(matches!(
            extract_controller::<Confused>(),
            Err(Error::Metadata(_))
        ));
        assert!(matches!(
            extract_controller::<TwoBases>(),
            Err(Error::Metadata(_))
        ));
    }

    #[test]
    fn test_builder_round_trip() {
        let registry = Arc::new(Registry::new());
        let users = TagExtractor::new(registry.clone())
            .controller::<UserController>()
            .unwrap();

        users
            .get("show", "/{id}")
            .description("Fetch one user")
            .path_param("id", ParamType::I64)
            .query("verbose", ParamType::Bool, false, Some("false"))
            .header("X-Tenant", ParamType::String, true)
            .cookie("session", ParamType::String, false)
            .middleware(["auth"])
            .tag("audit", "read")
            .register()
            .unwrap();

        let route = registry
            .route(&users.descriptor().qualified_name(), "show")
            .unwrap();
        assert_eq!(route.full_path(), "/users/:id");
        assert_eq!(route.source, AnnotationSource::Manual);
        assert_eq!(route.middleware, vec!["auth".to_string()]);

        let names: Vec<_> = route.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["id", "verbose", "X-Tenant", "session"]);

        let verbose = route.param("verbose").unwrap();
        assert_eq!(verbose.source, ParamSource::Query);
        assert!(!verbose.required);
        assert_eq!(verbose.default_value.as_deref(), Some("false"));

        let tenant = route.param("X-Tenant").unwrap();
        assert_eq!(tenant.source, ParamSource::Header);
        assert!(tenant.required);
        assert!(tenant.default_value.is_none());
    }

    #[test]
    fn test_builder_body_and_conflicts() {
        let registry = Arc::new(Registry::new());
        let users = TagExtractor::new(registry.clone())
            .controller::<UserController>()
            .unwrap();

        users
            .post("create", "")
            .body::<NewUser>("user")
            .register()
            .unwrap();

        let duplicate_action = users.post("create", "/again").register();
        assert!(matches!(duplicate_action, Err(Error::Conflict(_))));

        let duplicate_endpoint = users.post("create_again", "/").register();
        assert!(matches!(duplicate_endpoint, Err(Error::Conflict(_))));

        let two_bodies = users
            .put("replace", "/:id")
            .body::<NewUser>("a")
            .body_json("b", true)
            .register();
        assert!(matches!(two_bodies, Err(Error::Metadata(_))));
        assert!(registry
            .route(&users.descriptor().qualified_name(), "replace")
            .is_none());
    }

    #[test]
    fn test_invalid_default_rejected_at_registration() {
        let registry = Arc::new(Registry::new());
        let users = TagExtractor::new(registry.clone())
            .controller::<UserController>()
            .unwrap();

        let bad = users
            .get("list", "")
            .query("page", ParamType::I32, false, Some("abc"))
            .register();
        assert!(matches!(bad, Err(Error::Metadata(_))));
        assert!(registry.is_empty());

        let flag = users
            .get("list", "")
            .query("active", ParamType::Bool, false, Some("maybe"))
            .register();
        assert!(matches!(flag, Err(Error::Metadata(_))));

        users
            .get("list", "")
            .query("page", ParamType::I32, false, Some(" 3 "))
            .query("tags", ParamType::StringList, false, Some("a,b"))
            .register()
            .unwrap();
    }

    #[test]
    fn test_manual_controller() {
        let registry = Arc::new(Registry::new());
        let health = TagExtractor::new(registry.clone())
            .manual_controller("ops", "Health", ControllerKind::Rest, "health")
            .unwrap();
        assert_eq!(health.descriptor().base_path, "/health");

        let route = health.get("ping", "").register().unwrap();
        assert_eq!(route.controller, "ops::Health");
        assert_eq!(route.full_path(), "/health");
    }
}
