//! Route registry.
//!
//! The registry is the single owner of every descriptor built at startup.
//! All state sits behind one readers-writer lock; each mutation is a single
//! write-locked critical section, so readers only ever observe fully
//! assembled descriptors.

use crate::metadata::{ControllerDescriptor, HttpMethod, RouteDescriptor};
use crate::Error;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry key of a route: declaring controller plus action name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct RouteKey {
    pub controller: String,
    pub action: String,
}

impl RouteKey {
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
        }
    }

    pub fn of(route: &RouteDescriptor) -> Self {
        Self::new(route.controller.clone(), route.action.clone())
    }
}

#[derive(Clone, Default)]
struct RegistryInner {
    routes: HashMap<RouteKey, Arc<RouteDescriptor>>,
    endpoints: HashMap<(HttpMethod, String), RouteKey>,
    controllers: HashMap<String, Arc<ControllerDescriptor>>,
    order: Vec<RouteKey>,
    controller_order: Vec<String>,
}

/// A path with parameter names erased: `/users/:id` and `/users/:uid`
/// both become `/users/:`.
fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| if segment.starts_with(':') { ":" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

fn methods_overlap(a: HttpMethod, b: HttpMethod) -> bool {
    a == b || a == HttpMethod::ANY || b == HttpMethod::ANY
}

impl RegistryInner {
    fn put_route(&mut self, route: RouteDescriptor) -> Option<Arc<RouteDescriptor>> {
        let key = RouteKey::of(&route);
        let endpoint = (route.method, route.full_path());
        let previous = self.routes.insert(key.clone(), Arc::new(route));

        match &previous {
            Some(old) => {
                let old_endpoint = (old.method, old.full_path());
                if self.endpoints.get(&old_endpoint) == Some(&key) {
                    self.endpoints.remove(&old_endpoint);
                }
            }
            None => self.order.push(key.clone()),
        }

        // Last write wins for the endpoint as well; the displaced route
        // stays reachable by key only.
        self.endpoints.insert(endpoint, key);
        previous
    }

    fn put_controller(&mut self, controller: ControllerDescriptor) -> Option<Arc<ControllerDescriptor>> {
        let name = controller.qualified_name();
        let previous = self.controllers.insert(name.clone(), Arc::new(controller));
        if previous.is_none() {
            self.controller_order.push(name);
        }
        previous
    }

    /// A registered route answering the same requests as `method` on `full_path`.
    fn overlapping(&self, method: HttpMethod, full_path: &str) -> Option<&RouteKey> {
        let shape = path_shape(full_path);
        self.endpoints
            .iter()
            .find(|((m, path), _)| methods_overlap(*m, method) && path_shape(path) == shape)
            .map(|(_, key)| key)
    }

    fn add_route(&mut self, route: RouteDescriptor) -> Result<Arc<RouteDescriptor>, Error> {
        let key = RouteKey::of(&route);
        let endpoint = (route.method, route.full_path());

        if !self.controllers.contains_key(&route.controller) {
            return Err(Error::Metadata(format!(
                "route {}::{} targets unknown controller type",
                route.controller, route.action
            )));
        }
        if self.routes.contains_key(&key) {
            return Err(Error::Conflict(format!(
                "action {}::{} is already registered",
                key.controller, key.action
            )));
        }
        if let Some(existing) = self.overlapping(endpoint.0, &endpoint.1) {
            return Err(Error::Conflict(format!(
                "{} {} overlaps {}::{}",
                endpoint.0, endpoint.1, existing.controller, existing.action
            )));
        }

        tracing::debug!(
            controller = %route.controller,
            action = %route.action,
            method = %route.method,
            path = %endpoint.1,
            source = ?route.source,
            "Registering route"
        );

        let route = Arc::new(route);
        self.routes.insert(key.clone(), route.clone());
        self.endpoints.insert(endpoint, key.clone());
        self.order.push(key);
        Ok(route)
    }

    fn merge_controller(
        &mut self,
        controller: ControllerDescriptor,
    ) -> Result<Arc<ControllerDescriptor>, Error> {
        let name = controller.qualified_name();

        let Some(existing) = self.controllers.get(&name).cloned() else {
            self.put_controller(controller);
            return self
                .controllers
                .get(&name)
                .cloned()
                .ok_or_else(|| Error::Metadata(format!("controller {} vanished", name)));
        };

        let source = existing.source.merge(controller.source);
        if source == existing.source {
            return Err(Error::Conflict(format!(
                "controller {} is already registered",
                name
            )));
        }
        if existing.kind != controller.kind {
            return Err(Error::Metadata(format!(
                "controller {} is declared as {:?} and {:?}",
                name, existing.kind, controller.kind
            )));
        }
        if !existing.base_path.is_empty()
            && !controller.base_path.is_empty()
            && existing.base_path != controller.base_path
        {
            return Err(Error::Conflict(format!(
                "controller {} has base paths '{}' and '{}'",
                name, existing.base_path, controller.base_path
            )));
        }

        let mut merged = (*existing).clone();
        if merged.base_path.is_empty() {
            merged.base_path = controller.base_path;
        }
        for (key, value) in controller.tags {
            merged.tags.entry(key).or_insert(value);
        }
        merged.source = source;

        tracing::debug!(
            controller = %name,
            source = ?merged.source,
            "Merged controller metadata"
        );

        let merged = Arc::new(merged);
        self.controllers.insert(name, merged.clone());
        Ok(merged)
    }
}

/// Concurrency-safe store of all controller and route descriptors.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a route. Always succeeds; returns the replaced route.
    pub fn insert(&self, route: RouteDescriptor) -> Option<Arc<RouteDescriptor>> {
        tracing::debug!(
            controller = %route.controller,
            action = %route.action,
            method = %route.method,
            path = %route.full_path(),
            "Inserting route"
        );
        self.inner.write().put_route(route)
    }

    /// Register a route, failing on conflicts instead of overwriting.
    ///
    /// The route must be structurally valid and its controller must already
    /// be registered. A second route for the same (controller, action)
    /// raises [`Error::Conflict`], as does a route answering the same
    /// requests as an existing one: `ANY` overlaps every verb and path
    /// parameters match regardless of their names.
    pub fn register(&self, route: RouteDescriptor) -> Result<Arc<RouteDescriptor>, Error> {
        route.validate()?;
        self.inner.write().add_route(route)
    }

    /// Insert or replace a controller descriptor.
    pub fn insert_controller(&self, controller: ControllerDescriptor) -> Option<Arc<ControllerDescriptor>> {
        self.inner.write().put_controller(controller)
    }

    /// Register a controller, failing if one with the same name exists.
    pub fn register_controller(
        &self,
        controller: ControllerDescriptor,
    ) -> Result<Arc<ControllerDescriptor>, Error> {
        let name = controller.qualified_name();
        let mut inner = self.inner.write();
        if inner.controllers.contains_key(&name) {
            return Err(Error::Conflict(format!(
                "controller {} is already registered",
                name
            )));
        }

        tracing::debug!(
            controller = %name,
            kind = ?controller.kind,
            base_path = %controller.base_path,
            source = ?controller.source,
            "Registering controller"
        );

        inner.put_controller(controller);
        inner
            .controllers
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::Metadata(format!("controller {} vanished", name)))
    }

    /// Register a controller, merging with a descriptor of the same type that
    /// a different extraction strategy already registered.
    ///
    /// The merged descriptor is marked [`AnnotationSource::Hybrid`]. Kinds
    /// must agree and at most one side may set a different base path.
    /// A registration that adds no new source is a [`Error::Conflict`].
    ///
    /// [`AnnotationSource::Hybrid`]: crate::metadata::AnnotationSource::Hybrid
    pub fn merge_controller(
        &self,
        controller: ControllerDescriptor,
    ) -> Result<Arc<ControllerDescriptor>, Error> {
        self.inner.write().merge_controller(controller)
    }

    /// Merge a batch of controllers and register their routes as one unit.
    ///
    /// Each route takes the base path of its merged controller. On the first
    /// error nothing from the batch is published.
    pub fn publish(
        &self,
        batch: Vec<(ControllerDescriptor, Vec<RouteDescriptor>)>,
    ) -> Result<Vec<Arc<RouteDescriptor>>, Error> {
        let mut inner = self.inner.write();
        let mut staged = inner.clone();

        let mut published = Vec::new();
        for (controller, routes) in batch {
            let controller = staged.merge_controller(controller)?;
            for mut route in routes {
                route.base_path = controller.base_path.clone();
                route.validate()?;
                published.push(staged.add_route(route)?);
            }
        }

        *inner = staged;
        Ok(published)
    }

    /// Look up one route by declaring type and action name.
    pub fn route(&self, controller: &str, action: &str) -> Option<Arc<RouteDescriptor>> {
        self.inner
            .read()
            .routes
            .get(&RouteKey::new(controller, action))
            .cloned()
    }

    /// Look up the route serving a method and full path.
    pub fn endpoint(&self, method: HttpMethod, full_path: &str) -> Option<Arc<RouteDescriptor>> {
        let inner = self.inner.read();
        let key = inner.endpoints.get(&(method, full_path.to_string()))?;
        inner.routes.get(key).cloned()
    }

    /// All routes declared by one controller, in registration order.
    pub fn routes_for(&self, controller: &str) -> Vec<Arc<RouteDescriptor>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter(|key| key.controller == controller)
            .filter_map(|key| inner.routes.get(key).cloned())
            .collect()
    }

    /// Every registered route, in registration order.
    pub fn routes(&self) -> Vec<Arc<RouteDescriptor>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|key| inner.routes.get(key).cloned())
            .collect()
    }

    pub fn controller(&self, name: &str) -> Option<Arc<ControllerDescriptor>> {
        self.inner.read().controllers.get(name).cloned()
    }

    /// Every registered controller, in registration order.
    pub fn controllers(&self) -> Vec<Arc<ControllerDescriptor>> {
        let inner = self.inner.read();
        inner
            .controller_order
            .iter()
            .filter_map(|name| inner.controllers.get(name).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A consistent, serializable view for diagnostics tooling.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.inner.read();
        RegistrySnapshot {
            controllers: inner
                .controller_order
                .iter()
                .filter_map(|name| inner.controllers.get(name))
                .map(|c| (**c).clone())
                .collect(),
            routes: inner
                .order
                .iter()
                .filter_map(|key| inner.routes.get(key))
                .map(|route| RouteSummary {
                    full_path: route.full_path(),
                    route: (**route).clone(),
                })
                .collect(),
        }
    }
}

/// Serializable registry contents.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub controllers: Vec<ControllerDescriptor>,
    pub routes: Vec<RouteSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub full_path: String,
    #[serde(flatten)]
    pub route: RouteDescriptor,
}
