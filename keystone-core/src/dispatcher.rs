//! Per-request dispatch.
//!
//! Every dispatch walks the same state machine:
//!
//! ```text
//! Created → Initialized → Prepared → (ParamsBound | ValidationFailed)
//!         → (Invoked | InvocationError) → (ResultMapped | ErrorMapped) → Finished
//! ```
//!
//! A fresh controller is created per request. A panic anywhere between
//! creation and `finish`, including middleware and body reads, is caught and
//! classified as an invocation error. `finish` runs exactly once whenever an
//! instance exists, and every failure leaves as the uniform error response.

use crate::app::{AppHandle, SharedState};
use crate::binder::ParameterBinder;
use crate::context::ContextHandle;
use crate::controller::{Controller, ControllerSlot, LiveController, Slot};
use crate::error::ErrorKind;
use crate::metadata::RouteDescriptor;
use crate::transport::{HandlerFuture, Transport};
use crate::{DispatchSettings, Error, HttpRequest, HttpResponse, Registry};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// States of one dispatch, in the order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Created,
    Initialized,
    Prepared,
    ParamsBound,
    ValidationFailed,
    Invoked,
    InvocationError,
    ResultMapped,
    ErrorMapped,
    Finished,
}

/// Result of a traced dispatch.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub response: HttpResponse,
    /// Every state visited, in order.
    pub states: Vec<DispatchState>,
    /// Set when the dispatch ended in the error path.
    pub error_kind: Option<ErrorKind>,
}

/// A named check run before parameter binding.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Reject the request by returning an error.
    async fn before(&self, ctx: &ContextHandle, route: &RouteDescriptor) -> Result<(), Error>;
}

fn panicked(stage: &str, payload: Box<dyn Any + Send>) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    Error::Invocation(format!("{} panicked: {}", stage, message))
}

/// Run `f`, turning a panic into an invocation error.
fn guard<T>(stage: &str, f: impl FnOnce() -> T) -> Result<T, Error> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panicked(stage, payload))
}

/// Await `fut`, turning a panic while polling into an invocation error.
async fn guard_async<T>(stage: &str, fut: impl Future<Output = T>) -> Result<T, Error> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| panicked(stage, payload))
}

struct Trace {
    states: Vec<DispatchState>,
}

impl Trace {
    fn new() -> Self {
        tracing::trace!(state = ?DispatchState::Created, "Dispatch state");
        Self {
            states: vec![DispatchState::Created],
        }
    }

    fn enter(&mut self, state: DispatchState) {
        tracing::trace!(state = ?state, "Dispatch state");
        self.states.push(state);
    }
}

/// Builds a [`Dispatcher`] and checks it against the registry.
pub struct DispatcherBuilder {
    registry: Arc<Registry>,
    controllers: HashMap<String, Arc<dyn ControllerSlot>>,
    middleware: HashMap<String, Arc<dyn Middleware>>,
    settings: DispatchSettings,
    state: SharedState,
}

impl DispatcherBuilder {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            controllers: HashMap::new(),
            middleware: HashMap::new(),
            settings: DispatchSettings::default(),
            state: SharedState::new(),
        }
    }

    /// Mount a controller type; its routes are keyed by its type path.
    pub fn mount<C: Controller>(mut self) -> Self {
        let name = std::any::type_name::<C>();
        tracing::debug!(controller = %name, "Mounting controller");
        self.controllers
            .insert(name.to_string(), Arc::new(Slot::<C>::new()));
        self
    }

    pub fn middleware(
        mut self,
        name: impl Into<String>,
        middleware: impl Middleware + 'static,
    ) -> Self {
        self.middleware.insert(name.into(), Arc::new(middleware));
        self
    }

    pub fn settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Shared state reachable from `init` through [`AppHandle::state`].
    pub fn state<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.state.insert(value);
        self
    }

    /// Verify every registered route can be served and build the dispatcher.
    pub fn build(self) -> Result<Dispatcher, Error> {
        for route in self.registry.routes() {
            let Some(slot) = self.controllers.get(&route.controller) else {
                return Err(Error::Metadata(format!(
                    "route {}::{} targets a controller that is not mounted",
                    route.controller, route.action
                )));
            };
            if !slot.has_action(&route.action) {
                return Err(Error::Metadata(format!(
                    "{} declares no action named '{}'",
                    route.controller, route.action
                )));
            }
            if let Some(unknown) = route
                .middleware
                .iter()
                .find(|name| !self.middleware.contains_key(*name))
            {
                return Err(Error::Metadata(format!(
                    "route {}::{} uses unknown middleware '{}'",
                    route.controller, route.action, unknown
                )));
            }
        }

        tracing::info!(
            controllers = self.controllers.len(),
            routes = self.registry.len(),
            middleware = self.middleware.len(),
            "Dispatcher ready"
        );

        Ok(Dispatcher {
            binder: ParameterBinder::from_settings(&self.settings),
            app: AppHandle::new(self.state, self.registry.clone(), self.settings.clone()),
            registry: self.registry,
            controllers: self.controllers,
            middleware: self.middleware,
            settings: self.settings,
        })
    }
}

/// Orchestrates the lifecycle of one request against one route.
pub struct Dispatcher {
    registry: Arc<Registry>,
    controllers: HashMap<String, Arc<dyn ControllerSlot>>,
    middleware: HashMap<String, Arc<dyn Middleware>>,
    binder: ParameterBinder,
    settings: DispatchSettings,
    app: AppHandle,
}

impl Dispatcher {
    pub fn builder(registry: Arc<Registry>) -> DispatcherBuilder {
        DispatcherBuilder::new(registry)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn app(&self) -> &AppHandle {
        &self.app
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Dispatch one request and return the response.
    pub async fn dispatch(&self, route: &RouteDescriptor, ctx: ContextHandle) -> HttpResponse {
        self.dispatch_traced(route, ctx).await.response
    }

    /// Dispatch one request and report the visited states.
    pub async fn dispatch_traced(
        &self,
        route: &RouteDescriptor,
        ctx: ContextHandle,
    ) -> DispatchOutcome {
        let span = tracing::debug_span!(
            "dispatch",
            id = %Uuid::new_v4(),
            controller = %route.controller,
            action = %route.action,
        );
        self.run(route, ctx).instrument(span).await
    }

    async fn run(&self, route: &RouteDescriptor, ctx: ContextHandle) -> DispatchOutcome {
        let mut trace = Trace::new();

        let live = match self.controllers.get(&route.controller) {
            Some(slot) => guard("constructor", || slot.create()),
            None => Err(Error::Invocation(format!(
                "no controller mounted for {}",
                route.controller
            ))),
        };
        let mut live = match live {
            Ok(live) => live,
            Err(err) => return self.fail(trace, err),
        };

        let result = self.drive(route, &ctx, live.as_mut(), &mut trace).await;
        let finished = guard("finish", || live.finish());

        let outcome = match (result, finished) {
            (Ok(response), Ok(())) => {
                trace.enter(DispatchState::Finished);
                DispatchOutcome {
                    response,
                    states: trace.states,
                    error_kind: None,
                }
            }
            // `finish` ran exactly once either way; only the first error is
            // reported.
            (Err(err), _) | (Ok(_), Err(err)) => self.fail(trace, err),
        };

        tracing::debug!(status = outcome.response.status, "Dispatch complete");
        outcome
    }

    /// Everything between creation and `finish`.
    async fn drive(
        &self,
        route: &RouteDescriptor,
        ctx: &ContextHandle,
        live: &mut dyn LiveController,
        trace: &mut Trace,
    ) -> Result<HttpResponse, Error> {
        guard("init", || {
            live.init(ctx.clone(), &route.controller, &route.action, &self.app)
        })?;
        trace.enter(DispatchState::Initialized);

        guard("prepare", || live.prepare())??;
        trace.enter(DispatchState::Prepared);

        for name in &route.middleware {
            let middleware = self.middleware.get(name).ok_or_else(|| {
                Error::Invocation(format!("middleware '{}' is not registered", name))
            })?;
            guard_async("middleware", middleware.before(ctx, route)).await??;
        }

        let mut args = match guard_async("binder", self.binder.bind(route, ctx)).await {
            Ok(Ok(args)) => {
                trace.enter(DispatchState::ParamsBound);
                args
            }
            Ok(Err(err)) => {
                trace.enter(DispatchState::ValidationFailed);
                return Err(err);
            }
            Err(err) => {
                trace.enter(DispatchState::InvocationError);
                return Err(err);
            }
        };

        let reply = match guard("action", || live.invoke(&route.action, &mut args)) {
            Ok(Ok(reply)) => {
                trace.enter(DispatchState::Invoked);
                reply
            }
            Ok(Err(err @ Error::Invocation(_))) | Err(err) => {
                trace.enter(DispatchState::InvocationError);
                return Err(err);
            }
            Ok(Err(err)) => {
                trace.enter(DispatchState::Invoked);
                return Err(err);
            }
        };

        let response = reply.into_response()?;
        trace.enter(DispatchState::ResultMapped);
        Ok(response)
    }

    fn fail(&self, mut trace: Trace, err: Error) -> DispatchOutcome {
        let kind = err.kind();
        if err.is_server_error() {
            tracing::error!(kind = %kind, error = %err, "Dispatch failed");
        } else {
            tracing::warn!(kind = %kind, error = %err, "Dispatch rejected");
        }

        trace.enter(DispatchState::ErrorMapped);
        trace.enter(DispatchState::Finished);

        DispatchOutcome {
            response: err.to_response(self.settings.expose_internal_errors),
            states: trace.states,
            error_kind: Some(kind),
        }
    }

    /// Register one handler per registry route with a transport.
    pub fn mount_routes<T: Transport>(self: &Arc<Self>, transport: &mut T) {
        for route in self.registry.routes() {
            let dispatcher = Arc::clone(self);
            let handler_route = route.clone();
            let path = route.full_path();

            tracing::debug!(
                method = %route.method,
                path = %path,
                action = %route.action,
                "Mounting route"
            );

            transport.add_route(
                route.method,
                &path,
                Arc::new(move |req: HttpRequest| -> HandlerFuture {
                    let dispatcher = dispatcher.clone();
                    let route = handler_route.clone();
                    Box::pin(async move { Ok(dispatcher.dispatch(&route, Arc::new(req)).await) })
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::Args;
    use crate::controller::Actions;
    use crate::metadata::{
        AnnotationSource, ControllerDescriptor, ControllerKind, HttpMethod, ParamType,
        ParameterDescriptor,
    };

    #[derive(Default)]
    struct Probe;

    impl Controller for Probe {
        fn actions(actions: &mut Actions<Self>) {
            actions
                .action("double", |_: &mut Probe, args: &mut Args| -> Result<String, Error> {
                    let n: i64 = args.get("n")?;
                    Ok((n * 2).to_string())
                })
                .action("boom", |_: &mut Probe, _: &mut Args| -> String {
                    panic!("boom");
                });
        }
    }

    fn setup() -> (Arc<Registry>, Arc<RouteDescriptor>, Arc<RouteDescriptor>) {
        let registry = Arc::new(Registry::new());
        let type_path = std::any::type_name::<Probe>();
        registry
            .register_controller(ControllerDescriptor::for_type_path(
                type_path,
                ControllerKind::Rest,
                AnnotationSource::Manual,
            ))
            .unwrap();

        let mut double = RouteDescriptor::new(
            HttpMethod::GET,
            type_path,
            "double",
            "/double/:n",
            AnnotationSource::Manual,
        );
        double.params.push(ParameterDescriptor::path("n", ParamType::I64));
        let double = registry.register(double).unwrap();

        let boom = registry
            .register(RouteDescriptor::new(
                HttpMethod::GET,
                type_path,
                "boom",
                "/boom",
                AnnotationSource::Manual,
            ))
            .unwrap();
        (registry, double, boom)
    }

    fn request(n: &str) -> ContextHandle {
        let mut req = HttpRequest::new("GET".into(), format!("/double/{}", n));
        req.path_params.insert("n".into(), n.into());
        Arc::new(req)
    }

    #[tokio::test]
    async fn test_dispatch_states() {
        let (registry, double, boom) = setup();
        let dispatcher = Dispatcher::builder(registry).mount::<Probe>().build().unwrap();

        let ok = dispatcher.dispatch_traced(&double, request("21")).await;
        assert_eq!(ok.response.body_string(), "42");
        assert_eq!(
            ok.states,
            [
                DispatchState::Created,
                DispatchState::Initialized,
                DispatchState::Prepared,
                DispatchState::ParamsBound,
                DispatchState::Invoked,
                DispatchState::ResultMapped,
                DispatchState::Finished,
            ]
        );

        let bad = dispatcher.dispatch_traced(&double, request("x")).await;
        assert_eq!(bad.response.status, 400);
        assert_eq!(bad.error_kind, Some(ErrorKind::Coercion));
        assert!(bad.states.contains(&DispatchState::ValidationFailed));
        assert!(!bad.states.contains(&DispatchState::Invoked));

        let panicked = dispatcher.dispatch_traced(&boom, request("1")).await;
        assert_eq!(panicked.response.status, 500);
        assert_eq!(panicked.error_kind, Some(ErrorKind::Invocation));
        assert_eq!(
            &panicked.states[panicked.states.len() - 3..],
            [
                DispatchState::InvocationError,
                DispatchState::ErrorMapped,
                DispatchState::Finished,
            ]
        );
    }

    #[tokio::test]
    async fn test_build_requires_mounted_controller() {
        let (registry, _, _) = setup();
        assert!(matches!(
            Dispatcher::builder(registry).build(),
            Err(Error::Metadata(_))
        ));
    }
}
