//! Integration tests for dispatch through tag-registered routes

use async_trait::async_trait;
use keystone_core::tags::{Annotated, Marker, TagExtractor};
use keystone_core::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Counters {
    invoked: AtomicUsize,
    finished: AtomicUsize,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
struct NewUser {
    name: String,
    age: u8,
}

#[derive(Default)]
struct UserController {
    counters: Option<Arc<Counters>>,
}

impl Annotated for UserController {
    const MARKERS: &'static [Marker] = &[
        Marker::RestController,
        Marker::RequestMapping("/users"),
        Marker::Tag("team", "identity"),
    ];
}

impl UserController {
    fn mark_invoked(&self) {
        if let Some(counters) = &self.counters {
            counters.invoked.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn show(&mut self, args: &mut Args) -> Result<Json<Value>, Error> {
        self.mark_invoked();
        let id: i64 = args.get("id")?;
        let verbose: bool = args.get("verbose")?;
        Ok(Json(json!({ "id": id, "verbose": verbose })))
    }

    fn create(&mut self, args: &mut Args) -> Result<HttpResponse, Error> {
        self.mark_invoked();
        let user: NewUser = args.body("user")?;
        HttpResponse::created().with_json(&user)
    }

    fn explode(&mut self, _args: &mut Args) -> String {
        self.mark_invoked();
        panic!("explode");
    }

    fn lookup(&mut self, _args: &mut Args) -> Option<String> {
        self.mark_invoked();
        None
    }

    fn secret(&mut self, _args: &mut Args) -> &'static str {
        self.mark_invoked();
        "classified"
    }

    fn fragile(&mut self, _args: &mut Args) -> &'static str {
        self.mark_invoked();
        "unreachable"
    }
}

impl Controller for UserController {
    fn init(&mut self, _ctx: ContextHandle, _controller: &str, _action: &str, app: &AppHandle) {
        self.counters = app.state::<Counters>();
    }

    fn finish(&mut self) {
        if let Some(counters) = &self.counters {
            counters.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn actions(actions: &mut Actions<Self>) {
        actions
            .action("show", Self::show)
            .action("create", Self::create)
            .action("explode", Self::explode)
            .action("lookup", Self::lookup)
            .action("secret", Self::secret)
            .action("fragile", Self::fragile);
    }
}

struct RequireToken;

#[async_trait]
impl Middleware for RequireToken {
    async fn before(&self, ctx: &ContextHandle, _route: &RouteDescriptor) -> Result<(), Error> {
        match ctx.header("authorization") {
            Some(token) if token == "Bearer letmein" => Ok(()),
            _ => Err(Error::http(401, "missing or invalid token")),
        }
    }
}

struct Boom;

#[async_trait]
impl Middleware for Boom {
    async fn before(&self, _ctx: &ContextHandle, _route: &RouteDescriptor) -> Result<(), Error> {
        panic!("middleware exploded");
    }
}

/// A request whose payload stream fails hard.
struct BrokenBody(HttpRequest);

#[async_trait]
impl RequestContext for BrokenBody {
    fn method(&self) -> &str {
        RequestContext::method(&self.0)
    }

    fn path(&self) -> &str {
        RequestContext::path(&self.0)
    }

    fn path_param(&self, name: &str) -> Option<String> {
        RequestContext::path_param(&self.0, name)
    }

    fn query(&self, name: &str) -> Option<String> {
        RequestContext::query(&self.0, name)
    }

    fn header(&self, name: &str) -> Option<String> {
        RequestContext::header(&self.0, name)
    }

    fn cookie(&self, name: &str) -> Option<String> {
        RequestContext::cookie(&self.0, name)
    }

    fn form_value(&self, name: &str) -> Option<String> {
        RequestContext::form_value(&self.0, name)
    }

    async fn body(&self) -> Result<bytes::Bytes, Error> {
        panic!("connection reset");
    }
}

fn setup() -> (Arc<Dispatcher>, Router) {
    let registry = Arc::new(Registry::new());
    let users = TagExtractor::new(registry.clone())
        .controller::<UserController>()
        .unwrap();

    users
        .get("show", "/{id}")
        .path_param("id", ParamType::I64)
        .query("verbose", ParamType::Bool, false, Some("false"))
        .register()
        .unwrap();
    users
        .post("create", "")
        .body::<NewUser>("user")
        .register()
        .unwrap();
    users
        .get("explode", "/actions/explode")
        .register()
        .unwrap();
    users.get("lookup", "/actions/lookup").register().unwrap();
    users
        .get("secret", "/actions/secret")
        .middleware(["auth"])
        .register()
        .unwrap();
    users
        .get("fragile", "/actions/fragile")
        .middleware(["boom"])
        .register()
        .unwrap();

    let dispatcher = Arc::new(
        Dispatcher::builder(registry)
            .mount::<UserController>()
            .middleware("auth", RequireToken)
            .middleware("boom", Boom)
            .state(Counters::default())
            .build()
            .unwrap(),
    );

    let mut router = Router::new();
    dispatcher.mount_routes(&mut router);
    (dispatcher, router)
}

fn counters(dispatcher: &Dispatcher) -> Arc<Counters> {
    dispatcher.app().state::<Counters>().unwrap()
}

fn body_json(response: &HttpResponse) -> Value {
    serde_json::from_slice(&response.body).unwrap()
}

fn get(path: &str) -> HttpRequest {
    HttpRequest::new("GET".to_string(), path.to_string())
}

fn post(path: &str, body: &str) -> HttpRequest {
    let mut request = HttpRequest::new("POST".to_string(), path.to_string());
    request
        .headers
        .insert("Content-Type".to_string(), "application/json".to_string());
    request.body = body.as_bytes().to_vec();
    request
}

#[tokio::test]
async fn test_path_and_default_query_binding() {
    let (_dispatcher, router) = setup();

    let response = router.handle(get("/users/42")).await;
    assert_eq!(response.status, 200);
    assert_eq!(body_json(&response), json!({ "id": 42, "verbose": false }));

    let response = router.handle(get("/users/7?verbose=yes")).await;
    assert_eq!(body_json(&response), json!({ "id": 7, "verbose": true }));
}

#[tokio::test]
async fn test_coercion_failure_never_invokes() {
    let (dispatcher, router) = setup();

    let response = router.handle(get("/users/abc")).await;
    assert_eq!(response.status, 400);
    assert_eq!(body_json(&response)["error"]["kind"], "coercion");

    let counters = counters(&dispatcher);
    assert_eq!(counters.invoked.load(Ordering::SeqCst), 0);
    assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panic_finishes_once() {
    let (dispatcher, router) = setup();

    let response = router.handle(get("/users/actions/explode")).await;
    assert_eq!(response.status, 500);
    let body = body_json(&response);
    assert_eq!(body["error"]["kind"], "invocation");
    assert_eq!(body["error"]["message"], "internal server error");

    let counters = counters(&dispatcher);
    assert_eq!(counters.invoked.load(Ordering::SeqCst), 1);
    assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_middleware_panic_finishes_once() {
    let (dispatcher, router) = setup();

    let response = router.handle(get("/users/actions/fragile")).await;
    assert_eq!(response.status, 500);
    assert_eq!(body_json(&response)["error"]["kind"], "invocation");

    let counters = counters(&dispatcher);
    assert_eq!(counters.invoked.load(Ordering::SeqCst), 0);
    assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_body_read_panic_finishes_once() {
    let (dispatcher, _router) = setup();
    let route = dispatcher
        .registry()
        .route(std::any::type_name::<UserController>(), "create")
        .unwrap();

    let outcome = dispatcher
        .dispatch_traced(&route, Arc::new(BrokenBody(post("/users", "{}"))))
        .await;
    assert_eq!(outcome.response.status, 500);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Invocation));
    assert!(outcome.states.contains(&DispatchState::InvocationError));

    let counters = counters(&dispatcher);
    assert_eq!(counters.invoked.load(Ordering::SeqCst), 0);
    assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_typed_body() {
    let (_dispatcher, router) = setup();

    let response = router
        .handle(post("/users", r#"{"name": "Ada", "age": 36}"#))
        .await;
    assert_eq!(response.status, 201);
    assert_eq!(body_json(&response), json!({ "name": "Ada", "age": 36 }));

    let response = router.handle(post("/users", "{")).await;
    assert_eq!(response.status, 400);
    assert_eq!(body_json(&response)["error"]["kind"], "serialization");
}

#[tokio::test]
async fn test_missing_body_is_validation_error() {
    let (dispatcher, router) = setup();

    let response = router.handle(post("/users", "  ")).await;
    assert_eq!(response.status, 400);
    assert_eq!(body_json(&response)["error"]["kind"], "validation");
    assert_eq!(counters(&dispatcher).invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_middleware_rejects_before_binding() {
    let (dispatcher, router) = setup();

    let response = router.handle(get("/users/actions/secret")).await;
    assert_eq!(response.status, 401);
    assert_eq!(body_json(&response)["error"]["kind"], "application");
    assert_eq!(counters(&dispatcher).invoked.load(Ordering::SeqCst), 0);

    let mut request = get("/users/actions/secret");
    request
        .headers
        .insert("Authorization".to_string(), "Bearer letmein".to_string());
    let response = router.handle(request).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_string(), "classified");
}

#[tokio::test]
async fn test_empty_reply_and_unknown_route() {
    let (_dispatcher, router) = setup();

    let response = router.handle(get("/users/actions/lookup")).await;
    assert_eq!(response.status, 204);
    assert!(response.body.is_empty());

    let response = router.handle(get("/accounts/1")).await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_traced_states_for_validation_failure() {
    let (dispatcher, _router) = setup();
    let route = dispatcher
        .registry()
        .route(std::any::type_name::<UserController>(), "create")
        .unwrap();

    let outcome = dispatcher
        .dispatch_traced(&route, Arc::new(post("/users", "")))
        .await;
    assert_eq!(outcome.error_kind, Some(ErrorKind::Validation));
    assert_eq!(
        outcome.states,
        [
            DispatchState::Created,
            DispatchState::Initialized,
            DispatchState::Prepared,
            DispatchState::ValidationFailed,
            DispatchState::ErrorMapped,
            DispatchState::Finished,
        ]
    );
}

#[test]
fn test_builder_round_trip() {
    let registry = Arc::new(Registry::new());
    let users = TagExtractor::new(registry.clone())
        .controller::<UserController>()
        .unwrap();
    assert_eq!(
        users.descriptor().tags.get("team").map(String::as_str),
        Some("identity")
    );

    let builder = users
        .get("show", "/{id}")
        .description("Fetch one user")
        .path_param("id", ParamType::I64)
        .query("verbose", ParamType::Bool, false, Some("false"))
        .header("X-Tenant", ParamType::String, false);
    let declared = builder.descriptor().clone();
    let published = builder.register().unwrap();

    assert_eq!(*published, declared);
    assert_eq!(published.full_path(), "/users/:id");
    assert_eq!(
        registry
            .endpoint(HttpMethod::GET, "/users/:id")
            .map(|r| r.action.clone()),
        Some("show".to_string())
    );

    let duplicate = users.get("show", "/other").register();
    assert!(matches!(duplicate, Err(Error::Conflict(_))));
}

#[test]
fn test_build_rejects_unknown_action_and_middleware() {
    let registry = Arc::new(Registry::new());
    let users = TagExtractor::new(registry.clone())
        .controller::<UserController>()
        .unwrap();
    users.get("vanish", "/vanish").register().unwrap();
    assert!(matches!(
        Dispatcher::builder(registry).mount::<UserController>().build(),
        Err(Error::Metadata(_))
    ));

    let registry = Arc::new(Registry::new());
    let users = TagExtractor::new(registry.clone())
        .controller::<UserController>()
        .unwrap();
    users
        .get("secret", "/secret")
        .middleware(["audit"])
        .register()
        .unwrap();
    assert!(matches!(
        Dispatcher::builder(registry).mount::<UserController>().build(),
        Err(Error::Metadata(_))
    ));
}
