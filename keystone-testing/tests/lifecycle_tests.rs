//! Lifecycle ordering observed through the test client

use keystone_core::*;
use keystone_testing::*;
use serde_json::json;
use std::sync::Arc;

#[derive(Default)]
struct GreetingController {
    recorder: Option<Arc<CallRecorder>>,
    ctx: Option<ContextHandle>,
}

impl Annotated for GreetingController {
    const MARKERS: &'static [Marker] = &[Marker::RestController, Marker::RequestMapping("/greetings")];
}

impl GreetingController {
    fn record(&self, call: &str) {
        if let Some(recorder) = &self.recorder {
            recorder.record(call);
        }
    }

    fn greet(&mut self, args: &mut Args) -> Result<String, Error> {
        let name: String = args.get("name")?;
        if let Some(recorder) = &self.recorder {
            recorder.record_with("greet", vec![name.clone()]);
        }
        Ok(format!("hello {}", name))
    }

    fn repeat(&mut self, args: &mut Args) -> Result<Json<Vec<String>>, Error> {
        self.record("repeat");
        let times: u32 = args.get("times")?;
        Ok(Json(vec!["hi".to_string(); times as usize]))
    }
}

impl Controller for GreetingController {
    fn init(&mut self, ctx: ContextHandle, _controller: &str, _action: &str, app: &AppHandle) {
        self.recorder = app.state::<CallRecorder>();
        self.ctx = Some(ctx);
        self.record("init");
    }

    fn prepare(&mut self) -> Result<(), Error> {
        self.record("prepare");
        let rejected = self
            .ctx
            .as_ref()
            .and_then(|ctx| ctx.header("x-reject"))
            .is_some();
        if rejected {
            return Err(Error::http(403, "rejected in prepare"));
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.record("finish");
    }

    fn actions(actions: &mut Actions<Self>) {
        actions
            .action("greet", Self::greet)
            .action("repeat", Self::repeat);
    }
}

fn setup() -> (TestClient, CallRecorder) {
    let registry = Arc::new(Registry::new());
    let greetings = TagExtractor::new(registry.clone())
        .controller::<GreetingController>()
        .unwrap();
    greetings
        .get("greet", "/{name}")
        .path_param("name", ParamType::String)
        .register()
        .unwrap();
    greetings
        .get("repeat", "")
        .query("times", ParamType::U32, true, None)
        .register()
        .unwrap();

    let recorder = CallRecorder::new();
    let dispatcher = Arc::new(
        Dispatcher::builder(registry)
            .mount::<GreetingController>()
            .state(recorder.clone())
            .build()
            .unwrap(),
    );

    let mut router = Router::new();
    dispatcher.mount_routes(&mut router);
    (TestClient::new(router), recorder)
}

#[tokio::test]
async fn test_hooks_run_in_order() {
    let (client, recorder) = setup();

    let response = client.get("/greetings/ada").await;
    assert_status(&response, 200);
    assert_eq!(response.body_string().as_deref(), Some("hello ada"));

    recorder.assert_sequence(&["init", "prepare", "greet", "finish"]);
    assert_eq!(recorder.args_of("greet"), vec![vec!["ada".to_string()]]);
}

#[tokio::test]
async fn test_prepare_failure_skips_action() {
    let (client, recorder) = setup();

    let request = TestRequestBuilder::new(HttpMethod::GET, "/greetings/ada").header("X-Reject", "1");
    let response = client.send(request).await;

    assert_status(&response, 403);
    assert_error_kind(&response, ErrorKind::Application);
    recorder.assert_sequence(&["init", "prepare", "finish"]);
}

#[tokio::test]
async fn test_binding_failure_finishes_once() {
    let (client, recorder) = setup();

    let response = client.get("/greetings").await;
    assert_client_error(&response);
    assert_error_kind(&response, ErrorKind::Validation);
    assert!(!recorder.was_called("repeat"));
    assert_eq!(recorder.count("finish"), 1);

    recorder.clear();
    let response = client
        .send(TestRequestBuilder::new(HttpMethod::GET, "/greetings").query("times", "many"))
        .await;
    assert_error_kind(&response, ErrorKind::Coercion);
    recorder.assert_sequence(&["init", "prepare", "finish"]);
}

#[tokio::test]
async fn test_query_binding() {
    let (client, recorder) = setup();

    let response = client
        .send(TestRequestBuilder::new(HttpMethod::GET, "/greetings").query("times", "2"))
        .await;
    assert_success(&response);
    assert_json(&response, &json!(["hi", "hi"]));
    assert_header(&response, "content-type", "application/json");
    recorder.assert_sequence(&["init", "prepare", "repeat", "finish"]);
}

#[tokio::test]
async fn test_unknown_route() {
    let (client, recorder) = setup();

    let response = client.delete("/greetings/ada").await;
    assert_status(&response, 404);
    assert_error_kind(&response, ErrorKind::NotFound);
    assert!(recorder.is_empty());
}
