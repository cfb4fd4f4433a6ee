//! End-to-end dispatcher tests against the scripted fake browser.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bg_engine::EngineHandle;
use bg_engine::fake_transport::{FakeBrowser, FakeTransportBuilder};
use bg_gateway::artifacts::ArtifactStore;
use bg_gateway::registry::SessionRegistry;
use bg_gateway::server::{AppState, router};
use serde_json::{Value, json};
use tempfile::TempDir;

struct TestGateway {
	base_url: String,
	port: u16,
	artifacts: TempDir,
	client: reqwest::Client,
}

impl TestGateway {
	async fn spawn() -> Self {
		Self::spawn_with_navigation_timeout(Duration::from_secs(30)).await
	}

	async fn spawn_with_navigation_timeout(navigation_timeout: Duration) -> Self {
		let (parts, controller) = FakeTransportBuilder::new().build();
		FakeBrowser::attach(controller);
		let engine = Arc::new(EngineHandle::connect(parts, "FakeBrowser/1.0"));
		let registry = Arc::new(SessionRegistry::new(Arc::clone(&engine)));
		let artifacts = TempDir::new().expect("artifact dir should be created");

		let mut state = AppState::new(engine, registry, Arc::new(ArtifactStore::new(artifacts.path())));
		state.navigation_timeout = navigation_timeout;

		let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.expect("listener should bind");
		let address: SocketAddr = listener.local_addr().expect("local addr should resolve");
		tokio::spawn(async move {
			axum::serve(listener, router(state)).await.expect("server should run");
		});

		Self {
			base_url: format!("http://{address}"),
			port: address.port(),
			artifacts,
			client: reqwest::Client::new(),
		}
	}

	async fn post(&self, path: &str, body: Value) -> (reqwest::StatusCode, Value) {
		let response = self
			.client
			.post(format!("{}{path}", self.base_url))
			.json(&body)
			.send()
			.await
			.expect("request should complete");
		let status = response.status();
		let body = response.json().await.expect("response should be json");
		(status, body)
	}

	async fn get(&self, path: &str) -> (reqwest::StatusCode, Value) {
		let response = self.client.get(format!("{}{path}", self.base_url)).send().await.expect("request should complete");
		let status = response.status();
		let body = response.json().await.expect("response should be json");
		(status, body)
	}

	async fn create_session(&self) -> String {
		let (status, body) = self.post("/session/new", json!({})).await;
		assert_eq!(status, 200, "create session failed: {body}");
		body["sessionId"].as_str().expect("sessionId should be present").to_string()
	}
}

#[tokio::test]
async fn create_then_navigate_returns_the_document_title() {
	let gateway = TestGateway::spawn().await;

	let (status, created) = gateway.post("/session/new", json!({})).await;
	assert_eq!(status, 200);
	assert!(created["sessionId"].as_str().unwrap().starts_with("ctx_"));
	assert_eq!(created["status"], "created");
	assert_eq!(created["viewport"], json!({"width": 1920, "height": 1080}));

	let session_id = created["sessionId"].as_str().unwrap();
	let (status, navigated) = gateway
		.post("/navigate", json!({"sessionId": session_id, "url": "https://example.test"}))
		.await;
	assert_eq!(status, 200);
	assert_eq!(navigated["status"], "success");
	assert_eq!(navigated["url"], "https://example.test");
	assert_eq!(navigated["title"], "Example");
}

#[tokio::test]
async fn session_options_shape_the_effective_viewport() {
	let gateway = TestGateway::spawn().await;

	let (status, created) = gateway
		.post(
			"/session/new",
			json!({"options": {"viewport": {"width": 800, "height": 600}, "locale": "de-DE", "unknownKnob": true}}),
		)
		.await;
	assert_eq!(status, 200);
	assert_eq!(created["viewport"], json!({"width": 800, "height": 600}));
}

#[tokio::test]
async fn unknown_session_ids_are_rejected_with_404() {
	let gateway = TestGateway::spawn().await;

	let (status, body) = gateway.post("/screenshot", json!({"sessionId": "bogus", "name": "a.png"})).await;
	assert_eq!(status, 404);
	assert_eq!(body["error"], "Context not found: bogus");
}

#[tokio::test]
async fn missing_required_fields_are_client_errors() {
	let gateway = TestGateway::spawn().await;

	let (status, body) = gateway.post("/navigate", json!({"url": "https://example.test"})).await;
	assert_eq!(status, 400);
	assert_eq!(body["error"], "Missing required field: sessionId");

	let session_id = gateway.create_session().await;
	let (status, body) = gateway.post("/navigate", json!({"sessionId": session_id})).await;
	assert_eq!(status, 400);
	assert_eq!(body["error"], "Missing required field: url");
}

#[tokio::test]
async fn malformed_bodies_are_client_errors() {
	let gateway = TestGateway::spawn().await;

	let response = gateway
		.client
		.post(format!("{}/navigate", gateway.base_url))
		.header("content-type", "application/json")
		.body("{not json")
		.send()
		.await
		.unwrap();
	assert_eq!(response.status(), 400);
	let body: Value = response.json().await.unwrap();
	assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
}

#[tokio::test]
async fn concurrent_sessions_are_isolated() {
	let gateway = TestGateway::spawn().await;

	let (first, second) = tokio::join!(gateway.post("/session/new", json!({})), gateway.post("/session/new", json!({})));
	let first_id = first.1["sessionId"].as_str().unwrap().to_string();
	let second_id = second.1["sessionId"].as_str().unwrap().to_string();
	assert_ne!(first_id, second_id);

	gateway.post("/navigate", json!({"sessionId": first_id, "url": "https://alpha.test"})).await;
	gateway.post("/navigate", json!({"sessionId": second_id, "url": "https://beta.test"})).await;

	let (_, first_eval) = gateway.post("/evaluate", json!({"sessionId": first_id, "script": "document.title"})).await;
	let (_, second_eval) = gateway.post("/evaluate", json!({"sessionId": second_id, "script": "document.title"})).await;
	assert_eq!(first_eval["result"], "Alpha");
	assert_eq!(second_eval["result"], "Beta");
}

#[tokio::test]
async fn evaluate_returns_the_script_value_opaquely() {
	let gateway = TestGateway::spawn().await;
	let session_id = gateway.create_session().await;

	let (status, body) = gateway.post("/evaluate", json!({"sessionId": session_id, "script": "1+1"})).await;
	assert_eq!(status, 200);
	assert_eq!(body["status"], "success");
	assert_eq!(body["result"], 2);
}

#[tokio::test]
async fn script_exceptions_are_structured_server_errors() {
	let gateway = TestGateway::spawn().await;
	let session_id = gateway.create_session().await;

	let (status, body) = gateway
		.post("/evaluate", json!({"sessionId": session_id, "script": "throw new Error('boom')"}))
		.await;
	assert_eq!(status, 500);
	assert_eq!(body["error"], "Internal gateway error");
	let message = body["message"].as_str().unwrap();
	assert!(message.contains("evaluate"));
	assert!(message.contains(&session_id));
}

#[tokio::test]
async fn screenshots_land_in_the_image_artifact_directory() {
	let gateway = TestGateway::spawn().await;
	let session_id = gateway.create_session().await;
	gateway.post("/navigate", json!({"sessionId": session_id, "url": "https://example.test"})).await;

	let (status, body) = gateway
		.post("/screenshot", json!({"sessionId": session_id, "name": "home.png", "fullPage": true}))
		.await;
	assert_eq!(status, 200);
	let path = body["path"].as_str().unwrap();
	assert_eq!(path, gateway.artifacts.path().join("screenshots/home.png").to_str().unwrap());
	assert_eq!(std::fs::read(path).unwrap(), b"fake-png-image");
}

#[tokio::test]
async fn pdfs_land_in_the_document_artifact_directory() {
	let gateway = TestGateway::spawn().await;
	let session_id = gateway.create_session().await;
	gateway.post("/navigate", json!({"sessionId": session_id, "url": "https://example.test"})).await;

	let (status, body) = gateway
		.post("/pdf", json!({"sessionId": session_id, "name": "report.pdf", "format": "Letter", "landscape": true}))
		.await;
	assert_eq!(status, 200);
	let path = body["path"].as_str().unwrap();
	assert_eq!(path, gateway.artifacts.path().join("pdfs/report.pdf").to_str().unwrap());
	assert!(std::fs::read(path).unwrap().starts_with(b"%PDF"));
}

#[tokio::test]
async fn artifact_names_cannot_escape_the_store() {
	let gateway = TestGateway::spawn().await;
	let session_id = gateway.create_session().await;

	let (status, body) = gateway
		.post("/screenshot", json!({"sessionId": session_id, "name": "../../escape.png"}))
		.await;
	assert_eq!(status, 200);
	assert_eq!(body["path"].as_str().unwrap(), gateway.artifacts.path().join("screenshots/escape.png").to_str().unwrap());
}

#[tokio::test]
async fn accessibility_returns_the_raw_snapshot() {
	let gateway = TestGateway::spawn().await;
	let session_id = gateway.create_session().await;
	gateway.post("/navigate", json!({"sessionId": session_id, "url": "https://example.test"})).await;

	let (status, body) = gateway.post("/accessibility", json!({"sessionId": session_id})).await;
	assert_eq!(status, 200);
	assert_eq!(body["status"], "success");
	let nodes = body["snapshot"]["nodes"].as_array().unwrap();
	assert_eq!(nodes[0]["name"]["value"], "Example");
}

#[tokio::test]
async fn destroyed_sessions_are_permanently_invalid() {
	let gateway = TestGateway::spawn().await;
	let session_id = gateway.create_session().await;

	let (status, closed) = gateway.post(&format!("/session/{session_id}/close"), json!({})).await;
	assert_eq!(status, 200);
	assert_eq!(closed["status"], "closed");
	assert_eq!(closed["sessionId"], session_id.as_str());

	let (status, body) = gateway.post("/evaluate", json!({"sessionId": session_id, "script": "1+1"})).await;
	assert_eq!(status, 404);
	assert_eq!(body["error"], format!("Context not found: {session_id}"));

	let (status, _) = gateway.post(&format!("/session/{session_id}/close"), json!({})).await;
	assert_eq!(status, 404);
}

#[tokio::test]
async fn navigation_failures_do_not_poison_the_session() {
	let gateway = TestGateway::spawn().await;
	let session_id = gateway.create_session().await;

	let (status, _) = gateway
		.post("/navigate", json!({"sessionId": session_id, "url": "https://unresolvable.test"}))
		.await;
	assert_eq!(status, 500);

	let (status, body) = gateway.post("/navigate", json!({"sessionId": session_id, "url": "https://example.test"})).await;
	assert_eq!(status, 200);
	assert_eq!(body["title"], "Example");
}

#[tokio::test]
async fn navigation_timeouts_are_bounded_and_reported() {
	let gateway = TestGateway::spawn_with_navigation_timeout(Duration::from_millis(300)).await;
	let session_id = gateway.create_session().await;

	let started = Instant::now();
	let (status, body) = gateway.post("/navigate", json!({"sessionId": session_id, "url": "https://hang.test"})).await;
	assert!(started.elapsed() < Duration::from_secs(5));
	assert_eq!(status, 504);
	assert!(body["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn unknown_routes_return_a_structured_404() {
	let gateway = TestGateway::spawn().await;

	let (status, body) = gateway.get("/nope").await;
	assert_eq!(status, 404);
	assert_eq!(body["error"], "Not found");
	assert_eq!(body["path"], "/nope");
	assert_eq!(body["method"], "GET");
}

#[tokio::test]
async fn health_reports_engine_and_session_state() {
	let gateway = TestGateway::spawn().await;
	gateway.create_session().await;

	let (status, body) = gateway.get("/health").await;
	assert_eq!(status, 200);
	assert_eq!(body["status"], "healthy");
	assert_eq!(body["engine"]["running"], true);
	assert_eq!(body["engine"]["identity"], "FakeBrowser/1.0");
	assert_eq!(body["engine"]["sessions"], 1);
	assert!(body["uptime"].as_f64().unwrap() >= 0.0);
	assert!(body["memory"]["total"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn health_prober_verdict_ands_all_sub_checks() {
	let gateway = TestGateway::spawn().await;
	let run_dir = TempDir::new().unwrap();
	bg_runtime::process::write_pid_file(&run_dir.path().join(bg_gateway::health::DISPLAY_PID_FILE), std::process::id()).unwrap();
	bg_runtime::process::write_pid_file(&run_dir.path().join(bg_gateway::health::GATEWAY_PID_FILE), std::process::id()).unwrap();

	let verdict = bg_gateway::health::run_health_check(gateway.port, run_dir.path()).await;
	assert!(verdict.display_alive);
	assert!(verdict.server_alive);
	assert!(verdict.endpoint_responsive);
	assert!(verdict.reports_healthy);
	assert!(verdict.healthy);

	// Losing any one sub-check flips the overall verdict.
	std::fs::remove_file(run_dir.path().join(bg_gateway::health::DISPLAY_PID_FILE)).unwrap();
	let verdict = bg_gateway::health::run_health_check(gateway.port, run_dir.path()).await;
	assert!(!verdict.display_alive);
	assert!(!verdict.healthy);
}
