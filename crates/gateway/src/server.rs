//! HTTP dispatcher: routes, handlers, and the self-reported status payload.
//!
//! Every handler follows the same shape: parse the body, resolve the
//! session, invoke the engine primitive, translate the outcome into a
//! structured reply. Handlers yield at I/O boundaries; requests for
//! different sessions interleave freely.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bg_engine::{EngineHandle, LaunchConfig};
use bg_protocol::{
	AccessibilityBody, AccessibilityReply, ArtifactReply, CloseSessionReply, CreateSessionBody, CreateSessionReply, EngineHealth, EvaluateBody,
	EvaluateReply, HealthReply, MemoryHealth, NavigateBody, NavigateReply, PdfBody, ScreenshotBody,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sysinfo::System;
use tokio::net::TcpListener;
use tracing::info;

use crate::artifacts::{ArtifactKind, ArtifactStore};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::registry::SessionRegistry;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared dispatcher state.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<EngineHandle>,
	pub registry: Arc<SessionRegistry>,
	pub artifacts: Arc<ArtifactStore>,
	pub started_at: Instant,
	pub navigation_timeout: Duration,
}

impl AppState {
	pub fn new(engine: Arc<EngineHandle>, registry: Arc<SessionRegistry>, artifacts: Arc<ArtifactStore>) -> Self {
		Self {
			engine,
			registry,
			artifacts,
			started_at: Instant::now(),
			navigation_timeout: NAVIGATION_TIMEOUT,
		}
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/session/new", post(create_session))
		.route("/navigate", post(navigate))
		.route("/screenshot", post(screenshot))
		.route("/evaluate", post(evaluate))
		.route("/pdf", post(pdf))
		.route("/accessibility", post(accessibility))
		.route("/session/{id}/close", post(close_session))
		.fallback(not_found)
		.layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
		.with_state(state)
}

/// Launches the engine, binds the listener, and serves until signalled.
pub async fn serve(config: GatewayConfig) -> Result<()> {
	let launch = LaunchConfig {
		executable: config.browser.clone(),
		headless: config.headless,
		display: (!config.headless).then(|| config.display.clone()),
		..LaunchConfig::default()
	};
	let engine = Arc::new(
		EngineHandle::launch(&launch)
			.await
			.map_err(|source| GatewayError::Engine { op: "engine startup", source })?,
	);

	let registry = Arc::new(SessionRegistry::new(Arc::clone(&engine)));
	let artifacts = Arc::new(ArtifactStore::new(&config.artifacts_root));
	let state = AppState::new(Arc::clone(&engine), Arc::clone(&registry), artifacts);

	let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
	info!(target = "bg.gateway", port = config.port, artifacts = %config.artifacts_root.display(), "gateway listening");

	axum::serve(listener, router(state))
		.with_graceful_shutdown(bg_runtime::process::termination_signal())
		.await?;

	info!(target = "bg.gateway", sessions = registry.count(), "shutting down");
	engine.shutdown().await;
	registry.clear();
	Ok(())
}

async fn health(State(state): State<AppState>) -> Json<HealthReply> {
	Json(status_payload(&state))
}

/// Observational only; never influences dispatch behavior.
fn status_payload(state: &AppState) -> HealthReply {
	let running = state.engine.running();
	HealthReply {
		status: if running { "healthy" } else { "unhealthy" }.to_string(),
		uptime: state.started_at.elapsed().as_secs_f64(),
		engine: EngineHealth {
			running,
			identity: state.engine.identity().to_string(),
			sessions: state.registry.count(),
		},
		memory: memory_usage(),
	}
}

fn memory_usage() -> MemoryHealth {
	let mut system = System::new();
	system.refresh_memory();
	MemoryHealth {
		used: system.used_memory() / (1024 * 1024),
		total: system.total_memory() / (1024 * 1024),
	}
}

async fn create_session(State(state): State<AppState>, body: BodyResult) -> Result<Json<CreateSessionReply>> {
	let body: CreateSessionBody = parse_body(body)?;
	let session = state.registry.create(body.options.unwrap_or_default()).await?;
	Ok(Json(CreateSessionReply {
		session_id: session.id().to_string(),
		status: "created".to_string(),
		viewport: session.viewport(),
	}))
}

async fn navigate(State(state): State<AppState>, body: BodyResult) -> Result<Json<NavigateReply>> {
	let body: NavigateBody = parse_body(body)?;
	let session_id = required(body.session_id, "sessionId")?;
	let url = required(body.url, "url")?;
	let session = state.registry.get(&session_id)?;

	info!(target = "bg.gateway", session_id = %session_id, %url, "navigate");
	let outcome = session
		.context()
		.navigate(&url, body.wait_until.unwrap_or_default(), state.navigation_timeout)
		.await
		.map_err(|source| GatewayError::SessionOp {
			op: "navigate",
			session_id: session_id.clone(),
			source,
		})?;

	Ok(Json(NavigateReply {
		status: "success".to_string(),
		url: outcome.url,
		title: outcome.title,
	}))
}

async fn screenshot(State(state): State<AppState>, body: BodyResult) -> Result<Json<ArtifactReply>> {
	let body: ScreenshotBody = parse_body(body)?;
	let session_id = required(body.session_id, "sessionId")?;
	let name = required(body.name, "name")?;
	let session = state.registry.get(&session_id)?;

	let path = state.artifacts.resolve(ArtifactKind::Screenshot, &name)?;
	let image = session
		.context()
		.screenshot(body.full_page.unwrap_or(false), body.format.unwrap_or_default())
		.await
		.map_err(|source| GatewayError::SessionOp {
			op: "screenshot",
			session_id: session_id.clone(),
			source,
		})?;
	tokio::fs::write(&path, &image).await?;

	info!(target = "bg.gateway", session_id = %session_id, path = %path.display(), "screenshot saved");
	Ok(Json(ArtifactReply {
		status: "success".to_string(),
		path: path.display().to_string(),
	}))
}

async fn evaluate(State(state): State<AppState>, body: BodyResult) -> Result<Json<EvaluateReply>> {
	let body: EvaluateBody = parse_body(body)?;
	let session_id = required(body.session_id, "sessionId")?;
	let script = required(body.script, "script")?;
	let session = state.registry.get(&session_id)?;

	let result = session.context().evaluate(&script).await.map_err(|source| GatewayError::SessionOp {
		op: "evaluate",
		session_id: session_id.clone(),
		source,
	})?;

	Ok(Json(EvaluateReply {
		status: "success".to_string(),
		result,
	}))
}

async fn pdf(State(state): State<AppState>, body: BodyResult) -> Result<Json<ArtifactReply>> {
	let body: PdfBody = parse_body(body)?;
	let session_id = required(body.session_id, "sessionId")?;
	let name = required(body.name, "name")?;
	let session = state.registry.get(&session_id)?;

	let path = state.artifacts.resolve(ArtifactKind::Pdf, &name)?;
	let document = session
		.context()
		.pdf(body.format.unwrap_or_default(), body.landscape.unwrap_or(false))
		.await
		.map_err(|source| GatewayError::SessionOp {
			op: "pdf",
			session_id: session_id.clone(),
			source,
		})?;
	tokio::fs::write(&path, &document).await?;

	info!(target = "bg.gateway", session_id = %session_id, path = %path.display(), "pdf saved");
	Ok(Json(ArtifactReply {
		status: "success".to_string(),
		path: path.display().to_string(),
	}))
}

async fn accessibility(State(state): State<AppState>, body: BodyResult) -> Result<Json<AccessibilityReply>> {
	let body: AccessibilityBody = parse_body(body)?;
	let session_id = required(body.session_id, "sessionId")?;
	let session = state.registry.get(&session_id)?;

	let snapshot = session
		.context()
		.accessibility_snapshot()
		.await
		.map_err(|source| GatewayError::SessionOp {
			op: "accessibility",
			session_id: session_id.clone(),
			source,
		})?;

	Ok(Json(AccessibilityReply {
		status: "success".to_string(),
		snapshot,
	}))
}

async fn close_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<CloseSessionReply>> {
	state.registry.destroy(&id).await?;
	Ok(Json(CloseSessionReply {
		status: "closed".to_string(),
		session_id: id,
	}))
}

async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
	(
		StatusCode::NOT_FOUND,
		Json(json!({ "error": "Not found", "path": uri.path(), "method": method.as_str() })),
	)
}

type BodyResult = std::result::Result<Json<Value>, JsonRejection>;

fn parse_body<T: DeserializeOwned>(body: BodyResult) -> Result<T> {
	let value = body.map_err(|rejection| GatewayError::InvalidBody(rejection.body_text()))?.0;
	serde_json::from_value(value).map_err(|e| GatewayError::InvalidBody(e.to_string()))
}

fn required<T>(field: Option<T>, name: &'static str) -> Result<T> {
	field.ok_or(GatewayError::MissingField(name))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn required_fields_are_enforced() {
		assert_eq!(required(Some(1), "sessionId").unwrap(), 1);
		let err = required::<u32>(None, "sessionId").unwrap_err();
		assert!(matches!(err, GatewayError::MissingField("sessionId")));
	}

	#[test]
	fn memory_usage_reports_plausible_numbers() {
		let memory = memory_usage();
		assert!(memory.total >= memory.used);
		assert!(memory.total > 0);
	}
}
