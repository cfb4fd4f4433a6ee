//! Shared engine handle and context lifecycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bg_protocol::SessionOptions;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::launcher::{self, LaunchConfig};
use crate::transport::{self, TransportParts};

/// Process-wide handle to the single shared engine.
///
/// The handle tracks raw context ids only; session bookkeeping belongs to
/// the gateway's registry.
pub struct EngineHandle {
	connection: Arc<Connection>,
	identity: String,
	running: AtomicBool,
	contexts: Mutex<HashSet<String>>,
	child: Mutex<Option<Child>>,
}

impl EngineHandle {
	/// Launches the engine subprocess and connects to it.
	///
	/// Failure here is fatal to gateway startup; no partially-running handle
	/// is ever returned.
	pub async fn launch(config: &LaunchConfig) -> Result<Self> {
		let launched = launcher::launch(config).await?;
		let parts = transport::connect(&launched.ws_url).await?;
		info!(target = "bg.engine", identity = %launched.identity, port = launched.port, "engine ready");
		Ok(Self {
			connection: Connection::start(parts),
			identity: launched.identity,
			running: AtomicBool::new(true),
			contexts: Mutex::new(HashSet::new()),
			child: Mutex::new(Some(launched.child)),
		})
	}

	/// Builds a handle over an already-established transport.
	///
	/// Used by tests (fake transport) and pre-connected engines; the handle
	/// does not own a subprocess in this mode.
	pub fn connect(parts: TransportParts, identity: impl Into<String>) -> Self {
		Self {
			connection: Connection::start(parts),
			identity: identity.into(),
			running: AtomicBool::new(true),
			contexts: Mutex::new(HashSet::new()),
			child: Mutex::new(None),
		}
	}

	pub fn running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	/// Engine version string, fixed for the process lifetime.
	pub fn identity(&self) -> &str {
		&self.identity
	}

	/// Number of live raw contexts.
	pub fn context_count(&self) -> usize {
		self.contexts.lock().len()
	}

	fn ensure_running(&self) -> Result<()> {
		if self.running() { Ok(()) } else { Err(EngineError::NotRunning) }
	}

	/// Creates a fresh isolated context with its primary document.
	pub async fn new_context(&self, options: &SessionOptions) -> Result<EngineContext> {
		self.ensure_running()?;

		let created = self.connection.send_command("Target.createBrowserContext", Value::Null, None).await?;
		let context_id = required_str(&created, "browserContextId")?;

		let target = self
			.connection
			.send_command("Target.createTarget", json!({ "url": "about:blank", "browserContextId": context_id }), None)
			.await?;
		let target_id = required_str(&target, "targetId")?;

		let attached = self
			.connection
			.send_command("Target.attachToTarget", json!({ "targetId": target_id, "flatten": true }), None)
			.await?;
		let session_id = required_str(&attached, "sessionId")?;

		let context = EngineContext::new(context_id.clone(), target_id, session_id, Arc::clone(&self.connection));
		context.bootstrap(options).await?;

		self.contexts.lock().insert(context_id.clone());
		debug!(target = "bg.engine", %context_id, "context created");
		Ok(context)
	}

	/// Releases engine resources for exactly one context.
	///
	/// Destroying a context twice, or one this handle never created, is an
	/// error.
	pub async fn destroy_context(&self, context_id: &str) -> Result<()> {
		self.ensure_running()?;
		if !self.contexts.lock().remove(context_id) {
			return Err(EngineError::ContextNotFound(context_id.to_string()));
		}
		self.connection
			.send_command("Target.disposeBrowserContext", json!({ "browserContextId": context_id }), None)
			.await?;
		debug!(target = "bg.engine", %context_id, "context destroyed");
		Ok(())
	}

	/// Destroys all outstanding contexts and terminates the engine.
	///
	/// Idempotent; later calls return immediately.
	pub async fn shutdown(&self) {
		if !self.running.swap(false, Ordering::SeqCst) {
			return;
		}

		let outstanding: Vec<String> = self.contexts.lock().drain().collect();
		for context_id in outstanding {
			if let Err(err) = self
				.connection
				.send_command("Target.disposeBrowserContext", json!({ "browserContextId": context_id }), None)
				.await
			{
				warn!(target = "bg.engine", %context_id, error = %err, "failed to dispose context during shutdown");
			}
		}

		if let Err(err) = self.connection.send_command("Browser.close", Value::Null, None).await {
			debug!(target = "bg.engine", error = %err, "browser close failed; reaping process");
		}

		let child = self.child.lock().take();
		if let Some(mut child) = child {
			let _ = child.start_kill();
			let _ = child.wait().await;
		}
		info!(target = "bg.engine", "engine shut down");
	}
}

fn required_str(value: &Value, field: &str) -> Result<String> {
	value
		.get(field)
		.and_then(Value::as_str)
		.map(str::to_string)
		.ok_or_else(|| EngineError::Protocol(format!("response missing {field}")))
}
