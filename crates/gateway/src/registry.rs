//! Session registry: the owned store mapping session ids to engine contexts.
//!
//! The registry is the sole owner of the id -> session mapping; the engine
//! handle only ever sees raw contexts. Callers are expected to serialize
//! their own requests within a session - the gateway applies no per-session
//! locking, so concurrent operations on one session race at the engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bg_engine::{EngineContext, EngineHandle};
use bg_protocol::{SessionOptions, Viewport};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::{GatewayError, Result};

/// One caller-visible automation session.
#[derive(Debug)]
pub struct Session {
	id: String,
	context: EngineContext,
	viewport: Viewport,
	created_at: u64,
	metadata: Value,
}

impl Session {
	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn context(&self) -> &EngineContext {
		&self.context
	}

	pub fn viewport(&self) -> Viewport {
		self.viewport
	}

	/// Creation time as a unix timestamp, immutable.
	pub fn created_at(&self) -> u64 {
		self.created_at
	}

	/// Caller-supplied metadata, surfaced in logs only.
	pub fn metadata(&self) -> &Value {
		&self.metadata
	}
}

pub struct SessionRegistry {
	engine: Arc<EngineHandle>,
	sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
	pub fn new(engine: Arc<EngineHandle>) -> Self {
		Self {
			engine,
			sessions: Mutex::new(HashMap::new()),
		}
	}

	/// Obtains a fresh engine context and registers it under a new id.
	pub async fn create(&self, options: SessionOptions) -> Result<Arc<Session>> {
		let context = self
			.engine
			.new_context(&options)
			.await
			.map_err(|source| GatewayError::Engine { op: "create session", source })?;

		let id = format!("ctx_{}", Uuid::new_v4().simple());
		let session = Arc::new(Session {
			id: id.clone(),
			context,
			viewport: options.viewport.unwrap_or_default(),
			created_at: now_ts(),
			metadata: options.metadata.unwrap_or(Value::Null),
		});

		self.sessions.lock().insert(id.clone(), Arc::clone(&session));
		info!(target = "bg.gateway", session_id = %id, metadata = %session.metadata, "session created");
		Ok(session)
	}

	/// Resolves an id to its live session.
	pub fn get(&self, session_id: &str) -> Result<Arc<Session>> {
		self.sessions
			.lock()
			.get(session_id)
			.cloned()
			.ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))
	}

	/// Destroys the session's engine context and removes the record.
	///
	/// The record is removed first, so the id is invalid from this point on
	/// and a racing second destroy observes `SessionNotFound`.
	pub async fn destroy(&self, session_id: &str) -> Result<()> {
		let session = self
			.sessions
			.lock()
			.remove(session_id)
			.ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))?;

		self.engine
			.destroy_context(session.context().context_id())
			.await
			.map_err(|source| GatewayError::SessionOp {
				op: "close session",
				session_id: session_id.to_string(),
				source,
			})?;

		info!(target = "bg.gateway", session_id, "session destroyed");
		Ok(())
	}

	/// Number of live sessions, for health reporting.
	pub fn count(&self) -> usize {
		self.sessions.lock().len()
	}

	/// Drops all records; used after the engine has been shut down.
	pub fn clear(&self) {
		self.sessions.lock().clear();
	}
}

fn now_ts() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
