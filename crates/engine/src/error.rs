//! Engine error taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("engine is not running")]
	NotRunning,

	#[error("failed to launch engine: {0}")]
	Launch(String),

	#[error("unknown engine context: {0}")]
	ContextNotFound(String),

	#[error("navigation to {url} timed out after {timeout_ms}ms")]
	NavigationTimeout { url: String, timeout_ms: u64 },

	#[error("navigation to {url} failed: {reason}")]
	Navigation { url: String, reason: String },

	#[error("script evaluation failed: {0}")]
	Script(String),

	#[error("engine protocol error: {0}")]
	Protocol(String),

	#[error("engine connection closed")]
	ChannelClosed,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl EngineError {
	/// Whether the error indicates the navigation deadline elapsed.
	pub fn is_navigation_timeout(&self) -> bool {
		matches!(self, Self::NavigationTimeout { .. })
	}
}
