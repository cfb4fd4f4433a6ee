//! Gateway error taxonomy and its HTTP mapping.
//!
//! Client mistakes map to 4xx, engine failures are wrapped with operation
//! and session context, and nothing internal (paths, traces) reaches the
//! caller.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bg_engine::EngineError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("Missing required field: {0}")]
	MissingField(&'static str),

	#[error("Invalid request body: {0}")]
	InvalidBody(String),

	#[error("Context not found: {0}")]
	SessionNotFound(String),

	#[error("Invalid artifact name: {0}")]
	InvalidArtifactName(String),

	#[error("{op} failed: {source}")]
	Engine {
		op: &'static str,
		#[source]
		source: EngineError,
	},

	#[error("{op} failed for session {session_id}: {source}")]
	SessionOp {
		op: &'static str,
		session_id: String,
		#[source]
		source: EngineError,
	},

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl GatewayError {
	fn status(&self) -> StatusCode {
		match self {
			Self::MissingField(_) | Self::InvalidBody(_) | Self::InvalidArtifactName(_) => StatusCode::BAD_REQUEST,
			Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
			Self::Engine { source, .. } | Self::SessionOp { source, .. } if source.is_navigation_timeout() => StatusCode::GATEWAY_TIMEOUT,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for GatewayError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			error!(target = "bg.gateway", error = %self, "request failed");
		}
		// Unclassified failures get the generic envelope; everything else
		// (client errors, navigation timeouts) carries its own message.
		if status == StatusCode::INTERNAL_SERVER_ERROR {
			(status, Json(json!({ "error": "Internal gateway error", "message": self.to_string() }))).into_response()
		} else {
			(status, Json(json!({ "error": self.to_string() }))).into_response()
		}
	}
}
