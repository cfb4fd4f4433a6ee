//! Success and error payloads produced by the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::options::Viewport;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionReply {
	pub session_id: String,
	pub status: String,
	pub viewport: Viewport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateReply {
	pub status: String,
	pub url: String,
	pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactReply {
	pub status: String,
	/// Filesystem path of the written artifact, inside the artifact root.
	pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateReply {
	pub status: String,
	pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityReply {
	pub status: String,
	pub snapshot: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseSessionReply {
	pub status: String,
	pub session_id: String,
}

/// Self-reported gateway status served at `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReply {
	pub status: String,
	/// Seconds since the dispatcher started serving.
	pub uptime: f64,
	pub engine: EngineHealth,
	pub memory: MemoryHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineHealth {
	pub running: bool,
	pub identity: String,
	pub sessions: usize,
}

/// Host memory in MiB.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHealth {
	pub used: u64,
	pub total: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn health_reply_serializes_camel_case() {
		let reply = HealthReply {
			status: "healthy".into(),
			uptime: 12.5,
			engine: EngineHealth {
				running: true,
				identity: "HeadlessChrome/124.0".into(),
				sessions: 2,
			},
			memory: MemoryHealth { used: 512, total: 4096 },
		};
		let value = serde_json::to_value(&reply).unwrap();
		assert_eq!(value["engine"]["running"], true);
		assert_eq!(value["engine"]["sessions"], 2);
		assert_eq!(value["memory"]["used"], 512);
	}
}
