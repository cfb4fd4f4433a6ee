//! Session option types shared by the dispatcher and the engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Viewport dimensions applied to a session's document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Viewport {
	pub width: u32,
	pub height: u32,
}

impl Default for Viewport {
	fn default() -> Self {
		Self { width: 1920, height: 1080 }
	}
}

/// Caller-supplied options bag for session creation.
///
/// Recognized fields are lifted into typed form; everything else lands in
/// `extra` and is forwarded to the engine untouched and unvalidated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
	pub viewport: Option<Viewport>,
	pub user_agent: Option<String>,
	pub locale: Option<String>,
	/// Opaque caller metadata, stored on the session for observability only.
	pub metadata: Option<Value>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// When a navigation is considered settled.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
	Load,
	#[serde(rename = "domcontentloaded")]
	DomContentLoaded,
	#[default]
	NetworkIdle,
}

/// Image encoding for capture operations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
	#[default]
	Png,
	Jpeg,
}

/// Paper size for document rendering.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaperFormat {
	#[default]
	A4,
	A3,
	Letter,
	Legal,
	Tabloid,
}
