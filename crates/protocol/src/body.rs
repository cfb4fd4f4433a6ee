//! Request bodies accepted by the dispatcher.
//!
//! Required fields are modeled as `Option` so the dispatcher can reject a
//! missing field with a structured error instead of a serde parse failure.

use serde::{Deserialize, Serialize};

use crate::options::{ImageFormat, PaperFormat, SessionOptions, WaitUntil};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateSessionBody {
	pub options: Option<SessionOptions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigateBody {
	pub session_id: Option<String>,
	pub url: Option<String>,
	pub wait_until: Option<WaitUntil>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenshotBody {
	pub session_id: Option<String>,
	/// Output file name, placed under the image artifact directory.
	pub name: Option<String>,
	pub full_page: Option<bool>,
	pub format: Option<ImageFormat>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluateBody {
	pub session_id: Option<String>,
	pub script: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PdfBody {
	pub session_id: Option<String>,
	pub name: Option<String>,
	pub format: Option<PaperFormat>,
	pub landscape: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessibilityBody {
	pub session_id: Option<String>,
}
