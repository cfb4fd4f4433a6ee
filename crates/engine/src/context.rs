//! Isolated engine contexts and their document operations.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bg_protocol::{ImageFormat, PaperFormat, SessionOptions, WaitUntil};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::debug;

use crate::connection::Connection;
use crate::error::{EngineError, Result};

/// One isolated context plus its primary document.
///
/// The context id is the engine's isolation unit; the protocol session id is
/// the channel all document commands are sent over. Both live exactly as
/// long as the owning gateway session.
#[derive(Debug)]
pub struct EngineContext {
	context_id: String,
	target_id: String,
	session_id: String,
	connection: Arc<Connection>,
}

/// Result of a settled navigation.
#[derive(Debug, Clone)]
pub struct NavigateOutcome {
	pub url: String,
	pub title: String,
}

impl EngineContext {
	pub(crate) fn new(context_id: String, target_id: String, session_id: String, connection: Arc<Connection>) -> Self {
		Self {
			context_id,
			target_id,
			session_id,
			connection,
		}
	}

	pub fn context_id(&self) -> &str {
		&self.context_id
	}

	pub fn target_id(&self) -> &str {
		&self.target_id
	}

	/// Enables the document domains and applies recognized session options.
	pub(crate) async fn bootstrap(&self, options: &SessionOptions) -> Result<()> {
		self.send("Page.enable", Value::Null).await?;
		self.send("Page.setLifecycleEventsEnabled", json!({ "enabled": true })).await?;
		self.send("Runtime.enable", Value::Null).await?;

		let viewport = options.viewport.unwrap_or_default();
		self.send(
			"Emulation.setDeviceMetricsOverride",
			json!({ "width": viewport.width, "height": viewport.height, "deviceScaleFactor": 1, "mobile": false }),
		)
		.await?;

		if let Some(user_agent) = &options.user_agent {
			self.send("Emulation.setUserAgentOverride", json!({ "userAgent": user_agent })).await?;
		}
		if let Some(locale) = &options.locale {
			self.send("Emulation.setLocaleOverride", json!({ "locale": locale })).await?;
		}
		if !options.extra.is_empty() {
			// The options bag is a permissive pass-through; keys the wire
			// protocol cannot express are accepted and left to the engine.
			debug!(
				target = "bg.engine",
				context_id = %self.context_id,
				keys = ?options.extra.keys().collect::<Vec<_>>(),
				"unexpressed context options"
			);
		}
		Ok(())
	}

	/// Navigates the primary document and waits for the requested settle point.
	///
	/// On timeout the engine may keep loading in the background; no
	/// cancellation is sent.
	pub async fn navigate(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> Result<NavigateOutcome> {
		let mut events = self.connection.subscribe();

		let result = self.send("Page.navigate", json!({ "url": url })).await?;
		if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
			if !error_text.is_empty() {
				return Err(EngineError::Navigation {
					url: url.to_string(),
					reason: error_text.to_string(),
				});
			}
		}
		let loader_id = result.get("loaderId").and_then(Value::as_str).map(str::to_string);

		let settled = self.await_lifecycle(&mut events, lifecycle_name(wait_until), loader_id.as_deref());
		tokio::time::timeout(timeout, settled).await.map_err(|_| EngineError::NavigationTimeout {
			url: url.to_string(),
			timeout_ms: timeout.as_millis() as u64,
		})??;

		let title = self.evaluate_string("document.title").await?;
		let final_url = self.evaluate_string("location.href").await?;
		Ok(NavigateOutcome {
			url: if final_url.is_empty() { url.to_string() } else { final_url },
			title,
		})
	}

	async fn await_lifecycle(&self, events: &mut broadcast::Receiver<crate::connection::Event>, name: &str, loader_id: Option<&str>) -> Result<()> {
		loop {
			let event = match events.recv().await {
				Ok(event) => event,
				Err(broadcast::error::RecvError::Lagged(_)) => continue,
				Err(broadcast::error::RecvError::Closed) => return Err(EngineError::ChannelClosed),
			};
			if event.method != "Page.lifecycleEvent" || event.session_id.as_deref() != Some(self.session_id.as_str()) {
				continue;
			}
			if event.params.get("name").and_then(Value::as_str) != Some(name) {
				continue;
			}
			let loader_matches = match (loader_id, event.params.get("loaderId").and_then(Value::as_str)) {
				(Some(expected), Some(actual)) => expected == actual,
				_ => true,
			};
			if loader_matches {
				return Ok(());
			}
		}
	}

	/// Evaluates a script against the document and returns its value.
	pub async fn evaluate(&self, script: &str) -> Result<Value> {
		let result = self
			.send("Runtime.evaluate", json!({ "expression": script, "returnByValue": true, "awaitPromise": true }))
			.await?;

		if let Some(details) = result.get("exceptionDetails") {
			let reason = details
				.pointer("/exception/description")
				.and_then(Value::as_str)
				.or_else(|| details.get("text").and_then(Value::as_str))
				.unwrap_or("script threw an exception");
			return Err(EngineError::Script(reason.to_string()));
		}

		Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
	}

	async fn evaluate_string(&self, expression: &str) -> Result<String> {
		Ok(self.evaluate(expression).await?.as_str().unwrap_or_default().to_string())
	}

	/// Renders the current document to image bytes.
	pub async fn screenshot(&self, full_page: bool, format: ImageFormat) -> Result<Vec<u8>> {
		let result = self
			.send(
				"Page.captureScreenshot",
				json!({ "format": image_format_name(format), "captureBeyondViewport": full_page }),
			)
			.await?;
		decode_capture(&result)
	}

	/// Renders the current document to PDF bytes.
	pub async fn pdf(&self, format: PaperFormat, landscape: bool) -> Result<Vec<u8>> {
		let (width, height) = paper_inches(format);
		let result = self
			.send(
				"Page.printToPDF",
				json!({ "landscape": landscape, "paperWidth": width, "paperHeight": height, "printBackground": true }),
			)
			.await?;
		decode_capture(&result)
	}

	/// Returns the engine's raw accessibility tree for the document.
	pub async fn accessibility_snapshot(&self) -> Result<Value> {
		self.send("Accessibility.getFullAXTree", Value::Null).await
	}

	async fn send(&self, method: &str, params: Value) -> Result<Value> {
		self.connection.send_command(method, params, Some(&self.session_id)).await
	}
}

fn lifecycle_name(wait_until: WaitUntil) -> &'static str {
	match wait_until {
		WaitUntil::Load => "load",
		WaitUntil::DomContentLoaded => "DOMContentLoaded",
		WaitUntil::NetworkIdle => "networkIdle",
	}
}

fn image_format_name(format: ImageFormat) -> &'static str {
	match format {
		ImageFormat::Png => "png",
		ImageFormat::Jpeg => "jpeg",
	}
}

fn paper_inches(format: PaperFormat) -> (f64, f64) {
	match format {
		PaperFormat::A4 => (8.27, 11.69),
		PaperFormat::A3 => (11.69, 16.54),
		PaperFormat::Letter => (8.5, 11.0),
		PaperFormat::Legal => (8.5, 14.0),
		PaperFormat::Tabloid => (11.0, 17.0),
	}
}

fn decode_capture(result: &Value) -> Result<Vec<u8>> {
	let data = result
		.get("data")
		.and_then(Value::as_str)
		.ok_or_else(|| EngineError::Protocol("capture response missing data payload".to_string()))?;
	BASE64
		.decode(data)
		.map_err(|e| EngineError::Protocol(format!("capture payload is not valid base64: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lifecycle_names_match_wire_values() {
		assert_eq!(lifecycle_name(WaitUntil::Load), "load");
		assert_eq!(lifecycle_name(WaitUntil::DomContentLoaded), "DOMContentLoaded");
		assert_eq!(lifecycle_name(WaitUntil::NetworkIdle), "networkIdle");
	}

	#[test]
	fn capture_decoding_rejects_missing_payload() {
		let err = decode_capture(&json!({})).unwrap_err();
		assert!(matches!(err, EngineError::Protocol(_)));

		let decoded = decode_capture(&json!({ "data": BASE64.encode("bytes") })).unwrap();
		assert_eq!(decoded, b"bytes");
	}

	#[test]
	fn paper_sizes_cover_all_formats() {
		assert_eq!(paper_inches(PaperFormat::A4), (8.27, 11.69));
		assert_eq!(paper_inches(PaperFormat::Letter), (8.5, 11.0));
	}
}
