//! In-memory transport for exercising the engine layers without a browser.
//!
//! [`FakeTransportBuilder`] produces the same [`TransportParts`] the
//! websocket transport does, plus a controller for injecting frames and
//! inspecting sent commands. [`FakeBrowser`] drives the controller with
//! canned responses so higher layers can run complete flows in tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};

use crate::error::Result;
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Builder for the in-memory transport pair.
pub struct FakeTransportBuilder {}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self {}
	}

	/// Builds transport parts for a [`Connection`] plus the controlling half.
	///
	/// [`Connection`]: crate::connection::Connection
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let (sent_tx, sent_rx) = mpsc::unbounded_channel();

		let parts = TransportParts {
			sender: Box::new(FakeTransportSender { sent_tx }),
			receiver: Box::new(FakeTransportReceiver { inbound_rx, message_tx }),
			message_rx,
		};
		let controller = FakeTransportController {
			inbound_tx,
			sent_rx: Arc::new(Mutex::new(sent_rx)),
		};

		(parts, controller)
	}
}

impl Default for FakeTransportBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Injects frames into the connection and observes sent commands.
pub struct FakeTransportController {
	inbound_tx: mpsc::UnboundedSender<Value>,
	sent_rx: Arc<Mutex<mpsc::UnboundedReceiver<Value>>>,
}

impl FakeTransportController {
	/// Injects a raw frame as if the engine had sent it.
	pub fn inject(&self, message: Value) {
		let _ = self.inbound_tx.send(message);
	}

	/// Injects a success response for command `id`.
	pub fn inject_response(&self, id: u64, result: Value) {
		self.inject(json!({ "id": id, "result": result }));
	}

	/// Injects an error response for command `id`.
	pub fn inject_error(&self, id: u64, code: i64, message: &str) {
		self.inject(json!({ "id": id, "error": { "code": code, "message": message } }));
	}

	/// Injects an event frame, optionally scoped to a protocol session.
	pub fn inject_event(&self, method: &str, params: Value, session_id: Option<&str>) {
		match session_id {
			Some(session_id) => self.inject(json!({ "method": method, "params": params, "sessionId": session_id })),
			None => self.inject(json!({ "method": method, "params": params })),
		}
	}

	/// Awaits the next command sent through the transport.
	pub async fn recv_sent(&self) -> Option<Value> {
		self.sent_rx.lock().await.recv().await
	}
}

struct FakeTransportSender {
	sent_tx: mpsc::UnboundedSender<Value>,
}

impl Transport for FakeTransportSender {
	fn send(&mut self, message: Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
		let sent_tx = self.sent_tx.clone();
		Box::pin(async move {
			let _ = sent_tx.send(message);
			Ok(())
		})
	}
}

struct FakeTransportReceiver {
	inbound_rx: mpsc::UnboundedReceiver<Value>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for FakeTransportReceiver {
	fn run(mut self: Box<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(message) = self.inbound_rx.recv().await {
				if self.message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}

/// Scripted engine that answers protocol commands the way a browser would.
///
/// Behavior contract used by tests across the workspace:
/// * navigations settle with all three lifecycle events, except URLs whose
///   host contains `hang`, which never settle;
/// * URLs whose host contains `unresolvable` fail with a resolver error;
/// * page titles derive from the host (`example.test` becomes `Example`);
/// * `document.title` / `location.href` evaluate against per-session state,
///   `N+M` sums integers, and expressions containing `throw` raise.
pub struct FakeBrowser;

impl FakeBrowser {
	/// Consumes the controller and answers commands until the peer closes.
	pub fn attach(controller: FakeTransportController) {
		tokio::spawn(async move {
			let mut state = BrowserState::default();
			while let Some(command) = controller.recv_sent().await {
				for message in state.handle(&command) {
					controller.inject(message);
				}
			}
		});
	}
}

#[derive(Default)]
struct BrowserState {
	serial: u64,
	contexts: HashSet<String>,
	context_sessions: HashMap<String, Vec<String>>,
	pages: HashMap<String, PageState>,
}

#[derive(Default, Clone)]
struct PageState {
	url: String,
	title: String,
}

impl BrowserState {
	fn next(&mut self, prefix: &str) -> String {
		self.serial += 1;
		format!("{prefix}-{}", self.serial)
	}

	fn handle(&mut self, command: &Value) -> Vec<Value> {
		let id = command["id"].as_u64().unwrap_or(0);
		let method = command["method"].as_str().unwrap_or_default().to_string();
		let params = command["params"].clone();
		let session_id = command["sessionId"].as_str().map(str::to_string);

		match method.as_str() {
			"Browser.getVersion" => vec![respond(id, json!({ "product": "FakeBrowser/1.0", "protocolVersion": "1.3" }))],
			"Browser.close" => vec![respond(id, json!({}))],
			"Target.createBrowserContext" => {
				let context_id = self.next("fake-context");
				self.contexts.insert(context_id.clone());
				self.context_sessions.insert(context_id.clone(), Vec::new());
				vec![respond(id, json!({ "browserContextId": context_id }))]
			}
			"Target.createTarget" => {
				let context_id = params["browserContextId"].as_str().unwrap_or_default();
				if !self.contexts.contains(context_id) {
					return vec![fail(id, -32602, &format!("Failed to find browser context with id {context_id}"))];
				}
				// Targets and their protocol sessions are keyed together; the
				// session id handed out by attachToTarget is derived from the
				// target id so the attach step can find it.
				let target_id = self.next("fake-target");
				self.context_sessions.entry(context_id.to_string()).or_default().push(target_id.clone());
				self.pages.insert(
					format!("session-for-{target_id}"),
					PageState {
						url: params["url"].as_str().unwrap_or("about:blank").to_string(),
						title: String::new(),
					},
				);
				vec![respond(id, json!({ "targetId": target_id }))]
			}
			"Target.attachToTarget" => {
				let target_id = params["targetId"].as_str().unwrap_or_default();
				let session = format!("session-for-{target_id}");
				if !self.pages.contains_key(&session) {
					return vec![fail(id, -32602, &format!("No target with given id found: {target_id}"))];
				}
				vec![respond(id, json!({ "sessionId": session }))]
			}
			"Target.disposeBrowserContext" => {
				let context_id = params["browserContextId"].as_str().unwrap_or_default();
				if !self.contexts.remove(context_id) {
					return vec![fail(id, -32602, &format!("Failed to find context with id {context_id}"))];
				}
				for target_id in self.context_sessions.remove(context_id).unwrap_or_default() {
					self.pages.remove(&format!("session-for-{target_id}"));
				}
				vec![respond(id, json!({}))]
			}
			"Page.navigate" => self.navigate(id, &params, session_id.as_deref()),
			"Runtime.evaluate" => self.evaluate(id, &params, session_id.as_deref()),
			"Page.captureScreenshot" => {
				let format = params["format"].as_str().unwrap_or("png");
				let data = BASE64.encode(format!("fake-{format}-image"));
				vec![respond(id, json!({ "data": data }))]
			}
			"Page.printToPDF" => {
				let data = BASE64.encode("%PDF-1.4 fake");
				vec![respond(id, json!({ "data": data }))]
			}
			"Accessibility.getFullAXTree" => {
				let title = self.page(session_id.as_deref()).map(|page| page.title.clone()).unwrap_or_default();
				vec![respond(
					id,
					json!({
						"nodes": [{
							"nodeId": "1",
							"role": { "type": "role", "value": "RootWebArea" },
							"name": { "type": "computedString", "value": title }
						}]
					}),
				)]
			}
			method if method.starts_with("Page.") || method.starts_with("Runtime.") || method.starts_with("Emulation.") || method.starts_with("Network.") => {
				vec![respond(id, json!({}))]
			}
			other => vec![fail(id, -32601, &format!("'{other}' wasn't found"))],
		}
	}

	fn page(&mut self, session_id: Option<&str>) -> Option<&mut PageState> {
		self.pages.get_mut(session_id?)
	}

	fn navigate(&mut self, id: u64, params: &Value, session_id: Option<&str>) -> Vec<Value> {
		let url = params["url"].as_str().unwrap_or_default().to_string();
		let host = host_of(&url);
		let loader_id = self.next("fake-loader");
		let Some(session_id) = session_id else {
			return vec![fail(id, -32000, "Page.navigate requires a session")];
		};

		if host.contains("unresolvable") {
			return vec![respond(id, json!({ "frameId": "fake-frame", "loaderId": loader_id, "errorText": "net::ERR_NAME_NOT_RESOLVED" }))];
		}

		if let Some(page) = self.pages.get_mut(session_id) {
			page.url = url.clone();
			page.title = title_of(&host);
		}

		let mut messages = vec![respond(id, json!({ "frameId": "fake-frame", "loaderId": loader_id }))];
		if !host.contains("hang") {
			for name in ["DOMContentLoaded", "load", "networkIdle"] {
				messages.push(json!({
					"method": "Page.lifecycleEvent",
					"params": { "frameId": "fake-frame", "loaderId": loader_id, "name": name },
					"sessionId": session_id
				}));
			}
		}
		messages
	}

	fn evaluate(&mut self, id: u64, params: &Value, session_id: Option<&str>) -> Vec<Value> {
		let expression = params["expression"].as_str().unwrap_or_default().trim().to_string();
		let page = self.page(session_id).cloned().unwrap_or_default();

		if expression.contains("throw") {
			return vec![respond(
				id,
				json!({
					"result": { "type": "object", "subtype": "error" },
					"exceptionDetails": {
						"text": "Uncaught",
						"exception": { "type": "object", "subtype": "error", "description": "Error: boom" }
					}
				}),
			)];
		}

		let value = match expression.as_str() {
			"document.title" => json!(page.title),
			"location.href" => json!(page.url),
			other => sum_expression(other).map(|sum| json!(sum)).unwrap_or(Value::Null),
		};
		vec![respond(id, json!({ "result": { "type": "object", "value": value } }))]
	}
}

fn respond(id: u64, result: Value) -> Value {
	json!({ "id": id, "result": result })
}

fn fail(id: u64, code: i64, message: &str) -> Value {
	json!({ "id": id, "error": { "code": code, "message": message } })
}

fn host_of(url: &str) -> String {
	let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
	rest.split(['/', ':', '?']).next().unwrap_or_default().to_string()
}

fn title_of(host: &str) -> String {
	let label = host.split('.').next().unwrap_or_default();
	let mut chars = label.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
		None => String::new(),
	}
}

fn sum_expression(expression: &str) -> Option<i64> {
	let (left, right) = expression.split_once('+')?;
	Some(left.trim().parse::<i64>().ok()? + right.trim().parse::<i64>().ok()?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hosts_and_titles_derive_from_urls() {
		assert_eq!(host_of("https://example.test/path?q=1"), "example.test");
		assert_eq!(host_of("about:blank"), "about");
		assert_eq!(title_of("example.test"), "Example");
		assert_eq!(title_of(""), "");
	}

	#[test]
	fn sum_expressions_evaluate() {
		assert_eq!(sum_expression("1+1"), Some(2));
		assert_eq!(sum_expression(" 2 + 40 "), Some(42));
		assert_eq!(sum_expression("document.title"), None);
	}
}
