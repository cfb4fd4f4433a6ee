//! Request/response correlation over the engine transport.
//!
//! Commands carry a monotonically increasing `id`; the dispatch loop matches
//! response frames back to pending oneshot callbacks and fans frames without
//! an `id` out to event subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::transport::TransportParts;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Protocol command sent to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
	pub id: u64,
	pub method: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub params: Option<Value>,
	#[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Any frame received from the engine; responses carry `id`, events do not.
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
	#[serde(default)]
	pub id: Option<u64>,
	#[serde(default)]
	pub result: Option<Value>,
	#[serde(default)]
	pub error: Option<ProtocolError>,
	#[serde(default)]
	pub method: Option<String>,
	#[serde(default)]
	pub params: Option<Value>,
	#[serde(default, rename = "sessionId")]
	pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolError {
	pub code: i64,
	pub message: String,
}

/// Engine event fanned out to subscribers.
#[derive(Debug, Clone)]
pub struct Event {
	pub method: String,
	pub params: Value,
	pub session_id: Option<String>,
}

/// Correlation layer shared by the engine handle and every context.
#[derive(Debug)]
pub struct Connection {
	last_id: AtomicU64,
	callbacks: Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>,
	outbound_tx: mpsc::UnboundedSender<Value>,
	events: broadcast::Sender<Event>,
}

impl Connection {
	/// Starts the writer, receiver, and dispatch loops over `parts`.
	pub fn start(parts: TransportParts) -> Arc<Self> {
		let TransportParts {
			mut sender,
			receiver,
			mut message_rx,
		} = parts;

		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();
		let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
		let connection = Arc::new(Self {
			last_id: AtomicU64::new(0),
			callbacks: Mutex::new(HashMap::new()),
			outbound_tx,
			events,
		});

		tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if let Err(err) = sender.send(message).await {
					warn!(target = "bg.engine", error = %err, "engine send failed; stopping writer");
					break;
				}
			}
		});

		tokio::spawn(async move {
			if let Err(err) = receiver.run().await {
				warn!(target = "bg.engine", error = %err, "engine receive loop ended");
			}
		});

		let dispatcher = Arc::clone(&connection);
		tokio::spawn(async move {
			while let Some(frame) = message_rx.recv().await {
				dispatcher.dispatch(frame);
			}
			debug!(target = "bg.engine", "engine connection closed");
			dispatcher.fail_pending();
		});

		connection
	}

	/// Subscribes to engine events observed after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<Event> {
		self.events.subscribe()
	}

	/// Sends a command and awaits the correlated response.
	pub async fn send_command(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
		let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, tx);

		let command = Command {
			id,
			method: method.to_string(),
			params: if params.is_null() { None } else { Some(params) },
			session_id: session_id.map(str::to_string),
		};
		let message = serde_json::to_value(&command)?;
		if self.outbound_tx.send(message).is_err() {
			self.callbacks.lock().remove(&id);
			return Err(EngineError::ChannelClosed);
		}

		rx.await.map_err(|_| EngineError::ChannelClosed)?
	}

	fn dispatch(&self, message: Value) {
		let frame: Frame = match serde_json::from_value(message) {
			Ok(frame) => frame,
			Err(err) => {
				warn!(target = "bg.engine", error = %err, "discarding malformed engine frame");
				return;
			}
		};

		match frame.id {
			Some(id) => {
				let Some(callback) = self.callbacks.lock().remove(&id) else {
					warn!(target = "bg.engine", id, "response does not match a pending command");
					return;
				};
				let result = match frame.error {
					Some(error) => Err(EngineError::Protocol(error.message)),
					None => Ok(frame.result.unwrap_or(Value::Null)),
				};
				let _ = callback.send(result);
			}
			None => {
				let Some(method) = frame.method else {
					return;
				};
				let _ = self.events.send(Event {
					method,
					params: frame.params.unwrap_or(Value::Null),
					session_id: frame.session_id,
				});
			}
		}
	}

	fn fail_pending(&self) {
		let callbacks: Vec<_> = {
			let mut pending = self.callbacks.lock();
			pending.drain().map(|(_, tx)| tx).collect()
		};
		for callback in callbacks {
			let _ = callback.send(Err(EngineError::ChannelClosed));
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::fake_transport::FakeTransportBuilder;

	#[tokio::test]
	async fn correlates_response_by_id() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Connection::start(parts);

		let pending = tokio::spawn({
			let connection = Arc::clone(&connection);
			async move { connection.send_command("Browser.getVersion", Value::Null, None).await }
		});

		let sent = controller.recv_sent().await.expect("command should be sent");
		assert_eq!(sent["method"], "Browser.getVersion");
		controller.inject_response(sent["id"].as_u64().unwrap(), json!({"product": "FakeBrowser/1.0"}));

		let result = pending.await.unwrap().unwrap();
		assert_eq!(result["product"], "FakeBrowser/1.0");
	}

	#[tokio::test]
	async fn concurrent_commands_receive_their_own_responses() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Connection::start(parts);

		let first = tokio::spawn({
			let connection = Arc::clone(&connection);
			async move { connection.send_command("Page.navigate", json!({"url": "https://a.test"}), None).await }
		});
		let second = tokio::spawn({
			let connection = Arc::clone(&connection);
			async move { connection.send_command("Page.navigate", json!({"url": "https://b.test"}), None).await }
		});

		let sent_a = controller.recv_sent().await.unwrap();
		let sent_b = controller.recv_sent().await.unwrap();

		// Answer in reverse order; each caller still gets its own reply.
		controller.inject_response(sent_b["id"].as_u64().unwrap(), json!({"url": sent_b["params"]["url"]}));
		controller.inject_response(sent_a["id"].as_u64().unwrap(), json!({"url": sent_a["params"]["url"]}));

		let result_a = first.await.unwrap().unwrap();
		let result_b = second.await.unwrap().unwrap();
		assert_eq!(result_a["url"], sent_a["params"]["url"]);
		assert_eq!(result_b["url"], sent_b["params"]["url"]);
	}

	#[tokio::test]
	async fn protocol_errors_become_engine_errors() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Connection::start(parts);

		let pending = tokio::spawn({
			let connection = Arc::clone(&connection);
			async move { connection.send_command("Target.disposeBrowserContext", json!({"browserContextId": "nope"}), None).await }
		});

		let sent = controller.recv_sent().await.unwrap();
		controller.inject_error(sent["id"].as_u64().unwrap(), -32602, "Failed to find context with id nope");

		let err = pending.await.unwrap().unwrap_err();
		assert!(matches!(err, EngineError::Protocol(message) if message.contains("nope")));
	}

	#[tokio::test]
	async fn events_reach_subscribers() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Connection::start(parts);
		let mut events = connection.subscribe();

		controller.inject_event("Page.lifecycleEvent", json!({"name": "load"}), Some("session-1"));

		let event = events.recv().await.unwrap();
		assert_eq!(event.method, "Page.lifecycleEvent");
		assert_eq!(event.params["name"], "load");
		assert_eq!(event.session_id.as_deref(), Some("session-1"));
	}

	#[tokio::test]
	async fn closed_transport_fails_pending_commands() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Connection::start(parts);

		let pending = tokio::spawn({
			let connection = Arc::clone(&connection);
			async move { connection.send_command("Browser.close", Value::Null, None).await }
		});

		let _ = controller.recv_sent().await;
		drop(controller);

		let err = pending.await.unwrap().unwrap_err();
		assert!(matches!(err, EngineError::ChannelClosed));
	}
}
