//! Transport boundary between the connection layer and the engine socket.
//!
//! The production transport is the engine's devtools websocket. Tests swap
//! in the in-memory pair from [`crate::fake_transport`].

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::warn;

use crate::error::{EngineError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound half of an engine transport.
pub trait Transport: Send {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Inbound half of an engine transport; forwards frames until the peer closes.
pub trait TransportReceiver: Send {
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Bundle handed to [`crate::connection::Connection::start`].
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Connects to the engine's websocket endpoint and returns transport parts.
pub async fn connect(ws_url: &str) -> Result<TransportParts> {
	let (stream, _) = tokio_tungstenite::connect_async(ws_url)
		.await
		.map_err(|e| EngineError::Launch(format!("websocket connect to {ws_url} failed: {e}")))?;
	let (sink, source) = stream.split();
	let (message_tx, message_rx) = mpsc::unbounded_channel();

	Ok(TransportParts {
		sender: Box::new(WebSocketSender { sink }),
		receiver: Box::new(WebSocketReceiver { source, message_tx }),
		message_rx,
	})
}

struct WebSocketSender {
	sink: SplitSink<WsStream, Message>,
}

impl Transport for WebSocketSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink
				.send(Message::Text(text))
				.await
				.map_err(|e| EngineError::Protocol(format!("websocket send failed: {e}")))
		})
	}
}

struct WebSocketReceiver {
	source: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(frame) = self.source.next().await {
				let frame = frame.map_err(|e| EngineError::Protocol(format!("websocket receive failed: {e}")))?;
				let text = match frame {
					Message::Text(text) => text,
					Message::Close(_) => break,
					_ => continue,
				};
				let message = match serde_json::from_str::<Value>(&text) {
					Ok(message) => message,
					Err(err) => {
						warn!(target = "bg.engine", error = %err, "discarding unparseable engine frame");
						continue;
					}
				};
				if self.message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}
