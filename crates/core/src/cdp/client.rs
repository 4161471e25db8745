//! DevTools WebSocket client.
//!
//! One WebSocket per browser process. Requests are matched to responses by
//! id; events fan out to registered subscribers from the reader task. The
//! client stays deliberately thin: no retries, no queueing, callers see
//! protocol errors as-is.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Error)]
pub enum CdpError {
	#[error("websocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("malformed devtools frame: {0}")]
	Json(#[from] serde_json::Error),

	#[error("devtools error {code}: {message}")]
	Protocol { code: i64, message: String },

	#[error("devtools connection closed")]
	Closed,
}

#[derive(Debug, Serialize)]
struct CdpRequest<'a> {
	id: u64,
	method: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	params: Option<Value>,
	#[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
	session_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CdpResponse {
	id: u64,
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<CdpProtocolError>,
}

#[derive(Debug, Deserialize)]
struct CdpProtocolError {
	code: i64,
	message: String,
}

/// An unsolicited protocol event.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
	pub method: String,
	#[serde(default)]
	pub params: Value,
	#[serde(rename = "sessionId", default)]
	pub session_id: Option<String>,
}

// Responses carry `id`, events carry `method`; untagged disambiguates.
#[derive(Deserialize)]
#[serde(untagged)]
enum CdpMessage {
	Response(CdpResponse),
	Event(CdpEvent),
}

pub type EventCallback = Arc<dyn Fn(&CdpEvent) + Send + Sync>;

pub struct CdpClient {
	next_id: AtomicU64,
	pending: DashMap<u64, oneshot::Sender<CdpResponse>>,
	subscribers: DashMap<String, Vec<EventCallback>>,
	sink: Mutex<WsSink>,
	shutdown: mpsc::Sender<()>,
}

impl CdpClient {
	/// Connects and spawns the reader task.
	pub async fn connect(ws_url: &str) -> Result<Arc<Self>, CdpError> {
		let (stream, _) = connect_async(ws_url).await?;
		let (sink, mut source) = stream.split();
		let (shutdown, mut shutdown_rx) = mpsc::channel::<()>(1);

		let client = Arc::new(Self {
			next_id: AtomicU64::new(1),
			pending: DashMap::new(),
			subscribers: DashMap::new(),
			sink: Mutex::new(sink),
			shutdown,
		});

		let reader = client.clone();
		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = shutdown_rx.recv() => break,
					message = source.next() => match message {
						Some(Ok(Message::Text(text))) => reader.dispatch(&text),
						Some(Ok(Message::Close(_))) | None => break,
						Some(Err(err)) => {
							warn!(
								target: "sessionprobe::cdp",
								error = %err,
								"websocket read failed"
							);
							break;
						}
						_ => {}
					},
				}
			}
			// wake anything still waiting with a Closed error
			reader.pending.clear();
		});

		Ok(client)
	}

	/// Sends one request and waits for its response.
	pub async fn call(
		&self,
		method: &str,
		params: Option<Value>,
		session_id: Option<&str>,
	) -> Result<Value, CdpError> {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.pending.insert(id, tx);

		let request = CdpRequest {
			id,
			method,
			params,
			session_id,
		};
		let json = serde_json::to_string(&request)?;
		trace!(target: "sessionprobe::cdp", id, method, "request");

		{
			let mut sink = self.sink.lock().await;
			if let Err(err) = sink.send(Message::Text(json)).await {
				self.pending.remove(&id);
				return Err(err.into());
			}
		}

		let response = rx.await.map_err(|_| CdpError::Closed)?;
		if let Some(error) = response.error {
			return Err(CdpError::Protocol {
				code: error.code,
				message: error.message,
			});
		}
		Ok(response.result.unwrap_or(Value::Null))
	}

	/// Registers a callback for events with the given method name.
	pub fn subscribe(&self, method: impl Into<String>, callback: EventCallback) {
		self.subscribers.entry(method.into()).or_default().push(callback);
	}

	fn dispatch(&self, text: &str) {
		match serde_json::from_str::<CdpMessage>(text) {
			Ok(CdpMessage::Response(response)) => {
				if let Some((_, tx)) = self.pending.remove(&response.id) {
					let _ = tx.send(response);
				} else {
					debug!(
						target: "sessionprobe::cdp",
						id = response.id,
						"response for unknown request"
					);
				}
			}
			Ok(CdpMessage::Event(event)) => {
				trace!(target: "sessionprobe::cdp", method = %event.method, "event");
				if let Some(callbacks) = self.subscribers.get(&event.method) {
					for callback in callbacks.value() {
						callback(&event);
					}
				}
			}
			Err(err) => {
				debug!(
					target: "sessionprobe::cdp",
					error = %err,
					"unparseable devtools frame"
				);
			}
		}
	}

	/// Stops the reader task and closes the socket.
	pub async fn close(&self) -> Result<(), CdpError> {
		let _ = self.shutdown.send(()).await;
		let mut sink = self.sink.lock().await;
		sink.close().await?;
		Ok(())
	}
}
