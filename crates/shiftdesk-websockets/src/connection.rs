//! Socket handle and message types
//!
//! A [`WebSocketConnection`] is the sending half of a channel drained by the
//! transport task that owns the actual socket.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum WebSocketError {
	#[error("Connection closed")]
	Closed,
	#[error("Send error: {0}")]
	Send(String),
	#[error("Protocol error: {0}")]
	Protocol(String),
}

pub type WebSocketResult<T> = Result<T, WebSocketError>;

/// WebSocket message types
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Message {
	Text { data: String },
	Binary { data: Vec<u8> },
	Ping,
	Pong,
	Close { code: u16, reason: String },
}

impl Message {
	pub fn text(data: impl Into<String>) -> Self {
		Self::Text { data: data.into() }
	}

	pub fn binary(data: Vec<u8>) -> Self {
		Self::Binary { data }
	}

	/// Creates a text message containing JSON-serialized data.
	///
	/// # Examples
	///
	/// ```
	/// use shiftdesk_websockets::Message;
	/// use serde::Serialize;
	///
	/// #[derive(Serialize)]
	/// struct ShiftUpdate {
	///     shift_id: i64,
	///     status: &'static str,
	/// }
	///
	/// let msg = Message::json(&ShiftUpdate { shift_id: 7, status: "filled" }).unwrap();
	/// match msg {
	///     Message::Text { data } => assert!(data.contains("filled")),
	///     _ => panic!("Expected text message"),
	/// }
	/// ```
	pub fn json<T: serde::Serialize>(data: &T) -> WebSocketResult<Self> {
		let json =
			serde_json::to_string(data).map_err(|e| WebSocketError::Protocol(e.to_string()))?;
		Ok(Self::text(json))
	}

	/// Parses the message content as JSON into the target type.
	pub fn parse_json<T: serde::de::DeserializeOwned>(&self) -> WebSocketResult<T> {
		match self {
			Message::Text { data } => {
				serde_json::from_str(data).map_err(|e| WebSocketError::Protocol(e.to_string()))
			}
			_ => Err(WebSocketError::Protocol("Not a text message".to_string())),
		}
	}
}

/// Sending handle for one client socket
#[derive(Debug)]
pub struct WebSocketConnection {
	id: String,
	tx: mpsc::UnboundedSender<Message>,
	closed: AtomicBool,
}

impl WebSocketConnection {
	pub fn new(id: impl Into<String>, tx: mpsc::UnboundedSender<Message>) -> Self {
		Self {
			id: id.into(),
			tx,
			closed: AtomicBool::new(false),
		}
	}

	/// Create a connection together with the receiver the transport drains
	///
	/// # Examples
	///
	/// ```
	/// use shiftdesk_websockets::{Message, WebSocketConnection};
	///
	/// let (conn, mut rx) = WebSocketConnection::channel("ws-1");
	/// conn.send(Message::text("hello")).unwrap();
	/// assert_eq!(rx.try_recv().unwrap(), Message::text("hello"));
	/// ```
	pub fn channel(id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Message>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self::new(id, tx), rx)
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	/// Queue a message for the socket
	///
	/// Fails once the connection is closed or the transport has dropped its
	/// receiver.
	pub fn send(&self, message: Message) -> WebSocketResult<()> {
		if self.is_closed() {
			return Err(WebSocketError::Closed);
		}
		self.tx
			.send(message)
			.map_err(|e| WebSocketError::Send(e.to_string()))
	}

	pub fn send_json<T: serde::Serialize>(&self, data: &T) -> WebSocketResult<()> {
		self.send(Message::json(data)?)
	}

	/// Queue a close frame and mark the connection closed
	pub fn close(&self, code: u16, reason: impl Into<String>) -> WebSocketResult<()> {
		let result = self
			.tx
			.send(Message::Close {
				code,
				reason: reason.into(),
			})
			.map_err(|e| WebSocketError::Send(e.to_string()));
		self.closed.store(true, Ordering::Release);
		result
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire) || self.tx.is_closed()
	}
}
