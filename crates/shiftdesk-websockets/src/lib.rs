//! Realtime connections for shiftdesk
//!
//! Tracks which users hold live sockets, mirrors that presence into the
//! shared store, and pushes schedule updates to users, managers, or everyone.
//!
//! ## Modules
//!
//! - [`connection`]: [`WebSocketConnection`] handle and [`Message`] frames
//! - [`descriptor`]: [`ConnectionDescriptor`], the store-side view of a socket
//! - [`directory`]: [`ConnectionDirectory`] of sockets owned by this process
//! - [`registry`]: [`ConnectionRegistry`] (register, fan out, heartbeat, reap)
//! - [`metrics`]: [`WebSocketMetrics`] counters
//!
//! ## Example
//!
//! ```no_run
//! use shiftdesk_conf::{RealtimeSettings, SessionSettings};
//! use shiftdesk_sessions::{SessionManager, UserData};
//! use shiftdesk_store::{InMemoryStore, RetryPolicy, StoreClient};
//! use shiftdesk_websockets::{ConnectionRegistry, Message, WebSocketConnection};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let client = StoreClient::from_store(Arc::new(InMemoryStore::new()), RetryPolicy::default());
//! let sessions = Arc::new(SessionManager::new(client.clone(), SessionSettings::default()));
//! let registry = ConnectionRegistry::new(client, sessions.clone(), &RealtimeSettings::default());
//!
//! let user = UserData::new(7, "dana");
//! let (session_id, _csrf) = sessions.create_secure_session(&user, None).await.unwrap();
//!
//! let (socket, mut rx) = WebSocketConnection::channel("ws-1");
//! registry.register_connection(Arc::new(socket), "ws-1", &session_id, &user).await;
//! registry.send_to_user(7, &Message::text("shift published")).await;
//! assert!(rx.recv().await.is_some());
//! # }
//! ```

pub mod connection;
pub mod descriptor;
pub mod directory;
pub mod metrics;
pub mod registry;

pub use connection::{Message, WebSocketConnection, WebSocketError, WebSocketResult};
pub use descriptor::{ConnectionDescriptor, DescriptorError};
pub use directory::{ConnectionDirectory, LocalConnection};
pub use metrics::{MetricsSnapshot, WebSocketMetrics};
pub use registry::ConnectionRegistry;
