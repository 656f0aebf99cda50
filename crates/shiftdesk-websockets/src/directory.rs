//! Process-local connection directory
//!
//! Holds the live socket handles owned by this process, indexed by
//! websocket id and by user. Backed by [`DashMap`]; no method holds a shard
//! guard past its return, so callers may await freely between calls.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::connection::WebSocketConnection;
use crate::descriptor::ConnectionDescriptor;

/// A socket held by this process together with its descriptor
#[derive(Debug, Clone)]
pub struct LocalConnection {
	pub socket: Arc<WebSocketConnection>,
	pub descriptor: ConnectionDescriptor,
}

impl LocalConnection {
	pub fn user_id(&self) -> i64 {
		self.descriptor.user_id
	}

	pub fn is_manager(&self) -> bool {
		self.descriptor.is_manager
	}
}

#[derive(Debug, Default)]
pub struct ConnectionDirectory {
	sockets: DashMap<String, LocalConnection>,
	by_user: DashMap<i64, HashSet<String>>,
}

impl ConnectionDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert or replace a connection, returning the one it replaced
	pub fn insert(&self, connection: LocalConnection) -> Option<LocalConnection> {
		let websocket_id = connection.descriptor.websocket_id.clone();
		let user_id = connection.user_id();

		let previous = self.sockets.insert(websocket_id.clone(), connection);
		if let Some(previous) = &previous
			&& previous.user_id() != user_id
		{
			self.unindex(previous.user_id(), &websocket_id);
		}
		self.by_user
			.entry(user_id)
			.or_default()
			.insert(websocket_id);
		previous
	}

	pub fn remove(&self, websocket_id: &str) -> Option<LocalConnection> {
		let (_, removed) = self.sockets.remove(websocket_id)?;
		self.unindex(removed.user_id(), websocket_id);
		Some(removed)
	}

	fn unindex(&self, user_id: i64, websocket_id: &str) {
		if let Some(mut ids) = self.by_user.get_mut(&user_id) {
			ids.remove(websocket_id);
		}
		self.by_user.remove_if(&user_id, |_, ids| ids.is_empty());
	}

	pub fn get(&self, websocket_id: &str) -> Option<LocalConnection> {
		self.sockets
			.get(websocket_id)
			.map(|entry| entry.value().clone())
	}

	pub fn contains(&self, websocket_id: &str) -> bool {
		self.sockets.contains_key(websocket_id)
	}

	/// Record a heartbeat, returning the updated descriptor
	pub fn touch(&self, websocket_id: &str, now: DateTime<Utc>) -> Option<ConnectionDescriptor> {
		let mut entry = self.sockets.get_mut(websocket_id)?;
		entry.descriptor.last_heartbeat = now;
		Some(entry.descriptor.clone())
	}

	pub fn user_connection_ids(&self, user_id: i64) -> Vec<String> {
		self.by_user
			.get(&user_id)
			.map(|ids| ids.iter().cloned().collect())
			.unwrap_or_default()
	}

	pub fn manager_connection_ids(&self) -> Vec<String> {
		self.sockets
			.iter()
			.filter(|entry| entry.is_manager())
			.map(|entry| entry.key().clone())
			.collect()
	}

	pub fn connection_ids(&self) -> Vec<String> {
		self.sockets.iter().map(|entry| entry.key().clone()).collect()
	}

	/// Descriptors of every local connection
	pub fn descriptors(&self) -> Vec<ConnectionDescriptor> {
		self.sockets
			.iter()
			.map(|entry| entry.descriptor.clone())
			.collect()
	}

	pub fn len(&self) -> usize {
		self.sockets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sockets.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn local(websocket_id: &str, user_id: i64, is_manager: bool) -> LocalConnection {
		let now = Utc::now();
		let (socket, _rx) = WebSocketConnection::channel(websocket_id);
		LocalConnection {
			socket: Arc::new(socket),
			descriptor: ConnectionDescriptor {
				websocket_id: websocket_id.to_string(),
				session_id: "sid".to_string(),
				user_id,
				username: format!("user{}", user_id),
				is_manager,
				connected_at: now,
				last_heartbeat: now,
			},
		}
	}

	#[rstest]
	fn test_user_index_follows_inserts_and_removals() {
		let directory = ConnectionDirectory::new();
		directory.insert(local("a", 1, false));
		directory.insert(local("b", 1, true));
		directory.insert(local("c", 2, false));

		let mut ids = directory.user_connection_ids(1);
		ids.sort();
		assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
		assert_eq!(directory.manager_connection_ids(), vec!["b".to_string()]);

		assert!(directory.remove("a").is_some());
		assert!(directory.remove("a").is_none());
		assert_eq!(directory.user_connection_ids(1), vec!["b".to_string()]);

		directory.remove("b");
		assert!(directory.user_connection_ids(1).is_empty());
		assert_eq!(directory.len(), 1);
	}

	#[rstest]
	fn test_reinsert_under_new_user_moves_index() {
		let directory = ConnectionDirectory::new();
		directory.insert(local("a", 1, false));
		let previous = directory.insert(local("a", 2, false));

		assert_eq!(previous.map(|p| p.user_id()), Some(1));
		assert!(directory.user_connection_ids(1).is_empty());
		assert_eq!(directory.user_connection_ids(2), vec!["a".to_string()]);
	}

	#[rstest]
	fn test_touch_updates_heartbeat() {
		let directory = ConnectionDirectory::new();
		directory.insert(local("a", 1, false));
		let later = Utc::now() + chrono::Duration::seconds(5);

		let touched = directory.touch("a", later).unwrap();
		assert_eq!(touched.last_heartbeat, later);
		assert_eq!(directory.get("a").unwrap().descriptor.last_heartbeat, later);
		assert!(directory.touch("missing", later).is_none());
	}
}
