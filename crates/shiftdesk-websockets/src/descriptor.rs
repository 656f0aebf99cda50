//! Socket-free connection descriptors mirrored into the store

use chrono::{DateTime, Utc};
use shiftdesk_sessions::SessionRecord;
use std::collections::HashMap;
use std::time::Duration;

/// A descriptor could not be decoded from its stored hash
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
	#[error("Missing descriptor field {0}")]
	MissingField(&'static str),
	#[error("Invalid descriptor field {field}: {value:?}")]
	InvalidField { field: &'static str, value: String },
}

/// Who is connected where, without the socket itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
	pub websocket_id: String,
	pub session_id: String,
	pub user_id: i64,
	pub username: String,
	pub is_manager: bool,
	pub connected_at: DateTime<Utc>,
	pub last_heartbeat: DateTime<Utc>,
}

impl ConnectionDescriptor {
	pub fn new(websocket_id: impl Into<String>, session: &SessionRecord, now: DateTime<Utc>) -> Self {
		Self {
			websocket_id: websocket_id.into(),
			session_id: session.session_id.clone(),
			user_id: session.user_id,
			username: session.username.clone(),
			is_manager: session.is_manager,
			connected_at: now,
			last_heartbeat: now,
		}
	}

	/// Whether the last heartbeat is older than `threshold` at `now`
	pub fn is_stale_at(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
		match chrono::Duration::from_std(threshold) {
			Ok(threshold) => now - self.last_heartbeat > threshold,
			Err(_) => false,
		}
	}

	/// Hash fields as stored at `ws:connection:<websocket_id>`
	pub fn to_fields(&self) -> Vec<(String, String)> {
		vec![
			("websocket_id".to_string(), self.websocket_id.clone()),
			("session_id".to_string(), self.session_id.clone()),
			("user_id".to_string(), self.user_id.to_string()),
			("username".to_string(), self.username.clone()),
			("is_manager".to_string(), self.is_manager.to_string()),
			("connected_at".to_string(), self.connected_at.to_rfc3339()),
			("last_heartbeat".to_string(), self.last_heartbeat.to_rfc3339()),
		]
	}

	/// Decode a stored hash
	///
	/// # Examples
	///
	/// ```
	/// use shiftdesk_websockets::ConnectionDescriptor;
	/// use std::collections::HashMap;
	///
	/// let mut fields = HashMap::new();
	/// fields.insert("user_id".to_string(), "forty-two".to_string());
	///
	/// assert!(ConnectionDescriptor::from_fields(&fields).is_err());
	/// ```
	pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, DescriptorError> {
		fn field<'a>(
			fields: &'a HashMap<String, String>,
			name: &'static str,
		) -> Result<&'a str, DescriptorError> {
			fields
				.get(name)
				.map(String::as_str)
				.ok_or(DescriptorError::MissingField(name))
		}

		fn invalid(field: &'static str, value: &str) -> DescriptorError {
			DescriptorError::InvalidField {
				field,
				value: value.to_string(),
			}
		}

		fn timestamp(
			fields: &HashMap<String, String>,
			name: &'static str,
		) -> Result<DateTime<Utc>, DescriptorError> {
			let raw = field(fields, name)?;
			DateTime::parse_from_rfc3339(raw)
				.map(|t| t.with_timezone(&Utc))
				.map_err(|_| invalid(name, raw))
		}

		let user_id = field(fields, "user_id")?;
		let is_manager = field(fields, "is_manager")?;

		Ok(Self {
			websocket_id: field(fields, "websocket_id")?.to_string(),
			session_id: field(fields, "session_id")?.to_string(),
			user_id: user_id.parse().map_err(|_| invalid("user_id", user_id))?,
			username: field(fields, "username")?.to_string(),
			is_manager: is_manager
				.parse()
				.map_err(|_| invalid("is_manager", is_manager))?,
			connected_at: timestamp(fields, "connected_at")?,
			last_heartbeat: timestamp(fields, "last_heartbeat")?,
		})
	}
}
