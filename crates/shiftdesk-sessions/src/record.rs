//! Session records and the identity snapshot they carry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_login_method() -> String {
	"password".to_string()
}

/// Identity and role fields captured at login
///
/// # Examples
///
/// ```
/// use shiftdesk_sessions::UserData;
///
/// let alice = UserData::new(42, "alice").with_manager(true);
/// assert!(alice.is_manager);
/// assert_eq!(alice.login_method, "password");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
	pub user_id: i64,
	pub username: String,
	#[serde(default)]
	pub is_manager: bool,
	#[serde(default)]
	pub is_admin: bool,
	#[serde(default)]
	pub email: Option<String>,
	#[serde(default = "default_login_method")]
	pub login_method: String,
}

impl UserData {
	pub fn new(user_id: i64, username: impl Into<String>) -> Self {
		Self {
			user_id,
			username: username.into(),
			is_manager: false,
			is_admin: false,
			email: None,
			login_method: default_login_method(),
		}
	}

	pub fn with_manager(mut self, is_manager: bool) -> Self {
		self.is_manager = is_manager;
		self
	}

	pub fn with_admin(mut self, is_admin: bool) -> Self {
		self.is_admin = is_admin;
		self
	}

	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());
		self
	}

	pub fn with_login_method(mut self, login_method: impl Into<String>) -> Self {
		self.login_method = login_method.into();
		self
	}
}

/// A stored session
///
/// Serialized as JSON with RFC 3339 timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
	pub session_id: String,
	pub user_id: i64,
	pub username: String,
	pub is_manager: bool,
	pub is_admin: bool,
	pub email: Option<String>,
	pub csrf_token: String,
	pub client_ip: Option<String>,
	pub created_at: DateTime<Utc>,
	pub last_accessed: DateTime<Utc>,
	pub login_method: String,
}

impl SessionRecord {
	pub(crate) fn new(
		session_id: String,
		csrf_token: String,
		user: &UserData,
		client_ip: Option<&str>,
		now: DateTime<Utc>,
	) -> Self {
		Self {
			session_id,
			user_id: user.user_id,
			username: user.username.clone(),
			is_manager: user.is_manager,
			is_admin: user.is_admin,
			email: user.email.clone(),
			csrf_token,
			client_ip: client_ip.map(str::to_string),
			created_at: now,
			last_accessed: now,
			login_method: user.login_method.clone(),
		}
	}

	/// The identity snapshot this session was created from
	pub fn user_data(&self) -> UserData {
		UserData {
			user_id: self.user_id,
			username: self.username.clone(),
			is_manager: self.is_manager,
			is_admin: self.is_admin,
			email: self.email.clone(),
			login_method: self.login_method.clone(),
		}
	}

	/// Whether the session is older than `timeout` at `now`
	///
	/// Age counts from creation; sliding refreshes never extend it.
	pub fn is_expired_at(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
		match chrono::Duration::from_std(timeout) {
			Ok(timeout) => now - self.created_at > timeout,
			Err(_) => false,
		}
	}
}

/// Shortened session id for log fields
pub(crate) fn short_id(session_id: &str) -> &str {
	session_id.get(..8).unwrap_or(session_id)
}
