//! Session manager
//!
//! Sessions are stored as JSON at `<prefix><session_id>` with a TTL equal to
//! the configured timeout. Each user also has an index set
//! `user_sessions:<user_id>` listing their session ids.

use chrono::Utc;
use shiftdesk_conf::SessionSettings;
use shiftdesk_store::{RetryError, StoreClient};
use std::collections::HashSet;
use std::time::Duration;

use crate::csrf::{derive_csrf_token, generate_session_id, tokens_match};
use crate::error::SessionError;
use crate::password::PasswordSecurity;
use crate::record::{SessionRecord, UserData, short_id};

const USER_INDEX_PREFIX: &str = "user_sessions:";

fn user_index_key(user_id: i64) -> String {
	format!("{}{}", USER_INDEX_PREFIX, user_id)
}

/// Pinned sessions need both IPs present and equal
fn ip_matches(recorded: Option<&str>, presented: Option<&str>) -> bool {
	matches!((recorded, presented), (Some(recorded), Some(presented)) if recorded == presented)
}

fn timestamp_nanos() -> i64 {
	Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Creates, validates and invalidates store-backed sessions
///
/// Holds no in-process state beyond configuration; concurrent callers only
/// meet at the store, where the last write to a key wins.
///
/// # Examples
///
/// ```
/// use shiftdesk_conf::SessionSettings;
/// use shiftdesk_sessions::{SessionManager, UserData};
/// use shiftdesk_store::{InMemoryStore, RetryPolicy, StoreClient};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = StoreClient::from_store(Arc::new(InMemoryStore::new()), RetryPolicy::default());
/// let manager = SessionManager::new(client, SessionSettings::default());
///
/// let alice = UserData::new(42, "alice").with_manager(true);
/// let (session_id, csrf_token) = manager.create_secure_session(&alice, Some("10.0.0.1")).await?;
///
/// let record = manager
///     .validate_session(&session_id, Some(&csrf_token), Some("10.0.0.1"))
///     .await
///     .expect("fresh session is valid");
/// assert_eq!(record.user_id, 42);
///
/// assert!(manager.invalidate_session(&session_id).await);
/// assert!(manager.validate_session(&session_id, None, None).await.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionManager {
	client: StoreClient,
	settings: SessionSettings,
	passwords: PasswordSecurity,
}

impl SessionManager {
	pub fn new(client: StoreClient, settings: SessionSettings) -> Self {
		Self {
			client,
			settings,
			passwords: PasswordSecurity::default(),
		}
	}

	/// Replace the password handling used by [`login`](Self::login)
	pub fn with_password_security(mut self, passwords: PasswordSecurity) -> Self {
		self.passwords = passwords;
		self
	}

	pub fn password_security(&self) -> &PasswordSecurity {
		&self.passwords
	}

	pub fn settings(&self) -> &SessionSettings {
		&self.settings
	}

	fn timeout(&self) -> Duration {
		self.settings.timeout()
	}

	fn session_key(&self, session_id: &str) -> String {
		format!("{}{}", self.settings.key_prefix, session_id)
	}

	/// Create a session for an authenticated user
	///
	/// Returns `(session_id, csrf_token)`. The record write is retried under
	/// the store client's retry policy.
	///
	/// # Errors
	///
	/// [`SessionError::CreationFailed`] once every write attempt has failed.
	pub async fn create_secure_session(
		&self,
		user: &UserData,
		client_ip: Option<&str>,
	) -> Result<(String, String), SessionError> {
		let now = Utc::now();
		let session_id = generate_session_id();
		let csrf_token =
			derive_csrf_token(&session_id, &self.settings.secret_key, timestamp_nanos());

		let record = SessionRecord::new(
			session_id.clone(),
			csrf_token.clone(),
			user,
			client_ip,
			now,
		);
		let payload = serde_json::to_string(&record)?;
		let key = self.session_key(&session_id);
		let ttl = self.timeout();
		let store = self.client.store();

		self.client
			.retry_policy()
			.run("SET", || store.set(&key, &payload, Some(ttl)))
			.await
			.map_err(|RetryError { attempts, source, .. }| {
				tracing::error!(
					user_id = user.user_id,
					attempts,
					error = %source,
					"Failed to create session"
				);
				SessionError::CreationFailed { attempts, source }
			})?;

		if let Err(e) = self.index_session(user.user_id, &session_id).await {
			tracing::warn!(
				session = short_id(&session_id),
				user_id = user.user_id,
				error = %e,
				"Failed to index session"
			);
		}

		tracing::info!(
			session = short_id(&session_id),
			user_id = user.user_id,
			username = %user.username,
			login_method = %user.login_method,
			"Session created"
		);
		Ok((session_id, csrf_token))
	}

	/// Verify credentials, then create a session
	///
	/// # Errors
	///
	/// [`SessionError::InvalidCredentials`] when the password does not match
	/// `stored_hash`; no session is created in that case.
	pub async fn login(
		&self,
		password: &str,
		stored_hash: &str,
		user: &UserData,
		client_ip: Option<&str>,
	) -> Result<(String, String), SessionError> {
		let passwords = self.passwords.clone();
		let (password, stored_hash) = (password.to_string(), stored_hash.to_string());
		let verified =
			tokio::task::spawn_blocking(move || passwords.verify_password(&password, &stored_hash))
				.await
				.map_err(|e| SessionError::Password(e.to_string()))??;

		if !verified {
			tracing::warn!(user_id = user.user_id, "Login rejected: invalid credentials");
			return Err(SessionError::InvalidCredentials);
		}
		self.create_secure_session(user, client_ip).await
	}

	/// Validate a session, sliding its expiry on success
	///
	/// Returns `None` when the session is unknown or unreadable, the CSRF
	/// token does not match, or the session has outlived its timeout. With IP
	/// pinning on, the caller must present the IP recorded at login; a missing
	/// IP on either side is rejected. Expired records are deleted.
	pub async fn validate_session(
		&self,
		session_id: &str,
		csrf_token: Option<&str>,
		client_ip: Option<&str>,
	) -> Option<SessionRecord> {
		self.validate(session_id, csrf_token, Some(client_ip)).await
	}

	/// Validate a session for a channel that was authenticated at setup
	///
	/// Used for long-lived connections, which carry neither a CSRF token nor
	/// a client IP after the upgrade request. Age and existence are still
	/// checked and the expiry slides.
	pub async fn validate_bound_session(&self, session_id: &str) -> Option<SessionRecord> {
		self.validate(session_id, None, None).await
	}

	/// `client_ip` is `None` when the IP check is skipped entirely
	async fn validate(
		&self,
		session_id: &str,
		csrf_token: Option<&str>,
		client_ip: Option<Option<&str>>,
	) -> Option<SessionRecord> {
		let mut record = self.load_logged(session_id).await?;

		if let Some(provided) = csrf_token
			&& !tokens_match(&record.csrf_token, provided)
		{
			tracing::warn!(
				session = short_id(session_id),
				user_id = record.user_id,
				"CSRF token mismatch"
			);
			return None;
		}

		if self.settings.ip_pinning
			&& let Some(client_ip) = client_ip
			&& !ip_matches(record.client_ip.as_deref(), client_ip)
		{
			tracing::warn!(
				session = short_id(session_id),
				user_id = record.user_id,
				expected_ip = ?record.client_ip,
				actual_ip = ?client_ip,
				"Client IP mismatch"
			);
			return None;
		}

		let now = Utc::now();
		if record.is_expired_at(self.timeout(), now) {
			tracing::info!(
				session = short_id(session_id),
				user_id = record.user_id,
				"Session expired"
			);
			self.remove(&record).await;
			return None;
		}

		record.last_accessed = now;
		if let Err(e) = self.save(&record).await {
			tracing::warn!(
				session = short_id(session_id),
				error = %e,
				"Failed to slide session expiry"
			);
		}
		Some(record)
	}

	/// Touch a session and reset its TTL; false when it no longer exists
	pub async fn refresh_session(&self, session_id: &str) -> bool {
		let Some(mut record) = self.load_logged(session_id).await else {
			return false;
		};

		let now = Utc::now();
		if record.is_expired_at(self.timeout(), now) {
			self.remove(&record).await;
			return false;
		}

		record.last_accessed = now;
		match self.save(&record).await {
			Ok(()) => {
				tracing::debug!(session = short_id(session_id), "Session refreshed");
				true
			}
			Err(e) => {
				tracing::warn!(
					session = short_id(session_id),
					error = %e,
					"Failed to refresh session"
				);
				false
			}
		}
	}

	/// Delete one session; true when a record was removed
	pub async fn invalidate_session(&self, session_id: &str) -> bool {
		let key = self.session_key(session_id);
		let owner = self.load_logged(session_id).await.map(|r| r.user_id);
		let store = self.client.store();
		let keys = [key];

		let removed = match self
			.client
			.retry_policy()
			.run("DEL", || store.delete(&keys))
			.await
		{
			Ok(removed) => removed > 0,
			Err(e) => {
				tracing::warn!(
					session = short_id(session_id),
					error = %e,
					"Failed to invalidate session"
				);
				return false;
			}
		};

		if let Some(user_id) = owner
			&& let Err(e) = store.srem(&user_index_key(user_id), session_id).await
		{
			tracing::debug!(user_id, error = %e, "Failed to prune session index");
		}

		if removed {
			tracing::info!(session = short_id(session_id), "Session invalidated");
		}
		removed
	}

	/// Delete every session of a user, returning how many were removed
	///
	/// Uses the user's index set, falling back to scanning all sessions when
	/// the index is missing or unreadable.
	pub async fn invalidate_all_user_sessions(&self, user_id: i64) -> usize {
		let keys: Vec<String> = self
			.user_session_ids(user_id)
			.await
			.iter()
			.map(|id| self.session_key(id))
			.collect();

		let store = self.client.store();
		let removed = match self
			.client
			.retry_policy()
			.run("DEL", || store.delete(&keys))
			.await
		{
			Ok(removed) => usize::try_from(removed).unwrap_or(usize::MAX),
			Err(e) => {
				tracing::warn!(user_id, error = %e, "Failed to invalidate user sessions");
				return 0;
			}
		};

		if let Err(e) = store.delete_one(&user_index_key(user_id)).await {
			tracing::debug!(user_id, error = %e, "Failed to drop session index");
		}

		tracing::info!(user_id, count = removed, "User sessions invalidated");
		removed
	}

	/// Live sessions of a user, oldest first
	///
	/// Dead ids found in the index are pruned.
	pub async fn list_user_sessions(&self, user_id: i64) -> Vec<SessionRecord> {
		let index_key = user_index_key(user_id);
		let mut records = Vec::new();

		for session_id in self.user_session_ids(user_id).await {
			match self.load(&session_id).await {
				Ok(Some(record)) if record.user_id == user_id => records.push(record),
				Ok(_) => {
					if let Err(e) = self.client.store().srem(&index_key, &session_id).await {
						tracing::debug!(user_id, error = %e, "Failed to prune session index");
					}
				}
				Err(e) => {
					tracing::warn!(
						session = short_id(&session_id),
						error = %e,
						"Failed to load session"
					);
				}
			}
		}

		records.sort_by_key(|record| record.created_at);
		records
	}

	/// Issue a fresh CSRF token for an existing session
	pub async fn rotate_csrf_token(&self, session_id: &str) -> Option<String> {
		let mut record = self.load_logged(session_id).await?;
		let now = Utc::now();
		if record.is_expired_at(self.timeout(), now) {
			self.remove(&record).await;
			return None;
		}

		record.csrf_token =
			derive_csrf_token(session_id, &self.settings.secret_key, timestamp_nanos());
		record.last_accessed = now;

		match self.save(&record).await {
			Ok(()) => {
				tracing::info!(session = short_id(session_id), "CSRF token rotated");
				Some(record.csrf_token)
			}
			Err(e) => {
				tracing::warn!(
					session = short_id(session_id),
					error = %e,
					"Failed to rotate CSRF token"
				);
				None
			}
		}
	}

	async fn user_session_ids(&self, user_id: i64) -> Vec<String> {
		match self.client.store().smembers(&user_index_key(user_id)).await {
			Ok(ids) if !ids.is_empty() => return ids,
			Ok(_) => {}
			Err(e) => {
				tracing::warn!(user_id, error = %e, "Session index unreadable, scanning");
			}
		}
		self.scan_user_session_ids(user_id).await
	}

	async fn scan_user_session_ids(&self, user_id: i64) -> Vec<String> {
		let pattern = format!("{}*", self.settings.key_prefix);
		let keys = match self.client.store().scan_match(&pattern).await {
			Ok(keys) => keys,
			Err(e) => {
				tracing::warn!(user_id, error = %e, "Session scan failed");
				return Vec::new();
			}
		};

		let mut found = HashSet::new();
		for key in keys {
			let Some(session_id) = key.strip_prefix(&self.settings.key_prefix) else {
				continue;
			};
			if let Ok(Some(record)) = self.load(session_id).await
				&& record.user_id == user_id
			{
				found.insert(record.session_id);
			}
		}
		found.into_iter().collect()
	}

	async fn index_session(&self, user_id: i64, session_id: &str) -> Result<(), RetryError> {
		let key = user_index_key(user_id);
		let ttl = self.timeout();
		let store = self.client.store();
		let retry = self.client.retry_policy();

		retry.run("SADD", || store.sadd(&key, session_id)).await?;
		retry.run("EXPIRE", || store.expire(&key, ttl)).await?;
		Ok(())
	}

	async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
		let raw = self
			.client
			.store()
			.get(&self.session_key(session_id))
			.await?;
		match raw {
			Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
			None => Ok(None),
		}
	}

	async fn load_logged(&self, session_id: &str) -> Option<SessionRecord> {
		match self.load(session_id).await {
			Ok(record) => record,
			Err(e) => {
				tracing::warn!(
					session = short_id(session_id),
					error = %e,
					"Failed to load session"
				);
				None
			}
		}
	}

	async fn save(&self, record: &SessionRecord) -> Result<(), SessionError> {
		let payload = serde_json::to_string(record)?;
		let key = self.session_key(&record.session_id);
		let ttl = self.timeout();
		let store = self.client.store();

		self.client
			.retry_policy()
			.run("SET", || store.set(&key, &payload, Some(ttl)))
			.await?;
		Ok(())
	}

	async fn remove(&self, record: &SessionRecord) {
		let store = self.client.store();
		if let Err(e) = store.delete_one(&self.session_key(&record.session_id)).await {
			tracing::warn!(
				session = short_id(&record.session_id),
				error = %e,
				"Failed to delete expired session"
			);
		}
		if let Err(e) = store
			.srem(&user_index_key(record.user_id), &record.session_id)
			.await
		{
			tracing::debug!(user_id = record.user_id, error = %e, "Failed to prune session index");
		}
	}
}
