//! Service settings
//!
//! Settings can be loaded from environment variables, configuration files, or code.
//! Every section has defaults, so a partial file only needs to name what it overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::env::{env_bool, env_parse, env_string};

/// Placeholder secret used when none is configured
pub const PLACEHOLDER_SECRET_KEY: &str = "change-me-in-production";

/// Minimum accepted length for the session secret key
pub const MIN_SECRET_KEY_LENGTH: usize = 32;

/// Top-level settings for the session, cache and realtime services
///
/// # Examples
///
/// ```
/// use shiftdesk_conf::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.store.port, 6379);
/// assert_eq!(settings.session.timeout_secs, 28800);
/// assert_eq!(settings.realtime.stale_threshold_secs, 300);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
	/// Debug mode relaxes secret validation
	#[serde(default)]
	pub debug: bool,

	/// Key-value store connection
	#[serde(default)]
	pub store: StoreSettings,

	/// Session issuance and validation
	#[serde(default)]
	pub session: SessionSettings,

	/// Cache-aside layer
	#[serde(default)]
	pub cache: CacheSettings,

	/// WebSocket connection registry
	#[serde(default)]
	pub realtime: RealtimeSettings,

	/// Logging output
	#[serde(default)]
	pub logging: LoggingSettings,
}

impl Settings {
	/// Create new settings with defaults
	pub fn new() -> Self {
		Self::default()
	}

	/// Validate settings
	pub fn validate(&self) -> Result<(), SettingsError> {
		if !self.debug {
			if self.session.secret_key == PLACEHOLDER_SECRET_KEY {
				return Err(SettingsError::ValidationError(
					"session secret key must be changed in production".to_string(),
				));
			}
			if self.session.secret_key.len() < MIN_SECRET_KEY_LENGTH {
				return Err(SettingsError::ValidationError(format!(
					"session secret key must be at least {} characters",
					MIN_SECRET_KEY_LENGTH
				)));
			}
		}

		if self.session.timeout_secs == 0 {
			return Err(SettingsError::ValidationError(
				"session timeout must be positive".to_string(),
			));
		}

		if self.store.max_pool_size == 0 {
			return Err(SettingsError::ValidationError(
				"store pool size must be positive".to_string(),
			));
		}

		if self.store.connect_timeout_secs == 0 || self.store.socket_timeout_secs == 0 {
			return Err(SettingsError::ValidationError(
				"store timeouts must be positive".to_string(),
			));
		}

		if self.store.retry.max_attempts == 0 {
			return Err(SettingsError::ValidationError(
				"retry policy needs at least one attempt".to_string(),
			));
		}

		if self.store.retry.multiplier < 1.0 {
			return Err(SettingsError::ValidationError(
				"retry multiplier must be at least 1.0".to_string(),
			));
		}

		if self.realtime.stale_threshold_secs == 0 || self.realtime.cleanup_interval_secs == 0 {
			return Err(SettingsError::ValidationError(
				"realtime intervals must be positive".to_string(),
			));
		}

		Ok(())
	}

	/// Load settings from environment variables
	///
	/// Unset variables keep their defaults. Variables that are set but cannot be
	/// parsed are reported as [`SettingsError::EnvError`].
	pub fn from_env() -> Result<Self, SettingsError> {
		let mut settings = Self::default();

		if let Some(debug) = env_bool("SHIFTDESK_DEBUG")? {
			settings.debug = debug;
		}

		// Store
		if let Some(host) = env_string("SHIFTDESK_REDIS_HOST") {
			settings.store.host = host;
		}
		if let Some(port) = env_parse("SHIFTDESK_REDIS_PORT")? {
			settings.store.port = port;
		}
		if let Some(password) = env_string("SHIFTDESK_REDIS_PASSWORD") {
			settings.store.password = Some(password);
		}
		if let Some(db) = env_parse("SHIFTDESK_REDIS_DB")? {
			settings.store.db = db;
		}
		if let Some(size) = env_parse("SHIFTDESK_REDIS_MAX_CONNECTIONS")? {
			settings.store.max_pool_size = size;
		}

		// Session
		if let Some(timeout) = env_parse("SHIFTDESK_SESSION_TIMEOUT")? {
			settings.session.timeout_secs = timeout;
		}
		if let Some(secret) = env_string("SHIFTDESK_SECRET_KEY") {
			settings.session.secret_key = secret;
		}
		if let Some(pinning) = env_bool("SHIFTDESK_SESSION_IP_PINNING")? {
			settings.session.ip_pinning = pinning;
		}

		// Cache
		if let Some(ttl) = env_parse("SHIFTDESK_CACHE_DEFAULT_TTL")? {
			settings.cache.default_ttl_secs = ttl;
		}
		for (name, value) in std::env::vars() {
			if let Some(category) = name.strip_prefix("SHIFTDESK_CACHE_TTL_") {
				let ttl = value.trim().parse::<u64>().map_err(|e| {
					SettingsError::EnvError(format!("{}: {}", name, e))
				})?;
				settings
					.cache
					.category_ttls
					.insert(category.to_lowercase(), ttl);
			}
		}

		// Realtime
		if let Some(threshold) = env_parse("SHIFTDESK_WS_STALE_THRESHOLD")? {
			settings.realtime.stale_threshold_secs = threshold;
		}

		// Logging
		if let Some(level) = env_string("SHIFTDESK_LOG_LEVEL") {
			settings.logging.level = level;
		}
		if let Some(format) = env_string("SHIFTDESK_LOG_FORMAT") {
			settings.logging.format = format;
		}

		Ok(settings)
	}

	/// Load settings from a configuration file
	///
	/// Supported formats: `.toml` and `.json`.
	pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
		let path = path.into();
		let contents = std::fs::read_to_string(&path).map_err(|e| {
			SettingsError::FileError(format!("Failed to read {}: {}", path.display(), e))
		})?;

		let settings: Settings = match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => toml::from_str(&contents)
				.map_err(|e| SettingsError::ParseError(format!("TOML parse error: {}", e)))?,
			Some("json") => serde_json::from_str(&contents)
				.map_err(|e| SettingsError::ParseError(format!("JSON parse error: {}", e)))?,
			_ => {
				return Err(SettingsError::UnsupportedFormat(
					"Supported formats: .toml, .json".to_string(),
				));
			}
		};

		Ok(settings)
	}
}

/// Key-value store connection settings
#[non_exhaustive]
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
	pub host: String,
	pub port: u16,
	pub password: Option<String>,
	pub db: i64,
	/// Maximum number of pooled connections
	pub max_pool_size: usize,
	pub connect_timeout_secs: u64,
	pub socket_timeout_secs: u64,
	/// Retry policy applied to store writes
	pub retry: RetrySettings,
}

impl Default for StoreSettings {
	fn default() -> Self {
		Self {
			host: "localhost".to_string(),
			port: 6379,
			password: None,
			db: 0,
			max_pool_size: 20,
			connect_timeout_secs: 5,
			socket_timeout_secs: 5,
			retry: RetrySettings::default(),
		}
	}
}

impl StoreSettings {
	/// Build the connection URL
	///
	/// # Examples
	///
	/// ```
	/// use shiftdesk_conf::StoreSettings;
	///
	/// let mut store = StoreSettings::default();
	/// assert_eq!(store.url(), "redis://localhost:6379/0");
	///
	/// store.password = Some("s3cret".to_string());
	/// store.db = 2;
	/// assert_eq!(store.url(), "redis://:s3cret@localhost:6379/2");
	/// ```
	pub fn url(&self) -> String {
		match &self.password {
			Some(password) => format!(
				"redis://:{}@{}:{}/{}",
				password, self.host, self.port, self.db
			),
			None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
		}
	}

	pub fn connect_timeout(&self) -> Duration {
		Duration::from_secs(self.connect_timeout_secs)
	}

	pub fn socket_timeout(&self) -> Duration {
		Duration::from_secs(self.socket_timeout_secs)
	}
}

impl fmt::Debug for StoreSettings {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StoreSettings")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
			.field("db", &self.db)
			.field("max_pool_size", &self.max_pool_size)
			.field("connect_timeout_secs", &self.connect_timeout_secs)
			.field("socket_timeout_secs", &self.socket_timeout_secs)
			.field("retry", &self.retry)
			.finish()
	}
}

/// Retry policy settings for store writes
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
	pub max_attempts: u32,
	pub base_delay_ms: u64,
	pub multiplier: f64,
	pub max_delay_ms: u64,
}

impl Default for RetrySettings {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay_ms: 100,
			multiplier: 2.0,
			max_delay_ms: 5000,
		}
	}
}

/// Session settings
#[non_exhaustive]
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
	/// Absolute session lifetime and store TTL, in seconds
	pub timeout_secs: u64,
	/// Server secret mixed into CSRF tokens
	pub secret_key: String,
	/// Reject validation from a client IP other than the one at login
	pub ip_pinning: bool,
	pub key_prefix: String,
}

impl Default for SessionSettings {
	fn default() -> Self {
		Self {
			timeout_secs: 28800, // 8 hours
			secret_key: PLACEHOLDER_SECRET_KEY.to_string(),
			ip_pinning: false,
			key_prefix: "session:".to_string(),
		}
	}
}

impl SessionSettings {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}

impl fmt::Debug for SessionSettings {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionSettings")
			.field("timeout_secs", &self.timeout_secs)
			.field("secret_key", &"[REDACTED]")
			.field("ip_pinning", &self.ip_pinning)
			.field("key_prefix", &self.key_prefix)
			.finish()
	}
}

/// Cache settings
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
	/// TTL used when neither the caller nor the category table names one
	pub default_ttl_secs: u64,
	/// Per-category TTL overrides, in seconds
	pub category_ttls: HashMap<String, u64>,
	/// Namespace prepended to every derived key
	pub key_prefix: String,
}

impl Default for CacheSettings {
	fn default() -> Self {
		let category_ttls = [
			("user", 300),
			("user_profile", 600),
			("shifts", 60),
			("schedule", 120),
			("timesheets", 120),
			("jobs", 600),
			("companies", 1800),
			("certifications", 3600),
			("dashboard", 30),
		]
		.into_iter()
		.map(|(category, ttl)| (category.to_string(), ttl))
		.collect();

		Self {
			default_ttl_secs: 300,
			category_ttls,
			key_prefix: String::new(),
		}
	}
}

/// WebSocket connection registry settings
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
	/// Heartbeat age after which a connection is reaped
	pub stale_threshold_secs: u64,
	/// Interval between reaper passes
	pub cleanup_interval_secs: u64,
}

impl Default for RealtimeSettings {
	fn default() -> Self {
		Self {
			stale_threshold_secs: 300,
			cleanup_interval_secs: 60,
		}
	}
}

impl RealtimeSettings {
	pub fn stale_threshold(&self) -> Duration {
		Duration::from_secs(self.stale_threshold_secs)
	}

	pub fn cleanup_interval(&self) -> Duration {
		Duration::from_secs(self.cleanup_interval_secs)
	}
}

/// Logging settings
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
	pub level: String,
	/// "text" or "json"
	pub format: String,
}

impl Default for LoggingSettings {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
			format: "text".to_string(),
		}
	}
}

/// Settings error
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("File error: {0}")]
	FileError(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Unsupported format: {0}")]
	UnsupportedFormat(String),

	#[error("Environment error: {0}")]
	EnvError(String),
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn production_settings() -> Settings {
		let mut settings = Settings::default();
		settings.session.secret_key = "x".repeat(MIN_SECRET_KEY_LENGTH);
		settings
	}

	#[rstest]
	fn test_defaults() {
		let settings = Settings::default();
		assert_eq!(settings.store.host, "localhost");
		assert_eq!(settings.store.max_pool_size, 20);
		assert_eq!(settings.store.retry.max_attempts, 3);
		assert_eq!(settings.store.retry.base_delay_ms, 100);
		assert_eq!(settings.cache.default_ttl_secs, 300);
		assert_eq!(settings.cache.category_ttls.get("shifts"), Some(&60));
		assert_eq!(settings.realtime.stale_threshold(), Duration::from_secs(300));
	}

	#[rstest]
	fn test_placeholder_secret_rejected_outside_debug() {
		let settings = Settings::default();
		assert!(matches!(
			settings.validate(),
			Err(SettingsError::ValidationError(_))
		));

		let mut debug = Settings::default();
		debug.debug = true;
		assert!(debug.validate().is_ok());
	}

	#[rstest]
	fn test_short_secret_rejected() {
		let mut settings = Settings::default();
		settings.session.secret_key = "too-short".to_string();
		assert!(settings.validate().is_err());
	}

	#[rstest]
	#[case::zero_timeout(|s: &mut Settings| s.session.timeout_secs = 0)]
	#[case::zero_pool(|s: &mut Settings| s.store.max_pool_size = 0)]
	#[case::zero_attempts(|s: &mut Settings| s.store.retry.max_attempts = 0)]
	#[case::shrinking_backoff(|s: &mut Settings| s.store.retry.multiplier = 0.5)]
	#[case::zero_stale(|s: &mut Settings| s.realtime.stale_threshold_secs = 0)]
	fn test_invalid_values_rejected(#[case] mutate: fn(&mut Settings)) {
		let mut settings = production_settings();
		assert!(settings.validate().is_ok());
		mutate(&mut settings);
		assert!(settings.validate().is_err());
	}

	#[rstest]
	fn test_debug_output_redacts_secrets() {
		let mut settings = production_settings();
		settings.store.password = Some("hunter2".to_string());
		let rendered = format!("{:?}", settings);
		assert!(!rendered.contains("hunter2"));
		assert!(!rendered.contains(&"x".repeat(MIN_SECRET_KEY_LENGTH)));
		assert!(rendered.contains("[REDACTED]"));
	}
}
