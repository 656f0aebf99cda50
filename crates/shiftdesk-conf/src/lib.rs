//! Settings for the shiftdesk session, cache and realtime services
//!
//! Settings load from code, environment variables, or TOML/JSON files:
//!
//! ```
//! use shiftdesk_conf::Settings;
//!
//! let mut settings = Settings::default();
//! settings.session.secret_key = "a-very-long-secret-key-for-production-use".to_string();
//! assert!(settings.validate().is_ok());
//! ```

mod env;
pub mod settings;

pub use env::parse_bool;
pub use settings::{
	CacheSettings, LoggingSettings, MIN_SECRET_KEY_LENGTH, PLACEHOLDER_SECRET_KEY,
	RealtimeSettings, RetrySettings, SessionSettings, Settings, SettingsError, StoreSettings,
};
