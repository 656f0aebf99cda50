//! Settings loading integration tests
//!
//! Covers file loading (TOML, JSON) and environment overrides.

use rstest::*;
use serial_test::serial;
use shiftdesk_conf::{Settings, SettingsError};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
	let mut file = tempfile::Builder::new()
		.suffix(suffix)
		.tempfile()
		.expect("temp file should be created");
	file.write_all(contents.as_bytes())
		.expect("temp file should be writable");
	file
}

/// Environment variables touched by these tests
const ENV_KEYS: &[&str] = &[
	"SHIFTDESK_REDIS_HOST",
	"SHIFTDESK_REDIS_PORT",
	"SHIFTDESK_SESSION_TIMEOUT",
	"SHIFTDESK_SESSION_IP_PINNING",
	"SHIFTDESK_CACHE_TTL_SHIFTS",
	"SHIFTDESK_WS_STALE_THRESHOLD",
];

fn clear_env() {
	for key in ENV_KEYS {
		// SAFETY: tests touching the environment are serialized
		unsafe { std::env::remove_var(key) };
	}
}

#[rstest]
fn test_partial_toml_keeps_defaults() {
	let file = write_config(
		".toml",
		r#"
debug = true

[store]
host = "redis.internal"
max_pool_size = 50

[cache.category_ttls]
shifts = 15
"#,
	);

	let settings = Settings::from_file(file.path()).unwrap();
	assert!(settings.debug);
	assert_eq!(settings.store.host, "redis.internal");
	assert_eq!(settings.store.max_pool_size, 50);
	assert_eq!(settings.store.port, 6379);
	assert_eq!(settings.cache.category_ttls.get("shifts"), Some(&15));
	assert_eq!(settings.session.timeout_secs, 28800);
}

#[rstest]
fn test_json_file() {
	let file = write_config(
		".json",
		r#"{"session": {"timeout_secs": 60, "ip_pinning": true}, "realtime": {"stale_threshold_secs": 90}}"#,
	);

	let settings = Settings::from_file(file.path()).unwrap();
	assert_eq!(settings.session.timeout_secs, 60);
	assert!(settings.session.ip_pinning);
	assert_eq!(settings.realtime.stale_threshold_secs, 90);
	assert_eq!(settings.realtime.cleanup_interval_secs, 60);
}

#[rstest]
fn test_unsupported_extension() {
	let file = write_config(".yaml", "debug: true");
	assert!(matches!(
		Settings::from_file(file.path()),
		Err(SettingsError::UnsupportedFormat(_))
	));
}

#[rstest]
fn test_malformed_toml() {
	let file = write_config(".toml", "[store\nhost = ");
	assert!(matches!(
		Settings::from_file(file.path()),
		Err(SettingsError::ParseError(_))
	));
}

#[rstest]
fn test_missing_file() {
	assert!(matches!(
		Settings::from_file("/definitely/not/here.toml"),
		Err(SettingsError::FileError(_))
	));
}

#[rstest]
#[serial(env)]
fn test_env_overrides() {
	clear_env();
	// SAFETY: tests touching the environment are serialized
	unsafe {
		std::env::set_var("SHIFTDESK_REDIS_HOST", "cache-01");
		std::env::set_var("SHIFTDESK_REDIS_PORT", "6380");
		std::env::set_var("SHIFTDESK_SESSION_TIMEOUT", "1800");
		std::env::set_var("SHIFTDESK_SESSION_IP_PINNING", "yes");
		std::env::set_var("SHIFTDESK_CACHE_TTL_SHIFTS", "45");
		std::env::set_var("SHIFTDESK_WS_STALE_THRESHOLD", "120");
	}

	let settings = Settings::from_env().unwrap();
	clear_env();

	assert_eq!(settings.store.host, "cache-01");
	assert_eq!(settings.store.port, 6380);
	assert_eq!(settings.session.timeout_secs, 1800);
	assert!(settings.session.ip_pinning);
	assert_eq!(settings.cache.category_ttls.get("shifts"), Some(&45));
	assert_eq!(settings.realtime.stale_threshold_secs, 120);
}

#[rstest]
#[serial(env)]
fn test_env_malformed_value() {
	clear_env();
	// SAFETY: tests touching the environment are serialized
	unsafe { std::env::set_var("SHIFTDESK_REDIS_PORT", "not-a-port") };

	let result = Settings::from_env();
	clear_env();

	assert!(matches!(result, Err(SettingsError::EnvError(_))));
}
