//! Environment variable helpers

use std::str::FromStr;

use crate::settings::SettingsError;

/// Read a non-empty string variable
pub(crate) fn env_string(key: &str) -> Option<String> {
	std::env::var(key)
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty())
}

/// Read and parse a variable, reporting malformed values
pub(crate) fn env_parse<T>(key: &str) -> Result<Option<T>, SettingsError>
where
	T: FromStr,
	T::Err: std::fmt::Display,
{
	match env_string(key) {
		Some(raw) => raw
			.parse::<T>()
			.map(Some)
			.map_err(|e| SettingsError::EnvError(format!("{}: {}", key, e))),
		None => Ok(None),
	}
}

/// Read a boolean variable
pub(crate) fn env_bool(key: &str) -> Result<Option<bool>, SettingsError> {
	match env_string(key) {
		Some(raw) => parse_bool(&raw)
			.map(Some)
			.ok_or_else(|| SettingsError::EnvError(format!("{}: invalid boolean {:?}", key, raw))),
		None => Ok(None),
	}
}

/// Parse a boolean the way Django-style settings do
///
/// # Examples
///
/// ```
/// use shiftdesk_conf::parse_bool;
///
/// assert_eq!(parse_bool("true"), Some(true));
/// assert_eq!(parse_bool("On"), Some(true));
/// assert_eq!(parse_bool("0"), Some(false));
/// assert_eq!(parse_bool("maybe"), None);
/// ```
pub fn parse_bool(value: &str) -> Option<bool> {
	match value.trim().to_lowercase().as_str() {
		"true" | "1" | "yes" | "on" => Some(true),
		"false" | "0" | "no" | "off" => Some(false),
		_ => None,
	}
}
