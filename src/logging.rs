//! Global tracing subscriber setup

use shiftdesk_conf::LoggingSettings;
use tracing_subscriber::EnvFilter;

/// Install the process-wide `tracing` subscriber
///
/// `RUST_LOG` takes precedence over `settings.level`. `settings.format`
/// selects `"json"` or human-readable text output. Later calls are no-ops.
pub fn init(settings: &LoggingSettings) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(&settings.level));

	let builder = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.with_writer(std::io::stderr);

	// try_init fails only when a subscriber is already installed
	let _ = if settings.format.eq_ignore_ascii_case("json") {
		builder.json().try_init()
	} else {
		builder.compact().try_init()
	};
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_init_is_idempotent() {
		let mut settings = LoggingSettings::default();
		settings.format = "json".to_string();

		init(&settings);
		init(&LoggingSettings::default());
		tracing::info!("still logging");
	}
}
