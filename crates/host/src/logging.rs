use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive.
pub const LOG_ENV: &str = "MODKIT_LOG";

const DEFAULT_FILTER: &str = "info";

/// `MODKIT_LOG` wins over the config filter, which wins over `info`. `-v` raises the default
/// to debug. Invalid directives fall back to the next source.
pub fn filter(env: Option<&str>, configured: Option<&str>, verbose: bool) -> EnvFilter {
	let default = if verbose { "debug" } else { DEFAULT_FILTER };
	[env, configured]
		.into_iter()
		.flatten()
		.find_map(|directive| EnvFilter::try_new(directive).ok())
		.unwrap_or_else(|| EnvFilter::new(default))
}

/// Installs the stderr subscriber. Later calls are no-ops.
pub fn init(configured: Option<&str>, verbose: bool) {
	let env = std::env::var(LOG_ENV).ok();
	let filter = filter(env.as_deref(), configured, verbose);
	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.try_init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn precedence() {
		assert_eq!(filter(Some("warn"), Some("debug"), false).to_string(), "warn");
		assert_eq!(filter(None, Some("modkit_modules=trace"), false).to_string(), "modkit_modules=trace");
		assert_eq!(filter(None, None, false).to_string(), "info");
		assert_eq!(filter(None, None, true).to_string(), "debug");
	}

	#[test]
	fn invalid_directive_falls_through() {
		assert_eq!(filter(Some("modkit=loud"), Some("error"), false).to_string(), "error");
	}
}
