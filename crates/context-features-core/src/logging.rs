//! Process-wide tracing setup.
//!
//! Library components never install a subscriber. Each one takes a
//! [`tracing::Span`] at construction and emits its events under it; the
//! application entry point calls [`init_tracing`] once.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{CoreError, CoreResult};

/// Install the global fmt subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns `Ok(false)` when a
/// global subscriber was already installed (e.g. by a test harness).
pub fn init_tracing(config: &LoggingConfig) -> CoreResult<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            CoreError::Config(format!("Invalid logging.level '{}': {}", config.level, e))
        })?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(std::io::stderr);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init().is_ok(),
        "compact" => builder.compact().try_init().is_ok(),
        "pretty" => builder.pretty().try_init().is_ok(),
        other => {
            return Err(CoreError::Config(format!(
                "logging.format must be 'pretty', 'compact', or 'json', got '{}'",
                other
            )))
        }
    };

    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_rejects_unknown_format() {
        let config = LoggingConfig {
            format: "xml".to_string(),
            ..Default::default()
        };
        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        let first = init_tracing(&config).expect("first init");
        let second = init_tracing(&config).expect("second init");
        // Only one of the calls can win the global slot.
        assert!(!(first && second));
        assert!(!second);
    }
}
