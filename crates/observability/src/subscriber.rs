//! `tracing-subscriber` installation.

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset or invalid.
    pub default_directive: String,
    pub with_target: bool,
    /// Write through the test harness so output is captured per test.
    pub test_writer: bool,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_directive: "info".to_string(),
            with_target: false,
            test_writer: false,
        }
    }
}

impl SubscriberConfig {
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
    }
}

/// Install a global subscriber. Returns `false` if one was already set.
pub fn install(config: &SubscriberConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(config.with_target);

    let result = match (config.format, config.test_writer) {
        (LogFormat::Json, false) => builder.json().try_init(),
        (LogFormat::Json, true) => builder.json().with_test_writer().try_init(),
        (LogFormat::Pretty, false) => builder.pretty().try_init(),
        (LogFormat::Pretty, true) => builder.pretty().with_test_writer().try_init(),
        (LogFormat::Compact, false) => builder.compact().try_init(),
        (LogFormat::Compact, true) => builder.compact().with_test_writer().try_init(),
    };
    result.is_ok()
}
