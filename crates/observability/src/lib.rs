//! Process-wide tracing setup shared by binaries, tests and benches.

/// Subscriber configuration and installation.
pub mod subscriber;

pub use subscriber::{LogFormat, SubscriberConfig};

/// Install the default subscriber: JSON lines, `RUST_LOG` filter, `info`
/// when unset.
///
/// Safe to call multiple times; only the first call installs anything.
pub fn init() {
    subscriber::install(&SubscriberConfig::default());
}

/// Human-readable output captured by the test harness.
pub fn init_for_tests() {
    subscriber::install(&SubscriberConfig {
        format: LogFormat::Compact,
        default_directive: "debug".to_string(),
        with_target: true,
        test_writer: true,
    });
}
