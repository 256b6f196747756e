//! # Commit Telemetry
//!
//! Structured logging setup for the commit coordinator and its hosts.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use commit_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(TelemetryConfig::from_env()).expect("Failed to init telemetry");
//!
//!     // Logs from every crate are now filtered and formatted
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CC_SERVICE_NAME` | `commit-coordinator` | Service name in log records |
//! | `CC_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `CC_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `CC_JSON_LOGS` | `false` (`true` in containers) | JSON instead of pretty output |

mod config;
mod tracing_setup;

pub use config::{TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use tracing_setup::build_filter;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install the global tracing subscriber.
///
/// Call once per process; a second call returns
/// [`TelemetryError::SubscriberInit`].
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    tracing_setup::init_tracing(&config)
}

/// Install the subscriber if none is set yet, ignoring the "already set"
/// error. Intended for test binaries where every test tries to initialise.
pub fn try_init_for_tests() {
    let config = TelemetryConfig {
        log_level: "debug".to_string(),
        ..TelemetryConfig::from_env()
    };
    let _ = tracing_setup::init_tracing(&config);
}
