//! Development-time tracing.
//!
//! Diagnostics go to stderr and depend on `RUST_LOG` / `--log-level`. Status
//! lines and `--dump-vars` output are product output on stdout and are not
//! affected by the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` is used, defaulting to `warn`.
///
/// # Example
/// ```bash
/// RUST_LOG=scripter=debug scripter run deploy.csv
/// ```
pub fn init(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("warn")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
