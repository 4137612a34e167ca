//! Logging setup.
//!
//! All logs go to **stderr**; stdout belongs to the orchestrator. Controller
//! operations open `controller.<op>` spans carrying `resource_type` and `id`,
//! and provider entry points open `provider.<op>` spans, so a filter such as
//! `hemmer_provider_logs::controller=debug` follows one resource kind through
//! its lifecycle.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use hemmer_provider_logs::{init_logging, LogsProvider};
//!
//! #[tokio::main]
//! async fn main() {
//!     init_logging();
//!     tracing::info!("Provider starting");
//!     let provider = LogsProvider::new(Arc::new(MyRemote::connect().await));
//!     // hand `provider` to the orchestrator
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`, `hemmer_provider_logs=debug`)
//!
//! ```bash
//! # Retry and paging detail for the finder
//! RUST_LOG=info,hemmer_provider_logs::finder=debug ./my-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Initialize the default logging subscriber.
///
/// - Writes to **stderr**
/// - Respects the `RUST_LOG` environment variable for filtering
/// - Defaults to `info` level if `RUST_LOG` is not set
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    subscriber("info").init();
}

/// Initialize logging with `default_level` used when `RUST_LOG` is not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
///
/// # Example
///
/// ```ignore
/// use hemmer_provider_logs::init_logging_with_default;
///
/// fn main() {
///     init_logging_with_default("debug");
/// }
/// ```
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Useful in tests, where several cases may race to install a subscriber.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only the
    // second call's outcome is deterministic.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("hemmer_provider_logs=debug").is_ok());
        assert!(EnvFilter::try_new("warn,hemmer_provider_logs::controller=debug").is_ok());
    }

    #[test]
    fn test_second_init_is_refused() {
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}
