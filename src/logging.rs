//! Logging initialization.
//!
//! The core crate logs through the `log` facade; the subscriber installed
//! here bridges those records into `tracing`.

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_directive` (e.g. `"info"` or
/// `"ftpool_core=debug"`). With the `logs-json` feature every event is
/// written as one JSON line.
pub fn init_logging(default_directive: &str) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let registry = tracing_subscriber::registry().with(env_filter);

    #[cfg(feature = "logs-json")]
    {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    }
    #[cfg(not(feature = "logs-json"))]
    {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .try_init()
    }
}
