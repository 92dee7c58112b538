//! Shared tracing/logging initialization.
//!
//! Every `stampcard` binary sets up `tracing_subscriber` the same way: an
//! env-filter seeded from `RUST_LOG` (or a per-binary default) plus either
//! human-readable or JSON line output.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the env-filter used by [`init_tracing`].
///
/// `RUST_LOG` wins over `default_filter`; an unparsable `RUST_LOG` falls
/// back to the default instead of silencing all output.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"stampcard_server=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
///
/// Calling this twice is harmless: the second registration is ignored.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let filter = env_filter(default_filter);
    let result = if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
