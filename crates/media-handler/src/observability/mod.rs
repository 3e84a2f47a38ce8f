//! Observability for the Media Handler: structured logging and metrics.
//!
//! # Privacy by Default
//!
//! Logs carry resource ids and event tags only. Media payloads are never
//! logged; malformed notification bodies are logged lossily for diagnosis.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `mh_consumers_created_total` | Counter | none | Consumers constructed |
//! | `mh_consumers_closed_total` | Counter | `reason` | Consumers closed, by trigger |
//! | `mh_consumer_notifications_total` | Counter | `event` | Worker notifications dispatched |
//! | `mh_consumer_notifications_rejected_total` | Counter | `reason` | Unknown or malformed notifications |
//! | `mh_consumer_payloads_dropped_total` | Counter | none | Payloads arriving after close |
//! | `mh_channel_request_duration_seconds` | Histogram | `method` | Worker request latency |
//! | `mh_channel_request_errors_total` | Counter | `method`, `error_type` | Failed worker requests |
//! | `mh_listener_panics_total` | Counter | `event` | Listeners that panicked |

pub mod metrics;

use common::config::ObservabilityConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use metrics::init_metrics_recorder;

/// Install the global `tracing` subscriber.
///
/// JSON format enables robust parsing by log shippers without brittle regex.
///
/// # Errors
///
/// Returns error if the filter directive is invalid or a global subscriber
/// is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), String> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| format!("Invalid log filter {:?}: {e}", config.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    }
    .map_err(|e| format!("Failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_rejects_invalid_filter() {
        let config = ObservabilityConfig {
            log_level: "media_handler=notalevel".to_string(),
            json_logs: true,
        };

        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn test_init_tracing_installs_once() {
        let config = ObservabilityConfig::default();

        // Another test binary component may have installed a subscriber
        // first; either way a second install must fail without panicking.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
