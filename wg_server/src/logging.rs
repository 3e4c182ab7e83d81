//! Structured logging configuration.
//!
//! The library logs through the `log` facade; the subscriber installed here
//! picks those records up alongside the server's own `tracing` events.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels come from `RUST_LOG`, defaulting to `info,sqlx=warn`.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log the result of a force-end sweep with structured fields
pub fn log_sweep(ended: usize, active_before: usize) {
    if ended < active_before {
        tracing::warn!(
            ended = ended,
            active_before = active_before,
            "SWEEP: some sessions could not be ended"
        );
    } else {
        tracing::info!(ended = ended, "SWEEP: every active session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sweep() {
        // Just ensure it doesn't panic without a subscriber
        log_sweep(3, 3);
        log_sweep(1, 2);
    }
}
