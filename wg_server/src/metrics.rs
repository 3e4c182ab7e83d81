//! Prometheus metrics for the session engine.
//!
//! Engine events are counted by wrapping the outbound notifier, so the
//! library itself stays free of any metrics dependency.
//!
//! # Metrics
//!
//! - `sessions_started_total{game_type, mode}`
//! - `sessions_finished_total{status}`
//! - `hints_issued_total`
//! - `turn_warnings_total`
//! - `auto_moves_total`
//! - `global_sides_finished_total`
//! - `active_session_actors`

use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::Arc};
use wager_games::session::{Notifier, SessionEvent};

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
///
/// # Arguments
///
/// - `addr`: Address to bind the metrics server to (e.g., `0.0.0.0:9090`)
///
/// # Returns
///
/// Result indicating success or error message
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

/// Set the number of live session actors.
pub fn active_session_actors(count: usize) {
    metrics::gauge!("active_session_actors").set(count as f64);
}

/// Record one engine event.
pub fn record_event(event: &SessionEvent) {
    match event {
        SessionEvent::Started {
            game_type,
            is_global,
            ..
        } => {
            let game_type = game_type.map_or_else(|| "unknown".to_string(), |kind| kind.to_string());
            let mode = if *is_global { "global" } else { "head_to_head" };
            metrics::counter!("sessions_started_total",
                "game_type" => game_type,
                "mode" => mode
            )
            .increment(1);
        }
        SessionEvent::Finished { status, .. } => {
            metrics::counter!("sessions_finished_total", "status" => status.to_string())
                .increment(1);
        }
        SessionEvent::HintIssued { .. } => {
            metrics::counter!("hints_issued_total").increment(1);
        }
        SessionEvent::TurnWarning { .. } => {
            metrics::counter!("turn_warnings_total").increment(1);
        }
        SessionEvent::AutoMove { .. } => {
            metrics::counter!("auto_moves_total").increment(1);
        }
        SessionEvent::SideFinished { .. } => {
            metrics::counter!("global_sides_finished_total").increment(1);
        }
        SessionEvent::TurnChanged { .. } => {}
    }
}

/// Notifier that counts every event before handing it on
pub struct MetricsNotifier {
    inner: Arc<dyn Notifier>,
}

impl MetricsNotifier {
    pub fn new(inner: Arc<dyn Notifier>) -> Self {
        Self { inner }
    }
}

impl Notifier for MetricsNotifier {
    fn notify(&self, event: SessionEvent) {
        record_event(&event);
        self.inner.notify(event);
    }
}
