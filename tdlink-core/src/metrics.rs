// ABOUTME: Metrics recorded by the client loop and dispatcher.
// ABOUTME: Thin wrappers over the metrics facade plus optional Prometheus export.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter with an HTTP listener.
///
/// Must run inside a tokio runtime. Without it every recorder call is a no-op.
pub fn init_prometheus(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!(addr = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_payload_received() {
    metrics::counter!("tdlink_payloads_received_total").increment(1);
}

pub fn record_decode_failure() {
    metrics::counter!("tdlink_decode_failures_total").increment(1);
}

pub fn record_event_dispatched(kind: &'static str, subscribers: usize) {
    metrics::counter!("tdlink_events_dispatched_total", "kind" => kind).increment(1);
    metrics::histogram!("tdlink_dispatch_fanout").record(subscribers as f64);
}

pub fn record_subscriber_failure(kind: &'static str) {
    metrics::counter!("tdlink_subscriber_failures_total", "kind" => kind).increment(1);
}

pub fn record_command_sent(type_name: &'static str) {
    metrics::counter!("tdlink_commands_sent_total", "type" => type_name).increment(1);
}

pub fn set_authorization_state(ordinal: u8) {
    metrics::gauge!("tdlink_authorization_state").set(f64::from(ordinal));
}

pub fn record_error(context: &str) {
    metrics::counter!("tdlink_errors_total", "context" => context.to_string()).increment(1);
}
