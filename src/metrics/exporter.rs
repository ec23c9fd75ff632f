//! Prometheus metrics exporter
//!
//! HTTP endpoint for Prometheus scraping.

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;
use tracing::info;

use super::counters::{MetricsSnapshot, METRICS};
use crate::config::MetricsConfig;

/// Initialize the Prometheus metrics exporter.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    describe_counter!("zbc_sessions_opened", "Total client sessions opened");
    describe_gauge!("zbc_sessions_active", "Currently registered client sessions");
    describe_counter!("zbc_connect_failures", "Failed connection attempts");
    describe_counter!("zbc_requests_sent", "Total requests written");
    describe_counter!("zbc_stale_responses", "Responses discarded after a timeout");
    describe_counter!("zbc_remote_errors", "Failure responses from the peer");
    describe_counter!("zbc_pushes_received", "Single-message pushes delivered to subscribers");
    describe_counter!("zbc_pushes_dropped", "Pushes dropped for lack of a subscriber or room");
    describe_counter!("zbc_bytes_received", "Total bytes received");
    describe_counter!("zbc_bytes_sent", "Total bytes sent");
    describe_counter!("zbc_errors_total", "Total errors");
    describe_counter!("zbc_timeouts_total", "Total request timeouts");
    describe_counter!("zbc_server_connections_total", "Connections accepted by the server");
    describe_gauge!("zbc_server_connections_active", "Open server connections");
    describe_counter!("zbc_server_requests", "Requests answered by the server");

    PrometheusBuilder::new()
        .with_http_listener(config.bind_addr)
        .install()?;

    tokio::spawn(sync_metrics_task());

    info!(bind_addr = %config.bind_addr, "Metrics endpoint started");
    Ok(())
}

/// Periodically push the atomic counters into the metrics recorder
async fn sync_metrics_task() {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut last = METRICS.snapshot();

    loop {
        interval.tick().await;
        let now = METRICS.snapshot();
        publish(&last, &now);
        last = now;
    }
}

fn publish(last: &MetricsSnapshot, now: &MetricsSnapshot) {
    let deltas = [
        ("zbc_sessions_opened", now.sessions_opened, last.sessions_opened),
        ("zbc_connect_failures", now.connect_failures, last.connect_failures),
        ("zbc_requests_sent", now.requests_sent, last.requests_sent),
        ("zbc_stale_responses", now.stale_responses, last.stale_responses),
        ("zbc_remote_errors", now.remote_errors, last.remote_errors),
        ("zbc_pushes_received", now.pushes_received, last.pushes_received),
        ("zbc_pushes_dropped", now.pushes_dropped, last.pushes_dropped),
        ("zbc_bytes_received", now.bytes_received, last.bytes_received),
        ("zbc_bytes_sent", now.bytes_sent, last.bytes_sent),
        ("zbc_errors_total", now.errors_total, last.errors_total),
        ("zbc_timeouts_total", now.timeouts_total, last.timeouts_total),
        (
            "zbc_server_connections_total",
            now.server_connections_total,
            last.server_connections_total,
        ),
        ("zbc_server_requests", now.server_requests, last.server_requests),
    ];

    for (name, now, last) in deltas {
        let delta = now.saturating_sub(last);
        if delta > 0 {
            counter!(name).increment(delta);
        }
    }

    gauge!("zbc_sessions_active").set(now.sessions_active as f64);
    gauge!("zbc_server_connections_active").set(now.server_connections_active as f64);
}
