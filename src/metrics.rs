use anyhow::Result;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Metric name prefix for all engine metrics
const PREFIX: &str = "backup_engine";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Execution Metrics
    pub static ref EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_executions_total"), "Finished backup executions by status"),
        &["status"]
    ).expect("Failed to create executions_total metric");

    pub static ref EXECUTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_execution_duration_seconds"),
            "Backup execution duration in seconds"
        )
        .buckets(vec![1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0, 14400.0])
    ).expect("Failed to create execution_duration_seconds metric");

    pub static ref RUNNING_EXECUTIONS: Gauge = Gauge::new(
        format!("{PREFIX}_running_executions"),
        "Number of backup executions currently running"
    ).expect("Failed to create running_executions metric");

    // Webhook Metrics
    pub static ref WEBHOOK_DELIVERIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_webhook_deliveries_total"), "Finished webhook deliveries by outcome"),
        &["outcome"]
    ).expect("Failed to create webhook_deliveries_total metric");

    pub static ref WEBHOOK_ATTEMPTS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_webhook_attempts_total"),
        "Total outbound webhook HTTP attempts"
    ).expect("Failed to create webhook_attempts_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(EXECUTION_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(RUNNING_EXECUTIONS.clone()));
    let _ = REGISTRY.register(Box::new(WEBHOOK_DELIVERIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WEBHOOK_ATTEMPTS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_execution_started() {
    RUNNING_EXECUTIONS.inc();
}

/// Record a finished execution
pub fn record_execution_finished(status: &str, duration: Duration) {
    RUNNING_EXECUTIONS.dec();
    EXECUTIONS_TOTAL.with_label_values(&[status]).inc();
    EXECUTION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn record_webhook_attempt() {
    WEBHOOK_ATTEMPTS_TOTAL.inc();
}

/// Record the final outcome of a webhook delivery
pub fn record_webhook_delivery(outcome: &str) {
    WEBHOOK_DELIVERIES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Handler for the /metrics endpoint
async fn metrics_handler() -> impl IntoResponse {
    (StatusCode::OK, render())
}

pub fn metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serves /metrics on `port` until `shutdown` is cancelled.
pub async fn serve(port: u16, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Metrics available at port {}", port);
    axum::serve(listener, metrics_app())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
