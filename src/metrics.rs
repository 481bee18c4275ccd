//! Prometheus metrics for the node service.
//!
//! Counters are process-wide registrations in the default registry,
//! initialized once on first use and exposed through plain recording
//! functions.  The metrics server renders them in the Prometheus text
//! format on `/metrics`.

use std::io;
use std::sync::LazyLock;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{CounterVec, Opts, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

const SUBSYSTEM: &str = "datadog_csi_driver";

/// TCP port the metrics server listens on.
pub const METRICS_PORT: u16 = 5000;

/// The status of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation succeeded.
    Success,
    /// The operation failed.
    Failed,
    /// No publisher supported the operation.
    Unsupported,
}

impl Status {
    /// Metrics label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Unsupported => "unsupported",
        }
    }
}

fn new_counter_vec(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let counter = CounterVec::new(Opts::new(format!("{SUBSYSTEM}_{name}"), help), labels)
        .expect("valid metric definition");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
}

static NODE_PUBLISH_VOLUME_ATTEMPTS: LazyLock<CounterVec> = LazyLock::new(|| {
    new_counter_vec(
        "node_publish_volume_attempts",
        "Counts the number of publish volume requests received by the csi node server",
        &["type", "path", "status"],
    )
});

static NODE_UNPUBLISH_VOLUME_ATTEMPTS: LazyLock<CounterVec> = LazyLock::new(|| {
    new_counter_vec(
        "node_unpublish_volume_attempts",
        "Counts the number of unpublish volume requests received by the csi node server",
        &["status"],
    )
});

/// Record a publish volume attempt.
pub fn record_volume_mount_attempt(volume_type: &str, path: &str, status: Status) {
    NODE_PUBLISH_VOLUME_ATTEMPTS
        .with_label_values(&[volume_type, path, status.as_str()])
        .inc();
}

/// Record an unpublish volume attempt.
pub fn record_volume_unmount_attempt(status: Status) {
    NODE_UNPUBLISH_VOLUME_ATTEMPTS
        .with_label_values(&[status.as_str()])
        .inc();
}

/// Run the metrics HTTP server until the shutdown signal fires.
pub async fn serve(port: u16, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
    let app = Router::new().route("/metrics", get(render_metrics));
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "starting metrics server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}

async fn render_metrics() -> Result<String, StatusCode> {
    let mut buf = String::new();
    TextEncoder::new()
        .encode_utf8(&prometheus::gather(), &mut buf)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(buf)
}
