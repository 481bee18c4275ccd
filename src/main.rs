//! Entry point: runs the metrics server and the CSI server and shuts both
//! down when either fails.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::info;
use tracing_subscriber::EnvFilter;

use datadog_csi_driver::transport::CsiServer;
use datadog_csi_driver::{metrics, Config, CsiDriver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run(config).await
}

/// Create and run the metrics server and the CSI driver server.
///
/// There is no guarantee on the order in which the servers start, but if
/// either fails both are shut down gracefully before the error is returned.
async fn run(config: Config) -> anyhow::Result<()> {
    let driver = Arc::new(CsiDriver::new(&config).context("failed to create CSI driver")?);
    info!(
        version = driver.version(),
        name = %config.driver_name,
        "created Datadog CSI driver",
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut metrics_task = tokio::spawn(metrics::serve(metrics::METRICS_PORT, shutdown_rx.clone()));

    let server = CsiServer::bind(&config.csi_endpoint, Arc::clone(&driver))
        .context("failed to bind CSI endpoint")?;
    let mut csi_task = tokio::spawn(async move { server.serve(shutdown_rx).await });

    // Wait for the first server to exit, then stop the other one gracefully.
    let first_error = tokio::select! {
        res = &mut metrics_task => {
            let err = server_exit("metrics server", flatten(res));
            let _ = shutdown_tx.send(true);
            info!("waiting for servers to stop gracefully");
            let _ = csi_task.await;
            err
        }
        res = &mut csi_task => {
            let err = server_exit("csi server", flatten(res));
            let _ = shutdown_tx.send(true);
            info!("waiting for servers to stop gracefully");
            let _ = metrics_task.await;
            err
        }
    };
    info!("graceful stop finished");

    driver.stop().await;

    Err(first_error)
}

fn flatten<E>(res: Result<Result<(), E>, JoinError>) -> anyhow::Result<()>
where
    E: Into<anyhow::Error>,
{
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(e.into()),
    }
}

/// Both servers run until shutdown, so any spontaneous exit is fatal.
fn server_exit(which: &str, result: anyhow::Result<()>) -> anyhow::Error {
    match result {
        Ok(()) => anyhow::anyhow!("{which} exited unexpectedly"),
        Err(e) => e.context(format!("{which} failed")),
    }
}
