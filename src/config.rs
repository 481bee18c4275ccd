//! Driver configuration.
//!
//! Every flag can also be set through the environment with the `DD_` prefix
//! (dashes become underscores, uppercased), e.g. `DD_CSI_ENDPOINT`.

use std::path::PathBuf;

use clap::Parser;

/// Default advertised CSI driver name.
pub const CSI_DRIVER_NAME: &str = "k8s.csi.datadoghq.com";

/// Command line configuration for the CSI driver.
#[derive(Parser, Debug, Clone)]
#[command(name = "datadog-csi-driver", version, about = "Datadog CSI node plugin")]
pub struct Config {
    /// Name of the CSI driver
    #[arg(long, env = "DD_DRIVER_NAME", default_value = CSI_DRIVER_NAME)]
    pub driver_name: String,

    /// CSI endpoint
    #[arg(long, env = "DD_CSI_ENDPOINT", default_value = "unix:///csi/csi.sock")]
    pub csi_endpoint: String,

    /// APM socket host path
    #[arg(
        long,
        env = "DD_APM_HOST_SOCKET_PATH",
        default_value = "/var/run/datadog/apm.socket"
    )]
    pub apm_host_socket_path: PathBuf,

    /// Dogstatsd socket host path
    #[arg(
        long,
        env = "DD_DSD_HOST_SOCKET_PATH",
        default_value = "/var/run/datadog/dsd.socket"
    )]
    pub dsd_host_socket_path: PathBuf,

    /// Base path for CSI driver storage
    #[arg(
        long,
        env = "DD_STORAGE_PATH",
        default_value = "/var/lib/datadog-csi-driver"
    )]
    pub storage_path: PathBuf,

    /// Disable SSI publishers (library and injector preload).
    /// Publish requests are rejected while SSI is disabled, but unpublish
    /// requests are still handled.
    #[arg(long, env = "DD_DISABLE_SSI")]
    pub disable_ssi: bool,
}
