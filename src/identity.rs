//! CSI Identity service trait.
//!
//! The Identity service lets the kubelet discover the plugin and check its
//! health before routing volume operations to it.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{PluginCapability, PluginInfo};

/// Identity service — plugin discovery & health.
#[async_trait]
pub trait CsiIdentity: Send + Sync {
    /// Return the configured driver name and version.
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError>;

    /// Return the capabilities of the plugin.
    ///
    /// This driver advertises a single empty Service capability: no
    /// controller service, no topology.
    async fn get_plugin_capabilities(&self) -> Result<Vec<PluginCapability>, CsiError>;

    /// Health probe.  Returns `true` when the plugin is ready to serve.
    async fn probe(&self) -> Result<bool, CsiError>;
}
