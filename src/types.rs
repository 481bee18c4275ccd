//! Core CSI types: volume identifiers, volume types, requests, and plugin
//! metadata.
//!
//! These types form the data model shared by the CSI traits, the transport
//! layer, and the publishers.  They are all [`Serialize`]/[`Deserialize`] so
//! they can be transmitted over the UNIX socket transport as JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Volume context keys
// ---------------------------------------------------------------------------

/// Volume context key selecting the new-schema volume type.
pub const KEY_TYPE: &str = "type";
/// Volume context key for the deprecated legacy schema mode.
pub const KEY_MODE: &str = "mode";
/// Volume context key for the deprecated legacy schema host path.
pub const KEY_PATH: &str = "path";

/// Volume context key naming the instrumentation library package.
pub const KEY_LIBRARY_PACKAGE: &str = "dd.csi.datadog.com/library.package";
/// Volume context key naming the registry hosting the library image.
pub const KEY_LIBRARY_REGISTRY: &str = "dd.csi.datadog.com/library.registry";
/// Volume context key naming the library version (tag or digest).
pub const KEY_LIBRARY_VERSION: &str = "dd.csi.datadog.com/library.version";
/// Optional volume context key overriding the in-image source subtree.
pub const KEY_LIBRARY_SOURCE: &str = "dd.csi.datadog.com/library.source";
/// Optional volume context key forcing a fresh digest fetch.
pub const KEY_LIBRARY_PULL: &str = "dd.csi.datadog.com/library.pull";

// ---------------------------------------------------------------------------
// Volume identity
// ---------------------------------------------------------------------------

/// Opaque, unique identifier for a volume, supplied by the kubelet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VolumeId(pub String);

impl VolumeId {
    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Volume types
// ---------------------------------------------------------------------------

/// The type of volume to mount, from the `type` volume context key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VolumeType {
    /// Mounts the APM socket file.
    ApmSocket,
    /// Mounts the parent directory of the APM socket.
    ApmSocketDirectory,
    /// Mounts the DogStatsD socket file.
    DsdSocket,
    /// Mounts the parent directory of the DogStatsD socket.
    DsdSocketDirectory,
    /// Deprecated, use [`VolumeType::DsdSocketDirectory`] instead.
    DatadogSocketsDirectory,
    /// Mounts a Datadog instrumentation library from an OCI image.
    DatadogLibrary,
    /// Mounts the `ld.so.preload` file.
    DatadogInjectorPreload,
}

impl VolumeType {
    /// The wire representation used in volume contexts and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApmSocket => "APMSocket",
            Self::ApmSocketDirectory => "APMSocketDirectory",
            Self::DsdSocket => "DSDSocket",
            Self::DsdSocketDirectory => "DSDSocketDirectory",
            Self::DatadogSocketsDirectory => "DatadogSocketsDirectory",
            Self::DatadogLibrary => "DatadogLibrary",
            Self::DatadogInjectorPreload => "DatadogInjectorPreload",
        }
    }

    /// Parse the `type` key of a volume context, if present and recognized.
    pub fn from_context(volume_context: &HashMap<String, String>) -> Option<Self> {
        volume_context.get(KEY_TYPE).and_then(|t| t.parse().ok())
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolumeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APMSocket" => Ok(Self::ApmSocket),
            "APMSocketDirectory" => Ok(Self::ApmSocketDirectory),
            "DSDSocket" => Ok(Self::DsdSocket),
            "DSDSocketDirectory" => Ok(Self::DsdSocketDirectory),
            "DatadogSocketsDirectory" => Ok(Self::DatadogSocketsDirectory),
            "DatadogLibrary" => Ok(Self::DatadogLibrary),
            "DatadogInjectorPreload" => Ok(Self::DatadogInjectorPreload),
            _ => Err(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request to publish (bind-mount) a volume into a Pod container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePublishVolumeRequest {
    /// Volume to publish.
    pub volume_id: VolumeId,
    /// Target path inside the Pod's volume directory.
    pub target_path: String,
    /// Opaque context from the inline volume definition.
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
    /// Whether the mount must be read-only.
    #[serde(default)]
    pub read_only: bool,
}

/// Request to unpublish (unmount) a previously published volume.
///
/// CSI deliberately omits the volume context here, so publishers must
/// recognize their own volumes by other means.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUnpublishVolumeRequest {
    /// Volume to unpublish.
    pub volume_id: VolumeId,
    /// Target path the volume was published at.
    pub target_path: String,
}

// ---------------------------------------------------------------------------
// Plugin & node info
// ---------------------------------------------------------------------------

/// Information about the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name, e.g. `"k8s.csi.datadoghq.com"`.
    pub name: String,
    /// Vendor-provided version string.
    pub vendor_version: String,
}

/// Capabilities advertised by the CSI plugin.
///
/// The driver advertises a single empty `Service` capability: no controller
/// service and no topology constraints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PluginCapability {
    /// Generic service capability with no optional features.
    Service,
}

/// Capabilities advertised by the CSI node service.
///
/// Inline CSI volumes do not stage, so the driver never returns any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeCapability {
    /// Volume staging support (never advertised by this driver).
    StageUnstageVolume,
}

/// Information about the node on which the CSI Node service runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identifier, from the `NODE_ID` environment variable.
    pub node_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_id_display() {
        let id = VolumeId("vol-abc".into());
        assert_eq!(id.to_string(), "vol-abc");
    }

    #[test]
    fn volume_type_roundtrip() {
        for vt in [
            VolumeType::ApmSocket,
            VolumeType::ApmSocketDirectory,
            VolumeType::DsdSocket,
            VolumeType::DsdSocketDirectory,
            VolumeType::DatadogSocketsDirectory,
            VolumeType::DatadogLibrary,
            VolumeType::DatadogInjectorPreload,
        ] {
            assert_eq!(vt.as_str().parse::<VolumeType>(), Ok(vt));
        }
        assert!("Unknown".parse::<VolumeType>().is_err());
    }

    #[test]
    fn volume_type_from_context() {
        let ctx = HashMap::from([(KEY_TYPE.to_owned(), "APMSocket".to_owned())]);
        assert_eq!(VolumeType::from_context(&ctx), Some(VolumeType::ApmSocket));

        let ctx = HashMap::from([(KEY_MODE.to_owned(), "socket".to_owned())]);
        assert_eq!(VolumeType::from_context(&ctx), None);
    }

    #[test]
    fn publish_request_serde_roundtrip() {
        let req = NodePublishVolumeRequest {
            volume_id: VolumeId("v1".into()),
            target_path: "/var/lib/kubelet/pods/x/volumes/dd".into(),
            volume_context: HashMap::from([(KEY_TYPE.to_owned(), "DSDSocket".to_owned())]),
            read_only: true,
        };
        let json = serde_json::to_string(&req).expect("serialize");
        let de: NodePublishVolumeRequest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(de.volume_id, req.volume_id);
        assert!(de.read_only);
    }
}
