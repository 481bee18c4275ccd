//! CSI protocol messages transmitted over the UNIX socket transport.
//!
//! [`CsiMessage`] is the top-level envelope for all request and response
//! variants exchanged between the kubelet-facing client and the node plugin.

use serde::{Deserialize, Serialize};

use crate::error::CsiError;
use crate::types::*;

/// Top-level message envelope for the CSI transport.
///
/// Each connection carries exactly one request followed by one response.
/// The client sends a *request* variant and the server replies with the
/// corresponding *response* variant (or [`CsiMessage::Error`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CsiMessage {
    // ----- Requests --------------------------------------------------------
    /// Health probe (Identity).
    Probe,
    /// Query plugin info (Identity).
    GetPluginInfo,
    /// Query plugin capabilities (Identity).
    GetPluginCapabilities,
    /// Query node capabilities (Node).
    NodeGetCapabilities,
    /// Query node info (Node).
    NodeGetInfo,
    /// Publish (bind-mount) a volume into a Pod (Node).
    NodePublishVolume(NodePublishVolumeRequest),
    /// Unpublish a previously published volume (Node).
    NodeUnpublishVolume(NodeUnpublishVolumeRequest),

    // ----- Responses -------------------------------------------------------
    /// Plugin information.
    PluginInfoResponse(PluginInfo),
    /// Plugin capabilities.
    PluginCapabilitiesResponse(Vec<PluginCapability>),
    /// Node capabilities.
    NodeCapabilitiesResponse(Vec<NodeCapability>),
    /// Node information.
    NodeInfoResponse(NodeInfo),
    /// Probe result.
    ProbeResult(bool),
    /// Generic success acknowledgement (no payload).
    Ok,
    /// An error occurred.
    Error(CsiError),
}

impl std::fmt::Display for CsiMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Probe => f.write_str("Probe"),
            Self::GetPluginInfo => f.write_str("GetPluginInfo"),
            Self::GetPluginCapabilities => f.write_str("GetPluginCapabilities"),
            Self::NodeGetCapabilities => f.write_str("NodeGetCapabilities"),
            Self::NodeGetInfo => f.write_str("NodeGetInfo"),
            Self::NodePublishVolume(req) => write!(f, "NodePublishVolume({})", req.volume_id),
            Self::NodeUnpublishVolume(req) => {
                write!(f, "NodeUnpublishVolume({})", req.volume_id)
            }
            Self::PluginInfoResponse(info) => write!(f, "PluginInfo(name={})", info.name),
            Self::PluginCapabilitiesResponse(caps) => {
                write!(f, "PluginCapabilities(count={})", caps.len())
            }
            Self::NodeCapabilitiesResponse(caps) => {
                write!(f, "NodeCapabilities(count={})", caps.len())
            }
            Self::NodeInfoResponse(info) => write!(f, "NodeInfo({})", info.node_id),
            Self::ProbeResult(ok) => write!(f, "ProbeResult({})", ok),
            Self::Ok => f.write_str("Ok"),
            Self::Error(e) => write!(f, "Error({})", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn message_serde_roundtrip() {
        let msg = CsiMessage::NodePublishVolume(NodePublishVolumeRequest {
            volume_id: "v1".into(),
            target_path: "/tgt".into(),
            volume_context: HashMap::from([("type".to_owned(), "APMSocket".to_owned())]),
            read_only: false,
        });
        let json = serde_json::to_string(&msg).expect("serialize");
        let de: CsiMessage = serde_json::from_str(&json).expect("deserialize");
        assert!(matches!(de, CsiMessage::NodePublishVolume(_)));
    }

    #[test]
    fn error_message_roundtrip() {
        let msg = CsiMessage::Error(CsiError::InvalidArgument("bad request".into()));
        let json = serde_json::to_string(&msg).expect("serialize");
        let de: CsiMessage = serde_json::from_str(&json).expect("deserialize");
        assert!(matches!(de, CsiMessage::Error(CsiError::InvalidArgument(_))));
    }

    #[test]
    fn display_formatting() {
        assert_eq!(CsiMessage::Ok.to_string(), "Ok");
        assert_eq!(CsiMessage::Probe.to_string(), "Probe");
    }
}
