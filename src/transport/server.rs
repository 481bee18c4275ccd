//! UNIX socket server dispatching incoming CSI requests to the identity and
//! node service implementations.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::endpoint::ensure_socket_availability;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::message::CsiMessage;
use crate::node::CsiNode;

/// Upper bound on the size of a single request payload.
const MAX_REQUEST_BYTES: u64 = 1024 * 1024;

/// A CSI server that accepts UNIX socket connections and dispatches
/// [`CsiMessage`] requests to a [`CsiIdentity`] + [`CsiNode`]
/// implementation.
pub struct CsiServer<T> {
    listener: UnixListener,
    address: PathBuf,
    handler: Arc<T>,
}

impl<T> CsiServer<T>
where
    T: CsiIdentity + CsiNode + 'static,
{
    /// Bind the server to the given `unix://` endpoint, removing a stale
    /// socket first.
    pub fn bind(endpoint: &str, handler: Arc<T>) -> Result<Self, CsiError> {
        let address = ensure_socket_availability(endpoint)?;
        let listener = UnixListener::bind(&address).map_err(CsiError::transport)?;
        info!(address = %address.display(), "CSI server listening");
        Ok(Self {
            listener,
            address,
            handler,
        })
    }

    /// The filesystem address the server is bound to.
    pub fn address(&self) -> &PathBuf {
        &self.address
    }

    /// Accept connections until the shutdown signal fires.
    ///
    /// Each accepted connection is handled in its own Tokio task, so
    /// concurrent publish requests do not serialize on the transport.
    pub async fn serve(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), CsiError> {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("CSI server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, _addr) = accepted.map_err(CsiError::transport)?;
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, handler).await {
                            error!(error = %e, "CSI connection handler error");
                        }
                    });
                }
            }
        }
    }

    /// Process a single connection: read request → dispatch → write
    /// response.
    async fn handle_connection(mut stream: UnixStream, handler: Arc<T>) -> Result<(), CsiError> {
        let mut buf = Vec::new();
        (&mut stream)
            .take(MAX_REQUEST_BYTES)
            .read_to_end(&mut buf)
            .await
            .map_err(CsiError::transport)?;

        let request: CsiMessage = serde_json::from_slice(&buf)
            .map_err(|e| CsiError::Transport(format!("malformed request: {e}")))?;

        debug!(%request, "CSI request received");

        let response = Self::dispatch(&*handler, request).await;

        let payload = serde_json::to_vec(&response).map_err(CsiError::internal)?;
        stream.write_all(&payload).await.map_err(CsiError::transport)?;
        stream.shutdown().await.map_err(CsiError::transport)?;
        Ok(())
    }

    /// Map a [`CsiMessage`] request to the correct trait method call and
    /// wrap the result in a response [`CsiMessage`].
    async fn dispatch(handler: &T, request: CsiMessage) -> CsiMessage {
        match request {
            // --- Identity ---------------------------------------------------
            CsiMessage::Probe => match handler.probe().await {
                Ok(ok) => CsiMessage::ProbeResult(ok),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::GetPluginInfo => match handler.get_plugin_info().await {
                Ok(info) => CsiMessage::PluginInfoResponse(info),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::GetPluginCapabilities => match handler.get_plugin_capabilities().await {
                Ok(caps) => CsiMessage::PluginCapabilitiesResponse(caps),
                Err(e) => CsiMessage::Error(e),
            },

            // --- Node -------------------------------------------------------
            CsiMessage::NodeGetCapabilities => match handler.get_capabilities().await {
                Ok(caps) => CsiMessage::NodeCapabilitiesResponse(caps),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::NodeGetInfo => match handler.get_info().await {
                Ok(info) => CsiMessage::NodeInfoResponse(info),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::NodePublishVolume(req) => match handler.publish_volume(req).await {
                Ok(()) => CsiMessage::Ok,
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::NodeUnpublishVolume(req) => match handler.unpublish_volume(req).await {
                Ok(()) => CsiMessage::Ok,
                Err(e) => CsiMessage::Error(e),
            },

            // --- Response variants should never arrive as requests ----------
            other => {
                warn!(msg = %other, "unexpected message variant received as request");
                CsiMessage::Error(CsiError::InvalidArgument(format!(
                    "unexpected message: {other}"
                )))
            }
        }
    }
}
