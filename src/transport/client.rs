//! UNIX socket client for the CSI transport.
//!
//! One request/response exchange per connection, mirroring the server.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::CsiError;
use crate::message::CsiMessage;

/// Client sending [`CsiMessage`] requests to a [`CsiServer`] socket.
///
/// [`CsiServer`]: super::server::CsiServer
pub struct CsiClient {
    address: PathBuf,
}

impl CsiClient {
    /// Create a client for the given socket address.
    pub fn new(address: impl AsRef<Path>) -> Self {
        Self {
            address: address.as_ref().to_path_buf(),
        }
    }

    /// Send one request and wait for the response.
    pub async fn call(&self, request: &CsiMessage) -> Result<CsiMessage, CsiError> {
        let mut stream = UnixStream::connect(&self.address)
            .await
            .map_err(CsiError::transport)?;

        let payload = serde_json::to_vec(request).map_err(CsiError::internal)?;
        stream.write_all(&payload).await.map_err(CsiError::transport)?;
        // Half-close so the server sees EOF on the request.
        stream.shutdown().await.map_err(CsiError::transport)?;

        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .map_err(CsiError::transport)?;

        serde_json::from_slice(&buf)
            .map_err(|e| CsiError::Transport(format!("malformed response: {e}")))
    }
}
