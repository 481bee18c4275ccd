//! CSI endpoint parsing.
//!
//! The endpoint is a URL with scheme `unix` (e.g. `unix:///csi/csi.sock`);
//! the host and path concatenate into the filesystem address.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::error::CsiError;

/// Extract the socket address from a unix endpoint.
pub fn socket_address(endpoint: &str) -> Result<PathBuf, CsiError> {
    let (scheme, rest) = endpoint.split_once("://").ok_or_else(|| {
        CsiError::InvalidArgument(format!("could not parse endpoint {endpoint:?}"))
    })?;

    if !scheme.eq_ignore_ascii_case("unix") {
        return Err(CsiError::InvalidArgument(format!(
            "{endpoint:?} is not a unix endpoint"
        )));
    }
    if rest.is_empty() {
        return Err(CsiError::InvalidArgument(
            "endpoint path can't be empty".into(),
        ));
    }

    Ok(PathBuf::from(rest))
}

/// Extract the socket address from a unix endpoint and ensure it is
/// available, deleting a stale socket left behind by a previous run.
pub fn ensure_socket_availability(endpoint: &str) -> Result<PathBuf, CsiError> {
    let address = socket_address(endpoint)?;

    match fs::remove_file(&address) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(CsiError::Internal(format!(
                "could not remove unix socket {}: {e}",
                address.display()
            )))
        }
    }

    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_endpoints() {
        assert_eq!(
            socket_address("unix:///csi/csi.sock").unwrap(),
            PathBuf::from("/csi/csi.sock")
        );
        assert_eq!(
            socket_address("UNIX:///csi/csi.sock").unwrap(),
            PathBuf::from("/csi/csi.sock")
        );
    }

    #[test]
    fn rejects_non_unix_endpoints() {
        assert!(matches!(
            socket_address("tcp://127.0.0.1:9000"),
            Err(CsiError::InvalidArgument(_))
        ));
        assert!(matches!(
            socket_address("/csi/csi.sock"),
            Err(CsiError::InvalidArgument(_))
        ));
        assert!(matches!(
            socket_address("unix://"),
            Err(CsiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn removes_stale_sockets() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("csi.sock");
        std::fs::write(&path, b"stale").unwrap();

        let endpoint = format!("unix://{}", path.display());
        let address = ensure_socket_availability(&endpoint).unwrap();

        assert_eq!(address, path);
        assert!(!path.exists());

        // A missing socket is fine too.
        ensure_socket_availability(&endpoint).unwrap();
    }
}
