//! OCI registry downloads.
//!
//! [`Downloader`] wraps an [`oci_client::Client`] to pull instrumentation
//! library images and query manifest digests.  The [`LibraryFetcher`] trait
//! is the seam the rest of the manager depends on, so tests can substitute
//! a local fixture for the registry.

use std::path::Path;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use oci_client::client::{ClientConfig, ImageLayer};
use oci_client::manifest::{
    IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE, IMAGE_DOCKER_LAYER_TAR_MEDIA_TYPE,
    IMAGE_LAYER_GZIP_MEDIA_TYPE, IMAGE_LAYER_MEDIA_TYPE,
};
use oci_client::secrets::RegistryAuth;
use oci_client::{Client, Reference};
use tracing::debug;

use super::archive::ArchiveExtractor;
use super::LibraryError;

/// User agent sent on registry HTTP operations to identify the driver.
const USER_AGENT: &str = "datadog-csi-driver";

/// Downloading and digest resolution for container images.
///
/// The seam between the library manager and the registry; implemented by
/// [`Downloader`] in production and by fixtures in tests.
#[async_trait]
pub trait LibraryFetcher: Send + Sync {
    /// Pull the image and extract its flattened filesystem into `dest`.
    async fn download(&self, image: &str, dest: &Path) -> Result<(), LibraryError>;

    /// Query the registry for the image's manifest digest without pulling
    /// layers.  Returns the digest in `algorithm:hex` form.
    async fn fetch_digest(&self, image: &str) -> Result<String, LibraryError>;
}

/// Registry-backed downloader for instrumentation library images.
pub struct Downloader {
    client: Client,
}

impl Downloader {
    /// Create a new downloader with the default registry settings.
    pub fn new() -> Self {
        Self::with_config(ClientConfig {
            user_agent: USER_AGENT,
            ..Default::default()
        })
    }

    /// Create a new downloader with the provided client configuration.
    /// Exposed primarily so tests can point at a plain-HTTP local registry.
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    fn parse_reference(image: &str) -> Result<Reference, LibraryError> {
        image
            .parse::<Reference>()
            .map_err(|e| LibraryError::InvalidImage {
                image: image.to_owned(),
                reason: e.to_string(),
            })
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LibraryFetcher for Downloader {
    async fn download(&self, image: &str, dest: &Path) -> Result<(), LibraryError> {
        let reference = Self::parse_reference(image)?;

        let accepted = vec![
            IMAGE_LAYER_MEDIA_TYPE,
            IMAGE_LAYER_GZIP_MEDIA_TYPE,
            IMAGE_DOCKER_LAYER_TAR_MEDIA_TYPE,
            IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE,
        ];
        let data = self
            .client
            .pull(&reference, &RegistryAuth::Anonymous, accepted)
            .await
            .map_err(|e| LibraryError::Download {
                image: image.to_owned(),
                reason: e.to_string(),
            })?;

        debug!(image, layers = data.layers.len(), "pulled image");

        // Layer application is ordered, so the flattened filesystem is the
        // layers extracted in sequence over the same destination.
        let dest = dest.to_path_buf();
        let layers = data.layers;
        tokio::task::spawn_blocking(move || extract_layers(&layers, &dest))
            .await
            .map_err(|e| LibraryError::Task(e.to_string()))?
    }

    async fn fetch_digest(&self, image: &str) -> Result<String, LibraryError> {
        let reference = Self::parse_reference(image)?;
        self.client
            .fetch_manifest_digest(&reference, &RegistryAuth::Anonymous)
            .await
            .map_err(|e| LibraryError::DigestFetch {
                image: image.to_owned(),
                reason: e.to_string(),
            })
    }
}

fn extract_layers(layers: &[ImageLayer], dest: &Path) -> Result<(), LibraryError> {
    for layer in layers {
        let extractor = ArchiveExtractor::new("/", dest);
        if layer.media_type.ends_with("gzip") {
            extractor.extract(GzDecoder::new(layer.data.as_slice()))?;
        } else {
            extractor.extract(layer.data.as_slice())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn tar_bytes() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(7);
        builder
            .append_data(&mut header, "datadog-init/package/library.txt", &b"payload"[..])
            .unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn extracts_plain_and_gzip_layers() {
        let tmp = tempfile::tempdir().unwrap();
        let tar = tar_bytes();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar).unwrap();
        let gzipped = encoder.finish().unwrap();

        let layers = vec![
            ImageLayer::new(tar, IMAGE_LAYER_MEDIA_TYPE.to_owned(), None),
            ImageLayer::new(gzipped, IMAGE_LAYER_GZIP_MEDIA_TYPE.to_owned(), None),
        ];

        extract_layers(&layers, tmp.path()).unwrap();
        let content = std::fs::read(tmp.path().join("datadog-init/package/library.txt")).unwrap();
        assert_eq!(content, b"payload");
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(Downloader::parse_reference("registry/name:tag:extra").is_err());
    }
}
