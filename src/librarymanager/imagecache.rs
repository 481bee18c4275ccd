//! In-memory cache of container image digests.
//!
//! Resolving a tag to its manifest digest costs a registry round trip, so
//! the result is cached for a fixed TTL.  Digest lookups dominate latency;
//! the single mutex guarding the map is not a contention concern.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use oci_client::Reference;

use super::downloader::LibraryFetcher;
use super::LibraryError;

struct CacheEntry {
    valid_until: Instant,
    value: String,
}

/// TTL cache mapping image references to manifest digests.
pub struct ImageCache {
    fetcher: Arc<dyn LibraryFetcher>,
    ttl: Duration,
    cache: StdMutex<HashMap<String, CacheEntry>>,
}

impl ImageCache {
    /// Initialize a new, empty image cache.
    pub fn new(fetcher: Arc<dyn LibraryFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            cache: StdMutex::new(HashMap::new()),
        }
    }

    /// Return the digest hex for a container image, using the cache when
    /// possible.
    ///
    /// The image parameter must be a valid container image reference, e.g.
    /// `gcr.io/datadoghq/dd-lib-java-init:v1.2.3` or
    /// `gcr.io/datadoghq/dd-lib-java-init@sha256:abc123...`.  Even when the
    /// reference already carries a digest, the registry is still consulted
    /// to confirm it exists.
    ///
    /// If `pull` is true the cache is bypassed and a fresh digest is always
    /// fetched; otherwise a remote call is only made on cache miss.  The
    /// returned value has the algorithm prefix stripped.
    pub async fn fetch_digest(&self, image: &str, pull: bool) -> Result<String, LibraryError> {
        validate_image_reference(image)?;

        if !pull {
            if let Some(cached) = self.digest_from_cache(image) {
                return Ok(cached);
            }
        }

        let digest = self.fetcher.fetch_digest(image).await?;
        let hex = strip_digest_prefix(&digest)?;

        self.cache_digest(image, &hex);
        Ok(hex)
    }

    fn cache_digest(&self, image: &str, digest: &str) {
        let entry = CacheEntry {
            valid_until: Instant::now() + self.ttl,
            value: digest.to_owned(),
        };
        let mut cache = self.cache.lock().expect("image cache mutex poisoned");
        cache.insert(image.to_owned(), entry);
    }

    fn digest_from_cache(&self, image: &str) -> Option<String> {
        let now = Instant::now();
        let mut cache = self.cache.lock().expect("image cache mutex poisoned");

        match cache.get(image) {
            Some(entry) if now <= entry.valid_until => Some(entry.value.clone()),
            Some(_) => {
                // Expired entries are removed on lookup.
                cache.remove(image);
                None
            }
            None => None,
        }
    }
}

fn validate_image_reference(image: &str) -> Result<(), LibraryError> {
    if image.is_empty() {
        return Err(LibraryError::InvalidImage {
            image: image.to_owned(),
            reason: "reference cannot be empty".into(),
        });
    }
    if image.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(LibraryError::InvalidImage {
            image: image.to_owned(),
            reason: "reference contains whitespace or control characters".into(),
        });
    }
    image
        .parse::<Reference>()
        .map_err(|e| LibraryError::InvalidImage {
            image: image.to_owned(),
            reason: e.to_string(),
        })?;
    Ok(())
}

/// Strip a recognized digest algorithm prefix, returning the hex part.
fn strip_digest_prefix(digest: &str) -> Result<String, LibraryError> {
    for prefix in ["sha256:", "sha384:", "sha512:"] {
        if let Some(hex) = digest.strip_prefix(prefix) {
            if !hex.is_empty() {
                return Ok(hex.to_owned());
            }
        }
    }
    Err(LibraryError::MalformedDigest(digest.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        digest: String,
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new(digest: &str) -> Arc<Self> {
            Arc::new(Self {
                digest: digest.to_owned(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LibraryFetcher for CountingFetcher {
        async fn download(&self, _image: &str, _dest: &Path) -> Result<(), LibraryError> {
            Ok(())
        }

        async fn fetch_digest(&self, _image: &str) -> Result<String, LibraryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.digest.clone())
        }
    }

    #[tokio::test]
    async fn digest_is_cached() {
        let fetcher = CountingFetcher::new("sha256:abc123");
        let cache = ImageCache::new(fetcher.clone(), Duration::from_secs(60));

        let d1 = cache
            .fetch_digest("gcr.io/datadoghq/dd-lib-java-init:v1", false)
            .await
            .unwrap();
        let d2 = cache
            .fetch_digest("gcr.io/datadoghq/dd-lib-java-init:v1", false)
            .await
            .unwrap();

        assert_eq!(d1, "abc123");
        assert_eq!(d2, "abc123");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn pull_bypasses_cache() {
        let fetcher = CountingFetcher::new("sha256:abc123");
        let cache = ImageCache::new(fetcher.clone(), Duration::from_secs(60));

        cache
            .fetch_digest("gcr.io/datadoghq/dd-lib-java-init:v1", false)
            .await
            .unwrap();
        cache
            .fetch_digest("gcr.io/datadoghq/dd-lib-java-init:v1", true)
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let fetcher = CountingFetcher::new("sha256:abc123");
        let cache = ImageCache::new(fetcher.clone(), Duration::from_millis(20));

        cache
            .fetch_digest("gcr.io/datadoghq/dd-lib-java-init:v1", false)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache
            .fetch_digest("gcr.io/datadoghq/dd-lib-java-init:v1", false)
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn malformed_references_are_rejected() {
        let fetcher = CountingFetcher::new("sha256:abc123");
        let cache = ImageCache::new(fetcher.clone(), Duration::from_secs(60));

        for image in ["", "has space:v1", "has\ncontrol:v1"] {
            let err = cache.fetch_digest(image, false).await.unwrap_err();
            assert!(matches!(err, LibraryError::InvalidImage { .. }), "{image:?}");
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn recognized_digest_prefixes_are_stripped() {
        for (digest, hex) in [
            ("sha256:aaa", "aaa"),
            ("sha384:bbb", "bbb"),
            ("sha512:ccc", "ccc"),
        ] {
            let fetcher = CountingFetcher::new(digest);
            let cache = ImageCache::new(fetcher, Duration::from_secs(60));
            let got = cache
                .fetch_digest("gcr.io/datadoghq/dd-lib-java-init:v1", false)
                .await
                .unwrap();
            assert_eq!(got, hex);
        }
    }

    #[tokio::test]
    async fn unrecognized_digest_prefix_is_an_error() {
        let fetcher = CountingFetcher::new("md5:abc123");
        let cache = ImageCache::new(fetcher, Duration::from_secs(60));
        let err = cache
            .fetch_digest("gcr.io/datadoghq/dd-lib-java-init:v1", false)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::MalformedDigest(_)));
    }
}
