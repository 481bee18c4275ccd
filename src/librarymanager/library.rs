//! Library identity.
//!
//! A [`Library`] names a Datadog instrumentation package to download and
//! mount as part of a `DatadogLibrary` volume request.

use super::LibraryError;

/// A Datadog instrumentation package, identified by an image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    name: String,
    registry: String,
    version: String,
    pull: bool,
}

impl Library {
    /// Instantiate a new library from the provided fields, ensuring they are
    /// valid.
    pub fn new(
        name: impl Into<String>,
        registry: impl Into<String>,
        version: impl Into<String>,
        pull: bool,
    ) -> Result<Self, LibraryError> {
        let name = name.into();
        let registry = registry.into();
        let version = version.into();

        if name.is_empty() {
            return Err(LibraryError::InvalidInput(
                "name must be provided and cannot be empty".into(),
            ));
        }
        if registry.is_empty() {
            return Err(LibraryError::InvalidInput(
                "registry must be provided and cannot be empty".into(),
            ));
        }
        if version.is_empty() {
            return Err(LibraryError::InvalidInput(
                "version must be provided and cannot be empty".into(),
            ));
        }

        Ok(Self {
            name,
            registry,
            version,
            pull,
        })
    }

    /// Whether the digest cache should be bypassed for this library.
    pub fn pull(&self) -> bool {
        self.pull
    }

    /// A pullable container image reference.
    ///
    /// Handles both tag and digest versions:
    ///   - Tags: `registry/name:v1.0.0`
    ///   - Digests: `registry/name@sha256:abc123...`
    pub fn image(&self) -> String {
        // Digests use the @ separator, tags use :
        let separator = if is_digest(&self.version) { "@" } else { ":" };
        format!("{}/{}{}{}", self.registry, self.name, separator, self.version)
    }
}

/// Whether the version string is an OCI digest (e.g. `sha256:abc123...`).
///
/// OCI digests follow the pattern `algorithm:hex` and always contain a
/// colon; tags cannot contain colons, so this check is sufficient.
fn is_digest(version: &str) -> bool {
    version.contains(':')
}
