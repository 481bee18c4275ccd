//! # datadog-csi-driver — Datadog CSI node plugin
//!
//! A node-local [Container Storage Interface][csi] plugin that exposes
//! Datadog agent endpoints and instrumentation libraries to application
//! containers via bind mounts.  It follows the project conventions used
//! across the codebase: Tokio async runtime, `tracing` for observability,
//! `thiserror` for structured errors.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: volume IDs, volume types, requests. |
//! | [`error`] | [`CsiError`] enum covering all failure modes. |
//! | [`message`] | [`CsiMessage`] protocol envelope for the transport. |
//! | [`identity`] | [`CsiIdentity`] trait — plugin discovery & health. |
//! | [`node`] | [`CsiNode`] trait — publish and unpublish. |
//! | [`transport`] | UNIX socket server/client. |
//! | [`driver`] | [`CsiDriver`] — the trait implementations. |
//! | [`publishers`] | Per-volume-type mount logic and the dispatch chain. |
//! | [`librarymanager`] | SSI library download, storage, and tracking. |
//! | [`metrics`] | Prometheus counters and the metrics server. |
//! | [`config`] | CLI flags and `DD_` environment overrides. |
//!
//! [csi]: https://github.com/container-storage-interface/spec

pub mod config;
pub mod driver;
pub mod error;
pub mod identity;
pub mod librarymanager;
pub mod message;
pub mod metrics;
pub mod node;
pub mod publishers;
pub mod transport;
pub mod types;

#[cfg(test)]
pub mod testutil;

// Re-export the most commonly used items at crate root for convenience.
pub use config::Config;
pub use driver::CsiDriver;
pub use error::CsiError;
pub use identity::CsiIdentity;
pub use message::CsiMessage;
pub use node::CsiNode;
pub use types::*;
