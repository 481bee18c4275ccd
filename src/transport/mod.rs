//! UNIX socket transport for CSI messages.
//!
//! This module provides [`CsiServer`] and [`CsiClient`] that exchange
//! [`CsiMessage`](crate::message::CsiMessage) values over a UNIX domain
//! socket, one request/response pair per connection.

pub mod client;
pub mod endpoint;
pub mod server;

pub use client::CsiClient;
pub use endpoint::ensure_socket_availability;
pub use server::CsiServer;
