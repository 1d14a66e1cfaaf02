//! Transport to and from shard leaders.
//!
//! The generator talks to leaders through the [`Transport`] trait so the
//! dispatch path can be exercised against an in-memory recorder in tests.
//! [`TcpTransport`] is the production implementation: one length-delimited
//! frame per message over a short-lived TCP connection. [`BlockServer`]
//! accepts block announcements from leaders and forwards them over a channel.

mod config;
mod server;
mod tcp;
mod transport;

pub use config::TransportConfig;
pub use server::BlockServer;
pub use tcp::TcpTransport;
pub use transport::{Transport, TransportError};
