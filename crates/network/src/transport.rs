//! The transport seam between dispatch and the network.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use thiserror::Error;
use txgen_messages::CodecError;
use txgen_types::LeaderEndpoint;

/// Errors raised while delivering a message to a leader.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out talking to {addr}")]
    Timeout { addr: SocketAddr },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport closed")]
    Closed,
}

/// Outbound delivery of encoded messages to leaders.
///
/// Delivery is fire-and-forget: `Ok` means the bytes were handed to the
/// peer, not that the leader accepted them.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver one encoded message to a leader.
    async fn send(&self, endpoint: &LeaderEndpoint, payload: Bytes)
        -> Result<(), TransportError>;

    /// Deliver the same message to every endpoint concurrently.
    ///
    /// Results are returned in endpoint order; one failure does not affect
    /// the others.
    async fn broadcast(
        &self,
        endpoints: &[LeaderEndpoint],
        payload: Bytes,
    ) -> Vec<Result<(), TransportError>> {
        futures::future::join_all(
            endpoints
                .iter()
                .map(|endpoint| self.send(endpoint, payload.clone())),
        )
        .await
    }
}
