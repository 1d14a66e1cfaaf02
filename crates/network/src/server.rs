//! Inbound listener for leader block announcements.

use crate::{TcpTransport, TransportConfig, TransportError};
use futures::StreamExt;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use txgen_messages::{decode_message, Message};
use txgen_types::Block;

/// Accepts leader connections and forwards announced blocks.
///
/// Every decoded `Blocks` message becomes one item on the output channel.
/// Other message types are ignored; undecodable frames are logged and
/// skipped without dropping the connection.
pub struct BlockServer {
    listener: TcpListener,
    config: TransportConfig,
}

impl BlockServer {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr, config: TransportConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, config })
    }

    /// Address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` fires or the block consumer goes away.
    pub async fn run(self, blocks: mpsc::Sender<Vec<Block>>, shutdown: CancellationToken) {
        let local = self.listener.local_addr().ok();
        info!(addr = ?local, "Block server listening");

        let connections = TaskTracker::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = blocks.closed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let codec = TcpTransport::frame_codec(&self.config);
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            codec,
                            blocks.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => warn!(error = %e, "Failed to accept leader connection"),
                },
            }
        }

        connections.close();
        connections.wait().await;
        info!(addr = ?local, "Block server stopped");
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    codec: LengthDelimitedCodec,
    blocks: mpsc::Sender<Vec<Block>>,
    shutdown: CancellationToken,
) {
    let mut frames = FramedRead::new(stream, codec);
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = frames.next() => frame,
        };
        let Some(frame) = frame else { break };

        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%peer, error = %e, "Leader connection failed");
                break;
            }
        };

        match decode_message(&bytes) {
            Ok(Message::Blocks(announced)) => {
                debug!(%peer, count = announced.len(), "Received blocks");
                if blocks.send(announced).await.is_err() {
                    break;
                }
            }
            Ok(other) => debug!(%peer, message = other.type_name(), "Ignoring message"),
            Err(e) => warn!(%peer, error = %e, "Failed to decode leader message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transport;
    use bytes::Bytes;
    use txgen_messages::{encode_message, encode_stop_message};
    use txgen_types::{BlockHeight, Hash, LeaderEndpoint, PeerPublicKey, ShardId};

    fn block(shard: u32) -> Block {
        Block {
            shard_id: ShardId(shard),
            height: BlockHeight(1),
            hash: Hash::from_bytes(b"b"),
            parent_hash: Hash::ZERO,
            transactions: vec![],
            account_payload: vec![],
        }
    }

    #[tokio::test]
    async fn test_blocks_forwarded_and_other_messages_ignored() {
        let server = BlockServer::bind("127.0.0.1:0".parse().unwrap(), TransportConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(tx, shutdown.clone()));

        let transport = TcpTransport::default();
        let endpoint = LeaderEndpoint::new(addr, PeerPublicKey::for_address(&addr));

        let stop = Bytes::from(encode_stop_message().unwrap());
        transport.send(&endpoint, stop).await.unwrap();
        let announce = Bytes::from(encode_message(&Message::Blocks(vec![block(1)])).unwrap());
        transport.send(&endpoint, announce).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, vec![block(1)]);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_to_closed_port_fails() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = TcpTransport::default();
        let endpoint = LeaderEndpoint::new(addr, PeerPublicKey::for_address(&addr));
        let result = transport.send(&endpoint, Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
