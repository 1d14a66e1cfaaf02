//! TCP implementation of [`Transport`].

use crate::{Transport, TransportConfig, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::trace;
use txgen_types::LeaderEndpoint;

/// Sends each message as one length-delimited frame on a fresh connection.
///
/// Connections are not pooled. Batches go out at most once per shard per
/// round, so the handshake cost is negligible next to the payload.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: TransportConfig,
}

impl TcpTransport {
    /// Create a transport with the given configuration.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub(crate) fn frame_codec(config: &TransportConfig) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .max_frame_length(config.max_frame_length)
            .new_codec()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(
        &self,
        endpoint: &LeaderEndpoint,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let addr = endpoint.address;
        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(TransportError::Connect { addr, source }),
            Err(_) => return Err(TransportError::Timeout { addr }),
        };
        stream.set_nodelay(true)?;

        let len = payload.len();
        let mut framed = Framed::new(stream, Self::frame_codec(&self.config));
        let write = async {
            framed.send(payload).await?;
            SinkExt::<Bytes>::close(&mut framed).await?;
            Ok::<_, std::io::Error>(())
        };
        timeout(self.config.write_timeout, write)
            .await
            .map_err(|_| TransportError::Timeout { addr })??;

        trace!(leader = %addr, bytes = len, "Frame delivered");
        Ok(())
    }
}
