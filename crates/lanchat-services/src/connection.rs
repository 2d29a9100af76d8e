//! Per-connection decode loops.
//!
//! Every registered connection gets exactly one reader task. It decodes
//! packets until the stream ends and hands each one to the dispatcher.
//! Generation cancellation does not reach it; the loop ends on its own
//! when the socket does, and then removes its peer.

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Decoder;

use lanchat_core::{CodecError, PacketCodec};

use crate::dispatch;
use crate::node::Node;
use crate::registry::{PeerConnection, PeerId};

const READ_BUF: usize = 8 * 1024;

/// Register a connected socket and start its decode loop.
pub fn register_stream(node: &Arc<Node>, stream: TcpStream) -> Result<(PeerId, JoinHandle<()>)> {
    let id: PeerId = stream
        .peer_addr()
        .context("connection has no peer address")?
        .to_string();
    let (reader, writer) = stream.into_split();

    node.registry()
        .register(id.clone(), PeerConnection::new(writer))?;
    tracing::debug!(peer = %id, "connection registered");

    let handle = tokio::spawn(read_loop(node.clone(), id.clone(), reader));
    Ok((id, handle))
}

/// Decode packets from `reader` until end-of-stream or a read error.
pub async fn read_loop<R>(node: Arc<Node>, id: PeerId, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut codec = PacketCodec::new();
    let mut buf = BytesMut::with_capacity(READ_BUF);

    loop {
        // Drain every complete packet before reading again.
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(packet)) => dispatch::handle_inbound(&node, packet, &id).await,
                Ok(None) => break,
                Err(CodecError::TooLarge { size, max }) => {
                    tracing::warn!(peer = %id, size, max, "oversized packet discarded");
                }
                Err(e) => {
                    tracing::warn!(peer = %id, error = %e, "decode failed, skipping");
                }
            }
        }

        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                tracing::debug!(peer = %id, "connection closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer = %id, error = %e, "read failed");
                break;
            }
        }
    }

    node.drop_peer(&id).await;
}
