use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::error::{ConnectionError, ProtocolViolation};
use super::router::Inbound;
use crate::client::ClientName;
use crate::message::{FrameError, Message, RecordReader, RecordWriter, excerpt};
use crate::registry::ClientRegistry;

/// Everything a connection task needs from the relay.
#[derive(Debug, Clone)]
pub(super) struct ConnectionContext {
    pub registry: Arc<ClientRegistry>,
    pub inbound: mpsc::Sender<Inbound>,
    pub shutdown: watch::Receiver<bool>,
    pub max_record_len: usize,
    pub outbound_capacity: usize,
    pub handshake_timeout: Duration,
    pub drain_timeout: Duration,
}

/// Why an identified client's connection ended. Logged once per connection.
enum Disconnect {
    ClosedByPeer,
    Superseded,
    Shutdown,
    Failed(ConnectionError),
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disconnect::ClosedByPeer => f.write_str("closed by peer"),
            Disconnect::Superseded => f.write_str("superseded by a newer connection"),
            Disconnect::Shutdown => f.write_str("relay shutting down"),
            Disconnect::Failed(e) => fmt::Display::fmt(e, f),
        }
    }
}

type Reader = RecordReader<BufReader<OwnedReadHalf>>;

/// Serve one client connection from handshake to cleanup.
///
/// Never returns an error: whatever goes wrong here is logged and only ends this connection.
pub(super) async fn serve(stream: TcpStream, peer: SocketAddr, mut ctx: ConnectionContext) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = RecordReader::new(BufReader::new(read_half), ctx.max_record_len);

    let handshake = tokio::time::timeout(ctx.handshake_timeout, identify(&mut reader));
    let name = tokio::select! {
        result = handshake => match result {
            Ok(Ok(Some(name))) => name,
            Ok(Ok(None)) => {
                debug!(peer = %peer, "Connection closed before identification");
                return;
            }
            Ok(Err(e)) => {
                warn!(peer = %peer, error = %e, "Rejecting connection");
                return;
            }
            Err(_) => {
                let e = ProtocolViolation::HandshakeTimeout(ctx.handshake_timeout);
                warn!(peer = %peer, error = %e, "Rejecting connection");
                return;
            }
        },
        _ = ctx.shutdown.changed() => return,
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(ctx.outbound_capacity);
    let mut registration = ctx.registry.register(name.clone(), outbound_tx);
    match &registration.superseded {
        Some(previous) => info!(
            client = %name,
            role = %registration.role,
            peer = %peer,
            previous_session = %previous,
            "Client reconnected, superseding previous connection"
        ),
        None => info!(client = %name, role = %registration.role, peer = %peer, "Client connected"),
    }

    let mut writer = tokio::spawn(write_loop(
        name.clone(),
        RecordWriter::new(write_half),
        outbound_rx,
    ));

    let reason = loop {
        tokio::select! {
            record = reader.next_record() => match record {
                Ok(Some(record)) => {
                    if !forward(&name, record, &ctx.inbound).await {
                        break Disconnect::Shutdown;
                    }
                }
                Ok(None) => break Disconnect::ClosedByPeer,
                Err(FrameError::RecordTooLong { limit }) => {
                    break Disconnect::Failed(ProtocolViolation::RecordTooLong { limit }.into());
                }
                Err(FrameError::Io(e)) => break Disconnect::Failed(ConnectionError::ConnectionLost(e)),
            },
            _ = &mut registration.evicted => break Disconnect::Superseded,
            _ = ctx.shutdown.changed() => break Disconnect::Shutdown,
        }
    };

    // A superseded connection no longer owns the entry and must leave it alone.
    if let Err(e) = ctx.registry.deregister(&name, &registration.session_id) {
        debug!(client = %name, error = %e, "Entry already removed");
    }

    match &reason {
        Disconnect::Failed(e) => warn!(client = %name, reason = %e, "Client disconnected"),
        reason => info!(client = %name, reason = %reason, "Client disconnected"),
    }

    // The writer ends once its sender is gone, unless the peer stopped reading and a write is
    // stuck on a full socket.
    match tokio::time::timeout(ctx.drain_timeout, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => warn!(client = %name, "Writer task panicked"),
        Err(_) => {
            warn!(client = %name, "Peer is not reading, dropping queued records");
            writer.abort();
        }
    }
}

/// Read the mandatory `cid` record.
async fn identify(reader: &mut Reader) -> Result<Option<ClientName>, ConnectionError> {
    let record = match reader.next_record().await {
        Ok(Some(record)) => record,
        Ok(None) => return Ok(None),
        Err(FrameError::RecordTooLong { limit }) => {
            return Err(ProtocolViolation::RecordTooLong { limit }.into());
        }
        Err(FrameError::Io(e)) => return Err(ConnectionError::ConnectionLost(e)),
    };

    match Message::decode(&record) {
        Ok(Message::Identify(identify)) => {
            let name = identify.component.trim();
            if name.is_empty() {
                return Err(ProtocolViolation::EmptyName.into());
            }
            Ok(Some(ClientName::from(name)))
        }
        Ok(other) => Err(ProtocolViolation::NotIdentified(other.kind()).into()),
        Err(e) => Err(ProtocolViolation::MalformedHandshake(e).into()),
    }
}

/// Decode a record and queue it for the router. Returns `false` once the router is gone.
async fn forward(sender: &ClientName, record: Bytes, inbound: &mpsc::Sender<Inbound>) -> bool {
    let message = match Message::decode(&record) {
        Ok(Message::Identify(_)) => {
            warn!(client = %sender, "Client identified twice, ignoring");
            return true;
        }
        Ok(message) => message,
        Err(e) => {
            warn!(client = %sender, error = %e, record = %excerpt(&record), "Malformed message");
            return true;
        }
    };

    inbound
        .send(Inbound {
            sender: sender.clone(),
            record,
            message,
        })
        .await
        .is_ok()
}

/// Write queued records until every sender is dropped, then close the write side.
async fn write_loop(
    name: ClientName,
    mut writer: RecordWriter<OwnedWriteHalf>,
    mut outbound: mpsc::Receiver<Bytes>,
) {
    while let Some(record) = outbound.recv().await {
        if let Err(e) = writer.write_record(&record).await {
            debug!(client = %name, error = %e, "Write failed, closing outbound channel");
            outbound.close();
            break;
        }
    }

    let _ = writer.shutdown().await;
}
