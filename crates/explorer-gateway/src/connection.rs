//! A live WebSocket or Socket.IO session and its bounded outbox.
//!
//! The outbox is a bounded mpsc channel. `data_out` never waits: when the
//! queue is within one slot of full the connection is closed instead, so a
//! slow client cannot hold up the broadcaster. `close_out` is idempotent
//! and only its first call has an effect.

use crate::domain::{Transport, WsResponse};
use axum::http::HeaderMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A frame waiting in an outbox. Encoding happens in the writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// WebSocket RPC response or subscription push
    Response(WsResponse),
    /// Socket.IO event `42["name",data]`
    Event { name: String, data: Value },
    /// Socket.IO acknowledgement `43<id>[data]`
    Ack { id: u64, data: Value },
    /// Engine.IO packet written verbatim
    Packet(String),
    /// WebSocket-level pong with an empty payload
    Pong,
}

/// Shared between the reader, the writer and the broadcaster.
pub struct Connection {
    id: u64,
    transport: Transport,
    remote: Option<SocketAddr>,
    headers: HeaderMap,
    /// `None` once closed.
    out: Mutex<Option<mpsc::Sender<Outgoing>>>,
}

impl Connection {
    /// Create a connection whose outbox holds `capacity` frames.
    pub fn new(
        id: u64,
        transport: Transport,
        remote: Option<SocketAddr>,
        headers: HeaderMap,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Outgoing>) {
        let (tx, rx) = mpsc::channel(capacity.max(2));
        let conn = Arc::new(Self {
            id,
            transport,
            remote,
            headers,
            out: Mutex::new(Some(tx)),
        });
        (conn, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Request headers captured at upgrade time
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_alive(&self) -> bool {
        self.out.lock().is_some()
    }

    /// Enqueue without waiting. Returns false when the frame was not
    /// queued, either because the connection is closed or because this call
    /// closed it for overflow.
    pub fn data_out(&self, frame: Outgoing) -> bool {
        let mut out = self.out.lock();
        let Some(tx) = out.as_ref() else {
            return false;
        };
        // one slot stays reserved
        if tx.capacity() <= 1 {
            warn!(
                connection_id = self.id,
                transport = %self.transport,
                "Outbox overflow, closing connection"
            );
            *out = None;
            return false;
        }
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(connection_id = self.id, error = %e, "Outbox send failed, closing connection");
                *out = None;
                false
            }
        }
    }

    /// Mark the connection dead and close the outbox. Returns true for the
    /// call that actually closed it.
    pub fn close_out(&self) -> bool {
        let closed = self.out.lock().take().is_some();
        if closed {
            debug!(connection_id = self.id, transport = %self.transport, "Outbox closed");
        }
        closed
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("remote", &self.remote)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Next frame the writer should send, or `None` when it should stop.
/// Frames still buffered after `close_out` are dropped here.
pub async fn next_outgoing(conn: &Connection, rx: &mut mpsc::Receiver<Outgoing>) -> Option<Outgoing> {
    let frame = rx.recv().await?;
    if conn.is_alive() {
        Some(frame)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: usize) -> Outgoing {
        Outgoing::Response(WsResponse {
            id: n.to_string(),
            data: Value::Null,
        })
    }

    #[test]
    fn test_close_out_is_idempotent() {
        let (conn, _rx) = Connection::new(1, Transport::WebSocket, None, HeaderMap::new(), 256);
        assert!(conn.is_alive());
        assert!(conn.close_out());
        assert!(!conn.close_out());
        assert!(!conn.is_alive());
        assert!(!conn.data_out(frame(0)));
    }

    #[test]
    fn test_overflow_closes_with_one_slot_reserved() {
        let capacity = 256;
        let (conn, _rx) = Connection::new(2, Transport::WebSocket, None, HeaderMap::new(), capacity);
        for n in 0..capacity - 1 {
            assert!(conn.data_out(frame(n)), "frame {} should fit", n);
        }
        // the last free slot is never used
        assert!(!conn.data_out(frame(capacity)));
        assert!(!conn.is_alive());
    }

    #[tokio::test]
    async fn test_frames_are_fifo_and_dropped_after_close() {
        let (conn, mut rx) = Connection::new(3, Transport::WebSocket, None, HeaderMap::new(), 256);
        assert!(conn.data_out(frame(1)));
        assert!(conn.data_out(frame(2)));
        assert_eq!(next_outgoing(&conn, &mut rx).await, Some(frame(1)));

        assert!(conn.data_out(frame(3)));
        conn.close_out();
        // frames 2 and 3 were still buffered
        assert_eq!(next_outgoing(&conn, &mut rx).await, None);
    }
}
