//! Native JSON-over-WebSocket RPC on `/websocket`.
//!
//! Per connection a reader loop and a writer task cooperate through the
//! connection's outbox. Each parsed request runs in its own task, so
//! responses may leave in a different order than requests arrived.

mod methods;

pub use methods::{handle_request, METHODS};

use crate::connection::{next_outgoing, Connection, Outgoing};
use crate::domain::{Transport, WsRequest, WsResponse};
use crate::state::SharedState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upgrade `/websocket`.
pub async fn ws_upgrade(
    State(state): State<SharedState>,
    remote: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let max = state.config.websocket.max_message_size;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| serve_connection(state, socket, remote.map(|c| c.0), headers))
}

async fn serve_connection(state: SharedState, socket: WebSocket, remote: Option<SocketAddr>, headers: HeaderMap) {
    let id = state.registry.next_connection_id();
    let (conn, mut rx) = Connection::new(
        id,
        Transport::WebSocket,
        remote,
        headers,
        state.config.websocket.outbox_capacity,
    );
    state.registry.register(&conn);
    info!(connection_id = id, remote = ?remote, "WebSocket client connected");

    let (mut sink, mut stream) = socket.split();
    let ping_deadline = state.config.websocket.ping_deadline;

    let writer_conn = Arc::clone(&conn);
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = next_outgoing(&writer_conn, &mut rx).await {
            let result = match frame {
                Outgoing::Response(res) => match serde_json::to_string(&res) {
                    Ok(text) => sink.send(Message::Text(text)).await,
                    Err(e) => {
                        warn!(connection_id = writer_conn.id(), error = %e, "Response encode failed");
                        continue;
                    }
                },
                Outgoing::Pong => {
                    match tokio::time::timeout(ping_deadline, sink.send(Message::Pong(Vec::new()))).await {
                        Ok(r) => r,
                        Err(_) => {
                            warn!(connection_id = writer_conn.id(), "Pong write deadline exceeded");
                            break;
                        }
                    }
                }
                other => {
                    debug!(connection_id = writer_conn.id(), frame = ?other, "Frame not valid on this transport");
                    continue;
                }
            };
            if let Err(e) = result {
                warn!(connection_id = writer_conn.id(), error = %e, "WebSocket write failed");
                break;
            }
        }
        writer_conn.close_out();
        let _ = sink.close().await;
    });

    let writer_finished = loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let state = Arc::clone(&state);
                    let conn = Arc::clone(&conn);
                    tokio::spawn(async move { on_request(state, conn, text).await });
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(connection_id = id, "Binary frame, closing connection");
                    break false;
                }
                Some(Ok(Message::Ping(_))) => {
                    conn.data_out(Outgoing::Pong);
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break false,
                Some(Err(e)) => {
                    debug!(connection_id = id, error = %e, "WebSocket read failed");
                    break false;
                }
            },
            _ = &mut writer => break true,
        }
    };

    conn.close_out();
    if !writer_finished {
        if let Err(e) = writer.await {
            warn!(connection_id = id, error = %e, "WebSocket writer task failed");
        }
    }
    state.registry.unregister(&conn);
    info!(connection_id = id, "WebSocket client disconnected");
}

async fn on_request(state: SharedState, conn: Arc<Connection>, text: String) {
    let req: WsRequest = match serde_json::from_str(&text) {
        Ok(r) => r,
        Err(e) => {
            warn!(connection_id = conn.id(), error = %e, "Malformed request dropped");
            return;
        }
    };
    debug!(connection_id = conn.id(), id = %req.id, method = %req.method, "WebSocket request");
    let data = handle_request(&state, &conn, &req).await;
    conn.data_out(Outgoing::Response(WsResponse { id: req.id, data }));
}
