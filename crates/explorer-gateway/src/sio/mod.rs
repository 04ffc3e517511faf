//! Socket.IO RPC on `/socket.io/`.
//!
//! Only the WebSocket transport is served; Engine.IO 3 and 4 framing are
//! both understood. Clients call methods through the `message` event with
//! an acknowledgement and join broadcast rooms through `subscribe`.

mod codec;
mod methods;

pub use codec::{decode, EngineVersion, Inbound};
pub use methods::{handle_message, handle_subscribe, MessageRequest, METHODS};

use crate::connection::{next_outgoing, Connection, Outgoing};
use crate::dispatch::json_response;
use crate::domain::{error_data, Transport};
use crate::state::SharedState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handshake endpoint. Anything but a WebSocket upgrade is refused.
pub async fn sio_endpoint(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
    remote: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    if query.get("transport").map(String::as_str) != Some("websocket") {
        return refuse(0, "Transport unknown");
    }
    let Some(version) = EngineVersion::from_param(query.get("EIO").map(String::as_str)) else {
        return refuse(5, "Unsupported protocol version");
    };
    let Some(ws) = ws else {
        return refuse(3, "Bad request");
    };
    let max = state.config.websocket.max_message_size;
    ws.max_message_size(max).max_frame_size(max).on_upgrade(move |socket| {
        serve_session(state, socket, version, remote.map(|c| c.0), headers)
    })
}

fn refuse(code: u8, message: &str) -> Response {
    json_response(
        StatusCode::BAD_REQUEST,
        &json!({ "code": code, "message": message }),
    )
}

/// Text of one outbox frame on this transport.
fn encode(frame: Outgoing) -> Option<String> {
    match frame {
        Outgoing::Event { name, data } => Some(codec::event_packet(&name, &data)),
        Outgoing::Ack { id, data } => Some(codec::ack_packet(id, &data)),
        Outgoing::Packet(p) => Some(p),
        Outgoing::Response(_) | Outgoing::Pong => None,
    }
}

async fn serve_session(
    state: SharedState,
    socket: WebSocket,
    version: EngineVersion,
    remote: Option<SocketAddr>,
    headers: HeaderMap,
) {
    let id = state.registry.next_connection_id();
    let sid = Uuid::now_v7().to_string();
    let (conn, mut rx) = Connection::new(
        id,
        Transport::SocketIo,
        remote,
        headers,
        state.config.websocket.outbox_capacity,
    );
    state.registry.register(&conn);
    info!(connection_id = id, sid = %sid, remote = ?remote, eio = ?version, "Socket.IO client connected");

    let cfg = &state.config.socketio;
    let ping_interval = cfg.ping_interval;
    let silence_limit = cfg.ping_interval + cfg.ping_timeout;
    conn.data_out(Outgoing::Packet(codec::open_packet(
        &sid,
        ping_interval.as_millis() as u64,
        cfg.ping_timeout.as_millis() as u64,
    )));
    if version == EngineVersion::V3 {
        conn.data_out(Outgoing::Packet(codec::connect_packet(version, &sid)));
    }

    let (mut sink, mut stream) = socket.split();
    let ping_deadline = state.config.websocket.ping_deadline;
    let writer_conn = Arc::clone(&conn);
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = next_outgoing(&writer_conn, &mut rx).await {
            let result = match frame {
                Outgoing::Pong => {
                    match tokio::time::timeout(ping_deadline, sink.send(Message::Pong(Vec::new()))).await {
                        Ok(r) => r,
                        Err(_) => break,
                    }
                }
                other => match encode(other) {
                    Some(text) => sink.send(Message::Text(text)).await,
                    None => continue,
                },
            };
            if let Err(e) = result {
                warn!(connection_id = writer_conn.id(), error = %e, "Socket.IO write failed");
                break;
            }
        }
        writer_conn.close_out();
        let _ = sink.close().await;
    });

    let mut heartbeat = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    let mut last_seen = Instant::now();

    let writer_finished = loop {
        tokio::select! {
            msg = stream.next() => {
                last_seen = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !on_text(&state, &conn, version, &sid, &text) {
                            break false;
                        }
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
                        debug!(connection_id = id, error = %e, "Socket.IO read failed");
                        break false;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if last_seen.elapsed() > silence_limit {
                    info!(connection_id = id, "Socket.IO ping timeout");
                    break false;
                }
                if version == EngineVersion::V4 {
                    conn.data_out(Outgoing::Packet(codec::PING.to_string()));
                }
            }
            _ = &mut writer => break true,
        }
    };

    conn.close_out();
    if !writer_finished {
        if let Err(e) = writer.await {
            warn!(connection_id = id, error = %e, "Socket.IO writer task failed");
        }
    }
    state.registry.unregister(&conn);
    info!(connection_id = id, sid = %sid, "Socket.IO client disconnected");
}

/// Handle one text frame; false closes the session.
fn on_text(state: &SharedState, conn: &Arc<Connection>, version: EngineVersion, sid: &str, text: &str) -> bool {
    let packet = match decode(text) {
        Ok(p) => p,
        Err(e) => {
            warn!(connection_id = conn.id(), error = %e, "Undecodable Socket.IO frame ignored");
            return true;
        }
    };
    match packet {
        Inbound::Ping(probe) => {
            conn.data_out(Outgoing::Packet(codec::pong_packet(&probe)));
        }
        Inbound::Pong | Inbound::Noop => {}
        Inbound::Connect => {
            if version == EngineVersion::V4 {
                conn.data_out(Outgoing::Packet(codec::connect_packet(version, sid)));
            }
        }
        Inbound::Close | Inbound::Disconnect => return false,
        Inbound::Event { ack, name, args } => match name.as_str() {
            "message" => {
                let state = Arc::clone(state);
                let conn = Arc::clone(conn);
                tokio::spawn(async move { on_message(state, conn, ack, args).await });
            }
            "subscribe" => {
                handle_subscribe(state, conn, &args);
                if let Some(id) = ack {
                    conn.data_out(Outgoing::Ack { id, data: Value::Null });
                }
            }
            other => {
                debug!(connection_id = conn.id(), event = %other, "Unhandled Socket.IO event");
            }
        },
    }
    true
}

async fn on_message(state: SharedState, conn: Arc<Connection>, ack: Option<u64>, args: Vec<Value>) {
    let data = match args.into_iter().next().map(serde_json::from_value::<MessageRequest>) {
        Some(Ok(req)) => {
            debug!(connection_id = conn.id(), method = %req.method, "Socket.IO request");
            handle_message(&state, &req).await
        }
        Some(Err(e)) => error_data(&e.to_string()),
        None => error_data("missing message payload"),
    };
    match ack {
        Some(id) => {
            conn.data_out(Outgoing::Ack { id, data });
        }
        None => debug!(connection_id = conn.id(), "Message without acknowledgement, result dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_per_frame_kind() {
        assert_eq!(
            encode(Outgoing::Event {
                name: "bitcoind/hashblock".into(),
                data: json!("00ff"),
            }),
            Some(r#"42["bitcoind/hashblock","00ff"]"#.to_string())
        );
        assert_eq!(
            encode(Outgoing::Ack {
                id: 3,
                data: Value::Null,
            }),
            Some("433[null]".to_string())
        );
        assert_eq!(encode(Outgoing::Packet("3".into())), Some("3".to_string()));
        assert_eq!(encode(Outgoing::Pong), None);
    }
}
