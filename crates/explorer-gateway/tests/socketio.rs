//! Socket.IO on `/socket.io/`.

mod common;

use common::{connect, http, next_text, spawn, WsStream};
use explorer_gateway::Transport;
use explorer_types::fixtures::*;
use futures::SinkExt;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

async fn send(ws: &mut WsStream, packet: &str) {
    ws.send(Message::Text(packet.to_string().into())).await.unwrap();
}

/// Connect with Engine.IO 3 and consume the handshake.
async fn open(url: &str) -> WsStream {
    let mut ws = connect(&format!("{}/socket.io/?EIO=3&transport=websocket", url)).await;
    let open = next_text(&mut ws).await;
    assert!(open.starts_with("0{"), "open packet: {}", open);
    let handshake: Value = serde_json::from_str(&open[1..]).unwrap();
    assert!(handshake["sid"].is_string());
    assert_eq!(handshake["upgrades"], json!([]));
    assert_eq!(next_text(&mut ws).await, "40");
    ws
}

/// Payload of an ack packet `43<id>[data]`.
fn ack_data(packet: &str, id: u64) -> Value {
    let prefix = format!("43{}", id);
    assert!(packet.starts_with(&prefix), "ack packet: {}", packet);
    let mut args: Vec<Value> = serde_json::from_str(&packet[prefix.len()..]).unwrap();
    args.remove(0)
}

#[tokio::test]
async fn test_subscribe_new_block() {
    let gw = spawn().await;
    let mut ws = open(&gw.ws_url("")).await;

    send(&mut ws, r#"421["subscribe","bitcoind/hashblock"]"#).await;
    assert_eq!(next_text(&mut ws).await, "431[null]");
    assert_eq!(gw.metrics.sio_subscribes("bitcoind/hashblock", true), 1);

    gw.broker.on_new_block(BLOCK_HASH_2, BLOCK_HEIGHT_2);
    assert_eq!(
        next_text(&mut ws).await,
        format!(r#"42["bitcoind/hashblock","{}"]"#, BLOCK_HASH_2)
    );
}

#[tokio::test]
async fn test_subscribe_addresses() {
    let gw = spawn().await;
    let mut ws = open(&gw.ws_url("")).await;

    let packet = format!(r#"422["subscribe","bitcoind/addresstxid",["{}"]]"#, ADDR_3);
    send(&mut ws, &packet).await;
    assert_eq!(next_text(&mut ws).await, "432[null]");

    let tx = gw.chain.mempool_tx_paying("bb01", ADDR_3, 4000);
    gw.broker.on_new_tx(&tx);
    let event = next_text(&mut ws).await;
    let args: Vec<Value> = serde_json::from_str(event.strip_prefix("42").unwrap()).unwrap();
    assert_eq!(
        args,
        vec![json!("bitcoind/addresstxid"), json!({"address": ADDR_3, "txid": "bb01"})]
    );
}

#[tokio::test]
async fn test_message_methods() {
    let gw = spawn().await;
    let mut ws = open(&gw.ws_url("")).await;

    send(&mut ws, r#"423["message",{"method":"getInfo","params":[]}]"#).await;
    let data = ack_data(&next_text(&mut ws).await, 3);
    assert_eq!(data["result"]["blocks"], BLOCK_HEIGHT_2);
    assert_eq!(data["result"]["coin_name"], "Testnet");

    let packet = format!(
        r#"424["message",{{"method":"getDetailedTransaction","params":["{}"]}}]"#,
        TXID_2
    );
    send(&mut ws, &packet).await;
    let data = ack_data(&next_text(&mut ws).await, 4);
    assert_eq!(data["result"]["hash"], TXID_2);

    send(&mut ws, r#"425["message",{"method":"getNothing","params":[]}]"#).await;
    let data = ack_data(&next_text(&mut ws).await, 5);
    assert_eq!(data, json!({"error": {"message": "unknown method"}}));
    assert_eq!(gw.metrics.requests(Transport::SocketIo, "unknown", "error"), 1);
}

#[tokio::test]
async fn test_ping_pong() {
    let gw = spawn().await;
    let mut ws = open(&gw.ws_url("")).await;
    send(&mut ws, "2").await;
    assert_eq!(next_text(&mut ws).await, "3");
    send(&mut ws, "2probe").await;
    assert_eq!(next_text(&mut ws).await, "3probe");
}

#[tokio::test]
async fn test_polling_is_refused() {
    let gw = spawn().await;
    let res = http()
        .get(gw.url("/socket.io/?EIO=3&transport=polling"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"code": 0, "message": "Transport unknown"}));
}
