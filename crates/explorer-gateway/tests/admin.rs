//! Internal endpoint: health and Prometheus metrics.

mod common;

use common::{connect, http, next_text, spawn};
use explorer_types::fixtures::*;
use futures::SinkExt;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn test_health() {
    let gw = spawn().await;
    let res = http().get(gw.admin_url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], json!({"websocket": 0, "socketio": 0}));
    assert_eq!(body["mempoolSize"], 0);
    assert_eq!(body["lastTickerTime"], BLOCK_TIME_2);
}

#[tokio::test]
async fn test_health_counts_clients() {
    let gw = spawn().await;
    let mut ws = connect(&gw.ws_url("/websocket")).await;
    ws.send(Message::Text(r#"{"id":"1","method":"subscribeNewBlock"}"#.to_string().into()))
        .await
        .unwrap();
    next_text(&mut ws).await;

    let body: Value = http()
        .get(gw.admin_url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["connections"]["websocket"], 1);
    assert_eq!(body["subscriptions"]["newBlock"], 1);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let gw = spawn().await;
    http()
        .get(gw.url(&format!("/api/v2/tx/{}", TXID_2)))
        .send()
        .await
        .unwrap();

    let res = http().get(gw.admin_url("/metrics")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let text = res.text().await.unwrap();
    assert!(text.contains("explorer_gateway_requests_total"));
    assert!(text.contains(r#"method="api-tx""#));
}

#[tokio::test]
async fn test_admin_routes_are_not_public() {
    let gw = spawn().await;
    let res = http().get(gw.url("/metrics")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
