//! REST API over HTTP against the in-memory chain.

mod common;

use common::{http, spawn, spawn_with};
use explorer_gateway::Transport;
use explorer_types::fixtures::*;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn get_json(url: &str) -> (StatusCode, Value) {
    let res = http().get(url).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn test_v2_transaction() {
    let gw = spawn().await;
    let (status, body) = get_json(&gw.url(&format!("/api/v2/tx/{}", TXID_2))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["txid"], TXID_2);
    assert_eq!(body["value"], "9000");
    assert_eq!(body["valueIn"], "9876");
    assert_eq!(body["fees"], "876");
    assert_eq!(body["blockHeight"], 225_494);
    assert_eq!(body["blockTime"], 1_521_595_678);
    assert_eq!(body["blockHash"], BLOCK_HASH_2);
    assert_eq!(body["confirmations"], 1);
    assert_eq!(body["vin"][0]["addresses"], json!([ADDR_1]));
    assert_eq!(body["vin"][0]["isAddress"], true);
    assert_eq!(body["vout"][0]["addresses"], json!([ADDR_1]));
    assert_eq!(body["vout"][0]["value"], "9000");

    let raw = http()
        .get(gw.url(&format!("/api/v2/tx/{}", TXID_2)))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(raw.contains(r#""addresses":["2NEVv9LJmAnY99W1pFoc5UJjVdypBqdnvu1"],"isAddress":true"#));
}

#[tokio::test]
async fn test_v1_transaction() {
    let gw = spawn().await;
    let (status, body) = get_json(&gw.url(&format!("/api/v1/tx/{}", TXID_2))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valueOut"], "0.00009");
    assert_eq!(body["valueIn"], "0.00009876");
    assert_eq!(body["fees"], "0.00000876");
    assert_eq!(body["blockheight"], 225_494);
    assert_eq!(body["blocktime"], 1_521_595_678);
    assert_eq!(body["vout"][0]["scriptPubKey"]["addresses"], json!([ADDR_1]));
    assert!(body.get("blockHeight").is_none());
}

#[tokio::test]
async fn test_unversioned_api_is_v2() {
    let gw = spawn().await;
    let (_, plain) = get_json(&gw.url(&format!("/api/tx/{}", TXID_2))).await;
    let (_, v2) = get_json(&gw.url(&format!("/api/v2/tx/{}", TXID_2))).await;
    assert_eq!(plain, v2);

    let (status, info) = get_json(&gw.url("/api")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["blockbook"]["coin"], "Testnet");
    assert_eq!(info["backend"]["chain"], "test");
}

#[tokio::test]
async fn test_account_chain_has_no_v1() {
    let gw = spawn_with(FakeChain::account(), |_| {}).await;
    let res = http()
        .get(gw.url(&format!("/api/v1/tx/{}", TXID_2)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let (status, _) = get_json(&gw.url(&format!("/api/v2/tx/{}", TXID_2))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_error_mapping() {
    let gw = spawn().await;

    let (status, body) = get_json(&gw.url("/api/v2/tx/")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Missing txid" }));

    let (status, body) = get_json(&gw.url("/api/v2/tx/deadbeef")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Transaction 'deadbeef' not found");

    let (status, body) = get_json(&gw.url(&format!("/api/v2/tx/{}", PANIC_TXID))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal server error" }));
    assert_eq!(gw.metrics.requests(Transport::Api, "api-tx", "panic"), 1);
    assert_eq!(gw.metrics.pending(Transport::Api, "api-tx"), 0);

    // the gateway keeps serving after a panic
    let (status, _) = get_json(&gw.url(&format!("/api/v2/tx/{}", TXID_1))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_debug_mode_exposes_panic() {
    let gw = spawn_with(FakeChain::utxo(), |c| c.debug = true).await;
    let (status, body) = get_json(&gw.url(&format!("/api/v2/tx/{}", PANIC_TXID))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Internal server error: recovered from panic"));
    assert!(message.contains("fake chain asked to panic"));
}

#[tokio::test]
async fn test_address_and_utxo() {
    let gw = spawn().await;
    let (status, body) = get_json(&gw.url(&format!("/api/v2/address/{}", ADDR_1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], ADDR_1);
    assert_eq!(body["txs"], 2);
    assert_eq!(body["txids"].as_array().unwrap().len(), 2);

    let (status, body) = get_json(&gw.url(&format!("/api/v2/utxo/{}", ADDR_2))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["txid"], TXID_1);
    assert_eq!(body[0]["value"], "1234");

    let (status, body) = get_json(&gw.url(&format!("/api/v1/utxo/{}", ADDR_2))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["amount"], "0.00001234");
    assert_eq!(body[0]["satoshis"], "1234");

    let (status, body) = get_json(&gw.url(&format!("/api/v2/utxo/{}", XPUB))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.as_array().unwrap().is_empty());

    let (status, body) =
        get_json(&gw.url(&format!("/api/v2/utxo/{}?confirmed=maybe", ADDR_2))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Parameter 'confirmed' cannot be converted to boolean");
}

#[tokio::test]
async fn test_blocks() {
    let gw = spawn().await;
    let (_, body) = get_json(&gw.url(&format!("/api/v2/block-index/{}", BLOCK_HEIGHT_1))).await;
    assert_eq!(body, json!({ "blockHash": BLOCK_HASH_1 }));
    let (_, body) = get_json(&gw.url("/api/v2/block-index/")).await;
    assert_eq!(body, json!({ "blockHash": BLOCK_HASH_2 }));

    let (status, body) = get_json(&gw.url(&format!("/api/v2/block/{}", BLOCK_HEIGHT_2))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hash"], BLOCK_HASH_2);
    assert_eq!(body["txs"][0]["txid"], TXID_2);

    let (status, body) = get_json(&gw.url("/api/v2/block/")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing block hash or height");
}

#[tokio::test]
async fn test_send_transaction() {
    let gw = spawn().await;
    let res = http()
        .post(gw.url("/api/v2/sendtx/"))
        .body("0100000001")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "result": SENT_TXID }));
    assert_eq!(gw.chain.sent_transactions(), vec!["0100000001".to_string()]);

    let (status, body) = get_json(&gw.url("/api/v2/sendtx/zz")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "-22: TX decode failed");

    let res = http().post(gw.url("/api/v2/sendtx/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await.unwrap()["error"], "Missing tx blob");
}

#[tokio::test]
async fn test_estimate_fee() {
    let gw = spawn().await;
    let (_, body) = get_json(&gw.url("/api/v2/estimatefee/2")).await;
    assert_eq!(body, json!({ "result": "0.00002" }));
    let (status, body) = get_json(&gw.url("/api/v2/estimatefee/two")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Parameter 'number of blocks' is not a number");
}

#[tokio::test]
async fn test_fiat_tickers() {
    let gw = spawn().await;
    let (status, body) = get_json(&gw.url("/api/v2/tickers?currency=usd")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ts"], BLOCK_TIME_2);
    assert_eq!(body["rates"]["usd"].as_f64(), Some(7914.5));
    assert!(body["rates"].get("eur").is_none());

    let (status, body) = get_json(&gw.url("/api/v2/tickers?timestamp=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Parameter 'timestamp' is not a valid Unix timestamp.");

    let (status, body) = get_json(&gw.url("/api/v2/multi-tickers")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Parameter 'timestamp' is missing.");

    let (status, body) = get_json(&gw.url("/api/v2/multi-tickers?timestamp=1,2&currency=eur")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_balance_history_parameters() {
    let gw = spawn().await;
    let (status, body) = get_json(&gw.url(&format!("/api/v2/balancehistory/{}?from=abc", ADDR_1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Parameter 'from' is not a number");

    let (status, body) = get_json(&gw.url(&format!("/api/v2/balancehistory/{}", ADDR_1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_views_are_counted() {
    let gw = spawn().await;
    get_json(&gw.url(&format!("/api/v2/tx/{}", TXID_1))).await;
    get_json(&gw.url(&format!("/api/v1/tx/{}", TXID_1))).await;
    assert_eq!(gw.metrics.views("api-tx"), 2);
    assert_eq!(gw.metrics.requests(Transport::Api, "api-tx", "ok"), 2);
}
