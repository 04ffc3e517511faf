//! Socket.IO `message` methods and `subscribe` handling.
//!
//! Params arrive as a positional JSON array. Results are wrapped as
//! `{"result": ...}`; errors take the shared envelope.

use crate::broker::{SIO_ADDRESSTXID, SIO_HASHBLOCK};
use crate::connection::Connection;
use crate::domain::Transport;
use crate::state::SharedState;
use explorer_types::{ApiError, ApiResult, Tx};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub const METHODS: &[&str] = &[
    "getAddressTxids",
    "getAddressHistory",
    "getBlockHeader",
    "estimateSmartFee",
    "estimateFee",
    "getInfo",
    "getDetailedTransaction",
    "sendTransaction",
    "getMempoolEntry",
];

/// Payload of a `message` event.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageRequest {
    pub method: String,
    pub params: Value,
}

/// Answer one `message` event.
pub async fn handle_message(state: &SharedState, req: &MessageRequest) -> Value {
    let method = if METHODS.contains(&req.method.as_str()) {
        req.method.as_str()
    } else {
        "unknown"
    };
    state
        .dispatcher
        .envelope(Transport::SocketIo, method, call(state, &req.method, &req.params))
        .await
}

async fn call(state: &SharedState, method: &str, params: &Value) -> ApiResult<Value> {
    match method {
        "getAddressTxids" => {
            let (addresses, opts) = address_request(params)?;
            result(get_address_txids(state, &addresses, &opts).await?)
        }
        "getAddressHistory" => {
            let (addresses, opts) = address_request(params)?;
            result(get_address_history(state, &addresses, &opts).await?)
        }
        "getBlockHeader" => {
            let [p] = positional::<1>(params)?;
            get_block_header(state, p).await
        }
        "estimateSmartFee" => {
            let [blocks, conservative] = positional::<2>(params)?;
            let blocks = blocks
                .as_f64()
                .ok_or_else(|| ApiError::public("Invalid parameter blocks"))?;
            let conservative = conservative
                .as_bool()
                .ok_or_else(|| ApiError::public("Invalid parameter conservative"))?;
            let fee = state
                .backends
                .chain
                .estimate_smart_fee(blocks as u32, conservative)
                .await?;
            result(decimal_f64(state, &fee)?)
        }
        "estimateFee" => {
            let [blocks] = positional::<1>(params)?;
            let blocks = blocks
                .as_f64()
                .ok_or_else(|| ApiError::public("Invalid parameter nblocks"))?;
            let fee = state.backends.chain.estimate_fee(blocks as u32).await?;
            result(decimal_f64(state, &fee)?)
        }
        "getInfo" => get_info(state).await,
        "getDetailedTransaction" => {
            let [txid] = positional::<1>(params)?;
            let txid: String = serde_json::from_value(txid)?;
            let tx = state.backends.accounts.get_transaction(&txid, false, false).await?;
            result(ResTx::from(&tx))
        }
        "sendTransaction" => {
            let hex = string_param(params)?;
            let txid = state
                .backends
                .chain
                .send_raw_transaction(&hex)
                .await
                .map_err(|e| ApiError::public(e.message))?;
            result(txid)
        }
        "getMempoolEntry" => {
            let txid = string_param(params)?;
            result(state.backends.chain.get_mempool_entry(&txid).await?)
        }
        _ => Err(ApiError::public("unknown method")),
    }
}

fn result<T: Serialize>(v: T) -> ApiResult<Value> {
    let v = serde_json::to_value(v).map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(json!({ "result": v }))
}

/// Exactly `N` positional params.
fn positional<const N: usize>(params: &Value) -> ApiResult<[Value; N]> {
    let items: Vec<Value> = serde_json::from_value(params.clone())?;
    <[Value; N]>::try_from(items).map_err(|_| ApiError::public("incorrect number of parameters"))
}

fn string_param(params: &Value) -> ApiResult<String> {
    let [p] = positional::<1>(params)?;
    match p {
        Value::String(s) => Ok(s),
        _ => Err(ApiError::public("incorrect parameter")),
    }
}

fn decimal_f64(state: &SharedState, amount: &explorer_types::Amount) -> ApiResult<f64> {
    let s = state.backends.codec.amount_to_decimal_string(amount);
    s.parse::<f64>()
        .map_err(|e| ApiError::internal(format!("{}: {}", s, e)))
}

// =============================================================================
// ADDRESS QUERIES
// =============================================================================

/// Options of `getAddressTxids` and `getAddressHistory`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AddressOpts {
    /// Upper block height
    start: u32,
    /// Lower block height
    end: u32,
    query_mempool_only: bool,
    from: usize,
    to: usize,
}

fn address_request(params: &Value) -> ApiResult<(Vec<String>, AddressOpts)> {
    let [addresses, opts] = positional::<2>(params)?;
    Ok((serde_json::from_value(addresses)?, serde_json::from_value(opts)?))
}

async fn get_address_txids(
    state: &SharedState,
    addresses: &[String],
    opts: &AddressOpts,
) -> ApiResult<Vec<String>> {
    let mut txids = Vec::new();
    for address in addresses {
        let found = if opts.query_mempool_only {
            state.backends.mempool.get_transactions(address).await?
        } else {
            state
                .backends
                .accounts
                .get_address_txids(address, opts.end, opts.start)
                .await?
        };
        txids.extend(found);
    }
    Ok(unique(txids))
}

/// First-seen order is kept.
fn unique(txids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(txids.len());
    txids.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct HistoryIndexes {
    input_indexes: Vec<u32>,
    output_indexes: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct HistoryItem {
    addresses: BTreeMap<String, HistoryIndexes>,
    satoshis: i64,
    confirmations: u32,
    tx: ResTx,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddressHistory {
    total_count: usize,
    items: Vec<HistoryItem>,
}

async fn get_address_history(
    state: &SharedState,
    addresses: &[String],
    opts: &AddressOpts,
) -> ApiResult<AddressHistory> {
    let txids = get_address_txids(state, addresses, opts).await?;
    let to = txids.len().min(opts.to);
    let mut items = Vec::new();
    for txid in txids.iter().take(to).skip(opts.from) {
        let tx = state.backends.accounts.get_transaction(txid, false, false).await?;
        items.push(history_item(&tx, addresses));
    }
    Ok(AddressHistory {
        total_count: txids.len(),
        items,
    })
}

fn first_match<'a>(candidates: &'a [String], wanted: &[String]) -> Option<&'a String> {
    candidates.iter().find(|a| wanted.contains(a))
}

fn history_item(tx: &Tx, wanted: &[String]) -> HistoryItem {
    let mut addresses: BTreeMap<String, HistoryIndexes> = BTreeMap::new();
    let mut satoshis: i64 = 0;
    for vin in &tx.vin {
        if let Some(a) = first_match(&vin.addresses, wanted) {
            addresses.entry(a.clone()).or_default().input_indexes.push(vin.n);
            if let Some(v) = vin.value {
                satoshis = satoshis.saturating_sub(v.as_i64_saturating());
            }
        }
    }
    for vout in &tx.vout {
        if let Some(a) = first_match(&vout.addresses, wanted) {
            addresses.entry(a.clone()).or_default().output_indexes.push(vout.n);
            if let Some(v) = vout.value {
                satoshis = satoshis.saturating_add(v.as_i64_saturating());
            }
        }
    }
    HistoryItem {
        addresses,
        satoshis,
        confirmations: tx.confirmations,
        tx: ResTx::from(tx),
    }
}

// =============================================================================
// LEGACY TRANSACTION SHAPE
// =============================================================================

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ResInput {
    txid: String,
    output_index: u32,
    script: String,
    sequence: i64,
    address: Option<String>,
    satoshis: i64,
}

#[derive(Debug, Serialize, PartialEq)]
struct ResOutput {
    satoshis: i64,
    script: String,
    address: Option<String>,
}

/// Transaction as the Socket.IO API has always shaped it.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ResTx {
    hex: String,
    /// `-1` while unconfirmed
    height: i64,
    #[serde(skip_serializing_if = "is_zero")]
    block_timestamp: i64,
    version: i64,
    hash: String,
    #[serde(skip_serializing_if = "is_zero")]
    locktime: i64,
    inputs: Vec<ResInput>,
    #[serde(skip_serializing_if = "is_zero")]
    input_satoshis: i64,
    outputs: Vec<ResOutput>,
    #[serde(skip_serializing_if = "is_zero")]
    output_satoshis: i64,
    #[serde(skip_serializing_if = "is_zero")]
    fee_satoshis: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl From<&Tx> for ResTx {
    fn from(tx: &Tx) -> Self {
        let sat = |a: Option<explorer_types::Amount>| a.map(|v| v.as_i64_saturating()).unwrap_or(0);
        let (height, block_timestamp) = if tx.confirmations == 0 {
            (-1, 0)
        } else {
            (tx.block_height, tx.block_time)
        };
        ResTx {
            hex: tx.hex.clone(),
            height,
            block_timestamp,
            version: tx.version,
            hash: tx.txid.clone(),
            locktime: tx.lock_time as i64,
            inputs: tx
                .vin
                .iter()
                .map(|v| ResInput {
                    txid: v.txid.clone(),
                    output_index: v.vout,
                    script: v.hex.clone(),
                    sequence: v.sequence,
                    address: v.addresses.first().cloned(),
                    satoshis: sat(v.value),
                })
                .collect(),
            input_satoshis: sat(tx.value_in),
            outputs: tx
                .vout
                .iter()
                .map(|v| ResOutput {
                    satoshis: sat(v.value),
                    script: v.hex.clone(),
                    address: v.addresses.first().cloned(),
                })
                .collect(),
            output_satoshis: tx.value.as_i64_saturating(),
            fee_satoshis: sat(tx.fees),
        }
    }
}

// =============================================================================
// NODE
// =============================================================================

async fn get_block_header(state: &SharedState, p: Value) -> ApiResult<Value> {
    let chain = &state.backends.chain;
    match p {
        Value::Number(n) => {
            let height = n
                .as_f64()
                .ok_or_else(|| ApiError::public("incorrect parameter"))?;
            let hash = chain.get_block_hash(height as u32).await?;
            Ok(json!({ "result": { "hash": hash } }))
        }
        Value::String(hash) => {
            let h = chain.get_block_header(&hash).await?;
            Ok(json!({
                "result": {
                    "hash": h.hash,
                    "height": h.height,
                    "confirmations": h.confirmations,
                    "nextHash": h.next,
                }
            }))
        }
        _ => Err(ApiError::public("incorrect parameter")),
    }
}

async fn get_info(state: &SharedState) -> ApiResult<Value> {
    let info = state.backends.accounts.get_system_info(true).await?;
    Ok(json!({
        "result": {
            "blocks": info.blockbook.best_height,
            "testnet": state.backends.chain.is_testnet(),
            "network": info.backend.chain,
            "subversion": info.backend.subversion,
            "coin_name": info.blockbook.coin,
            "about": info.blockbook.about,
        }
    }))
}

// =============================================================================
// SUBSCRIBE
// =============================================================================

/// Join the rooms named by a `subscribe` event. Invalid requests are
/// logged and otherwise ignored.
pub fn handle_subscribe(state: &SharedState, conn: &Arc<Connection>, args: &[Value]) {
    let metrics = state.dispatcher.metrics();
    let channel = args.first().and_then(Value::as_str).unwrap_or_default();
    match (channel, args.get(1)) {
        (SIO_HASHBLOCK, None) => {
            state.registry.add_new_block(conn, "");
            metrics.record_sio_subscribe(SIO_HASHBLOCK, true);
            debug!(connection_id = conn.id(), "Subscribed to new blocks");
        }
        (SIO_ADDRESSTXID, Some(list)) => match subscribe_descriptors(state, list) {
            Ok(descriptors) => {
                let n = descriptors.len();
                state.registry.add_addresses(conn, "", descriptors);
                metrics.record_sio_subscribe(SIO_ADDRESSTXID, true);
                debug!(connection_id = conn.id(), addresses = n, "Subscribed to addresses");
            }
            Err(e) => {
                metrics.record_sio_subscribe(SIO_ADDRESSTXID, false);
                warn!(connection_id = conn.id(), error = %e.message, "Invalid subscribe request");
            }
        },
        _ => {
            metrics.record_sio_subscribe("unknown", false);
            warn!(connection_id = conn.id(), args = ?args, "Invalid subscribe request");
        }
    }
}

/// All addresses must be valid or none is joined.
fn subscribe_descriptors(state: &SharedState, list: &Value) -> ApiResult<Vec<explorer_types::AddressDescriptor>> {
    let addresses: Vec<String> = serde_json::from_value(list.clone())?;
    addresses
        .iter()
        .map(|a| state.backends.codec.addr_desc_from_address(a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use explorer_types::{Amount, Vin, Vout};

    #[test]
    fn test_positional_count() {
        assert!(positional::<1>(&json!(["a"])).is_ok());
        let err = positional::<2>(&json!(["a"])).unwrap_err();
        assert_eq!(err.message, "incorrect number of parameters");
        assert!(positional::<1>(&json!({"a": 1})).unwrap_err().is_public());
        assert_eq!(
            string_param(&json!([5])).unwrap_err().message,
            "incorrect parameter"
        );
    }

    #[test]
    fn test_unique_keeps_order() {
        let v = vec!["b".to_string(), "a".into(), "b".into(), "c".into(), "a".into()];
        assert_eq!(unique(v), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_history_item_net_satoshis() {
        let tx = Tx {
            txid: "t".into(),
            vin: vec![Vin {
                n: 0,
                addresses: vec!["a1".into()],
                value: Some(Amount::from_u64(9876)),
                ..Default::default()
            }],
            vout: vec![
                Vout {
                    n: 0,
                    addresses: vec!["a1".into()],
                    value: Some(Amount::from_u64(9000)),
                    ..Default::default()
                },
                Vout {
                    n: 1,
                    addresses: vec!["other".into()],
                    value: Some(Amount::from_u64(500)),
                    ..Default::default()
                },
            ],
            confirmations: 3,
            block_height: 10,
            ..Default::default()
        };
        let item = history_item(&tx, &["a1".to_string()]);
        assert_eq!(item.satoshis, -876);
        assert_eq!(item.confirmations, 3);
        assert_eq!(
            item.addresses.get("a1"),
            Some(&HistoryIndexes {
                input_indexes: vec![0],
                output_indexes: vec![0],
            })
        );
        assert!(!item.addresses.contains_key("other"));
    }

    #[test]
    fn test_res_tx_unconfirmed_height() {
        let tx = Tx {
            txid: "t".into(),
            block_height: -1,
            block_time: 1_700_000_000,
            confirmations: 0,
            value: Amount::from_u64(5),
            ..Default::default()
        };
        let v = serde_json::to_value(ResTx::from(&tx)).unwrap();
        assert_eq!(v["height"], -1);
        assert!(v.get("blockTimestamp").is_none());
        assert_eq!(v["outputSatoshis"], 5);
        assert_eq!(v["hash"], "t");
    }
}
