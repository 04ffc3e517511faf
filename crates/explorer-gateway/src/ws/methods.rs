//! WebSocket RPC method table.

use crate::connection::Connection;
use crate::domain::{Transport, WsRequest};
use crate::state::SharedState;
use explorer_types::{
    AccountDetails, AddressFilter, Amount, ApiError, ApiResult, ChainType, TokensToReturn, TxStub,
    VoutFilter,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Every method name the WebSocket transport answers.
pub const METHODS: &[&str] = &[
    "getAccountInfo",
    "getAccountUtxo",
    "getBalanceHistory",
    "getTransaction",
    "getTransactionSpecific",
    "estimateFee",
    "sendTransaction",
    "getInfo",
    "getBlockHash",
    "getBlock",
    "getCurrentFiatRates",
    "getFiatRatesForTimestamps",
    "getFiatRatesTickersList",
    "ping",
    "subscribeNewBlock",
    "unsubscribeNewBlock",
    "subscribeAddresses",
    "unsubscribeAddresses",
    "subscribeFiatRates",
    "unsubscribeFiatRates",
    "subscribeNewTransaction",
    "unsubscribeNewTransaction",
];

const DEFAULT_GROUP_BY: u32 = 3600;
const BLOCK_PAGE_SIZE: u32 = 1_000_000;
const SUBSCRIBE_NEW_TX_DISABLED: &str =
    "subscribeNewTransaction not enabled, use -enablesubnewtx flag to enable.";
const UNSUBSCRIBE_NEW_TX_DISABLED: &str =
    "unsubscribeNewTransaction not enabled, use -enablesubnewtx flag to enable.";

/// Run one request and produce the `data` of its response.
pub async fn handle_request(state: &SharedState, conn: &Arc<Connection>, req: &WsRequest) -> Value {
    let method = if METHODS.contains(&req.method.as_str()) {
        req.method.as_str()
    } else {
        "unknown"
    };
    state
        .dispatcher
        .envelope(
            Transport::WebSocket,
            method,
            call(state, conn, &req.id, &req.method, req.params.clone()),
        )
        .await
}

async fn call(state: &SharedState, conn: &Arc<Connection>, id: &str, method: &str, params: Value) -> ApiResult<Value> {
    match method {
        "getAccountInfo" => to_json(get_account_info(state, parse(params)?).await?),
        "getAccountUtxo" => to_json(get_account_utxo(state, parse(params)?).await?),
        "getBalanceHistory" => to_json(get_balance_history(state, parse(params)?).await?),
        "getTransaction" => {
            let p: TxidParams = parse(params)?;
            to_json(state.backends.accounts.get_transaction(&p.txid, false, false).await?)
        }
        "getTransactionSpecific" => {
            let p: TxidParams = parse(params)?;
            state
                .backends
                .chain
                .get_transaction_specific(&TxStub { txid: p.txid })
                .await
        }
        "estimateFee" => to_json(estimate_fee(state, parse(params)?).await?),
        "sendTransaction" => {
            let p: HexParams = parse(params)?;
            let txid = state
                .backends
                .chain
                .send_raw_transaction(&p.hex)
                .await
                .map_err(|e| ApiError::public(e.message))?;
            Ok(json!({ "result": txid }))
        }
        "getInfo" => get_info(state).await,
        "getBlockHash" => {
            let p: HeightParams = parse(params)?;
            let hash = state.backends.chain.get_block_hash(p.height).await?;
            Ok(json!({ "hash": hash }))
        }
        "getBlock" => {
            let p: BlockParams = parse(params)?;
            let page_size = if p.page_size == 0 {
                BLOCK_PAGE_SIZE
            } else {
                p.page_size
            };
            to_json(state.backends.accounts.get_block(&p.id, p.page, page_size).await?)
        }
        "getCurrentFiatRates" => {
            let p: FiatParams = parse(params)?;
            to_json(
                state
                    .backends
                    .accounts
                    .get_current_fiat_rates(&p.currencies, &p.token)
                    .await?,
            )
        }
        "getFiatRatesForTimestamps" => {
            let p: FiatParams = parse(params)?;
            to_json(
                state
                    .backends
                    .accounts
                    .get_fiat_rates_for_timestamps(&p.timestamps, &p.currencies, &p.token)
                    .await?,
            )
        }
        "getFiatRatesTickersList" => {
            let p: FiatParams = parse(params)?;
            to_json(
                state
                    .backends
                    .accounts
                    .get_fiat_rates_tickers_list(p.timestamp, &p.token)
                    .await?,
            )
        }
        "ping" => Ok(json!({})),
        "subscribeNewBlock" => {
            state.registry.add_new_block(conn, id);
            Ok(subscribed(true))
        }
        "unsubscribeNewBlock" => {
            state.registry.remove_new_block(conn);
            Ok(subscribed(false))
        }
        "subscribeAddresses" => {
            let p: AddressesParams = parse(params)?;
            let descriptors = p
                .addresses
                .iter()
                .map(|a| state.backends.codec.addr_desc_from_address(a))
                .collect::<ApiResult<Vec<_>>>()?;
            state.registry.replace_addresses(conn, id, descriptors);
            Ok(subscribed(true))
        }
        "unsubscribeAddresses" => {
            state.registry.remove_addresses(conn);
            Ok(subscribed(false))
        }
        "subscribeFiatRates" => {
            let p: SubscribeFiatParams = parse(params)?;
            let tokens = p.tokens.iter().map(|t| t.to_lowercase()).collect();
            state
                .registry
                .set_fiat_rate(conn, id, &p.currency.to_lowercase(), tokens);
            Ok(subscribed(true))
        }
        "unsubscribeFiatRates" => {
            state.registry.remove_fiat_rate(conn);
            Ok(subscribed(false))
        }
        "subscribeNewTransaction" => {
            if !state.config.features.subscribe_new_tx {
                return to_json(SubscriptionMessage {
                    subscribed: false,
                    message: SUBSCRIBE_NEW_TX_DISABLED,
                });
            }
            state.registry.add_new_tx(conn, id);
            Ok(subscribed(true))
        }
        "unsubscribeNewTransaction" => {
            if !state.config.features.subscribe_new_tx {
                return to_json(SubscriptionMessage {
                    subscribed: false,
                    message: UNSUBSCRIBE_NEW_TX_DISABLED,
                });
            }
            state.registry.remove_new_tx(conn);
            Ok(subscribed(false))
        }
        other => Err(ApiError::public(format!("Unknown method '{}'", other))),
    }
}

// =============================================================================
// PARAMS
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AccountInfoParams {
    descriptor: String,
    details: String,
    tokens: String,
    page_size: u32,
    page: u32,
    from: u32,
    to: u32,
    contract_filter: String,
    gap: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DescriptorParams {
    descriptor: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BalanceHistoryParams {
    descriptor: String,
    from: i64,
    to: i64,
    currencies: Vec<String>,
    gap: u32,
    group_by: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TxidParams {
    txid: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HexParams {
    hex: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HeightParams {
    height: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BlockParams {
    id: String,
    page: u32,
    page_size: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FiatParams {
    currencies: Vec<String>,
    timestamps: Vec<i64>,
    timestamp: i64,
    token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddressesParams {
    addresses: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubscribeFiatParams {
    currency: String,
    tokens: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EstimateFeeParams {
    blocks: Vec<u32>,
    specific: Map<String, Value>,
}

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeeEstimate {
    #[serde(skip_serializing_if = "String::is_empty")]
    fee_per_tx: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    fee_per_unit: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    fee_limit: String,
}

#[derive(Serialize)]
struct SubscriptionMessage {
    subscribed: bool,
    message: &'static str,
}

/// Missing params decode as the all-default value.
fn parse<T: DeserializeOwned + Default>(params: Value) -> ApiResult<T> {
    if params.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(params)?)
}

fn to_json<T: Serialize>(v: T) -> ApiResult<Value> {
    serde_json::to_value(v).map_err(|e| ApiError::internal(e.to_string()))
}

fn subscribed(on: bool) -> Value {
    json!({ "subscribed": on })
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn get_account_info(state: &SharedState, p: AccountInfoParams) -> ApiResult<explorer_types::AddressView> {
    let details = AccountDetails::from_param(&p.details);
    let filter = AddressFilter {
        from_height: p.from,
        to_height: p.to,
        contract: p.contract_filter,
        vout: VoutFilter::Off,
        tokens_to_return: TokensToReturn::from_param(&p.tokens),
    };
    let page_size = if p.page_size == 0 {
        state.config.limits.txs_on_page
    } else {
        p.page_size
    };
    let accounts = &state.backends.accounts;
    match accounts
        .get_xpub_address(&p.descriptor, p.page, page_size, details, &filter, p.gap)
        .await
    {
        Ok(view) => Ok(view),
        Err(_) => {
            accounts
                .get_address(&p.descriptor, p.page, page_size, details, &filter)
                .await
        }
    }
}

async fn get_account_utxo(state: &SharedState, p: DescriptorParams) -> ApiResult<Vec<explorer_types::Utxo>> {
    let accounts = &state.backends.accounts;
    match accounts.get_xpub_utxo(&p.descriptor, false, 0).await {
        Ok(utxos) => Ok(utxos),
        Err(_) => accounts.get_address_utxo(&p.descriptor, false).await,
    }
}

async fn get_balance_history(
    state: &SharedState,
    p: BalanceHistoryParams,
) -> ApiResult<Vec<explorer_types::BalanceHistory>> {
    let from = p.from.max(0);
    let to = p.to.max(0);
    let group_by = if p.group_by == 0 {
        DEFAULT_GROUP_BY
    } else {
        p.group_by
    };
    let accounts = &state.backends.accounts;
    match accounts
        .get_xpub_balance_history(&p.descriptor, from, to, &p.currencies, p.gap, group_by)
        .await
    {
        Ok(history) => Ok(history),
        Err(_) => {
            accounts
                .get_balance_history(&p.descriptor, from, to, &p.currencies, group_by)
                .await
        }
    }
}

async fn estimate_fee(state: &SharedState, p: EstimateFeeParams) -> ApiResult<Vec<FeeEstimate>> {
    let chain = &state.backends.chain;
    let mut out = Vec::with_capacity(p.blocks.len());
    match state.backends.codec.chain_type() {
        ChainType::Account => {
            let gas = chain.ethereum_type_estimate_gas(&p.specific).await?;
            for b in p.blocks {
                let fee = chain.estimate_smart_fee(b, true).await?;
                out.push(FeeEstimate {
                    fee_per_tx: fee.saturating_mul_u64(gas).to_string(),
                    fee_per_unit: fee.to_string(),
                    fee_limit: gas.to_string(),
                });
            }
        }
        ChainType::Utxo => {
            let conservative = p
                .specific
                .get("conservative")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let tx_size = p
                .specific
                .get("txsize")
                .and_then(Value::as_f64)
                .map(|f| f as u64)
                .unwrap_or(0);
            for b in p.blocks {
                let fee = chain.estimate_smart_fee(b, conservative).await?;
                let fee_per_tx = if tx_size > 0 {
                    fee_for_size(fee, tx_size).to_string()
                } else {
                    String::new()
                };
                out.push(FeeEstimate {
                    fee_per_tx,
                    fee_per_unit: fee.to_string(),
                    fee_limit: String::new(),
                });
            }
        }
    }
    Ok(out)
}

/// Fee per kilobyte scaled to `size` bytes, rounded half up.
fn fee_for_size(fee_per_kb: Amount, size: u64) -> Amount {
    fee_per_kb
        .saturating_mul_u64(size)
        .saturating_add(Amount::from_u64(500))
        .div_u64(1000)
}

async fn get_info(state: &SharedState) -> ApiResult<Value> {
    let info = state.backends.accounts.get_system_info(true).await?;
    let bb = info.blockbook;
    Ok(json!({
        "name": bb.coin,
        "shortcut": bb.shortcut,
        "decimals": bb.decimals,
        "version": bb.version,
        "bestHeight": bb.best_height,
        "bestHash": bb.best_hash,
        "testnet": state.backends.chain.is_testnet(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_for_size_rounds() {
        assert_eq!(fee_for_size(Amount::from_u64(1000), 225), Amount::from_u64(225));
        assert_eq!(fee_for_size(Amount::from_u64(1001), 500), Amount::from_u64(501));
        assert_eq!(fee_for_size(Amount::from_u64(3), 100), Amount::ZERO);
    }

    #[test]
    fn test_parse_null_params() {
        let p: AccountInfoParams = parse(Value::Null).unwrap();
        assert_eq!(p.page_size, 0);
        let err = parse::<TxidParams>(json!({"txid": 5})).unwrap_err();
        assert!(err.is_public());
    }

    #[test]
    fn test_method_table_has_no_duplicates() {
        let mut names = METHODS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), METHODS.len());
    }
}
