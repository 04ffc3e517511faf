//! REST endpoint bodies. Each returns through [`Dispatcher::json`], which
//! owns status codes, error text and metrics.
//!
//! [`Dispatcher::json`]: crate::dispatch::Dispatcher::json

use super::params::QueryParams;
use super::v1::{AddressV1, BlockV1, TxV1, UtxoV1, Versioned};
use super::ApiVersion;
use crate::state::SharedState;
use axum::response::Response;
use explorer_types::{AccountDetails, ApiError, ApiResult, Ticker};
use serde::Serialize;
use serde_json::json;

const DEFAULT_GROUP_BY: u32 = 3600;

#[derive(Serialize)]
struct ResultString {
    result: String,
}

/// Public error for a request missing its path argument.
pub async fn missing(state: SharedState, action: &'static str, message: &'static str) -> Response {
    state
        .dispatcher
        .json(action, async move { Err::<(), _>(ApiError::public(message)) })
        .await
}

pub async fn index(state: SharedState) -> Response {
    state
        .dispatcher
        .json("api-index", state.backends.accounts.get_system_info(false))
        .await
}

/// Hash at `height`, or the best hash when the height is absent or not a
/// number.
pub async fn block_index(state: SharedState, height: Option<String>) -> Response {
    let chain = &state.backends.chain;
    let work = async {
        let hash = match height.as_deref().and_then(|h| h.parse::<u32>().ok()) {
            Some(h) => chain.get_block_hash(h).await?,
            None => chain.get_best_block_hash().await?,
        };
        Ok::<_, ApiError>(json!({ "blockHash": hash }))
    };
    state.dispatcher.json("api-block-index", work).await
}

pub async fn tx(state: SharedState, txid: String, q: QueryParams, version: ApiVersion) -> Response {
    let work = async {
        let spending = q.bool_or("spending", false)?;
        let tx = state
            .backends
            .accounts
            .get_transaction(&txid, spending, false)
            .await?;
        Ok::<_, ApiError>(match version {
            ApiVersion::V1 => Versioned::V1(TxV1::from_v2(&tx, decimals(&state))),
            ApiVersion::V2 => Versioned::V2(tx),
        })
    };
    state.dispatcher.json("api-tx", work).await
}

pub async fn tx_specific(state: SharedState, txid: String) -> Response {
    state
        .dispatcher
        .json(
            "api-tx-specific",
            state.backends.accounts.get_transaction_specific(&txid),
        )
        .await
}

pub async fn address(state: SharedState, address: String, q: QueryParams, version: ApiVersion) -> Response {
    let work = async {
        let view = state
            .backends
            .accounts
            .get_address(
                &address,
                q.page(),
                q.page_size(state.config.limits.txs_in_api),
                q.details(AccountDetails::Txids),
                &q.address_filter(),
            )
            .await?;
        Ok::<_, ApiError>(match version {
            ApiVersion::V1 => Versioned::V1(AddressV1::from_v2(&view, decimals(&state))),
            ApiVersion::V2 => Versioned::V2(view),
        })
    };
    state.dispatcher.json("api-address", work).await
}

pub async fn xpub(state: SharedState, xpub: String, q: QueryParams) -> Response {
    let filter = q.address_filter();
    let work = state.backends.accounts.get_xpub_address(
        &xpub,
        q.page(),
        q.page_size(state.config.limits.txs_in_api),
        q.details(AccountDetails::Txids),
        &filter,
        q.u32_or_zero("gap"),
    );
    state.dispatcher.json("api-xpub", work).await
}

/// Tries the descriptor as an xpub first, then as an address.
pub async fn utxo(state: SharedState, descriptor: String, q: QueryParams, version: ApiVersion) -> Response {
    let work = async {
        let confirmed = q.bool_or("confirmed", false)?;
        let accounts = &state.backends.accounts;
        let utxos = match accounts
            .get_xpub_utxo(&descriptor, confirmed, q.u32_or_zero("gap"))
            .await
        {
            Ok(u) => u,
            Err(_) => accounts.get_address_utxo(&descriptor, confirmed).await?,
        };
        Ok::<_, ApiError>(match version {
            ApiVersion::V1 => {
                let d = decimals(&state);
                Versioned::V1(utxos.iter().map(|u| UtxoV1::from_v2(u, d)).collect::<Vec<_>>())
            }
            ApiVersion::V2 => Versioned::V2(utxos),
        })
    };
    state.dispatcher.json("api-utxo", work).await
}

pub async fn block(state: SharedState, id: String, q: QueryParams, version: ApiVersion) -> Response {
    let work = async {
        let block = state
            .backends
            .accounts
            .get_block(&id, q.page(), q.page_size(state.config.limits.txs_in_api))
            .await?;
        Ok::<_, ApiError>(match version {
            ApiVersion::V1 => Versioned::V1(BlockV1::from_v2(&block, decimals(&state))),
            ApiVersion::V2 => Versioned::V2(block),
        })
    };
    state.dispatcher.json("api-block", work).await
}

pub async fn raw_block(state: SharedState, id: String) -> Response {
    state
        .dispatcher
        .json("api-block-raw", state.backends.accounts.get_block_raw(&id))
        .await
}

/// Broadcast `hex`, taken from the POST body or the legacy GET path.
pub async fn send_tx(state: SharedState, hex: String) -> Response {
    let work = async {
        let hex = hex.trim();
        if hex.is_empty() {
            return Err(ApiError::public("Missing tx blob"));
        }
        let txid = state
            .backends
            .chain
            .send_raw_transaction(hex)
            .await
            .map_err(|e| ApiError::public(e.message))?;
        Ok::<_, ApiError>(ResultString { result: txid })
    };
    state.dispatcher.json("api-sendtx", work).await
}

/// Smart fee, falling back to the plain estimate, as a decimal string.
pub async fn estimate_fee(state: SharedState, blocks: String, q: QueryParams) -> Response {
    let work = async {
        let blocks: u32 = blocks
            .parse()
            .map_err(|_| ApiError::public("Parameter 'number of blocks' is not a number"))?;
        let conservative = q.bool_or("conservative", true)?;
        let chain = &state.backends.chain;
        let fee = match chain.estimate_smart_fee(blocks, conservative).await {
            Ok(fee) => fee,
            Err(_) => chain.estimate_fee(blocks).await?,
        };
        Ok::<_, ApiError>(ResultString {
            result: state.backends.codec.amount_to_decimal_string(&fee),
        })
    };
    state.dispatcher.json("api-estimatefee", work).await
}

pub async fn fee_stats(state: SharedState, block_id: String) -> Response {
    state
        .dispatcher
        .json("api-feestats", state.backends.accounts.get_fee_stats(&block_id))
        .await
}

fn time_param(q: &QueryParams, name: &'static str) -> ApiResult<i64> {
    match q.get(name) {
        "" => Ok(0),
        raw => raw
            .parse()
            .map_err(|_| ApiError::public(format!("Parameter '{}' is not a number", name))),
    }
}

/// Tries the descriptor as an xpub first, then as an address.
pub async fn balance_history(state: SharedState, descriptor: String, q: QueryParams) -> Response {
    let work = async {
        let from = time_param(&q, "from")?;
        let to = time_param(&q, "to")?;
        let group_by = match q.u32_or_zero("groupBy") {
            0 => DEFAULT_GROUP_BY,
            g => g,
        };
        let currencies = q.list("fiatcurrency");
        let accounts = &state.backends.accounts;
        match accounts
            .get_xpub_balance_history(&descriptor, from, to, &currencies, q.u32_or_zero("gap"), group_by)
            .await
        {
            Ok(h) => Ok(h),
            Err(_) => {
                accounts
                    .get_balance_history(&descriptor, from, to, &currencies, group_by)
                    .await
            }
        }
    };
    state.dispatcher.json("api-balancehistory", work).await
}

/// One ticker: by `block`, else by `timestamp`, else the latest.
pub async fn tickers(state: SharedState, q: QueryParams) -> Response {
    let work = async {
        let currencies = q.list("currency");
        let token = q.get("token").to_lowercase();
        let accounts = &state.backends.accounts;
        if !q.get("block").is_empty() {
            return accounts
                .get_fiat_rates_for_block_id(q.get("block"), &currencies, &token)
                .await;
        }
        if !q.get("timestamp").is_empty() {
            let ts: i64 = q.get("timestamp").parse().map_err(|_| {
                ApiError::public("Parameter 'timestamp' is not a valid Unix timestamp.")
            })?;
            let found = accounts
                .get_fiat_rates_for_timestamps(&[ts], &currencies, &token)
                .await?;
            return found
                .tickers
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::internal("empty ticker list"));
        }
        accounts.get_current_fiat_rates(&currencies, &token).await
    };
    state.dispatcher.json("api-tickers", work).await
}

pub async fn multi_tickers(state: SharedState, q: QueryParams) -> Response {
    let work = async {
        let raw = q.get("timestamp");
        if raw.is_empty() {
            return Err(ApiError::public("Parameter 'timestamp' is missing."));
        }
        let timestamps = raw
            .split(',')
            .map(|t| t.trim().parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| {
                ApiError::public("Parameter 'timestamp' does not contain a valid Unix timestamp.")
            })?;
        let found = state
            .backends
            .accounts
            .get_fiat_rates_for_timestamps(&timestamps, &q.list("currency"), &q.get("token").to_lowercase())
            .await?;
        Ok::<Vec<Ticker>, ApiError>(found.tickers)
    };
    state.dispatcher.json("api-multi-tickers", work).await
}

pub async fn tickers_list(state: SharedState, q: QueryParams) -> Response {
    let work = async {
        let ts: i64 = q.get("timestamp").parse().map_err(|_| {
            ApiError::public("Parameter \"timestamp\" is not a valid Unix timestamp.")
        })?;
        state
            .backends
            .accounts
            .get_fiat_rates_tickers_list(ts, &q.get("token").to_lowercase())
            .await
    };
    state.dispatcher.json("api-tickers-list", work).await
}

fn decimals(state: &SharedState) -> u32 {
    state.backends.codec.amount_decimals()
}
