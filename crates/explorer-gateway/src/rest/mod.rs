//! JSON REST API under `/api`.
//!
//! `/api/v2/...` serves the canonical shapes and `/api/v1/...` the legacy
//! ones (UTXO chains only). Unversioned `/api/...` paths behave as v2.

mod handlers;
mod params;
mod v1;

pub use params::{parse_bool, QueryParams};
pub use v1::{AddressV1, BlockV1, TxV1, UtxoV1, Versioned};

use crate::state::SharedState;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;

/// Response shape family of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

type Q = Query<HashMap<String, String>>;

/// All REST routes. The v1 tree is only mounted when the chain has one.
pub fn router(supports_v1: bool) -> Router<SharedState> {
    let mut router = Router::new()
        .route("/api", get(|State(s): State<SharedState>| handlers::index(s)))
        .route("/api/", get(|State(s): State<SharedState>| handlers::index(s)))
        .merge(common("/api", ApiVersion::V2))
        .merge(extended("/api"))
        .merge(common("/api/v2", ApiVersion::V2))
        .merge(extended("/api/v2"))
        .merge(v2_only("/api/v2"));
    if supports_v1 {
        router = router.merge(common("/api/v1", ApiVersion::V1));
    }
    router
}

/// Endpoints every version serves.
fn common(prefix: &str, version: ApiVersion) -> Router<SharedState> {
    let v = version;
    Router::new()
        .route(
            &format!("{prefix}/block-index"),
            get(|State(s): State<SharedState>| handlers::block_index(s, None)),
        )
        .route(
            &format!("{prefix}/block-index/"),
            get(|State(s): State<SharedState>| handlers::block_index(s, None)),
        )
        .route(
            &format!("{prefix}/block-index/:height"),
            get(|State(s): State<SharedState>, Path(h): Path<String>| handlers::block_index(s, Some(h))),
        )
        .route(
            &format!("{prefix}/tx/"),
            get(|State(s): State<SharedState>| handlers::missing(s, "api-tx", "Missing txid")),
        )
        .route(
            &format!("{prefix}/tx/:txid"),
            get(move |State(s): State<SharedState>, Path(id): Path<String>, Query(q): Q| {
                handlers::tx(s, id, q.into(), v)
            }),
        )
        .route(
            &format!("{prefix}/tx-specific/"),
            get(|State(s): State<SharedState>| handlers::missing(s, "api-tx-specific", "Missing txid")),
        )
        .route(
            &format!("{prefix}/tx-specific/:txid"),
            get(|State(s): State<SharedState>, Path(id): Path<String>| handlers::tx_specific(s, id)),
        )
        .route(
            &format!("{prefix}/address/"),
            get(|State(s): State<SharedState>| handlers::missing(s, "api-address", "Missing address")),
        )
        .route(
            &format!("{prefix}/address/:address"),
            get(move |State(s): State<SharedState>, Path(a): Path<String>, Query(q): Q| {
                handlers::address(s, a, q.into(), v)
            }),
        )
        .route(
            &format!("{prefix}/utxo/"),
            get(|State(s): State<SharedState>| handlers::missing(s, "api-utxo", "Missing address")),
        )
        .route(
            &format!("{prefix}/utxo/:descriptor"),
            get(move |State(s): State<SharedState>, Path(d): Path<String>, Query(q): Q| {
                handlers::utxo(s, d, q.into(), v)
            }),
        )
        .route(
            &format!("{prefix}/block/"),
            get(|State(s): State<SharedState>| {
                handlers::missing(s, "api-block", "Missing block hash or height")
            }),
        )
        .route(
            &format!("{prefix}/block/:id"),
            get(move |State(s): State<SharedState>, Path(id): Path<String>, Query(q): Q| {
                handlers::block(s, id, q.into(), v)
            }),
        )
        .route(
            &format!("{prefix}/sendtx"),
            get(|State(s): State<SharedState>| handlers::send_tx(s, String::new()))
                .post(|State(s): State<SharedState>, body: String| handlers::send_tx(s, body)),
        )
        .route(
            &format!("{prefix}/sendtx/"),
            get(|State(s): State<SharedState>| handlers::send_tx(s, String::new()))
                .post(|State(s): State<SharedState>, body: String| handlers::send_tx(s, body)),
        )
        .route(
            &format!("{prefix}/sendtx/:hex"),
            get(|State(s): State<SharedState>, Path(hex): Path<String>| handlers::send_tx(s, hex)),
        )
        .route(
            &format!("{prefix}/estimatefee/"),
            get(|State(s): State<SharedState>| {
                handlers::missing(s, "api-estimatefee", "Missing parameter 'number of blocks'")
            }),
        )
        .route(
            &format!("{prefix}/estimatefee/:blocks"),
            get(|State(s): State<SharedState>, Path(b): Path<String>, Query(q): Q| {
                handlers::estimate_fee(s, b, q.into())
            }),
        )
}

/// Endpoints without a legacy shape; not served under `/api/v1`.
fn extended(prefix: &str) -> Router<SharedState> {
    Router::new()
        .route(
            &format!("{prefix}/xpub/"),
            get(|State(s): State<SharedState>| handlers::missing(s, "api-xpub", "Missing xpub")),
        )
        .route(
            &format!("{prefix}/xpub/:xpub"),
            get(|State(s): State<SharedState>, Path(x): Path<String>, Query(q): Q| {
                handlers::xpub(s, x, q.into())
            }),
        )
        .route(
            &format!("{prefix}/rawblock/"),
            get(|State(s): State<SharedState>| {
                handlers::missing(s, "api-block-raw", "Missing block hash or height")
            }),
        )
        .route(
            &format!("{prefix}/rawblock/:id"),
            get(|State(s): State<SharedState>, Path(id): Path<String>| handlers::raw_block(s, id)),
        )
        .route(
            &format!("{prefix}/balancehistory/"),
            get(|State(s): State<SharedState>| {
                handlers::missing(s, "api-balancehistory", "Missing address")
            }),
        )
        .route(
            &format!("{prefix}/balancehistory/:descriptor"),
            get(|State(s): State<SharedState>, Path(d): Path<String>, Query(q): Q| {
                handlers::balance_history(s, d, q.into())
            }),
        )
}

fn v2_only(prefix: &str) -> Router<SharedState> {
    Router::new()
        .route(
            &format!("{prefix}/feestats/"),
            get(|State(s): State<SharedState>| {
                handlers::missing(s, "api-feestats", "Missing parameter 'block id'")
            }),
        )
        .route(
            &format!("{prefix}/feestats/:block"),
            get(|State(s): State<SharedState>, Path(b): Path<String>| handlers::fee_stats(s, b)),
        )
        .route(
            &format!("{prefix}/tickers"),
            get(|State(s): State<SharedState>, Query(q): Q| handlers::tickers(s, q.into())),
        )
        .route(
            &format!("{prefix}/tickers/"),
            get(|State(s): State<SharedState>, Query(q): Q| handlers::tickers(s, q.into())),
        )
        .route(
            &format!("{prefix}/multi-tickers"),
            get(|State(s): State<SharedState>, Query(q): Q| handlers::multi_tickers(s, q.into())),
        )
        .route(
            &format!("{prefix}/multi-tickers/"),
            get(|State(s): State<SharedState>, Query(q): Q| handlers::multi_tickers(s, q.into())),
        )
        .route(
            &format!("{prefix}/tickers-list"),
            get(|State(s): State<SharedState>, Query(q): Q| handlers::tickers_list(s, q.into())),
        )
        .route(
            &format!("{prefix}/tickers-list/"),
            get(|State(s): State<SharedState>, Query(q): Q| handlers::tickers_list(s, q.into())),
        )
}
