//! # Core Domain Entities
//!
//! Canonical (v2) views returned by the `AccountService`. Field names and
//! omission rules are part of the public wire schema.
//!
//! ## Clusters
//!
//! - **Transactions**: `Tx`, `Vin`, `Vout`, `TokenTransfer`
//! - **Accounts**: `AddressView`, `Token`, `Utxo`, `BalanceHistory`
//! - **Blocks**: `Block`, `BlockInfo`, `Blocks`, `BlockRaw`, `BlockHeader`
//! - **Node state**: `SystemInfo`, `FeeStats`, `MempoolTxids`

use crate::amount::{AddressDescriptor, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

// =============================================================================
// CLUSTER A: TRANSACTIONS
// =============================================================================

/// Paging state attached to list views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub page: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub total_pages: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub items_on_page: u32,
}

/// Transaction input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vin {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub txid: String,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub vout: u32,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub sequence: i64,
    pub n: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub is_address: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Amount>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hex: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asm: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub coinbase: String,
    /// Descriptor of the spent output, when known.
    #[serde(skip)]
    pub addr_desc: Option<AddressDescriptor>,
}

/// Transaction output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Amount>,
    pub n: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub spent: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spent_tx_id: String,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub spent_index: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub spent_height: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hex: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asm: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub is_address: bool,
    #[serde(default, skip_serializing_if = "String::is_empty", rename = "type")]
    pub script_type: String,
    #[serde(skip)]
    pub addr_desc: Option<AddressDescriptor>,
}

/// Token transfer carried by account-model transactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    #[serde(rename = "type")]
    pub token_type: String,
    pub from: String,
    pub to: String,
    pub contract: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub symbol: String,
    #[serde(default)]
    pub decimals: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Amount>,
}

/// Account-model execution details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthereumSpecific {
    pub status: i32,
    pub nonce: u64,
    pub gas_limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    pub gas_price: Amount,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
}

/// Canonical transaction view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tx {
    pub txid: String,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub version: i64,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub lock_time: u32,
    pub vin: Vec<Vin>,
    pub vout: Vec<Vout>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub block_hash: String,
    /// `-1` for unconfirmed transactions.
    pub block_height: i64,
    pub confirmations: u32,
    pub block_time: i64,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub size: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub vsize: u32,
    /// Sum of outputs.
    pub value: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_in: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<Amount>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hex: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub rbf: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coin_specific_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_transfers: Vec<TokenTransfer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ethereum_specific: Option<EthereumSpecific>,
}

// =============================================================================
// CLUSTER B: ACCOUNTS
// =============================================================================

/// Token holding of an account or xpub-derived address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(rename = "type")]
    pub token_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contract: String,
    pub transfers: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub symbol: String,
    #[serde(default)]
    pub decimals: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_received: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_sent: Option<Amount>,
}

/// Summary of an address, account or xpub with an optional page of history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressView {
    #[serde(flatten)]
    pub paging: Paging,
    pub address: String,
    pub balance: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_received: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_sent: Option<Amount>,
    pub unconfirmed_balance: Amount,
    pub unconfirmed_txs: u32,
    pub txs: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub non_token_txs: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transactions: Vec<Tx>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub txids: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nonce: String,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub used_tokens: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Token>,
}

/// Unspent output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub value: Amount,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub height: u32,
    pub confirmations: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub locktime: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub coinbase: bool,
}

/// One bucket of aggregated balance history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceHistory {
    pub time: u64,
    pub txs: u32,
    pub received: Amount,
    pub sent: Amount,
    pub sent_to_self: Amount,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rates: BTreeMap<String, f64>,
}

// =============================================================================
// CLUSTER C: BLOCKS
// =============================================================================

/// Block header summary shared by block list and block detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    pub hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub previous_block_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub next_block_hash: String,
    pub height: u32,
    pub confirmations: u32,
    pub size: u32,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub time: i64,
    #[serde(default)]
    pub version: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub merkle_root: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nonce: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bits: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub difficulty: String,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub tx_count: u32,
}

/// Block with a page of its transactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(flatten)]
    pub paging: Paging,
    #[serde(flatten)]
    pub info: BlockInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub txs: Vec<Tx>,
}

/// Page of recent blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blocks {
    #[serde(flatten)]
    pub paging: Paging,
    pub blocks: Vec<BlockInfo>,
}

/// Raw serialized block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRaw {
    pub hex: String,
}

/// Header as reported by the chain backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub hash: String,
    #[serde(default)]
    pub prev: String,
    #[serde(default)]
    pub next: String,
    pub height: u32,
    pub confirmations: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub time: i64,
}

// =============================================================================
// CLUSTER D: NODE STATE
// =============================================================================

/// Indexer side of [`SystemInfo`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerInfo {
    pub coin: String,
    #[serde(default)]
    pub shortcut: String,
    pub host: String,
    pub version: String,
    pub best_height: u32,
    #[serde(default)]
    pub best_hash: String,
    pub last_block_time: i64,
    pub in_sync: bool,
    pub in_sync_mempool: bool,
    pub mempool_size: u32,
    pub decimals: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub about: String,
}

/// Backend node side of [`SystemInfo`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendInfo {
    pub chain: String,
    pub blocks: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub headers: u32,
    pub best_block_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub difficulty: String,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub size_on_disk: u64,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subversion: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub consensus_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub warnings: String,
}

/// Combined indexer and backend status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub blockbook: IndexerInfo,
    pub backend: BackendInfo,
}

/// Aggregate fee statistics of one block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeStats {
    pub tx_count: u32,
    pub total_fees_sat: Amount,
    pub average_fee_per_kb: i64,
    pub deciles_fee_per_kb: [i64; 11],
}

/// Mempool entry in the paged listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolTxid {
    pub txid: String,
    pub time: i64,
}

/// Page of mempool txids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolTxids {
    #[serde(flatten)]
    pub paging: Paging,
    pub mempool: Vec<MempoolTxid>,
    pub mempool_size: u32,
}
