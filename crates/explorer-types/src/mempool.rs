//! Mempool transactions as announced by the indexer, before enrichment.

use crate::amount::{AddressDescriptor, Amount};
use serde::{Deserialize, Serialize};

/// Input of a mempool transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MempoolVin {
    pub txid: String,
    pub vout: u32,
    /// Descriptor of the spent output when the mempool resolved it.
    pub addr_desc: Option<AddressDescriptor>,
    pub value: Amount,
}

/// Output of a mempool transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MempoolVout {
    pub value: Amount,
    pub n: u32,
    pub script_hex: String,
    pub addresses: Vec<String>,
}

/// Token transfer endpoint pair of an account-model mempool transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MempoolTokenTransfer {
    pub from: String,
    pub to: String,
    pub contract: String,
    pub value: Amount,
}

/// A transaction that just entered the mempool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MempoolTx {
    pub txid: String,
    pub vin: Vec<MempoolVin>,
    pub vout: Vec<MempoolVout>,
    pub token_transfers: Vec<MempoolTokenTransfer>,
    /// First-seen unix time.
    pub time: i64,
}

/// Backend mempool entry, passed through to socket.io clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct MempoolEntry {
    pub size: u32,
    pub fee: f64,
    pub modifiedfee: f64,
    pub time: u64,
    pub height: u32,
    pub descendantcount: u32,
    pub descendantsize: u32,
    pub descendantfees: u64,
    pub ancestorcount: u32,
    pub ancestorsize: u32,
    pub ancestorfees: u64,
    pub depends: Vec<String>,
}
