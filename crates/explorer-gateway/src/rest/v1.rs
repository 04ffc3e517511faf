//! Legacy v1 payloads, derived from the canonical v2 entities.
//!
//! v1 carries amounts as decimal strings in whole coins, keeps Insight-era
//! field names and nests scripts under `scriptSig` / `scriptPubKey`.

use explorer_types::{AddressView, Amount, Block, BlockInfo, Paging, Tx, Utxo};
use serde::Serialize;

/// A response in the shape the requested API version expects.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Versioned<V2, V1> {
    V2(V2),
    V1(V1),
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

fn decimal(amount: Option<Amount>, decimals: u32) -> String {
    amount.unwrap_or_default().to_decimal_string(decimals)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScriptSig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hex: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub asm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VinV1 {
    pub txid: String,
    pub vout: u32,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub sequence: i64,
    pub n: u32,
    pub script_sig: ScriptSig,
    pub addresses: Vec<String>,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScriptPubKey {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hex: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub asm: String,
    pub addresses: Vec<String>,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub script_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoutV1 {
    pub value: String,
    pub n: u32,
    pub script_pub_key: ScriptPubKey,
    pub spent: bool,
    #[serde(rename = "spentTxId", skip_serializing_if = "String::is_empty")]
    pub spent_tx_id: String,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub spent_index: u32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub spent_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxV1 {
    pub txid: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub version: i64,
    #[serde(rename = "locktime", skip_serializing_if = "is_zero_u32")]
    pub lock_time: u32,
    pub vin: Vec<VinV1>,
    pub vout: Vec<VoutV1>,
    #[serde(rename = "blockhash", skip_serializing_if = "String::is_empty")]
    pub block_hash: String,
    #[serde(rename = "blockheight")]
    pub block_height: i64,
    pub confirmations: u32,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub time: i64,
    #[serde(rename = "blocktime")]
    pub block_time: i64,
    pub value_out: String,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub size: u32,
    pub value_in: String,
    pub fees: String,
    pub hex: String,
}

impl TxV1 {
    pub fn from_v2(tx: &Tx, decimals: u32) -> Self {
        TxV1 {
            txid: tx.txid.clone(),
            version: tx.version,
            lock_time: tx.lock_time,
            vin: tx
                .vin
                .iter()
                .map(|v| VinV1 {
                    txid: v.txid.clone(),
                    vout: v.vout,
                    sequence: v.sequence,
                    n: v.n,
                    script_sig: ScriptSig {
                        hex: v.hex.clone(),
                        asm: v.asm.clone(),
                    },
                    addresses: v.addresses.clone(),
                    value: decimal(v.value, decimals),
                })
                .collect(),
            vout: tx
                .vout
                .iter()
                .map(|v| VoutV1 {
                    value: decimal(v.value, decimals),
                    n: v.n,
                    script_pub_key: ScriptPubKey {
                        hex: v.hex.clone(),
                        asm: v.asm.clone(),
                        addresses: v.addresses.clone(),
                        script_type: v.script_type.clone(),
                    },
                    spent: v.spent,
                    spent_tx_id: v.spent_tx_id.clone(),
                    spent_index: v.spent_index,
                    spent_height: v.spent_height,
                })
                .collect(),
            block_hash: tx.block_hash.clone(),
            block_height: tx.block_height,
            confirmations: tx.confirmations,
            time: tx.block_time,
            block_time: tx.block_time,
            value_out: tx.value.to_decimal_string(decimals),
            size: tx.size,
            value_in: decimal(tx.value_in, decimals),
            fees: decimal(tx.fees, decimals),
            hex: tx.hex.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressV1 {
    #[serde(flatten)]
    pub paging: Paging,
    pub addr_str: String,
    pub balance: String,
    pub total_received: String,
    pub total_sent: String,
    pub unconfirmed_balance: String,
    pub unconfirmed_tx_apperances: u32,
    pub tx_apperances: u32,
    #[serde(rename = "txs", skip_serializing_if = "Vec::is_empty")]
    pub txs: Vec<TxV1>,
    #[serde(rename = "transactions", skip_serializing_if = "Vec::is_empty")]
    pub txids: Vec<String>,
}

impl AddressV1 {
    pub fn from_v2(a: &AddressView, decimals: u32) -> Self {
        AddressV1 {
            paging: a.paging,
            addr_str: a.address.clone(),
            balance: a.balance.to_decimal_string(decimals),
            total_received: decimal(a.total_received, decimals),
            total_sent: decimal(a.total_sent, decimals),
            unconfirmed_balance: a.unconfirmed_balance.to_decimal_string(decimals),
            unconfirmed_tx_apperances: a.unconfirmed_txs,
            tx_apperances: a.txs,
            txs: a
                .transactions
                .iter()
                .map(|t| TxV1::from_v2(t, decimals))
                .collect(),
            txids: a.txids.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtxoV1 {
    pub txid: String,
    pub vout: u32,
    pub amount: String,
    /// Base units as an integer string
    pub satoshis: Amount,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub height: u32,
    pub confirmations: u32,
}

impl UtxoV1 {
    pub fn from_v2(u: &Utxo, decimals: u32) -> Self {
        UtxoV1 {
            txid: u.txid.clone(),
            vout: u.vout,
            amount: u.value.to_decimal_string(decimals),
            satoshis: u.value,
            height: u.height,
            confirmations: u.confirmations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockV1 {
    #[serde(flatten)]
    pub paging: Paging,
    #[serde(flatten)]
    pub info: BlockInfo,
    pub txs: Vec<TxV1>,
}

impl BlockV1 {
    pub fn from_v2(b: &Block, decimals: u32) -> Self {
        BlockV1 {
            paging: b.paging,
            info: b.info.clone(),
            txs: b.txs.iter().map(|t| TxV1::from_v2(t, decimals)).collect(),
        }
    }
}
