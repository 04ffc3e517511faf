//! # Collaborator Ports
//!
//! Narrow interfaces through which the gateway reaches the indexer, the
//! chain backend, the mempool, the chain parser and the fiat-rate store.
//! The gateway owns none of these; it only holds them as
//! `Arc<dyn Trait>`.
//!
//! I/O-bound ports are async. Pure parsing ports (`AddressCodec`,
//! `RatesStore`) are synchronous.

use crate::amount::{AddressDescriptor, Amount};
use crate::entities::{
    AddressView, BalanceHistory, Block, BlockHeader, BlockRaw, Blocks, FeeStats, MempoolTxids,
    SystemInfo, Tx, Utxo,
};
use crate::errors::ApiResult;
use crate::fiat::{RatesTicker, Ticker, Tickers, TickersList};
use crate::mempool::{MempoolEntry, MempoolTx, MempoolVout};
use async_trait::async_trait;

// =============================================================================
// REQUEST OPTIONS
// =============================================================================

/// How much detail an address or xpub query returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AccountDetails {
    #[default]
    Basic,
    Tokens,
    TokenBalances,
    Txids,
    TxsLight,
    Txs,
}

impl AccountDetails {
    /// Map the wire name; unknown names fall back to `Basic`.
    pub fn from_param(s: &str) -> Self {
        match s {
            "tokens" => Self::Tokens,
            "tokenBalances" => Self::TokenBalances,
            "txids" => Self::Txids,
            "txslight" => Self::TxsLight,
            "txs" => Self::Txs,
            _ => Self::Basic,
        }
    }
}

/// Which derived tokens an xpub query returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TokensToReturn {
    #[default]
    Derived,
    Used,
    Nonzero,
}

impl TokensToReturn {
    pub fn from_param(s: &str) -> Self {
        match s {
            "used" => Self::Used,
            "nonzero" => Self::Nonzero,
            _ => Self::Derived,
        }
    }
}

/// Output filter of an address history query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VoutFilter {
    #[default]
    Off,
    Inputs,
    Outputs,
    Index(u32),
}

impl VoutFilter {
    /// `inputs`, `outputs` or a non-negative index; anything else is `Off`.
    pub fn from_param(s: &str) -> Self {
        match s {
            "inputs" => Self::Inputs,
            "outputs" => Self::Outputs,
            other => other.parse::<u32>().map(Self::Index).unwrap_or(Self::Off),
        }
    }
}

/// Filter applied to address and xpub history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFilter {
    /// Inclusive lower block height, `0` meaning open.
    pub from_height: u32,
    /// Inclusive upper block height, `0` meaning open.
    pub to_height: u32,
    pub contract: String,
    pub vout: VoutFilter,
    pub tokens_to_return: TokensToReturn,
}

/// Reference to a transaction handed to the chain backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxStub {
    pub txid: String,
}

// =============================================================================
// CHAIN FAMILY
// =============================================================================

/// Chain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainType {
    Utxo,
    Account,
}

/// Feature set of a chain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities {
    pub supports_v1: bool,
    pub supports_xpub: bool,
    pub supports_gas: bool,
    pub supports_tokens: bool,
}

impl Capabilities {
    pub fn for_chain(chain: ChainType) -> Self {
        match chain {
            ChainType::Utxo => Self {
                supports_v1: true,
                supports_xpub: true,
                supports_gas: false,
                supports_tokens: false,
            },
            ChainType::Account => Self {
                supports_v1: false,
                supports_xpub: false,
                supports_gas: true,
                supports_tokens: true,
            },
        }
    }
}

// =============================================================================
// PORTS
// =============================================================================

/// Read access to the indexed chain.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn get_system_info(&self, short: bool) -> ApiResult<SystemInfo>;

    async fn get_transaction(&self, txid: &str, spending: bool, specific: bool) -> ApiResult<Tx>;

    async fn get_transaction_specific(&self, txid: &str) -> ApiResult<serde_json::Value>;

    async fn get_address(
        &self,
        address: &str,
        page: u32,
        page_size: u32,
        details: AccountDetails,
        filter: &AddressFilter,
    ) -> ApiResult<AddressView>;

    /// Fails with an `UnsupportedFeature` error on chains without xpub
    /// support, and with a public error when `xpub` is not a descriptor.
    async fn get_xpub_address(
        &self,
        xpub: &str,
        page: u32,
        page_size: u32,
        details: AccountDetails,
        filter: &AddressFilter,
        gap: u32,
    ) -> ApiResult<AddressView>;

    async fn get_address_utxo(&self, address: &str, only_confirmed: bool) -> ApiResult<Vec<Utxo>>;

    async fn get_xpub_utxo(&self, xpub: &str, only_confirmed: bool, gap: u32)
        -> ApiResult<Vec<Utxo>>;

    async fn get_balance_history(
        &self,
        address: &str,
        from: i64,
        to: i64,
        currencies: &[String],
        group_by: u32,
    ) -> ApiResult<Vec<BalanceHistory>>;

    async fn get_xpub_balance_history(
        &self,
        xpub: &str,
        from: i64,
        to: i64,
        currencies: &[String],
        gap: u32,
        group_by: u32,
    ) -> ApiResult<Vec<BalanceHistory>>;

    async fn get_block(&self, id: &str, page: u32, page_size: u32) -> ApiResult<Block>;

    async fn get_block_raw(&self, id: &str) -> ApiResult<BlockRaw>;

    async fn get_blocks(&self, page: u32, page_size: u32) -> ApiResult<Blocks>;

    async fn get_mempool(&self, page: u32, page_size: u32) -> ApiResult<MempoolTxids>;

    /// Txid spending output `vout` of `txid`, or an empty string when unspent.
    async fn get_spending_txid(&self, txid: &str, vout: u32) -> ApiResult<String>;

    async fn get_fee_stats(&self, block_id: &str) -> ApiResult<FeeStats>;

    /// Confirmed txids of `address` between block heights `lower..=higher`,
    /// newest first.
    async fn get_address_txids(&self, address: &str, lower: u32, higher: u32)
        -> ApiResult<Vec<String>>;

    async fn get_fiat_rates_tickers_list(&self, timestamp: i64, token: &str)
        -> ApiResult<TickersList>;

    async fn get_fiat_rates_for_block_id(
        &self,
        block_id: &str,
        currencies: &[String],
        token: &str,
    ) -> ApiResult<Ticker>;

    async fn get_fiat_rates_for_timestamps(
        &self,
        timestamps: &[i64],
        currencies: &[String],
        token: &str,
    ) -> ApiResult<Tickers>;

    async fn get_current_fiat_rates(&self, currencies: &[String], token: &str)
        -> ApiResult<Ticker>;

    /// Enrich a mempool announcement into the canonical transaction view.
    async fn get_transaction_from_mempool_tx(&self, tx: &MempoolTx) -> ApiResult<Tx>;
}

/// The chain node RPC.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Broadcast a raw transaction; returns its txid.
    async fn send_raw_transaction(&self, hex: &str) -> ApiResult<String>;

    /// Fee per kilobyte in base units.
    async fn estimate_smart_fee(&self, blocks: u32, conservative: bool) -> ApiResult<Amount>;

    async fn estimate_fee(&self, blocks: u32) -> ApiResult<Amount>;

    async fn get_transaction_specific(&self, tx: &TxStub) -> ApiResult<serde_json::Value>;

    async fn get_block_header(&self, hash: &str) -> ApiResult<BlockHeader>;

    async fn get_block_hash(&self, height: u32) -> ApiResult<String>;

    async fn get_best_block_hash(&self) -> ApiResult<String>;

    async fn get_mempool_entry(&self, txid: &str) -> ApiResult<MempoolEntry>;

    /// Account chains only.
    async fn ethereum_type_estimate_gas(
        &self,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> ApiResult<u64>;

    fn is_testnet(&self) -> bool;
}

/// Unconfirmed transaction pool.
#[async_trait]
pub trait Mempool: Send + Sync {
    fn size(&self) -> u32;

    /// Txids in the pool touching `address`.
    async fn get_transactions(&self, address: &str) -> ApiResult<Vec<String>>;
}

/// The chain parser.
pub trait AddressCodec: Send + Sync {
    /// Fails with a public error for an invalid address.
    fn addr_desc_from_address(&self, address: &str) -> ApiResult<AddressDescriptor>;

    /// Addresses encoded by `desc`, and whether they are searchable.
    fn addresses_from_addr_desc(&self, desc: &AddressDescriptor) -> ApiResult<(Vec<String>, bool)>;

    fn addr_desc_from_vout(&self, vout: &MempoolVout) -> ApiResult<AddressDescriptor>;

    fn amount_decimals(&self) -> u32;

    fn chain_type(&self) -> ChainType;

    fn capabilities(&self) -> Capabilities {
        Capabilities::for_chain(self.chain_type())
    }

    fn amount_to_decimal_string(&self, amount: &Amount) -> String {
        amount.to_decimal_string(self.amount_decimals())
    }
}

/// Read-only view of the fiat-rate store.
pub trait RatesStore: Send + Sync {
    /// Most recent ticker, if any has been downloaded yet.
    fn current_ticker(&self) -> Option<RatesTicker>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vout_filter_from_param() {
        assert_eq!(VoutFilter::from_param("inputs"), VoutFilter::Inputs);
        assert_eq!(VoutFilter::from_param("outputs"), VoutFilter::Outputs);
        assert_eq!(VoutFilter::from_param("3"), VoutFilter::Index(3));
        assert_eq!(VoutFilter::from_param("-1"), VoutFilter::Off);
        assert_eq!(VoutFilter::from_param("bogus"), VoutFilter::Off);
    }

    #[test]
    fn test_details_from_param() {
        assert_eq!(AccountDetails::from_param("txs"), AccountDetails::Txs);
        assert_eq!(
            AccountDetails::from_param("tokenBalances"),
            AccountDetails::TokenBalances
        );
        assert_eq!(AccountDetails::from_param(""), AccountDetails::Basic);
        assert_eq!(TokensToReturn::from_param("nonzero"), TokensToReturn::Nonzero);
        assert_eq!(TokensToReturn::from_param("x"), TokensToReturn::Derived);
    }

    #[test]
    fn test_capabilities_per_chain() {
        assert!(Capabilities::for_chain(ChainType::Utxo).supports_v1);
        assert!(!Capabilities::for_chain(ChainType::Account).supports_v1);
        assert!(Capabilities::for_chain(ChainType::Account).supports_gas);
    }
}
