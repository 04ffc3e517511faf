//! In-memory chain implementing every collaborator port.
//!
//! Seeded with two testnet blocks. Enabled with the `fixtures` feature and
//! used by the gateway's unit and integration tests.

use crate::amount::{AddressDescriptor, Amount};
use crate::entities::*;
use crate::errors::{ApiError, ApiResult};
use crate::fiat::{RatesTicker, Ticker, Tickers, TickersList};
use crate::mempool::{MempoolEntry, MempoolTx, MempoolVin, MempoolVout};
use crate::ports::*;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::poll_fn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;

pub const BLOCK_HASH_1: &str = "0000000076fbbed90fd75b0e18856aa35baa984e9c9d444cf746ad85e94e2997";
pub const BLOCK_HASH_2: &str = "00000000eb0443fd7dc4a1ed5c686a8e995057805f9a161d9a5a77a95e72b7b6";
pub const BLOCK_HEIGHT_1: u32 = 225_493;
pub const BLOCK_HEIGHT_2: u32 = 225_494;
pub const BLOCK_TIME_1: i64 = 1_521_515_026;
pub const BLOCK_TIME_2: i64 = 1_521_595_678;

pub const TXID_1: &str = "effd9ef509383d536b1c8af5bf434c8efbf521a4f2befd4022bbd68694b4ac75";
pub const TXID_2: &str = "05e2e48aeabdd9b75def7b48d756ba304713c2aba7b522bf9dbc893fc4231b07";

pub const ADDR_1: &str = "2NEVv9LJmAnY99W1pFoc5UJjVdypBqdnvu1";
pub const ADDR_2: &str = "mfcWp7DB6NuaZsExybTTXpVgWz559Np4Ti";
pub const ADDR_3: &str = "mtGXQvBowMkBpnhLckhxhbwYK44Gs9eEtz";

pub const XPUB: &str = "tpubDC8msFGeGuwnKG9Upg7DM2b4DaRqg3CUZa5g8v2SRQ6K4NSkxUgd7HsL2XVWbVm39yBA4LAxysQAm397zwQSQoQgewGiYZqrA9DsP4zbQ1M";

/// Txid returned by a successful `send_raw_transaction`.
pub const SENT_TXID: &str = "9f1ce3b1a8e0d4f7a2e1a83b9f2f5c1e7d6a4b3c2d1e0f9a8b7c6d5e4f3a2b1c";

/// Looking up this txid panics, for exercising panic isolation.
pub const PANIC_TXID: &str = "panic";

const SCRIPT_1: &str = "a914e921fc4912a315078f370d959f2c4f7b6d2a683c87";
const DESC_ADDRESS: u8 = 0x01;
const DESC_SCRIPT: u8 = 0x02;
const XPUB_PREFIXES: [&str; 6] = ["xpub", "tpub", "ypub", "upub", "zpub", "vpub"];

struct FakeBlock {
    height: u32,
    hash: String,
    time: i64,
    txids: Vec<String>,
}

struct FakeState {
    blocks: Vec<FakeBlock>,
    txs: BTreeMap<String, Tx>,
    mempool: Vec<MempoolTx>,
    sent: Vec<String>,
    ticker: Option<RatesTicker>,
}

/// A two-block chain plus a mutable mempool and rates ticker.
pub struct FakeChain {
    chain_type: ChainType,
    state: RwLock<FakeState>,
    hold_mempool: AtomicBool,
}

impl FakeChain {
    pub fn new(chain_type: ChainType) -> Self {
        let tx1 = Tx {
            txid: TXID_1.into(),
            version: 2,
            vin: vec![Vin {
                n: 0,
                coinbase: "03d56f030101".into(),
                sequence: 4_294_967_295,
                ..Default::default()
            }],
            vout: vec![
                Vout {
                    value: Some(Amount::from_u64(1234)),
                    n: 0,
                    hex: script_for(ADDR_2),
                    addresses: vec![ADDR_2.into()],
                    is_address: true,
                    ..Default::default()
                },
                Vout {
                    value: Some(Amount::from_u64(9876)),
                    n: 1,
                    spent: true,
                    spent_tx_id: TXID_2.into(),
                    spent_height: BLOCK_HEIGHT_2,
                    hex: SCRIPT_1.into(),
                    addresses: vec![ADDR_1.into()],
                    is_address: true,
                    ..Default::default()
                },
            ],
            block_hash: BLOCK_HASH_1.into(),
            block_height: BLOCK_HEIGHT_1 as i64,
            confirmations: 2,
            block_time: BLOCK_TIME_1,
            size: 136,
            vsize: 136,
            value: Amount::from_u64(11_110),
            hex: "02000000010000".into(),
            ..Default::default()
        };
        let tx2 = Tx {
            txid: TXID_2.into(),
            version: 1,
            vin: vec![Vin {
                txid: TXID_1.into(),
                vout: 1,
                sequence: 4_294_967_294,
                n: 0,
                addresses: vec![ADDR_1.into()],
                is_address: true,
                value: Some(Amount::from_u64(9876)),
                hex: "160014a4b3c2d1e0f9a8b7c6d5e4f3a2b1c0d9e8f7a6b5".into(),
                addr_desc: Some(address_desc(ADDR_1)),
                ..Default::default()
            }],
            vout: vec![Vout {
                value: Some(Amount::from_u64(9000)),
                n: 0,
                hex: SCRIPT_1.into(),
                addresses: vec![ADDR_1.into()],
                is_address: true,
                script_type: "scripthash".into(),
                ..Default::default()
            }],
            block_hash: BLOCK_HASH_2.into(),
            block_height: BLOCK_HEIGHT_2 as i64,
            confirmations: 1,
            block_time: BLOCK_TIME_2,
            size: 225,
            vsize: 144,
            value: Amount::from_u64(9000),
            value_in: Some(Amount::from_u64(9876)),
            fees: Some(Amount::from_u64(876)),
            hex: "01000000000101".into(),
            ..Default::default()
        };
        let mut txs = BTreeMap::new();
        txs.insert(TXID_1.to_string(), tx1);
        txs.insert(TXID_2.to_string(), tx2);

        let mut rates = BTreeMap::new();
        rates.insert("usd".to_string(), 7_914.5);
        rates.insert("eur".to_string(), 7_100.0);
        let mut token_rates = BTreeMap::new();
        token_rates.insert("0xa4dd35d9".to_string(), 0.002);

        Self {
            chain_type,
            hold_mempool: AtomicBool::new(false),
            state: RwLock::new(FakeState {
                blocks: vec![
                    FakeBlock {
                        height: BLOCK_HEIGHT_1,
                        hash: BLOCK_HASH_1.into(),
                        time: BLOCK_TIME_1,
                        txids: vec![TXID_1.into()],
                    },
                    FakeBlock {
                        height: BLOCK_HEIGHT_2,
                        hash: BLOCK_HASH_2.into(),
                        time: BLOCK_TIME_2,
                        txids: vec![TXID_2.into()],
                    },
                ],
                txs,
                mempool: Vec::new(),
                sent: Vec::new(),
                ticker: Some(RatesTicker {
                    timestamp: BLOCK_TIME_2,
                    rates,
                    token_rates,
                }),
            }),
        }
    }

    pub fn utxo() -> Arc<Self> {
        Arc::new(Self::new(ChainType::Utxo))
    }

    pub fn account() -> Arc<Self> {
        Arc::new(Self::new(ChainType::Account))
    }

    /// Add a transaction to the mempool.
    pub fn push_mempool_tx(&self, tx: MempoolTx) {
        self.state.write().mempool.push(tx);
    }

    pub fn set_ticker(&self, ticker: Option<RatesTicker>) {
        self.state.write().ticker = ticker;
    }

    /// While set, `get_transaction_from_mempool_tx` does not complete.
    pub fn hold_mempool_lookups(&self, hold: bool) {
        self.hold_mempool.store(hold, Ordering::SeqCst);
    }

    /// Raw transactions accepted by `send_raw_transaction`.
    pub fn sent_transactions(&self) -> Vec<String> {
        self.state.read().sent.clone()
    }

    /// A mempool transaction spending output 0 of `TXID_2` and paying
    /// `value` to `address`.
    pub fn mempool_tx_paying(&self, txid: &str, address: &str, value: u64) -> MempoolTx {
        MempoolTx {
            txid: txid.into(),
            vin: vec![MempoolVin {
                txid: TXID_2.into(),
                vout: 0,
                addr_desc: Some(address_desc(ADDR_1)),
                value: Amount::from_u64(9000),
            }],
            vout: vec![MempoolVout {
                value: Amount::from_u64(value),
                n: 0,
                script_hex: script_for(address),
                addresses: vec![address.into()],
            }],
            token_transfers: Vec::new(),
            time: BLOCK_TIME_2 + 60,
        }
    }

    fn enrich(&self, tx: &MempoolTx) -> Tx {
        let vin: Vec<Vin> = tx
            .vin
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let addresses = v
                    .addr_desc
                    .as_ref()
                    .and_then(|d| self.addresses_from_addr_desc(d).ok())
                    .map(|(a, _)| a)
                    .unwrap_or_default();
                Vin {
                    txid: v.txid.clone(),
                    vout: v.vout,
                    n: i as u32,
                    is_address: !addresses.is_empty(),
                    addresses,
                    value: Some(v.value),
                    addr_desc: v.addr_desc.clone(),
                    ..Default::default()
                }
            })
            .collect();
        let vout: Vec<Vout> = tx
            .vout
            .iter()
            .map(|v| Vout {
                value: Some(v.value),
                n: v.n,
                hex: v.script_hex.clone(),
                is_address: !v.addresses.is_empty(),
                addresses: v.addresses.clone(),
                ..Default::default()
            })
            .collect();
        let value = tx.vout.iter().fold(Amount::ZERO, |a, v| a.saturating_add(v.value));
        let value_in = tx.vin.iter().fold(Amount::ZERO, |a, v| a.saturating_add(v.value));
        Tx {
            txid: tx.txid.clone(),
            vin,
            vout,
            block_height: -1,
            confirmations: 0,
            block_time: tx.time,
            value,
            value_in: Some(value_in),
            fees: Some(value_in.saturating_sub(value)),
            ..Default::default()
        }
    }

    fn best(&self) -> (u32, String) {
        let st = self.state.read();
        st.blocks
            .last()
            .map(|b| (b.height, b.hash.clone()))
            .unwrap_or_default()
    }

    fn find_block(&self, id: &str) -> Option<usize> {
        let st = self.state.read();
        match id.parse::<u32>() {
            Ok(h) => st.blocks.iter().position(|b| b.height == h),
            Err(_) => st.blocks.iter().position(|b| b.hash == id),
        }
    }

    fn check_address(&self, address: &str) -> ApiResult<()> {
        self.addr_desc_from_address(address).map(|_| ())
    }

    fn confirmed_touching(&self, addresses: &[String], filter: &AddressFilter) -> Vec<Tx> {
        let st = self.state.read();
        let mut out: Vec<Tx> = st
            .txs
            .values()
            .filter(|tx| addresses.iter().any(|a| tx_touches(tx, a)))
            .filter(|tx| {
                let h = tx.block_height as u32;
                (filter.from_height == 0 || h >= filter.from_height)
                    && (filter.to_height == 0 || h <= filter.to_height)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.block_height.cmp(&a.block_height));
        out
    }

    fn unconfirmed_touching(&self, addresses: &[String]) -> Vec<Tx> {
        let pool = self.state.read().mempool.clone();
        pool.iter()
            .map(|m| self.enrich(m))
            .filter(|tx| addresses.iter().any(|a| tx_touches(tx, a)))
            .collect()
    }

    fn account_view(
        &self,
        label: &str,
        addresses: &[String],
        page: u32,
        page_size: u32,
        details: AccountDetails,
        filter: &AddressFilter,
    ) -> AddressView {
        let confirmed = self.confirmed_touching(addresses, filter);
        let unconfirmed = self.unconfirmed_touching(addresses);
        let (received, sent) = sums(&confirmed, addresses);
        let (u_received, u_sent) = sums(&unconfirmed, addresses);

        let mut view = AddressView {
            address: label.into(),
            balance: received.saturating_sub(sent),
            total_received: Some(received),
            total_sent: Some(sent),
            unconfirmed_balance: u_received.saturating_sub(u_sent),
            unconfirmed_txs: unconfirmed.len() as u32,
            txs: confirmed.len() as u32,
            ..Default::default()
        };
        if matches!(
            details,
            AccountDetails::Txids | AccountDetails::TxsLight | AccountDetails::Txs
        ) {
            let all: Vec<Tx> = unconfirmed.into_iter().chain(confirmed).collect();
            let (paging, from, to) = page_window(all.len(), page, page_size);
            view.paging = paging;
            let items = &all[from..to];
            if details == AccountDetails::Txids {
                view.txids = items.iter().map(|t| t.txid.clone()).collect();
            } else {
                view.transactions = items.to_vec();
            }
        }
        view
    }

    fn xpub_addresses(&self, xpub: &str) -> ApiResult<Vec<String>> {
        if self.chain_type == ChainType::Account {
            return Err(ApiError::xpub_unsupported());
        }
        if !XPUB_PREFIXES.iter().any(|p| xpub.starts_with(p)) {
            return Err(ApiError::public(format!("Invalid xpub '{}'", xpub)));
        }
        if xpub == XPUB {
            Ok(vec![ADDR_1.into(), ADDR_2.into()])
        } else {
            Ok(Vec::new())
        }
    }

    fn utxos(&self, addresses: &[String], only_confirmed: bool) -> Vec<Utxo> {
        let (best, _) = self.best();
        let st = self.state.read();
        let mut out = Vec::new();
        if !only_confirmed {
            for m in st.mempool.iter() {
                for v in m.vout.iter() {
                    if v.addresses.iter().any(|a| addresses.contains(a)) {
                        out.push(Utxo {
                            txid: m.txid.clone(),
                            vout: v.n,
                            value: v.value,
                            confirmations: 0,
                            ..Default::default()
                        });
                    }
                }
            }
        }
        for tx in st.txs.values() {
            for v in tx.vout.iter() {
                if !v.spent && v.addresses.iter().any(|a| addresses.contains(a)) {
                    let height = tx.block_height as u32;
                    out.push(Utxo {
                        txid: tx.txid.clone(),
                        vout: v.n,
                        value: v.value.unwrap_or_default(),
                        height,
                        confirmations: best.saturating_sub(height) + 1,
                        address: v.addresses.first().cloned().unwrap_or_default(),
                        ..Default::default()
                    });
                }
            }
        }
        out
    }

    fn history(&self, addresses: &[String], from: i64, to: i64, group_by: u32) -> Vec<BalanceHistory> {
        let group_by = group_by.max(1) as i64;
        let txs = self.confirmed_touching(addresses, &AddressFilter::default());
        let mut buckets: BTreeMap<i64, BalanceHistory> = BTreeMap::new();
        for tx in txs.iter().rev() {
            if (from > 0 && tx.block_time < from) || (to > 0 && tx.block_time > to) {
                continue;
            }
            let (received, sent) = sums(std::slice::from_ref(tx), addresses);
            let time = tx.block_time - tx.block_time % group_by;
            let entry = buckets.entry(time).or_insert_with(|| BalanceHistory {
                time: time as u64,
                ..Default::default()
            });
            entry.txs += 1;
            entry.received = entry.received.saturating_add(received);
            entry.sent = entry.sent.saturating_add(sent);
        }
        buckets.into_values().collect()
    }

    fn ticker_for(&self, currencies: &[String], token: &str, ts: Option<i64>) -> Ticker {
        let st = self.state.read();
        let Some(t) = st.ticker.as_ref() else {
            return Ticker {
                ts,
                rates: BTreeMap::new(),
                error: Some("No tickers available".into()),
            };
        };
        let mut rates = BTreeMap::new();
        for (c, r) in t.rates.iter() {
            if !currencies.is_empty() && !currencies.iter().any(|x| x == c) {
                continue;
            }
            let rate = if token.is_empty() {
                *r
            } else {
                t.token_rate_in_currency(token, c)
            };
            rates.insert(c.clone(), rate);
        }
        Ticker {
            ts: Some(ts.unwrap_or(t.timestamp)),
            rates,
            error: None,
        }
    }
}

fn address_desc(address: &str) -> AddressDescriptor {
    let mut d = Vec::with_capacity(address.len() + 1);
    d.push(DESC_ADDRESS);
    d.extend_from_slice(address.as_bytes());
    AddressDescriptor(d)
}

fn script_for(address: &str) -> String {
    format!("76a914{}88ac", hex::encode(&address.as_bytes()[..address.len().min(20)]))
}

fn tx_touches(tx: &Tx, address: &str) -> bool {
    tx.vin.iter().any(|v| v.addresses.iter().any(|a| a == address))
        || tx.vout.iter().any(|v| v.addresses.iter().any(|a| a == address))
}

fn sums(txs: &[Tx], addresses: &[String]) -> (Amount, Amount) {
    let mut received = Amount::ZERO;
    let mut sent = Amount::ZERO;
    for tx in txs {
        for v in tx.vout.iter() {
            if v.addresses.iter().any(|a| addresses.contains(a)) {
                received = received.saturating_add(v.value.unwrap_or_default());
            }
        }
        for v in tx.vin.iter() {
            if v.addresses.iter().any(|a| addresses.contains(a)) {
                sent = sent.saturating_add(v.value.unwrap_or_default());
            }
        }
    }
    (received, sent)
}

/// Paging for `len` items; returns the paging header and the item range.
fn page_window(len: usize, page: u32, page_size: u32) -> (Paging, usize, usize) {
    let page_size = page_size.max(1) as usize;
    let total_pages = len.div_ceil(page_size).max(1);
    let page = (page.max(1) as usize).min(total_pages);
    let from = ((page - 1) * page_size).min(len);
    let to = (from + page_size).min(len);
    (
        Paging {
            page: page as u32,
            total_pages: total_pages as u32,
            items_on_page: page_size as u32,
        },
        from,
        to,
    )
}

fn is_valid_address(chain: ChainType, s: &str) -> bool {
    match chain {
        ChainType::Utxo => {
            (26..=62).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_alphanumeric())
        }
        ChainType::Account => {
            s.len() == 42 && s.starts_with("0x") && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
        }
    }
}

#[async_trait]
impl AccountService for FakeChain {
    async fn get_system_info(&self, _short: bool) -> ApiResult<SystemInfo> {
        let (height, hash) = self.best();
        let last_time = self.state.read().blocks.last().map(|b| b.time).unwrap_or(0);
        let mempool_size = self.state.read().mempool.len() as u32;
        Ok(SystemInfo {
            blockbook: IndexerInfo {
                coin: "Testnet".into(),
                shortcut: "TEST".into(),
                host: "fakehost".into(),
                version: "0.1.0".into(),
                best_height: height,
                best_hash: hash.clone(),
                last_block_time: last_time,
                in_sync: true,
                in_sync_mempool: true,
                mempool_size,
                decimals: self.amount_decimals(),
                about: "Explorer gateway fake backend".into(),
            },
            backend: BackendInfo {
                chain: "test".into(),
                blocks: height,
                headers: height,
                best_block_hash: hash,
                version: "180000".into(),
                subversion: "/Satoshi:0.18.0/".into(),
                ..Default::default()
            },
        })
    }

    async fn get_transaction(&self, txid: &str, _spending: bool, _specific: bool) -> ApiResult<Tx> {
        if txid == PANIC_TXID {
            panic!("fake chain asked to panic");
        }
        if let Some(tx) = self.state.read().txs.get(txid) {
            return Ok(tx.clone());
        }
        let pooled = self
            .state
            .read()
            .mempool
            .iter()
            .find(|m| m.txid == txid)
            .cloned();
        match pooled {
            Some(m) => Ok(self.enrich(&m)),
            None => Err(ApiError::tx_not_found(txid)),
        }
    }

    async fn get_transaction_specific(&self, txid: &str) -> ApiResult<serde_json::Value> {
        ChainBackend::get_transaction_specific(self, &TxStub { txid: txid.into() }).await
    }

    async fn get_address(
        &self,
        address: &str,
        page: u32,
        page_size: u32,
        details: AccountDetails,
        filter: &AddressFilter,
    ) -> ApiResult<AddressView> {
        self.check_address(address)?;
        Ok(self.account_view(address, &[address.to_string()], page, page_size, details, filter))
    }

    async fn get_xpub_address(
        &self,
        xpub: &str,
        page: u32,
        page_size: u32,
        details: AccountDetails,
        filter: &AddressFilter,
        _gap: u32,
    ) -> ApiResult<AddressView> {
        let addresses = self.xpub_addresses(xpub)?;
        Ok(self.account_view(xpub, &addresses, page, page_size, details, filter))
    }

    async fn get_address_utxo(&self, address: &str, only_confirmed: bool) -> ApiResult<Vec<Utxo>> {
        self.check_address(address)?;
        Ok(self.utxos(&[address.to_string()], only_confirmed))
    }

    async fn get_xpub_utxo(&self, xpub: &str, only_confirmed: bool, _gap: u32) -> ApiResult<Vec<Utxo>> {
        let addresses = self.xpub_addresses(xpub)?;
        Ok(self.utxos(&addresses, only_confirmed))
    }

    async fn get_balance_history(
        &self,
        address: &str,
        from: i64,
        to: i64,
        _currencies: &[String],
        group_by: u32,
    ) -> ApiResult<Vec<BalanceHistory>> {
        self.check_address(address)?;
        Ok(self.history(&[address.to_string()], from, to, group_by))
    }

    async fn get_xpub_balance_history(
        &self,
        xpub: &str,
        from: i64,
        to: i64,
        _currencies: &[String],
        _gap: u32,
        group_by: u32,
    ) -> ApiResult<Vec<BalanceHistory>> {
        let addresses = self.xpub_addresses(xpub)?;
        Ok(self.history(&addresses, from, to, group_by))
    }

    async fn get_block(&self, id: &str, page: u32, page_size: u32) -> ApiResult<Block> {
        let idx = self
            .find_block(id)
            .ok_or_else(|| ApiError::public(format!("Block not found, {}", id)))?;
        let (best, _) = self.best();
        let st = self.state.read();
        let b = &st.blocks[idx];
        let txs: Vec<Tx> = b.txids.iter().filter_map(|t| st.txs.get(t).cloned()).collect();
        let (paging, from, to) = page_window(txs.len(), page, page_size);
        Ok(Block {
            paging,
            info: BlockInfo {
                hash: b.hash.clone(),
                previous_block_hash: idx
                    .checked_sub(1)
                    .map(|i| st.blocks[i].hash.clone())
                    .unwrap_or_default(),
                next_block_hash: st.blocks.get(idx + 1).map(|n| n.hash.clone()).unwrap_or_default(),
                height: b.height,
                confirmations: best - b.height + 1,
                size: 1024,
                time: b.time,
                version: 536_870_912,
                tx_count: txs.len() as u32,
                ..Default::default()
            },
            txs: txs[from..to].to_vec(),
        })
    }

    async fn get_block_raw(&self, id: &str) -> ApiResult<BlockRaw> {
        let idx = self
            .find_block(id)
            .ok_or_else(|| ApiError::public(format!("Block not found, {}", id)))?;
        let st = self.state.read();
        Ok(BlockRaw {
            hex: format!("00000020{}", st.blocks[idx].hash),
        })
    }

    async fn get_blocks(&self, page: u32, page_size: u32) -> ApiResult<Blocks> {
        let (best, _) = self.best();
        let st = self.state.read();
        let (paging, from, to) = page_window(st.blocks.len(), page, page_size);
        let blocks = st
            .blocks
            .iter()
            .rev()
            .skip(from)
            .take(to - from)
            .map(|b| BlockInfo {
                hash: b.hash.clone(),
                height: b.height,
                confirmations: best - b.height + 1,
                size: 1024,
                time: b.time,
                tx_count: b.txids.len() as u32,
                ..Default::default()
            })
            .collect();
        Ok(Blocks { paging, blocks })
    }

    async fn get_mempool(&self, page: u32, page_size: u32) -> ApiResult<MempoolTxids> {
        let st = self.state.read();
        let (paging, from, to) = page_window(st.mempool.len(), page, page_size);
        Ok(MempoolTxids {
            paging,
            mempool: st.mempool[from..to]
                .iter()
                .map(|m| MempoolTxid {
                    txid: m.txid.clone(),
                    time: m.time,
                })
                .collect(),
            mempool_size: st.mempool.len() as u32,
        })
    }

    async fn get_spending_txid(&self, txid: &str, vout: u32) -> ApiResult<String> {
        let st = self.state.read();
        if !st.txs.contains_key(txid) {
            return Err(ApiError::tx_not_found(txid));
        }
        let spending = st
            .txs
            .values()
            .find(|tx| tx.vin.iter().any(|v| v.txid == txid && v.vout == vout))
            .map(|tx| tx.txid.clone());
        Ok(spending.unwrap_or_default())
    }

    async fn get_fee_stats(&self, block_id: &str) -> ApiResult<FeeStats> {
        let block = self.get_block(block_id, 1, 1_000_000).await?;
        let total = block
            .txs
            .iter()
            .fold(Amount::ZERO, |a, t| a.saturating_add(t.fees.unwrap_or_default()));
        let tx_count = block.txs.len() as u32;
        let average = if tx_count > 0 {
            total.div_u64(tx_count as u64).as_i64_saturating()
        } else {
            0
        };
        Ok(FeeStats {
            tx_count,
            total_fees_sat: total,
            average_fee_per_kb: average,
            deciles_fee_per_kb: [average; 11],
        })
    }

    async fn get_address_txids(&self, address: &str, lower: u32, higher: u32) -> ApiResult<Vec<String>> {
        self.check_address(address)?;
        let filter = AddressFilter {
            from_height: lower,
            to_height: higher,
            ..Default::default()
        };
        Ok(self
            .confirmed_touching(&[address.to_string()], &filter)
            .into_iter()
            .map(|t| t.txid)
            .collect())
    }

    async fn get_fiat_rates_tickers_list(&self, timestamp: i64, _token: &str) -> ApiResult<TickersList> {
        let st = self.state.read();
        match st.ticker.as_ref() {
            Some(t) => Ok(TickersList {
                ts: Some(if timestamp > 0 { timestamp } else { t.timestamp }),
                available_currencies: t.rates.keys().cloned().collect(),
                error: None,
            }),
            None => Err(ApiError::public("No tickers found!")),
        }
    }

    async fn get_fiat_rates_for_block_id(
        &self,
        block_id: &str,
        currencies: &[String],
        token: &str,
    ) -> ApiResult<Ticker> {
        let block = self.get_block(block_id, 1, 1).await?;
        Ok(self.ticker_for(currencies, token, Some(block.info.time)))
    }

    async fn get_fiat_rates_for_timestamps(
        &self,
        timestamps: &[i64],
        currencies: &[String],
        token: &str,
    ) -> ApiResult<Tickers> {
        if timestamps.is_empty() {
            return Err(ApiError::public("No timestamps provided"));
        }
        Ok(Tickers {
            tickers: timestamps
                .iter()
                .map(|ts| self.ticker_for(currencies, token, Some(*ts)))
                .collect(),
        })
    }

    async fn get_current_fiat_rates(&self, currencies: &[String], token: &str) -> ApiResult<Ticker> {
        Ok(self.ticker_for(currencies, token, None))
    }

    async fn get_transaction_from_mempool_tx(&self, tx: &MempoolTx) -> ApiResult<Tx> {
        poll_fn(|cx| {
            if self.hold_mempool.load(Ordering::SeqCst) {
                cx.waker().wake_by_ref();
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await;
        Ok(self.enrich(tx))
    }
}

#[async_trait]
impl ChainBackend for FakeChain {
    async fn send_raw_transaction(&self, hex_tx: &str) -> ApiResult<String> {
        if hex_tx.is_empty() || hex::decode(hex_tx).is_err() {
            return Err(ApiError::internal("-22: TX decode failed"));
        }
        self.state.write().sent.push(hex_tx.to_string());
        Ok(SENT_TXID.into())
    }

    async fn estimate_smart_fee(&self, blocks: u32, conservative: bool) -> ApiResult<Amount> {
        if blocks == 0 || blocks > 100 {
            return Err(ApiError::internal("Insufficient data or no feerate found"));
        }
        let per_block = if conservative { 1000 } else { 900 };
        Ok(Amount::from_u64(per_block * blocks as u64))
    }

    async fn estimate_fee(&self, blocks: u32) -> ApiResult<Amount> {
        if blocks > 1008 {
            return Err(ApiError::internal("Invalid nblocks"));
        }
        Ok(Amount::from_u64(100 * blocks as u64))
    }

    async fn get_transaction_specific(&self, tx: &TxStub) -> ApiResult<serde_json::Value> {
        let st = self.state.read();
        let found = st
            .txs
            .get(&tx.txid)
            .ok_or_else(|| ApiError::tx_not_found(&tx.txid))?;
        Ok(serde_json::json!({
            "txid": found.txid,
            "hash": found.txid,
            "version": found.version,
            "size": found.size,
            "vsize": found.vsize,
            "locktime": found.lock_time,
            "hex": found.hex,
            "blockhash": found.block_hash,
            "confirmations": found.confirmations,
            "time": found.block_time,
            "blocktime": found.block_time,
        }))
    }

    async fn get_block_header(&self, hash: &str) -> ApiResult<BlockHeader> {
        let (best, _) = self.best();
        let st = self.state.read();
        let idx = st
            .blocks
            .iter()
            .position(|b| b.hash == hash)
            .ok_or_else(|| ApiError::public(format!("Block not found, {}", hash)))?;
        let b = &st.blocks[idx];
        Ok(BlockHeader {
            hash: b.hash.clone(),
            prev: idx.checked_sub(1).map(|i| st.blocks[i].hash.clone()).unwrap_or_default(),
            next: st.blocks.get(idx + 1).map(|n| n.hash.clone()).unwrap_or_default(),
            height: b.height,
            confirmations: best - b.height + 1,
            size: 1024,
            time: b.time,
        })
    }

    async fn get_block_hash(&self, height: u32) -> ApiResult<String> {
        self.state
            .read()
            .blocks
            .iter()
            .find(|b| b.height == height)
            .map(|b| b.hash.clone())
            .ok_or_else(|| ApiError::public(format!("Block not found, {}", height)))
    }

    async fn get_best_block_hash(&self) -> ApiResult<String> {
        Ok(self.best().1)
    }

    async fn get_mempool_entry(&self, txid: &str) -> ApiResult<MempoolEntry> {
        let height = self.best().0;
        let st = self.state.read();
        let m = st
            .mempool
            .iter()
            .find(|m| m.txid == txid)
            .ok_or_else(|| ApiError::public("Transaction not in mempool"))?;
        let fee = m
            .vin
            .iter()
            .fold(Amount::ZERO, |a, v| a.saturating_add(v.value))
            .saturating_sub(m.vout.iter().fold(Amount::ZERO, |a, v| a.saturating_add(v.value)));
        Ok(MempoolEntry {
            size: 225,
            fee: fee.as_i64_saturating() as f64 / 1e8,
            modifiedfee: fee.as_i64_saturating() as f64 / 1e8,
            time: m.time.max(0) as u64,
            height,
            ..Default::default()
        })
    }

    async fn ethereum_type_estimate_gas(
        &self,
        _params: &serde_json::Map<String, serde_json::Value>,
    ) -> ApiResult<u64> {
        match self.chain_type {
            ChainType::Account => Ok(21_000),
            ChainType::Utxo => Err(ApiError::unsupported("Gas estimation is not supported")),
        }
    }

    fn is_testnet(&self) -> bool {
        true
    }
}

#[async_trait]
impl Mempool for FakeChain {
    fn size(&self) -> u32 {
        self.state.read().mempool.len() as u32
    }

    async fn get_transactions(&self, address: &str) -> ApiResult<Vec<String>> {
        let target = address_desc(address);
        let st = self.state.read();
        Ok(st
            .mempool
            .iter()
            .filter(|m| {
                m.vout.iter().any(|v| v.addresses.iter().any(|a| a == address))
                    || m.vin.iter().any(|v| v.addr_desc.as_ref() == Some(&target))
            })
            .map(|m| m.txid.clone())
            .collect())
    }
}

impl AddressCodec for FakeChain {
    fn addr_desc_from_address(&self, address: &str) -> ApiResult<AddressDescriptor> {
        if is_valid_address(self.chain_type, address) {
            Ok(address_desc(address))
        } else {
            Err(ApiError::public(format!("Invalid address '{}'", address)))
        }
    }

    fn addresses_from_addr_desc(&self, desc: &AddressDescriptor) -> ApiResult<(Vec<String>, bool)> {
        match desc.as_bytes().split_first() {
            Some((&DESC_ADDRESS, rest)) => {
                let a = String::from_utf8(rest.to_vec())
                    .map_err(|e| ApiError::internal(e.to_string()))?;
                Ok((vec![a], true))
            }
            Some((&DESC_SCRIPT, _)) => Ok((Vec::new(), false)),
            _ => Err(ApiError::internal(format!("Unknown descriptor {}", desc))),
        }
    }

    fn addr_desc_from_vout(&self, vout: &MempoolVout) -> ApiResult<AddressDescriptor> {
        if let Some(a) = vout.addresses.first() {
            return self.addr_desc_from_address(a);
        }
        let script = hex::decode(&vout.script_hex).map_err(|e| ApiError::internal(e.to_string()))?;
        let mut d = Vec::with_capacity(script.len() + 1);
        d.push(DESC_SCRIPT);
        d.extend_from_slice(&script);
        Ok(AddressDescriptor(d))
    }

    fn amount_decimals(&self) -> u32 {
        match self.chain_type {
            ChainType::Utxo => 8,
            ChainType::Account => 18,
        }
    }

    fn chain_type(&self) -> ChainType {
        self.chain_type
    }
}

impl RatesStore for FakeChain {
    fn current_ticker(&self) -> Option<RatesTicker> {
        self.state.read().ticker.clone()
    }
}
