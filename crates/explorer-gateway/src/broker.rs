//! Event broker.
//!
//! The indexer calls in here, possibly from several tasks at once. Each
//! event is matched against a snapshot of the subscription registry and
//! turned into at most one frame per subscribing connection. Sends never
//! wait; a subscriber with a full outbox is closed by `Connection::data_out`.

use crate::connection::Outgoing;
use crate::domain::{Transport, WsResponse};
use crate::state::Backends;
use crate::subscriptions::{Subscriber, SubscriptionRegistry, ALL_CURRENCIES};
use explorer_types::{AddressCodec, AddressDescriptor, MempoolTx, RatesTicker};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Socket.IO room and event of new blocks
pub const SIO_HASHBLOCK: &str = "bitcoind/hashblock";
/// Socket.IO event of mempool transactions touching a watched address
pub const SIO_ADDRESSTXID: &str = "bitcoind/addresstxid";

pub struct EventBroker {
    backends: Backends,
    registry: Arc<SubscriptionRegistry>,
    subscribe_new_tx: bool,
}

impl EventBroker {
    pub fn new(backends: Backends, registry: Arc<SubscriptionRegistry>, subscribe_new_tx: bool) -> Self {
        Self {
            backends,
            registry,
            subscribe_new_tx,
        }
    }

    /// A block was connected to the best chain.
    pub fn on_new_block(&self, hash: &str, height: u32) {
        let subs = self.registry.new_block_subscribers();
        for sub in subs.iter() {
            let frame = match sub.conn.transport() {
                Transport::SocketIo => Outgoing::Event {
                    name: SIO_HASHBLOCK.to_string(),
                    data: Value::String(hash.to_string()),
                },
                _ => Outgoing::Response(WsResponse {
                    id: sub.id.clone(),
                    data: json!({ "height": height, "hash": hash }),
                }),
            };
            sub.conn.data_out(frame);
        }
        debug!(height, hash, subscribers = subs.len(), "Broadcast new block");
    }

    /// A transaction entered the mempool.
    ///
    /// Matching happens on the caller's task. Enrichment and fan-out run on
    /// a spawned task, so the caller never waits on the account service.
    /// Returns the handle of that task, or `None` when nobody is interested.
    /// Must be called from within the Tokio runtime.
    pub fn on_new_tx(&self, tx: &MempoolTx) -> Option<JoinHandle<()>> {
        let descriptors = self.touched_descriptors(tx);
        let matched = self.registry.address_subscribers(&descriptors);
        let new_tx_subs = if self.subscribe_new_tx {
            self.registry.new_tx_subscribers()
        } else {
            Vec::new()
        };
        if matched.is_empty() && new_tx_subs.is_empty() {
            return None;
        }
        let backends = self.backends.clone();
        let tx = tx.clone();
        Some(tokio::spawn(async move {
            broadcast_tx(backends, tx, matched, new_tx_subs).await
        }))
    }

    /// A fresh fiat-rate ticker was downloaded.
    pub fn on_new_rates_ticker(&self, ticker: &RatesTicker) {
        for (currency, subs) in self.registry.fiat_subscribers() {
            let rates: BTreeMap<String, f32> = if currency == ALL_CURRENCIES {
                ticker.rates.clone()
            } else {
                match ticker.rates.get(&currency) {
                    Some(rate) => BTreeMap::from([(currency.clone(), *rate)]),
                    None => continue,
                }
            };
            for sub in subs.iter() {
                let mut data = Map::new();
                data.insert("rates".into(), json!(rates));
                // token rates are per currency; ALL subscribers get none
                if currency != ALL_CURRENCIES {
                    let token_rates: BTreeMap<&str, f32> = sub
                        .tokens
                        .iter()
                        .map(|t| (t.as_str(), ticker.token_rate_in_currency(t, &currency)))
                        .filter(|(_, rate)| *rate > 0.0)
                        .collect();
                    if !token_rates.is_empty() {
                        data.insert("tokenRates".into(), json!(token_rates));
                    }
                }
                sub.conn.data_out(Outgoing::Response(WsResponse {
                    id: sub.id.clone(),
                    data: Value::Object(data),
                }));
            }
        }
    }

    /// Distinct descriptors of inputs, outputs and token transfer endpoints.
    fn touched_descriptors(&self, tx: &MempoolTx) -> Vec<AddressDescriptor> {
        let codec = &self.backends.codec;
        let mut out: Vec<AddressDescriptor> = Vec::new();
        let mut push = |d: AddressDescriptor| {
            if !d.is_empty() && !out.contains(&d) {
                out.push(d);
            }
        };
        for vin in tx.vin.iter() {
            if let Some(d) = vin.addr_desc.as_ref() {
                push(d.clone());
            }
        }
        for vout in tx.vout.iter() {
            match codec.addr_desc_from_vout(vout) {
                Ok(d) => push(d),
                Err(e) => debug!(txid = %tx.txid, n = vout.n, error = %e, "Output has no descriptor"),
            }
        }
        for transfer in tx.token_transfers.iter() {
            for endpoint in [&transfer.from, &transfer.to] {
                if let Ok(d) = codec.addr_desc_from_address(endpoint) {
                    push(d);
                }
            }
        }
        out
    }
}

/// Enrich once, then send one frame per matched subscriber.
async fn broadcast_tx(
    backends: Backends,
    tx: MempoolTx,
    matched: Vec<(AddressDescriptor, Vec<Subscriber>)>,
    new_tx_subs: Vec<Subscriber>,
) {
    let enriched = match backends.accounts.get_transaction_from_mempool_tx(&tx).await {
        Ok(t) => t,
        Err(e) => {
            error!(txid = %tx.txid, error = %e, "Mempool transaction enrichment failed");
            return;
        }
    };
    let tx_json = match serde_json::to_value(&enriched) {
        Ok(v) => v,
        Err(e) => {
            error!(txid = %tx.txid, error = %e, "Mempool transaction encode failed");
            return;
        }
    };

    for (desc, subs) in matched.iter() {
        send_address_tx(backends.codec.as_ref(), desc, subs, &tx.txid, &tx_json);
    }
    for sub in new_tx_subs.iter() {
        sub.conn.data_out(Outgoing::Response(WsResponse {
            id: sub.id.clone(),
            data: tx_json.clone(),
        }));
    }
    debug!(
        txid = %tx.txid,
        addresses = matched.len(),
        new_tx_subscribers = new_tx_subs.len(),
        "Broadcast mempool transaction"
    );
}

fn send_address_tx(
    codec: &dyn AddressCodec,
    desc: &AddressDescriptor,
    subs: &[Subscriber],
    txid: &str,
    tx_json: &Value,
) {
    let (addresses, searchable) = match codec.addresses_from_addr_desc(desc) {
        Ok(r) => r,
        Err(e) => {
            error!(descriptor = %desc, error = %e, "Descriptor decode failed");
            return;
        }
    };
    let [address] = addresses.as_slice() else {
        return;
    };
    for sub in subs.iter() {
        let frame = match sub.conn.transport() {
            Transport::SocketIo if searchable => Outgoing::Event {
                name: SIO_ADDRESSTXID.to_string(),
                data: json!({ "address": address, "txid": txid }),
            },
            Transport::SocketIo => continue,
            _ => Outgoing::Response(WsResponse {
                id: sub.id.clone(),
                data: json!({ "address": address, "tx": tx_json }),
            }),
        };
        sub.conn.data_out(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{next_outgoing, Connection};
    use crate::middleware::GatewayMetrics;
    use axum::http::HeaderMap;
    use explorer_types::fixtures::{FakeChain, ADDR_1, ADDR_2, ADDR_3};
    use explorer_types::AddressCodec;
    use tokio::sync::mpsc;

    struct Harness {
        chain: Arc<FakeChain>,
        registry: Arc<SubscriptionRegistry>,
        broker: EventBroker,
    }

    fn harness(subscribe_new_tx: bool) -> Harness {
        let chain = FakeChain::utxo();
        let registry = Arc::new(SubscriptionRegistry::new(Arc::new(GatewayMetrics::new().unwrap())));
        let broker = EventBroker::new(Backends::from_shared(chain.clone()), registry.clone(), subscribe_new_tx);
        Harness {
            chain,
            registry,
            broker,
        }
    }

    fn connect(h: &Harness, transport: Transport) -> (Arc<Connection>, mpsc::Receiver<Outgoing>) {
        let (c, rx) = Connection::new(h.registry.next_connection_id(), transport, None, HeaderMap::new(), 256);
        h.registry.register(&c);
        (c, rx)
    }

    fn response(frame: Outgoing) -> WsResponse {
        match frame {
            Outgoing::Response(r) => r,
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_block_frames_per_transport() {
        let h = harness(false);
        let (ws, mut ws_rx) = connect(&h, Transport::WebSocket);
        let (sio, mut sio_rx) = connect(&h, Transport::SocketIo);
        h.registry.add_new_block(&ws, "3");
        h.registry.add_new_block(&sio, "");

        h.broker.on_new_block("00ab", 7);

        let r = response(next_outgoing(&ws, &mut ws_rx).await.unwrap());
        assert_eq!(r.id, "3");
        assert_eq!(r.data, json!({"height": 7, "hash": "00ab"}));
        assert_eq!(
            next_outgoing(&sio, &mut sio_rx).await.unwrap(),
            Outgoing::Event {
                name: SIO_HASHBLOCK.into(),
                data: json!("00ab")
            }
        );
    }

    #[tokio::test]
    async fn test_new_tx_reaches_only_matching_address() {
        let h = harness(false);
        let (a, mut a_rx) = connect(&h, Transport::WebSocket);
        let (b, mut b_rx) = connect(&h, Transport::WebSocket);
        let d = |addr: &str| h.chain.addr_desc_from_address(addr).unwrap();
        h.registry.replace_addresses(&a, "15", vec![d(ADDR_2), d(ADDR_3)]);
        h.registry.replace_addresses(&b, "16", vec![d(ADDR_2)]);

        let tx = h.chain.mempool_tx_paying("aa01", ADDR_3, 5000);
        h.broker.on_new_tx(&tx);

        let r = response(next_outgoing(&a, &mut a_rx).await.unwrap());
        assert_eq!(r.id, "15");
        assert_eq!(r.data["address"], ADDR_3);
        assert_eq!(r.data["tx"]["txid"], "aa01");
        assert_eq!(r.data["tx"]["vout"][0]["value"], "5000");

        // b watches neither the output nor the spent input
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_input_descriptor_matches() {
        let h = harness(false);
        let (a, mut a_rx) = connect(&h, Transport::SocketIo);
        let desc = h.chain.addr_desc_from_address(ADDR_1).unwrap();
        h.registry.add_addresses(&a, "", vec![desc]);

        let tx = h.chain.mempool_tx_paying("aa02", ADDR_3, 100);
        h.broker.on_new_tx(&tx);

        assert_eq!(
            next_outgoing(&a, &mut a_rx).await.unwrap(),
            Outgoing::Event {
                name: SIO_ADDRESSTXID.into(),
                data: json!({"address": ADDR_1, "txid": "aa02"})
            }
        );
    }

    #[tokio::test]
    async fn test_new_tx_subscribers_get_every_tx() {
        let h = harness(true);
        let (a, mut a_rx) = connect(&h, Transport::WebSocket);
        h.registry.add_new_tx(&a, "9");
        let tx = h.chain.mempool_tx_paying("aa03", ADDR_3, 100);
        h.broker.on_new_tx(&tx);

        let r = response(next_outgoing(&a, &mut a_rx).await.unwrap());
        assert_eq!(r.id, "9");
        assert_eq!(r.data["txid"], "aa03");
    }

    #[tokio::test]
    async fn test_fiat_rates_per_currency_and_all() {
        let h = harness(false);
        let (usd, mut usd_rx) = connect(&h, Transport::WebSocket);
        let (all, mut all_rx) = connect(&h, Transport::WebSocket);
        let (czk, mut czk_rx) = connect(&h, Transport::WebSocket);
        h.registry.set_fiat_rate(&usd, "1", "usd", vec!["0xa4dd35d9".into(), "0xdead".into()]);
        h.registry.set_fiat_rate(&all, "2", "", vec![]);
        h.registry.set_fiat_rate(&czk, "3", "czk", vec![]);

        let mut ticker = RatesTicker {
            timestamp: 1,
            ..Default::default()
        };
        ticker.rates.insert("usd".into(), 2000.0);
        ticker.rates.insert("eur".into(), 1800.0);
        ticker.token_rates.insert("0xa4dd35d9".into(), 0.5);
        h.broker.on_new_rates_ticker(&ticker);

        let r = response(next_outgoing(&usd, &mut usd_rx).await.unwrap());
        assert_eq!(r.id, "1");
        assert_eq!(
            r.data,
            json!({"rates": {"usd": 2000.0}, "tokenRates": {"0xa4dd35d9": 1000.0}})
        );

        let r = response(next_outgoing(&all, &mut all_rx).await.unwrap());
        assert_eq!(r.data, json!({"rates": {"eur": 1800.0, "usd": 2000.0}}));

        // unknown currency gets nothing
        assert!(czk_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_new_tx_does_not_wait_for_enrichment() {
        let h = harness(false);
        let (a, mut a_rx) = connect(&h, Transport::WebSocket);
        let desc = h.chain.addr_desc_from_address(ADDR_3).unwrap();
        h.registry.add_addresses(&a, "1", vec![desc]);
        h.chain.hold_mempool_lookups(true);

        let tx = h.chain.mempool_tx_paying("aa04", ADDR_3, 100);
        let started = std::time::Instant::now();
        let task = h.broker.on_new_tx(&tx).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_millis(50));

        // other events still flow while the lookup is stuck
        h.registry.add_new_block(&a, "2");
        h.broker.on_new_block("00ab", 7);
        let r = response(next_outgoing(&a, &mut a_rx).await.unwrap());
        assert_eq!(r.id, "2");
        assert!(!task.is_finished());

        h.chain.hold_mempool_lookups(false);
        task.await.unwrap();
        let r = response(next_outgoing(&a, &mut a_rx).await.unwrap());
        assert_eq!(r.id, "1");
        assert_eq!(r.data["tx"]["txid"], "aa04");
    }

    #[tokio::test]
    async fn test_new_tx_without_subscribers_spawns_nothing() {
        let h = harness(true);
        let tx = h.chain.mempool_tx_paying("aa05", ADDR_3, 100);
        assert!(h.broker.on_new_tx(&tx).is_none());
    }

    #[tokio::test]
    async fn test_all_currencies_subscriber_gets_no_token_rates() {
        let h = harness(false);
        let (all, mut all_rx) = connect(&h, Transport::WebSocket);
        h.registry.set_fiat_rate(&all, "2", "", vec!["0xa4dd35d9".into()]);

        let mut ticker = RatesTicker {
            timestamp: 1,
            ..Default::default()
        };
        ticker.rates.insert("usd".into(), 2000.0);
        ticker.token_rates.insert("0xa4dd35d9".into(), 0.5);
        h.broker.on_new_rates_ticker(&ticker);

        let r = response(next_outgoing(&all, &mut all_rx).await.unwrap());
        assert_eq!(r.data, json!({"rates": {"usd": 2000.0}}));
    }

    #[tokio::test]
    async fn test_unregistered_connection_gets_nothing() {
        let h = harness(false);
        let (a, mut a_rx) = connect(&h, Transport::WebSocket);
        h.registry.add_new_block(&a, "1");
        h.registry.unregister(&a);
        h.broker.on_new_block("00ab", 7);
        assert!(a_rx.try_recv().is_err());
    }
}
