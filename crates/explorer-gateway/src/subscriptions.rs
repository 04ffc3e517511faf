//! Subscription registry.
//!
//! One mutex per relation. Mutations hold the lock only while editing the
//! map; broadcasts take a shallow snapshot under the lock and send after
//! releasing it. Empty inner sets are removed eagerly.
//!
//! Inserts check the connection under the relation lock and refuse a closed
//! one. Readers close the outbox before unregistering, so a subscribe that
//! races a disconnect either lands before the cleanup or is refused.
//!
//! The registry also tracks every open connection so that a disconnect
//! or shutdown can reach all of them.

use crate::connection::Connection;
use crate::domain::Transport;
use crate::middleware::GatewayMetrics;
use explorer_types::AddressDescriptor;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Sentinel currency of subscribers that want every rate.
pub const ALL_CURRENCIES: &str = "ALL";

/// Metric labels of the relations
pub const NEW_BLOCK: &str = "subscribeNewBlock";
pub const ADDRESSES: &str = "subscribeAddresses";
pub const FIAT_RATES: &str = "subscribeFiatRates";
pub const NEW_TX: &str = "subscribeNewTransaction";

/// A connection with the subscription id its pushes are tagged with.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub conn: Arc<Connection>,
    pub id: String,
}

/// A fiat-rate subscriber and the token contracts it wants rates for.
#[derive(Debug, Clone)]
pub struct FiatSubscriber {
    pub conn: Arc<Connection>,
    pub id: String,
    pub tokens: Vec<String>,
}

/// Relation sizes, reported by `/health`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCounts {
    pub new_block: usize,
    /// Distinct subscribed descriptors
    pub addresses: usize,
    pub fiat_rates: usize,
    pub new_tx: usize,
}

type ConnId = u64;

/// Address subscriptions, indexed both ways so that removing a connection
/// only touches its own descriptors.
#[derive(Default)]
struct AddressTable {
    by_descriptor: HashMap<AddressDescriptor, HashMap<ConnId, Subscriber>>,
    by_conn: HashMap<ConnId, HashSet<AddressDescriptor>>,
}

impl AddressTable {
    fn insert(&mut self, conn: &Arc<Connection>, id: &str, descriptors: Vec<AddressDescriptor>) {
        let keys = self.by_conn.entry(conn.id()).or_default();
        for d in descriptors {
            self.by_descriptor.entry(d.clone()).or_default().insert(
                conn.id(),
                Subscriber {
                    conn: Arc::clone(conn),
                    id: id.to_string(),
                },
            );
            keys.insert(d);
        }
        if keys.is_empty() {
            self.by_conn.remove(&conn.id());
        }
    }

    fn remove_conn(&mut self, conn: ConnId) -> bool {
        let Some(keys) = self.by_conn.remove(&conn) else {
            return false;
        };
        for d in keys {
            if let Some(inner) = self.by_descriptor.get_mut(&d) {
                inner.remove(&conn);
                if inner.is_empty() {
                    self.by_descriptor.remove(&d);
                }
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.by_descriptor.len()
    }
}

/// In-memory subscription tables.
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnId, Arc<Connection>>>,
    new_block: Mutex<HashMap<ConnId, Subscriber>>,
    addresses: Mutex<AddressTable>,
    fiat_rates: Mutex<HashMap<String, HashMap<ConnId, FiatSubscriber>>>,
    new_tx: Mutex<HashMap<ConnId, Subscriber>>,
    metrics: Arc<GatewayMetrics>,
}

impl SubscriptionRegistry {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
            new_block: Mutex::new(HashMap::new()),
            addresses: Mutex::new(AddressTable::default()),
            fiat_rates: Mutex::new(HashMap::new()),
            new_tx: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Process-unique connection id; never reused.
    pub fn next_connection_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // =========================================================================
    // CONNECTIONS
    // =========================================================================

    pub fn register(&self, conn: &Arc<Connection>) {
        self.connections.lock().insert(conn.id(), Arc::clone(conn));
        self.metrics.client_connected(conn.transport());
    }

    /// Drop the connection from the connection table and every relation.
    pub fn unregister(&self, conn: &Connection) {
        let removed = self.connections.lock().remove(&conn.id()).is_some();
        self.remove_new_block(conn);
        self.remove_addresses(conn);
        self.remove_fiat_rate(conn);
        self.remove_new_tx(conn);
        if removed {
            self.metrics.client_disconnected(conn.transport());
        }
        debug!(connection_id = conn.id(), "Connection unregistered");
    }

    /// Open connections of one transport
    pub fn connection_count(&self, transport: Transport) -> usize {
        self.connections
            .lock()
            .values()
            .filter(|c| c.transport() == transport)
            .count()
    }

    /// Close every open outbox. Readers notice and unregister themselves.
    pub fn close_all(&self) {
        let conns: Vec<Arc<Connection>> = self.connections.lock().values().cloned().collect();
        for conn in conns {
            conn.close_out();
        }
    }

    // =========================================================================
    // NEW BLOCK
    // =========================================================================

    /// Returns false when the connection is already closed.
    pub fn add_new_block(&self, conn: &Arc<Connection>, id: &str) -> bool {
        let mut subs = self.new_block.lock();
        if !accepts(conn, NEW_BLOCK) {
            return false;
        }
        subs.insert(
            conn.id(),
            Subscriber {
                conn: Arc::clone(conn),
                id: id.to_string(),
            },
        );
        self.metrics.set_subscriptions(NEW_BLOCK, subs.len());
        true
    }

    pub fn remove_new_block(&self, conn: &Connection) {
        let mut subs = self.new_block.lock();
        if subs.remove(&conn.id()).is_some() {
            self.metrics.set_subscriptions(NEW_BLOCK, subs.len());
        }
    }

    pub fn new_block_subscribers(&self) -> Vec<Subscriber> {
        self.new_block.lock().values().cloned().collect()
    }

    // =========================================================================
    // ADDRESSES
    // =========================================================================

    /// Replace the connection's whole address set with `descriptors`.
    pub fn replace_addresses(&self, conn: &Arc<Connection>, id: &str, descriptors: Vec<AddressDescriptor>) -> bool {
        let mut subs = self.addresses.lock();
        if !accepts(conn, ADDRESSES) {
            return false;
        }
        subs.remove_conn(conn.id());
        subs.insert(conn, id, descriptors);
        self.metrics.set_subscriptions(ADDRESSES, subs.len());
        true
    }

    /// Add `descriptors` to what the connection already watches.
    pub fn add_addresses(&self, conn: &Arc<Connection>, id: &str, descriptors: Vec<AddressDescriptor>) -> bool {
        let mut subs = self.addresses.lock();
        if !accepts(conn, ADDRESSES) {
            return false;
        }
        subs.insert(conn, id, descriptors);
        self.metrics.set_subscriptions(ADDRESSES, subs.len());
        true
    }

    pub fn remove_addresses(&self, conn: &Connection) {
        let mut subs = self.addresses.lock();
        if subs.remove_conn(conn.id()) {
            self.metrics.set_subscriptions(ADDRESSES, subs.len());
        }
    }

    /// Subscribers of each of `descriptors` that has any.
    pub fn address_subscribers(
        &self,
        descriptors: &[AddressDescriptor],
    ) -> Vec<(AddressDescriptor, Vec<Subscriber>)> {
        let subs = self.addresses.lock();
        descriptors
            .iter()
            .filter_map(|d| {
                subs.by_descriptor
                    .get(d)
                    .map(|inner| (d.clone(), inner.values().cloned().collect()))
            })
            .collect()
    }

    // =========================================================================
    // FIAT RATES
    // =========================================================================

    /// Subscribe to one currency, replacing any previous one. An empty
    /// currency means every rate.
    pub fn set_fiat_rate(&self, conn: &Arc<Connection>, id: &str, currency: &str, tokens: Vec<String>) -> bool {
        let currency = if currency.is_empty() {
            ALL_CURRENCIES.to_string()
        } else {
            currency.to_string()
        };
        let mut subs = self.fiat_rates.lock();
        if !accepts(conn, FIAT_RATES) {
            return false;
        }
        remove_conn_from_fiat(&mut subs, conn.id());
        subs.entry(currency).or_default().insert(
            conn.id(),
            FiatSubscriber {
                conn: Arc::clone(conn),
                id: id.to_string(),
                tokens,
            },
        );
        self.metrics.set_subscriptions(FIAT_RATES, fiat_len(&subs));
        true
    }

    pub fn remove_fiat_rate(&self, conn: &Connection) {
        let mut subs = self.fiat_rates.lock();
        if remove_conn_from_fiat(&mut subs, conn.id()) {
            self.metrics.set_subscriptions(FIAT_RATES, fiat_len(&subs));
        }
    }

    /// Subscribers grouped by currency (including `ALL`).
    pub fn fiat_subscribers(&self) -> Vec<(String, Vec<FiatSubscriber>)> {
        self.fiat_rates
            .lock()
            .iter()
            .map(|(c, inner)| (c.clone(), inner.values().cloned().collect()))
            .collect()
    }

    // =========================================================================
    // NEW TRANSACTIONS
    // =========================================================================

    /// Returns false when the connection is already closed.
    pub fn add_new_tx(&self, conn: &Arc<Connection>, id: &str) -> bool {
        let mut subs = self.new_tx.lock();
        if !accepts(conn, NEW_TX) {
            return false;
        }
        subs.insert(
            conn.id(),
            Subscriber {
                conn: Arc::clone(conn),
                id: id.to_string(),
            },
        );
        self.metrics.set_subscriptions(NEW_TX, subs.len());
        true
    }

    pub fn remove_new_tx(&self, conn: &Connection) {
        let mut subs = self.new_tx.lock();
        if subs.remove(&conn.id()).is_some() {
            self.metrics.set_subscriptions(NEW_TX, subs.len());
        }
    }

    pub fn new_tx_subscribers(&self) -> Vec<Subscriber> {
        self.new_tx.lock().values().cloned().collect()
    }

    pub fn has_new_tx_subscribers(&self) -> bool {
        !self.new_tx.lock().is_empty()
    }

    pub fn counts(&self) -> SubscriptionCounts {
        SubscriptionCounts {
            new_block: self.new_block.lock().len(),
            addresses: self.addresses.lock().len(),
            fiat_rates: fiat_len(&self.fiat_rates.lock()),
            new_tx: self.new_tx.lock().len(),
        }
    }
}

/// Must be called with the relation lock held.
fn accepts(conn: &Connection, relation: &'static str) -> bool {
    let alive = conn.is_alive();
    if !alive {
        debug!(connection_id = conn.id(), relation, "Subscription refused, connection closed");
    }
    alive
}

fn remove_conn_from_fiat(subs: &mut HashMap<String, HashMap<ConnId, FiatSubscriber>>, conn: ConnId) -> bool {
    let mut removed = false;
    subs.retain(|_, inner| {
        removed |= inner.remove(&conn).is_some();
        !inner.is_empty()
    });
    removed
}

fn fiat_len(subs: &HashMap<String, HashMap<ConnId, FiatSubscriber>>) -> usize {
    subs.values().map(|inner| inner.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn registry() -> SubscriptionRegistry {
        SubscriptionRegistry::new(Arc::new(GatewayMetrics::new().unwrap()))
    }

    fn conn(registry: &SubscriptionRegistry) -> Arc<Connection> {
        let (c, _rx) = Connection::new(
            registry.next_connection_id(),
            Transport::WebSocket,
            None,
            HeaderMap::new(),
            256,
        );
        registry.register(&c);
        c
    }

    fn desc(n: u8) -> AddressDescriptor {
        AddressDescriptor(vec![1, n])
    }

    /// (descriptor, connection id, subscription id) triples visible to a
    /// broadcast touching `descriptors`.
    fn address_targets(r: &SubscriptionRegistry, descriptors: &[AddressDescriptor]) -> BTreeSet<(Vec<u8>, u64, String)> {
        r.address_subscribers(descriptors)
            .into_iter()
            .flat_map(|(d, subs)| {
                subs.into_iter()
                    .map(move |s| (d.0.clone(), s.conn.id(), s.id))
            })
            .collect()
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let r = registry();
        let a = r.next_connection_id();
        let b = r.next_connection_id();
        assert!(b > a);
    }

    #[test]
    fn test_replace_addresses() {
        let r = registry();
        let c = conn(&r);
        r.replace_addresses(&c, "1", vec![desc(1), desc(2)]);
        r.replace_addresses(&c, "2", vec![desc(2), desc(3)]);

        let targets = address_targets(&r, &[desc(1), desc(2), desc(3)]);
        assert_eq!(
            targets,
            BTreeSet::from([
                (desc(2).0, c.id(), "2".to_string()),
                (desc(3).0, c.id(), "2".to_string()),
            ])
        );
        // empty inner sets are gone
        assert_eq!(r.counts().addresses, 2);
    }

    #[test]
    fn test_add_addresses_is_cumulative() {
        let r = registry();
        let c = conn(&r);
        r.add_addresses(&c, "", vec![desc(1)]);
        r.add_addresses(&c, "", vec![desc(2)]);
        assert_eq!(address_targets(&r, &[desc(1), desc(2)]).len(), 2);
    }

    #[test]
    fn test_fiat_rate_replaces_and_canonicalizes() {
        let r = registry();
        let c = conn(&r);
        r.set_fiat_rate(&c, "1", "usd", vec![]);
        r.set_fiat_rate(&c, "2", "", vec!["0xabc".into()]);
        let subs = r.fiat_subscribers();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].0, ALL_CURRENCIES);
        assert_eq!(subs[0].1[0].id, "2");
        assert_eq!(subs[0].1[0].tokens, vec!["0xabc".to_string()]);
    }

    #[test]
    fn test_unregister_releases_everything() {
        let r = registry();
        let c = conn(&r);
        r.add_new_block(&c, "a");
        r.replace_addresses(&c, "b", vec![desc(1)]);
        r.set_fiat_rate(&c, "c", "eur", vec![]);
        r.add_new_tx(&c, "d");
        assert_eq!(r.connection_count(Transport::WebSocket), 1);

        r.unregister(&c);
        assert_eq!(r.counts(), SubscriptionCounts::default());
        assert_eq!(r.connection_count(Transport::WebSocket), 0);
        assert_eq!(Arc::strong_count(&c), 1);
    }

    #[test]
    fn test_closed_connection_cannot_subscribe() {
        let r = registry();
        let c = conn(&r);
        c.close_out();
        r.unregister(&c);

        assert!(!r.add_new_block(&c, "1"));
        assert!(!r.replace_addresses(&c, "2", vec![desc(1)]));
        assert!(!r.add_addresses(&c, "3", vec![desc(2)]));
        assert!(!r.set_fiat_rate(&c, "4", "usd", vec![]));
        assert!(!r.add_new_tx(&c, "5"));

        assert_eq!(r.counts(), SubscriptionCounts::default());
        assert_eq!(Arc::strong_count(&c), 1);
    }

    #[test]
    fn test_address_removal_keeps_other_connections() {
        let r = registry();
        let a = conn(&r);
        let b = conn(&r);
        r.replace_addresses(&a, "a", vec![desc(1), desc(2)]);
        r.replace_addresses(&b, "b", vec![desc(2), desc(3)]);

        r.remove_addresses(&a);
        assert_eq!(
            address_targets(&r, &[desc(1), desc(2), desc(3)]),
            BTreeSet::from([
                (desc(2).0, b.id(), "b".to_string()),
                (desc(3).0, b.id(), "b".to_string()),
            ])
        );
        assert!(!r.addresses.lock().by_conn.contains_key(&a.id()));

        r.replace_addresses(&b, "b", vec![]);
        assert_eq!(r.counts().addresses, 0);
        assert!(r.addresses.lock().by_conn.is_empty());
    }

    #[test]
    fn test_close_all() {
        let r = registry();
        let a = conn(&r);
        let b = conn(&r);
        r.close_all();
        assert!(!a.is_alive());
        assert!(!b.is_alive());
    }

    #[derive(Debug, Clone)]
    enum Op {
        NewBlock(usize),
        UnNewBlock(usize),
        Addresses(usize, Vec<u8>),
        UnAddresses(usize),
        Fiat(usize, bool),
        UnFiat(usize),
        Disconnect(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize).prop_map(Op::NewBlock),
            (0..4usize).prop_map(Op::UnNewBlock),
            (0..4usize, prop::collection::vec(0..6u8, 0..4)).prop_map(|(c, d)| Op::Addresses(c, d)),
            (0..4usize).prop_map(Op::UnAddresses),
            (0..4usize, any::<bool>()).prop_map(|(c, all)| Op::Fiat(c, all)),
            (0..4usize).prop_map(Op::UnFiat),
            (0..4usize).prop_map(Op::Disconnect),
        ]
    }

    proptest! {
        /// After the last op touching a relation for a connection was an
        /// unsubscribe or a disconnect, no snapshot contains it. Subscribes
        /// after a disconnect are refused.
        #[test]
        fn prop_unsubscribe_and_disconnect_release(ops in prop::collection::vec(op(), 1..40)) {
            let r = registry();
            let conns: Vec<Arc<Connection>> = (0..4).map(|_| conn(&r)).collect();
            let mut new_block = [false; 4];
            let mut addresses = [false; 4];
            let mut fiat = [false; 4];
            let mut gone = [false; 4];

            for op in ops {
                match op {
                    Op::NewBlock(c) => { new_block[c] = r.add_new_block(&conns[c], "n"); prop_assert_eq!(new_block[c], !gone[c]); }
                    Op::UnNewBlock(c) => { r.remove_new_block(&conns[c]); new_block[c] = false; }
                    Op::Addresses(c, d) => {
                        let non_empty = !d.is_empty();
                        if r.replace_addresses(&conns[c], "a", d.into_iter().map(desc).collect()) {
                            addresses[c] = non_empty;
                        }
                    }
                    Op::UnAddresses(c) => { r.remove_addresses(&conns[c]); addresses[c] = false; }
                    Op::Fiat(c, all) => {
                        fiat[c] = r.set_fiat_rate(&conns[c], "f", if all { "" } else { "usd" }, vec![]);
                    }
                    Op::UnFiat(c) => { r.remove_fiat_rate(&conns[c]); fiat[c] = false; }
                    Op::Disconnect(c) => {
                        conns[c].close_out();
                        r.unregister(&conns[c]);
                        gone[c] = true;
                        new_block[c] = false;
                        addresses[c] = false;
                        fiat[c] = false;
                    }
                }
            }

            let all_desc: Vec<AddressDescriptor> = (0..6u8).map(desc).collect();
            for (c, conn) in conns.iter().enumerate() {
                let in_new_block = r.new_block_subscribers().iter().any(|s| s.conn.id() == conn.id());
                prop_assert_eq!(in_new_block, new_block[c]);
                let in_addresses = address_targets(&r, &all_desc).iter().any(|t| t.1 == conn.id());
                prop_assert_eq!(in_addresses, addresses[c]);
                let in_fiat = r
                    .fiat_subscribers()
                    .iter()
                    .any(|(_, subs)| subs.iter().any(|s| s.conn.id() == conn.id()));
                prop_assert_eq!(in_fiat, fiat[c]);
            }
        }

        /// Replacing S1 by S2 looks exactly like subscribing S2 directly.
        #[test]
        fn prop_replace_addresses_forgets_previous_set(
            s1 in prop::collection::vec(0..8u8, 0..6),
            s2 in prop::collection::vec(0..8u8, 0..6),
        ) {
            let all_desc: Vec<AddressDescriptor> = (0..8u8).map(desc).collect();

            let replaced = registry();
            let c = conn(&replaced);
            replaced.replace_addresses(&c, "x", s1.iter().copied().map(desc).collect());
            replaced.replace_addresses(&c, "x", s2.iter().copied().map(desc).collect());

            let direct = registry();
            let d = conn(&direct);
            direct.replace_addresses(&d, "x", s2.iter().copied().map(desc).collect());

            let strip = |set: BTreeSet<(Vec<u8>, u64, String)>| -> BTreeSet<(Vec<u8>, String)> {
                set.into_iter().map(|(d, _, id)| (d, id)).collect()
            };
            prop_assert_eq!(
                strip(address_targets(&replaced, &all_desc)),
                strip(address_targets(&direct, &all_desc))
            );
            prop_assert_eq!(replaced.counts(), direct.counts());
        }
    }
}
