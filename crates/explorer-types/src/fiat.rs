//! Fiat-rate snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A timestamped snapshot of fiat rates as held by the `RatesStore`.
///
/// `rates` maps a lowercase currency code to the price of one coin.
/// `token_rates` maps a lowercase token contract to its price in coins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatesTicker {
    pub timestamp: i64,
    pub rates: BTreeMap<String, f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub token_rates: BTreeMap<String, f32>,
}

impl RatesTicker {
    /// Price of `token` in `currency`, or `0.0` when either is unknown.
    pub fn token_rate_in_currency(&self, token: &str, currency: &str) -> f32 {
        let token_rate = match self.token_rates.get(&token.to_lowercase()) {
            Some(r) => *r,
            None => return 0.0,
        };
        match self.rates.get(currency) {
            Some(base) => base * token_rate,
            None => 0.0,
        }
    }
}

/// Fiat ticker as returned to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    pub rates: BTreeMap<String, f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tickers for a list of timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tickers {
    pub tickers: Vec<Ticker>,
}

/// Currency codes available at a timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickersList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    pub available_currencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
