//! Query-parameter decoding shared by every REST endpoint.

use explorer_types::{AccountDetails, AddressFilter, ApiError, ApiResult, TokensToReturn, VoutFilter};
use std::collections::HashMap;

/// Decoded query string. Later duplicates win.
#[derive(Debug, Clone, Default)]
pub struct QueryParams(HashMap<String, String>);

impl From<HashMap<String, String>> for QueryParams {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl QueryParams {
    /// Value of `name`, empty when absent.
    pub fn get(&self, name: &str) -> &str {
        self.0.get(name).map(String::as_str).unwrap_or_default()
    }

    /// `page`, 1 when missing or not a number.
    pub fn page(&self) -> u32 {
        self.get("page").parse::<u32>().ok().filter(|p| *p > 0).unwrap_or(1)
    }

    /// `pageSize` capped at `max`; missing, zero or invalid means `max`.
    pub fn page_size(&self, max: u32) -> u32 {
        match self.get("pageSize").parse::<u32>() {
            Ok(n) if n > 0 && n <= max => n,
            _ => max,
        }
    }

    /// Optional boolean; a present but unparsable value is a public error
    /// naming the parameter.
    pub fn bool_or(&self, name: &str, default: bool) -> ApiResult<bool> {
        let raw = self.get(name);
        if raw.is_empty() {
            return Ok(default);
        }
        parse_bool(raw).ok_or_else(|| {
            ApiError::public(format!("Parameter '{}' cannot be converted to boolean", name))
        })
    }

    /// Non-negative integer, 0 when missing or invalid.
    pub fn u32_or_zero(&self, name: &str) -> u32 {
        self.get(name).parse().unwrap_or(0)
    }

    pub fn details(&self, default: AccountDetails) -> AccountDetails {
        match self.get("details") {
            "" => default,
            other => AccountDetails::from_param(other),
        }
    }

    /// `from`, `to`, `filter`, `contract` and `tokens` as an address filter.
    pub fn address_filter(&self) -> AddressFilter {
        AddressFilter {
            from_height: self.u32_or_zero("from"),
            to_height: self.u32_or_zero("to"),
            contract: self.get("contract").to_string(),
            vout: VoutFilter::from_param(self.get("filter")),
            tokens_to_return: TokensToReturn::from_param(self.get("tokens")),
        }
    }

    /// Lowercased comma-separated list; empty when absent.
    pub fn list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Boolean literals accepted in query strings.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>()
            .into()
    }

    #[test]
    fn test_page_defaults() {
        assert_eq!(q(&[]).page(), 1);
        assert_eq!(q(&[("page", "x")]).page(), 1);
        assert_eq!(q(&[("page", "0")]).page(), 1);
        assert_eq!(q(&[("page", "7")]).page(), 7);
    }

    #[test]
    fn test_page_size_is_capped() {
        assert_eq!(q(&[]).page_size(1000), 1000);
        assert_eq!(q(&[("pageSize", "10")]).page_size(1000), 10);
        assert_eq!(q(&[("pageSize", "5000")]).page_size(1000), 1000);
        assert_eq!(q(&[("pageSize", "0")]).page_size(1000), 1000);
        assert_eq!(q(&[("pageSize", "-3")]).page_size(1000), 1000);
    }

    #[test]
    fn test_bool_params() {
        assert!(q(&[("confirmed", "True")]).bool_or("confirmed", false).unwrap());
        assert!(!q(&[]).bool_or("confirmed", false).unwrap());
        assert!(q(&[]).bool_or("conservative", true).unwrap());
        let err = q(&[("confirmed", "yes")]).bool_or("confirmed", false).unwrap_err();
        assert_eq!(err.message, "Parameter 'confirmed' cannot be converted to boolean");
        assert!(err.is_public());
    }

    #[test]
    fn test_address_filter() {
        let f = q(&[("from", "10"), ("to", "x"), ("filter", "outputs"), ("tokens", "used")])
            .address_filter();
        assert_eq!(f.from_height, 10);
        assert_eq!(f.to_height, 0);
        assert_eq!(f.vout, VoutFilter::Outputs);
        assert_eq!(f.tokens_to_return, TokensToReturn::Used);
    }

    #[test]
    fn test_details_default() {
        assert_eq!(q(&[]).details(AccountDetails::Txids), AccountDetails::Txids);
        assert_eq!(q(&[("details", "txs")]).details(AccountDetails::Txids), AccountDetails::Txs);
        assert_eq!(q(&[("details", "?")]).details(AccountDetails::Txids), AccountDetails::Basic);
    }

    #[test]
    fn test_list() {
        assert_eq!(q(&[("currency", "USD, eur,,")]).list("currency"), vec!["usd", "eur"]);
        assert!(q(&[]).list("currency").is_empty());
    }
}
