//! Base-unit amounts and address descriptors.

use primitive_types::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An amount in the chain's smallest unit (satoshi, wei, ...).
///
/// Serialized as an integer string, e.g. `"9000"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub U256);

impl Amount {
    pub const ZERO: Amount = Amount(U256::zero());

    pub fn from_u64(v: u64) -> Self {
        Amount(U256::from(v))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parse an integer string of base units.
    pub fn from_dec_str(s: &str) -> Option<Self> {
        U256::from_dec_str(s.trim()).ok().map(Amount)
    }

    /// Parse a decimal string such as `"0.00009"` given the chain decimals.
    /// Digits beyond `decimals` are rejected.
    pub fn from_decimal_str(s: &str, decimals: u32) -> Option<Self> {
        let (int, frac) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if frac.len() > decimals as usize {
            return None;
        }
        let mut digits = String::with_capacity(int.len() + decimals as usize);
        digits.push_str(int);
        digits.push_str(frac);
        for _ in frac.len()..decimals as usize {
            digits.push('0');
        }
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Self::from_dec_str(&digits)
    }

    /// Render with a decimal point `decimals` places from the right,
    /// trimming trailing fractional zeros. `9000` with 8 decimals is
    /// `"0.00009"`.
    pub fn to_decimal_string(&self, decimals: u32) -> String {
        let digits = self.0.to_string();
        let d = decimals as usize;
        if d == 0 {
            return digits;
        }
        let padded = if digits.len() <= d {
            let mut p = "0".repeat(d + 1 - digits.len());
            p.push_str(&digits);
            p
        } else {
            digits
        };
        let (int, frac) = padded.split_at(padded.len() - d);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            int.to_string()
        } else {
            format!("{}.{}", int, frac)
        }
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    pub fn saturating_mul_u64(self, v: u64) -> Amount {
        Amount(self.0.saturating_mul(U256::from(v)))
    }

    pub fn div_u64(self, v: u64) -> Amount {
        if v == 0 {
            return Amount::ZERO;
        }
        Amount(self.0 / U256::from(v))
    }

    /// Lossy conversion used by the legacy socket.io shapes, which carry
    /// satoshis as JSON integers.
    pub fn as_i64_saturating(&self) -> i64 {
        if self.0 > U256::from(i64::MAX as u64) {
            i64::MAX
        } else {
            self.0.low_u64() as i64
        }
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Amount::from_u64(v)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Str(String),
            Num(u64),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Str(s) => Amount::from_dec_str(&s)
                .ok_or_else(|| de::Error::custom(format!("invalid amount '{}'", s))),
            Repr::Num(n) => Ok(Amount::from_u64(n)),
        }
    }
}

/// Opaque binary form of an address or output script, as produced by the
/// `AddressCodec`. Two addresses are the same iff their descriptors are.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressDescriptor(pub Vec<u8>);

impl AddressDescriptor {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AddressDescriptor {
    fn from(v: Vec<u8>) -> Self {
        AddressDescriptor(v)
    }
}

impl fmt::Display for AddressDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decimal_string() {
        assert_eq!(Amount::from_u64(9000).to_decimal_string(8), "0.00009");
        assert_eq!(Amount::from_u64(9876).to_decimal_string(8), "0.00009876");
        assert_eq!(Amount::from_u64(876).to_decimal_string(8), "0.00000876");
        assert_eq!(Amount::from_u64(0).to_decimal_string(8), "0");
        assert_eq!(Amount::from_u64(100_000_000).to_decimal_string(8), "1");
        assert_eq!(Amount::from_u64(123_456_789).to_decimal_string(8), "1.23456789");
        assert_eq!(Amount::from_u64(42).to_decimal_string(0), "42");
    }

    #[test]
    fn test_serde_as_string() {
        let a = Amount::from_u64(9000);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"9000\"");
        let back: Amount = serde_json::from_str("\"9000\"").unwrap();
        assert_eq!(back, a);
        let num: Amount = serde_json::from_str("9000").unwrap();
        assert_eq!(num, a);
        assert!(serde_json::from_str::<Amount>("\"9x\"").is_err());
    }

    #[test]
    fn test_from_decimal_str() {
        assert_eq!(
            Amount::from_decimal_str("0.00009", 8),
            Some(Amount::from_u64(9000))
        );
        assert_eq!(Amount::from_decimal_str("1", 8), Some(Amount::from_u64(100_000_000)));
        assert_eq!(Amount::from_decimal_str("0.000000001", 8), None);
        assert_eq!(Amount::from_decimal_str("", 8), None);
    }

    #[test]
    fn test_descriptor_display_is_hex() {
        let d = AddressDescriptor(vec![0x00, 0x14, 0xab]);
        assert_eq!(d.to_string(), "0014ab");
    }

    proptest! {
        #[test]
        fn prop_decimal_string_parses_back(v in any::<u64>(), d in 0u32..19) {
            let a = Amount::from_u64(v);
            let s = a.to_decimal_string(d);
            prop_assert_eq!(Amount::from_decimal_str(&s, d), Some(a));
        }
    }
}
