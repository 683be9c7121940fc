//! Chain-agnostic primitives: addresses, amounts, timestamps and the
//! fixed-point unit helpers shared by the token and currency sides.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SaleError;

/// Smallest-unit amount (wei for currency, base units for tokens).
pub type Balance = u128;

/// Seconds since Unix epoch.
pub type Timestamp = u64;

/// Decimal places of both the token and the payment currency.
pub const DECIMALS: u32 = 18;

/// One whole token / currency unit in base units.
pub const UNIT: Balance = 1_000_000_000_000_000_000;

/// `n` whole units in base units.
pub const fn units(n: u128) -> Balance {
    n * UNIT
}

/// 20-byte account address, rendered as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:?}", self)
    }
}

impl FromStr for Address {
    type Err = SaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches("0x").trim_start_matches("0X");
        if hex.len() != 40 {
            return Err(SaleError::InvalidConfig(format!("address `{s}` must be 20 bytes of hex")));
        }
        let mut out = [0u8; 20];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let hi = nibble(chunk[0]);
            let lo = nibble(chunk[1]);
            match (hi, lo) {
                (Some(h), Some(l)) => out[i] = (h << 4) | l,
                _ => return Err(SaleError::InvalidConfig(format!("address `{s}` is not hex"))),
            }
        }
        Ok(Address(out))
    }
}

impl TryFrom<String> for Address {
    type Error = SaleError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(a: Address) -> String {
        a.to_string()
    }
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Parse a decimal amount such as `"2000"` or `"0.1"` into base units.
/// At most [`DECIMALS`] fractional digits are accepted.
pub fn parse_units(s: &str) -> Result<Balance, SaleError> {
    let s = s.trim().replace('_', "");
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(SaleError::InvalidConfig("empty amount".into()));
    }
    if frac.len() > DECIMALS as usize {
        return Err(SaleError::InvalidConfig(format!("amount `{s}` has more than {DECIMALS} decimals")));
    }
    let digits = |part: &str| -> Result<u128, SaleError> {
        if part.is_empty() {
            return Ok(0);
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SaleError::InvalidConfig(format!("amount `{s}` is not a decimal number")));
        }
        part.parse::<u128>().map_err(|_| SaleError::MathOverflow)
    };
    let whole = digits(whole)?;
    let scale = 10u128.pow(DECIMALS - frac.len() as u32);
    let frac = digits(frac)?.checked_mul(scale).ok_or(SaleError::MathOverflow)?;
    whole
        .checked_mul(UNIT)
        .and_then(|w| w.checked_add(frac))
        .ok_or(SaleError::MathOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_hex_roundtrip() {
        let a: Address = "0x00000000000000000000000000000000000000aB".parse().unwrap();
        assert_eq!(a.0[19], 0xab);
        assert_eq!(a.to_string(), "0x00000000000000000000000000000000000000ab");
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz00000000000000000000000000000000000000".parse::<Address>().is_err());
    }

    #[test]
    fn parses_decimal_amounts() {
        assert_eq!(parse_units("2000").unwrap(), units(2000));
        assert_eq!(parse_units("0.1").unwrap(), UNIT / 10);
        assert_eq!(parse_units("7_500_000").unwrap(), units(7_500_000));
        assert_eq!(parse_units(".5").unwrap(), UNIT / 2);
        assert_eq!(parse_units("0.000000000000000001").unwrap(), 1);
        assert!(parse_units("0.0000000000000000001").is_err());
        assert!(parse_units("1e5").is_err());
        assert!(parse_units("").is_err());
    }
}
