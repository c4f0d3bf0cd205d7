//! `TokenTransfer` and the arbitrary-precision math that turns
//! a raw on-chain integer into a human-scaled, USD-valued amount.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    Native,
    Fungible,
    NftUnique,
    NftMulti,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransfer {
    #[serde(rename = "type")]
    pub kind: TransferType,
    /// Empty for `NATIVE`.
    pub contract: String,
    pub from: String,
    pub to: String,
    /// Raw on-chain integer, as a decimal-digit string. Never a float.
    pub amount: String,
    pub token_id: Option<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u32>,
    pub formatted_amount: Option<String>,
    pub amount_usd: Option<String>,
    /// Where this transfer came from: `log_index` for log-sourced transfers,
    /// `trace:<call_index>` for trace-only native movements. Excluded from
    /// `dedup_key()` so it can vary between a log-sourced and a trace-only
    /// record of the same underlying movement without blocking the merge.
    #[serde(skip)]
    pub source_index: String,
}

impl TokenTransfer {
    pub fn dedup_key(&self) -> (String, String, String, String, Option<String>) {
        (
            self.contract.clone(),
            self.from.clone(),
            self.to.clone(),
            self.amount.clone(),
            self.token_id.clone(),
        )
    }
}

/// `formatted_amount = amount / 10^decimals`. Division by a power of ten is
/// exact in decimal, so this is plain digit-shifting on the BigUint's
/// decimal string rather than an approximation.
pub fn format_amount(raw: &str, decimals: u32) -> Option<String> {
    let value = BigUint::parse_bytes(raw.as_bytes(), 10)?;
    Some(divide_by_pow10(&value, decimals))
}

fn divide_by_pow10(value: &BigUint, exp: u32) -> String {
    if exp == 0 {
        return value.to_string();
    }
    let digits = value.to_string();
    let exp = exp as usize;
    let padded = if digits.len() <= exp {
        format!("{}{}", "0".repeat(exp - digits.len() + 1), digits)
    } else {
        digits
    };
    let split_at = padded.len() - exp;
    let (whole, frac) = padded.split_at(split_at);
    let whole = strip_leading_zeros(whole);
    let frac_trimmed = frac.trim_end_matches('0');
    if frac_trimmed.is_empty() {
        whole
    } else {
        format!("{whole}.{frac_trimmed}")
    }
}

fn strip_leading_zeros(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `amount_usd ~= formatted_amount * price_usd`. `formatted_amount` stays an
/// exact decimal string all the way through division by the token's decimals
/// -- only this final multiplication against the USD price narrows to `f64`.
pub fn amount_usd(formatted_amount: &str, price_usd: f64) -> Option<String> {
    let amount: f64 = formatted_amount.parse().ok()?;
    let usd = amount * price_usd;
    Some(format!("{usd:.2}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_token_amounts() {
        assert_eq!(format_amount("1000000000000000000", 18).as_deref(), Some("1"));
    }

    #[test]
    fn formats_fractional_amounts() {
        assert_eq!(
            format_amount("1500000000000000000", 18).as_deref(),
            Some("1.5")
        );
    }

    #[test]
    fn formats_small_fractional_usdc_style_amounts() {
        // USDC has 6 decimals: 1_234_567 raw -> 1.234567
        assert_eq!(format_amount("1234567", 6).as_deref(), Some("1.234567"));
    }

    #[test]
    fn zero_decimals_is_identity() {
        assert_eq!(format_amount("42", 0).as_deref(), Some("42"));
    }

    #[test]
    fn amount_usd_multiplies_and_rounds() {
        assert_eq!(amount_usd("2.5", 100.0).as_deref(), Some("250.00"));
    }

    #[test]
    fn dedup_key_ignores_source_index() {
        let t = TokenTransfer {
            kind: TransferType::Fungible,
            contract: "0xabc".into(),
            from: "0x1".into(),
            to: "0x2".into(),
            amount: "100".into(),
            token_id: None,
            symbol: None,
            name: None,
            decimals: None,
            formatted_amount: None,
            amount_usd: None,
            source_index: "log:1".into(),
        };
        let mut t2 = t.clone();
        t2.source_index = "trace:9".into();
        assert_eq!(t.dedup_key(), t2.dedup_key());
    }
}
