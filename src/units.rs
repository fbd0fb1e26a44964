//! Wei/gwei/ETH and token-unit formatting plus hex key helpers.

use crate::error::PairError;
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;

pub const WEI_PER_GWEI: u128 = 1_000_000_000;
pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

pub fn gwei_to_wei(gwei: u64) -> U256 {
    U256::from(gwei as u128 * WEI_PER_GWEI)
}

/// Format a wei amount as ETH with six fractional digits.
pub fn fmt_eth(wei: U256) -> String {
    fmt_scaled(wei, 18, 6)
}

/// Format a wei amount as gwei with two fractional digits.
pub fn fmt_gwei(wei: U256) -> String {
    fmt_scaled(wei, 9, 2)
}

fn fmt_scaled(value: U256, decimals: u32, frac_digits: u32) -> String {
    let base = U256::from(10u64).pow(U256::from(decimals));
    let int_part = value / base;
    let rem = value % base;
    let scale = U256::from(10u64).pow(U256::from(frac_digits));
    let frac = rem * scale / base;
    let mut frac_str = frac.to_string();
    while (frac_str.len() as u32) < frac_digits {
        frac_str.insert(0, '0');
    }
    format!("{int_part}.{frac_str}")
}

/// Format a base-unit token amount using the token's decimals, trimming
/// trailing zeros the way ledgers expect.
pub fn fmt_token_units(value: U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let base = U256::from(10u64).pow(U256::from(decimals as u32));
    let int_part = value / base;
    let rem = value % base;
    if rem.is_zero() {
        return int_part.to_string();
    }
    let mut frac = rem.to_string();
    while (frac.len() as u32) < decimals as u32 {
        frac.insert(0, '0');
    }
    let trimmed = frac.trim_end_matches('0');
    if trimmed.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{trimmed}")
    }
}

/// Parse a human token amount ("1.5") into base units for the given decimals.
pub fn token_units_from_str(amount: &str, decimals: u8) -> Option<U256> {
    let amount = amount.trim();
    if amount.is_empty() {
        return None;
    }
    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };
    if frac_part.len() > decimals as usize {
        return None;
    }
    let mut digits = String::with_capacity(int_part.len() + decimals as usize);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    for _ in frac_part.len()..decimals as usize {
        digits.push('0');
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).ok()
}

/// Parse a hex-encoded secp256k1 private key, with or without `0x`.
pub fn parse_private_key(raw: &str) -> Result<PrivateKeySigner, PairError> {
    let trimmed = raw.trim().trim_start_matches("0x");
    if trimmed.is_empty() {
        return Err(PairError::BadPrivateKey);
    }
    trimmed
        .parse::<PrivateKeySigner>()
        .map_err(|_| PairError::BadPrivateKey)
}

/// Derive the EOA address controlled by a hex private key.
pub fn address_from_private_key(raw: &str) -> Result<Address, PairError> {
    Ok(parse_private_key(raw)?.address())
}

/// Mask a secret for logs: first 6 and last 4 characters.
pub fn mask_hex(secret: &str) -> String {
    let s = secret.trim();
    if s.len() <= 10 {
        return "***".to_string();
    }
    format!("{}…{}", &s[..6], &s[s.len() - 4..])
}

/// Parse a decimal or `0x`-prefixed chain id.
pub fn parse_chain_id(raw: &str) -> Option<u64> {
    let s = raw.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<u64>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_eth_and_gwei() {
        let one_eth = U256::from(WEI_PER_ETH);
        assert_eq!(fmt_eth(one_eth), "1.000000");
        assert_eq!(fmt_gwei(U256::from(WEI_PER_GWEI)), "1.00");
        assert_eq!(fmt_eth(U256::from(WEI_PER_ETH / 2)), "0.500000");
        assert_eq!(fmt_gwei(U256::from(2_500_000_000u64)), "2.50");
    }

    #[test]
    fn test_token_units_round_trip() {
        let v = token_units_from_str("1.5", 18).unwrap();
        assert_eq!(v, U256::from(1_500_000_000_000_000_000u128));
        assert_eq!(fmt_token_units(v, 18), "1.5");

        assert_eq!(token_units_from_str("0", 6).unwrap(), U256::ZERO);
        assert_eq!(fmt_token_units(U256::ZERO, 6), "0");
        // too many fractional digits for the token
        assert!(token_units_from_str("0.1234567", 6).is_none());
        assert!(token_units_from_str("", 18).is_none());
    }

    #[test]
    fn test_fmt_token_units_small_fraction() {
        assert_eq!(fmt_token_units(U256::from(1u64), 6), "0.000001");
        assert_eq!(fmt_token_units(U256::from(1_000_000u64), 6), "1");
    }

    #[test]
    fn test_parse_private_key_and_address() {
        // well-known test vector key
        let pk = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
        let signer = parse_private_key(pk).unwrap();
        let addr = address_from_private_key(pk).unwrap();
        assert_eq!(signer.address(), addr);
        assert!(parse_private_key("").is_err());
        assert!(parse_private_key("0x").is_err());
        assert!(parse_private_key("nothex").is_err());
    }

    #[test]
    fn test_mask_hex() {
        assert_eq!(mask_hex("short"), "***");
        let masked = mask_hex("0xdeadbeefdeadbeefdeadbeef");
        assert!(masked.starts_with("0xdead"));
        assert!(masked.ends_with("beef"));
        assert!(masked.contains('…'));
    }

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(parse_chain_id("1"), Some(1));
        assert_eq!(parse_chain_id("0x1"), Some(1));
        assert_eq!(parse_chain_id("0x2105"), Some(8453));
        assert_eq!(parse_chain_id("mainnet"), None);
    }
}
