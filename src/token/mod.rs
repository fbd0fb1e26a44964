//! ERC-20 inspection: metadata reads, limit guards, restriction probes and
//! transfer preflight.

pub mod preflight;
pub mod restrictions;

use crate::chain::{CallRequest, ChainClient};
use crate::error::Result;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};

pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
pub const DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
pub const SYMBOL_SELECTOR: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];

/// 4-byte selector of a solidity signature string.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn address_word(addr: Address) -> [u8; 32] {
    B256::left_padding_from(addr.as_slice()).0
}

/// `transfer(to, amount)` calldata.
pub fn erc20_transfer_calldata(to: Address, amount: U256) -> Bytes {
    let mut data = Vec::with_capacity(4 + 32 + 32);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&address_word(to));
    data.extend_from_slice(&amount.to_be_bytes::<32>());
    Bytes::from(data)
}

fn call_with_selector(token: Address, sel: [u8; 4]) -> CallRequest {
    CallRequest {
        to: token,
        data: Bytes::from(sel.to_vec()),
        ..Default::default()
    }
}

fn call_with_address_arg(token: Address, sel: [u8; 4], arg: Address) -> CallRequest {
    let mut data = Vec::with_capacity(4 + 32);
    data.extend_from_slice(&sel);
    data.extend_from_slice(&address_word(arg));
    CallRequest {
        to: token,
        data: Bytes::from(data),
        ..Default::default()
    }
}

fn last_word_u256(ret: &[u8]) -> U256 {
    if ret.len() >= 32 {
        U256::from_be_slice(&ret[ret.len() - 32..])
    } else {
        U256::from_be_slice(ret)
    }
}

/// `decimals()`; empty return defaults to 18 the way most tooling assumes.
pub async fn decimals(chain: &ChainClient, token: Address) -> Result<u8> {
    let ret = chain
        .call(&call_with_selector(token, DECIMALS_SELECTOR))
        .await?;
    if ret.is_empty() {
        return Ok(18);
    }
    Ok(last_word_u256(&ret).saturating_to::<u64>().min(255) as u8)
}

/// `symbol()`; understands both the dynamic-string and bytes32 encodings.
pub async fn symbol(chain: &ChainClient, token: Address) -> Result<String> {
    let ret = chain
        .call(&call_with_selector(token, SYMBOL_SELECTOR))
        .await?;
    if ret.is_empty() {
        return Ok(String::new());
    }
    if ret.len() >= 64 {
        let len = last_word_u256(&ret[32..64]).saturating_to::<u64>() as usize;
        if len > 0 && 64 + len <= ret.len() {
            return Ok(String::from_utf8_lossy(&ret[64..64 + len]).into_owned());
        }
    }
    Ok(String::from_utf8_lossy(&ret)
        .trim_end_matches('\0')
        .to_string())
}

pub async fn balance_of(chain: &ChainClient, token: Address, owner: Address) -> Result<U256> {
    let ret = chain
        .call(&call_with_address_arg(token, BALANCE_OF_SELECTOR, owner))
        .await?;
    if ret.is_empty() {
        return Ok(U256::ZERO);
    }
    Ok(last_word_u256(&ret))
}

/// Transfer-size and wallet-size guards some tokens expose. Everything is
/// optional; absence is never a block.
#[derive(Debug, Clone, Default)]
pub struct TokenLimits {
    pub max_tx: Option<U256>,
    pub max_wallet: Option<U256>,
    pub total_supply: Option<U256>,
    /// Internal swap trigger: the token sells its own reserve once the
    /// contract balance crosses this threshold, which can front-run a rescue.
    pub swap_threshold: Option<U256>,
    pub contract_reserve: Option<U256>,
}

impl TokenLimits {
    pub fn any_known(&self) -> bool {
        self.max_tx.is_some() || self.max_wallet.is_some() || self.swap_threshold.is_some()
    }

    /// Warnings only; a limit violation is advisory unless preflight fails.
    pub fn warnings(&self, amount: U256, recipient_balance: U256) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(max_tx) = self.max_tx {
            if !max_tx.is_zero() && amount > max_tx {
                out.push(format!("amount > maxTx ({amount} > {max_tx})"));
            }
        }
        if let Some(max_wallet) = self.max_wallet {
            if !max_wallet.is_zero() && recipient_balance + amount > max_wallet {
                out.push(format!(
                    "recipientBalance+amount > maxWallet ({} > {max_wallet})",
                    recipient_balance + amount
                ));
            }
        }
        if let (Some(threshold), Some(reserve)) = (self.swap_threshold, self.contract_reserve) {
            if !threshold.is_zero() && reserve >= threshold {
                out.push("internal swap trigger armed (contract reserve >= threshold)".to_string());
            }
        }
        out
    }
}

async fn read_uint(chain: &ChainClient, token: Address, signature: &str) -> Option<U256> {
    let ret = chain
        .call(&call_with_selector(token, selector(signature)))
        .await
        .ok()?;
    if ret.len() < 32 {
        return None;
    }
    Some(last_word_u256(&ret))
}

/// Probe the limit-guard catalog. BPS-style getters are resolved against
/// `totalSupply()`; absolute getters win when both exist.
pub async fn read_limits(chain: &ChainClient, token: Address) -> TokenLimits {
    let mut limits = TokenLimits::default();
    limits.total_supply = read_uint(chain, token, "totalSupply()").await;

    if let Some(ts) = limits.total_supply {
        let bps_denominator = U256::from(10_000u64);
        if let Some(bps) = read_uint(chain, token, "maxTxBPS()").await {
            limits.max_tx = Some(ts * bps / bps_denominator);
        }
        if let Some(bps) = read_uint(chain, token, "maxWalletBPS()").await {
            limits.max_wallet = Some(ts * bps / bps_denominator);
        }
    }
    if let Some(abs) = read_uint(chain, token, "_maxTxAmount()").await {
        limits.max_tx = Some(abs);
    }
    if let Some(abs) = read_uint(chain, token, "_maxWalletSize()").await {
        limits.max_wallet = Some(abs);
    }
    if let Some(threshold) = read_uint(chain, token, "_swapTokensAtAmount()").await {
        limits.swap_threshold = Some(threshold);
        limits.contract_reserve = balance_of(chain, token, token).await.ok();
    }
    limits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches_known_values() {
        assert_eq!(selector("transfer(address,uint256)"), TRANSFER_SELECTOR);
        assert_eq!(selector("balanceOf(address)"), BALANCE_OF_SELECTOR);
        assert_eq!(selector("decimals()"), DECIMALS_SELECTOR);
        assert_eq!(selector("symbol()"), SYMBOL_SELECTOR);
    }

    #[test]
    fn test_transfer_calldata_layout() {
        let to = Address::repeat_byte(0x42);
        let amount = U256::from(1_000u64);
        let data = erc20_transfer_calldata(to, amount);
        assert_eq!(data.len(), 68);
        assert_eq!(&data[..4], &TRANSFER_SELECTOR);
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], to.as_slice());
        assert_eq!(U256::from_be_slice(&data[36..68]), amount);
    }

    #[test]
    fn test_limit_warnings() {
        let limits = TokenLimits {
            max_tx: Some(U256::from(100u64)),
            max_wallet: Some(U256::from(150u64)),
            ..Default::default()
        };
        // inside both limits
        assert!(limits
            .warnings(U256::from(50u64), U256::from(10u64))
            .is_empty());
        // amount over maxTx
        let warns = limits.warnings(U256::from(200u64), U256::ZERO);
        assert_eq!(warns.len(), 2); // also breaches maxWallet
        assert!(warns[0].contains("maxTx"));
        // wallet limit only
        let warns = limits.warnings(U256::from(100u64), U256::from(100u64));
        assert_eq!(warns.len(), 1);
        assert!(warns[0].contains("maxWallet"));
    }

    #[test]
    fn test_swap_trigger_warning() {
        let limits = TokenLimits {
            swap_threshold: Some(U256::from(10u64)),
            contract_reserve: Some(U256::from(25u64)),
            ..Default::default()
        };
        let warns = limits.warnings(U256::ZERO, U256::ZERO);
        assert_eq!(warns.len(), 1);
        assert!(warns[0].contains("swap trigger"));
    }

    #[test]
    fn test_last_word_u256_short_and_long() {
        assert_eq!(last_word_u256(&[0x01]), U256::from(1u64));
        let mut long = vec![0u8; 64];
        long[63] = 0x05;
        assert_eq!(last_word_u256(&long), U256::from(5u64));
    }
}
