//! Transfer preflight.
//!
//! Predicts whether a real `transfer(to, amount)` would succeed, first under
//! classic EOA semantics, then — for delegated-code routing — under a state
//! override that attaches non-empty code to the compromised EOA.

use crate::chain::{CallRequest, ChainClient};
use crate::error::{Result, RescueError, RpcErrorKind};
use crate::token::{address_word, erc20_transfer_calldata, selector};
use alloy::primitives::{address, Address, Bytes, U256};

/// Canonical Uniswap V2 factory and WETH on mainnet, used for the router
/// fallback route.
pub const V2_FACTORY: Address = address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
pub const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

/// Gas cap handed to the optional-return raw call. `eth_call` does not spend
/// it, but some tokens demand a minimum headroom.
const OPTIONAL_RETURN_GAS: u64 = 250_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viability {
    Transferable,
    NotTransferable(String),
}

impl Viability {
    pub fn ok(&self) -> bool {
        matches!(self, Viability::Transferable)
    }

    pub fn reason(&self) -> &str {
        match self {
            Viability::Transferable => "",
            Viability::NotTransferable(reason) => reason,
        }
    }
}

/// Route chosen for the delegated-code path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateRoute {
    /// Plain `transfer(recipient, amount)` works from the delegated EOA.
    Direct,
    /// Transfers only clear toward the token's V2 pair; sell to ETH instead.
    Router { pair: Address },
    /// Neither probe cleared.
    None(String),
}

fn extract_revert_reason(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    match lower.find("execution reverted") {
        Some(idx) => message[idx..].to_string(),
        None => message.to_string(),
    }
}

/// Classic preflight: static call, then gas-estimation fallback for tokens
/// that return no data from `transfer()`.
pub async fn preflight_transfer(
    chain: &ChainClient,
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
) -> Result<Viability> {
    let msg = CallRequest {
        from: Some(from),
        to: token,
        value: Some(U256::ZERO),
        data: erc20_transfer_calldata(to, amount),
        ..Default::default()
    };

    let ret = match chain.call(&msg).await {
        Ok(ret) => ret,
        Err(RescueError::Net(err)) if err.kind() == RpcErrorKind::Revert => {
            return Ok(Viability::NotTransferable(extract_revert_reason(
                &err.to_string(),
            )));
        }
        Err(other) => return Err(other),
    };

    if ret.is_empty() {
        // Pre-ERC20 tokens return nothing; a clean gas estimate is the signal.
        return match chain.estimate_gas(&msg).await {
            Ok(_) => Ok(Viability::Transferable),
            Err(RescueError::Net(err)) if err.kind() == RpcErrorKind::Revert => Ok(
                Viability::NotTransferable("transfer would revert".to_string()),
            ),
            Err(other) => Err(other),
        };
    }

    match decode_optional_bool(&ret) {
        Some(true) => Ok(Viability::Transferable),
        Some(false) => Ok(Viability::NotTransferable(
            "transfer() returned false".to_string(),
        )),
        // Non-canonical payload: a non-zero 32-byte tail passes permissively.
        None => {
            if ret.len() >= 32 && ret[ret.len() - 32..].iter().any(|b| *b != 0) {
                Ok(Viability::Transferable)
            } else {
                Ok(Viability::NotTransferable(
                    "unexpected return payload".to_string(),
                ))
            }
        }
    }
}

/// Decode the last 32 bytes as a canonical ABI bool. `None` when the word is
/// not canonically shaped.
pub fn decode_optional_bool(ret: &[u8]) -> Option<bool> {
    if ret.len() < 32 {
        return None;
    }
    let word = &ret[ret.len() - 32..];
    if word[..31].iter().any(|b| *b != 0) {
        return None;
    }
    Some(word[31] != 0)
}

/// Whether a preflight failure looks like an ABI-shape problem worth the
/// SafeERC20-style raw-call fallback. Explicit VM errors never qualify.
pub fn is_optional_return_candidate(reason: &str) -> bool {
    let s = reason.to_ascii_lowercase();
    if s.contains("revert") || s.contains("invalid opcode") {
        return false;
    }
    s.contains("abi")
        || s.contains("decode")
        || s.contains("empty")
        || s.contains("no return")
        || s.contains("unexpected return")
        || s.contains("preflight failed")
}

/// Raw `transfer()` call with a minimal gas budget; empty or canonical-true
/// return is accepted.
pub async fn optional_return_transfer_call(
    chain: &ChainClient,
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
) -> Result<Viability> {
    let msg = CallRequest {
        from: Some(from),
        to: token,
        gas: Some(OPTIONAL_RETURN_GAS),
        data: erc20_transfer_calldata(to, amount),
        ..Default::default()
    };
    let ret = match chain.call(&msg).await {
        Ok(ret) => ret,
        Err(RescueError::Net(err)) if err.kind() == RpcErrorKind::Revert => {
            return Ok(Viability::NotTransferable(extract_revert_reason(
                &err.to_string(),
            )));
        }
        Err(other) => return Err(other),
    };
    if ret.is_empty() {
        return Ok(Viability::Transferable);
    }
    match decode_optional_bool(&ret) {
        Some(true) => Ok(Viability::Transferable),
        Some(false) => Ok(Viability::NotTransferable(
            "token returned false".to_string(),
        )),
        None => {
            if ret[ret.len().saturating_sub(32)..].iter().any(|b| *b != 0) {
                Ok(Viability::Transferable)
            } else {
                Ok(Viability::NotTransferable(
                    "unexpected return payload".to_string(),
                ))
            }
        }
    }
}

/// `getPair(token, WETH)` against the canonical V2 factory; `None` when the
/// pair does not exist.
pub async fn v2_pair(chain: &ChainClient, token: Address) -> Result<Option<Address>> {
    let mut data = selector("getPair(address,address)").to_vec();
    data.extend_from_slice(&address_word(token));
    data.extend_from_slice(&address_word(WETH));
    let msg = CallRequest {
        to: V2_FACTORY,
        data: Bytes::from(data),
        ..Default::default()
    };
    let ret = match chain.call(&msg).await {
        Ok(ret) => ret,
        Err(_) => return Ok(None),
    };
    if ret.len() < 32 {
        return Ok(None);
    }
    let pair = Address::from_slice(&ret[12..32]);
    if pair == Address::ZERO {
        Ok(None)
    } else {
        Ok(Some(pair))
    }
}

async fn simulate_transfer_with_override(
    chain: &ChainClient,
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
) -> Result<bool> {
    let msg = CallRequest {
        from: Some(from),
        to: token,
        data: erc20_transfer_calldata(to, amount),
        ..Default::default()
    };
    match chain.call_with_code_override(&msg, from).await {
        Ok(ret) => {
            if ret.is_empty() {
                return Ok(true);
            }
            Ok(matches!(decode_optional_bool(&ret), Some(true)))
        }
        Err(RescueError::Net(err)) if err.kind() == RpcErrorKind::Revert => Ok(false),
        Err(other) => Err(other),
    }
}

/// Preflight under the delegated-code execution context. Probes the direct
/// route first, then the V2 router route.
pub async fn preflight_delegated(
    chain: &ChainClient,
    token: Address,
    from: Address,
    recipient: Address,
    amount: U256,
) -> Result<DelegateRoute> {
    if amount.is_zero() {
        return Ok(DelegateRoute::None("no balance".to_string()));
    }

    if simulate_transfer_with_override(chain, token, from, recipient, amount).await? {
        return Ok(DelegateRoute::Direct);
    }

    let Some(pair) = v2_pair(chain, token).await? else {
        return Ok(DelegateRoute::None(
            "no v2 pair for router path".to_string(),
        ));
    };
    if simulate_transfer_with_override(chain, token, from, pair, amount).await? {
        return Ok(DelegateRoute::Router { pair });
    }
    Ok(DelegateRoute::None(
        "blocked in delegated context".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bool_word(value: u8) -> Vec<u8> {
        let mut word = vec![0u8; 32];
        word[31] = value;
        word
    }

    #[test]
    fn test_decode_optional_bool() {
        assert_eq!(decode_optional_bool(&bool_word(1)), Some(true));
        assert_eq!(decode_optional_bool(&bool_word(0)), Some(false));
        // non-canonical low byte still decodes as truthy
        assert_eq!(decode_optional_bool(&bool_word(7)), Some(true));
        // garbage in the high bytes is not canonical
        let mut word = bool_word(1);
        word[0] = 0xff;
        assert_eq!(decode_optional_bool(&word), None);
        assert_eq!(decode_optional_bool(&[1u8]), None);
    }

    #[test]
    fn test_optional_return_candidate() {
        assert!(is_optional_return_candidate("abi decode failed"));
        assert!(is_optional_return_candidate("empty output"));
        assert!(is_optional_return_candidate("unexpected return payload"));
        assert!(!is_optional_return_candidate(
            "execution reverted: blacklisted"
        ));
        assert!(!is_optional_return_candidate("invalid opcode: INVALID"));
        assert!(!is_optional_return_candidate("token paused"));
    }

    #[test]
    fn test_extract_revert_reason() {
        assert_eq!(
            extract_revert_reason("rpc_error: execution reverted: Pausable: paused"),
            "execution reverted: Pausable: paused"
        );
        assert_eq!(extract_revert_reason("plain failure"), "plain failure");
    }

    #[test]
    fn test_viability_accessors() {
        assert!(Viability::Transferable.ok());
        assert_eq!(Viability::Transferable.reason(), "");
        let bad = Viability::NotTransferable("paused".to_string());
        assert!(!bad.ok());
        assert_eq!(bad.reason(), "paused");
    }

    #[test]
    fn test_route_equality() {
        assert_eq!(DelegateRoute::Direct, DelegateRoute::Direct);
        assert_ne!(
            DelegateRoute::Direct,
            DelegateRoute::None("x".to_string())
        );
    }
}
