//! Transfer-guard discovery.
//!
//! Tokens in the wild gate `transfer()` behind a zoo of owner switches. The
//! probe catalog below covers the common spellings; a function that does not
//! exist simply fails the view call and counts as unknown, never as a block.

use crate::chain::{CallRequest, ChainClient};
use crate::error::Result;
use crate::token::{address_word, selector};
use alloy::primitives::{Address, Bytes};

/// Global pause probes. "enabled"-style getters invert the returned boolean.
const PAUSE_PROBES: &[&str] = &[
    "paused()",
    "isPaused()",
    "transfersPaused()",
    "tradingPaused()",
    "isTradingPaused()",
    "pausedTransfers()",
    "globalPaused()",
    "transferEnabled()",
    "isTransferEnabled()",
    "tradingEnabled()",
    "isTradingEnabled()",
];

const TRANSFER_DISABLED_PROBES: &[&str] =
    &["transferDisabled()", "isTransferDisabled()", "transfersPaused()"];

const WHITELIST_MODE_PROBES: &[&str] = &["onlyWhitelisted()", "whitelistEnabled()"];

const WHITELIST_MEMBER_PROBES: &[&str] = &["isWhitelisted(address)", "whitelisted(address)"];

const BLACKLIST_MEMBER_PROBES: &[&str] = &[
    "isBlacklisted(address)",
    "isBlackListed(address)",
    "blacklisted(address)",
    "isInBlacklist(address)",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRestrictions {
    pub paused: bool,
    pub transfer_disabled: bool,
    pub only_whitelisted: bool,
    pub from_whitelisted: Option<bool>,
    pub to_whitelisted: Option<bool>,
    pub blacklisted_from: bool,
    pub blacklisted_to: bool,
}

impl TokenRestrictions {
    /// True when any positive guard is set, or whitelist mode is on with a
    /// known-false membership on either endpoint. Monotone: new findings can
    /// only keep this true.
    pub fn blocked(&self) -> bool {
        if self.paused || self.transfer_disabled || self.blacklisted_from || self.blacklisted_to {
            return true;
        }
        if self.only_whitelisted {
            if self.from_whitelisted == Some(false) {
                return true;
            }
            if self.to_whitelisted == Some(false) {
                return true;
            }
        }
        false
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.paused {
            parts.push("paused".to_string());
        }
        if self.transfer_disabled {
            parts.push("transferDisabled".to_string());
        }
        if self.blacklisted_from {
            parts.push("from:blacklisted".to_string());
        }
        if self.blacklisted_to {
            parts.push("to:blacklisted".to_string());
        }
        if self.only_whitelisted {
            let fmt = |v: Option<bool>| match v {
                Some(true) => "yes",
                Some(false) => "no",
                None => "unknown",
            };
            parts.push(format!(
                "whitelist:on (from={},to={})",
                fmt(self.from_whitelisted),
                fmt(self.to_whitelisted)
            ));
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(", ")
        }
    }
}

fn bool_of(ret: &[u8]) -> bool {
    matches!(ret.last(), Some(1))
}

async fn probe(chain: &ChainClient, token: Address, data: Vec<u8>) -> Option<Vec<u8>> {
    let msg = CallRequest {
        to: token,
        data: Bytes::from(data),
        ..Default::default()
    };
    match chain.call(&msg).await {
        Ok(ret) if !ret.is_empty() => Some(ret.to_vec()),
        _ => None,
    }
}

async fn probe_flag(chain: &ChainClient, token: Address, signature: &str) -> Option<bool> {
    let ret = probe(chain, token, selector(signature).to_vec()).await?;
    Some(bool_of(&ret))
}

async fn probe_flag_with_addr(
    chain: &ChainClient,
    token: Address,
    signature: &str,
    addr: Address,
) -> Option<bool> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&address_word(addr));
    let ret = probe(chain, token, data).await?;
    Some(bool_of(&ret))
}

/// Probe the pause catalog. `(known, paused)`: `known=false` means no probe
/// answered at all.
pub async fn check_paused(chain: &ChainClient, token: Address) -> Result<(bool, bool)> {
    for signature in PAUSE_PROBES {
        if let Some(flag) = probe_flag(chain, token, signature).await {
            let paused = if signature.contains("nabled") {
                !flag
            } else {
                flag
            };
            return Ok((true, paused));
        }
    }
    Ok((false, false))
}

/// Full guard sweep for one (token, from, to) triple. Positive pause or
/// transfer-disabled findings short-circuit; whitelist membership is only
/// probed once whitelist mode is confirmed on.
pub async fn check_restrictions(
    chain: &ChainClient,
    token: Address,
    from: Address,
    to: Address,
) -> Result<TokenRestrictions> {
    let mut out = TokenRestrictions::default();

    let (known, paused) = check_paused(chain, token).await?;
    if known && paused {
        out.paused = true;
        return Ok(out);
    }

    for signature in TRANSFER_DISABLED_PROBES {
        if probe_flag(chain, token, signature).await == Some(true) {
            out.transfer_disabled = true;
            return Ok(out);
        }
    }

    for signature in WHITELIST_MODE_PROBES {
        if probe_flag(chain, token, signature).await == Some(true) {
            out.only_whitelisted = true;
            break;
        }
    }
    if out.only_whitelisted {
        out.from_whitelisted = whitelist_membership(chain, token, from).await;
        out.to_whitelisted = whitelist_membership(chain, token, to).await;
    }

    out.blacklisted_from = blacklist_membership(chain, token, from).await;
    out.blacklisted_to = blacklist_membership(chain, token, to).await;

    Ok(out)
}

async fn whitelist_membership(
    chain: &ChainClient,
    token: Address,
    addr: Address,
) -> Option<bool> {
    for signature in WHITELIST_MEMBER_PROBES {
        if let Some(flag) = probe_flag_with_addr(chain, token, signature, addr).await {
            return Some(flag);
        }
    }
    None
}

async fn blacklist_membership(chain: &ChainClient, token: Address, addr: Address) -> bool {
    for signature in BLACKLIST_MEMBER_PROBES {
        if probe_flag_with_addr(chain, token, signature, addr).await == Some(true) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_positive_guards() {
        let mut tr = TokenRestrictions::default();
        assert!(!tr.blocked());
        tr.paused = true;
        assert!(tr.blocked());

        let tr = TokenRestrictions {
            blacklisted_to: true,
            ..Default::default()
        };
        assert!(tr.blocked());
    }

    #[test]
    fn test_blocked_whitelist_semantics() {
        // whitelist on with unknown membership is not a block
        let tr = TokenRestrictions {
            only_whitelisted: true,
            ..Default::default()
        };
        assert!(!tr.blocked());

        // known-false membership blocks
        let tr = TokenRestrictions {
            only_whitelisted: true,
            from_whitelisted: Some(true),
            to_whitelisted: Some(false),
            ..Default::default()
        };
        assert!(tr.blocked());

        // both known-true passes
        let tr = TokenRestrictions {
            only_whitelisted: true,
            from_whitelisted: Some(true),
            to_whitelisted: Some(true),
            ..Default::default()
        };
        assert!(!tr.blocked());
    }

    #[test]
    fn test_blocked_is_monotone() {
        // adding findings to an already-blocked descriptor never unblocks it
        let mut tr = TokenRestrictions {
            transfer_disabled: true,
            ..Default::default()
        };
        assert!(tr.blocked());
        tr.only_whitelisted = true;
        tr.from_whitelisted = Some(true);
        tr.to_whitelisted = Some(true);
        tr.blacklisted_from = true;
        assert!(tr.blocked());
    }

    #[test]
    fn test_summary_render() {
        assert_eq!(TokenRestrictions::default().summary(), "none");

        let tr = TokenRestrictions {
            paused: true,
            blacklisted_from: true,
            ..Default::default()
        };
        let s = tr.summary();
        assert!(s.contains("paused"));
        assert!(s.contains("from:blacklisted"));

        let tr = TokenRestrictions {
            only_whitelisted: true,
            from_whitelisted: Some(true),
            ..Default::default()
        };
        assert_eq!(tr.summary(), "whitelist:on (from=yes,to=unknown)");
    }

    #[test]
    fn test_bool_of_reads_last_byte() {
        assert!(bool_of(&[0u8; 31].iter().copied().chain([1]).collect::<Vec<_>>()));
        assert!(!bool_of(&[0u8; 32]));
        assert!(!bool_of(&[]));
    }

    #[test]
    fn test_enabled_probes_invert() {
        // the catalog relies on name matching for inversion
        assert!("transferEnabled()".contains("nabled"));
        assert!("isTradingEnabled()".contains("nabled"));
        assert!(!"paused()".contains("nabled"));
    }
}
