//! Inclusion/race monitor.
//!
//! After a bundle goes out, wait for the chain to reach the target block and
//! decide what happened: our transfer landed, a foreign transaction consumed
//! the nonce, or nothing happened and the next block window can be tried.

use crate::chain::{ChainClient, NonceTag, ReceiptStatus};
use crate::error::Result;
use alloy::primitives::{Address, B256};
use tokio::time::{sleep, Duration, Instant};

pub const DEFAULT_WAIT_MS: u64 = 45_000;
const POLL_INTERVAL_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionOutcome {
    Included,
    /// A foreign tx was mined at our nonce; retrying this attempt is pointless.
    CompetingNonce,
    NotIncluded,
    TimedOut,
}

fn receipt_matches(receipt: Option<ReceiptStatus>, target_block: u64) -> bool {
    matches!(
        receipt,
        Some(ReceiptStatus {
            block_number,
            success: true,
        }) if block_number == target_block
    )
}

/// Pure decision once the target block exists.
pub fn decide(
    latest_nonce: u64,
    start_nonce: u64,
    receipt: Option<ReceiptStatus>,
    target_block: u64,
) -> InclusionOutcome {
    if latest_nonce > start_nonce {
        if receipt_matches(receipt, target_block) {
            return InclusionOutcome::Included;
        }
        return InclusionOutcome::CompetingNonce;
    }
    if receipt_matches(receipt, target_block) {
        return InclusionOutcome::Included;
    }
    InclusionOutcome::NotIncluded
}

/// Poll head until it reaches `target_block` (bounded by `wait_ms`), then read
/// the compromised EOA's nonce and our transfer's receipt and decide.
pub async fn wait_inclusion_or_compete(
    chain: &ChainClient,
    from: Address,
    start_nonce: u64,
    transfer_hash: B256,
    target_block: u64,
    wait_ms: u64,
) -> Result<InclusionOutcome> {
    let deadline = Instant::now() + Duration::from_millis(wait_ms);
    loop {
        if chain.context().is_cancelled() || Instant::now() >= deadline {
            return Ok(InclusionOutcome::TimedOut);
        }
        match chain.head().await {
            Ok(head) if head.number >= target_block => break,
            _ => {}
        }
        sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }

    let latest_nonce = chain.nonce(from, NonceTag::Latest).await?;
    let receipt = chain.receipt(transfer_hash).await?;
    Ok(decide(latest_nonce, start_nonce, receipt, target_block))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: u64 = 120;

    fn receipt(block_number: u64, success: bool) -> Option<ReceiptStatus> {
        Some(ReceiptStatus {
            block_number,
            success,
        })
    }

    #[test]
    fn test_included_when_nonce_advanced_and_receipt_matches() {
        assert_eq!(
            decide(6, 5, receipt(TARGET, true), TARGET),
            InclusionOutcome::Included
        );
    }

    #[test]
    fn test_competing_when_nonce_advanced_without_our_receipt() {
        // someone else's tx consumed the nonce
        assert_eq!(decide(6, 5, None, TARGET), InclusionOutcome::CompetingNonce);
        // our receipt exists but in the wrong block
        assert_eq!(
            decide(6, 5, receipt(TARGET + 1, true), TARGET),
            InclusionOutcome::CompetingNonce
        );
        // landed but reverted
        assert_eq!(
            decide(6, 5, receipt(TARGET, false), TARGET),
            InclusionOutcome::CompetingNonce
        );
    }

    #[test]
    fn test_included_via_receipt_when_nonce_not_observed_advanced() {
        // a lagging nonce view still counts the receipt
        assert_eq!(
            decide(5, 5, receipt(TARGET, true), TARGET),
            InclusionOutcome::Included
        );
    }

    #[test]
    fn test_not_included_when_nothing_changed() {
        assert_eq!(decide(5, 5, None, TARGET), InclusionOutcome::NotIncluded);
        assert_eq!(
            decide(5, 5, receipt(TARGET, false), TARGET),
            InclusionOutcome::NotIncluded
        );
    }
}
