//! Fee oracle.
//!
//! Projects the next base fee and computes the per-attempt priority tip in one
//! of two modes: fixed escalation (default) or a fee-history percentile. The
//! fee cap is always `projected_base_fee * k + tip`.

use crate::chain::ChainClient;
use crate::error::{Result, RpcError};
use crate::units::{gwei_to_wei, WEI_PER_GWEI};
use alloy::primitives::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipMode {
    Fixed,
    /// Take the maximum reward at `percentile` over the last `window` blocks.
    Percentile { window: usize, percentile: u8 },
}

impl Default for TipMode {
    fn default() -> Self {
        TipMode::Fixed
    }
}

/// Fixed-mode tip: `max(suggested, base_tip) * mul^attempt`, rounded to gwei,
/// floored at the base tip.
pub fn fixed_tip_wei(
    base_tip_gwei: u64,
    suggested_gwei: Option<u64>,
    tip_mul: f64,
    attempt: usize,
) -> U256 {
    let base = suggested_gwei
        .filter(|s| *s > base_tip_gwei)
        .unwrap_or(base_tip_gwei) as f64;
    let scaled = (base * tip_mul.max(1.0).powi(attempt as i32)).round() as u64;
    let gwei = if scaled < 1 { base_tip_gwei } else { scaled };
    gwei_to_wei(gwei)
}

/// Percentile-mode tip: maximum reward across the window at the requested
/// percentile. Empty or zero rewards return `None` so the caller falls back.
pub fn percentile_tip_wei(reward_rows: &[Vec<u128>], tip_mul: f64, attempt: usize) -> Option<U256> {
    let max_reward = reward_rows
        .iter()
        .filter_map(|row| row.first().copied())
        .max()
        .unwrap_or(0);
    if max_reward == 0 {
        return None;
    }
    let scaled = if tip_mul > 1.0 {
        (max_reward as f64 * tip_mul.powi(attempt as i32)).round() as u128
    } else {
        max_reward
    };
    Some(U256::from(scaled))
}

/// `fee_cap = base_fee * k + tip`, saturating.
pub fn fee_cap(base_fee: u128, basefee_mul: u64, tip: U256) -> U256 {
    U256::from(base_fee).saturating_mul(U256::from(basefee_mul.max(1))) + tip
}

/// Project the base fee for the next block. Prefers the fee-history `pending`
/// entry; falls back to the latest header.
pub async fn project_base_fee(chain: &ChainClient) -> Result<(u128, u64)> {
    let head = chain.head().await?;
    if let Ok(history) = chain.fee_history(1, &[50]).await {
        if history.base_fee_per_gas.len() >= 2 {
            if let Some(projected) = history.base_fee_per_gas.last() {
                return Ok((*projected, head.number));
            }
        }
    }
    match head.base_fee {
        Some(base_fee) => Ok((base_fee, head.number)),
        None => Err(RpcError::NoBaseFee.into()),
    }
}

/// Compute the tip for one attempt, honoring the mode, the suggested floor and
/// the monotone-escalation invariant (never below the previous attempt's tip).
pub async fn tip_for_attempt(
    chain: &ChainClient,
    mode: TipMode,
    base_tip_gwei: u64,
    tip_mul: f64,
    attempt: usize,
    previous_tip: Option<U256>,
) -> U256 {
    let tip = match mode {
        TipMode::Percentile { window, percentile } => {
            match chain.fee_history(window, &[percentile]).await {
                Ok(history) => percentile_tip_wei(&history.reward, tip_mul, attempt),
                Err(_) => None,
            }
        }
        TipMode::Fixed => None,
    };

    let tip = match tip {
        Some(tip) => tip,
        None => {
            let suggested_gwei = chain
                .suggest_priority_fee()
                .await
                .map(|wei| (wei / U256::from(WEI_PER_GWEI)).saturating_to::<u64>());
            fixed_tip_wei(base_tip_gwei, suggested_gwei, tip_mul, attempt)
        }
    };

    match previous_tip {
        Some(prev) if prev > tip => prev,
        _ => tip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::WEI_PER_GWEI;

    #[test]
    fn test_fixed_tip_escalates_monotonically() {
        let mut last = U256::ZERO;
        for attempt in 0..6 {
            let tip = fixed_tip_wei(3, None, 1.25, attempt);
            assert!(tip >= last, "attempt {attempt} regressed");
            last = tip;
        }
        assert_eq!(fixed_tip_wei(3, None, 1.25, 0), gwei_to_wei(3));
        // 3 * 1.25 = 3.75 -> rounds to 4 gwei
        assert_eq!(fixed_tip_wei(3, None, 1.25, 1), gwei_to_wei(4));
    }

    #[test]
    fn test_fixed_tip_honors_suggested_floor() {
        // suggested above base wins
        assert_eq!(fixed_tip_wei(3, Some(7), 1.0, 0), gwei_to_wei(7));
        // suggested below base is ignored
        assert_eq!(fixed_tip_wei(3, Some(1), 1.0, 0), gwei_to_wei(3));
    }

    #[test]
    fn test_percentile_tip_takes_window_max() {
        let rows = vec![
            vec![2 * WEI_PER_GWEI],
            vec![9 * WEI_PER_GWEI],
            vec![5 * WEI_PER_GWEI],
        ];
        assert_eq!(
            percentile_tip_wei(&rows, 1.0, 0),
            Some(U256::from(9 * WEI_PER_GWEI))
        );
    }

    #[test]
    fn test_percentile_tip_scales_with_attempts() {
        let rows = vec![vec![4 * WEI_PER_GWEI]];
        let t0 = percentile_tip_wei(&rows, 1.5, 0).unwrap();
        let t1 = percentile_tip_wei(&rows, 1.5, 1).unwrap();
        assert_eq!(t0, U256::from(4 * WEI_PER_GWEI));
        assert_eq!(t1, U256::from(6 * WEI_PER_GWEI));
    }

    #[test]
    fn test_percentile_tip_empty_falls_back() {
        // empty reward matrix => None => caller uses fixed mode, never zero
        assert_eq!(percentile_tip_wei(&[], 1.25, 0), None);
        assert_eq!(percentile_tip_wei(&[vec![0]], 1.25, 0), None);
    }

    #[test]
    fn test_fee_cap_formula() {
        // 20 gwei base, k=2, tip 3 gwei => cap 43 gwei
        let cap = fee_cap(20 * WEI_PER_GWEI, 2, gwei_to_wei(3));
        assert_eq!(cap, gwei_to_wei(43));
        // cap >= tip always
        assert!(fee_cap(0, 1, gwei_to_wei(3)) >= gwei_to_wei(3));
    }
}
