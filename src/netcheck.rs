//! Network snapshot: fee-history reward statistics and a coinbase-bribe scan
//! over recent blocks. Purely diagnostic; nothing here feeds the planner.

use crate::chain::ChainClient;
use crate::error::{Result, RpcError};
use alloy::primitives::U256;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct RewardStats {
    pub min: u128,
    pub avg: u128,
    pub max: u128,
}

/// Min/avg/max reward per requested percentile over the last `blocks` blocks.
pub async fn fee_history_stats(
    chain: &ChainClient,
    blocks: usize,
    percentiles: &[u8],
) -> Result<BTreeMap<u8, RewardStats>> {
    let blocks = if blocks == 0 { 100 } else { blocks };
    let percentiles: Vec<u8> = if percentiles.is_empty() {
        vec![50, 95, 99]
    } else {
        percentiles.to_vec()
    };

    let history = chain.fee_history(blocks, &percentiles).await?;
    if history.reward.is_empty() {
        return Err(RpcError::BadPayload("feeHistory: empty reward".into()).into());
    }
    Ok(reward_stats(&history.reward, &percentiles, blocks))
}

fn reward_stats(
    rows: &[Vec<u128>],
    percentiles: &[u8],
    blocks: usize,
) -> BTreeMap<u8, RewardStats> {
    let mut out = BTreeMap::new();
    for (column, percentile) in percentiles.iter().enumerate() {
        let mut min: Option<u128> = None;
        let mut max = 0u128;
        let mut sum = 0u128;
        for row in rows {
            let Some(value) = row.get(column).copied() else {
                continue;
            };
            min = Some(min.map_or(value, |m| m.min(value)));
            max = max.max(value);
            sum = sum.saturating_add(value);
        }
        out.insert(
            *percentile,
            RewardStats {
                min: min.unwrap_or(0),
                avg: sum / blocks.max(1) as u128,
                max,
            },
        );
    }
    out
}

/// Extract bribe-shaped values from one full block: contract creations whose
/// init-code contains the COINBASE;SELFDESTRUCT pattern, and direct transfers
/// to the block's coinbase.
pub fn bribes_in_block(block: &Value) -> Vec<U256> {
    let mut out = Vec::new();
    let coinbase = block
        .get("miner")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase();
    let Some(txs) = block.get("transactions").and_then(Value::as_array) else {
        return out;
    };
    for tx in txs {
        let value = tx
            .get("value")
            .and_then(Value::as_str)
            .and_then(|raw| U256::from_str_radix(raw.trim_start_matches("0x"), 16).ok())
            .unwrap_or(U256::ZERO);
        if value.is_zero() {
            continue;
        }
        let to = tx.get("to").and_then(Value::as_str);
        match to {
            None => {
                let input = tx
                    .get("input")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                if input.contains("41ff") {
                    out.push(value);
                }
            }
            Some(to) if !coinbase.is_empty() && to.eq_ignore_ascii_case(&coinbase) => {
                out.push(value);
            }
            _ => {}
        }
    }
    out
}

/// Scan the last `blocks` blocks for coinbase bribes.
pub async fn scan_coinbase_bribes(chain: &ChainClient, blocks: usize) -> Result<Vec<U256>> {
    let blocks = if blocks == 0 { 100 } else { blocks };
    let head = chain.head().await?;
    let mut out = Vec::new();
    for offset in 0..blocks as u64 {
        let Some(number) = head.number.checked_sub(offset) else {
            break;
        };
        if number == 0 {
            break;
        }
        match chain.block_with_txs(number).await {
            Ok(Some(block)) => out.extend(bribes_in_block(&block)),
            _ => continue,
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct BribeSummary {
    pub count: usize,
    pub sum: U256,
    pub max: U256,
    pub p50: U256,
    pub p95: U256,
    pub p99: U256,
}

fn quantile(sorted: &[U256], q: f64) -> U256 {
    if sorted.is_empty() {
        return U256::ZERO;
    }
    let idx = ((q * sorted.len() as f64).ceil() as usize).saturating_sub(1);
    sorted[idx.min(sorted.len() - 1)]
}

/// Log a one-shot network snapshot: reward stats over the recent window plus
/// observed coinbase bribes. Best-effort; failures only log.
pub async fn log_snapshot(chain: &ChainClient, blocks: usize, percentiles: &[u8]) {
    match fee_history_stats(chain, blocks, percentiles).await {
        Ok(stats) => {
            for (percentile, st) in &stats {
                tracing::info!(
                    "net: p{percentile} reward min/avg/max = {} / {} / {} gwei over {blocks} blocks",
                    crate::units::fmt_gwei(U256::from(st.min)),
                    crate::units::fmt_gwei(U256::from(st.avg)),
                    crate::units::fmt_gwei(U256::from(st.max)),
                );
            }
        }
        Err(err) => tracing::warn!("net: feeHistory stats failed: {err}"),
    }
    match scan_coinbase_bribes(chain, blocks).await {
        Ok(bribes) => {
            let summary = summarize_bribes(&bribes);
            tracing::info!(
                "net: coinbase bribes in last {blocks} blocks: count={} sum={} ETH max={} ETH p50={} p95={} p99={}",
                summary.count,
                crate::units::fmt_eth(summary.sum),
                crate::units::fmt_eth(summary.max),
                crate::units::fmt_eth(summary.p50),
                crate::units::fmt_eth(summary.p95),
                crate::units::fmt_eth(summary.p99),
            );
        }
        Err(err) => tracing::warn!("net: bribe scan failed: {err}"),
    }
}

pub fn summarize_bribes(values: &[U256]) -> BribeSummary {
    let mut sum = U256::ZERO;
    let mut max = U256::ZERO;
    for v in values {
        sum += *v;
        if *v > max {
            max = *v;
        }
    }
    let mut sorted = values.to_vec();
    sorted.sort();
    BribeSummary {
        count: values.len(),
        sum,
        max,
        p50: quantile(&sorted, 0.50),
        p95: quantile(&sorted, 0.95),
        p99: quantile(&sorted, 0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reward_stats_per_percentile() {
        let rows = vec![vec![1u128, 10], vec![3, 30], vec![2, 20]];
        let stats = reward_stats(&rows, &[50, 99], 3);
        assert_eq!(stats[&50].min, 1);
        assert_eq!(stats[&50].max, 3);
        assert_eq!(stats[&50].avg, 2);
        assert_eq!(stats[&99].max, 30);
        assert_eq!(stats[&99].avg, 20);
    }

    #[test]
    fn test_bribes_in_block_detects_patterns() {
        let coinbase = "0x1111111111111111111111111111111111111111";
        let block = json!({
            "miner": coinbase,
            "transactions": [
                // creation carrying the bribe opcode pair
                { "to": null, "input": "0x41ff", "value": "0x64" },
                // direct pay-to-coinbase
                { "to": coinbase, "input": "0x", "value": "0x32" },
                // ordinary transfer, ignored
                { "to": "0x2222222222222222222222222222222222222222", "input": "0x", "value": "0x01" },
                // creation without the pattern, ignored
                { "to": null, "input": "0x6001600155", "value": "0x05" },
                // zero-value creation with the pattern, ignored
                { "to": null, "input": "0x41ff", "value": "0x0" }
            ]
        });
        let bribes = bribes_in_block(&block);
        assert_eq!(bribes, vec![U256::from(100u64), U256::from(50u64)]);
    }

    #[test]
    fn test_bribes_in_block_empty_shapes() {
        assert!(bribes_in_block(&json!({})).is_empty());
        assert!(bribes_in_block(&json!({"miner": "0xab", "transactions": []})).is_empty());
    }

    #[test]
    fn test_summarize_bribes_quantiles() {
        let values: Vec<U256> = (1..=100u64).map(U256::from).collect();
        let summary = summarize_bribes(&values);
        assert_eq!(summary.count, 100);
        assert_eq!(summary.max, U256::from(100u64));
        assert_eq!(summary.p50, U256::from(50u64));
        assert_eq!(summary.p95, U256::from(95u64));
        assert_eq!(summary.p99, U256::from(99u64));
        assert_eq!(summary.sum, U256::from(5050u64));
    }

    #[test]
    fn test_summarize_bribes_empty() {
        let summary = summarize_bribes(&[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.p99, U256::ZERO);
    }
}
