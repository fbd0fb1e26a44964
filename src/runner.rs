//! Per-pair orchestration.
//!
//! One run is a sequential loop of attempts across the configured block
//! window. Within an attempt the ordering is strict: gather state, plan and
//! sign, simulate on every relay, send to every relay, then watch the target
//! block. Attempts continue until inclusion, a terminal abort, or window
//! exhaustion.

use crate::chain::{CallRequest, ChainClient, NonceTag};
use crate::context::RuntimeContext;
use crate::delegate::{
    build_authorizations, sell_to_eth_v2_calldata, sign_set_code_tx, sweep_erc20_calldata,
    SetCodeTxParams, DELEGATE_CALL_GAS,
};
use crate::error::{PairError, RescueError, Result};
use crate::fees::{fee_cap, project_base_fee, tip_for_attempt};
use crate::monitor::{wait_inclusion_or_compete, InclusionOutcome, DEFAULT_WAIT_MS};
use crate::plan::{build_bundle_plan, PairRequest, PlanInputs};
use crate::relay::transport::{PrivateSendAttempt, RelayTransport};
use crate::relay::{RelayDescriptor, StrategyKnobs};
use crate::token::preflight::DelegateRoute;
use crate::token::restrictions::{check_paused, check_restrictions};
use crate::token::{balance_of, erc20_transfer_calldata, read_limits};
use crate::units::{fmt_eth, fmt_gwei, gwei_to_wei, parse_private_key};
use alloy::primitives::{Address, B256, U256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Terminal state of one rescue run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Included,
    Restricted(String),
    CompetingNonce,
    Exhausted,
    InsufficientSponsorFunds,
    SimulateOnly,
    Cancelled,
}

impl RunOutcome {
    pub fn included(&self) -> bool {
        matches!(self, RunOutcome::Included)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Included => write!(f, "included"),
            RunOutcome::Restricted(reason) => write!(f, "restricted: {reason}"),
            RunOutcome::CompetingNonce => write!(f, "competing nonce"),
            RunOutcome::Exhausted => write!(f, "exhausted attempts"),
            RunOutcome::InsufficientSponsorFunds => {
                write!(f, "insufficient SAFE balance for fee+prefund")
            }
            RunOutcome::SimulateOnly => write!(f, "simulate only"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

pub struct RescueRunner {
    chain: ChainClient,
    transport: RelayTransport,
    relays: Vec<RelayDescriptor>,
    strategy: StrategyKnobs,
    ctx: RuntimeContext,
}

impl RescueRunner {
    pub fn new(
        chain: ChainClient,
        transport: RelayTransport,
        relays: Vec<RelayDescriptor>,
        strategy: StrategyKnobs,
        ctx: RuntimeContext,
    ) -> Self {
        Self {
            chain,
            transport,
            relays,
            strategy,
            ctx,
        }
    }

    /// Race the classic bundle (fund + optional cancel + transfer, optional
    /// bribe) across the block window.
    pub async fn run(&self, mut req: PairRequest) -> Result<RunOutcome> {
        req.normalize();
        if req.amount.is_zero() {
            return Err(PairError::ZeroAmount.into());
        }
        if req.blocks == 0 {
            return Err(PairError::NoAttempts.into());
        }
        if self.relays.is_empty() {
            return Err(PairError::NoRelays.into());
        }
        let safe_signer = parse_private_key(&req.safe_pk)?;
        let from_signer = parse_private_key(&req.from_pk)?;
        if req.chain_id == 0 {
            req.chain_id = self.chain.chain_id().await?;
        }

        if req.skip_if_paused {
            if let Ok((known, paused)) = check_paused(&self.chain, req.token).await {
                if known && paused {
                    tracing::info!("pre-check: token is paused, skipping");
                    return Ok(RunOutcome::Restricted("token paused".to_string()));
                }
            }
        }
        if let Ok(restrictions) =
            check_restrictions(&self.chain, req.token, req.from, req.to).await
        {
            if restrictions.blocked() {
                let summary = restrictions.summary();
                tracing::info!("pre-check: token restricted: {summary}");
                return Ok(RunOutcome::Restricted(summary));
            }
        }

        // Limit guards are advisory: a breach warns but only preflight aborts.
        let limits = read_limits(&self.chain, req.token).await;
        if limits.any_known() {
            let recipient_balance = balance_of(&self.chain, req.token, req.to)
                .await
                .unwrap_or(U256::ZERO);
            for warning in limits.warnings(req.amount, recipient_balance) {
                tracing::warn!("limit guard: {warning}");
            }
        }

        let start_from_nonce = self.chain.nonce(req.from, NonceTag::Pending).await?;
        let mut previous_tip: Option<U256> = None;

        for attempt in 0..req.blocks {
            if self.ctx.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }

            let (base_fee, head) = project_base_fee(&self.chain).await?;
            let latest_nonce = self.chain.nonce(req.from, NonceTag::Latest).await?;
            let pending_nonce = self.chain.nonce(req.from, NonceTag::Pending).await?;
            if latest_nonce > start_from_nonce {
                tracing::warn!(
                    start = start_from_nonce,
                    now = latest_nonce,
                    "competing nonce detected before submission"
                );
                return Ok(RunOutcome::CompetingNonce);
            }

            let sponsor = safe_signer.address();
            let sponsor_nonce = self.chain.nonce(sponsor, NonceTag::Pending).await?;
            let sponsor_balance = self.chain.balance(sponsor).await?;
            tracing::info!("sponsor balance: {} ETH", fmt_eth(sponsor_balance));

            let tip = tip_for_attempt(
                &self.chain,
                req.tip_mode,
                req.tip_gwei,
                req.tip_mul,
                attempt,
                previous_tip,
            )
            .await;
            previous_tip = Some(tip);

            let live_token_balance = balance_of(&self.chain, req.token, req.from).await.ok();
            if let Some(balance) = live_token_balance {
                if balance < req.amount {
                    tracing::warn!(
                        "amount > balance: clamp {} -> {balance}",
                        req.amount
                    );
                }
            }
            let transfer_gas_estimate = match self
                .chain
                .estimate_gas(&CallRequest {
                    from: Some(req.from),
                    to: req.token,
                    data: erc20_transfer_calldata(
                        req.to,
                        live_token_balance.unwrap_or(req.amount).min(req.amount),
                    ),
                    ..Default::default()
                })
                .await
            {
                Ok(gas) => Some(gas),
                Err(err) => {
                    tracing::warn!("estimateGas for transfer failed ({err}); using fallback");
                    None
                }
            };

            let inputs = PlanInputs {
                head,
                base_fee,
                tip,
                latest_nonce,
                pending_nonce,
                sponsor_nonce,
                sponsor_balance,
                live_token_balance,
                transfer_gas_estimate,
            };
            let plan = match build_bundle_plan(&req, &inputs, attempt, &safe_signer, &from_signer)
            {
                Ok(plan) => plan,
                Err(RescueError::Pair(PairError::InsufficientSponsorFunds {
                    need_eth,
                    have_eth,
                })) => {
                    tracing::error!(
                        "sponsor balance insufficient at attempt {}/{}: need >= {need_eth} ETH, have {have_eth} ETH",
                        attempt + 1,
                        req.blocks
                    );
                    return Ok(RunOutcome::InsufficientSponsorFunds);
                }
                Err(other) => return Err(other),
            };

            tracing::info!(
                "attempt {}/{}: block={} gas={}(+{}) tip={} gwei feeCap={} gwei prefund={} ETH nonce(safe={}, from={}){}",
                attempt + 1,
                req.blocks,
                plan.target_block,
                plan.gas_transfer,
                plan.cancel_gas,
                fmt_gwei(plan.tip),
                fmt_gwei(plan.fee_cap),
                fmt_eth(plan.prefund_wei),
                plan.sponsor_nonce,
                plan.from_nonce,
                if plan.replace_mode { " (+replace)" } else { "" },
            );

            let txs_hex = plan.txs_hex();
            let sim_outcomes = self
                .transport
                .simulate_all(
                    &self.relays,
                    &self.strategy,
                    &txs_hex,
                    plan.target_block,
                    &self.ctx,
                )
                .await;
            let sim_ok = sim_outcomes.iter().any(|o| o.ok);
            for outcome in &sim_outcomes {
                if outcome.ok {
                    tracing::info!("sim {}: ok", outcome.relay);
                } else {
                    tracing::warn!("sim {}: {}", outcome.relay, outcome.error);
                }
            }

            if req.simulate_only {
                if !sim_ok {
                    let current = self.chain.nonce(req.from, NonceTag::Latest).await?;
                    if current > start_from_nonce {
                        return Ok(RunOutcome::CompetingNonce);
                    }
                    continue;
                }
                return Ok(RunOutcome::SimulateOnly);
            }

            let send_outcomes = self
                .transport
                .send_all(&self.relays, &self.strategy, &txs_hex, plan.target_block)
                .await;
            let mut any_accepted = false;
            for outcome in &send_outcomes {
                if outcome.accepted {
                    any_accepted = true;
                    tracing::info!("send {}: bundle submitted: {}", outcome.relay, outcome.raw);
                } else {
                    tracing::warn!(
                        "send {}: rejected: {} {}",
                        outcome.relay,
                        outcome.error,
                        outcome.raw
                    );
                }
            }
            if !any_accepted {
                // every relay said no; the next block window is the retry
                continue;
            }

            match wait_inclusion_or_compete(
                &self.chain,
                req.from,
                start_from_nonce,
                plan.transfer_hash,
                plan.target_block,
                DEFAULT_WAIT_MS,
            )
            .await?
            {
                InclusionOutcome::Included => return Ok(RunOutcome::Included),
                InclusionOutcome::CompetingNonce => return Ok(RunOutcome::CompetingNonce),
                InclusionOutcome::NotIncluded | InclusionOutcome::TimedOut => {}
            }
        }

        Ok(RunOutcome::Exhausted)
    }
}

/// Result of a delegated-code rescue submission.
#[derive(Debug, Clone)]
pub struct DelegatedRescue {
    pub tx_hash: B256,
    pub raw_tx_hex: String,
    pub relay_attempts: Vec<PrivateSendAttempt>,
}

impl DelegatedRescue {
    pub fn accepted(&self) -> bool {
        self.relay_attempts.iter().any(|a| a.accepted)
    }
}

/// Parameters for one delegated-code rescue.
#[derive(Debug, Clone)]
pub struct DelegatedRequest {
    pub chain_id: u64,
    pub token: Address,
    pub from_pk: String,
    pub safe_pk: String,
    pub recipient: Address,
    pub delegate: Address,
    pub amount: U256,
    pub route: DelegateRoute,
    pub tip_gwei: u64,
    pub auth_count: usize,
}

const DELEGATE_DEFAULT_TIP_GWEI: u64 = 2;
const SELL_DEADLINE_SECS: u64 = 20 * 60;

impl RescueRunner {
    /// Build, sign and privately submit one sponsored type-4 sweep.
    pub async fn run_delegated(&self, req: DelegatedRequest) -> Result<DelegatedRescue> {
        if self.relays.is_empty() {
            return Err(PairError::NoRelays.into());
        }
        let from_signer = parse_private_key(&req.from_pk)?;
        let safe_signer = parse_private_key(&req.safe_pk)?;
        let authority = from_signer.address();
        let sponsor = safe_signer.address();

        let (base_fee, head) = project_base_fee(&self.chain).await?;
        let tip = gwei_to_wei(if req.tip_gwei > 0 {
            req.tip_gwei
        } else {
            DELEGATE_DEFAULT_TIP_GWEI
        });
        // cap = max(2*base + tip, 2*tip): survives one full-block base bump
        // and never undercuts an aggressive tip.
        let mut cap = fee_cap(base_fee, 2, tip);
        let twice_tip = tip * U256::from(2u64);
        if twice_tip > cap {
            cap = twice_tip;
        }

        let calldata = match &req.route {
            DelegateRoute::Router { .. } => {
                let deadline = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0)
                    + SELL_DEADLINE_SECS;
                // accept any output; the private path removes the sandwich risk
                sell_to_eth_v2_calldata(
                    req.token,
                    req.amount,
                    U256::ZERO,
                    req.recipient,
                    U256::from(deadline),
                )
            }
            _ => sweep_erc20_calldata(&[req.token], req.recipient),
        };

        let auth_nonce = self.chain.nonce(authority, NonceTag::Latest).await?;
        let authorizations = build_authorizations(
            req.chain_id,
            authority,
            req.delegate,
            auth_nonce,
            req.auth_count.clamp(1, 8),
            &from_signer,
        )?;

        let sponsor_nonce = self.chain.nonce(sponsor, NonceTag::Latest).await?;
        let signed = sign_set_code_tx(
            SetCodeTxParams {
                chain_id: req.chain_id,
                sponsor_nonce,
                gas_limit: DELEGATE_CALL_GAS,
                tip,
                fee_cap: cap,
                authority,
                calldata,
                authorizations,
            },
            &safe_signer,
        )?;

        let raw_hex = signed.raw_hex();
        maybe_simulate_delegated(self, &raw_hex, head + 1).await;

        let relay_attempts = self.transport.send_private_all(&self.relays, &raw_hex).await;
        for attempt in &relay_attempts {
            tracing::info!(
                "private {} via {}: status={} accepted={}",
                attempt.method,
                attempt.relay,
                attempt.http_status,
                attempt.accepted
            );
        }

        Ok(DelegatedRescue {
            tx_hash: signed.hash,
            raw_tx_hex: raw_hex,
            relay_attempts,
        })
    }
}

/// Best-effort single-tx simulation before the private send: one relay (a
/// flashbots-shaped one if present), logged, never blocking the submission.
async fn maybe_simulate_delegated(runner: &RescueRunner, raw_tx_hex: &str, target_block: u64) {
    let relay = runner
        .relays
        .iter()
        .find(|r| r.is_flashbots())
        .or_else(|| runner.relays.first());
    let Some(relay) = relay else { return };

    let outcome = runner
        .transport
        .simulate(
            relay,
            &StrategyKnobs::default(),
            &[raw_tx_hex.to_string()],
            target_block,
        )
        .await;
    runner.ctx.push_sim_outcome(outcome.clone());
    if outcome.ok {
        tracing::info!("delegated sim {}: ok", outcome.relay);
    } else {
        tracing::warn!("delegated sim {}: {}", outcome.relay, outcome.error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_outcome_display() {
        assert_eq!(RunOutcome::Included.to_string(), "included");
        assert_eq!(RunOutcome::CompetingNonce.to_string(), "competing nonce");
        assert_eq!(RunOutcome::Exhausted.to_string(), "exhausted attempts");
        assert_eq!(
            RunOutcome::Restricted("paused".to_string()).to_string(),
            "restricted: paused"
        );
        assert_eq!(
            RunOutcome::InsufficientSponsorFunds.to_string(),
            "insufficient SAFE balance for fee+prefund"
        );
    }

    #[test]
    fn test_run_outcome_included_flag() {
        assert!(RunOutcome::Included.included());
        assert!(!RunOutcome::Exhausted.included());
        assert!(!RunOutcome::SimulateOnly.included());
    }
}
