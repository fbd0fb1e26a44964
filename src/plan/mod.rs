//! Per-attempt bundle planning.
//!
//! Turns one pair request plus a snapshot of chain state into an ordered,
//! signed transaction list with a solvency proof. Planning is pure given the
//! snapshot; the orchestrator gathers the snapshot and owns the attempt loop.

pub mod tx;

use crate::error::{PairError, Result};
use crate::fees::{fee_cap, TipMode};
use crate::plan::tx::{
    build_dynamic_tx, sign_dynamic_tx, SignedTx, BRIBE_INIT_CODE, CANCEL_GAS, DEFAULT_BRIBE_GAS,
    FALLBACK_TRANSFER_GAS, FUND_GAS,
};
use crate::token::erc20_transfer_calldata;
use crate::units::fmt_eth;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;

/// Immutable input for one rescue run.
#[derive(Debug, Clone)]
pub struct PairRequest {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub from_pk: String,
    pub safe_pk: String,
    pub chain_id: u64,

    /// Attempt window N.
    pub blocks: usize,
    pub tip_gwei: u64,
    pub tip_mul: f64,
    pub basefee_mul: u64,
    pub buffer_pct: u64,
    pub tip_mode: TipMode,

    pub bribe_wei: Option<U256>,
    pub bribe_gas: u64,

    pub min_timestamp: u64,
    pub max_timestamp: u64,
    pub replacement_uuid: Option<String>,

    pub simulate_only: bool,
    pub skip_if_paused: bool,
}

impl PairRequest {
    /// Defaults applied the same way the run loop always has: zero/negative
    /// fee knobs snap back to the documented defaults. A zero block window is
    /// left alone; the runner rejects it as "no attempts configured".
    pub fn normalize(&mut self) {
        if self.tip_gwei == 0 {
            self.tip_gwei = 3;
        }
        if self.tip_mul < 1.0 {
            self.tip_mul = 1.25;
        }
        if self.basefee_mul == 0 {
            self.basefee_mul = 2;
        }
    }
}

/// Chain-state snapshot an attempt plans against.
#[derive(Debug, Clone)]
pub struct PlanInputs {
    pub head: u64,
    pub base_fee: u128,
    pub tip: U256,
    pub latest_nonce: u64,
    pub pending_nonce: u64,
    pub sponsor_nonce: u64,
    pub sponsor_balance: U256,
    /// `None` when `balanceOf` could not be read; the requested amount stands.
    pub live_token_balance: Option<U256>,
    /// `None` when estimation failed; the fallback limit applies unbuffered.
    pub transfer_gas_estimate: Option<u64>,
}

/// One attempt's derived state: fees, nonce layout, funding math and the
/// ordered signed transactions. Immutable once built.
#[derive(Debug, Clone)]
pub struct BundlePlan {
    pub target_block: u64,
    pub base_fee: u128,
    pub tip: U256,
    pub fee_cap: U256,
    pub replace_mode: bool,
    pub from_nonce: u64,
    pub transfer_nonce: u64,
    pub sponsor_nonce: u64,
    pub gas_transfer: u64,
    pub cancel_gas: u64,
    pub prefund_wei: U256,
    pub need_total_wei: U256,
    pub amount: U256,
    pub clamped: bool,
    pub txs: Vec<SignedTx>,
    pub transfer_hash: B256,
}

impl BundlePlan {
    pub fn txs_hex(&self) -> Vec<String> {
        self.txs.iter().map(SignedTx::raw_hex).collect()
    }
}

fn apply_gas_buffer(estimate: u64, buffer_pct: u64) -> u64 {
    estimate.saturating_mul(100 + buffer_pct) / 100
}

/// Funding value: gas for transfer (+cancel) at the fee cap, with a 10%
/// headroom, rounded up.
fn prefund_value(gas_total: u64, cap: U256) -> U256 {
    let base = U256::from(gas_total) * cap;
    (base * U256::from(110u64) + U256::from(99u64)) / U256::from(100u64)
}

/// Build and sign one attempt. Fails only on terminal conditions (solvency,
/// signing); everything transient was resolved while gathering `inputs`.
pub fn build_bundle_plan(
    req: &PairRequest,
    inputs: &PlanInputs,
    attempt: usize,
    safe_signer: &PrivateKeySigner,
    from_signer: &PrivateKeySigner,
) -> Result<BundlePlan> {
    if req.amount.is_zero() {
        return Err(PairError::ZeroAmount.into());
    }

    let target_block = inputs.head + 1 + attempt as u64;
    let cap = fee_cap(inputs.base_fee, req.basefee_mul, inputs.tip);

    let replace_mode = inputs.pending_nonce > inputs.latest_nonce;
    let from_nonce = if replace_mode {
        inputs.latest_nonce
    } else {
        inputs.pending_nonce
    };
    let transfer_nonce = if replace_mode {
        from_nonce + 1
    } else {
        from_nonce
    };

    // Clamp to the live balance read just before signing. Preflight is not
    // re-run; the smaller transfer is a strict subset of the proven one.
    let (amount, clamped) = match inputs.live_token_balance {
        Some(balance) if balance < req.amount => (balance, true),
        _ => (req.amount, false),
    };

    let gas_transfer = match inputs.transfer_gas_estimate {
        Some(estimate) if estimate > 0 => apply_gas_buffer(estimate, req.buffer_pct),
        _ => FALLBACK_TRANSFER_GAS,
    };
    let cancel_gas = if replace_mode { CANCEL_GAS } else { 0 };

    let prefund = prefund_value(gas_transfer + cancel_gas, cap);

    let (bribe_value, bribe_gas) = match req.bribe_wei {
        Some(value) if !value.is_zero() => {
            let gas = if req.bribe_gas > 0 {
                req.bribe_gas
            } else {
                DEFAULT_BRIBE_GAS
            };
            (value, gas)
        }
        _ => (U256::ZERO, 0),
    };

    let sponsor_fee = U256::from(FUND_GAS + bribe_gas) * cap;
    let need_total = sponsor_fee + prefund + bribe_value;
    if inputs.sponsor_balance < need_total {
        return Err(PairError::InsufficientSponsorFunds {
            need_eth: fmt_eth(need_total),
            have_eth: fmt_eth(inputs.sponsor_balance),
        }
        .into());
    }

    let mut sponsor_nonce = inputs.sponsor_nonce;
    let mut txs = Vec::with_capacity(4);

    if !bribe_value.is_zero() {
        let bribe = build_dynamic_tx(
            req.chain_id,
            sponsor_nonce,
            TxKind::Create,
            bribe_value,
            bribe_gas,
            inputs.tip,
            cap,
            Bytes::from(BRIBE_INIT_CODE.to_vec()),
        );
        txs.push(sign_dynamic_tx(bribe, safe_signer)?);
        sponsor_nonce += 1;
    }

    let fund = build_dynamic_tx(
        req.chain_id,
        sponsor_nonce,
        TxKind::Call(req.from),
        prefund,
        FUND_GAS,
        inputs.tip,
        cap,
        Bytes::new(),
    );
    txs.push(sign_dynamic_tx(fund, safe_signer)?);

    if replace_mode {
        // Self-transfer at the stale nonce with identical fees, so a builder
        // that takes the transfer must take the displacement too.
        let cancel = build_dynamic_tx(
            req.chain_id,
            from_nonce,
            TxKind::Call(req.from),
            U256::ZERO,
            CANCEL_GAS,
            inputs.tip,
            cap,
            Bytes::new(),
        );
        txs.push(sign_dynamic_tx(cancel, from_signer)?);
    }

    let transfer = build_dynamic_tx(
        req.chain_id,
        transfer_nonce,
        TxKind::Call(req.token),
        U256::ZERO,
        gas_transfer,
        inputs.tip,
        cap,
        erc20_transfer_calldata(req.to, amount),
    );
    let transfer = sign_dynamic_tx(transfer, from_signer)?;
    let transfer_hash = transfer.hash;
    txs.push(transfer);

    Ok(BundlePlan {
        target_block,
        base_fee: inputs.base_fee,
        tip: inputs.tip,
        fee_cap: cap,
        replace_mode,
        from_nonce,
        transfer_nonce,
        sponsor_nonce: inputs.sponsor_nonce,
        gas_transfer,
        cancel_gas,
        prefund_wei: prefund,
        need_total_wei: need_total,
        amount,
        clamped,
        txs,
        transfer_hash,
    })
}
