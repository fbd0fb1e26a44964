//! EIP-1559 transaction construction and signing.

use crate::error::PairError;
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Bytes, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;

/// Init-code of the coinbase-bribe creation tx. Two opcodes: COINBASE;
/// SELFDESTRUCT. Carried verbatim from the deployed pattern; validate on a
/// fork before enabling the bribe knob.
pub const BRIBE_INIT_CODE: [u8; 2] = [0x41, 0xff];

pub const FUND_GAS: u64 = 21_000;
pub const CANCEL_GAS: u64 = 21_000;
pub const DEFAULT_BRIBE_GAS: u64 = 60_000;
/// Fallback transfer gas when estimation fails.
pub const FALLBACK_TRANSFER_GAS: u64 = 90_000;

/// A signed transaction plus its raw 2718 encoding and hash.
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub envelope: TxEnvelope,
    pub hash: B256,
    pub raw: Bytes,
}

impl SignedTx {
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

pub fn build_dynamic_tx(
    chain_id: u64,
    nonce: u64,
    to: TxKind,
    value: U256,
    gas_limit: u64,
    tip: U256,
    fee_cap: U256,
    data: Bytes,
) -> TxEip1559 {
    TxEip1559 {
        chain_id,
        nonce,
        gas_limit,
        max_fee_per_gas: fee_cap.saturating_to::<u128>(),
        max_priority_fee_per_gas: tip.saturating_to::<u128>(),
        to,
        value,
        access_list: Default::default(),
        input: data,
    }
}

pub fn sign_dynamic_tx(
    mut tx: TxEip1559,
    signer: &PrivateKeySigner,
) -> Result<SignedTx, PairError> {
    let signature = signer
        .sign_transaction_sync(&mut tx)
        .map_err(|e| PairError::Signing(e.to_string()))?;
    let envelope = TxEnvelope::Eip1559(tx.into_signed(signature));
    let mut raw = Vec::new();
    envelope.encode_2718(&mut raw);
    let hash = *envelope.tx_hash();
    Ok(SignedTx {
        envelope,
        hash,
        raw: Bytes::from(raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    fn test_signer() -> PrivateKeySigner {
        "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_sign_dynamic_tx_is_deterministic() {
        let tx = build_dynamic_tx(
            1,
            7,
            TxKind::Call(Address::repeat_byte(0x22)),
            U256::from(1u64),
            FUND_GAS,
            U256::from(3_000_000_000u64),
            U256::from(43_000_000_000u64),
            Bytes::new(),
        );
        let signer = test_signer();
        let a = sign_dynamic_tx(tx.clone(), &signer).unwrap();
        let b = sign_dynamic_tx(tx, &signer).unwrap();
        assert_eq!(a.raw, b.raw);
        assert_eq!(a.hash, b.hash);
        assert!(a.raw_hex().starts_with("0x02"));
    }

    #[test]
    fn test_bribe_creation_tx_shape() {
        let tx = build_dynamic_tx(
            1,
            0,
            TxKind::Create,
            U256::from(100u64),
            DEFAULT_BRIBE_GAS,
            U256::from(1u64),
            U256::from(2u64),
            Bytes::from(BRIBE_INIT_CODE.to_vec()),
        );
        assert_eq!(tx.to, TxKind::Create);
        assert_eq!(tx.input.as_ref(), &BRIBE_INIT_CODE);
        assert_eq!(tx.gas_limit, DEFAULT_BRIBE_GAS);
    }
}
