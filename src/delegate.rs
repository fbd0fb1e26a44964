//! Delegated-code (type-4 / set-code) transaction assembly.
//!
//! The compromised EOA signs one or more sequential authorizations binding a
//! pre-deployed delegate contract to its address; the sponsor signs and pays
//! for the top-level transaction, whose calldata drives the delegate's sweep
//! or sell entrypoints in the EOA's own execution context.

use crate::error::PairError;
use crate::plan::tx::SignedTx;
use crate::token::{address_word, selector};
use alloy::consensus::{SignableTransaction, TxEip7702, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::eips::eip7702::{Authorization, SignedAuthorization};
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

/// Conservative gas limit for the sweep path: transfer ≈ 90k, V2 sell ≈
/// 220–300k, so 500k leaves headroom without estimation (nodes cannot
/// estimate across an authorization list anyway).
pub const DELEGATE_CALL_GAS: u64 = 500_000;

/// Build `count` sequential authorizations `[first_nonce .. first_nonce+count)`
/// delegating `delegate` onto `authority`. Each is signed by the authority key
/// and checked to recover back to the authority address.
pub fn build_authorizations(
    chain_id: u64,
    authority: Address,
    delegate: Address,
    first_nonce: u64,
    count: usize,
    authority_signer: &PrivateKeySigner,
) -> Result<Vec<SignedAuthorization>, PairError> {
    if count == 0 {
        return Err(PairError::Signing(
            "authorization count must be > 0".to_string(),
        ));
    }
    let mut auths = Vec::with_capacity(count);
    for i in 0..count {
        let auth = Authorization {
            chain_id,
            address: delegate,
            nonce: first_nonce + i as u64,
        };
        let digest = auth.signature_hash();
        let signature = authority_signer
            .sign_hash_sync(&digest)
            .map_err(|e| PairError::Signing(format!("authorization {i}: {e}")))?;
        let recovered = signature
            .recover_address_from_prehash(&digest)
            .map_err(|e| PairError::Signing(format!("authorization {i}: recover: {e}")))?;
        if recovered != authority {
            return Err(PairError::Signing(format!(
                "authorization {i}: authority mismatch (got {recovered}, want {authority})"
            )));
        }
        auths.push(auth.into_signed(signature));
    }
    Ok(auths)
}

/// `sweepERC20(address[] tokens, address to)` calldata.
pub fn sweep_erc20_calldata(tokens: &[Address], recipient: Address) -> Bytes {
    let mut data = selector("sweepERC20(address[],address)").to_vec();
    // head: offset to the dynamic array, then the recipient word
    data.extend_from_slice(&U256::from(0x40u64).to_be_bytes::<32>());
    data.extend_from_slice(&address_word(recipient));
    // tail: array length followed by the elements
    data.extend_from_slice(&U256::from(tokens.len()).to_be_bytes::<32>());
    for token in tokens {
        data.extend_from_slice(&address_word(*token));
    }
    Bytes::from(data)
}

/// `sellToETH_V2(address,uint256,uint256,address,uint256)` calldata.
pub fn sell_to_eth_v2_calldata(
    token_in: Address,
    amount_in: U256,
    amount_out_min_eth: U256,
    recipient: Address,
    deadline: U256,
) -> Bytes {
    let mut data = selector("sellToETH_V2(address,uint256,uint256,address,uint256)").to_vec();
    data.extend_from_slice(&address_word(token_in));
    data.extend_from_slice(&amount_in.to_be_bytes::<32>());
    data.extend_from_slice(&amount_out_min_eth.to_be_bytes::<32>());
    data.extend_from_slice(&address_word(recipient));
    data.extend_from_slice(&deadline.to_be_bytes::<32>());
    Bytes::from(data)
}

/// Accidental double-encoding leaves a second copy of the 4-byte selector in
/// the body. Solidity decoders ignore the tail so execution still succeeds,
/// which is exactly why it would otherwise go unnoticed.
pub fn has_duplicated_selector(calldata: &[u8]) -> bool {
    if calldata.len() <= 4 {
        return false;
    }
    let head = &calldata[..4];
    calldata[4..].windows(4).any(|w| w == head)
}

#[derive(Debug, Clone)]
pub struct SetCodeTxParams {
    pub chain_id: u64,
    pub sponsor_nonce: u64,
    pub gas_limit: u64,
    pub tip: U256,
    pub fee_cap: U256,
    /// Top-level call target: the compromised EOA whose code is delegated.
    pub authority: Address,
    pub calldata: Bytes,
    pub authorizations: Vec<SignedAuthorization>,
}

/// Build and sponsor-sign the type-4 transaction.
pub fn sign_set_code_tx(
    params: SetCodeTxParams,
    sponsor_signer: &PrivateKeySigner,
) -> Result<SignedTx, PairError> {
    if params.authorizations.is_empty() {
        return Err(PairError::Signing("empty authorization list".to_string()));
    }
    if has_duplicated_selector(&params.calldata) {
        tracing::warn!(
            len = params.calldata.len(),
            "duplicated calldata selector head detected"
        );
    }

    let mut tx = TxEip7702 {
        chain_id: params.chain_id,
        nonce: params.sponsor_nonce,
        gas_limit: params.gas_limit,
        max_fee_per_gas: params.fee_cap.saturating_to::<u128>(),
        max_priority_fee_per_gas: params.tip.saturating_to::<u128>(),
        to: params.authority,
        value: U256::ZERO,
        access_list: Default::default(),
        authorization_list: params.authorizations,
        input: params.calldata,
    };
    let signature = sponsor_signer
        .sign_transaction_sync(&mut tx)
        .map_err(|e| PairError::Signing(e.to_string()))?;
    let envelope = TxEnvelope::Eip7702(tx.into_signed(signature));
    let mut raw = Vec::new();
    envelope.encode_2718(&mut raw);
    let hash = *envelope.tx_hash();
    Ok(SignedTx {
        envelope,
        hash,
        raw: Bytes::from(raw),
    })
}
