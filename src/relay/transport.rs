//! Relay transport: authenticated simulate/send fan-out.
//!
//! Every POST body is signed into the `X-Flashbots-Signature` header when the
//! relay kind wants it: keccak the body, EIP-191 text-hash the hex string of
//! that digest, sign, and send `address:signature_hex`. Cloud-API relays skip
//! the signature and rely on their static `Authorization` header.

use crate::context::{bundle_fingerprint, RuntimeContext, SimOutcome};
use crate::relay::{RelayDescriptor, RelayKind, StrategyKnobs};
use alloy::primitives::{eip191_hash_message, keccak256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};

const RELAY_HTTP_TIMEOUT_MS: u64 = 8_000;
const SIM_ATTEMPT_TIMEOUT_MS: u64 = 4_000;
const SIM_MAX_ATTEMPTS: usize = 3;
const SIM_RETRY_BASE_DELAY_MS: u64 = 250;

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub relay: String,
    pub accepted: bool,
    pub raw: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct PrivateSendAttempt {
    pub relay: String,
    pub method: String,
    pub http_status: u16,
    pub accepted: bool,
    pub body: String,
}

pub fn standard_bundle_payload(txs_hex: &[String], target_block: u64) -> Value {
    json!({
        "txs": txs_hex,
        "blockNumber": format!("0x{target_block:x}"),
    })
}

/// Standard payload plus the optional strategy fields each relay understands.
pub fn strategy_bundle_payload(
    knobs: &StrategyKnobs,
    relay: &RelayDescriptor,
    txs_hex: &[String],
    target_block: u64,
) -> Value {
    let mut payload = standard_bundle_payload(txs_hex, target_block);
    let obj = payload.as_object_mut().expect("payload is an object");

    if knobs.min_timestamp > 0 {
        obj.insert("minTimestamp".into(), json!(knobs.min_timestamp));
    }
    if knobs.max_timestamp > 0 {
        obj.insert("maxTimestamp".into(), json!(knobs.max_timestamp));
    }
    // Beaver rejects replacement UUIDs outright.
    if let Some(uuid) = knobs.replacement_uuid.as_deref() {
        if !uuid.is_empty() && !relay.is_beaver() {
            obj.insert("replacementUuid".into(), json!(uuid));
        }
    }
    if relay.is_flashbots() && !knobs.builders.is_empty() {
        obj.insert("builders".into(), json!(knobs.builders));
    }
    if relay.is_beaver() {
        if let Some(allow) = knobs.beaver_allow_buildernet_refunds {
            obj.insert("allowBuilderNetRefunds".into(), json!(allow));
        }
        if let Some(recipient) = knobs.beaver_refund_recipient.as_deref() {
            if !recipient.trim().is_empty() {
                obj.insert("builderNetRefundAddress".into(), json!(recipient));
            }
        }
    }
    payload
}

fn strip_0x_all(txs_hex: &[String]) -> Vec<String> {
    txs_hex
        .iter()
        .map(|h| h.trim_start_matches("0x").to_string())
        .collect()
}

fn jsonrpc_body(method: &str, params: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    }))
    .unwrap_or_default()
}

fn jsonrpc_error_message(parsed: &Value) -> Option<String> {
    let err = parsed.get("error")?;
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown JSON-RPC error");
    match err.get("code").and_then(Value::as_i64) {
        Some(code) => Some(format!("{code} {message}")),
        None => Some(message.to_string()),
    }
}

/// A simulate body is ok when there is no RPC-level error and no per-tx
/// `error`/`revert` entry in the result array.
pub fn sim_body_ok(parsed: &Value) -> (bool, String) {
    if let Some(message) = jsonrpc_error_message(parsed) {
        return (false, message);
    }
    let results = parsed
        .get("result")
        .and_then(|r| r.get("results"))
        .and_then(Value::as_array);
    if let Some(rows) = results {
        for row in rows {
            if let Some(err) = row.get("error") {
                if !err.is_null() {
                    let msg = err
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| err.to_string());
                    if !msg.is_empty() {
                        return (false, msg);
                    }
                }
            }
            if let Some(revert) = row.get("revert").and_then(Value::as_str) {
                if !revert.is_empty() {
                    return (false, revert.to_string());
                }
            }
        }
    }
    (true, String::new())
}

pub fn is_method_not_found(message: &str) -> bool {
    let low = message.to_ascii_lowercase();
    low.contains("method not found")
        || low.contains("unknown method")
        || low.contains("not available")
        || low.contains("unsupported")
        || low.contains("-32601")
}

/// Cloud plans without simulation entitlements answer with a "not supported"
/// error; that demotes to unsupported instead of failing the attempt.
pub fn is_sim_unsupported(message: &str) -> bool {
    message.to_ascii_lowercase().contains("not supported")
}

#[derive(Clone)]
pub struct RelayTransport {
    http: reqwest::Client,
    auth_signer: Option<Arc<PrivateKeySigner>>,
}

impl RelayTransport {
    pub fn new(auth_signer: Option<PrivateKeySigner>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(RELAY_HTTP_TIMEOUT_MS))
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!("relay HTTP client builder failed ({err}); using defaults");
                reqwest::Client::new()
            });
        Self {
            http,
            auth_signer: auth_signer.map(Arc::new),
        }
    }

    /// `address:0x<sig>` over EIP-191(text(keccak_hex(body))).
    pub fn body_signature(&self, body: &[u8]) -> Option<String> {
        let signer = self.auth_signer.as_deref()?;
        let body_hash_hex = keccak256(body).to_string();
        let digest = eip191_hash_message(body_hash_hex.as_bytes());
        let signature = signer.sign_hash_sync(&digest).ok()?;
        Some(format!(
            "{}:0x{}",
            signer.address(),
            hex::encode(signature.as_bytes())
        ))
    }

    async fn post(
        &self,
        relay: &RelayDescriptor,
        body: Vec<u8>,
        sign_body: bool,
        timeout_ms: u64,
    ) -> Result<(u16, String), String> {
        let mut request = self
            .http
            .post(&relay.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "bundle-rescue/0.4");
        for (name, value) in &relay.headers {
            request = request.header(name, value);
        }
        if sign_body {
            if let Some(signature) = self.body_signature(&body) {
                request = request
                    .header("X-Flashbots-Signature", signature.clone())
                    .header("x-auction-signature", signature);
            }
        }

        let response = timeout(Duration::from_millis(timeout_ms), request.body(body).send())
            .await
            .map_err(|_| format!("relay `{}` timed out after {timeout_ms}ms", relay.url))?
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let text = timeout(Duration::from_millis(timeout_ms), response.text())
            .await
            .map_err(|_| format!("relay `{}` body read timed out", relay.url))?
            .map_err(|e| e.to_string())?;
        Ok((status, text))
    }

    fn sim_payload(
        &self,
        relay: &RelayDescriptor,
        knobs: &StrategyKnobs,
        txs_hex: &[String],
        target_block: u64,
    ) -> Value {
        let mut payload = if knobs.enabled() {
            strategy_bundle_payload(knobs, relay, txs_hex, target_block)
        } else {
            standard_bundle_payload(txs_hex, target_block)
        };
        // Parent-of-target state base: with "latest" the funding tx is not yet
        // visible and relays misreport "insufficient ETH".
        let parent = target_block.saturating_sub(1);
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("stateBlockNumber".into(), json!(format!("0x{parent:x}")));
        }
        payload
    }

    async fn simulate_once(
        &self,
        relay: &RelayDescriptor,
        method: &str,
        payload: Value,
    ) -> Result<(String, bool, String), String> {
        let body = jsonrpc_body(method, json!([payload]));
        let needs_sig = relay.caps().needs_header_signature;
        let (status, text) = self
            .post(relay, body, needs_sig, SIM_ATTEMPT_TIMEOUT_MS)
            .await?;
        if status == 404 {
            return Ok((text, false, "simulation not supported by relay".into()));
        }
        let parsed: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => return Err(format!("non-JSON response (HTTP {status}): {e}")),
        };
        let (ok, err) = sim_body_ok(&parsed);
        Ok((text, ok, err))
    }

    /// Simulate against one relay, honoring the per-kind method taxonomy and
    /// the strategy-mode method fallback. Transient transport errors retry
    /// with exponential backoff.
    pub async fn simulate(
        &self,
        relay: &RelayDescriptor,
        knobs: &StrategyKnobs,
        txs_hex: &[String],
        target_block: u64,
    ) -> SimOutcome {
        if relay.kind == RelayKind::Cloud {
            return self.simulate_cloud(relay, txs_hex, target_block).await;
        }

        let payload = self.sim_payload(relay, knobs, txs_hex, target_block);
        let primary = match relay.kind {
            RelayKind::ClassicBundle => "eth_callBundle",
            RelayKind::Matchmaker => "mev_simBundle",
            RelayKind::Cloud => unreachable!(),
        };

        let mut delay_ms = SIM_RETRY_BASE_DELAY_MS;
        let mut last_error = String::new();
        for attempt in 1..=SIM_MAX_ATTEMPTS {
            match self.simulate_once(relay, primary, payload.clone()).await {
                Ok((raw, ok, err)) => {
                    // Strategy mode falls back across method names when the
                    // relay does not know the primary one.
                    if !ok && knobs.enabled() && is_method_not_found(&err) {
                        let fallback = match relay.kind {
                            RelayKind::ClassicBundle => "mev_simBundle",
                            _ => "eth_callBundle",
                        };
                        if let Ok((raw2, ok2, err2)) =
                            self.simulate_once(relay, fallback, payload.clone()).await
                        {
                            return SimOutcome {
                                relay: relay.url.clone(),
                                raw: raw2,
                                ok: ok2,
                                error: err2,
                            };
                        }
                    }
                    return SimOutcome {
                        relay: relay.url.clone(),
                        raw,
                        ok,
                        error: err,
                    };
                }
                Err(err) => {
                    last_error = err;
                    if attempt < SIM_MAX_ATTEMPTS {
                        sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = delay_ms.saturating_mul(2);
                    }
                }
            }
        }
        SimOutcome {
            relay: relay.url.clone(),
            raw: String::new(),
            ok: false,
            error: last_error,
        }
    }

    async fn simulate_cloud(
        &self,
        relay: &RelayDescriptor,
        txs_hex: &[String],
        target_block: u64,
    ) -> SimOutcome {
        let params = json!({
            "transaction": strip_0x_all(txs_hex),
            "block_number": format!("0x{target_block:x}"),
            "blockchain_network": "Mainnet",
        });
        let body = jsonrpc_body("blxr_simulate_bundle", params);
        match self.post(relay, body, false, SIM_ATTEMPT_TIMEOUT_MS).await {
            Ok((status, text)) => {
                if status != 200 {
                    return SimOutcome {
                        relay: relay.url.clone(),
                        raw: text,
                        ok: false,
                        error: format!("http {status}"),
                    };
                }
                let parsed: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        return SimOutcome {
                            relay: relay.url.clone(),
                            raw: text,
                            ok: false,
                            error: format!("bad JSON: {e}"),
                        }
                    }
                };
                if let Some(message) = jsonrpc_error_message(&parsed) {
                    // Non-entitled plans degrade to "unsupported"; the send
                    // phase may still proceed.
                    let error = if is_sim_unsupported(&message) {
                        "simulation unsupported".to_string()
                    } else {
                        message
                    };
                    return SimOutcome {
                        relay: relay.url.clone(),
                        raw: text,
                        ok: false,
                        error,
                    };
                }
                let (ok, err) = sim_body_ok(&parsed);
                SimOutcome {
                    relay: relay.url.clone(),
                    raw: text,
                    ok,
                    error: err,
                }
            }
            Err(err) => SimOutcome {
                relay: relay.url.clone(),
                raw: String::new(),
                ok: false,
                error: err,
            },
        }
    }

    async fn send_once(
        &self,
        relay: &RelayDescriptor,
        method: &str,
        params: Value,
    ) -> Result<(String, Option<String>), String> {
        let body = jsonrpc_body(method, params);
        let needs_sig = relay.caps().needs_header_signature;
        let (_status, text) = self
            .post(relay, body, needs_sig, RELAY_HTTP_TIMEOUT_MS)
            .await?;
        let parsed: Value = serde_json::from_str(&text).map_err(|e| format!("bad JSON: {e}"))?;
        Ok((text, jsonrpc_error_message(&parsed)))
    }

    /// Submit the bundle to one relay.
    pub async fn send(
        &self,
        relay: &RelayDescriptor,
        knobs: &StrategyKnobs,
        txs_hex: &[String],
        target_block: u64,
    ) -> SendOutcome {
        if relay.kind == RelayKind::Cloud {
            let params = json!({
                "transaction": strip_0x_all(txs_hex),
                "block_number": format!("0x{target_block:x}"),
            });
            return match self.send_once(relay, "blxr_submit_bundle", params).await {
                Ok((raw, None)) => SendOutcome {
                    relay: relay.url.clone(),
                    accepted: true,
                    raw,
                    error: String::new(),
                },
                Ok((raw, Some(err))) => SendOutcome {
                    relay: relay.url.clone(),
                    accepted: false,
                    raw,
                    error: err,
                },
                Err(err) => SendOutcome {
                    relay: relay.url.clone(),
                    accepted: false,
                    raw: String::new(),
                    error: err,
                },
            };
        }

        if !knobs.enabled() {
            let method = match relay.kind {
                RelayKind::ClassicBundle => "eth_sendBundle",
                RelayKind::Matchmaker => "mev_sendBundle",
                RelayKind::Cloud => unreachable!(),
            };
            let payload = standard_bundle_payload(txs_hex, target_block);
            return match self.send_once(relay, method, json!([payload])).await {
                Ok((raw, None)) => SendOutcome {
                    relay: relay.url.clone(),
                    accepted: true,
                    raw,
                    error: String::new(),
                },
                Ok((raw, Some(err))) => SendOutcome {
                    relay: relay.url.clone(),
                    accepted: false,
                    raw,
                    error: err,
                },
                Err(err) => SendOutcome {
                    relay: relay.url.clone(),
                    accepted: false,
                    raw: String::new(),
                    error: err,
                },
            };
        }

        // Strategy mode: eth_sendBundle first, mev_sendBundle on unknown-method.
        let payload = strategy_bundle_payload(knobs, relay, txs_hex, target_block);
        match self
            .send_once(relay, "eth_sendBundle", json!([payload.clone()]))
            .await
        {
            Ok((raw, None)) => SendOutcome {
                relay: relay.url.clone(),
                accepted: true,
                raw,
                error: String::new(),
            },
            Ok((raw, Some(err))) if is_method_not_found(&err) => {
                match self
                    .send_once(relay, "mev_sendBundle", json!([payload]))
                    .await
                {
                    Ok((raw2, None)) => SendOutcome {
                        relay: relay.url.clone(),
                        accepted: true,
                        raw: raw2,
                        error: String::new(),
                    },
                    Ok((raw2, Some(err2))) => SendOutcome {
                        relay: relay.url.clone(),
                        accepted: false,
                        raw: raw2,
                        error: err2,
                    },
                    Err(err2) => SendOutcome {
                        relay: relay.url.clone(),
                        accepted: false,
                        raw,
                        error: err2,
                    },
                }
            }
            Ok((raw, Some(err))) => SendOutcome {
                relay: relay.url.clone(),
                accepted: false,
                raw,
                error: err,
            },
            Err(err) => SendOutcome {
                relay: relay.url.clone(),
                accepted: false,
                raw: String::new(),
                error: err,
            },
        }
    }

    /// Private single-tx submission ladder, stopping at the first 2xx.
    pub async fn send_private(
        &self,
        relay: &RelayDescriptor,
        raw_tx_hex: &str,
    ) -> Vec<PrivateSendAttempt> {
        let mut methods = vec![
            "eth_sendPrivateTransaction",
            "eth_sendPrivateRawTransaction",
            "eth_sendRawTransaction",
        ];
        if relay.kind == RelayKind::Cloud {
            methods.insert(0, "blxr_private_tx");
        }

        let mut attempts = Vec::with_capacity(methods.len());
        for method in methods {
            let params = match method {
                "eth_sendPrivateTransaction" => json!([{ "tx": raw_tx_hex }]),
                "blxr_private_tx" => {
                    json!([{ "transaction": raw_tx_hex.trim_start_matches("0x") }])
                }
                _ => json!([raw_tx_hex]),
            };
            let body = jsonrpc_body(method, params);
            let sign_body = relay.wants_private_send_signature();
            let (status, text) = match self
                .post(relay, body, sign_body, RELAY_HTTP_TIMEOUT_MS)
                .await
            {
                Ok(pair) => pair,
                Err(err) => {
                    attempts.push(PrivateSendAttempt {
                        relay: relay.url.clone(),
                        method: method.to_string(),
                        http_status: 0,
                        accepted: false,
                        body: err,
                    });
                    continue;
                }
            };
            let accepted = (200..300).contains(&status);
            attempts.push(PrivateSendAttempt {
                relay: relay.url.clone(),
                method: method.to_string(),
                http_status: status,
                accepted,
                body: text,
            });
            if accepted {
                break;
            }
        }
        attempts
    }

    /// Fan out simulation to every relay; a barrier joins all completions.
    /// Each outcome is also pushed to the context's sim sink.
    pub async fn simulate_all(
        &self,
        relays: &[RelayDescriptor],
        knobs: &StrategyKnobs,
        txs_hex: &[String],
        target_block: u64,
        ctx: &RuntimeContext,
    ) -> Vec<SimOutcome> {
        maybe_log_bundle_once(ctx, target_block, txs_hex);
        let mut tasks = Vec::with_capacity(relays.len());
        for relay in relays {
            let transport = self.clone();
            let relay = relay.clone();
            let knobs = knobs.clone();
            let txs = txs_hex.to_vec();
            tasks.push(tokio::spawn(async move {
                transport.simulate(&relay, &knobs, &txs, target_block).await
            }));
        }
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(outcome) => {
                    ctx.push_sim_outcome(outcome.clone());
                    outcomes.push(outcome);
                }
                Err(err) => outcomes.push(SimOutcome {
                    relay: String::new(),
                    raw: String::new(),
                    ok: false,
                    error: format!("simulate join error: {err}"),
                }),
            }
        }
        outcomes
    }

    /// Fan out submission to every relay; a barrier joins all completions.
    pub async fn send_all(
        &self,
        relays: &[RelayDescriptor],
        knobs: &StrategyKnobs,
        txs_hex: &[String],
        target_block: u64,
    ) -> Vec<SendOutcome> {
        let mut tasks = Vec::with_capacity(relays.len());
        for relay in relays {
            let transport = self.clone();
            let relay = relay.clone();
            let knobs = knobs.clone();
            let txs = txs_hex.to_vec();
            tasks.push(tokio::spawn(async move {
                transport.send(&relay, &knobs, &txs, target_block).await
            }));
        }
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => outcomes.push(SendOutcome {
                    relay: String::new(),
                    accepted: false,
                    raw: String::new(),
                    error: format!("send join error: {err}"),
                }),
            }
        }
        outcomes
    }

    /// Fan out the private-tx ladder across relays.
    pub async fn send_private_all(
        &self,
        relays: &[RelayDescriptor],
        raw_tx_hex: &str,
    ) -> Vec<PrivateSendAttempt> {
        let mut tasks = Vec::with_capacity(relays.len());
        for relay in relays {
            let transport = self.clone();
            let relay = relay.clone();
            let raw = raw_tx_hex.to_string();
            tasks.push(tokio::spawn(async move {
                transport.send_private(&relay, &raw).await
            }));
        }
        let mut attempts = Vec::new();
        for task in tasks {
            if let Ok(mut relay_attempts) = task.await {
                attempts.append(&mut relay_attempts);
            }
        }
        attempts
    }
}

/// Dump the bundle contents once per (target block, size vector).
fn maybe_log_bundle_once(ctx: &RuntimeContext, target_block: u64, txs_hex: &[String]) {
    let fingerprint = bundle_fingerprint(target_block, txs_hex);
    if !ctx.first_sighting(&fingerprint) {
        return;
    }
    tracing::info!(block = target_block, txs = txs_hex.len(), "bundle assembled");
    for (i, raw) in txs_hex.iter().enumerate() {
        match hex::decode(raw.trim_start_matches("0x")) {
            Ok(bytes) => {
                let hash = keccak256(&bytes);
                tracing::debug!("  tx[{i}]: hash={hash} size={} bytes", bytes.len());
            }
            Err(_) => tracing::debug!("  tx[{i}]: size=? (decode error)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn relay(url: &str, kind: RelayKind) -> RelayDescriptor {
        RelayDescriptor {
            url: url.to_string(),
            kind,
            headers: HashMap::new(),
        }
    }

    fn txs() -> Vec<String> {
        vec!["0xdead".to_string(), "0xbeef".to_string()]
    }

    #[test]
    fn test_standard_payload_shape() {
        let payload = standard_bundle_payload(&txs(), 100);
        assert_eq!(payload["blockNumber"], "0x64");
        assert_eq!(payload["txs"].as_array().unwrap().len(), 2);
        assert!(payload.get("minTimestamp").is_none());
    }

    #[test]
    fn test_strategy_payload_flashbots_builders() {
        let fb = relay("https://relay.flashbots.net", RelayKind::ClassicBundle);
        let beaver = relay("https://rpc.beaverbuild.org", RelayKind::ClassicBundle);
        let knobs = StrategyKnobs {
            min_timestamp: 10,
            max_timestamp: 20,
            replacement_uuid: Some("uuid-1".to_string()),
            builders: vec!["beaverbuild".to_string()],
            ..Default::default()
        };

        let p_fb = strategy_bundle_payload(&knobs, &fb, &txs(), 100);
        assert_eq!(p_fb["minTimestamp"], 10);
        assert_eq!(p_fb["maxTimestamp"], 20);
        assert_eq!(p_fb["replacementUuid"], "uuid-1");
        assert!(p_fb.get("builders").is_some());

        // Beaver: no builders list, no replacement UUID
        let p_bv = strategy_bundle_payload(&knobs, &beaver, &txs(), 100);
        assert!(p_bv.get("builders").is_none());
        assert!(p_bv.get("replacementUuid").is_none());
    }

    #[test]
    fn test_strategy_payload_beaver_refund_knobs() {
        let beaver = relay("https://rpc.beaverbuild.org", RelayKind::ClassicBundle);
        let knobs = StrategyKnobs {
            beaver_allow_buildernet_refunds: Some(true),
            beaver_refund_recipient: Some("0x1111111111111111111111111111111111111111".into()),
            ..Default::default()
        };
        let payload = strategy_bundle_payload(&knobs, &beaver, &txs(), 5);
        assert_eq!(payload["allowBuilderNetRefunds"], true);
        assert!(payload.get("builderNetRefundAddress").is_some());

        let other = relay("https://relay.flashbots.net", RelayKind::ClassicBundle);
        let payload = strategy_bundle_payload(&knobs, &other, &txs(), 5);
        assert!(payload.get("allowBuilderNetRefunds").is_none());
    }

    #[test]
    fn test_sim_body_ok_rules() {
        let ok: Value = serde_json::from_str(r#"{"result":{"results":[{}]}}"#).unwrap();
        assert!(sim_body_ok(&ok).0);

        let rpc_err: Value =
            serde_json::from_str(r#"{"error":{"code":-32000,"message":"bundle rejected"}}"#)
                .unwrap();
        let (is_ok, msg) = sim_body_ok(&rpc_err);
        assert!(!is_ok);
        assert!(msg.contains("bundle rejected"));

        let tx_err: Value = serde_json::from_str(
            r#"{"result":{"results":[{"error":"execution reverted","revert":""}]}}"#,
        )
        .unwrap();
        let (is_ok, msg) = sim_body_ok(&tx_err);
        assert!(!is_ok);
        assert!(msg.contains("execution reverted"));

        let tx_revert: Value =
            serde_json::from_str(r#"{"result":{"results":[{"revert":"0xdead"}]}}"#).unwrap();
        assert!(!sim_body_ok(&tx_revert).0);
    }

    #[test]
    fn test_method_not_found_detection() {
        assert!(is_method_not_found("Method not found"));
        assert!(is_method_not_found("-32601 unknown method"));
        assert!(is_method_not_found("unsupported: eth_callBundle"));
        assert!(!is_method_not_found("execution reverted"));
    }

    #[test]
    fn test_sim_unsupported_detection() {
        assert!(is_sim_unsupported("simulation not supported on matchmaker"));
        assert!(!is_sim_unsupported("insufficient funds"));
    }

    #[test]
    fn test_strip_0x() {
        assert_eq!(
            strip_0x_all(&["0xab".to_string(), "cd".to_string()]),
            vec!["ab".to_string(), "cd".to_string()]
        );
    }

    #[test]
    fn test_body_signature_recovers_to_signer() {
        let signer: PrivateKeySigner =
            "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
                .parse()
                .unwrap();
        let expected = signer.address();
        let transport = RelayTransport::new(Some(signer));

        let body = br#"{"jsonrpc":"2.0","id":1,"method":"eth_sendBundle","params":[]}"#;
        let header = transport.body_signature(body).unwrap();
        let (addr_part, sig_part) = header.split_once(':').unwrap();
        assert_eq!(addr_part, expected.to_string());

        // verify: recover over EIP-191(text(keccak_hex(body)))
        let digest = eip191_hash_message(keccak256(body).to_string().as_bytes());
        let sig_bytes = hex::decode(sig_part.trim_start_matches("0x")).unwrap();
        let signature = alloy::primitives::Signature::try_from(sig_bytes.as_slice()).unwrap();
        let recovered = signature.recover_address_from_prehash(&digest).unwrap();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn test_body_signature_absent_without_key() {
        let transport = RelayTransport::new(None);
        assert!(transport.body_signature(b"{}").is_none());
    }
}
