//! Thin JSON-RPC chain client.
//!
//! Reads head/base-fee, nonces, balances, receipts; runs view calls and gas
//! estimation with a bounded retry policy. Every call goes through the global
//! RPC gate and carries its own deadline. Errors are absorbed here and
//! converted to coarse classes so callers never see raw transport noise.

use crate::context::RuntimeContext;
use crate::error::{Result, RpcError, RpcErrorKind};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::transports::http::Http;
use reqwest::Client;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};

pub type HttpProvider = RootProvider<Http<Client>>;

const RPC_CALL_TIMEOUT_MS: u64 = 10_000;
const RETRY_MAX_ATTEMPTS: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 200;
const RPC_ERR_MAX_LEN: usize = 260;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceTag {
    Latest,
    Pending,
}

impl NonceTag {
    fn as_str(&self) -> &'static str {
        match self {
            NonceTag::Latest => "latest",
            NonceTag::Pending => "pending",
        }
    }
}

/// A view call / gas-estimation message.
#[derive(Debug, Clone, Default)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub gas: Option<u64>,
    pub value: Option<U256>,
    pub data: Bytes,
}

impl CallRequest {
    fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        if let Some(from) = self.from {
            obj.insert("from".into(), json!(format!("{from:#x}")));
        }
        obj.insert("to".into(), json!(format!("{:#x}", self.to)));
        if let Some(gas) = self.gas {
            obj.insert("gas".into(), json!(format!("0x{gas:x}")));
        }
        if let Some(value) = self.value {
            obj.insert("value".into(), json!(format!("0x{value:x}")));
        }
        obj.insert("data".into(), json!(format!("0x{}", hex::encode(&self.data))));
        Value::Object(obj)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Head {
    pub number: u64,
    pub base_fee: Option<u128>,
}

#[derive(Debug, Clone, Default)]
pub struct FeeHistory {
    pub base_fee_per_gas: Vec<u128>,
    pub reward: Vec<Vec<u128>>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiptStatus {
    pub block_number: u64,
    pub success: bool,
}

pub fn is_rate_limited_rpc_error(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("429")
        || msg.contains("rate limit")
        || msg.contains("too many requests")
        || msg.contains("-32005")
}

pub fn is_revert_rpc_error(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("execution reverted") || msg.contains("revert") || msg.contains("invalid opcode")
}

fn is_retryable_rpc_error(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    let non_retryable = [
        "method not found",
        "-32601",
        "invalid params",
        "-32602",
        "execution reverted",
        "revert",
        "invalid opcode",
        "parse error",
        "-32700",
    ];
    !non_retryable.iter().any(|needle| msg.contains(needle))
}

pub fn classify_rpc_error(message: &str) -> RpcErrorKind {
    let msg = message.to_ascii_lowercase();
    if is_revert_rpc_error(&msg) {
        return RpcErrorKind::Revert;
    }
    if is_rate_limited_rpc_error(&msg) {
        return RpcErrorKind::RateLimited;
    }
    if msg.contains("timed out") || msg.contains("deadline exceeded") || msg.contains("timeout") {
        return RpcErrorKind::Timeout;
    }
    if msg.contains("connection reset")
        || msg.contains("broken pipe")
        || msg.contains("eof")
        || msg.contains("dns")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("504")
    {
        return RpcErrorKind::Unavailable;
    }
    RpcErrorKind::Other
}

fn compact_message(message: &str) -> String {
    let one_line = message.split('\n').next().unwrap_or(message);
    if one_line.len() <= RPC_ERR_MAX_LEN {
        one_line.to_string()
    } else {
        format!("{}…", &one_line[..RPC_ERR_MAX_LEN])
    }
}

fn parse_hex_u64(raw: &str) -> std::result::Result<u64, RpcError> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::BadPayload(format!("bad hex quantity `{raw}`: {e}")))
}

fn parse_hex_u128(raw: &str) -> std::result::Result<u128, RpcError> {
    u128::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::BadPayload(format!("bad hex quantity `{raw}`: {e}")))
}

fn parse_hex_u256(raw: &str) -> std::result::Result<U256, RpcError> {
    U256::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::BadPayload(format!("bad hex quantity `{raw}`: {e}")))
}

fn parse_hex_bytes(raw: &str) -> std::result::Result<Bytes, RpcError> {
    let bytes = hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| RpcError::BadPayload(format!("bad hex bytes: {e}")))?;
    Ok(Bytes::from(bytes))
}

#[derive(Clone)]
pub struct ChainClient {
    provider: Arc<HttpProvider>,
    ctx: RuntimeContext,
    call_timeout_ms: u64,
}

impl ChainClient {
    pub fn new(rpc_url: &str, ctx: RuntimeContext) -> Result<Self> {
        let parsed = rpc_url
            .parse::<reqwest::Url>()
            .map_err(|e| RpcError::InvalidUrl {
                url: rpc_url.to_string(),
                reason: e.to_string(),
            })?;
        let provider = ProviderBuilder::new().on_http(parsed);
        Ok(Self {
            provider: Arc::new(provider),
            ctx,
            call_timeout_ms: std::env::var("RPC_CALL_TIMEOUT_MS")
                .ok()
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .filter(|v| (250..=30_000).contains(v))
                .unwrap_or(RPC_CALL_TIMEOUT_MS),
        })
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    /// Retry loop shared by every RPC: ≤3 attempts, 200 ms initial delay,
    /// doubled when the failure class is rate-limit.
    async fn with_retry<T, Op, Fut>(&self, label: &str, mut op: Op) -> Result<T>
    where
        Op: FnMut(Arc<HttpProvider>) -> Fut,
        Fut: Future<Output = std::result::Result<T, String>>,
    {
        let mut delay_ms = RETRY_BASE_DELAY_MS;
        let mut last_message = String::new();
        let mut last_kind = RpcErrorKind::Other;

        for attempt in 1..=RETRY_MAX_ATTEMPTS {
            if self.ctx.is_cancelled() {
                return Err(RpcError::Exhausted {
                    kind: RpcErrorKind::Other,
                    attempts: attempt,
                    message: format!("{label}: cancelled"),
                }
                .into());
            }

            let _slot = self.ctx.acquire_rpc_slot().await;
            let outcome = timeout(
                Duration::from_millis(self.call_timeout_ms),
                op(self.provider.clone()),
            )
            .await;
            drop(_slot);

            match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(message)) => {
                    let message = compact_message(&message);
                    last_kind = classify_rpc_error(&message);
                    let retryable = is_retryable_rpc_error(&message);
                    last_message = message;
                    if !retryable || attempt == RETRY_MAX_ATTEMPTS {
                        break;
                    }
                }
                Err(_) => {
                    last_kind = RpcErrorKind::Timeout;
                    last_message = format!("timed out after {}ms", self.call_timeout_ms);
                    if attempt == RETRY_MAX_ATTEMPTS {
                        break;
                    }
                }
            }

            sleep(Duration::from_millis(delay_ms)).await;
            if last_kind == RpcErrorKind::RateLimited {
                delay_ms = delay_ms.saturating_mul(2);
            }
        }

        Err(RpcError::Exhausted {
            kind: last_kind,
            attempts: RETRY_MAX_ATTEMPTS,
            message: format!("{label}: {last_message}"),
        }
        .into())
    }

    async fn raw<T: serde::de::DeserializeOwned>(
        provider: Arc<HttpProvider>,
        method: &'static str,
        params: Value,
    ) -> std::result::Result<T, String> {
        provider
            .raw_request::<_, T>(Cow::Borrowed(method), params)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let raw: String = self
            .with_retry("eth_chainId", |p| Self::raw(p, "eth_chainId", json!([])))
            .await?;
        Ok(parse_hex_u64(&raw)?)
    }

    /// Latest head: block number plus base fee when the chain has one.
    pub async fn head(&self) -> Result<Head> {
        let block: Value = self
            .with_retry("eth_getBlockByNumber(latest)", |p| {
                Self::raw(p, "eth_getBlockByNumber", json!(["latest", false]))
            })
            .await?;
        let number = block
            .get("number")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::BadPayload("header without number".into()))?;
        let base_fee = match block.get("baseFeePerGas").and_then(Value::as_str) {
            Some(raw) => Some(parse_hex_u128(raw)?),
            None => None,
        };
        Ok(Head {
            number: parse_hex_u64(number)?,
            base_fee,
        })
    }

    pub async fn nonce(&self, address: Address, tag: NonceTag) -> Result<u64> {
        let raw: String = self
            .with_retry("eth_getTransactionCount", move |p| {
                Self::raw(
                    p,
                    "eth_getTransactionCount",
                    json!([format!("{address:#x}"), tag.as_str()]),
                )
            })
            .await?;
        Ok(parse_hex_u64(&raw)?)
    }

    pub async fn balance(&self, address: Address) -> Result<U256> {
        self.with_retry("eth_getBalance", move |p| async move {
            p.get_balance(address).await.map_err(|e| e.to_string())
        })
        .await
    }

    pub async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.with_retry("eth_getCode", move |p| async move {
            p.get_code_at(address).await.map_err(|e| e.to_string())
        })
        .await
    }

    /// View call. Reverts surface as `RpcErrorKind::Revert` with the node's
    /// message preserved, never retried.
    pub async fn call(&self, msg: &CallRequest) -> Result<Bytes> {
        let params = json!([msg.to_json(), "latest"]);
        let raw: String = self
            .with_retry("eth_call", move |p| {
                Self::raw(p, "eth_call", params.clone())
            })
            .await?;
        Ok(parse_hex_bytes(&raw)?)
    }

    /// View call with non-empty code attached to `override_address`, the
    /// execution context a delegated-code transaction would run under.
    pub async fn call_with_code_override(
        &self,
        msg: &CallRequest,
        override_address: Address,
    ) -> Result<Bytes> {
        let overrides = json!({
            format!("{override_address:#x}"): { "code": "0x00" }
        });
        let params = json!([msg.to_json(), "latest", overrides]);
        let raw: String = self
            .with_retry("eth_call(stateOverride)", move |p| {
                Self::raw(p, "eth_call", params.clone())
            })
            .await?;
        Ok(parse_hex_bytes(&raw)?)
    }

    pub async fn estimate_gas(&self, msg: &CallRequest) -> Result<u64> {
        let params = json!([msg.to_json()]);
        let raw: String = self
            .with_retry("eth_estimateGas", move |p| {
                Self::raw(p, "eth_estimateGas", params.clone())
            })
            .await?;
        Ok(parse_hex_u64(&raw)?)
    }

    /// `eth_feeHistory` over `window` blocks ending at the pending block.
    pub async fn fee_history(&self, window: usize, percentiles: &[u8]) -> Result<FeeHistory> {
        let pcts: Vec<u64> = percentiles.iter().map(|p| *p as u64).collect();
        let params = json!([format!("0x{window:x}"), "pending", pcts]);
        let result: Value = self
            .with_retry("eth_feeHistory", move |p| {
                Self::raw(p, "eth_feeHistory", params.clone())
            })
            .await?;

        let mut out = FeeHistory::default();
        if let Some(base_fees) = result.get("baseFeePerGas").and_then(Value::as_array) {
            for entry in base_fees {
                if let Some(raw) = entry.as_str() {
                    out.base_fee_per_gas.push(parse_hex_u128(raw)?);
                }
            }
        }
        if let Some(rows) = result.get("reward").and_then(Value::as_array) {
            for row in rows {
                let mut parsed_row = Vec::new();
                if let Some(cells) = row.as_array() {
                    for cell in cells {
                        if let Some(raw) = cell.as_str() {
                            parsed_row.push(parse_hex_u128(raw)?);
                        }
                    }
                }
                out.reward.push(parsed_row);
            }
        }
        Ok(out)
    }

    pub async fn receipt(&self, tx_hash: B256) -> Result<Option<ReceiptStatus>> {
        let result: Value = self
            .with_retry("eth_getTransactionReceipt", move |p| {
                Self::raw(
                    p,
                    "eth_getTransactionReceipt",
                    json!([format!("{tx_hash:#x}")]),
                )
            })
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let block_number = match result.get("blockNumber").and_then(Value::as_str) {
            Some(raw) => parse_hex_u64(raw)?,
            None => return Ok(None),
        };
        let success = result
            .get("status")
            .and_then(Value::as_str)
            .map(|s| parse_hex_u64(s).unwrap_or(0) == 1)
            .unwrap_or(false);
        Ok(Some(ReceiptStatus {
            block_number,
            success,
        }))
    }

    /// `eth_maxPriorityFeePerGas`, best-effort: errors come back as `None`.
    pub async fn suggest_priority_fee(&self) -> Option<U256> {
        let raw: String = self
            .with_retry("eth_maxPriorityFeePerGas", |p| {
                Self::raw(p, "eth_maxPriorityFeePerGas", json!([]))
            })
            .await
            .ok()?;
        parse_hex_u256(&raw).ok()
    }

    /// Full block bodies for the bribe scanner; `None` when the block is unknown.
    pub async fn block_with_txs(&self, number: u64) -> Result<Option<Value>> {
        let result: Value = self
            .with_retry("eth_getBlockByNumber(full)", move |p| {
                Self::raw(
                    p,
                    "eth_getBlockByNumber",
                    json!([format!("0x{number:x}"), true]),
                )
            })
            .await?;
        if result.is_null() {
            Ok(None)
        } else {
            Ok(Some(result))
        }
    }
}
