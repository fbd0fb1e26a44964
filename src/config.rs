//! Environment-driven configuration.
//!
//! Key names mirror the operational env contract: `RPC_URL`, `RELAYS`,
//! `SAFE_PRIVATE_KEY` and friends. Values are validated before any network
//! I/O so misconfiguration surfaces immediately with exit code 2.

use crate::error::{ConfigError, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    pub rpc_url: String,
    /// Decimal or 0x-prefixed; `None` defers to on-chain `eth_chainId`.
    pub chain_id: Option<u64>,
    pub relays: Vec<String>,
    pub bloxroute_relay: Option<String>,
    pub bloxroute_auth_header: Option<(String, String)>,
    pub flashbots_auth_pk: Option<String>,
    pub safe_private_key: String,
    pub from_private_key: Option<String>,
    pub delegate_address: Option<String>,

    pub blocks: usize,
    pub tip_gwei: u64,
    pub tip_mul: f64,
    pub basefee_mul: u64,
    pub buffer_pct: u64,

    pub builders: Vec<String>,
    pub min_timestamp: u64,
    pub max_timestamp: u64,
    pub replacement_uuid: Option<String>,
    pub beaver_allow_buildernet_refunds: Option<bool>,
    pub beaver_refund_recipient: Option<String>,

    pub netcheck_blocks: usize,
    pub netcheck_pcts: Vec<u8>,

    pub auth_count: usize,
    pub rpc_max_concurrency: usize,
    pub telemetry_json: Option<String>,
}

fn get(keys: &[&str], default: &str) -> String {
    for key in keys {
        if let Ok(v) = env::var(key) {
            let v = v.trim().to_string();
            if !v.is_empty() {
                return v;
            }
        }
    }
    default.to_string()
}

fn get_opt(keys: &[&str]) -> Option<String> {
    let v = get(keys, "");
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

fn get_usize(keys: &[&str], default: usize) -> usize {
    get(keys, "").parse::<usize>().unwrap_or(default)
}

fn get_u64(keys: &[&str], default: u64) -> u64 {
    get(keys, "").parse::<u64>().unwrap_or(default)
}

fn get_f64(keys: &[&str], default: f64) -> f64 {
    get(keys, "").parse::<f64>().unwrap_or(default)
}

fn get_bool(keys: &[&str], default: bool) -> bool {
    let v = get(keys, "").to_ascii_lowercase();
    if v.is_empty() {
        return default;
    }
    matches!(v.as_str(), "1" | "true" | "yes" | "on")
}

pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_csv_percentiles(raw: &str, default: &[u8]) -> Vec<u8> {
    let parsed: Vec<u8> = raw
        .split(',')
        .filter_map(|s| s.trim().parse::<u8>().ok())
        .filter(|p| (1..=99).contains(p))
        .collect();
    if parsed.is_empty() {
        default.to_vec()
    } else {
        parsed
    }
}

fn validate_http_url(name: &str, raw: &str) -> Result<()> {
    let parsed = raw.parse::<reqwest::Url>().map_err(|e| {
        ConfigError::Invalid(format!("{name} must be a valid URL, got `{raw}`: {e}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "{name} must use http(s) scheme, got `{other}`"
        ))
        .into()),
    }
}

fn validate_hexish_key(name: &str, raw: &str) -> Result<()> {
    let trimmed = raw.trim().trim_start_matches("0x");
    let hexish = !trimmed.is_empty()
        && trimmed.len() % 2 == 0
        && trimmed.as_bytes().iter().all(|b| b.is_ascii_hexdigit());
    if !hexish {
        return Err(
            ConfigError::Invalid(format!("{name} must be hex (optionally 0x-prefixed)")).into(),
        );
    }
    Ok(())
}

fn strip_relay_prefix(url: &str) -> &str {
    for prefix in ["mm:", "mev:", "classic:"] {
        if let Some(rest) = url.strip_prefix(prefix) {
            return rest;
        }
    }
    url
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let rpc_url = get(&["RPC_URL", "rpc_url"], "");
        if rpc_url.is_empty() {
            return Err(ConfigError::Missing("RPC_URL must be set".to_string()).into());
        }
        validate_http_url("RPC_URL", &rpc_url)?;

        let chain_id = match get_opt(&["CHAIN_ID", "chain_id"]) {
            Some(raw) => Some(crate::units::parse_chain_id(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!("CHAIN_ID must be decimal or 0x-hex, got `{raw}`"))
            })?),
            None => None,
        };

        let mut relays_csv = get(&["RELAYS", "relays"], "https://relay.flashbots.net");
        let bloxroute_relay = get_opt(&["BLOXROUTE_RELAY", "bloxroute_relay"]);
        if let Some(blxr) = bloxroute_relay.as_deref() {
            if !relays_csv.contains(blxr) {
                relays_csv = format!("{relays_csv},{blxr}");
            }
        }
        let relays = split_csv(&relays_csv);
        for relay in &relays {
            validate_http_url("RELAYS entry", strip_relay_prefix(relay))?;
        }

        let safe_private_key = get(&["SAFE_PRIVATE_KEY", "safe_private_key"], "");
        if safe_private_key.is_empty() {
            return Err(ConfigError::Missing("SAFE_PRIVATE_KEY must be set".to_string()).into());
        }
        validate_hexish_key("SAFE_PRIVATE_KEY", &safe_private_key)?;

        let from_private_key = get_opt(&[
            "FROM_PRIVATE_KEY",
            "COMPROMISED_PRIVATE_KEY",
            "from_private_key",
        ]);
        if let Some(pk) = from_private_key.as_deref() {
            validate_hexish_key("FROM_PRIVATE_KEY", pk)?;
        }

        let flashbots_auth_pk = get_opt(&["FLASHBOTS_AUTH_PK", "flashbots_auth_pk"]);
        if let Some(pk) = flashbots_auth_pk.as_deref() {
            validate_hexish_key("FLASHBOTS_AUTH_PK", pk)?;
        }

        let bloxroute_auth_header = get_opt(&["BLOXROUTE_API_KEY", "BLOXROUTE_AUTH_HEADER"])
            .map(|token| ("Authorization".to_string(), token));

        Ok(Settings {
            rpc_url,
            chain_id,
            relays,
            bloxroute_relay,
            bloxroute_auth_header,
            flashbots_auth_pk,
            safe_private_key,
            from_private_key,
            delegate_address: get_opt(&["DELEGATE_ADDRESS", "delegate_address"]),
            blocks: get_usize(&["BLOCKS", "blocks"], 6),
            tip_gwei: get_u64(&["TIP_GWEI", "tip_gwei"], 3),
            tip_mul: get_f64(&["TIP_MUL", "tip_mul"], 1.25).max(1.0),
            basefee_mul: get_u64(&["BASEFEE_MUL", "basefee_mul"], 2).max(1),
            buffer_pct: get_u64(&["BUFFER_PCT", "buffer_pct"], 5),
            builders: split_csv(&get(&["BUILDERS", "builders"], "")),
            min_timestamp: get_u64(&["MIN_TIMESTAMP", "min_timestamp"], 0),
            max_timestamp: get_u64(&["MAX_TIMESTAMP", "max_timestamp"], 0),
            replacement_uuid: get_opt(&["REPLACEMENT_UUID", "replacement_uuid"]),
            beaver_allow_buildernet_refunds: match get(
                &["BEAVER_ALLOW_BUILDERNET_REFUNDS"],
                "",
            )
            .as_str()
            {
                "" => None,
                _ => Some(get_bool(&["BEAVER_ALLOW_BUILDERNET_REFUNDS"], true)),
            },
            beaver_refund_recipient: get_opt(&["BEAVER_REFUND_RECIPIENT"]),
            netcheck_blocks: get_usize(&["NETCHECK_BLOCKS", "netcheck_blocks"], 100),
            netcheck_pcts: parse_csv_percentiles(
                &get(&["NETCHECK_PCTS", "netcheck_pcts"], "50,95,99"),
                &[50, 95, 99],
            ),
            auth_count: get_usize(&["AUTH_COUNT"], 1).clamp(1, 8),
            rpc_max_concurrency: get_usize(&["BATCH_RPC_MAX_CONCURRENCY"], 16).clamp(1, 256),
            telemetry_json: get_opt(&["TELEMETRY_JSON"]),
        })
    }
}

/// Knobs for the non-interactive batch driver.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub input_path: String,
    pub out_ok_path: String,
    pub out_bad_path: String,
    pub rpc_delay_ms: u64,
    pub row_delay_ms: u64,
    pub pair_timeout_ms: u64,
    pub preflight_attempts: usize,
    pub preflight_attempt_timeout_ms: u64,
    pub show_pair_logs: bool,
    pub interactive_exit: bool,
}

impl BatchSettings {
    pub fn from_env() -> Result<Self> {
        let input_path = get(&["BATCH_INPUT", "batch_input"], "");
        if input_path.is_empty() {
            return Err(ConfigError::Missing(
                "BATCH_INPUT must point to a file with rows: token,privateKey".to_string(),
            )
            .into());
        }
        Ok(BatchSettings {
            input_path,
            out_ok_path: get(&["BATCH_OUT_OK"], "ok.csv"),
            out_bad_path: get(&["BATCH_OUT_BAD"], "bad.csv"),
            rpc_delay_ms: get_u64(&["BATCH_RPC_DELAY_MS"], 200),
            row_delay_ms: get_u64(&["BATCH_ROW_DELAY_MS"], 300),
            pair_timeout_ms: get_u64(&["BATCH_PAIR_TIMEOUT_MS"], 15_000),
            preflight_attempts: get_usize(&["BATCH_PREFLIGHT_ATTEMPTS"], 3).max(1),
            preflight_attempt_timeout_ms: get_u64(&["BATCH_PREFLIGHT_ATTEMPT_TIMEOUT_MS"], 4_000),
            show_pair_logs: get_bool(&["BATCH_PAIR_LOGS"], false),
            interactive_exit: get_bool(&["BATCH_INTERACTIVE"], false),
        })
    }
}
