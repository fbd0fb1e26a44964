//! Non-interactive batch processing.
//!
//! Reads (token, privateKey) pairs from CSV (auto `,`/`;`), plain text
//! (`<privateKey> <tokenAddress>`) or a JSON array, screens each pair
//! (metadata, restrictions, preflight), and splits them into `ok.csv` /
//! `bad.csv`. With an execute mode enabled, surviving pairs are pushed
//! through the rescue runner. Relay chatter lands in a per-run log file.

use crate::chain::ChainClient;
use crate::config::{BatchSettings, Settings};
use crate::context::RuntimeContext;
use crate::error::RescueError;
use crate::fees::TipMode;
use crate::plan::PairRequest;
use crate::relay::transport::RelayTransport;
use crate::relay::{classify_relays, StrategyKnobs};
use crate::runner::{DelegatedRequest, RescueRunner};
use crate::token::preflight::{
    is_optional_return_candidate, optional_return_transfer_call, preflight_delegated,
    preflight_transfer, DelegateRoute, Viability,
};
use crate::token::restrictions::check_restrictions;
use crate::token::{balance_of, decimals, symbol};
use crate::units::{fmt_token_units, parse_private_key};
use alloy::primitives::{Address, U256};
use chrono::Local;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::time::{sleep, timeout, Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub token: String,
    pub private_key: String,
}

#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub line_no: usize,
    pub raw: String,
    pub entry: Result<BatchEntry, String>,
}

fn detect_delimiter(data: &str) -> char {
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.contains(';') && !line.contains(',') {
            return ';';
        }
        break;
    }
    ','
}

fn is_csv_header(line: &str) -> bool {
    let low = line.to_ascii_lowercase();
    low.contains("token") && (low.contains("priv") || low.contains("address"))
}

#[derive(Deserialize)]
struct JsonRow {
    token: String,
    #[serde(rename = "privateKey")]
    private_key: String,
}

fn parse_json_rows(data: &str) -> Vec<ParsedRow> {
    match serde_json::from_str::<Vec<JsonRow>>(data) {
        Ok(rows) => rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| ParsedRow {
                line_no: i + 1,
                raw: String::new(),
                entry: Ok(BatchEntry {
                    token: row.token.trim().to_string(),
                    private_key: row.private_key.trim().to_string(),
                }),
            })
            .collect(),
        Err(e) => vec![ParsedRow {
            line_no: 1,
            raw: String::new(),
            entry: Err(format!("bad JSON input: {e}")),
        }],
    }
}

/// Parse batch input in any of the three accepted formats. Malformed rows come
/// back as errors with a reason so they can be routed to the `bad` output.
pub fn parse_batch_input(data: &str) -> Vec<ParsedRow> {
    let trimmed = data.trim_start_matches('\u{feff}').trim();
    if trimmed.starts_with('[') {
        return parse_json_rows(trimmed);
    }

    let delimiter = detect_delimiter(trimmed);
    let mut out = Vec::new();
    for (idx, line) in trimmed.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line_no == 1 && is_csv_header(line) {
            continue;
        }

        let entry = if line.contains(delimiter) {
            // CSV: token,privateKey[,...]
            let fields: Vec<&str> = line.split(delimiter).map(str::trim).collect();
            if fields.len() < 2 || fields[0].is_empty() || fields[1].is_empty() {
                Err("not enough columns, expected token,privateKey".to_string())
            } else {
                Ok(BatchEntry {
                    token: fields[0].to_string(),
                    private_key: fields[1].to_string(),
                })
            }
        } else {
            // plain text: <privateKey> <tokenAddress>
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(pk), Some(token)) => Ok(BatchEntry {
                    token: token.to_string(),
                    private_key: pk.to_string(),
                }),
                _ => Err("expected `<privateKey> <tokenAddress>`".to_string()),
            }
        };
        out.push(ParsedRow {
            line_no,
            raw: line.to_string(),
            entry,
        });
    }
    out
}

/// Per-run plain-text log under `logs/`.
pub struct RunLog {
    writer: BufWriter<File>,
    pub path: PathBuf,
}

impl RunLog {
    pub fn create(prefix: &str) -> std::io::Result<Self> {
        fs::create_dir_all("logs")?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = Path::new("logs").join(format!("{prefix}_{stamp}.log"));
        let file = File::create(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn logf(&mut self, line: &str) {
        let _ = writeln!(self.writer, "{line}");
    }

    pub fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_line(fields: &[&str]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", csv_escape(field));
    }
    out
}

pub struct OutputWriters {
    ok: BufWriter<File>,
    bad: BufWriter<File>,
}

impl OutputWriters {
    pub fn create(ok_path: &str, bad_path: &str) -> std::io::Result<Self> {
        let mut ok = BufWriter::new(File::create(ok_path)?);
        let mut bad = BufWriter::new(File::create(bad_path)?);
        writeln!(ok, "token,privateKey,from,symbol,decimals,balanceTokens")?;
        writeln!(bad, "token,privateKey,from,reason")?;
        Ok(Self { ok, bad })
    }

    pub fn write_ok(&mut self, pair: &ScreenedPair) {
        let _ = writeln!(
            self.ok,
            "{}",
            csv_line(&[
                &pair.token_hex,
                &pair.private_key,
                &format!("{:#x}", pair.from.unwrap_or(Address::ZERO)),
                &pair.symbol,
                &pair.token_decimals.to_string(),
                &fmt_token_units(pair.balance.unwrap_or(U256::ZERO), pair.token_decimals),
            ])
        );
    }

    pub fn write_bad(&mut self, pair: &ScreenedPair, reason: &str) {
        let from = pair
            .from
            .map(|a| format!("{a:#x}"))
            .unwrap_or_default();
        let _ = writeln!(
            self.bad,
            "{}",
            csv_line(&[&pair.token_hex, &pair.private_key, &from, reason])
        );
    }

    pub fn flush(&mut self) {
        let _ = self.ok.flush();
        let _ = self.bad.flush();
    }
}

#[derive(Debug, Clone)]
pub struct ScreenedPair {
    pub token_hex: String,
    pub private_key: String,
    pub token: Option<Address>,
    pub from: Option<Address>,
    pub symbol: String,
    pub token_decimals: u8,
    pub balance: Option<U256>,
    pub route: Option<DelegateRoute>,
    pub reason: Option<String>,
    pub warn: Option<String>,
}

impl ScreenedPair {
    fn rejected(token_hex: &str, private_key: &str, reason: &str) -> Self {
        Self {
            token_hex: token_hex.to_string(),
            private_key: private_key.to_string(),
            token: None,
            from: None,
            symbol: String::new(),
            token_decimals: 18,
            balance: None,
            route: None,
            reason: Some(reason.to_string()),
            warn: None,
        }
    }

    pub fn full_reason(&self) -> Option<String> {
        let reason = self.reason.as_deref()?;
        match self.warn.as_deref() {
            Some(warn) if !warn.is_empty() => Some(format!("{reason} | {warn}")),
            _ => Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenKnobs {
    pub preflight_attempts: usize,
    pub preflight_attempt_timeout_ms: u64,
    pub pair_timeout_ms: u64,
    pub rpc_delay_ms: u64,
}

impl From<&BatchSettings> for ScreenKnobs {
    fn from(batch: &BatchSettings) -> Self {
        Self {
            preflight_attempts: batch.preflight_attempts,
            preflight_attempt_timeout_ms: batch.preflight_attempt_timeout_ms,
            pair_timeout_ms: batch.pair_timeout_ms,
            rpc_delay_ms: batch.rpc_delay_ms,
        }
    }
}

fn transient_class(err: &RescueError) -> Option<&'static str> {
    match err {
        RescueError::Net(net) => {
            use crate::error::RpcErrorKind::*;
            match net.kind() {
                Timeout => Some("rpc_timeout"),
                Unavailable => Some("rpc_unavailable"),
                RateLimited => Some("rpc_rate_limited"),
                _ => None,
            }
        }
        _ => None,
    }
}

async fn throttle(delay_ms: u64) {
    if delay_ms > 0 {
        sleep(Duration::from_millis(delay_ms)).await;
    }
}

/// Delegated-aware preflight with bounded retries against transient RPC
/// failures. Empty string means viable; the route tag records which path
/// cleared.
async fn viability_with_retry(
    chain: &ChainClient,
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
    knobs: &ScreenKnobs,
) -> (Option<DelegateRoute>, String) {
    let mut backoff_ms = 300u64;
    for attempt in 1..=knobs.preflight_attempts.max(1) {
        let probe = timeout(
            Duration::from_millis(knobs.preflight_attempt_timeout_ms),
            preflight_delegated(chain, token, from, to, amount),
        )
        .await;
        match probe {
            Ok(Ok(DelegateRoute::Direct)) => return (Some(DelegateRoute::Direct), String::new()),
            Ok(Ok(DelegateRoute::Router { pair })) => {
                return (Some(DelegateRoute::Router { pair }), String::new())
            }
            Ok(Ok(DelegateRoute::None(_))) => {
                // The delegated context said no; consult the classic path for
                // a better reason and the optional-return fallback.
                return classic_viability(chain, token, from, to, amount).await;
            }
            Ok(Err(err)) => {
                if transient_class(&err).is_some() && attempt < knobs.preflight_attempts {
                    sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms * 2).min(2_000);
                    continue;
                }
                let class = transient_class(&err).unwrap_or("rpc_error");
                return (None, format!("{class}: {err}"));
            }
            Err(_) => {
                if attempt < knobs.preflight_attempts {
                    sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms * 2).min(2_000);
                    continue;
                }
                return (
                    None,
                    format!(
                        "rpc_timeout: preflight attempts exhausted (attempts={})",
                        knobs.preflight_attempts
                    ),
                );
            }
        }
    }
    (
        None,
        format!(
            "rpc_timeout: preflight attempts exhausted (attempts={})",
            knobs.preflight_attempts
        ),
    )
}

async fn classic_viability(
    chain: &ChainClient,
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
) -> (Option<DelegateRoute>, String) {
    match preflight_transfer(chain, token, from, to, amount).await {
        Ok(Viability::Transferable) => (Some(DelegateRoute::Direct), String::new()),
        Ok(Viability::NotTransferable(reason)) => {
            if is_optional_return_candidate(&reason) {
                if let Ok(Viability::Transferable) =
                    optional_return_transfer_call(chain, token, from, to, amount).await
                {
                    return (Some(DelegateRoute::Direct), String::new());
                }
            }
            (None, format!("not transferable: {reason}"))
        }
        Err(err) => {
            let class = transient_class(&err).unwrap_or("rpc_error");
            (None, format!("{class}: {err}"))
        }
    }
}

/// Screen one (token, privateKey) pair: metadata, restrictions, preflight.
pub async fn screen_pair(
    chain: &ChainClient,
    safe_addr: Address,
    token_hex: &str,
    private_key: &str,
    knobs: &ScreenKnobs,
) -> ScreenedPair {
    let Ok(token) = Address::from_str(token_hex) else {
        return ScreenedPair::rejected(token_hex, private_key, "invalid token address");
    };
    let Ok(signer) = parse_private_key(private_key) else {
        return ScreenedPair::rejected(token_hex, private_key, "invalid private key");
    };
    let from = signer.address();

    let mut out = ScreenedPair {
        token_hex: token_hex.to_string(),
        private_key: private_key.to_string(),
        token: Some(token),
        from: Some(from),
        symbol: String::new(),
        token_decimals: 18,
        balance: None,
        route: None,
        reason: None,
        warn: None,
    };
    let mut warn_parts: Vec<String> = Vec::new();

    throttle(knobs.rpc_delay_ms).await;
    match decimals(chain, token).await {
        Ok(dec) => out.token_decimals = dec,
        Err(err) => warn_parts.push(format!("decimals() failed: {err}")),
    }

    throttle(knobs.rpc_delay_ms).await;
    match symbol(chain, token).await {
        Ok(sym) if !sym.is_empty() => out.symbol = sym,
        Ok(_) => {}
        Err(err) => warn_parts.push(format!("symbol() failed: {err}")),
    }

    throttle(knobs.rpc_delay_ms).await;
    let balance = match balance_of(chain, token, from).await {
        Ok(balance) => {
            out.balance = Some(balance);
            Some(balance)
        }
        Err(err) => {
            warn_parts.push(format!("balanceOf() failed: {err}"));
            None
        }
    };

    // Zero balance: stop before restrictions/preflight, nothing to rescue.
    if balance == Some(U256::ZERO) {
        out.reason = Some("no token balance".to_string());
        out.warn = join_warns(warn_parts);
        return out;
    }

    if let Ok(restrictions) = check_restrictions(chain, token, from, safe_addr).await {
        if restrictions.blocked() {
            out.reason = Some(format!("blocked: {}", restrictions.summary()));
            out.warn = join_warns(warn_parts);
            return out;
        }
    }

    // Unknown balance keeps the old 1-wei probe: transferable in principle.
    let probe_amount = balance.unwrap_or(U256::from(1u64));
    let (route, reason) =
        viability_with_retry(chain, token, from, safe_addr, probe_amount, knobs).await;
    if reason.is_empty() {
        out.route = route;
    } else {
        out.reason = Some(reason);
    }
    out.warn = join_warns(warn_parts);
    out
}

fn join_warns(parts: Vec<String>) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

/// What to do with pairs that pass screening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteMode {
    ScreenOnly,
    Bundle,
    Delegated,
}

impl ExecuteMode {
    pub fn from_env() -> Self {
        match std::env::var("BATCH_EXECUTE")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "bundle" => ExecuteMode::Bundle,
            "7702" | "delegated" => ExecuteMode::Delegated,
            _ => ExecuteMode::ScreenOnly,
        }
    }
}

#[derive(Debug)]
pub struct BatchSummary {
    pub total: usize,
    pub ok: usize,
    pub bad: usize,
    pub log_path: PathBuf,
}

pub fn runner_from_settings(
    chain: ChainClient,
    settings: &Settings,
    ctx: RuntimeContext,
) -> RescueRunner {
    let auth_signer = settings
        .flashbots_auth_pk
        .as_deref()
        .and_then(|pk| parse_private_key(pk).ok());
    let relays = classify_relays(
        &settings.relays,
        &HashMap::new(),
        settings.bloxroute_auth_header.as_ref(),
    );
    let strategy = StrategyKnobs {
        min_timestamp: settings.min_timestamp,
        max_timestamp: settings.max_timestamp,
        replacement_uuid: settings.replacement_uuid.clone(),
        builders: settings.builders.clone(),
        beaver_allow_buildernet_refunds: settings.beaver_allow_buildernet_refunds,
        beaver_refund_recipient: settings.beaver_refund_recipient.clone(),
    };
    RescueRunner::new(
        chain,
        RelayTransport::new(auth_signer),
        relays,
        strategy,
        ctx,
    )
}

async fn execute_pair(
    runner: &RescueRunner,
    settings: &Settings,
    chain_id: u64,
    safe_addr: Address,
    pair: &ScreenedPair,
    mode: ExecuteMode,
    log: &mut RunLog,
) {
    let (Some(token), Some(_from), Some(balance)) = (pair.token, pair.from, pair.balance) else {
        return;
    };
    match mode {
        ExecuteMode::ScreenOnly => {}
        ExecuteMode::Delegated => {
            let Some(delegate_hex) = settings.delegate_address.as_deref() else {
                log.logf("[exec] DELEGATE_ADDRESS missing; skipping delegated execution");
                return;
            };
            let Ok(delegate) = Address::from_str(delegate_hex) else {
                log.logf("[exec] bad DELEGATE_ADDRESS; skipping delegated execution");
                return;
            };
            let route = pair.route.clone().unwrap_or(DelegateRoute::Direct);
            let req = DelegatedRequest {
                chain_id,
                token,
                from_pk: pair.private_key.clone(),
                safe_pk: settings.safe_private_key.clone(),
                recipient: safe_addr,
                delegate,
                amount: balance,
                route,
                tip_gwei: settings.tip_gwei,
                auth_count: settings.auth_count,
            };
            match runner.run_delegated(req).await {
                Ok(rescue) => {
                    for attempt in &rescue.relay_attempts {
                        log.logf(&format!(
                            "[exec] relay={} method={} status={} accepted={} body={}",
                            attempt.relay,
                            attempt.method,
                            attempt.http_status,
                            attempt.accepted,
                            attempt.body
                        ));
                    }
                    if !rescue.accepted() {
                        log.logf("[exec] no relay accepted");
                    } else {
                        log.logf(&format!("[exec] tx={:#x}", rescue.tx_hash));
                    }
                }
                Err(err) => log.logf(&format!("[exec] delegated rescue failed: {err}")),
            }
        }
        ExecuteMode::Bundle => {
            let req = PairRequest {
                token,
                from: pair.from.unwrap_or(Address::ZERO),
                to: safe_addr,
                amount: balance,
                from_pk: pair.private_key.clone(),
                safe_pk: settings.safe_private_key.clone(),
                chain_id,
                blocks: settings.blocks,
                tip_gwei: settings.tip_gwei,
                tip_mul: settings.tip_mul,
                basefee_mul: settings.basefee_mul,
                buffer_pct: settings.buffer_pct,
                tip_mode: TipMode::Fixed,
                bribe_wei: None,
                bribe_gas: 0,
                min_timestamp: settings.min_timestamp,
                max_timestamp: settings.max_timestamp,
                replacement_uuid: settings.replacement_uuid.clone(),
                simulate_only: false,
                skip_if_paused: true,
            };
            match runner.run(req).await {
                Ok(outcome) => log.logf(&format!("[exec] result: {outcome}")),
                Err(err) => log.logf(&format!("[exec] bundle run failed: {err}")),
            }
        }
    }
}

/// Full batch run: parse, screen, write outputs, optionally execute.
pub async fn run_batch(
    chain: &ChainClient,
    settings: &Settings,
    batch: &BatchSettings,
    mode: ExecuteMode,
    ctx: RuntimeContext,
) -> anyhow::Result<BatchSummary> {
    let data = fs::read_to_string(&batch.input_path)
        .map_err(|e| anyhow::anyhow!("open input `{}`: {e}", batch.input_path))?;
    let rows = parse_batch_input(&data);

    let safe_addr = parse_private_key(&settings.safe_private_key)
        .map_err(|e| anyhow::anyhow!("SAFE key: {e}"))?
        .address();
    let chain_id = match settings.chain_id {
        Some(id) => id,
        None => chain.chain_id().await?,
    };

    let mut log = RunLog::create("rescue_batch")?;
    log.logf(&format!(
        "# batch started at {}",
        Local::now().to_rfc3339()
    ));

    if matches!(
        std::env::var("BATCH_NETCHECK").as_deref(),
        Ok("1") | Ok("true") | Ok("yes") | Ok("on")
    ) {
        crate::netcheck::log_snapshot(chain, settings.netcheck_blocks, &settings.netcheck_pcts)
            .await;
    }
    let mut outputs = OutputWriters::create(&batch.out_ok_path, &batch.out_bad_path)?;
    let knobs = ScreenKnobs::from(batch);
    let runner = runner_from_settings(chain.clone(), settings, ctx.clone());

    let mut summary = BatchSummary {
        total: 0,
        ok: 0,
        bad: 0,
        log_path: log.path.clone(),
    };

    for row in rows {
        if ctx.is_cancelled() {
            log.logf("# batch cancelled");
            break;
        }
        summary.total += 1;

        let entry = match row.entry {
            Ok(entry) => entry,
            Err(reason) => {
                summary.bad += 1;
                log.logf(&format!("[row {}] skip: {reason}", row.line_no));
                outputs.write_bad(
                    &ScreenedPair::rejected(&row.raw, "", &reason),
                    &reason,
                );
                throttle(batch.row_delay_ms).await;
                continue;
            }
        };

        let screened = match timeout(
            Duration::from_millis(batch.pair_timeout_ms),
            screen_pair(chain, safe_addr, &entry.token, &entry.private_key, &knobs),
        )
        .await
        {
            Ok(screened) => screened,
            Err(_) => {
                let mut rejected =
                    ScreenedPair::rejected(&entry.token, &entry.private_key, "rpc_timeout: pair budget exhausted");
                rejected.token = Address::from_str(&entry.token).ok();
                rejected
            }
        };

        match screened.full_reason() {
            Some(reason) => {
                summary.bad += 1;
                if batch.show_pair_logs {
                    log.logf(&format!(
                        "[row {}] token={} RESULT: BAD - {reason}",
                        row.line_no, screened.token_hex
                    ));
                }
                outputs.write_bad(&screened, &reason);
            }
            None => {
                summary.ok += 1;
                if batch.show_pair_logs {
                    log.logf(&format!(
                        "[row {}] token={} RESULT: OK - symbol={} decimals={} balance={}",
                        row.line_no,
                        screened.token_hex,
                        screened.symbol,
                        screened.token_decimals,
                        fmt_token_units(
                            screened.balance.unwrap_or(U256::ZERO),
                            screened.token_decimals
                        )
                    ));
                }
                outputs.write_ok(&screened);
                if mode != ExecuteMode::ScreenOnly {
                    execute_pair(
                        &runner, settings, chain_id, safe_addr, &screened, mode, &mut log,
                    )
                    .await;
                }
            }
        }

        throttle(batch.row_delay_ms).await;
    }

    log.logf(&format!(
        "# batch finished at {}",
        Local::now().to_rfc3339()
    ));
    log.flush();
    outputs.flush();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b\nc,d"), ',');
        assert_eq!(detect_delimiter("a;b\nc;d"), ';');
        assert_eq!(detect_delimiter("\n\n a;b"), ';');
        assert_eq!(detect_delimiter(""), ',');
    }

    #[test]
    fn test_parse_csv_with_header() {
        let data = "token,privateKey\n0xAAAA,0xBBBB\n0xCCCC,0xDDDD\n";
        let rows = parse_batch_input(data);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].entry.as_ref().unwrap(),
            &BatchEntry {
                token: "0xAAAA".into(),
                private_key: "0xBBBB".into()
            }
        );
    }

    #[test]
    fn test_parse_csv_semicolon() {
        let rows = parse_batch_input("0xAAAA;0xBBBB\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entry.as_ref().unwrap().token, "0xAAAA");
    }

    #[test]
    fn test_parse_csv_short_row_is_bad() {
        let rows = parse_batch_input("0xAAAA\n0xBBBB,0xCCCC");
        // a single bare field is treated as plain text needing two columns
        assert!(rows[0].entry.is_err());
        assert!(rows[1].entry.is_ok());
    }

    #[test]
    fn test_parse_plain_text_with_comments() {
        let data = "# comment line\n0xPK1 0xTOKEN1\n\n0xPK2 0xTOKEN2\n";
        let rows = parse_batch_input(data);
        assert_eq!(rows.len(), 2);
        let entry = rows[0].entry.as_ref().unwrap();
        // plain text order is <privateKey> <token>
        assert_eq!(entry.private_key, "0xPK1");
        assert_eq!(entry.token, "0xTOKEN1");
    }

    #[test]
    fn test_parse_json_array() {
        let data = r#"[{"token":"0xAAAA","privateKey":"0xBBBB"}]"#;
        let rows = parse_batch_input(data);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entry.as_ref().unwrap().token, "0xAAAA");

        let bad = parse_batch_input("[{broken");
        assert!(bad[0].entry.is_err());
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_line(&["a", "b,c"]), "a,\"b,c\"");
    }

    #[test]
    fn test_screened_pair_full_reason() {
        let mut pair = ScreenedPair::rejected("0xA", "0xB", "no token balance");
        assert_eq!(pair.full_reason().unwrap(), "no token balance");
        pair.warn = Some("decimals() failed: x".to_string());
        assert_eq!(
            pair.full_reason().unwrap(),
            "no token balance | decimals() failed: x"
        );
    }

    #[test]
    fn test_execute_mode_from_env() {
        std::env::remove_var("BATCH_EXECUTE");
        assert_eq!(ExecuteMode::from_env(), ExecuteMode::ScreenOnly);
        std::env::set_var("BATCH_EXECUTE", "7702");
        assert_eq!(ExecuteMode::from_env(), ExecuteMode::Delegated);
        std::env::set_var("BATCH_EXECUTE", "bundle");
        assert_eq!(ExecuteMode::from_env(), ExecuteMode::Bundle);
        std::env::remove_var("BATCH_EXECUTE");
    }
}
