//! Optional telemetry export.
//!
//! When `TELEMETRY_JSON` names a path, the batch driver drains the simulate
//! sink into a JSON document holding a masked configuration snapshot plus
//! every per-relay simulate result observed during the run.

use crate::config::Settings;
use crate::context::SimOutcome;
use crate::units::mask_hex;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct TelemetrySnapshot {
    pub started_at: String,
    pub finished_at: String,
    pub config: Value,
    pub sim_results: Vec<Value>,
}

/// Configuration snapshot with every secret masked.
pub fn config_snapshot(settings: &Settings) -> Value {
    json!({
        "rpc_url": settings.rpc_url,
        "chain_id": settings.chain_id,
        "relays": settings.relays,
        "flashbots_auth_pk": settings.flashbots_auth_pk.as_deref().map(mask_hex),
        "safe_private_key": mask_hex(&settings.safe_private_key),
        "blocks": settings.blocks,
        "tip_gwei": settings.tip_gwei,
        "tip_mul": settings.tip_mul,
        "basefee_mul": settings.basefee_mul,
        "buffer_pct": settings.buffer_pct,
        "builders": settings.builders,
        "min_timestamp": settings.min_timestamp,
        "max_timestamp": settings.max_timestamp,
        "netcheck_blocks": settings.netcheck_blocks,
        "netcheck_pcts": settings.netcheck_pcts,
    })
}

pub fn sim_outcome_json(outcome: &SimOutcome) -> Value {
    json!({
        "relay": outcome.relay,
        "ok": outcome.ok,
        "error": outcome.error,
        "raw": outcome.raw,
    })
}

impl TelemetrySnapshot {
    pub fn new(settings: &Settings, started_at: String, finished_at: String) -> Self {
        Self {
            started_at,
            finished_at,
            config: config_snapshot(settings),
            sim_results: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: &SimOutcome) {
        self.sim_results.push(sim_outcome_json(outcome));
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let body = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            rpc_url: "https://node.example".into(),
            chain_id: Some(1),
            relays: vec!["https://relay.flashbots.net".into()],
            bloxroute_relay: None,
            bloxroute_auth_header: None,
            flashbots_auth_pk: Some(
                "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".into(),
            ),
            safe_private_key:
                "0x2a871d0798f97d79848a013d4936a73bf4cc922c825d33c1cf7073dff6d409c6".into(),
            from_private_key: None,
            delegate_address: None,
            blocks: 6,
            tip_gwei: 3,
            tip_mul: 1.25,
            basefee_mul: 2,
            buffer_pct: 5,
            builders: vec![],
            min_timestamp: 0,
            max_timestamp: 0,
            replacement_uuid: None,
            beaver_allow_buildernet_refunds: None,
            beaver_refund_recipient: None,
            netcheck_blocks: 100,
            netcheck_pcts: vec![50, 95, 99],
            auth_count: 1,
            rpc_max_concurrency: 16,
            telemetry_json: None,
        }
    }

    #[test]
    fn test_config_snapshot_masks_secrets() {
        let snapshot = config_snapshot(&settings());
        let safe = snapshot["safe_private_key"].as_str().unwrap();
        assert!(safe.contains('…'));
        assert!(!safe.contains("848a013d"));
        let auth = snapshot["flashbots_auth_pk"].as_str().unwrap();
        assert!(auth.contains('…'));
    }

    #[test]
    fn test_snapshot_records_sim_results() {
        let mut snapshot =
            TelemetrySnapshot::new(&settings(), "t0".to_string(), "t1".to_string());
        snapshot.record(&SimOutcome {
            relay: "https://relay.flashbots.net".into(),
            raw: r#"{"result":{}}"#.into(),
            ok: true,
            error: String::new(),
        });
        assert_eq!(snapshot.sim_results.len(), 1);
        assert_eq!(snapshot.sim_results[0]["ok"], true);

        let rendered = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(rendered["started_at"], "t0");
        assert!(rendered["config"]["relays"].is_array());
    }
}
