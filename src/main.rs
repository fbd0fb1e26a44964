//! Non-interactive batch driver.
//!
//! Reads pairs from `BATCH_INPUT`, screens them against the configured RPC,
//! writes `ok.csv`/`bad.csv`, and — when `BATCH_EXECUTE` is set — pushes
//! surviving pairs through the rescue runner. Exit codes: 0 completed,
//! 1 internal error (partial output written), 2 misconfiguration.

use bundle_rescue::batch::{run_batch, ExecuteMode};
use bundle_rescue::chain::ChainClient;
use bundle_rescue::config::{BatchSettings, Settings};
use bundle_rescue::context::RuntimeContext;
use bundle_rescue::telemetry::TelemetrySnapshot;
use chrono::Local;
use std::io::BufRead;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn interactive_exit_requested() -> bool {
    matches!(
        std::env::var("BATCH_INTERACTIVE").as_deref(),
        Ok("1") | Ok("true") | Ok("yes") | Ok("on")
    )
}

/// Wait for Enter before exiting so a double-clicked terminal window does not
/// vanish with the error. Batch/CI contexts leave this off.
fn exit_with(code: i32) -> ! {
    if code != 0 && interactive_exit_requested() {
        eprint!("Exit now? Press Enter to close...");
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
    }
    std::process::exit(code);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            exit_with(2);
        }
    };
    let batch_settings = match BatchSettings::from_env() {
        Ok(batch) => batch,
        Err(err) => {
            eprintln!("{err}");
            exit_with(2);
        }
    };

    let ctx = RuntimeContext::new(settings.rpc_max_concurrency);
    let chain = match ChainClient::new(&settings.rpc_url, ctx.clone()) {
        Ok(chain) => chain,
        Err(err) => {
            eprintln!("{err}");
            exit_with(2);
        }
    };

    // One cancel flag for everything in flight; armed by Ctrl-C.
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; winding down");
                ctx.cancel();
            }
        });
    }

    let mut sim_rx = ctx.set_sim_sink();
    let started_at = Local::now().to_rfc3339();
    let mode = ExecuteMode::from_env();

    let result = run_batch(&chain, &settings, &batch_settings, mode, ctx.clone()).await;

    if let Some(path) = settings.telemetry_json.as_deref() {
        let mut snapshot =
            TelemetrySnapshot::new(&settings, started_at, Local::now().to_rfc3339());
        while let Ok(outcome) = sim_rx.try_recv() {
            snapshot.record(&outcome);
        }
        if let Err(err) = snapshot.write_json(Path::new(path)) {
            tracing::warn!("telemetry write failed: {err}");
        }
    }

    match result {
        Ok(summary) => {
            println!(
                "Done. total={} ok={} bad={}  OK => {}  BAD => {}  log => {}",
                summary.total,
                summary.ok,
                summary.bad,
                batch_settings.out_ok_path,
                batch_settings.out_bad_path,
                summary.log_path.display()
            );
            exit_with(0);
        }
        Err(err) => {
            eprintln!("{err}");
            exit_with(1);
        }
    }
}
