//! Shared per-process runtime state.
//!
//! Everything that would otherwise live in process globals is carried in a
//! `RuntimeContext` passed down explicitly: the RPC concurrency gate, the
//! cooperative cancel flag, the bundle-fingerprint memo and the optional
//! simulate-outcome sink.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

pub const DEFAULT_RPC_CONCURRENCY: usize = 16;

/// One relay simulation outcome, pushed to the sink as it completes.
#[derive(Debug, Clone)]
pub struct SimOutcome {
    pub relay: String,
    pub raw: String,
    pub ok: bool,
    pub error: String,
}

#[derive(Clone)]
pub struct RuntimeContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    rpc_gate: Semaphore,
    cancelled: AtomicBool,
    bundle_fingerprints: DashMap<String, ()>,
    sim_sink: std::sync::Mutex<Option<mpsc::UnboundedSender<SimOutcome>>>,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(DEFAULT_RPC_CONCURRENCY)
    }
}

impl RuntimeContext {
    pub fn new(rpc_concurrency: usize) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                rpc_gate: Semaphore::new(rpc_concurrency.clamp(1, 256)),
                cancelled: AtomicBool::new(false),
                bundle_fingerprints: DashMap::new(),
                sim_sink: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Acquire a slot in the global RPC gate. Held for the duration of one call.
    pub async fn acquire_rpc_slot(&self) -> tokio::sync::SemaphorePermit<'_> {
        self.inner
            .rpc_gate
            .acquire()
            .await
            .expect("rpc gate is never closed")
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns true the first time this fingerprint is seen; later calls
    /// return false so duplicate bundle dumps are suppressed.
    pub fn first_sighting(&self, fingerprint: &str) -> bool {
        self.inner
            .bundle_fingerprints
            .insert(fingerprint.to_string(), ())
            .is_none()
    }

    /// Install a channel that receives every relay simulate outcome.
    pub fn set_sim_sink(&self) -> mpsc::UnboundedReceiver<SimOutcome> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut slot) = self.inner.sim_sink.lock() {
            *slot = Some(tx);
        }
        rx
    }

    pub fn push_sim_outcome(&self, outcome: SimOutcome) {
        if let Ok(slot) = self.inner.sim_sink.lock() {
            if let Some(tx) = slot.as_ref() {
                let _ = tx.send(outcome);
            }
        }
    }
}

/// Fingerprint a bundle by target block and per-tx raw sizes. Cheap by intent;
/// collisions only cost an elided log line.
pub fn bundle_fingerprint(target_block: u64, txs_hex: &[String]) -> String {
    let mut key = format!("{target_block:x}|");
    for raw in txs_hex {
        key.push_str(&raw.len().to_string());
        key.push('|');
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_memo_dedupes() {
        let ctx = RuntimeContext::default();
        let fp = bundle_fingerprint(100, &["0xaaaa".to_string(), "0xbb".to_string()]);
        assert!(ctx.first_sighting(&fp));
        assert!(!ctx.first_sighting(&fp));

        let other = bundle_fingerprint(101, &["0xaaaa".to_string(), "0xbb".to_string()]);
        assert_ne!(fp, other);
        assert!(ctx.first_sighting(&other));
    }

    #[test]
    fn test_fingerprint_sensitive_to_size_vector() {
        let a = bundle_fingerprint(5, &["0xaaaa".to_string()]);
        let b = bundle_fingerprint(5, &["0xaaaaaa".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_cancel_flag() {
        let ctx = RuntimeContext::default();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
        // clones observe the same flag
        let clone = ctx.clone();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_sim_sink_receives_outcomes() {
        let ctx = RuntimeContext::default();
        let mut rx = ctx.set_sim_sink();
        ctx.push_sim_outcome(SimOutcome {
            relay: "https://relay.example".into(),
            raw: "{}".into(),
            ok: true,
            error: String::new(),
        });
        let got = rx.recv().await.unwrap();
        assert!(got.ok);
        assert_eq!(got.relay, "https://relay.example");
    }

    #[tokio::test]
    async fn test_rpc_gate_bounds_concurrency() {
        let ctx = RuntimeContext::new(1);
        let first = ctx.acquire_rpc_slot().await;
        // second acquire must not be immediately ready while the permit is held
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            ctx.acquire_rpc_slot(),
        )
        .await;
        assert!(pending.is_err());
        drop(first);
        let ok = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            ctx.acquire_rpc_slot(),
        )
        .await;
        assert!(ok.is_ok());
    }
}
