//! Private-relay bundle rescue engine.
//!
//! Moves ERC-20 balances out of compromised EOAs without touching the public
//! mempool: a solvent sponsor funds the gas in the same atomic bundle as the
//! transfer (optionally displacing a stale pending tx, optionally via an
//! EIP-7702 delegated sweep), and the bundle races across private relays with
//! per-block fee escalation until it lands or the window closes.
//!
//! Layering, leaves first: [`chain`] wraps JSON-RPC; [`token`] decides whether
//! a transfer can clear; [`fees`] prices each attempt; [`plan`] and
//! [`delegate`] assemble and sign; [`relay`] fans bundles out; [`monitor`]
//! watches the target block; [`runner`] owns the attempt loop; [`batch`] is
//! the non-interactive driver surface.

pub mod batch;
pub mod chain;
pub mod config;
pub mod context;
pub mod delegate;
pub mod error;
pub mod fees;
pub mod monitor;
pub mod netcheck;
pub mod plan;
pub mod relay;
pub mod runner;
pub mod telemetry;
pub mod token;
pub mod units;

pub use error::{Result, RescueError};
