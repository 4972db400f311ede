//! Market Simulator Core - Rust Engine
//!
//! Discrete-event simulator for multi-agent financial markets. Autonomous
//! agents (traders, an exchange) exchange timestamped messages; the kernel
//! orders those messages in virtual time and dispatches them, modeling
//! computation delays and network latency so causal ordering is preserved
//! exactly.
//!
//! # Architecture
//!
//! - **core**: virtual time (`SimTime`, nanosecond resolution)
//! - **models**: domain types (Order, Message, Holdings, log records)
//! - **book**: price-time-priority matching engine
//! - **kernel**: virtual-time event dispatch, latency model, lifecycle
//! - **agents**: the agent contract, trading base core, exchange, ZI trader
//! - **oracle**: fundamental-value process behind the market
//! - **logging**: per-agent JSONL log archiving
//! - **rng**: deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (cents)
//! 2. All randomness is deterministic (seeded per-component RNG streams)
//! 3. Same seed + same agents + same inputs = byte-identical event trace
//! 4. Virtual time never runs backwards; no agent acts before its clock

pub mod agents;
pub mod book;
pub mod core;
pub mod kernel;
pub mod logging;
pub mod models;
pub mod oracle;
pub mod rng;

// Re-exports for convenience
pub use agents::{
    Agent, AgentCore, AgentId, AgentKind, ExchangeAgent, TradingCore, ZeroIntelligenceAgent,
    ZiParams,
};
pub use book::{BookEffect, DepthSnapshot, OrderBook};
pub use crate::core::time::SimTime;
pub use kernel::{Kernel, KernelConfig, KernelError, RunSummary, Scheduler};
pub use logging::LogWriter;
pub use models::{AgentLog, Holdings, LoggedEvent, MarketMsg, Message, Order, Side, Symbol};
pub use oracle::{MeanRevertingOracle, Oracle, SharedOracle, SymbolParams};
pub use rng::RngManager;
