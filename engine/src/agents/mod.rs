//! The agent contract and the concrete agents built on it.
//!
//! Agents never hold references to each other; they hold [`AgentId`]s and
//! communicate only through the kernel. Peer discovery goes through the
//! [`AgentKind`] registry rather than any runtime type inspection.

pub mod exchange;
pub mod trading;
pub mod zero_intelligence;

use crate::core::time::SimTime;
use crate::kernel::Scheduler;
use crate::models::{AgentLog, Message};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use exchange::ExchangeAgent;
pub use trading::TradingCore;
pub use zero_intelligence::{ZeroIntelligenceAgent, ZiParams};

/// Dense index assigned at kernel construction, in registration order.
/// Primary key into every per-agent array (clocks, delays, latency rows).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AgentId(pub usize);

impl AgentId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability tag used for peer discovery through the kernel registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AgentKind {
    Exchange,
    Trader,
}

/// The contract every simulated participant implements.
///
/// Lifecycle hooks fire in registration order:
/// `kernel_initializing` (agents must not message anyone yet),
/// `kernel_starting` (peers may be resolved, initial wakeups enqueued),
/// then the event drain calls `wakeup` / `receive_message`, then
/// `kernel_stopping` (final communication allowed) and
/// `kernel_terminating` (cleanup; logs are archived afterwards).
///
/// Callbacks run to completion; sends and wakeup requests are
/// fire-and-forget enqueues on the scheduler.
pub trait Agent {
    fn id(&self) -> AgentId;
    fn name(&self) -> &str;
    fn kind(&self) -> AgentKind;

    fn kernel_initializing(&mut self, _ctx: &mut Scheduler) {}
    fn kernel_starting(&mut self, _start_time: SimTime, _ctx: &mut Scheduler) {}
    fn wakeup(&mut self, _now: SimTime, _ctx: &mut Scheduler) {}
    fn receive_message(&mut self, _now: SimTime, _msg: Message, _ctx: &mut Scheduler) {}
    fn kernel_stopping(&mut self, _ctx: &mut Scheduler) {}
    fn kernel_terminating(&mut self, _ctx: &mut Scheduler) {}

    /// Surrender the accumulated event log for archiving. Called once per
    /// simulation, after `kernel_terminating`.
    fn take_log(&mut self) -> AgentLog {
        AgentLog::new()
    }
}

/// Identity and logging shared by all concrete agents.
#[derive(Debug, Clone)]
pub struct AgentCore {
    pub id: AgentId,
    pub name: String,
    log: AgentLog,
}

impl AgentCore {
    pub fn new(id: AgentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            log: AgentLog::new(),
        }
    }

    pub fn log_event(&mut self, time: SimTime, name: &str, body: impl Serialize) {
        self.log.log(time, name, body);
    }

    pub fn log(&self) -> &AgentLog {
        &self.log
    }

    pub fn take_log(&mut self) -> AgentLog {
        std::mem::take(&mut self.log)
    }
}
