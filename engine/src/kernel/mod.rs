//! The simulation kernel: virtual-time event dispatch.
//!
//! The kernel owns every agent and a priority queue of scheduled events.
//! Each tick it pops the earliest event, checks that the recipient is not
//! still busy "in the future", invokes the callback, then charges the agent
//! its computation delay. Message deliveries additionally pay the
//! sender-to-recipient latency plus a random noise addend, so causal
//! ordering between agents is modeled exactly.
//!
//! # Determinism
//!
//! Given the same seed, the same agents in the same registration order, and
//! the same inputs, the kernel dispatches a byte-identical event trace. Two
//! mechanisms guarantee it: every event carries a monotone insertion
//! sequence number that breaks `deliver_at` ties, and the only kernel-side
//! entropy is one seeded RNG used for latency noise. A sha256 digest over
//! the dispatch trace is reported per simulation so replays can be compared
//! cheaply.

use crate::agents::{Agent, AgentId, AgentKind};
use crate::core::time::SimTime;
use crate::logging::LogWriter;
use crate::models::{MarketMsg, Message};
use crate::rng::RngManager;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced through `Result`; invariant breaches inside the run
/// loop are programmer errors and fail fast instead.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("invalid kernel config: {0}")]
    InvalidConfig(String),

    #[error("failed to write agent logs: {0}")]
    LogIo(#[from] std::io::Error),
}

/// Everything a run needs besides the agents themselves.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub start_time: SimTime,
    pub stop_time: SimTime,
    /// Consecutive simulations to run with the same agent set. Agent state
    /// carries across; queue, clocks, and trace digest reset.
    pub num_simulations: usize,
    /// Nanoseconds charged per callback unless overridden per agent.
    pub default_computation_delay: i64,
    /// Nanoseconds applied to every sender/recipient pair when no matrix
    /// is given.
    pub default_latency: i64,
    /// Optional full `[sender][recipient]` latency matrix (may be
    /// asymmetric). Must be square with one row per agent.
    pub agent_latency: Option<Vec<Vec<i64>>>,
    /// Discrete distribution over extra latency nanoseconds: index is the
    /// addend, value its probability. `[1.0]` means no noise.
    pub latency_noise: Vec<f64>,
    pub seed: u64,
    /// When set, per-agent event logs are archived here after each
    /// simulation.
    pub log_dir: Option<PathBuf>,
}

impl KernelConfig {
    pub fn new(start_time: SimTime, stop_time: SimTime) -> Self {
        Self {
            start_time,
            stop_time,
            num_simulations: 1,
            default_computation_delay: 1,
            default_latency: 1,
            agent_latency: None,
            latency_noise: vec![1.0],
            seed: 12345,
            log_dir: None,
        }
    }

    fn validate(&self, num_agents: usize) -> Result<(), KernelError> {
        if num_agents == 0 {
            return Err(KernelError::InvalidConfig(
                "must have at least one agent".to_string(),
            ));
        }
        if self.stop_time < self.start_time {
            return Err(KernelError::InvalidConfig(
                "stop_time must not precede start_time".to_string(),
            ));
        }
        if self.num_simulations == 0 {
            return Err(KernelError::InvalidConfig(
                "num_simulations must be > 0".to_string(),
            ));
        }
        if self.default_computation_delay < 0 {
            return Err(KernelError::InvalidConfig(
                "default_computation_delay must be non-negative".to_string(),
            ));
        }
        if self.default_latency < 0 {
            return Err(KernelError::InvalidConfig(
                "default_latency must be non-negative".to_string(),
            ));
        }
        if let Some(matrix) = &self.agent_latency {
            if matrix.len() != num_agents {
                return Err(KernelError::InvalidConfig(format!(
                    "latency matrix has {} rows for {} agents",
                    matrix.len(),
                    num_agents
                )));
            }
            for (i, row) in matrix.iter().enumerate() {
                if row.len() != num_agents {
                    return Err(KernelError::InvalidConfig(format!(
                        "latency matrix row {} has {} entries for {} agents",
                        i,
                        row.len(),
                        num_agents
                    )));
                }
                if row.iter().any(|ns| *ns < 0) {
                    return Err(KernelError::InvalidConfig(format!(
                        "latency matrix row {} has a negative entry",
                        i
                    )));
                }
            }
        }
        if self.latency_noise.is_empty() {
            return Err(KernelError::InvalidConfig(
                "latency_noise must be non-empty".to_string(),
            ));
        }
        if self.latency_noise.iter().any(|p| *p < 0.0) {
            return Err(KernelError::InvalidConfig(
                "latency_noise probabilities must be non-negative".to_string(),
            ));
        }
        let total: f64 = self.latency_noise.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(KernelError::InvalidConfig(format!(
                "latency_noise probabilities sum to {}, expected 1",
                total
            )));
        }
        Ok(())
    }
}

/// Kernel-level event kinds. The payload of a delivery is opaque here.
#[derive(Debug, Clone)]
enum EventKind {
    Wakeup,
    Deliver(Message),
}

impl EventKind {
    fn tag(&self) -> u8 {
        match self {
            EventKind::Wakeup => 0,
            EventKind::Deliver(_) => 1,
        }
    }
}

/// One entry in the priority queue.
#[derive(Debug, Clone)]
struct ScheduledEvent {
    deliver_at: SimTime,
    /// Monotone insertion counter. Makes the ordering total, so events at
    /// the same instant dispatch in insertion order.
    seq: u64,
    recipient: AgentId,
    kind: EventKind,
}

impl ScheduledEvent {
    fn key(&self) -> (SimTime, u64) {
        (self.deliver_at, self.seq)
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ScheduledEvent {}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: the binary heap is a max-heap, we want earliest first.
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The part of the kernel agents may touch from inside a callback.
///
/// Holds the event queue, per-agent clocks and delays, the latency model,
/// the kind registry, and the kernel RNG. Agents receive `&mut Scheduler`
/// in every callback; sends and wakeups are fire-and-forget enqueues.
pub struct Scheduler {
    current_time: SimTime,
    start_time: SimTime,
    stop_time: SimTime,
    queue: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
    next_order_id: u64,
    /// Earliest time each agent may act again.
    agent_clocks: Vec<SimTime>,
    /// Nanoseconds charged to an agent each time it returns from a
    /// callback; also applied to its outbound sends.
    computation_delays: Vec<i64>,
    /// `[sender][recipient]` nanoseconds, possibly asymmetric.
    latency: Vec<Vec<i64>>,
    latency_noise: Vec<f64>,
    /// Transient extra delay accumulated by the currently dispatched
    /// agent. Reset before every dispatch, never carried over.
    current_extra_delay: i64,
    rng: RngManager,
    registry: BTreeMap<AgentKind, Vec<AgentId>>,
    trace: Sha256,
    events_dispatched: u64,
}

impl Scheduler {
    /// Now, in virtual time.
    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    pub fn start_time(&self) -> SimTime {
        self.start_time
    }

    pub fn stop_time(&self) -> SimTime {
        self.stop_time
    }

    /// Events waiting in the queue.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Allocate a globally unique, deterministic order id.
    pub fn next_order_id(&mut self) -> u64 {
        let id = self.next_order_id;
        self.next_order_id += 1;
        id
    }

    /// First registered agent of the given kind, if any.
    pub fn find_agent(&self, kind: AgentKind) -> Option<AgentId> {
        self.registry.get(&kind).and_then(|ids| ids.first().copied())
    }

    /// All registered agents of the given kind, in registration order.
    pub fn find_agents(&self, kind: AgentKind) -> &[AgentId] {
        self.registry.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Queue a message for delivery.
    ///
    /// The send leaves the sender no earlier than the end of its current
    /// "thinking" (computation delay plus any transient extra delay), then
    /// pays the sender-to-recipient latency plus a noise draw.
    pub fn send_message(&mut self, sender: AgentId, recipient: AgentId, payload: MarketMsg) {
        self.send_message_delayed(sender, recipient, payload, 0);
    }

    /// As [`send_message`](Self::send_message), with an additional one-shot
    /// delay applied to this message only. Staggers multiple sends from a
    /// single wake without touching persistent delays.
    pub fn send_message_delayed(
        &mut self,
        sender: AgentId,
        recipient: AgentId,
        payload: MarketMsg,
        one_shot_delay: i64,
    ) {
        assert!(
            sender.index() < self.agent_clocks.len(),
            "send_message: unknown sender {}",
            sender
        );
        assert!(
            recipient.index() < self.agent_clocks.len(),
            "send_message: unknown recipient {}",
            recipient
        );
        assert!(
            one_shot_delay >= 0,
            "one-shot delay must be non-negative nanoseconds"
        );

        let sent_time = self.current_time
            + self.computation_delays[sender.index()]
            + self.current_extra_delay
            + one_shot_delay;
        let noise = self.rng.pick_weighted(&self.latency_noise) as i64;
        let deliver_at = sent_time + self.latency[sender.index()][recipient.index()] + noise;

        self.push(deliver_at, recipient, EventKind::Deliver(Message::new(sender, payload)));
    }

    /// Request a wakeup callback at `at`. Self-delivered: no latency.
    ///
    /// # Panics
    /// Panics when `at` is in the past; acting before now is impossible.
    pub fn set_wakeup(&mut self, agent: AgentId, at: SimTime) {
        assert!(
            agent.index() < self.agent_clocks.len(),
            "set_wakeup: unknown agent {}",
            agent
        );
        assert!(
            at >= self.current_time,
            "set_wakeup: requested time {} is before current time {}",
            at,
            self.current_time
        );
        self.push(at, agent, EventKind::Wakeup);
    }

    /// The agent's persistent per-callback computation delay.
    pub fn computation_delay(&self, agent: AgentId) -> i64 {
        self.computation_delays[agent.index()]
    }

    /// Set the persistent per-callback computation delay for one agent.
    /// Zero is allowed for special or massively parallel agents.
    pub fn set_computation_delay(&mut self, agent: AgentId, ns: i64) {
        assert!(
            agent.index() < self.computation_delays.len(),
            "set_computation_delay: unknown agent {}",
            agent
        );
        assert!(ns >= 0, "computation delay must be non-negative nanoseconds");
        self.computation_delays[agent.index()] = ns;
    }

    /// Accumulate transient extra delay for the current wake cycle. Applies
    /// to messages sent during the cycle and to the agent's next available
    /// slot, then resets; the persistent delay is untouched.
    pub fn delay_agent(&mut self, extra_ns: i64) {
        assert!(extra_ns >= 0, "extra delay must be non-negative nanoseconds");
        self.current_extra_delay += extra_ns;
    }

    fn push(&mut self, deliver_at: SimTime, recipient: AgentId, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(ScheduledEvent {
            deliver_at,
            seq,
            recipient,
            kind,
        });
    }

    /// Fold one dispatched event into the trace digest.
    fn record_dispatch(&mut self, event: &ScheduledEvent) {
        self.events_dispatched += 1;
        self.trace.update(event.deliver_at.as_ns().to_le_bytes());
        self.trace.update(event.seq.to_le_bytes());
        self.trace
            .update((event.recipient.index() as u64).to_le_bytes());
        self.trace.update([event.kind.tag()]);
        if let EventKind::Deliver(msg) = &event.kind {
            self.trace.update((msg.sender.index() as u64).to_le_bytes());
            self.trace.update(msg.payload.kind().as_bytes());
        }
    }
}

/// Result of one simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub sim: usize,
    pub events_dispatched: u64,
    /// Virtual time of the last dispatched event.
    pub final_time: SimTime,
    /// sha256 over the dispatch trace; equal seeds and inputs produce
    /// equal digests.
    pub trace_digest: String,
}

/// The simulation kernel. Owns the agents and the scheduler.
pub struct Kernel {
    sched: Scheduler,
    agents: Vec<Box<dyn Agent>>,
    num_simulations: usize,
    log_dir: Option<PathBuf>,
}

impl Kernel {
    /// Build a kernel over a fixed agent population.
    ///
    /// Agents must already carry their [`AgentId`]s, dense and in
    /// registration order: `agents[i].id() == AgentId(i)`. Ids key every
    /// per-agent array, so the ordering is part of the determinism
    /// contract.
    pub fn new(config: KernelConfig, agents: Vec<Box<dyn Agent>>) -> Result<Self, KernelError> {
        config.validate(agents.len())?;

        for (i, agent) in agents.iter().enumerate() {
            if agent.id().index() != i {
                return Err(KernelError::InvalidConfig(format!(
                    "agent {} registered at position {}; ids must be dense and in order",
                    agent.id(),
                    i
                )));
            }
        }

        let n = agents.len();
        let mut registry: BTreeMap<AgentKind, Vec<AgentId>> = BTreeMap::new();
        for agent in &agents {
            registry.entry(agent.kind()).or_default().push(agent.id());
        }

        let latency = config
            .agent_latency
            .clone()
            .unwrap_or_else(|| vec![vec![config.default_latency; n]; n]);

        let sched = Scheduler {
            current_time: config.start_time,
            start_time: config.start_time,
            stop_time: config.stop_time,
            queue: BinaryHeap::new(),
            next_seq: 0,
            next_order_id: 1,
            agent_clocks: vec![config.start_time; n],
            computation_delays: vec![config.default_computation_delay; n],
            latency,
            latency_noise: config.latency_noise.clone(),
            current_extra_delay: 0,
            rng: RngManager::new(config.seed),
            registry,
            trace: Sha256::new(),
            events_dispatched: 0,
        };

        Ok(Self {
            sched,
            agents,
            num_simulations: config.num_simulations,
            log_dir: config.log_dir,
        })
    }

    /// Run every configured simulation to completion.
    ///
    /// Each simulation walks the full lifecycle: `kernel_initializing` and
    /// `kernel_starting` in registration order, the event drain, then
    /// `kernel_stopping` and `kernel_terminating`, after which agent logs
    /// are archived when a log directory is configured.
    pub fn run(&mut self) -> Result<Vec<RunSummary>, KernelError> {
        let writer = match &self.log_dir {
            Some(dir) => Some(LogWriter::new(dir)?),
            None => None,
        };

        let mut summaries = Vec::with_capacity(self.num_simulations);
        for sim in 0..self.num_simulations {
            self.reset_for_sim();

            let agents = &mut self.agents;
            let sched = &mut self.sched;

            for agent in agents.iter_mut() {
                agent.kernel_initializing(sched);
            }
            let start_time = sched.start_time;
            for agent in agents.iter_mut() {
                agent.kernel_starting(start_time, sched);
            }

            // Drain the queue in (deliver_at, seq) order.
            while let Some(event) = sched.queue.pop() {
                if event.deliver_at > sched.stop_time {
                    // Hard terminator: everything later is discarded.
                    break;
                }
                sched.current_time = event.deliver_at;

                let idx = event.recipient.index();
                if sched.agent_clocks[idx] > event.deliver_at {
                    // Recipient is still busy in the future; push the event
                    // to the moment it frees up. Fresh seq keeps ordering
                    // total.
                    let at = sched.agent_clocks[idx];
                    sched.push(at, event.recipient, event.kind);
                    continue;
                }

                sched.current_extra_delay = 0;
                sched.agent_clocks[idx] = event.deliver_at;
                sched.record_dispatch(&event);

                match event.kind {
                    EventKind::Wakeup => {
                        agents[idx].wakeup(event.deliver_at, sched);
                    }
                    EventKind::Deliver(msg) => {
                        agents[idx].receive_message(event.deliver_at, msg, sched);
                    }
                }

                // The agent is busy until its thinking ends.
                sched.agent_clocks[idx] +=
                    sched.computation_delays[idx] + sched.current_extra_delay;
            }

            for agent in agents.iter_mut() {
                agent.kernel_stopping(sched);
            }
            for agent in agents.iter_mut() {
                agent.kernel_terminating(sched);
            }

            if let Some(writer) = &writer {
                writer.write_sim(sim, agents)?;
            }

            let digest = std::mem::replace(&mut sched.trace, Sha256::new()).finalize();
            summaries.push(RunSummary {
                sim,
                events_dispatched: sched.events_dispatched,
                final_time: sched.current_time,
                trace_digest: format!("{:x}", digest),
            });
        }

        Ok(summaries)
    }

    fn reset_for_sim(&mut self) {
        let sched = &mut self.sched;
        sched.queue.clear();
        sched.current_time = sched.start_time;
        sched.next_seq = 0;
        sched.next_order_id = 1;
        sched.current_extra_delay = 0;
        sched.events_dispatched = 0;
        sched.trace = Sha256::new();
        let start = sched.start_time;
        for clock in &mut sched.agent_clocks {
            *clock = start;
        }
    }

    pub fn agents(&self) -> &[Box<dyn Agent>] {
        &self.agents
    }

    /// Direct scheduler access.
    ///
    /// Primarily for tests and embedding; driving agents by hand through
    /// the scheduler bypasses the run loop's clock bookkeeping. Use with
    /// caution.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.sched
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("current_time", &self.sched.current_time)
            .field("num_agents", &self.agents.len())
            .field("pending_events", &self.sched.queue.len())
            .field("events_dispatched", &self.sched.events_dispatched)
            .finish()
    }
}
