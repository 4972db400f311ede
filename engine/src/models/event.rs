//! Per-agent event logging.
//!
//! Every agent accumulates [`LoggedEvent`] records in memory during a
//! simulation; the kernel archives them to disk (one JSON Lines file per
//! agent) when the run terminates. The records are plain serde values so a
//! companion tool can load them without knowing agent internals.

use crate::core::time::SimTime;
use serde::{Deserialize, Serialize};

/// One timestamped entry in an agent's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub time: SimTime,
    pub name: String,
    pub body: serde_json::Value,
}

/// An agent's accumulated event history for one simulation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentLog {
    events: Vec<LoggedEvent>,
}

impl AgentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Payloads that fail to serialize are recorded as
    /// null rather than aborting the simulation.
    pub fn log(&mut self, time: SimTime, name: &str, body: impl Serialize) {
        let body = serde_json::to_value(body).unwrap_or(serde_json::Value::Null);
        self.events.push(LoggedEvent {
            time,
            name: name.to_string(),
            body,
        });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[LoggedEvent] {
        &self.events
    }

    /// All events with the given name, in log order.
    pub fn events_named(&self, name: &str) -> Vec<&LoggedEvent> {
        self.events.iter().filter(|e| e.name == name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_and_query() {
        let mut log = AgentLog::new();
        assert!(log.is_empty());

        log.log(SimTime::from_ns(1), "ORDER_SUBMITTED", 42);
        log.log(SimTime::from_ns(2), "ORDER_EXECUTED", "body");
        log.log(SimTime::from_ns(3), "ORDER_SUBMITTED", ());

        assert_eq!(log.len(), 3);
        assert_eq!(log.events_named("ORDER_SUBMITTED").len(), 2);
        assert_eq!(log.events_named("ORDER_EXECUTED").len(), 1);
        assert_eq!(log.events()[0].body, serde_json::json!(42));
    }
}
