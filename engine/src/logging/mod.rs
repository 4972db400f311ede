//! Archiving agent event logs to disk.
//!
//! One JSON Lines file per agent per simulation, under a unique per-run
//! directory:
//!
//! ```text
//! <log_dir>/run-<uuid>/sim00/agent003_ZeroIntelligence3.jsonl
//! ```
//!
//! Each line is one [`LoggedEvent`](crate::models::LoggedEvent) as JSON, so
//! any JSONL-capable tool can load the artifacts.

use crate::agents::Agent;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Writes per-agent logs under a unique run directory.
pub struct LogWriter {
    run_dir: PathBuf,
}

impl LogWriter {
    /// Create the run directory under `base_dir`.
    pub fn new(base_dir: &Path) -> io::Result<Self> {
        let run_dir = base_dir.join(format!("run-{}", Uuid::new_v4()));
        fs::create_dir_all(&run_dir)?;
        Ok(Self { run_dir })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Drain and archive every agent's log for one simulation.
    pub fn write_sim(&self, sim: usize, agents: &mut [Box<dyn Agent>]) -> io::Result<()> {
        let sim_dir = self.run_dir.join(format!("sim{:02}", sim));
        fs::create_dir_all(&sim_dir)?;

        for agent in agents.iter_mut() {
            let filename = format!(
                "agent{:03}_{}.jsonl",
                agent.id().index(),
                sanitize(agent.name())
            );
            let file = File::create(sim_dir.join(filename))?;
            let mut out = BufWriter::new(file);

            let log = agent.take_log();
            for event in log.events() {
                let line = serde_json::to_string(event)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                writeln!(out, "{}", line)?;
            }
            out.flush()?;
        }
        Ok(())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_awkward_characters() {
        assert_eq!(sanitize("ZI Trader #3"), "ZITrader3");
        assert_eq!(sanitize("exchange-0"), "exchange-0");
    }
}
