//! Scenario-driven simulation runner.
//!
//! Loads a JSON scenario describing the market (hours, fundamental
//! parameters, kernel timing defaults) and the trader population, builds
//! the agents, runs the kernel, and prints one summary line per
//! simulation. All randomness derives from the scenario seed, so rerunning
//! with the same scenario reproduces the same trace digest.

use clap::Parser;
use market_simulator_core_rs::{
    Agent, AgentId, ExchangeAgent, Kernel, KernelConfig, MeanRevertingOracle, RngManager,
    SharedOracle, SimTime, Symbol, SymbolParams, ZeroIntelligenceAgent, ZiParams,
};
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Debug, Parser)]
#[command(name = "market-sim", about = "Discrete-event market simulator")]
struct Args {
    /// Path to a JSON scenario file
    #[arg(long)]
    scenario: PathBuf,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the scenario log directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Scenario {
    seed: u64,
    start_time_ns: i64,
    stop_time_ns: i64,
    mkt_open_ns: i64,
    mkt_close_ns: i64,
    #[serde(default = "default_num_simulations")]
    num_simulations: usize,
    #[serde(default = "default_one_ns")]
    default_computation_delay_ns: i64,
    #[serde(default = "default_one_ns")]
    default_latency_ns: i64,
    #[serde(default)]
    agent_latency_ns: Option<Vec<Vec<i64>>>,
    #[serde(default = "default_latency_noise")]
    latency_noise: Vec<f64>,
    #[serde(default = "default_one_ns")]
    exchange_computation_delay_ns: i64,
    #[serde(default)]
    log_dir: Option<PathBuf>,
    /// Fundamental process per listed symbol.
    symbols: BTreeMap<Symbol, FundamentalConfig>,
    traders: Vec<TraderPopulation>,
}

fn default_num_simulations() -> usize {
    1
}

fn default_one_ns() -> i64 {
    1
}

fn default_latency_noise() -> Vec<f64> {
    vec![1.0]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FundamentalConfig {
    r_bar: i64,
    kappa: f64,
    sigma_s: f64,
}

/// One homogeneous group of zero-intelligence traders. Belief parameters
/// default to the traded symbol's fundamental process (the agents know the
/// model, not the shocks).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TraderPopulation {
    count: usize,
    symbol: Symbol,
    starting_cash: i64,
    #[serde(default)]
    sigma_n: Option<f64>,
    #[serde(default)]
    r_bar: Option<i64>,
    #[serde(default)]
    kappa: Option<f64>,
    #[serde(default)]
    sigma_s: Option<f64>,
    #[serde(default)]
    q_max: Option<i64>,
    #[serde(default)]
    sigma_pv: Option<f64>,
    #[serde(default)]
    r_min: Option<i64>,
    #[serde(default)]
    r_max: Option<i64>,
    #[serde(default)]
    eta: Option<f64>,
    #[serde(default)]
    lambda_a: Option<f64>,
}

impl TraderPopulation {
    fn params(&self, fundamental: &FundamentalConfig) -> ZiParams {
        let d = ZiParams::default();
        ZiParams {
            sigma_n: self.sigma_n.unwrap_or(d.sigma_n),
            r_bar: self.r_bar.unwrap_or(fundamental.r_bar),
            kappa: self.kappa.unwrap_or(fundamental.kappa),
            sigma_s: self.sigma_s.unwrap_or(fundamental.sigma_s),
            q_max: self.q_max.unwrap_or(d.q_max),
            sigma_pv: self.sigma_pv.unwrap_or(d.sigma_pv),
            r_min: self.r_min.unwrap_or(d.r_min),
            r_max: self.r_max.unwrap_or(d.r_max),
            eta: self.eta.unwrap_or(d.eta),
            lambda_a: self.lambda_a.unwrap_or(d.lambda_a),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let text = fs::read_to_string(&args.scenario)?;
    let mut scenario: Scenario = serde_json::from_str(&text)?;
    if let Some(seed) = args.seed {
        scenario.seed = seed;
    }
    if let Some(dir) = args.log_dir {
        scenario.log_dir = Some(dir);
    }

    // One master stream; every component splits from it in a fixed order.
    let mut master = RngManager::new(scenario.seed);

    let mkt_open = SimTime::from_ns(scenario.mkt_open_ns);
    let mkt_close = SimTime::from_ns(scenario.mkt_close_ns);

    let symbol_params: BTreeMap<Symbol, SymbolParams> = scenario
        .symbols
        .iter()
        .map(|(symbol, f)| {
            (
                symbol.clone(),
                SymbolParams {
                    r_bar: f.r_bar,
                    kappa: f.kappa,
                    sigma_s: f.sigma_s,
                },
            )
        })
        .collect();
    let oracle: SharedOracle = Rc::new(RefCell::new(MeanRevertingOracle::new(
        mkt_open,
        mkt_close,
        symbol_params,
        &mut master,
    )));

    let mut agents: Vec<Box<dyn Agent>> = Vec::new();
    agents.push(Box::new(ExchangeAgent::new(
        AgentId(0),
        "Exchange0",
        mkt_open,
        mkt_close,
        scenario.symbols.keys().cloned(),
        Rc::clone(&oracle),
        scenario.exchange_computation_delay_ns,
    )));

    for population in &scenario.traders {
        let Some(fundamental) = scenario.symbols.get(&population.symbol) else {
            return Err(format!(
                "trader population references unlisted symbol {}",
                population.symbol
            )
            .into());
        };
        for _ in 0..population.count {
            let id = AgentId(agents.len());
            agents.push(Box::new(ZeroIntelligenceAgent::new(
                id,
                format!("ZeroIntelligence{}", id),
                population.symbol.clone(),
                population.starting_cash,
                population.params(fundamental),
                Rc::clone(&oracle),
                master.split(),
            )));
        }
    }

    let mut config = KernelConfig::new(
        SimTime::from_ns(scenario.start_time_ns),
        SimTime::from_ns(scenario.stop_time_ns),
    );
    config.num_simulations = scenario.num_simulations;
    config.default_computation_delay = scenario.default_computation_delay_ns;
    config.default_latency = scenario.default_latency_ns;
    config.agent_latency = scenario.agent_latency_ns.clone();
    config.latency_noise = scenario.latency_noise.clone();
    config.seed = master.next();
    config.log_dir = scenario.log_dir.clone();

    let num_agents = agents.len();
    let mut kernel = Kernel::new(config, agents)?;
    println!(
        "running {} simulation(s) with {} agents, seed {}",
        scenario.num_simulations, num_agents, scenario.seed
    );

    let summaries = kernel.run()?;
    for summary in &summaries {
        println!(
            "sim {:02}: {} events dispatched, final time {}, trace {}",
            summary.sim,
            summary.events_dispatched,
            summary.final_time,
            &summary.trace_digest[..16],
        );
    }
    if let Some(dir) = &scenario.log_dir {
        println!("agent logs archived under {}", dir.display());
    }

    Ok(())
}
