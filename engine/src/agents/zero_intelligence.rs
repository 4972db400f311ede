//! Zero-intelligence trader.
//!
//! The classic background agent: it arrives at the market following a
//! Poisson process, forms a Bayesian estimate of the fundamental value from
//! noisy oracle observations, adds a private per-unit valuation, demands a
//! random surplus, and posts a one-share limit order (or lifts the inside
//! quote when doing so already secures enough of that surplus). It carries
//! no view of other agents and no memory beyond its own beliefs.

use crate::agents::trading::TradingCore;
use crate::agents::{Agent, AgentId, AgentKind};
use crate::core::time::SimTime;
use crate::kernel::Scheduler;
use crate::models::{AgentLog, MarketMsg, Message, Side, Symbol};
use crate::oracle::SharedOracle;
use crate::rng::RngManager;

/// Strategy parameters. Variances, not standard deviations.
#[derive(Debug, Clone, PartialEq)]
pub struct ZiParams {
    /// Observation noise variance passed to the oracle.
    pub sigma_n: f64,
    /// Prior mean fundamental (integer cents).
    pub r_bar: i64,
    /// Mean reversion rate per nanosecond step, in (0, 1].
    pub kappa: f64,
    /// Fundamental shock variance.
    pub sigma_s: f64,
    /// Absolute holdings cap, in units.
    pub q_max: i64,
    /// Private-value variance.
    pub sigma_pv: f64,
    /// Requested surplus range (cents), inclusive.
    pub r_min: i64,
    pub r_max: i64,
    /// Fraction of the requested surplus that makes taking the inside
    /// quote acceptable.
    pub eta: f64,
    /// Mean arrival rate (wakeups per nanosecond).
    pub lambda_a: f64,
}

impl Default for ZiParams {
    fn default() -> Self {
        Self {
            sigma_n: 1_000.0,
            r_bar: 100_000,
            kappa: 0.05,
            sigma_s: 100_000.0,
            q_max: 10,
            sigma_pv: 5_000_000.0,
            r_min: 0,
            r_max: 250,
            eta: 1.0,
            lambda_a: 0.005,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ZiState {
    AwaitingWakeup,
    AwaitingSpread,
}

pub struct ZeroIntelligenceAgent {
    core: TradingCore,
    symbol: Symbol,
    oracle: SharedOracle,
    rng: RngManager,
    params: ZiParams,
    trading: bool,
    state: ZiState,
    /// Posterior mean of the current fundamental.
    r_t: f64,
    /// Posterior variance of the current fundamental.
    sigma_t: f64,
    prev_wake: Option<SimTime>,
    /// Private value of each incremental unit, sorted descending, indexed
    /// by position slot.
    theta: Vec<i64>,
}

impl ZeroIntelligenceAgent {
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        symbol: impl Into<Symbol>,
        starting_cash: i64,
        params: ZiParams,
        oracle: SharedOracle,
        mut rng: RngManager,
    ) -> Self {
        assert!(params.q_max > 0, "q_max must be positive");
        assert!(
            params.kappa > 0.0 && params.kappa <= 1.0,
            "kappa must be in (0, 1]"
        );
        assert!(params.r_min <= params.r_max, "r_min must not exceed r_max");
        assert!(params.eta >= 0.0, "eta must be non-negative");
        assert!(params.lambda_a > 0.0, "lambda_a must be positive");

        let mut theta: Vec<i64> = (0..2 * params.q_max)
            .map(|_| rng.normal(0.0, params.sigma_pv.sqrt()).round() as i64)
            .collect();
        theta.sort_unstable_by(|a, b| b.cmp(a));

        // Stagger first arrivals a little past the open.
        let wake_offset = rng.range(0, 100);

        Self {
            core: TradingCore::new(id, name, starting_cash, wake_offset),
            symbol: symbol.into(),
            oracle,
            rng,
            r_t: params.r_bar as f64,
            sigma_t: 0.0,
            params,
            trading: false,
            state: ZiState::AwaitingWakeup,
            prev_wake: None,
            theta,
        }
    }

    /// Determine a limit price from current beliefs and place a one-share
    /// order. Called once per cycle, after a fresh spread reply.
    fn place_order(&mut self, now: SimTime, ctx: &mut Scheduler) {
        let obs_t = self
            .oracle
            .borrow_mut()
            .observe_price(&self.symbol, now, self.params.sigma_n) as f64;

        // Choose a side: forced at the holdings cap, coin flip otherwise.
        let q = self.core.position(&self.symbol);
        let side = if q >= self.params.q_max {
            Side::Sell
        } else if q <= -self.params.q_max {
            Side::Buy
        } else if self.rng.range(0, 2) == 1 {
            Side::Buy
        } else {
            Side::Sell
        };

        // Advance the belief from the previous wake to now, applying mean
        // reversion at every step, then fold in the new observation with
        // weight inversely proportional to its noise.
        if self.prev_wake.is_none() {
            self.prev_wake = self.core.mkt_open();
        }
        let prev = self.prev_wake.expect("market hours known before trading");
        let kappa = self.params.kappa;
        let r_bar = self.params.r_bar as f64;

        let delta = (now - prev) as f64;
        let decay = (1.0 - kappa).powf(delta);
        let r_tprime = (1.0 - decay) * r_bar + decay * self.r_t;
        let decay_sq = decay * decay;
        let steady = 1.0 - (1.0 - kappa) * (1.0 - kappa);
        let mut sigma_tprime = decay_sq * self.sigma_t;
        if steady > 0.0 {
            sigma_tprime += ((1.0 - decay_sq) / steady) * self.params.sigma_s;
        }

        let total_var = self.params.sigma_n + sigma_tprime;
        if total_var > 0.0 {
            self.r_t = (self.params.sigma_n / total_var) * r_tprime
                + (sigma_tprime / total_var) * obs_t;
            self.sigma_t = (self.params.sigma_n * sigma_tprime) / total_var;
        } else {
            // Noise-free observation of a noise-free process.
            self.r_t = obs_t;
            self.sigma_t = 0.0;
        }

        // Project the estimate to the close: the horizon the unit will be
        // valued at.
        let close = self.core.mkt_close().expect("market hours known");
        let delta_close = (close - now) as f64;
        let decay_close = (1.0 - kappa).powf(delta_close);
        let r_final = ((1.0 - decay_close) * r_bar + decay_close * r_tprime).round() as i64;

        self.prev_wake = Some(now);

        // Total unit valuation: projected fundamental plus the private
        // value of the unit this trade would add or shed. A fill racing a
        // cancel can push the position one past the cap, so the slot is
        // clamped to the table.
        let slot = (q + self.params.q_max - 1 + if side.is_buy() { 1 } else { 0 })
            .clamp(0, 2 * self.params.q_max - 1);
        let theta = self.theta[slot as usize];
        let valuation = r_final + theta;

        let surplus = self.rng.range(self.params.r_min, self.params.r_max + 1);
        let mut price = if side.is_buy() {
            valuation - surplus
        } else {
            valuation + surplus
        };

        // Greedy completion: take the inside quote when it already secures
        // eta of the requested surplus.
        let (bid, ask) = self.core.known_bid_ask(&self.symbol);
        match side {
            Side::Buy => {
                if let Some((ask_price, ask_vol)) = ask {
                    if ask_vol > 0
                        && (valuation - ask_price) as f64 >= self.params.eta * surplus as f64
                    {
                        price = ask_price;
                    }
                }
            }
            Side::Sell => {
                if let Some((bid_price, bid_vol)) = bid {
                    if bid_vol > 0
                        && (bid_price - valuation) as f64 >= self.params.eta * surplus as f64
                    {
                        price = bid_price;
                    }
                }
            }
        }

        self.core
            .place_limit_order(now, ctx, &self.symbol, 1, side, price);
    }
}

impl Agent for ZeroIntelligenceAgent {
    fn id(&self) -> AgentId {
        self.core.id()
    }

    fn name(&self) -> &str {
        &self.core.base.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Trader
    }

    fn kernel_starting(&mut self, start_time: SimTime, ctx: &mut Scheduler) {
        self.core.kernel_starting(start_time, ctx);
    }

    fn wakeup(&mut self, now: SimTime, ctx: &mut Scheduler) {
        // Base contract first: hours discovery and the open wakeup.
        self.core.wakeup(now, ctx);
        if !self.core.knows_market_hours() {
            return;
        }
        if !self.trading {
            self.trading = true;
            self.core.base.log_event(now, "STARTING_TRADING", ());
        }

        if self.core.is_market_closed() && self.core.daily_close_price(&self.symbol).is_some() {
            // Day is over and the close is on record; nothing left to do.
            return;
        }

        // Schedule the next arrival first, in case expected replies never
        // come. Poisson arrivals: exponential inter-wake times.
        let gap = self.rng.exponential(1.0 / self.params.lambda_a).round() as i64;
        ctx.set_wakeup(self.core.id(), now + gap.max(1));

        if self.core.is_market_closed() {
            // One final spread query records the daily close price.
            self.core.query_spread(ctx, &self.symbol, 1);
            self.state = ZiState::AwaitingSpread;
            return;
        }

        // Fresh cycle: scrap open orders, look at the market, then act on
        // the reply.
        self.core.cancel_all_orders(now, ctx);
        self.core.query_spread(ctx, &self.symbol, 1);
        self.state = ZiState::AwaitingSpread;
    }

    fn receive_message(&mut self, now: SimTime, msg: Message, ctx: &mut Scheduler) {
        self.core.handle_message(now, &msg, ctx);

        if self.state == ZiState::AwaitingSpread {
            if let MarketMsg::Spread { .. } = msg.payload {
                if self.core.is_market_closed() {
                    return;
                }
                self.place_order(now, ctx);
                self.state = ZiState::AwaitingWakeup;
            }
        }
    }

    fn kernel_stopping(&mut self, ctx: &mut Scheduler) {
        self.core.kernel_stopping(ctx);
    }

    fn take_log(&mut self) -> AgentLog {
        self.core.base.take_log()
    }
}
