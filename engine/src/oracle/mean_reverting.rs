//! Mean-reverting fundamental value oracle.
//!
//! Maintains one hidden fundamental series per symbol:
//!
//! ```text
//! r[0] = r_bar
//! r[t] = max(0, kappa * r_bar + (1 - kappa) * r[t-1] + shock[t])
//! shock[t] ~ Normal(0, sigma_s)
//! ```
//!
//! One value per nanosecond step from market open. The series is extended
//! lazily, so memory is proportional to the latest step observed; keep the
//! trading horizon short and interpret nanoseconds as coarser units when
//! configuring a scenario.
//!
//! Agents using this oracle are expected to know the reversion equation and
//! its parameters, but never the realized shocks.

use crate::core::time::SimTime;
use crate::models::Symbol;
use crate::oracle::Oracle;
use crate::rng::RngManager;
use std::collections::BTreeMap;

/// Parameters of one symbol's fundamental process.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolParams {
    /// Mean fundamental value (integer cents).
    pub r_bar: i64,
    /// Mean reversion rate per nanosecond step, in (0, 1].
    pub kappa: f64,
    /// Shock variance (not standard deviation).
    pub sigma_s: f64,
}

struct FundamentalSeries {
    params: SymbolParams,
    /// Rounded integer-cents values generated so far.
    values: Vec<i64>,
    /// Unrounded tail of the recursion.
    last: f64,
    /// Shock stream private to this symbol, so interleaved queries across
    /// symbols cannot perturb each other's realizations.
    rng: RngManager,
}

impl FundamentalSeries {
    fn new(params: SymbolParams, rng: RngManager) -> Self {
        assert!(
            params.kappa > 0.0 && params.kappa <= 1.0,
            "kappa must be in (0, 1]"
        );
        assert!(params.sigma_s >= 0.0, "sigma_s must be non-negative");
        assert!(params.r_bar >= 0, "r_bar must be non-negative");

        Self {
            last: params.r_bar as f64,
            values: vec![params.r_bar],
            params,
            rng,
        }
    }

    /// Fundamental at step index, extending the series as needed.
    fn at(&mut self, step: usize) -> i64 {
        let std_dev = self.params.sigma_s.sqrt();
        while self.values.len() <= step {
            let shock = self.rng.normal(0.0, std_dev);
            let next = self.params.kappa * self.params.r_bar as f64
                + (1.0 - self.params.kappa) * self.last
                + shock;
            self.last = next.max(0.0);
            self.values.push(self.last.round() as i64);
        }
        self.values[step]
    }
}

/// Oracle producing noisy observations of mean-reverting fundamentals.
pub struct MeanRevertingOracle {
    mkt_open: SimTime,
    mkt_close: SimTime,
    series: BTreeMap<Symbol, FundamentalSeries>,
    /// Observation-noise stream, separate from every shock stream.
    obs_rng: RngManager,
}

impl MeanRevertingOracle {
    /// Build an oracle for the given symbols. Streams are split from
    /// `rng` in sorted symbol order, so construction is deterministic.
    pub fn new(
        mkt_open: SimTime,
        mkt_close: SimTime,
        symbols: BTreeMap<Symbol, SymbolParams>,
        rng: &mut RngManager,
    ) -> Self {
        assert!(mkt_close > mkt_open, "market must close after it opens");
        assert!(!symbols.is_empty(), "oracle needs at least one symbol");

        let obs_rng = rng.split();
        let series = symbols
            .into_iter()
            .map(|(symbol, params)| {
                let stream = rng.split();
                (symbol, FundamentalSeries::new(params, stream))
            })
            .collect();

        Self {
            mkt_open,
            mkt_close,
            series,
            obs_rng,
        }
    }

    /// Exact fundamental at `at`, clamped into the trading session.
    fn fundamental_at(&mut self, symbol: &str, at: SimTime) -> i64 {
        let series = self
            .series
            .get_mut(symbol)
            .unwrap_or_else(|| panic!("oracle has no series for symbol {}", symbol));

        // At or after close, observe the final pre-close value.
        let horizon = self.mkt_close - self.mkt_open;
        let step = (at - self.mkt_open).clamp(0, horizon - 1) as usize;
        series.at(step)
    }
}

impl Oracle for MeanRevertingOracle {
    fn daily_open_price(&mut self, symbol: &str) -> i64 {
        let open = self.mkt_open;
        self.fundamental_at(symbol, open)
    }

    fn observe_price(&mut self, symbol: &str, at: SimTime, sigma_n: f64) -> i64 {
        assert!(sigma_n >= 0.0, "sigma_n must be non-negative");

        let r_t = self.fundamental_at(symbol, at);
        if sigma_n == 0.0 {
            return r_t;
        }
        self.obs_rng.normal(r_t as f64, sigma_n.sqrt()).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle_with(seed: u64, sigma_s: f64) -> MeanRevertingOracle {
        let mut symbols = BTreeMap::new();
        symbols.insert(
            "ABM".to_string(),
            SymbolParams {
                r_bar: 100_000,
                kappa: 0.05,
                sigma_s,
            },
        );
        let mut rng = RngManager::new(seed);
        MeanRevertingOracle::new(
            SimTime::from_ns(0),
            SimTime::from_ns(1_000),
            symbols,
            &mut rng,
        )
    }

    #[test]
    fn test_open_price_is_mean() {
        let mut oracle = oracle_with(1, 100_000.0);
        assert_eq!(oracle.daily_open_price("ABM"), 100_000);
    }

    #[test]
    fn test_exact_observation_with_zero_variance() {
        let mut oracle = oracle_with(2, 100_000.0);
        let t = SimTime::from_ns(500);
        let first = oracle.observe_price("ABM", t, 0.0);
        let second = oracle.observe_price("ABM", t, 0.0);
        assert_eq!(first, second, "exact observations must agree");
    }

    #[test]
    fn test_noisy_observations_center_on_fundamental() {
        let mut oracle = oracle_with(3, 0.0);
        let t = SimTime::from_ns(100);
        let truth = oracle.observe_price("ABM", t, 0.0);

        let n = 2_000;
        let sum: i64 = (0..n)
            .map(|_| oracle.observe_price("ABM", t, 1_000.0))
            .sum();
        let mean = sum as f64 / n as f64;
        assert!(
            (mean - truth as f64).abs() < 5.0,
            "observation mean {} far from fundamental {}",
            mean,
            truth
        );
    }

    #[test]
    fn test_post_close_requests_pin_final_value() {
        let mut oracle = oracle_with(4, 100_000.0);
        let last = oracle.observe_price("ABM", SimTime::from_ns(999), 0.0);
        let at_close = oracle.observe_price("ABM", SimTime::from_ns(1_000), 0.0);
        let after_close = oracle.observe_price("ABM", SimTime::from_ns(5_000), 0.0);
        assert_eq!(last, at_close);
        assert_eq!(last, after_close);
    }

    #[test]
    fn test_fundamental_never_negative() {
        let mut oracle = oracle_with(5, 1e12);
        for step in 0..1_000 {
            assert!(oracle.observe_price("ABM", SimTime::from_ns(step), 0.0) >= 0);
        }
    }

    #[test]
    fn test_same_seed_same_series() {
        let mut a = oracle_with(42, 100_000.0);
        let mut b = oracle_with(42, 100_000.0);
        for step in (0..1_000).step_by(37) {
            let t = SimTime::from_ns(step);
            assert_eq!(
                a.observe_price("ABM", t, 0.0),
                b.observe_price("ABM", t, 0.0)
            );
        }
    }

    #[test]
    fn test_query_order_does_not_change_series() {
        let mut a = oracle_with(7, 100_000.0);
        let mut b = oracle_with(7, 100_000.0);

        // a walks forward, b jumps straight to the end.
        let forward: Vec<i64> = (0..500)
            .map(|s| a.observe_price("ABM", SimTime::from_ns(s), 0.0))
            .collect();
        let jumped = b.observe_price("ABM", SimTime::from_ns(499), 0.0);
        assert_eq!(forward[499], jumped);
    }

    #[test]
    #[should_panic(expected = "oracle has no series for symbol")]
    fn test_unknown_symbol_panics() {
        let mut oracle = oracle_with(8, 100_000.0);
        oracle.observe_price("NOPE", SimTime::from_ns(0), 0.0);
    }
}
