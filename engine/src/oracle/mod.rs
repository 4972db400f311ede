//! Fundamental-value oracles.
//!
//! An oracle is the hidden true price process. Agents never see it
//! directly; they request noisy observations and form their own beliefs.
//! The exchange uses an exact observation only to seed the daily open.
//!
//! Oracles are shared between the exchange and traders as
//! `Rc<RefCell<dyn Oracle>>`: dispatch is strictly single threaded, so a
//! runtime-checked borrow per observation is all the coordination needed.

pub mod mean_reverting;

use crate::core::time::SimTime;
use std::cell::RefCell;
use std::rc::Rc;

pub use mean_reverting::{MeanRevertingOracle, SymbolParams};

/// Shared handle to an oracle.
pub type SharedOracle = Rc<RefCell<dyn Oracle>>;

/// Interface the simulation consumes; the price model behind it is opaque.
pub trait Oracle {
    /// The open price for a symbol (the fundamental at market open).
    fn daily_open_price(&mut self, symbol: &str) -> i64;

    /// A noisy observation of the fundamental at time `at`, in integer
    /// cents. `sigma_n` is the observation variance (not standard
    /// deviation); zero returns the exact fundamental. Requests at or after
    /// market close observe the final pre-close value.
    fn observe_price(&mut self, symbol: &str, at: SimTime, sigma_n: f64) -> i64;
}
