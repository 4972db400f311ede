//! Limit order model
//!
//! An [`Order`] is the record a trader submits and the record the book
//! rests. Orders are value types: every hand-off across an agent or book
//! boundary clones, so the book's resting copy and the submitter's open
//! copy evolve independently.
//!
//! After creation only two fields ever change: `quantity` shrinks on
//! partial fills, and `fill_price` is set on execution.

use crate::agents::AgentId;
use crate::core::time::SimTime;
use crate::models::dollarize;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ticker symbol. Plain strings keyed into maps throughout.
pub type Symbol = String;

/// Which side of the market an order sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn is_buy(self) -> bool {
        matches!(self, Side::Buy)
    }

    /// +1 for buys, -1 for sells. Multiplied into share deltas.
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// A limit order.
///
/// `order_id` is allocated by the kernel and globally unique within a run,
/// which keeps ids deterministic under the replay contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: u64,
    pub agent_id: AgentId,
    pub time_placed: SimTime,
    pub symbol: Symbol,
    /// Unexecuted share count. Always positive while the order is live.
    pub quantity: i64,
    pub side: Side,
    /// Limit price in integer cents.
    pub limit_price: i64,
    /// Set when (a portion of) the order executes, in integer cents.
    pub fill_price: Option<i64>,
}

impl Order {
    pub fn new(
        order_id: u64,
        agent_id: AgentId,
        time_placed: SimTime,
        symbol: impl Into<Symbol>,
        quantity: i64,
        side: Side,
        limit_price: i64,
    ) -> Self {
        Self {
            order_id,
            agent_id,
            time_placed,
            symbol: symbol.into(),
            quantity,
            side,
            limit_price,
            fill_price: None,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.side.is_buy()
    }

    /// Share delta this order applies to a position if executed in full.
    pub fn signed_quantity(&self) -> i64 {
        self.side.sign() * self.quantity
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} agent {}: {} {} {} @ {}",
            self.order_id,
            self.agent_id,
            self.side.label(),
            self.quantity,
            self.symbol,
            dollarize(self.limit_price)
        )?;
        if let Some(fill) = self.fill_price {
            write!(f, " (filled @ {})", dollarize(fill))?;
        }
        Ok(())
    }
}
