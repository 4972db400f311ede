//! Typed message envelopes exchanged between agents.
//!
//! The kernel carries a [`Message`] from sender to recipient without ever
//! inspecting the payload; only agents match on [`MarketMsg`]. Adding a new
//! payload kind therefore never touches the scheduling machinery.

use crate::agents::AgentId;
use crate::core::time::SimTime;
use crate::models::order::{Order, Symbol};
use serde::{Deserialize, Serialize};

/// Envelope for agent-to-agent delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: AgentId,
    pub payload: MarketMsg,
}

impl Message {
    pub fn new(sender: AgentId, payload: MarketMsg) -> Self {
        Self { sender, payload }
    }
}

/// Application-level payload kinds.
///
/// Queries flow trader to exchange; the paired replies flow back. Order
/// status notifications (`OrderAccepted`, `OrderExecuted`, `OrderCancelled`)
/// carry a value copy of the order with `fill_price` set on executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketMsg {
    /// Trader asks the exchange when the market opens.
    WhenMarketOpen,
    /// Trader asks the exchange when the market closes.
    WhenMarketClose,
    /// Exchange reply carrying the opening time.
    MarketOpen { time: SimTime },
    /// Exchange reply carrying the closing time.
    MarketClose { time: SimTime },

    /// Submit a limit order for matching.
    LimitOrder { order: Order },
    /// Cancel the unexecuted remainder of an order.
    CancelOrder { order: Order },

    /// The order (or its remainder) is resting in the book.
    OrderAccepted { order: Order },
    /// A fill; `order.quantity` is the filled portion, `fill_price` is set.
    OrderExecuted { order: Order },
    /// The order was removed from the book; quantity is the remainder.
    OrderCancelled { order: Order },

    /// Ask for the last traded price of a symbol.
    QueryLastTrade { symbol: Symbol },
    /// Reply: last trade (or the daily open if nothing traded yet).
    LastTrade {
        symbol: Symbol,
        price: i64,
        mkt_closed: bool,
    },

    /// Ask for the inside of the book to a given depth.
    QuerySpread { symbol: Symbol, depth: usize },
    /// Reply: last trade plus `(price, shares)` per level, best first.
    /// `book` is an opaque rendering for logging; agents must not parse it.
    Spread {
        symbol: Symbol,
        price: i64,
        bids: Vec<(i64, i64)>,
        asks: Vec<(i64, i64)>,
        book: String,
        mkt_closed: bool,
    },

    /// The exchange refused an order request because the market has closed.
    MarketClosed,
}

impl MarketMsg {
    /// Stable tag used in event logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketMsg::WhenMarketOpen => "WHEN_MKT_OPEN",
            MarketMsg::WhenMarketClose => "WHEN_MKT_CLOSE",
            MarketMsg::MarketOpen { .. } => "MKT_OPEN",
            MarketMsg::MarketClose { .. } => "MKT_CLOSE",
            MarketMsg::LimitOrder { .. } => "LIMIT_ORDER",
            MarketMsg::CancelOrder { .. } => "CANCEL_ORDER",
            MarketMsg::OrderAccepted { .. } => "ORDER_ACCEPTED",
            MarketMsg::OrderExecuted { .. } => "ORDER_EXECUTED",
            MarketMsg::OrderCancelled { .. } => "ORDER_CANCELLED",
            MarketMsg::QueryLastTrade { .. } => "QUERY_LAST_TRADE",
            MarketMsg::LastTrade { .. } => "QUERY_LAST_TRADE_REPLY",
            MarketMsg::QuerySpread { .. } => "QUERY_SPREAD",
            MarketMsg::Spread { .. } => "QUERY_SPREAD_REPLY",
            MarketMsg::MarketClosed => "MKT_CLOSED",
        }
    }
}
