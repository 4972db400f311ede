//! Price-time-priority order book for one symbol.
//!
//! The book is a continuous double auction in the style of the major US
//! stock exchanges: bids sorted highest price first, asks lowest first,
//! FIFO within each price level.
//!
//! The matching engine never talks to the kernel. Every call returns a list
//! of [`BookEffect`]s (messages to deliver, events to log) that the owning
//! exchange agent dispatches. This keeps matching pure and testable with no
//! scheduler in sight.

use crate::agents::AgentId;
use crate::core::time::SimTime;
use crate::models::{dollarize, MarketMsg, Order, Side, Symbol};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::fmt::Write as _;

/// An outward-facing consequence of a book operation.
#[derive(Debug, Clone, PartialEq)]
pub enum BookEffect {
    /// Deliver a message to an agent (via the owning exchange).
    Send { recipient: AgentId, msg: MarketMsg },
    /// Record an event in the owning exchange's log.
    Log {
        name: &'static str,
        body: serde_json::Value,
    },
}

/// All resting orders at one price, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PriceLevel {
    price: i64,
    orders: VecDeque<Order>,
}

impl PriceLevel {
    fn new(order: Order) -> Self {
        let price = order.limit_price;
        let mut orders = VecDeque::new();
        orders.push_back(order);
        Self { price, orders }
    }

    fn total_shares(&self) -> i64 {
        self.orders.iter().map(|o| o.quantity).sum()
    }
}

/// Full-depth view of the book at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub time: SimTime,
    /// `(price, aggregate shares)` pairs, best bid first.
    pub bids: Vec<(i64, i64)>,
    /// `(price, aggregate shares)` pairs, best ask first.
    pub asks: Vec<(i64, i64)>,
}

/// Matching engine for a single symbol.
pub struct OrderBook {
    symbol: Symbol,
    /// Price levels, highest price first.
    bids: Vec<PriceLevel>,
    /// Price levels, lowest price first.
    asks: Vec<PriceLevel>,
    last_trade: Option<i64>,
    depth_log: Vec<DepthSnapshot>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            last_trade: None,
            depth_log: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Price of the most recent trade, quantity-weighted across fills of
    /// one incoming order.
    pub fn last_trade(&self) -> Option<i64> {
        self.last_trade
    }

    pub fn best_bid(&self) -> Option<i64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<i64> {
        self.asks.first().map(|l| l.price)
    }

    /// Depth snapshots taken after every accepted or executed order.
    pub fn depth_log(&self) -> &[DepthSnapshot] {
        &self.depth_log
    }

    /// Match a new limit order, or rest what cannot match.
    ///
    /// Consumes shares at the best opposing price before moving on, FIFO
    /// within a level, with no regard for order-size fit. Fills execute at
    /// the resting order's limit price. Each fill produces one
    /// `OrderExecuted` to each counterparty; a residual produces one
    /// `OrderAccepted` to the submitter.
    ///
    /// Orders for the wrong symbol or with a non-positive quantity are
    /// discarded with a log effect and nothing else.
    pub fn handle_limit_order(&mut self, mut order: Order, now: SimTime) -> Vec<BookEffect> {
        if order.symbol != self.symbol {
            return vec![BookEffect::Log {
                name: "ORDER_DISCARDED",
                body: json!({
                    "reason": "symbol does not match book",
                    "book_symbol": self.symbol,
                    "order": order,
                }),
            }];
        }
        if order.quantity <= 0 {
            return vec![BookEffect::Log {
                name: "ORDER_DISCARDED",
                body: json!({
                    "reason": "quantity must be a positive integer",
                    "order": order,
                }),
            }];
        }

        let mut effects = Vec::new();
        let mut executed: Vec<(i64, i64)> = Vec::new();

        loop {
            match self.execute_against_best(&order) {
                Some(matched) => {
                    // Notify both sides with per-side copies of the fill.
                    let mut filled = order.clone();
                    filled.quantity = matched.quantity;
                    filled.fill_price = matched.fill_price;
                    order.quantity -= matched.quantity;

                    executed.push((matched.quantity, matched.fill_price.unwrap_or(0)));
                    effects.push(BookEffect::Send {
                        recipient: filled.agent_id,
                        msg: MarketMsg::OrderExecuted { order: filled },
                    });
                    effects.push(BookEffect::Send {
                        recipient: matched.agent_id,
                        msg: MarketMsg::OrderExecuted { order: matched },
                    });

                    if order.quantity <= 0 {
                        break;
                    }
                }
                None => {
                    // No crossing liquidity left: the remainder rests.
                    self.enter_order(order.clone());
                    effects.push(BookEffect::Send {
                        recipient: order.agent_id,
                        msg: MarketMsg::OrderAccepted { order },
                    });
                    break;
                }
            }
        }

        if let Some(level) = self.bids.first() {
            effects.push(BookEffect::Log {
                name: "BEST_BID",
                body: json!({
                    "symbol": self.symbol,
                    "price": level.price,
                    "shares": level.total_shares(),
                }),
            });
        }
        if let Some(level) = self.asks.first() {
            effects.push(BookEffect::Log {
                name: "BEST_ASK",
                body: json!({
                    "symbol": self.symbol,
                    "price": level.price,
                    "shares": level.total_shares(),
                }),
            });
        }

        if !executed.is_empty() {
            let trade_qty: i64 = executed.iter().map(|(q, _)| q).sum();
            let trade_value: i64 = executed.iter().map(|(q, p)| q * p).sum();
            let avg_price = (trade_value as f64 / trade_qty as f64).round() as i64;
            self.last_trade = Some(avg_price);
            effects.push(BookEffect::Log {
                name: "LAST_TRADE",
                body: json!({
                    "symbol": self.symbol,
                    "shares": trade_qty,
                    "avg_price": avg_price,
                }),
            });
        }

        // A crossed book here means the match loop is broken. Log loud and
        // keep running so the trace survives for diagnosis.
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid >= ask {
                effects.push(BookEffect::Log {
                    name: "BOOK_CROSSED",
                    body: json!({
                        "symbol": self.symbol,
                        "best_bid": bid,
                        "best_ask": ask,
                    }),
                });
            }
        }

        self.depth_log.push(DepthSnapshot {
            time: now,
            bids: self.inside_bids(usize::MAX),
            asks: self.inside_asks(usize::MAX),
        });

        effects
    }

    /// Cancel the unexecuted remainder of a resting order.
    ///
    /// Looked up by side, limit price, and order id. An order that is not
    /// in the book (typically already fully executed) is a silent no-op;
    /// there is no negative acknowledgment.
    pub fn cancel_order(&mut self, order: &Order, _now: SimTime) -> Vec<BookEffect> {
        let book = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };

        let Some(li) = book.iter().position(|l| l.price == order.limit_price) else {
            return Vec::new();
        };
        let Some(oi) = book[li]
            .orders
            .iter()
            .position(|o| o.order_id == order.order_id)
        else {
            return Vec::new();
        };

        let cancelled = book[li].orders.remove(oi).expect("index just found");
        if book[li].orders.is_empty() {
            book.remove(li);
        }

        vec![BookEffect::Send {
            recipient: cancelled.agent_id,
            msg: MarketMsg::OrderCancelled { order: cancelled },
        }]
    }

    /// Inside bid levels as `(price, aggregate shares)`, best first.
    pub fn inside_bids(&self, depth: usize) -> Vec<(i64, i64)> {
        self.bids
            .iter()
            .take(depth)
            .map(|l| (l.price, l.total_shares()))
            .collect()
    }

    /// Inside ask levels as `(price, aggregate shares)`, best first.
    pub fn inside_asks(&self, depth: usize) -> Vec<(i64, i64)> {
        self.asks
            .iter()
            .take(depth)
            .map(|l| (l.price, l.total_shares()))
            .collect()
    }

    /// Take at most one fill from the best opposing level.
    ///
    /// Removes (or decrements) the matched resting order and returns the
    /// executed portion with `fill_price` set to the resting limit price,
    /// or `None` when the incoming order does not cross.
    fn execute_against_best(&mut self, incoming: &Order) -> Option<Order> {
        let book = match incoming.side {
            Side::Buy => &mut self.asks,
            Side::Sell => &mut self.bids,
        };

        let level = book.first_mut()?;
        let crosses = match incoming.side {
            Side::Buy => incoming.limit_price >= level.price,
            Side::Sell => incoming.limit_price <= level.price,
        };
        if !crosses {
            return None;
        }

        let resting = level.orders.front_mut().expect("levels are never empty");
        let mut matched;
        if incoming.quantity >= resting.quantity {
            // Incoming consumes the whole resting order.
            matched = level.orders.pop_front().expect("front just seen");
            if level.orders.is_empty() {
                book.remove(0);
            }
        } else {
            // Partial: decrement the resting order in place.
            matched = resting.clone();
            matched.quantity = incoming.quantity;
            resting.quantity -= incoming.quantity;
        }

        // Matched limit orders execute at the advertised (resting) price.
        matched.fill_price = Some(matched.limit_price);
        Some(matched)
    }

    /// Rest an order at its price-time-priority position.
    ///
    /// Only called after matching has consumed everything it can.
    fn enter_order(&mut self, order: Order) {
        let is_buy = order.is_buy();
        let book = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };

        for i in 0..book.len() {
            if order.limit_price == book[i].price {
                book[i].orders.push_back(order);
                return;
            }
            let better = if is_buy {
                order.limit_price > book[i].price
            } else {
                order.limit_price < book[i].price
            };
            if better {
                book.insert(i, PriceLevel::new(order));
                return;
            }
        }
        book.push(PriceLevel::new(order));
    }

    /// Human-readable depth table, best ask on top. Opaque to agents; used
    /// in spread replies and logs.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} order book", self.symbol);
        let _ = writeln!(out, "{:>10}{:>12}{:>10}", "BID", "PRICE", "ASK");
        for (price, shares) in self.inside_asks(usize::MAX).iter().rev() {
            let _ = writeln!(out, "{:>10}{:>12}{:>10}", "", dollarize(*price), shares);
        }
        for (price, shares) in self.inside_bids(usize::MAX) {
            let _ = writeln!(out, "{:>10}{:>12}{:>10}", shares, dollarize(price), "");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(id: u64, agent: usize, qty: i64, price: i64) -> Order {
        Order::new(
            id,
            AgentId(agent),
            SimTime::from_ns(0),
            "ABM",
            qty,
            Side::Buy,
            price,
        )
    }

    fn sell(id: u64, agent: usize, qty: i64, price: i64) -> Order {
        Order::new(
            id,
            AgentId(agent),
            SimTime::from_ns(0),
            "ABM",
            qty,
            Side::Sell,
            price,
        )
    }

    fn sends(effects: &[BookEffect]) -> Vec<(AgentId, &MarketMsg)> {
        effects
            .iter()
            .filter_map(|e| match e {
                BookEffect::Send { recipient, msg } => Some((*recipient, msg)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_enter_order_keeps_sides_sorted() {
        let mut book = OrderBook::new("ABM");
        let now = SimTime::from_ns(0);
        book.handle_limit_order(buy(1, 0, 10, 9_900), now);
        book.handle_limit_order(buy(2, 0, 10, 10_100), now);
        book.handle_limit_order(buy(3, 0, 10, 10_000), now);
        book.handle_limit_order(sell(4, 1, 10, 10_300), now);
        book.handle_limit_order(sell(5, 1, 10, 10_200), now);

        assert_eq!(
            book.inside_bids(usize::MAX),
            vec![(10_100, 10), (10_000, 10), (9_900, 10)]
        );
        assert_eq!(book.inside_asks(usize::MAX), vec![(10_200, 10), (10_300, 10)]);
    }

    #[test]
    fn test_match_at_resting_price() {
        let mut book = OrderBook::new("ABM");
        let now = SimTime::from_ns(0);
        book.handle_limit_order(buy(1, 0, 100, 10_000), now);
        let effects = book.handle_limit_order(sell(2, 1, 100, 9_900), now);

        let sends = sends(&effects);
        assert_eq!(sends.len(), 2);
        for (_, msg) in &sends {
            match msg {
                MarketMsg::OrderExecuted { order } => {
                    assert_eq!(order.quantity, 100);
                    assert_eq!(order.fill_price, Some(10_000));
                }
                other => panic!("expected OrderExecuted, got {:?}", other),
            }
        }
        assert!(book.best_bid().is_none());
        assert!(book.best_ask().is_none());
        assert_eq!(book.last_trade(), Some(10_000));
    }

    #[test]
    fn test_partial_fill_then_rest() {
        let mut book = OrderBook::new("ABM");
        let now = SimTime::from_ns(0);
        book.handle_limit_order(sell(1, 0, 50, 10_100), now);
        let effects = book.handle_limit_order(buy(2, 1, 80, 10_200), now);

        // 50 executed at the resting ask, 30 rests on the bid.
        let sends = sends(&effects);
        assert_eq!(sends.len(), 3);
        match sends[2] {
            (recipient, MarketMsg::OrderAccepted { order }) => {
                assert_eq!(recipient, AgentId(1));
                assert_eq!(order.quantity, 30);
                assert_eq!(order.limit_price, 10_200);
            }
            ref other => panic!("expected OrderAccepted last, got {:?}", other),
        }
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.best_bid(), Some(10_200));
        assert_eq!(book.last_trade(), Some(10_100));
    }

    #[test]
    fn test_fifo_within_price_level() {
        let mut book = OrderBook::new("ABM");
        let now = SimTime::from_ns(0);
        book.handle_limit_order(sell(10, 0, 10, 10_000), now); // order X
        book.handle_limit_order(sell(11, 1, 10, 10_000), now); // order Y
        let effects = book.handle_limit_order(buy(12, 2, 10, 10_000), now);

        let executed_ids: Vec<u64> = sends(&effects)
            .iter()
            .filter_map(|(_, msg)| match msg {
                MarketMsg::OrderExecuted { order } => Some(order.order_id),
                _ => None,
            })
            .collect();
        // X (id 10) fills; Y (id 11) untouched.
        assert!(executed_ids.contains(&10));
        assert!(!executed_ids.contains(&11));
        assert_eq!(book.inside_asks(usize::MAX), vec![(10_000, 10)]);
    }

    #[test]
    fn test_sweep_multiple_levels_average_last_trade() {
        let mut book = OrderBook::new("ABM");
        let now = SimTime::from_ns(0);
        book.handle_limit_order(sell(1, 0, 10, 10_000), now);
        book.handle_limit_order(sell(2, 0, 10, 10_100), now);
        let effects = book.handle_limit_order(buy(3, 1, 20, 10_100), now);

        // Two fills for the buyer plus one per resting order.
        assert_eq!(sends(&effects).len(), 4);
        assert_eq!(book.last_trade(), Some(10_050));
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn test_cancel_resting_order() {
        let mut book = OrderBook::new("ABM");
        let now = SimTime::from_ns(0);
        let o = buy(1, 0, 10, 10_000);
        book.handle_limit_order(o.clone(), now);

        let effects = book.cancel_order(&o, now);
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            BookEffect::Send { recipient, msg } => {
                assert_eq!(*recipient, AgentId(0));
                assert!(matches!(msg, MarketMsg::OrderCancelled { order } if order.order_id == 1));
            }
            other => panic!("expected Send, got {:?}", other),
        }
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn test_cancel_unknown_order_is_silent() {
        let mut book = OrderBook::new("ABM");
        let now = SimTime::from_ns(0);
        book.handle_limit_order(buy(1, 0, 10, 10_000), now);

        let effects = book.cancel_order(&buy(99, 0, 10, 10_000), now);
        assert!(effects.is_empty());
        // Same price level survives.
        assert_eq!(book.best_bid(), Some(10_000));

        let effects = book.cancel_order(&sell(1, 0, 10, 12_000), now);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_wrong_symbol_discarded() {
        let mut book = OrderBook::new("ABM");
        let now = SimTime::from_ns(0);
        let mut o = buy(1, 0, 10, 10_000);
        o.symbol = "XYZ".to_string();
        let effects = book.handle_limit_order(o, now);

        assert_eq!(effects.len(), 1);
        assert!(matches!(
            effects[0],
            BookEffect::Log {
                name: "ORDER_DISCARDED",
                ..
            }
        ));
        assert!(book.best_bid().is_none());
        assert!(book.depth_log().is_empty());
    }

    #[test]
    fn test_non_positive_quantity_discarded() {
        let mut book = OrderBook::new("ABM");
        let now = SimTime::from_ns(0);
        let effects = book.handle_limit_order(buy(1, 0, 0, 10_000), now);
        assert!(matches!(
            effects[0],
            BookEffect::Log {
                name: "ORDER_DISCARDED",
                ..
            }
        ));
    }

    #[test]
    fn test_book_never_crossed_after_handling() {
        let mut book = OrderBook::new("ABM");
        let now = SimTime::from_ns(0);
        book.handle_limit_order(buy(1, 0, 10, 10_000), now);
        book.handle_limit_order(sell(2, 1, 5, 9_000), now);
        book.handle_limit_order(sell(3, 1, 20, 9_500), now);
        book.handle_limit_order(buy(4, 0, 40, 9_700), now);

        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            assert!(bid < ask, "book crossed: bid {} >= ask {}", bid, ask);
        }
    }

    #[test]
    fn test_depth_log_grows() {
        let mut book = OrderBook::new("ABM");
        book.handle_limit_order(buy(1, 0, 10, 10_000), SimTime::from_ns(5));
        book.handle_limit_order(sell(2, 1, 10, 10_100), SimTime::from_ns(9));

        assert_eq!(book.depth_log().len(), 2);
        assert_eq!(book.depth_log()[1].time, SimTime::from_ns(9));
        assert_eq!(book.depth_log()[1].bids, vec![(10_000, 10)]);
        assert_eq!(book.depth_log()[1].asks, vec![(10_100, 10)]);
    }
}
