//! Base contract shared by all trading strategies.
//!
//! [`TradingCore`] is the state machine between the kernel, the exchange,
//! and strategy logic. Concrete strategies embed one and delegate to it:
//! every received message goes through [`TradingCore::handle_message`]
//! BEFORE the strategy acts on it, and every order goes out through
//! [`TradingCore::place_limit_order`], which enforces the at-risk capital
//! limit. The core handles market-hours discovery, holdings and open-order
//! bookkeeping, and the standard event logging.

use crate::agents::{AgentCore, AgentId, AgentKind};
use crate::core::time::SimTime;
use crate::kernel::Scheduler;
use crate::models::{dollarize, Holdings, MarketMsg, Message, Order, Side, Symbol};
use serde_json::json;
use std::collections::BTreeMap;

/// Trading-agent base state. One per strategy instance.
pub struct TradingCore {
    pub base: AgentCore,
    starting_cash: i64,
    /// Nanoseconds past market open for the first trading wakeup; chosen by
    /// the strategy to stagger arrivals.
    wake_offset: i64,
    exchange: Option<AgentId>,
    mkt_open: Option<SimTime>,
    mkt_close: Option<SimTime>,
    mkt_closed: bool,
    holdings: Holdings,
    /// Open orders (not cancelled, not fully executed) keyed by order id.
    orders: BTreeMap<u64, Order>,
    last_trade: BTreeMap<Symbol, i64>,
    daily_close_price: BTreeMap<Symbol, i64>,
    known_bids: BTreeMap<Symbol, Vec<(i64, i64)>>,
    known_asks: BTreeMap<Symbol, Vec<(i64, i64)>>,
    first_wake: bool,
}

impl TradingCore {
    pub fn new(id: AgentId, name: impl Into<String>, starting_cash: i64, wake_offset: i64) -> Self {
        assert!(starting_cash >= 0, "starting_cash must be non-negative");
        assert!(wake_offset >= 0, "wake_offset must be non-negative");

        Self {
            base: AgentCore::new(id, name),
            starting_cash,
            wake_offset,
            exchange: None,
            mkt_open: None,
            mkt_close: None,
            mkt_closed: false,
            holdings: Holdings::with_cash(starting_cash),
            orders: BTreeMap::new(),
            last_trade: BTreeMap::new(),
            daily_close_price: BTreeMap::new(),
            known_bids: BTreeMap::new(),
            known_asks: BTreeMap::new(),
            first_wake: true,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> AgentId {
        self.base.id
    }

    /// The exchange this agent trades on. Resolved in `kernel_starting`.
    pub fn exchange(&self) -> AgentId {
        self.exchange
            .expect("exchange not resolved; kernel_starting must run first")
    }

    pub fn mkt_open(&self) -> Option<SimTime> {
        self.mkt_open
    }

    pub fn mkt_close(&self) -> Option<SimTime> {
        self.mkt_close
    }

    /// Both market hours known (the agent may begin its strategy).
    pub fn knows_market_hours(&self) -> bool {
        self.mkt_open.is_some() && self.mkt_close.is_some()
    }

    pub fn is_market_closed(&self) -> bool {
        self.mkt_closed
    }

    pub fn starting_cash(&self) -> i64 {
        self.starting_cash
    }

    pub fn holdings(&self) -> &Holdings {
        &self.holdings
    }

    /// Signed share count held in a symbol; zero when not held.
    pub fn position(&self, symbol: &str) -> i64 {
        self.holdings.position(symbol)
    }

    pub fn orders(&self) -> &BTreeMap<u64, Order> {
        &self.orders
    }

    pub fn last_trade(&self, symbol: &str) -> Option<i64> {
        self.last_trade.get(symbol).copied()
    }

    pub fn daily_close_price(&self, symbol: &str) -> Option<i64> {
        self.daily_close_price.get(symbol).copied()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Resolve the exchange through the kind registry and request the first
    /// wakeup at simulation start.
    pub fn kernel_starting(&mut self, start_time: SimTime, ctx: &mut Scheduler) {
        self.exchange = Some(
            ctx.find_agent(AgentKind::Exchange)
                .expect("no exchange agent registered"),
        );
        ctx.set_wakeup(self.base.id, start_time);
    }

    /// Log final holdings and marked-to-market ending cash.
    pub fn kernel_stopping(&mut self, ctx: &mut Scheduler) {
        let now = ctx.current_time();
        self.base.log_event(now, "FINAL_HOLDINGS", &self.holdings);
        match self.mark_to_market(now) {
            Some(value) => self.base.log_event(
                now,
                "ENDING_CASH",
                json!({ "cents": value, "display": dollarize(value) }),
            ),
            None => self.base.log_event(now, "ENDING_CASH_UNKNOWN", ()),
        }
    }

    /// Base wakeup behavior. Returns true when the agent knows the market
    /// hours and the market has not yet closed, i.e. a strategy cycle may
    /// proceed.
    pub fn wakeup(&mut self, now: SimTime, ctx: &mut Scheduler) -> bool {
        if self.first_wake {
            self.base.log_event(now, "HOLDINGS_UPDATED", &self.holdings);
            self.first_wake = false;
        }

        if self.mkt_open.is_none() {
            let exchange = self.exchange();
            ctx.send_message(self.base.id, exchange, MarketMsg::WhenMarketOpen);
            ctx.send_message(self.base.id, exchange, MarketMsg::WhenMarketClose);
        }

        self.knows_market_hours() && !self.mkt_closed
    }

    /// Base message handling. Must-call contract: strategies delegate every
    /// received message here first, then apply their own logic.
    ///
    /// Once both market hours are known (and only then, once), schedules the
    /// strategy's first trading wakeup at `mkt_open + wake_offset`.
    pub fn handle_message(&mut self, now: SimTime, msg: &Message, ctx: &mut Scheduler) {
        let had_hours = self.knows_market_hours();

        match &msg.payload {
            MarketMsg::MarketOpen { time } => {
                self.mkt_open = Some(*time);
            }
            MarketMsg::MarketClose { time } => {
                self.mkt_close = Some(*time);
            }
            MarketMsg::OrderExecuted { order } => self.order_executed(now, order),
            MarketMsg::OrderAccepted { order } => {
                self.base.log_event(now, "ORDER_ACCEPTED", order);
            }
            MarketMsg::OrderCancelled { order } => self.order_cancelled(now, order),
            MarketMsg::MarketClosed => {
                self.base.log_event(now, "MKT_CLOSED", ());
                self.mkt_closed = true;
            }
            MarketMsg::LastTrade {
                symbol,
                price,
                mkt_closed,
            } => {
                if *mkt_closed {
                    self.mkt_closed = true;
                }
                self.record_last_trade(symbol, *price);
            }
            MarketMsg::Spread {
                symbol,
                price,
                bids,
                asks,
                mkt_closed,
                ..
            } => {
                if *mkt_closed {
                    self.mkt_closed = true;
                }
                self.record_last_trade(symbol, *price);
                self.known_bids.insert(symbol.clone(), bids.clone());
                self.known_asks.insert(symbol.clone(), asks.clone());
                self.base.log_event(now, "BID_DEPTH", bids);
                self.base.log_event(now, "ASK_DEPTH", asks);
                let bid_shares: i64 = bids.iter().map(|(_, q)| q).sum();
                let ask_shares: i64 = asks.iter().map(|(_, q)| q).sum();
                self.base
                    .log_event(now, "IMBALANCE", [bid_shares, ask_shares]);
            }
            // Queries flow the other way; nothing else concerns the base.
            _ => {}
        }

        if !had_hours && self.knows_market_hours() {
            let open = self.mkt_open.expect("hours just observed");
            ctx.set_wakeup(self.base.id, open + self.wake_offset);
        }
    }

    // ------------------------------------------------------------------
    // Outbound requests
    // ------------------------------------------------------------------

    /// Ask the exchange for the last trade price of a symbol.
    pub fn query_last_trade(&self, ctx: &mut Scheduler, symbol: &str) {
        ctx.send_message(
            self.base.id,
            self.exchange(),
            MarketMsg::QueryLastTrade {
                symbol: symbol.to_string(),
            },
        );
    }

    /// Ask the exchange for the inside of the book to `depth` levels.
    pub fn query_spread(&self, ctx: &mut Scheduler, symbol: &str, depth: usize) {
        ctx.send_message(
            self.base.id,
            self.exchange(),
            MarketMsg::QuerySpread {
                symbol: symbol.to_string(),
                depth,
            },
        );
    }

    /// Submit a limit order, subject to the at-risk capital limit.
    ///
    /// Let `at_risk = mark_to_market(holdings) - cash`. The order is
    /// admitted iff the hypothetical post-fill at-risk exposure does not
    /// grow, or stays within starting cash. Reducing exposure is always
    /// allowed; absolute exposure may never exceed initial capital. Short
    /// positions are permitted but grant no extra at-risk headroom.
    ///
    /// Returns the submitted order id, or `None` when the order was
    /// refused (nothing is sent to the exchange in that case).
    pub fn place_limit_order(
        &mut self,
        now: SimTime,
        ctx: &mut Scheduler,
        symbol: &str,
        quantity: i64,
        side: Side,
        limit_price: i64,
    ) -> Option<u64> {
        if quantity <= 0 {
            self.base.log_event(
                now,
                "ORDER_REFUSED",
                json!({ "reason": "non-positive quantity", "symbol": symbol }),
            );
            return None;
        }

        let hypothetical = self.holdings.with_position(symbol, side.sign() * quantity);
        let (Some(at_risk), Some(new_at_risk)) = (
            self.holdings.at_risk(&self.last_trade),
            hypothetical.at_risk(&self.last_trade),
        ) else {
            // No known price for some involved symbol: exposure cannot be
            // measured, so the order cannot be admitted.
            self.base.log_event(
                now,
                "ORDER_REFUSED",
                json!({ "reason": "no last trade price", "symbol": symbol }),
            );
            return None;
        };

        if new_at_risk > at_risk && new_at_risk > self.starting_cash {
            self.base.log_event(
                now,
                "ORDER_REFUSED",
                json!({
                    "reason": "at-risk limit",
                    "at_risk": at_risk,
                    "new_at_risk": new_at_risk,
                    "starting_cash": self.starting_cash,
                }),
            );
            return None;
        }

        let order = Order::new(
            ctx.next_order_id(),
            self.base.id,
            now,
            symbol,
            quantity,
            side,
            limit_price,
        );
        let order_id = order.order_id;
        self.orders.insert(order_id, order.clone());
        self.base.log_event(now, "ORDER_SUBMITTED", &order);
        let exchange = self.exchange();
        ctx.send_message(self.base.id, exchange, MarketMsg::LimitOrder { order });
        Some(order_id)
    }

    /// Request cancellation of one open order.
    pub fn cancel_order(&mut self, now: SimTime, ctx: &mut Scheduler, order: &Order) {
        self.base.log_event(now, "CANCEL_SUBMITTED", order);
        ctx.send_message(
            self.base.id,
            self.exchange(),
            MarketMsg::CancelOrder {
                order: order.clone(),
            },
        );
    }

    /// Request cancellation of every open order. Returns whether any
    /// cancel requests went out.
    pub fn cancel_all_orders(&mut self, now: SimTime, ctx: &mut Scheduler) -> bool {
        let open: Vec<Order> = self.orders.values().cloned().collect();
        for order in &open {
            self.cancel_order(now, ctx, order);
        }
        !open.is_empty()
    }

    // ------------------------------------------------------------------
    // Inbound order notifications
    // ------------------------------------------------------------------

    fn order_executed(&mut self, now: SimTime, order: &Order) {
        self.base.log_event(now, "ORDER_EXECUTED", order);

        let signed = order.side.sign() * order.quantity;
        let fill_price = order.fill_price.unwrap_or(order.limit_price);
        self.holdings.apply_fill(&order.symbol, signed, fill_price);

        // Shrink or retire the open-order record. A missing record can
        // happen when a cancel raced an execution; note it and move on.
        match self.orders.get_mut(&order.order_id) {
            Some(open) => {
                if order.quantity >= open.quantity {
                    self.orders.remove(&order.order_id);
                } else {
                    open.quantity -= order.quantity;
                }
            }
            None => {
                self.base
                    .log_event(now, "EXECUTED_UNKNOWN_ORDER", order);
            }
        }

        self.base.log_event(now, "HOLDINGS_UPDATED", &self.holdings);
    }

    fn order_cancelled(&mut self, now: SimTime, order: &Order) {
        self.base.log_event(now, "ORDER_CANCELLED", order);
        // Silent when absent: it may have executed before the cancel landed.
        self.orders.remove(&order.order_id);
    }

    fn record_last_trade(&mut self, symbol: &str, price: i64) {
        self.last_trade.insert(symbol.to_string(), price);
        if self.mkt_closed {
            self.daily_close_price.insert(symbol.to_string(), price);
        }
    }

    // ------------------------------------------------------------------
    // Derived views over known market data
    // ------------------------------------------------------------------

    /// Best known bid and ask as `(price, shares)`, from the most recent
    /// spread reply. Does not request fresh data.
    pub fn known_bid_ask(&self, symbol: &str) -> (Option<(i64, i64)>, Option<(i64, i64)>) {
        let bid = self
            .known_bids
            .get(symbol)
            .and_then(|levels| levels.first().copied());
        let ask = self
            .known_asks
            .get(symbol)
            .and_then(|levels| levels.first().copied());
        (bid, ask)
    }

    /// Total known bid and ask shares within `within` proportion of the
    /// inside price (0.01 = within one percent).
    pub fn known_liquidity(&self, symbol: &str, within: f64) -> (i64, i64) {
        let bid = Self::side_liquidity(self.known_bids.get(symbol), within);
        let ask = Self::side_liquidity(self.known_asks.get(symbol), within);
        (bid, ask)
    }

    fn side_liquidity(levels: Option<&Vec<(i64, i64)>>, within: f64) -> i64 {
        let Some(levels) = levels else { return 0 };
        let Some(&(best, _)) = levels.first() else {
            return 0;
        };
        let band = (best as f64 * within).round() as i64;
        levels
            .iter()
            .filter(|(price, _)| (best - price).abs() <= band)
            .map(|(_, shares)| shares)
            .sum()
    }

    /// Value holdings (including cash) at known last-trade prices, logging
    /// each position's contribution. `None` when a held symbol has no
    /// known price.
    pub fn mark_to_market(&mut self, now: SimTime) -> Option<i64> {
        let mut rows = Vec::new();
        let mut total = self.holdings.cash();
        for (symbol, shares) in self.holdings.positions() {
            let Some(price) = self.last_trade.get(symbol).copied() else {
                self.base.log_event(
                    now,
                    "MARK_TO_MARKET_UNPRICED",
                    json!({ "symbol": symbol }),
                );
                return None;
            };
            let value = price * shares;
            total += value;
            rows.push(json!({
                "symbol": symbol,
                "shares": shares,
                "price": price,
                "value": value,
            }));
        }
        for row in rows {
            self.base.log_event(now, "MARK_TO_MARKET", row);
        }
        self.base.log_event(
            now,
            "MARKED_TO_MARKET",
            json!({ "cents": total, "display": dollarize(total) }),
        );
        Some(total)
    }
}
