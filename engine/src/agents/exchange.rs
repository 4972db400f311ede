//! The exchange agent.
//!
//! Owns one [`OrderBook`] per listed symbol and mediates all order flow:
//! market-hours queries, limit orders, cancellations, last-trade and spread
//! queries. Order requests arriving after the close are answered with
//! `MarketClosed` and never touch a book.

use crate::agents::{Agent, AgentCore, AgentId, AgentKind};
use crate::book::{BookEffect, OrderBook};
use crate::core::time::SimTime;
use crate::kernel::Scheduler;
use crate::models::{AgentLog, MarketMsg, Message, Symbol};
use crate::oracle::SharedOracle;
use serde_json::json;
use std::collections::BTreeMap;

pub struct ExchangeAgent {
    base: AgentCore,
    mkt_open: SimTime,
    mkt_close: SimTime,
    books: BTreeMap<Symbol, OrderBook>,
    /// Consulted for the daily open when a symbol has not traded yet.
    oracle: SharedOracle,
    /// Matching is fast relative to trader "thinking"; configured per run.
    computation_delay: i64,
}

impl ExchangeAgent {
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        mkt_open: SimTime,
        mkt_close: SimTime,
        symbols: impl IntoIterator<Item = Symbol>,
        oracle: SharedOracle,
        computation_delay: i64,
    ) -> Self {
        assert!(mkt_close > mkt_open, "market must close after it opens");
        assert!(
            computation_delay >= 0,
            "computation_delay must be non-negative"
        );

        let books: BTreeMap<Symbol, OrderBook> = symbols
            .into_iter()
            .map(|s| (s.clone(), OrderBook::new(s)))
            .collect();
        assert!(!books.is_empty(), "exchange lists at least one symbol");

        Self {
            base: AgentCore::new(id, name),
            mkt_open,
            mkt_close,
            books,
            oracle,
            computation_delay,
        }
    }

    pub fn mkt_open(&self) -> SimTime {
        self.mkt_open
    }

    pub fn mkt_close(&self) -> SimTime {
        self.mkt_close
    }

    pub fn book(&self, symbol: &str) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    fn is_closed(&self, now: SimTime) -> bool {
        now > self.mkt_close
    }

    /// Last trade for a symbol, falling back to the oracle's open price
    /// before anything has traded.
    fn reference_price(&mut self, symbol: &str) -> i64 {
        match self.books.get(symbol).and_then(|b| b.last_trade()) {
            Some(price) => price,
            None => self.oracle.borrow_mut().daily_open_price(symbol),
        }
    }

    /// Apply the consequences of a book operation: deliver the messages,
    /// absorb the log records.
    fn dispatch_effects(&mut self, now: SimTime, ctx: &mut Scheduler, effects: Vec<BookEffect>) {
        for effect in effects {
            match effect {
                BookEffect::Send { recipient, msg } => {
                    ctx.send_message(self.base.id, recipient, msg);
                }
                BookEffect::Log { name, body } => {
                    self.base.log_event(now, name, body);
                }
            }
        }
    }

    fn unknown_symbol(&mut self, now: SimTime, kind: &str, symbol: &str) {
        self.base.log_event(
            now,
            "UNKNOWN_SYMBOL",
            json!({ "request": kind, "symbol": symbol }),
        );
    }
}

impl Agent for ExchangeAgent {
    fn id(&self) -> AgentId {
        self.base.id
    }

    fn name(&self) -> &str {
        &self.base.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Exchange
    }

    fn kernel_initializing(&mut self, ctx: &mut Scheduler) {
        ctx.set_computation_delay(self.base.id, self.computation_delay);
    }

    fn receive_message(&mut self, now: SimTime, msg: Message, ctx: &mut Scheduler) {
        let sender = msg.sender;
        let closed = self.is_closed(now);

        match msg.payload {
            MarketMsg::WhenMarketOpen => {
                let time = self.mkt_open;
                ctx.send_message(self.base.id, sender, MarketMsg::MarketOpen { time });
            }
            MarketMsg::WhenMarketClose => {
                let time = self.mkt_close;
                ctx.send_message(self.base.id, sender, MarketMsg::MarketClose { time });
            }

            MarketMsg::LimitOrder { order } => {
                if closed {
                    ctx.send_message(self.base.id, sender, MarketMsg::MarketClosed);
                    return;
                }
                self.base.log_event(now, "LIMIT_ORDER", &order);
                match self.books.get_mut(&order.symbol) {
                    Some(book) => {
                        let effects = book.handle_limit_order(order, now);
                        self.dispatch_effects(now, ctx, effects);
                    }
                    None => {
                        let symbol = order.symbol.clone();
                        self.unknown_symbol(now, "LIMIT_ORDER", &symbol);
                    }
                }
            }

            MarketMsg::CancelOrder { order } => {
                if closed {
                    ctx.send_message(self.base.id, sender, MarketMsg::MarketClosed);
                    return;
                }
                self.base.log_event(now, "CANCEL_ORDER", &order);
                match self.books.get_mut(&order.symbol) {
                    Some(book) => {
                        let effects = book.cancel_order(&order, now);
                        self.dispatch_effects(now, ctx, effects);
                    }
                    None => {
                        let symbol = order.symbol.clone();
                        self.unknown_symbol(now, "CANCEL_ORDER", &symbol);
                    }
                }
            }

            MarketMsg::QueryLastTrade { symbol } => {
                if !self.books.contains_key(&symbol) {
                    self.unknown_symbol(now, "QUERY_LAST_TRADE", &symbol);
                    return;
                }
                let price = self.reference_price(&symbol);
                ctx.send_message(
                    self.base.id,
                    sender,
                    MarketMsg::LastTrade {
                        symbol,
                        price,
                        mkt_closed: closed,
                    },
                );
            }

            MarketMsg::QuerySpread { symbol, depth } => {
                if !self.books.contains_key(&symbol) {
                    self.unknown_symbol(now, "QUERY_SPREAD", &symbol);
                    return;
                }
                let price = self.reference_price(&symbol);
                let book = &self.books[&symbol];
                let reply = MarketMsg::Spread {
                    symbol,
                    price,
                    bids: book.inside_bids(depth),
                    asks: book.inside_asks(depth),
                    book: book.render(),
                    mkt_closed: closed,
                };
                ctx.send_message(self.base.id, sender, reply);
            }

            other => {
                self.base.log_event(
                    now,
                    "UNEXPECTED_MESSAGE",
                    json!({ "kind": other.kind(), "sender": sender }),
                );
            }
        }
    }

    fn kernel_stopping(&mut self, ctx: &mut Scheduler) {
        // Archive the full depth history of every book.
        let now = ctx.current_time();
        let archives: Vec<(Symbol, serde_json::Value)> = self
            .books
            .iter()
            .map(|(symbol, book)| {
                let snapshots =
                    serde_json::to_value(book.depth_log()).unwrap_or(serde_json::Value::Null);
                (symbol.clone(), snapshots)
            })
            .collect();
        for (symbol, snapshots) in archives {
            self.base.log_event(
                now,
                "BOOK_DEPTH_LOG",
                json!({ "symbol": symbol, "snapshots": snapshots }),
            );
        }
    }

    fn take_log(&mut self) -> AgentLog {
        self.base.take_log()
    }
}
