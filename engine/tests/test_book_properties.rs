//! Property tests for the matching engine: non-crossing, share
//! conservation, and FIFO fairness hold for arbitrary order streams.

use market_simulator_core_rs::{AgentId, BookEffect, MarketMsg, Order, OrderBook, Side, SimTime};
use proptest::prelude::*;

fn order(id: u64, agent: usize, qty: i64, side: Side, price: i64) -> Order {
    Order::new(
        id,
        AgentId(agent),
        SimTime::from_ns(id as i64),
        "ABM",
        qty,
        side,
        price,
    )
}

fn executed_quantity(effects: &[BookEffect]) -> i64 {
    effects
        .iter()
        .filter_map(|e| match e {
            BookEffect::Send {
                msg: MarketMsg::OrderExecuted { order },
                ..
            } => Some(order.quantity),
            _ => None,
        })
        .sum()
}

fn arb_ops() -> impl Strategy<Value = Vec<(bool, i64, i64)>> {
    proptest::collection::vec((any::<bool>(), 1i64..50, 9_900i64..10_100), 1..60)
}

proptest! {
    #[test]
    fn prop_book_never_crossed(ops in arb_ops()) {
        let mut book = OrderBook::new("ABM");
        for (i, (is_buy, qty, price)) in ops.iter().enumerate() {
            let side = if *is_buy { Side::Buy } else { Side::Sell };
            book.handle_limit_order(
                order(i as u64 + 1, i % 4, *qty, side, *price),
                SimTime::from_ns(i as i64),
            );
            if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
                prop_assert!(bid < ask, "book crossed: bid {} >= ask {}", bid, ask);
            }
        }
    }

    #[test]
    fn prop_shares_conserved(ops in arb_ops()) {
        let mut book = OrderBook::new("ABM");
        let mut submitted_buy = 0;
        let mut submitted_sell = 0;
        let mut fills = 0;

        for (i, (is_buy, qty, price)) in ops.iter().enumerate() {
            let side = if *is_buy {
                submitted_buy += qty;
                Side::Buy
            } else {
                submitted_sell += qty;
                Side::Sell
            };
            let effects = book.handle_limit_order(
                order(i as u64 + 1, i % 4, *qty, side, *price),
                SimTime::from_ns(i as i64),
            );
            // Each match notifies both counterparties with equal quantity.
            let notified = executed_quantity(&effects);
            prop_assert_eq!(notified % 2, 0);
            fills += notified / 2;
        }

        let resting_bids: i64 = book.inside_bids(usize::MAX).iter().map(|(_, q)| q).sum();
        let resting_asks: i64 = book.inside_asks(usize::MAX).iter().map(|(_, q)| q).sum();
        prop_assert_eq!(submitted_buy - fills, resting_bids);
        prop_assert_eq!(submitted_sell - fills, resting_asks);
    }

    #[test]
    fn prop_fifo_at_equal_price(
        rest_qtys in proptest::collection::vec(1i64..20, 2..8),
        take in 1i64..120,
    ) {
        let mut book = OrderBook::new("ABM");
        let now = SimTime::from_ns(0);
        for (i, qty) in rest_qtys.iter().enumerate() {
            book.handle_limit_order(
                order(i as u64 + 1, 0, *qty, Side::Sell, 10_000),
                now,
            );
        }

        let incoming_id = rest_qtys.len() as u64 + 1;
        let effects = book.handle_limit_order(
            order(incoming_id, 9, take, Side::Buy, 10_000),
            now,
        );

        // Fills against the resting side arrive oldest-order first, each
        // consumed fully before the next is touched.
        let resting_fills: Vec<(u64, i64)> = effects
            .iter()
            .filter_map(|e| match e {
                BookEffect::Send {
                    msg: MarketMsg::OrderExecuted { order },
                    ..
                } if order.order_id != incoming_id => Some((order.order_id, order.quantity)),
                _ => None,
            })
            .collect();

        let mut remaining = take;
        for (i, (id, qty)) in resting_fills.iter().enumerate() {
            prop_assert_eq!(*id, i as u64 + 1, "fills must follow arrival order");
            let expected = rest_qtys[i].min(remaining);
            prop_assert_eq!(*qty, expected);
            remaining -= qty;
        }

        // Either the taker was satisfied or the whole side was consumed.
        let consumed: i64 = resting_fills.iter().map(|(_, q)| q).sum();
        let available: i64 = rest_qtys.iter().sum();
        prop_assert_eq!(consumed, take.min(available));
    }
}
