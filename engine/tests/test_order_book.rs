//! Order book round trips over the public matching API.

use market_simulator_core_rs::{AgentId, BookEffect, MarketMsg, Order, OrderBook, Side, SimTime};

fn order(id: u64, agent: usize, qty: i64, side: Side, price: i64) -> Order {
    Order::new(
        id,
        AgentId(agent),
        SimTime::from_ns(0),
        "ABM",
        qty,
        side,
        price,
    )
}

fn executions(effects: &[BookEffect]) -> Vec<(AgentId, Order)> {
    effects
        .iter()
        .filter_map(|e| match e {
            BookEffect::Send {
                recipient,
                msg: MarketMsg::OrderExecuted { order },
            } => Some((*recipient, order.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn test_place_then_cancel_round_trip() {
    let mut book = OrderBook::new("ABM");
    let now = SimTime::from_ns(0);
    let o = order(1, 0, 40, Side::Buy, 10_000);

    let effects = book.handle_limit_order(o.clone(), now);
    assert!(executions(&effects).is_empty(), "nothing to match against");

    let effects = book.cancel_order(&o, now);
    assert_eq!(effects.len(), 1);
    assert!(matches!(
        &effects[0],
        BookEffect::Send {
            msg: MarketMsg::OrderCancelled { order },
            ..
        } if order.order_id == 1 && order.quantity == 40
    ));

    // No execution was ever emitted for this id, and the book is empty.
    assert!(book.best_bid().is_none());
    assert!(book.last_trade().is_none());
}

#[test]
fn test_equal_size_cross_consumes_both_sides() {
    let mut book = OrderBook::new("ABM");
    let now = SimTime::from_ns(0);
    book.handle_limit_order(order(1, 0, 100, Side::Buy, 10_000), now);
    let effects = book.handle_limit_order(order(2, 1, 100, Side::Sell, 9_900), now);

    let fills = executions(&effects);
    assert_eq!(fills.len(), 2, "exactly one execution per agent");
    for (recipient, fill) in &fills {
        assert_eq!(fill.quantity, 100);
        assert_eq!(fill.fill_price, Some(10_000), "resting price rules");
        match recipient {
            AgentId(0) => assert_eq!(fill.order_id, 1),
            AgentId(1) => assert_eq!(fill.order_id, 2),
            other => panic!("unexpected recipient {}", other),
        }
    }

    assert!(book.best_bid().is_none());
    assert!(book.best_ask().is_none());
}

#[test]
fn test_cancelled_remainder_after_partial_fill() {
    let mut book = OrderBook::new("ABM");
    let now = SimTime::from_ns(0);
    let resting = order(1, 0, 100, Side::Sell, 10_000);
    book.handle_limit_order(resting.clone(), now);
    book.handle_limit_order(order(2, 1, 30, Side::Buy, 10_000), now);

    // 70 shares remain; the cancel reports exactly that remainder.
    let effects = book.cancel_order(&resting, now);
    assert!(matches!(
        &effects[0],
        BookEffect::Send {
            msg: MarketMsg::OrderCancelled { order },
            ..
        } if order.quantity == 70
    ));
    assert!(book.best_ask().is_none());
}

#[test]
fn test_share_conservation_across_a_session() {
    let mut book = OrderBook::new("ABM");
    let now = SimTime::from_ns(0);

    let submissions = [
        (Side::Buy, 40, 9_900),
        (Side::Sell, 25, 10_100),
        (Side::Buy, 10, 10_100), // crosses
        (Side::Sell, 60, 9_900), // crosses
        (Side::Buy, 35, 9_800),
        (Side::Sell, 5, 9_700), // crosses
    ];

    let mut submitted_buy = 0;
    let mut submitted_sell = 0;
    let mut filled = 0;
    for (i, (side, qty, price)) in submissions.iter().enumerate() {
        match side {
            Side::Buy => submitted_buy += qty,
            Side::Sell => submitted_sell += qty,
        }
        let effects = book.handle_limit_order(order(i as u64 + 1, i % 2, *qty, *side, *price), now);
        filled += executions(&effects)
            .iter()
            .map(|(_, o)| o.quantity)
            .sum::<i64>();
    }
    let fills = filled / 2; // every match notifies both sides

    let resting_bids: i64 = book.inside_bids(usize::MAX).iter().map(|(_, q)| q).sum();
    let resting_asks: i64 = book.inside_asks(usize::MAX).iter().map(|(_, q)| q).sum();

    assert_eq!(submitted_buy - fills, resting_bids);
    assert_eq!(submitted_sell - fills, resting_asks);
}

#[test]
fn test_inside_depth_limits() {
    let mut book = OrderBook::new("ABM");
    let now = SimTime::from_ns(0);
    for (i, price) in [10_000, 9_900, 9_800, 9_700].iter().enumerate() {
        book.handle_limit_order(order(i as u64 + 1, 0, 10, Side::Buy, *price), now);
    }

    assert_eq!(book.inside_bids(2), vec![(10_000, 10), (9_900, 10)]);
    assert_eq!(book.inside_bids(usize::MAX).len(), 4);
    assert!(book.inside_asks(5).is_empty());
}
