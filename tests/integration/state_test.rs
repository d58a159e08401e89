//! Concurrent access to the state store

use chrono::Utc;
use poly_engine::execution::{Fill, Ledger, Liquidity};
use poly_engine::feed::MarketTick;
use poly_engine::orderbook::PriceLevel;
use poly_engine::signal::Side;
use poly_engine::state::{OrderIntent, OrderKind, OrderState, OrderStatus, OrderUpdate, StateStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn tick(market: &str, bid: Decimal, ask: Decimal) -> MarketTick {
    MarketTick::top_of_book(
        market,
        PriceLevel::new(bid, dec!(10)),
        PriceLevel::new(ask, dec!(10)),
        Utc::now(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ticks_match_a_serial_order() {
    let state = Arc::new(StateStore::new(dec!(1000)));
    let markets = 16;
    let updates = 50;

    let tasks: Vec<_> = (0..markets)
        .map(|m| {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                for i in 1..=updates {
                    let bid = Decimal::new(i, 3); // 0.001 .. 0.050
                    state
                        .apply_tick(&tick(&format!("m{}", m), bid, bid + dec!(0.01)))
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // Every market ends on its last update with both sides from the same tick
    for m in 0..markets {
        let market = state.get_market(&format!("m{}", m)).unwrap();
        assert_eq!(market.best_bid(Side::Long), Some(dec!(0.050)));
        assert_eq!(market.best_ask(Side::Long), Some(dec!(0.060)));
    }
    assert_eq!(state.sequence(), (markets * updates) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fills_lose_no_cash() {
    let state = Arc::new(StateStore::new(dec!(1000)));
    let ledger = Arc::new(Ledger::new(Arc::clone(&state)));
    let orders = 40;

    for i in 0..orders {
        let id = format!("o{}", i);
        let market = format!("m{}", i % 8);
        state
            .add_order(OrderState::new(&id, &market, OrderIntent::BuyLong, OrderKind::Limit, dec!(0.25), dec!(4)))
            .unwrap();
        state
            .update_order(&id, OrderUpdate::status(OrderStatus::Submitted))
            .unwrap();
    }

    let tasks: Vec<_> = (0..orders)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                let fill = Fill {
                    order_id: format!("o{}", i),
                    market_id: format!("m{}", i % 8),
                    intent: OrderIntent::BuyLong,
                    price: dec!(0.25),
                    quantity: dec!(4),
                    fee: dec!(0.01),
                    liquidity: Liquidity::Taker,
                    timestamp: Utc::now(),
                };
                ledger.apply_fill(&fill).unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let account = state.account();
    // 40 fills of $1 notional plus $0.01 fee each
    assert_eq!(account.balance, dec!(959.60));
    assert_eq!(account.fill_count, 40);
    assert_eq!(account.fees_paid, dec!(0.40));
    for m in 0..8 {
        assert_eq!(state.position_quantity(&format!("m{}", m), Side::Long), dec!(20));
    }
    assert!(state.get_open_orders(None).is_empty());
}

#[test]
fn test_snapshot_reflects_fills() {
    let state = Arc::new(StateStore::new(dec!(100)));
    state.apply_tick(&tick("m1", dec!(0.40), dec!(0.42))).unwrap();
    state.update_position("m1", Side::Long, dec!(10), dec!(0.30), Utc::now());

    let snapshot = state.snapshot();
    assert_eq!(snapshot.total_exposure, dec!(3));
    // Marked at the held side's best bid
    assert_eq!(snapshot.equity, dec!(104));
}
