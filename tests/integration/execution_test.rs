//! Execution backends behind the pipeline

use async_trait::async_trait;
use chrono::Utc;
use poly_engine::config::{Config, ExecutionConfig, SlippageConfig};
use poly_engine::execution::{
    ExecutionError, Executor, LiveExecutor, OrderRequest, RetryPolicy, SimulatedExecutor, Venue,
    VenueOrder, VenuePosition,
};
use poly_engine::feed::{AccountEvent, GameState, GameStatus, MarketTick};
use poly_engine::orderbook::PriceLevel;
use poly_engine::pipeline::Pipeline;
use poly_engine::signal::Side;
use poly_engine::state::{OrderIntent, OrderStatus, StateStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn book(state: &StateStore, bid: Decimal, ask: Decimal) {
    state
        .apply_tick(&MarketTick::top_of_book(
            "m1",
            PriceLevel::new(bid, dec!(500)),
            PriceLevel::new(ask, dec!(500)),
            Utc::now(),
        ))
        .unwrap();
}

#[tokio::test]
async fn test_taker_fee_uses_quoted_price() {
    let config = ExecutionConfig {
        taker_fee_bps: dec!(10),
        slippage: SlippageConfig::Fixed { bps: dec!(5) },
        ..ExecutionConfig::default()
    };
    let state = Arc::new(StateStore::new(dec!(1000)));
    let executor = SimulatedExecutor::from_config(Arc::clone(&state), &config);
    book(&state, dec!(0.49), dec!(0.50));

    let order = executor
        .submit(OrderRequest::limit("m1", OrderIntent::BuyLong, dec!(0.50), dec!(40)))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.avg_fill_price, Some(dec!(0.50025)));

    let fill = &executor.fills()[0];
    assert_eq!(fill.fee, dec!(0.02)); // 0.500 * 40 * 0.001
    assert_eq!(state.get_balance(), dec!(1000) - dec!(20.01) - dec!(0.02));
}

/// Accepts every order and echoes it back as open
#[derive(Default)]
struct AcceptingVenue {
    placed: AtomicU32,
}

#[async_trait]
impl Venue for AcceptingVenue {
    async fn place_order(&self, request: &OrderRequest) -> Result<VenueOrder, ExecutionError> {
        let n = self.placed.fetch_add(1, Ordering::SeqCst);
        Ok(VenueOrder {
            order_id: format!("venue-{}", n),
            client_order_id: Some(request.client_order_id.clone()),
            market_id: request.market_id.clone(),
            intent: request.intent,
            price: request.price.unwrap_or(dec!(0.5)),
            quantity: request.quantity,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            status: OrderStatus::Open,
            created_at: Utc::now(),
        })
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), ExecutionError> {
        Ok(())
    }

    async fn amend_order(
        &self,
        order_id: &str,
        _price: Option<Decimal>,
        _quantity: Option<Decimal>,
    ) -> Result<VenueOrder, ExecutionError> {
        Err(ExecutionError::UnknownOrder(order_id.to_string()))
    }

    async fn fetch_balance(&self) -> Result<Decimal, ExecutionError> {
        Ok(dec!(1000))
    }

    async fn fetch_positions(&self) -> Result<Vec<VenuePosition>, ExecutionError> {
        Ok(Vec::new())
    }

    async fn fetch_open_orders(&self) -> Result<Vec<VenueOrder>, ExecutionError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_live_fills_arrive_through_account_feed() {
    let mut config = Config::default();
    config.market_maker.enabled = false;
    config.statistical_edge.enabled = false;

    let state = Arc::new(StateStore::new(Decimal::ZERO));
    let retry = RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
        timeout: Duration::from_millis(200),
    };
    let live = LiveExecutor::new(AcceptingVenue::default(), Arc::clone(&state), retry);
    live.reconcile().await.unwrap();
    assert_eq!(state.get_balance(), dec!(1000));

    let mut pipeline = Pipeline::new(&config, Arc::clone(&state), Arc::new(live));
    let now = Utc::now();
    pipeline
        .handle_market_tick(MarketTick::top_of_book(
            "m1",
            PriceLevel::new(dec!(0.43), dec!(100)),
            PriceLevel::new(dec!(0.45), dec!(100)),
            now,
        ))
        .await;
    let entry = pipeline
        .handle_game(GameState {
            event_id: "g1".to_string(),
            market_id: "m1".to_string(),
            home_score: 70,
            away_score: 70,
            period: 3,
            seconds_remaining: 900,
            status: GameStatus::InProgress,
            home_is_long: true,
            timestamp: now,
        })
        .await;
    assert_eq!(entry.orders_submitted, 1);

    // Acknowledged but not filled yet
    let order = state.get_order("venue-0").unwrap();
    assert_eq!(order.status, OrderStatus::Open);
    assert_eq!(state.position_quantity("m1", Side::Long), Decimal::ZERO);

    let fill = AccountEvent::Fill {
        order_id: "venue-0".to_string(),
        price: dec!(0.45),
        quantity: order.quantity,
        fee: dec!(0.01),
        timestamp: now,
    };
    let outcome = pipeline.handle_account(fill).await.unwrap();
    assert_eq!(outcome.fills, 1);
    assert_eq!(state.position_quantity("m1", Side::Long), order.quantity);
    assert_eq!(state.get_order("venue-0").unwrap().status, OrderStatus::Filled);

    // Replaying the same fill does not double count
    let replay = AccountEvent::Fill {
        order_id: "venue-0".to_string(),
        price: dec!(0.45),
        quantity: order.quantity,
        fee: dec!(0.01),
        timestamp: now,
    };
    pipeline.handle_account(replay).await.unwrap();
    assert_eq!(state.position_quantity("m1", Side::Long), order.quantity);
}
