//! End-to-end paper trading through the pipeline

use chrono::{DateTime, Duration, Utc};
use poly_engine::config::Config;
use poly_engine::execution::SimulatedExecutor;
use poly_engine::feed::{ordered_channel, GameState, GameStatus, JsonlReplay, MarketTick};
use poly_engine::orderbook::PriceLevel;
use poly_engine::pipeline::Pipeline;
use poly_engine::risk::BreakerState;
use poly_engine::signal::Side;
use poly_engine::state::StateStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::Cursor;
use std::sync::Arc;

fn arbitrage_only() -> Config {
    let mut config = Config::default();
    config.market_maker.enabled = false;
    config.statistical_edge.enabled = false;
    config
}

fn paper_pipeline(config: &Config) -> Pipeline {
    let state = Arc::new(StateStore::new(config.execution.initial_balance));
    let executor = Arc::new(SimulatedExecutor::from_config(state.clone(), &config.execution));
    Pipeline::new(config, state, executor)
}

fn tick(bid: Decimal, ask: Decimal, at: DateTime<Utc>) -> MarketTick {
    MarketTick::top_of_book(
        "m1",
        PriceLevel::new(bid, dec!(100)),
        PriceLevel::new(ask, dec!(100)),
        at,
    )
}

fn tied_game(at: DateTime<Utc>) -> GameState {
    GameState {
        event_id: "g1".to_string(),
        market_id: "m1".to_string(),
        home_score: 50,
        away_score: 50,
        period: 2,
        seconds_remaining: 1200,
        status: GameStatus::InProgress,
        home_is_long: true,
        timestamp: at,
    }
}

#[tokio::test]
async fn test_live_arbitrage_round_trip() {
    let config = arbitrage_only();
    let mut pipeline = paper_pipeline(&config);
    let start = Utc::now();

    pipeline.handle_market_tick(tick(dec!(0.43), dec!(0.45), start)).await;
    let entry = pipeline.handle_game(tied_game(start)).await;
    assert_eq!(entry.approved, 1);
    assert_eq!(entry.orders_submitted, 1);

    let state = pipeline.state().clone();
    assert_eq!(state.position_quantity("m1", Side::Long), dec!(22));
    // Taker fee on the quoted ask: 0.45 * 22 * 0.001
    assert_eq!(state.account().fees_paid, dec!(0.0099));

    // Bid well above entry: take profit
    let exit = pipeline
        .handle_market_tick(tick(dec!(0.52), dec!(0.54), start + Duration::seconds(1)))
        .await;
    assert_eq!(exit.orders_submitted, 1);
    assert_eq!(state.position_quantity("m1", Side::Long), Decimal::ZERO);

    let summary = pipeline.summary();
    assert_eq!(summary.fill_count, 2);
    assert!(summary.realized_pnl > Decimal::ZERO);
    assert_eq!(summary.open_positions, 0);
    assert_eq!(summary.events.market, 2);
    assert_eq!(summary.events.game, 1);
}

#[tokio::test]
async fn test_exits_still_flow_while_breaker_tripped() {
    let config = arbitrage_only();
    let mut pipeline = paper_pipeline(&config);
    let start = Utc::now();

    pipeline.handle_market_tick(tick(dec!(0.43), dec!(0.45), start)).await;
    pipeline.handle_game(tied_game(start)).await;
    pipeline.risk().trip_breaker("operator halt", start);

    let exit = pipeline
        .handle_market_tick(tick(dec!(0.52), dec!(0.54), start + Duration::seconds(1)))
        .await;
    assert_eq!(exit.approved, 1);
    assert_eq!(pipeline.state().position_quantity("m1", Side::Long), Decimal::ZERO);

    // New entries stay blocked
    let later = start + Duration::seconds(10);
    pipeline.handle_market_tick(tick(dec!(0.43), dec!(0.45), later)).await;
    let blocked = pipeline.handle_game(tied_game(later)).await;
    assert_eq!(blocked.rejected, 1);
    assert_eq!(blocked.orders_submitted, 0);
    assert_eq!(pipeline.summary().breaker, BreakerState::Tripped);
}

#[tokio::test]
async fn test_stale_market_gets_no_entries() {
    let config = arbitrage_only();
    let mut pipeline = paper_pipeline(&config);
    let start = Utc::now();

    pipeline.handle_market_tick(tick(dec!(0.43), dec!(0.45), start)).await;
    let outcome = pipeline.handle_game(tied_game(start + Duration::seconds(60))).await;
    assert_eq!(outcome.signals, 0);
    assert_eq!(outcome.orders_submitted, 0);
}

#[tokio::test]
async fn test_replayed_session_ends_flat_on_orders() {
    let mut config = Config::default();
    config.live_arbitrage.enabled = false;
    config.statistical_edge.enabled = false;
    let pipeline = paper_pipeline(&config);
    let state = pipeline.state().clone();

    let events = [
        r#"{"type":"market","market_id":"m1","long_bids":[{"price":"0.48","size":"100"}],"long_asks":[{"price":"0.52","size":"100"}],"timestamp":"2024-03-01T18:00:00Z"}"#,
        "# quotes rest, nothing crosses",
        r#"{"type":"market","market_id":"m2","long_bids":[{"price":"0.30","size":"50"}],"long_asks":[{"price":"0.34","size":"50"}],"timestamp":"2024-03-01T18:00:01Z"}"#,
        "not json",
        r#"{"type":"account","kind":"balance","balance":"1000"}"#,
    ]
    .join("\n");

    let (tx, rx) = ordered_channel(config.state.channel_buffer);
    let feeder = tokio::spawn(JsonlReplay::new(Cursor::new(events.into_bytes())).run(tx));
    let summary = pipeline.run(rx, std::future::pending()).await.unwrap();

    assert_eq!(feeder.await.unwrap().unwrap(), 3);
    assert_eq!(summary.events.market, 2);
    assert_eq!(summary.events.account, 1);
    assert_eq!(summary.activity.orders_submitted, 4);
    assert_eq!(summary.open_orders, 0);
    assert!(state.get_open_orders(None).is_empty());
    assert_eq!(summary.balance, dec!(1000));
}

#[tokio::test]
async fn test_replay_keeps_file_order_across_sources() {
    let config = arbitrage_only();
    let pipeline = paper_pipeline(&config);
    let state = pipeline.state().clone();

    let mut lines = vec![
        r#"{"type":"market","market_id":"m1","long_bids":[{"price":"0.43","size":"100"}],"long_asks":[{"price":"0.45","size":"100"}],"timestamp":"2024-03-01T18:00:00Z"}"#.to_string(),
        r#"{"type":"game","event_id":"g1","market_id":"m1","home_score":50,"away_score":50,"period":2,"seconds_remaining":1200,"status":"in_progress","timestamp":"2024-03-01T18:00:00Z"}"#.to_string(),
    ];
    // The ask runs away after the game event; the bid stays inside both exits
    for i in 1..20 {
        lines.push(format!(
            r#"{{"type":"market","market_id":"m1","long_bids":[{{"price":"0.44","size":"100"}}],"long_asks":[{{"price":"0.60","size":"100"}}],"timestamp":"2024-03-01T18:00:{:02}Z"}}"#,
            i
        ));
    }

    let (tx, rx) = ordered_channel(4);
    let feeder = tokio::spawn(JsonlReplay::new(Cursor::new(lines.join("\n").into_bytes())).run(tx));
    let summary = pipeline.run(rx, std::future::pending()).await.unwrap();

    assert_eq!(feeder.await.unwrap().unwrap(), 21);
    assert_eq!(summary.events.game, 1);
    assert_eq!(summary.events.market, 20);
    assert_eq!(summary.activity.orders_submitted, 1);
    assert_eq!(summary.fill_count, 1);
    assert_eq!(state.position_quantity("m1", Side::Long), dec!(22));
}

#[tokio::test]
async fn test_completeness_gap_is_reported() {
    let config = arbitrage_only();
    let mut pipeline = paper_pipeline(&config);
    let at = Utc::now();

    let gap = tick(dec!(0.46), dec!(0.48), at).with_short(
        vec![PriceLevel::new(dec!(0.46), dec!(40))],
        vec![PriceLevel::new(dec!(0.48), dec!(30))],
    );
    pipeline.handle_market_tick(gap).await;

    let summary = pipeline.summary();
    assert_eq!(summary.completeness.len(), 1);
    assert_eq!(summary.completeness[0].margin, dec!(0.03904));
    assert_eq!(summary.completeness[0].size, dec!(30));
}
