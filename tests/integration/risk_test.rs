//! Risk gate properties

use chrono::{Duration, Utc};
use poly_engine::config::RiskConfig;
use poly_engine::feed::MarketTick;
use poly_engine::orderbook::{MarketBook, OrderBook, PriceLevel};
use poly_engine::risk::{
    BreakerLimits, BreakerState, CircuitBreaker, KellySizer, NoTrade, RejectReason, RiskDecision,
    RiskManager,
};
use poly_engine::signal::{EdgeEstimate, Side, Signal, SignalAction, StrategyId};
use poly_engine::state::StateStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn manager(config: RiskConfig, balance: Decimal) -> (RiskManager, Arc<StateStore>) {
    let state = Arc::new(StateStore::new(balance));
    (RiskManager::new(config, &[], Arc::clone(&state)), state)
}

fn buy(market: &str, price: Decimal, quantity: Decimal) -> Signal {
    Signal::new(market, SignalAction::BuyLong, price, quantity, StrategyId::StatisticalEdge)
}

#[test]
fn test_kelly_fraction_shrinks_with_multiplier() {
    let estimate = EdgeEstimate::new(dec!(0.62), dec!(1));
    let mut previous: Option<Decimal> = None;
    for multiplier in [dec!(1), dec!(0.75), dec!(0.5), dec!(0.25), dec!(0.1)] {
        let sized = KellySizer::new(multiplier, dec!(0.01))
            .size(&estimate, dec!(0.55), true, dec!(10000), dec!(1))
            .unwrap();
        assert!(sized.fraction > Decimal::ZERO);
        if let Some(prev) = previous {
            assert!(sized.fraction < prev);
        }
        previous = Some(sized.fraction);
    }
}

#[test]
fn test_kelly_has_no_trade_without_edge() {
    let sizer = KellySizer::new(dec!(0.25), dec!(0.0));
    for (probability, price) in [(dec!(0.40), dec!(0.40)), (dec!(0.30), dec!(0.45)), (dec!(0.05), dec!(0.90))] {
        for confidence in [dec!(0.1), dec!(1)] {
            let estimate = EdgeEstimate::new(probability, confidence);
            let result = sizer.size(&estimate, price, true, dec!(1000), dec!(1));
            assert!(result.is_err(), "p={} price={} should not trade", probability, price);
        }
    }
    assert!(matches!(
        KellySizer::full_fraction(dec!(0.50), dec!(0.50), true),
        Err(NoTrade::NoEdge { .. })
    ));
}

#[test]
fn test_market_cap_clips_forty_to_twenty() {
    let config = RiskConfig {
        max_position_per_market: dec!(100),
        max_portfolio_exposure: dec!(1000),
        ..RiskConfig::default()
    };
    let (risk, state) = manager(config, dec!(10000));
    state.update_position("m1", Side::Long, dec!(200), dec!(0.40), Utc::now()); // $80

    let decision = risk.evaluate(&buy("m1", dec!(0.40), dec!(100)), Utc::now()); // $40
    let approved = decision.signal().unwrap();
    assert_eq!(approved.notional(), dec!(20));
    assert!(matches!(decision, RiskDecision::Resized { .. }));
}

#[test]
fn test_portfolio_cap_rejects_after_market_clip() {
    let config = RiskConfig {
        max_position_per_market: dec!(100),
        max_portfolio_exposure: dec!(150),
        ..RiskConfig::default()
    };
    let (risk, state) = manager(config, dec!(10000));
    for market in ["m2", "m3", "m4"] {
        state.update_position(market, Side::Long, dec!(100), dec!(0.50), Utc::now()); // $50 each
    }

    let decision = risk.evaluate(&buy("m1", dec!(0.50), dec!(200)), Utc::now()); // $100
    assert!(matches!(
        decision.reject_reason(),
        Some(RejectReason::PortfolioLimit { .. })
    ));
}

#[test]
fn test_breaker_trips_at_exact_daily_limit_and_stays_tripped() {
    let now = Utc::now();
    let mut breaker = CircuitBreaker::new(BreakerLimits::from(&RiskConfig::default()), dec!(1000), now);
    assert!(breaker.update_equity(dec!(975.000001), now).is_none());
    assert!(breaker.update_equity(dec!(975), now).is_some());

    for step in 1..5 {
        breaker.update_equity(dec!(1100), now + Duration::minutes(step));
        assert_eq!(breaker.state(), BreakerState::Tripped);
    }
    breaker.reset(dec!(1100), now + Duration::minutes(10));
    assert_eq!(breaker.state(), BreakerState::Open);
}

#[test]
fn test_exits_pass_a_tripped_breaker() {
    let (risk, state) = manager(RiskConfig::default(), dec!(1000));
    let now = Utc::now();
    state
        .apply_tick(&MarketTick::top_of_book(
            "m1",
            PriceLevel::new(dec!(0.50), dec!(100)),
            PriceLevel::new(dec!(0.52), dec!(100)),
            now,
        ))
        .unwrap();
    state.update_position("m1", Side::Long, dec!(30), dec!(0.45), now);
    risk.trip_breaker("test halt", now);

    let exit = Signal::new("m1", SignalAction::SellLong, dec!(0.50), dec!(30), StrategyId::MarketMaker).reduce_only();
    assert!(risk.evaluate(&exit, now).is_approved());
    assert!(risk
        .evaluate(&Signal::cancel_all("m1", StrategyId::MarketMaker), now)
        .is_approved());

    let entry = buy("m1", dec!(0.52), dec!(10));
    assert!(matches!(
        risk.evaluate(&entry, now).reject_reason(),
        Some(RejectReason::CircuitBreaker(_))
    ));
}

#[test]
fn test_completeness_margin_after_fees() {
    let book = MarketBook {
        long: OrderBook::from_levels(vec![], vec![PriceLevel::new(dec!(0.48), dec!(10))]),
        short: OrderBook::from_levels(vec![], vec![PriceLevel::new(dec!(0.48), dec!(10))]),
    };
    assert_eq!(book.completeness_margin(dec!(0.001)), Some(dec!(0.03904)));
}
