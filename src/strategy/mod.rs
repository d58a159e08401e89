//! Strategy module
//!
//! Strategies read state snapshots and emit [`Signal`]s; they never write to
//! the state store. The engine dispatches over a closed set of strategies.

mod engine;
mod live_arbitrage;
mod market_maker;
mod statistical_edge;

pub use engine::StrategyEngine;
pub use live_arbitrage::LiveArbitrage;
pub use market_maker::{MarketMaker, QuotePhase};
pub use statistical_edge::{Consensus, StatisticalEdge};

use crate::feed::{GameState, OddsUpdate};
use crate::signal::{Side, Signal, StrategyId};
use crate::state::{MarketState, StateStore};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Read-only view handed to strategies for one event
pub struct StrategyContext<'a> {
    pub state: &'a StateStore,
    pub now: DateTime<Utc>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(state: &'a StateStore, now: DateTime<Utc>) -> Self {
        Self { state, now }
    }

    pub fn position_quantity(&self, market_id: &str, side: Side) -> Decimal {
        self.state.position_quantity(market_id, side)
    }
}

/// Reaction points shared by every strategy
pub trait Strategy {
    fn id(&self) -> StrategyId;

    fn on_market_update(&mut self, _market: &MarketState, _ctx: &StrategyContext<'_>) -> Vec<Signal> {
        Vec::new()
    }

    fn on_game_update(&mut self, _game: &GameState, _ctx: &StrategyContext<'_>) -> Vec<Signal> {
        Vec::new()
    }

    fn on_odds_update(&mut self, _odds: &OddsUpdate, _ctx: &StrategyContext<'_>) -> Vec<Signal> {
        Vec::new()
    }
}

/// Every strategy the engine can run
pub enum StrategyKind {
    MarketMaker(MarketMaker),
    LiveArbitrage(LiveArbitrage),
    StatisticalEdge(StatisticalEdge),
}

impl Strategy for StrategyKind {
    fn id(&self) -> StrategyId {
        match self {
            StrategyKind::MarketMaker(s) => s.id(),
            StrategyKind::LiveArbitrage(s) => s.id(),
            StrategyKind::StatisticalEdge(s) => s.id(),
        }
    }

    fn on_market_update(&mut self, market: &MarketState, ctx: &StrategyContext<'_>) -> Vec<Signal> {
        match self {
            StrategyKind::MarketMaker(s) => s.on_market_update(market, ctx),
            StrategyKind::LiveArbitrage(s) => s.on_market_update(market, ctx),
            StrategyKind::StatisticalEdge(s) => s.on_market_update(market, ctx),
        }
    }

    fn on_game_update(&mut self, game: &GameState, ctx: &StrategyContext<'_>) -> Vec<Signal> {
        match self {
            StrategyKind::MarketMaker(s) => s.on_game_update(game, ctx),
            StrategyKind::LiveArbitrage(s) => s.on_game_update(game, ctx),
            StrategyKind::StatisticalEdge(s) => s.on_game_update(game, ctx),
        }
    }

    fn on_odds_update(&mut self, odds: &OddsUpdate, ctx: &StrategyContext<'_>) -> Vec<Signal> {
        match self {
            StrategyKind::MarketMaker(s) => s.on_odds_update(odds, ctx),
            StrategyKind::LiveArbitrage(s) => s.on_odds_update(odds, ctx),
            StrategyKind::StatisticalEdge(s) => s.on_odds_update(odds, ctx),
        }
    }
}

/// Whole contracts purchasable for `notional` at `price`
pub(crate) fn contracts_for(notional: Decimal, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (notional / price).floor()
}

/// Best price to buy `side` at: its ask, else the complement of the
/// opposite side's bid
pub(crate) fn entry_price(market: &MarketState, side: Side) -> Option<Decimal> {
    market
        .best_ask(side)
        .or_else(|| market.best_bid(side.opposite()).map(|bid| Decimal::ONE - bid))
        .filter(|p| *p > Decimal::ZERO && *p < Decimal::ONE)
}

/// Suppresses repeat entries per market within a window
#[derive(Debug, Default)]
pub(crate) struct Cooldown {
    window: chrono::Duration,
    last: std::collections::HashMap<String, DateTime<Utc>>,
}

impl Cooldown {
    pub fn new(secs: u64) -> Self {
        Self {
            window: chrono::Duration::seconds(secs as i64),
            last: Default::default(),
        }
    }

    pub fn ready(&self, market_id: &str, now: DateTime<Utc>) -> bool {
        self.last
            .get(market_id)
            .map_or(true, |at| now - *at >= self.window)
    }

    pub fn mark(&mut self, market_id: &str, now: DateTime<Utc>) {
        self.last.insert(market_id.to_string(), now);
    }
}
