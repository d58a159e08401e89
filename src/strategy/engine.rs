//! Strategy engine

use super::{LiveArbitrage, MarketMaker, StatisticalEdge, Strategy, StrategyContext, StrategyKind};
use crate::config::Config;
use crate::feed::{GameState, OddsUpdate};
use crate::signal::{Signal, StrategyId};
use crate::state::StateStore;
use crate::telemetry::{increment, record_latency, CounterMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Runs every strategy on each event and screens out entries on stale markets
pub struct StrategyEngine {
    strategies: Vec<StrategyKind>,
    state: Arc<StateStore>,
    staleness: chrono::Duration,
}

impl StrategyEngine {
    pub fn new(strategies: Vec<StrategyKind>, state: Arc<StateStore>, staleness: chrono::Duration) -> Self {
        Self {
            strategies,
            state,
            staleness,
        }
    }

    /// Engine running every enabled strategy
    pub fn from_config(config: &Config, state: Arc<StateStore>) -> Self {
        let mut strategies = Vec::new();
        if config.live_arbitrage.enabled {
            strategies.push(StrategyKind::LiveArbitrage(LiveArbitrage::new(
                config.live_arbitrage.clone(),
            )));
        }
        if config.statistical_edge.enabled {
            strategies.push(StrategyKind::StatisticalEdge(StatisticalEdge::new(
                config.statistical_edge.clone(),
            )));
        }
        if config.market_maker.enabled {
            strategies.push(StrategyKind::MarketMaker(MarketMaker::new(
                config.market_maker.clone(),
            )));
        }
        let staleness = chrono::Duration::seconds(config.state.staleness_secs as i64);
        Self::new(strategies, state, staleness)
    }

    pub fn strategy_ids(&self) -> Vec<StrategyId> {
        self.strategies.iter().map(|s| s.id()).collect()
    }

    pub fn on_market_update(&mut self, market_id: &str, now: DateTime<Utc>) -> Vec<Signal> {
        let Some(market) = self.state.get_market(market_id) else {
            return Vec::new();
        };
        let start = Instant::now();
        let ctx = StrategyContext::new(&self.state, now);
        let signals: Vec<Signal> = self
            .strategies
            .iter_mut()
            .flat_map(|s| s.on_market_update(&market, &ctx))
            .collect();
        record_latency(LatencyMetric::SignalGeneration, start.elapsed());
        self.screen(signals, now)
    }

    pub fn on_game_update(&mut self, game: &GameState, now: DateTime<Utc>) -> Vec<Signal> {
        let start = Instant::now();
        let ctx = StrategyContext::new(&self.state, now);
        let signals: Vec<Signal> = self
            .strategies
            .iter_mut()
            .flat_map(|s| s.on_game_update(game, &ctx))
            .collect();
        record_latency(LatencyMetric::SignalGeneration, start.elapsed());
        self.screen(signals, now)
    }

    pub fn on_odds_update(&mut self, odds: &OddsUpdate, now: DateTime<Utc>) -> Vec<Signal> {
        let start = Instant::now();
        let ctx = StrategyContext::new(&self.state, now);
        let signals: Vec<Signal> = self
            .strategies
            .iter_mut()
            .flat_map(|s| s.on_odds_update(odds, &ctx))
            .collect();
        record_latency(LatencyMetric::SignalGeneration, start.elapsed());
        self.screen(signals, now)
    }

    /// Drop entries on stale markets; exits always pass
    fn screen(&self, signals: Vec<Signal>, now: DateTime<Utc>) -> Vec<Signal> {
        signals
            .into_iter()
            .filter(|signal| {
                if signal.is_exit() || !self.state.is_stale(&signal.market_id, now, self.staleness) {
                    increment(CounterMetric::SignalsGenerated);
                    return true;
                }
                debug!(
                    market = %signal.market_id,
                    strategy = %signal.strategy,
                    action = ?signal.action,
                    "Dropping entry on stale market"
                );
                increment(CounterMetric::StaleSignalsDropped);
                false
            })
            .collect()
    }
}
