//! Live-event arbitrage
//!
//! Prices each game update with the score model and buys whichever outcome
//! the market underprices by more than `min_edge`. Entries are then managed
//! on market updates with take-profit and stop-loss exits.

use super::{contracts_for, entry_price, Cooldown, Strategy, StrategyContext};
use crate::config::LiveArbitrageConfig;
use crate::feed::{GameState, GameStatus};
use crate::model::{ScoreModel, WinProbabilityModel};
use crate::signal::{EdgeEstimate, Side, Signal, SignalAction, StrategyId, Urgency};
use crate::state::MarketState;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, info};

/// Score-model arbitrage strategy
pub struct LiveArbitrage {
    config: LiveArbitrageConfig,
    model: Box<dyn WinProbabilityModel>,
    cooldown: Cooldown,
    /// Positions this strategy entered and must manage
    managed: HashSet<(String, Side)>,
}

impl LiveArbitrage {
    pub fn new(config: LiveArbitrageConfig) -> Self {
        let model = ScoreModel::new(config.score_std_per_sqrt_minute, config.home_advantage);
        Self::with_model(config, Box::new(model))
    }

    pub fn with_model(config: LiveArbitrageConfig, model: Box<dyn WinProbabilityModel>) -> Self {
        Self {
            cooldown: Cooldown::new(config.cooldown_secs),
            config,
            model,
            managed: HashSet::new(),
        }
    }

    pub fn is_managing(&self, market_id: &str, side: Side) -> bool {
        self.managed.contains(&(market_id.to_string(), side))
    }

    /// Edge and price for buying `side` given the long probability
    fn edge(market: &MarketState, side: Side, long_probability: Decimal) -> Option<(Decimal, Decimal, Decimal)> {
        let probability = match side {
            Side::Long => long_probability,
            Side::Short => Decimal::ONE - long_probability,
        };
        let price = entry_price(market, side)?;
        Some((probability - price, price, probability))
    }
}

impl Strategy for LiveArbitrage {
    fn id(&self) -> StrategyId {
        StrategyId::LiveArbitrage
    }

    fn on_game_update(&mut self, game: &GameState, ctx: &StrategyContext<'_>) -> Vec<Signal> {
        if !self.config.enabled || game.status != GameStatus::InProgress {
            return Vec::new();
        }
        let Some(market) = ctx.state.get_market(&game.market_id) else {
            debug!(market = %game.market_id, "Game update for untracked market");
            return Vec::new();
        };
        if !self.cooldown.ready(&market.market_id, ctx.now) {
            return Vec::new();
        }

        let long_probability = self.model.long_probability(game);
        let best = [Side::Long, Side::Short]
            .into_iter()
            .filter_map(|side| Self::edge(&market, side, long_probability).map(|e| (side, e)))
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0));
        let Some((side, (edge, price, probability))) = best else {
            return Vec::new();
        };
        if edge <= self.config.min_edge {
            return Vec::new();
        }

        let quantity = contracts_for(self.config.order_size, price);
        if quantity <= Decimal::ZERO {
            return Vec::new();
        }
        let confidence = (edge * self.config.confidence_per_edge).min(Decimal::ONE);

        info!(
            market = %market.market_id,
            event = %game.event_id,
            %side,
            %probability,
            %price,
            %edge,
            "Live arbitrage edge"
        );
        self.cooldown.mark(&market.market_id, ctx.now);
        self.managed.insert((market.market_id.clone(), side));

        vec![Signal::new(&market.market_id, SignalAction::buy(side), price, quantity, StrategyId::LiveArbitrage)
            .with_urgency(Urgency::High)
            .with_confidence(confidence)
            .with_edge(EdgeEstimate::new(probability, confidence))
            .with_reason(format!(
                "model {} vs price {} ({}-{}, {}s left)",
                probability, price, game.home_score, game.away_score, game.seconds_remaining
            ))]
    }

    fn on_market_update(&mut self, market: &MarketState, ctx: &StrategyContext<'_>) -> Vec<Signal> {
        let mut exits = Vec::new();
        for side in [Side::Long, Side::Short] {
            let key = (market.market_id.clone(), side);
            if !self.managed.contains(&key) {
                continue;
            }
            let Some(position) = ctx.state.get_position(&market.market_id, side) else {
                self.managed.remove(&key);
                continue;
            };
            let Some(bid) = market.best_bid(side) else {
                continue;
            };
            if position.avg_price <= Decimal::ZERO {
                continue;
            }

            let change = (bid - position.avg_price) / position.avg_price;
            let reason = if change >= self.config.take_profit_pct {
                "take profit"
            } else if change <= -self.config.stop_loss_pct {
                "stop loss"
            } else {
                continue;
            };

            exits.push(
                Signal::new(&market.market_id, SignalAction::sell(side), bid, position.quantity, StrategyId::LiveArbitrage)
                    .with_urgency(Urgency::High)
                    .reduce_only()
                    .with_reason(format!("{}: bid {} vs entry {}", reason, bid, position.avg_price)),
            );
        }
        exits
    }
}
