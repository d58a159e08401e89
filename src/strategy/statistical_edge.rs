//! Statistical edge against a weighted odds consensus

use super::{contracts_for, entry_price, Cooldown, Strategy, StrategyContext};
use crate::config::StatisticalEdgeConfig;
use crate::feed::{OddsUpdate, SourceQuote};
use crate::signal::{EdgeEstimate, Side, Signal, SignalAction, StrategyId, Urgency};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::debug;

/// Reliability-weighted view of the long outcome across sources
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub probability: Decimal,
    /// Weighted standard deviation across sources
    pub dispersion: Decimal,
    /// 1 when sources agree, 0 at `max_dispersion` or beyond
    pub confidence: Decimal,
    pub sources: usize,
}

/// Trades when the market disagrees with a tight consensus
pub struct StatisticalEdge {
    config: StatisticalEdgeConfig,
    cooldown: Cooldown,
}

impl StatisticalEdge {
    pub fn new(config: StatisticalEdgeConfig) -> Self {
        Self {
            cooldown: Cooldown::new(config.cooldown_secs),
            config,
        }
    }

    fn weight(&self, source: &str) -> Decimal {
        self.config
            .source_weights
            .get(&source.to_lowercase())
            .copied()
            .unwrap_or(self.config.default_weight)
    }

    /// Combine source quotes; `None` with too few usable sources
    pub fn consensus(&self, quotes: &[SourceQuote]) -> Option<Consensus> {
        let usable: Vec<(Decimal, Decimal)> = quotes
            .iter()
            .filter_map(|q| Some((self.weight(&q.source), q.fair_long_probability()?)))
            .filter(|(w, _)| *w > Decimal::ZERO)
            .collect();
        if usable.is_empty() || usable.len() < self.config.min_sources {
            return None;
        }

        let total: Decimal = usable.iter().map(|(w, _)| *w).sum();
        let probability = usable.iter().map(|(w, p)| *w * *p).sum::<Decimal>() / total;
        let variance = usable
            .iter()
            .map(|(w, p)| *w * (*p - probability) * (*p - probability))
            .sum::<Decimal>()
            / total;
        let dispersion = variance
            .to_f64()
            .map(f64::sqrt)
            .and_then(Decimal::from_f64)
            .unwrap_or_default()
            .round_dp(6);

        let confidence = if self.config.max_dispersion > Decimal::ZERO {
            (Decimal::ONE - dispersion / self.config.max_dispersion).max(Decimal::ZERO)
        } else if dispersion.is_zero() {
            Decimal::ONE
        } else {
            Decimal::ZERO
        };

        Some(Consensus {
            probability,
            dispersion,
            confidence,
            sources: usable.len(),
        })
    }
}

impl Strategy for StatisticalEdge {
    fn id(&self) -> StrategyId {
        StrategyId::StatisticalEdge
    }

    fn on_odds_update(&mut self, odds: &OddsUpdate, ctx: &StrategyContext<'_>) -> Vec<Signal> {
        if !self.config.enabled {
            return Vec::new();
        }
        let Some(consensus) = self.consensus(&odds.quotes) else {
            return Vec::new();
        };
        if consensus.confidence < self.config.min_confidence {
            debug!(market = %odds.market_id, dispersion = %consensus.dispersion, "Sources disagree");
            return Vec::new();
        }
        let Some(market) = ctx.state.get_market(&odds.market_id) else {
            return Vec::new();
        };
        if !self.cooldown.ready(&market.market_id, ctx.now) {
            return Vec::new();
        }

        let best = [Side::Long, Side::Short]
            .into_iter()
            .filter_map(|side| {
                let probability = match side {
                    Side::Long => consensus.probability,
                    Side::Short => Decimal::ONE - consensus.probability,
                };
                entry_price(&market, side).map(|price| (side, probability - price, price, probability))
            })
            .max_by(|a, b| a.1.cmp(&b.1));
        let Some((side, edge, price, probability)) = best else {
            return Vec::new();
        };
        if edge <= self.config.min_edge {
            return Vec::new();
        }
        let quantity = contracts_for(self.config.order_size, price);
        if quantity <= Decimal::ZERO {
            return Vec::new();
        }

        debug!(
            market = %market.market_id,
            %side,
            consensus = %consensus.probability,
            confidence = %consensus.confidence,
            %edge,
            "Consensus edge"
        );
        self.cooldown.mark(&market.market_id, ctx.now);
        vec![Signal::new(&market.market_id, SignalAction::buy(side), price, quantity, StrategyId::StatisticalEdge)
            .with_urgency(Urgency::Low)
            .with_confidence(consensus.confidence)
            .with_edge(EdgeEstimate::new(probability, consensus.confidence))
            .with_reason(format!(
                "consensus {} from {} sources vs price {}",
                probability, consensus.sources, price
            ))]
    }
}
