//! Per-market signal aggregation

use super::{Signal, SignalAction};
use std::collections::{BTreeMap, HashSet};

/// Signals that survived aggregation for one market, best first
#[derive(Debug, Clone)]
pub struct MarketSignals {
    pub market_id: String,
    pub signals: Vec<Signal>,
}

/// Groups signals by market and keeps the best one per action
///
/// Within a market, signals are ranked by strategy priority and then by
/// confidence; only the top signal for each action survives.
#[derive(Debug, Default, Clone)]
pub struct SignalAggregator;

impl SignalAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, signals: Vec<Signal>) -> Vec<MarketSignals> {
        let mut by_market: BTreeMap<String, Vec<Signal>> = BTreeMap::new();
        for signal in signals {
            by_market
                .entry(signal.market_id.clone())
                .or_default()
                .push(signal);
        }

        by_market
            .into_iter()
            .map(|(market_id, mut signals)| {
                // Stable sort keeps emission order among equals
                signals.sort_by(|a, b| {
                    b.strategy
                        .priority()
                        .cmp(&a.strategy.priority())
                        .then_with(|| b.confidence.cmp(&a.confidence))
                });
                let mut seen: HashSet<SignalAction> = HashSet::new();
                signals.retain(|s| seen.insert(s.action));
                MarketSignals { market_id, signals }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::StrategyId;
    use rust_decimal_macros::dec;

    fn signal(market: &str, action: SignalAction, strategy: StrategyId) -> Signal {
        Signal::new(market, action, dec!(0.5), dec!(10), strategy)
    }

    #[test]
    fn test_priority_wins_per_action() {
        let out = SignalAggregator::new().aggregate(vec![
            signal("m1", SignalAction::BuyLong, StrategyId::MarketMaker),
            signal("m1", SignalAction::BuyLong, StrategyId::StatisticalEdge),
            signal("m1", SignalAction::BuyLong, StrategyId::LiveArbitrage),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].signals.len(), 1);
        assert_eq!(out[0].signals[0].strategy, StrategyId::LiveArbitrage);
    }

    #[test]
    fn test_confidence_breaks_ties() {
        let low = signal("m1", SignalAction::BuyShort, StrategyId::StatisticalEdge).with_confidence(dec!(0.6));
        let high = signal("m1", SignalAction::BuyShort, StrategyId::StatisticalEdge).with_confidence(dec!(0.9));
        let out = SignalAggregator::new().aggregate(vec![low, high.clone()]);
        assert_eq!(out[0].signals[0].id, high.id);
    }

    #[test]
    fn test_distinct_actions_and_markets_survive() {
        let out = SignalAggregator::new().aggregate(vec![
            signal("m2", SignalAction::BuyLong, StrategyId::MarketMaker),
            signal("m1", SignalAction::BuyLong, StrategyId::MarketMaker),
            signal("m1", SignalAction::BuyShort, StrategyId::MarketMaker),
            Signal::cancel_all("m1", StrategyId::MarketMaker),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].market_id, "m1");
        assert_eq!(out[0].signals.len(), 3);
        assert_eq!(out[1].market_id, "m2");
    }

    #[test]
    fn test_ordering_within_market() {
        let out = SignalAggregator::new().aggregate(vec![
            signal("m1", SignalAction::BuyShort, StrategyId::MarketMaker),
            signal("m1", SignalAction::BuyLong, StrategyId::LiveArbitrage),
        ]);
        assert_eq!(out[0].signals[0].strategy, StrategyId::LiveArbitrage);
        assert_eq!(out[0].signals[1].strategy, StrategyId::MarketMaker);
    }
}
