//! Signal module
//!
//! Trading signals emitted by strategies and the aggregation step that
//! ranks and deduplicates them per market

mod aggregator;
mod types;

pub use aggregator::{MarketSignals, SignalAggregator};
pub use types::{EdgeEstimate, Side, Signal, SignalAction, StrategyId, Urgency};
