//! Signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::state::OrderIntent;

/// One of the two complementary outcomes of a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The "yes" outcome
    Long,
    /// The "no" outcome
    Short,
}

impl Side {
    /// The complementary outcome
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// What a signal asks the execution layer to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    BuyLong,
    SellLong,
    BuyShort,
    SellShort,
    /// Cancel the strategy's own resting orders in the market
    CancelAll,
}

impl SignalAction {
    /// Buy action for the given side
    pub fn buy(side: Side) -> Self {
        match side {
            Side::Long => SignalAction::BuyLong,
            Side::Short => SignalAction::BuyShort,
        }
    }

    /// Sell action for the given side
    pub fn sell(side: Side) -> Self {
        match side {
            Side::Long => SignalAction::SellLong,
            Side::Short => SignalAction::SellShort,
        }
    }

    /// Outcome side traded, `None` for cancels
    pub fn side(self) -> Option<Side> {
        self.intent().map(OrderIntent::side)
    }

    pub fn is_buy(self) -> bool {
        matches!(self, SignalAction::BuyLong | SignalAction::BuyShort)
    }

    pub fn is_sell(self) -> bool {
        matches!(self, SignalAction::SellLong | SignalAction::SellShort)
    }

    pub fn is_cancel(self) -> bool {
        matches!(self, SignalAction::CancelAll)
    }

    /// Order intent for this action, `None` for cancels
    pub fn intent(self) -> Option<OrderIntent> {
        match self {
            SignalAction::BuyLong => Some(OrderIntent::BuyLong),
            SignalAction::SellLong => Some(OrderIntent::SellLong),
            SignalAction::BuyShort => Some(OrderIntent::BuyShort),
            SignalAction::SellShort => Some(OrderIntent::SellShort),
            SignalAction::CancelAll => None,
        }
    }
}

/// How quickly a signal should be acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// Strategy that produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    MarketMaker,
    LiveArbitrage,
    StatisticalEdge,
}

impl StrategyId {
    /// Aggregation priority, higher wins
    pub fn priority(self) -> u8 {
        match self {
            StrategyId::LiveArbitrage => 3,
            StrategyId::StatisticalEdge => 2,
            StrategyId::MarketMaker => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyId::MarketMaker => "market_maker",
            StrategyId::LiveArbitrage => "live_arbitrage",
            StrategyId::StatisticalEdge => "statistical_edge",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated true probability of the traded side, plus how much we trust it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEstimate {
    /// Probability that the traded side resolves to 1
    pub probability: Decimal,
    /// Confidence in the estimate, in [0, 1]
    pub confidence: Decimal,
}

impl EdgeEstimate {
    pub fn new(probability: Decimal, confidence: Decimal) -> Self {
        Self {
            probability,
            confidence: confidence.max(Decimal::ZERO).min(Decimal::ONE),
        }
    }
}

/// A trading signal
///
/// Signals are immutable once emitted. The risk manager derives a resized
/// copy through [`Signal::resized`] instead of editing the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal identifier
    pub id: Uuid,
    /// Market identifier
    pub market_id: String,
    /// Requested action
    pub action: SignalAction,
    /// Limit price (ignored for cancels)
    pub price: Decimal,
    /// Contracts requested (ignored for cancels)
    pub quantity: Decimal,
    /// Urgency class
    pub urgency: Urgency,
    /// Originating strategy
    pub strategy: StrategyId,
    /// Confidence in [0, 1]
    pub confidence: Decimal,
    /// Human-readable rationale
    pub reason: String,
    /// Probability estimate used for Kelly sizing
    pub edge: Option<EdgeEstimate>,
    /// Only ever reduces an existing position
    pub reduce_only: bool,
    /// Signal generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Create a new signal with low urgency and full confidence
    pub fn new(
        market_id: impl Into<String>,
        action: SignalAction,
        price: Decimal,
        quantity: Decimal,
        strategy: StrategyId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            market_id: market_id.into(),
            action,
            price,
            quantity,
            urgency: Urgency::Low,
            strategy,
            confidence: Decimal::ONE,
            reason: String::new(),
            edge: None,
            reduce_only: false,
            timestamp: Utc::now(),
        }
    }

    /// Cancel this strategy's resting orders in a market
    pub fn cancel_all(market_id: impl Into<String>, strategy: StrategyId) -> Self {
        Self::new(
            market_id,
            SignalAction::CancelAll,
            Decimal::ZERO,
            Decimal::ZERO,
            strategy,
        )
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_confidence(mut self, confidence: Decimal) -> Self {
        self.confidence = confidence.max(Decimal::ZERO).min(Decimal::ONE);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_edge(mut self, edge: EdgeEstimate) -> Self {
        self.edge = Some(edge);
        self
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    /// Exits are cancels, reduce-only signals, and sells (positions are never
    /// opened by selling)
    pub fn is_exit(&self) -> bool {
        self.reduce_only || self.action.is_cancel() || self.action.is_sell()
    }

    /// Notional value at the limit price
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    /// Copy of this signal with a different quantity
    pub fn resized(&self, quantity: Decimal) -> Self {
        Self {
            quantity,
            ..self.clone()
        }
    }
}
