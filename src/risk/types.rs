//! Risk management types

use super::NoTrade;
use crate::signal::Signal;
use rust_decimal::Decimal;
use thiserror::Error;

/// Why a signal was blocked
///
/// These are normal outcomes of the risk pipeline, not failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("circuit breaker tripped: {0}")]
    CircuitBreaker(String),
    #[error("invalid signal: {0}")]
    InvalidSignal(String),
    #[error("nothing to reduce")]
    NothingToReduce,
    #[error("kelly: {0}")]
    Kelly(#[from] NoTrade),
    #[error("market exposure {exposure} at limit {limit}")]
    MarketLimit { exposure: Decimal, limit: Decimal },
    #[error("max open positions {0} reached")]
    MaxPositions(usize),
    #[error("correlation group {group} exposure {exposure} at limit {limit}")]
    CorrelationLimit {
        group: String,
        exposure: Decimal,
        limit: Decimal,
    },
    #[error("portfolio exposure {exposure} at limit {limit}")]
    PortfolioLimit { exposure: Decimal, limit: Decimal },
    #[error("insufficient free cash {available}")]
    InsufficientCash { available: Decimal },
}

/// Outcome of evaluating one signal
#[derive(Debug, Clone)]
pub enum RiskDecision {
    /// Passed unchanged
    Approved(Signal),
    /// Passed with a smaller quantity
    Resized { signal: Signal, requested: Decimal },
    /// Blocked
    Rejected(RejectReason),
}

impl RiskDecision {
    /// The signal to execute, if any
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            RiskDecision::Approved(signal) | RiskDecision::Resized { signal, .. } => Some(signal),
            RiskDecision::Rejected(_) => None,
        }
    }

    pub fn into_signal(self) -> Option<Signal> {
        match self {
            RiskDecision::Approved(signal) | RiskDecision::Resized { signal, .. } => Some(signal),
            RiskDecision::Rejected(_) => None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.signal().is_some()
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            RiskDecision::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}
