//! Execution types

use crate::signal::{Signal, StrategyId, Urgency};
use crate::state::{OrderIntent, OrderKind, OrderStatus, StateError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// How long an order may rest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Good until cancelled
    Gtc,
    /// Immediate or cancel
    Ioc,
}

/// An order to be submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Caller-assigned id, reused across retries so the venue can dedupe
    pub client_order_id: String,
    pub market_id: String,
    pub intent: OrderIntent,
    pub kind: OrderKind,
    /// Limit price, `None` for market orders
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub time_in_force: TimeInForce,
    pub strategy: Option<StrategyId>,
}

impl OrderRequest {
    /// Limit order good until cancelled
    pub fn limit(market_id: impl Into<String>, intent: OrderIntent, price: Decimal, quantity: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            market_id: market_id.into(),
            intent,
            kind: OrderKind::Limit,
            price: Some(price),
            quantity,
            time_in_force: TimeInForce::Gtc,
            strategy: None,
        }
    }

    /// Market order, filled at the touch or not at all
    pub fn market(market_id: impl Into<String>, intent: OrderIntent, quantity: Decimal) -> Self {
        Self {
            kind: OrderKind::Market,
            price: None,
            time_in_force: TimeInForce::Ioc,
            ..Self::limit(market_id, intent, Decimal::ZERO, quantity)
        }
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Limit order for an approved signal; `None` for cancels
    ///
    /// High-urgency signals take liquidity and never rest.
    pub fn from_signal(signal: &Signal) -> Option<Self> {
        let intent = signal.action.intent()?;
        let tif = if signal.urgency == Urgency::High {
            TimeInForce::Ioc
        } else {
            TimeInForce::Gtc
        };
        let mut request = Self::limit(&signal.market_id, intent, signal.price, signal.quantity)
            .with_time_in_force(tif);
        request.strategy = Some(signal.strategy);
        Some(request)
    }
}

/// Which side of the trade provided liquidity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liquidity {
    Maker,
    Taker,
}

/// A fill (executed trade)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub market_id: String,
    pub intent: OrderIntent,
    /// Effective price paid or received
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub liquidity: Liquidity,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Execution errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("venue call timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited by venue")]
    RateLimited,
    #[error("venue server error (HTTP {status})")]
    Server { status: u16 },
    #[error("network error: {0}")]
    Network(String),
    #[error("order rejected: {reason}")]
    Rejected { reason: String },
    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },
    #[error("insufficient position: selling {required}, holding {held}")]
    InsufficientPosition { required: Decimal, held: Decimal },
    #[error("invalid price {0}")]
    InvalidPrice(Decimal),
    #[error("market {0} is closed")]
    MarketClosed(String),
    #[error("unknown order {0}")]
    UnknownOrder(String),
    #[error("order {order_id} is {status}")]
    NotOpen { order_id: String, status: OrderStatus },
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error(transparent)]
    State(#[from] StateError),
}

impl ExecutionError {
    /// Transient failures worth retrying; everything else is authoritative
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecutionError::Timeout(_) | ExecutionError::RateLimited | ExecutionError::Network(_) => true,
            ExecutionError::Server { status } => *status >= 500,
            _ => false,
        }
    }
}
