//! State types

use crate::signal::{Side, StrategyId};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top of book for one outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Option<Decimal>,
    pub bid_size: Decimal,
    pub ask: Option<Decimal>,
    pub ask_size: Decimal,
}

impl Quote {
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }
}

/// Latest known state of one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub market_id: String,
    pub long: Quote,
    pub short: Quote,
    pub last_trade_price: Option<Decimal>,
    pub last_trade_time: Option<DateTime<Utc>>,
    /// Time of the last write
    pub updated_at: DateTime<Utc>,
    /// Store-wide sequence number of the last write
    pub sequence: u64,
}

impl MarketState {
    pub fn new(market_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            market_id: market_id.into(),
            long: Quote::default(),
            short: Quote::default(),
            last_trade_price: None,
            last_trade_time: None,
            updated_at: at,
            sequence: 0,
        }
    }

    pub fn quote(&self, side: Side) -> &Quote {
        match side {
            Side::Long => &self.long,
            Side::Short => &self.short,
        }
    }

    pub fn best_bid(&self, side: Side) -> Option<Decimal> {
        self.quote(side).bid
    }

    pub fn best_ask(&self, side: Side) -> Option<Decimal> {
        self.quote(side).ask
    }

    /// Mid of the long outcome
    pub fn long_mid(&self) -> Option<Decimal> {
        self.long.mid()
    }

    /// Price to mark a held side at: its best bid, falling back to the mid
    /// implied by the opposite book
    pub fn mark_price(&self, side: Side) -> Option<Decimal> {
        self.best_bid(side)
            .or_else(|| self.quote(side.opposite()).mid().map(|m| Decimal::ONE - m))
    }

    /// Older than `max_age` as of `now`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.updated_at > max_age
    }
}

/// Partial market update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct MarketUpdate {
    pub long: Option<Quote>,
    pub short: Option<Quote>,
    pub last_trade: Option<(Decimal, DateTime<Utc>)>,
}

/// Holding of one side of one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionState {
    pub market_id: String,
    pub side: Side,
    /// Contracts held, always positive while the position exists
    pub quantity: Decimal,
    /// Average entry price
    pub avg_price: Decimal,
    /// Latest mark for the held side
    pub mark_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PositionState {
    /// Capital spent acquiring the position
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.avg_price
    }

    /// Value at the current mark
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.mark_price
    }

    /// Each side is its own contract, so both sides gain when their own
    /// price rises
    pub fn unrealized_pnl(&self) -> Decimal {
        self.quantity * (self.mark_price - self.avg_price)
    }

    /// Unrealized return relative to entry
    pub fn return_pct(&self) -> Decimal {
        if self.avg_price.is_zero() {
            return Decimal::ZERO;
        }
        (self.mark_price - self.avg_price) / self.avg_price
    }
}

/// Direction and outcome of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderIntent {
    BuyLong,
    SellLong,
    BuyShort,
    SellShort,
}

impl OrderIntent {
    pub fn side(self) -> Side {
        match self {
            OrderIntent::BuyLong | OrderIntent::SellLong => Side::Long,
            OrderIntent::BuyShort | OrderIntent::SellShort => Side::Short,
        }
    }

    pub fn is_buy(self) -> bool {
        matches!(self, OrderIntent::BuyLong | OrderIntent::BuyShort)
    }
}

impl fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderIntent::BuyLong => "buy_long",
            OrderIntent::SellLong => "sell_long",
            OrderIntent::BuyShort => "buy_short",
            OrderIntent::SellShort => "sell_short",
        };
        f.write_str(s)
    }
}

/// Limit or market order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Limit,
    Market,
}

/// Order lifecycle
///
/// ```text
/// Created -> Submitted -> Open -> PartiallyFilled -> Filled
///                |          |           |
///                v          v           v
///             Rejected   Cancelled   Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Submitted,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Submitted)
                | (Submitted, Open)
                | (Submitted, Rejected)
                | (Open, PartiallyFilled)
                | (Open, Filled)
                | (Open, Cancelled)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
        )
    }

    /// No further transitions possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Resting at the venue and able to fill
    pub fn is_open(self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Tracked order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderState {
    pub order_id: String,
    pub market_id: String,
    pub intent: OrderIntent,
    pub kind: OrderKind,
    /// Limit price (worst acceptable price for market orders)
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    /// Volume-weighted fill price
    pub avg_fill_price: Option<Decimal>,
    pub status: OrderStatus,
    pub strategy: Option<StrategyId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderState {
    pub fn new(
        order_id: impl Into<String>,
        market_id: impl Into<String>,
        intent: OrderIntent,
        kind: OrderKind,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id: order_id.into(),
            market_id: market_id.into(),
            intent,
            kind,
            price,
            quantity,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            status: OrderStatus::Created,
            strategy: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn remaining(&self) -> Decimal {
        (self.quantity - self.filled_quantity).max(Decimal::ZERO)
    }

    /// Cash committed by a live buy, including one still awaiting the venue
    pub fn reserved_notional(&self) -> Decimal {
        if self.intent.is_buy() && !self.status.is_terminal() {
            self.remaining() * self.price
        } else {
            Decimal::ZERO
        }
    }
}

/// Changes to apply to a tracked order
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub filled_quantity: Option<Decimal>,
    pub avg_fill_price: Option<Decimal>,
    pub price: Option<Decimal>,
    pub quantity: Option<Decimal>,
}

impl OrderUpdate {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Cash account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    pub balance: Decimal,
    pub realized_pnl: Decimal,
    pub fees_paid: Decimal,
    pub volume: Decimal,
    pub fill_count: u64,
}

/// Pair of asks whose combined cost is below the guaranteed payout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessOpportunity {
    pub market_id: String,
    pub long_ask: Decimal,
    pub short_ask: Decimal,
    /// Profit per pair after fees
    pub margin: Decimal,
    /// Pairs available at the top of both books
    pub size: Decimal,
}

/// Point-in-time view for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub account: Account,
    pub equity: Decimal,
    pub total_exposure: Decimal,
    pub positions: Vec<PositionState>,
    pub open_orders: Vec<OrderState>,
    pub sequence: u64,
}
