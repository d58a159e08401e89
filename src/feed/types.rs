//! Feed event types

use crate::orderbook::PriceLevel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Full book snapshot for one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketTick {
    pub market_id: String,
    #[serde(default)]
    pub long_bids: Vec<PriceLevel>,
    #[serde(default)]
    pub long_asks: Vec<PriceLevel>,
    #[serde(default)]
    pub short_bids: Vec<PriceLevel>,
    #[serde(default)]
    pub short_asks: Vec<PriceLevel>,
    #[serde(default)]
    pub last_trade_price: Option<Decimal>,
    #[serde(default)]
    pub last_trade_time: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

impl MarketTick {
    /// Tick with only top-of-book levels on the long side
    pub fn top_of_book(
        market_id: impl Into<String>,
        bid: PriceLevel,
        ask: PriceLevel,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            long_bids: vec![bid],
            long_asks: vec![ask],
            short_bids: vec![],
            short_asks: vec![],
            last_trade_price: None,
            last_trade_time: None,
            timestamp,
        }
    }

    /// Attach short-side ladders
    pub fn with_short(mut self, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        self.short_bids = bids;
        self.short_asks = asks;
        self
    }
}

/// Game progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
}

/// Live score update for one game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub event_id: String,
    /// Market this game resolves; set by the event matcher upstream
    pub market_id: String,
    pub home_score: u32,
    pub away_score: u32,
    pub period: u32,
    /// Regulation time left in the game
    pub seconds_remaining: u32,
    pub status: GameStatus,
    /// Long outcome pays if the home team wins
    #[serde(default = "default_true")]
    pub home_is_long: bool,
    pub timestamp: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl GameState {
    /// Home score minus away score
    pub fn score_diff(&self) -> i64 {
        i64::from(self.home_score) - i64::from(self.away_score)
    }
}

/// One source's implied probabilities, bookmaker margin included
///
/// Sources that quote both sides carry `short_probability` so the margin
/// can be stripped before the quotes are combined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceQuote {
    pub source: String,
    pub long_probability: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_probability: Option<Decimal>,
}

impl SourceQuote {
    /// Quote with only the long side known
    pub fn one_sided(source: impl Into<String>, long_probability: Decimal) -> Self {
        Self {
            source: source.into(),
            long_probability,
            short_probability: None,
        }
    }

    pub fn two_sided(source: impl Into<String>, long_probability: Decimal, short_probability: Decimal) -> Self {
        Self {
            source: source.into(),
            long_probability,
            short_probability: Some(short_probability),
        }
    }

    /// Build from American moneylines on the long and short outcomes
    pub fn from_moneylines(source: impl Into<String>, long: i32, short: i32) -> Option<Self> {
        Some(Self::two_sided(
            source,
            super::odds::moneyline_to_probability(long)?,
            super::odds::moneyline_to_probability(short)?,
        ))
    }

    /// Long probability with the margin removed when both sides are quoted
    pub fn fair_long_probability(&self) -> Option<Decimal> {
        let fair = match self.short_probability {
            Some(short) if short > Decimal::ZERO => super::odds::remove_vig(self.long_probability, short)?,
            Some(_) => return None,
            None => self.long_probability,
        };
        (fair > Decimal::ZERO && fair < Decimal::ONE).then_some(fair)
    }
}

/// External odds snapshot for one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsUpdate {
    pub market_id: String,
    pub quotes: Vec<SourceQuote>,
    pub timestamp: DateTime<Utc>,
}

/// Venue-originated account event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountEvent {
    Balance {
        balance: Decimal,
    },
    OrderAccepted {
        order_id: String,
    },
    Fill {
        order_id: String,
        price: Decimal,
        quantity: Decimal,
        #[serde(default)]
        fee: Decimal,
        timestamp: DateTime<Utc>,
    },
    OrderCancelled {
        order_id: String,
    },
    OrderRejected {
        order_id: String,
        reason: String,
    },
}

/// Any inbound event, as read from a replay stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    Market(MarketTick),
    Game(GameState),
    Odds(OddsUpdate),
    Account(AccountEvent),
}
