//! Order book state management

use super::PriceLevel;
use crate::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// L2 aggregated order book for one outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    /// Bid levels, sorted best (highest) to worst
    pub bids: Vec<PriceLevel>,
    /// Ask levels, sorted best (lowest) to worst
    pub asks: Vec<PriceLevel>,
    /// Last update timestamp
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderBook {
    /// Build a book from unsorted ladders
    pub fn from_levels(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        let mut book = Self::default();
        book.replace(bids, asks, Utc::now());
        book
    }

    /// Replace both ladders wholesale
    ///
    /// Empty levels are dropped and both sides are re-sorted best first.
    pub fn replace(&mut self, mut bids: Vec<PriceLevel>, mut asks: Vec<PriceLevel>, at: DateTime<Utc>) {
        bids.retain(|l| l.size > Decimal::ZERO);
        asks.retain(|l| l.size > Decimal::ZERO);
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        self.bids = bids;
        self.asks = asks;
        self.updated_at = Some(at);
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Get spread
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Get best bid size
    pub fn best_bid_size(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.size)
    }

    /// Get best ask size
    pub fn best_ask_size(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.size)
    }

    /// Mid weighted by the opposite side's top-of-book size
    ///
    /// A heavy bid pulls the price toward the ask and vice versa.
    pub fn depth_weighted_mid(&self) -> Option<Decimal> {
        let bid = self.bids.first()?;
        let ask = self.asks.first()?;
        let total = bid.size + ask.size;
        if total.is_zero() {
            return self.mid_price();
        }
        Some((bid.price * ask.size + ask.price * bid.size) / total)
    }

    /// Resting size at exactly `price`, both sides combined
    pub fn depth_at(&self, price: Decimal) -> Decimal {
        self.bids
            .iter()
            .chain(self.asks.iter())
            .filter(|l| l.price == price)
            .map(|l| l.size)
            .sum()
    }

    /// Whether the book has at least one level on each side
    pub fn is_two_sided(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }
}

/// Books for both outcomes of one market
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketBook {
    pub long: OrderBook,
    pub short: OrderBook,
}

impl MarketBook {
    /// Book for one side
    pub fn side(&self, side: Side) -> &OrderBook {
        match side {
            Side::Long => &self.long,
            Side::Short => &self.short,
        }
    }

    /// Profit per pair from buying both outcomes at the best asks
    ///
    /// `1 - long_ask - short_ask - fee_rate * (long_ask + short_ask)`; positive
    /// means the pair costs less than the guaranteed payout after fees.
    pub fn completeness_margin(&self, fee_rate: Decimal) -> Option<Decimal> {
        let long_ask = self.long.best_ask()?;
        let short_ask = self.short.best_ask()?;
        let cost = long_ask + short_ask;
        Some(Decimal::ONE - cost - fee_rate * cost)
    }
}
