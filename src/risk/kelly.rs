//! Kelly criterion position sizing

use crate::signal::EdgeEstimate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

/// Why Kelly sizing declined to trade
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoTrade {
    #[error("price {0} outside (0, 1)")]
    InvalidPrice(Decimal),
    #[error("probability {0} outside [0, 1]")]
    InvalidProbability(Decimal),
    #[error("no edge: win probability {probability} vs cost {cost}")]
    NoEdge { probability: Decimal, cost: Decimal },
    #[error("edge {edge} below minimum {min}")]
    EdgeBelowMinimum { edge: Decimal, min: Decimal },
    #[error("non-positive bankroll {0}")]
    NoBankroll(Decimal),
    #[error("sized notional {notional} below minimum trade size {min}")]
    BelowMinTradeSize { notional: Decimal, min: Decimal },
}

/// Result of sizing a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KellySize {
    /// Win probability minus cost per contract
    pub edge: Decimal,
    /// Full Kelly fraction of bankroll
    pub full_fraction: Decimal,
    /// After the fractional multiplier and confidence
    pub fraction: Decimal,
    /// Capital to commit
    pub notional: Decimal,
    /// Whole contracts
    pub quantity: Decimal,
}

/// Kelly criterion calculator for binary outcomes
#[derive(Debug, Clone)]
pub struct KellySizer {
    /// Kelly fraction (e.g., 0.25 for quarter Kelly)
    pub fraction: Decimal,
    /// Minimum edge to trade
    pub min_edge: Decimal,
}

/// Win probability and cost per contract for the position a trade opens
///
/// Selling a contract at `price` is buying its complement at `1 - price`.
fn win_and_cost(probability: Decimal, price: Decimal, buy: bool) -> (Decimal, Decimal) {
    if buy {
        (probability, price)
    } else {
        (Decimal::ONE - probability, Decimal::ONE - price)
    }
}

impl KellySizer {
    /// Create a new Kelly sizer
    pub fn new(fraction: Decimal, min_edge: Decimal) -> Self {
        Self { fraction, min_edge }
    }

    /// Full Kelly fraction for a binary contract paying 1
    ///
    /// - Odds: b = (1 - cost) / cost
    /// - f* = (p*b - q) / b, which reduces to (p - cost) / (1 - cost)
    ///
    /// `probability` is the chance the traded side resolves to 1.
    pub fn full_fraction(probability: Decimal, price: Decimal, buy: bool) -> Result<Decimal, NoTrade> {
        if price <= Decimal::ZERO || price >= Decimal::ONE {
            return Err(NoTrade::InvalidPrice(price));
        }
        if probability < Decimal::ZERO || probability > Decimal::ONE {
            return Err(NoTrade::InvalidProbability(probability));
        }

        let (p, cost) = win_and_cost(probability, price, buy);
        if p <= cost {
            return Err(NoTrade::NoEdge { probability: p, cost });
        }

        let b = (Decimal::ONE - cost) / cost;
        let q = Decimal::ONE - p;
        let f = (p * b - q) / b;
        if f <= Decimal::ZERO {
            return Err(NoTrade::NoEdge { probability: p, cost });
        }
        Ok(f)
    }

    /// Fraction of bankroll after the fractional multiplier and confidence
    pub fn fraction(&self, estimate: &EdgeEstimate, price: Decimal, buy: bool) -> Result<Decimal, NoTrade> {
        let full = Self::full_fraction(estimate.probability, price, buy)?;
        Ok(full * self.fraction * estimate.confidence)
    }

    /// Size a trade against `bankroll`
    pub fn size(
        &self,
        estimate: &EdgeEstimate,
        price: Decimal,
        buy: bool,
        bankroll: Decimal,
        min_trade_size: Decimal,
    ) -> Result<KellySize, NoTrade> {
        let full_fraction = Self::full_fraction(estimate.probability, price, buy)?;
        let (p, cost) = win_and_cost(estimate.probability, price, buy);

        let edge = p - cost;
        if edge < self.min_edge {
            return Err(NoTrade::EdgeBelowMinimum {
                edge,
                min: self.min_edge,
            });
        }
        if bankroll <= Decimal::ZERO {
            return Err(NoTrade::NoBankroll(bankroll));
        }

        let fraction = full_fraction * self.fraction * estimate.confidence;
        let quantity = (fraction * bankroll / cost).floor();
        let notional = quantity * cost;
        if notional < min_trade_size || quantity <= Decimal::ZERO {
            return Err(NoTrade::BelowMinTradeSize {
                notional,
                min: min_trade_size,
            });
        }

        Ok(KellySize {
            edge,
            full_fraction,
            fraction,
            notional,
            quantity,
        })
    }
}

impl Default for KellySizer {
    fn default() -> Self {
        Self::new(dec!(0.25), dec!(0.02))
    }
}
