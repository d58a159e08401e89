//! Win probability model module
//!
//! Converts live game state into a fair probability for a market's long side

mod win_probability;

pub use win_probability::{normal_cdf, ScoreModel};

use crate::feed::GameState;
use rust_decimal::Decimal;

/// Trait for in-game probability models
pub trait WinProbabilityModel: Send + Sync {
    /// Fair probability that the market's long side resolves to 1
    fn long_probability(&self, game: &GameState) -> Decimal;
}
