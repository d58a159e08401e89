//! Normal-approximation score model
//!
//! The remaining score swing is treated as normal with standard deviation
//! proportional to sqrt(minutes remaining):
//! P(home wins) = N(diff / (sigma * sqrt(t))) + home_advantage

use super::WinProbabilityModel;
use crate::feed::{GameState, GameStatus};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MIN_PROB: Decimal = dec!(0.01);
const MAX_PROB: Decimal = dec!(0.99);

/// Score-differential model for live games
#[derive(Debug, Clone)]
pub struct ScoreModel {
    /// Points of swing per sqrt(minute) remaining
    pub std_per_sqrt_minute: f64,
    /// Additive bump to the home side's probability
    pub home_advantage: Decimal,
}

impl ScoreModel {
    pub fn new(std_per_sqrt_minute: f64, home_advantage: Decimal) -> Self {
        Self {
            std_per_sqrt_minute,
            home_advantage,
        }
    }

    /// Home win probability, clamped to [0.01, 0.99]
    pub fn home_probability(&self, game: &GameState) -> Decimal {
        let diff = game.score_diff();
        let minutes = f64::from(game.seconds_remaining) / 60.0;

        if game.status == GameStatus::Final || minutes <= 0.0 || self.std_per_sqrt_minute <= 0.0 {
            // Clock expired: the leader wins
            return match diff.signum() {
                1 => MAX_PROB,
                -1 => MIN_PROB,
                _ => dec!(0.5),
            };
        }

        let z = diff as f64 / (self.std_per_sqrt_minute * minutes.sqrt());
        // Six decimal places is finer than any venue tick
        let micros = (normal_cdf(z).clamp(0.0, 1.0) * 1_000_000.0).round() as i64;
        let prob = Decimal::new(micros, 6) + self.home_advantage;
        prob.max(MIN_PROB).min(MAX_PROB)
    }
}

impl Default for ScoreModel {
    fn default() -> Self {
        Self::new(1.9, dec!(0.02))
    }
}

impl WinProbabilityModel for ScoreModel {
    fn long_probability(&self, game: &GameState) -> Decimal {
        let home = self.home_probability(game);
        if game.home_is_long {
            home
        } else {
            Decimal::ONE - home
        }
    }
}

/// Standard normal CDF approximation (Abramowitz and Stegun)
pub fn normal_cdf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs() / std::f64::consts::SQRT_2;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    0.5 * (1.0 + sign * y)
}
