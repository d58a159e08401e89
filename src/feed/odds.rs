//! Bookmaker odds conversion

use rust_decimal::Decimal;

/// Implied probability of an American moneyline, vig included
pub fn moneyline_to_probability(moneyline: i32) -> Option<Decimal> {
    if moneyline == 0 {
        return None;
    }
    let ml = Decimal::from(moneyline);
    let hundred = Decimal::ONE_HUNDRED;
    if moneyline < 0 {
        Some(-ml / (-ml + hundred))
    } else {
        Some(hundred / (ml + hundred))
    }
}

/// Implied probability of decimal odds, vig included
pub fn decimal_odds_to_probability(odds: Decimal) -> Option<Decimal> {
    if odds <= Decimal::ONE {
        return None;
    }
    Some(Decimal::ONE / odds)
}

/// Normalize a pair of implied probabilities so they sum to one
///
/// Returns the fair probability of the first outcome.
pub fn remove_vig(first: Decimal, second: Decimal) -> Option<Decimal> {
    let total = first + second;
    if total <= Decimal::ZERO {
        return None;
    }
    Some(first / total)
}

/// Fair home-win probability from a two-way moneyline
pub fn fair_probability_from_moneylines(home: i32, away: i32) -> Option<Decimal> {
    remove_vig(moneyline_to_probability(home)?, moneyline_to_probability(away)?)
}
