//! Exposure limits and drawdown tracking

use crate::config::{CorrelationGroupConfig, RiskConfig};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;

/// Markets whose combined exposure shares one limit
#[derive(Debug, Clone)]
pub struct CorrelationGroup {
    pub name: String,
    pub markets: HashSet<String>,
    pub max_exposure: Decimal,
}

/// All configured correlation groups
#[derive(Debug, Clone, Default)]
pub struct CorrelationGroups {
    groups: Vec<CorrelationGroup>,
}

impl CorrelationGroups {
    /// Build groups, falling back to the shared limit where a group sets none
    pub fn from_config(groups: &[CorrelationGroupConfig], risk: &RiskConfig) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|g| CorrelationGroup {
                    name: g.name.clone(),
                    markets: g.markets.iter().cloned().collect(),
                    max_exposure: g.max_exposure.unwrap_or(risk.max_correlated_exposure),
                })
                .collect(),
        }
    }

    /// Groups that contain `market_id`
    pub fn containing<'a>(&'a self, market_id: &'a str) -> impl Iterator<Item = &'a CorrelationGroup> + 'a {
        self.groups.iter().filter(move |g| g.markets.contains(market_id))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Tracks peak and start-of-day equity
#[derive(Debug, Clone)]
pub struct DrawdownMonitor {
    /// Peak equity value
    pub peak_equity: Decimal,
    /// Current equity value
    pub current_equity: Decimal,
    /// Equity at start of day
    pub daily_start_equity: Decimal,
    /// UTC day the daily figures refer to
    pub day: NaiveDate,
}

impl DrawdownMonitor {
    /// Create a new drawdown monitor
    pub fn new(initial_equity: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            peak_equity: initial_equity,
            current_equity: initial_equity,
            daily_start_equity: initial_equity,
            day: now.date_naive(),
        }
    }

    /// Update with new equity value
    ///
    /// Any change of UTC day starts a new day from the last equity seen, so
    /// replayed sessions dated before the monitor was created roll over too.
    pub fn update(&mut self, new_equity: Decimal, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.day {
            self.day = today;
            self.daily_start_equity = self.current_equity;
        }
        self.current_equity = new_equity;
        if new_equity > self.peak_equity {
            self.peak_equity = new_equity;
        }
    }

    /// Today's P&L
    pub fn daily_pnl(&self) -> Decimal {
        self.current_equity - self.daily_start_equity
    }

    /// Today's loss, zero when up on the day
    pub fn daily_loss(&self) -> Decimal {
        (-self.daily_pnl()).max(dec!(0))
    }

    /// Get current drawdown from peak
    pub fn current_drawdown(&self) -> Decimal {
        if self.peak_equity <= dec!(0) {
            return dec!(0);
        }
        (self.peak_equity - self.current_equity) / self.peak_equity
    }

    /// Restart all baselines at `equity`
    pub fn rebase(&mut self, equity: Decimal, now: DateTime<Utc>) {
        *self = Self::new(equity, now);
    }
}
