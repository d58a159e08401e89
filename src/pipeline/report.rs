//! Pipeline accounting

use crate::risk::{BreakerState, RiskDecision};
use crate::state::{CompletenessOpportunity, StateStore};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::ops::AddAssign;

/// What one decision cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub signals: u64,
    pub approved: u64,
    pub resized: u64,
    pub rejected: u64,
    pub orders_submitted: u64,
    pub orders_failed: u64,
    pub orders_cancelled: u64,
    pub fills: u64,
}

impl CycleOutcome {
    pub fn record_decision(&mut self, decision: &RiskDecision) {
        self.signals += 1;
        match decision {
            RiskDecision::Approved(_) => self.approved += 1,
            RiskDecision::Resized { .. } => self.resized += 1,
            RiskDecision::Rejected(_) => self.rejected += 1,
        }
    }
}

impl AddAssign for CycleOutcome {
    fn add_assign(&mut self, other: Self) {
        self.signals += other.signals;
        self.approved += other.approved;
        self.resized += other.resized;
        self.rejected += other.rejected;
        self.orders_submitted += other.orders_submitted;
        self.orders_failed += other.orders_failed;
        self.orders_cancelled += other.orders_cancelled;
        self.fills += other.fills;
    }
}

/// Event counts by source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub market: u64,
    pub game: u64,
    pub odds: u64,
    pub account: u64,
    pub invalid: u64,
}

impl EventCounts {
    pub fn total(&self) -> u64 {
        self.market + self.game + self.odds + self.account
    }
}

/// End-of-run performance and activity summary
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub events: EventCounts,
    pub activity: CycleOutcome,
    pub balance: Decimal,
    pub equity: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub fees_paid: Decimal,
    pub volume: Decimal,
    pub fill_count: u64,
    pub open_positions: usize,
    pub open_orders: usize,
    pub breaker: BreakerState,
    pub trip_reason: Option<String>,
    pub completeness: Vec<CompletenessOpportunity>,
}

impl RunSummary {
    pub fn collect(
        state: &StateStore,
        events: EventCounts,
        activity: CycleOutcome,
        breaker: BreakerState,
        trip_reason: Option<String>,
        completeness: Vec<CompletenessOpportunity>,
    ) -> Self {
        let account = state.account();
        let positions = state.all_positions();
        Self {
            events,
            activity,
            balance: account.balance,
            equity: state.equity(),
            realized_pnl: account.realized_pnl,
            unrealized_pnl: positions.iter().map(|p| p.unrealized_pnl()).sum(),
            fees_paid: account.fees_paid,
            volume: account.volume,
            fill_count: account.fill_count,
            open_positions: positions.len(),
            open_orders: state.get_open_orders(None).len(),
            breaker,
            trip_reason,
            completeness,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run Summary")?;
        writeln!(f, "===========")?;
        writeln!(
            f,
            "Events:        {} (market {}, game {}, odds {}, account {}, invalid {})",
            self.events.total(),
            self.events.market,
            self.events.game,
            self.events.odds,
            self.events.account,
            self.events.invalid
        )?;
        writeln!(
            f,
            "Signals:       {} (approved {}, resized {}, rejected {})",
            self.activity.signals, self.activity.approved, self.activity.resized, self.activity.rejected
        )?;
        writeln!(
            f,
            "Orders:        {} submitted, {} failed, {} cancelled",
            self.activity.orders_submitted, self.activity.orders_failed, self.activity.orders_cancelled
        )?;
        writeln!(f, "Fills:         {}", self.fill_count)?;
        writeln!(f, "Volume:        ${:.2}", self.volume)?;
        writeln!(f, "Fees:          ${:.4}", self.fees_paid)?;
        writeln!(f, "Realized P&L:  ${:.2}", self.realized_pnl)?;
        writeln!(f, "Unrealized:    ${:.2}", self.unrealized_pnl)?;
        writeln!(f, "Balance:       ${:.2}", self.balance)?;
        writeln!(f, "Equity:        ${:.2}", self.equity)?;
        writeln!(
            f,
            "Positions:     {} open, {} resting orders",
            self.open_positions, self.open_orders
        )?;
        match &self.trip_reason {
            Some(reason) => writeln!(f, "Breaker:       {:?} ({})", self.breaker, reason)?,
            None => writeln!(f, "Breaker:       {:?}", self.breaker)?,
        }
        for opp in &self.completeness {
            writeln!(
                f,
                "Completeness:  {} long {} + short {} margin {}",
                opp.market_id, opp.long_ask, opp.short_ask, opp.margin
            )?;
        }
        Ok(())
    }
}
