//! Risk management module
//!
//! Every signal passes an ordered pipeline before it may reach execution:
//! circuit breaker, Kelly sizing, per-market cap, correlation cap, then
//! portfolio cap with a cash buffer. Each stage may reject or shrink.

mod circuit_breaker;
mod kelly;
mod limits;
mod types;

pub use circuit_breaker::{BreakerLimits, BreakerState, BreakerStatus, CircuitBreaker, TripReason};
pub use kelly::{KellySize, KellySizer, NoTrade};
pub use limits::{CorrelationGroup, CorrelationGroups, DrawdownMonitor};
pub use types::{RejectReason, RiskDecision};

use crate::config::{CorrelationGroupConfig, RiskConfig};
use crate::signal::Signal;
use crate::state::StateStore;
use crate::telemetry::{increment, set_gauge, CounterMetric, GaugeMetric};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Whole contracts affordable within `headroom`
fn affordable(headroom: Decimal, price: Decimal) -> Decimal {
    if headroom <= Decimal::ZERO || price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (headroom / price).floor()
}

/// Risk gate between strategies and execution
pub struct RiskManager {
    config: RiskConfig,
    state: Arc<StateStore>,
    kelly: KellySizer,
    correlation: CorrelationGroups,
    breaker: Mutex<CircuitBreaker>,
    market_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, groups: &[CorrelationGroupConfig], state: Arc<StateStore>) -> Self {
        let now = Utc::now();
        let breaker = CircuitBreaker::new(BreakerLimits::from(&config), state.equity(), now);
        Self {
            kelly: KellySizer::new(config.kelly_fraction, config.min_edge),
            correlation: CorrelationGroups::from_config(groups, &config),
            breaker: Mutex::new(breaker),
            market_locks: DashMap::new(),
            state,
            config,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Lock serializing evaluate-then-execute for one market
    pub fn market_lock(&self, market_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.market_locks
            .entry(market_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Re-check equity-based breaker conditions
    pub fn refresh(&self, now: DateTime<Utc>) -> Option<TripReason> {
        let equity = self.state.equity();
        let mut breaker = self.breaker.lock();
        let tripped = breaker.update_equity(equity, now);
        let status = breaker.status();
        drop(breaker);

        set_gauge(GaugeMetric::Equity, equity.to_f64().unwrap_or_default());
        set_gauge(GaugeMetric::DailyPnl, status.daily_pnl.to_f64().unwrap_or_default());
        set_gauge(GaugeMetric::Drawdown, status.drawdown.to_f64().unwrap_or_default());
        set_gauge(
            GaugeMetric::BreakerTripped,
            if status.state == BreakerState::Tripped { 1.0 } else { 0.0 },
        );
        tripped
    }

    /// Feed an execution outcome to the breaker
    pub fn record_execution(&self, success: bool, latency: Duration, now: DateTime<Utc>) -> Option<TripReason> {
        self.breaker.lock().record_execution(success, latency, now)
    }

    pub fn is_halted(&self) -> bool {
        self.breaker.lock().is_tripped()
    }

    pub fn breaker_status(&self) -> BreakerStatus {
        self.breaker.lock().status()
    }

    /// Halt new entries by hand
    pub fn trip_breaker(&self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.breaker.lock().trip(TripReason::Manual(reason.into()), now);
    }

    /// Explicitly re-open the breaker at current equity
    pub fn reset_breaker(&self, now: DateTime<Utc>) {
        let equity = self.state.equity();
        self.breaker.lock().reset(equity, now);
    }

    /// Run a signal through the pipeline
    ///
    /// Callers must hold [`RiskManager::market_lock`] for the signal's market
    /// until the resulting order has been submitted.
    pub fn evaluate(&self, signal: &Signal, now: DateTime<Utc>) -> RiskDecision {
        let decision = self.evaluate_inner(signal, now);
        match &decision {
            RiskDecision::Approved(_) => increment(CounterMetric::SignalsApproved),
            RiskDecision::Resized { signal: resized, requested } => {
                increment(CounterMetric::SignalsResized);
                debug!(
                    market = %signal.market_id,
                    strategy = %signal.strategy,
                    %requested,
                    quantity = %resized.quantity,
                    "Signal resized"
                );
            }
            RiskDecision::Rejected(reason) => {
                increment(CounterMetric::SignalsRejected);
                info!(
                    market = %signal.market_id,
                    strategy = %signal.strategy,
                    action = ?signal.action,
                    reason = %reason,
                    "Signal rejected by risk"
                );
            }
        }
        decision
    }

    fn evaluate_inner(&self, signal: &Signal, now: DateTime<Utc>) -> RiskDecision {
        if signal.action.is_cancel() {
            return RiskDecision::Approved(signal.clone());
        }
        if signal.quantity <= Decimal::ZERO {
            return RiskDecision::Rejected(RejectReason::InvalidSignal(format!(
                "quantity {}",
                signal.quantity
            )));
        }
        if signal.price <= Decimal::ZERO || signal.price >= Decimal::ONE {
            return RiskDecision::Rejected(RejectReason::InvalidSignal(format!(
                "price {}",
                signal.price
            )));
        }

        if signal.is_exit() {
            return self.evaluate_exit(signal);
        }

        // 1. circuit breaker
        self.refresh(now);
        if let Some(reason) = self.breaker.lock().status().reason {
            return RiskDecision::Rejected(RejectReason::CircuitBreaker(reason.to_string()));
        }

        match self.size_entry(signal) {
            Ok(quantity) if quantity < signal.quantity => RiskDecision::Resized {
                signal: signal.resized(quantity),
                requested: signal.quantity,
            },
            Ok(_) => RiskDecision::Approved(signal.clone()),
            Err(reason) => RiskDecision::Rejected(reason),
        }
    }

    /// Exits skip the breaker and Kelly and are clamped to what is held
    fn evaluate_exit(&self, signal: &Signal) -> RiskDecision {
        if !signal.action.is_sell() {
            return RiskDecision::Rejected(RejectReason::InvalidSignal(
                "reduce-only signal must sell".to_string(),
            ));
        }
        let Some(side) = signal.action.side() else {
            return RiskDecision::Rejected(RejectReason::NothingToReduce);
        };

        let held = self.state.position_quantity(&signal.market_id, side);
        let pending: Decimal = self
            .state
            .get_open_orders(Some(&signal.market_id))
            .iter()
            .filter(|o| !o.intent.is_buy() && o.intent.side() == side)
            .map(|o| o.remaining())
            .sum();
        let available = held - pending;
        if available <= Decimal::ZERO {
            return RiskDecision::Rejected(RejectReason::NothingToReduce);
        }

        if signal.quantity > available {
            RiskDecision::Resized {
                signal: signal.resized(available),
                requested: signal.quantity,
            }
        } else {
            RiskDecision::Approved(signal.clone())
        }
    }

    /// Stages 2 to 5 for an entry; returns the approved quantity
    fn size_entry(&self, signal: &Signal) -> Result<Decimal, RejectReason> {
        let price = signal.price;
        let min_trade = self.config.min_trade_size;
        let mut quantity = signal.quantity;

        // 2. kelly
        if let Some(estimate) = &signal.edge {
            let sized = self.kelly.size(
                estimate,
                price,
                signal.action.is_buy(),
                self.state.equity(),
                min_trade,
            )?;
            quantity = quantity.min(sized.quantity);
        }

        // 3. per-market cap
        let market_exposure = self.state.market_exposure(&signal.market_id);
        if !self.state.has_position(&signal.market_id)
            && self.state.position_market_count() >= self.config.max_positions
        {
            return Err(RejectReason::MaxPositions(self.config.max_positions));
        }
        quantity = quantity.min(affordable(
            self.config.max_position_per_market - market_exposure,
            price,
        ));
        if quantity * price < min_trade || quantity <= Decimal::ZERO {
            return Err(RejectReason::MarketLimit {
                exposure: market_exposure,
                limit: self.config.max_position_per_market,
            });
        }

        // 4. correlation groups
        for group in self.correlation.containing(&signal.market_id) {
            let exposure: Decimal = group
                .markets
                .iter()
                .map(|m| self.state.market_exposure(m))
                .sum();
            quantity = quantity.min(affordable(group.max_exposure - exposure, price));
            if quantity * price < min_trade || quantity <= Decimal::ZERO {
                return Err(RejectReason::CorrelationLimit {
                    group: group.name.clone(),
                    exposure,
                    limit: group.max_exposure,
                });
            }
        }

        // 5. portfolio cap and cash buffer
        let total = self.state.total_exposure();
        quantity = quantity.min(affordable(self.config.max_portfolio_exposure - total, price));
        if quantity * price < min_trade || quantity <= Decimal::ZERO {
            return Err(RejectReason::PortfolioLimit {
                exposure: total,
                limit: self.config.max_portfolio_exposure,
            });
        }

        let free_cash = self.state.get_balance() - self.state.reserved_cash();
        let spendable = free_cash * (Decimal::ONE - self.config.cash_buffer_pct);
        quantity = quantity.min(affordable(spendable, price));
        if quantity * price < min_trade || quantity <= Decimal::ZERO {
            return Err(RejectReason::InsufficientCash {
                available: spendable.max(Decimal::ZERO),
            });
        }

        Ok(quantity)
    }
}
