//! Circuit breaker
//!
//! Halts new entries system-wide once a loss, drawdown, error-rate or
//! latency threshold is breached. A trip is sticky until [`CircuitBreaker::reset`].

use super::limits::DrawdownMonitor;
use crate::config::RiskConfig;
use crate::telemetry::{increment, CounterMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::{error, info};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerState {
    Open,
    Tripped,
}

/// Why the breaker tripped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TripReason {
    DailyLoss { loss: Decimal, limit: Decimal },
    Drawdown { drawdown: Decimal, limit: Decimal },
    ErrorRate { rate: Decimal, limit: Decimal },
    Latency { avg_ms: u64, limit_ms: u64 },
    Manual(String),
}

impl fmt::Display for TripReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripReason::DailyLoss { loss, limit } => {
                write!(f, "daily loss {} reached limit {}", loss, limit)
            }
            TripReason::Drawdown { drawdown, limit } => {
                write!(f, "drawdown {} exceeded limit {}", drawdown, limit)
            }
            TripReason::ErrorRate { rate, limit } => {
                write!(f, "execution error rate {} exceeded {}", rate, limit)
            }
            TripReason::Latency { avg_ms, limit_ms } => {
                write!(f, "average execution latency {}ms exceeded {}ms", avg_ms, limit_ms)
            }
            TripReason::Manual(reason) => write!(f, "manual: {}", reason),
        }
    }
}

/// Thresholds the breaker enforces
#[derive(Debug, Clone)]
pub struct BreakerLimits {
    pub max_daily_loss: Decimal,
    pub max_drawdown_pct: Decimal,
    pub max_error_rate: Decimal,
    pub error_window: usize,
    pub min_samples: usize,
    pub max_avg_latency_ms: u64,
    pub latency_window: usize,
}

impl From<&RiskConfig> for BreakerLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            max_daily_loss: config.max_daily_loss,
            max_drawdown_pct: config.max_drawdown_pct,
            max_error_rate: config.max_error_rate,
            error_window: config.error_window.max(1),
            min_samples: config.min_error_samples.max(1),
            max_avg_latency_ms: config.max_avg_latency_ms,
            latency_window: config.latency_window.max(1),
        }
    }
}

/// Read-only view of the breaker
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub state: BreakerState,
    pub reason: Option<TripReason>,
    pub tripped_at: Option<DateTime<Utc>>,
    pub daily_pnl: Decimal,
    pub drawdown: Decimal,
    pub peak_equity: Decimal,
}

/// Sticky trading halt
#[derive(Debug)]
pub struct CircuitBreaker {
    limits: BreakerLimits,
    monitor: DrawdownMonitor,
    state: BreakerState,
    reason: Option<TripReason>,
    tripped_at: Option<DateTime<Utc>>,
    outcomes: VecDeque<bool>,
    latencies_ms: VecDeque<u64>,
}

impl CircuitBreaker {
    pub fn new(limits: BreakerLimits, equity: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            monitor: DrawdownMonitor::new(equity, now),
            state: BreakerState::Open,
            reason: None,
            tripped_at: None,
            outcomes: VecDeque::new(),
            latencies_ms: VecDeque::new(),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_tripped(&self) -> bool {
        self.state == BreakerState::Tripped
    }

    pub fn status(&self) -> BreakerStatus {
        BreakerStatus {
            state: self.state,
            reason: self.reason.clone(),
            tripped_at: self.tripped_at,
            daily_pnl: self.monitor.daily_pnl(),
            drawdown: self.monitor.current_drawdown(),
            peak_equity: self.monitor.peak_equity,
        }
    }

    /// Feed the latest equity; returns the reason if this call tripped
    pub fn update_equity(&mut self, equity: Decimal, now: DateTime<Utc>) -> Option<TripReason> {
        self.monitor.update(equity, now);
        if self.is_tripped() {
            return None;
        }

        let loss = self.monitor.daily_loss();
        if self.limits.max_daily_loss > Decimal::ZERO && loss >= self.limits.max_daily_loss {
            return self.trip(
                TripReason::DailyLoss {
                    loss,
                    limit: self.limits.max_daily_loss,
                },
                now,
            );
        }

        let drawdown = self.monitor.current_drawdown();
        if drawdown > self.limits.max_drawdown_pct {
            return self.trip(
                TripReason::Drawdown {
                    drawdown,
                    limit: self.limits.max_drawdown_pct,
                },
                now,
            );
        }

        None
    }

    /// Record one execution outcome; returns the reason if this call tripped
    pub fn record_execution(
        &mut self,
        success: bool,
        latency: Duration,
        now: DateTime<Utc>,
    ) -> Option<TripReason> {
        self.outcomes.push_back(success);
        while self.outcomes.len() > self.limits.error_window {
            self.outcomes.pop_front();
        }
        self.latencies_ms.push_back(latency.as_millis() as u64);
        while self.latencies_ms.len() > self.limits.latency_window {
            self.latencies_ms.pop_front();
        }

        if self.is_tripped() {
            return None;
        }

        if self.outcomes.len() >= self.limits.min_samples {
            let failures = self.outcomes.iter().filter(|ok| !**ok).count();
            let rate = Decimal::from(failures) / Decimal::from(self.outcomes.len());
            if rate > self.limits.max_error_rate {
                return self.trip(
                    TripReason::ErrorRate {
                        rate,
                        limit: self.limits.max_error_rate,
                    },
                    now,
                );
            }
        }

        if self.latencies_ms.len() >= self.limits.min_samples {
            let avg_ms = self.latencies_ms.iter().sum::<u64>() / self.latencies_ms.len() as u64;
            if avg_ms > self.limits.max_avg_latency_ms {
                return self.trip(
                    TripReason::Latency {
                        avg_ms,
                        limit_ms: self.limits.max_avg_latency_ms,
                    },
                    now,
                );
            }
        }

        None
    }

    /// Trip the breaker; the first reason is kept while tripped
    pub fn trip(&mut self, reason: TripReason, now: DateTime<Utc>) -> Option<TripReason> {
        if self.is_tripped() {
            return None;
        }
        self.state = BreakerState::Tripped;
        self.reason = Some(reason.clone());
        self.tripped_at = Some(now);
        increment(CounterMetric::BreakerTrips);
        error!(critical = true, reason = %reason, "Circuit breaker tripped, new entries halted");
        Some(reason)
    }

    /// Re-open and restart every baseline at `equity`
    pub fn reset(&mut self, equity: Decimal, now: DateTime<Utc>) {
        let previous = self.reason.take();
        self.state = BreakerState::Open;
        self.tripped_at = None;
        self.outcomes.clear();
        self.latencies_ms.clear();
        self.monitor.rebase(equity, now);
        info!(
            previous = previous.map(|r| r.to_string()).unwrap_or_default(),
            %equity,
            "Circuit breaker reset"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerLimits::from(&RiskConfig::default()), dec!(1000), Utc::now())
    }

    #[test]
    fn test_daily_loss_boundary_is_inclusive() {
        let mut cb = breaker();
        let now = Utc::now();
        assert!(cb.update_equity(dec!(975.01), now).is_none());
        assert_eq!(cb.state(), BreakerState::Open);

        let reason = cb.update_equity(dec!(975), now).unwrap();
        assert_eq!(
            reason,
            TripReason::DailyLoss {
                loss: dec!(25),
                limit: dec!(25)
            }
        );
        assert!(cb.is_tripped());
        assert_eq!(cb.status().tripped_at, Some(now));
    }

    #[test]
    fn test_trip_is_sticky_until_reset() {
        let mut cb = breaker();
        let now = Utc::now();
        cb.update_equity(dec!(970), now);
        assert!(cb.is_tripped());

        // Recovery alone does not re-open
        assert!(cb.update_equity(dec!(1200), now).is_none());
        assert!(cb.is_tripped());
        assert!(matches!(cb.status().reason, Some(TripReason::DailyLoss { .. })));

        cb.reset(dec!(1200), now);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.status().reason.is_none());
        assert_eq!(cb.status().peak_equity, dec!(1200));
    }

    #[test]
    fn test_drawdown_trip() {
        let limits = BreakerLimits {
            max_daily_loss: dec!(0),
            ..BreakerLimits::from(&RiskConfig::default())
        };
        let now = Utc::now();
        let mut cb = CircuitBreaker::new(limits, dec!(1000), now);
        cb.update_equity(dec!(1200), now);
        assert!(cb.update_equity(dec!(1020), now).is_none()); // exactly 15%
        let reason = cb.update_equity(dec!(1019), now).unwrap();
        assert!(matches!(reason, TripReason::Drawdown { .. }));
    }

    #[test]
    fn test_error_rate_trip_needs_samples() {
        let mut cb = breaker();
        let now = Utc::now();
        for _ in 0..4 {
            assert!(cb.record_execution(false, Duration::from_millis(10), now).is_none());
        }
        let reason = cb.record_execution(false, Duration::from_millis(10), now).unwrap();
        assert!(matches!(reason, TripReason::ErrorRate { .. }));
    }

    #[test]
    fn test_error_rate_at_threshold_does_not_trip() {
        let mut cb = breaker();
        let now = Utc::now();
        for i in 0..10 {
            assert!(cb
                .record_execution(i % 2 == 0, Duration::from_millis(10), now)
                .is_none());
        }
        assert!(!cb.is_tripped());
    }

    #[test]
    fn test_latency_trip() {
        let mut cb = breaker();
        let now = Utc::now();
        let mut tripped = None;
        for _ in 0..5 {
            tripped = cb.record_execution(true, Duration::from_millis(6000), now);
        }
        assert_eq!(
            tripped,
            Some(TripReason::Latency {
                avg_ms: 6000,
                limit_ms: 5000
            })
        );
    }

    #[test]
    fn test_manual_trip_keeps_first_reason() {
        let mut cb = breaker();
        let now = Utc::now();
        assert!(cb.trip(TripReason::Manual("operator".to_string()), now).is_some());
        assert!(cb.trip(TripReason::Manual("again".to_string()), now).is_none());
        assert_eq!(
            cb.status().reason,
            Some(TripReason::Manual("operator".to_string()))
        );
    }
}
