//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Tick applied to the state store
    StateUpdate,
    /// Strategy evaluation for one event
    SignalGeneration,
    /// Risk evaluation of one signal
    RiskEvaluation,
    /// Order submission round trip
    OrderSubmission,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current equity
    Equity,
    /// Cash balance
    Balance,
    /// Realized P&L
    RealizedPnl,
    /// Open position count
    OpenPositions,
    /// Resting order count
    OpenOrders,
    /// Total exposure
    TotalExposure,
    /// Current drawdown fraction
    Drawdown,
    /// Daily P&L
    DailyPnl,
    /// 1 while the circuit breaker is tripped
    BreakerTripped,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    SignalsGenerated,
    SignalsApproved,
    SignalsResized,
    SignalsRejected,
    OrdersSubmitted,
    OrdersRejected,
    OrderRetries,
    Fills,
    BreakerTrips,
    StaleSignalsDropped,
}

/// Start the Prometheus scrape endpoint on `port`
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::StateUpdate => "polyengine_state_update_latency_ms",
        LatencyMetric::SignalGeneration => "polyengine_signal_generation_latency_ms",
        LatencyMetric::RiskEvaluation => "polyengine_risk_evaluation_latency_ms",
        LatencyMetric::OrderSubmission => "polyengine_order_submission_latency_ms",
    };

    metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::Equity => "polyengine_equity_usd",
        GaugeMetric::Balance => "polyengine_balance_usd",
        GaugeMetric::RealizedPnl => "polyengine_realized_pnl_usd",
        GaugeMetric::OpenPositions => "polyengine_open_positions",
        GaugeMetric::OpenOrders => "polyengine_open_orders",
        GaugeMetric::TotalExposure => "polyengine_total_exposure_usd",
        GaugeMetric::Drawdown => "polyengine_drawdown_ratio",
        GaugeMetric::DailyPnl => "polyengine_daily_pnl_usd",
        GaugeMetric::BreakerTripped => "polyengine_circuit_breaker_tripped",
    };

    metrics::gauge!(metric_name).set(value);
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    let metric_name = match metric {
        CounterMetric::SignalsGenerated => "polyengine_signals_generated_total",
        CounterMetric::SignalsApproved => "polyengine_signals_approved_total",
        CounterMetric::SignalsResized => "polyengine_signals_resized_total",
        CounterMetric::SignalsRejected => "polyengine_signals_rejected_total",
        CounterMetric::OrdersSubmitted => "polyengine_orders_submitted_total",
        CounterMetric::OrdersRejected => "polyengine_orders_rejected_total",
        CounterMetric::OrderRetries => "polyengine_order_retries_total",
        CounterMetric::Fills => "polyengine_fills_total",
        CounterMetric::BreakerTrips => "polyengine_circuit_breaker_trips_total",
        CounterMetric::StaleSignalsDropped => "polyengine_stale_signals_dropped_total",
    };

    metrics::counter!(metric_name).increment(1);
}
