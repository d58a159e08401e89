//! Configuration types for poly-engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub market_maker: MarketMakerConfig,
    #[serde(default)]
    pub live_arbitrage: LiveArbitrageConfig,
    #[serde(default)]
    pub statistical_edge: StatisticalEdgeConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub correlation_groups: Vec<CorrelationGroupConfig>,
}

/// State store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    /// Markets older than this get no new entries
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,
    /// Capacity of each feed channel
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_staleness_secs() -> u64 {
    30
}
fn default_channel_buffer() -> usize {
    1024
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            staleness_secs: default_staleness_secs(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

/// Risk limits, all monetary values in account currency
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    /// Fractional Kelly multiplier
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: Decimal,
    /// Minimum edge to trade
    #[serde(default = "default_risk_min_edge")]
    pub min_edge: Decimal,
    #[serde(default = "default_max_position_per_market")]
    pub max_position_per_market: Decimal,
    #[serde(default = "default_max_portfolio_exposure")]
    pub max_portfolio_exposure: Decimal,
    #[serde(default = "default_max_correlated_exposure")]
    pub max_correlated_exposure: Decimal,
    /// Markets with open positions
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,
    /// Fraction of peak equity
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    #[serde(default = "default_min_trade_size")]
    pub min_trade_size: Decimal,
    /// Fraction of free cash never committed
    #[serde(default = "default_cash_buffer_pct")]
    pub cash_buffer_pct: Decimal,
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: Decimal,
    #[serde(default = "default_window")]
    pub error_window: usize,
    /// Executions needed before the error rate is judged
    #[serde(default = "default_min_error_samples")]
    pub min_error_samples: usize,
    #[serde(default = "default_max_avg_latency_ms")]
    pub max_avg_latency_ms: u64,
    #[serde(default = "default_window")]
    pub latency_window: usize,
}

fn default_kelly_fraction() -> Decimal {
    Decimal::new(25, 2) // 0.25
}
fn default_risk_min_edge() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_max_position_per_market() -> Decimal {
    Decimal::new(50, 0)
}
fn default_max_portfolio_exposure() -> Decimal {
    Decimal::new(250, 0)
}
fn default_max_correlated_exposure() -> Decimal {
    Decimal::new(125, 0)
}
fn default_max_positions() -> usize {
    10
}
fn default_max_daily_loss() -> Decimal {
    Decimal::new(25, 0)
}
fn default_max_drawdown_pct() -> Decimal {
    Decimal::new(15, 2) // 0.15
}
fn default_min_trade_size() -> Decimal {
    Decimal::ONE
}
fn default_cash_buffer_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_max_error_rate() -> Decimal {
    Decimal::new(5, 1) // 0.5
}
fn default_window() -> usize {
    20
}
fn default_min_error_samples() -> usize {
    5
}
fn default_max_avg_latency_ms() -> u64 {
    5000
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            kelly_fraction: default_kelly_fraction(),
            min_edge: default_risk_min_edge(),
            max_position_per_market: default_max_position_per_market(),
            max_portfolio_exposure: default_max_portfolio_exposure(),
            max_correlated_exposure: default_max_correlated_exposure(),
            max_positions: default_max_positions(),
            max_daily_loss: default_max_daily_loss(),
            max_drawdown_pct: default_max_drawdown_pct(),
            min_trade_size: default_min_trade_size(),
            cash_buffer_pct: default_cash_buffer_pct(),
            max_error_rate: default_max_error_rate(),
            error_window: default_window(),
            min_error_samples: default_min_error_samples(),
            max_avg_latency_ms: default_max_avg_latency_ms(),
            latency_window: default_window(),
        }
    }
}

/// Market maker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketMakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Quoted width, bid to ask
    #[serde(default = "default_mm_spread")]
    pub spread: Decimal,
    /// Notional per quote
    #[serde(default = "default_order_size")]
    pub order_size: Decimal,
    /// Contracts held on one side before quoting stops
    #[serde(default = "default_max_inventory")]
    pub max_inventory: Decimal,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Mid move that forces a requote
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: Decimal,
    /// Share of half-spread to lean quotes per unit of inventory ratio
    #[serde(default = "default_skew_factor")]
    pub inventory_skew_factor: Decimal,
    /// Never quote through the touch
    #[serde(default = "default_true")]
    pub maker_only: bool,
    #[serde(default = "default_mm_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
}

fn default_true() -> bool {
    true
}
fn default_mm_spread() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_order_size() -> Decimal {
    Decimal::new(10, 0)
}
fn default_max_inventory() -> Decimal {
    Decimal::new(50, 0)
}
fn default_refresh_interval_secs() -> u64 {
    5
}
fn default_drift_threshold() -> Decimal {
    Decimal::new(5, 3) // 0.005
}
fn default_skew_factor() -> Decimal {
    Decimal::new(5, 1) // 0.5
}
fn default_mm_stop_loss_pct() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spread: default_mm_spread(),
            order_size: default_order_size(),
            max_inventory: default_max_inventory(),
            refresh_interval_secs: default_refresh_interval_secs(),
            drift_threshold: default_drift_threshold(),
            inventory_skew_factor: default_skew_factor(),
            maker_only: true,
            stop_loss_pct: default_mm_stop_loss_pct(),
        }
    }
}

/// Live arbitrage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LiveArbitrageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_arb_min_edge")]
    pub min_edge: Decimal,
    /// Notional per entry
    #[serde(default = "default_order_size")]
    pub order_size: Decimal,
    /// Score swing standard deviation per sqrt(minute) remaining
    #[serde(default = "default_score_std")]
    pub score_std_per_sqrt_minute: f64,
    #[serde(default = "default_home_advantage")]
    pub home_advantage: Decimal,
    /// Confidence gained per unit of edge, capped at 1
    #[serde(default = "default_confidence_per_edge")]
    pub confidence_per_edge: Decimal,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
    #[serde(default = "default_arb_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    #[serde(default = "default_arb_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_arb_min_edge() -> Decimal {
    Decimal::new(3, 2) // 0.03
}
fn default_score_std() -> f64 {
    1.9
}
fn default_home_advantage() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_confidence_per_edge() -> Decimal {
    Decimal::new(10, 0)
}
fn default_take_profit_pct() -> Decimal {
    Decimal::new(10, 2) // 0.10
}
fn default_arb_stop_loss_pct() -> Decimal {
    Decimal::new(5, 2) // 0.05
}
fn default_arb_cooldown_secs() -> u64 {
    5
}

impl Default for LiveArbitrageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_edge: default_arb_min_edge(),
            order_size: default_order_size(),
            score_std_per_sqrt_minute: default_score_std(),
            home_advantage: default_home_advantage(),
            confidence_per_edge: default_confidence_per_edge(),
            take_profit_pct: default_take_profit_pct(),
            stop_loss_pct: default_arb_stop_loss_pct(),
            cooldown_secs: default_arb_cooldown_secs(),
        }
    }
}

/// Statistical edge configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatisticalEdgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_risk_min_edge")]
    pub min_edge: Decimal,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    /// Weighted std dev at which confidence reaches zero
    #[serde(default = "default_max_dispersion")]
    pub max_dispersion: Decimal,
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,
    /// Notional per entry
    #[serde(default = "default_order_size")]
    pub order_size: Decimal,
    #[serde(default = "default_stat_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Reliability weight per source, sharper books higher
    #[serde(default = "default_source_weights")]
    pub source_weights: HashMap<String, Decimal>,
    /// Weight for sources not listed
    #[serde(default = "default_source_weight")]
    pub default_weight: Decimal,
}

fn default_min_confidence() -> Decimal {
    Decimal::new(6, 1) // 0.6
}
fn default_max_dispersion() -> Decimal {
    Decimal::new(10, 2) // 0.10
}
fn default_min_sources() -> usize {
    2
}
fn default_stat_cooldown_secs() -> u64 {
    10
}
fn default_source_weights() -> HashMap<String, Decimal> {
    [
        ("pinnacle", Decimal::ONE),
        ("circa", Decimal::new(9, 1)),
        ("betfair", Decimal::new(9, 1)),
        ("draftkings", Decimal::new(6, 1)),
        ("fanduel", Decimal::new(6, 1)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
fn default_source_weight() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

impl Default for StatisticalEdgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_edge: default_risk_min_edge(),
            min_confidence: default_min_confidence(),
            max_dispersion: default_max_dispersion(),
            min_sources: default_min_sources(),
            order_size: default_order_size(),
            cooldown_secs: default_stat_cooldown_secs(),
            source_weights: default_source_weights(),
            default_weight: default_source_weight(),
        }
    }
}

/// Execution configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default = "default_taker_fee_bps")]
    pub taker_fee_bps: Decimal,
    #[serde(default)]
    pub maker_fee_bps: Decimal,
    #[serde(default)]
    pub slippage: SlippageConfig,
    /// Per-attempt venue timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Starting cash for paper trading
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    /// Base URL of the live venue's REST API
    #[serde(default)]
    pub venue_url: Option<String>,
}

/// Execution mode: paper trading or live
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Paper,
    Live,
}

/// Simulated slippage
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SlippageConfig {
    /// Constant basis points
    Fixed { bps: Decimal },
    /// Base plus extra bps per 100 contracts
    SizeDependent { base_bps: Decimal, bps_per_100: Decimal },
}

impl Default for SlippageConfig {
    fn default() -> Self {
        SlippageConfig::Fixed {
            bps: Decimal::new(5, 0),
        }
    }
}

fn default_taker_fee_bps() -> Decimal {
    Decimal::new(10, 0)
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_max_backoff_ms() -> u64 {
    5000
}
fn default_initial_balance() -> Decimal {
    Decimal::new(1000, 0)
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Paper,
            taker_fee_bps: default_taker_fee_bps(),
            maker_fee_bps: Decimal::ZERO,
            slippage: SlippageConfig::default(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            initial_balance: default_initial_balance(),
            venue_url: None,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Prometheus exporter port, 0 disables it
    #[serde(default)]
    pub metrics_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: 0,
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Named set of markets sharing one exposure limit
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorrelationGroupConfig {
    pub name: String,
    pub markets: Vec<String>,
    /// Overrides `risk.max_correlated_exposure` for this group
    #[serde(default)]
    pub max_exposure: Option<Decimal>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
