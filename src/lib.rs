//! poly-engine: signal-to-execution trading engine for binary-outcome
//! prediction markets
//!
//! This library provides the core components for:
//! - A concurrent store of markets, positions, orders and account balance
//! - Order books per outcome with mid, spread and completeness checks
//! - Market-making, live-arbitrage and statistical-edge strategies
//! - A risk gate with fractional Kelly sizing, exposure caps and a circuit breaker
//! - Simulated and live execution with retries and fee accounting
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod execution;
pub mod feed;
pub mod model;
pub mod orderbook;
pub mod pipeline;
pub mod risk;
pub mod signal;
pub mod state;
pub mod strategy;
pub mod telemetry;
