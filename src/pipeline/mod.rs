//! Decision pipeline
//!
//! One cycle per inbound event: update state, let strategies react,
//! aggregate, then risk-check and execute per market. Markets are processed
//! concurrently; each market's evaluate-then-submit runs under that market's
//! risk lock.

mod report;

pub use report::{CycleOutcome, EventCounts, RunSummary};

use crate::config::Config;
use crate::execution::{ExecutionError, Executor, FeeSchedule, OrderRequest};
use crate::feed::{AccountEvent, EventSource, FeedEvent, GameState, MarketTick, OddsUpdate};
use crate::risk::RiskManager;
use crate::signal::{MarketSignals, Signal, SignalAggregator};
use crate::state::StateStore;
use crate::strategy::StrategyEngine;
use crate::telemetry::{increment, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Terminal orders older than this are pruned
const ORDER_RETENTION_SECS: i64 = 3600;
const PRUNE_EVERY: u64 = 1000;

/// Signal-to-execution pipeline
pub struct Pipeline {
    state: Arc<StateStore>,
    risk: Arc<RiskManager>,
    executor: Arc<dyn Executor>,
    engine: StrategyEngine,
    aggregator: SignalAggregator,
    taker_fee_rate: Decimal,
    clock: Option<DateTime<Utc>>,
    events: EventCounts,
    activity: CycleOutcome,
}

impl Pipeline {
    pub fn new(config: &Config, state: Arc<StateStore>, executor: Arc<dyn Executor>) -> Self {
        let risk = Arc::new(RiskManager::new(
            config.risk.clone(),
            &config.correlation_groups,
            state.clone(),
        ));
        let engine = StrategyEngine::from_config(config, state.clone());
        let fees = FeeSchedule::from_bps(config.execution.taker_fee_bps, config.execution.maker_fee_bps);
        info!(
            executor = executor.name(),
            strategies = ?engine.strategy_ids(),
            "Pipeline ready"
        );
        Self {
            state,
            risk,
            executor,
            engine,
            aggregator: SignalAggregator::new(),
            taker_fee_rate: fees.taker_rate,
            clock: None,
            events: EventCounts::default(),
            activity: CycleOutcome::default(),
        }
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn risk(&self) -> &Arc<RiskManager> {
        &self.risk
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Latest event time seen, wall time before the first event
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    fn advance_clock(&mut self, at: DateTime<Utc>) -> DateTime<Utc> {
        let now = self.clock.map_or(at, |clock| clock.max(at));
        self.clock = Some(now);
        now
    }

    pub async fn handle_market_tick(&mut self, tick: MarketTick) -> CycleOutcome {
        let now = self.advance_clock(tick.timestamp);
        self.events.market += 1;

        let start = Instant::now();
        if let Err(e) = self.state.apply_tick(&tick) {
            // Bad data only blocks this market
            warn!(market = %tick.market_id, error = %e, "Dropping invalid tick");
            self.events.invalid += 1;
            return CycleOutcome::default();
        }
        record_latency(LatencyMetric::StateUpdate, start.elapsed());

        let mut outcome = CycleOutcome::default();
        match self.executor.on_market_update(&tick.market_id).await {
            Ok(fills) => outcome.fills += fills.len() as u64,
            Err(e) => warn!(market = %tick.market_id, error = %e, "Resting order check failed"),
        }

        if let Some(margin) = self
            .state
            .get_book(&tick.market_id)
            .and_then(|book| book.completeness_margin(self.taker_fee_rate))
            .filter(|m| *m > Decimal::ZERO)
        {
            info!(market = %tick.market_id, %margin, "Completeness arbitrage available");
        }

        self.risk.refresh(now);
        let signals = self.engine.on_market_update(&tick.market_id, now);
        outcome += self.process(signals, now).await;
        self.finish_cycle(outcome, now)
    }

    pub async fn handle_game(&mut self, game: GameState) -> CycleOutcome {
        let now = self.advance_clock(game.timestamp);
        self.events.game += 1;
        self.risk.refresh(now);
        let signals = self.engine.on_game_update(&game, now);
        let outcome = self.process(signals, now).await;
        self.finish_cycle(outcome, now)
    }

    pub async fn handle_odds(&mut self, odds: OddsUpdate) -> CycleOutcome {
        let now = self.advance_clock(odds.timestamp);
        self.events.odds += 1;
        self.risk.refresh(now);
        let signals = self.engine.on_odds_update(&odds, now);
        let outcome = self.process(signals, now).await;
        self.finish_cycle(outcome, now)
    }

    /// Apply a venue account event
    ///
    /// Fails only when local state can no longer be trusted.
    pub async fn handle_account(&mut self, event: AccountEvent) -> anyhow::Result<CycleOutcome> {
        if let AccountEvent::Fill { timestamp, .. } = &event {
            self.advance_clock(*timestamp);
        }
        let now = self.now();
        self.events.account += 1;

        let mut outcome = CycleOutcome::default();
        match self.executor.on_account_event(&event).await {
            Ok(()) => {
                if matches!(event, AccountEvent::Fill { .. }) {
                    outcome.fills += 1;
                }
            }
            Err(ExecutionError::State(e)) => return Err(e.into()),
            Err(e) => warn!(error = %e, event = ?event, "Account event not applied"),
        }
        self.risk.refresh(now);
        Ok(self.finish_cycle(outcome, now))
    }

    fn finish_cycle(&mut self, outcome: CycleOutcome, now: DateTime<Utc>) -> CycleOutcome {
        self.activity += outcome;
        if self.events.total() % PRUNE_EVERY == 0 {
            let pruned = self
                .state
                .prune_orders(now - chrono::Duration::seconds(ORDER_RETENTION_SECS));
            debug!(pruned, "Pruned terminal orders");
        }
        self.publish_gauges();
        outcome
    }

    fn publish_gauges(&self) {
        let account = self.state.account();
        set_gauge(GaugeMetric::Balance, account.balance.to_f64().unwrap_or_default());
        set_gauge(GaugeMetric::RealizedPnl, account.realized_pnl.to_f64().unwrap_or_default());
        set_gauge(
            GaugeMetric::TotalExposure,
            self.state.total_exposure().to_f64().unwrap_or_default(),
        );
        set_gauge(GaugeMetric::OpenPositions, self.state.all_positions().len() as f64);
        set_gauge(GaugeMetric::OpenOrders, self.state.get_open_orders(None).len() as f64);
    }

    /// Aggregate and run every market's batch concurrently
    async fn process(&self, signals: Vec<Signal>, now: DateTime<Utc>) -> CycleOutcome {
        if signals.is_empty() {
            return CycleOutcome::default();
        }
        let batches = self.aggregator.aggregate(signals);
        let outcomes = join_all(batches.into_iter().map(|batch| self.process_market(batch, now))).await;
        outcomes.into_iter().fold(CycleOutcome::default(), |mut acc, o| {
            acc += o;
            acc
        })
    }

    async fn process_market(&self, batch: MarketSignals, now: DateTime<Utc>) -> CycleOutcome {
        let lock = self.risk.market_lock(&batch.market_id);
        let _guard = lock.lock().await;

        // Cancels first so replaced quotes stop counting as exposure
        let (cancels, orders): (Vec<Signal>, Vec<Signal>) =
            batch.signals.into_iter().partition(|s| s.action.is_cancel());

        let mut outcome = CycleOutcome::default();
        for signal in cancels.into_iter().chain(orders) {
            let start = Instant::now();
            let decision = self.risk.evaluate(&signal, now);
            record_latency(LatencyMetric::RiskEvaluation, start.elapsed());
            outcome.record_decision(&decision);

            let Some(approved) = decision.into_signal() else {
                continue;
            };
            if approved.action.is_cancel() {
                outcome.orders_cancelled += self.cancel_strategy_orders(&approved).await;
            } else {
                self.submit(&approved, now, &mut outcome).await;
            }
        }
        outcome
    }

    async fn submit(&self, signal: &Signal, now: DateTime<Utc>, outcome: &mut CycleOutcome) {
        let Some(request) = OrderRequest::from_signal(signal) else {
            return;
        };
        let start = Instant::now();
        let result = self.executor.submit(request).await;
        let latency = start.elapsed();
        record_latency(LatencyMetric::OrderSubmission, latency);
        self.risk.record_execution(result.is_ok(), latency, now);

        match result {
            Ok(order) => {
                increment(CounterMetric::OrdersSubmitted);
                outcome.orders_submitted += 1;
                debug!(
                    order_id = %order.order_id,
                    market = %order.market_id,
                    status = %order.status,
                    strategy = %signal.strategy,
                    "Order submitted"
                );
            }
            Err(e) => {
                increment(CounterMetric::OrdersRejected);
                outcome.orders_failed += 1;
                if e.is_retryable() || matches!(e, ExecutionError::RetriesExhausted { .. }) {
                    error!(market = %signal.market_id, error = %e, "Order submission failed");
                } else {
                    warn!(market = %signal.market_id, error = %e, "Order rejected");
                }
            }
        }
    }

    /// Cancel the signalling strategy's resting orders in the market
    async fn cancel_strategy_orders(&self, signal: &Signal) -> u64 {
        let mut cancelled = 0;
        for order in self.state.get_open_orders(Some(&signal.market_id)) {
            if order.strategy != Some(signal.strategy) {
                continue;
            }
            match self.executor.cancel(&order.order_id).await {
                Ok(_) => cancelled += 1,
                Err(e) => warn!(order_id = %order.order_id, error = %e, "Cancel failed"),
            }
        }
        cancelled
    }

    /// Cancel every resting order; returns how many were cancelled
    pub async fn cancel_all_orders(&self) -> usize {
        let open = self.state.get_open_orders(None);
        let results = join_all(open.iter().map(|o| self.executor.cancel(&o.order_id))).await;
        let mut cancelled = 0;
        for (order, result) in open.iter().zip(results) {
            match result {
                Ok(_) => cancelled += 1,
                Err(e) => error!(order_id = %order.order_id, error = %e, "Order left resting at shutdown"),
            }
        }
        cancelled
    }

    pub fn summary(&self) -> RunSummary {
        let status = self.risk.breaker_status();
        RunSummary::collect(
            &self.state,
            self.events,
            self.activity,
            status.state,
            status.reason.map(|r| r.to_string()),
            self.state
                .completeness_opportunities(Decimal::ZERO, self.taker_fee_rate),
        )
    }

    /// Route one event to its handler
    pub async fn handle_event(&mut self, event: FeedEvent) -> anyhow::Result<CycleOutcome> {
        match event {
            FeedEvent::Market(tick) => Ok(self.handle_market_tick(tick).await),
            FeedEvent::Game(game) => Ok(self.handle_game(game).await),
            FeedEvent::Odds(odds) => Ok(self.handle_odds(odds).await),
            FeedEvent::Account(event) => self.handle_account(event).await,
        }
    }

    /// Consume events until the source is exhausted or `shutdown` resolves,
    /// then cancel resting orders
    pub async fn run(
        mut self,
        mut events: impl EventSource,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<RunSummary> {
        tokio::pin!(shutdown);
        let fault = loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break None;
                }
                next = events.next_event() => next,
            };
            let Some(event) = next else {
                info!("All feeds closed");
                break None;
            };
            if let Err(e) = self.handle_event(event).await {
                error!(error = %e, "Unrecoverable fault, shutting down");
                break Some(e);
            }
        };

        let cancelled = self.cancel_all_orders().await;
        info!(cancelled, "Cancelled resting orders");
        match fault {
            Some(e) => Err(e),
            None => Ok(self.summary()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::SimulatedExecutor;
    use crate::feed::{channels, FeedEvent};
    use crate::orderbook::PriceLevel;
    use crate::risk::BreakerState;
    use crate::signal::{Side, StrategyId};
    use crate::state::OrderIntent;
    use rust_decimal_macros::dec;

    fn maker_only_config() -> Config {
        let mut config = Config::default();
        config.live_arbitrage.enabled = false;
        config.statistical_edge.enabled = false;
        config
    }

    fn pipeline(config: &Config) -> Pipeline {
        let state = Arc::new(StateStore::new(dec!(1000)));
        let executor = Arc::new(SimulatedExecutor::from_config(state.clone(), &config.execution));
        Pipeline::new(config, state, executor)
    }

    fn tick(bid: Decimal, ask: Decimal, at: DateTime<Utc>) -> MarketTick {
        MarketTick::top_of_book(
            "m1",
            PriceLevel::new(bid, dec!(100)),
            PriceLevel::new(ask, dec!(100)),
            at,
        )
    }

    #[tokio::test]
    async fn test_first_tick_rests_both_quotes() {
        let mut pipeline = pipeline(&maker_only_config());
        let now = Utc::now();

        let outcome = pipeline.handle_market_tick(tick(dec!(0.48), dec!(0.52), now)).await;
        assert_eq!(outcome.signals, 2);
        assert_eq!(outcome.approved, 2);
        assert_eq!(outcome.orders_submitted, 2);
        assert_eq!(outcome.fills, 0);

        let open = pipeline.state().get_open_orders(Some("m1"));
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|o| o.strategy == Some(StrategyId::MarketMaker)));
        assert_eq!(pipeline.now(), now);
    }

    #[tokio::test]
    async fn test_requote_cancels_before_replacing() {
        let mut pipeline = pipeline(&maker_only_config());
        let now = Utc::now();
        pipeline.handle_market_tick(tick(dec!(0.48), dec!(0.52), now)).await;

        let later = now + chrono::Duration::seconds(6);
        let outcome = pipeline.handle_market_tick(tick(dec!(0.48), dec!(0.52), later)).await;
        assert_eq!(outcome.orders_cancelled, 2);
        assert_eq!(outcome.orders_submitted, 2);
        assert_eq!(pipeline.state().get_open_orders(Some("m1")).len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_all_spares_other_strategies() {
        let mut pipeline = pipeline(&maker_only_config());
        let now = Utc::now();
        pipeline.handle_market_tick(tick(dec!(0.48), dec!(0.52), now)).await;

        let mut request = OrderRequest::limit("m1", OrderIntent::BuyLong, dec!(0.40), dec!(5));
        request.strategy = Some(StrategyId::LiveArbitrage);
        let foreign = pipeline.executor().submit(request).await.unwrap();

        let later = now + chrono::Duration::seconds(6);
        let outcome = pipeline.handle_market_tick(tick(dec!(0.48), dec!(0.52), later)).await;
        assert_eq!(outcome.orders_cancelled, 2);
        let still_open = pipeline.state().get_order(&foreign.order_id).unwrap();
        assert!(still_open.status.is_open());
        assert_eq!(pipeline.state().get_open_orders(Some("m1")).len(), 3);
    }

    #[tokio::test]
    async fn test_resting_bid_fills_when_book_crosses() {
        let mut pipeline = pipeline(&maker_only_config());
        let now = Utc::now();
        pipeline.handle_market_tick(tick(dec!(0.48), dec!(0.52), now)).await;

        let later = now + chrono::Duration::seconds(1);
        let outcome = pipeline.handle_market_tick(tick(dec!(0.48), dec!(0.49), later)).await;
        assert_eq!(outcome.fills, 1);
        assert_eq!(pipeline.state().position_quantity("m1", Side::Long), dec!(20));
        assert_eq!(pipeline.state().get_balance(), dec!(990.20));
    }

    #[tokio::test]
    async fn test_invalid_tick_is_dropped() {
        let mut pipeline = pipeline(&maker_only_config());
        let outcome = pipeline
            .handle_market_tick(tick(dec!(0.48), dec!(1.20), Utc::now()))
            .await;
        assert_eq!(outcome, CycleOutcome::default());
        assert!(pipeline.state().get_market("m1").is_none());
        assert_eq!(pipeline.summary().events.invalid, 1);
    }

    #[tokio::test]
    async fn test_tripped_breaker_blocks_entries() {
        let mut pipeline = pipeline(&maker_only_config());
        let now = Utc::now();
        pipeline.risk().trip_breaker("manual halt", now);

        let outcome = pipeline.handle_market_tick(tick(dec!(0.48), dec!(0.52), now)).await;
        assert_eq!(outcome.rejected, 2);
        assert_eq!(outcome.orders_submitted, 0);

        let summary = pipeline.summary();
        assert_eq!(summary.breaker, BreakerState::Tripped);
        assert!(summary.trip_reason.is_some());
    }

    #[tokio::test]
    async fn test_clock_never_moves_backwards() {
        let mut pipeline = pipeline(&maker_only_config());
        let now = Utc::now();
        pipeline.handle_market_tick(tick(dec!(0.48), dec!(0.52), now)).await;
        pipeline
            .handle_market_tick(tick(dec!(0.48), dec!(0.52), now - chrono::Duration::seconds(30)))
            .await;
        assert_eq!(pipeline.now(), now);
    }

    #[tokio::test]
    async fn test_unknown_fill_is_logged_not_fatal() {
        let mut pipeline = pipeline(&maker_only_config());
        let event = AccountEvent::Fill {
            order_id: "missing".to_string(),
            price: dec!(0.5),
            quantity: dec!(1),
            fee: Decimal::ZERO,
            timestamp: Utc::now(),
        };
        let outcome = pipeline.handle_account(event).await.unwrap();
        assert_eq!(outcome.fills, 0);
        assert_eq!(pipeline.summary().events.account, 1);
    }

    #[tokio::test]
    async fn test_run_drains_feeds_and_cancels_resting_orders() {
        let config = maker_only_config();
        let pipeline = pipeline(&config);
        let state = pipeline.state().clone();
        let (senders, receivers) = channels(16);
        let now = Utc::now();

        senders
            .dispatch(FeedEvent::Market(tick(dec!(0.48), dec!(0.52), now)))
            .await
            .unwrap();
        senders
            .dispatch(FeedEvent::Account(AccountEvent::Balance { balance: dec!(1000) }))
            .await
            .unwrap();
        drop(senders);

        let summary = pipeline.run(receivers, std::future::pending()).await.unwrap();
        assert_eq!(summary.events.market, 1);
        assert_eq!(summary.events.account, 1);
        assert_eq!(summary.activity.orders_submitted, 2);
        assert_eq!(summary.open_orders, 0);
        assert!(state.get_open_orders(None).is_empty());
    }
}
