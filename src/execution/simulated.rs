//! Simulated execution against the recorded order book

use super::{ExecutionError, Executor, Fill, Ledger, Liquidity, OrderRequest, TimeInForce};
use crate::config::{ExecutionConfig, SlippageConfig};
use crate::orderbook::MarketBook;
use crate::state::{OrderIntent, OrderKind, OrderState, OrderStatus, OrderUpdate, StateStore};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Maker and taker fee rates as fractions of notional
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub taker_rate: Decimal,
    pub maker_rate: Decimal,
}

impl FeeSchedule {
    pub fn from_bps(taker_bps: Decimal, maker_bps: Decimal) -> Self {
        Self {
            taker_rate: taker_bps / BPS,
            maker_rate: maker_bps / BPS,
        }
    }

    pub fn rate(&self, liquidity: Liquidity) -> Decimal {
        match liquidity {
            Liquidity::Maker => self.maker_rate,
            Liquidity::Taker => self.taker_rate,
        }
    }
}

/// Price impact applied to taker fills
#[derive(Debug, Clone, PartialEq)]
pub struct SlippageModel(SlippageConfig);

impl SlippageModel {
    pub fn new(config: SlippageConfig) -> Self {
        Self(config)
    }

    /// Slippage in basis points for an order of `quantity` contracts
    pub fn bps(&self, quantity: Decimal) -> Decimal {
        match &self.0 {
            SlippageConfig::Fixed { bps } => *bps,
            SlippageConfig::SizeDependent { base_bps, bps_per_100 } => {
                *base_bps + *bps_per_100 * quantity / Decimal::ONE_HUNDRED
            }
        }
    }

    /// Touched price moved against the taker
    pub fn apply(&self, price: Decimal, is_buy: bool, quantity: Decimal) -> Decimal {
        let shift = price * self.bps(quantity) / BPS;
        if is_buy {
            price + shift
        } else {
            (price - shift).max(Decimal::ZERO)
        }
    }
}

/// Paper-trading backend
///
/// Marketable orders fill immediately at the touch plus slippage. Others rest
/// and fill as maker at their limit once the book crosses them, checked on
/// every market update.
pub struct SimulatedExecutor {
    ledger: Ledger,
    fees: FeeSchedule,
    slippage: SlippageModel,
}

impl SimulatedExecutor {
    pub fn new(state: Arc<StateStore>, fees: FeeSchedule, slippage: SlippageModel) -> Self {
        Self {
            ledger: Ledger::new(state),
            fees,
            slippage,
        }
    }

    pub fn from_config(state: Arc<StateStore>, config: &ExecutionConfig) -> Self {
        Self::new(
            state,
            FeeSchedule::from_bps(config.taker_fee_bps, config.maker_fee_bps),
            SlippageModel::new(config.slippage.clone()),
        )
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn state(&self) -> &StateStore {
        self.ledger.state()
    }

    /// Price a taker would hit: the ask for buys, the bid for sells
    fn touch(book: &MarketBook, intent: OrderIntent) -> Option<Decimal> {
        let side = book.side(intent.side());
        if intent.is_buy() {
            side.best_ask()
        } else {
            side.best_bid()
        }
    }

    fn crosses(intent: OrderIntent, limit: Decimal, touch: Decimal) -> bool {
        if intent.is_buy() {
            touch <= limit
        } else {
            touch >= limit
        }
    }

    fn reject(&self, order_id: &str, err: ExecutionError) -> ExecutionError {
        if let Err(e) = self
            .state()
            .update_order(order_id, OrderUpdate::status(OrderStatus::Rejected))
        {
            warn!(order_id, error = %e, "Could not mark order rejected");
        }
        warn!(order_id, error = %err, "Simulated order rejected");
        err
    }

    /// Fill the whole order as taker at `touch`
    fn take(&self, order: &OrderState, touch: Decimal) -> Result<OrderState, ExecutionError> {
        let price = self.slippage.apply(touch, order.intent.is_buy(), order.quantity);
        let fee = touch * order.quantity * self.fees.taker_rate;
        if let Err(e) = self
            .ledger
            .check_affordable(&order.market_id, order.intent, price, order.quantity, fee)
        {
            return Err(self.reject(&order.order_id, e));
        }

        self.state()
            .update_order(&order.order_id, OrderUpdate::status(OrderStatus::Open))?;
        let fill = Fill {
            order_id: order.order_id.clone(),
            market_id: order.market_id.clone(),
            intent: order.intent,
            price,
            quantity: order.quantity,
            fee,
            liquidity: Liquidity::Taker,
            timestamp: Utc::now(),
        };
        self.ledger.apply_fill(&fill)
    }

    /// Fill resting orders the current book has crossed
    fn match_resting(&self, market_id: &str) -> Vec<Fill> {
        let Some(book) = self.state().get_book(market_id) else {
            return Vec::new();
        };
        let mut fills = Vec::new();
        for order in self.state().get_open_orders(Some(market_id)) {
            let Some(touch) = Self::touch(&book, order.intent) else {
                continue;
            };
            if !Self::crosses(order.intent, order.price, touch) {
                continue;
            }

            let quantity = order.remaining();
            let fee = order.price * quantity * self.fees.maker_rate;
            if let Err(e) = self
                .ledger
                .check_affordable(market_id, order.intent, order.price, quantity, fee)
            {
                warn!(order_id = %order.order_id, error = %e, "Cancelling unfillable resting order");
                if let Err(e) = self
                    .state()
                    .update_order(&order.order_id, OrderUpdate::status(OrderStatus::Cancelled))
                {
                    warn!(order_id = %order.order_id, error = %e, "Failed to cancel resting order");
                }
                continue;
            }

            let fill = Fill {
                order_id: order.order_id.clone(),
                market_id: market_id.to_string(),
                intent: order.intent,
                price: order.price,
                quantity,
                fee,
                liquidity: Liquidity::Maker,
                timestamp: Utc::now(),
            };
            match self.ledger.apply_fill(&fill) {
                Ok(_) => fills.push(fill),
                Err(e) => warn!(order_id = %order.order_id, error = %e, "Resting fill failed"),
            }
        }
        fills
    }

    fn open_order(&self, order_id: &str) -> Result<OrderState, ExecutionError> {
        let order = self
            .state()
            .get_order(order_id)
            .ok_or_else(|| ExecutionError::UnknownOrder(order_id.to_string()))?;
        if !order.status.is_open() {
            return Err(ExecutionError::NotOpen {
                order_id: order.order_id,
                status: order.status,
            });
        }
        Ok(order)
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn submit(&self, request: OrderRequest) -> Result<OrderState, ExecutionError> {
        if let Some(price) = request.price {
            if price <= Decimal::ZERO || price >= Decimal::ONE {
                return Err(ExecutionError::InvalidPrice(price));
            }
        }
        if request.quantity <= Decimal::ZERO {
            return Err(ExecutionError::Rejected {
                reason: format!("quantity must be positive, got {}", request.quantity),
            });
        }
        let Some(book) = self.state().get_book(&request.market_id) else {
            return Err(ExecutionError::MarketClosed(request.market_id));
        };
        let touch = Self::touch(&book, request.intent);

        let limit = match (request.price, touch) {
            (Some(price), _) => price,
            (None, Some(touch)) => touch,
            (None, None) => {
                return Err(ExecutionError::Rejected {
                    reason: "no liquidity for market order".to_string(),
                })
            }
        };
        let mut order = OrderState::new(
            &request.client_order_id,
            &request.market_id,
            request.intent,
            request.kind,
            limit,
            request.quantity,
        );
        order.strategy = request.strategy;
        self.state().add_order(order.clone())?;
        self.state()
            .update_order(&order.order_id, OrderUpdate::status(OrderStatus::Submitted))?;

        if let Some(touch) = touch.filter(|t| Self::crosses(request.intent, limit, *t)) {
            let filled = self.take(&order, touch)?;
            debug!(order_id = %filled.order_id, price = ?filled.avg_fill_price, "Simulated taker fill");
            return Ok(filled);
        }

        if request.kind == OrderKind::Market {
            return Err(self.reject(
                &order.order_id,
                ExecutionError::Rejected {
                    reason: "market order found no liquidity".to_string(),
                },
            ));
        }

        let fee = limit * request.quantity * self.fees.maker_rate;
        if let Err(e) = self
            .ledger
            .check_affordable(&request.market_id, request.intent, limit, request.quantity, fee)
        {
            return Err(self.reject(&order.order_id, e));
        }

        let opened = self
            .state()
            .update_order(&order.order_id, OrderUpdate::status(OrderStatus::Open))?;
        if request.time_in_force == TimeInForce::Ioc {
            debug!(order_id = %opened.order_id, "IOC order found nothing to take");
            return Ok(self
                .state()
                .update_order(&opened.order_id, OrderUpdate::status(OrderStatus::Cancelled))?);
        }

        info!(
            order_id = %opened.order_id,
            market = %opened.market_id,
            intent = %opened.intent,
            price = %opened.price,
            quantity = %opened.quantity,
            "Simulated order resting"
        );
        Ok(opened)
    }

    async fn cancel(&self, order_id: &str) -> Result<OrderState, ExecutionError> {
        self.open_order(order_id)?;
        let cancelled = self
            .state()
            .update_order(order_id, OrderUpdate::status(OrderStatus::Cancelled))?;
        debug!(order_id, "Simulated order cancelled");
        Ok(cancelled)
    }

    async fn modify(
        &self,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> Result<OrderState, ExecutionError> {
        let order = self.open_order(order_id)?;
        if let Some(quantity) = quantity {
            if quantity <= order.filled_quantity {
                return Err(ExecutionError::Rejected {
                    reason: format!(
                        "new quantity {} does not exceed filled {}",
                        quantity, order.filled_quantity
                    ),
                });
            }
        }
        let modified = self.state().update_order(
            order_id,
            OrderUpdate {
                price,
                quantity,
                ..Default::default()
            },
        )?;
        self.match_resting(&modified.market_id);
        self.state()
            .get_order(order_id)
            .ok_or_else(|| ExecutionError::UnknownOrder(order_id.to_string()))
    }

    async fn on_market_update(&self, market_id: &str) -> Result<Vec<Fill>, ExecutionError> {
        Ok(self.match_resting(market_id))
    }

    fn fills(&self) -> Vec<Fill> {
        self.ledger.fills()
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MarketTick;
    use crate::orderbook::PriceLevel;
    use crate::signal::Side;
    use rust_decimal_macros::dec;

    fn executor(balance: Decimal) -> (Arc<StateStore>, SimulatedExecutor) {
        let state = Arc::new(StateStore::new(balance));
        let exec = SimulatedExecutor::new(
            state.clone(),
            FeeSchedule::from_bps(dec!(10), dec!(0)),
            SlippageModel::new(SlippageConfig::Fixed { bps: dec!(5) }),
        );
        (state, exec)
    }

    fn tick(state: &StateStore, bid: Decimal, ask: Decimal) {
        state
            .apply_tick(&MarketTick::top_of_book(
                "m1",
                PriceLevel::new(bid, dec!(100)),
                PriceLevel::new(ask, dec!(100)),
                Utc::now(),
            ))
            .unwrap();
    }

    #[test]
    fn test_slippage_models() {
        let fixed = SlippageModel::new(SlippageConfig::Fixed { bps: dec!(5) });
        assert_eq!(fixed.apply(dec!(0.50), true, dec!(10)), dec!(0.50025));
        assert_eq!(fixed.apply(dec!(0.50), false, dec!(10)), dec!(0.49975));

        let sized = SlippageModel::new(SlippageConfig::SizeDependent {
            base_bps: dec!(2),
            bps_per_100: dec!(4),
        });
        assert_eq!(sized.bps(dec!(50)), dec!(4));
        assert_eq!(sized.bps(dec!(200)), dec!(10));
    }

    #[tokio::test]
    async fn test_marketable_buy_fills_with_slippage_and_fee() {
        let (state, exec) = executor(dec!(1000));
        tick(&state, dec!(0.48), dec!(0.50));

        let request = OrderRequest::limit("m1", OrderIntent::BuyLong, dec!(0.52), dec!(100));
        let order = exec.submit(request).await.unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.avg_fill_price, Some(dec!(0.50025)));
        let fills = exec.fills();
        assert_eq!(fills.len(), 1);
        // Fee charged on the quoted price: 0.50 * 100 * 0.001
        assert_eq!(fills[0].fee, dec!(0.05));
        assert_eq!(fills[0].liquidity, Liquidity::Taker);
        assert_eq!(state.get_balance(), dec!(1000) - dec!(50.025) - dec!(0.05));
        assert_eq!(state.position_quantity("m1", Side::Long), dec!(100));
    }

    #[tokio::test]
    async fn test_passive_order_rests_then_fills_as_maker() {
        let (state, exec) = executor(dec!(1000));
        tick(&state, dec!(0.48), dec!(0.52));

        let request = OrderRequest::limit("m1", OrderIntent::BuyLong, dec!(0.49), dec!(10));
        let order = exec.submit(request).await.unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(state.reserved_cash(), dec!(4.90));

        tick(&state, dec!(0.47), dec!(0.49));
        let fills = exec.on_market_update("m1").await.unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, dec!(0.49));
        assert_eq!(fills[0].fee, dec!(0));
        assert_eq!(fills[0].liquidity, Liquidity::Maker);
        assert_eq!(state.get_order(&order.order_id).unwrap().status, OrderStatus::Filled);
        assert_eq!(state.reserved_cash(), dec!(0));
    }

    #[tokio::test]
    async fn test_unfundable_resting_order_is_cancelled() {
        let (state, exec) = executor(dec!(1000));
        tick(&state, dec!(0.48), dec!(0.52));
        let request = OrderRequest::limit("m1", OrderIntent::BuyLong, dec!(0.49), dec!(10));
        let order = exec.submit(request).await.unwrap();
        assert_eq!(order.status, OrderStatus::Open);

        state.update_balance(dec!(1));
        tick(&state, dec!(0.47), dec!(0.49));
        let fills = exec.on_market_update("m1").await.unwrap();

        assert!(fills.is_empty());
        assert_eq!(state.get_order(&order.order_id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(state.position_quantity("m1", Side::Long), dec!(0));
    }

    #[tokio::test]
    async fn test_ioc_that_cannot_take_is_cancelled() {
        let (state, exec) = executor(dec!(1000));
        tick(&state, dec!(0.48), dec!(0.52));

        let request = OrderRequest::limit("m1", OrderIntent::BuyLong, dec!(0.49), dec!(10))
            .with_time_in_force(TimeInForce::Ioc);
        let order = exec.submit(request).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(exec.fills().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejects() {
        let (state, exec) = executor(dec!(10));
        tick(&state, dec!(0.48), dec!(0.50));

        let request = OrderRequest::limit("m1", OrderIntent::BuyLong, dec!(0.50), dec!(100));
        let id = request.client_order_id.clone();
        let err = exec.submit(request).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InsufficientBalance { .. }));
        assert_eq!(state.get_order(&id).unwrap().status, OrderStatus::Rejected);
        assert_eq!(state.get_balance(), dec!(10));
    }

    #[tokio::test]
    async fn test_sell_without_position_rejects() {
        let (state, exec) = executor(dec!(100));
        tick(&state, dec!(0.48), dec!(0.50));

        let request = OrderRequest::limit("m1", OrderIntent::SellLong, dec!(0.48), dec!(5));
        let err = exec.submit(request).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InsufficientPosition { .. }));
    }

    #[tokio::test]
    async fn test_market_order_takes_touch() {
        let (state, exec) = executor(dec!(100));
        tick(&state, dec!(0.48), dec!(0.50));

        let order = exec
            .submit(OrderRequest::market("m1", OrderIntent::BuyLong, dec!(10)))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.price, dec!(0.50));
    }

    #[tokio::test]
    async fn test_unknown_market_and_bad_price() {
        let (_state, exec) = executor(dec!(100));
        let err = exec
            .submit(OrderRequest::limit("nope", OrderIntent::BuyLong, dec!(0.5), dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::MarketClosed(_)));

        let err = exec
            .submit(OrderRequest::limit("nope", OrderIntent::BuyLong, dec!(1.2), dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err, ExecutionError::InvalidPrice(dec!(1.2)));
    }

    #[tokio::test]
    async fn test_cancel_and_modify() {
        let (state, exec) = executor(dec!(100));
        tick(&state, dec!(0.40), dec!(0.60));

        let order = exec
            .submit(OrderRequest::limit("m1", OrderIntent::BuyLong, dec!(0.45), dec!(10)))
            .await
            .unwrap();
        let modified = exec
            .modify(&order.order_id, Some(dec!(0.46)), Some(dec!(12)))
            .await
            .unwrap();
        assert_eq!(modified.price, dec!(0.46));
        assert_eq!(modified.quantity, dec!(12));
        assert_eq!(modified.status, OrderStatus::Open);

        // Repricing through the ask fills immediately
        let crossed = exec.modify(&order.order_id, Some(dec!(0.60)), None).await.unwrap();
        assert_eq!(crossed.status, OrderStatus::Filled);

        let err = exec.cancel(&order.order_id).await.unwrap_err();
        assert!(matches!(err, ExecutionError::NotOpen { .. }));
        let err = exec.cancel("missing").await.unwrap_err();
        assert_eq!(err, ExecutionError::UnknownOrder("missing".to_string()));
    }
}
