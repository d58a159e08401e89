//! Live execution through a venue

use super::{
    ExecutionError, Executor, Fill, Ledger, Liquidity, OrderRequest, RetryPolicy, Venue,
};
use crate::feed::AccountEvent;
use crate::state::{OrderState, OrderStatus, OrderUpdate, StateStore};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counts from a reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub balance: Decimal,
    pub positions: usize,
    pub open_orders: usize,
}

/// Live backend
///
/// Order acknowledgements only move order status. Fills are applied when the
/// venue's account feed reports them, so each fill is counted exactly once.
pub struct LiveExecutor<V> {
    venue: V,
    ledger: Ledger,
    retry: RetryPolicy,
}

impl<V: Venue> LiveExecutor<V> {
    pub fn new(venue: V, state: Arc<StateStore>, retry: RetryPolicy) -> Self {
        Self {
            venue,
            ledger: Ledger::new(state),
            retry,
        }
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    fn state(&self) -> &StateStore {
        self.ledger.state()
    }

    /// Replace local balance, positions and open orders with the venue's view
    pub async fn reconcile(&self) -> Result<ReconcileReport, ExecutionError> {
        let balance = self
            .retry
            .run("fetch_balance", || self.venue.fetch_balance())
            .await?;
        let positions = self
            .retry
            .run("fetch_positions", || self.venue.fetch_positions())
            .await?;
        let orders = self
            .retry
            .run("fetch_open_orders", || self.venue.fetch_open_orders())
            .await?;

        let now = Utc::now();
        let report = ReconcileReport {
            balance,
            positions: positions.len(),
            open_orders: orders.len(),
        };
        self.state().reconcile(
            balance,
            positions
                .into_iter()
                .map(|p| p.into_position_state(now))
                .collect(),
            orders.into_iter().map(|o| o.into_order_state()).collect(),
        );
        info!(
            balance = %report.balance,
            positions = report.positions,
            open_orders = report.open_orders,
            "Reconciled with venue"
        );
        Ok(report)
    }

    fn open_order(&self, order_id: &str) -> Result<OrderState, ExecutionError> {
        let order = self
            .state()
            .get_order(order_id)
            .ok_or_else(|| ExecutionError::UnknownOrder(order_id.to_string()))?;
        if order.status.is_terminal() {
            return Err(ExecutionError::NotOpen {
                order_id: order.order_id,
                status: order.status,
            });
        }
        Ok(order)
    }

    /// Move an order to `status` if the lifecycle allows it
    fn advance(&self, order_id: &str, status: OrderStatus) {
        if let Err(e) = self.state().update_order(order_id, OrderUpdate::status(status)) {
            debug!(order_id, %status, error = %e, "Ignoring status update");
        }
    }
}

#[async_trait]
impl<V: Venue> Executor for LiveExecutor<V> {
    async fn submit(&self, request: OrderRequest) -> Result<OrderState, ExecutionError> {
        let mut order = OrderState::new(
            &request.client_order_id,
            &request.market_id,
            request.intent,
            request.kind,
            request.price.unwrap_or_default(),
            request.quantity,
        );
        order.strategy = request.strategy;
        self.state().add_order(order.clone())?;
        self.advance(&order.order_id, OrderStatus::Submitted);

        let placed = self
            .retry
            .run("place_order", || self.venue.place_order(&request))
            .await;
        let placed = match placed {
            Ok(placed) => placed,
            Err(e) => {
                self.advance(&order.order_id, OrderStatus::Rejected);
                warn!(order_id = %order.order_id, error = %e, "Live order failed");
                return Err(e);
            }
        };

        if placed.status == OrderStatus::Rejected {
            self.advance(&order.order_id, OrderStatus::Rejected);
            return Err(ExecutionError::Rejected {
                reason: format!("venue rejected order {}", placed.order_id),
            });
        }

        // Track under the venue's id from here on
        let order_id = if placed.order_id != order.order_id {
            self.state().remove_order(&order.order_id);
            order.order_id = placed.order_id.clone();
            order.status = OrderStatus::Submitted;
            self.state().add_order(order.clone())?;
            placed.order_id.clone()
        } else {
            order.order_id.clone()
        };
        if placed.price > Decimal::ZERO {
            if let Err(e) = self.state().update_order(
                &order_id,
                OrderUpdate {
                    price: Some(placed.price),
                    ..Default::default()
                },
            ) {
                warn!(order_id = %order_id, price = %placed.price, error = %e, "Could not record venue price");
            }
        }
        self.advance(&order_id, OrderStatus::Open);

        info!(
            order_id = %order_id,
            market = %request.market_id,
            intent = %request.intent,
            quantity = %request.quantity,
            "Live order accepted"
        );
        self.state()
            .get_order(&order_id)
            .ok_or(ExecutionError::UnknownOrder(order_id))
    }

    async fn cancel(&self, order_id: &str) -> Result<OrderState, ExecutionError> {
        self.open_order(order_id)?;
        self.retry
            .run("cancel_order", || self.venue.cancel_order(order_id))
            .await?;
        Ok(self
            .state()
            .update_order(order_id, OrderUpdate::status(OrderStatus::Cancelled))?)
    }

    async fn modify(
        &self,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> Result<OrderState, ExecutionError> {
        self.open_order(order_id)?;
        let amended = self
            .retry
            .run("amend_order", || self.venue.amend_order(order_id, price, quantity))
            .await?;
        Ok(self.state().update_order(
            order_id,
            OrderUpdate {
                price: Some(amended.price),
                quantity: Some(amended.quantity),
                ..Default::default()
            },
        )?)
    }

    async fn on_account_event(&self, event: &AccountEvent) -> Result<(), ExecutionError> {
        match event {
            AccountEvent::Balance { balance } => {
                self.state().update_balance(*balance);
            }
            AccountEvent::OrderAccepted { order_id } => {
                self.advance(order_id, OrderStatus::Open);
            }
            AccountEvent::Fill {
                order_id,
                price,
                quantity,
                fee,
                timestamp,
            } => {
                let order = self
                    .state()
                    .get_order(order_id)
                    .ok_or_else(|| ExecutionError::UnknownOrder(order_id.clone()))?;
                let fill = Fill {
                    order_id: order_id.clone(),
                    market_id: order.market_id,
                    intent: order.intent,
                    price: *price,
                    quantity: *quantity,
                    fee: *fee,
                    liquidity: if fee.is_zero() {
                        Liquidity::Maker
                    } else {
                        Liquidity::Taker
                    },
                    timestamp: *timestamp,
                };
                self.ledger.apply_fill(&fill)?;
            }
            AccountEvent::OrderCancelled { order_id } => {
                self.advance(order_id, OrderStatus::Cancelled);
            }
            AccountEvent::OrderRejected { order_id, reason } => {
                warn!(order_id = %order_id, reason = %reason, "Venue rejected order");
                self.advance(order_id, OrderStatus::Rejected);
            }
        }
        Ok(())
    }

    fn fills(&self) -> Vec<Fill> {
        self.ledger.fills()
    }

    fn name(&self) -> &'static str {
        "live"
    }
}
