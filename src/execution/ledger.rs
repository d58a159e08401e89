//! Fill accounting
//!
//! Every backend settles fills through [`Ledger::apply_fill`] so positions,
//! cash and order progress move together.

use super::{ExecutionError, Fill};
use crate::signal::Side;
use crate::state::{OrderIntent, OrderState, OrderStatus, OrderUpdate, StateError, StateStore};
use crate::telemetry::{increment, CounterMetric};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

/// Applies fills to the shared state and keeps the fill history
pub struct Ledger {
    state: Arc<StateStore>,
    fills: RwLock<Vec<Fill>>,
}

impl Ledger {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self {
            state,
            fills: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Every fill applied so far, oldest first
    pub fn fills(&self) -> Vec<Fill> {
        self.fills.read().clone()
    }

    /// Check that cash (buys) or inventory (sells) covers a prospective fill
    pub fn check_affordable(
        &self,
        market_id: &str,
        intent: OrderIntent,
        price: Decimal,
        quantity: Decimal,
        fee: Decimal,
    ) -> Result<(), ExecutionError> {
        if intent.is_buy() {
            let required = price * quantity + fee;
            let available = self.state.get_balance();
            if required > available {
                return Err(ExecutionError::InsufficientBalance { required, available });
            }
        } else {
            let held = self.state.position_quantity(market_id, intent.side());
            if quantity > held {
                return Err(ExecutionError::InsufficientPosition {
                    required: quantity,
                    held,
                });
            }
        }
        Ok(())
    }

    /// Record a fill against its order, then settle cash and inventory
    ///
    /// The order's progress is computed under its entry lock, so concurrent
    /// fills on one order each settle exactly the quantity they added.
    pub fn apply_fill(&self, fill: &Fill) -> Result<OrderState, ExecutionError> {
        let (updated, quantity) = self.state.modify_order(&fill.order_id, |order| {
            // Fills can race the acceptance notice
            if !order.status.is_open() && order.status != OrderStatus::Submitted {
                return Err(ExecutionError::NotOpen {
                    order_id: order.order_id.clone(),
                    status: order.status,
                });
            }

            let quantity = fill.quantity.min(order.remaining());
            if quantity <= Decimal::ZERO {
                return Err(ExecutionError::NotOpen {
                    order_id: order.order_id.clone(),
                    status: OrderStatus::Filled,
                });
            }

            let filled = order.filled_quantity + quantity;
            let avg_fill_price = match order.avg_fill_price {
                Some(avg) => (avg * order.filled_quantity + fill.price * quantity) / filled,
                None => fill.price,
            };
            let status = if filled >= order.quantity {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            let update = OrderUpdate {
                status: Some(status),
                filled_quantity: Some(filled),
                avg_fill_price: Some(avg_fill_price),
                ..Default::default()
            };
            Ok((update, quantity))
        })
        .map_err(|err| match err {
            ExecutionError::State(StateError::UnknownOrder(order_id)) => {
                ExecutionError::UnknownOrder(order_id)
            }
            other => other,
        })?;

        let settled = Fill {
            quantity,
            ..fill.clone()
        };
        self.settle(&settled);
        self.fills.write().push(settled);
        Ok(updated)
    }

    fn settle(&self, fill: &Fill) {
        let side: Side = fill.intent.side();

        if fill.intent.is_buy() {
            let notional = fill.notional();
            self.state
                .modify_position(&fill.market_id, side, fill.timestamp, |held, avg| {
                    let quantity = held + fill.quantity;
                    (quantity, (held * avg + notional) / quantity, ())
                });
            self.state.with_account(|account| {
                account.balance -= notional + fill.fee;
                account.fees_paid += fill.fee;
                account.volume += notional;
                account.fill_count += 1;
            });
        } else {
            let (sold, realized) = self
                .state
                .modify_position(&fill.market_id, side, fill.timestamp, |held, avg| {
                    let sold = fill.quantity.min(held);
                    (held - sold, avg, (sold, (fill.price - avg) * sold - fill.fee))
                });
            if sold < fill.quantity {
                warn!(
                    order_id = %fill.order_id,
                    market = %fill.market_id,
                    filled = %fill.quantity,
                    %sold,
                    "Sell fill exceeds holding, crediting only what was held"
                );
            }
            let proceeds = fill.price * sold;
            self.state.with_account(|account| {
                account.balance += proceeds - fill.fee;
                account.realized_pnl += realized;
                account.fees_paid += fill.fee;
                account.volume += proceeds;
                account.fill_count += 1;
            });
        }

        increment(CounterMetric::Fills);
        tracing::info!(
            order_id = %fill.order_id,
            market = %fill.market_id,
            intent = %fill.intent,
            price = %fill.price,
            quantity = %fill.quantity,
            fee = %fill.fee,
            liquidity = ?fill.liquidity,
            "Fill applied"
        );
    }
}
