//! Execution module
//!
//! Turns approved signals into orders. The simulated backend fills against
//! the recorded book; the live backend goes through a [`Venue`]. Both settle
//! fills through the shared [`Ledger`].

mod ledger;
mod live;
mod retry;
mod simulated;
mod types;
mod venue;

pub use ledger::Ledger;
pub use live::{LiveExecutor, ReconcileReport};
pub use retry::RetryPolicy;
pub use simulated::{FeeSchedule, SimulatedExecutor, SlippageModel};
pub use types::{ExecutionError, Fill, Liquidity, OrderRequest, TimeInForce};
pub use venue::{classify_response, RestVenue, Venue, VenueOrder, VenuePosition};

use crate::feed::AccountEvent;
use crate::state::OrderState;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for execution backends
#[async_trait]
pub trait Executor: Send + Sync {
    /// Submit an order; returns its tracked state after submission
    async fn submit(&self, request: OrderRequest) -> Result<OrderState, ExecutionError>;

    /// Cancel an open order
    async fn cancel(&self, order_id: &str) -> Result<OrderState, ExecutionError>;

    /// Change price and/or quantity of an open order
    async fn modify(
        &self,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> Result<OrderState, ExecutionError>;

    /// Hook run after each market update; returns fills it caused
    async fn on_market_update(&self, _market_id: &str) -> Result<Vec<Fill>, ExecutionError> {
        Ok(Vec::new())
    }

    /// Apply an account notification from the venue
    async fn on_account_event(&self, _event: &AccountEvent) -> Result<(), ExecutionError> {
        Ok(())
    }

    /// Fills applied so far
    fn fills(&self) -> Vec<Fill>;

    fn name(&self) -> &'static str;
}
