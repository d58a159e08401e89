//! State store module
//!
//! Single source of truth for markets, positions, orders and the cash
//! account. Every entity lives behind its own lock so a write to one
//! market never blocks readers of another.

mod store;
mod types;

pub use store::{StateError, StateStore};
pub use types::{
    Account, CompletenessOpportunity, MarketState, MarketUpdate, OrderIntent, OrderKind,
    OrderState, OrderStatus, OrderUpdate, PositionState, Quote, StoreSnapshot,
};
