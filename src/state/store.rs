//! Concurrent state store

use super::types::*;
use crate::feed::MarketTick;
use crate::orderbook::{MarketBook, OrderBook};
use crate::signal::Side;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

/// State store errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateError {
    #[error("unknown order {0}")]
    UnknownOrder(String),
    #[error("order {order_id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },
    #[error("price {0} outside (0, 1)")]
    InvalidPrice(Decimal),
    #[error("duplicate order {0}")]
    DuplicateOrder(String),
}

struct MarketEntry {
    state: MarketState,
    book: MarketBook,
}

type PositionKey = (String, Side);

/// Thread-safe store of all trading state
///
/// Readers always get owned snapshots, never references into the maps.
pub struct StateStore {
    markets: DashMap<String, MarketEntry>,
    positions: DashMap<PositionKey, PositionState>,
    orders: DashMap<String, OrderState>,
    account: RwLock<Account>,
    sequence: AtomicU64,
}

fn valid_price(price: Decimal) -> bool {
    price > Decimal::ZERO && price < Decimal::ONE
}

fn check_quote(quote: &Quote) -> Result<(), StateError> {
    for price in [quote.bid, quote.ask].into_iter().flatten() {
        if !valid_price(price) {
            return Err(StateError::InvalidPrice(price));
        }
    }
    Ok(())
}

fn apply_order_update(order: &mut OrderState, update: OrderUpdate) -> Result<(), StateError> {
    // A fill reported before the acceptance notice implies acceptance
    let from = if order.status == OrderStatus::Submitted && update.filled_quantity.is_some() {
        OrderStatus::Open
    } else {
        order.status
    };
    if let Some(next) = update.status {
        let same_open = next == from && !from.is_terminal();
        if !same_open && !from.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                order_id: order.order_id.clone(),
                from: order.status,
                to: next,
            });
        }
    } else if from.is_terminal() {
        return Err(StateError::InvalidTransition {
            order_id: order.order_id.clone(),
            from: order.status,
            to: order.status,
        });
    }

    if let Some(price) = update.price {
        if !valid_price(price) {
            return Err(StateError::InvalidPrice(price));
        }
        order.price = price;
    }
    if let Some(status) = update.status {
        order.status = status;
    }
    if let Some(filled) = update.filled_quantity {
        order.filled_quantity = filled;
    }
    if let Some(avg) = update.avg_fill_price {
        order.avg_fill_price = Some(avg);
    }
    if let Some(quantity) = update.quantity {
        order.quantity = quantity;
    }
    order.updated_at = Utc::now();
    Ok(())
}

fn quote_from_book(book: &OrderBook) -> Quote {
    Quote {
        bid: book.best_bid(),
        bid_size: book.best_bid_size().unwrap_or_default(),
        ask: book.best_ask(),
        ask_size: book.best_ask_size().unwrap_or_default(),
    }
}

impl StateStore {
    /// Create an empty store holding `initial_balance` in cash
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            markets: DashMap::new(),
            positions: DashMap::new(),
            orders: DashMap::new(),
            account: RwLock::new(Account {
                balance: initial_balance,
                ..Default::default()
            }),
            sequence: AtomicU64::new(0),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Sequence number of the most recent market write
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    // --- markets ---

    pub fn get_market(&self, market_id: &str) -> Option<MarketState> {
        self.markets.get(market_id).map(|e| e.state.clone())
    }

    pub fn get_book(&self, market_id: &str) -> Option<MarketBook> {
        self.markets.get(market_id).map(|e| e.book.clone())
    }

    pub fn market_ids(&self) -> Vec<String> {
        self.markets.iter().map(|e| e.key().clone()).collect()
    }

    /// Apply a partial update, creating the market if needed
    pub fn update_market(
        &self,
        market_id: &str,
        update: MarketUpdate,
        at: DateTime<Utc>,
    ) -> Result<MarketState, StateError> {
        if let Some(q) = &update.long {
            check_quote(q)?;
        }
        if let Some(q) = &update.short {
            check_quote(q)?;
        }

        let snapshot = {
            let mut entry = self
                .markets
                .entry(market_id.to_string())
                .or_insert_with(|| MarketEntry {
                    state: MarketState::new(market_id, at),
                    book: MarketBook::default(),
                });
            let state = &mut entry.state;
            if let Some(q) = update.long {
                state.long = q;
            }
            if let Some(q) = update.short {
                state.short = q;
            }
            if let Some((price, time)) = update.last_trade {
                state.last_trade_price = Some(price);
                state.last_trade_time = Some(time);
            }
            state.updated_at = at;
            state.sequence = self.next_sequence();
            state.clone()
        };

        self.mark_positions(&snapshot, at);
        Ok(snapshot)
    }

    /// Replace a market's books with a fresh snapshot
    pub fn apply_tick(&self, tick: &MarketTick) -> Result<MarketState, StateError> {
        for level in tick
            .long_bids
            .iter()
            .chain(&tick.long_asks)
            .chain(&tick.short_bids)
            .chain(&tick.short_asks)
        {
            if !valid_price(level.price) {
                return Err(StateError::InvalidPrice(level.price));
            }
        }

        let snapshot = {
            let mut entry = self
                .markets
                .entry(tick.market_id.clone())
                .or_insert_with(|| MarketEntry {
                    state: MarketState::new(&tick.market_id, tick.timestamp),
                    book: MarketBook::default(),
                });
            let entry = &mut *entry;
            entry
                .book
                .long
                .replace(tick.long_bids.clone(), tick.long_asks.clone(), tick.timestamp);
            entry
                .book
                .short
                .replace(tick.short_bids.clone(), tick.short_asks.clone(), tick.timestamp);

            let state = &mut entry.state;
            state.long = quote_from_book(&entry.book.long);
            state.short = quote_from_book(&entry.book.short);
            if let Some(price) = tick.last_trade_price {
                state.last_trade_price = Some(price);
                state.last_trade_time = Some(tick.last_trade_time.unwrap_or(tick.timestamp));
            }
            state.updated_at = tick.timestamp;
            state.sequence = self.next_sequence();
            state.clone()
        };

        debug!(market = %snapshot.market_id, seq = snapshot.sequence, "Applied tick");
        self.mark_positions(&snapshot, tick.timestamp);
        Ok(snapshot)
    }

    /// Missing markets count as stale
    pub fn is_stale(&self, market_id: &str, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.markets
            .get(market_id)
            .map(|e| e.state.is_stale(now, max_age))
            .unwrap_or(true)
    }

    fn mark_positions(&self, market: &MarketState, at: DateTime<Utc>) {
        for side in [Side::Long, Side::Short] {
            let Some(mark) = market.mark_price(side) else {
                continue;
            };
            if let Some(mut pos) = self.positions.get_mut(&(market.market_id.clone(), side)) {
                pos.mark_price = mark;
                pos.updated_at = at;
            }
        }
    }

    // --- positions ---

    pub fn get_position(&self, market_id: &str, side: Side) -> Option<PositionState> {
        self.positions
            .get(&(market_id.to_string(), side))
            .map(|p| p.clone())
    }

    /// Held quantity, zero when flat
    pub fn position_quantity(&self, market_id: &str, side: Side) -> Decimal {
        self.get_position(market_id, side)
            .map(|p| p.quantity)
            .unwrap_or_default()
    }

    pub fn positions_for_market(&self, market_id: &str) -> Vec<PositionState> {
        [Side::Long, Side::Short]
            .into_iter()
            .filter_map(|side| self.get_position(market_id, side))
            .collect()
    }

    pub fn all_positions(&self) -> Vec<PositionState> {
        self.positions.iter().map(|p| p.value().clone()).collect()
    }

    /// Set quantity and average price; a non-positive quantity removes the
    /// position
    pub fn update_position(
        &self,
        market_id: &str,
        side: Side,
        quantity: Decimal,
        avg_price: Decimal,
        at: DateTime<Utc>,
    ) -> Option<PositionState> {
        let key = (market_id.to_string(), side);
        if quantity <= Decimal::ZERO {
            self.positions.remove(&key);
            return None;
        }

        let mark = self
            .get_market(market_id)
            .and_then(|m| m.mark_price(side));
        let mut entry = self.positions.entry(key).or_insert_with(|| PositionState {
            market_id: market_id.to_string(),
            side,
            quantity,
            avg_price,
            mark_price: mark.unwrap_or(avg_price),
            opened_at: at,
            updated_at: at,
        });
        entry.quantity = quantity;
        entry.avg_price = avg_price;
        if let Some(mark) = mark {
            entry.mark_price = mark;
        }
        entry.updated_at = at;
        Some(entry.clone())
    }

    /// Read-modify-write one position under its entry lock
    ///
    /// `f` gets the held quantity and average price (zero when flat) and
    /// returns the new pair plus a result. A non-positive quantity removes
    /// the position.
    pub fn modify_position<T>(
        &self,
        market_id: &str,
        side: Side,
        at: DateTime<Utc>,
        f: impl FnOnce(Decimal, Decimal) -> (Decimal, Decimal, T),
    ) -> T {
        let mark = self
            .get_market(market_id)
            .and_then(|m| m.mark_price(side));
        match self.positions.entry((market_id.to_string(), side)) {
            Entry::Occupied(mut entry) => {
                let (quantity, avg_price, out) = f(entry.get().quantity, entry.get().avg_price);
                if quantity <= Decimal::ZERO {
                    entry.remove();
                } else {
                    let position = entry.get_mut();
                    position.quantity = quantity;
                    position.avg_price = avg_price;
                    if let Some(mark) = mark {
                        position.mark_price = mark;
                    }
                    position.updated_at = at;
                }
                out
            }
            Entry::Vacant(entry) => {
                let (quantity, avg_price, out) = f(Decimal::ZERO, Decimal::ZERO);
                if quantity > Decimal::ZERO {
                    entry.insert(PositionState {
                        market_id: market_id.to_string(),
                        side,
                        quantity,
                        avg_price,
                        mark_price: mark.unwrap_or(avg_price),
                        opened_at: at,
                        updated_at: at,
                    });
                }
                out
            }
        }
    }

    /// Markets with at least one open position
    pub fn position_market_count(&self) -> usize {
        let mut markets: Vec<String> = self
            .positions
            .iter()
            .map(|p| p.key().0.clone())
            .collect();
        markets.sort();
        markets.dedup();
        markets.len()
    }

    pub fn has_position(&self, market_id: &str) -> bool {
        !self.positions_for_market(market_id).is_empty()
    }

    // --- orders ---

    pub fn add_order(&self, order: OrderState) -> Result<(), StateError> {
        use dashmap::mapref::entry::Entry;
        match self.orders.entry(order.order_id.clone()) {
            Entry::Occupied(_) => Err(StateError::DuplicateOrder(order.order_id)),
            Entry::Vacant(slot) => {
                slot.insert(order);
                Ok(())
            }
        }
    }

    pub fn get_order(&self, order_id: &str) -> Option<OrderState> {
        self.orders.get(order_id).map(|o| o.clone())
    }

    /// Apply an update, enforcing the order lifecycle
    ///
    /// Status changes must be legal transitions; an update that leaves the
    /// status unchanged is allowed for non-terminal orders.
    pub fn update_order(&self, order_id: &str, update: OrderUpdate) -> Result<OrderState, StateError> {
        self.modify_order(order_id, |_| Ok::<_, StateError>((update, ())))
            .map(|(order, ())| order)
    }

    /// Read-modify-write one order under its entry lock
    ///
    /// `f` sees the current order and returns the update to apply plus a
    /// result. An error from `f` or an illegal update leaves the order as it
    /// was.
    pub fn modify_order<T, E>(
        &self,
        order_id: &str,
        f: impl FnOnce(&OrderState) -> Result<(OrderUpdate, T), E>,
    ) -> Result<(OrderState, T), E>
    where
        E: From<StateError>,
    {
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StateError::UnknownOrder(order_id.to_string()))?;
        let (update, out) = f(&*order)?;
        apply_order_update(&mut *order, update)?;
        Ok((order.clone(), out))
    }

    pub fn remove_order(&self, order_id: &str) -> Option<OrderState> {
        self.orders.remove(order_id).map(|(_, o)| o)
    }

    /// Orders still able to fill, optionally for one market
    pub fn get_open_orders(&self, market_id: Option<&str>) -> Vec<OrderState> {
        let mut orders: Vec<OrderState> = self
            .orders
            .iter()
            .filter(|o| o.status.is_open())
            .filter(|o| market_id.map_or(true, |m| o.market_id == m))
            .map(|o| o.value().clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        orders
    }

    /// Drop terminal orders older than `before`
    pub fn prune_orders(&self, before: DateTime<Utc>) -> usize {
        let len = self.orders.len();
        self.orders
            .retain(|_, o| !(o.status.is_terminal() && o.updated_at < before));
        len - self.orders.len()
    }

    // --- account ---

    pub fn account(&self) -> Account {
        self.account.read().clone()
    }

    pub fn get_balance(&self) -> Decimal {
        self.account.read().balance
    }

    pub fn update_balance(&self, balance: Decimal) {
        self.account.write().balance = balance;
    }

    /// Atomically apply a change to the account
    pub fn with_account<T>(&self, f: impl FnOnce(&mut Account) -> T) -> T {
        f(&mut self.account.write())
    }

    // --- aggregates ---

    /// Cash plus positions at their marks
    pub fn equity(&self) -> Decimal {
        let positions: Decimal = self.positions.iter().map(|p| p.market_value()).sum();
        self.get_balance() + positions
    }

    /// Cash committed to open buy orders
    pub fn reserved_cash(&self) -> Decimal {
        self.orders.iter().map(|o| o.reserved_notional()).sum()
    }

    /// Cost basis of both sides plus open buy orders in one market
    pub fn market_exposure(&self, market_id: &str) -> Decimal {
        let positions: Decimal = self
            .positions_for_market(market_id)
            .iter()
            .map(PositionState::cost_basis)
            .sum();
        let orders: Decimal = self
            .orders
            .iter()
            .filter(|o| o.market_id == market_id)
            .map(|o| o.reserved_notional())
            .sum();
        positions + orders
    }

    /// Exposure summed across every market
    pub fn total_exposure(&self) -> Decimal {
        let positions: Decimal = self.positions.iter().map(|p| p.cost_basis()).sum();
        positions + self.reserved_cash()
    }

    /// Overwrite holdings with venue truth
    pub fn reconcile(&self, balance: Decimal, positions: Vec<PositionState>, open_orders: Vec<OrderState>) {
        self.positions.clear();
        for position in positions.into_iter().filter(|p| p.quantity > Decimal::ZERO) {
            self.positions
                .insert((position.market_id.clone(), position.side), position);
        }
        self.orders.retain(|_, o| o.status.is_terminal());
        for order in open_orders {
            self.orders.insert(order.order_id.clone(), order);
        }
        self.update_balance(balance);
    }

    /// Markets where buying both outcomes costs less than the payout
    pub fn completeness_opportunities(
        &self,
        min_margin: Decimal,
        fee_rate: Decimal,
    ) -> Vec<CompletenessOpportunity> {
        let mut found: Vec<CompletenessOpportunity> = self
            .markets
            .iter()
            .filter_map(|e| {
                let book = &e.book;
                let margin = book.completeness_margin(fee_rate)?;
                if margin < min_margin {
                    return None;
                }
                Some(CompletenessOpportunity {
                    market_id: e.key().clone(),
                    long_ask: book.long.best_ask()?,
                    short_ask: book.short.best_ask()?,
                    margin,
                    size: book
                        .long
                        .best_ask_size()?
                        .min(book.short.best_ask_size()?),
                })
            })
            .collect();
        found.sort_by(|a, b| b.margin.cmp(&a.margin));
        found
    }

    /// Point-in-time view for monitoring
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            account: self.account(),
            equity: self.equity(),
            total_exposure: self.total_exposure(),
            positions: self.all_positions(),
            open_orders: self.get_open_orders(None),
            sequence: self.sequence(),
        }
    }
}
