//! Market making
//!
//! Quotes both sides around the depth-weighted mid and requotes on a timer or
//! when the mid drifts. Net inventory (long minus short) leans both quotes
//! away from the held side. Past the inventory ceiling, or on a stop-loss,
//! quoting stops and the position is worked down with urgent reduce-only
//! sells, whether or not the market is currently quoted.

use super::{contracts_for, Strategy, StrategyContext};
use crate::config::MarketMakerConfig;
use crate::signal::{Side, Signal, SignalAction, StrategyId, Urgency};
use crate::state::MarketState;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::debug;

const MIN_PRICE: Decimal = dec!(0.01);
const MAX_PRICE: Decimal = dec!(0.99);
const TICK: Decimal = dec!(0.01);

/// Quote lifecycle for one market
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotePhase {
    NoQuote,
    Quoted,
    /// Old quotes cancelled, replacements not yet placed
    Refreshing,
}

#[derive(Debug, Clone)]
struct QuoteState {
    phase: QuotePhase,
    mid: Decimal,
    quoted_at: DateTime<Utc>,
}

/// Two-sided quoting strategy
pub struct MarketMaker {
    config: MarketMakerConfig,
    quotes: HashMap<String, QuoteState>,
}

impl MarketMaker {
    pub fn new(config: MarketMakerConfig) -> Self {
        Self {
            config,
            quotes: HashMap::new(),
        }
    }

    pub fn phase(&self, market_id: &str) -> QuotePhase {
        self.quotes
            .get(market_id)
            .map_or(QuotePhase::NoQuote, |q| q.phase)
    }

    fn needs_refresh(&self, quote: &QuoteState, mid: Decimal, now: DateTime<Utc>) -> bool {
        let interval = chrono::Duration::seconds(self.config.refresh_interval_secs as i64);
        now - quote.quoted_at >= interval || (mid - quote.mid).abs() > self.config.drift_threshold
    }

    /// Bid and ask for the long outcome, or `None` when they would cross
    ///
    /// `net_long` is long minus short contracts; a net short position leans
    /// the quotes up.
    pub fn quote_prices(&self, market: &MarketState, mid: Decimal, net_long: Decimal) -> Option<(Decimal, Decimal)> {
        let half = self.config.spread / Decimal::TWO;
        let ratio = if self.config.max_inventory > Decimal::ZERO {
            (net_long / self.config.max_inventory).clamp(-Decimal::ONE, Decimal::ONE)
        } else {
            Decimal::ZERO
        };
        let skew = ratio * self.config.inventory_skew_factor * half;

        let mut bid = (mid - half - skew)
            .round_dp_with_strategy(2, RoundingStrategy::ToNegativeInfinity)
            .max(MIN_PRICE)
            .min(MAX_PRICE);
        let mut ask = (mid + half - skew)
            .round_dp_with_strategy(2, RoundingStrategy::ToPositiveInfinity)
            .max(MIN_PRICE)
            .min(MAX_PRICE);

        if self.config.maker_only {
            if let Some(best_ask) = market.best_ask(Side::Long) {
                bid = bid.min(best_ask - TICK);
            }
            if let Some(best_bid) = market.best_bid(Side::Long) {
                ask = ask.max(best_bid + TICK);
            }
        }

        if bid < MIN_PRICE || ask > MAX_PRICE || bid >= ask {
            return None;
        }
        Some((bid, ask))
    }

    fn quote_signals(&self, market: &MarketState, mid: Decimal, long_held: Decimal, short_held: Decimal) -> Vec<Signal> {
        let Some((bid, ask)) = self.quote_prices(market, mid, long_held - short_held) else {
            debug!(market = %market.market_id, %mid, "No valid quote");
            return Vec::new();
        };
        let id = &market.market_id;
        let size = self.config.order_size;

        let bid_qty = contracts_for(size, bid).max(Decimal::ONE);
        let bid_signal = Signal::new(id, SignalAction::BuyLong, bid, bid_qty, StrategyId::MarketMaker)
            .with_reason(format!("quote bid around {}", mid));

        let ask_qty = contracts_for(size, ask).max(Decimal::ONE);
        let ask_signal = if long_held >= ask_qty {
            Signal::new(id, SignalAction::SellLong, ask, ask_qty, StrategyId::MarketMaker)
                .reduce_only()
                .with_reason(format!("quote ask around {}", mid))
        } else {
            // Offering long at `ask` is bidding short at its complement
            let short_price = Decimal::ONE - ask;
            Signal::new(
                id,
                SignalAction::BuyShort,
                short_price,
                contracts_for(size, short_price).max(Decimal::ONE),
                StrategyId::MarketMaker,
            )
            .with_reason(format!("quote ask around {}", mid))
        };
        vec![bid_signal, ask_signal]
    }

    /// Stop-loss and inventory-ceiling exits for any held side
    fn exits(&self, market: &MarketState, ctx: &StrategyContext<'_>) -> Vec<Signal> {
        let mut exits = Vec::new();
        for side in [Side::Long, Side::Short] {
            let Some(position) = ctx.state.get_position(&market.market_id, side) else {
                continue;
            };
            let Some(bid) = market.best_bid(side) else {
                continue;
            };

            let stop = position.avg_price * (Decimal::ONE - self.config.stop_loss_pct);
            let (quantity, reason) = if position.avg_price > Decimal::ZERO && bid <= stop {
                (
                    position.quantity,
                    format!("stop loss: bid {} vs entry {}", bid, position.avg_price),
                )
            } else if position.quantity >= self.config.max_inventory {
                let target = (self.config.max_inventory / Decimal::TWO).floor();
                (
                    position.quantity - target,
                    format!("inventory {} at ceiling {}", position.quantity, self.config.max_inventory),
                )
            } else {
                continue;
            };

            exits.push(
                Signal::new(&market.market_id, SignalAction::sell(side), bid, quantity, StrategyId::MarketMaker)
                    .with_urgency(Urgency::High)
                    .reduce_only()
                    .with_reason(reason),
            );
        }
        exits
    }
}

impl Strategy for MarketMaker {
    fn id(&self) -> StrategyId {
        StrategyId::MarketMaker
    }

    fn on_market_update(&mut self, market: &MarketState, ctx: &StrategyContext<'_>) -> Vec<Signal> {
        if !self.config.enabled {
            return Vec::new();
        }
        let id = market.market_id.clone();
        let phase = self.phase(&id);

        let exits = self.exits(market, ctx);
        if !exits.is_empty() {
            let mut signals = Vec::new();
            if let Some(quote) = self.quotes.get_mut(&id) {
                if quote.phase == QuotePhase::Quoted {
                    signals.push(
                        Signal::cancel_all(&id, StrategyId::MarketMaker)
                            .with_urgency(Urgency::High)
                            .with_reason("pulling quotes to reduce inventory"),
                    );
                }
                quote.phase = QuotePhase::NoQuote;
            }
            signals.extend(exits);
            return signals;
        }

        let mid = ctx
            .state
            .get_book(&id)
            .and_then(|book| book.long.depth_weighted_mid())
            .or_else(|| market.long_mid());
        let Some(mid) = mid else {
            return Vec::new();
        };

        let long_held = ctx.position_quantity(&id, Side::Long);
        let short_held = ctx.position_quantity(&id, Side::Short);
        let mut signals = Vec::new();
        let next = match phase {
            QuotePhase::NoQuote | QuotePhase::Refreshing => {
                signals.extend(self.quote_signals(market, mid, long_held, short_held));
                if signals.is_empty() {
                    phase
                } else {
                    QuotePhase::Quoted
                }
            }
            QuotePhase::Quoted => {
                let stale = self
                    .quotes
                    .get(&id)
                    .map_or(true, |q| self.needs_refresh(q, mid, ctx.now));
                if !stale {
                    return Vec::new();
                }
                signals.push(Signal::cancel_all(&id, StrategyId::MarketMaker).with_reason("requote"));
                let quotes = self.quote_signals(market, mid, long_held, short_held);
                let next = if quotes.is_empty() {
                    QuotePhase::Refreshing
                } else {
                    QuotePhase::Quoted
                };
                signals.extend(quotes);
                next
            }
        };

        let state = self.quotes.entry(id).or_insert(QuoteState {
            phase: QuotePhase::NoQuote,
            mid,
            quoted_at: ctx.now,
        });
        state.phase = next;
        if next == QuotePhase::Quoted {
            state.mid = mid;
            state.quoted_at = ctx.now;
        }
        signals
    }
}
