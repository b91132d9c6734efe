//! Level-3 order book for a single instrument.
//!
//! The order index is the only place an order's size lives. Each price level
//! keeps the ids resting at its price plus their aggregated size, and both are
//! changed only through [`Book::insert`], [`Book::remove`] and
//! [`Book::resize`], so the index and the levels never disagree once a call
//! to [`Book::apply`] returns.
//!
//! Feed anomalies are tolerated rather than rejected:
//! - an Add for another instrument is dropped,
//! - an Add (or Replace target) onto an id that is still active overwrites it,
//! - a reduction, delete or replace for an unknown id is a no-op.
//!
//! Each of those is counted in [`BookStats`].
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::InvariantViolation;
use crate::message::{AddOrder, Message, Replace, Symbol};

pub type OrderId = u64;

/// Price in ticks of 1/10000.
pub type Price = u32;

/// Ticks per whole price unit.
pub const PRICE_SCALE: u32 = 10_000;

/// Render ticks as a fixed 4-decimal string, e.g. `1015000` -> `101.5000`.
pub fn format_price(p: Price) -> String {
    format!("{}.{:04}", p / PRICE_SCALE, p % PRICE_SCALE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub price: Price,
    pub size: u32,
    pub side: Side,
}

#[derive(Debug, Default, Clone)]
struct PriceLevel {
    orders: HashSet<OrderId>,
    total: u64,
}

/// Counters for tolerated feed anomalies and message kinds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookStats {
    pub adds: u64,
    pub filtered_adds: u64,
    pub duplicate_adds: u64,
    pub reduces: u64,
    pub deletes: u64,
    pub replaces: u64,
    pub unknown_refs: u64,
    pub zero_size: u64,
    pub ignored: u64,
}

/// What a single event did to the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Added,
    Reduced { remaining: u32 },
    Removed,
    Replaced,
    /// Add for a different instrument.
    Filtered,
    /// Reference to an id that is not resting.
    UnknownOrder,
    /// Add or Replace carrying zero shares; no order was created.
    ZeroSize,
    Ignored,
}

#[derive(Debug)]
pub struct Book {
    symbol: Symbol,
    orders: HashMap<OrderId, Order>,
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    stats: BookStats,
}

impl Book {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            orders: HashMap::new(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            stats: BookStats::default(),
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn stats(&self) -> BookStats {
        self.stats
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).copied()
    }

    /// Number of resting orders.
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn level_count(&self, side: Side) -> usize {
        self.levels(side).len()
    }

    pub fn best_bid(&self) -> Option<(Price, u64)> {
        self.bids.iter().next_back().map(|(&p, l)| (p, l.total))
    }

    pub fn best_ask(&self) -> Option<(Price, u64)> {
        self.asks.iter().next().map(|(&p, l)| (p, l.total))
    }

    /// Aggregated size at one price, if the level exists.
    pub fn level_size(&self, side: Side, price: Price) -> Option<u64> {
        self.levels(side).get(&price).map(|l| l.total)
    }

    /// Sum of all level aggregates on one side.
    pub fn total_size(&self, side: Side) -> u64 {
        self.levels(side).values().map(|l| l.total).sum()
    }

    /// Bid levels, best (highest) first.
    pub fn bid_levels(&self) -> impl Iterator<Item = (Price, u64)> + '_ {
        self.bids.iter().rev().map(|(&p, l)| (p, l.total))
    }

    /// Ask levels, best (lowest) first.
    pub fn ask_levels(&self) -> impl Iterator<Item = (Price, u64)> + '_ {
        self.asks.iter().map(|(&p, l)| (p, l.total))
    }

    pub fn apply(&mut self, msg: &Message) -> Applied {
        match msg {
            Message::Add(a) => self.on_add(a),
            Message::Reduce(r) => {
                self.stats.reduces += 1;
                self.reduce(r.order_id, r.qty)
            }
            Message::Delete(d) => {
                self.stats.deletes += 1;
                match self.remove(d.order_id) {
                    Some(_) => Applied::Removed,
                    None => self.unknown(d.order_id),
                }
            }
            Message::Replace(u) => self.on_replace(u),
            Message::Ignored { .. } => {
                self.stats.ignored += 1;
                Applied::Ignored
            }
        }
    }

    fn on_add(&mut self, a: &AddOrder) -> Applied {
        if !self.symbol.matches(&a.stock) {
            self.stats.filtered_adds += 1;
            return Applied::Filtered;
        }
        self.stats.adds += 1;
        let order = Order {
            price: a.price,
            size: a.shares,
            side: a.side,
        };
        if self.place(a.order_id, order) {
            Applied::Added
        } else {
            Applied::ZeroSize
        }
    }

    fn on_replace(&mut self, u: &Replace) -> Applied {
        self.stats.replaces += 1;
        let Some(old) = self.remove(u.old_order_id) else {
            return self.unknown(u.old_order_id);
        };
        let order = Order {
            size: u.shares,
            ..old
        };
        if self.place(u.new_order_id, order) {
            Applied::Replaced
        } else {
            Applied::ZeroSize
        }
    }

    /// Cancel or execute `qty` shares of `id`.
    fn reduce(&mut self, id: OrderId, qty: u32) -> Applied {
        let Some(order) = self.orders.get(&id).copied() else {
            return self.unknown(id);
        };
        let remaining = i64::from(order.size) - i64::from(qty);
        if remaining <= 0 {
            self.remove(id);
            Applied::Removed
        } else {
            let remaining = remaining as u32;
            self.resize(id, remaining);
            Applied::Reduced { remaining }
        }
    }

    fn unknown(&mut self, id: OrderId) -> Applied {
        self.stats.unknown_refs += 1;
        debug!(order_id = id, "reference to unknown order ignored");
        Applied::UnknownOrder
    }

    /// Rest `order` under `id`, overwriting any active order with that id.
    /// Returns false when the order has no size and was not created.
    fn place(&mut self, id: OrderId, order: Order) -> bool {
        if let Some(prev) = self.remove(id) {
            self.stats.duplicate_adds += 1;
            debug!(
                order_id = id,
                prev_price = prev.price,
                prev_size = prev.size,
                "add for active order id; previous order overwritten"
            );
        }
        if order.size == 0 {
            self.stats.zero_size += 1;
            debug!(order_id = id, "zero-size order not rested");
            return false;
        }
        self.insert(id, order);
        true
    }

    fn levels(&self, side: Side) -> &BTreeMap<Price, PriceLevel> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn levels_mut(&mut self, side: Side) -> &mut BTreeMap<Price, PriceLevel> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    // Caller guarantees `id` is absent and `order.size > 0`.
    fn insert(&mut self, id: OrderId, order: Order) {
        let level = self.levels_mut(order.side).entry(order.price).or_default();
        level.orders.insert(id);
        level.total += u64::from(order.size);
        self.orders.insert(id, order);
    }

    fn remove(&mut self, id: OrderId) -> Option<Order> {
        let order = self.orders.remove(&id)?;
        let levels = self.levels_mut(order.side);
        if let Some(level) = levels.get_mut(&order.price) {
            level.orders.remove(&id);
            level.total -= u64::from(order.size);
            if level.orders.is_empty() {
                levels.remove(&order.price);
            }
        }
        Some(order)
    }

    // Caller guarantees `id` is present and `size > 0`.
    fn resize(&mut self, id: OrderId, size: u32) {
        let Some(order) = self.orders.get_mut(&id) else {
            return;
        };
        let old = std::mem::replace(&mut order.size, size);
        let (side, price) = (order.side, order.price);
        if let Some(level) = self.levels_mut(side).get_mut(&price) {
            level.total = level.total - u64::from(old) + u64::from(size);
        }
    }

    /// Verify that the order index and both sides agree.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for (&order_id, o) in &self.orders {
            if o.size == 0 {
                return Err(InvariantViolation::ZeroSize(order_id));
            }
            let listed = self
                .levels(o.side)
                .get(&o.price)
                .is_some_and(|l| l.orders.contains(&order_id));
            if !listed {
                return Err(InvariantViolation::MissingFromLevel {
                    order_id,
                    side: o.side,
                    price: o.price,
                });
            }
        }

        for side in [Side::Bid, Side::Ask] {
            for (&price, level) in self.levels(side) {
                if level.orders.is_empty() {
                    return Err(InvariantViolation::EmptyLevel { side, price });
                }
                let mut actual = 0u64;
                for &order_id in &level.orders {
                    match self.orders.get(&order_id) {
                        Some(o) if o.side == side && o.price == price => {
                            actual += u64::from(o.size);
                        }
                        _ => {
                            return Err(InvariantViolation::StrayInLevel {
                                order_id,
                                side,
                                price,
                            });
                        }
                    }
                }
                if actual != level.total {
                    return Err(InvariantViolation::LevelTotal {
                        side,
                        price,
                        cached: level.total,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }
}
