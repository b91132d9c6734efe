//! Depth snapshots: the best N levels per side, copied out of the book.
use serde::{Deserialize, Serialize};

use crate::book::{Book, Price, format_price};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub price: Price,
    /// Sum of resting sizes at `price`.
    pub size: u64,
}

/// Top-of-book depth at one instant. Owns its data, so later book mutation
/// does not show through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub ts: u64,
    /// Best (highest) first.
    pub bids: Vec<Level>,
    /// Best (lowest) first.
    pub asks: Vec<Level>,
}

impl Book {
    pub fn snapshot(&self, ts: u64, depth: usize) -> Snapshot {
        Snapshot {
            ts,
            bids: top(self.bid_levels(), depth),
            asks: top(self.ask_levels(), depth),
        }
    }
}

fn top(levels: impl Iterator<Item = (Price, u64)>, depth: usize) -> Vec<Level> {
    levels
        .take(depth)
        .map(|(price, size)| Level { price, size })
        .collect()
}

impl Snapshot {
    /// Column names for `depth` levels:
    /// `ts, bid_p1..bid_pN, bid_s1..bid_sN, ask_p1..ask_pN, ask_s1..ask_sN`.
    pub fn csv_header(depth: usize) -> String {
        let mut cols = Vec::with_capacity(1 + 4 * depth);
        cols.push("ts".to_string());
        for prefix in ["bid_p", "bid_s", "ask_p", "ask_s"] {
            cols.extend((1..=depth).map(|i| format!("{prefix}{i}")));
        }
        cols.join(",")
    }

    /// One CSV row matching [`Snapshot::csv_header`]. Levels the book did not
    /// have are left empty rather than written as zero.
    pub fn csv_row(&self, depth: usize) -> String {
        let mut cols = Vec::with_capacity(1 + 4 * depth);
        cols.push(self.ts.to_string());
        for levels in [&self.bids, &self.asks] {
            let prices = (0..depth).map(|i| levels.get(i).map(|l| format_price(l.price)));
            let sizes = (0..depth).map(|i| levels.get(i).map(|l| l.size.to_string()));
            cols.extend(prices.chain(sizes).map(Option::unwrap_or_default));
        }
        cols.join(",")
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Side;
    use crate::message::{AddOrder, Delete, Message, Symbol};

    fn book_with(orders: &[(u64, Side, Price, u32)]) -> Book {
        let sym = Symbol::new("AAPL").unwrap();
        let mut b = Book::new(sym);
        for &(order_id, side, price, shares) in orders {
            b.apply(&Message::Add(AddOrder {
                timestamp: 0,
                order_id,
                side,
                stock: *sym.code(),
                shares,
                price,
            }));
        }
        b
    }

    #[test]
    fn depth_truncates_to_best_levels() {
        let b = book_with(&[
            (1, Side::Bid, 990_000, 10),
            (2, Side::Bid, 1_000_000, 20),
            (3, Side::Bid, 980_000, 30),
        ]);
        let s = b.snapshot(1, 2);
        assert_eq!(
            s.bids,
            vec![
                Level { price: 1_000_000, size: 20 },
                Level { price: 990_000, size: 10 },
            ]
        );
        assert!(s.asks.is_empty());
    }

    #[test]
    fn sides_are_ordered_best_first() {
        let b = book_with(&[
            (1, Side::Ask, 105, 1),
            (2, Side::Ask, 103, 2),
            (3, Side::Ask, 104, 3),
            (4, Side::Bid, 99, 4),
            (5, Side::Bid, 101, 5),
            (6, Side::Bid, 101, 6),
        ]);
        let s = b.snapshot(7, 10);
        let asks: Vec<Price> = s.asks.iter().map(|l| l.price).collect();
        let bids: Vec<Price> = s.bids.iter().map(|l| l.price).collect();
        assert_eq!(asks, vec![103, 104, 105]);
        assert_eq!(bids, vec![101, 99]);
        assert_eq!(s.best_bid(), Some(Level { price: 101, size: 11 }));
        assert_eq!(s.ts, 7);
    }

    #[test]
    fn snapshot_is_detached_from_book() {
        let mut b = book_with(&[(1, Side::Bid, 100, 5)]);
        let s = b.snapshot(1, 5);
        b.apply(&Message::Delete(Delete { timestamp: 0, order_id: 1 }));
        assert_eq!(s.bids, vec![Level { price: 100, size: 5 }]);
        assert!(b.snapshot(2, 5).bids.is_empty());
    }

    #[test]
    fn csv_shape_leaves_missing_levels_empty() {
        assert_eq!(
            Snapshot::csv_header(2),
            "ts,bid_p1,bid_p2,bid_s1,bid_s2,ask_p1,ask_p2,ask_s1,ask_s2"
        );
        let b = book_with(&[(1, Side::Bid, 1_000_000, 50), (2, Side::Ask, 1_015_000, 70)]);
        let row = b.snapshot(42, 2).csv_row(2);
        assert_eq!(row, "42,100.0000,,50,,101.5000,,70,");
    }

    #[test]
    fn zero_depth_is_empty() {
        let b = book_with(&[(1, Side::Bid, 100, 5)]);
        let s = b.snapshot(0, 0);
        assert!(s.bids.is_empty() && s.asks.is_empty());
        assert_eq!(Snapshot::csv_header(0), "ts");
    }
}
