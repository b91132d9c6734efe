use itch_book::book::{Book, Side};
use itch_book::message::{AddOrder, Delete, Message, Reduce, ReduceKind, Replace, Symbol};
use proptest::prelude::*;

proptest! {
    #[test]
    fn book_invariants_hold(ops in prop::collection::vec(any_msg(), 1..2000)) {
        let mut b = Book::new(Symbol::new("AAPL").unwrap());
        for op in &ops {
            b.apply(op);
            prop_assert!(b.check_invariants().is_ok(), "{:?}", b.check_invariants());
        }
    }

    #[test]
    fn sides_conserve_order_sizes(ops in prop::collection::vec(any_msg(), 1..2000)) {
        let mut b = Book::new(Symbol::new("AAPL").unwrap());
        let mut ids = std::collections::HashSet::new();
        for op in &ops {
            b.apply(op);
            match op {
                Message::Add(a) => { ids.insert(a.order_id); }
                Message::Replace(u) => { ids.insert(u.new_order_id); }
                _ => {}
            }
        }
        for side in [Side::Bid, Side::Ask] {
            let from_orders: u64 = ids
                .iter()
                .filter_map(|&id| b.order(id))
                .filter(|o| o.side == side)
                .map(|o| u64::from(o.size))
                .sum();
            prop_assert_eq!(b.total_size(side), from_orders);
        }
    }

    #[test]
    fn snapshots_are_strictly_ordered(
        ops in prop::collection::vec(any_msg(), 1..2000),
        depth in 1usize..20,
    ) {
        let mut b = Book::new(Symbol::new("AAPL").unwrap());
        for op in &ops {
            b.apply(op);
        }
        let s = b.snapshot(0, depth);
        prop_assert!(s.bids.len() <= depth && s.asks.len() <= depth);
        prop_assert_eq!(s.bids.len(), depth.min(b.level_count(Side::Bid)));
        prop_assert_eq!(s.asks.len(), depth.min(b.level_count(Side::Ask)));
        prop_assert!(s.bids.windows(2).all(|w| w[0].price > w[1].price));
        prop_assert!(s.asks.windows(2).all(|w| w[0].price < w[1].price));
        prop_assert!(s.bids.iter().chain(&s.asks).all(|l| l.size > 0));
    }

    #[test]
    fn repeated_delete_changes_nothing(
        ops in prop::collection::vec(any_msg(), 1..500),
        oid in 1u64..200,
    ) {
        let mut b = Book::new(Symbol::new("AAPL").unwrap());
        for op in &ops {
            b.apply(op);
        }
        let del = Message::Delete(Delete { timestamp: 0, order_id: oid });
        b.apply(&del);
        let before = (b.len(), b.total_size(Side::Bid), b.total_size(Side::Ask));
        b.apply(&del);
        prop_assert_eq!(before, (b.len(), b.total_size(Side::Bid), b.total_size(Side::Ask)));
        prop_assert!(b.check_invariants().is_ok());
    }
}

fn any_msg() -> impl Strategy<Value = Message> {
    prop_oneof![
        4 => (any_side(), 1u64..200, 990_000u32..1_010_000, 0u32..500, any_stock())
            .prop_map(|(side, order_id, price, shares, stock)| Message::Add(AddOrder {
                timestamp: 0, order_id, side, stock, shares, price: price / 100 * 100,
            })),
        2 => (1u64..200, 1u32..600, any::<bool>())
            .prop_map(|(order_id, qty, exec)| Message::Reduce(Reduce {
                kind: if exec { ReduceKind::Executed } else { ReduceKind::Cancelled },
                timestamp: 0, order_id, qty,
            })),
        1 => (1u64..200).prop_map(|order_id| Message::Delete(Delete { timestamp: 0, order_id })),
        1 => (1u64..200, 1u64..200, 0u32..500)
            .prop_map(|(old_order_id, new_order_id, shares)| Message::Replace(Replace {
                timestamp: 0, old_order_id, new_order_id, shares,
            })),
        1 => Just(Message::Ignored { tag: b'S' }),
    ]
}

fn any_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Bid), Just(Side::Ask)]
}

fn any_stock() -> impl Strategy<Value = [u8; 8]> {
    prop_oneof![9 => Just(*b"AAPL    "), 1 => Just(*b"MSFT    ")]
}
