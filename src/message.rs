//! Message decoder for the ITCH-style add/execute/cancel/delete/replace feed.
//!
//! Every payload starts with a one-byte tag followed by a fixed big-endian
//! layout. The bytes between the tag and the timestamp (stock locate and
//! tracking number on the exchange side) carry nothing the book needs and
//! are skipped.
//!
//! | Tag       | Fields after tag                                                   | Len |
//! |-----------|--------------------------------------------------------------------|-----|
//! | `A` / `F` | opaque(8) ts(4) order_id(8) side(1) stock(8) shares(4) price(4)    | 38  |
//! | `E` / `C` | opaque(8) ts(4) order_id(8) qty(4)                                 | 25  |
//! | `D`       | opaque(8) ts(4) order_id(8)                                        | 21  |
//! | `U`       | opaque(8) ts(4) old_id(8) new_id(8) shares(4)                      | 33  |
//!
//! Trailing bytes past the fixed layout (the MPID on `F`, for example) are
//! ignored. Unknown tags decode to [`Message::Ignored`].
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::book::{OrderId, Price, Side};
use crate::error::{DecodeError, SymbolError};

pub const TAG_ADD: u8 = b'A';
pub const TAG_ADD_MPID: u8 = b'F';
pub const TAG_EXECUTED: u8 = b'E';
pub const TAG_CANCELLED: u8 = b'C';
pub const TAG_DELETE: u8 = b'D';
pub const TAG_REPLACE: u8 = b'U';

const OPAQUE: usize = 8;
const TS_AT: usize = 1 + OPAQUE;
const OID_AT: usize = TS_AT + 4;
const BODY_AT: usize = OID_AT + 8;

pub const ADD_LEN: usize = BODY_AT + 1 + 8 + 4 + 4;
pub const REDUCE_LEN: usize = BODY_AT + 4;
pub const DELETE_LEN: usize = BODY_AT;
pub const REPLACE_LEN: usize = BODY_AT + 8 + 4;

/// 8-byte, space padded instrument code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol([u8; 8]);

impl Symbol {
    pub fn new(name: &str) -> Result<Self, SymbolError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SymbolError::Empty);
        }
        if name.len() > 8 {
            return Err(SymbolError::TooLong(name.to_owned()));
        }
        let mut code = [b' '; 8];
        code[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self(code))
    }

    pub fn code(&self) -> &[u8; 8] {
        &self.0
    }

    /// Compare against a wire code, ignoring surrounding whitespace padding.
    pub fn matches(&self, code: &[u8; 8]) -> bool {
        self.0.trim_ascii() == code.trim_ascii()
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.0.trim_ascii()).unwrap_or("?")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOrder {
    pub timestamp: u32,
    pub order_id: OrderId,
    pub side: Side,
    pub stock: [u8; 8],
    pub shares: u32,
    pub price: Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceKind {
    Executed,
    Cancelled,
}

/// Partial or full size reduction. Executions and cancels affect the book
/// the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reduce {
    pub kind: ReduceKind,
    pub timestamp: u32,
    pub order_id: OrderId,
    pub qty: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delete {
    pub timestamp: u32,
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replace {
    pub timestamp: u32,
    pub old_order_id: OrderId,
    pub new_order_id: OrderId,
    pub shares: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Add(AddOrder),
    Reduce(Reduce),
    Delete(Delete),
    Replace(Replace),
    /// A tag the book does not care about.
    Ignored { tag: u8 },
}

impl Message {
    pub fn timestamp(&self) -> Option<u32> {
        match self {
            Message::Add(m) => Some(m.timestamp),
            Message::Reduce(m) => Some(m.timestamp),
            Message::Delete(m) => Some(m.timestamp),
            Message::Replace(m) => Some(m.timestamp),
            Message::Ignored { .. } => None,
        }
    }
}

pub fn decode(payload: &[u8]) -> Result<Message, DecodeError> {
    let Some(&tag) = payload.first() else {
        return Err(DecodeError::Empty);
    };
    let need = match tag {
        TAG_ADD | TAG_ADD_MPID => ADD_LEN,
        TAG_EXECUTED | TAG_CANCELLED => REDUCE_LEN,
        TAG_DELETE => DELETE_LEN,
        TAG_REPLACE => REPLACE_LEN,
        _ => return Ok(Message::Ignored { tag }),
    };
    if payload.len() < need {
        return Err(DecodeError::Short {
            tag: char::from(tag),
            need,
            got: payload.len(),
        });
    }

    let timestamp = be_u32(payload, TS_AT);
    let order_id = be_u64(payload, OID_AT);
    let msg = match tag {
        TAG_ADD | TAG_ADD_MPID => {
            let o = BODY_AT;
            let side = if payload[o] == b'B' { Side::Bid } else { Side::Ask };
            let mut stock = [0u8; 8];
            stock.copy_from_slice(&payload[o + 1..o + 9]);
            Message::Add(AddOrder {
                timestamp,
                order_id,
                side,
                stock,
                shares: be_u32(payload, o + 9),
                price: be_u32(payload, o + 13),
            })
        }
        TAG_EXECUTED | TAG_CANCELLED => Message::Reduce(Reduce {
            kind: if tag == TAG_EXECUTED {
                ReduceKind::Executed
            } else {
                ReduceKind::Cancelled
            },
            timestamp,
            order_id,
            qty: be_u32(payload, BODY_AT),
        }),
        TAG_DELETE => Message::Delete(Delete { timestamp, order_id }),
        _ => Message::Replace(Replace {
            timestamp,
            old_order_id: order_id,
            new_order_id: be_u64(payload, BODY_AT),
            shares: be_u32(payload, BODY_AT + 8),
        }),
    };
    Ok(msg)
}

// Callers check the payload length against the tag layout first.
#[inline]
fn be_u32(b: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

#[inline]
fn be_u64(b: &[u8], at: usize) -> u64 {
    let mut tmp = [0u8; 8];
    tmp.copy_from_slice(&b[at..at + 8]);
    u64::from_be_bytes(tmp)
}

/// Encoders for the same layouts. The replay tests and fixture tooling build
/// feeds with these; the opaque prefix is written as zeros.
pub mod encode {
    use super::*;

    fn head(tag: u8, timestamp: u32, order_id: OrderId, cap: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(cap);
        out.push(tag);
        out.extend_from_slice(&[0u8; OPAQUE]);
        out.extend_from_slice(&timestamp.to_be_bytes());
        out.extend_from_slice(&order_id.to_be_bytes());
        out
    }

    pub fn add(m: &AddOrder) -> Vec<u8> {
        let mut out = head(TAG_ADD, m.timestamp, m.order_id, ADD_LEN);
        out.push(match m.side {
            Side::Bid => b'B',
            Side::Ask => b'S',
        });
        out.extend_from_slice(&m.stock);
        out.extend_from_slice(&m.shares.to_be_bytes());
        out.extend_from_slice(&m.price.to_be_bytes());
        out
    }

    pub fn reduce(m: &Reduce) -> Vec<u8> {
        let tag = match m.kind {
            ReduceKind::Executed => TAG_EXECUTED,
            ReduceKind::Cancelled => TAG_CANCELLED,
        };
        let mut out = head(tag, m.timestamp, m.order_id, REDUCE_LEN);
        out.extend_from_slice(&m.qty.to_be_bytes());
        out
    }

    pub fn delete(m: &Delete) -> Vec<u8> {
        head(TAG_DELETE, m.timestamp, m.order_id, DELETE_LEN)
    }

    pub fn replace(m: &Replace) -> Vec<u8> {
        let mut out = head(TAG_REPLACE, m.timestamp, m.old_order_id, REPLACE_LEN);
        out.extend_from_slice(&m.new_order_id.to_be_bytes());
        out.extend_from_slice(&m.shares.to_be_bytes());
        out
    }

    pub fn message(m: &Message) -> Vec<u8> {
        match m {
            Message::Add(a) => add(a),
            Message::Reduce(r) => reduce(r),
            Message::Delete(d) => delete(d),
            Message::Replace(r) => replace(r),
            Message::Ignored { tag } => vec![*tag],
        }
    }
}
