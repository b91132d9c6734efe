//! Error types shared by the framer, decoder, book and capture modules.
use thiserror::Error;

use crate::book::{OrderId, Price, Side};

/// Failure while splitting the input into length-prefixed frames.
///
/// Any framing error is fatal to the stream: the framer stops yielding.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("truncated length header at byte {offset}")]
    TruncatedHeader { offset: u64 },

    #[error("truncated frame at byte {offset}: declared {declared} bytes, got {available}")]
    Truncated {
        offset: u64,
        declared: usize,
        available: usize,
    },

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A payload that could not be interpreted. The message is dropped and the
/// stream continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("short '{tag}' payload: need {need} bytes, got {got}")]
    Short { tag: char, need: usize, got: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("symbol is empty")]
    Empty,

    #[error("symbol {0:?} is longer than 8 bytes")]
    TooLong(String),
}

/// Broken relation between the order index and the price levels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("order {order_id} has no entry in {side:?} level {price}")]
    MissingFromLevel {
        order_id: OrderId,
        side: Side,
        price: Price,
    },

    #[error("{side:?} level {price} lists order {order_id} which is not indexed there")]
    StrayInLevel {
        order_id: OrderId,
        side: Side,
        price: Price,
    },

    #[error("{side:?} level {price} is empty")]
    EmptyLevel { side: Side, price: Price },

    #[error("order {0} has zero size")]
    ZeroSize(OrderId),

    #[error("{side:?} level {price} aggregates {cached} but its orders sum to {actual}")]
    LevelTotal {
        side: Side,
        price: Price,
        cached: u64,
        actual: u64,
    },
}

/// Failure while reading or writing a snapshot capture file.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("capture i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("CRC mismatch at frame {frame}: file={file:#x}, calc={calc:#x}")]
    CrcMismatch { frame: usize, file: u32, calc: u32 },

    #[error("frame {frame} declares {len} bytes, more than a capture frame may hold")]
    FrameTooLarge { frame: usize, len: usize },

    #[error("bincode: {0}")]
    Codec(#[from] bincode::Error),
}

/// Failure that ends a replay early.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The input broke off mid-frame. The book as of the last good frame was
    /// still pushed to the sink, so `snapshots` includes the final one.
    #[error("{source} ({snapshots} snapshots written)")]
    Frame {
        #[source]
        source: FrameError,
        snapshots: u64,
    },

    #[error("snapshot sink: {0}")]
    Sink(#[from] RecordError),
}
