//! Single-symbol replay: framer -> decoder -> book, with snapshots taken on
//! the same thread between messages.
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::book::{Applied, Book, BookStats};
use crate::error::{DecodeError, ReplayError, SymbolError};
use crate::framer::Framer;
use crate::message::{Symbol, decode};
use crate::sink::SnapshotSink;
use crate::snapshot::Snapshot;

pub const DEFAULT_DEPTH: usize = 10;

/// When to take snapshots during a replay. Both triggers may be set; a final
/// snapshot is always taken at the end of the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// After every N decoded messages.
    pub every_messages: Option<u64>,
    /// Whenever the feed clock has advanced at least this much since the
    /// previous interval snapshot.
    pub every_ticks: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub symbol: Symbol,
    pub depth: usize,
    pub policy: SnapshotPolicy,
}

impl ReplayConfig {
    pub fn new(symbol: &str) -> Result<Self, SymbolError> {
        Ok(Self {
            symbol: Symbol::new(symbol)?,
            depth: DEFAULT_DEPTH,
            policy: SnapshotPolicy::default(),
        })
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub frames: u64,
    pub decoded: u64,
    pub decode_errors: u64,
    pub snapshots: u64,
    pub interrupted: bool,
    pub stats: BookStats,
}

pub struct Replayer {
    book: Book,
    depth: usize,
    last_ts: u32,
}

impl Replayer {
    pub fn new(symbol: Symbol, depth: usize) -> Self {
        Self {
            book: Book::new(symbol),
            depth,
            last_ts: 0,
        }
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    /// Feed timestamp of the most recent decoded message.
    pub fn last_timestamp(&self) -> u32 {
        self.last_ts
    }

    /// Decode one raw payload and apply it to the book. A decode error leaves
    /// the book untouched.
    pub fn apply_message(&mut self, raw: &[u8]) -> Result<Applied, DecodeError> {
        let msg = decode(raw)?;
        if let Some(ts) = msg.timestamp() {
            self.last_ts = ts;
        }
        Ok(self.book.apply(&msg))
    }

    pub fn take_snapshot(&self, ts: u64) -> Snapshot {
        self.book.snapshot(ts, self.depth)
    }

    /// Replay a whole framed stream into `sink`.
    ///
    /// Undecodable payloads are logged and skipped. A sink failure ends the
    /// replay at once. A framing error ends it too, but only after the final
    /// snapshot is pushed and the sink finished. When `stop` is raised the
    /// loop exits before the next message and still emits the final snapshot.
    pub fn replay<R: Read>(
        &mut self,
        rdr: R,
        policy: SnapshotPolicy,
        sink: &mut dyn SnapshotSink,
        stop: Option<&AtomicBool>,
    ) -> Result<ReplayReport, ReplayError> {
        let mut framer = Framer::new(rdr);
        let mut report = ReplayReport::default();
        let mut anchor: Option<u32> = None;
        let mut broken = None;

        loop {
            if stop.is_some_and(|s| s.load(Ordering::Relaxed)) {
                report.interrupted = true;
                break;
            }
            let payload = match framer.next_frame() {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(e) => {
                    broken = Some(e);
                    break;
                }
            };
            if let Err(e) = self.apply_message(payload) {
                report.decode_errors += 1;
                warn!(
                    frame = framer.frames(),
                    offset = framer.offset(),
                    error = %e,
                    "dropping payload"
                );
                continue;
            }
            report.decoded += 1;

            let mut due = policy.every_messages.is_some_and(|n| n > 0 && report.decoded % n == 0);
            if let Some(interval) = policy.every_ticks {
                match anchor {
                    None => anchor = Some(self.last_ts),
                    Some(a) if self.last_ts.saturating_sub(a) >= interval => {
                        anchor = Some(self.last_ts);
                        due = true;
                    }
                    Some(_) => {}
                }
            }
            if due {
                sink.push(self.take_snapshot(u64::from(self.last_ts)))?;
                report.snapshots += 1;
            }
        }

        sink.push(self.take_snapshot(u64::from(self.last_ts)))?;
        report.snapshots += 1;
        sink.finish()?;

        if let Some(source) = broken {
            error!(
                symbol = %self.book.symbol(),
                frames = framer.frames(),
                snapshots = report.snapshots,
                error = %source,
                "replay aborted"
            );
            return Err(ReplayError::Frame {
                source,
                snapshots: report.snapshots,
            });
        }

        report.frames = framer.frames();
        report.stats = self.book.stats();
        info!(
            symbol = %self.book.symbol(),
            frames = report.frames,
            decoded = report.decoded,
            decode_errors = report.decode_errors,
            snapshots = report.snapshots,
            resting = self.book.len(),
            unknown_refs = report.stats.unknown_refs,
            duplicate_adds = report.stats.duplicate_adds,
            interrupted = report.interrupted,
            "replay finished"
        );
        Ok(report)
    }
}

impl From<&ReplayConfig> for Replayer {
    fn from(cfg: &ReplayConfig) -> Self {
        Self::new(cfg.symbol, cfg.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Side;
    use crate::error::FrameError;
    use crate::framer::write_frame;
    use crate::message::{AddOrder, Message, Reduce, ReduceKind, encode};
    use crate::sink::VecSink;
    use crate::snapshot::Level;
    use std::io::Cursor;

    fn add(ts: u32, id: u64, side: Side, price: u32, shares: u32) -> Vec<u8> {
        encode::message(&Message::Add(AddOrder {
            timestamp: ts,
            order_id: id,
            side,
            stock: *b"AAPL    ",
            shares,
            price,
        }))
    }

    fn exec(ts: u32, id: u64, qty: u32) -> Vec<u8> {
        encode::message(&Message::Reduce(Reduce {
            kind: ReduceKind::Executed,
            timestamp: ts,
            order_id: id,
            qty,
        }))
    }

    fn stream(payloads: &[Vec<u8>]) -> Cursor<Vec<u8>> {
        let mut out = Vec::new();
        for p in payloads {
            write_frame(&mut out, p);
        }
        Cursor::new(out)
    }

    fn replayer() -> Replayer {
        let cfg = ReplayConfig::new("AAPL").unwrap().with_depth(3);
        Replayer::from(&cfg)
    }

    #[test]
    fn apply_message_tracks_feed_clock() {
        let mut r = replayer();
        assert_eq!(r.apply_message(&add(10, 1, Side::Bid, 100, 5)).unwrap(), Applied::Added);
        assert_eq!(r.apply_message(&exec(12, 1, 2)).unwrap(), Applied::Reduced { remaining: 3 });
        assert_eq!(r.last_timestamp(), 12);
        assert!(r.apply_message(&exec(13, 1, 2)[..10]).is_err());
        assert_eq!(r.last_timestamp(), 12);
        let s = r.take_snapshot(99);
        assert_eq!(s.ts, 99);
        assert_eq!(s.bids[0].size, 3);
    }

    #[test]
    fn snapshots_every_n_messages_plus_final() {
        let mut r = replayer();
        let input = stream(&[
            add(1, 1, Side::Bid, 100, 5),
            add(2, 2, Side::Ask, 101, 5),
            exec(3, 1, 5),
            add(4, 3, Side::Bid, 99, 1),
            add(5, 4, Side::Bid, 98, 1),
        ]);
        let mut sink = VecSink::default();
        let policy = SnapshotPolicy { every_messages: Some(2), every_ticks: None };
        let report = r.replay(input, policy, &mut sink, None).unwrap();
        assert_eq!(report.frames, 5);
        assert_eq!(report.decoded, 5);
        assert_eq!(report.snapshots, 3);
        let ts: Vec<u64> = sink.snapshots.iter().map(|s| s.ts).collect();
        assert_eq!(ts, vec![2, 4, 5]);
        assert_eq!(sink.snapshots[1].bids.len(), 1);
        assert_eq!(sink.snapshots[2].bids.len(), 2);
    }

    #[test]
    fn interval_trigger_follows_feed_clock() {
        let mut r = replayer();
        let input = stream(&[
            add(100, 1, Side::Bid, 100, 5),
            add(150, 2, Side::Bid, 101, 5),
            add(200, 3, Side::Bid, 102, 5),
            add(260, 4, Side::Bid, 103, 5),
            add(300, 5, Side::Bid, 104, 5),
        ]);
        let mut sink = VecSink::default();
        let policy = SnapshotPolicy { every_messages: None, every_ticks: Some(100) };
        r.replay(input, policy, &mut sink, None).unwrap();
        let ts: Vec<u64> = sink.snapshots.iter().map(|s| s.ts).collect();
        assert_eq!(ts, vec![200, 300, 300]);
    }

    #[test]
    fn decode_errors_are_skipped() {
        let mut r = replayer();
        let mut short = add(1, 9, Side::Bid, 100, 5);
        short.truncate(20);
        let input = stream(&[short, add(2, 1, Side::Ask, 100, 5), b"S1".to_vec()]);
        let mut sink = VecSink::default();
        let report = r.replay(input, SnapshotPolicy::default(), &mut sink, None).unwrap();
        assert_eq!(report.decode_errors, 1);
        assert_eq!(report.decoded, 2);
        assert_eq!(report.stats.ignored, 1);
        assert_eq!(sink.snapshots.len(), 1);
        assert_eq!(sink.snapshots[0].asks.len(), 1);
        assert!(r.book().order(9).is_none());
    }

    #[test]
    fn framing_error_still_flushes_final_snapshot() {
        let mut r = replayer();
        let mut bytes = stream(&[add(1, 1, Side::Bid, 100, 5)]).into_inner();
        bytes.extend_from_slice(&38u16.to_be_bytes());
        bytes.extend_from_slice(&[b'A', 0]);
        let mut sink = VecSink::default();
        let err = r
            .replay(Cursor::new(bytes), SnapshotPolicy::default(), &mut sink, None)
            .unwrap_err();
        let ReplayError::Frame { source, snapshots } = err else {
            panic!("expected framing error, got {err:?}");
        };
        assert!(matches!(source, FrameError::Truncated { declared: 38, available: 2, .. }));
        assert_eq!(snapshots, 1);
        assert_eq!(r.book().len(), 1);
        assert_eq!(sink.snapshots.len(), 1);
        assert_eq!(sink.snapshots[0].ts, 1);
        assert_eq!(sink.snapshots[0].bids, vec![Level { price: 100, size: 5 }]);
        assert!(sink.finished);
    }

    #[test]
    fn stop_flag_still_emits_final_snapshot() {
        let mut r = replayer();
        let stop = AtomicBool::new(true);
        let mut sink = VecSink::default();
        let input = stream(&[add(1, 1, Side::Bid, 100, 5)]);
        let report = r
            .replay(input, SnapshotPolicy::default(), &mut sink, Some(&stop))
            .unwrap();
        assert!(report.interrupted);
        assert_eq!(report.decoded, 0);
        assert_eq!(sink.snapshots.len(), 1);
    }
}
