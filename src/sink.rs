//! Destinations for snapshots once they leave the replay thread.
//!
//! [`CaptureSink`] hands snapshots to a dedicated writer thread over a bounded
//! channel; the replay loop only blocks when the writer falls behind.
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::debug;

use crate::error::RecordError;
use crate::record::{FileHeader, RecordFrame, write_frame};
use crate::snapshot::Snapshot;

const CHANNEL_CAP: usize = 8192;

pub trait SnapshotSink {
    fn push(&mut self, snap: Snapshot) -> Result<(), RecordError>;

    /// Flush whatever is buffered. Called once after the last push.
    fn finish(&mut self) -> Result<(), RecordError> {
        Ok(())
    }
}

/// Keeps every snapshot in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    pub snapshots: Vec<Snapshot>,
    /// Set once `finish` has been called.
    pub finished: bool,
}

impl SnapshotSink for VecSink {
    fn push(&mut self, snap: Snapshot) -> Result<(), RecordError> {
        self.snapshots.push(snap);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecordError> {
        self.finished = true;
        Ok(())
    }
}

/// Writes snapshots as CSV rows, header first.
pub struct CsvSink<W: Write> {
    w: W,
    depth: usize,
}

impl CsvSink<BufWriter<File>> {
    pub fn create(path: &Path, depth: usize) -> Result<Self, RecordError> {
        let file = create_file(path)?;
        Self::new(BufWriter::new(file), depth)
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(mut w: W, depth: usize) -> Result<Self, RecordError> {
        writeln!(w, "{}", Snapshot::csv_header(depth))?;
        Ok(Self { w, depth })
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

impl<W: Write> SnapshotSink for CsvSink<W> {
    fn push(&mut self, snap: Snapshot) -> Result<(), RecordError> {
        writeln!(self.w, "{}", snap.csv_row(self.depth))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecordError> {
        self.w.flush()?;
        Ok(())
    }
}

/// CRC-framed capture file written from a background thread.
pub struct CaptureSink {
    tx: Option<Sender<Snapshot>>,
    handle: Option<JoinHandle<Result<u64, RecordError>>>,
}

impl CaptureSink {
    pub fn create(path: &Path, header: FileHeader) -> Result<Self, RecordError> {
        let file = create_file(path)?;
        let (tx, rx) = bounded::<Snapshot>(CHANNEL_CAP);
        let handle = thread::Builder::new()
            .name("capture-writer".into())
            .spawn(move || writer_thread(file, header, rx))?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    fn join(&mut self) -> Result<u64, RecordError> {
        self.tx.take();
        match self.handle.take() {
            Some(h) => h
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("capture writer panicked").into())),
            None => Ok(0),
        }
    }
}

impl SnapshotSink for CaptureSink {
    fn push(&mut self, snap: Snapshot) -> Result<(), RecordError> {
        let sent = match &self.tx {
            Some(tx) => tx.send(snap).is_ok(),
            None => false,
        };
        if sent {
            return Ok(());
        }
        // The writer only hangs up on error; report that error.
        self.join()?;
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "capture writer stopped").into())
    }

    fn finish(&mut self) -> Result<(), RecordError> {
        let n = self.join()?;
        debug!(snapshots = n, "capture writer finished");
        Ok(())
    }
}

impl Drop for CaptureSink {
    fn drop(&mut self) {
        let _ = self.join();
    }
}

fn writer_thread(
    file: File,
    header: FileHeader,
    rx: Receiver<Snapshot>,
) -> Result<u64, RecordError> {
    let mut w = BufWriter::with_capacity(1 << 20, file); // 1 MiB buffer
    write_frame(&mut w, &RecordFrame::Header(header))?;
    let mut n = 0u64;
    for snap in rx {
        write_frame(&mut w, &RecordFrame::Snapshot(snap))?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}

fn create_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).write(true).truncate(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CAPTURE_VERSION, CaptureReader};
    use crate::snapshot::Level;

    fn snap(ts: u64) -> Snapshot {
        Snapshot {
            ts,
            bids: vec![Level { price: 100, size: ts }],
            asks: vec![],
        }
    }

    #[test]
    fn csv_sink_writes_header_and_rows() {
        let mut s = CsvSink::new(Vec::new(), 1).unwrap();
        s.push(snap(3)).unwrap();
        s.finish().unwrap();
        let text = String::from_utf8(s.into_inner()).unwrap();
        assert_eq!(text, "ts,bid_p1,bid_s1,ask_p1,ask_s1\n3,0.0100,3,,\n");
    }

    #[test]
    fn capture_sink_round_trips_through_writer_thread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cap.bin");
        let header = FileHeader {
            version: CAPTURE_VERSION,
            created_unix_ns: 0,
            symbol: "AAPL".into(),
            depth: 1,
            source: None,
        };
        let mut sink = CaptureSink::create(&path, header.clone()).unwrap();
        for ts in 0..100 {
            sink.push(snap(ts)).unwrap();
        }
        sink.finish().unwrap();

        let frames: Vec<RecordFrame> = CaptureReader::new(File::open(&path).unwrap())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(frames.len(), 101);
        assert_eq!(frames[0], RecordFrame::Header(header));
        assert_eq!(frames[100], RecordFrame::Snapshot(snap(99)));
    }
}
