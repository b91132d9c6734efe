//! On-disk schema for snapshot captures.
//!
//! A capture is a sequence of frames `[len: u32 LE][crc32: u32 LE][payload]`
//! where the payload is a bincode-encoded [`RecordFrame`]. The first frame is
//! always a [`FileHeader`].
use std::io::{ErrorKind, Read, Write};

use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::snapshot::Snapshot;

pub const CAPTURE_VERSION: u16 = 1;

/// Largest payload a capture frame may declare. A snapshot at any sane depth
/// is a few KiB; anything past this is a corrupt length field.
pub const MAX_FRAME_LEN: usize = 16 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub version: u16,
    pub created_unix_ns: u128,
    pub symbol: String,
    pub depth: u32,
    /// Feed file the snapshots were rebuilt from, if known.
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordFrame {
    Header(FileHeader),
    Snapshot(Snapshot),
}

pub fn write_frame<W: Write>(w: &mut W, frame: &RecordFrame) -> Result<(), RecordError> {
    let payload = bincode::serialize(frame)?;
    let mut hasher = Crc32::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let len = payload.len() as u32;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&crc.to_le_bytes())?;
    w.write_all(&payload)?;
    Ok(())
}

/// Sequential reader that checks every frame's CRC before decoding it.
pub struct CaptureReader<R> {
    rdr: R,
    frames: usize,
    payload: Vec<u8>,
}

impl<R: Read> CaptureReader<R> {
    pub fn new(rdr: R) -> Self {
        Self {
            rdr,
            frames: 0,
            payload: Vec::new(),
        }
    }

    /// Frames successfully read so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Next frame, or `Ok(None)` at end of file.
    pub fn next_frame(&mut self) -> Result<Option<RecordFrame>, RecordError> {
        let len = match read_u32(&mut self.rdr) {
            Ok(v) => v as usize,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if len > MAX_FRAME_LEN {
            return Err(RecordError::FrameTooLarge {
                frame: self.frames,
                len,
            });
        }
        let crc_on_file = read_u32(&mut self.rdr)?;
        self.payload.resize(len, 0);
        self.rdr.read_exact(&mut self.payload)?;

        let mut hasher = Crc32::new();
        hasher.update(&self.payload);
        let crc_calc = hasher.finalize();
        if crc_calc != crc_on_file {
            return Err(RecordError::CrcMismatch {
                frame: self.frames,
                file: crc_on_file,
                calc: crc_calc,
            });
        }
        let frame = bincode::deserialize(&self.payload)?;
        self.frames += 1;
        Ok(Some(frame))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<RecordFrame, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
