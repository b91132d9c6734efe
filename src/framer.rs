//! Length-prefixed framing: `[u16 big-endian length][payload]`, repeated.
//!
//! The stream ends cleanly when the input runs out exactly at a length
//! header, when a header declares zero bytes, or when a header is followed by
//! no payload bytes at all. A header followed by some, but fewer than the
//! declared, bytes is a [`FrameError::Truncated`]. After either outcome the
//! framer is exhausted; to re-read, build a new one over a fresh reader.
use std::io::{ErrorKind, Read};

use crate::error::FrameError;

pub struct Framer<R> {
    rdr: R,
    buf: Vec<u8>,
    offset: u64,
    frames: u64,
    done: bool,
}

impl<R: Read> Framer<R> {
    pub fn new(rdr: R) -> Self {
        Self {
            rdr,
            buf: Vec::with_capacity(u16::MAX as usize),
            offset: 0,
            frames: 0,
            done: false,
        }
    }

    /// Number of payloads yielded so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Bytes consumed from the underlying reader so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next payload into the internal buffer and borrow it.
    ///
    /// Returns `Ok(None)` on clean end of stream.
    pub fn next_frame(&mut self) -> Result<Option<&[u8]>, FrameError> {
        if self.done {
            return Ok(None);
        }
        match self.fill_next() {
            Ok(true) => Ok(Some(&self.buf)),
            Ok(false) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    fn fill_next(&mut self) -> Result<bool, FrameError> {
        let start = self.offset;
        let mut header = [0u8; 2];
        let n = read_full(&mut self.rdr, &mut header)?;
        self.offset += n as u64;
        match n {
            0 => return Ok(false),
            1 => return Err(FrameError::TruncatedHeader { offset: start }),
            _ => {}
        }

        let declared = u16::from_be_bytes(header) as usize;
        if declared == 0 {
            return Ok(false);
        }

        self.buf.resize(declared, 0);
        let got = read_full(&mut self.rdr, &mut self.buf)?;
        self.offset += got as u64;
        if got == 0 {
            return Ok(false);
        }
        if got < declared {
            return Err(FrameError::Truncated {
                offset: start,
                declared,
                available: got,
            });
        }
        self.frames += 1;
        Ok(true)
    }
}

impl<R: Read> Iterator for Framer<R> {
    type Item = Result<Vec<u8>, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().map(|f| f.map(<[u8]>::to_vec)).transpose()
    }
}

/// Like `read_exact`, but reports how many bytes were read before EOF
/// instead of failing.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Append one framed payload to `out`. Used to build feeds in tests and tools.
///
/// Payloads longer than `u16::MAX` cannot be framed and are truncated to the
/// declared maximum.
pub fn write_frame(out: &mut Vec<u8>, payload: &[u8]) {
    let len = payload.len().min(u16::MAX as usize);
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out.extend_from_slice(&payload[..len]);
}
