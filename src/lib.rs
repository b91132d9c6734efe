//! Order book replayer library.
//!
//! Rebuilds the Level-2 book of one instrument from a length-prefixed
//! ITCH-style message file and takes depth snapshots along the way:
//!
//! - `framer`: splits the input into `[u16 BE length][payload]` frames
//! - `message`: decodes payloads into typed add/reduce/delete/replace events
//! - `book`: order index plus per-side price levels, kept consistent per event
//! - `snapshot`: top-N levels per side, copied out by value; CSV row shape
//! - `replay`: ties the above together under a snapshot trigger policy
//! - `sink` / `record`: where snapshots go (memory, CSV, CRC-framed capture)
//!
//! The `itch_book` binary drives a replay from the command line and the
//! `player` tool reads captures back.
pub mod book;
pub mod error;
pub mod framer;
pub mod message;
pub mod record;
pub mod replay;
pub mod sink;
pub mod snapshot;
