//! Broadcast source: one producer, many independent readers
//!
//! One live byte stream (typically the output of an expensive transcode) is
//! buffered once and drained by any number of readers, each at its own
//! pace, inside a bounded retention window.
//!
//! ```text
//!       pull task ──┐                       ┌── StreamReader ── HTTP client
//!                   ├──► BroadcastSource ───┼── StreamReader ── HTTP client
//!   StreamWriter ───┘    (ring + offsets)   └── StreamReader ── HTTP client
//! ```
//!
//! The buffer is addressed by absolute stream offsets. Readers that attach
//! before the first eviction all observe the identical stream from byte 0;
//! once the slowest reader lets retention advance, late attach is refused
//! and the caller starts an independent stream instead. The producer never
//! overwrites unread bytes, which bounds memory at `block_size *
//! block_count` at the cost of stalling behind a stalled reader.

pub mod broadcast;
pub mod reader;
pub mod writer;

pub(crate) mod state;

pub use broadcast::{BroadcastSource, SourceStats};
pub use reader::StreamReader;
pub use writer::StreamWriter;
