//! Consumer handle: a private cursor into the shared buffer

use std::sync::Arc;

use bytes::Bytes;

use crate::error::SourceError;

use super::state::Shared;

/// A reader's private cursor into a [`BroadcastSource`]
///
/// Obtained from [`BroadcastSource::attach`]; dropping it detaches, which
/// may let retention advance and unblock a stalled producer.
///
/// [`BroadcastSource`]: super::BroadcastSource
/// [`BroadcastSource::attach`]: super::BroadcastSource::attach
pub struct StreamReader {
    shared: Arc<Shared>,
    id: u64,
}

impl StreamReader {
    pub(crate) fn new(shared: Arc<Shared>, id: u64) -> Self {
        Self { shared, id }
    }

    /// Absolute offset of the next byte this reader will receive
    pub fn position(&self) -> u64 {
        let state = self.shared.lock();
        state
            .readers
            .get(&self.id)
            .map_or(0, |cursor| cursor.offset + (cursor.exposed + cursor.skip) as u64)
    }

    /// Receive the next chunk, or `None` at end-of-stream
    ///
    /// Consumes the previously returned chunk, lets retention advance, then
    /// waits until the producer publishes bytes past this cursor or ends
    /// the stream. Chunks are at most one block long and never span the
    /// physical wrap point of the buffer.
    ///
    /// Cancelling the returned future is safe: the previous chunk stays
    /// consumed and no new window is exposed.
    pub async fn read(&mut self) -> Option<Bytes> {
        loop {
            let notified = self.shared.data.notified();
            {
                let mut state = self.shared.lock();

                let cursor = state.readers.get_mut(&self.id)?;
                cursor.offset += cursor.exposed as u64;
                cursor.exposed = 0;
                let offset = cursor.offset;
                let skip = cursor.skip;

                self.shared.recompute_retention(&mut state);

                if state.window_end() > offset {
                    let available = (state.window_end() - offset) as usize;
                    let max = self.shared.config.block_size.min(available);
                    let chunk = Bytes::copy_from_slice(state.ring.slice_at(offset, max));

                    let cursor = state.readers.get_mut(&self.id)?;
                    cursor.exposed = chunk.len();
                    cursor.skip = 0;

                    if chunk.len() > skip {
                        return Some(chunk.slice(skip..));
                    }
                    // The window covered only the skipped head of a seek
                    // target block; consume it and wait for more bytes.
                    continue;
                }

                if state.stream_end {
                    state.fire_on_detach();
                    tracing::trace!(reader = self.id, offset, "End of stream");
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Reposition the cursor within the retained window
    ///
    /// The target must lie inside `[buffer_offset, buffer_offset +
    /// buffer_used]`; the buffer is not a general seekable cache, only the
    /// currently resident range is reachable. The cursor lands on the
    /// enclosing block boundary and the next chunk starts at exactly `pos`.
    pub fn seek(&mut self, pos: u64) -> Result<(), SourceError> {
        let mut state = self.shared.lock();

        let block = self.shared.config.block_size as u64;
        let aligned = pos / block * block;
        if aligned < state.buffer_offset || pos > state.window_end() {
            return Err(SourceError::SeekOutOfWindow { target: pos });
        }

        // The cursor exists for as long as the reader does; only Drop
        // removes it.
        let Some(cursor) = state.readers.get_mut(&self.id) else {
            return Err(SourceError::Closed);
        };
        cursor.offset = aligned;
        cursor.exposed = 0;
        cursor.skip = (pos - aligned) as usize;

        tracing::trace!(reader = self.id, pos, aligned, "Seek");
        Ok(())
    }

    /// Detach from the source
    ///
    /// Equivalent to dropping the reader; provided for call sites where the
    /// detach should be explicit.
    pub fn detach(self) {}
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.readers.remove(&self.id);
        tracing::debug!(reader = self.id, readers = state.readers.len(), "Reader detached");

        // The remaining readers may now allow retention to advance, which
        // also unblocks a producer stalled on this reader.
        self.shared.recompute_retention(&mut state);
    }
}
