//! Push-mode producer handle

use std::sync::Arc;

use crate::error::SourceError;

use super::state::Shared;

/// The single producer handle of a push-mode [`BroadcastSource`]
///
/// An external engine calls [`write`](Self::write) from its own task
/// whenever it has produced output; there is no producer task of its own.
/// Dropping the writer ends the stream, since no further bytes can ever
/// arrive.
///
/// [`BroadcastSource`]: super::BroadcastSource
pub struct StreamWriter {
    shared: Arc<Shared>,
}

impl StreamWriter {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Buffer `data`, waiting for room as the readers drain
    ///
    /// Writes proceed one contiguous segment at a time and wake the readers
    /// only when the write head crosses a block boundary, so a fast
    /// producer emitting small pieces does not thrash every reader per
    /// call. An empty slice signals end-of-stream, equivalent to
    /// [`finish`](Self::finish).
    ///
    /// The buffer never overwrites a byte the slowest attached reader has
    /// not consumed; if every reader stalls, this call stalls with them
    /// (in retain-all mode the buffer grows by a block instead).
    pub async fn write(&self, data: &[u8]) -> Result<(), SourceError> {
        if data.is_empty() {
            self.finish();
            return Ok(());
        }

        let mut remaining = data;
        while !remaining.is_empty() {
            let notified = self.shared.space.notified();
            let mut signal = false;
            let mut full = false;
            {
                let mut state = self.shared.lock();
                if state.stream_end {
                    return Err(SourceError::Closed);
                }

                if state.buffer_used == state.ring.capacity() {
                    if self.shared.config.retain_all {
                        state.ring.grow(self.shared.config.block_size);
                    } else {
                        full = true;
                    }
                }

                if !full {
                    let pos = state.window_end();
                    let room = state.ring.capacity() - state.buffer_used;
                    let take = remaining.len().min(room);
                    let written = state.ring.write_at(pos, &remaining[..take]);
                    state.buffer_used += written;
                    remaining = &remaining[written..];

                    if state.window_end() >= state.next_signal {
                        let block = self.shared.config.block_size as u64;
                        state.next_signal = (state.window_end() / block + 1) * block;
                        signal = true;
                    }
                }
            }

            if signal {
                self.shared.data.notify_waiters();
            }
            if full {
                notified.await;
            }
        }

        Ok(())
    }

    /// End the stream and wake every waiter
    pub fn finish(&self) {
        self.shared.close();
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        self.shared.close();
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SourceConfig;
    use crate::source::BroadcastSource;

    use super::*;

    fn small_source() -> (BroadcastSource, StreamWriter) {
        BroadcastSource::push(SourceConfig::new().block_size(4).block_count(2))
    }

    #[tokio::test]
    async fn write_after_finish_is_refused() {
        let (_source, writer) = small_source();
        writer.finish();
        assert_eq!(writer.write(b"ABCD").await, Err(SourceError::Closed));
    }

    #[tokio::test]
    async fn empty_write_ends_the_stream() {
        let (source, writer) = small_source();
        writer.write(&[]).await.unwrap();
        assert!(source.stats().stream_end);
    }

    #[tokio::test]
    async fn dropping_writer_ends_the_stream() {
        let (source, writer) = small_source();
        let mut reader = source.attach().unwrap();

        writer.write(b"ABCD").await.unwrap();
        drop(writer);

        assert_eq!(reader.read().await.unwrap().as_ref(), b"ABCD");
        assert_eq!(reader.read().await, None);
    }

    #[tokio::test]
    async fn write_wraps_around_the_buffer() {
        let (source, writer) = small_source();
        let mut reader = source.attach().unwrap();

        writer.write(b"ABCDEF").await.unwrap();
        assert_eq!(reader.read().await.unwrap().as_ref(), b"ABCD");

        // Offset 6..8 is the physical tail; the rest wraps to the front.
        // The first four bytes are still unread, so eviction has not
        // happened and the wrapped write must land after them.
        writer.write(b"GH").await.unwrap();
        writer.finish();
        assert_eq!(source.stats().buffer_offset, 0);

        assert_eq!(reader.read().await.unwrap().as_ref(), b"EFGH");
        assert_eq!(reader.read().await, None);
    }

    #[tokio::test]
    async fn single_oversized_write_completes_as_readers_drain() {
        let (source, writer) = small_source();
        let reader = source.attach().unwrap();

        let producer = tokio::spawn(async move {
            let data: Vec<u8> = (0..32u8).collect();
            writer.write(&data).await.unwrap();
            writer.finish();
        });

        let mut reader = reader;
        let mut out = Vec::new();
        while let Some(chunk) = reader.read().await {
            out.extend_from_slice(&chunk);
        }

        producer.await.unwrap();
        assert_eq!(out, (0..32u8).collect::<Vec<u8>>());
    }
}
