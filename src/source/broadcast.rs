//! Broadcast source: ownership, producer startup, and subscriptions

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::config::SourceConfig;
use crate::dispatch::MessageLoop;
use crate::error::SourceError;

use super::reader::StreamReader;
use super::state::{Cursor, Shared};
use super::writer::StreamWriter;

/// Snapshot of a source's buffer state
#[derive(Debug, Clone)]
pub struct SourceStats {
    /// Absolute offset of the oldest resident byte
    pub buffer_offset: u64,
    /// Valid bytes currently buffered
    pub buffer_used: usize,
    /// Attached readers
    pub reader_count: usize,
    /// Whether the stream has ended
    pub stream_end: bool,
}

/// Owner of one shared live byte stream
///
/// Exactly one producer fills the buffer: either a background task pulling
/// from an [`AsyncRead`] upstream, or an external engine pushing through the
/// [`StreamWriter`] returned by [`BroadcastSource::push`]. Any number of
/// [`StreamReader`]s drain it independently, each at its own pace.
///
/// Dropping the source ends the stream: every waiter wakes, readers drain
/// what is buffered and then observe end-of-stream. The pull task exits on
/// the same wakeup; [`shutdown`](Self::shutdown) additionally awaits it.
pub struct BroadcastSource {
    shared: Arc<Shared>,
    pull_task: Option<JoinHandle<()>>,
}

impl BroadcastSource {
    /// Create a pull-mode source draining `input` from a background task
    ///
    /// The task reads one block per iteration into free buffer space,
    /// performing the upstream I/O with the lock released so a slow source
    /// never stalls readers. Upstream end or a read error both end the
    /// stream; readers see a clean end-of-stream either way.
    pub fn pull<R>(input: R, config: SourceConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared::new(config));
        let task = tokio::spawn(pull_loop(Arc::clone(&shared), input));

        Self {
            shared,
            pull_task: Some(task),
        }
    }

    /// Create a push-mode source fed through the returned writer
    ///
    /// The writer is the single producer handle; there is no producer task.
    pub fn push(config: SourceConfig) -> (Self, StreamWriter) {
        let shared = Arc::new(Shared::new(config));
        let writer = StreamWriter::new(Arc::clone(&shared));

        (
            Self {
                shared,
                pull_task: None,
            },
            writer,
        )
    }

    /// Attach a new reader at stream offset 0
    ///
    /// Succeeds only while no byte has been evicted yet, which guarantees
    /// every attached reader observes the identical stream from the first
    /// byte. Once eviction has begun the caller must start its own
    /// independent stream instead.
    pub fn attach(&self) -> Result<StreamReader, SourceError> {
        let mut state = self.shared.lock();

        if state.buffer_offset != 0 {
            tracing::debug!(
                buffer_offset = state.buffer_offset,
                "Attach refused after eviction"
            );
            return Err(SourceError::AttachAfterEviction);
        }

        let id = state.next_reader_id;
        state.next_reader_id += 1;
        state.readers.insert(
            id,
            Cursor {
                offset: 0,
                exposed: 0,
                skip: 0,
            },
        );

        tracing::debug!(reader = id, readers = state.readers.len(), "Reader attached");

        Ok(StreamReader::new(Arc::clone(&self.shared), id))
    }

    /// Run `f` on `message_loop` when the source is torn down
    ///
    /// Fires exactly once, after the last handle (owner, writer, readers,
    /// producer task) has released the source.
    pub fn subscribe_close(&self, message_loop: &MessageLoop, f: impl FnOnce() + Send + 'static) {
        let mut state = self.shared.lock();
        state.on_close.push((message_loop.clone(), Box::new(f)));
    }

    /// Run `f` on `message_loop` when late attach stops being possible
    ///
    /// Fires exactly once, at the first eviction or when a reader drains a
    /// finished stream.
    pub fn subscribe_detach(&self, message_loop: &MessageLoop, f: impl FnOnce() + Send + 'static) {
        let mut state = self.shared.lock();
        state.on_detach.push((message_loop.clone(), Box::new(f)));
    }

    /// Snapshot the current buffer state
    pub fn stats(&self) -> SourceStats {
        let state = self.shared.lock();
        SourceStats {
            buffer_offset: state.buffer_offset,
            buffer_used: state.buffer_used,
            reader_count: state.readers.len(),
            stream_end: state.stream_end,
        }
    }

    /// Total stream length, available once the stream has ended
    ///
    /// Only meaningful in retain-all mode, where the whole stream stays
    /// resident; returns `None` otherwise. Waits for the producer to
    /// finish.
    pub async fn total_len(&self) -> Option<u64> {
        if !self.shared.config.retain_all {
            return None;
        }

        loop {
            let notified = self.shared.data.notified();
            {
                let state = self.shared.lock();
                if state.stream_end {
                    return Some(state.window_end());
                }
            }
            notified.await;
        }
    }

    /// End the stream and await the producer task
    pub async fn shutdown(mut self) {
        self.shared.close();
        if let Some(task) = self.pull_task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for BroadcastSource {
    fn drop(&mut self) {
        // Wakes every waiter; the pull task exits on the same signal.
        self.shared.close();
    }
}

/// Producer loop for pull-mode sources
async fn pull_loop<R>(shared: Arc<Shared>, mut input: R)
where
    R: AsyncRead + Unpin,
{
    let block_size = shared.config.block_size;
    let mut scratch = vec![0u8; block_size];

    'produce: loop {
        // Wait until a whole block fits at the write head.
        let (write_pos, span) = loop {
            let notified = shared.space.notified();
            {
                let mut state = shared.lock();
                if state.stream_end {
                    break 'produce;
                }
                if state.buffer_used + block_size <= state.ring.capacity() {
                    let pos = state.window_end();
                    let span = block_size.min(state.ring.contiguous_from(pos));
                    break (pos, span);
                }
                if shared.config.retain_all {
                    state.ring.grow(block_size);
                    continue;
                }
            }
            notified.await;
        };

        // Upstream I/O runs without the lock. The reserved span stays valid:
        // eviction moves buffer_offset and buffer_used together, leaving the
        // write head in place, and nothing else writes.
        match input.read(&mut scratch[..span]).await {
            Ok(0) => break,
            Ok(n) => {
                {
                    let mut state = shared.lock();
                    if state.stream_end {
                        break;
                    }
                    state.ring.write_at(write_pos, &scratch[..n]);
                    state.buffer_used += n;
                }
                shared.data.notify_waiters();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upstream read failed; ending stream");
                break;
            }
        }
    }

    shared.close();
    tracing::debug!("Pull producer finished");
}
