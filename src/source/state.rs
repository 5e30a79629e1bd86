//! Shared producer/reader state and retention accounting
//!
//! All offset bookkeeping lives behind one mutex with short critical
//! sections that never span an `.await`. Waiting happens outside the lock
//! on two [`Notify`] instances: `space` wakes the producer when room opens
//! up, `data` wakes readers when bytes arrive or the stream ends. A
//! `Notified` future is always created before the condition is re-checked
//! under the lock, so a wakeup between unlock and await cannot be lost.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::config::SourceConfig;
use crate::dispatch::{MessageLoop, Task};
use crate::ring::RingBuffer;

/// Per-reader cursor, stored centrally so retention can take the minimum
/// over all attached readers under the shared lock
#[derive(Debug)]
pub(crate) struct Cursor {
    /// Absolute offset of the next byte this reader consumes
    pub offset: u64,

    /// Length of the window handed out by the previous read; consumed
    /// (added to `offset`) at the start of the next read
    pub exposed: usize,

    /// Bytes to trim from the front of the next chunk after a seek into
    /// the middle of a block
    pub skip: usize,
}

pub(crate) struct State {
    pub ring: RingBuffer,

    /// Absolute offset of the oldest byte still resident (low-water mark);
    /// monotonically non-decreasing
    pub buffer_offset: u64,

    /// Valid bytes starting at `buffer_offset`
    pub buffer_used: usize,

    /// Set once, on upstream end, producer failure, explicit finish, or
    /// source teardown; never cleared
    pub stream_end: bool,

    pub readers: HashMap<u64, Cursor>,
    pub next_reader_id: u64,

    /// Next block-aligned write-head position at which push-mode writes
    /// wake the readers
    pub next_signal: u64,

    pub on_close: Vec<(MessageLoop, Task)>,
    pub on_detach: Vec<(MessageLoop, Task)>,
}

impl State {
    /// Absolute offset one past the newest valid byte
    pub fn window_end(&self) -> u64 {
        self.buffer_offset + self.buffer_used as u64
    }

    /// Post every pending detach notification; each fires at most once
    pub fn fire_on_detach(&mut self) {
        for (message_loop, task) in self.on_detach.drain(..) {
            message_loop.post_task(task);
        }
    }
}

pub(crate) struct Shared {
    pub config: SourceConfig,
    pub state: Mutex<State>,

    /// Wakes the producer when buffer space frees up
    pub space: Notify,

    /// Wakes readers when data arrives or the stream ends
    pub data: Notify,
}

impl Shared {
    pub fn new(config: SourceConfig) -> Self {
        let capacity = config.capacity();
        let next_signal = config.block_size as u64;

        Self {
            config,
            state: Mutex::new(State {
                ring: RingBuffer::new(capacity),
                buffer_offset: 0,
                buffer_used: 0,
                stream_end: false,
                readers: HashMap::new(),
                next_reader_id: 0,
                next_signal,
                on_close: Vec::new(),
                on_detach: Vec::new(),
            }),
            space: Notify::new(),
            data: Notify::new(),
        }
    }

    /// Lock the state, recovering from a poisoned mutex
    ///
    /// A panicked reader or producer task leaves the offsets consistent
    /// (every mutation is complete before the lock drops), so the data is
    /// still usable by everyone else.
    pub fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark the stream ended and wake every waiter
    pub fn close(&self) {
        {
            let mut state = self.lock();
            if state.stream_end {
                return;
            }
            state.stream_end = true;
            tracing::debug!(
                buffer_offset = state.buffer_offset,
                buffer_used = state.buffer_used,
                readers = state.readers.len(),
                "Stream ended"
            );
        }

        self.space.notify_waiters();
        self.data.notify_waiters();
    }

    /// Advance the low-water mark to the slowest attached reader
    ///
    /// Runs after every detach and at the start of every read. Holds back
    /// while `buffer_offset` is still zero and the slowest reader has not
    /// passed the low-water threshold, so late joiners stay possible until
    /// the buffer genuinely needs the room. The first advance away from
    /// zero fires the detach notifications: from then on attach is refused.
    pub fn recompute_retention(&self, state: &mut State) {
        if self.config.retain_all || state.readers.is_empty() {
            return;
        }

        let new_low = state
            .readers
            .values()
            .map(|cursor| cursor.offset)
            .min()
            .unwrap_or(state.buffer_offset);

        let block = self.config.block_size as u64;
        if new_low < state.buffer_offset + block {
            return;
        }
        if state.buffer_offset == 0 && new_low < self.config.low_water_offset() {
            return;
        }

        if state.buffer_offset == 0 {
            tracing::debug!(new_low, "First eviction; late attach now refused");
            state.fire_on_detach();
        }

        let advance = (new_low - state.buffer_offset) / block * block;
        state.buffer_offset += advance;
        state.buffer_used -= advance as usize;

        tracing::trace!(
            buffer_offset = state.buffer_offset,
            buffer_used = state.buffer_used,
            "Retention advanced"
        );

        self.space.notify_waiters();
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        for (message_loop, task) in state.on_close.drain(..) {
            message_loop.post_task(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_with(block_size: usize, block_count: usize) -> Shared {
        Shared::new(
            SourceConfig::new()
                .block_size(block_size)
                .block_count(block_count),
        )
    }

    fn attach_cursor(state: &mut State, offset: u64) -> u64 {
        let id = state.next_reader_id;
        state.next_reader_id += 1;
        state.readers.insert(
            id,
            Cursor {
                offset,
                exposed: 0,
                skip: 0,
            },
        );
        id
    }

    #[test]
    fn no_readers_means_no_eviction() {
        let shared = shared_with(4, 2);
        let mut state = shared.lock();
        state.buffer_used = 8;

        shared.recompute_retention(&mut state);
        assert_eq!(state.buffer_offset, 0);
        assert_eq!(state.buffer_used, 8);
    }

    #[test]
    fn slowest_reader_pins_retention() {
        let shared = shared_with(4, 2);
        let mut state = shared.lock();
        state.buffer_used = 8;
        attach_cursor(&mut state, 8);
        attach_cursor(&mut state, 0);

        shared.recompute_retention(&mut state);
        assert_eq!(state.buffer_offset, 0);
    }

    #[test]
    fn first_eviction_waits_for_low_water() {
        let shared = shared_with(4, 2); // capacity 8, low water 6
        let mut state = shared.lock();
        state.buffer_used = 8;
        let id = attach_cursor(&mut state, 4);

        // Past one block but short of the low-water threshold.
        shared.recompute_retention(&mut state);
        assert_eq!(state.buffer_offset, 0);

        state.readers.get_mut(&id).unwrap().offset = 8;
        shared.recompute_retention(&mut state);
        assert_eq!(state.buffer_offset, 8);
        assert_eq!(state.buffer_used, 0);
    }

    #[test]
    fn advance_rounds_down_to_block_boundary() {
        let shared = shared_with(4, 4); // capacity 16, low water 12
        let mut state = shared.lock();
        state.buffer_used = 16;
        attach_cursor(&mut state, 14);

        shared.recompute_retention(&mut state);
        assert_eq!(state.buffer_offset, 12);
        assert_eq!(state.buffer_used, 4);
    }

    #[test]
    fn retain_all_never_evicts() {
        let shared = Shared::new(SourceConfig::new().block_size(4).block_count(2).retain_all(true));
        let mut state = shared.lock();
        state.buffer_used = 8;
        attach_cursor(&mut state, 8);

        shared.recompute_retention(&mut state);
        assert_eq!(state.buffer_offset, 0);
    }
}
