//! Modular byte storage addressed by absolute stream offsets
//!
//! The ring never interprets offsets; callers track which range
//! `[low, low + used)` is valid. Physical position is simply
//! `offset % capacity`, so a caller that never lets `used` exceed the
//! capacity can never overwrite a byte it still needs.

/// Fixed-capacity byte storage with modular addressing
///
/// In retain-all mode the storage grows block by block instead; growth is
/// only sound while no write has wrapped, which holds because retain-all
/// never evicts (the valid range always starts at physical position 0).
#[derive(Debug)]
pub(crate) struct RingBuffer {
    storage: Vec<u8>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
        }
    }

    /// Current capacity in bytes
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn physical(&self, offset: u64) -> usize {
        (offset % self.storage.len() as u64) as usize
    }

    /// Number of bytes between `offset` and the physical end of storage
    pub fn contiguous_from(&self, offset: u64) -> usize {
        self.storage.len() - self.physical(offset)
    }

    /// Copy `data` in at `offset` as a single contiguous segment
    ///
    /// Returns how many bytes were written; a write reaching the physical
    /// end of storage is truncated there and the caller continues at the
    /// wrapped offset.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> usize {
        let pos = self.physical(offset);
        let n = data.len().min(self.storage.len() - pos);
        self.storage[pos..pos + n].copy_from_slice(&data[..n]);
        n
    }

    /// Borrow up to `max` contiguous bytes starting at `offset`
    ///
    /// The slice stops at the physical end of storage; the caller bounds
    /// `max` by the number of valid bytes at `offset`.
    pub fn slice_at(&self, offset: u64, max: usize) -> &[u8] {
        let pos = self.physical(offset);
        let n = max.min(self.storage.len() - pos);
        &self.storage[pos..pos + n]
    }

    /// Extend the storage by `additional` zeroed bytes (retain-all mode)
    pub fn grow(&mut self, additional: usize) {
        let new_len = self.storage.len() + additional;
        self.storage.resize(new_len, 0);
    }
}
