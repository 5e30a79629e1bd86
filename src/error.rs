//! Error types for broadcast source operations

/// Error type for source and reader operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceError {
    /// Attach was attempted after the buffer started evicting
    ///
    /// Readers can only join while every byte since stream start is still
    /// resident. The caller is expected to fall back to starting its own
    /// independent stream.
    AttachAfterEviction,

    /// Seek target lies outside the retained window
    SeekOutOfWindow { target: u64 },

    /// The stream has ended; no further writes are accepted
    Closed,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::AttachAfterEviction => {
                write!(f, "Attach rejected: buffer has started evicting")
            }
            SourceError::SeekOutOfWindow { target } => {
                write!(f, "Seek target {} outside retained window", target)
            }
            SourceError::Closed => write!(f, "Stream has ended"),
        }
    }
}

impl std::error::Error for SourceError {}
