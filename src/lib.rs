//! sharecast: share one live transcoded stream across many clients
//!
//! A bounded broadcast buffer fed by exactly one producer and drained
//! independently by any number of concurrent readers. The expensive part of
//! serving live transcoded media is the transcode itself; this crate lets
//! every client watching the same stream consume the same producer output
//! instead of re-running it per client.
//!
//! # Quick start
//!
//! ```no_run
//! use sharecast::{BroadcastSource, SourceConfig};
//!
//! # async fn serve(upstream: tokio::fs::File) -> Option<()> {
//! let source = BroadcastSource::pull(upstream, SourceConfig::default());
//!
//! let mut reader = source.attach().ok()?;
//! while let Some(_chunk) = reader.read().await {
//!     // forward the chunk to the client socket
//! }
//! # Some(())
//! # }
//! ```
//!
//! Push mode hands the producer role to an external engine instead:
//! [`BroadcastSource::push`] returns a [`StreamWriter`] the engine feeds
//! from its own task.
//!
//! Teardown and "late attach no longer possible" notifications are posted
//! to a [`MessageLoop`] rather than run inline, so subscriber callbacks
//! always execute on the task that owns the subscriber.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod source;

mod ring;

pub use config::SourceConfig;
pub use dispatch::MessageLoop;
pub use error::SourceError;
pub use source::{BroadcastSource, SourceStats, StreamReader, StreamWriter};
