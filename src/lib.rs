//! Streaming sources over the local filesystem.
//!
//! The centerpiece is a resumable file tail: a lazy, backpressured stream of
//! the bytes or delimiter-separated records appended to a file, read from a
//! tracked offset with periodic polling while the file is idle.
//!
//! ```rust,no_run
//! use filetail::{LineConfig, LineTailSource, TailConfig};
//! use futures::StreamExt;
//!
//! # async fn run() -> filetail::Result<()> {
//! let source = LineTailSource::new(TailConfig::new("/var/log/app.log"), LineConfig::default())?;
//! let mut lines = source.into_stream()?;
//! while let Some(line) = lines.next().await {
//!     println!("{}", line?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod directory;
mod error;
pub mod poller;
pub mod source;
pub mod splitter;

pub use config::{LineConfig, TailConfig, TailMode, TrailingRecord};
pub use error::{Error, Result};
pub use poller::{ChunkPoller, CloseSignal, TailCursor, TailState};
pub use source::{FileTailSource, LineTailSource, TailSource, TailStream, tail_lines};
pub use splitter::DelimiterSplitter;
