//! Immutable configuration for tail sources.
//!
//! Both structs are built with chained setters and checked once, when a
//! source is constructed from them.

use std::path::PathBuf;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};

use crate::error::{Error, Result};

const TRACING_TARGET: &str = "filetail::config";

pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

/// Whether a tail keeps waiting for growth or stops at the size seen at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TailMode {
    /// Like `tail -f`: wait for appended data until cancelled.
    #[default]
    Follow,
    /// Deliver the content present when the file was opened, then complete.
    ReadOnce,
}

/// What to do with bytes left after the last delimiter when the upstream completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingRecord {
    #[default]
    Discard,
    Emit,
}

/// Configuration of the chunk-producing side of a tail.
#[derive(Debug, Clone)]
pub struct TailConfig {
    pub path: PathBuf,
    pub chunk_size: usize,
    pub starting_offset: u64,
    pub poll_interval: Duration,
    pub mode: TailMode,
}

impl TailConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            starting_offset: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
            mode: TailMode::Follow,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn starting_offset(mut self, offset: u64) -> Self {
        self.starting_offset = offset;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn mode(mut self, mode: TailMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for `mode(TailMode::ReadOnce)`.
    pub fn read_once(self) -> Self {
        self.mode(TailMode::ReadOnce)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be positive".into()));
        }
        if self.poll_interval.is_zero() && self.mode == TailMode::Follow {
            tracing::warn!(
                target: TRACING_TARGET,
                path = %self.path.display(),
                "zero poll interval, end of file will be re-checked without pause"
            );
        }
        Ok(())
    }
}

/// Configuration of the record-splitting side of a tail.
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Raw delimiter bytes, matched against the undecoded stream.
    pub delimiter: Vec<u8>,
    pub charset: &'static Encoding,
    pub max_line_length: usize,
    pub trailing: TrailingRecord,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            delimiter: b"\n".to_vec(),
            charset: UTF_8,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            trailing: TrailingRecord::Discard,
        }
    }
}

impl LineConfig {
    pub fn delimiter(mut self, delimiter: impl Into<Vec<u8>>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn charset(mut self, charset: &'static Encoding) -> Self {
        self.charset = charset;
        self
    }

    /// Selects the charset by WHATWG label, e.g. `"latin1"` or `"utf-16le"`.
    pub fn charset_label(self, label: &str) -> Result<Self> {
        let charset = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| Error::InvalidConfig(format!("unknown charset: {label}")))?;
        Ok(self.charset(charset))
    }

    pub fn max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    pub fn trailing(mut self, trailing: TrailingRecord) -> Self {
        self.trailing = trailing;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.delimiter.is_empty() {
            return Err(Error::InvalidConfig("delimiter must not be empty".into()));
        }
        if self.max_line_length == 0 {
            return Err(Error::InvalidConfig(
                "maximum line length must be positive".into(),
            ));
        }
        Ok(())
    }
}
