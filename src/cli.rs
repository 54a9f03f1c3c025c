use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use filetail::{LineConfig, TailConfig, TailMode, TrailingRecord};

/// Immutable configuration used by the application runtime
#[derive(Debug, Clone)]
pub struct Config {
    pub tail: TailConfig,
    /// `None` streams raw chunks instead of records
    pub lines: Option<LineConfig>,
    pub log_level: String,
}

/// User-facing CLI arguments (kept private to the CLI layer)
#[derive(Parser, Debug)]
#[command(name = "filetail", version, about = "Follow a growing file")]
struct Args {
    /// File to tail
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Print the content present at start, then exit instead of following
    #[arg(long = "once")]
    once: bool,

    /// Write raw chunks instead of splitting into records
    #[arg(long = "bytes")]
    bytes: bool,

    /// Byte offset to start reading from
    #[arg(long = "offset", default_value_t = 0)]
    offset: u64,

    /// Maximum bytes per read
    #[arg(long = "chunk-size", default_value_t = filetail::config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Milliseconds to wait before re-checking an idle file
    #[arg(long = "poll-interval-ms", default_value_t = 250)]
    poll_interval_ms: u64,

    /// Record delimiter
    #[arg(short = 'd', long = "delimiter", default_value = "\n")]
    delimiter: String,

    /// Text encoding label of the file (e.g. utf-8, latin1, utf-16le)
    #[arg(long = "charset", default_value = "utf-8")]
    charset: String,

    /// Fail when a record grows past this many bytes
    #[arg(long = "max-line-length", default_value_t = filetail::config::DEFAULT_MAX_LINE_LENGTH)]
    max_line_length: usize,

    /// Print an unterminated last record when the tail completes
    #[arg(long = "emit-trailing")]
    emit_trailing: bool,

    /// Log level; RUST_LOG takes precedence when set
    #[arg(long = "log-level", default_value = "warn")]
    log_level: String,
}

/// Parse CLI options into an application Config
pub fn parse() -> anyhow::Result<Config> {
    Args::parse().into_config()
}

impl Args {
    fn into_config(self) -> anyhow::Result<Config> {
        let mode = if self.once { TailMode::ReadOnce } else { TailMode::Follow };
        let tail = TailConfig::new(self.path)
            .chunk_size(self.chunk_size)
            .starting_offset(self.offset)
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
            .mode(mode);

        let lines = if self.bytes {
            None
        } else {
            let trailing = if self.emit_trailing {
                TrailingRecord::Emit
            } else {
                TrailingRecord::Discard
            };
            let lines = LineConfig::default()
                .delimiter(self.delimiter.into_bytes())
                .charset_label(&self.charset)?
                .max_line_length(self.max_line_length)
                .trailing(trailing);
            Some(lines)
        };

        Ok(Config {
            tail,
            lines,
            log_level: self.log_level,
        })
    }
}
