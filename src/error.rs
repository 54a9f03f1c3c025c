//! Error type shared by every stage of the crate.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fatal conditions that terminate a tail or directory stream.
///
/// Reaching the current end of a followed file is not an error and never
/// shows up here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("not a regular file: {}", path.display())]
    NotAFile { path: PathBuf },

    /// The file shrank below the read offset or disappeared.
    #[error("{} was truncated or deleted while tailing at offset {offset}", path.display())]
    TruncatedOrDeleted {
        path: PathBuf,
        offset: u64,
        /// Size observed on the last stat, `None` when the file was gone.
        size: Option<u64>,
    },

    #[error("line exceeds the maximum length of {max} bytes")]
    LineTooLong { max: usize },

    #[error("record is not valid {charset}")]
    Decode { charset: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Classifies an I/O failure that happened while opening or listing `path`.
    pub(crate) fn from_open(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Error::io(path, source),
        }
    }

    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True for conditions that were detected before any byte was read.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            Error::FileNotFound { .. } | Error::PermissionDenied { .. } | Error::NotAFile { .. }
        )
    }
}
