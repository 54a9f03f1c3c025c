//! Re-segments a byte-chunk sequence into delimiter-terminated text records.

use bytes::{Buf, BytesMut};
use encoding_rs::Encoding;

use crate::config::{LineConfig, TrailingRecord};
use crate::error::{Error, Result};

const TRACING_TARGET: &str = "filetail::splitter";

pub struct DelimiterSplitter {
    pending: BytesMut,
    delimiter: Vec<u8>,
    charset: &'static Encoding,
    max_line_length: usize,
    trailing: TrailingRecord,
    /// Prefix of `pending` already known to contain no delimiter.
    scanned: usize,
}

impl DelimiterSplitter {
    pub fn new(config: &LineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pending: BytesMut::new(),
            delimiter: config.delimiter.clone(),
            charset: config.charset,
            max_line_length: config.max_line_length,
            trailing: config.trailing,
            scanned: 0,
        })
    }

    /// Bytes received since the last delimiter.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Takes the next complete record out of the buffer, if there is one.
    ///
    /// Fails with [`Error::LineTooLong`] when a record, terminated or not,
    /// is longer than the configured maximum.
    pub fn next_record(&mut self) -> Result<Option<String>> {
        match self.find_delimiter() {
            Some(at) => {
                if at > self.max_line_length {
                    return Err(self.too_long());
                }
                let record = self.pending.split_to(at);
                self.pending.advance(self.delimiter.len());
                self.scanned = 0;
                self.decode(&record).map(Some)
            }
            // The tail of `pending` may be the start of a split delimiter.
            None if self.pending.len() >= self.max_line_length + self.delimiter.len() => {
                Err(self.too_long())
            }
            None => Ok(None),
        }
    }

    /// Applies the trailing-record policy once the upstream has completed.
    pub fn finish(&mut self) -> Result<Option<String>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let rest = self.pending.split();
        self.scanned = 0;
        match self.trailing {
            TrailingRecord::Discard => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    len = rest.len(),
                    "discarding unterminated trailing record"
                );
                Ok(None)
            }
            TrailingRecord::Emit => self.decode(&rest).map(Some),
        }
    }

    fn find_delimiter(&mut self) -> Option<usize> {
        let delimiter = self.delimiter.as_slice();
        if self.pending.len() < delimiter.len() {
            return None;
        }
        let found = self.pending[self.scanned..]
            .windows(delimiter.len())
            .position(|window| window == delimiter)
            .map(|pos| pos + self.scanned);
        if found.is_none() {
            // A delimiter may still straddle the end of the buffer.
            self.scanned = self.pending.len() + 1 - delimiter.len();
        }
        found
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        self.charset
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
            .ok_or(Error::Decode {
                charset: self.charset.name(),
            })
    }

    fn too_long(&self) -> Error {
        Error::LineTooLong {
            max: self.max_line_length,
        }
    }
}
