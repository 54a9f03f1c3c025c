//! Offset-tracking chunk reader over a single growing file.
//!
//! [`ChunkPoller`] does nothing until [`ChunkPoller::next_chunk`] is awaited:
//! the file is opened on the first call, each call performs at most one
//! successful read, and the poll-interval wait only happens while a caller
//! is waiting for the next chunk.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::{TailConfig, TailMode};
use crate::error::{Error, Result};

const TRACING_TARGET: &str = "filetail::poller";

/// Lifecycle of a tail as observed by its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    /// Created, file not opened yet.
    Idle,
    /// File open, last read returned data.
    Reading,
    /// At the current end of file, re-checking every poll interval.
    WaitingForGrowth,
    /// Single pass delivered everything present at open.
    Completed,
    Cancelled,
    /// A fatal error was returned; the handle is already released.
    Failed,
}

impl TailState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TailState::Completed | TailState::Cancelled | TailState::Failed
        )
    }
}

/// Read position of one tail. Only the offset ever changes.
#[derive(Debug, Clone)]
pub struct TailCursor {
    path: PathBuf,
    offset: u64,
    chunk_size: usize,
    poll_interval: Duration,
}

impl TailCursor {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next byte position to read from.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Upper bound on the length of a single chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Pause between end-of-file checks while following.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Fires once the read handle of a tail has been released.
#[derive(Debug, Clone)]
pub struct CloseSignal(CancellationToken);

impl CloseSignal {
    pub fn is_closed(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Waits until the handle is released.
    pub async fn closed(&self) {
        self.0.cancelled().await
    }
}

/// Slot holding the open file, shared with the owning [`TailStream`].
///
/// Releasing it closes the file and fires the close signal without the tail
/// being polled. A read already in progress drops its handle on return.
///
/// [`TailStream`]: crate::TailStream
#[derive(Clone)]
pub(crate) struct ReadHandle(Arc<Mutex<HandleSlot>>);

struct HandleSlot {
    file: Option<File>,
    released: bool,
    close_guard: Option<DropGuard>,
}

impl ReadHandle {
    fn new(close_guard: DropGuard) -> Self {
        Self(Arc::new(Mutex::new(HandleSlot {
            file: None,
            released: false,
            close_guard: Some(close_guard),
        })))
    }

    fn lock(&self) -> MutexGuard<'_, HandleSlot> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the freshly opened file, or drops it if already released.
    fn install(&self, file: File) {
        let mut slot = self.lock();
        if !slot.released {
            slot.file = Some(file);
        }
    }

    /// Takes the file out for one read. `None` once released.
    fn checkout(&self) -> Option<File> {
        self.lock().file.take()
    }

    fn checkin(&self, file: File) {
        let mut slot = self.lock();
        if !slot.released {
            slot.file = Some(file);
        }
    }

    pub(crate) fn release(&self) {
        let mut slot = self.lock();
        slot.released = true;
        slot.file = None;
        // Dropping the guard fires the close signal.
        slot.close_guard = None;
    }
}

pub struct ChunkPoller {
    cursor: TailCursor,
    mode: TailMode,
    state: TailState,
    handle: ReadHandle,
    /// Size observed at open in read-once mode; reading stops there.
    limit: Option<u64>,
    cancel: CancellationToken,
    closed: CancellationToken,
}

impl ChunkPoller {
    pub fn new(config: &TailConfig, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;
        let closed = CancellationToken::new();
        Ok(Self {
            cursor: TailCursor {
                path: config.path.clone(),
                offset: config.starting_offset,
                chunk_size: config.chunk_size,
                poll_interval: config.poll_interval,
            },
            mode: config.mode,
            state: TailState::Idle,
            handle: ReadHandle::new(closed.clone().drop_guard()),
            limit: None,
            cancel,
            closed,
        })
    }

    pub fn cursor(&self) -> &TailCursor {
        &self.cursor
    }

    pub fn offset(&self) -> u64 {
        self.cursor.offset
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    pub fn close_signal(&self) -> CloseSignal {
        CloseSignal(self.closed.clone())
    }

    pub(crate) fn read_handle(&self) -> ReadHandle {
        self.handle.clone()
    }

    /// Reads the next chunk, waiting for the file to grow when needed.
    ///
    /// Returns `Ok(None)` once the tail is cancelled or, in read-once mode,
    /// once the size observed at open has been delivered. After an error
    /// every further call returns `Ok(None)`.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            if self.state.is_terminal() || self.observe_cancellation() {
                return Ok(None);
            }
            if self.state == TailState::Idle {
                if let Err(err) = self.open().await {
                    return Err(self.fail(err));
                }
                if self.observe_cancellation() {
                    return Ok(None);
                }
            }

            let want = match self.limit {
                Some(limit) => {
                    let remaining = limit.saturating_sub(self.cursor.offset);
                    remaining.min(self.cursor.chunk_size as u64) as usize
                }
                None => self.cursor.chunk_size,
            };
            if want == 0 {
                self.complete();
                return Ok(None);
            }

            let chunk = match self.read(want).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    // Handle released by a cancel from another task.
                    if !self.observe_cancellation() {
                        self.state = TailState::Cancelled;
                    }
                    return Ok(None);
                }
                Err(err) => return Err(self.fail(err)),
            };
            if !chunk.is_empty() {
                self.cursor.offset += chunk.len() as u64;
                self.state = TailState::Reading;
                tracing::trace!(
                    target: TRACING_TARGET,
                    len = chunk.len(),
                    offset = self.cursor.offset,
                    "read chunk"
                );
                return Ok(Some(chunk));
            }

            if self.limit.is_some() {
                // The file ended before the size it had when it was opened.
                let err = match self.check_length().await {
                    Err(err) => err,
                    Ok(size) => self.truncated(Some(size)),
                };
                return Err(self.fail(err));
            }

            if self.state != TailState::WaitingForGrowth {
                tracing::debug!(
                    target: TRACING_TARGET,
                    path = %self.cursor.path.display(),
                    offset = self.cursor.offset,
                    "reached end of file, waiting for growth"
                );
                self.state = TailState::WaitingForGrowth;
            }
            if !self.wait_for_growth().await {
                return Ok(None);
            }
            if let Err(err) = self.check_length().await {
                return Err(self.fail(err));
            }
        }
    }

    /// Moves to `Cancelled` if the token fired. True once the tail is cancelled.
    pub fn observe_cancellation(&mut self) -> bool {
        if !self.state.is_terminal() && self.cancel.is_cancelled() {
            self.close();
            self.state = TailState::Cancelled;
            tracing::debug!(
                target: TRACING_TARGET,
                path = %self.cursor.path.display(),
                offset = self.cursor.offset,
                "tail cancelled"
            );
        }
        self.state == TailState::Cancelled
    }

    /// Cancels this tail and releases the handle immediately.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.observe_cancellation();
    }

    /// Releases the handle, moves to `Failed` and hands the error back.
    pub fn fail(&mut self, err: Error) -> Error {
        self.close();
        self.state = TailState::Failed;
        tracing::warn!(
            target: TRACING_TARGET,
            path = %self.cursor.path.display(),
            offset = self.cursor.offset,
            error = %err,
            "tail failed"
        );
        err
    }

    async fn open(&mut self) -> Result<()> {
        let path = &self.cursor.path;
        let mut file = File::open(path)
            .await
            .map_err(|e| Error::from_open(path, e))?;
        let meta = file.metadata().await.map_err(|e| Error::io(path, e))?;
        if !meta.is_file() {
            return Err(Error::NotAFile { path: path.clone() });
        }
        let len = meta.len();
        if self.cursor.offset > len {
            return Err(self.truncated(Some(len)));
        }
        if self.cursor.offset > 0 {
            file.seek(SeekFrom::Start(self.cursor.offset))
                .await
                .map_err(|e| Error::io(path, e))?;
        }
        if self.mode == TailMode::ReadOnce {
            self.limit = Some(len);
        }
        tracing::debug!(
            target: TRACING_TARGET,
            path = %path.display(),
            offset = self.cursor.offset,
            len,
            mode = ?self.mode,
            "opened file"
        );
        self.handle.install(file);
        self.state = TailState::Reading;
        self.watch_cancellation();
        Ok(())
    }

    /// Releases the handle as soon as the token fires, polled or not.
    fn watch_cancellation(&self) {
        let handle = self.handle.clone();
        let cancel = self.cancel.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => handle.release(),
                _ = closed.cancelled() => {}
            }
        });
    }

    /// Reads up to `want` bytes. `None` when the handle was released.
    async fn read(&mut self, want: usize) -> Result<Option<Bytes>> {
        let Some(mut file) = self.handle.checkout() else {
            return Ok(None);
        };
        let mut buf = BytesMut::zeroed(want);
        let read = file.read(&mut buf).await;
        self.handle.checkin(file);
        let n = read.map_err(|e| Error::io(&self.cursor.path, e))?;
        buf.truncate(n);
        Ok(Some(buf.freeze()))
    }

    /// Sleeps for the poll interval. False when cancelled during the wait.
    async fn wait_for_growth(&mut self) -> bool {
        let cancel = self.cancel.clone();
        let cancelled = tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(self.cursor.poll_interval) => false,
        };
        if cancelled {
            self.observe_cancellation();
        }
        !cancelled
    }

    /// Re-stats the path and returns its size if it still covers the offset.
    async fn check_length(&self) -> Result<u64> {
        match fs::metadata(&self.cursor.path).await {
            Ok(meta) if meta.len() < self.cursor.offset => Err(self.truncated(Some(meta.len()))),
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(self.truncated(None)),
            Err(e) => Err(Error::io(&self.cursor.path, e)),
        }
    }

    fn truncated(&self, size: Option<u64>) -> Error {
        Error::TruncatedOrDeleted {
            path: self.cursor.path.clone(),
            offset: self.cursor.offset,
            size,
        }
    }

    fn complete(&mut self) {
        self.close();
        self.state = TailState::Completed;
        tracing::debug!(
            target: TRACING_TARGET,
            path = %self.cursor.path.display(),
            offset = self.cursor.offset,
            "single pass complete"
        );
    }

    fn close(&mut self) {
        self.handle.release();
    }
}

impl Drop for ChunkPoller {
    fn drop(&mut self) {
        self.handle.release();
    }
}
