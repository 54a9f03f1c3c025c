//! Stream-shaped tail sources.
//!
//! [`FileTailSource`] yields raw chunks and [`LineTailSource`] yields decoded
//! records. Both produce a [`TailStream`], which is lazy: the file is not
//! opened until the stream is first polled, and nothing is read while the
//! consumer is not asking for more.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_stream::try_stream;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::config::{LineConfig, TailConfig};
use crate::error::Result;
use crate::poller::{ChunkPoller, CloseSignal, ReadHandle};
use crate::splitter::DelimiterSplitter;

const TRACING_TARGET: &str = "filetail::source";

/// Anything that can push its elements into a channel until exhausted.
///
/// The bounded channel carries backpressure: a full channel stops the
/// source from reading further.
#[async_trait::async_trait]
pub trait TailSource {
    type Item: Send + 'static;

    /// Sends every element to `tx`. Ends quietly if the receiver goes away.
    async fn forward(self, tx: Sender<Self::Item>) -> Result<()>;
}

/// Ordered, backpressured output of one tail.
///
/// Dropping the stream cancels the tail and releases the file.
pub struct TailStream<T> {
    inner: BoxStream<'static, Result<T>>,
    cancel: CancellationToken,
    handle: ReadHandle,
    closed: CloseSignal,
}

impl<T> TailStream<T> {
    /// Stops this tail and releases the file right away. The stream ends at
    /// its next poll, without an error.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.handle.release();
    }

    /// Token that cancels only this tail when triggered, e.g. from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn close_signal(&self) -> CloseSignal {
        self.closed.clone()
    }
}

impl<T> Stream for TailStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

async fn drain_into<T: Send + 'static>(mut stream: TailStream<T>, tx: Sender<T>) -> Result<()> {
    while let Some(item) = stream.next().await {
        if tx.send(item?).await.is_err() {
            tracing::debug!(target: TRACING_TARGET, "receiver dropped, cancelling tail");
            stream.cancel();
            break;
        }
    }
    Ok(())
}

fn chunks(mut poller: ChunkPoller) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
    try_stream! {
        while let Some(chunk) = poller.next_chunk().await? {
            yield chunk;
        }
    }
}

fn records(
    mut poller: ChunkPoller,
    mut splitter: DelimiterSplitter,
) -> impl Stream<Item = Result<String>> + Send + 'static {
    try_stream! {
        loop {
            // Buffered records must not outlive a cancellation.
            if poller.observe_cancellation() {
                break;
            }
            let record = splitter.next_record().map_err(|err| poller.fail(err))?;
            if let Some(record) = record {
                yield record;
                continue;
            }
            match poller.next_chunk().await? {
                Some(chunk) => splitter.push(&chunk),
                None => {
                    if poller.observe_cancellation() {
                        break;
                    }
                    if let Some(last) = splitter.finish()? {
                        yield last;
                    }
                    break;
                }
            }
        }
    }
}

/// Tails a file as a sequence of raw byte chunks.
#[derive(Debug, Clone)]
pub struct FileTailSource {
    config: TailConfig,
    cancel: CancellationToken,
}

impl FileTailSource {
    pub fn new(config: TailConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Ties the tail to an external token, e.g. a process-wide shutdown token.
    ///
    /// Each stream gets a child of this token, so cancelling one stream
    /// never reaches the token or other streams built from this source.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &TailConfig {
        &self.config
    }

    pub fn into_stream(self) -> Result<TailStream<Bytes>> {
        let cancel = self.cancel.child_token();
        let poller = ChunkPoller::new(&self.config, cancel.clone())?;
        Ok(TailStream {
            cancel,
            handle: poller.read_handle(),
            closed: poller.close_signal(),
            inner: Box::pin(chunks(poller)),
        })
    }

    /// Re-segments this tail into records.
    pub fn lines(self, lines: LineConfig) -> Result<LineTailSource> {
        lines.validate()?;
        Ok(LineTailSource {
            tail: self,
            lines,
        })
    }
}

#[async_trait::async_trait]
impl TailSource for FileTailSource {
    type Item = Bytes;

    async fn forward(self, tx: Sender<Bytes>) -> Result<()> {
        drain_into(self.into_stream()?, tx).await
    }
}

/// Tails a file as a sequence of complete, decoded records.
#[derive(Debug, Clone)]
pub struct LineTailSource {
    tail: FileTailSource,
    lines: LineConfig,
}

impl LineTailSource {
    pub fn new(config: TailConfig, lines: LineConfig) -> Result<Self> {
        FileTailSource::new(config)?.lines(lines)
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.tail = self.tail.with_cancellation(cancel);
        self
    }

    pub fn into_stream(self) -> Result<TailStream<String>> {
        let cancel = self.tail.cancel.child_token();
        let poller = ChunkPoller::new(&self.tail.config, cancel.clone())?;
        let splitter = DelimiterSplitter::new(&self.lines)?;
        Ok(TailStream {
            cancel,
            handle: poller.read_handle(),
            closed: poller.close_signal(),
            inner: Box::pin(records(poller, splitter)),
        })
    }
}

#[async_trait::async_trait]
impl TailSource for LineTailSource {
    type Item = String;

    async fn forward(self, tx: Sender<String>) -> Result<()> {
        drain_into(self.into_stream()?, tx).await
    }
}

/// Convenience for the common case: newline-separated UTF-8 lines of `path`.
pub fn tail_lines(path: impl Into<std::path::PathBuf>) -> Result<TailStream<String>> {
    LineTailSource::new(TailConfig::new(path), LineConfig::default())?.into_stream()
}
