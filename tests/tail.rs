use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use filetail::{
    ChunkPoller, Error, FileTailSource, LineConfig, LineTailSource, TailConfig, TailStream,
};
use futures::{StreamExt, TryStreamExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn fast(path: &Path) -> TailConfig {
    TailConfig::new(path).poll_interval(Duration::from_millis(20))
}

fn append(path: &Path, data: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(data.as_bytes()).unwrap();
    file.flush().unwrap();
}

async fn next<T>(stream: &mut TailStream<T>) -> Option<Result<T, Error>> {
    timeout(WAIT, stream.next()).await.expect("tail stalled")
}

async fn read_all_once(path: &Path) -> Vec<u8> {
    let chunks: Vec<Bytes> = FileTailSource::new(fast(path).read_once())
        .unwrap()
        .into_stream()
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    chunks.concat()
}

#[tokio::test]
async fn static_file_is_delivered_completely() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "a\nb\nc\nd").unwrap();

    assert_eq!(read_all_once(&path).await, b"a\nb\nc\nd");
}

#[tokio::test]
async fn following_a_static_file_yields_content_then_ends_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "a\nb\nc\nd").unwrap();

    let mut stream = FileTailSource::new(fast(&path)).unwrap().into_stream().unwrap();
    let chunk = next(&mut stream).await.unwrap().unwrap();
    assert_eq!(&chunk[..], b"a\nb\nc\nd");

    stream.cancel();
    assert!(stream.close_signal().is_closed());
    assert!(next(&mut stream).await.is_none());
}

#[tokio::test]
async fn appended_lines_become_visible_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "a\n").unwrap();

    let mut lines = LineTailSource::new(fast(&path), LineConfig::default())
        .unwrap()
        .into_stream()
        .unwrap();
    assert_eq!(next(&mut lines).await.unwrap().unwrap(), "a");

    append(&path, "b\n");
    assert_eq!(next(&mut lines).await.unwrap().unwrap(), "b");

    append(&path, "c\n");
    assert_eq!(next(&mut lines).await.unwrap().unwrap(), "c");

    lines.cancellation_token().cancel();
    assert!(next(&mut lines).await.is_none());
}

#[tokio::test]
async fn partial_line_waits_for_its_terminator() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "a\nb").unwrap();

    let mut lines = LineTailSource::new(fast(&path), LineConfig::default())
        .unwrap()
        .into_stream()
        .unwrap();
    assert_eq!(next(&mut lines).await.unwrap().unwrap(), "a");

    append(&path, "c\n");
    assert_eq!(next(&mut lines).await.unwrap().unwrap(), "bc");
}

#[tokio::test]
async fn chunk_boundary_inside_a_record_is_not_split() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "a\nbc\n").unwrap();

    let lines: Vec<String> = LineTailSource::new(
        fast(&path).chunk_size(3).read_once(),
        LineConfig::default(),
    )
    .unwrap()
    .into_stream()
    .unwrap()
    .try_collect()
    .await
    .unwrap();
    assert_eq!(lines, ["a", "bc"]);
}

#[tokio::test]
async fn cancellation_drops_buffered_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "a\nb\nc\n").unwrap();

    let cancel = CancellationToken::new();
    let mut lines = LineTailSource::new(fast(&path), LineConfig::default())
        .unwrap()
        .with_cancellation(cancel.clone())
        .into_stream()
        .unwrap();
    let closed = lines.close_signal();
    assert_eq!(next(&mut lines).await.unwrap().unwrap(), "a");

    cancel.cancel();
    assert!(next(&mut lines).await.is_none());
    assert!(next(&mut lines).await.is_none());
    timeout(WAIT, closed.closed()).await.unwrap();
}

#[tokio::test]
async fn dropping_the_stream_releases_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "a\n").unwrap();

    let mut lines = LineTailSource::new(fast(&path), LineConfig::default())
        .unwrap()
        .into_stream()
        .unwrap();
    let closed = lines.close_signal();
    assert_eq!(next(&mut lines).await.unwrap().unwrap(), "a");
    assert!(!closed.is_closed());

    drop(lines);
    assert!(closed.is_closed());
}

#[tokio::test]
async fn oversized_unterminated_content_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "x".repeat(100)).unwrap();

    let mut lines = LineTailSource::new(fast(&path), LineConfig::default().max_line_length(16))
        .unwrap()
        .into_stream()
        .unwrap();
    let closed = lines.close_signal();
    let err = next(&mut lines).await.unwrap().unwrap_err();
    assert!(matches!(err, Error::LineTooLong { max: 16 }));
    assert!(closed.is_closed());
    assert!(next(&mut lines).await.is_none());
}

#[tokio::test]
async fn undecodable_record_fails_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, b"ok\n\xc3\x28\n").unwrap();

    let mut lines = LineTailSource::new(fast(&path).read_once(), LineConfig::default())
        .unwrap()
        .into_stream()
        .unwrap();
    assert_eq!(next(&mut lines).await.unwrap().unwrap(), "ok");
    assert!(matches!(
        next(&mut lines).await.unwrap(),
        Err(Error::Decode { .. })
    ));
    assert!(next(&mut lines).await.is_none());
}

#[tokio::test]
async fn missing_file_fails_on_first_demand() {
    let dir = tempfile::tempdir().unwrap();
    let mut stream = FileTailSource::new(fast(&dir.path().join("absent")))
        .unwrap()
        .into_stream()
        .unwrap();
    let err = next(&mut stream).await.unwrap().unwrap_err();
    assert!(matches!(err, Error::FileNotFound { .. }));
}

#[tokio::test]
async fn truncated_file_fails_the_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "line one\n").unwrap();

    let mut lines = LineTailSource::new(fast(&path), LineConfig::default())
        .unwrap()
        .into_stream()
        .unwrap();
    assert_eq!(next(&mut lines).await.unwrap().unwrap(), "line one");

    std::fs::write(&path, "").unwrap();
    let err = next(&mut lines).await.unwrap().unwrap_err();
    assert!(matches!(err, Error::TruncatedOrDeleted { offset: 9, .. }));
}

#[tokio::test]
async fn retailing_a_static_file_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "first\nsecond\nthird\n").unwrap();

    let once = read_all_once(&path).await;
    let twice = read_all_once(&path).await;
    assert_eq!(once, twice);
    assert_eq!(once, b"first\nsecond\nthird\n");
}

#[tokio::test]
async fn resuming_from_a_saved_offset_skips_delivered_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "old\n").unwrap();

    let mut poller = ChunkPoller::new(&fast(&path).read_once(), CancellationToken::new()).unwrap();
    let mut delivered = 0;
    while let Some(chunk) = poller.next_chunk().await.unwrap() {
        delivered += chunk.len() as u64;
        assert_eq!(poller.offset(), delivered);
    }
    let saved = poller.offset();
    assert_eq!(saved, 4);

    append(&path, "new\n");
    let lines: Vec<String> = LineTailSource::new(
        fast(&path).starting_offset(saved).read_once(),
        LineConfig::default(),
    )
    .unwrap()
    .into_stream()
    .unwrap()
    .try_collect()
    .await
    .unwrap();
    assert_eq!(lines, ["new"]);
}

#[tokio::test]
async fn independent_tails_of_one_file_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, "1\n2\n").unwrap();

    let mut first = LineTailSource::new(fast(&path), LineConfig::default())
        .unwrap()
        .into_stream()
        .unwrap();
    let mut second = LineTailSource::new(fast(&path), LineConfig::default())
        .unwrap()
        .into_stream()
        .unwrap();

    assert_eq!(next(&mut first).await.unwrap().unwrap(), "1");
    assert_eq!(next(&mut first).await.unwrap().unwrap(), "2");
    first.cancel();
    assert!(next(&mut first).await.is_none());

    assert_eq!(next(&mut second).await.unwrap().unwrap(), "1");
    append(&path, "3\n");
    assert_eq!(next(&mut second).await.unwrap().unwrap(), "2");
    assert_eq!(next(&mut second).await.unwrap().unwrap(), "3");
}
