//! Directory listing sources.

use std::path::{Path, PathBuf};

use async_stream::try_stream;
use futures::stream::Stream;
use tokio::fs;

use crate::error::{Error, Result};

/// Entries directly inside `dir`, in file-name order.
pub fn ls(dir: impl Into<PathBuf>) -> impl Stream<Item = Result<PathBuf>> + Send + 'static {
    let dir = dir.into();
    try_stream! {
        for entry in sorted_entries(&dir).await? {
            yield entry;
        }
    }
}

/// Depth-first, pre-order walk starting with `dir` itself.
///
/// `max_depth` of `Some(0)` yields only `dir`; `None` walks the whole tree.
/// Symbolic links are yielded but never descended into.
pub fn walk(
    dir: impl Into<PathBuf>,
    max_depth: Option<usize>,
) -> impl Stream<Item = Result<PathBuf>> + Send + 'static {
    let root = dir.into();
    try_stream! {
        let mut stack = vec![(root, 0usize)];
        while let Some((path, depth)) = stack.pop() {
            let meta = fs::symlink_metadata(&path)
                .await
                .map_err(|e| Error::from_open(&path, e))?;
            let descend = meta.is_dir() && max_depth.is_none_or(|max| depth < max);
            if descend {
                let children = sorted_entries(&path).await?;
                stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
            }
            yield path;
        }
    }
}

async fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut reader = fs::read_dir(dir)
        .await
        .map_err(|e| Error::from_open(dir, e))?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(|e| Error::io(dir, e))? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}
