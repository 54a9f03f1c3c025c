use anyhow::{Context, Result};
use bytes::Bytes;
use filetail::{FileTailSource, LineTailSource, TailSource};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::Config;

/// Application runtime: wires the tail source, Ctrl-C handling, and stdout.
pub async fn run(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();

    // Ctrl-C ends the tail like reaching the end of a single pass
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received, stopping tail");
            shutdown.cancel();
        }
    });

    let path = config.tail.path.clone();
    let result = match config.lines {
        Some(lines) => {
            let source = LineTailSource::new(config.tail, lines)?.with_cancellation(cancel.clone());
            pump(source, cancel, |line: String| {
                let mut out = line.into_bytes();
                out.push(b'\n');
                Bytes::from(out)
            })
            .await
        }
        None => {
            let source = FileTailSource::new(config.tail)?.with_cancellation(cancel.clone());
            pump(source, cancel, |chunk: Bytes| chunk).await
        }
    };
    result.with_context(|| format!("tailing {}", path.display()))
}

/// Runs `source` on its own task and copies everything it produces to stdout.
async fn pump<S>(
    source: S,
    cancel: CancellationToken,
    render: impl Fn(S::Item) -> Bytes,
) -> Result<()>
where
    S: TailSource + Send + 'static,
{
    // Small bound: the reader stays at most a few elements ahead of stdout
    let (tx, mut rx) = mpsc::channel::<S::Item>(16);
    let reader = tokio::spawn(source.forward(tx));

    let mut stdout = tokio::io::stdout();
    while let Some(item) = rx.recv().await {
        let written = async {
            stdout.write_all(&render(item)).await?;
            stdout.flush().await
        }
        .await;
        if let Err(e) = written {
            cancel.cancel();
            return Err(e).context("writing to stdout");
        }
    }

    reader.await??;
    Ok(())
}
