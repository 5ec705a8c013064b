//! Command execution.

use std::io::Write;

use anyhow::Context;
use bucketry_minio::{StorageClient, UploadSource};
use futures::TryStreamExt;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::TRACING_TARGET_COMMAND;
use crate::config::Command;

/// Runs `command` against `client` and prints its JSON report to stdout.
///
/// Ctrl-C cancels the operation in flight.
pub async fn execute(
    client: &StorageClient,
    bucket: Option<&str>,
    command: Command,
) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    let guard = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(target: TRACING_TARGET_COMMAND, "interrupt received, cancelling");
            guard.cancel();
        }
    });

    let client = client.with_cancellation(token);
    tracing::debug!(target: TRACING_TARGET_COMMAND, command = command.name(), "running command");

    match command {
        Command::Upload { path } => {
            let object = client
                .upload(bucket, UploadSource::local_file(&path))
                .await
                .with_context(|| format!("failed to upload {}", path.display()))?;
            print_json(&object)
        }
        Command::UploadStdin { name } => {
            let source = UploadSource::stream(tokio::io::stdin(), None, name);
            let object = client
                .upload(bucket, source)
                .await
                .context("failed to upload standard input")?;
            print_json(&object)
        }
        Command::Stat { key } => {
            let metadata = client
                .stat_object(bucket, &key)
                .await
                .with_context(|| format!("failed to stat {key}"))?;
            print_json(&metadata)
        }
        Command::Download { key, dir } => {
            let object = client
                .download_to_file(bucket, &key, &dir)
                .await
                .with_context(|| format!("failed to download {key}"))?;
            print_json(&object)
        }
        Command::Cat { key } => {
            let mut object = client
                .download_to_stream(bucket, &key)
                .await
                .with_context(|| format!("failed to open {key}"))?;
            let mut stream = object.take_stream().context("download returned no stream")?;

            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = stream
                .try_next()
                .await
                .with_context(|| format!("failed to read {key}"))?
            {
                stdout.write_all(&chunk).await.context("failed to write to stdout")?;
            }
            stdout.flush().await.context("failed to write to stdout")?;

            tracing::info!(
                target: TRACING_TARGET_COMMAND,
                key = %object.key(),
                size = %object.size_label(),
                elapsed = %object.elapsed_label(),
                "object written to stdout"
            );
            Ok(())
        }
        Command::Ping => {
            client
                .health_check()
                .await
                .context("storage backend is unreachable")?;
            print_json(&json!({
                "status": "ok",
                "bucket": bucket.unwrap_or(client.default_bucket()),
            }))
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("failed to encode report")?;
    writeln!(stdout).context("failed to write to stdout")?;
    Ok(())
}
