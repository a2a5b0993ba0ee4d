//! Job intake: newline-delimited hostnames from files or standard input.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Stream every non-blank line from `files` into the job channel, reading
/// standard input when the list is empty or for a `-` entry. Returns once
/// every source is exhausted or the engine has shut down.
pub async fn feed_jobs(files: Vec<PathBuf>, jobs: mpsc::Sender<String>) -> Result<()> {
    let mut sent = 0usize;
    if files.is_empty() {
        sent += feed_reader(tokio::io::stdin(), &jobs).await?;
    } else {
        for path in files {
            if path.as_os_str() == "-" {
                sent += feed_reader(tokio::io::stdin(), &jobs).await?;
            } else {
                let file = File::open(&path)
                    .await
                    .with_context(|| format!("failed to open input file {}", path.display()))?;
                sent += feed_reader(file, &jobs).await?;
                debug!(file = %path.display(), "input file consumed");
            }
        }
    }
    info!(jobs = sent, "job source exhausted");
    Ok(())
}

async fn feed_reader<R>(reader: R, jobs: &mpsc::Sender<String>) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut sent = 0usize;
    while let Some(line) = lines.next_line().await? {
        let host = line.trim();
        if host.is_empty() {
            continue;
        }
        // a closed channel means every worker is gone; stop feeding
        if jobs.send(host.to_string()).await.is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}
