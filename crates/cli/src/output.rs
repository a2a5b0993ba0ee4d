//! CSV result sink.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::info;

use hostprobe_common::ResultRecord;

/// Serialize every record to one CSV row, in completion order.
///
/// Rows carry no header; downstream consumers are schema-aware by
/// convention. With `flush` set, every row is flushed as written, trading
/// throughput for durability of partial output on a crash.
pub async fn write_results<W>(
    mut results: mpsc::Receiver<ResultRecord>,
    mut out: W,
    flush: bool,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut total = 0usize;

    while let Some(record) = results.recv().await {
        let row = format_row(&record);
        out.write_all(row.as_bytes())
            .await
            .context("failed to write output row")?;
        if flush {
            out.flush().await.context("failed to flush output")?;
        }
        *counts.entry(record.code.as_str()).or_insert(0) += 1;
        total += 1;
    }
    out.flush().await.context("failed to flush output")?;

    info!("Probe summary:");
    info!("  Conclusive results: {}", total);
    for (code, count) in counts {
        info!("  {}: {}", code, count);
    }
    Ok(())
}

/// One row: `start_time_unix_ms,host,stage,code,address,duration_ms`
fn format_row(record: &ResultRecord) -> String {
    format!(
        "{},{},{},{},{},{}\n",
        record.start_time.timestamp_millis(),
        escape_csv(&record.host),
        record.stage,
        record.code,
        record.endpoint,
        record.duration.as_millis(),
    )
}

/// Quote a field only when it contains a delimiter, quote, or line break.
fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
