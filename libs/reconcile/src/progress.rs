//! Image-pull progress consumption.
//!
//! The runtime answers a pull with a stream of newline-delimited JSON
//! records. Chunk boundaries do not line up with record boundaries, so the
//! stream is fed through a `LineDecoder` and each complete line is parsed and
//! logged. The pull is only finished once the stream is exhausted.

use serde::Deserialize;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::error::ReconcileError;
use crate::runtime::ProgressStream;

/// One progress record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullStatus {
    #[serde(default)]
    pub status: Option<String>,

    /// Layer the record refers to.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub progress: Option<String>,

    /// Set when the pull failed after the response started.
    #[serde(default)]
    pub error: Option<String>,
}

/// Splits a byte stream into `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// Drain a pull's progress stream, logging every record.
///
/// Returns the number of records seen. Blocks until the stream ends.
pub async fn consume_pull_progress(
    image: &str,
    mut stream: ProgressStream,
) -> Result<usize, ReconcileError> {
    let mut decoder = LineDecoder::default();
    let mut records = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| ReconcileError::PullImage {
            image: image.to_string(),
            source,
        })?;
        decoder.push(&chunk);
        while let Some(line) = decoder.next_line() {
            records += handle_line(image, &line)?;
        }
    }

    if let Some(line) = decoder.finish() {
        records += handle_line(image, &line)?;
    }

    Ok(records)
}

fn handle_line(image: &str, line: &[u8]) -> Result<usize, ReconcileError> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(0);
    }

    let record: PullStatus =
        serde_json::from_slice(line).map_err(|e| ReconcileError::PullProgress {
            image: image.to_string(),
            detail: format!("malformed progress record: {e}"),
        })?;

    if let Some(error) = record.error {
        return Err(ReconcileError::PullProgress {
            image: image.to_string(),
            detail: error,
        });
    }

    let status = record.status.as_deref().unwrap_or_default();
    match (&record.id, &record.progress) {
        (Some(layer), Some(progress)) => {
            debug!(image, layer = %layer, status, progress = %progress, "Image pull progress");
        }
        (Some(layer), None) => info!(image, layer = %layer, status, "Image pull status"),
        (None, _) => info!(image, status, "Image pull status"),
    }

    Ok(1)
}
