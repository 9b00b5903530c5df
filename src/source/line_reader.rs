use std::io::BufRead;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("read timeout with {0} partial bytes pending")]
    Timeout(usize),

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read the next complete line from a growing byte source.
///
/// Returns the line content (newline stripped, `\n` and `\r\n` both
/// accepted) and the number of raw bytes consumed including the newline,
/// so the caller can compute exact next-byte offsets.
///
/// End-of-stream on a still-growing file is not terminal: the reader
/// sleeps `poll_interval` and retries until a full line appears or the
/// accumulated wait exceeds `timeout`. On `ReadError::Timeout` any
/// partial bytes remain in `pending` for the next attempt. Any other I/O
/// failure is fatal for this reader.
pub async fn read_line<R: BufRead>(
    reader: &mut R,
    pending: &mut Vec<u8>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(String, usize), ReadError> {
    let start = Instant::now();

    loop {
        reader.read_until(b'\n', pending)?;

        if pending.last() == Some(&b'\n') {
            let consumed = pending.len();
            let mut newline_len = 1;
            if consumed > 1 && pending[consumed - 2] == b'\r' {
                newline_len = 2;
            }

            let text = String::from_utf8_lossy(&pending[..consumed - newline_len]).into_owned();
            pending.clear();
            return Ok((text, consumed));
        }

        // No terminator yet: the file may still be growing.
        sleep(poll_interval).await;

        if start.elapsed() > timeout {
            return Err(ReadError::Timeout(pending.len()));
        }
    }
}
