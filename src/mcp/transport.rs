//! Newline-delimited framing over stdio

use crate::error::{Result, RouterError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for one inbound message, excluding the line terminator
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Reads one JSON document per line, refusing lines over a fixed size so a
/// misbehaving client cannot make the relay buffer without bound.
pub struct LineReader<R> {
    reader: R,
    limit: usize,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, MAX_LINE_BYTES)
    }

    pub fn with_limit(reader: R, limit: usize) -> Self {
        Self {
            reader,
            limit,
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, or `None` at end of input. The last
    /// line is returned even when the stream ends without a newline.
    pub async fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        self.buf.clear();

        // Room for the limit, the newline, and one byte to detect overflow
        let cap = (self.limit + 2) as u64;
        let read = (&mut self.reader)
            .take(cap)
            .read_until(b'\n', &mut self.buf)
            .await?;
        if read == 0 {
            return Ok(None);
        }

        let mut line = std::mem::take(&mut self.buf);
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        if line.len() > self.limit {
            return Err(RouterError::LineTooLong { limit: self.limit });
        }
        Ok(Some(line))
    }
}

/// Write one encoded message followed by `\n` and flush it.
pub async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    writer.write_all(payload).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
