//! Record framing for verifier output streams.
//!
//! Stdout carries newline-delimited records; [`LineReader`] reassembles
//! records that arrive split across reads and flushes a final unterminated
//! record at EOF. Stderr is free-form; [`ChunkReader`] hands back whatever
//! each read produced, one chunk per failure report.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Size of a single stderr read.
const CHUNK_BYTES: usize = 8 * 1024;

/// Reads newline-delimited records from an async reader.
pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    /// Read the next record, without its line terminator.
    ///
    /// Returns `Ok(None)` on EOF. Blank records and invalid UTF-8 are passed
    /// through: the decoder reports them like any other malformed record.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let bytes_read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if bytes_read == 0 {
            return Ok(None);
        }

        let mut end = self.buf.len();
        while end > 0 && matches!(self.buf[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        Ok(Some(String::from_utf8_lossy(&self.buf[..end]).into_owned()))
    }
}

/// Reads raw chunks from an async reader.
pub struct ChunkReader<R> {
    reader: R,
    buf: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0u8; CHUNK_BYTES].into_boxed_slice(),
        }
    }

    /// Read the next non-blank chunk, trimmed.
    ///
    /// Returns `Ok(None)` on EOF.
    pub async fn next_chunk(&mut self) -> io::Result<Option<String>> {
        loop {
            let bytes_read = self.reader.read(&mut self.buf).await?;
            if bytes_read == 0 {
                return Ok(None);
            }
            let chunk = String::from_utf8_lossy(&self.buf[..bytes_read]);
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }
}
