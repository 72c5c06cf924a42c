use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::DEFAULT_CHUNK_SIZE;
use crate::TransferError;
use crate::types::Chunk;

/// Reads a source of known size in fixed-size chunks.
///
/// Only one chunk is held in memory at a time.
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: usize,
    offset: u64,
    file_size: u64,
}

impl ChunkReader<tokio::fs::File> {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        Ok(Self::new(file, file_size, chunk_size))
    }
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Wraps `reader`, which must yield exactly `file_size` bytes.
    pub fn new(reader: R, file_size: u64, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            reader,
            chunk_size,
            offset: 0,
            file_size,
        }
    }

    /// Reads the next chunk. Returns `None` once `file_size` bytes were read.
    ///
    /// A source that ends early also yields `None`.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        let mut filled = 0;
        while filled < read_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            tracing::warn!(offset = self.offset, expected = self.file_size, "source ended early");
            self.file_size = self.offset;
            return Ok(None);
        }
        buf.truncate(filled);

        let chunk = Chunk {
            offset: self.offset,
            data: buf,
        };
        self.offset += filled as u64;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
