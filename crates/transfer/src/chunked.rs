use std::io::{ErrorKind, SeekFrom};
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::types::Chunk;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Reads a source of known length in fixed-size blocks.
///
/// Every block except the last is exactly `chunk_size` bytes long. The
/// sequence ends when the cumulative offset reaches the declared length.
/// A read error or a source that ends early terminates the sequence: the
/// error is returned once and every later call yields `None`.
pub struct ChunkReader<R> {
    source: R,
    chunk_size: usize,
    offset: u64,
    total: u64,
    failed: bool,
}

impl ChunkReader<tokio::fs::File> {
    /// Opens `path` for chunked reading, taking its current length as the
    /// declared length.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (10 MiB) is used.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();
        Ok(Self::new(file, total, chunk_size))
    }
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Wraps `source`, which is expected to yield exactly `total` bytes.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (10 MiB) is used.
    pub fn new(source: R, total: u64, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            source,
            chunk_size,
            offset: 0,
            total,
            failed: false,
        }
    }

    /// Reads the next block. Returns `None` once the declared length has
    /// been delivered.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.failed {
            return Ok(None);
        }
        let remaining = self.total.saturating_sub(self.offset);
        if remaining == 0 {
            return Ok(None);
        }

        let want = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            match self.source.read(&mut buf[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.failed = true;
                    return Err(TransferError::Read(e));
                }
            }
        }

        if filled < want {
            self.failed = true;
            return Err(TransferError::Truncated {
                read: self.offset + filled as u64,
                expected: self.total,
            });
        }

        let chunk = Chunk {
            offset: self.offset,
            data: buf,
            total: self.total,
        };
        self.offset += want as u64;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Declared length of the source in bytes.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.offset)
    }

    /// Configured block size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin> ChunkReader<R> {
    /// Restarts the sequence from the first byte.
    pub async fn rewind(&mut self) -> Result<(), TransferError> {
        self.source.seek(SeekFrom::Start(0)).await?;
        self.offset = 0;
        self.failed = false;
        Ok(())
    }
}
