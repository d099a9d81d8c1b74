use std::path::Path;

use md5::{Digest, Md5};
use tokio::io::AsyncRead;

use crate::TransferError;
use crate::chunked::ChunkReader;

/// Running MD5 state over a sequence of blocks.
///
/// Only the hash state and the number of bytes folded in so far are
/// retained; blocks are dropped as soon as they have been consumed.
#[derive(Clone, Default)]
pub struct IncrementalDigest {
    hasher: Md5,
    processed: u64,
}

impl IncrementalDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the next block into the running state.
    pub fn update(&mut self, block: &[u8]) {
        self.hasher.update(block);
        self.processed += block.len() as u64;
    }

    /// Number of bytes folded in so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Finalizes the digest as lowercase hex.
    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Computes the MD5 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut digest = IncrementalDigest::new();
    digest.update(data);
    digest.finalize()
}

/// Drains `reader` into a digest.
///
/// `on_progress` is called after every block with the cumulative number
/// of bytes hashed and the declared total. A read error abandons the
/// digest and is returned as is.
pub async fn checksum_reader<R, F>(
    reader: &mut ChunkReader<R>,
    mut on_progress: F,
) -> Result<String, TransferError>
where
    R: AsyncRead + Unpin,
    F: FnMut(u64, u64),
{
    let mut digest = IncrementalDigest::new();
    while let Some(chunk) = reader.next_chunk().await? {
        digest.update(&chunk.data);
        on_progress(chunk.end(), chunk.total);
    }
    Ok(digest.finalize())
}

/// Computes the MD5 of the file at `path`, reading it in `chunk_size`
/// blocks (0 selects the default).
pub async fn calculate_file_checksum<F>(
    path: &Path,
    chunk_size: usize,
    on_progress: F,
) -> Result<String, TransferError>
where
    F: FnMut(u64, u64),
{
    let mut reader = ChunkReader::open(path, chunk_size).await?;
    checksum_reader(&mut reader, on_progress).await
}
