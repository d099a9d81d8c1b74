//! Chunked file reading and incremental checksums.
//!
//! A file is exposed as a bounded sequence of blocks ([`ChunkReader`])
//! which is folded into a running MD5 state ([`IncrementalDigest`]) so
//! that arbitrarily large files are hashed without holding them in memory.

mod chunked;
mod digest;
mod progress;
mod types;

pub use chunked::ChunkReader;
pub use digest::{IncrementalDigest, calculate_file_checksum, checksum_bytes, checksum_reader};
pub use progress::{SpeedCalculator, percent_complete};
pub use types::Chunk;

/// Default chunk size: 10 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("read error: {0}")]
    Read(#[from] std::io::Error),

    #[error("read error: source ended after {read} of {expected} bytes")]
    Truncated { read: u64, expected: u64 },
}
