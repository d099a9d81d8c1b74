/// A block of file data produced by [`ChunkReader`](crate::ChunkReader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset of the first byte of `data` within the source.
    pub offset: u64,
    /// Raw block data.
    pub data: Vec<u8>,
    /// Declared length of the whole source.
    pub total: u64,
}

impl Chunk {
    /// Cumulative number of bytes delivered once this block is consumed.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }

    /// Returns `true` if this is the final block of the source.
    pub fn is_last(&self) -> bool {
        self.end() >= self.total
    }
}
