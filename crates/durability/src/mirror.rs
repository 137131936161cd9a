//! Chunked in-memory arena for replayed metadata
//!
//! Chunk `k` holds `base << k` entries and is allocated with its full
//! capacity up front, so pushing never reallocates or moves an existing
//! entry. Index lookup is constant time.

/// Default capacity of the first chunk.
pub const DEFAULT_FIRST_CHUNK: usize = 1024;

/// Append-only arena of `Copy` entries in geometrically growing chunks.
#[derive(Debug, Clone)]
pub struct MetaArena<T: Copy> {
    first_chunk: usize,
    chunks: Vec<Vec<T>>,
    len: u64,
}

impl<T: Copy> Default for MetaArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> MetaArena<T> {
    /// Create an empty arena with the default first chunk size.
    pub fn new() -> Self {
        Self::with_first_chunk(DEFAULT_FIRST_CHUNK)
    }

    /// Create an empty arena whose first chunk holds `first_chunk` entries.
    ///
    /// A zero size is treated as 1.
    pub fn with_first_chunk(first_chunk: usize) -> Self {
        MetaArena {
            first_chunk: first_chunk.max(1),
            chunks: Vec::new(),
            len: 0,
        }
    }

    /// Append an entry, returning its index.
    pub fn push(&mut self, value: T) -> u64 {
        let index = self.len;
        let (chunk, _) = self.locate(index);
        if chunk == self.chunks.len() {
            self.chunks
                .push(Vec::with_capacity(self.first_chunk << chunk));
        }
        self.chunks[chunk].push(value);
        self.len += 1;
        index
    }

    /// Entry at `index`, if present.
    pub fn get(&self, index: u64) -> Option<T> {
        if index >= self.len {
            return None;
        }
        let (chunk, offset) = self.locate(index);
        self.chunks.get(chunk)?.get(offset).copied()
    }

    /// Number of entries.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.chunks.iter().flat_map(|chunk| chunk.iter().copied())
    }

    /// Number of allocated chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunk `k` covers `[base * (2^k - 1), base * (2^(k+1) - 1))`.
    #[inline]
    fn locate(&self, index: u64) -> (usize, usize) {
        let base = self.first_chunk as u64;
        let n = index / base + 1;
        let chunk = 63 - n.leading_zeros() as u64;
        let start = base * ((1u64 << chunk) - 1);
        (chunk as usize, (index - start) as usize)
    }
}
