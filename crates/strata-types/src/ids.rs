//! Typed identifiers shared across the storage and execution layers

use std::fmt;

/// 0-based index of a column within a table or a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnId(pub u16);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ColumnId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// 0-based index of a chunk within a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(pub u32);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ChunkId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// 0-based offset of a row within a chunk.
pub type ChunkOffset = u32;

/// Offset value reserved for "no row"; used by NULL-padding join positions.
pub const INVALID_CHUNK_OFFSET: ChunkOffset = ChunkOffset::MAX;

/// Index into a dictionary segment's dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commit id attached to chunks by the (external) transaction layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitId(pub u32);

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a row within a table: chunk plus offset within the chunk.
///
/// RowIds are stable for the lifetime of a table unless compaction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId {
    pub chunk_id: ChunkId,
    pub chunk_offset: ChunkOffset,
}

/// RowId sentinel for "references no row" (outer join NULL padding).
pub const NULL_ROW_ID: RowId =
    RowId { chunk_id: ChunkId(u32::MAX), chunk_offset: INVALID_CHUNK_OFFSET };

impl RowId {
    pub fn new(chunk_id: ChunkId, chunk_offset: ChunkOffset) -> Self {
        RowId { chunk_id, chunk_offset }
    }

    pub fn is_null(&self) -> bool {
        self.chunk_offset == INVALID_CHUNK_OFFSET
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "RowId(NULL)")
        } else {
            write!(f, "RowId({}, {})", self.chunk_id, self.chunk_offset)
        }
    }
}
