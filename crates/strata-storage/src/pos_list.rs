//! Position lists: ordered sequences of row ids selected from a table

use std::ops::Index;

use strata_types::{ChunkId, RowId};

/// An ordered sequence of `RowId`s identifying selected rows of a table.
///
/// Position lists are shared between the reference segments of a chunk via
/// `Arc` and must not be mutated once wrapped. The single-chunk guarantee is
/// set by the creating operator when all entries point into one chunk, which
/// lets consumers skip the partition-by-chunk step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PosList {
    row_ids: Vec<RowId>,
    guarantees_single_chunk: bool,
}

impl PosList {
    pub fn new(row_ids: Vec<RowId>) -> Self {
        PosList { row_ids, guarantees_single_chunk: false }
    }

    /// Creator-asserted guarantee that every entry references `chunk_id`.
    pub fn with_single_chunk_guarantee(row_ids: Vec<RowId>, chunk_id: ChunkId) -> Self {
        debug_assert!(row_ids.iter().all(|row_id| row_id.is_null() || row_id.chunk_id == chunk_id));
        let _ = chunk_id;
        PosList { row_ids, guarantees_single_chunk: true }
    }

    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }

    pub fn references_single_chunk(&self) -> bool {
        self.guarantees_single_chunk
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RowId> {
        self.row_ids.iter()
    }

    pub fn row_ids(&self) -> &[RowId] {
        &self.row_ids
    }

    pub fn estimate_memory_usage(&self) -> usize {
        self.row_ids.capacity() * std::mem::size_of::<RowId>()
    }
}

impl Index<usize> for PosList {
    type Output = RowId;

    fn index(&self, index: usize) -> &RowId {
        &self.row_ids[index]
    }
}

impl FromIterator<RowId> for PosList {
    fn from_iter<I: IntoIterator<Item = RowId>>(iter: I) -> Self {
        PosList::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PosList {
    type Item = &'a RowId;
    type IntoIter = std::slice::Iter<'a, RowId>;

    fn into_iter(self) -> Self::IntoIter {
        self.row_ids.iter()
    }
}
