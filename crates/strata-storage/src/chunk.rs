//! Chunks: horizontal partitions of a table

use std::sync::Arc;

use strata_types::{AllTypeVariant, ChunkOffset, ColumnId, CommitId, SortMode};

use crate::error::StorageError;
use crate::segment::Segment;
use crate::statistics::SegmentStatistics;

/// One entry of a chunk's ordering metadata.
pub type OrderedBy = (ColumnId, SortMode);

/// An ordered tuple of same-length segments plus metadata.
///
/// Chunks start out mutable (appendable) and transition to finalized once
/// full; finalization freezes the data, computes per-segment pruning
/// statistics and permits encoding. All segments always have equal length.
#[derive(Debug, Clone)]
pub struct Chunk {
    segments: Vec<Arc<Segment>>,
    ordered_by: Vec<OrderedBy>,
    value_clustered_by: Vec<ColumnId>,
    invalid_row_count: u64,
    cleanup_commit_id: Option<CommitId>,
    statistics: Vec<Option<Arc<SegmentStatistics>>>,
    is_mutable: bool,
}

impl Chunk {
    /// Create a mutable chunk from segments of equal length.
    pub fn new(segments: Vec<Arc<Segment>>) -> Result<Self, StorageError> {
        if let Some(first) = segments.first() {
            let expected = first.len();
            for segment in &segments[1..] {
                if segment.len() != expected {
                    return Err(StorageError::SegmentLengthMismatch {
                        expected,
                        actual: segment.len(),
                    });
                }
            }
        }
        let column_count = segments.len();
        Ok(Chunk {
            segments,
            ordered_by: Vec::new(),
            value_clustered_by: Vec::new(),
            invalid_row_count: 0,
            cleanup_commit_id: None,
            statistics: vec![None; column_count],
            is_mutable: true,
        })
    }

    pub fn column_count(&self) -> usize {
        self.segments.len()
    }

    /// Number of rows in the chunk.
    pub fn size(&self) -> ChunkOffset {
        self.segments.first().map_or(0, |segment| segment.len() as ChunkOffset)
    }

    pub fn is_mutable(&self) -> bool {
        self.is_mutable
    }

    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    pub fn get_segment(&self, column_id: ColumnId) -> Option<&Arc<Segment>> {
        self.segments.get(column_id.as_usize())
    }

    /// Append one row. Only valid while the chunk is mutable and every
    /// segment is unencoded and unshared.
    pub fn append(&mut self, values: &[AllTypeVariant]) -> Result<(), StorageError> {
        if !self.is_mutable {
            return Err(StorageError::ChunkFinalized);
        }
        if values.len() != self.segments.len() {
            return Err(StorageError::ColumnCountMismatch {
                expected: self.segments.len(),
                actual: values.len(),
            });
        }
        for (segment, value) in self.segments.iter_mut().zip(values) {
            let segment = Arc::get_mut(segment).ok_or(StorageError::ChunkFinalized)?;
            match segment {
                Segment::Value(value_segment) => value_segment.append(value.clone())?,
                _ => {
                    return Err(StorageError::InvalidEncoding(
                        "appending requires unencoded segments".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Freeze the chunk and build per-segment pruning statistics.
    pub fn finalize(&mut self) {
        if !self.is_mutable {
            return;
        }
        self.is_mutable = false;
        self.statistics = self
            .segments
            .iter()
            .map(|segment| SegmentStatistics::build(segment).map(Arc::new))
            .collect();
    }

    /// Pruning statistics of a column; present once the chunk is finalized
    /// (and the segment has non-NULL values).
    pub fn statistics(&self, column_id: ColumnId) -> Option<&Arc<SegmentStatistics>> {
        self.statistics.get(column_id.as_usize()).and_then(|s| s.as_ref())
    }

    /// Declare that the chunk's rows are ordered accordingly. At most one
    /// ordering is kept; the caller asserts it actually holds.
    pub fn set_ordered_by(&mut self, ordered_by: Vec<OrderedBy>) {
        self.ordered_by = ordered_by;
    }

    pub fn ordered_by(&self) -> &[OrderedBy] {
        &self.ordered_by
    }

    /// Declare that rows with equal keys on these columns are contiguous.
    pub fn set_value_clustered_by(&mut self, columns: Vec<ColumnId>) {
        self.value_clustered_by = columns;
    }

    pub fn value_clustered_by(&self) -> &[ColumnId] {
        &self.value_clustered_by
    }

    pub fn invalid_row_count(&self) -> u64 {
        self.invalid_row_count
    }

    pub fn set_invalid_row_count(&mut self, count: u64) {
        self.invalid_row_count = count;
    }

    pub fn cleanup_commit_id(&self) -> Option<CommitId> {
        self.cleanup_commit_id
    }

    pub fn set_cleanup_commit_id(&mut self, commit_id: CommitId) {
        self.cleanup_commit_id = Some(commit_id);
    }

    pub fn estimate_memory_usage(&self) -> usize {
        self.segments.iter().map(|segment| segment.estimate_memory_usage()).sum()
    }
}

#[cfg(test)]
mod tests {
    use strata_types::DataType;

    use crate::segment::ValueSegment;

    use super::*;

    fn int_segment(values: &[i32]) -> Arc<Segment> {
        Arc::new(Segment::Value(
            ValueSegment::from_values(
                DataType::Int32,
                false,
                values.iter().map(|&v| AllTypeVariant::Int32(v)).collect(),
            )
            .unwrap(),
        ))
    }

    #[test]
    fn test_segments_must_have_equal_length() {
        let result = Chunk::new(vec![int_segment(&[1, 2]), int_segment(&[1])]);
        assert!(result.is_err());
    }

    #[test]
    fn test_append_then_finalize() {
        let mut chunk = Chunk::new(vec![
            Arc::new(Segment::Value(ValueSegment::new(DataType::Int32, false))),
            Arc::new(Segment::Value(ValueSegment::new(DataType::String, true))),
        ])
        .unwrap();

        chunk
            .append(&[AllTypeVariant::Int32(1), AllTypeVariant::String("a".into())])
            .unwrap();
        chunk.append(&[AllTypeVariant::Int32(2), AllTypeVariant::Null]).unwrap();
        assert_eq!(chunk.size(), 2);

        chunk.finalize();
        assert!(!chunk.is_mutable());
        assert!(chunk.statistics(ColumnId(0)).is_some());
        assert!(chunk
            .append(&[AllTypeVariant::Int32(3), AllTypeVariant::Null])
            .is_err());
    }

    #[test]
    fn test_ordered_by_metadata() {
        let mut chunk = Chunk::new(vec![int_segment(&[1, 2, 3])]).unwrap();
        chunk.set_ordered_by(vec![(ColumnId(0), SortMode::Ascending)]);
        assert_eq!(chunk.ordered_by(), &[(ColumnId(0), SortMode::Ascending)]);
    }
}
