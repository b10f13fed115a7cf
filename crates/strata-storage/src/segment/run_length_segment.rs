//! Run-length-encoded segments

use strata_types::{AllTypeVariant, ChunkOffset, DataType};

use crate::segment::value_segment::ValueSegment;
use crate::typed_values::TypedValues;

/// A run-length-encoded column fragment: parallel vectors of run values, run
/// null flags and run end positions.
///
/// Invariant: `end_positions` is strictly increasing and its last entry
/// equals the segment length. A run is `[previous end, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLengthSegment {
    values: TypedValues,
    null_runs: Vec<bool>,
    end_positions: Vec<ChunkOffset>,
}

impl RunLengthSegment {
    /// Encode an unencoded segment.
    pub fn encode(segment: &ValueSegment) -> Self {
        let mut values = TypedValues::new(segment.data_type());
        let mut null_runs = Vec::new();
        let mut end_positions: Vec<ChunkOffset> = Vec::new();

        let mut current: Option<AllTypeVariant> = None;
        for offset in 0..segment.len() as ChunkOffset {
            let value = segment.get(offset);
            if current.as_ref() == Some(&value) {
                *end_positions.last_mut().expect("run exists while current is set") = offset + 1;
                continue;
            }
            if value.is_null() {
                values.push_default();
                null_runs.push(true);
            } else {
                values.push(value.clone()).expect("value type matches segment type");
                null_runs.push(false);
            }
            end_positions.push(offset + 1);
            current = Some(value);
        }

        debug_assert!(end_positions.windows(2).all(|w| w[0] < w[1]));
        debug_assert_eq!(
            end_positions.last().copied().unwrap_or(0) as usize,
            segment.len()
        );

        RunLengthSegment { values, null_runs, end_positions }
    }

    pub fn data_type(&self) -> DataType {
        self.values.data_type()
    }

    pub fn len(&self) -> usize {
        self.end_positions.last().copied().unwrap_or(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end_positions.is_empty()
    }

    pub fn run_count(&self) -> usize {
        self.end_positions.len()
    }

    pub fn end_positions(&self) -> &[ChunkOffset] {
        &self.end_positions
    }

    /// Index of the run covering `offset`.
    fn run_index(&self, offset: ChunkOffset) -> usize {
        self.end_positions.partition_point(|&end| end <= offset)
    }

    pub fn is_null_at(&self, offset: ChunkOffset) -> bool {
        self.null_runs[self.run_index(offset)]
    }

    pub fn get(&self, offset: ChunkOffset) -> AllTypeVariant {
        let run = self.run_index(offset);
        if self.null_runs[run] {
            AllTypeVariant::Null
        } else {
            self.values.get(run)
        }
    }

    /// Walk runs in order, invoking `f` per position. Cheaper than `get` per
    /// offset because the run lookup is amortized away.
    pub fn for_each<F: FnMut(ChunkOffset, AllTypeVariant)>(&self, mut f: F) {
        let mut start: ChunkOffset = 0;
        for run in 0..self.run_count() {
            let end = self.end_positions[run];
            let value = if self.null_runs[run] {
                AllTypeVariant::Null
            } else {
                self.values.get(run)
            };
            for offset in start..end {
                f(offset, value.clone());
            }
            start = end;
        }
    }

    pub fn estimate_memory_usage(&self) -> usize {
        self.values.estimate_memory_usage()
            + self.null_runs.capacity()
            + self.end_positions.capacity() * std::mem::size_of::<ChunkOffset>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_segment(values: &[Option<i32>]) -> ValueSegment {
        let variants = values
            .iter()
            .map(|v| v.map_or(AllTypeVariant::Null, AllTypeVariant::Int32))
            .collect();
        ValueSegment::from_values(DataType::Int32, true, variants).unwrap()
    }

    #[test]
    fn test_runs_collapse() {
        let segment = int_segment(&[Some(1), Some(1), Some(1), None, None, Some(2)]);
        let encoded = RunLengthSegment::encode(&segment);

        assert_eq!(encoded.run_count(), 3);
        assert_eq!(encoded.end_positions(), &[3, 5, 6]);
        assert_eq!(encoded.len(), 6);
    }

    #[test]
    fn test_round_trip() {
        let segment = int_segment(&[Some(1), Some(1), None, Some(2), Some(2), Some(1)]);
        let encoded = RunLengthSegment::encode(&segment);

        for offset in 0..segment.len() as ChunkOffset {
            assert_eq!(encoded.get(offset), segment.get(offset), "offset {}", offset);
        }
    }

    #[test]
    fn test_for_each_visits_in_order() {
        let segment = int_segment(&[Some(4), Some(4), Some(9)]);
        let encoded = RunLengthSegment::encode(&segment);

        let mut seen = Vec::new();
        encoded.for_each(|offset, value| seen.push((offset, value)));
        assert_eq!(
            seen,
            vec![
                (0, AllTypeVariant::Int32(4)),
                (1, AllTypeVariant::Int32(4)),
                (2, AllTypeVariant::Int32(9)),
            ]
        );
    }

    #[test]
    fn test_empty_segment() {
        let segment = int_segment(&[]);
        let encoded = RunLengthSegment::encode(&segment);
        assert!(encoded.is_empty());
        assert_eq!(encoded.len(), 0);
    }
}
