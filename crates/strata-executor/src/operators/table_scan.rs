//! Single-column predicate scan
//!
//! The scan proceeds chunk by chunk. Reference-segment chunks are split by
//! referenced chunk so the per-chunk implementations always see plain
//! segments (and can use the dictionary and sorted-range specializations);
//! matching positions are reported in input coordinates either way.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::{Chunk, DictionaryView, Segment, Table, TableType};
use strata_types::{
    AllTypeVariant, ChunkId, ChunkOffset, ColumnId, PredicateCondition, RowId, SortMode, ValueId,
};

use crate::errors::ExecutorError;
use crate::evaluator::compare_variants;
use crate::operator::{
    input_table, operator_ref, DescriptionMode, Operator, OperatorRef, OperatorState,
};
use crate::parallel::ParallelConfig;
use crate::reference_output::reference_segments_for_positions;

/// Scans one column for `column <condition> value [value2]`, producing a
/// reference table of the matching rows.
#[derive(Debug)]
pub struct TableScan {
    input: OperatorRef,
    column_id: ColumnId,
    condition: PredicateCondition,
    value: AllTypeVariant,
    value2: Option<AllTypeVariant>,
    state: OperatorState,
}

impl TableScan {
    pub fn new(
        input: OperatorRef,
        column_id: ColumnId,
        condition: PredicateCondition,
        value: AllTypeVariant,
        value2: Option<AllTypeVariant>,
    ) -> Result<Self, ExecutorError> {
        let expected_values = condition.value_count();
        let actual_values = match (&value, &value2) {
            (AllTypeVariant::Null, None)
                if matches!(
                    condition,
                    PredicateCondition::IsNull | PredicateCondition::IsNotNull
                ) =>
            {
                0
            }
            (_, None) => 1,
            (_, Some(_)) => 2,
        };
        if expected_values != actual_values {
            return Err(ExecutorError::InvalidPredicate(format!(
                "condition {} takes {} value(s), got {}",
                condition, expected_values, actual_values
            )));
        }
        Ok(TableScan { input, column_id, condition, value, value2, state: OperatorState::new() })
    }
}

impl Operator for TableScan {
    fn name(&self) -> &'static str {
        "TableScan"
    }

    fn description(&self, mode: DescriptionMode) -> String {
        let predicate = match self.condition {
            PredicateCondition::IsNull | PredicateCondition::IsNotNull => {
                format!("column {} {}", self.column_id, self.condition)
            }
            PredicateCondition::BetweenInclusive => format!(
                "column {} BETWEEN {} AND {}",
                self.column_id,
                self.value,
                self.value2.as_ref().expect("validated at construction")
            ),
            _ => format!("column {} {} {}", self.column_id, self.condition, self.value),
        };
        match mode {
            DescriptionMode::SingleLine => format!("TableScan({})", predicate),
            DescriptionMode::MultiLine => format!("TableScan\n  {}", predicate),
        }
    }

    fn input_left(&self) -> Option<OperatorRef> {
        Some(self.input.clone())
    }

    fn is_executed(&self) -> bool {
        self.state.is_executed()
    }

    fn execute(&mut self) -> Result<(), ExecutorError> {
        crate::profile!("table_scan");
        self.state.begin_execute()?;
        let input = input_table(&self.input)?;
        if self.column_id.as_usize() >= input.column_count() {
            return Err(ExecutorError::ColumnIdOutOfRange {
                column_id: self.column_id.as_usize(),
                column_count: input.column_count(),
            });
        }

        // Coerce the search values to the column type once. A value that
        // cannot be compared against the column is a construction-level type
        // error.
        let column_type = input.column_data_type(self.column_id);
        let scan = if self.condition.value_count() == 0 {
            ScanPredicate { condition: self.condition, value: AllTypeVariant::Null, value2: None }
        } else {
            let value = self.value.coerce_to(column_type).ok_or(
                ExecutorError::TypeMismatch { expected: column_type, actual: self.value.data_type() },
            )?;
            let value2 = match &self.value2 {
                Some(value2) => Some(value2.coerce_to(column_type).ok_or(
                    ExecutorError::TypeMismatch {
                        expected: column_type,
                        actual: value2.data_type(),
                    },
                )?),
                None => None,
            };
            ScanPredicate { condition: self.condition, value, value2 }
        };

        let chunks = input.chunks();
        let config = ParallelConfig::global();
        let chunk_matches: Vec<Vec<ChunkOffset>>;
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            if config.should_parallelize_scan(input.row_count() as usize) {
                chunk_matches = chunks
                    .par_iter()
                    .map(|chunk| scan_chunk(chunk, self.column_id, &scan))
                    .collect::<Result<_, _>>()?;
            } else {
                chunk_matches = chunks
                    .iter()
                    .map(|chunk| {
                        self.state.check_cancelled()?;
                        scan_chunk(chunk, self.column_id, &scan)
                    })
                    .collect::<Result<_, _>>()?;
            }
        }
        #[cfg(not(feature = "parallel"))]
        {
            let _ = config;
            chunk_matches = chunks
                .iter()
                .map(|chunk| {
                    self.state.check_cancelled()?;
                    scan_chunk(chunk, self.column_id, &scan)
                })
                .collect::<Result<_, _>>()?;
        }

        // One output chunk per input chunk with matches.
        let output = Table::new(
            input.column_definitions().to_vec(),
            TableType::References,
            input.target_chunk_size(),
        );
        for (chunk_index, offsets) in chunk_matches.iter().enumerate() {
            if offsets.is_empty() {
                continue;
            }
            let chunk_id = ChunkId(chunk_index as u32);
            let positions: Vec<RowId> =
                offsets.iter().map(|&offset| RowId::new(chunk_id, offset)).collect();
            let segments = reference_segments_for_positions(&input, &positions)?;
            let mut chunk = Chunk::new(segments)?;
            chunk.finalize();
            output.append_prepared_chunk(chunk)?;
        }
        self.state.set_output(output);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(
            TableScan::new(
                self.input.lock().deep_copy(),
                self.column_id,
                self.condition,
                self.value.clone(),
                self.value2.clone(),
            )
            .expect("parameters were validated when this operator was built"),
        )
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}

/// The coerced predicate applied per segment.
struct ScanPredicate {
    condition: PredicateCondition,
    value: AllTypeVariant,
    value2: Option<AllTypeVariant>,
}

impl ScanPredicate {
    /// Generic value comparison; NULL candidates only match IS NULL.
    fn matches(&self, candidate: &AllTypeVariant) -> bool {
        match self.condition {
            PredicateCondition::IsNull => return candidate.is_null(),
            PredicateCondition::IsNotNull => return !candidate.is_null(),
            _ => {}
        }
        if candidate.is_null() {
            return false;
        }
        let Some(ordering) = compare_variants(candidate, &self.value) else {
            return false;
        };
        match self.condition {
            PredicateCondition::Equals => ordering == CmpOrdering::Equal,
            PredicateCondition::NotEquals => ordering != CmpOrdering::Equal,
            PredicateCondition::LessThan => ordering == CmpOrdering::Less,
            PredicateCondition::LessThanEquals => ordering != CmpOrdering::Greater,
            PredicateCondition::GreaterThan => ordering == CmpOrdering::Greater,
            PredicateCondition::GreaterThanEquals => ordering != CmpOrdering::Less,
            PredicateCondition::BetweenInclusive => {
                let upper = self.value2.as_ref().expect("validated at construction");
                ordering != CmpOrdering::Less
                    && compare_variants(candidate, upper)
                        .map_or(false, |o| o != CmpOrdering::Greater)
            }
            PredicateCondition::IsNull | PredicateCondition::IsNotNull => {
                unreachable!("handled above")
            }
        }
    }

    /// A comparison with a non-NULL value can never match when the search
    /// value itself is NULL.
    fn never_matches(&self) -> bool {
        self.condition.value_count() >= 1 && self.value.is_null()
    }
}

/// Scan one chunk, returning matching offsets in chunk coordinates (for
/// reference chunks: indices into the chunk's position lists), ascending.
fn scan_chunk(
    chunk: &Chunk,
    column_id: ColumnId,
    scan: &ScanPredicate,
) -> Result<Vec<ChunkOffset>, ExecutorError> {
    if scan.never_matches() {
        return Ok(Vec::new());
    }
    let segment = chunk.get_segment(column_id).ok_or(ExecutorError::ColumnIdOutOfRange {
        column_id: column_id.as_usize(),
        column_count: chunk.column_count(),
    })?;

    match segment.as_ref() {
        Segment::Reference(reference) => scan_reference_segment(reference, scan),
        _ => {
            // Chunk pruning: skip the chunk when the segment statistics rule
            // out any match.
            if let Some(statistics) = chunk.statistics(column_id) {
                if scan.condition.value_count() >= 1
                    && statistics.can_prune(scan.condition, &scan.value, scan.value2.as_ref())
                {
                    return Ok(Vec::new());
                }
            }
            let sorted_mode = chunk.ordered_by().iter().find_map(|(ordered_column, mode)| {
                (*ordered_column == column_id).then_some(*mode)
            });
            let mut matches = Vec::new();
            scan_plain_segment(segment, sorted_mode, scan, None, &mut matches);
            Ok(matches)
        }
    }
}

/// Partition a reference segment's position list by referenced chunk, scan
/// each referenced segment with the partition as a position filter, and
/// report matches as indices into the position list.
fn scan_reference_segment(
    reference: &strata_storage::ReferenceSegment,
    scan: &ScanPredicate,
) -> Result<Vec<ChunkOffset>, ExecutorError> {
    let referenced_table = reference.referenced_table();
    let mut partitions: HashMap<ChunkId, Vec<(ChunkOffset, ChunkOffset)>> = HashMap::new();
    let mut matches: Vec<ChunkOffset> = Vec::new();

    for (index, row_id) in reference.pos_list().iter().enumerate() {
        if row_id.is_null() {
            // NULL rows (outer join padding) match IS NULL only.
            if scan.condition == PredicateCondition::IsNull {
                matches.push(index as ChunkOffset);
            }
            continue;
        }
        partitions
            .entry(row_id.chunk_id)
            .or_default()
            .push((row_id.chunk_offset, index as ChunkOffset));
    }

    for (referenced_chunk_id, filter) in partitions {
        let referenced_chunk = referenced_table.get_chunk(referenced_chunk_id).ok_or_else(|| {
            ExecutorError::SchemaMismatch {
                reason: format!("position list references missing chunk {}", referenced_chunk_id),
            }
        })?;
        let referenced_segment = referenced_chunk
            .get_segment(reference.referenced_column_id())
            .ok_or(ExecutorError::ColumnIdOutOfRange {
                column_id: reference.referenced_column_id().as_usize(),
                column_count: referenced_chunk.column_count(),
            })?;
        debug_assert!(
            !referenced_segment.is_reference(),
            "reference segments never reference reference segments"
        );
        scan_plain_segment(referenced_segment, None, scan, Some(&filter), &mut matches);
    }

    // Partitions are scanned per referenced chunk; restore position-list
    // order.
    matches.sort_unstable();
    Ok(matches)
}

/// Scan a non-reference segment. Without a filter, offsets are emitted in
/// ascending order; with one, the filter's payload offsets are emitted for
/// matching positions.
///
/// Specializations, in order of preference: binary search on segments known
/// to be sorted (full scans only), value-id comparison for dictionary
/// encodings, generic value iteration otherwise.
fn scan_plain_segment(
    segment: &Segment,
    sorted_mode: Option<SortMode>,
    scan: &ScanPredicate,
    position_filter: Option<&[(ChunkOffset, ChunkOffset)]>,
    matches: &mut Vec<ChunkOffset>,
) {
    if position_filter.is_none() {
        if let Some(mode) = sorted_mode {
            if scan_sorted_segment(segment, mode, scan, matches) {
                return;
            }
        }
    }
    if let Some(dictionary) = segment.as_dictionary() {
        scan_dictionary_segment(&dictionary, segment.len(), scan, position_filter, matches);
        return;
    }
    match position_filter {
        Some(filter) => {
            for &(offset, payload) in filter {
                if scan.matches(&segment.get(offset)) {
                    matches.push(payload);
                }
            }
        }
        None => {
            segment.for_each(None, |offset, value| {
                if scan.matches(&value) {
                    matches.push(offset);
                }
            });
        }
    }
}

/// Binary search over a segment whose chunk is ordered on this column.
/// Returns false when the ordering/condition combination is unsupported and
/// the caller must fall back. Matches of `=`/ranges form one contiguous
/// offset range which is written by incrementing; `!=` concatenates the two
/// surrounding ranges.
fn scan_sorted_segment(
    segment: &Segment,
    mode: SortMode,
    scan: &ScanPredicate,
    matches: &mut Vec<ChunkOffset>,
) -> bool {
    if matches!(scan.condition, PredicateCondition::IsNull | PredicateCondition::IsNotNull) {
        return false;
    }
    // Descending orderings flip the comparison; NULL placement decides where
    // the non-NULL region starts.
    let length = segment.len() as ChunkOffset;
    let ascending = mode.is_ascending();

    // Locate the non-NULL region [null_boundary.0, null_boundary.1).
    let first_non_null = if mode.nulls_first() {
        let mut low = 0;
        let mut high = length;
        while low < high {
            let mid = (low + high) / 2;
            if segment.is_null_at(mid) {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    } else {
        0
    };
    let end_non_null = if mode.nulls_first() {
        length
    } else {
        let mut low = 0;
        let mut high = length;
        while low < high {
            let mid = (low + high) / 2;
            if segment.is_null_at(mid) {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        low
    };

    // partition_point over the non-NULL region.
    let partition = |probe: &dyn Fn(&AllTypeVariant) -> bool| -> ChunkOffset {
        let mut low = first_non_null;
        let mut high = end_non_null;
        while low < high {
            let mid = (low + high) / 2;
            if probe(&segment.get(mid)) {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    };
    let less_than_value = |value: &AllTypeVariant, bound: &AllTypeVariant| -> bool {
        match compare_variants(value, bound) {
            Some(CmpOrdering::Less) => ascending,
            Some(CmpOrdering::Greater) => !ascending,
            _ => false,
        }
    };
    let lower_bound = |bound: &AllTypeVariant| partition(&|value| less_than_value(value, bound));
    let upper_bound = |bound: &AllTypeVariant| {
        partition(&|value| {
            less_than_value(value, bound)
                || compare_variants(value, bound) == Some(CmpOrdering::Equal)
        })
    };

    let push_range = |matches: &mut Vec<ChunkOffset>, from: ChunkOffset, to: ChunkOffset| {
        // Contiguous range: write offsets by incrementing instead of
        // re-deriving them per position.
        matches.extend(from..to);
    };

    match scan.condition {
        PredicateCondition::Equals => {
            push_range(matches, lower_bound(&scan.value), upper_bound(&scan.value));
        }
        PredicateCondition::NotEquals => {
            push_range(matches, first_non_null, lower_bound(&scan.value));
            push_range(matches, upper_bound(&scan.value), end_non_null);
        }
        PredicateCondition::LessThan => {
            if ascending {
                push_range(matches, first_non_null, lower_bound(&scan.value));
            } else {
                push_range(matches, upper_bound(&scan.value), end_non_null);
            }
        }
        PredicateCondition::LessThanEquals => {
            if ascending {
                push_range(matches, first_non_null, upper_bound(&scan.value));
            } else {
                push_range(matches, lower_bound(&scan.value), end_non_null);
            }
        }
        PredicateCondition::GreaterThan => {
            if ascending {
                push_range(matches, upper_bound(&scan.value), end_non_null);
            } else {
                push_range(matches, first_non_null, lower_bound(&scan.value));
            }
        }
        PredicateCondition::GreaterThanEquals => {
            if ascending {
                push_range(matches, lower_bound(&scan.value), end_non_null);
            } else {
                push_range(matches, first_non_null, upper_bound(&scan.value));
            }
        }
        PredicateCondition::BetweenInclusive => {
            let upper_value = scan.value2.as_ref().expect("validated at construction");
            if ascending {
                push_range(matches, lower_bound(&scan.value), upper_bound(upper_value));
            } else {
                push_range(matches, lower_bound(upper_value), upper_bound(&scan.value));
            }
        }
        PredicateCondition::IsNull | PredicateCondition::IsNotNull => unreachable!(),
    }
    true
}

/// Value-id comparison over a dictionary-family segment: the search value is
/// translated to dictionary bounds once, after which every position costs a
/// single integer comparison. `=`/`!=` short-circuit when the value is not
/// in the dictionary.
fn scan_dictionary_segment(
    dictionary: &DictionaryView<'_>,
    segment_length: usize,
    scan: &ScanPredicate,
    position_filter: Option<&[(ChunkOffset, ChunkOffset)]>,
    matches: &mut Vec<ChunkOffset>,
) {
    let null_value_id = dictionary.null_value_id();
    let dictionary_size = dictionary.unique_values_count() as u32;

    // Translate the predicate into a value-id test.
    enum ValueIdTest {
        Never,
        All,
        IsNull,
        IsNotNull,
        Equal(ValueId),
        NotEqual(ValueId),
        InRange(u32, u32),
    }

    let test = match scan.condition {
        PredicateCondition::IsNull => ValueIdTest::IsNull,
        PredicateCondition::IsNotNull => ValueIdTest::IsNotNull,
        PredicateCondition::Equals => {
            match (
                dictionary.lower_bound_value_id(&scan.value),
                dictionary.upper_bound_value_id(&scan.value),
            ) {
                (Some(lower), Some(upper)) if lower != upper => ValueIdTest::Equal(lower),
                // Early out: the value is not in this segment's dictionary.
                _ => ValueIdTest::Never,
            }
        }
        PredicateCondition::NotEquals => {
            match (
                dictionary.lower_bound_value_id(&scan.value),
                dictionary.upper_bound_value_id(&scan.value),
            ) {
                (Some(lower), Some(upper)) if lower != upper => ValueIdTest::NotEqual(lower),
                // Early out: nothing equals the value, all non-NULLs match.
                _ => ValueIdTest::All,
            }
        }
        PredicateCondition::LessThan => match dictionary.lower_bound_value_id(&scan.value) {
            Some(bound) => ValueIdTest::InRange(0, bound.0),
            None => ValueIdTest::Never,
        },
        PredicateCondition::LessThanEquals => {
            match dictionary.upper_bound_value_id(&scan.value) {
                Some(bound) => ValueIdTest::InRange(0, bound.0),
                None => ValueIdTest::Never,
            }
        }
        PredicateCondition::GreaterThan => match dictionary.upper_bound_value_id(&scan.value) {
            Some(bound) => ValueIdTest::InRange(bound.0, dictionary_size),
            None => ValueIdTest::Never,
        },
        PredicateCondition::GreaterThanEquals => {
            match dictionary.lower_bound_value_id(&scan.value) {
                Some(bound) => ValueIdTest::InRange(bound.0, dictionary_size),
                None => ValueIdTest::Never,
            }
        }
        PredicateCondition::BetweenInclusive => {
            let upper_value = scan.value2.as_ref().expect("validated at construction");
            match (
                dictionary.lower_bound_value_id(&scan.value),
                dictionary.upper_bound_value_id(upper_value),
            ) {
                (Some(lower), Some(upper)) => ValueIdTest::InRange(lower.0, upper.0),
                _ => ValueIdTest::Never,
            }
        }
    };

    let accepts = |value_id: ValueId| -> bool {
        match &test {
            ValueIdTest::Never => false,
            ValueIdTest::All => value_id != null_value_id,
            ValueIdTest::IsNull => value_id == null_value_id,
            ValueIdTest::IsNotNull => value_id != null_value_id,
            ValueIdTest::Equal(target) => value_id == *target,
            ValueIdTest::NotEqual(target) => {
                value_id != *target && value_id != null_value_id
            }
            ValueIdTest::InRange(from, to) => {
                value_id != null_value_id && value_id.0 >= *from && value_id.0 < *to
            }
        }
    };

    if matches!(test, ValueIdTest::Never) {
        return;
    }
    match position_filter {
        Some(filter) => {
            for &(offset, payload) in filter {
                if accepts(dictionary.value_id_at(offset)) {
                    matches.push(payload);
                }
            }
        }
        None => {
            for offset in 0..segment_length as ChunkOffset {
                if accepts(dictionary.value_id_at(offset)) {
                    matches.push(offset);
                }
            }
        }
    }
}
