//! Stable multi-key sort

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::Table;
use strata_types::{AllTypeVariant, ChunkOffset, ColumnId, RowId, SortMode};

use crate::errors::ExecutorError;
use crate::operator::{
    input_table, operator_ref, DescriptionMode, Operator, OperatorRef, OperatorState,
};
use crate::parallel::ParallelConfig;
use crate::reference_output::{
    build_reference_table, materialize_column, OutputChunkMetadata, OutputSide,
};

/// One sort key: the column and its direction/NULL placement.
pub type SortDefinition = (ColumnId, SortMode);

/// Stable multi-key sort. Keys apply in order, ties break on the next key;
/// rows with fully equal keys keep their input order. `Ascending` and
/// `Descending` place NULLs first, the `*NullsLast` modes place them last.
///
/// The output is a reference table cut into chunks of the requested size,
/// each marked `ordered_by` with the sort definitions.
#[derive(Debug)]
pub struct Sort {
    input: OperatorRef,
    definitions: Vec<SortDefinition>,
    output_chunk_size: Option<ChunkOffset>,
    state: OperatorState,
}

impl Sort {
    pub fn new(
        input: OperatorRef,
        definitions: Vec<SortDefinition>,
        output_chunk_size: Option<ChunkOffset>,
    ) -> Self {
        assert!(!definitions.is_empty(), "sort requires at least one sort definition");
        Sort { input, definitions, output_chunk_size, state: OperatorState::new() }
    }
}

/// Compare two key values under one sort mode.
pub(crate) fn compare_with_mode(
    a: &AllTypeVariant,
    b: &AllTypeVariant,
    mode: SortMode,
) -> CmpOrdering {
    match (a.is_null(), b.is_null()) {
        (true, true) => CmpOrdering::Equal,
        (true, false) => {
            if mode.nulls_first() {
                CmpOrdering::Less
            } else {
                CmpOrdering::Greater
            }
        }
        (false, true) => {
            if mode.nulls_first() {
                CmpOrdering::Greater
            } else {
                CmpOrdering::Less
            }
        }
        (false, false) => {
            let ordering = a.cmp(b);
            if mode.is_ascending() {
                ordering
            } else {
                ordering.reverse()
            }
        }
    }
}

impl Operator for Sort {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn description(&self, _mode: DescriptionMode) -> String {
        let keys: Vec<String> = self
            .definitions
            .iter()
            .map(|(column_id, mode)| format!("{} {}", column_id, mode))
            .collect();
        format!("Sort [{}]", keys.join(", "))
    }

    fn input_left(&self) -> Option<OperatorRef> {
        Some(self.input.clone())
    }

    fn is_executed(&self) -> bool {
        self.state.is_executed()
    }

    fn execute(&mut self) -> Result<(), ExecutorError> {
        self.state.begin_execute()?;
        let input = input_table(&self.input)?;
        for (column_id, _) in &self.definitions {
            if column_id.as_usize() >= input.column_count() {
                return Err(ExecutorError::ColumnIdOutOfRange {
                    column_id: column_id.as_usize(),
                    column_count: input.column_count(),
                });
            }
        }

        // Materialize (keys, position) pairs in storage order; the stable
        // sort then guarantees equal-key rows keep that order.
        let mut keyed: Vec<(Vec<AllTypeVariant>, RowId)> = Vec::new();
        for (index, (column_id, _)) in self.definitions.iter().enumerate() {
            self.state.check_cancelled()?;
            let column = materialize_column(&input, *column_id)?;
            if index == 0 {
                keyed = column
                    .into_iter()
                    .map(|(value, position)| (vec![value], position))
                    .collect();
            } else {
                for ((keys, _), (value, _)) in keyed.iter_mut().zip(column) {
                    keys.push(value);
                }
            }
        }

        let modes: Vec<SortMode> = self.definitions.iter().map(|(_, mode)| *mode).collect();
        let comparator = |a: &(Vec<AllTypeVariant>, RowId), b: &(Vec<AllTypeVariant>, RowId)| {
            for ((value_a, value_b), mode) in a.0.iter().zip(&b.0).zip(&modes) {
                let ordering = compare_with_mode(value_a, value_b, *mode);
                if ordering != CmpOrdering::Equal {
                    return ordering;
                }
            }
            CmpOrdering::Equal
        };

        let config = ParallelConfig::global();
        #[cfg(feature = "parallel")]
        {
            if config.should_parallelize_sort(keyed.len()) {
                use rayon::prelude::*;
                // par_sort_by is a stable merge sort; the stability
                // guarantee survives the parallel path.
                keyed.par_sort_by(comparator);
            } else {
                keyed.sort_by(comparator);
            }
        }
        #[cfg(not(feature = "parallel"))]
        {
            let _ = config;
            keyed.sort_by(comparator);
        }

        let positions: Vec<RowId> = keyed.into_iter().map(|(_, position)| position).collect();
        let metadata = OutputChunkMetadata {
            ordered_by: self.definitions.clone(),
            value_clustered_by: Vec::new(),
        };
        let output = build_reference_table(
            &[OutputSide { input: &input, positions: &positions, force_nullable: false }],
            self.output_chunk_size.unwrap_or_else(|| input.target_chunk_size()),
            &metadata,
        )?;
        self.state.set_output(output);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(Sort::new(
            self.input.lock().deep_copy(),
            self.definitions.clone(),
            self.output_chunk_size,
        ))
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}
