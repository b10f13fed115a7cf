//! Set difference on whole-row equality

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::Table;
use strata_types::{AllTypeVariant, ChunkId, RowId};

use crate::errors::ExecutorError;
use crate::operator::{
    input_table, operator_ref, Operator, OperatorRef, OperatorState,
};
use crate::reference_output::{
    build_reference_table, OutputChunkMetadata, OutputSide,
};

/// Emits every left row that has no identical row in the right input. Left
/// multiplicity is preserved: if a row value appears in the right input at
/// all, every left occurrence is dropped; otherwise every occurrence stays.
///
/// The left input's chunk order is scanned in place, so a left `ordered_by`
/// is inherited by the output.
#[derive(Debug)]
pub struct Difference {
    left: OperatorRef,
    right: OperatorRef,
    state: OperatorState,
}

impl Difference {
    pub fn new(left: OperatorRef, right: OperatorRef) -> Self {
        Difference { left, right, state: OperatorState::new() }
    }
}

impl Operator for Difference {
    fn name(&self) -> &'static str {
        "Difference"
    }

    fn input_left(&self) -> Option<OperatorRef> {
        Some(self.left.clone())
    }

    fn input_right(&self) -> Option<OperatorRef> {
        Some(self.right.clone())
    }

    fn is_executed(&self) -> bool {
        self.state.is_executed()
    }

    fn execute(&mut self) -> Result<(), ExecutorError> {
        self.state.begin_execute()?;
        let left = input_table(&self.left)?;
        let right = input_table(&self.right)?;

        if left.column_count() != right.column_count() {
            return Err(ExecutorError::SchemaMismatch {
                reason: format!(
                    "difference inputs have {} vs {} columns",
                    left.column_count(),
                    right.column_count()
                ),
            });
        }
        for (left_definition, right_definition) in
            left.column_definitions().iter().zip(right.column_definitions())
        {
            if left_definition.data_type != right_definition.data_type {
                return Err(ExecutorError::TypeMismatch {
                    expected: left_definition.data_type,
                    actual: right_definition.data_type,
                });
            }
        }

        let right_rows: HashSet<Vec<AllTypeVariant>> = right.rows().into_iter().collect();

        // One output chunk per surviving left chunk keeps the left ordering
        // metadata truthful.
        let mut output: Option<Table> = None;
        for (chunk_index, chunk) in left.chunks().iter().enumerate() {
            self.state.check_cancelled()?;
            let mut positions: Vec<RowId> = Vec::new();
            for offset in 0..chunk.size() {
                let row: Vec<AllTypeVariant> =
                    chunk.segments().iter().map(|segment| segment.get(offset)).collect();
                if !right_rows.contains(&row) {
                    positions.push(RowId::new(ChunkId(chunk_index as u32), offset));
                }
            }
            if positions.is_empty() {
                continue;
            }
            let metadata = OutputChunkMetadata {
                ordered_by: chunk.ordered_by().to_vec(),
                value_clustered_by: Vec::new(),
            };
            let chunk_table = build_reference_table(
                &[OutputSide { input: &left, positions: &positions, force_nullable: false }],
                positions.len().max(1) as u32,
                &metadata,
            )?;
            match &mut output {
                None => output = Some(chunk_table),
                Some(output) => {
                    for produced in chunk_table.chunks() {
                        output.append_prepared_chunk((*produced).clone())?;
                    }
                }
            }
        }

        let output = match output {
            Some(output) => output,
            // All rows eliminated (or empty left input): empty reference
            // table with the left schema.
            None => build_reference_table(
                &[OutputSide { input: &left, positions: &[], force_nullable: false }],
                left.target_chunk_size(),
                &OutputChunkMetadata::default(),
            )?,
        };
        self.state.set_output(output);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(Difference::new(
            self.left.lock().deep_copy(),
            self.right.lock().deep_copy(),
        ))
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}
