//! Position-set union of two reference tables over the same originals

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::{Chunk, PosList, ReferenceSegment, Segment, Table, TableType};
use strata_types::{ColumnId, RowId};

use crate::errors::ExecutorError;
use crate::operator::{
    input_table, operator_ref, Operator, OperatorRef, OperatorState,
};

/// Unions the row positions of two reference tables that project the same
/// original table(s): the result references each original row at most once,
/// ordered by row id. Together with two single-predicate scans over a shared
/// input this implements a disjunction.
#[derive(Debug)]
pub struct UnionPositions {
    left: OperatorRef,
    right: OperatorRef,
    state: OperatorState,
}

impl UnionPositions {
    pub fn new(left: OperatorRef, right: OperatorRef) -> Self {
        UnionPositions { left, right, state: OperatorState::new() }
    }

    /// The row signature: for every column, the referenced row id.
    fn row_signatures(table: &Table) -> Result<Vec<Vec<RowId>>, ExecutorError> {
        let mut signatures = Vec::with_capacity(table.row_count() as usize);
        for chunk in table.chunks() {
            let reference_segments: Vec<&ReferenceSegment> = chunk
                .segments()
                .iter()
                .map(|segment| {
                    segment.as_reference().ok_or_else(|| ExecutorError::SchemaMismatch {
                        reason: "UnionPositions requires reference inputs".to_string(),
                    })
                })
                .collect::<Result<_, _>>()?;
            for offset in 0..chunk.size() {
                signatures.push(
                    reference_segments
                        .iter()
                        .map(|segment| segment.pos_list()[offset as usize])
                        .collect(),
                );
            }
        }
        Ok(signatures)
    }

    /// The referenced (table, column) per column, for validation and output
    /// construction.
    fn referenced_sources(
        table: &Table,
    ) -> Result<Vec<(Arc<Table>, ColumnId)>, ExecutorError> {
        let chunks = table.chunks();
        let Some(first) = chunks.first() else {
            return Err(ExecutorError::SchemaMismatch {
                reason: "UnionPositions requires at least one chunk per input".to_string(),
            });
        };
        first
            .segments()
            .iter()
            .map(|segment| {
                segment
                    .as_reference()
                    .map(|reference| {
                        (reference.referenced_table().clone(), reference.referenced_column_id())
                    })
                    .ok_or_else(|| ExecutorError::SchemaMismatch {
                        reason: "UnionPositions requires reference inputs".to_string(),
                    })
            })
            .collect()
    }
}

impl Operator for UnionPositions {
    fn name(&self) -> &'static str {
        "UnionPositions"
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

        if left.table_type() != TableType::References
            || right.table_type() != TableType::References
        {
            return Err(ExecutorError::SchemaMismatch {
                reason: "UnionPositions operates on reference tables".to_string(),
            });
        }
        if left.column_count() != right.column_count() {
            return Err(ExecutorError::SchemaMismatch {
                reason: "UnionPositions inputs expose different column counts".to_string(),
            });
        }

        // Empty inputs short-circuit: the other side is already the union.
        if left.row_count() == 0 {
            self.state.set_output_shared(right);
            return Ok(());
        }
        if right.row_count() == 0 {
            self.state.set_output_shared(left);
            return Ok(());
        }

        let left_sources = Self::referenced_sources(&left)?;
        let right_sources = Self::referenced_sources(&right)?;
        for ((left_table, left_column), (right_table, right_column)) in
            left_sources.iter().zip(&right_sources)
        {
            if !Arc::ptr_eq(left_table, right_table) || left_column != right_column {
                return Err(ExecutorError::SchemaMismatch {
                    reason: "UnionPositions inputs reference different originals".to_string(),
                });
            }
        }

        self.state.check_cancelled()?;
        let mut signatures = Self::row_signatures(&left)?;
        signatures.extend(Self::row_signatures(&right)?);
        signatures.sort_unstable();

        let mut seen: HashSet<Vec<RowId>> = HashSet::with_capacity(signatures.len());
        signatures.retain(|signature| seen.insert(signature.clone()));

        // Per column: its slot of every surviving signature. Columns that
        // carried identical position sequences share the rebuilt list.
        let column_count = left.column_count();
        let mut segments: Vec<Arc<Segment>> = Vec::with_capacity(column_count);
        let mut built: Vec<(Vec<RowId>, Arc<PosList>)> = Vec::new();
        for (column_index, (source_table, source_column)) in left_sources.iter().enumerate() {
            let rows: Vec<RowId> =
                signatures.iter().map(|signature| signature[column_index]).collect();
            let existing = built.iter().position(|(candidate, _)| *candidate == rows);
            let pos_list = match existing {
                Some(index) => built[index].1.clone(),
                None => {
                    let list = Arc::new(PosList::new(rows.clone()));
                    built.push((rows, list.clone()));
                    list
                }
            };
            segments.push(Arc::new(Segment::Reference(ReferenceSegment::new(
                source_table.clone(),
                *source_column,
                pos_list,
            ))));
        }

        let output = Table::new(
            left.column_definitions().to_vec(),
            TableType::References,
            left.target_chunk_size(),
        );
        let mut chunk = Chunk::new(segments)?;
        chunk.finalize();
        output.append_prepared_chunk(chunk)?;
        self.state.set_output(output);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(UnionPositions::new(
            self.left.lock().deep_copy(),
            self.right.lock().deep_copy(),
        ))
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}
