//! Shared join plumbing: predicates, candidate filtering, output building

use std::sync::Arc;

use strata_storage::Table;
use strata_types::{AllTypeVariant, ColumnId, JoinMode, PredicateCondition, RowId, NULL_ROW_ID};

use crate::errors::ExecutorError;
use crate::evaluator::PqpExpressionRef;
use crate::reference_output::{build_reference_table, OutputChunkMetadata, OutputSide};

/// The primary join predicate: one column per side plus the condition.
#[derive(Debug, Clone)]
pub struct JoinPredicate {
    pub left_column_id: ColumnId,
    pub right_column_id: ColumnId,
    pub condition: PredicateCondition,
}

impl JoinPredicate {
    pub fn new(
        left_column_id: ColumnId,
        right_column_id: ColumnId,
        condition: PredicateCondition,
    ) -> Self {
        JoinPredicate { left_column_id, right_column_id, condition }
    }
}

/// Secondary predicates are evaluated per candidate pair against the
/// concatenated (left row, right row) value vector.
pub(crate) struct SecondaryPredicates<'a> {
    predicates: &'a [PqpExpressionRef],
    left_rows: Vec<Vec<AllTypeVariant>>,
    right_rows: Vec<Vec<AllTypeVariant>>,
}

impl<'a> SecondaryPredicates<'a> {
    /// Materializes full rows only when there are predicates to evaluate.
    pub(crate) fn prepare(
        predicates: &'a [PqpExpressionRef],
        left: &Table,
        right: &Table,
    ) -> Self {
        if predicates.is_empty() {
            SecondaryPredicates { predicates, left_rows: Vec::new(), right_rows: Vec::new() }
        } else {
            SecondaryPredicates {
                predicates,
                left_rows: left.rows(),
                right_rows: right.rows(),
            }
        }
    }

    /// Whether the candidate pair (by row ordinal per side) survives all
    /// secondary predicates. NULL results reject the pair.
    pub(crate) fn accepts(
        &self,
        left_ordinal: usize,
        right_ordinal: usize,
    ) -> Result<bool, ExecutorError> {
        if self.predicates.is_empty() {
            return Ok(true);
        }
        let mut combined = self.left_rows[left_ordinal].clone();
        combined.extend(self.right_rows[right_ordinal].iter().cloned());
        for predicate in self.predicates {
            if !predicate.matches_row(&combined)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Validate the shared join construction contract.
pub(crate) fn validate_join_inputs(
    left: &Table,
    right: &Table,
    predicate: &JoinPredicate,
) -> Result<(), ExecutorError> {
    if predicate.left_column_id.as_usize() >= left.column_count() {
        return Err(ExecutorError::ColumnIdOutOfRange {
            column_id: predicate.left_column_id.as_usize(),
            column_count: left.column_count(),
        });
    }
    if predicate.right_column_id.as_usize() >= right.column_count() {
        return Err(ExecutorError::ColumnIdOutOfRange {
            column_id: predicate.right_column_id.as_usize(),
            column_count: right.column_count(),
        });
    }
    Ok(())
}

/// Assemble the join output as a reference table.
///
/// For Semi/Anti modes only `left_positions` is consulted; otherwise both
/// position vectors run in parallel and `NULL_ROW_ID` entries become NULL
/// padding (forcing that side's columns nullable per the outer mode).
pub(crate) fn build_join_output(
    mode: JoinMode,
    left: &Arc<Table>,
    right: &Arc<Table>,
    left_positions: &[RowId],
    right_positions: &[RowId],
    metadata: &OutputChunkMetadata,
) -> Result<Table, ExecutorError> {
    if mode.is_semi_or_anti() {
        return build_reference_table(
            &[OutputSide { input: left, positions: left_positions, force_nullable: false }],
            left.target_chunk_size(),
            metadata,
        );
    }
    debug_assert_eq!(left_positions.len(), right_positions.len());
    let left_nullable = matches!(mode, JoinMode::Right | JoinMode::FullOuter);
    let right_nullable = matches!(mode, JoinMode::Left | JoinMode::FullOuter);
    build_reference_table(
        &[
            OutputSide { input: left, positions: left_positions, force_nullable: left_nullable },
            OutputSide {
                input: right,
                positions: right_positions,
                force_nullable: right_nullable,
            },
        ],
        left.target_chunk_size(),
        metadata,
    )
}

/// Shorthand used by the pad-emitting joins.
pub(crate) fn null_position() -> RowId {
    NULL_ROW_ID
}
