//! Sort-merge join

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::Table;
use strata_types::{
    AllTypeVariant, ColumnId, JoinMode, PredicateCondition, RowId, SortMode,
};

use crate::errors::ExecutorError;
use crate::evaluator::PqpExpressionRef;
use crate::operator::{
    input_table, operator_ref, DescriptionMode, Operator, OperatorRef, OperatorState,
};
use crate::operators::join::{
    build_join_output, null_position, validate_join_inputs, JoinPredicate, SecondaryPredicates,
};
use crate::reference_output::{materialize_column, OutputChunkMetadata};

/// Sorts both inputs on their join columns, then merges.
///
/// For `=` the merge walks runs of equal keys and emits their cross
/// products, so the output is value-clustered on the join columns and both
/// are marked `ordered_by Ascending` (NULL-key padding rows of the outer
/// modes come first, matching the Ascending NULLS FIRST contract). The
/// range conditions `<, <=, >, >=, !=` are supported for inner joins via a
/// boundary sweep over the sorted right side.
#[derive(Debug)]
pub struct JoinSortMerge {
    left: OperatorRef,
    right: OperatorRef,
    mode: JoinMode,
    predicate: JoinPredicate,
    secondary_predicates: Vec<PqpExpressionRef>,
    state: OperatorState,
}

impl JoinSortMerge {
    pub fn new(
        left: OperatorRef,
        right: OperatorRef,
        mode: JoinMode,
        predicate: JoinPredicate,
        secondary_predicates: Vec<PqpExpressionRef>,
    ) -> Result<Self, ExecutorError> {
        match mode {
            JoinMode::Cross => {
                return Err(ExecutorError::InvalidJoin(
                    "cross joins take no predicate; use the nested loop join".to_string(),
                ))
            }
            JoinMode::Semi | JoinMode::AntiNullAsTrue | JoinMode::AntiNullAsFalse => {
                return Err(ExecutorError::InvalidJoin(
                    "semi and anti joins are served by the hash join".to_string(),
                ))
            }
            _ => {}
        }
        if predicate.condition != PredicateCondition::Equals && mode != JoinMode::Inner {
            return Err(ExecutorError::InvalidJoin(format!(
                "sort-merge supports {} only for inner joins",
                predicate.condition
            )));
        }
        if matches!(
            predicate.condition,
            PredicateCondition::IsNull
                | PredicateCondition::IsNotNull
                | PredicateCondition::BetweenInclusive
        ) {
            return Err(ExecutorError::InvalidJoin(format!(
                "{} is not a join condition",
                predicate.condition
            )));
        }
        Ok(JoinSortMerge {
            left,
            right,
            mode,
            predicate,
            secondary_predicates,
            state: OperatorState::new(),
        })
    }
}

type KeyedPositions = Vec<(AllTypeVariant, RowId, usize)>;

/// Split into NULL-key and sorted non-NULL-key entries, remembering row
/// ordinals for secondary predicate evaluation.
fn sorted_keys(keys: Vec<(AllTypeVariant, RowId)>) -> (KeyedPositions, KeyedPositions) {
    let mut nulls = Vec::new();
    let mut values = Vec::new();
    for (ordinal, (key, position)) in keys.into_iter().enumerate() {
        if key.is_null() {
            nulls.push((key, position, ordinal));
        } else {
            values.push((key, position, ordinal));
        }
    }
    values.sort_by(|a, b| a.0.cmp(&b.0));
    (nulls, values)
}

/// End of the run of equal keys starting at `start`.
fn run_end(entries: &KeyedPositions, start: usize) -> usize {
    let mut end = start + 1;
    while end < entries.len() && entries[end].0 == entries[start].0 {
        end += 1;
    }
    end
}

impl Operator for JoinSortMerge {
    fn name(&self) -> &'static str {
        "JoinSortMerge"
    }

    fn description(&self, _mode: DescriptionMode) -> String {
        format!(
            "JoinSortMerge {} on left.{} {} right.{}",
            self.mode,
            self.predicate.left_column_id,
            self.predicate.condition,
            self.predicate.right_column_id
        )
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
        validate_join_inputs(&left, &right, &self.predicate)?;

        let secondaries =
            SecondaryPredicates::prepare(&self.secondary_predicates, &left, &right);
        let (left_nulls, left_sorted) =
            sorted_keys(materialize_column(&left, self.predicate.left_column_id)?);
        let (right_nulls, right_sorted) =
            sorted_keys(materialize_column(&right, self.predicate.right_column_id)?);

        self.state.check_cancelled()?;
        let mut left_positions: Vec<RowId> = Vec::new();
        let mut right_positions: Vec<RowId> = Vec::new();
        let mut emitted_padding = false;

        if self.predicate.condition == PredicateCondition::Equals {
            // NULL keys never match; under the outer modes they surface as
            // padded rows, leading the output (Ascending places NULLs
            // first).
            if matches!(self.mode, JoinMode::Left | JoinMode::FullOuter) {
                for (_, position, _) in &left_nulls {
                    left_positions.push(*position);
                    right_positions.push(null_position());
                    emitted_padding = true;
                }
            }
            if matches!(self.mode, JoinMode::Right | JoinMode::FullOuter) {
                for (_, position, _) in &right_nulls {
                    left_positions.push(null_position());
                    right_positions.push(*position);
                    emitted_padding = true;
                }
            }

            let mut left_index = 0;
            let mut right_index = 0;
            while left_index < left_sorted.len() && right_index < right_sorted.len() {
                let left_run = run_end(&left_sorted, left_index);
                let right_run = run_end(&right_sorted, right_index);
                match left_sorted[left_index].0.cmp(&right_sorted[right_index].0) {
                    CmpOrdering::Less => {
                        if matches!(self.mode, JoinMode::Left | JoinMode::FullOuter) {
                            for entry in &left_sorted[left_index..left_run] {
                                left_positions.push(entry.1);
                                right_positions.push(null_position());
                                emitted_padding = true;
                            }
                        }
                        left_index = left_run;
                    }
                    CmpOrdering::Greater => {
                        if matches!(self.mode, JoinMode::Right | JoinMode::FullOuter) {
                            for entry in &right_sorted[right_index..right_run] {
                                left_positions.push(null_position());
                                right_positions.push(entry.1);
                                emitted_padding = true;
                            }
                        }
                        right_index = right_run;
                    }
                    CmpOrdering::Equal => {
                        for left_entry in &left_sorted[left_index..left_run] {
                            let mut matched = false;
                            for right_entry in &right_sorted[right_index..right_run] {
                                if secondaries.accepts(left_entry.2, right_entry.2)? {
                                    matched = true;
                                    left_positions.push(left_entry.1);
                                    right_positions.push(right_entry.1);
                                }
                            }
                            if !matched
                                && matches!(self.mode, JoinMode::Left | JoinMode::FullOuter)
                            {
                                left_positions.push(left_entry.1);
                                right_positions.push(null_position());
                                emitted_padding = true;
                            }
                        }
                        if matches!(self.mode, JoinMode::Right | JoinMode::FullOuter)
                            && !self.secondary_predicates.is_empty()
                        {
                            // With secondaries a right row of an equal run
                            // may still match nothing.
                            for right_entry in &right_sorted[right_index..right_run] {
                                let mut matched = false;
                                for left_entry in &left_sorted[left_index..left_run] {
                                    if secondaries.accepts(left_entry.2, right_entry.2)? {
                                        matched = true;
                                        break;
                                    }
                                }
                                if !matched {
                                    left_positions.push(null_position());
                                    right_positions.push(right_entry.1);
                                    emitted_padding = true;
                                }
                            }
                        }
                        left_index = left_run;
                        right_index = right_run;
                    }
                }
            }
            if matches!(self.mode, JoinMode::Left | JoinMode::FullOuter) {
                for entry in &left_sorted[left_index..] {
                    left_positions.push(entry.1);
                    right_positions.push(null_position());
                    emitted_padding = true;
                }
            }
            if matches!(self.mode, JoinMode::Right | JoinMode::FullOuter) {
                for entry in &right_sorted[right_index..] {
                    left_positions.push(null_position());
                    right_positions.push(entry.1);
                    emitted_padding = true;
                }
            }
        } else {
            // Range merge, inner only: for every left run the matching right
            // region is a boundary away in the sorted right side.
            for left_entry in &left_sorted {
                let equal_start = right_sorted
                    .partition_point(|entry| entry.0.cmp(&left_entry.0) == CmpOrdering::Less);
                let equal_end = right_sorted
                    .partition_point(|entry| entry.0.cmp(&left_entry.0) != CmpOrdering::Greater);
                let ranges: [(usize, usize); 2] = match self.predicate.condition {
                    // left < right: everything after the equal run.
                    PredicateCondition::LessThan => [(equal_end, right_sorted.len()), (0, 0)],
                    PredicateCondition::LessThanEquals => {
                        [(equal_start, right_sorted.len()), (0, 0)]
                    }
                    PredicateCondition::GreaterThan => [(0, equal_start), (0, 0)],
                    PredicateCondition::GreaterThanEquals => [(0, equal_end), (0, 0)],
                    PredicateCondition::NotEquals => {
                        [(0, equal_start), (equal_end, right_sorted.len())]
                    }
                    _ => unreachable!("validated at construction"),
                };
                for (from, to) in ranges {
                    for right_entry in &right_sorted[from..to] {
                        if secondaries.accepts(left_entry.2, right_entry.2)? {
                            left_positions.push(left_entry.1);
                            right_positions.push(right_entry.1);
                        }
                    }
                }
            }
        }

        // Equi-merge output is ordered by key and value-clustered on both
        // join columns; padding rows would break the right column's order.
        let metadata = if self.predicate.condition == PredicateCondition::Equals
            && (self.mode == JoinMode::Inner || !emitted_padding)
        {
            let left_output_column = self.predicate.left_column_id;
            let right_output_column = ColumnId(
                (left.column_count() + self.predicate.right_column_id.as_usize()) as u16,
            );
            OutputChunkMetadata {
                ordered_by: vec![
                    (left_output_column, SortMode::Ascending),
                    (right_output_column, SortMode::Ascending),
                ],
                value_clustered_by: vec![left_output_column, right_output_column],
            }
        } else {
            OutputChunkMetadata::default()
        };

        let output = build_join_output(
            self.mode,
            &left,
            &right,
            &left_positions,
            &right_positions,
            &metadata,
        )?;
        self.state.set_output(output);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(
            JoinSortMerge::new(
                self.left.lock().deep_copy(),
                self.right.lock().deep_copy(),
                self.mode,
                self.predicate.clone(),
                self.secondary_predicates.clone(),
            )
            .expect("parameters were validated when this operator was built"),
        )
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}
