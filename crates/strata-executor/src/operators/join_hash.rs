//! Hash join for equi-predicates

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::Table;
use strata_types::{AllTypeVariant, JoinMode, PredicateCondition, RowId};

use crate::errors::ExecutorError;
use crate::evaluator::PqpExpressionRef;
use crate::operator::{
    input_table, operator_ref, DescriptionMode, Operator, OperatorRef, OperatorState,
};
use crate::operators::join::{
    build_join_output, null_position, validate_join_inputs, JoinPredicate, SecondaryPredicates,
};
use crate::reference_output::{materialize_column, OutputChunkMetadata};

/// Equi-join: hash the smaller input's join keys, probe with the other
/// side. NULL keys never participate in matches; the Anti modes differ only
/// in what happens to a NULL-key left row (`AntiNullAsTrue` drops it,
/// `AntiNullAsFalse` keeps it — even when the right side is empty).
#[derive(Debug)]
pub struct JoinHash {
    left: OperatorRef,
    right: OperatorRef,
    mode: JoinMode,
    predicate: JoinPredicate,
    secondary_predicates: Vec<PqpExpressionRef>,
    state: OperatorState,
}

impl JoinHash {
    pub fn new(
        left: OperatorRef,
        right: OperatorRef,
        mode: JoinMode,
        predicate: JoinPredicate,
        secondary_predicates: Vec<PqpExpressionRef>,
    ) -> Result<Self, ExecutorError> {
        if predicate.condition != PredicateCondition::Equals {
            return Err(ExecutorError::InvalidJoin(
                "hash joins support equality predicates only".to_string(),
            ));
        }
        if mode == JoinMode::Cross {
            return Err(ExecutorError::InvalidJoin(
                "cross joins take no predicate; use the nested loop join".to_string(),
            ));
        }
        Ok(JoinHash { left, right, mode, predicate, secondary_predicates, state: OperatorState::new() })
    }
}

/// Hash table over one side's non-NULL keys, mapping to row ordinals.
fn build_hash_table(keys: &[(AllTypeVariant, RowId)]) -> HashMap<AllTypeVariant, Vec<usize>> {
    let mut table: HashMap<AllTypeVariant, Vec<usize>> = HashMap::with_capacity(keys.len());
    for (ordinal, (key, _)) in keys.iter().enumerate() {
        if !key.is_null() {
            table.entry(key.clone()).or_default().push(ordinal);
        }
    }
    table
}

impl Operator for JoinHash {
    fn name(&self) -> &'static str {
        "JoinHash"
    }

    fn description(&self, _mode: DescriptionMode) -> String {
        format!(
            "JoinHash {} on left.{} = right.{}",
            self.mode, self.predicate.left_column_id, self.predicate.right_column_id
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

        let left_keys = materialize_column(&left, self.predicate.left_column_id)?;
        let right_keys = materialize_column(&right, self.predicate.right_column_id)?;
        let secondaries =
            SecondaryPredicates::prepare(&self.secondary_predicates, &left, &right);

        let mut left_positions: Vec<RowId> = Vec::new();
        let mut right_positions: Vec<RowId> = Vec::new();

        self.state.check_cancelled()?;
        match self.mode {
            JoinMode::Semi | JoinMode::AntiNullAsTrue | JoinMode::AntiNullAsFalse => {
                let right_table = build_hash_table(&right_keys);
                for (left_ordinal, (key, position)) in left_keys.iter().enumerate() {
                    if key.is_null() {
                        // NULL keys never match. Semi drops them; the Anti
                        // modes disagree on whether "no match" retains them.
                        if self.mode == JoinMode::AntiNullAsFalse {
                            left_positions.push(*position);
                        }
                        continue;
                    }
                    let mut matched = false;
                    if let Some(candidates) = right_table.get(key) {
                        for &right_ordinal in candidates {
                            if secondaries.accepts(left_ordinal, right_ordinal)? {
                                matched = true;
                                break;
                            }
                        }
                    }
                    let emit = match self.mode {
                        JoinMode::Semi => matched,
                        _ => !matched,
                    };
                    if emit {
                        left_positions.push(*position);
                    }
                }
            }
            JoinMode::Inner => {
                // Build on the smaller input.
                let build_left = left_keys.len() <= right_keys.len();
                let (build_keys, probe_keys) =
                    if build_left { (&left_keys, &right_keys) } else { (&right_keys, &left_keys) };
                let hash_table = build_hash_table(build_keys);
                for (probe_ordinal, (key, probe_position)) in probe_keys.iter().enumerate() {
                    if key.is_null() {
                        continue;
                    }
                    let Some(candidates) = hash_table.get(key) else { continue };
                    for &build_ordinal in candidates {
                        let (left_ordinal, right_ordinal) = if build_left {
                            (build_ordinal, probe_ordinal)
                        } else {
                            (probe_ordinal, build_ordinal)
                        };
                        if !secondaries.accepts(left_ordinal, right_ordinal)? {
                            continue;
                        }
                        if build_left {
                            left_positions.push(build_keys[build_ordinal].1);
                            right_positions.push(*probe_position);
                        } else {
                            left_positions.push(*probe_position);
                            right_positions.push(build_keys[build_ordinal].1);
                        }
                    }
                }
            }
            JoinMode::Left | JoinMode::FullOuter => {
                let hash_table = build_hash_table(&right_keys);
                let mut right_matched = vec![false; right_keys.len()];
                for (left_ordinal, (key, left_position)) in left_keys.iter().enumerate() {
                    let mut matched = false;
                    if !key.is_null() {
                        if let Some(candidates) = hash_table.get(key) {
                            for &right_ordinal in candidates {
                                if secondaries.accepts(left_ordinal, right_ordinal)? {
                                    matched = true;
                                    right_matched[right_ordinal] = true;
                                    left_positions.push(*left_position);
                                    right_positions.push(right_keys[right_ordinal].1);
                                }
                            }
                        }
                    }
                    if !matched {
                        left_positions.push(*left_position);
                        right_positions.push(null_position());
                    }
                }
                if self.mode == JoinMode::FullOuter {
                    for (right_ordinal, matched) in right_matched.iter().enumerate() {
                        if !matched {
                            left_positions.push(null_position());
                            right_positions.push(right_keys[right_ordinal].1);
                        }
                    }
                }
            }
            JoinMode::Right => {
                let hash_table = build_hash_table(&left_keys);
                for (right_ordinal, (key, right_position)) in right_keys.iter().enumerate() {
                    let mut matched = false;
                    if !key.is_null() {
                        if let Some(candidates) = hash_table.get(key) {
                            for &left_ordinal in candidates {
                                if secondaries.accepts(left_ordinal, right_ordinal)? {
                                    matched = true;
                                    left_positions.push(left_keys[left_ordinal].1);
                                    right_positions.push(*right_position);
                                }
                            }
                        }
                    }
                    if !matched {
                        left_positions.push(null_position());
                        right_positions.push(*right_position);
                    }
                }
            }
            JoinMode::Cross => unreachable!("rejected at construction"),
        }

        let output = build_join_output(
            self.mode,
            &left,
            &right,
            &left_positions,
            &right_positions,
            &OutputChunkMetadata::default(),
        )?;
        self.state.set_output(output);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(
            JoinHash::new(
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
