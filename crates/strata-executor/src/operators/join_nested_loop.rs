//! Nested loop join: the fallback for arbitrary predicates and cross joins

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::Table;
use strata_types::{AllTypeVariant, JoinMode, PredicateCondition, RowId};

use crate::errors::ExecutorError;
use crate::evaluator::{compare_variants, PqpExpressionRef};
use crate::operator::{
    input_table, operator_ref, DescriptionMode, Operator, OperatorRef, OperatorState,
};
use crate::operators::join::{
    build_join_output, null_position, validate_join_inputs, JoinPredicate, SecondaryPredicates,
};
use crate::reference_output::{materialize_column, OutputChunkMetadata};

/// Evaluates every candidate pair. Slow, but supports every mode and every
/// condition; `Cross` mode runs without a predicate.
#[derive(Debug)]
pub struct JoinNestedLoop {
    left: OperatorRef,
    right: OperatorRef,
    mode: JoinMode,
    predicate: Option<JoinPredicate>,
    secondary_predicates: Vec<PqpExpressionRef>,
    state: OperatorState,
}

impl JoinNestedLoop {
    pub fn new(
        left: OperatorRef,
        right: OperatorRef,
        mode: JoinMode,
        predicate: Option<JoinPredicate>,
        secondary_predicates: Vec<PqpExpressionRef>,
    ) -> Result<Self, ExecutorError> {
        match (&predicate, mode) {
            (None, JoinMode::Cross) => {}
            (None, _) => {
                return Err(ExecutorError::InvalidJoin(
                    "only cross joins run without a predicate".to_string(),
                ))
            }
            (Some(_), JoinMode::Cross) => {
                return Err(ExecutorError::InvalidJoin(
                    "cross joins take no predicate".to_string(),
                ))
            }
            (Some(_), _) => {}
        }
        Ok(JoinNestedLoop {
            left,
            right,
            mode,
            predicate,
            secondary_predicates,
            state: OperatorState::new(),
        })
    }
}

/// NULL operands never satisfy a join condition.
fn keys_match(
    condition: PredicateCondition,
    left_key: &AllTypeVariant,
    right_key: &AllTypeVariant,
) -> bool {
    let Some(ordering) = compare_variants(left_key, right_key) else {
        return false;
    };
    match condition {
        PredicateCondition::Equals => ordering == CmpOrdering::Equal,
        PredicateCondition::NotEquals => ordering != CmpOrdering::Equal,
        PredicateCondition::LessThan => ordering == CmpOrdering::Less,
        PredicateCondition::LessThanEquals => ordering != CmpOrdering::Greater,
        PredicateCondition::GreaterThan => ordering == CmpOrdering::Greater,
        PredicateCondition::GreaterThanEquals => ordering != CmpOrdering::Less,
        _ => false,
    }
}

impl Operator for JoinNestedLoop {
    fn name(&self) -> &'static str {
        "JoinNestedLoop"
    }

    fn description(&self, _mode: DescriptionMode) -> String {
        match &self.predicate {
            Some(predicate) => format!(
                "JoinNestedLoop {} on left.{} {} right.{}",
                self.mode,
                predicate.left_column_id,
                predicate.condition,
                predicate.right_column_id
            ),
            None => format!("JoinNestedLoop {}", self.mode),
        }
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
        if let Some(predicate) = &self.predicate {
            validate_join_inputs(&left, &right, predicate)?;
        }

        let secondaries =
            SecondaryPredicates::prepare(&self.secondary_predicates, &left, &right);
        let left_keys = match &self.predicate {
            Some(predicate) => materialize_column(&left, predicate.left_column_id)?,
            None => all_rows_with_unit_key(&left),
        };
        let right_keys = match &self.predicate {
            Some(predicate) => materialize_column(&right, predicate.right_column_id)?,
            None => all_rows_with_unit_key(&right),
        };

        self.state.check_cancelled()?;
        let mut left_positions: Vec<RowId> = Vec::new();
        let mut right_positions: Vec<RowId> = Vec::new();
        let mut right_matched = vec![false; right_keys.len()];

        for (left_ordinal, (left_key, left_position)) in left_keys.iter().enumerate() {
            let mut matched = false;
            for (right_ordinal, (right_key, right_position)) in right_keys.iter().enumerate() {
                let primary_holds = match &self.predicate {
                    Some(predicate) => keys_match(predicate.condition, left_key, right_key),
                    None => true,
                };
                if !primary_holds || !secondaries.accepts(left_ordinal, right_ordinal)? {
                    continue;
                }
                matched = true;
                right_matched[right_ordinal] = true;
                match self.mode {
                    JoinMode::Semi | JoinMode::AntiNullAsTrue | JoinMode::AntiNullAsFalse => {
                        break;
                    }
                    _ => {
                        left_positions.push(*left_position);
                        right_positions.push(*right_position);
                    }
                }
            }
            match self.mode {
                JoinMode::Semi => {
                    if matched {
                        left_positions.push(*left_position);
                    }
                }
                JoinMode::AntiNullAsTrue => {
                    if !matched && !left_key.is_null() {
                        left_positions.push(*left_position);
                    }
                }
                JoinMode::AntiNullAsFalse => {
                    if !matched {
                        left_positions.push(*left_position);
                    }
                }
                JoinMode::Left | JoinMode::FullOuter => {
                    if !matched {
                        left_positions.push(*left_position);
                        right_positions.push(null_position());
                    }
                }
                _ => {}
            }
        }
        if matches!(self.mode, JoinMode::Right | JoinMode::FullOuter) {
            for (right_ordinal, matched) in right_matched.iter().enumerate() {
                if !matched {
                    left_positions.push(null_position());
                    right_positions.push(right_keys[right_ordinal].1);
                }
            }
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
            JoinNestedLoop::new(
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

/// Cross joins have no key column; pair every row with a unit key.
fn all_rows_with_unit_key(table: &Table) -> Vec<(AllTypeVariant, RowId)> {
    crate::reference_output::all_positions(table)
        .into_iter()
        .map(|position| (AllTypeVariant::Int32(0), position))
        .collect()
}
