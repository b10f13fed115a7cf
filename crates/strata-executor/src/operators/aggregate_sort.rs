//! Aggregation over group-sorted input

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::Table;
use strata_types::{AllTypeVariant, ColumnId};

use crate::errors::ExecutorError;
use crate::operator::{
    input_table, operator_ref, DescriptionMode, Operator, OperatorRef, OperatorState,
};
use crate::operators::aggregate::{
    aggregate_output_definitions, build_aggregate_output, Accumulator, AggregateDefinition,
};

/// Single-pass aggregation that requires its input to be sorted (or at
/// least value-clustered) on the group-by columns — the caller's
/// responsibility. One output row is emitted per run of equal keys.
#[derive(Debug)]
pub struct AggregateSort {
    input: OperatorRef,
    group_by_column_ids: Vec<ColumnId>,
    aggregates: Vec<AggregateDefinition>,
    state: OperatorState,
}

impl AggregateSort {
    pub fn new(
        input: OperatorRef,
        group_by_column_ids: Vec<ColumnId>,
        aggregates: Vec<AggregateDefinition>,
    ) -> Self {
        AggregateSort { input, group_by_column_ids, aggregates, state: OperatorState::new() }
    }

    fn fresh_accumulators(&self, input: &Table) -> Vec<Accumulator> {
        self.aggregates
            .iter()
            .map(|definition| Accumulator::for_definition(definition, input))
            .collect()
    }
}

impl Operator for AggregateSort {
    fn name(&self) -> &'static str {
        "AggregateSort"
    }

    fn description(&self, _mode: DescriptionMode) -> String {
        format!(
            "AggregateSort group_by={:?} aggregates={}",
            self.group_by_column_ids,
            self.aggregates.len()
        )
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
        let definitions =
            aggregate_output_definitions(&input, &self.group_by_column_ids, &self.aggregates)?;

        let mut rows: Vec<Vec<AllTypeVariant>> = Vec::new();
        let mut current_key: Option<Vec<AllTypeVariant>> = None;
        let mut accumulators = self.fresh_accumulators(&input);

        for chunk in input.chunks() {
            self.state.check_cancelled()?;
            for offset in 0..chunk.size() {
                let key: Vec<AllTypeVariant> = self
                    .group_by_column_ids
                    .iter()
                    .map(|column_id| {
                        chunk.get_segment(*column_id).expect("validated above").get(offset)
                    })
                    .collect();

                let key_changed = match &current_key {
                    Some(current) => *current != key,
                    // The first row opens a run even for empty group-bys.
                    None => true,
                };
                if key_changed {
                    if let Some(finished) = current_key.take() {
                        let finished_accumulators =
                            std::mem::replace(&mut accumulators, self.fresh_accumulators(&input));
                        rows.push(finish_group(finished, finished_accumulators));
                    }
                    current_key = Some(key);
                }

                for (definition, accumulator) in
                    self.aggregates.iter().zip(accumulators.iter_mut())
                {
                    let value =
                        definition.column_id.map(|column_id| {
                            chunk.get_segment(column_id).expect("validated above").get(offset)
                        });
                    accumulator.update(value.as_ref());
                }
            }
        }
        if let Some(finished) = current_key.take() {
            rows.push(finish_group(finished, accumulators));
        } else if self.group_by_column_ids.is_empty() {
            // Empty input, global aggregate: one row over the empty group.
            rows.push(finish_group(Vec::new(), self.fresh_accumulators(&input)));
        }

        self.state.set_output(build_aggregate_output(definitions, rows)?);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(AggregateSort::new(
            self.input.lock().deep_copy(),
            self.group_by_column_ids.clone(),
            self.aggregates.clone(),
        ))
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}

fn finish_group(mut key: Vec<AllTypeVariant>, accumulators: Vec<Accumulator>) -> Vec<AllTypeVariant> {
    key.extend(accumulators.into_iter().map(Accumulator::finalize));
    key
}
