//! Hash-based grouping aggregation

use std::collections::HashMap;
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

/// Groups rows by hashing the group-by key tuple, keeping one accumulator
/// per aggregate in each hash entry. NULL group keys form their own group.
/// With an empty group-by set the whole input is one group, which yields one
/// output row even for an empty input (COUNT 0, everything else NULL).
#[derive(Debug)]
pub struct AggregateHash {
    input: OperatorRef,
    group_by_column_ids: Vec<ColumnId>,
    aggregates: Vec<AggregateDefinition>,
    state: OperatorState,
}

impl AggregateHash {
    pub fn new(
        input: OperatorRef,
        group_by_column_ids: Vec<ColumnId>,
        aggregates: Vec<AggregateDefinition>,
    ) -> Self {
        AggregateHash { input, group_by_column_ids, aggregates, state: OperatorState::new() }
    }
}

impl Operator for AggregateHash {
    fn name(&self) -> &'static str {
        "AggregateHash"
    }

    fn description(&self, _mode: DescriptionMode) -> String {
        format!(
            "AggregateHash group_by={:?} aggregates={}",
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

        // Insertion-ordered groups: the map points into the group vector, so
        // output order is deterministic (first-appearance order).
        let mut group_index: HashMap<Vec<AllTypeVariant>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<AllTypeVariant>, Vec<Accumulator>)> = Vec::new();

        if self.group_by_column_ids.is_empty() {
            let accumulators = self
                .aggregates
                .iter()
                .map(|definition| Accumulator::for_definition(definition, &input))
                .collect();
            groups.push((Vec::new(), accumulators));
        }

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
                let index = if self.group_by_column_ids.is_empty() {
                    0
                } else {
                    match group_index.get(&key) {
                        Some(&index) => index,
                        None => {
                            let accumulators = self
                                .aggregates
                                .iter()
                                .map(|definition| {
                                    Accumulator::for_definition(definition, &input)
                                })
                                .collect();
                            groups.push((key.clone(), accumulators));
                            group_index.insert(key, groups.len() - 1);
                            groups.len() - 1
                        }
                    }
                };
                for (definition, accumulator) in
                    self.aggregates.iter().zip(groups[index].1.iter_mut())
                {
                    let value =
                        definition.column_id.map(|column_id| {
                            chunk.get_segment(column_id).expect("validated above").get(offset)
                        });
                    accumulator.update(value.as_ref());
                }
            }
        }

        let rows: Vec<Vec<AllTypeVariant>> = groups
            .into_iter()
            .map(|(mut key, accumulators)| {
                key.extend(accumulators.into_iter().map(Accumulator::finalize));
                key
            })
            .collect();
        self.state.set_output(build_aggregate_output(definitions, rows)?);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(AggregateHash::new(
            self.input.lock().deep_copy(),
            self.group_by_column_ids.clone(),
            self.aggregates.clone(),
        ))
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}
