//! First-n-rows operator

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::Table;

use crate::errors::ExecutorError;
use crate::operator::{
    input_table, operator_ref, DescriptionMode, Operator, OperatorRef, OperatorState,
};
use crate::reference_output::{
    all_positions, build_reference_table, OutputChunkMetadata, OutputSide,
};

/// Emits the first `row_count` rows of its input as a reference table.
#[derive(Debug)]
pub struct Limit {
    input: OperatorRef,
    row_count: u64,
    state: OperatorState,
}

impl Limit {
    pub fn new(input: OperatorRef, row_count: u64) -> Self {
        Limit { input, row_count, state: OperatorState::new() }
    }
}

impl Operator for Limit {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn description(&self, _mode: DescriptionMode) -> String {
        format!("Limit({})", self.row_count)
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
        let mut positions = all_positions(&input);
        positions.truncate(self.row_count as usize);

        let output = build_reference_table(
            &[OutputSide { input: &input, positions: &positions, force_nullable: false }],
            input.target_chunk_size(),
            &OutputChunkMetadata::default(),
        )?;
        self.state.set_output(output);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(Limit::new(self.input.lock().deep_copy(), self.row_count))
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}
