//! Chunk-concatenating union

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::Table;

use crate::errors::ExecutorError;
use crate::operator::{
    input_table, operator_ref, Operator, OperatorRef, OperatorState,
};

/// Concatenates the chunks of two schema-identical inputs, left first.
/// Segments are forwarded by reference; nothing is copied.
#[derive(Debug)]
pub struct UnionAll {
    left: OperatorRef,
    right: OperatorRef,
    state: OperatorState,
}

impl UnionAll {
    pub fn new(left: OperatorRef, right: OperatorRef) -> Self {
        UnionAll { left, right, state: OperatorState::new() }
    }
}

impl Operator for UnionAll {
    fn name(&self) -> &'static str {
        "UnionAll"
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
                    "union inputs have {} vs {} columns",
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
        if left.table_type() != right.table_type() {
            return Err(ExecutorError::SchemaMismatch {
                reason: "union inputs must both be data or both be reference tables".to_string(),
            });
        }

        let output = Table::new(
            left.column_definitions().to_vec(),
            left.table_type(),
            left.target_chunk_size(),
        );
        for chunk in left.chunks().iter().chain(right.chunks().iter()) {
            self.state.check_cancelled()?;
            output.append_prepared_chunk((**chunk).clone())?;
        }
        self.state.set_output(output);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(UnionAll::new(
            self.left.lock().deep_copy(),
            self.right.lock().deep_copy(),
        ))
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}
