//! Wraps an existing table as a physical plan leaf

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::Table;

use crate::errors::ExecutorError;
use crate::operator::{operator_ref, Operator, OperatorRef, OperatorState};

/// Leaf operator handing a pre-existing table to the plan above it.
#[derive(Debug)]
pub struct TableWrapper {
    table: Arc<Table>,
    state: OperatorState,
}

impl TableWrapper {
    pub fn new(table: Arc<Table>) -> Self {
        TableWrapper { table, state: OperatorState::new() }
    }
}

impl Operator for TableWrapper {
    fn name(&self) -> &'static str {
        "TableWrapper"
    }

    fn is_executed(&self) -> bool {
        self.state.is_executed()
    }

    fn execute(&mut self) -> Result<(), ExecutorError> {
        self.state.begin_execute()?;
        self.state.set_output_shared(self.table.clone());
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(TableWrapper::new(self.table.clone()))
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}
