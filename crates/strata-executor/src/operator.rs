//! The operator base contract
//!
//! Operators are single-shot: constructed, executed once, output consumed by
//! downstream operators or the caller. Re-executing is a defined error and
//! `deep_copy()` yields an independent, not-yet-executed clone of the whole
//! operator sub-tree.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use strata_storage::Table;

use crate::errors::ExecutorError;

/// How much detail `description` should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionMode {
    SingleLine,
    MultiLine,
}

/// Shared handle to an operator in a physical plan DAG.
pub type OperatorRef = Arc<Mutex<dyn Operator>>;

/// A physical operator.
pub trait Operator: Send + fmt::Debug {
    fn name(&self) -> &'static str;

    fn description(&self, mode: DescriptionMode) -> String {
        let _ = mode;
        self.name().to_string()
    }

    fn input_left(&self) -> Option<OperatorRef> {
        None
    }

    fn input_right(&self) -> Option<OperatorRef> {
        None
    }

    fn is_executed(&self) -> bool;

    /// Run the operator. Inputs must have been executed.
    fn execute(&mut self) -> Result<(), ExecutorError>;

    /// The output table; available once `execute()` succeeded.
    fn get_output(&self) -> Result<Arc<Table>, ExecutorError>;

    /// An independent, not-yet-executed copy of this operator and its
    /// inputs.
    fn deep_copy(&self) -> OperatorRef;

    /// Install the flag checked at chunk boundaries for cooperative
    /// cancellation.
    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>);
}

/// The execute-once state machine embedded in every operator.
#[derive(Debug, Default)]
pub struct OperatorState {
    executed: bool,
    output: Option<Arc<Table>>,
    cancellation_flag: Option<Arc<AtomicBool>>,
}

impl OperatorState {
    pub fn new() -> Self {
        OperatorState::default()
    }

    /// Flip to executed; errors on the second call.
    pub fn begin_execute(&mut self) -> Result<(), ExecutorError> {
        if self.executed {
            return Err(ExecutorError::AlreadyExecuted);
        }
        self.executed = true;
        Ok(())
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    pub fn set_output(&mut self, table: Table) {
        self.output = Some(Arc::new(table));
    }

    pub fn set_output_shared(&mut self, table: Arc<Table>) {
        self.output = Some(table);
    }

    pub fn output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.output.clone().ok_or(ExecutorError::NotExecuted)
    }

    pub fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancellation_flag = Some(flag);
    }

    pub fn cancellation_flag(&self) -> Option<Arc<AtomicBool>> {
        self.cancellation_flag.clone()
    }

    /// Cancellation check; called at chunk boundaries.
    pub fn check_cancelled(&self) -> Result<(), ExecutorError> {
        match &self.cancellation_flag {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(ExecutorError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// The executed input's output table.
pub fn input_table(input: &OperatorRef) -> Result<Arc<Table>, ExecutorError> {
    input.lock().get_output()
}

/// Wrap a concrete operator into the shared handle type.
pub fn operator_ref<O: Operator + 'static>(operator: O) -> OperatorRef {
    Arc::new(Mutex::new(operator))
}
