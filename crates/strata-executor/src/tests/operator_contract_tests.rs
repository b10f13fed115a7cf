//! The operator base contract: single-shot execution, copies, cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use strata_types::{AllTypeVariant, ColumnId, PredicateCondition};

use crate::errors::ExecutorError;
use crate::operator::operator_ref;
use crate::operators::TableScan;
use crate::scheduler::{execute_plan, tasks_from_plan, ImmediateScheduler};
use crate::tests::common::{execute, int_table, wrap};

fn scan_fixture() -> crate::operator::OperatorRef {
    let table = int_table(&[Some(1), Some(2), Some(3)], 10);
    operator_ref(
        TableScan::new(
            wrap(table),
            ColumnId(0),
            PredicateCondition::GreaterThan,
            AllTypeVariant::Int32(1),
            None,
        )
        .unwrap(),
    )
}

#[test]
fn test_get_output_before_execute_fails() {
    let operator = scan_fixture();
    assert_eq!(operator.lock().get_output().unwrap_err(), ExecutorError::NotExecuted);
}

#[test]
fn test_double_execute_is_a_defined_error() {
    let operator = scan_fixture();
    execute(&operator);
    let result = operator.lock().execute();
    assert_eq!(result.unwrap_err(), ExecutorError::AlreadyExecuted);
}

#[test]
fn test_deep_copy_executes_independently() {
    let operator = scan_fixture();
    let copy = operator.lock().deep_copy();

    // Executing the original does not execute the copy.
    let original_output = execute(&operator);
    assert!(!copy.lock().is_executed());

    let copy_output = execute(&copy);
    assert_eq!(original_output.rows(), copy_output.rows());
    assert!(!Arc::ptr_eq(&original_output, &copy_output));
}

#[test]
fn test_shared_operators_execute_once() {
    // A DAG where one input feeds two consumers yields one task for the
    // shared operator.
    let table = int_table(&[Some(1), Some(2)], 10);
    let shared = wrap(table);
    let left = operator_ref(
        TableScan::new(
            shared.clone(),
            ColumnId(0),
            PredicateCondition::Equals,
            AllTypeVariant::Int32(1),
            None,
        )
        .unwrap(),
    );
    let right = operator_ref(
        TableScan::new(
            shared,
            ColumnId(0),
            PredicateCondition::Equals,
            AllTypeVariant::Int32(2),
            None,
        )
        .unwrap(),
    );
    let union = operator_ref(crate::operators::UnionPositions::new(left, right));

    let tasks = tasks_from_plan(&union);
    assert_eq!(tasks.len(), 4, "three operators plus one shared input");
    let result = execute_plan(&union, &ImmediateScheduler).unwrap();
    assert_eq!(result.row_count(), 2);
}

#[test]
fn test_cancellation_stops_at_chunk_boundary() {
    let table = int_table(&[Some(1), Some(2), Some(3), Some(4)], 1);
    let operator = scan_all(table);
    let flag = Arc::new(AtomicBool::new(true));
    operator.lock().set_cancellation_flag(flag.clone());
    let result = operator.lock().execute();
    assert_eq!(result.unwrap_err(), ExecutorError::Cancelled);

    // A fresh copy with a lowered flag runs fine.
    let copy = operator.lock().deep_copy();
    flag.store(false, Ordering::Relaxed);
    copy.lock().set_cancellation_flag(flag);
    let output = execute(&copy);
    assert_eq!(output.row_count(), 4);
}

fn scan_all(table: Arc<strata_storage::Table>) -> crate::operator::OperatorRef {
    let wrapper = wrap(table);
    wrapper.lock().execute().unwrap();
    operator_ref(
        TableScan::new(
            wrapper,
            ColumnId(0),
            PredicateCondition::IsNotNull,
            AllTypeVariant::Null,
            None,
        )
        .unwrap(),
    )
}
