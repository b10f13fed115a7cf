//! UnionAll and UnionPositions

use strata_types::{AllTypeVariant, ColumnId, PredicateCondition};

use crate::operator::operator_ref;
use crate::operators::{TableScan, UnionAll, UnionPositions};
use crate::tests::common::{execute, int_table, row_i32, sorted_rows, wrap};

fn scan_equals(
    input: crate::operator::OperatorRef,
    value: i32,
) -> crate::operator::OperatorRef {
    operator_ref(
        TableScan::new(
            input,
            ColumnId(0),
            PredicateCondition::Equals,
            AllTypeVariant::Int32(value),
            None,
        )
        .unwrap(),
    )
}

#[test]
fn test_union_all_concatenates_with_multiplicity() {
    let left = int_table(&[Some(1), Some(2)], 10);
    let right = int_table(&[Some(2), Some(3)], 10);
    let union = operator_ref(UnionAll::new(wrap(left), wrap(right)));
    let result = execute(&union);
    assert_eq!(
        sorted_rows(&result),
        vec![row_i32(&[1]), row_i32(&[2]), row_i32(&[2]), row_i32(&[3])]
    );
}

#[test]
fn test_union_positions_implements_disjunction() {
    // σ(a=1 OR a=3) as positions-union of two single-predicate scans over a
    // pointer-shared input.
    let table = int_table(&[Some(1), Some(2), Some(3), Some(1), Some(4)], 2);
    let shared = wrap(table.clone());
    let union = operator_ref(UnionPositions::new(
        scan_equals(shared.clone(), 1),
        scan_equals(shared, 3),
    ));
    let result = execute(&union);

    assert_eq!(
        sorted_rows(&result),
        vec![row_i32(&[1]), row_i32(&[1]), row_i32(&[3])],
        "each matching original row appears exactly once"
    );
}

#[test]
fn test_union_positions_deduplicates_overlap() {
    // Overlapping predicates must not duplicate rows: a <= 2 and a >= 2
    // both match the row with value 2.
    let table = int_table(&[Some(1), Some(2), Some(3)], 10);
    let shared = wrap(table);
    let left = operator_ref(
        TableScan::new(
            shared.clone(),
            ColumnId(0),
            PredicateCondition::LessThanEquals,
            AllTypeVariant::Int32(2),
            None,
        )
        .unwrap(),
    );
    let right = operator_ref(
        TableScan::new(
            shared,
            ColumnId(0),
            PredicateCondition::GreaterThanEquals,
            AllTypeVariant::Int32(2),
            None,
        )
        .unwrap(),
    );
    let union = operator_ref(UnionPositions::new(left, right));
    let result = execute(&union);
    assert_eq!(sorted_rows(&result), vec![row_i32(&[1]), row_i32(&[2]), row_i32(&[3])]);
}

#[test]
fn test_union_positions_with_empty_branch() {
    let table = int_table(&[Some(1), Some(2)], 10);
    let shared = wrap(table);
    let union = operator_ref(UnionPositions::new(
        scan_equals(shared.clone(), 1),
        scan_equals(shared, 99),
    ));
    let result = execute(&union);
    assert_eq!(sorted_rows(&result), vec![row_i32(&[1])]);
}

#[test]
fn test_union_positions_rejects_data_tables() {
    let left = int_table(&[Some(1)], 10);
    let right = int_table(&[Some(2)], 10);
    let union = operator_ref(UnionPositions::new(wrap(left), wrap(right)));
    let result = crate::scheduler::execute_plan(&union, &crate::scheduler::ImmediateScheduler);
    assert!(result.is_err());
}
