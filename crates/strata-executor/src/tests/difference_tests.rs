//! Difference operator: left-multiplicity semantics and schema checks

use strata_storage::ColumnDefinition;
use strata_types::{AllTypeVariant, ColumnId, DataType, SortMode};

use crate::operator::operator_ref;
use crate::operators::{Difference, Sort};
use crate::tests::common::{build_table, execute, int_table, row_i32, sorted_rows, wrap};

#[test]
fn test_difference_removes_matching_rows() {
    let left = int_table(&[Some(1), Some(2), Some(3), Some(4)], 2);
    let right = int_table(&[Some(2), Some(4), Some(9)], 10);
    let difference = operator_ref(Difference::new(wrap(left), wrap(right)));
    let result = execute(&difference);
    assert_eq!(sorted_rows(&result), vec![row_i32(&[1]), row_i32(&[3])]);
}

#[test]
fn test_difference_preserves_left_multiplicity() {
    // A value present in the right input removes every left occurrence; a
    // value absent from the right keeps every occurrence.
    let left = int_table(&[Some(1), Some(1), Some(2), Some(2), Some(2)], 10);
    let right = int_table(&[Some(2)], 10);
    let difference = operator_ref(Difference::new(wrap(left), wrap(right)));
    let result = execute(&difference);
    assert_eq!(sorted_rows(&result), vec![row_i32(&[1]), row_i32(&[1])]);
}

#[test]
fn test_difference_compares_whole_rows_including_nulls() {
    let definitions = || {
        vec![
            ColumnDefinition::new("a", DataType::Int32, true),
            ColumnDefinition::new("b", DataType::String, true),
        ]
    };
    let left = build_table(
        definitions(),
        vec![
            vec![AllTypeVariant::Int32(1), AllTypeVariant::String("x".into())],
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Null],
            vec![AllTypeVariant::Null, AllTypeVariant::String("y".into())],
        ],
        10,
    );
    let right = build_table(
        definitions(),
        vec![vec![AllTypeVariant::Int32(1), AllTypeVariant::Null]],
        10,
    );
    let difference = operator_ref(Difference::new(wrap(left), wrap(right)));
    let result = execute(&difference);
    assert_eq!(result.row_count(), 2);
}

#[test]
fn test_difference_rejects_mismatched_schemas() {
    let left = int_table(&[Some(1)], 10);
    let right = build_table(
        vec![ColumnDefinition::new("a", DataType::Int64, false)],
        vec![vec![AllTypeVariant::Int64(1)]],
        10,
    );
    let difference = operator_ref(Difference::new(wrap(left), wrap(right)));
    let result = crate::scheduler::execute_plan(&difference, &crate::scheduler::ImmediateScheduler);
    assert!(result.is_err());
}

#[test]
fn test_difference_inherits_left_ordering() {
    let left = int_table(&[Some(3), Some(1), Some(2), Some(4)], 10);
    let sorted_left = operator_ref(Sort::new(
        wrap(left),
        vec![(ColumnId(0), SortMode::Ascending)],
        None,
    ));
    let right = int_table(&[Some(2)], 10);
    let difference = operator_ref(Difference::new(sorted_left, wrap(right)));
    let result = execute(&difference);

    assert_eq!(result.rows(), vec![row_i32(&[1]), row_i32(&[3]), row_i32(&[4])]);
    for chunk in result.chunks() {
        assert_eq!(chunk.ordered_by(), &[(ColumnId(0), SortMode::Ascending)]);
    }
}

#[test]
fn test_difference_with_empty_right_is_identity() {
    let left = int_table(&[Some(1), Some(2)], 10);
    let right = int_table(&[], 10);
    let difference = operator_ref(Difference::new(wrap(left), wrap(right)));
    let result = execute(&difference);
    assert_eq!(sorted_rows(&result), vec![row_i32(&[1]), row_i32(&[2])]);
}
