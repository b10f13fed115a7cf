//! Join operators: modes, NULL-key semantics, metadata

use std::sync::Arc;

use strata_storage::{ColumnDefinition, Table};
use strata_types::{AllTypeVariant, ColumnId, DataType, JoinMode, PredicateCondition, SortMode};

use crate::evaluator::PqpExpression;
use crate::operator::operator_ref;
use crate::operators::{JoinHash, JoinNestedLoop, JoinPredicate, JoinSortMerge};
use crate::tests::common::{build_table, execute, int_table, sorted_rows, wrap};

fn keyed_table(keys: &[Option<i32>]) -> Arc<Table> {
    int_table(keys, 10)
}

fn equals(left: u16, right: u16) -> JoinPredicate {
    JoinPredicate::new(ColumnId(left), ColumnId(right), PredicateCondition::Equals)
}

fn i(value: i32) -> AllTypeVariant {
    AllTypeVariant::Int32(value)
}

#[test]
fn test_hash_join_inner() {
    let left = keyed_table(&[Some(1), Some(2), Some(3)]);
    let right = keyed_table(&[Some(2), Some(3), Some(3), Some(4)]);
    let join = operator_ref(
        JoinHash::new(wrap(left), wrap(right), JoinMode::Inner, equals(0, 0), vec![]).unwrap(),
    );
    let result = execute(&join);
    assert_eq!(
        sorted_rows(&result),
        vec![
            vec![i(2), i(2)],
            vec![i(3), i(3)],
            vec![i(3), i(3)],
        ]
    );
}

#[test]
fn test_hash_join_null_keys_never_match() {
    let left = keyed_table(&[Some(1), None]);
    let right = keyed_table(&[Some(1), None]);
    let join = operator_ref(
        JoinHash::new(wrap(left), wrap(right), JoinMode::Inner, equals(0, 0), vec![]).unwrap(),
    );
    let result = execute(&join);
    assert_eq!(result.row_count(), 1, "NULL keys never join, even with NULL on both sides");
}

#[test]
fn test_hash_join_outer_modes_pad_with_null() {
    let left = keyed_table(&[Some(1), Some(2)]);
    let right = keyed_table(&[Some(2), Some(3)]);

    let left_join = operator_ref(
        JoinHash::new(
            wrap(left.clone()),
            wrap(right.clone()),
            JoinMode::Left,
            equals(0, 0),
            vec![],
        )
        .unwrap(),
    );
    let result = execute(&left_join);
    assert_eq!(
        sorted_rows(&result),
        vec![vec![i(1), AllTypeVariant::Null], vec![i(2), i(2)]]
    );
    // Padded right columns turn nullable.
    assert!(result.column_definitions()[1].nullable);

    let full_join = operator_ref(
        JoinHash::new(wrap(left), wrap(right), JoinMode::FullOuter, equals(0, 0), vec![])
            .unwrap(),
    );
    let result = execute(&full_join);
    assert_eq!(
        sorted_rows(&result),
        vec![
            vec![AllTypeVariant::Null, i(3)],
            vec![i(1), AllTypeVariant::Null],
            vec![i(2), i(2)],
        ]
    );
    assert!(result.column_definitions()[0].nullable);
    assert!(result.column_definitions()[1].nullable);
}

#[test]
fn test_semi_join_emits_left_columns_once() {
    let left = keyed_table(&[Some(1), Some(2), Some(2)]);
    let right = keyed_table(&[Some(2), Some(2), Some(2)]);
    let join = operator_ref(
        JoinHash::new(wrap(left), wrap(right), JoinMode::Semi, equals(0, 0), vec![]).unwrap(),
    );
    let result = execute(&join);
    assert_eq!(result.column_count(), 1, "semi joins emit left columns only");
    assert_eq!(sorted_rows(&result), vec![vec![i(2)], vec![i(2)]]);
}

#[test]
fn test_anti_join_null_key_asymmetry() {
    let left = keyed_table(&[Some(1), Some(2), None]);
    let right = keyed_table(&[Some(2)]);

    let anti_null_as_true = operator_ref(
        JoinHash::new(
            wrap(left.clone()),
            wrap(right.clone()),
            JoinMode::AntiNullAsTrue,
            equals(0, 0),
            vec![],
        )
        .unwrap(),
    );
    let result = execute(&anti_null_as_true);
    assert_eq!(sorted_rows(&result), vec![vec![i(1)]], "NULL-key rows are rejected");

    let anti_null_as_false = operator_ref(
        JoinHash::new(
            wrap(left.clone()),
            wrap(right),
            JoinMode::AntiNullAsFalse,
            equals(0, 0),
            vec![],
        )
        .unwrap(),
    );
    let result = execute(&anti_null_as_false);
    assert_eq!(
        sorted_rows(&result),
        vec![vec![AllTypeVariant::Null], vec![i(1)]],
        "NULL-key rows are retained"
    );

    // Pinned: with an empty right side "no match" retains left rows, and
    // the NULL-key asymmetry still applies.
    let empty_right = keyed_table(&[]);
    let anti_empty = operator_ref(
        JoinHash::new(
            wrap(left),
            wrap(empty_right),
            JoinMode::AntiNullAsTrue,
            equals(0, 0),
            vec![],
        )
        .unwrap(),
    );
    let result = execute(&anti_empty);
    assert_eq!(sorted_rows(&result), vec![vec![i(1)], vec![i(2)]]);
}

#[test]
fn test_hash_join_secondary_predicates() {
    let columns = || {
        vec![
            ColumnDefinition::new("k", DataType::Int32, false),
            ColumnDefinition::new("v", DataType::Int32, false),
        ]
    };
    let left = build_table(
        columns(),
        vec![vec![i(1), i(10)], vec![i(1), i(30)]],
        10,
    );
    let right = build_table(
        columns(),
        vec![vec![i(1), i(20)], vec![i(1), i(40)]],
        10,
    );
    // Secondary: left.v > right.v (combined row: left columns 0-1, right
    // columns 2-3).
    let secondary = Arc::new(PqpExpression::Predicate {
        condition: PredicateCondition::GreaterThan,
        arguments: vec![PqpExpression::column(ColumnId(1)), PqpExpression::column(ColumnId(3))],
    });
    let join = operator_ref(
        JoinHash::new(
            wrap(left),
            wrap(right),
            JoinMode::Inner,
            equals(0, 0),
            vec![secondary],
        )
        .unwrap(),
    );
    let result = execute(&join);
    assert_eq!(sorted_rows(&result), vec![vec![i(1), i(30), i(1), i(20)]]);
}

#[test]
fn test_sort_merge_join_marks_clustering_and_order() {
    // Self join of a three-column table on (col0 = col1).
    let table = build_table(
        vec![
            ColumnDefinition::new("x", DataType::Int32, false),
            ColumnDefinition::new("y", DataType::Int32, false),
            ColumnDefinition::new("z", DataType::Int32, false),
        ],
        vec![
            vec![i(1), i(2), i(3)],
            vec![i(2), i(1), i(4)],
            vec![i(1), i(2), i(5)],
        ],
        10,
    );
    let join = operator_ref(
        JoinSortMerge::new(
            wrap(table.clone()),
            wrap(table),
            JoinMode::Left,
            JoinPredicate::new(ColumnId(0), ColumnId(1), PredicateCondition::Equals),
            vec![],
        )
        .unwrap(),
    );
    let result = execute(&join);

    // Every left row matches (x values {1,2} appear as y values), so the
    // output carries ordering and clustering on both join columns.
    for chunk in result.chunks() {
        assert_eq!(
            chunk.ordered_by(),
            &[(ColumnId(0), SortMode::Ascending), (ColumnId(4), SortMode::Ascending)]
        );
        assert_eq!(chunk.value_clustered_by(), &[ColumnId(0), ColumnId(4)]);
    }

    // x=1 matches the single y=1 row (twice, once per left occurrence);
    // x=2 matches both y=2 rows.
    assert_eq!(result.row_count(), 4);
    let keys: Vec<AllTypeVariant> =
        result.rows().into_iter().map(|row| row[0].clone()).collect();
    let mut sorted_keys = keys.clone();
    sorted_keys.sort();
    assert_eq!(keys, sorted_keys, "equi sort-merge output is ordered on the join key");
}

#[test]
fn test_sort_merge_range_conditions() {
    let left = keyed_table(&[Some(1), Some(3)]);
    let right = keyed_table(&[Some(2), Some(3), Some(4)]);

    let less_than = operator_ref(
        JoinSortMerge::new(
            wrap(left.clone()),
            wrap(right.clone()),
            JoinMode::Inner,
            JoinPredicate::new(ColumnId(0), ColumnId(0), PredicateCondition::LessThan),
            vec![],
        )
        .unwrap(),
    );
    let result = execute(&less_than);
    assert_eq!(
        sorted_rows(&result),
        vec![
            vec![i(1), i(2)],
            vec![i(1), i(3)],
            vec![i(1), i(4)],
            vec![i(3), i(4)],
        ]
    );

    let not_equals = operator_ref(
        JoinSortMerge::new(
            wrap(left),
            wrap(right),
            JoinMode::Inner,
            JoinPredicate::new(ColumnId(0), ColumnId(0), PredicateCondition::NotEquals),
            vec![],
        )
        .unwrap(),
    );
    let result = execute(&not_equals);
    assert_eq!(result.row_count(), 5);
}

#[test]
fn test_nested_loop_join_cross_and_outer() {
    let left = keyed_table(&[Some(1), Some(2)]);
    let right = keyed_table(&[Some(10), Some(20), Some(30)]);

    let cross = operator_ref(
        JoinNestedLoop::new(
            wrap(left.clone()),
            wrap(right.clone()),
            JoinMode::Cross,
            None,
            vec![],
        )
        .unwrap(),
    );
    assert_eq!(execute(&cross).row_count(), 6);

    let right_outer = operator_ref(
        JoinNestedLoop::new(
            wrap(left),
            wrap(right),
            JoinMode::Right,
            Some(JoinPredicate::new(
                ColumnId(0),
                ColumnId(0),
                PredicateCondition::GreaterThan,
            )),
            vec![],
        )
        .unwrap(),
    );
    // No left key exceeds any right key: every right row is padded.
    let result = execute(&right_outer);
    assert_eq!(
        sorted_rows(&result),
        vec![
            vec![AllTypeVariant::Null, i(10)],
            vec![AllTypeVariant::Null, i(20)],
            vec![AllTypeVariant::Null, i(30)],
        ]
    );
}

#[test]
fn test_join_construction_contracts() {
    let left = keyed_table(&[Some(1)]);
    let right = keyed_table(&[Some(1)]);

    assert!(JoinHash::new(
        wrap(left.clone()),
        wrap(right.clone()),
        JoinMode::Inner,
        JoinPredicate::new(ColumnId(0), ColumnId(0), PredicateCondition::LessThan),
        vec![],
    )
    .is_err());

    assert!(JoinNestedLoop::new(
        wrap(left.clone()),
        wrap(right.clone()),
        JoinMode::Cross,
        Some(equals(0, 0)),
        vec![],
    )
    .is_err());

    assert!(JoinNestedLoop::new(wrap(left), wrap(right), JoinMode::Inner, None, vec![])
        .is_err());
}
