//! LQP-to-PQP translation and end-to-end optimizer runs

use std::sync::Arc;

use strata_plan::{
    column_reference_of, AggregateFunction, Expression, LqpNode, Optimizer,
};
use strata_storage::{ColumnDefinition, StorageManager, Table};
use strata_types::{
    AllTypeVariant, ColumnId, DataType, JoinMode, PredicateCondition, SetOperationMode, SortMode,
};

use crate::scheduler::{execute_plan, ImmediateScheduler};
use crate::tests::common::{row_i32, sorted_rows};
use crate::translator::LqpTranslator;

/// Register a fixture table under a unique name (the storage manager is
/// process-global; parallel tests must not collide).
fn register_fixture(name: &str, rows: Vec<Vec<AllTypeVariant>>) {
    let manager = StorageManager::get();
    if manager.has_table(name) {
        return;
    }
    let table = Table::new(
        vec![
            ColumnDefinition::new("a", DataType::Int32, false),
            ColumnDefinition::new("b", DataType::Int32, true),
        ],
        strata_storage::TableType::Data,
        3,
    );
    for row in rows {
        table.append_row(row).unwrap();
    }
    table.finalize_last_chunk();
    manager.add_table(name, Arc::new(table)).unwrap();
}

fn run(plan: &strata_plan::LqpNodeRef) -> Arc<Table> {
    let root = LqpTranslator::translate_plan(plan).expect("plan translates");
    execute_plan(&root, &ImmediateScheduler).expect("plan executes")
}

#[test]
fn test_translate_scan_sort_pipeline() {
    register_fixture(
        "translator_tests_scan_sort",
        vec![
            row_i32(&[5, 50]),
            row_i32(&[3, 30]),
            row_i32(&[8, 80]),
            row_i32(&[3, 31]),
        ],
    );
    let table = LqpNode::stored_table("translator_tests_scan_sort");
    let a = Expression::column(column_reference_of(&table, ColumnId(0)).unwrap());
    let predicate = LqpNode::predicate(
        Expression::predicate(
            PredicateCondition::NotEquals,
            vec![a.clone(), Expression::literal(8)],
        ),
        &table,
    );
    let sort = LqpNode::sort(vec![a], vec![SortMode::Ascending], &predicate);

    let result = run(&sort);
    assert_eq!(
        result.rows(),
        vec![row_i32(&[3, 30]), row_i32(&[3, 31]), row_i32(&[5, 50])]
    );
}

#[test]
fn test_translate_conjunction_stacks_scans() {
    register_fixture(
        "translator_tests_conjunction",
        vec![row_i32(&[1, 10]), row_i32(&[2, 20]), row_i32(&[3, 30])],
    );
    let table = LqpNode::stored_table("translator_tests_conjunction");
    let a = Expression::column(column_reference_of(&table, ColumnId(0)).unwrap());
    let b = Expression::column(column_reference_of(&table, ColumnId(1)).unwrap());
    let conjunction = Expression::and(
        Expression::predicate(
            PredicateCondition::GreaterThan,
            vec![a, Expression::literal(1)],
        ),
        Expression::predicate(
            PredicateCondition::LessThan,
            vec![b, Expression::literal(30)],
        ),
    );
    let predicate = LqpNode::predicate(conjunction, &table);

    let result = run(&predicate);
    assert_eq!(result.rows(), vec![row_i32(&[2, 20])]);
}

#[test]
fn test_translate_aggregate_and_projection() {
    register_fixture(
        "translator_tests_aggregate",
        vec![row_i32(&[1, 2]), row_i32(&[1, 3]), row_i32(&[2, 5])],
    );
    let table = LqpNode::stored_table("translator_tests_aggregate");
    let a = Expression::column(column_reference_of(&table, ColumnId(0)).unwrap());
    let b = Expression::column(column_reference_of(&table, ColumnId(1)).unwrap());
    let aggregate = LqpNode::aggregate(
        vec![a.clone()],
        vec![Expression::aggregate(AggregateFunction::Min, Some(b))],
        &table,
    );

    let result = run(&aggregate);
    assert_eq!(
        sorted_rows(&result),
        vec![
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Int32(2)],
            vec![AllTypeVariant::Int32(2), AllTypeVariant::Int32(5)],
        ]
    );
}

#[test]
fn test_translate_join_picks_hash_for_equi() {
    register_fixture("translator_tests_join_left", vec![row_i32(&[1, 10]), row_i32(&[2, 20])]);
    register_fixture("translator_tests_join_right", vec![row_i32(&[2, 200]), row_i32(&[3, 300])]);

    let left = LqpNode::stored_table("translator_tests_join_left");
    let right = LqpNode::stored_table("translator_tests_join_right");
    let join = LqpNode::join(
        JoinMode::Inner,
        vec![Expression::predicate(
            PredicateCondition::Equals,
            vec![
                Expression::column(column_reference_of(&left, ColumnId(0)).unwrap()),
                Expression::column(column_reference_of(&right, ColumnId(0)).unwrap()),
            ],
        )],
        &left,
        &right,
    );
    let result = run(&join);
    assert_eq!(sorted_rows(&result), vec![row_i32(&[2, 20, 2, 200])]);
}

#[test]
fn test_shared_lqp_subplan_translates_to_shared_operator() {
    register_fixture("translator_tests_shared", vec![row_i32(&[1, 0]), row_i32(&[2, 0])]);
    let table = LqpNode::stored_table("translator_tests_shared");
    let a = Expression::column(column_reference_of(&table, ColumnId(0)).unwrap());
    let left = LqpNode::predicate(
        Expression::predicate(
            PredicateCondition::Equals,
            vec![a.clone(), Expression::literal(1)],
        ),
        &table,
    );
    let right = LqpNode::predicate(
        Expression::predicate(
            PredicateCondition::Equals,
            vec![a, Expression::literal(2)],
        ),
        &table,
    );
    let union = LqpNode::union(SetOperationMode::Positions, &left, &right);

    let operator = LqpTranslator::translate_plan(&union).unwrap();
    let tasks = crate::scheduler::tasks_from_plan(&operator);
    // GetTable appears once despite two consumers.
    assert_eq!(tasks.len(), 4);

    let result = execute_plan(&operator, &ImmediateScheduler).unwrap();
    assert_eq!(sorted_rows(&result), vec![row_i32(&[1, 0]), row_i32(&[2, 0])]);
}

#[test]
fn test_optimized_disjunction_runs_end_to_end() {
    register_fixture(
        "translator_tests_disjunction",
        vec![row_i32(&[1, 0]), row_i32(&[2, 0]), row_i32(&[3, 0]), row_i32(&[4, 0])],
    );
    let table = LqpNode::stored_table("translator_tests_disjunction");
    let a = Expression::column(column_reference_of(&table, ColumnId(0)).unwrap());
    let equals = |value: i32| {
        Expression::predicate(
            PredicateCondition::Equals,
            vec![a.clone(), Expression::literal(value)],
        )
    };
    let disjunction =
        Expression::or(equals(1), Expression::or(equals(3), equals(4)));
    let plan = LqpNode::predicate(disjunction, &table);

    let optimized = Optimizer::with_default_rules().optimize(plan).unwrap();
    let result = run(&optimized);
    assert_eq!(
        sorted_rows(&result),
        vec![row_i32(&[1, 0]), row_i32(&[3, 0]), row_i32(&[4, 0])]
    );
}

#[test]
fn test_translate_limit() {
    register_fixture(
        "translator_tests_limit",
        vec![row_i32(&[1, 0]), row_i32(&[2, 0]), row_i32(&[3, 0])],
    );
    let table = LqpNode::stored_table("translator_tests_limit");
    let limit = LqpNode::limit(Expression::literal(2i64), &table);
    let result = run(&limit);
    assert_eq!(result.row_count(), 2);
}
