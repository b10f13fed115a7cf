//! Scenario tests for the optimizer rules

use std::rc::Rc;
use std::sync::Arc;

use strata_storage::{ColumnDefinition, StorageManager, Table};
use strata_types::{ColumnId, DataType, JoinMode, PredicateCondition, SetOperationMode};

use crate::expression::{
    expressions_equal, AggregateFunction, Expression, ExpressionRef,
};
use crate::lqp::{column_reference_of, LqpNode, LqpNodeKind, LqpNodeRef};
use crate::optimizer::{
    ColumnPruningRule, DependentGroupByReductionRule, DisjunctionToUnionRule, Optimizer,
    PredicatePlacementRule, SubplanReuseRule,
};

fn register_table(name: &str, definitions: Vec<ColumnDefinition>) {
    let manager = StorageManager::get();
    if manager.has_table(name) {
        return;
    }
    manager.add_table(name, Arc::new(Table::new_data(definitions))).unwrap();
}

fn int_column(node: &LqpNodeRef, column_id: u16) -> ExpressionRef {
    Expression::column(column_reference_of(node, ColumnId(column_id)).unwrap())
}

fn equals(column: ExpressionRef, value: i32) -> ExpressionRef {
    Expression::predicate(
        PredicateCondition::Equals,
        vec![column, Expression::literal(value)],
    )
}

#[test]
fn test_disjunction_to_union_splits_right_deep() {
    register_table(
        "optimizer_tests_disjunction",
        vec![ColumnDefinition::new("a", DataType::Int32, false)],
    );
    let table = LqpNode::stored_table("optimizer_tests_disjunction");
    let column = int_column(&table, 0);

    // a=1 OR (a=2 OR (a=3 OR a=4))
    let disjunction = Expression::or(
        equals(column.clone(), 1),
        Expression::or(
            equals(column.clone(), 2),
            Expression::or(equals(column.clone(), 3), equals(column.clone(), 4)),
        ),
    );
    let predicate = LqpNode::predicate(disjunction, &table);
    let root = Optimizer::apply_rule(&DisjunctionToUnionRule, &predicate).unwrap();

    // Expect a right-deep union chain of four predicates over the shared
    // table.
    let mut union = root.left_input().unwrap();
    let mut predicate_leaves = Vec::new();
    for _ in 0..3 {
        assert!(matches!(
            union.kind(),
            LqpNodeKind::Union { set_operation_mode: SetOperationMode::Positions }
        ));
        let left = union.left_input().unwrap();
        assert!(matches!(left.kind(), LqpNodeKind::Predicate));
        predicate_leaves.push(left);
        union = union.right_input().unwrap();
    }
    assert!(matches!(union.kind(), LqpNodeKind::Predicate));
    predicate_leaves.push(union);

    for leaf in &predicate_leaves {
        assert!(
            Rc::ptr_eq(&leaf.left_input().unwrap(), &table),
            "all branches share the scan by pointer"
        );
    }
}

#[test]
fn test_subplan_reuse_redirects_duplicates() {
    register_table(
        "optimizer_tests_reuse",
        vec![
            ColumnDefinition::new("a", DataType::Int32, false),
            ColumnDefinition::new("b", DataType::Int32, true),
        ],
    );

    let build_branch = || {
        let table = LqpNode::stored_table("optimizer_tests_reuse");
        LqpNode::predicate(equals(int_column(&table, 0), 7), &table)
    };
    let left_branch = build_branch();
    let right_branch = build_branch();
    assert!(!Rc::ptr_eq(&left_branch, &right_branch));

    let union = LqpNode::union(SetOperationMode::All, &left_branch, &right_branch);
    let root = Optimizer::apply_rule(&SubplanReuseRule, &union).unwrap();

    let optimized_union = root.left_input().unwrap();
    let left = optimized_union.left_input().unwrap();
    let right = optimized_union.right_input().unwrap();
    assert!(Rc::ptr_eq(&left, &right), "the duplicate branch is redirected to the primary");
}

#[test]
fn test_predicate_push_down_through_join() {
    register_table(
        "optimizer_tests_pushdown_left",
        vec![
            ColumnDefinition::new("id", DataType::Int32, false),
            ColumnDefinition::new("x", DataType::Int32, true),
        ],
    );
    register_table(
        "optimizer_tests_pushdown_right",
        vec![
            ColumnDefinition::new("id", DataType::Int32, false),
            ColumnDefinition::new("y", DataType::Int32, true),
        ],
    );
    let left = LqpNode::stored_table("optimizer_tests_pushdown_left");
    let right = LqpNode::stored_table("optimizer_tests_pushdown_right");
    let join = LqpNode::join(
        JoinMode::Inner,
        vec![Expression::predicate(
            PredicateCondition::Equals,
            vec![int_column(&left, 0), int_column(&right, 0)],
        )],
        &left,
        &right,
    );
    // σ(right.y = 5) above the join is evaluable on the right input alone.
    let filter = LqpNode::predicate(equals(int_column(&right, 1), 5), &join);
    let root = Optimizer::apply_rule(&PredicatePlacementRule, &filter).unwrap();

    let top = root.left_input().unwrap();
    assert!(matches!(top.kind(), LqpNodeKind::Join { .. }), "the predicate moved off the top");
    let right_child = top.right_input().unwrap();
    assert!(matches!(right_child.kind(), LqpNodeKind::Predicate));
    assert!(Rc::ptr_eq(&right_child.left_input().unwrap(), &right));
}

#[test]
fn test_expensive_predicate_pulled_up() {
    register_table(
        "optimizer_tests_pullup",
        vec![
            ColumnDefinition::new("id", DataType::Int32, false),
            ColumnDefinition::new("x", DataType::Int32, true),
        ],
    );
    register_table(
        "optimizer_tests_pullup_sub",
        vec![ColumnDefinition::new("k", DataType::Int32, false)],
    );
    let table = LqpNode::stored_table("optimizer_tests_pullup");

    // Correlated EXISTS: expensive, sits below a cheap predicate initially.
    let subquery_plan = LqpNode::stored_table("optimizer_tests_pullup_sub");
    let correlated = Expression::exists(Expression::subquery(
        subquery_plan,
        vec![int_column(&table, 0)],
    ));
    let expensive = LqpNode::predicate(correlated, &table);
    let cheap = LqpNode::predicate(equals(int_column(&table, 1), 3), &expensive);

    let root = Optimizer::apply_rule(&PredicatePlacementRule, &cheap).unwrap();

    // The expensive predicate ends up on top, the cheap one below it.
    let top = root.left_input().unwrap();
    assert!(matches!(top.kind(), LqpNodeKind::Predicate));
    assert!(top.node_expressions()[0].contains_correlated_subquery());
    let below = top.left_input().unwrap();
    assert!(matches!(below.kind(), LqpNodeKind::Predicate));
    assert!(!below.node_expressions()[0].contains_correlated_subquery());
}

#[test]
fn test_column_pruning_trims_stored_table() {
    register_table(
        "optimizer_tests_pruning",
        vec![
            ColumnDefinition::new("a", DataType::Int32, false),
            ColumnDefinition::new("b", DataType::Int32, true),
            ColumnDefinition::new("c", DataType::Int32, true),
        ],
    );
    let table = LqpNode::stored_table("optimizer_tests_pruning");
    let projection = LqpNode::projection(vec![int_column(&table, 0)], &table);

    let _root = Optimizer::apply_rule(&ColumnPruningRule, &projection).unwrap();

    let LqpNodeKind::StoredTable { pruned_column_ids, .. } = table.kind() else {
        panic!("stored table expected");
    };
    assert_eq!(*pruned_column_ids.borrow(), vec![ColumnId(1), ColumnId(2)]);
    assert_eq!(table.column_expressions().len(), 1);
}

#[test]
fn test_column_pruning_rewrites_join_to_semi() {
    register_table(
        "optimizer_tests_semi_fact",
        vec![
            ColumnDefinition::new("id", DataType::Int32, false),
            ColumnDefinition::new("dim_id", DataType::Int32, false),
        ],
    );
    let manager = StorageManager::get();
    if !manager.has_table("optimizer_tests_semi_dim") {
        let dim = Arc::new(Table::new_data(vec![
            ColumnDefinition::new("id", DataType::Int32, false),
            ColumnDefinition::new("payload", DataType::String, true),
        ]));
        dim.add_soft_unique_constraint(vec![ColumnId(0)], true).unwrap();
        manager.add_table("optimizer_tests_semi_dim", dim).unwrap();
    }

    let fact = LqpNode::stored_table("optimizer_tests_semi_fact");
    let dim = LqpNode::stored_table("optimizer_tests_semi_dim");
    let join = LqpNode::join(
        JoinMode::Inner,
        vec![Expression::predicate(
            PredicateCondition::Equals,
            vec![int_column(&fact, 1), int_column(&dim, 0)],
        )],
        &fact,
        &dim,
    );
    // Only fact columns are consumed above the join.
    let projection = LqpNode::projection(vec![int_column(&fact, 0)], &join);

    let root = Optimizer::apply_rule(&ColumnPruningRule, &projection).unwrap();

    let top = root.left_input().unwrap();
    let rewritten = top.left_input().unwrap();
    assert!(
        matches!(rewritten.kind(), LqpNodeKind::Join { join_mode: JoinMode::Semi }),
        "inner join on the unique dimension key becomes a semi join, got {}",
        rewritten.description()
    );
    assert!(Rc::ptr_eq(&rewritten.left_input().unwrap(), &fact));
}

#[test]
fn test_dependent_group_by_reduction() {
    let manager = StorageManager::get();
    if !manager.has_table("optimizer_tests_group_by") {
        let table = Arc::new(Table::new_data(vec![
            ColumnDefinition::new("id", DataType::Int32, false),
            ColumnDefinition::new("name", DataType::String, true),
            ColumnDefinition::new("value", DataType::Double, true),
        ]));
        table.add_soft_unique_constraint(vec![ColumnId(0)], true).unwrap();
        manager.add_table("optimizer_tests_group_by", table).unwrap();
    }

    let table = LqpNode::stored_table("optimizer_tests_group_by");
    let id = int_column(&table, 0);
    let name = int_column(&table, 1);
    let sum = Expression::aggregate(AggregateFunction::Sum, Some(int_column(&table, 2)));
    let aggregate = LqpNode::aggregate(vec![id.clone(), name.clone()], vec![sum], &table);
    let projection = LqpNode::projection(vec![name.clone(), id.clone()], &aggregate);

    let _root = Optimizer::apply_rule(&DependentGroupByReductionRule, &projection).unwrap();

    let LqpNodeKind::Aggregate { group_by_count } = aggregate.kind() else {
        panic!("aggregate expected");
    };
    assert_eq!(group_by_count.get(), 1, "the dependent name column left the group-by set");

    let expressions = aggregate.node_expressions();
    assert!(expressions_equal(&expressions[0], &id));
    let any_name = Expression::aggregate(AggregateFunction::Any, Some(name.clone()));
    assert!(expressions_equal(&expressions[1], &any_name));

    // The consumer's reference to `name` now points at ANY(name).
    let projected = projection.node_expressions();
    assert!(expressions_equal(&projected[0], &any_name));
    assert!(expressions_equal(&projected[1], &id));
}

#[test]
fn test_default_pipeline_runs_end_to_end() {
    register_table(
        "optimizer_tests_pipeline",
        vec![
            ColumnDefinition::new("a", DataType::Int32, false),
            ColumnDefinition::new("b", DataType::Int32, true),
        ],
    );
    let table = LqpNode::stored_table("optimizer_tests_pipeline");
    let disjunction = Expression::or(
        equals(int_column(&table, 0), 1),
        equals(int_column(&table, 0), 2),
    );
    let plan = LqpNode::predicate(disjunction, &table);

    let optimized = Optimizer::with_default_rules().optimize(plan).unwrap();
    assert!(matches!(optimized.kind(), LqpNodeKind::Union { .. }));
}
