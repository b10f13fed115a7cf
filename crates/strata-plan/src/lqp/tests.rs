//! Structure tests for the LQP node DAG

use std::rc::Rc;
use std::sync::Arc;

use strata_storage::{ColumnDefinition, StorageManager, Table};
use strata_types::{ColumnId, DataType, JoinMode, PredicateCondition, SortMode};

use crate::expression::{expressions_equal, Expression};
use crate::lqp::{
    column_reference_of, insert_node_above, remove_node_from_plan, subplans_equal, ColumnLookup,
    InputSide, LqpColumnReference, LqpNode, LqpNodeKind,
};

/// Register a three-column fixture table under a unique name.
fn register_table(name: &str) {
    let manager = StorageManager::get();
    if manager.has_table(name) {
        return;
    }
    let table = Arc::new(Table::new_data(vec![
        ColumnDefinition::new("id", DataType::Int32, false),
        ColumnDefinition::new("name", DataType::String, true),
        ColumnDefinition::new("value", DataType::Double, true),
    ]));
    table.add_soft_unique_constraint(vec![ColumnId(0)], true).unwrap();
    manager.add_table(name, table).unwrap();
}

#[test]
fn test_stored_table_column_expressions() {
    register_table("lqp_tests_columns");
    let node = LqpNode::stored_table("lqp_tests_columns");
    let expressions = node.column_expressions();
    assert_eq!(expressions.len(), 3);

    let reference = column_reference_of(&node, ColumnId(1)).unwrap();
    assert_eq!(reference.original_column_id(), ColumnId(1));
    assert!(Rc::ptr_eq(&reference.original_node().unwrap(), &node));
}

#[test]
fn test_stored_table_pruning_keeps_original_ids() {
    register_table("lqp_tests_pruning");
    let node = LqpNode::stored_table("lqp_tests_pruning");
    if let LqpNodeKind::StoredTable { pruned_column_ids, .. } = node.kind() {
        pruned_column_ids.borrow_mut().push(ColumnId(1));
    }
    let expressions = node.column_expressions();
    assert_eq!(expressions.len(), 2);
    // Output column 1 is now the table's original column 2.
    let reference = column_reference_of(&node, ColumnId(1)).unwrap();
    assert_eq!(reference.original_column_id(), ColumnId(2));
    assert!(!node.is_column_nullable(ColumnId(0)));
    assert!(node.is_column_nullable(ColumnId(1)));
}

#[test]
fn test_set_input_maintains_output_relations() {
    register_table("lqp_tests_relations");
    let table = LqpNode::stored_table("lqp_tests_relations");
    let reference = column_reference_of(&table, ColumnId(0)).unwrap();
    let predicate = Expression::predicate(
        PredicateCondition::Equals,
        vec![Expression::column(reference), Expression::literal(1)],
    );
    let filter = LqpNode::predicate(predicate, &table);

    let relations = table.output_relations();
    assert_eq!(relations.len(), 1);
    assert!(Rc::ptr_eq(&relations[0].0, &filter));
    assert_eq!(relations[0].1, InputSide::Left);

    filter.set_left_input(None);
    assert!(table.output_relations().is_empty());
}

#[test]
fn test_self_join_disambiguates_with_lineage() {
    register_table("lqp_tests_self_join");
    let table = LqpNode::stored_table("lqp_tests_self_join");
    let key = Expression::column(column_reference_of(&table, ColumnId(0)).unwrap());
    let predicate =
        Expression::predicate(PredicateCondition::Equals, vec![key.clone(), key.clone()]);
    let join = LqpNode::join(JoinMode::Inner, vec![predicate], &table, &table);

    let expressions = join.column_expressions();
    assert_eq!(expressions.len(), 6);
    for (index, expression) in expressions.iter().enumerate() {
        let Expression::Column(reference) = expression.as_ref() else {
            panic!("join outputs plain columns");
        };
        assert_eq!(reference.lineage().len(), 1, "every column is ambiguous in a self join");
        let expected_side = if index < 3 { InputSide::Left } else { InputSide::Right };
        assert_eq!(reference.lineage_side_for(&join), Some(expected_side));
    }

    // Lineage-carrying references resolve to their side; bare ones are
    // ambiguous.
    let bare = Expression::column(column_reference_of(&table, ColumnId(1)).unwrap());
    assert_eq!(join.find_column_id(&bare), ColumnLookup::Ambiguous);

    let left_reference = LqpColumnReference::new(&table, ColumnId(1))
        .with_lineage_step(&join, InputSide::Left);
    assert_eq!(
        join.find_column_id(&Expression::column(left_reference)),
        ColumnLookup::Resolved(ColumnId(1))
    );
    let right_reference = LqpColumnReference::new(&table, ColumnId(1))
        .with_lineage_step(&join, InputSide::Right);
    assert_eq!(
        join.find_column_id(&Expression::column(right_reference)),
        ColumnLookup::Resolved(ColumnId(4))
    );
}

#[test]
fn test_find_column_id_not_found() {
    register_table("lqp_tests_not_found");
    register_table("lqp_tests_not_found_other");
    let table = LqpNode::stored_table("lqp_tests_not_found");
    let other = LqpNode::stored_table("lqp_tests_not_found_other");
    let foreign = Expression::column(column_reference_of(&other, ColumnId(0)).unwrap());
    assert_eq!(table.find_column_id(&foreign), ColumnLookup::NotFound);
}

#[test]
fn test_join_nullability() {
    register_table("lqp_tests_nullability");
    let left = LqpNode::stored_table("lqp_tests_nullability");
    let right = LqpNode::stored_table("lqp_tests_nullability");
    let predicate = Expression::predicate(
        PredicateCondition::Equals,
        vec![
            Expression::column(column_reference_of(&left, ColumnId(0)).unwrap()),
            Expression::column(column_reference_of(&right, ColumnId(0)).unwrap()),
        ],
    );
    let join = LqpNode::join(JoinMode::Left, vec![predicate], &left, &right);

    // Left outer join: left columns keep their nullability, right columns
    // become nullable.
    assert!(!join.is_column_nullable(ColumnId(0)));
    assert!(join.is_column_nullable(ColumnId(3)));
    assert!(join.is_column_nullable(ColumnId(4)));
}

#[test]
fn test_subplans_equal_for_independent_plans() {
    register_table("lqp_tests_equality");

    let build = || {
        let table = LqpNode::stored_table("lqp_tests_equality");
        let reference = column_reference_of(&table, ColumnId(0)).unwrap();
        let predicate = Expression::predicate(
            PredicateCondition::GreaterThan,
            vec![Expression::column(reference), Expression::literal(10)],
        );
        LqpNode::predicate(predicate, &table)
    };

    let plan_a = build();
    let plan_b = build();
    assert!(!Rc::ptr_eq(&plan_a, &plan_b));
    assert!(subplans_equal(&plan_a, &plan_b));
    assert_eq!(plan_a.hash_value(), plan_b.hash_value());

    // A different literal breaks equality but not (necessarily) hashing by
    // column id.
    let table = LqpNode::stored_table("lqp_tests_equality");
    let reference = column_reference_of(&table, ColumnId(0)).unwrap();
    let predicate = Expression::predicate(
        PredicateCondition::GreaterThan,
        vec![Expression::column(reference), Expression::literal(11)],
    );
    let plan_c = LqpNode::predicate(predicate, &table);
    assert!(!subplans_equal(&plan_a, &plan_c));
}

#[test]
fn test_deep_copy_is_independent_and_equal() {
    register_table("lqp_tests_deep_copy");
    let table = LqpNode::stored_table("lqp_tests_deep_copy");
    let reference = column_reference_of(&table, ColumnId(2)).unwrap();
    let predicate = Expression::predicate(
        PredicateCondition::LessThan,
        vec![Expression::column(reference), Expression::literal(0.5)],
    );
    let plan = LqpNode::sort(
        vec![Expression::column(column_reference_of(&table, ColumnId(0)).unwrap())],
        vec![SortMode::Ascending],
        &LqpNode::predicate(predicate, &table),
    );

    let copy = plan.deep_copy();
    assert!(!Rc::ptr_eq(&plan, &copy));
    assert!(subplans_equal(&plan, &copy));

    // The copy's expressions reference the copied stored table, not the
    // original.
    let copied_table = copy.left_input().unwrap().left_input().unwrap();
    assert!(!Rc::ptr_eq(&copied_table, &table));
    let copied_sort_expression = &copy.node_expressions()[0];
    let Expression::Column(copied_reference) = copied_sort_expression.as_ref() else {
        panic!("sort key is a column");
    };
    assert!(Rc::ptr_eq(&copied_reference.original_node().unwrap(), &copied_table));
}

#[test]
fn test_remove_and_insert_surgery() {
    register_table("lqp_tests_surgery");
    let table = LqpNode::stored_table("lqp_tests_surgery");
    let reference = column_reference_of(&table, ColumnId(0)).unwrap();
    let predicate = Expression::predicate(
        PredicateCondition::Equals,
        vec![Expression::column(reference.clone()), Expression::literal(1)],
    );
    let filter = LqpNode::predicate(predicate, &table);
    let root = LqpNode::root(&filter);

    remove_node_from_plan(&filter);
    assert!(Rc::ptr_eq(&root.left_input().unwrap(), &table));
    assert!(filter.left_input().is_none());

    // `sort` is built on top of `table`; the helper rewires the remaining
    // outputs.
    let sort = LqpNode::sort(
        vec![Expression::column(reference)],
        vec![SortMode::Descending],
        &table,
    );
    insert_node_above(&table, &sort);
    assert!(Rc::ptr_eq(&root.left_input().unwrap(), &sort));
    assert!(Rc::ptr_eq(&sort.left_input().unwrap(), &table));
}

#[test]
fn test_unique_column_combinations_propagation() {
    register_table("lqp_tests_uccs");
    let table = LqpNode::stored_table("lqp_tests_uccs");
    let id = Expression::column(column_reference_of(&table, ColumnId(0)).unwrap());
    let name = Expression::column(column_reference_of(&table, ColumnId(1)).unwrap());

    // The declared primary key survives a predicate.
    let filter = LqpNode::predicate(
        Expression::predicate(
            PredicateCondition::IsNotNull,
            vec![name.clone()],
        ),
        &table,
    );
    let combinations = filter.unique_column_combinations();
    assert_eq!(combinations.len(), 1);
    assert!(expressions_equal(&combinations[0][0], &id));

    // An aggregate adds its group-by set.
    let aggregate = LqpNode::aggregate(
        vec![name.clone()],
        vec![Expression::aggregate(
            crate::expression::AggregateFunction::Count,
            None,
        )],
        &filter,
    );
    let combinations = aggregate.unique_column_combinations();
    assert!(combinations
        .iter()
        .any(|combination| combination.len() == 1
            && expressions_equal(&combination[0], &name)));
}
