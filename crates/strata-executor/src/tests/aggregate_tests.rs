//! Aggregation: hash and sort implementations share one contract

use strata_plan::AggregateFunction;
use strata_storage::ColumnDefinition;
use strata_types::{AllTypeVariant, ColumnId, DataType, SortMode};

use crate::operator::operator_ref;
use crate::operators::{AggregateDefinition, AggregateHash, AggregateSort, Sort};
use crate::tests::common::{build_table, execute, sorted_rows, wrap};

fn two_column_fixture() -> std::sync::Arc<strata_storage::Table> {
    build_table(
        vec![
            ColumnDefinition::new("a", DataType::Int32, true),
            ColumnDefinition::new("b", DataType::Int32, true),
        ],
        vec![
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Int32(2)],
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Int32(3)],
            vec![AllTypeVariant::Int32(2), AllTypeVariant::Int32(5)],
        ],
        2,
    )
}

#[test]
fn test_hash_aggregate_min_per_group() {
    let aggregate = operator_ref(AggregateHash::new(
        wrap(two_column_fixture()),
        vec![ColumnId(0)],
        vec![AggregateDefinition::new(AggregateFunction::Min, Some(ColumnId(1)))],
    ));
    let result = execute(&aggregate);
    assert_eq!(
        sorted_rows(&result),
        vec![
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Int32(2)],
            vec![AllTypeVariant::Int32(2), AllTypeVariant::Int32(5)],
        ]
    );
}

#[test]
fn test_hash_aggregate_full_function_set() {
    let table = build_table(
        vec![
            ColumnDefinition::new("g", DataType::Int32, false),
            ColumnDefinition::new("v", DataType::Int32, true),
        ],
        vec![
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Int32(2)],
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Int32(2)],
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Int32(8)],
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Null],
        ],
        10,
    );
    let aggregate = operator_ref(AggregateHash::new(
        wrap(table),
        vec![ColumnId(0)],
        vec![
            AggregateDefinition::new(AggregateFunction::Count, None),
            AggregateDefinition::new(AggregateFunction::Count, Some(ColumnId(1))),
            AggregateDefinition::new(AggregateFunction::CountDistinct, Some(ColumnId(1))),
            AggregateDefinition::new(AggregateFunction::Sum, Some(ColumnId(1))),
            AggregateDefinition::new(AggregateFunction::Avg, Some(ColumnId(1))),
            AggregateDefinition::new(AggregateFunction::Max, Some(ColumnId(1))),
            AggregateDefinition::new(AggregateFunction::Any, Some(ColumnId(0))),
        ],
    ));
    let result = execute(&aggregate);
    let rows = result.rows();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row[1], AllTypeVariant::Int64(4), "COUNT(*) counts rows");
    assert_eq!(row[2], AllTypeVariant::Int64(3), "COUNT(v) skips NULL");
    assert_eq!(row[3], AllTypeVariant::Int64(2), "two distinct non-NULL values");
    assert_eq!(row[4], AllTypeVariant::Int64(12));
    assert_eq!(row[5], AllTypeVariant::Double(4.0));
    assert_eq!(row[6], AllTypeVariant::Int32(8));
    assert_eq!(row[7], AllTypeVariant::Int32(1), "ANY picks a representative");
}

#[test]
fn test_stddev_samp() {
    let table = build_table(
        vec![ColumnDefinition::new("v", DataType::Double, false)],
        vec![
            vec![AllTypeVariant::Double(2.0)],
            vec![AllTypeVariant::Double(4.0)],
            vec![AllTypeVariant::Double(4.0)],
            vec![AllTypeVariant::Double(4.0)],
            vec![AllTypeVariant::Double(5.0)],
            vec![AllTypeVariant::Double(5.0)],
            vec![AllTypeVariant::Double(7.0)],
            vec![AllTypeVariant::Double(9.0)],
        ],
        10,
    );
    let aggregate = operator_ref(AggregateHash::new(
        wrap(table),
        vec![],
        vec![AggregateDefinition::new(
            AggregateFunction::StandardDeviationSample,
            Some(ColumnId(0)),
        )],
    ));
    let result = execute(&aggregate);
    let AllTypeVariant::Double(stddev) = result.rows()[0][0] else {
        panic!("stddev yields a double");
    };
    assert!((stddev - 2.13808993529939).abs() < 1e-9);
}

#[test]
fn test_null_group_keys_form_their_own_group() {
    let table = build_table(
        vec![
            ColumnDefinition::new("g", DataType::Int32, true),
            ColumnDefinition::new("v", DataType::Int32, false),
        ],
        vec![
            vec![AllTypeVariant::Null, AllTypeVariant::Int32(1)],
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Int32(2)],
            vec![AllTypeVariant::Null, AllTypeVariant::Int32(3)],
        ],
        10,
    );
    let aggregate = operator_ref(AggregateHash::new(
        wrap(table),
        vec![ColumnId(0)],
        vec![AggregateDefinition::new(AggregateFunction::Count, None)],
    ));
    let result = execute(&aggregate);
    assert_eq!(
        sorted_rows(&result),
        vec![
            vec![AllTypeVariant::Null, AllTypeVariant::Int64(2)],
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Int64(1)],
        ]
    );
}

#[test]
fn test_global_aggregate_on_empty_input() {
    let table = build_table(
        vec![ColumnDefinition::new("v", DataType::Int32, true)],
        vec![],
        10,
    );
    let aggregate = operator_ref(AggregateHash::new(
        wrap(table),
        vec![],
        vec![
            AggregateDefinition::new(AggregateFunction::Count, None),
            AggregateDefinition::new(AggregateFunction::Sum, Some(ColumnId(0))),
            AggregateDefinition::new(AggregateFunction::Min, Some(ColumnId(0))),
        ],
    ));
    let result = execute(&aggregate);
    assert_eq!(
        result.rows(),
        vec![vec![AllTypeVariant::Int64(0), AllTypeVariant::Null, AllTypeVariant::Null]]
    );
}

#[test]
fn test_sort_aggregate_matches_hash_aggregate_on_sorted_input() {
    let fixture = two_column_fixture();
    let aggregates = || {
        vec![
            AggregateDefinition::new(AggregateFunction::Min, Some(ColumnId(1))),
            AggregateDefinition::new(AggregateFunction::Count, None),
        ]
    };

    let hash = operator_ref(AggregateHash::new(
        wrap(fixture.clone()),
        vec![ColumnId(0)],
        aggregates(),
    ));
    let hash_result = sorted_rows(&execute(&hash));

    // AggregateSort requires group-sorted input: sort first.
    let sorted_input = operator_ref(Sort::new(
        wrap(fixture),
        vec![(ColumnId(0), SortMode::Ascending)],
        None,
    ));
    let sort_aggregate = operator_ref(AggregateSort::new(
        sorted_input,
        vec![ColumnId(0)],
        aggregates(),
    ));
    let sort_result = sorted_rows(&execute(&sort_aggregate));

    assert_eq!(hash_result, sort_result);
}
