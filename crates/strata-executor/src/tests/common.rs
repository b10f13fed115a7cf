//! Shared fixtures and helpers for the executor tests

use std::sync::Arc;

use strata_storage::{
    ChunkEncoder, ColumnDefinition, EncodingType, Segment, SegmentEncodingSpec, Table, TableType,
    ValueSegment,
};
use strata_types::{AllTypeVariant, ChunkOffset, DataType};

use crate::operator::{operator_ref, OperatorRef};
use crate::operators::TableWrapper;
use crate::scheduler::{execute_plan, ImmediateScheduler};

/// Wrap a table as a plan leaf.
pub fn wrap(table: Arc<Table>) -> OperatorRef {
    operator_ref(TableWrapper::new(table))
}

/// Execute an operator DAG inline and return the root output.
pub fn execute(root: &OperatorRef) -> Arc<Table> {
    execute_plan(root, &ImmediateScheduler).expect("plan executes")
}

/// Build a data table from rows, cut into chunks of `chunk_size`.
pub fn build_table(
    definitions: Vec<ColumnDefinition>,
    rows: Vec<Vec<AllTypeVariant>>,
    chunk_size: ChunkOffset,
) -> Arc<Table> {
    let table = Table::new(definitions, TableType::Data, chunk_size);
    for row in rows {
        table.append_row(row).expect("fixture rows are valid");
    }
    table.finalize_last_chunk();
    Arc::new(table)
}

/// The (int, float) fixture: three rows over two chunks.
pub fn int_float_table() -> Arc<Table> {
    build_table(
        vec![
            ColumnDefinition::new("a", DataType::Int32, false),
            ColumnDefinition::new("b", DataType::Float, false),
        ],
        vec![
            vec![AllTypeVariant::Int32(12345), AllTypeVariant::Float(458.7)],
            vec![AllTypeVariant::Int32(123), AllTypeVariant::Float(456.7)],
            vec![AllTypeVariant::Int32(1234), AllTypeVariant::Float(457.7)],
        ],
        2,
    )
}

/// A single-column int table with per-test chunking.
pub fn int_table(values: &[Option<i32>], chunk_size: ChunkOffset) -> Arc<Table> {
    build_table(
        vec![ColumnDefinition::new("a", DataType::Int32, true)],
        values
            .iter()
            .map(|value| vec![value.map_or(AllTypeVariant::Null, AllTypeVariant::Int32)])
            .collect(),
        chunk_size,
    )
}

/// Dictionary-encode every chunk of a single-column table.
pub fn dictionary_encode(table: &Table) -> Arc<Table> {
    reencode(table, EncodingType::Dictionary)
}

/// Re-encode every segment of a table with the given encoding.
pub fn reencode(table: &Table, encoding: EncodingType) -> Arc<Table> {
    let encoded = Table::new(
        table.column_definitions().to_vec(),
        TableType::Data,
        table.target_chunk_size(),
    );
    for chunk in table.chunks() {
        let specs = vec![SegmentEncodingSpec::new(encoding); chunk.column_count()];
        let encoded_chunk = ChunkEncoder::encode_chunk(&chunk, &specs).expect("encodable fixture");
        encoded.append_prepared_chunk(encoded_chunk).expect("chunk fits the table");
    }
    Arc::new(encoded)
}

/// Materialized rows, order-insensitive comparison helper.
pub fn sorted_rows(table: &Table) -> Vec<Vec<AllTypeVariant>> {
    let mut rows = table.rows();
    rows.sort();
    rows
}

/// Shorthand row constructors.
pub fn row_i32(values: &[i32]) -> Vec<AllTypeVariant> {
    values.iter().map(|&value| AllTypeVariant::Int32(value)).collect()
}

/// A plain unencoded single-column segment; some tests build chunks by hand.
pub fn int_segment(values: &[Option<i32>]) -> Arc<Segment> {
    let variants = values
        .iter()
        .map(|value| value.map_or(AllTypeVariant::Null, AllTypeVariant::Int32))
        .collect();
    Arc::new(Segment::Value(
        ValueSegment::from_values(DataType::Int32, true, variants).expect("fixture values"),
    ))
}
