//! Benchmarks for the table scan specializations

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata_executor::{
    execute_plan, operator_ref, ImmediateScheduler, OperatorRef, TableScan, TableWrapper,
};
use strata_storage::{
    ChunkEncoder, ColumnDefinition, EncodingType, SegmentEncodingSpec, Table, TableType,
};
use strata_types::{AllTypeVariant, ColumnId, DataType, PredicateCondition};

const ROW_COUNT: usize = 100_000;
const CHUNK_SIZE: u32 = 10_000;

/// One int column with a skewed value distribution (dictionary-friendly).
fn build_input(encoding: Option<EncodingType>) -> Arc<Table> {
    let mut rng = StdRng::seed_from_u64(42);
    let table = Table::new(
        vec![ColumnDefinition::new("v", DataType::Int32, false)],
        TableType::Data,
        CHUNK_SIZE,
    );
    for _ in 0..ROW_COUNT {
        table.append_row(vec![AllTypeVariant::Int32(rng.gen_range(0..1_000))]).unwrap();
    }
    table.finalize_last_chunk();

    match encoding {
        None => Arc::new(table),
        Some(encoding) => {
            let encoded = Table::new(
                table.column_definitions().to_vec(),
                TableType::Data,
                CHUNK_SIZE,
            );
            for chunk in table.chunks() {
                let specs = vec![SegmentEncodingSpec::new(encoding); 1];
                encoded
                    .append_prepared_chunk(ChunkEncoder::encode_chunk(&chunk, &specs).unwrap())
                    .unwrap();
            }
            Arc::new(encoded)
        }
    }
}

fn scan_operator(table: Arc<Table>) -> OperatorRef {
    operator_ref(
        TableScan::new(
            operator_ref(TableWrapper::new(table)),
            ColumnId(0),
            PredicateCondition::LessThan,
            AllTypeVariant::Int32(100),
            None,
        )
        .unwrap(),
    )
}

fn bench_table_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_scan");
    group.throughput(Throughput::Elements(ROW_COUNT as u64));

    for (label, encoding) in [
        ("unencoded", None),
        ("dictionary", Some(EncodingType::Dictionary)),
        ("run_length", Some(EncodingType::RunLength)),
        ("frame_of_reference", Some(EncodingType::FrameOfReference)),
    ] {
        let table = build_input(encoding);
        group.bench_with_input(BenchmarkId::from_parameter(label), &table, |b, table| {
            b.iter(|| {
                let operator = scan_operator(table.clone());
                let output = execute_plan(&operator, &ImmediateScheduler).unwrap();
                black_box(output.row_count())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_table_scan);
criterion_main!(benches);
