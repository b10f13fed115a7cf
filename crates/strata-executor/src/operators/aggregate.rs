//! Shared aggregation machinery: definitions, accumulators, output schema

use std::collections::HashSet;
use std::sync::Arc;

use strata_plan::AggregateFunction;
use strata_storage::{Chunk, ColumnDefinition, Segment, Table, TableType, ValueSegment};
use strata_types::{AllTypeVariant, ColumnId, DataType};

use crate::errors::ExecutorError;

/// One aggregate to compute: the function and its input column (`None` for
/// COUNT(*)).
#[derive(Debug, Clone)]
pub struct AggregateDefinition {
    pub function: AggregateFunction,
    pub column_id: Option<ColumnId>,
}

impl AggregateDefinition {
    pub fn new(function: AggregateFunction, column_id: Option<ColumnId>) -> Self {
        debug_assert!(
            column_id.is_some() || function == AggregateFunction::Count,
            "only COUNT may omit its argument column"
        );
        AggregateDefinition { function, column_id }
    }

    fn output_name(&self, input: &Table) -> String {
        match self.column_id {
            Some(column_id) => {
                format!("{}({})", self.function, input.column_name(column_id))
            }
            None => format!("{}(*)", self.function),
        }
    }

    fn output_data_type(&self, input: &Table) -> DataType {
        let argument_type =
            self.column_id.map_or(DataType::Int64, |column_id| input.column_data_type(column_id));
        self.function.result_data_type(argument_type)
    }

    fn output_nullable(&self) -> bool {
        !matches!(self.function, AggregateFunction::Count | AggregateFunction::CountDistinct)
    }
}

/// Running state of one aggregate within one group.
#[derive(Debug)]
pub(crate) enum Accumulator {
    MinMax { minimum: bool, current: Option<AllTypeVariant> },
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Count(i64),
    CountDistinct(HashSet<AllTypeVariant>),
    Avg { sum: f64, count: i64 },
    /// Welford's online moments for the sample standard deviation.
    StdDev { count: i64, mean: f64, m2: f64 },
    Any(Option<AllTypeVariant>),
}

impl Accumulator {
    pub(crate) fn for_definition(
        definition: &AggregateDefinition,
        input: &Table,
    ) -> Accumulator {
        match definition.function {
            AggregateFunction::Min => Accumulator::MinMax { minimum: true, current: None },
            AggregateFunction::Max => Accumulator::MinMax { minimum: false, current: None },
            AggregateFunction::Sum => {
                let argument_type = definition
                    .column_id
                    .map(|column_id| input.column_data_type(column_id))
                    .unwrap_or(DataType::Int64);
                if argument_type.is_floating_point() {
                    Accumulator::SumFloat(None)
                } else {
                    Accumulator::SumInt(None)
                }
            }
            AggregateFunction::Count => Accumulator::Count(0),
            AggregateFunction::CountDistinct => Accumulator::CountDistinct(HashSet::new()),
            AggregateFunction::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
            AggregateFunction::StandardDeviationSample => {
                Accumulator::StdDev { count: 0, mean: 0.0, m2: 0.0 }
            }
            AggregateFunction::Any => Accumulator::Any(None),
        }
    }

    /// Fold one row's value in. `value` is `None` for COUNT(*).
    pub(crate) fn update(&mut self, value: Option<&AllTypeVariant>) {
        match self {
            Accumulator::Count(count) => {
                // COUNT(*) counts rows, COUNT(col) counts non-NULL values.
                match value {
                    None => *count += 1,
                    Some(value) if !value.is_null() => *count += 1,
                    Some(_) => {}
                }
                return;
            }
            Accumulator::Any(current) => {
                if current.is_none() {
                    *current = Some(value.cloned().unwrap_or(AllTypeVariant::Null));
                }
                return;
            }
            _ => {}
        }
        let Some(value) = value else { return };
        if value.is_null() {
            return;
        }
        match self {
            Accumulator::MinMax { minimum, current } => {
                let replace = match current {
                    None => true,
                    Some(best) => {
                        if *minimum {
                            value < best
                        } else {
                            value > best
                        }
                    }
                };
                if replace {
                    *current = Some(value.clone());
                }
            }
            Accumulator::SumInt(sum) => {
                let addend = match value {
                    AllTypeVariant::Int32(v) => *v as i64,
                    AllTypeVariant::Int64(v) => *v,
                    _ => return,
                };
                *sum = Some(sum.unwrap_or(0) + addend);
            }
            Accumulator::SumFloat(sum) => {
                if let Some(addend) = value.to_f64() {
                    *sum = Some(sum.unwrap_or(0.0) + addend);
                }
            }
            Accumulator::CountDistinct(values) => {
                values.insert(value.clone());
            }
            Accumulator::Avg { sum, count } => {
                if let Some(addend) = value.to_f64() {
                    *sum += addend;
                    *count += 1;
                }
            }
            Accumulator::StdDev { count, mean, m2 } => {
                if let Some(observation) = value.to_f64() {
                    *count += 1;
                    let delta = observation - *mean;
                    *mean += delta / *count as f64;
                    *m2 += delta * (observation - *mean);
                }
            }
            Accumulator::Count(_) | Accumulator::Any(_) => unreachable!("handled above"),
        }
    }

    pub(crate) fn finalize(self) -> AllTypeVariant {
        match self {
            Accumulator::MinMax { current, .. } => current.unwrap_or(AllTypeVariant::Null),
            Accumulator::SumInt(sum) => {
                sum.map_or(AllTypeVariant::Null, AllTypeVariant::Int64)
            }
            Accumulator::SumFloat(sum) => {
                sum.map_or(AllTypeVariant::Null, AllTypeVariant::Double)
            }
            Accumulator::Count(count) => AllTypeVariant::Int64(count),
            Accumulator::CountDistinct(values) => AllTypeVariant::Int64(values.len() as i64),
            Accumulator::Avg { sum, count } => {
                if count == 0 {
                    AllTypeVariant::Null
                } else {
                    AllTypeVariant::Double(sum / count as f64)
                }
            }
            Accumulator::StdDev { count, m2, .. } => {
                if count < 2 {
                    AllTypeVariant::Null
                } else {
                    AllTypeVariant::Double((m2 / (count - 1) as f64).sqrt())
                }
            }
            Accumulator::Any(current) => current.unwrap_or(AllTypeVariant::Null),
        }
    }
}

/// Validate column ids and build the output schema: group-by columns (types
/// and names forwarded from the input) followed by one column per aggregate.
pub(crate) fn aggregate_output_definitions(
    input: &Table,
    group_by_column_ids: &[ColumnId],
    aggregates: &[AggregateDefinition],
) -> Result<Vec<ColumnDefinition>, ExecutorError> {
    for column_id in group_by_column_ids
        .iter()
        .chain(aggregates.iter().filter_map(|definition| definition.column_id.as_ref()))
    {
        if column_id.as_usize() >= input.column_count() {
            return Err(ExecutorError::ColumnIdOutOfRange {
                column_id: column_id.as_usize(),
                column_count: input.column_count(),
            });
        }
    }
    let mut definitions: Vec<ColumnDefinition> = group_by_column_ids
        .iter()
        .map(|&column_id| input.column_definitions()[column_id.as_usize()].clone())
        .collect();
    for aggregate in aggregates {
        definitions.push(ColumnDefinition::new(
            aggregate.output_name(input),
            aggregate.output_data_type(input),
            aggregate.output_nullable(),
        ));
    }
    Ok(definitions)
}

/// Materialize grouped results into a single-chunk data table.
pub(crate) fn build_aggregate_output(
    definitions: Vec<ColumnDefinition>,
    rows: Vec<Vec<AllTypeVariant>>,
) -> Result<Table, ExecutorError> {
    let mut columns: Vec<ValueSegment> = definitions
        .iter()
        .map(|definition| ValueSegment::new(definition.data_type, definition.nullable))
        .collect();
    for row in rows {
        for (segment, value) in columns.iter_mut().zip(row) {
            segment.append(value)?;
        }
    }
    let output = Table::new(
        definitions,
        TableType::Data,
        strata_storage::table::DEFAULT_TARGET_CHUNK_SIZE,
    );
    let segments: Vec<Arc<Segment>> =
        columns.into_iter().map(|segment| Arc::new(Segment::Value(segment))).collect();
    let mut chunk = Chunk::new(segments)?;
    chunk.finalize();
    output.append_prepared_chunk(chunk)?;
    Ok(output)
}
