//! Expression projection

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::{Chunk, ColumnDefinition, Segment, Table, TableType, ValueSegment};
use strata_types::ColumnId;

use crate::errors::ExecutorError;
use crate::evaluator::{PqpExpression, PqpExpressionRef};
use crate::operator::{
    input_table, operator_ref, DescriptionMode, Operator, OperatorRef, OperatorState,
};

/// Evaluates a list of expressions per chunk.
///
/// When every expression is a plain column reference the operator forwards
/// the input segments without copying (keeping the input's table type);
/// otherwise all expressions are materialized into value segments.
#[derive(Debug)]
pub struct Projection {
    input: OperatorRef,
    expressions: Vec<(PqpExpressionRef, String)>,
    state: OperatorState,
}

impl Projection {
    /// `expressions` pairs each expression with its output column name; for
    /// plain column references the input column's name wins.
    pub fn new(input: OperatorRef, expressions: Vec<(PqpExpressionRef, String)>) -> Self {
        Projection { input, expressions, state: OperatorState::new() }
    }
}

impl Operator for Projection {
    fn name(&self) -> &'static str {
        "Projection"
    }

    fn description(&self, _mode: DescriptionMode) -> String {
        let names: Vec<&str> =
            self.expressions.iter().map(|(_, name)| name.as_str()).collect();
        format!("Projection [{}]", names.join(", "))
    }

    fn input_left(&self) -> Option<OperatorRef> {
        Some(self.input.clone())
    }

    fn is_executed(&self) -> bool {
        self.state.is_executed()
    }

    fn execute(&mut self) -> Result<(), ExecutorError> {
        self.state.begin_execute()?;
        let input = input_table(&self.input)?;

        let forwarded_columns: Option<Vec<ColumnId>> = self
            .expressions
            .iter()
            .map(|(expression, _)| match expression.as_ref() {
                PqpExpression::Column(column_id) => Some(*column_id),
                _ => None,
            })
            .collect();

        let output = match forwarded_columns {
            Some(columns) => self.forward_columns(&input, &columns)?,
            None => self.materialize(&input)?,
        };
        self.state.set_output(output);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(Projection::new(
            self.input.lock().deep_copy(),
            self.expressions.clone(),
        ))
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}

impl Projection {
    fn forward_columns(
        &self,
        input: &Arc<Table>,
        columns: &[ColumnId],
    ) -> Result<Table, ExecutorError> {
        let definitions = columns
            .iter()
            .map(|column_id| {
                input
                    .column_definitions()
                    .get(column_id.as_usize())
                    .cloned()
                    .ok_or(ExecutorError::ColumnIdOutOfRange {
                        column_id: column_id.as_usize(),
                        column_count: input.column_count(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let output = Table::new(definitions, input.table_type(), input.target_chunk_size());
        for chunk in input.chunks() {
            self.state.check_cancelled()?;
            let segments = columns
                .iter()
                .map(|column_id| {
                    chunk.get_segment(*column_id).cloned().expect("validated above")
                })
                .collect();
            let mut output_chunk = Chunk::new(segments)?;
            output_chunk.finalize();
            output.append_prepared_chunk(output_chunk)?;
        }
        Ok(output)
    }

    fn materialize(&self, input: &Arc<Table>) -> Result<Table, ExecutorError> {
        let mut definitions = Vec::with_capacity(self.expressions.len());
        for (expression, name) in &self.expressions {
            let name = match expression.as_ref() {
                PqpExpression::Column(column_id) => {
                    input.column_name(*column_id).to_string()
                }
                _ => name.clone(),
            };
            definitions.push(ColumnDefinition::new(
                name,
                expression.data_type(input)?,
                expression.is_nullable(input),
            ));
        }
        let output =
            Table::new(definitions.clone(), TableType::Data, input.target_chunk_size());

        for chunk in input.chunks() {
            self.state.check_cancelled()?;
            let mut segments: Vec<Arc<Segment>> = Vec::with_capacity(self.expressions.len());
            for ((expression, _), definition) in self.expressions.iter().zip(&definitions) {
                let values = expression.evaluate_on_chunk(&chunk)?;
                let segment = ValueSegment::from_values(
                    definition.data_type,
                    definition.nullable,
                    values,
                )?;
                segments.push(Arc::new(Segment::Value(segment)));
            }
            let mut output_chunk = Chunk::new(segments)?;
            output_chunk.finalize();
            output.append_prepared_chunk(output_chunk)?;
        }
        Ok(output)
    }
}
