//! Physical expression evaluation
//!
//! After translation, expressions reference columns by output column id
//! instead of plan-node lineage; evaluation is column-at-a-time over a chunk
//! (or row-at-a-time for join candidate pairs).

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;

use strata_plan::{ArithmeticOperator, LogicalOperator};
use strata_storage::{Chunk, Table};
use strata_types::{AllTypeVariant, ColumnId, DataType, PredicateCondition};

use crate::errors::ExecutorError;

pub type PqpExpressionRef = Arc<PqpExpression>;

/// An expression over the columns of one operator output (or, for join
/// predicates, the concatenation of both input outputs).
#[derive(Debug, Clone, PartialEq)]
pub enum PqpExpression {
    Column(ColumnId),
    Literal(AllTypeVariant),
    Arithmetic { op: ArithmeticOperator, left: PqpExpressionRef, right: PqpExpressionRef },
    Predicate { condition: PredicateCondition, arguments: Vec<PqpExpressionRef> },
    Logical { op: LogicalOperator, left: PqpExpressionRef, right: PqpExpressionRef },
}

impl PqpExpression {
    pub fn column(column_id: ColumnId) -> PqpExpressionRef {
        Arc::new(PqpExpression::Column(column_id))
    }

    pub fn literal(value: impl Into<AllTypeVariant>) -> PqpExpressionRef {
        Arc::new(PqpExpression::Literal(value.into()))
    }

    /// Result type against `input`'s schema.
    pub fn data_type(&self, input: &Table) -> Result<DataType, ExecutorError> {
        match self {
            PqpExpression::Column(column_id) => {
                if column_id.as_usize() >= input.column_count() {
                    return Err(ExecutorError::ColumnIdOutOfRange {
                        column_id: column_id.as_usize(),
                        column_count: input.column_count(),
                    });
                }
                Ok(input.column_data_type(*column_id))
            }
            PqpExpression::Literal(value) => Ok(value.data_type()),
            PqpExpression::Arithmetic { left, right, .. } => {
                let left_type = left.data_type(input)?;
                let right_type = right.data_type(input)?;
                left_type.common_arithmetic_type(right_type).ok_or(
                    ExecutorError::TypeMismatch { expected: left_type, actual: right_type },
                )
            }
            PqpExpression::Predicate { .. } | PqpExpression::Logical { .. } => Ok(DataType::Int32),
        }
    }

    pub fn is_nullable(&self, input: &Table) -> bool {
        match self {
            PqpExpression::Column(column_id) => input.column_is_nullable(*column_id),
            PqpExpression::Literal(value) => value.is_null(),
            PqpExpression::Arithmetic { left, right, .. }
            | PqpExpression::Logical { left, right, .. } => {
                left.is_nullable(input) || right.is_nullable(input)
            }
            PqpExpression::Predicate { condition, arguments } => match condition {
                PredicateCondition::IsNull | PredicateCondition::IsNotNull => false,
                _ => arguments.iter().any(|argument| argument.is_nullable(input)),
            },
        }
    }

    /// Evaluate over every row of a chunk, column at a time.
    pub fn evaluate_on_chunk(
        &self,
        chunk: &Chunk,
    ) -> Result<Vec<AllTypeVariant>, ExecutorError> {
        let row_count = chunk.size() as usize;
        match self {
            PqpExpression::Column(column_id) => {
                let segment = chunk.get_segment(*column_id).ok_or(
                    ExecutorError::ColumnIdOutOfRange {
                        column_id: column_id.as_usize(),
                        column_count: chunk.column_count(),
                    },
                )?;
                let mut values = Vec::with_capacity(row_count);
                segment.for_each(None, |_, value| values.push(value));
                Ok(values)
            }
            PqpExpression::Literal(value) => Ok(vec![value.clone(); row_count]),
            PqpExpression::Arithmetic { op, left, right } => {
                let left_values = left.evaluate_on_chunk(chunk)?;
                let right_values = right.evaluate_on_chunk(chunk)?;
                left_values
                    .into_iter()
                    .zip(right_values)
                    .map(|(a, b)| evaluate_arithmetic(*op, &a, &b))
                    .collect()
            }
            PqpExpression::Predicate { condition, arguments } => {
                let evaluated: Vec<Vec<AllTypeVariant>> = arguments
                    .iter()
                    .map(|argument| argument.evaluate_on_chunk(chunk))
                    .collect::<Result<_, _>>()?;
                (0..row_count)
                    .map(|row| {
                        let operands: Vec<&AllTypeVariant> =
                            evaluated.iter().map(|values| &values[row]).collect();
                        Ok(truth_to_variant(evaluate_predicate(*condition, &operands)?))
                    })
                    .collect()
            }
            PqpExpression::Logical { op, left, right } => {
                let left_values = left.evaluate_on_chunk(chunk)?;
                let right_values = right.evaluate_on_chunk(chunk)?;
                Ok(left_values
                    .into_iter()
                    .zip(right_values)
                    .map(|(a, b)| {
                        truth_to_variant(evaluate_logical(*op, variant_truth(&a), variant_truth(&b)))
                    })
                    .collect())
            }
        }
    }

    /// Evaluate against one materialized row (join candidate pairs).
    pub fn evaluate_on_row(&self, row: &[AllTypeVariant]) -> Result<AllTypeVariant, ExecutorError> {
        match self {
            PqpExpression::Column(column_id) => row
                .get(column_id.as_usize())
                .cloned()
                .ok_or(ExecutorError::ColumnIdOutOfRange {
                    column_id: column_id.as_usize(),
                    column_count: row.len(),
                }),
            PqpExpression::Literal(value) => Ok(value.clone()),
            PqpExpression::Arithmetic { op, left, right } => {
                let a = left.evaluate_on_row(row)?;
                let b = right.evaluate_on_row(row)?;
                evaluate_arithmetic(*op, &a, &b)
            }
            PqpExpression::Predicate { condition, arguments } => {
                let operands: Vec<AllTypeVariant> = arguments
                    .iter()
                    .map(|argument| argument.evaluate_on_row(row))
                    .collect::<Result<_, _>>()?;
                let operand_refs: Vec<&AllTypeVariant> = operands.iter().collect();
                Ok(truth_to_variant(evaluate_predicate(*condition, &operand_refs)?))
            }
            PqpExpression::Logical { op, left, right } => {
                let a = left.evaluate_on_row(row)?;
                let b = right.evaluate_on_row(row)?;
                Ok(truth_to_variant(evaluate_logical(*op, variant_truth(&a), variant_truth(&b))))
            }
        }
    }

    /// Whether the expression is true (not NULL, not zero) for `row`.
    pub fn matches_row(&self, row: &[AllTypeVariant]) -> Result<bool, ExecutorError> {
        Ok(variant_truth(&self.evaluate_on_row(row)?) == Some(true))
    }
}

/// Three-valued truth of an evaluated expression.
fn variant_truth(value: &AllTypeVariant) -> Option<bool> {
    match value {
        AllTypeVariant::Null => None,
        AllTypeVariant::Int32(v) => Some(*v != 0),
        AllTypeVariant::Int64(v) => Some(*v != 0),
        other => Some(other.to_f64().map_or(false, |v| v != 0.0)),
    }
}

fn truth_to_variant(truth: Option<bool>) -> AllTypeVariant {
    match truth {
        None => AllTypeVariant::Null,
        Some(true) => AllTypeVariant::Int32(1),
        Some(false) => AllTypeVariant::Int32(0),
    }
}

/// Compare two values after promoting both to their common arithmetic type;
/// strings compare directly. NULL yields `None`.
pub fn compare_variants(a: &AllTypeVariant, b: &AllTypeVariant) -> Option<CmpOrdering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if a.data_type() == b.data_type() {
        return Some(a.cmp(b));
    }
    let common = a.data_type().common_arithmetic_type(b.data_type())?;
    let a = a.coerce_to(common)?;
    let b = b.coerce_to(common)?;
    Some(a.cmp(&b))
}

fn evaluate_predicate(
    condition: PredicateCondition,
    operands: &[&AllTypeVariant],
) -> Result<Option<bool>, ExecutorError> {
    match condition {
        PredicateCondition::IsNull => Ok(Some(operands[0].is_null())),
        PredicateCondition::IsNotNull => Ok(Some(!operands[0].is_null())),
        PredicateCondition::BetweenInclusive => {
            let low = compare_variants(operands[0], operands[1]);
            let high = compare_variants(operands[0], operands[2]);
            match (low, high) {
                (Some(low), Some(high)) => {
                    Ok(Some(low != CmpOrdering::Less && high != CmpOrdering::Greater))
                }
                _ => Ok(None),
            }
        }
        _ => {
            let Some(ordering) = compare_variants(operands[0], operands[1]) else {
                return Ok(None);
            };
            let result = match condition {
                PredicateCondition::Equals => ordering == CmpOrdering::Equal,
                PredicateCondition::NotEquals => ordering != CmpOrdering::Equal,
                PredicateCondition::LessThan => ordering == CmpOrdering::Less,
                PredicateCondition::LessThanEquals => ordering != CmpOrdering::Greater,
                PredicateCondition::GreaterThan => ordering == CmpOrdering::Greater,
                PredicateCondition::GreaterThanEquals => ordering != CmpOrdering::Less,
                _ => unreachable!("handled above"),
            };
            Ok(Some(result))
        }
    }
}

fn evaluate_logical(
    op: LogicalOperator,
    a: Option<bool>,
    b: Option<bool>,
) -> Option<bool> {
    match op {
        LogicalOperator::And => match (a, b) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        LogicalOperator::Or => match (a, b) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    }
}

fn evaluate_arithmetic(
    op: ArithmeticOperator,
    a: &AllTypeVariant,
    b: &AllTypeVariant,
) -> Result<AllTypeVariant, ExecutorError> {
    if a.is_null() || b.is_null() {
        return Ok(AllTypeVariant::Null);
    }
    let common = a
        .data_type()
        .common_arithmetic_type(b.data_type())
        .ok_or(ExecutorError::TypeMismatch { expected: a.data_type(), actual: b.data_type() })?;
    let a = a.coerce_to(common).ok_or(ExecutorError::TypeMismatch {
        expected: common,
        actual: a.data_type(),
    })?;
    let b = b.coerce_to(common).ok_or(ExecutorError::TypeMismatch {
        expected: common,
        actual: b.data_type(),
    })?;

    use AllTypeVariant::*;
    use ArithmeticOperator::*;
    let result = match (a, b) {
        (Int32(x), Int32(y)) => match op {
            Addition => Int32(x.wrapping_add(y)),
            Subtraction => Int32(x.wrapping_sub(y)),
            Multiplication => Int32(x.wrapping_mul(y)),
            Division => {
                if y == 0 {
                    return Err(ExecutorError::DivisionByZero);
                }
                Int32(x.wrapping_div(y))
            }
            Modulo => {
                if y == 0 {
                    return Err(ExecutorError::DivisionByZero);
                }
                Int32(x.wrapping_rem(y))
            }
        },
        (Int64(x), Int64(y)) => match op {
            Addition => Int64(x.wrapping_add(y)),
            Subtraction => Int64(x.wrapping_sub(y)),
            Multiplication => Int64(x.wrapping_mul(y)),
            Division => {
                if y == 0 {
                    return Err(ExecutorError::DivisionByZero);
                }
                Int64(x.wrapping_div(y))
            }
            Modulo => {
                if y == 0 {
                    return Err(ExecutorError::DivisionByZero);
                }
                Int64(x.wrapping_rem(y))
            }
        },
        (Float(x), Float(y)) => match op {
            Addition => Float(x + y),
            Subtraction => Float(x - y),
            Multiplication => Float(x * y),
            Division => Float(x / y),
            Modulo => Float(x % y),
        },
        (Double(x), Double(y)) => match op {
            Addition => Double(x + y),
            Subtraction => Double(x - y),
            Multiplication => Double(x * y),
            Division => Double(x / y),
            Modulo => Double(x % y),
        },
        (a, b) => {
            return Err(ExecutorError::TypeMismatch {
                expected: a.data_type(),
                actual: b.data_type(),
            })
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_promotion_and_null() {
        let sum = evaluate_arithmetic(
            ArithmeticOperator::Addition,
            &AllTypeVariant::Int32(2),
            &AllTypeVariant::Int64(3),
        )
        .unwrap();
        assert_eq!(sum, AllTypeVariant::Int64(5));

        let with_null = evaluate_arithmetic(
            ArithmeticOperator::Multiplication,
            &AllTypeVariant::Null,
            &AllTypeVariant::Int32(3),
        )
        .unwrap();
        assert_eq!(with_null, AllTypeVariant::Null);

        assert_eq!(
            evaluate_arithmetic(
                ArithmeticOperator::Division,
                &AllTypeVariant::Int32(1),
                &AllTypeVariant::Int32(0),
            ),
            Err(ExecutorError::DivisionByZero)
        );
    }

    #[test]
    fn test_predicate_three_valued() {
        let one = AllTypeVariant::Int32(1);
        let null = AllTypeVariant::Null;
        assert_eq!(
            evaluate_predicate(PredicateCondition::Equals, &[&one, &null]).unwrap(),
            None
        );
        assert_eq!(
            evaluate_predicate(PredicateCondition::IsNull, &[&null]).unwrap(),
            Some(true)
        );
        assert_eq!(
            evaluate_predicate(
                PredicateCondition::BetweenInclusive,
                &[&one, &AllTypeVariant::Int32(0), &AllTypeVariant::Int32(5)],
            )
            .unwrap(),
            Some(true)
        );
    }

    #[test]
    fn test_logical_three_valued() {
        assert_eq!(evaluate_logical(LogicalOperator::And, Some(false), None), Some(false));
        assert_eq!(evaluate_logical(LogicalOperator::And, Some(true), None), None);
        assert_eq!(evaluate_logical(LogicalOperator::Or, None, Some(true)), Some(true));
        assert_eq!(evaluate_logical(LogicalOperator::Or, None, Some(false)), None);
    }

    #[test]
    fn test_cross_width_comparison() {
        assert_eq!(
            compare_variants(&AllTypeVariant::Int32(2), &AllTypeVariant::Int64(2)),
            Some(CmpOrdering::Equal)
        );
        assert_eq!(compare_variants(&AllTypeVariant::Null, &AllTypeVariant::Int32(2)), None);
    }
}
