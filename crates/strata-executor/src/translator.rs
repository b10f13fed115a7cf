//! LQP to operator DAG translation
//!
//! Sub-plans shared between LQP nodes (pointer equality) translate to
//! shared operator instances, so a reused scan executes once.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use strata_plan::{
    ColumnLookup, Expression, ExpressionRef, LqpNode, LqpNodeKind, LqpNodeRef,
};
use strata_types::{AllTypeVariant, ColumnId, JoinMode, PredicateCondition, SetOperationMode};

use crate::errors::ExecutorError;
use crate::evaluator::{PqpExpression, PqpExpressionRef};
use crate::operator::{operator_ref, OperatorRef};
use crate::operators::{
    AggregateDefinition, AggregateHash, GetTable, JoinHash, JoinNestedLoop, JoinPredicate,
    JoinSortMerge, Limit, Projection, Sort, TableScan, UnionAll, UnionPositions,
};

/// Translates an optimized LQP into a physical operator DAG.
pub struct LqpTranslator;

impl LqpTranslator {
    pub fn translate_plan(root: &LqpNodeRef) -> Result<OperatorRef, ExecutorError> {
        let mut memo: HashMap<*const LqpNode, OperatorRef> = HashMap::new();
        translate_node(root, &mut memo)
    }
}

fn translate_node(
    node: &LqpNodeRef,
    memo: &mut HashMap<*const LqpNode, OperatorRef>,
) -> Result<OperatorRef, ExecutorError> {
    if let Some(operator) = memo.get(&Rc::as_ptr(node)) {
        return Ok(operator.clone());
    }
    let operator = match node.kind() {
        LqpNodeKind::Root => {
            let input = node.left_input().ok_or_else(|| {
                ExecutorError::UnsupportedPlan("root node without input".to_string())
            })?;
            return translate_node(&input, memo);
        }
        LqpNodeKind::StoredTable { table_name, pruned_column_ids } => {
            operator_ref(GetTable::new(table_name.clone(), pruned_column_ids.borrow().clone()))
        }
        LqpNodeKind::Predicate => translate_predicate(node, memo)?,
        LqpNodeKind::Projection => {
            let input = expect_left(node)?;
            let input_operator = translate_node(&input, memo)?;
            let expressions = node
                .node_expressions()
                .iter()
                .map(|expression| {
                    Ok((
                        resolve_expression(expression, &input)?,
                        expression.to_string(),
                    ))
                })
                .collect::<Result<Vec<_>, ExecutorError>>()?;
            operator_ref(Projection::new(input_operator, expressions))
        }
        LqpNodeKind::Aggregate { group_by_count } => {
            let input = expect_left(node)?;
            let input_operator = translate_node(&input, memo)?;
            let expressions = node.node_expressions();
            let (group_by, aggregates) = expressions.split_at(group_by_count.get());

            let group_by_column_ids = group_by
                .iter()
                .map(|expression| resolve_column_id(expression, &input))
                .collect::<Result<Vec<_>, _>>()?;
            let aggregate_definitions = aggregates
                .iter()
                .map(|expression| translate_aggregate(expression, &input))
                .collect::<Result<Vec<_>, _>>()?;
            operator_ref(AggregateHash::new(
                input_operator,
                group_by_column_ids,
                aggregate_definitions,
            ))
        }
        LqpNodeKind::Join { join_mode } => translate_join(node, *join_mode, memo)?,
        LqpNodeKind::Sort { sort_modes } => {
            let input = expect_left(node)?;
            let input_operator = translate_node(&input, memo)?;
            let definitions = node
                .node_expressions()
                .iter()
                .zip(sort_modes.borrow().iter())
                .map(|(expression, mode)| {
                    Ok((resolve_column_id(expression, &input)?, *mode))
                })
                .collect::<Result<Vec<_>, ExecutorError>>()?;
            operator_ref(Sort::new(input_operator, definitions, None))
        }
        LqpNodeKind::Union { set_operation_mode } => {
            let left = expect_left(node)?;
            let right = node.right_input().ok_or_else(|| {
                ExecutorError::UnsupportedPlan("union node without right input".to_string())
            })?;
            let left_operator = translate_node(&left, memo)?;
            let right_operator = translate_node(&right, memo)?;
            match set_operation_mode {
                SetOperationMode::All => {
                    operator_ref(UnionAll::new(left_operator, right_operator))
                }
                SetOperationMode::Positions => {
                    operator_ref(UnionPositions::new(left_operator, right_operator))
                }
            }
        }
        LqpNodeKind::Limit => {
            let input = expect_left(node)?;
            let input_operator = translate_node(&input, memo)?;
            let row_count = match node.node_expressions().first().map(|e| e.as_ref().clone()) {
                Some(Expression::Literal(AllTypeVariant::Int64(count))) if count >= 0 => {
                    count as u64
                }
                Some(Expression::Literal(AllTypeVariant::Int32(count))) if count >= 0 => {
                    count as u64
                }
                _ => {
                    return Err(ExecutorError::UnsupportedPlan(
                        "limit requires a non-negative integer literal".to_string(),
                    ))
                }
            };
            operator_ref(Limit::new(input_operator, row_count))
        }
    };
    memo.insert(Rc::as_ptr(node), operator.clone());
    Ok(operator)
}

fn expect_left(node: &LqpNodeRef) -> Result<LqpNodeRef, ExecutorError> {
    node.left_input().ok_or_else(|| {
        ExecutorError::UnsupportedPlan(format!("{} node without input", node.name()))
    })
}

/// A predicate node becomes one `TableScan` per conjunct. Disjunctions must
/// have been split by the optimizer; anything that is not a
/// column-versus-values comparison is not scannable.
fn translate_predicate(
    node: &LqpNodeRef,
    memo: &mut HashMap<*const LqpNode, OperatorRef>,
) -> Result<OperatorRef, ExecutorError> {
    let input = expect_left(node)?;
    let mut operator = translate_node(&input, memo)?;

    let predicate = node.node_expressions().into_iter().next().ok_or_else(|| {
        ExecutorError::UnsupportedPlan("predicate node without expression".to_string())
    })?;
    let mut conjuncts = Vec::new();
    split_conjunction(&predicate, &mut conjuncts);

    for conjunct in conjuncts {
        let (column_id, condition, value, value2) = scannable_predicate(&conjunct, &input)?;
        operator = operator_ref(TableScan::new(operator, column_id, condition, value, value2)?);
    }
    Ok(operator)
}

fn split_conjunction(expression: &ExpressionRef, conjuncts: &mut Vec<ExpressionRef>) {
    match expression.as_ref() {
        Expression::Logical { op: strata_plan::LogicalOperator::And, left, right } => {
            split_conjunction(left, conjuncts);
            split_conjunction(right, conjuncts);
        }
        _ => conjuncts.push(expression.clone()),
    }
}

type ScannablePredicate =
    (ColumnId, PredicateCondition, AllTypeVariant, Option<AllTypeVariant>);

fn scannable_predicate(
    expression: &ExpressionRef,
    input: &LqpNodeRef,
) -> Result<ScannablePredicate, ExecutorError> {
    let Expression::Predicate { condition, arguments } = expression.as_ref() else {
        return Err(ExecutorError::UnsupportedPlan(format!(
            "predicate {} is not scannable",
            expression
        )));
    };
    match condition {
        PredicateCondition::IsNull | PredicateCondition::IsNotNull => {
            let column_id = resolve_column_id(&arguments[0], input)?;
            Ok((column_id, *condition, AllTypeVariant::Null, None))
        }
        PredicateCondition::BetweenInclusive => {
            let column_id = resolve_column_id(&arguments[0], input)?;
            let low = literal_value(&arguments[1])?;
            let high = literal_value(&arguments[2])?;
            Ok((column_id, *condition, low, Some(high)))
        }
        _ => {
            // Accept column-vs-value in either operand order.
            if let Ok(column_id) = resolve_column_id(&arguments[0], input) {
                let value = literal_value(&arguments[1])?;
                Ok((column_id, *condition, value, None))
            } else {
                let column_id = resolve_column_id(&arguments[1], input)?;
                let value = literal_value(&arguments[0])?;
                Ok((column_id, condition.flipped(), value, None))
            }
        }
    }
}

fn literal_value(expression: &ExpressionRef) -> Result<AllTypeVariant, ExecutorError> {
    match expression.as_ref() {
        Expression::Literal(value) => Ok(value.clone()),
        other => Err(ExecutorError::UnsupportedPlan(format!(
            "expected a literal operand, got {}",
            other
        ))),
    }
}

fn resolve_column_id(
    expression: &ExpressionRef,
    node: &LqpNodeRef,
) -> Result<ColumnId, ExecutorError> {
    match node.find_column_id(expression) {
        ColumnLookup::Resolved(column_id) => Ok(column_id),
        ColumnLookup::Ambiguous => Err(ExecutorError::UnsupportedPlan(format!(
            "column {} is ambiguous on {}",
            expression,
            node.name()
        ))),
        ColumnLookup::NotFound => Err(ExecutorError::UnsupportedPlan(format!(
            "column {} is not produced by {}",
            expression,
            node.name()
        ))),
    }
}

/// Lower an LQP expression into a PQP expression with columns resolved
/// against `scope` (via `resolver` so joins can span two inputs).
fn lower_expression(
    expression: &ExpressionRef,
    resolver: &dyn Fn(&ExpressionRef) -> Result<ColumnId, ExecutorError>,
) -> Result<PqpExpressionRef, ExecutorError> {
    match expression.as_ref() {
        Expression::Column(_) => Ok(PqpExpression::column(resolver(expression)?)),
        Expression::Literal(value) => Ok(PqpExpression::literal(value.clone())),
        Expression::Arithmetic { op, left, right } => Ok(Arc::new(PqpExpression::Arithmetic {
            op: *op,
            left: lower_expression(left, resolver)?,
            right: lower_expression(right, resolver)?,
        })),
        Expression::Predicate { condition, arguments } => {
            let arguments = arguments
                .iter()
                .map(|argument| lower_expression(argument, resolver))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Arc::new(PqpExpression::Predicate { condition: *condition, arguments }))
        }
        Expression::Logical { op, left, right } => Ok(Arc::new(PqpExpression::Logical {
            op: *op,
            left: lower_expression(left, resolver)?,
            right: lower_expression(right, resolver)?,
        })),
        other => Err(ExecutorError::UnsupportedPlan(format!(
            "expression {} cannot run in the physical plan",
            other
        ))),
    }
}

fn resolve_expression(
    expression: &ExpressionRef,
    input: &LqpNodeRef,
) -> Result<PqpExpressionRef, ExecutorError> {
    let input = input.clone();
    lower_expression(expression, &move |column| resolve_column_id(column, &input))
}

fn translate_aggregate(
    expression: &ExpressionRef,
    input: &LqpNodeRef,
) -> Result<AggregateDefinition, ExecutorError> {
    let Expression::Aggregate { function, argument } = expression.as_ref() else {
        return Err(ExecutorError::UnsupportedPlan(format!(
            "aggregate node holds non-aggregate expression {}",
            expression
        )));
    };
    let column_id = match argument {
        Some(argument) => Some(resolve_column_id(argument, input)?),
        None => None,
    };
    Ok(AggregateDefinition::new(*function, column_id))
}

fn translate_join(
    node: &LqpNodeRef,
    join_mode: JoinMode,
    memo: &mut HashMap<*const LqpNode, OperatorRef>,
) -> Result<OperatorRef, ExecutorError> {
    let left = expect_left(node)?;
    let right = node.right_input().ok_or_else(|| {
        ExecutorError::UnsupportedPlan("join node without right input".to_string())
    })?;
    let left_operator = translate_node(&left, memo)?;
    let right_operator = translate_node(&right, memo)?;

    if join_mode == JoinMode::Cross {
        return Ok(operator_ref(JoinNestedLoop::new(
            left_operator,
            right_operator,
            join_mode,
            None,
            Vec::new(),
        )?));
    }

    let predicates = node.node_expressions();
    let (primary_condition, primary_left, primary_right) =
        join_operand_sides(&predicates[0], &left, &right)?;
    let primary = JoinPredicate::new(primary_left, primary_right, primary_condition);

    // Secondary predicates evaluate against the concatenated row: left
    // columns first, then right columns.
    let left_column_count = left.column_expressions().len();
    let combined_resolver = |expression: &ExpressionRef| -> Result<ColumnId, ExecutorError> {
        if let Ok(column_id) = resolve_column_id(expression, &left) {
            return Ok(column_id);
        }
        let right_id = resolve_column_id(expression, &right)?;
        Ok(ColumnId((left_column_count + right_id.as_usize()) as u16))
    };
    let secondary = predicates[1..]
        .iter()
        .map(|predicate| lower_expression(predicate, &combined_resolver))
        .collect::<Result<Vec<_>, _>>()?;

    let operator: OperatorRef = if primary_condition == PredicateCondition::Equals {
        operator_ref(JoinHash::new(
            left_operator,
            right_operator,
            join_mode,
            primary,
            secondary,
        )?)
    } else if join_mode == JoinMode::Inner {
        operator_ref(JoinSortMerge::new(
            left_operator,
            right_operator,
            join_mode,
            primary,
            secondary,
        )?)
    } else {
        operator_ref(JoinNestedLoop::new(
            left_operator,
            right_operator,
            join_mode,
            Some(primary),
            secondary,
        )?)
    };
    Ok(operator)
}

/// Sort a binary join predicate's operands onto the two inputs.
fn join_operand_sides(
    predicate: &ExpressionRef,
    left: &LqpNodeRef,
    right: &LqpNodeRef,
) -> Result<(PredicateCondition, ColumnId, ColumnId), ExecutorError> {
    let Expression::Predicate { condition, arguments } = predicate.as_ref() else {
        return Err(ExecutorError::UnsupportedPlan(format!(
            "join predicate {} is not a binary comparison",
            predicate
        )));
    };
    if arguments.len() != 2 {
        return Err(ExecutorError::UnsupportedPlan(
            "join predicates take exactly two column operands".to_string(),
        ));
    }
    if let (Ok(left_id), Ok(right_id)) = (
        resolve_column_id(&arguments[0], left),
        resolve_column_id(&arguments[1], right),
    ) {
        return Ok((*condition, left_id, right_id));
    }
    let left_id = resolve_column_id(&arguments[1], left)?;
    let right_id = resolve_column_id(&arguments[0], right)?;
    Ok((condition.flipped(), left_id, right_id))
}
