//! Expression trees
//!
//! Expressions are immutable trees shared via `Rc`. Rewrites never mutate a
//! shared node: they rebuild the affected spine on deep-copies and swap the
//! copy in only when a replacement actually occurred (copy-on-write).

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use strata_storage::StorageManager;
use strata_types::{AllTypeVariant, DataType, PredicateCondition};

use crate::error::PlanError;
use crate::lqp::{ColumnLookup, LqpColumnReference, LqpNodeKind, LqpNodeRef, NodeMapping};

pub type ExpressionRef = Rc<Expression>;

/// Identifier of a correlated parameter within a subquery plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOperator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulo,
}

impl fmt::Display for ArithmeticOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ArithmeticOperator::Addition => "+",
            ArithmeticOperator::Subtraction => "-",
            ArithmeticOperator::Multiplication => "*",
            ArithmeticOperator::Division => "/",
            ArithmeticOperator::Modulo => "%",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if *self == LogicalOperator::And { "AND" } else { "OR" })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Min,
    Max,
    Sum,
    Avg,
    Count,
    CountDistinct,
    StandardDeviationSample,
    /// Picks an arbitrary representative of the group; emitted by the
    /// dependent group-by reduction, not by user queries.
    Any,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Count => "COUNT",
            AggregateFunction::CountDistinct => "COUNT DISTINCT",
            AggregateFunction::StandardDeviationSample => "STDDEV_SAMP",
            AggregateFunction::Any => "ANY",
        };
        write!(f, "{}", name)
    }
}

impl AggregateFunction {
    /// Result type given the argument type.
    pub fn result_data_type(&self, argument_type: DataType) -> DataType {
        match self {
            AggregateFunction::Count | AggregateFunction::CountDistinct => DataType::Int64,
            AggregateFunction::Avg | AggregateFunction::StandardDeviationSample => {
                DataType::Double
            }
            AggregateFunction::Sum => match argument_type {
                DataType::Int32 | DataType::Int64 => DataType::Int64,
                DataType::Float | DataType::Double => DataType::Double,
                other => other,
            },
            AggregateFunction::Min | AggregateFunction::Max | AggregateFunction::Any => {
                argument_type
            }
        }
    }
}

/// A node of an expression tree.
#[derive(Debug, Clone)]
pub enum Expression {
    /// Reference to a column of some LQP node.
    Column(LqpColumnReference),
    Literal(AllTypeVariant),
    Arithmetic { op: ArithmeticOperator, left: ExpressionRef, right: ExpressionRef },
    /// `arguments` holds the column/value operands: one for unary conditions,
    /// two for binary, three for BETWEEN.
    Predicate { condition: PredicateCondition, arguments: Vec<ExpressionRef> },
    Logical { op: LogicalOperator, left: ExpressionRef, right: ExpressionRef },
    Aggregate { function: AggregateFunction, argument: Option<ExpressionRef> },
    /// EXISTS over a subquery expression.
    Exists { subquery: ExpressionRef },
    /// A nested plan; `parameters` are outer-scope expressions the subquery
    /// correlates on (referenced inside via `Placeholder`).
    Subquery { root: LqpNodeRef, parameters: Vec<ExpressionRef> },
    /// Stand-in for a correlated parameter inside a subquery plan.
    Placeholder(ParameterId),
}

impl Expression {
    pub fn column(reference: LqpColumnReference) -> ExpressionRef {
        Rc::new(Expression::Column(reference))
    }

    pub fn literal(value: impl Into<AllTypeVariant>) -> ExpressionRef {
        Rc::new(Expression::Literal(value.into()))
    }

    pub fn arithmetic(
        op: ArithmeticOperator,
        left: ExpressionRef,
        right: ExpressionRef,
    ) -> ExpressionRef {
        Rc::new(Expression::Arithmetic { op, left, right })
    }

    pub fn predicate(
        condition: PredicateCondition,
        arguments: Vec<ExpressionRef>,
    ) -> ExpressionRef {
        debug_assert_eq!(arguments.len(), condition.value_count() + 1);
        Rc::new(Expression::Predicate { condition, arguments })
    }

    pub fn and(left: ExpressionRef, right: ExpressionRef) -> ExpressionRef {
        Rc::new(Expression::Logical { op: LogicalOperator::And, left, right })
    }

    pub fn or(left: ExpressionRef, right: ExpressionRef) -> ExpressionRef {
        Rc::new(Expression::Logical { op: LogicalOperator::Or, left, right })
    }

    pub fn aggregate(
        function: AggregateFunction,
        argument: Option<ExpressionRef>,
    ) -> ExpressionRef {
        Rc::new(Expression::Aggregate { function, argument })
    }

    pub fn exists(subquery: ExpressionRef) -> ExpressionRef {
        debug_assert!(matches!(subquery.as_ref(), Expression::Subquery { .. }));
        Rc::new(Expression::Exists { subquery })
    }

    pub fn subquery(root: LqpNodeRef, parameters: Vec<ExpressionRef>) -> ExpressionRef {
        Rc::new(Expression::Subquery { root, parameters })
    }

    /// The direct sub-expressions, in evaluation order.
    pub fn arguments(&self) -> Vec<ExpressionRef> {
        match self {
            Expression::Column(_) | Expression::Literal(_) | Expression::Placeholder(_) => {
                Vec::new()
            }
            Expression::Arithmetic { left, right, .. }
            | Expression::Logical { left, right, .. } => vec![left.clone(), right.clone()],
            Expression::Predicate { arguments, .. } => arguments.clone(),
            Expression::Aggregate { argument, .. } => {
                argument.iter().cloned().collect()
            }
            Expression::Exists { subquery } => vec![subquery.clone()],
            Expression::Subquery { parameters, .. } => parameters.clone(),
        }
    }

    /// Rebuild this node with replaced arguments (same variant, same arity).
    pub fn with_arguments(&self, arguments: Vec<ExpressionRef>) -> Expression {
        match self {
            Expression::Column(_) | Expression::Literal(_) | Expression::Placeholder(_) => {
                debug_assert!(arguments.is_empty());
                self.clone()
            }
            Expression::Arithmetic { op, .. } => {
                let mut arguments = arguments.into_iter();
                Expression::Arithmetic {
                    op: *op,
                    left: arguments.next().expect("binary arity"),
                    right: arguments.next().expect("binary arity"),
                }
            }
            Expression::Logical { op, .. } => {
                let mut arguments = arguments.into_iter();
                Expression::Logical {
                    op: *op,
                    left: arguments.next().expect("binary arity"),
                    right: arguments.next().expect("binary arity"),
                }
            }
            Expression::Predicate { condition, .. } => {
                Expression::Predicate { condition: *condition, arguments }
            }
            Expression::Aggregate { function, .. } => Expression::Aggregate {
                function: *function,
                argument: arguments.into_iter().next(),
            },
            Expression::Exists { .. } => Expression::Exists {
                subquery: arguments.into_iter().next().expect("unary arity"),
            },
            Expression::Subquery { root, .. } => {
                Expression::Subquery { root: root.clone(), parameters: arguments }
            }
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expression::Aggregate { .. })
    }

    /// Whether this tree contains a correlated subquery (one with
    /// parameters). The optimizer treats such predicates as expensive.
    pub fn contains_correlated_subquery(&self) -> bool {
        let mut found = false;
        visit_expression(self, &mut |expression| {
            if let Expression::Subquery { parameters, .. } = expression {
                if !parameters.is_empty() {
                    found = true;
                    return ExpressionVisitation::DoNotVisitArguments;
                }
            }
            ExpressionVisitation::VisitArguments
        });
        found
    }
}

/// Visitor verdict for [`visit_expression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionVisitation {
    VisitArguments,
    DoNotVisitArguments,
}

/// Pre-order traversal over an expression tree.
pub fn visit_expression<F>(expression: &Expression, visitor: &mut F)
where
    F: FnMut(&Expression) -> ExpressionVisitation,
{
    if visitor(expression) == ExpressionVisitation::DoNotVisitArguments {
        return;
    }
    for argument in expression.arguments() {
        visit_expression(&argument, visitor);
    }
}

/// Rewrite an expression bottom-up on a copy.
///
/// `replacer` may return a replacement for any sub-expression; replaced
/// sub-trees are not descended into. Returns `Some(new_tree)` iff at least
/// one replacement occurred, leaving the original tree untouched either way.
pub fn rewrite_expression<F>(expression: &ExpressionRef, replacer: &mut F) -> Option<ExpressionRef>
where
    F: FnMut(&ExpressionRef) -> Option<ExpressionRef>,
{
    if let Some(replacement) = replacer(expression) {
        return Some(replacement);
    }
    let arguments = expression.arguments();
    if arguments.is_empty() {
        return None;
    }
    let mut any_replaced = false;
    let new_arguments: Vec<ExpressionRef> = arguments
        .iter()
        .map(|argument| match rewrite_expression(argument, replacer) {
            Some(replacement) => {
                any_replaced = true;
                replacement
            }
            None => argument.clone(),
        })
        .collect();
    if any_replaced {
        Some(Rc::new(expression.with_arguments(new_arguments)))
    } else {
        None
    }
}

/// Structural equality of two expressions within the same plan.
pub fn expressions_equal(a: &Expression, b: &Expression) -> bool {
    expressions_equal_impl(a, b, None)
}

/// Structural equality across two plans: column references and subquery
/// roots of `a` are mapped through `mapping` before comparison.
pub fn expressions_equal_across_plans(
    a: &Expression,
    b: &Expression,
    mapping: &NodeMapping,
) -> bool {
    expressions_equal_impl(a, b, Some(mapping))
}

fn references_equal_mapped(
    a: &LqpColumnReference,
    b: &LqpColumnReference,
    mapping: Option<&NodeMapping>,
) -> bool {
    let Some(mapping) = mapping else {
        return a == b;
    };
    if a.original_column_id() != b.original_column_id() {
        return false;
    }
    let (Some(node_a), Some(node_b)) = (a.original_node(), b.original_node()) else {
        return false;
    };
    let mapped_a = mapping.get(&Rc::as_ptr(&node_a)).cloned().unwrap_or(node_a);
    if !Rc::ptr_eq(&mapped_a, &node_b) {
        return false;
    }
    if a.lineage().len() != b.lineage().len() {
        return false;
    }
    a.lineage().iter().zip(b.lineage()).all(|((step_a, side_a), (step_b, side_b))| {
        side_a == side_b
            && match (step_a.upgrade(), step_b.upgrade()) {
                (Some(step_a), Some(step_b)) => {
                    let mapped =
                        mapping.get(&Rc::as_ptr(&step_a)).cloned().unwrap_or(step_a);
                    Rc::ptr_eq(&mapped, &step_b)
                }
                _ => false,
            }
    })
}

fn expressions_equal_impl(a: &Expression, b: &Expression, mapping: Option<&NodeMapping>) -> bool {
    use Expression::*;
    match (a, b) {
        (Column(ref_a), Column(ref_b)) => references_equal_mapped(ref_a, ref_b, mapping),
        (Literal(value_a), Literal(value_b)) => value_a == value_b,
        (
            Arithmetic { op: op_a, left: left_a, right: right_a },
            Arithmetic { op: op_b, left: left_b, right: right_b },
        ) => {
            op_a == op_b
                && expressions_equal_impl(left_a, left_b, mapping)
                && expressions_equal_impl(right_a, right_b, mapping)
        }
        (
            Predicate { condition: condition_a, arguments: arguments_a },
            Predicate { condition: condition_b, arguments: arguments_b },
        ) => {
            condition_a == condition_b
                && arguments_a.len() == arguments_b.len()
                && arguments_a
                    .iter()
                    .zip(arguments_b)
                    .all(|(x, y)| expressions_equal_impl(x, y, mapping))
        }
        (
            Logical { op: op_a, left: left_a, right: right_a },
            Logical { op: op_b, left: left_b, right: right_b },
        ) => {
            op_a == op_b
                && expressions_equal_impl(left_a, left_b, mapping)
                && expressions_equal_impl(right_a, right_b, mapping)
        }
        (
            Aggregate { function: function_a, argument: argument_a },
            Aggregate { function: function_b, argument: argument_b },
        ) => {
            function_a == function_b
                && match (argument_a, argument_b) {
                    (None, None) => true,
                    (Some(x), Some(y)) => expressions_equal_impl(x, y, mapping),
                    _ => false,
                }
        }
        (Exists { subquery: subquery_a }, Exists { subquery: subquery_b }) => {
            expressions_equal_impl(subquery_a, subquery_b, mapping)
        }
        (
            Subquery { root: root_a, parameters: parameters_a },
            Subquery { root: root_b, parameters: parameters_b },
        ) => {
            crate::lqp::subplans_equal(root_a, root_b)
                && parameters_a.len() == parameters_b.len()
                && parameters_a
                    .iter()
                    .zip(parameters_b)
                    .all(|(x, y)| expressions_equal_impl(x, y, mapping))
        }
        (Placeholder(id_a), Placeholder(id_b)) => id_a == id_b,
        _ => false,
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        expressions_equal(self, other)
    }
}

impl Eq for Expression {}

fn variant_tag(expression: &Expression) -> u8 {
    match expression {
        Expression::Column(_) => 0,
        Expression::Literal(_) => 1,
        Expression::Arithmetic { .. } => 2,
        Expression::Predicate { .. } => 3,
        Expression::Logical { .. } => 4,
        Expression::Aggregate { .. } => 5,
        Expression::Exists { .. } => 6,
        Expression::Subquery { .. } => 7,
        Expression::Placeholder(_) => 8,
    }
}

/// Hash an expression into `state`: a shallow per-node hash combined with the
/// argument hashes.
pub fn hash_expression_into<H: Hasher>(expression: &Expression, state: &mut H) {
    variant_tag(expression).hash(state);
    match expression {
        Expression::Column(reference) => reference.hash(state),
        Expression::Literal(value) => value.hash(state),
        Expression::Arithmetic { op, .. } => op.hash(state),
        Expression::Predicate { condition, .. } => condition.hash(state),
        Expression::Logical { op, .. } => op.hash(state),
        Expression::Aggregate { function, .. } => function.hash(state),
        Expression::Exists { .. } => {}
        Expression::Subquery { root, .. } => root.hash_value().hash(state),
        Expression::Placeholder(id) => id.hash(state),
    }
    for argument in expression.arguments() {
        hash_expression_into(&argument, state);
    }
}

pub fn hash_expression(expression: &Expression) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    hash_expression_into(expression, &mut hasher);
    hasher.finish()
}

impl Hash for Expression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_expression_into(self, state);
    }
}

/// All column references mentioned anywhere in `expressions`.
pub fn collect_column_references(expressions: &[ExpressionRef]) -> HashSet<LqpColumnReference> {
    let mut references = HashSet::new();
    for expression in expressions {
        visit_expression(expression, &mut |sub_expression| {
            if let Expression::Column(reference) = sub_expression {
                references.insert(reference.clone());
            }
            ExpressionVisitation::VisitArguments
        });
    }
    references
}

/// Bottom-up result type with SQL-like numeric promotion.
pub fn expression_data_type(expression: &Expression) -> Result<DataType, PlanError> {
    match expression {
        Expression::Column(reference) => {
            let node = reference.original_node().ok_or(PlanError::ExpiredNodeHandle)?;
            match node.kind() {
                LqpNodeKind::StoredTable { table_name, .. } => {
                    let table = StorageManager::get().get_table(table_name)?;
                    Ok(table.column_data_type(reference.original_column_id()))
                }
                _ => Err(PlanError::InvalidPlan(
                    "column references must originate at stored tables".to_string(),
                )),
            }
        }
        Expression::Literal(value) => Ok(value.data_type()),
        Expression::Arithmetic { left, right, .. } => {
            let left_type = expression_data_type(left)?;
            let right_type = expression_data_type(right)?;
            left_type.common_arithmetic_type(right_type).ok_or_else(|| {
                PlanError::InvalidPlan(format!(
                    "no common arithmetic type for {} and {}",
                    left_type, right_type
                ))
            })
        }
        Expression::Predicate { .. }
        | Expression::Logical { .. }
        | Expression::Exists { .. } => Ok(DataType::Int32),
        Expression::Aggregate { function, argument } => {
            let argument_type = match argument {
                Some(argument) => expression_data_type(argument)?,
                None => DataType::Int64,
            };
            Ok(function.result_data_type(argument_type))
        }
        Expression::Subquery { root, .. } => {
            let expressions = root.column_expressions();
            match expressions.first() {
                Some(first) => expression_data_type(first),
                None => Err(PlanError::InvalidPlan("subquery without output columns".to_string())),
            }
        }
        Expression::Placeholder(_) => Ok(DataType::Null),
    }
}

/// Nullability of an expression when evaluated on top of `node`.
pub fn is_nullable_on_lqp(expression: &ExpressionRef, node: &LqpNodeRef) -> bool {
    match expression.as_ref() {
        Expression::Column(_) => match node.find_column_id(expression) {
            ColumnLookup::Resolved(column_id) => node.is_column_nullable(column_id),
            // Not resolvable here; stay conservative.
            _ => true,
        },
        Expression::Literal(value) => value.is_null(),
        Expression::Aggregate { function, .. } => {
            // COUNT never returns NULL; everything else does on empty groups.
            !matches!(function, AggregateFunction::Count | AggregateFunction::CountDistinct)
        }
        Expression::Exists { .. } => false,
        Expression::Subquery { .. } | Expression::Placeholder(_) => true,
        _ => expression
            .arguments()
            .iter()
            .any(|argument| is_nullable_on_lqp(argument, node)),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Column(reference) => write!(f, "{}", reference),
            Expression::Literal(value) => write!(f, "{}", value),
            Expression::Arithmetic { op, left, right } => {
                write!(f, "({} {} {})", left, op, right)
            }
            Expression::Predicate { condition, arguments } => match condition {
                PredicateCondition::IsNull | PredicateCondition::IsNotNull => {
                    write!(f, "({} {})", arguments[0], condition)
                }
                PredicateCondition::BetweenInclusive => write!(
                    f,
                    "({} BETWEEN {} AND {})",
                    arguments[0], arguments[1], arguments[2]
                ),
                _ => write!(f, "({} {} {})", arguments[0], condition, arguments[1]),
            },
            Expression::Logical { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expression::Aggregate { function, argument } => match argument {
                Some(argument) => write!(f, "{}({})", function, argument),
                None => write!(f, "{}(*)", function),
            },
            Expression::Exists { subquery } => write!(f, "EXISTS{}", subquery),
            Expression::Subquery { parameters, .. } => {
                if parameters.is_empty() {
                    write!(f, "(SUBQUERY)")
                } else {
                    write!(f, "(SUBQUERY correlated on {} parameters)", parameters.len())
                }
            }
            Expression::Placeholder(id) => write!(f, "${}", id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_types::PredicateCondition;

    use super::*;

    fn greater_than_literal(value: i32) -> ExpressionRef {
        Expression::predicate(
            PredicateCondition::GreaterThan,
            vec![Expression::literal(value), Expression::literal(0)],
        )
    }

    #[test]
    fn test_structural_equality_and_hash() {
        let a = Expression::and(greater_than_literal(1), greater_than_literal(2));
        let b = Expression::and(greater_than_literal(1), greater_than_literal(2));
        let c = Expression::and(greater_than_literal(1), greater_than_literal(3));

        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
        assert_eq!(hash_expression(&a), hash_expression(&b));
    }

    #[test]
    fn test_visit_expression_is_preorder() {
        let tree = Expression::and(greater_than_literal(1), greater_than_literal(2));
        let mut tags = Vec::new();
        visit_expression(&tree, &mut |expression| {
            tags.push(match expression {
                Expression::Logical { .. } => "logical",
                Expression::Predicate { .. } => "predicate",
                Expression::Literal(_) => "literal",
                _ => "other",
            });
            ExpressionVisitation::VisitArguments
        });
        assert_eq!(
            tags,
            vec![
                "logical", "predicate", "literal", "literal", "predicate", "literal", "literal"
            ]
        );
    }

    #[test]
    fn test_visit_can_skip_arguments() {
        let tree = Expression::and(greater_than_literal(1), greater_than_literal(2));
        let mut count = 0;
        visit_expression(&tree, &mut |expression| {
            count += 1;
            if matches!(expression, Expression::Predicate { .. }) {
                ExpressionVisitation::DoNotVisitArguments
            } else {
                ExpressionVisitation::VisitArguments
            }
        });
        // Logical + two predicates; the literals are skipped.
        assert_eq!(count, 3);
    }

    #[test]
    fn test_rewrite_returns_none_without_replacements() {
        let tree = Expression::and(greater_than_literal(1), greater_than_literal(2));
        let untouched = rewrite_expression(&tree, &mut |_| None);
        assert!(untouched.is_none(), "no replacement, no copy");
    }

    #[test]
    fn test_rewrite_builds_copy_and_preserves_original() {
        let tree = Expression::and(greater_than_literal(1), greater_than_literal(2));
        let rewritten = rewrite_expression(&tree, &mut |expression| {
            match expression.as_ref() {
                Expression::Literal(AllTypeVariant::Int32(1)) => {
                    Some(Expression::literal(99))
                }
                _ => None,
            }
        })
        .expect("a literal was replaced");

        // The original tree is untouched; the copy holds the new literal.
        let render = |expression: &Expression| expression.to_string();
        assert!(render(&tree).contains("(1 > 0)"));
        assert!(render(&rewritten).contains("(99 > 0)"));
        assert!(render(&rewritten).contains("(2 > 0)"));
    }

    #[test]
    fn test_aggregate_result_types() {
        assert_eq!(
            AggregateFunction::Sum.result_data_type(DataType::Int32),
            DataType::Int64
        );
        assert_eq!(
            AggregateFunction::Sum.result_data_type(DataType::Float),
            DataType::Double
        );
        assert_eq!(
            AggregateFunction::Avg.result_data_type(DataType::Int32),
            DataType::Double
        );
        assert_eq!(
            AggregateFunction::Count.result_data_type(DataType::String),
            DataType::Int64
        );
        assert_eq!(
            AggregateFunction::Any.result_data_type(DataType::String),
            DataType::String
        );
    }
}
