//! Shrinks group-by column sets that cover a unique constraint

use crate::expression::{
    expressions_equal, rewrite_expression, AggregateFunction, Expression, ExpressionRef,
};
use crate::lqp::{
    visit_lqp, visit_lqp_upwards, LqpNodeKind, LqpNodeRef, LqpUpwardVisitation, LqpVisitation,
};
use crate::optimizer::OptimizerRule;
use crate::Result;

/// When an aggregate groups by a superset of a declared unique constraint of
/// its input, the extra group-by columns are functionally dependent on the
/// constraint columns: every group holds exactly one value for them. The
/// rule drops the dependent columns from the group-by set and re-exposes
/// them as `ANY(column)` aggregates, which the hash aggregate satisfies
/// without keying on them.
///
/// Consumers above are rewritten (on expression copies) to reference
/// `ANY(column)` wherever they referenced the dropped column.
pub struct DependentGroupByReductionRule;

impl OptimizerRule for DependentGroupByReductionRule {
    fn name(&self) -> &'static str {
        "DependentGroupByReductionRule"
    }

    fn apply_to(&self, root: &LqpNodeRef) -> Result<()> {
        let mut aggregates = Vec::new();
        visit_lqp(root, |node| {
            if matches!(node.kind(), LqpNodeKind::Aggregate { .. }) {
                aggregates.push(node.clone());
            }
            LqpVisitation::VisitInputs
        });

        for aggregate in aggregates {
            reduce_aggregate(&aggregate);
        }
        Ok(())
    }
}

fn reduce_aggregate(aggregate: &LqpNodeRef) {
    let LqpNodeKind::Aggregate { group_by_count } = aggregate.kind() else {
        return;
    };
    let Some(input) = aggregate.left_input() else {
        return;
    };

    let expressions = aggregate.node_expressions();
    let count = group_by_count.get();
    let group_by = &expressions[..count];
    if group_by.len() < 2 {
        return;
    }

    // The smallest covered constraint keeps the most dependent columns
    // removable. Constraint columns must be non-nullable: two NULL keys form
    // the same group even though NULL != NULL, so a nullable "unique" column
    // does not functionally determine the rest.
    let mut best_constraint: Option<Vec<ExpressionRef>> = None;
    for combination in input.unique_column_combinations() {
        if combination.len() >= group_by.len() {
            continue;
        }
        let covered = combination.iter().all(|expression| {
            group_by.iter().any(|group| expressions_equal(group, expression))
        });
        if !covered {
            continue;
        }
        let non_nullable = combination
            .iter()
            .all(|expression| !crate::expression::is_nullable_on_lqp(expression, &input));
        if !non_nullable {
            continue;
        }
        let is_better = best_constraint
            .as_ref()
            .map_or(true, |best| combination.len() < best.len());
        if is_better {
            best_constraint = Some(combination);
        }
    }
    let Some(constraint) = best_constraint else {
        return;
    };

    let (kept, dependent): (Vec<ExpressionRef>, Vec<ExpressionRef>) =
        group_by.iter().cloned().partition(|group| {
            constraint.iter().any(|expression| expressions_equal(expression, group))
        });
    if dependent.is_empty() {
        return;
    }

    // New shape: kept group-bys, then ANY() wrappers for the dependent
    // columns, then the original aggregates.
    let mut new_expressions = kept.clone();
    let any_wrappers: Vec<ExpressionRef> = dependent
        .iter()
        .map(|expression| {
            Expression::aggregate(AggregateFunction::Any, Some(expression.clone()))
        })
        .collect();
    new_expressions.extend(any_wrappers.clone());
    new_expressions.extend(expressions[count..].iter().cloned());
    aggregate.set_node_expressions(new_expressions);
    group_by_count.set(kept.len());

    // Re-target consumers: references to a dependent column now mean its
    // ANY() representative.
    visit_lqp_upwards(aggregate, |consumer| {
        if std::rc::Rc::ptr_eq(consumer, aggregate) {
            return LqpUpwardVisitation::VisitOutputs;
        }
        let mut expressions = consumer.node_expressions();
        let mut any_replaced = false;
        for expression in &mut expressions {
            let replaced = rewrite_expression(expression, &mut |sub_expression| {
                dependent
                    .iter()
                    .position(|dropped| expressions_equal(dropped, sub_expression))
                    .map(|index| any_wrappers[index].clone())
            });
            if let Some(replaced) = replaced {
                *expression = replaced;
                any_replaced = true;
            }
        }
        if any_replaced {
            consumer.set_node_expressions(expressions);
        }
        LqpUpwardVisitation::VisitOutputs
    });
}
