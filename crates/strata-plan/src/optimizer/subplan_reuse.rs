//! Deduplicates structurally equal sub-plans

use std::collections::HashMap;
use std::rc::Rc;

use crate::expression::{
    collect_column_references, rewrite_expression, Expression, ExpressionRef,
};
use crate::lqp::{
    subplans_equal, visit_lqp, visit_lqp_upwards, InputSide, LqpColumnReference, LqpNodeKind,
    LqpNodeRef, LqpUpwardVisitation, LqpVisitation,
};
use crate::optimizer::OptimizerRule;
use crate::Result;

type ColumnReplacementMappings = HashMap<LqpColumnReference, LqpColumnReference>;

/// Walks the plan keeping a structural-equality set of sub-plans seen so
/// far. A duplicate sub-plan is dropped: its outputs are redirected to the
/// first ("primary") occurrence, and every consumer above has its column
/// references re-targeted from the duplicate's nodes to the primary's nodes.
///
/// Re-targeting is where lineage earns its keep: when the replacement passes
/// through a join whose two sides would afterwards expose identical column
/// identities, the replacement targets get a `(join, side)` lineage step
/// appended so the sides stay distinguishable.
pub struct SubplanReuseRule;

impl OptimizerRule for SubplanReuseRule {
    fn name(&self) -> &'static str {
        "SubplanReuseRule"
    }

    fn apply_to(&self, root: &LqpNodeRef) -> Result<()> {
        assert!(
            matches!(root.kind(), LqpNodeKind::Root),
            "SubplanReuseRule needs a root to hold onto"
        );

        // Hash-bucketed set of primary sub-plans; equality resolves the
        // collisions the id-only column hashing allows.
        let mut primary_subplans: HashMap<u64, Vec<LqpNodeRef>> = HashMap::new();

        visit_lqp(root, |node| {
            let bucket = primary_subplans.entry(node.hash_value()).or_default();
            let primary = bucket
                .iter()
                .find(|candidate| !Rc::ptr_eq(candidate, node) && subplans_equal(candidate, node))
                .cloned();
            let Some(primary) = primary else {
                bucket.push(node.clone());
                return LqpVisitation::VisitInputs;
            };

            // This sub-plan is a duplicate of `primary`: re-target columns
            // upward, then splice the duplicate out.
            let mut column_mapping = create_column_mapping(node, &primary);
            let mut per_node_replacements: Vec<(LqpNodeRef, ColumnReplacementMappings)> =
                Vec::new();
            apply_column_replacement_mappings_upwards(
                node,
                &mut column_mapping,
                &mut per_node_replacements,
            );
            for (consumer, mappings) in &per_node_replacements {
                apply_column_replacement_mappings(consumer, mappings);
            }

            for (output, side) in node.output_relations() {
                output.set_input(side, Some(primary.clone()));
            }

            LqpVisitation::DoNotVisitInputs
        });
        Ok(())
    }
}

/// Pair up the output columns of the duplicate and the primary sub-plan.
fn create_column_mapping(
    from_node: &LqpNodeRef,
    to_node: &LqpNodeRef,
) -> ColumnReplacementMappings {
    let from_expressions = from_node.column_expressions();
    let to_expressions = to_node.column_expressions();
    assert_eq!(
        from_expressions.len(),
        to_expressions.len(),
        "equal sub-plans expose the same number of columns"
    );

    let mut mappings = ColumnReplacementMappings::new();
    for (from_expression, to_expression) in from_expressions.iter().zip(&to_expressions) {
        add_to_column_mapping(from_expression, to_expression, &mut mappings);
    }
    mappings
}

fn add_to_column_mapping(
    from_expression: &ExpressionRef,
    to_expression: &ExpressionRef,
    mappings: &mut ColumnReplacementMappings,
) {
    if let (Expression::Column(from_reference), Expression::Column(to_reference)) =
        (from_expression.as_ref(), to_expression.as_ref())
    {
        debug_assert!(
            from_reference.lineage().is_empty() || !to_reference.lineage().is_empty(),
            "lineage on the from side without a counterpart is unhandled"
        );
        mappings.insert(from_reference.without_lineage(), to_reference.clone());
        return;
    }
    let from_arguments = from_expression.arguments();
    let to_arguments = to_expression.arguments();
    debug_assert_eq!(
        from_arguments.len(),
        to_arguments.len(),
        "paired expressions have matching arity"
    );
    for (from_argument, to_argument) in from_arguments.iter().zip(&to_arguments) {
        add_to_column_mapping(from_argument, to_argument, mappings);
    }
}

/// Walk from the duplicate towards the root, recording per consumer the
/// replacement map valid at that node. Joins on the way may need lineage
/// steps appended to keep re-targeted columns unambiguous.
fn apply_column_replacement_mappings_upwards(
    start: &LqpNodeRef,
    column_mapping: &mut ColumnReplacementMappings,
    per_node_replacements: &mut Vec<(LqpNodeRef, ColumnReplacementMappings)>,
) {
    visit_lqp_upwards(start, |sub_node| {
        let mut local_mappings = column_mapping.clone();

        if let LqpNodeKind::Join { join_mode } = sub_node.kind() {
            let emits_both_sides = !join_mode.is_semi_or_anti();
            let left_references: std::collections::HashSet<_> = sub_node
                .left_input()
                .map(|input| collect_column_references(&input.column_expressions()))
                .unwrap_or_default();
            let right_references: std::collections::HashSet<_> = sub_node
                .right_input()
                .map(|input| collect_column_references(&input.column_expressions()))
                .unwrap_or_default();

            let mut updated_mappings = ColumnReplacementMappings::new();
            for (from, to) in column_mapping.iter() {
                if left_references.contains(from) && right_references.contains(to) {
                    updated_mappings
                        .insert(from.clone(), to.with_lineage_step(sub_node, InputSide::Left));
                    updated_mappings.insert(
                        to.without_lineage(),
                        to.with_lineage_step(sub_node, InputSide::Right),
                    );
                }
                if right_references.contains(from) && left_references.contains(to) {
                    updated_mappings
                        .insert(from.clone(), to.with_lineage_step(sub_node, InputSide::Right));
                    updated_mappings.insert(
                        to.without_lineage(),
                        to.with_lineage_step(sub_node, InputSide::Left),
                    );
                }
            }
            for (from, to) in updated_mappings {
                local_mappings.insert(from.clone(), to.clone());
                if emits_both_sides {
                    column_mapping.insert(from, to);
                }
            }
        }

        per_node_replacements.push((sub_node.clone(), local_mappings));
        LqpUpwardVisitation::VisitOutputs
    });
}

/// Rewrite one consumer's own expressions through the replacement map, on
/// deep copies, swapping a copy in only when something was replaced.
fn apply_column_replacement_mappings(
    node: &LqpNodeRef,
    column_replacement_mappings: &ColumnReplacementMappings,
) {
    let mut expressions = node.node_expressions();
    let mut any_replaced = false;
    for expression in &mut expressions {
        let replaced = rewrite_expression(expression, &mut |sub_expression| {
            if let Expression::Column(reference) = sub_expression.as_ref() {
                let bare = reference.without_lineage();
                if let Some(target) = column_replacement_mappings.get(&bare) {
                    // Restore the lineage the original reference carried on
                    // top of the target's own lineage.
                    let mut new_reference = target.clone();
                    for (step, side) in reference.lineage() {
                        if let Some(step_node) = step.upgrade() {
                            new_reference = new_reference.with_lineage_step(&step_node, *side);
                        }
                    }
                    return Some(Expression::column(new_reference));
                }
            }
            None
        });
        if let Some(replaced) = replaced {
            *expression = replaced;
            any_replaced = true;
        }
    }
    if any_replaced {
        node.set_node_expressions(expressions);
    }
}
