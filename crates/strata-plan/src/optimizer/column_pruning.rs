//! Removes columns that no consumer ever looks at

use std::collections::HashSet;
use std::rc::Rc;

use strata_types::{ColumnId, JoinMode, PredicateCondition};

use crate::expression::{
    collect_column_references, expressions_equal, Expression, ExpressionRef,
};
use crate::lqp::{
    insert_node_above, visit_lqp, LqpColumnReference, LqpNode, LqpNodeKind, LqpNodeRef,
    LqpVisitation,
};
use crate::optimizer::OptimizerRule;
use crate::Result;

/// Key identifying a column irrespective of lineage: the original node and
/// the original column id.
type BareColumnKey = (*const LqpNode, ColumnId);

fn bare_key(reference: &LqpColumnReference) -> Option<BareColumnKey> {
    reference
        .original_node()
        .map(|node| (Rc::as_ptr(&node), reference.original_column_id()))
}

/// Removes expressions (i.e., columns) that are no longer used from the
/// plan:
/// - stored tables stop emitting columns that no node above mentions,
/// - joins that emit entirely unused columns get a pruning projection on
///   top,
/// - an inner join whose one side is referenced only by the join predicate
///   becomes a semi join, provided that side is unique on its join key (so
///   dropping its columns cannot change the multiplicity of the other
///   side's rows).
pub struct ColumnPruningRule;

impl OptimizerRule for ColumnPruningRule {
    fn name(&self) -> &'static str {
        "ColumnPruningRule"
    }

    fn apply_to(&self, root: &LqpNodeRef) -> Result<()> {
        rewrite_joins_to_semi(root);
        prune_stored_tables(root);
        prune_join_outputs(root);
        Ok(())
    }
}

/// Column references consumed by any node expression in the plan, plus the
/// plan's own output columns, as bare keys.
///
/// With `except_subplan_of` set, that node's own expressions and its whole
/// sub-plan are skipped, answering "who needs these columns besides X and
/// what feeds X". Parts of X's sub-plan shared with the rest of the plan are
/// still reached through the other paths and count as consumers.
fn consumed_column_keys(
    root: &LqpNodeRef,
    except_subplan_of: Option<&LqpNodeRef>,
) -> HashSet<BareColumnKey> {
    let mut keys = HashSet::new();
    for expression in root.column_expressions() {
        for reference in collect_column_references(&[expression]) {
            if let Some(key) = bare_key(&reference) {
                keys.insert(key);
            }
        }
    }
    visit_lqp(root, |node| {
        if let Some(except) = except_subplan_of {
            if Rc::ptr_eq(node, except) {
                return LqpVisitation::DoNotVisitInputs;
            }
        }
        for reference in collect_column_references(&node.node_expressions()) {
            if let Some(key) = bare_key(&reference) {
                keys.insert(key);
            }
        }
        // Subquery plans consume columns of the outer plan via their
        // correlated parameters, which live in the node expressions already
        // visited above.
        LqpVisitation::VisitInputs
    });
    keys
}

fn prune_stored_tables(root: &LqpNodeRef) {
    let consumed = consumed_column_keys(root, None);
    let mut stored_tables = Vec::new();
    visit_lqp(root, |node| {
        if matches!(node.kind(), LqpNodeKind::StoredTable { .. }) {
            stored_tables.push(node.clone());
        }
        LqpVisitation::VisitInputs
    });

    for node in stored_tables {
        let LqpNodeKind::StoredTable { pruned_column_ids, .. } = node.kind() else {
            continue;
        };
        let exposed: Vec<ColumnId> = node
            .column_expressions()
            .iter()
            .filter_map(|expression| match expression.as_ref() {
                Expression::Column(reference) => Some(reference.original_column_id()),
                _ => None,
            })
            .collect();
        let mut newly_pruned: Vec<ColumnId> = exposed
            .into_iter()
            .filter(|&column_id| !consumed.contains(&(Rc::as_ptr(&node), column_id)))
            .collect();
        if newly_pruned.is_empty() {
            continue;
        }
        let mut pruned = pruned_column_ids.borrow_mut();
        pruned.append(&mut newly_pruned);
        pruned.sort_unstable();
        pruned.dedup();
    }
}

/// An inner join whose right (or left) side contributes no columns to the
/// rest of the plan and is unique on its join key is turned into a semi
/// join on that side.
fn rewrite_joins_to_semi(root: &LqpNodeRef) {
    let mut joins = Vec::new();
    visit_lqp(root, |node| {
        if matches!(node.kind(), LqpNodeKind::Join { join_mode: JoinMode::Inner }) {
            joins.push(node.clone());
        }
        LqpVisitation::VisitInputs
    });

    for join in joins {
        let predicates = join.node_expressions();
        // Restrict to single-equi-predicate joins; multi-predicate semi
        // rewrites would need all predicates re-checked.
        if predicates.len() != 1 {
            continue;
        }
        let Expression::Predicate { condition: PredicateCondition::Equals, arguments } =
            predicates[0].as_ref()
        else {
            continue;
        };
        if arguments.len() != 2 {
            continue;
        }

        let Some(left_input) = join.left_input() else { continue };
        let Some(right_input) = join.right_input() else { continue };
        let consumed_elsewhere = consumed_column_keys(root, Some(&join));

        for (kept, unused) in [(&left_input, &right_input), (&right_input, &left_input)] {
            if !side_is_unreferenced(unused, &consumed_elsewhere) {
                continue;
            }
            let (kept_key, unused_key) =
                match classify_join_key(&arguments[0], &arguments[1], kept, unused) {
                    Some(keys) => keys,
                    None => continue,
                };
            if !side_unique_on(unused, &unused_key) {
                continue;
            }

            let predicate = Expression::predicate(
                PredicateCondition::Equals,
                vec![kept_key, unused_key],
            );
            let semi_join = LqpNode::join(JoinMode::Semi, vec![predicate], kept, unused);
            for (output, side) in join.output_relations() {
                output.set_input(side, Some(semi_join.clone()));
            }
            join.set_left_input(None);
            join.set_right_input(None);
            break;
        }
    }
}

/// Whether none of `consumed` references columns exposed by `side`.
fn side_is_unreferenced(side: &LqpNodeRef, consumed: &HashSet<BareColumnKey>) -> bool {
    collect_column_references(&side.column_expressions()).iter().all(|reference| {
        bare_key(reference).map_or(true, |key| !consumed.contains(&key))
    })
}

/// Order a join predicate's operands as (kept side key, unused side key).
fn classify_join_key(
    first: &ExpressionRef,
    second: &ExpressionRef,
    kept: &LqpNodeRef,
    unused: &LqpNodeRef,
) -> Option<(ExpressionRef, ExpressionRef)> {
    use crate::lqp::ColumnLookup::Resolved;
    let first_on_kept = matches!(kept.find_column_id(first), Resolved(_));
    let second_on_unused = matches!(unused.find_column_id(second), Resolved(_));
    if first_on_kept && second_on_unused {
        return Some((first.clone(), second.clone()));
    }
    let second_on_kept = matches!(kept.find_column_id(second), Resolved(_));
    let first_on_unused = matches!(unused.find_column_id(first), Resolved(_));
    if second_on_kept && first_on_unused {
        return Some((second.clone(), first.clone()));
    }
    None
}

/// Whether `side` declares a unique constraint covered by the join key.
fn side_unique_on(side: &LqpNodeRef, key: &ExpressionRef) -> bool {
    side.unique_column_combinations().iter().any(|combination| {
        combination.len() == 1 && expressions_equal(&combination[0], key)
    })
}

/// Insert a pruning projection above joins that emit unused columns.
fn prune_join_outputs(root: &LqpNodeRef) {
    let mut joins = Vec::new();
    visit_lqp(root, |node| {
        if let LqpNodeKind::Join { join_mode } = node.kind() {
            if !join_mode.is_semi_or_anti() {
                joins.push(node.clone());
            }
        }
        LqpVisitation::VisitInputs
    });

    for join in joins {
        // A projection or aggregate directly above already narrows the
        // columns.
        if join.outputs().iter().any(|output| {
            matches!(output.kind(), LqpNodeKind::Projection | LqpNodeKind::Aggregate { .. })
        }) {
            continue;
        }
        let consumed = consumed_column_keys(root, Some(&join));
        let outputs = join.column_expressions();
        let used: Vec<ExpressionRef> = outputs
            .iter()
            .filter(|expression| {
                collect_column_references(&[(*expression).clone()]).iter().any(|reference| {
                    bare_key(reference).map_or(true, |key| consumed.contains(&key))
                })
            })
            .cloned()
            .collect();
        if used.is_empty() || used.len() == outputs.len() {
            continue;
        }
        let projection = LqpNode::projection(used, &join);
        insert_node_above(&join, &projection);
    }
}
