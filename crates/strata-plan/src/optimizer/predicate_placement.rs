//! Pushes cheap predicates down, pulls expensive ones up

use strata_types::JoinMode;

use crate::expression::ExpressionRef;
use crate::lqp::{InputSide, LqpNode, LqpNodeKind, LqpNodeRef, remove_node_from_plan};
use crate::optimizer::{expression_evaluable_on_lqp, OptimizerRule};
use crate::Result;

/// Heuristic predicate placement: non-expensive predicates are pushed down
/// as far as evaluability permits (to shrink intermediate results early),
/// expensive predicates are pulled up as far as possible (to evaluate them
/// on as few rows as possible).
///
/// A predicate is expensive iff it contains a correlated subquery.
///
/// Barriers respected on the way down: limits (row cutoff changes under
/// reordering), the null-padding side of outer joins, aggregates and
/// projections whose inputs cannot evaluate the predicate, and any node
/// shared by multiple outputs (pushing into it would affect the other
/// consumers).
pub struct PredicatePlacementRule;

impl OptimizerRule for PredicatePlacementRule {
    fn name(&self) -> &'static str {
        "PredicatePlacementRule"
    }

    fn apply_to(&self, root: &LqpNodeRef) -> Result<()> {
        let mut pending = Vec::new();
        push_down_traversal(root, InputSide::Left, &mut pending);
        debug_assert!(pending.is_empty(), "push-down re-inserts every pending predicate");

        let climbed = pull_up_traversal(root, InputSide::Left);
        // Whatever climbed all the way sits directly below the root.
        insert_predicates_below(root, InputSide::Left, &climbed);
        Ok(())
    }
}

fn is_expensive_predicate(predicate: &ExpressionRef) -> bool {
    predicate.contains_correlated_subquery()
}

/// Walk towards the leaves, collecting detached cheap predicate nodes in
/// `pending` and re-inserting each at the lowest position that can still
/// evaluate it.
fn push_down_traversal(
    current: &LqpNodeRef,
    side: InputSide,
    pending: &mut Vec<LqpNodeRef>,
) {
    let Some(input) = current.input(side) else {
        return;
    };

    // Nodes with multiple consumers are barriers: drop the pending
    // predicates here and restart below.
    if input.outputs().len() > 1 {
        insert_predicates_below(current, side, pending);
        pending.clear();
        let mut fresh = Vec::new();
        push_down_traversal(&input, InputSide::Left, &mut fresh);
        let mut fresh_right = Vec::new();
        push_down_traversal(&input, InputSide::Right, &mut fresh_right);
        return;
    }

    match input.kind() {
        LqpNodeKind::Predicate => {
            let predicate = input.node_expressions()[0].clone();
            if is_expensive_predicate(&predicate) {
                // Left in place for the pull-up phase; pending predicates
                // may move past it.
                push_down_traversal(&input, InputSide::Left, pending);
            } else {
                remove_node_from_plan(&input);
                pending.push(input);
                // `current`'s input changed; look at the new child from the
                // same position.
                push_down_traversal(current, side, pending);
            }
        }
        LqpNodeKind::Join { join_mode } => {
            let (push_left, push_right) = match join_mode {
                JoinMode::Inner | JoinMode::Cross => (true, true),
                // Predicates on the preserved side commute with the join;
                // predicates touching the null-padded side would change
                // outer semantics.
                JoinMode::Left => (true, false),
                JoinMode::Right => (false, true),
                JoinMode::FullOuter => (false, false),
                // Semi/anti joins emit left columns only.
                JoinMode::Semi | JoinMode::AntiNullAsTrue | JoinMode::AntiNullAsFalse => {
                    (true, false)
                }
            };
            let mut left_pending = Vec::new();
            let mut right_pending = Vec::new();
            for predicate_node in pending.drain(..) {
                let predicate = predicate_node.node_expressions()[0].clone();
                let left_input = input.left_input().expect("join has a left input");
                if push_left && expression_evaluable_on_lqp(&predicate, &left_input) {
                    left_pending.push(predicate_node);
                    continue;
                }
                if push_right {
                    let right_input = input.right_input().expect("join has a right input");
                    if expression_evaluable_on_lqp(&predicate, &right_input) {
                        right_pending.push(predicate_node);
                        continue;
                    }
                }
                // Stays above the join.
                insert_predicates_below(current, side, &[predicate_node]);
            }
            push_down_traversal(&input, InputSide::Left, &mut left_pending);
            push_down_traversal(&input, InputSide::Right, &mut right_pending);
        }
        LqpNodeKind::Union { .. } => {
            // Each branch exposes the same columns; a predicate filters both
            // branches identically, so push a copy into each.
            let mut left_pending = Vec::new();
            let mut right_pending = Vec::new();
            for predicate_node in pending.drain(..) {
                let predicate = predicate_node.node_expressions()[0].clone();
                let copy = LqpNode::predicate(predicate, &input);
                copy.set_left_input(None);
                left_pending.push(predicate_node);
                right_pending.push(copy);
            }
            push_down_traversal(&input, InputSide::Left, &mut left_pending);
            push_down_traversal(&input, InputSide::Right, &mut right_pending);
        }
        LqpNodeKind::Sort { .. } => {
            // Filtering commutes with sorting.
            push_down_traversal(&input, InputSide::Left, pending);
        }
        LqpNodeKind::Projection | LqpNodeKind::Aggregate { .. } => {
            let below = input.left_input();
            let mut passing = Vec::new();
            for predicate_node in pending.drain(..) {
                let predicate = predicate_node.node_expressions()[0].clone();
                let passes = below
                    .as_ref()
                    .map_or(false, |below| expression_evaluable_on_lqp(&predicate, below));
                if passes {
                    passing.push(predicate_node);
                } else {
                    insert_predicates_below(current, side, &[predicate_node]);
                }
            }
            push_down_traversal(&input, InputSide::Left, &mut passing);
        }
        LqpNodeKind::Limit => {
            // Filtering below a limit changes which rows survive the cutoff.
            insert_predicates_below(current, side, pending);
            pending.clear();
            let mut fresh = Vec::new();
            push_down_traversal(&input, InputSide::Left, &mut fresh);
        }
        LqpNodeKind::StoredTable { .. } => {
            insert_predicates_below(current, side, pending);
            pending.clear();
        }
        LqpNodeKind::Root => unreachable!("root nodes are never inputs"),
    }
}

/// Walk towards the leaves collecting expensive predicates, letting them
/// climb back up through nodes that preserve their evaluability. Returns the
/// predicates that climb past `current`'s `side` input.
fn pull_up_traversal(current: &LqpNodeRef, side: InputSide) -> Vec<LqpNodeRef> {
    let Some(input) = current.input(side) else {
        return Vec::new();
    };

    let mut candidates = pull_up_traversal(&input, InputSide::Left);
    candidates.extend(pull_up_traversal(&input, InputSide::Right));

    if matches!(input.kind(), LqpNodeKind::Predicate) && input.outputs().len() == 1 {
        let predicate = input.node_expressions()[0].clone();
        if is_expensive_predicate(&predicate) {
            remove_node_from_plan(&input);
            candidates.push(input);
        }
    }

    if candidates.is_empty() {
        return candidates;
    }

    // Decide whether the candidates may climb past `current`.
    let climbs = current.outputs().len() <= 1
        && match current.kind() {
            LqpNodeKind::Predicate | LqpNodeKind::Sort { .. } => true,
            LqpNodeKind::Join { join_mode } => {
                matches!(join_mode, JoinMode::Inner | JoinMode::Cross)
            }
            // Projections and aggregates may drop the referenced columns,
            // unions and outer joins change row visibility, limits cut rows:
            // all of them pin the predicate below.
            _ => false,
        };
    if climbs {
        // Climbing past a join must keep the predicate evaluable on the
        // join's output.
        candidates.retain(|candidate| {
            let predicate = candidate.node_expressions()[0].clone();
            if expression_evaluable_on_lqp(&predicate, current) {
                true
            } else {
                insert_predicates_below(current, side, std::slice::from_ref(candidate));
                false
            }
        });
        candidates
    } else {
        insert_predicates_below(current, side, &candidates);
        Vec::new()
    }
}

/// Chain `predicate_nodes` between `node` and its `side` input.
fn insert_predicates_below(node: &LqpNodeRef, side: InputSide, predicate_nodes: &[LqpNodeRef]) {
    for predicate_node in predicate_nodes {
        let old_input = node.input(side);
        predicate_node.set_left_input(old_input);
        node.set_input(side, Some(predicate_node.clone()));
    }
}
