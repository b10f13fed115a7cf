//! Splits disjunctive predicates into position-set unions

use crate::expression::{Expression, LogicalOperator};
use crate::lqp::{visit_lqp, LqpNode, LqpNodeKind, LqpNodeRef, LqpVisitation};
use crate::optimizer::OptimizerRule;
use crate::Result;
use strata_types::SetOperationMode;

/// Rewrites `Predicate(p OR q)` into
/// `Union[Positions](Predicate(p), Predicate(q))` over the pointer-shared
/// input. Nested disjunctions decompose right-recursively: the rule re-runs
/// until no predicate node holds an OR.
///
/// The resulting plan scans the shared input once per branch but lets each
/// branch use the specialized single-predicate scan implementations.
pub struct DisjunctionToUnionRule;

impl OptimizerRule for DisjunctionToUnionRule {
    fn name(&self) -> &'static str {
        "DisjunctionToUnionRule"
    }

    fn apply_to(&self, root: &LqpNodeRef) -> Result<()> {
        loop {
            let mut disjunction: Option<LqpNodeRef> = None;
            visit_lqp(root, |node| {
                if disjunction.is_some() {
                    return LqpVisitation::DoNotVisitInputs;
                }
                if matches!(node.kind(), LqpNodeKind::Predicate) {
                    let expressions = node.node_expressions();
                    if let Some(expression) = expressions.first() {
                        if matches!(
                            expression.as_ref(),
                            Expression::Logical { op: LogicalOperator::Or, .. }
                        ) {
                            disjunction = Some(node.clone());
                            return LqpVisitation::DoNotVisitInputs;
                        }
                    }
                }
                LqpVisitation::VisitInputs
            });

            let Some(predicate_node) = disjunction else {
                return Ok(());
            };
            let expressions = predicate_node.node_expressions();
            let (left_predicate, right_predicate) = match expressions[0].as_ref() {
                Expression::Logical { op: LogicalOperator::Or, left, right } => {
                    (left.clone(), right.clone())
                }
                _ => unreachable!("checked during the search"),
            };

            let input = predicate_node
                .left_input()
                .expect("predicate nodes have an input");
            // Both branches share `input` by pointer; the right-hand branch
            // may itself hold a nested OR, which the next iteration splits.
            let left_branch = LqpNode::predicate(left_predicate, &input);
            let right_branch = LqpNode::predicate(right_predicate, &input);
            let union =
                LqpNode::union(SetOperationMode::Positions, &left_branch, &right_branch);

            for (output, side) in predicate_node.output_relations() {
                output.set_input(side, Some(union.clone()));
            }
            predicate_node.set_left_input(None);
        }
    }
}
