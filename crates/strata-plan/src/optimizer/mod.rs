//! The optimizer rule pipeline
//!
//! An optimizer is an ordered list of rules. Every rule receives the plan
//! wrapped in a `Root` node (so rules can replace the top-most real node by
//! rewiring the root's input) and rewrites the plan in place.

pub mod column_pruning;
pub mod dependent_group_by_reduction;
pub mod disjunction_to_union;
pub mod predicate_placement;
pub mod subplan_reuse;

#[cfg(test)]
mod tests;

pub use column_pruning::ColumnPruningRule;
pub use dependent_group_by_reduction::DependentGroupByReductionRule;
pub use disjunction_to_union::DisjunctionToUnionRule;
pub use predicate_placement::PredicatePlacementRule;
pub use subplan_reuse::SubplanReuseRule;

use crate::error::PlanError;
use crate::expression::{Expression, ExpressionRef};
use crate::lqp::{ColumnLookup, LqpNode, LqpNodeKind, LqpNodeRef};
use crate::Result;

/// A single plan rewrite.
pub trait OptimizerRule {
    fn name(&self) -> &'static str;

    /// Rewrite the plan rooted at `root` (always a `Root` node) in place.
    fn apply_to(&self, root: &LqpNodeRef) -> Result<()>;
}

/// An ordered pipeline of rules.
pub struct Optimizer {
    rules: Vec<Box<dyn OptimizerRule>>,
}

impl Optimizer {
    pub fn new() -> Self {
        Optimizer { rules: Vec::new() }
    }

    /// The standard pipeline. Disjunctions are split first so that the
    /// structural rules that follow see plain predicates; pruning runs late
    /// so it observes the final column demand.
    pub fn with_default_rules() -> Self {
        let mut optimizer = Optimizer::new();
        optimizer.add_rule(Box::new(DisjunctionToUnionRule));
        optimizer.add_rule(Box::new(SubplanReuseRule));
        optimizer.add_rule(Box::new(PredicatePlacementRule));
        optimizer.add_rule(Box::new(ColumnPruningRule));
        optimizer.add_rule(Box::new(DependentGroupByReductionRule));
        optimizer
    }

    pub fn add_rule(&mut self, rule: Box<dyn OptimizerRule>) {
        self.rules.push(rule);
    }

    /// Apply one rule to a plan, returning the root. The plan is wrapped in
    /// a `Root` node if it is not already rooted.
    pub fn apply_rule(rule: &dyn OptimizerRule, plan: &LqpNodeRef) -> Result<LqpNodeRef> {
        let root = ensure_root(plan);
        rule.apply_to(&root)?;
        Ok(root)
    }

    /// Run the full pipeline and return the optimized plan (without the
    /// root wrapper).
    pub fn optimize(&self, plan: LqpNodeRef) -> Result<LqpNodeRef> {
        let root = ensure_root(&plan);
        for rule in &self.rules {
            rule.apply_to(&root)?;
        }
        let optimized = root
            .left_input()
            .ok_or_else(|| PlanError::InvalidPlan("optimizer produced an empty plan".to_string()))?;
        root.set_left_input(None);
        Ok(optimized)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::with_default_rules()
    }
}

fn ensure_root(plan: &LqpNodeRef) -> LqpNodeRef {
    if matches!(plan.kind(), LqpNodeKind::Root) {
        plan.clone()
    } else {
        LqpNode::root(plan)
    }
}

/// Whether `expression` could be evaluated on top of `node`: every column
/// reference it mentions must resolve to one of `node`'s output columns
/// (respecting lineage).
pub(crate) fn expression_evaluable_on_lqp(expression: &ExpressionRef, node: &LqpNodeRef) -> bool {
    let mut evaluable = true;
    crate::expression::visit_expression(expression, &mut |sub_expression| {
        match sub_expression {
            Expression::Column(reference) => {
                let column = Expression::column(reference.clone());
                if !matches!(node.find_column_id(&column), ColumnLookup::Resolved(_)) {
                    evaluable = false;
                }
                crate::expression::ExpressionVisitation::DoNotVisitArguments
            }
            // Subquery internals resolve against their own plans.
            Expression::Subquery { .. } => {
                crate::expression::ExpressionVisitation::DoNotVisitArguments
            }
            _ => crate::expression::ExpressionVisitation::VisitArguments,
        }
    });
    evaluable
}
