//! Column references with lineage

use std::fmt;
use std::rc::Rc;

use strata_types::ColumnId;

use crate::lqp::{InputSide, LqpNodeRef, LqpNodeWeak};

/// Identifies a column by the node that originally produced it, the column id
/// within that node, and a lineage: the ordered (join node, input side) steps
/// the column took through joins that had to disambiguate it.
///
/// Lineage tells two occurrences of the same original column apart when a
/// sub-plan is reused on both sides of a join. Equality therefore compares
/// the original node, the column id and the full lineage.
///
/// The node handles are weak: columns must not keep their producing nodes
/// alive. A reference whose original node expired compares unequal to
/// everything (and trips a debug assertion, since it indicates a plan-surgery
/// bug).
#[derive(Clone)]
pub struct LqpColumnReference {
    original_node: LqpNodeWeak,
    original_column_id: ColumnId,
    lineage: Vec<(LqpNodeWeak, InputSide)>,
}

impl LqpColumnReference {
    pub fn new(original_node: &LqpNodeRef, original_column_id: ColumnId) -> Self {
        LqpColumnReference {
            original_node: Rc::downgrade(original_node),
            original_column_id,
            lineage: Vec::new(),
        }
    }

    pub fn original_node(&self) -> Option<LqpNodeRef> {
        self.original_node.upgrade()
    }

    pub fn original_column_id(&self) -> ColumnId {
        self.original_column_id
    }

    pub fn lineage(&self) -> &[(LqpNodeWeak, InputSide)] {
        &self.lineage
    }

    /// A copy with `(node, side)` appended to the lineage.
    pub fn with_lineage_step(&self, node: &LqpNodeRef, side: InputSide) -> Self {
        let mut copy = self.clone();
        copy.lineage.push((Rc::downgrade(node), side));
        copy
    }

    /// A copy with the lineage dropped; used when matching replacement maps
    /// that are keyed on bare references.
    pub fn without_lineage(&self) -> Self {
        LqpColumnReference {
            original_node: self.original_node.clone(),
            original_column_id: self.original_column_id,
            lineage: Vec::new(),
        }
    }

    /// Replace the lineage wholesale (subplan reuse re-targets references).
    pub fn with_lineage(&self, lineage: Vec<(LqpNodeWeak, InputSide)>) -> Self {
        LqpColumnReference {
            original_node: self.original_node.clone(),
            original_column_id: self.original_column_id,
            lineage,
        }
    }

    /// The side recorded for `node`, if the lineage contains a step for it.
    pub fn lineage_side_for(&self, node: &LqpNodeRef) -> Option<InputSide> {
        self.lineage.iter().find_map(|(step_node, side)| {
            step_node
                .upgrade()
                .filter(|step| Rc::ptr_eq(step, node))
                .map(|_| *side)
        })
    }

    /// A copy without the lineage step recorded for `node`.
    pub fn strip_lineage_step(&self, node: &LqpNodeRef) -> Self {
        let lineage = self
            .lineage
            .iter()
            .filter(|(step_node, _)| {
                step_node.upgrade().map_or(true, |step| !Rc::ptr_eq(&step, node))
            })
            .cloned()
            .collect();
        LqpColumnReference {
            original_node: self.original_node.clone(),
            original_column_id: self.original_column_id,
            lineage,
        }
    }

    pub(crate) fn original_node_weak(&self) -> &LqpNodeWeak {
        &self.original_node
    }
}

impl PartialEq for LqpColumnReference {
    fn eq(&self, other: &Self) -> bool {
        if self.original_column_id != other.original_column_id {
            return false;
        }
        if self.lineage.len() != other.lineage.len() {
            return false;
        }
        let (this_node, other_node) = (self.original_node.upgrade(), other.original_node.upgrade());
        debug_assert!(
            this_node.is_some() && other_node.is_some(),
            "comparing a column reference whose original node expired"
        );
        match (this_node, other_node) {
            (Some(a), Some(b)) if Rc::ptr_eq(&a, &b) => {}
            _ => return false,
        }
        self.lineage.iter().zip(&other.lineage).all(|((node_a, side_a), (node_b, side_b))| {
            side_a == side_b
                && match (node_a.upgrade(), node_b.upgrade()) {
                    (Some(a), Some(b)) => Rc::ptr_eq(&a, &b),
                    _ => false,
                }
        })
    }
}

impl Eq for LqpColumnReference {}

impl std::hash::Hash for LqpColumnReference {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Deliberately only the column id: hashing the original node would
        // make equal-but-not-identical sub-plans hash differently. Equality
        // resolves the collisions.
        self.original_column_id.hash(state);
    }
}

impl fmt::Debug for LqpColumnReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for LqpColumnReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.original_node.upgrade() {
            Some(node) => write!(f, "{}.{}", node.short_description(), self.original_column_id)?,
            None => write!(f, "<expired>.{}", self.original_column_id)?,
        }
        for (node, side) in &self.lineage {
            match node.upgrade() {
                Some(node) => {
                    write!(f, " via {}({:?})", node.short_description(), side)?;
                }
                None => write!(f, " via <expired>({:?})", side)?,
            }
        }
        Ok(())
    }
}

/// Convenience for building plans: the reference behind a column expression
/// of `node` at `column_id`, i.e. what downstream nodes should use to talk
/// about that output column.
pub fn column_reference_of(node: &LqpNodeRef, column_id: ColumnId) -> Option<LqpColumnReference> {
    let expressions = node.column_expressions();
    let expression = expressions.get(column_id.as_usize())?;
    match expression.as_ref() {
        crate::expression::Expression::Column(reference) => Some(reference.clone()),
        _ => None,
    }
}
