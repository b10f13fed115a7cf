//! Logical query plan nodes
//!
//! The LQP is a DAG of shared nodes (`Rc<LqpNode>`). Inputs are strong
//! references, output back-pointers are weak. Interior mutability via
//! `RefCell` is safe because optimizer passes run single-threaded; the
//! executor never touches LQP nodes.

mod column_reference;

#[cfg(test)]
mod tests;

pub use column_reference::{column_reference_of, LqpColumnReference};

use std::cell::{Cell, RefCell};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use strata_storage::StorageManager;
use strata_types::{ColumnId, JoinMode, PredicateCondition, SetOperationMode, SortMode};

use crate::expression::{
    expressions_equal, expressions_equal_across_plans, hash_expression_into, is_nullable_on_lqp,
    rewrite_expression, Expression, ExpressionRef,
};

pub type LqpNodeRef = Rc<LqpNode>;
pub type LqpNodeWeak = Weak<LqpNode>;

/// Maps nodes of one plan to their counterparts in another (deep copies,
/// cross-plan equality).
pub type NodeMapping = HashMap<*const LqpNode, LqpNodeRef>;

/// Which input of a node a relation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSide {
    Left,
    Right,
}

impl InputSide {
    fn index(self) -> usize {
        match self {
            InputSide::Left => 0,
            InputSide::Right => 1,
        }
    }
}

/// Result of resolving an expression to an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnLookup {
    Resolved(ColumnId),
    /// The expression matches columns on both join sides and carries no
    /// lineage to pick one.
    Ambiguous,
    NotFound,
}

/// The typed payload of an LQP node.
#[derive(Debug)]
pub enum LqpNodeKind {
    StoredTable {
        table_name: String,
        /// Original column ids projected away by the column pruning rule.
        pruned_column_ids: RefCell<Vec<ColumnId>>,
    },
    Predicate,
    Projection,
    Aggregate {
        /// The first `group_by_count` node expressions are group-by columns,
        /// the rest are aggregate expressions.
        group_by_count: Cell<usize>,
    },
    Join {
        join_mode: JoinMode,
    },
    Sort {
        /// Parallel to the node expressions.
        sort_modes: RefCell<Vec<SortMode>>,
    },
    Union {
        set_operation_mode: SetOperationMode,
    },
    Limit,
    Root,
}

impl LqpNodeKind {
    fn tag(&self) -> u8 {
        match self {
            LqpNodeKind::StoredTable { .. } => 0,
            LqpNodeKind::Predicate => 1,
            LqpNodeKind::Projection => 2,
            LqpNodeKind::Aggregate { .. } => 3,
            LqpNodeKind::Join { .. } => 4,
            LqpNodeKind::Sort { .. } => 5,
            LqpNodeKind::Union { .. } => 6,
            LqpNodeKind::Limit => 7,
            LqpNodeKind::Root => 8,
        }
    }

    fn clone_payload(&self) -> LqpNodeKind {
        match self {
            LqpNodeKind::StoredTable { table_name, pruned_column_ids } => {
                LqpNodeKind::StoredTable {
                    table_name: table_name.clone(),
                    pruned_column_ids: RefCell::new(pruned_column_ids.borrow().clone()),
                }
            }
            LqpNodeKind::Predicate => LqpNodeKind::Predicate,
            LqpNodeKind::Projection => LqpNodeKind::Projection,
            LqpNodeKind::Aggregate { group_by_count } => {
                LqpNodeKind::Aggregate { group_by_count: Cell::new(group_by_count.get()) }
            }
            LqpNodeKind::Join { join_mode } => LqpNodeKind::Join { join_mode: *join_mode },
            LqpNodeKind::Sort { sort_modes } => {
                LqpNodeKind::Sort { sort_modes: RefCell::new(sort_modes.borrow().clone()) }
            }
            LqpNodeKind::Union { set_operation_mode } => {
                LqpNodeKind::Union { set_operation_mode: *set_operation_mode }
            }
            LqpNodeKind::Limit => LqpNodeKind::Limit,
            LqpNodeKind::Root => LqpNodeKind::Root,
        }
    }

    fn shallow_equals(&self, other: &LqpNodeKind) -> bool {
        match (self, other) {
            (
                LqpNodeKind::StoredTable { table_name: name_a, pruned_column_ids: pruned_a },
                LqpNodeKind::StoredTable { table_name: name_b, pruned_column_ids: pruned_b },
            ) => name_a == name_b && *pruned_a.borrow() == *pruned_b.borrow(),
            (
                LqpNodeKind::Aggregate { group_by_count: count_a },
                LqpNodeKind::Aggregate { group_by_count: count_b },
            ) => count_a.get() == count_b.get(),
            (
                LqpNodeKind::Join { join_mode: mode_a },
                LqpNodeKind::Join { join_mode: mode_b },
            ) => mode_a == mode_b,
            (
                LqpNodeKind::Sort { sort_modes: modes_a },
                LqpNodeKind::Sort { sort_modes: modes_b },
            ) => *modes_a.borrow() == *modes_b.borrow(),
            (
                LqpNodeKind::Union { set_operation_mode: mode_a },
                LqpNodeKind::Union { set_operation_mode: mode_b },
            ) => mode_a == mode_b,
            _ => self.tag() == other.tag(),
        }
    }

    fn hash_shallow<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        match self {
            LqpNodeKind::StoredTable { table_name, pruned_column_ids } => {
                table_name.hash(state);
                pruned_column_ids.borrow().hash(state);
            }
            LqpNodeKind::Aggregate { group_by_count } => group_by_count.get().hash(state),
            LqpNodeKind::Join { join_mode } => join_mode.hash(state),
            LqpNodeKind::Sort { sort_modes } => sort_modes.borrow().hash(state),
            LqpNodeKind::Union { set_operation_mode } => set_operation_mode.hash(state),
            _ => {}
        }
    }
}

/// One node of a logical query plan.
#[derive(Debug)]
pub struct LqpNode {
    kind: LqpNodeKind,
    inputs: RefCell<[Option<LqpNodeRef>; 2]>,
    outputs: RefCell<Vec<LqpNodeWeak>>,
    expressions: RefCell<Vec<ExpressionRef>>,
}

impl LqpNode {
    fn make(kind: LqpNodeKind, expressions: Vec<ExpressionRef>) -> LqpNodeRef {
        Rc::new(LqpNode {
            kind,
            inputs: RefCell::new([None, None]),
            outputs: RefCell::new(Vec::new()),
            expressions: RefCell::new(expressions),
        })
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn stored_table(table_name: impl Into<String>) -> LqpNodeRef {
        LqpNode::make(
            LqpNodeKind::StoredTable {
                table_name: table_name.into(),
                pruned_column_ids: RefCell::new(Vec::new()),
            },
            Vec::new(),
        )
    }

    pub fn predicate(predicate: ExpressionRef, input: &LqpNodeRef) -> LqpNodeRef {
        let node = LqpNode::make(LqpNodeKind::Predicate, vec![predicate]);
        node.set_left_input(Some(input.clone()));
        node
    }

    pub fn projection(expressions: Vec<ExpressionRef>, input: &LqpNodeRef) -> LqpNodeRef {
        let node = LqpNode::make(LqpNodeKind::Projection, expressions);
        node.set_left_input(Some(input.clone()));
        node
    }

    pub fn aggregate(
        group_by: Vec<ExpressionRef>,
        aggregates: Vec<ExpressionRef>,
        input: &LqpNodeRef,
    ) -> LqpNodeRef {
        assert!(
            aggregates.iter().all(|expression| expression.is_aggregate()),
            "aggregate node requires aggregate expressions after the group-by columns"
        );
        let group_by_count = group_by.len();
        let mut expressions = group_by;
        expressions.extend(aggregates);
        let node = LqpNode::make(
            LqpNodeKind::Aggregate { group_by_count: Cell::new(group_by_count) },
            expressions,
        );
        node.set_left_input(Some(input.clone()));
        node
    }

    pub fn join(
        join_mode: JoinMode,
        join_predicates: Vec<ExpressionRef>,
        left: &LqpNodeRef,
        right: &LqpNodeRef,
    ) -> LqpNodeRef {
        if join_mode == JoinMode::Cross {
            assert!(join_predicates.is_empty(), "cross joins take no predicate");
        } else {
            assert!(!join_predicates.is_empty(), "non-cross joins require predicates");
        }
        let node = LqpNode::make(LqpNodeKind::Join { join_mode }, join_predicates);
        node.set_left_input(Some(left.clone()));
        node.set_right_input(Some(right.clone()));
        node
    }

    pub fn sort(
        expressions: Vec<ExpressionRef>,
        sort_modes: Vec<SortMode>,
        input: &LqpNodeRef,
    ) -> LqpNodeRef {
        assert_eq!(expressions.len(), sort_modes.len(), "one sort mode per sort expression");
        let node = LqpNode::make(
            LqpNodeKind::Sort { sort_modes: RefCell::new(sort_modes) },
            expressions,
        );
        node.set_left_input(Some(input.clone()));
        node
    }

    pub fn union(
        set_operation_mode: SetOperationMode,
        left: &LqpNodeRef,
        right: &LqpNodeRef,
    ) -> LqpNodeRef {
        let node = LqpNode::make(LqpNodeKind::Union { set_operation_mode }, Vec::new());
        node.set_left_input(Some(left.clone()));
        node.set_right_input(Some(right.clone()));
        node
    }

    pub fn limit(num_rows: ExpressionRef, input: &LqpNodeRef) -> LqpNodeRef {
        let node = LqpNode::make(LqpNodeKind::Limit, vec![num_rows]);
        node.set_left_input(Some(input.clone()));
        node
    }

    pub fn root(input: &LqpNodeRef) -> LqpNodeRef {
        let node = LqpNode::make(LqpNodeKind::Root, Vec::new());
        node.set_left_input(Some(input.clone()));
        node
    }

    // ------------------------------------------------------------------
    // Structure accessors
    // ------------------------------------------------------------------

    pub fn kind(&self) -> &LqpNodeKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        match &self.kind {
            LqpNodeKind::StoredTable { .. } => "StoredTable",
            LqpNodeKind::Predicate => "Predicate",
            LqpNodeKind::Projection => "Projection",
            LqpNodeKind::Aggregate { .. } => "Aggregate",
            LqpNodeKind::Join { .. } => "Join",
            LqpNodeKind::Sort { .. } => "Sort",
            LqpNodeKind::Union { .. } => "Union",
            LqpNodeKind::Limit => "Limit",
            LqpNodeKind::Root => "Root",
        }
    }

    pub fn short_description(&self) -> String {
        match &self.kind {
            LqpNodeKind::StoredTable { table_name, .. } => {
                format!("StoredTable({})", table_name)
            }
            LqpNodeKind::Join { join_mode } => format!("Join({})", join_mode),
            _ => self.name().to_string(),
        }
    }

    pub fn description(&self) -> String {
        let expressions = self.expressions.borrow();
        if expressions.is_empty() {
            format!("[{}]", self.short_description())
        } else {
            let rendered: Vec<String> =
                expressions.iter().map(|expression| expression.to_string()).collect();
            format!("[{}] {}", self.short_description(), rendered.join(", "))
        }
    }

    pub fn node_expressions(&self) -> Vec<ExpressionRef> {
        self.expressions.borrow().clone()
    }

    pub fn set_node_expressions(&self, expressions: Vec<ExpressionRef>) {
        *self.expressions.borrow_mut() = expressions;
    }

    pub fn input(&self, side: InputSide) -> Option<LqpNodeRef> {
        self.inputs.borrow()[side.index()].clone()
    }

    pub fn left_input(&self) -> Option<LqpNodeRef> {
        self.input(InputSide::Left)
    }

    pub fn right_input(&self) -> Option<LqpNodeRef> {
        self.input(InputSide::Right)
    }

    pub fn input_count(&self) -> usize {
        self.inputs.borrow().iter().filter(|input| input.is_some()).count()
    }

    /// Rewire one input, maintaining the output back-pointers on both the old
    /// and the new input.
    pub fn set_input(self: &Rc<Self>, side: InputSide, input: Option<LqpNodeRef>) {
        let previous = self.inputs.borrow()[side.index()].clone();
        if let Some(previous) = previous {
            if !input.as_ref().map_or(false, |new| Rc::ptr_eq(new, &previous)) {
                previous.deregister_output(self);
            } else {
                // Same node again; nothing to rewire.
                return;
            }
        }
        if let Some(new_input) = &input {
            new_input.outputs.borrow_mut().push(Rc::downgrade(self));
        }
        self.inputs.borrow_mut()[side.index()] = input;
    }

    pub fn set_left_input(self: &Rc<Self>, input: Option<LqpNodeRef>) {
        self.set_input(InputSide::Left, input);
    }

    pub fn set_right_input(self: &Rc<Self>, input: Option<LqpNodeRef>) {
        self.set_input(InputSide::Right, input);
    }

    fn deregister_output(&self, output: &Rc<LqpNode>) {
        let mut outputs = self.outputs.borrow_mut();
        if let Some(position) = outputs
            .iter()
            .position(|weak| weak.upgrade().map_or(false, |node| Rc::ptr_eq(&node, output)))
        {
            outputs.swap_remove(position);
        }
    }

    /// Live output nodes.
    pub fn outputs(&self) -> Vec<LqpNodeRef> {
        self.outputs.borrow().iter().filter_map(|weak| weak.upgrade()).collect()
    }

    /// Live `(output node, input side)` relations. A node that is both
    /// inputs of the same output appears twice.
    pub fn output_relations(self: &Rc<Self>) -> Vec<(LqpNodeRef, InputSide)> {
        let mut relations = Vec::new();
        for output in self.outputs() {
            for side in [InputSide::Left, InputSide::Right] {
                if output
                    .input(side)
                    .map_or(false, |input| Rc::ptr_eq(&input, self))
                {
                    relations.push((output.clone(), side));
                }
            }
        }
        relations
    }

    // ------------------------------------------------------------------
    // Column interface
    // ------------------------------------------------------------------

    /// The ordered list of expressions this node exposes to its outputs.
    pub fn column_expressions(self: &Rc<Self>) -> Vec<ExpressionRef> {
        match &self.kind {
            LqpNodeKind::StoredTable { table_name, pruned_column_ids } => {
                let table = StorageManager::get()
                    .get_table(table_name)
                    .unwrap_or_else(|_| panic!("stored table '{}' is not registered", table_name));
                let pruned = pruned_column_ids.borrow();
                (0..table.column_count() as u16)
                    .map(ColumnId)
                    .filter(|column_id| !pruned.contains(column_id))
                    .map(|column_id| {
                        Expression::column(LqpColumnReference::new(self, column_id))
                    })
                    .collect()
            }
            LqpNodeKind::Predicate | LqpNodeKind::Sort { .. } | LqpNodeKind::Limit
            | LqpNodeKind::Root => self
                .left_input()
                .expect("node requires an input to expose columns")
                .column_expressions(),
            LqpNodeKind::Projection | LqpNodeKind::Aggregate { .. } => self.node_expressions(),
            LqpNodeKind::Union { .. } => self
                .left_input()
                .expect("union requires inputs")
                .column_expressions(),
            LqpNodeKind::Join { join_mode } => self.join_column_expressions(*join_mode),
        }
    }

    /// Join output columns: left then right expressions. Columns present on
    /// both sides (same original node/id/lineage) are disambiguated by
    /// appending a `(this node, side)` lineage step — on deep copies only,
    /// never by mutating the inputs' expressions.
    fn join_column_expressions(self: &Rc<Self>, join_mode: JoinMode) -> Vec<ExpressionRef> {
        let left_expressions = self
            .left_input()
            .expect("join requires both inputs")
            .column_expressions();
        if join_mode.is_semi_or_anti() {
            return left_expressions;
        }
        let right_expressions = self
            .right_input()
            .expect("join requires both inputs")
            .column_expressions();

        let left_references =
            crate::expression::collect_column_references(&left_expressions);
        let right_references =
            crate::expression::collect_column_references(&right_expressions);
        let ambiguous: HashSet<_> =
            left_references.intersection(&right_references).cloned().collect();

        let mut output = Vec::with_capacity(left_expressions.len() + right_expressions.len());
        if ambiguous.is_empty() {
            output.extend(left_expressions);
            output.extend(right_expressions);
            return output;
        }

        for (expressions, side) in [
            (&left_expressions, InputSide::Left),
            (&right_expressions, InputSide::Right),
        ] {
            for expression in expressions {
                let disambiguated = rewrite_expression(expression, &mut |sub_expression| {
                    match sub_expression.as_ref() {
                        Expression::Column(reference) if ambiguous.contains(reference) => {
                            Some(Expression::column(
                                reference.with_lineage_step(self, side),
                            ))
                        }
                        _ => None,
                    }
                });
                output.push(disambiguated.unwrap_or_else(|| expression.clone()));
            }
        }
        output
    }

    /// Resolve `expression` to an output column id.
    ///
    /// Lineage steps addressed to this node are consumed (on a copy) to pick
    /// the join side. With both sides matching and no lineage to decide, the
    /// result is `Ambiguous`; a miss is `NotFound`.
    pub fn find_column_id(self: &Rc<Self>, expression: &ExpressionRef) -> ColumnLookup {
        let mut disambiguated_side: Option<InputSide> = None;
        let disambiguated = rewrite_expression(expression, &mut |sub_expression| {
            if let Expression::Column(reference) = sub_expression.as_ref() {
                if let Some(side) = reference.lineage_side_for(self) {
                    if disambiguated_side.is_none() {
                        disambiguated_side = Some(side);
                    }
                    return Some(Expression::column(reference.strip_lineage_step(self)));
                }
            }
            None
        });

        let output_expressions = self.column_expressions();
        let left_count = match &self.kind {
            LqpNodeKind::Join { join_mode } if !join_mode.is_semi_or_anti() => self
                .left_input()
                .expect("join requires both inputs")
                .column_expressions()
                .len(),
            _ => output_expressions.len(),
        };

        let mut column_id_on_left: Option<ColumnId> = None;
        let mut column_id_on_right: Option<ColumnId> = None;
        for (index, output_expression) in output_expressions.iter().enumerate() {
            // Outputs of a disambiguating join carry a lineage step for this
            // node; compare them both as-is and with that step stripped, so
            // a bare reference to an ambiguous column is recognized (and
            // reported as ambiguous below).
            let stripped_output = rewrite_expression(output_expression, &mut |sub_expression| {
                match sub_expression.as_ref() {
                    Expression::Column(reference)
                        if reference.lineage_side_for(self).is_some() =>
                    {
                        Some(Expression::column(reference.strip_lineage_step(self)))
                    }
                    _ => None,
                }
            });
            let probe = disambiguated.as_ref().unwrap_or(expression);
            let matches = expressions_equal(output_expression, expression)
                || expressions_equal(output_expression, probe)
                || stripped_output
                    .as_ref()
                    .map_or(false, |stripped| expressions_equal(stripped, probe));
            if !matches {
                continue;
            }
            if index < left_count {
                column_id_on_left = Some(ColumnId(index as u16));
            } else {
                column_id_on_right = Some(ColumnId(index as u16));
            }
        }

        if let Some(left) = column_id_on_left {
            if column_id_on_right.is_none() || disambiguated_side == Some(InputSide::Left) {
                return ColumnLookup::Resolved(left);
            }
        }
        if let Some(right) = column_id_on_right {
            if column_id_on_left.is_none() || disambiguated_side == Some(InputSide::Right) {
                return ColumnLookup::Resolved(right);
            }
        }
        if column_id_on_left.is_some() && column_id_on_right.is_some() {
            ColumnLookup::Ambiguous
        } else {
            ColumnLookup::NotFound
        }
    }

    pub fn is_column_nullable(self: &Rc<Self>, column_id: ColumnId) -> bool {
        match &self.kind {
            LqpNodeKind::StoredTable { table_name, pruned_column_ids } => {
                let table = StorageManager::get()
                    .get_table(table_name)
                    .unwrap_or_else(|_| panic!("stored table '{}' is not registered", table_name));
                let pruned = pruned_column_ids.borrow();
                let original_id = (0..table.column_count() as u16)
                    .map(ColumnId)
                    .filter(|id| !pruned.contains(id))
                    .nth(column_id.as_usize())
                    .expect("column id within output range");
                table.column_is_nullable(original_id)
            }
            LqpNodeKind::Predicate | LqpNodeKind::Sort { .. } | LqpNodeKind::Limit
            | LqpNodeKind::Root => self
                .left_input()
                .expect("node requires an input")
                .is_column_nullable(column_id),
            LqpNodeKind::Projection | LqpNodeKind::Aggregate { .. } => {
                let expressions = self.node_expressions();
                let expression =
                    expressions.get(column_id.as_usize()).expect("column id within range");
                let input = self.left_input().expect("node requires an input");
                is_nullable_on_lqp(expression, &input)
            }
            LqpNodeKind::Union { .. } => {
                let left = self.left_input().expect("union requires inputs");
                let right = self.right_input().expect("union requires inputs");
                left.is_column_nullable(column_id) || right.is_column_nullable(column_id)
            }
            LqpNodeKind::Join { join_mode } => {
                let left = self.left_input().expect("join requires both inputs");
                let left_column_count = left.column_expressions().len();
                let from_left = column_id.as_usize() < left_column_count;
                match join_mode {
                    JoinMode::Left if !from_left => true,
                    JoinMode::Right if from_left => true,
                    JoinMode::FullOuter => true,
                    _ => {
                        if from_left {
                            left.is_column_nullable(column_id)
                        } else {
                            let right = self.right_input().expect("join requires both inputs");
                            right.is_column_nullable(ColumnId(
                                (column_id.as_usize() - left_column_count) as u16,
                            ))
                        }
                    }
                }
            }
        }
    }

    /// Sets of output expressions that are declared (or derived) unique.
    pub fn unique_column_combinations(self: &Rc<Self>) -> Vec<Vec<ExpressionRef>> {
        match &self.kind {
            LqpNodeKind::StoredTable { table_name, pruned_column_ids } => {
                let table = match StorageManager::get().get_table(table_name) {
                    Ok(table) => table,
                    Err(_) => return Vec::new(),
                };
                let pruned = pruned_column_ids.borrow();
                table
                    .soft_key_constraints()
                    .iter()
                    .filter(|constraint| {
                        constraint.columns.iter().all(|column| !pruned.contains(column))
                    })
                    .map(|constraint| {
                        constraint
                            .columns
                            .iter()
                            .map(|&column| {
                                Expression::column(LqpColumnReference::new(self, column))
                            })
                            .collect()
                    })
                    .collect()
            }
            LqpNodeKind::Predicate | LqpNodeKind::Sort { .. } | LqpNodeKind::Limit
            | LqpNodeKind::Root => self
                .left_input()
                .map(|input| input.unique_column_combinations())
                .unwrap_or_default(),
            LqpNodeKind::Projection => {
                let input = match self.left_input() {
                    Some(input) => input,
                    None => return Vec::new(),
                };
                let output = self.column_expressions();
                input
                    .unique_column_combinations()
                    .into_iter()
                    .filter(|combination| combination_exposed(combination, &output))
                    .collect()
            }
            LqpNodeKind::Aggregate { group_by_count } => {
                let mut combinations: Vec<Vec<ExpressionRef>> = Vec::new();
                if let Some(input) = self.left_input() {
                    let output = self.column_expressions();
                    combinations.extend(
                        input
                            .unique_column_combinations()
                            .into_iter()
                            .filter(|combination| combination_exposed(combination, &output)),
                    );
                }
                let group_by_count = group_by_count.get();
                if group_by_count > 0 {
                    let group_by: Vec<ExpressionRef> =
                        self.node_expressions()[..group_by_count].to_vec();
                    combinations.push(group_by);
                }
                combinations
            }
            LqpNodeKind::Join { join_mode } => self.join_unique_column_combinations(*join_mode),
            LqpNodeKind::Union { .. } => Vec::new(),
        }
    }

    fn join_unique_column_combinations(
        self: &Rc<Self>,
        join_mode: JoinMode,
    ) -> Vec<Vec<ExpressionRef>> {
        let left = match self.left_input() {
            Some(left) => left,
            None => return Vec::new(),
        };
        if join_mode.is_semi_or_anti() {
            return left.unique_column_combinations();
        }
        if join_mode != JoinMode::Inner {
            return Vec::new();
        }
        let right = match self.right_input() {
            Some(right) => right,
            None => return Vec::new(),
        };

        // Collect the equi-join keys per side.
        let mut left_keys: Vec<ExpressionRef> = Vec::new();
        let mut right_keys: Vec<ExpressionRef> = Vec::new();
        for predicate in self.node_expressions() {
            if let Expression::Predicate { condition: PredicateCondition::Equals, arguments } =
                predicate.as_ref()
            {
                if arguments.len() == 2 {
                    for argument in arguments {
                        if matches!(
                            left.find_column_id(argument),
                            ColumnLookup::Resolved(_)
                        ) {
                            left_keys.push(argument.clone());
                        } else if matches!(
                            right.find_column_id(argument),
                            ColumnLookup::Resolved(_)
                        ) {
                            right_keys.push(argument.clone());
                        }
                    }
                }
            }
        }

        let mut combinations = Vec::new();
        // Joining on a key that is unique on the right side cannot duplicate
        // left rows, so the left side's combinations survive (and vice
        // versa).
        if right
            .unique_column_combinations()
            .iter()
            .any(|combination| combination_exposed(combination, &right_keys))
        {
            combinations.extend(left.unique_column_combinations());
        }
        if left
            .unique_column_combinations()
            .iter()
            .any(|combination| combination_exposed(combination, &left_keys))
        {
            combinations.extend(right.unique_column_combinations());
        }
        combinations
    }

    // ------------------------------------------------------------------
    // Hashing, equality, copying
    // ------------------------------------------------------------------

    /// Recursive structural hash of the sub-plan rooted here. Column
    /// references hash by column id only, so equal-but-not-identical
    /// sub-plans collide into the same hash and equality decides.
    pub fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_into(&mut hasher);
        hasher.finish()
    }

    fn hash_into<H: Hasher>(&self, state: &mut H) {
        self.kind.hash_shallow(state);
        for expression in self.expressions.borrow().iter() {
            hash_expression_into(expression, state);
        }
        for input in self.inputs.borrow().iter() {
            match input {
                Some(input) => input.hash_into(state),
                None => 0u8.hash(state),
            }
        }
    }

    /// Deep copy of the sub-plan rooted here, re-targeting column references
    /// (including lineage) onto the copied nodes.
    pub fn deep_copy(self: &Rc<Self>) -> LqpNodeRef {
        let mut mapping = NodeMapping::new();
        self.deep_copy_with_mapping(&mut mapping)
    }

    pub fn deep_copy_with_mapping(self: &Rc<Self>, mapping: &mut NodeMapping) -> LqpNodeRef {
        if let Some(copied) = mapping.get(&Rc::as_ptr(self)) {
            return copied.clone();
        }
        let left = self.left_input().map(|input| input.deep_copy_with_mapping(mapping));
        let right = self.right_input().map(|input| input.deep_copy_with_mapping(mapping));

        let copy = LqpNode::make(self.kind.clone_payload(), Vec::new());
        copy.set_left_input(left);
        copy.set_right_input(right);
        mapping.insert(Rc::as_ptr(self), copy.clone());

        let adapted = self
            .node_expressions()
            .iter()
            .map(|expression| adapt_expression_to_copied_plan(expression, mapping))
            .collect();
        copy.set_node_expressions(adapted);
        copy
    }
}

/// Whether every expression of `combination` occurs in `exposed`.
fn combination_exposed(combination: &[ExpressionRef], exposed: &[ExpressionRef]) -> bool {
    combination.iter().all(|expression| {
        exposed.iter().any(|candidate| expressions_equal(candidate, expression))
    })
}

/// Re-target an expression's column references and subquery plans onto the
/// nodes in `mapping`. Returns the original when nothing needed adapting.
pub fn adapt_expression_to_copied_plan(
    expression: &ExpressionRef,
    mapping: &mut NodeMapping,
) -> ExpressionRef {
    let rewritten = rewrite_expression(expression, &mut |sub_expression| {
        match sub_expression.as_ref() {
            Expression::Column(reference) => {
                let original = reference.original_node()?;
                let mapped_original = mapping.get(&Rc::as_ptr(&original)).cloned();
                let mut lineage_mapped = false;
                let new_lineage: Vec<(LqpNodeWeak, InputSide)> = reference
                    .lineage()
                    .iter()
                    .map(|(step, side)| {
                        let step_node = step.upgrade();
                        match step_node
                            .as_ref()
                            .and_then(|node| mapping.get(&Rc::as_ptr(node)))
                        {
                            Some(mapped) => {
                                lineage_mapped = true;
                                (Rc::downgrade(mapped), *side)
                            }
                            None => (step.clone(), *side),
                        }
                    })
                    .collect();
                match (&mapped_original, lineage_mapped) {
                    (None, false) => None,
                    _ => {
                        let base = match mapped_original {
                            Some(mapped) => LqpColumnReference::new(
                                &mapped,
                                reference.original_column_id(),
                            ),
                            None => reference.without_lineage(),
                        };
                        Some(Expression::column(base.with_lineage(new_lineage)))
                    }
                }
            }
            Expression::Subquery { root, parameters } => {
                // Subquery plans are copied alongside, sharing the mapping so
                // correlated references resolve against the copied outer
                // plan. Parameters are outer-scope expressions and are
                // adapted the same way.
                let copied_root = root.deep_copy_with_mapping(mapping);
                let adapted_parameters = parameters
                    .iter()
                    .map(|parameter| adapt_expression_to_copied_plan(parameter, mapping))
                    .collect();
                Some(Expression::subquery(copied_root, adapted_parameters))
            }
            _ => None,
        }
    });
    rewritten.unwrap_or_else(|| expression.clone())
}

/// Structural equality of two sub-plans (node mapping built during the
/// recursion, so independently built but identical plans compare equal).
pub fn subplans_equal(a: &LqpNodeRef, b: &LqpNodeRef) -> bool {
    let mut mapping = NodeMapping::new();
    subplans_equal_with_mapping(a, b, &mut mapping)
}

fn subplans_equal_with_mapping(
    a: &LqpNodeRef,
    b: &LqpNodeRef,
    mapping: &mut NodeMapping,
) -> bool {
    if Rc::ptr_eq(a, b) {
        mapping.insert(Rc::as_ptr(a), b.clone());
        return true;
    }
    if !a.kind.shallow_equals(&b.kind) {
        return false;
    }
    for side in [InputSide::Left, InputSide::Right] {
        match (a.input(side), b.input(side)) {
            (None, None) => {}
            (Some(input_a), Some(input_b)) => {
                if !subplans_equal_with_mapping(&input_a, &input_b, mapping) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    mapping.insert(Rc::as_ptr(a), b.clone());

    let expressions_a = a.node_expressions();
    let expressions_b = b.node_expressions();
    expressions_a.len() == expressions_b.len()
        && expressions_a
            .iter()
            .zip(&expressions_b)
            .all(|(ea, eb)| expressions_equal_across_plans(ea, eb, mapping))
}

// ----------------------------------------------------------------------
// Traversal and plan surgery
// ----------------------------------------------------------------------

/// Visitor verdict for [`visit_lqp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LqpVisitation {
    VisitInputs,
    DoNotVisitInputs,
}

/// Pre-order traversal from the root towards the leaves. Shared sub-plans
/// are visited once.
pub fn visit_lqp<F>(root: &LqpNodeRef, mut visitor: F)
where
    F: FnMut(&LqpNodeRef) -> LqpVisitation,
{
    let mut visited: HashSet<*const LqpNode> = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if !visited.insert(Rc::as_ptr(&node)) {
            continue;
        }
        if visitor(&node) == LqpVisitation::DoNotVisitInputs {
            continue;
        }
        // Push right first so the left input is visited first.
        if let Some(right) = node.right_input() {
            stack.push(right);
        }
        if let Some(left) = node.left_input() {
            stack.push(left);
        }
    }
}

/// Visitor verdict for [`visit_lqp_upwards`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LqpUpwardVisitation {
    VisitOutputs,
    DoNotVisitOutputs,
}

/// Traversal from a node towards the plan root along output pointers.
pub fn visit_lqp_upwards<F>(node: &LqpNodeRef, mut visitor: F)
where
    F: FnMut(&LqpNodeRef) -> LqpUpwardVisitation,
{
    let mut visited: HashSet<*const LqpNode> = HashSet::new();
    let mut stack = vec![node.clone()];
    while let Some(node) = stack.pop() {
        if !visited.insert(Rc::as_ptr(&node)) {
            continue;
        }
        if visitor(&node) == LqpUpwardVisitation::DoNotVisitOutputs {
            continue;
        }
        stack.extend(node.outputs());
    }
}

/// Unlink a single-input node, connecting its input to all its outputs.
pub fn remove_node_from_plan(node: &LqpNodeRef) {
    debug_assert!(node.right_input().is_none(), "only single-input nodes can be removed");
    let input = node.left_input();
    for (output, side) in node.output_relations() {
        output.set_input(side, input.clone());
    }
    node.set_left_input(None);
}

/// Put `new_node` between `node` and all of `node`'s *other* outputs
/// (`new_node` may already have been built on top of `node`).
pub fn insert_node_above(node: &LqpNodeRef, new_node: &LqpNodeRef) {
    let relations = node.output_relations();
    for (output, side) in relations {
        if Rc::ptr_eq(&output, new_node) {
            continue;
        }
        output.set_input(side, Some(new_node.clone()));
    }
    new_node.set_left_input(Some(node.clone()));
}

/// Put `new_node` between `parent` and its `side` input.
pub fn insert_node_below(parent: &LqpNodeRef, side: InputSide, new_node: &LqpNodeRef) {
    let old_input = parent.input(side);
    new_node.set_left_input(old_input);
    parent.set_input(side, Some(new_node.clone()));
}
