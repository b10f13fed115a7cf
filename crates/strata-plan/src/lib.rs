//! Plan - Logical Query Plans and Optimization
//!
//! This crate provides the expression trees, the logical query plan (LQP)
//! node DAG with lineage-carrying column references, and the optimizer rule
//! pipeline that rewrites plans before translation into physical operators.

pub mod error;
pub mod expression;
pub mod lqp;
pub mod optimizer;

pub use error::PlanError;
pub use expression::{
    collect_column_references, expression_data_type, expressions_equal,
    expressions_equal_across_plans, hash_expression, is_nullable_on_lqp, rewrite_expression,
    visit_expression, AggregateFunction, ArithmeticOperator, Expression, ExpressionRef,
    ExpressionVisitation, LogicalOperator, ParameterId,
};
pub use lqp::{
    adapt_expression_to_copied_plan, column_reference_of, insert_node_above, insert_node_below,
    remove_node_from_plan, subplans_equal, visit_lqp, visit_lqp_upwards, ColumnLookup, InputSide,
    LqpColumnReference, LqpNode, LqpNodeKind, LqpNodeRef, LqpNodeWeak, LqpUpwardVisitation,
    LqpVisitation, NodeMapping,
};
pub use optimizer::{Optimizer, OptimizerRule};

/// Standard plan result alias.
pub type Result<T> = std::result::Result<T, PlanError>;
