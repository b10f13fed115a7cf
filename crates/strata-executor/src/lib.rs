//! Executor - Physical Query Execution
//!
//! This crate provides the physical operators that execute optimized logical
//! plans against the columnar storage layer, the translator that maps LQP
//! nodes to operator DAGs, and the task scheduler driving execution.

pub mod errors;
pub mod evaluator;
pub mod operator;
pub mod operators;
pub mod parallel;
pub mod profiling;
pub mod scheduler;
pub mod translator;

mod reference_output;

#[cfg(test)]
mod tests;

pub use errors::ExecutorError;
pub use evaluator::{PqpExpression, PqpExpressionRef};
pub use operator::{
    input_table, operator_ref, DescriptionMode, Operator, OperatorRef, OperatorState,
};
pub use operators::{
    AggregateDefinition, AggregateHash, AggregateSort, Difference, GetTable, JoinHash,
    JoinNestedLoop, JoinPredicate, JoinSortMerge, Limit, Projection, Sort, SortDefinition,
    TableScan, TableWrapper, UnionAll, UnionPositions,
};
pub use parallel::ParallelConfig;
pub use scheduler::{
    execute_plan, execute_plan_default, tasks_from_plan, ImmediateScheduler, OperatorTask,
    Scheduler,
};
#[cfg(feature = "parallel")]
pub use scheduler::PoolScheduler;
pub use translator::LqpTranslator;

/// Standard executor result alias.
pub type Result<T> = std::result::Result<T, ExecutorError>;
