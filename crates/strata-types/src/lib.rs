//! Types - Scalar Type System and Typed Identifiers
//!
//! This crate provides the closed set of column data types, the tagged
//! variant value that carries one typed value or NULL, and the typed
//! identifiers (column, chunk, row) shared by the storage and execution
//! layers.

mod data_type;
mod ids;
mod modes;
mod variant;

pub use data_type::DataType;
pub use ids::{
    ChunkId, ChunkOffset, ColumnId, CommitId, RowId, ValueId, INVALID_CHUNK_OFFSET, NULL_ROW_ID,
};
pub use modes::{JoinMode, PredicateCondition, SetOperationMode, SortMode};
pub use variant::AllTypeVariant;
