//! Storage - Columnar Chunk Storage
//!
//! This crate provides the in-memory columnar storage model: tables made of
//! chunks, chunks made of same-length segments, segment encodings (plain,
//! dictionary, run-length, frame-of-reference, reference), position lists and
//! per-segment pruning statistics.

pub mod chunk;
pub mod encoding;
pub mod error;
pub mod meta_tables;
pub mod pos_list;
pub mod segment;
pub mod statistics;
pub mod storage_manager;
pub mod table;
pub mod typed_values;

pub use chunk::{Chunk, OrderedBy};
pub use encoding::{ChunkEncoder, EncodingType, SegmentEncodingSpec, VectorCompressionType};
pub use error::StorageError;
pub use pos_list::PosList;
pub use segment::{
    BitPackedVector, CompressedVector, DictionarySegment, DictionaryView,
    FixedStringDictionarySegment, FrameOfReferenceSegment, ReferenceSegment, RunLengthSegment,
    Segment, ValueSegment,
};
pub use statistics::{MinMaxFilter, RangeFilter, SegmentStatistics};
pub use storage_manager::StorageManager;
pub use table::{ColumnDefinition, KeyConstraintType, Table, TableKeyConstraint, TableType};
pub use typed_values::TypedValues;

/// Standard storage result alias.
pub type Result<T> = std::result::Result<T, StorageError>;
