//! Tables: column definitions plus an ordered sequence of chunks

use std::sync::Arc;

use parking_lot::RwLock;
use strata_types::{AllTypeVariant, ChunkId, ChunkOffset, ColumnId, DataType, RowId};

use crate::chunk::Chunk;
use crate::error::StorageError;
use crate::segment::{Segment, ValueSegment};

/// Default number of rows per chunk.
pub const DEFAULT_TARGET_CHUNK_SIZE: ChunkOffset = 65_535;

/// Definition of one table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        ColumnDefinition { name: name.into(), data_type, nullable }
    }
}

/// Whether a table owns its data or references another table's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    Data,
    References,
}

/// Kind of a soft key constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyConstraintType {
    Unique,
    PrimaryKey,
}

/// A declared (not enforced) uniqueness constraint over a set of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKeyConstraint {
    pub columns: Vec<ColumnId>,
    pub constraint_type: KeyConstraintType,
}

/// An ordered sequence of chunks plus column definitions and soft key
/// constraints.
///
/// The chunk list is behind a read-mostly lock, taken for writing only when
/// appending chunks. Chunks themselves are immutable once finalized and are
/// shared with readers via `Arc`.
#[derive(Debug)]
pub struct Table {
    column_definitions: Vec<ColumnDefinition>,
    table_type: TableType,
    target_chunk_size: ChunkOffset,
    chunks: RwLock<Vec<Arc<Chunk>>>,
    key_constraints: RwLock<Vec<TableKeyConstraint>>,
}

impl Table {
    pub fn new(
        column_definitions: Vec<ColumnDefinition>,
        table_type: TableType,
        target_chunk_size: ChunkOffset,
    ) -> Self {
        Table {
            column_definitions,
            table_type,
            target_chunk_size,
            chunks: RwLock::new(Vec::new()),
            key_constraints: RwLock::new(Vec::new()),
        }
    }

    pub fn new_data(column_definitions: Vec<ColumnDefinition>) -> Self {
        Table::new(column_definitions, TableType::Data, DEFAULT_TARGET_CHUNK_SIZE)
    }

    pub fn column_definitions(&self) -> &[ColumnDefinition] {
        &self.column_definitions
    }

    pub fn column_count(&self) -> usize {
        self.column_definitions.len()
    }

    pub fn column_name(&self, column_id: ColumnId) -> &str {
        &self.column_definitions[column_id.as_usize()].name
    }

    pub fn column_data_type(&self, column_id: ColumnId) -> DataType {
        self.column_definitions[column_id.as_usize()].data_type
    }

    pub fn column_is_nullable(&self, column_id: ColumnId) -> bool {
        self.column_definitions[column_id.as_usize()].nullable
    }

    pub fn column_id_by_name(&self, name: &str) -> Option<ColumnId> {
        self.column_definitions
            .iter()
            .position(|definition| definition.name == name)
            .map(|index| ColumnId(index as u16))
    }

    pub fn table_type(&self) -> TableType {
        self.table_type
    }

    pub fn target_chunk_size(&self) -> ChunkOffset {
        self.target_chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn get_chunk(&self, chunk_id: ChunkId) -> Option<Arc<Chunk>> {
        self.chunks.read().get(chunk_id.as_usize()).cloned()
    }

    pub fn chunks(&self) -> Vec<Arc<Chunk>> {
        self.chunks.read().clone()
    }

    pub fn row_count(&self) -> u64 {
        self.chunks.read().iter().map(|chunk| chunk.size() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Append a complete chunk built from `segments`. The chunk is finalized
    /// on the way in; mutable tail chunks exist only via `append_row`.
    pub fn append_chunk(&self, segments: Vec<Arc<Segment>>) -> Result<ChunkId, StorageError> {
        self.validate_segments(&segments)?;
        let mut chunk = Chunk::new(segments)?;
        chunk.finalize();
        self.append_prepared_chunk(chunk)
    }

    /// Append an already assembled chunk (e.g. one carrying ordering
    /// metadata). The chunk must be finalized.
    pub fn append_prepared_chunk(&self, chunk: Chunk) -> Result<ChunkId, StorageError> {
        if chunk.is_mutable() {
            return Err(StorageError::InvalidEncoding(
                "appended chunks must be finalized".to_string(),
            ));
        }
        if chunk.column_count() != self.column_count() {
            return Err(StorageError::ColumnCountMismatch {
                expected: self.column_count(),
                actual: chunk.column_count(),
            });
        }
        let mut chunks = self.chunks.write();
        chunks.push(Arc::new(chunk));
        Ok(ChunkId(chunks.len() as u32 - 1))
    }

    /// Append one row, growing a mutable tail chunk and cutting it over at
    /// the target chunk size. Data tables only.
    pub fn append_row(&self, values: Vec<AllTypeVariant>) -> Result<(), StorageError> {
        if self.table_type != TableType::Data {
            return Err(StorageError::InvalidEncoding(
                "rows can only be appended to data tables".to_string(),
            ));
        }
        if values.len() != self.column_count() {
            return Err(StorageError::ColumnCountMismatch {
                expected: self.column_count(),
                actual: values.len(),
            });
        }
        for (definition, value) in self.column_definitions.iter().zip(&values) {
            if value.is_null() {
                if !definition.nullable {
                    return Err(StorageError::NullConstraintViolation {
                        column: definition.name.clone(),
                    });
                }
            } else if value.data_type() != definition.data_type {
                return Err(StorageError::TypeMismatch {
                    column: definition.name.clone(),
                    expected: definition.data_type,
                    actual: value.data_type(),
                });
            }
        }

        let mut chunks = self.chunks.write();
        let needs_new_chunk = match chunks.last() {
            Some(last) => !last.is_mutable() || last.size() >= self.target_chunk_size,
            None => true,
        };
        if needs_new_chunk {
            let segments = self
                .column_definitions
                .iter()
                .map(|definition| {
                    Arc::new(Segment::Value(ValueSegment::new(
                        definition.data_type,
                        definition.nullable,
                    )))
                })
                .collect();
            chunks.push(Arc::new(Chunk::new(segments)?));
        }
        let last = chunks.last_mut().expect("tail chunk exists");
        let chunk = Arc::get_mut(last).ok_or(StorageError::ChunkFinalized)?;
        chunk.append(&values)
    }

    /// Finalize the mutable tail chunk, if any.
    pub fn finalize_last_chunk(&self) {
        let mut chunks = self.chunks.write();
        if let Some(last) = chunks.last_mut() {
            if last.is_mutable() {
                if let Some(chunk) = Arc::get_mut(last) {
                    chunk.finalize();
                }
            }
        }
    }

    /// The value of one cell.
    pub fn get_value(&self, column_id: ColumnId, row_id: RowId) -> Option<AllTypeVariant> {
        if row_id.is_null() {
            return Some(AllTypeVariant::Null);
        }
        let chunk = self.get_chunk(row_id.chunk_id)?;
        let segment = chunk.get_segment(column_id)?;
        if (row_id.chunk_offset as usize) < segment.len() {
            Some(segment.get(row_id.chunk_offset))
        } else {
            None
        }
    }

    /// Materialize all rows; test and debugging helper.
    pub fn rows(&self) -> Vec<Vec<AllTypeVariant>> {
        let mut rows = Vec::new();
        for chunk in self.chunks.read().iter() {
            for offset in 0..chunk.size() {
                let row = chunk
                    .segments()
                    .iter()
                    .map(|segment| segment.get(offset))
                    .collect();
                rows.push(row);
            }
        }
        rows
    }

    /// Declare a soft uniqueness constraint over `columns`; `is_primary_key`
    /// marks it as the primary key (at most one per table).
    pub fn add_soft_unique_constraint(
        &self,
        columns: Vec<ColumnId>,
        is_primary_key: bool,
    ) -> Result<(), StorageError> {
        if columns.is_empty() {
            return Err(StorageError::InvalidConstraint("empty column set".to_string()));
        }
        for column in &columns {
            if column.as_usize() >= self.column_count() {
                return Err(StorageError::ColumnIndexOutOfBounds {
                    index: column.as_usize(),
                    column_count: self.column_count(),
                });
            }
            if is_primary_key && self.column_is_nullable(*column) {
                return Err(StorageError::InvalidConstraint(format!(
                    "primary key column '{}' must not be nullable",
                    self.column_name(*column)
                )));
            }
        }
        let mut sorted_columns = columns;
        sorted_columns.sort_unstable();
        sorted_columns.dedup();

        let mut constraints = self.key_constraints.write();
        if constraints.iter().any(|c| c.columns == sorted_columns) {
            return Err(StorageError::InvalidConstraint(
                "constraint over these columns already exists".to_string(),
            ));
        }
        if is_primary_key
            && constraints.iter().any(|c| c.constraint_type == KeyConstraintType::PrimaryKey)
        {
            return Err(StorageError::InvalidConstraint(
                "table already has a primary key".to_string(),
            ));
        }
        constraints.push(TableKeyConstraint {
            columns: sorted_columns,
            constraint_type: if is_primary_key {
                KeyConstraintType::PrimaryKey
            } else {
                KeyConstraintType::Unique
            },
        });
        Ok(())
    }

    pub fn soft_key_constraints(&self) -> Vec<TableKeyConstraint> {
        self.key_constraints.read().clone()
    }

    fn validate_segments(&self, segments: &[Arc<Segment>]) -> Result<(), StorageError> {
        if segments.len() != self.column_count() {
            return Err(StorageError::ColumnCountMismatch {
                expected: self.column_count(),
                actual: segments.len(),
            });
        }
        for (definition, segment) in self.column_definitions.iter().zip(segments) {
            match self.table_type {
                TableType::Data => {
                    if segment.is_reference() {
                        return Err(StorageError::InvalidEncoding(
                            "data tables cannot hold reference segments".to_string(),
                        ));
                    }
                }
                TableType::References => {
                    if !segment.is_reference() {
                        return Err(StorageError::InvalidEncoding(
                            "reference tables hold only reference segments".to_string(),
                        ));
                    }
                }
            }
            if segment.data_type() != definition.data_type {
                return Err(StorageError::TypeMismatch {
                    column: definition.name.clone(),
                    expected: definition.data_type,
                    actual: segment.data_type(),
                });
            }
        }
        Ok(())
    }

    pub fn estimate_memory_usage(&self) -> usize {
        self.chunks.read().iter().map(|chunk| chunk.estimate_memory_usage()).sum()
    }
}
