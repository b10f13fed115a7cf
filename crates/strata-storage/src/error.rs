// ============================================================================
// Errors
// ============================================================================

use strata_types::DataType;

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    TableNotFound(String),
    TableAlreadyExists(String),
    ColumnCountMismatch { expected: usize, actual: usize },
    ColumnIndexOutOfBounds { index: usize, column_count: usize },
    ChunkIndexOutOfBounds { index: usize, chunk_count: usize },
    SegmentLengthMismatch { expected: usize, actual: usize },
    TypeMismatch { column: String, expected: DataType, actual: DataType },
    NullConstraintViolation { column: String },
    ChunkFinalized,
    InvalidEncoding(String),
    InvalidConstraint(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::TableNotFound(name) => write!(f, "Table '{}' not found", name),
            StorageError::TableAlreadyExists(name) => {
                write!(f, "Table '{}' already exists", name)
            }
            StorageError::ColumnCountMismatch { expected, actual } => {
                write!(f, "Column count mismatch: expected {}, got {}", expected, actual)
            }
            StorageError::ColumnIndexOutOfBounds { index, column_count } => {
                write!(f, "Column index {} out of bounds ({} columns)", index, column_count)
            }
            StorageError::ChunkIndexOutOfBounds { index, chunk_count } => {
                write!(f, "Chunk index {} out of bounds ({} chunks)", index, chunk_count)
            }
            StorageError::SegmentLengthMismatch { expected, actual } => {
                write!(f, "Segment length mismatch: expected {} rows, got {}", expected, actual)
            }
            StorageError::TypeMismatch { column, expected, actual } => {
                write!(
                    f,
                    "Type mismatch in column '{}': expected {}, got {}",
                    column, expected, actual
                )
            }
            StorageError::NullConstraintViolation { column } => {
                write!(f, "NOT NULL constraint violation: column '{}' cannot be NULL", column)
            }
            StorageError::ChunkFinalized => {
                write!(f, "Chunk is finalized and can no longer be modified")
            }
            StorageError::InvalidEncoding(msg) => write!(f, "Invalid encoding: {}", msg),
            StorageError::InvalidConstraint(msg) => write!(f, "Invalid constraint: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}
