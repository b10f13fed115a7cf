#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// Operators are single-shot; a second `execute()` is a defined error.
    AlreadyExecuted,
    /// `get_output()` before `execute()`.
    NotExecuted,
    /// Execution observed the cancellation flag at a chunk boundary.
    Cancelled,
    ColumnIdOutOfRange {
        column_id: usize,
        column_count: usize,
    },
    SchemaMismatch {
        reason: String,
    },
    TypeMismatch {
        expected: strata_types::DataType,
        actual: strata_types::DataType,
    },
    DivisionByZero,
    InvalidJoin(String),
    InvalidPredicate(String),
    UnsupportedPlan(String),
    StorageError(String),
    PlanError(String),
}

impl std::fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorError::AlreadyExecuted => {
                write!(f, "Operator has already been executed")
            }
            ExecutorError::NotExecuted => {
                write!(f, "Operator has not been executed yet")
            }
            ExecutorError::Cancelled => write!(f, "Operator execution was cancelled"),
            ExecutorError::ColumnIdOutOfRange { column_id, column_count } => {
                write!(f, "Column id {} out of range ({} columns)", column_id, column_count)
            }
            ExecutorError::SchemaMismatch { reason } => {
                write!(f, "Schema mismatch: {}", reason)
            }
            ExecutorError::TypeMismatch { expected, actual } => {
                write!(f, "Type mismatch: expected {}, got {}", expected, actual)
            }
            ExecutorError::DivisionByZero => write!(f, "Division by zero"),
            ExecutorError::InvalidJoin(msg) => write!(f, "Invalid join: {}", msg),
            ExecutorError::InvalidPredicate(msg) => write!(f, "Invalid predicate: {}", msg),
            ExecutorError::UnsupportedPlan(msg) => write!(f, "Unsupported plan shape: {}", msg),
            ExecutorError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            ExecutorError::PlanError(msg) => write!(f, "Plan error: {}", msg),
        }
    }
}

impl std::error::Error for ExecutorError {}

impl From<strata_storage::StorageError> for ExecutorError {
    fn from(error: strata_storage::StorageError) -> Self {
        ExecutorError::StorageError(error.to_string())
    }
}

impl From<strata_plan::PlanError> for ExecutorError {
    fn from(error: strata_plan::PlanError) -> Self {
        ExecutorError::PlanError(error.to_string())
    }
}
