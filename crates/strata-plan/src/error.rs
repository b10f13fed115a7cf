// ============================================================================
// Errors
// ============================================================================

use strata_storage::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub enum PlanError {
    ColumnNotFound(String),
    AmbiguousColumn(String),
    ExpiredNodeHandle,
    InvalidPlan(String),
    StorageError(StorageError),
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::ColumnNotFound(description) => {
                write!(f, "Column '{}' not found in plan scope", description)
            }
            PlanError::AmbiguousColumn(description) => {
                write!(f, "Column '{}' is ambiguous; lineage required", description)
            }
            PlanError::ExpiredNodeHandle => {
                write!(f, "Column reference points at an expired plan node")
            }
            PlanError::InvalidPlan(msg) => write!(f, "Invalid plan: {}", msg),
            PlanError::StorageError(inner) => write!(f, "Storage error: {}", inner),
        }
    }
}

impl std::error::Error for PlanError {}

impl From<StorageError> for PlanError {
    fn from(inner: StorageError) -> Self {
        PlanError::StorageError(inner)
    }
}
