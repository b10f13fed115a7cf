//! The process-wide table registry

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::StorageError;
use crate::table::Table;

static STORAGE_MANAGER: OnceLock<StorageManager> = OnceLock::new();

/// Process-wide registry of named tables.
///
/// Optimizer rules read from it; execution writes to it only through DDL-like
/// calls. `reset()` exists for test teardown.
#[derive(Debug, Default)]
pub struct StorageManager {
    tables: RwLock<HashMap<String, Arc<Table>>>,
}

impl StorageManager {
    /// The singleton instance.
    pub fn get() -> &'static StorageManager {
        STORAGE_MANAGER.get_or_init(StorageManager::default)
    }

    pub fn add_table(&self, name: impl Into<String>, table: Arc<Table>) -> Result<(), StorageError> {
        let name = name.into();
        let mut tables = self.tables.write();
        if tables.contains_key(&name) {
            return Err(StorageError::TableAlreadyExists(name));
        }
        tables.insert(name, table);
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Result<Arc<Table>, StorageError> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    pub fn drop_table(&self, name: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    /// All registered tables, sorted by name.
    pub fn tables(&self) -> Vec<(String, Arc<Table>)> {
        let mut tables: Vec<_> =
            self.tables.read().iter().map(|(name, table)| (name.clone(), table.clone())).collect();
        tables.sort_by(|a, b| a.0.cmp(&b.0));
        tables
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Drop every table. Test teardown.
    pub fn reset(&self) {
        self.tables.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use strata_types::DataType;

    use crate::table::ColumnDefinition;

    use super::*;

    // The singleton is process-global, so tests use uniquely named tables
    // instead of reset() to avoid clobbering parallel test threads.
    #[test]
    fn test_add_get_drop() {
        let manager = StorageManager::get();
        let table = Arc::new(Table::new_data(vec![ColumnDefinition::new(
            "x",
            DataType::Int32,
            false,
        )]));

        manager.add_table("storage_manager_test_t1", table.clone()).unwrap();
        assert!(manager.has_table("storage_manager_test_t1"));
        assert!(manager.add_table("storage_manager_test_t1", table).is_err());

        let fetched = manager.get_table("storage_manager_test_t1").unwrap();
        assert_eq!(fetched.column_count(), 1);

        manager.drop_table("storage_manager_test_t1").unwrap();
        assert!(manager.get_table("storage_manager_test_t1").is_err());
    }
}
