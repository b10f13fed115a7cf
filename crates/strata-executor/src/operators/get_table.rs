//! Fetches a stored table from the storage manager

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::{StorageManager, Table};
use strata_types::ColumnId;

use crate::errors::ExecutorError;
use crate::operator::{operator_ref, DescriptionMode, Operator, OperatorRef, OperatorState};

/// Leaf operator resolving a table name against the storage manager at
/// execution time. Pruned columns (decided by the column pruning rule) are
/// projected away by sharing only the surviving segments.
#[derive(Debug)]
pub struct GetTable {
    table_name: String,
    pruned_column_ids: Vec<ColumnId>,
    state: OperatorState,
}

impl GetTable {
    pub fn new(table_name: impl Into<String>, pruned_column_ids: Vec<ColumnId>) -> Self {
        GetTable { table_name: table_name.into(), pruned_column_ids, state: OperatorState::new() }
    }
}

impl Operator for GetTable {
    fn name(&self) -> &'static str {
        "GetTable"
    }

    fn description(&self, mode: DescriptionMode) -> String {
        match mode {
            DescriptionMode::SingleLine => format!("GetTable({})", self.table_name),
            DescriptionMode::MultiLine => format!(
                "GetTable\n  table: {}\n  pruned columns: {:?}",
                self.table_name, self.pruned_column_ids
            ),
        }
    }

    fn is_executed(&self) -> bool {
        self.state.is_executed()
    }

    fn execute(&mut self) -> Result<(), ExecutorError> {
        self.state.begin_execute()?;
        let table = StorageManager::get().get_table(&self.table_name)?;
        if self.pruned_column_ids.is_empty() {
            self.state.set_output_shared(table);
            return Ok(());
        }

        let kept: Vec<ColumnId> = (0..table.column_count() as u16)
            .map(ColumnId)
            .filter(|column_id| !self.pruned_column_ids.contains(column_id))
            .collect();
        let definitions = kept
            .iter()
            .map(|&column_id| table.column_definitions()[column_id.as_usize()].clone())
            .collect();
        let projected =
            Table::new(definitions, table.table_type(), table.target_chunk_size());
        for chunk in table.chunks() {
            self.state.check_cancelled()?;
            let segments = kept
                .iter()
                .map(|&column_id| {
                    chunk.get_segment(column_id).cloned().ok_or(
                        ExecutorError::ColumnIdOutOfRange {
                            column_id: column_id.as_usize(),
                            column_count: chunk.column_count(),
                        },
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            let mut projected_chunk = strata_storage::Chunk::new(segments)?;
            projected_chunk.finalize();
            projected.append_prepared_chunk(projected_chunk)?;
        }
        self.state.set_output(projected);
        Ok(())
    }

    fn get_output(&self) -> Result<Arc<Table>, ExecutorError> {
        self.state.output()
    }

    fn deep_copy(&self) -> OperatorRef {
        operator_ref(GetTable::new(self.table_name.clone(), self.pruned_column_ids.clone()))
    }

    fn set_cancellation_flag(&mut self, flag: Arc<AtomicBool>) {
        self.state.set_cancellation_flag(flag);
    }
}
