//! Reference segments: projections of a source table through a position list

use std::sync::Arc;

use strata_types::{AllTypeVariant, ChunkOffset, ColumnId, DataType};

use crate::pos_list::PosList;
use crate::table::{Table, TableType};

/// A segment whose values are a projection of one column of a source data
/// table through a shared position list.
///
/// Reference segments never reference other reference segments; resolution is
/// always one level deep. Entries that are the NULL row id project to NULL
/// (outer join padding).
#[derive(Debug, Clone)]
pub struct ReferenceSegment {
    referenced_table: Arc<Table>,
    referenced_column_id: ColumnId,
    pos_list: Arc<PosList>,
}

impl ReferenceSegment {
    pub fn new(
        referenced_table: Arc<Table>,
        referenced_column_id: ColumnId,
        pos_list: Arc<PosList>,
    ) -> Self {
        assert_eq!(
            referenced_table.table_type(),
            TableType::Data,
            "reference segments must point at data tables"
        );
        assert!(
            referenced_column_id.as_usize() < referenced_table.column_count(),
            "referenced column {} out of range",
            referenced_column_id
        );
        ReferenceSegment { referenced_table, referenced_column_id, pos_list }
    }

    pub fn referenced_table(&self) -> &Arc<Table> {
        &self.referenced_table
    }

    pub fn referenced_column_id(&self) -> ColumnId {
        self.referenced_column_id
    }

    pub fn pos_list(&self) -> &Arc<PosList> {
        &self.pos_list
    }

    pub fn data_type(&self) -> DataType {
        self.referenced_table.column_definitions()[self.referenced_column_id.as_usize()].data_type
    }

    pub fn len(&self) -> usize {
        self.pos_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos_list.is_empty()
    }

    pub fn is_null_at(&self, offset: ChunkOffset) -> bool {
        self.get(offset).is_null()
    }

    pub fn get(&self, offset: ChunkOffset) -> AllTypeVariant {
        let row_id = self.pos_list[offset as usize];
        if row_id.is_null() {
            return AllTypeVariant::Null;
        }
        let chunk = self
            .referenced_table
            .get_chunk(row_id.chunk_id)
            .expect("position list references an existing chunk");
        chunk
            .get_segment(self.referenced_column_id)
            .expect("referenced column exists in every chunk")
            .get(row_id.chunk_offset)
    }

    pub fn estimate_memory_usage(&self) -> usize {
        // The position list is shared; attribute it to the segment anyway so
        // reference tables report non-zero footprints.
        self.pos_list.estimate_memory_usage()
    }
}
