//! Meta-tables exposing catalog state as ordinary tables

use std::sync::Arc;

use strata_types::{AllTypeVariant, ColumnId, DataType};

use crate::error::StorageError;
use crate::storage_manager::StorageManager;
use crate::table::{ColumnDefinition, Table};

/// Build the `tables` meta-table: one row per registered table.
pub fn meta_tables_table(manager: &StorageManager) -> Result<Arc<Table>, StorageError> {
    let table = Table::new_data(vec![
        ColumnDefinition::new("table_name", DataType::String, false),
        ColumnDefinition::new("column_count", DataType::Int64, false),
        ColumnDefinition::new("chunk_count", DataType::Int64, false),
        ColumnDefinition::new("row_count", DataType::Int64, false),
    ]);
    for (name, registered) in manager.tables() {
        table.append_row(vec![
            AllTypeVariant::String(name),
            AllTypeVariant::Int64(registered.column_count() as i64),
            AllTypeVariant::Int64(registered.chunk_count() as i64),
            AllTypeVariant::Int64(registered.row_count() as i64),
        ])?;
    }
    table.finalize_last_chunk();
    Ok(Arc::new(table))
}

/// Build the `columns` meta-table: one row per column of each table.
pub fn meta_columns_table(manager: &StorageManager) -> Result<Arc<Table>, StorageError> {
    let table = Table::new_data(vec![
        ColumnDefinition::new("table_name", DataType::String, false),
        ColumnDefinition::new("column_id", DataType::Int64, false),
        ColumnDefinition::new("column_name", DataType::String, false),
        ColumnDefinition::new("data_type", DataType::String, false),
        ColumnDefinition::new("nullable", DataType::Int32, false),
    ]);
    for (name, registered) in manager.tables() {
        for (index, definition) in registered.column_definitions().iter().enumerate() {
            table.append_row(vec![
                AllTypeVariant::String(name.clone()),
                AllTypeVariant::Int64(index as i64),
                AllTypeVariant::String(definition.name.clone()),
                AllTypeVariant::String(definition.data_type.to_string()),
                AllTypeVariant::Int32(definition.nullable as i32),
            ])?;
        }
    }
    table.finalize_last_chunk();
    Ok(Arc::new(table))
}

/// Build the `chunks` meta-table: one row per chunk of each table.
pub fn meta_chunks_table(manager: &StorageManager) -> Result<Arc<Table>, StorageError> {
    let table = Table::new_data(vec![
        ColumnDefinition::new("table_name", DataType::String, false),
        ColumnDefinition::new("chunk_id", DataType::Int64, false),
        ColumnDefinition::new("row_count", DataType::Int64, false),
        ColumnDefinition::new("invalid_row_count", DataType::Int64, false),
        ColumnDefinition::new("cleanup_commit_id", DataType::Int64, true),
    ]);
    for (name, registered) in manager.tables() {
        for (chunk_index, chunk) in registered.chunks().iter().enumerate() {
            table.append_row(vec![
                AllTypeVariant::String(name.clone()),
                AllTypeVariant::Int64(chunk_index as i64),
                AllTypeVariant::Int64(chunk.size() as i64),
                AllTypeVariant::Int64(chunk.invalid_row_count() as i64),
                chunk
                    .cleanup_commit_id()
                    .map_or(AllTypeVariant::Null, |id| AllTypeVariant::Int64(id.0 as i64)),
            ])?;
        }
    }
    table.finalize_last_chunk();
    Ok(Arc::new(table))
}

/// Build the `segments` meta-table: one row per segment of each chunk.
pub fn meta_segments_table(manager: &StorageManager) -> Result<Arc<Table>, StorageError> {
    let table = Table::new_data(vec![
        ColumnDefinition::new("table_name", DataType::String, false),
        ColumnDefinition::new("chunk_id", DataType::Int64, false),
        ColumnDefinition::new("column_id", DataType::Int64, false),
        ColumnDefinition::new("encoding_type", DataType::String, true),
        ColumnDefinition::new("vector_compression_type", DataType::String, true),
        ColumnDefinition::new("estimated_size_in_bytes", DataType::Int64, false),
    ]);
    for (name, registered) in manager.tables() {
        for (chunk_index, chunk) in registered.chunks().iter().enumerate() {
            for column_index in 0..chunk.column_count() {
                let segment = chunk
                    .get_segment(ColumnId(column_index as u16))
                    .expect("column index within chunk");
                table.append_row(vec![
                    AllTypeVariant::String(name.clone()),
                    AllTypeVariant::Int64(chunk_index as i64),
                    AllTypeVariant::Int64(column_index as i64),
                    segment
                        .encoding_type()
                        .map_or(AllTypeVariant::Null, |e| AllTypeVariant::String(e.to_string())),
                    segment.vector_compression_type().map_or(AllTypeVariant::Null, |c| {
                        AllTypeVariant::String(c.to_string())
                    }),
                    AllTypeVariant::Int64(segment.estimate_memory_usage() as i64),
                ])?;
            }
        }
    }
    table.finalize_last_chunk();
    Ok(Arc::new(table))
}
