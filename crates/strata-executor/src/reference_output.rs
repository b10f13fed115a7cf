//! Building reference-table outputs from input positions
//!
//! Operators describe their results as sequences of *input positions*:
//! `RowId`s in input-table coordinates. For a data-table input that is the
//! actual row; for a reference-table input the offset addresses the chunk's
//! position lists (one level of indirection, resolved here so reference
//! segments never chain).

use std::collections::HashMap;
use std::sync::Arc;

use strata_storage::{
    Chunk, ColumnDefinition, OrderedBy, PosList, ReferenceSegment, Segment, Table, TableType,
};
use strata_types::{ChunkId, ChunkOffset, ColumnId, RowId, NULL_ROW_ID};

use crate::errors::ExecutorError;

/// One input of a reference output: the table, the selected positions (input
/// coordinates; `NULL_ROW_ID` entries become NULL padding), and whether this
/// side's columns turn nullable (outer join padding).
pub(crate) struct OutputSide<'a> {
    pub input: &'a Arc<Table>,
    pub positions: &'a [RowId],
    pub force_nullable: bool,
}

/// Chunk-level metadata stamped onto every output chunk.
#[derive(Default)]
pub(crate) struct OutputChunkMetadata {
    pub ordered_by: Vec<OrderedBy>,
    pub value_clustered_by: Vec<ColumnId>,
}

/// Build a reference table over one or more input sides, cut into chunks of
/// `target_chunk_size`. All sides must select the same number of positions.
pub(crate) fn build_reference_table(
    sides: &[OutputSide<'_>],
    target_chunk_size: ChunkOffset,
    metadata: &OutputChunkMetadata,
) -> Result<Table, ExecutorError> {
    debug_assert!(!sides.is_empty());
    let row_count = sides[0].positions.len();
    debug_assert!(sides.iter().all(|side| side.positions.len() == row_count));

    let mut definitions: Vec<ColumnDefinition> = Vec::new();
    for side in sides {
        for definition in side.input.column_definitions() {
            let mut definition = definition.clone();
            definition.nullable |= side.force_nullable;
            definitions.push(definition);
        }
    }
    let output = Table::new(definitions, TableType::References, target_chunk_size);

    let chunk_size = target_chunk_size.max(1) as usize;
    let mut start = 0;
    while start < row_count {
        let end = (start + chunk_size).min(row_count);
        let mut segments: Vec<Arc<Segment>> = Vec::new();
        for side in sides {
            segments.extend(reference_segments_for_positions(
                side.input,
                &side.positions[start..end],
            )?);
        }
        let mut chunk = Chunk::new(segments)?;
        chunk.set_ordered_by(metadata.ordered_by.clone());
        chunk.set_value_clustered_by(metadata.value_clustered_by.clone());
        chunk.finalize();
        output.append_prepared_chunk(chunk)?;
        start = end;
    }
    Ok(output)
}

/// The reference segments projecting `positions` out of `input`, one per
/// input column. Columns that resolve to the same (referenced table,
/// position sequence) share one `PosList`.
pub(crate) fn reference_segments_for_positions(
    input: &Arc<Table>,
    positions: &[RowId],
) -> Result<Vec<Arc<Segment>>, ExecutorError> {
    match input.table_type() {
        TableType::Data => {
            let pos_list = Arc::new(PosList::new(positions.to_vec()));
            Ok((0..input.column_count() as u16)
                .map(|column_id| {
                    Arc::new(Segment::Reference(ReferenceSegment::new(
                        input.clone(),
                        ColumnId(column_id),
                        pos_list.clone(),
                    )))
                })
                .collect())
        }
        TableType::References => {
            // Resolve through the input's own position lists. Columns backed
            // by the same source lists end up identical; share them.
            let mut segments = Vec::with_capacity(input.column_count());
            let mut shared: HashMap<Vec<(usize, usize)>, Arc<PosList>> = HashMap::new();
            for column_index in 0..input.column_count() as u16 {
                let column_id = ColumnId(column_index);
                let (referenced_table, referenced_column_id, resolved, share_key) =
                    resolve_column_positions(input, column_id, positions)?;
                let pos_list = shared
                    .entry(share_key)
                    .or_insert_with(|| Arc::new(PosList::new(resolved)))
                    .clone();
                segments.push(Arc::new(Segment::Reference(ReferenceSegment::new(
                    referenced_table,
                    referenced_column_id,
                    pos_list,
                ))));
            }
            Ok(segments)
        }
    }
}

type ResolvedColumn = (Arc<Table>, ColumnId, Vec<RowId>, Vec<(usize, usize)>);

/// Resolve `positions` through one column's reference segments. The share
/// key identifies the (source table, source pos list) pairs the column runs
/// through, so columns over the same sources share the resolved list.
fn resolve_column_positions(
    input: &Arc<Table>,
    column_id: ColumnId,
    positions: &[RowId],
) -> Result<ResolvedColumn, ExecutorError> {
    let chunks = input.chunks();
    let reference_segment_of = |chunk_id: ChunkId| -> Result<ReferenceSegment, ExecutorError> {
        let chunk = chunks.get(chunk_id.as_usize()).ok_or_else(|| {
            ExecutorError::SchemaMismatch {
                reason: format!("position references missing chunk {}", chunk_id),
            }
        })?;
        let segment =
            chunk.get_segment(column_id).ok_or(ExecutorError::ColumnIdOutOfRange {
                column_id: column_id.as_usize(),
                column_count: chunk.column_count(),
            })?;
        segment
            .as_reference()
            .cloned()
            .ok_or_else(|| ExecutorError::SchemaMismatch {
                reason: "reference table chunk holds a non-reference segment".to_string(),
            })
    };

    // The referenced table/column is consistent across chunks by
    // construction; take it from the first available chunk.
    let template = match chunks.first() {
        Some(_) => reference_segment_of(ChunkId(0))?,
        None => {
            return Ok((
                input.clone(),
                column_id,
                Vec::new(),
                Vec::new(),
            ))
        }
    };

    let mut resolved = Vec::with_capacity(positions.len());
    let mut share_key = Vec::new();
    let mut per_chunk: HashMap<ChunkId, ReferenceSegment> = HashMap::new();
    for position in positions {
        if position.is_null() {
            resolved.push(NULL_ROW_ID);
            continue;
        }
        if !per_chunk.contains_key(&position.chunk_id) {
            let segment = reference_segment_of(position.chunk_id)?;
            share_key.push((
                Arc::as_ptr(segment.referenced_table()) as usize,
                Arc::as_ptr(segment.pos_list()) as usize,
            ));
            per_chunk.insert(position.chunk_id, segment);
        }
        let segment = &per_chunk[&position.chunk_id];
        resolved.push(segment.pos_list()[position.chunk_offset as usize]);
    }

    let referenced_table = template.referenced_table().clone();
    let referenced_column_id = template.referenced_column_id();
    Ok((referenced_table, referenced_column_id, resolved, share_key))
}

/// All row positions of a table, in storage order.
pub(crate) fn all_positions(table: &Table) -> Vec<RowId> {
    let mut positions = Vec::with_capacity(table.row_count() as usize);
    for (chunk_index, chunk) in table.chunks().iter().enumerate() {
        for offset in 0..chunk.size() {
            positions.push(RowId::new(ChunkId(chunk_index as u32), offset));
        }
    }
    positions
}

/// Materialize the values of one column together with their positions.
pub(crate) fn materialize_column(
    table: &Table,
    column_id: ColumnId,
) -> Result<Vec<(strata_types::AllTypeVariant, RowId)>, ExecutorError> {
    let mut values = Vec::with_capacity(table.row_count() as usize);
    for (chunk_index, chunk) in table.chunks().iter().enumerate() {
        let segment = chunk.get_segment(column_id).ok_or(ExecutorError::ColumnIdOutOfRange {
            column_id: column_id.as_usize(),
            column_count: chunk.column_count(),
        })?;
        let chunk_id = ChunkId(chunk_index as u32);
        segment.for_each(None, |offset, value| {
            values.push((value, RowId::new(chunk_id, offset)));
        });
    }
    Ok(values)
}
