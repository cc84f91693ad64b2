//! Segment target-size recomputation.
//!
//! The target row count of a segment depends on the indexing regime of its
//! collection: disk-resident vector indexes tolerate much larger segments
//! than in-memory ones. The trigger recomputes the target once per group per
//! dispatch cycle and writes it into the cycle's segment snapshots only; the
//! catalog is never updated from here.

use std::collections::HashMap;

use crate::{
    error::TriggerError,
    index::IndexType,
    meta::{FieldId, MetaStore, SegmentInfo},
    observability::log_info,
    option::TriggerOptions,
    schema::{get_collection_with_deadline, CollectionSchema, SchemaHandler},
};

/// Rows fitting into `budget_bytes` for the given schema, at least one.
pub(crate) fn rows_per_segment(budget_bytes: u64, schema: &CollectionSchema) -> Option<u64> {
    let row_size = schema.estimate_row_size()?;
    if row_size == 0 {
        return None;
    }
    Some((budget_bytes / row_size).max(1))
}

/// Recompute `max_row_num` for every segment of one group.
///
/// Returns whether every vector field of the collection carries a
/// disk-resident index, which also selects the byte budget used for the
/// recomputation. The mutation targets the snapshots of the current dispatch
/// cycle and is logged only when the value actually changes.
pub(crate) async fn update_segment_max_size(
    meta: &dyn MetaStore,
    schemas: &dyn SchemaHandler,
    segments: &mut [SegmentInfo],
    options: &TriggerOptions,
) -> Result<bool, TriggerError> {
    if segments.is_empty() {
        return Ok(false);
    }
    let collection_id = segments[0].collection_id;

    let indexes = meta
        .get_indexes_for_collection(collection_id)
        .await
        .map_err(|source| TriggerError::IndexLookup {
            collection_id,
            source,
        })?;
    let collection = get_collection_with_deadline(schemas, collection_id).await?;

    let field_index_types: HashMap<FieldId, IndexType> = indexes
        .iter()
        .map(|index| (index.field_id, index.index_type))
        .collect();
    let vector_field_count = collection.schema.vector_fields().count();
    let disk_indexed_count = collection
        .schema
        .vector_fields()
        .filter(|field| {
            field_index_types
                .get(&field.field_id)
                .is_some_and(|ty| ty.is_disk_index())
        })
        .count();
    let all_disk_index = vector_field_count == disk_indexed_count;

    let budget = options.segment_budget_bytes(all_disk_index);
    let new_max_rows = rows_per_segment(budget, &collection.schema)
        .ok_or(TriggerError::RowSizeUnknown(collection_id))?;

    let current = segments[0].max_row_num;
    if new_max_rows != current {
        log_info!(
            component = "sizing",
            event = "segment_max_rows_recalculated",
            collection_id,
            all_disk_index,
            old_max_rows = current,
            new_max_rows,
        );
        for segment in segments.iter_mut() {
            segment.max_row_num = new_max_rows;
        }
    }

    Ok(all_disk_index)
}
