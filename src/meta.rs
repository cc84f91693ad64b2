//! Segment metadata model and the metastore contract.
//!
//! Everything here is a read-only snapshot of the coordinator's persistent
//! catalog. [`MetaStore`] implementations hand out owned [`SegmentInfo`]
//! values; the trigger may adjust `max_row_num` on those snapshots during a
//! dispatch cycle but never writes anything back.

use std::{collections::HashMap, time::SystemTime};

use async_trait::async_trait;

use crate::{error::BoxError, index::IndexInfo, tso::Timestamp};

/// Unique segment identifier.
pub type SegmentId = u64;
/// Unique collection identifier. Zero means "all collections" in filters.
pub type CollectionId = u64;
/// Unique partition identifier.
pub type PartitionId = u64;
/// Unique field identifier within a collection schema.
pub type FieldId = u64;
/// Unique index identifier.
pub type IndexId = u64;

/// Lifecycle state of a segment as recorded in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Accepting writes on a datanode.
    Growing,
    /// Sealed against writes, not yet flushed.
    Sealed,
    /// Flush in progress.
    Flushing,
    /// Fully flushed to object storage.
    Flushed,
    /// Logically removed.
    Dropped,
}

/// Storage level of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentLevel {
    /// Delete-only segments, excluded from mix compaction.
    L0,
    /// Freshly flushed segments.
    L1,
    /// Products of previous compactions.
    L2,
}

/// A single on-disk log file reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Catalog identifier of the log file.
    pub log_id: u64,
    /// Number of entries recorded in the file.
    pub entries_num: u64,
    /// File size in bytes.
    pub log_size: u64,
    /// Smallest timestamp covered by the file.
    pub timestamp_from: Timestamp,
    /// Largest timestamp covered by the file.
    pub timestamp_to: Timestamp,
}

/// Log files of one field, in write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinlog {
    /// Field the logs belong to.
    pub field_id: FieldId,
    /// Log files of the field.
    pub logs: Vec<LogEntry>,
}

/// Per-segment index build state for one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentIndex {
    /// Index this entry belongs to.
    pub index_id: IndexId,
    /// Engine version the index files were built with.
    pub current_index_version: i32,
    /// Object-storage keys of the built index files. Empty while building.
    pub index_file_keys: Vec<String>,
}

/// Read-only snapshot of one segment.
#[derive(Debug, Clone)]
pub struct SegmentInfo {
    /// Segment identifier.
    pub id: SegmentId,
    /// Owning collection.
    pub collection_id: CollectionId,
    /// Owning partition.
    pub partition_id: PartitionId,
    /// Insert channel the segment was written on.
    pub channel: String,
    /// Storage level.
    pub level: SegmentLevel,
    /// Lifecycle state.
    pub state: SegmentState,
    /// Row count.
    pub num_rows: u64,
    /// Target capacity in rows. Recomputed per dispatch cycle by the sizing
    /// policy; the new value lives only on this snapshot.
    pub max_row_num: u64,
    /// Row data logs, per field.
    pub binlogs: Vec<FieldBinlog>,
    /// Statistics logs, per field.
    pub statslogs: Vec<FieldBinlog>,
    /// Delete logs, per field.
    pub deltalogs: Vec<FieldBinlog>,
    /// A compaction task currently owns this segment.
    pub is_compacting: bool,
    /// A bulk import currently owns this segment.
    pub is_importing: bool,
    /// Segment was produced by a compaction.
    pub created_by_compaction: bool,
    /// Source segments of that compaction. Empty for flush-origin segments.
    pub compaction_from: Vec<SegmentId>,
    /// Index build state keyed by index id.
    pub segment_indexes: HashMap<IndexId, SegmentIndex>,
    /// Wall-clock instant of the last flush.
    pub last_flush_time: SystemTime,
}

impl SegmentInfo {
    /// Whether the segment is still visible to readers.
    pub fn is_healthy(&self) -> bool {
        self.state != SegmentState::Dropped
    }

    /// Whether the segment has been flushed or is flushing.
    pub fn is_flushed_or_flushing(&self) -> bool {
        matches!(self.state, SegmentState::Flushed | SegmentState::Flushing)
    }

    /// Whether the segment came straight from a flush rather than a
    /// previous compaction.
    pub fn is_flush_origin(&self) -> bool {
        self.compaction_from.is_empty()
    }
}

/// Total log-file count across the field binlogs of one log kind.
pub(crate) fn log_count(logs: &[FieldBinlog]) -> usize {
    logs.iter().map(|field| field.logs.len()).sum()
}

/// Read-only catalog access required by the trigger.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Snapshot of every segment currently tracked by the catalog.
    async fn list_segments(&self) -> Vec<SegmentInfo>;

    /// Fetch one segment, or `None` when it is absent or dropped.
    async fn get_healthy_segment(&self, segment_id: SegmentId) -> Option<SegmentInfo>;

    /// Declared indexes of a collection.
    async fn get_indexes_for_collection(
        &self,
        collection_id: CollectionId,
    ) -> Result<Vec<IndexInfo>, BoxError>;

    /// Snapshot of every segment written on `channel`.
    async fn segments_by_channel(&self, channel: &str) -> Vec<SegmentInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(state: SegmentState) -> SegmentInfo {
        SegmentInfo {
            id: 1,
            collection_id: 1,
            partition_id: 1,
            channel: "ch-0".to_string(),
            level: SegmentLevel::L1,
            state,
            num_rows: 10,
            max_row_num: 100,
            binlogs: Vec::new(),
            statslogs: Vec::new(),
            deltalogs: Vec::new(),
            is_compacting: false,
            is_importing: false,
            created_by_compaction: false,
            compaction_from: Vec::new(),
            segment_indexes: HashMap::new(),
            last_flush_time: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn dropped_segments_are_not_healthy() {
        assert!(segment(SegmentState::Flushed).is_healthy());
        assert!(!segment(SegmentState::Dropped).is_healthy());
    }

    #[test]
    fn flush_states() {
        assert!(segment(SegmentState::Flushed).is_flushed_or_flushing());
        assert!(segment(SegmentState::Flushing).is_flushed_or_flushing());
        assert!(!segment(SegmentState::Sealed).is_flushed_or_flushing());
        assert!(!segment(SegmentState::Growing).is_flushed_or_flushing());
    }

    #[test]
    fn log_count_sums_across_fields() {
        let entry = LogEntry {
            log_id: 1,
            entries_num: 1,
            log_size: 1,
            timestamp_from: 0,
            timestamp_to: 0,
        };
        let logs = vec![
            FieldBinlog {
                field_id: 100,
                logs: vec![entry.clone(), entry.clone()],
            },
            FieldBinlog {
                field_id: 101,
                logs: vec![entry],
            },
        ];
        assert_eq!(log_count(&logs), 3);
    }
}
