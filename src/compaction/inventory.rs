//! Read-only candidate view over the metastore.
//!
//! Everything the planner looks at flows through the eligibility predicate
//! here: only healthy, flushed (or flushing), unowned, non-L0 segments ever
//! reach classification. The functions operate on the owned snapshots the
//! metastore hands out, so nothing here can leak back into the catalog.

use std::collections::BTreeMap;

use crate::{
    meta::{CollectionId, MetaStore, PartitionId, SegmentInfo, SegmentLevel},
    observability::log_warn,
};

/// Eligible segments of one (collection, partition, channel) group.
#[derive(Debug, Clone)]
pub struct ChannelPartitionGroup {
    /// Collection the group belongs to.
    pub collection_id: CollectionId,
    /// Partition the group belongs to.
    pub partition_id: PartitionId,
    /// Insert channel of the group.
    pub channel: String,
    /// Eligible segments of the group.
    pub segments: Vec<SegmentInfo>,
}

/// Whether a segment may participate in mix compaction at all.
pub fn eligible_for_compaction(segment: &SegmentInfo) -> bool {
    segment.is_healthy()
        && segment.is_flushed_or_flushing()
        && !segment.is_compacting
        && !segment.is_importing
        && segment.level != SegmentLevel::L0
}

/// Snapshot every eligible segment, grouped by (collection, partition,
/// channel). A zero `collection_filter` selects all collections.
///
/// Groups come back in key order so plan emission is reproducible across
/// runs over the same inventory.
pub async fn grouped_by_channel_partition(
    meta: &dyn MetaStore,
    collection_filter: CollectionId,
) -> Vec<ChannelPartitionGroup> {
    let mut groups: BTreeMap<(CollectionId, PartitionId, String), Vec<SegmentInfo>> =
        BTreeMap::new();
    for segment in meta.list_segments().await {
        if collection_filter != 0 && segment.collection_id != collection_filter {
            continue;
        }
        if !eligible_for_compaction(&segment) {
            continue;
        }
        groups
            .entry((
                segment.collection_id,
                segment.partition_id,
                segment.channel.clone(),
            ))
            .or_default()
            .push(segment);
    }
    groups
        .into_iter()
        .map(
            |((collection_id, partition_id, channel), segments)| ChannelPartitionGroup {
                collection_id,
                partition_id,
                channel,
                segments,
            },
        )
        .collect()
}

/// Snapshot the eligible segments of one channel and partition.
pub async fn candidates_for_channel_partition(
    meta: &dyn MetaStore,
    channel: &str,
    partition_id: PartitionId,
) -> Vec<SegmentInfo> {
    meta.segments_by_channel(channel)
        .await
        .into_iter()
        .filter(|segment| {
            segment.channel == channel
                && segment.partition_id == partition_id
                && eligible_for_compaction(segment)
        })
        .collect()
}

/// Retain only segments that carry built index files for every index
/// declared on their collection.
///
/// Collections without declared indexes pass through unfiltered. When index
/// metadata cannot be fetched, the affected segments are excluded for this
/// cycle rather than compacted with unverifiable index state.
pub async fn filter_indexed_segments(
    meta: &dyn MetaStore,
    segments: Vec<SegmentInfo>,
) -> Vec<SegmentInfo> {
    let mut by_collection: BTreeMap<CollectionId, Vec<SegmentInfo>> = BTreeMap::new();
    for segment in segments {
        by_collection
            .entry(segment.collection_id)
            .or_default()
            .push(segment);
    }

    let mut retained = Vec::new();
    for (collection_id, group) in by_collection {
        let indexes = match meta.get_indexes_for_collection(collection_id).await {
            Ok(indexes) => indexes,
            Err(err) => {
                log_warn!(
                    component = "inventory",
                    event = "index_lookup_failed",
                    collection_id,
                    error = %err,
                );
                continue;
            }
        };
        if indexes.is_empty() {
            retained.extend(group);
            continue;
        }
        retained.extend(group.into_iter().filter(|segment| {
            indexes.iter().all(|index| {
                segment
                    .segment_indexes
                    .get(&index.index_id)
                    .is_some_and(|built| !built.index_file_keys.is_empty())
            })
        }));
    }
    retained
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        time::SystemTime,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        error::BoxError,
        index::{IndexInfo, IndexType},
        meta::{SegmentId, SegmentIndex, SegmentState},
    };

    fn segment(id: SegmentId, collection_id: CollectionId, channel: &str) -> SegmentInfo {
        SegmentInfo {
            id,
            collection_id,
            partition_id: 1,
            channel: channel.to_string(),
            level: SegmentLevel::L1,
            state: SegmentState::Flushed,
            num_rows: 100,
            max_row_num: 1000,
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

    struct FixedMeta {
        segments: Vec<SegmentInfo>,
        indexes: Vec<IndexInfo>,
    }

    #[async_trait]
    impl MetaStore for FixedMeta {
        async fn list_segments(&self) -> Vec<SegmentInfo> {
            self.segments.clone()
        }

        async fn get_healthy_segment(&self, segment_id: SegmentId) -> Option<SegmentInfo> {
            self.segments
                .iter()
                .find(|s| s.id == segment_id && s.is_healthy())
                .cloned()
        }

        async fn get_indexes_for_collection(
            &self,
            _collection_id: CollectionId,
        ) -> Result<Vec<IndexInfo>, BoxError> {
            Ok(self.indexes.clone())
        }

        async fn segments_by_channel(&self, channel: &str) -> Vec<SegmentInfo> {
            self.segments
                .iter()
                .filter(|s| s.channel == channel)
                .cloned()
                .collect()
        }
    }

    #[test]
    fn predicate_rejects_unmergeable_segments() {
        let mut s = segment(1, 1, "ch-0");
        assert!(eligible_for_compaction(&s));

        s.level = SegmentLevel::L0;
        assert!(!eligible_for_compaction(&s));
        s.level = SegmentLevel::L1;

        s.is_compacting = true;
        assert!(!eligible_for_compaction(&s));
        s.is_compacting = false;

        s.is_importing = true;
        assert!(!eligible_for_compaction(&s));
        s.is_importing = false;

        s.state = SegmentState::Growing;
        assert!(!eligible_for_compaction(&s));
        s.state = SegmentState::Dropped;
        assert!(!eligible_for_compaction(&s));
    }

    #[tokio::test]
    async fn grouping_is_keyed_and_filtered() {
        let mut dropped = segment(4, 1, "ch-0");
        dropped.state = SegmentState::Dropped;
        let meta = FixedMeta {
            segments: vec![
                segment(1, 1, "ch-0"),
                segment(2, 1, "ch-1"),
                segment(3, 2, "ch-0"),
                dropped,
            ],
            indexes: Vec::new(),
        };

        let groups = grouped_by_channel_partition(&meta, 0).await;
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].collection_id, 1);
        assert_eq!(groups[0].channel, "ch-0");
        assert_eq!(groups[0].segments.len(), 1);

        let only_coll_2 = grouped_by_channel_partition(&meta, 2).await;
        assert_eq!(only_coll_2.len(), 1);
        assert_eq!(only_coll_2[0].collection_id, 2);
    }

    #[tokio::test]
    async fn channel_candidates_respect_partition() {
        let mut other_partition = segment(2, 1, "ch-0");
        other_partition.partition_id = 9;
        let meta = FixedMeta {
            segments: vec![segment(1, 1, "ch-0"), other_partition],
            indexes: Vec::new(),
        };

        let candidates = candidates_for_channel_partition(&meta, "ch-0", 1).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, 1);
    }

    #[tokio::test]
    async fn index_filter_requires_built_files() {
        let indexed = {
            let mut s = segment(1, 1, "ch-0");
            s.segment_indexes.insert(
                7,
                SegmentIndex {
                    index_id: 7,
                    current_index_version: 2,
                    index_file_keys: vec!["k".to_string()],
                },
            );
            s
        };
        let building = {
            let mut s = segment(2, 1, "ch-0");
            s.segment_indexes.insert(
                7,
                SegmentIndex {
                    index_id: 7,
                    current_index_version: 2,
                    index_file_keys: Vec::new(),
                },
            );
            s
        };
        let unindexed = segment(3, 1, "ch-0");
        let meta = FixedMeta {
            segments: Vec::new(),
            indexes: vec![IndexInfo {
                index_id: 7,
                field_id: 100,
                index_type: IndexType::Hnsw,
            }],
        };

        let retained =
            filter_indexed_segments(&meta, vec![indexed, building, unindexed]).await;
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].id, 1);
    }
}
