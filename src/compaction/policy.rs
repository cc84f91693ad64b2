//! Per-segment compaction worthiness rules.
//!
//! A segment earns priority treatment on its own when its log layout has
//! degraded: too many stats or delta logs, too much expired or deleted
//! payload, or index files built by an outdated engine version.

use std::time::Duration;

use crate::{
    index::IndexVersionOracle,
    meta::{log_count, SegmentInfo},
    observability::{log_debug, log_info},
    option::TriggerOptions,
    tso::{self, Timestamp},
};

/// Expiration context of one dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactTime {
    /// Binlog entries entirely below this timestamp are expired. Zero means
    /// nothing expires.
    pub expire_time: Timestamp,
    /// TTL of the collection the cycle is processing.
    pub collection_ttl: Duration,
}

impl CompactTime {
    /// Derive the expiration cutoff for `collection_ttl` at cycle time `ts`.
    pub fn new(ts: Timestamp, collection_ttl: Duration) -> Self {
        Self {
            expire_time: tso::expire_cutoff(ts, collection_ttl),
            collection_ttl,
        }
    }
}

/// Whether `segment` independently warrants compaction.
pub(crate) fn should_do_single_compaction(
    segment: &SegmentInfo,
    is_disk_index: bool,
    compact_time: &CompactTime,
    oracle: &dyn IndexVersionOracle,
    options: &TriggerOptions,
) -> bool {
    // Stats logs accumulate one per flush; only flush-origin segments can
    // pile them up faster than compaction folds them away.
    if segment.is_flush_origin() {
        let stats_log_count = log_count(&segment.statslogs);
        let max_binlogs =
            (options.segment_budget_bytes(is_disk_index) / options.binlog_max_size) as usize;
        if stats_log_count > max_binlogs * 2 {
            log_info!(
                component = "policy",
                event = "statslog_count_excess",
                segment_id = segment.id,
                stats_log_count,
                max_binlogs,
            );
            return true;
        }
    }

    let delta_log_count = log_count(&segment.deltalogs);
    if delta_log_count > options.single_compaction_deltalog_max_num {
        log_info!(
            component = "policy",
            event = "deltalog_count_excess",
            segment_id = segment.id,
            delta_log_count,
        );
        return true;
    }

    let mut expired_rows = 0u64;
    let mut expired_size = 0u64;
    for field in &segment.binlogs {
        for log in &field.logs {
            if log.timestamp_to < compact_time.expire_time {
                log_debug!(
                    component = "policy",
                    event = "binlog_expired",
                    segment_id = segment.id,
                    log_id = log.log_id,
                    timestamp_to = log.timestamp_to,
                    expire_time = compact_time.expire_time,
                );
                expired_rows += log.entries_num;
                expired_size += log.log_size;
            }
        }
    }
    if ratio(expired_rows, segment.num_rows) >= options.single_compaction_ratio_threshold
        || expired_size > options.single_compaction_expired_log_max_size
    {
        log_info!(
            component = "policy",
            event = "expired_payload_excess",
            segment_id = segment.id,
            expired_rows,
            expired_size,
        );
        return true;
    }

    let mut deleted_rows = 0u64;
    let mut delete_size = 0u64;
    for field in &segment.deltalogs {
        for log in &field.logs {
            deleted_rows += log.entries_num;
            delete_size += log.log_size;
        }
    }
    if ratio(deleted_rows, segment.num_rows) >= options.single_compaction_ratio_threshold
        || delete_size > options.single_compaction_delta_log_max_size
    {
        log_info!(
            component = "policy",
            event = "deleted_payload_excess",
            segment_id = segment.id,
            num_rows = segment.num_rows,
            deleted_rows,
            delete_size,
        );
        return true;
    }

    if options.auto_upgrade_segment_index {
        let current_engine_version = oracle.current();
        for index in segment.segment_indexes.values() {
            if index.current_index_version < current_engine_version
                && !index.index_file_keys.is_empty()
            {
                log_info!(
                    component = "policy",
                    event = "index_version_outdated",
                    segment_id = segment.id,
                    index_id = index.index_id,
                    segment_index_version = index.current_index_version,
                    current_engine_version,
                );
                return true;
            }
        }
    }

    false
}

/// Whether the segment is small enough to be aggregated with its peers.
pub(crate) fn is_small_segment(segment: &SegmentInfo, options: &TriggerOptions) -> bool {
    (segment.num_rows as f64)
        < segment.max_row_num as f64 * options.segment_small_proportion
}

/// Whether a bucket of `target_rows` headed by `segment` is full enough to
/// merge even below the minimum member count.
pub(crate) fn is_compactable(
    target_rows: u64,
    segment: &SegmentInfo,
    options: &TriggerOptions,
) -> bool {
    (target_rows as f64)
        > segment.max_row_num as f64 * options.effective_compactable_proportion()
}

/// Whether a leftover small segment may still be squeezed into an emitted
/// plan without pushing it past the expansion limit.
pub(crate) fn is_expandable_small_segment(
    segment: &SegmentInfo,
    options: &TriggerOptions,
) -> bool {
    (segment.num_rows as f64)
        < segment.max_row_num as f64 * (options.segment_expansion_rate - 1.0)
}

fn ratio(part: u64, total: u64) -> f64 {
    part as f64 / total as f64
}
