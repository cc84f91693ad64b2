//! Configuration knobs of the compaction trigger.
//!
//! The options struct is frozen at construction: the trigger captures it in
//! an `Arc` and every dispatch cycle reads from that single snapshot, so a
//! cycle never observes a mid-flight change.

use std::time::Duration;

use crate::error::TriggerError;

const MIB: u64 = 1024 * 1024;

/// Operating parameters of the compaction trigger.
#[derive(Clone, Debug)]
pub struct TriggerOptions {
    /// Master toggle for automatic compaction. When off, the periodic loop
    /// does not run and per-flush signals are ignored; forced compaction
    /// still works.
    pub enable_auto_compaction: bool,
    /// Period of the global compaction ticker.
    pub global_compaction_interval: Duration,
    /// Restrict candidates to segments that carry every declared index.
    pub index_based_compaction: bool,
    /// Treat segments with outdated index engine versions as compaction
    /// candidates.
    pub auto_upgrade_segment_index: bool,
    /// Maximum number of segments merged by one plan.
    pub max_segment_to_merge: usize,
    /// Minimum bucket size for a small-segment plan to be emitted.
    pub min_segment_to_merge: usize,
    /// Byte budget of an in-memory-indexed segment, in MiB.
    pub segment_max_size_mb: u64,
    /// Byte budget of a disk-indexed segment, in MiB.
    pub disk_segment_max_size_mb: u64,
    /// Maximum size of a single binlog file, in bytes.
    pub binlog_max_size: u64,
    /// A segment below `max_row_num * segment_small_proportion` rows is
    /// classified as small.
    pub segment_small_proportion: f64,
    /// A small-segment bucket below `min_segment_to_merge` members is still
    /// emitted when its rows exceed `max_row_num *
    /// segment_compactable_proportion`.
    pub segment_compactable_proportion: f64,
    /// Multiplier on `max_row_num` permitting over-full plans when absorbing
    /// leftover small segments.
    pub segment_expansion_rate: f64,
    /// Deltalog count above which a segment is compacted on its own merits.
    pub single_compaction_deltalog_max_num: usize,
    /// Delete-log byte total above which a segment is compacted.
    pub single_compaction_delta_log_max_size: u64,
    /// Expired-log byte total above which a segment is compacted.
    pub single_compaction_expired_log_max_size: u64,
    /// Expired/deleted row ratio above which a segment is compacted.
    pub single_compaction_ratio_threshold: f64,
    /// Capacity of the bounded signal queue.
    pub signal_queue_capacity: usize,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            enable_auto_compaction: true,
            global_compaction_interval: Duration::from_secs(60),
            index_based_compaction: true,
            auto_upgrade_segment_index: false,
            max_segment_to_merge: 30,
            min_segment_to_merge: 3,
            segment_max_size_mb: 512,
            disk_segment_max_size_mb: 2048,
            binlog_max_size: 64 * MIB,
            segment_small_proportion: 0.5,
            segment_compactable_proportion: 0.85,
            segment_expansion_rate: 1.25,
            single_compaction_deltalog_max_num: 200,
            single_compaction_delta_log_max_size: 16 * MIB,
            single_compaction_expired_log_max_size: 10 * MIB,
            single_compaction_ratio_threshold: 0.2,
            signal_queue_capacity: 100,
        }
    }
}

impl TriggerOptions {
    /// Set the global compaction ticker period.
    pub fn global_compaction_interval(mut self, value: Duration) -> Self {
        self.global_compaction_interval = value;
        self
    }

    /// Set the master auto-compaction toggle.
    pub fn enable_auto_compaction(mut self, value: bool) -> Self {
        self.enable_auto_compaction = value;
        self
    }

    /// Set the maximum number of segments merged by one plan.
    pub fn max_segment_to_merge(mut self, value: usize) -> Self {
        self.max_segment_to_merge = value;
        self
    }

    /// Set the minimum bucket size for a small-segment plan.
    pub fn min_segment_to_merge(mut self, value: usize) -> Self {
        self.min_segment_to_merge = value;
        self
    }

    /// Set the byte budget of an in-memory-indexed segment, in MiB.
    pub fn segment_max_size_mb(mut self, value: u64) -> Self {
        self.segment_max_size_mb = value;
        self
    }

    /// Set the byte budget of a disk-indexed segment, in MiB.
    pub fn disk_segment_max_size_mb(mut self, value: u64) -> Self {
        self.disk_segment_max_size_mb = value;
        self
    }

    /// Set the signal queue capacity.
    pub fn signal_queue_capacity(mut self, value: usize) -> Self {
        self.signal_queue_capacity = value;
        self
    }

    /// Byte budget for the given indexing regime.
    pub(crate) fn segment_budget_bytes(&self, is_disk_index: bool) -> u64 {
        let mb = if is_disk_index {
            self.disk_segment_max_size_mb
        } else {
            self.segment_max_size_mb
        };
        mb * MIB
    }

    /// Effective compactable proportion, floored to the small proportion so
    /// a lone small segment can never qualify as compactable.
    pub(crate) fn effective_compactable_proportion(&self) -> f64 {
        self.segment_compactable_proportion
            .max(self.segment_small_proportion)
    }

    /// Reject configurations the packing algorithm cannot operate under.
    pub fn validate(&self) -> Result<(), TriggerError> {
        if self.segment_expansion_rate < 1.0 {
            return Err(TriggerError::InvalidOptions(
                "segment_expansion_rate must be >= 1.0",
            ));
        }
        if self.max_segment_to_merge < 2 {
            return Err(TriggerError::InvalidOptions(
                "max_segment_to_merge must be >= 2",
            ));
        }
        if self.segment_max_size_mb == 0 || self.disk_segment_max_size_mb == 0 {
            return Err(TriggerError::InvalidOptions(
                "segment byte budgets must be non-zero",
            ));
        }
        if self.binlog_max_size == 0 {
            return Err(TriggerError::InvalidOptions(
                "binlog_max_size must be non-zero",
            ));
        }
        if self.signal_queue_capacity == 0 {
            return Err(TriggerError::InvalidOptions(
                "signal_queue_capacity must be non-zero",
            ));
        }
        Ok(())
    }
}
