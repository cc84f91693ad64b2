//! Candidate classification and bin-packing into compaction plans.
//!
//! Candidates split three ways: *prioritized* segments must land in a plan
//! this cycle, *small* segments are worth aggregating when enough of them
//! pile up, and the rest only ever act as squeeze targets for leftovers.
//! Packing is greedy and ordering-sensitive; the sort contracts below are
//! load-bearing for reproducible emission.

use std::time::Duration;

use crate::{
    compaction::policy::{
        is_compactable, is_expandable_small_segment, is_small_segment,
        should_do_single_compaction, CompactTime,
    },
    index::IndexVersionOracle,
    meta::{CollectionId, FieldBinlog, PartitionId, SegmentId, SegmentInfo, SegmentLevel},
    observability::{log_debug, log_info},
    option::TriggerOptions,
};

/// Unique plan identifier, allocated at submission time.
pub type PlanId = u64;

/// Kind of compaction a plan performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanType {
    /// Merge several sealed segments, folding in deletes and dropping
    /// expired rows.
    Mix,
}

/// Log inventory of one segment inside a plan.
#[derive(Debug, Clone)]
pub struct PlanSegment {
    /// Segment to merge.
    pub segment_id: SegmentId,
    /// Owning collection.
    pub collection_id: CollectionId,
    /// Owning partition.
    pub partition_id: PartitionId,
    /// Storage level of the segment.
    pub level: SegmentLevel,
    /// Row data logs.
    pub binlogs: Vec<FieldBinlog>,
    /// Statistics logs.
    pub statslogs: Vec<FieldBinlog>,
    /// Delete logs.
    pub deltalogs: Vec<FieldBinlog>,
}

impl PlanSegment {
    fn from_segment(segment: &SegmentInfo) -> Self {
        Self {
            segment_id: segment.id,
            collection_id: segment.collection_id,
            partition_id: segment.partition_id,
            level: segment.level,
            binlogs: segment.binlogs.clone(),
            statslogs: segment.statslogs.clone(),
            deltalogs: segment.deltalogs.clone(),
        }
    }
}

/// An execution plan handed to the plan executor.
#[derive(Debug, Clone)]
pub struct CompactionPlan {
    /// Plan identifier; zero until filled at submission time.
    pub plan_id: PlanId,
    /// Kind of compaction.
    pub plan_type: PlanType,
    /// Channel every segment of the plan was written on.
    pub channel: String,
    /// TTL of the owning collection, for expired-row elimination.
    pub collection_ttl: Duration,
    /// Segments to merge.
    pub segments: Vec<PlanSegment>,
    /// Sum of row counts across the segments.
    pub total_rows: u64,
}

impl CompactionPlan {
    fn from_bucket(bucket: &[SegmentInfo], compact_time: &CompactTime) -> Self {
        let mut plan = Self {
            plan_id: 0,
            plan_type: PlanType::Mix,
            channel: bucket[0].channel.clone(),
            collection_ttl: compact_time.collection_ttl,
            segments: Vec::with_capacity(bucket.len()),
            total_rows: 0,
        };
        for segment in bucket {
            plan.append_segment(segment);
        }
        plan
    }

    fn append_segment(&mut self, segment: &SegmentInfo) {
        self.total_rows += segment.num_rows;
        self.segments.push(PlanSegment::from_segment(segment));
    }

    /// Ids of the segments in the plan, in emission order.
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.segments.iter().map(|s| s.segment_id).collect()
    }
}

/// Builds plans for the candidates of one (channel, partition) group.
pub(crate) struct PlanGenerator<'a> {
    oracle: &'a dyn IndexVersionOracle,
    options: &'a TriggerOptions,
}

impl<'a> PlanGenerator<'a> {
    pub(crate) fn new(oracle: &'a dyn IndexVersionOracle, options: &'a TriggerOptions) -> Self {
        Self { oracle, options }
    }

    /// Partition `segments` into prioritized / small / non-planned and pack
    /// them into plans.
    pub(crate) fn generate_plans(
        &self,
        segments: Vec<SegmentInfo>,
        force: bool,
        is_disk_index: bool,
        compact_time: &CompactTime,
    ) -> Vec<CompactionPlan> {
        let mut prioritized = Vec::new();
        let mut small = Vec::new();
        let mut non_planned = Vec::new();
        for segment in segments {
            if force
                || should_do_single_compaction(
                    &segment,
                    is_disk_index,
                    compact_time,
                    self.oracle,
                    self.options,
                )
            {
                prioritized.push(segment);
            } else if is_small_segment(&segment, self.options) {
                small.push(segment);
            } else {
                non_planned.push(segment);
            }
        }

        // Prioritized and small: large rows first, smaller id breaks ties.
        prioritized.sort_by(|a, b| b.num_rows.cmp(&a.num_rows).then_with(|| a.id.cmp(&b.id)));
        small.sort_by(|a, b| b.num_rows.cmp(&a.num_rows).then_with(|| a.id.cmp(&b.id)));
        // Non-planned: small rows first, larger id breaks ties.
        non_planned.sort_by(|a, b| a.num_rows.cmp(&b.num_rows).then_with(|| b.id.cmp(&a.id)));

        let mut plans = Vec::new();

        // Priority pass: every prioritized segment must end up in a plan,
        // even alone. Fill remaining capacity from peers, then from smalls.
        while !prioritized.is_empty() {
            let head = prioritized.remove(0);
            let head_rows = head.num_rows;
            let head_max = head.max_row_num;
            let mut bucket = vec![head];
            if head_rows < head_max {
                let mut free = head_max - head_rows;
                let mut slots = self.options.max_segment_to_merge - 1;
                let picked = greedy_select(&mut prioritized, &mut free, slots);
                slots -= picked.len();
                bucket.extend(picked);
                if slots > 0 {
                    bucket.extend(greedy_select(&mut small, &mut free, slots));
                }
            }
            let plan = CompactionPlan::from_bucket(&bucket, compact_time);
            log_info!(
                component = "planner",
                event = "priority_plan_generated",
                segment_ids = ?plan.segment_ids(),
                total_rows = plan.total_rows,
            );
            plans.push(plan);
        }

        // Small pass: seed with the largest small segment and aggregate from
        // the tail upward. Scanning in reverse merges many tiny segments with
        // one large-ish head; two equally half-full heads would otherwise
        // never combine because neither fits in the other's free space.
        let mut remaining_small: Vec<SegmentInfo> = Vec::new();
        while !small.is_empty() {
            let head = small.remove(0);
            let head_rows = head.num_rows;
            let head_max = head.max_row_num;
            let mut bucket = vec![head];
            let mut free = head_max.saturating_sub(head_rows);
            bucket.extend(reverse_greedy_select(
                &mut small,
                &mut free,
                self.options.max_segment_to_merge - 1,
            ));

            let target_rows: u64 = bucket.iter().map(|s| s.num_rows).sum();
            if bucket.len() >= self.options.min_segment_to_merge
                || (bucket.len() > 1 && is_compactable(target_rows, &bucket[0], self.options))
            {
                let plan = CompactionPlan::from_bucket(&bucket, compact_time);
                log_info!(
                    component = "planner",
                    event = "small_plan_generated",
                    segment_ids = ?plan.segment_ids(),
                    total_rows = plan.total_rows,
                );
                plans.push(plan);
            } else {
                remaining_small.extend(bucket);
            }
        }

        // Squeeze leftovers into already-emitted plans, first fit. This may
        // push a plan past max_row_num, bounded by the expansion rate.
        let mut i = remaining_small.len();
        while i > 0 {
            i -= 1;
            if !is_expandable_small_segment(&remaining_small[i], self.options) {
                continue;
            }
            let limit = (self.options.segment_expansion_rate
                * remaining_small[i].max_row_num as f64) as u64;
            let mut appended = false;
            for plan in plans.iter_mut() {
                if plan.total_rows + remaining_small[i].num_rows <= limit {
                    plan.append_segment(&remaining_small[i]);
                    log_debug!(
                        component = "planner",
                        event = "small_segment_squeezed",
                        segment_id = remaining_small[i].id,
                        plan_total_rows = plan.total_rows,
                    );
                    appended = true;
                    break;
                }
            }
            if appended {
                remaining_small.remove(i);
            }
        }

        // Last resort: open a bucket around each non-planned segment and fold
        // in whatever leftovers fit under its expansion limit.
        for seed in non_planned {
            let limit =
                (self.options.segment_expansion_rate * seed.max_row_num as f64) as u64;
            let mut target_rows = seed.num_rows;
            let mut bucket = vec![seed];
            let mut i = remaining_small.len();
            while i > 0 {
                i -= 1;
                if target_rows + remaining_small[i].num_rows <= limit {
                    target_rows += remaining_small[i].num_rows;
                    bucket.push(remaining_small.remove(i));
                }
            }
            if bucket.len() > 1 {
                let plan = CompactionPlan::from_bucket(&bucket, compact_time);
                log_info!(
                    component = "planner",
                    event = "squeeze_plan_generated",
                    segment_ids = ?plan.segment_ids(),
                    total_rows = plan.total_rows,
                );
                plans.push(plan);
            }
        }

        plans
    }
}

/// Move candidates fitting into `free` out of `candidates`, head to tail,
/// up to `max_count` of them. A segment exactly equal to the free space is
/// not taken.
fn greedy_select(
    candidates: &mut Vec<SegmentInfo>,
    free: &mut u64,
    max_count: usize,
) -> Vec<SegmentInfo> {
    let mut result = Vec::new();
    let mut i = 0;
    while i < candidates.len() {
        if result.len() < max_count && candidates[i].num_rows < *free {
            *free -= candidates[i].num_rows;
            result.push(candidates.remove(i));
        } else {
            i += 1;
        }
    }
    result
}

/// Like [`greedy_select`] but scanning tail to head.
fn reverse_greedy_select(
    candidates: &mut Vec<SegmentInfo>,
    free: &mut u64,
    max_count: usize,
) -> Vec<SegmentInfo> {
    let mut result = Vec::new();
    let mut i = candidates.len();
    while i > 0 {
        i -= 1;
        if result.len() < max_count && candidates[i].num_rows < *free {
            *free -= candidates[i].num_rows;
            result.push(candidates.remove(i));
        }
    }
    result
}
