//! Signal dispatching and trigger lifecycle.
//!
//! Three sources feed compaction: the periodic ticker posts global signals,
//! ingestion posts per-segment signals after each flush, and operators force
//! an immediate run. The first two flow through a bounded queue drained by a
//! single dispatcher task; forced runs execute on the caller's task. All
//! three serialize plan generation behind one trigger-wide mutex.

use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Instant,
};

use tokio::{
    sync::{mpsc, mpsc::error::TrySendError, watch, Mutex},
    task::JoinHandle,
    time::{interval_at, Instant as TokioInstant},
};

use crate::{
    alloc::{alloc_id_with_deadline, alloc_ts_with_deadline, Allocator},
    compaction::{
        executor::PlanExecutor,
        inventory,
        metrics::{TriggerMetrics, TriggerMetricsSnapshot},
        planner::{CompactionPlan, PlanGenerator},
        policy::CompactTime,
        sizing,
    },
    error::TriggerError,
    index::IndexVersionOracle,
    meta::{CollectionId, MetaStore, PartitionId, SegmentId},
    observability::{log_info, log_warn},
    option::TriggerOptions,
    schema::{get_collection_with_deadline, SchemaHandler},
};

/// Unique signal identifier, allocated from the cluster id space.
pub type SignalId = u64;

/// One request to evaluate compaction.
#[derive(Debug, Clone)]
pub struct CompactionSignal {
    /// Signal identifier.
    pub id: SignalId,
    /// Bypass backpressure and per-collection auto-compaction toggles.
    pub is_force: bool,
    /// Scan the whole collection, or the whole cluster when
    /// `collection_id` is zero.
    pub is_global: bool,
    /// Collection scope. Zero means all collections for global signals.
    pub collection_id: CollectionId,
    /// Partition of the flushed segment, for per-segment signals.
    pub partition_id: PartitionId,
    /// The flushed segment, for per-segment signals.
    pub segment_id: SegmentId,
    /// Channel of the flushed segment, for per-segment signals.
    pub channel: String,
}

impl CompactionSignal {
    fn global(id: SignalId, collection_id: CollectionId, is_force: bool) -> Self {
        Self {
            id,
            is_force,
            is_global: true,
            collection_id,
            partition_id: 0,
            segment_id: 0,
            channel: String::new(),
        }
    }
}

struct Lifecycle {
    signal_rx: Option<mpsc::Receiver<CompactionSignal>>,
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

/// The compaction trigger: decides which segments to merge and hands plans
/// to the executor.
///
/// [`start`](CompactionTrigger::start) spawns the dispatcher and ticker
/// tasks; [`stop`](CompactionTrigger::stop) shuts both down and joins them.
/// Signal posting methods may be called from any task.
pub struct CompactionTrigger {
    inner: Arc<TriggerInner>,
    signal_tx: mpsc::Sender<CompactionSignal>,
    lifecycle: StdMutex<Lifecycle>,
}

struct TriggerInner {
    meta: Arc<dyn MetaStore>,
    schemas: Arc<dyn SchemaHandler>,
    allocator: Arc<dyn Allocator>,
    executor: Arc<dyn PlanExecutor>,
    oracle: Arc<dyn IndexVersionOracle>,
    options: Arc<TriggerOptions>,
    // Serializes every global and per-segment handler invocation: at most
    // one plan generation is in flight at a time.
    force_mu: Mutex<()>,
    metrics: TriggerMetrics,
}

impl CompactionTrigger {
    /// Build a trigger over the given collaborators.
    pub fn new(
        meta: Arc<dyn MetaStore>,
        schemas: Arc<dyn SchemaHandler>,
        allocator: Arc<dyn Allocator>,
        executor: Arc<dyn PlanExecutor>,
        oracle: Arc<dyn IndexVersionOracle>,
        options: TriggerOptions,
    ) -> Result<Self, TriggerError> {
        options.validate()?;
        let (signal_tx, signal_rx) = mpsc::channel(options.signal_queue_capacity);
        Ok(Self {
            inner: Arc::new(TriggerInner {
                meta,
                schemas,
                allocator,
                executor,
                oracle,
                options: Arc::new(options),
                force_mu: Mutex::new(()),
                metrics: TriggerMetrics::default(),
            }),
            signal_tx,
            lifecycle: StdMutex::new(Lifecycle {
                signal_rx: Some(signal_rx),
                shutdown: None,
                tasks: Vec::new(),
            }),
        })
    }

    /// Spawn the dispatcher and the periodic ticker.
    ///
    /// When auto-compaction is disabled the ticker exits immediately; the
    /// dispatcher still runs so per-segment and forced signals are served.
    pub fn start(&self) {
        let mut lifecycle = match self.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(signal_rx) = lifecycle.signal_rx.take() else {
            log_warn!(component = "trigger", event = "trigger_already_started");
            return;
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(dispatch_loop(
            Arc::clone(&self.inner),
            signal_rx,
            shutdown_rx.clone(),
        ));
        let ticker = tokio::spawn(ticker_loop(
            Arc::clone(&self.inner),
            self.signal_tx.clone(),
            shutdown_rx,
        ));
        lifecycle.shutdown = Some(shutdown_tx);
        lifecycle.tasks = vec![dispatcher, ticker];
        log_info!(component = "trigger", event = "trigger_started");
    }

    /// Signal shutdown and wait for the dispatcher and ticker to exit.
    ///
    /// A plan submission already in flight is allowed to finish.
    pub async fn stop(&self) {
        let (shutdown, tasks) = {
            let mut lifecycle = match self.lifecycle.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            (lifecycle.shutdown.take(), std::mem::take(&mut lifecycle.tasks))
        };
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(true);
        }
        let _ = futures::future::join_all(tasks).await;
        log_info!(component = "trigger", event = "trigger_stopped");
    }

    /// Enqueue a cluster-wide compaction signal. Blocks when the queue is
    /// full. Called by the periodic ticker.
    pub async fn trigger_compaction(&self) -> Result<(), TriggerError> {
        enqueue_global(&self.inner, &self.signal_tx).await
    }

    /// Enqueue a per-segment compaction signal, typically after a flush.
    ///
    /// Does nothing when auto-compaction is disabled. With `block_to_send`
    /// unset, a full queue drops the signal silently: load shedding here is
    /// the documented policy, the next global tick will pick the segment up.
    pub async fn trigger_single_compaction(
        &self,
        collection_id: CollectionId,
        partition_id: PartitionId,
        segment_id: SegmentId,
        channel: &str,
        block_to_send: bool,
    ) -> Result<(), TriggerError> {
        if !self.inner.options.enable_auto_compaction {
            return Ok(());
        }
        let id = alloc_id_with_deadline(self.inner.allocator.as_ref()).await?;
        let signal = CompactionSignal {
            id,
            is_force: false,
            is_global: false,
            collection_id,
            partition_id,
            segment_id,
            channel: channel.to_string(),
        };
        if block_to_send {
            return self
                .signal_tx
                .send(signal)
                .await
                .map_err(|_| TriggerError::Closed);
        }
        match self.signal_tx.try_send(signal) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(signal)) => {
                self.inner.metrics.record_signal_dropped();
                log_info!(
                    component = "trigger",
                    event = "signal_dropped_queue_full",
                    signal_id = signal.id,
                    collection_id = signal.collection_id,
                    segment_id = signal.segment_id,
                    channel = %signal.channel,
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(TriggerError::Closed),
        }
    }

    /// Run a forced, global compaction for `collection_id` on the calling
    /// task, bypassing the queue, executor backpressure, and the
    /// per-collection auto-compaction toggle. Returns the signal id.
    pub async fn force_trigger_compaction(
        &self,
        collection_id: CollectionId,
    ) -> Result<SignalId, TriggerError> {
        let id = alloc_id_with_deadline(self.inner.allocator.as_ref()).await?;
        let signal = CompactionSignal::global(id, collection_id, true);
        if let Err(err) = self.inner.handle_global_signal(&signal).await {
            log_warn!(
                component = "trigger",
                event = "force_compaction_failed",
                signal_id = id,
                collection_id,
                error = %err,
            );
            return Err(err);
        }
        Ok(id)
    }

    /// Current trigger counters.
    pub fn metrics(&self) -> TriggerMetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

async fn enqueue_global(
    inner: &TriggerInner,
    signal_tx: &mpsc::Sender<CompactionSignal>,
) -> Result<(), TriggerError> {
    let id = alloc_id_with_deadline(inner.allocator.as_ref()).await?;
    signal_tx
        .send(CompactionSignal::global(id, 0, false))
        .await
        .map_err(|_| TriggerError::Closed)
}

async fn dispatch_loop(
    inner: Arc<TriggerInner>,
    mut signal_rx: mpsc::Receiver<CompactionSignal>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                log_info!(component = "trigger", event = "dispatcher_quit");
                return;
            }
            signal = signal_rx.recv() => {
                let Some(signal) = signal else {
                    log_info!(component = "trigger", event = "dispatcher_quit");
                    return;
                };
                inner.metrics.record_signal_handled();
                if signal.is_global {
                    if let Err(err) = inner.handle_global_signal(&signal).await {
                        log_warn!(
                            component = "trigger",
                            event = "global_signal_failed",
                            signal_id = signal.id,
                            error = %err,
                        );
                    }
                } else {
                    inner.handle_signal(&signal).await;
                }
            }
        }
    }
}

async fn ticker_loop(
    inner: Arc<TriggerInner>,
    signal_tx: mpsc::Sender<CompactionSignal>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // With auto-compaction off the periodic loop never runs; single and
    // forced signals are still served by the dispatcher.
    if !inner.options.enable_auto_compaction {
        log_info!(component = "trigger", event = "global_loop_disabled");
        return;
    }
    let period = inner.options.global_compaction_interval;
    let mut ticker = interval_at(TokioInstant::now() + period, period);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                log_info!(component = "trigger", event = "global_loop_exit");
                return;
            }
            _ = ticker.tick() => {
                inner.metrics.record_tick();
                if let Err(err) = enqueue_global(&inner, &signal_tx).await {
                    if matches!(err, TriggerError::Closed) {
                        return;
                    }
                    log_warn!(
                        component = "trigger",
                        event = "periodic_trigger_failed",
                        error = %err,
                    );
                }
            }
        }
    }
}

impl TriggerInner {
    /// Handle a global signal: scan the inventory, group it, and plan each
    /// group in turn.
    async fn handle_global_signal(&self, signal: &CompactionSignal) -> Result<(), TriggerError> {
        let _guard = self.force_mu.lock().await;

        let mut groups =
            inventory::grouped_by_channel_partition(self.meta.as_ref(), signal.collection_id)
                .await;
        if groups.is_empty() {
            log_info!(
                component = "trigger",
                event = "no_candidate_groups",
                signal_id = signal.id,
                collection_id = signal.collection_id,
            );
            return Ok(());
        }

        let ts = match alloc_ts_with_deadline(self.allocator.as_ref()).await {
            Ok(ts) => ts,
            Err(err) => {
                log_warn!(
                    component = "trigger",
                    event = "alloc_ts_failed",
                    signal_id = signal.id,
                    error = %err,
                );
                return Err(err);
            }
        };

        for group in &mut groups {
            if !signal.is_force && self.executor.is_full() {
                log_warn!(
                    component = "trigger",
                    event = "executor_full_groups_deferred",
                    signal_id = signal.id,
                    collection_id = group.collection_id,
                );
                break;
            }
            if self.options.index_based_compaction {
                let segments = std::mem::take(&mut group.segments);
                group.segments =
                    inventory::filter_indexed_segments(self.meta.as_ref(), segments).await;
            }

            let is_disk_index = match sizing::update_segment_max_size(
                self.meta.as_ref(),
                self.schemas.as_ref(),
                &mut group.segments,
                &self.options,
            )
            .await
            {
                Ok(is_disk_index) => is_disk_index,
                Err(err) => {
                    log_warn!(
                        component = "trigger",
                        event = "update_segment_max_size_failed",
                        collection_id = group.collection_id,
                        error = %err,
                    );
                    continue;
                }
            };

            let collection = match get_collection_with_deadline(
                self.schemas.as_ref(),
                group.collection_id,
            )
            .await
            {
                Ok(collection) => collection,
                Err(err) => {
                    log_warn!(
                        component = "trigger",
                        event = "collection_fetch_failed",
                        collection_id = group.collection_id,
                        error = %err,
                    );
                    continue;
                }
            };

            if !signal.is_force && !collection.auto_compaction_enabled_or_false() {
                log_info!(
                    component = "trigger",
                    event = "collection_auto_compaction_disabled",
                    signal_id = signal.id,
                    collection_id = group.collection_id,
                );
                // Returning here abandons every remaining group of the
                // signal, not just this collection. Surprising for
                // cluster-wide signals, but downstreams rely on the
                // observable behavior, so it is kept.
                return Ok(());
            }

            let compact_time = CompactTime::new(ts, collection.ttl_or_zero());
            let plans = PlanGenerator::new(self.oracle.as_ref(), &self.options).generate_plans(
                std::mem::take(&mut group.segments),
                signal.is_force,
                is_disk_index,
                &compact_time,
            );
            self.submit_plans(signal, plans, &group.channel, group.partition_id)
                .await;
        }
        Ok(())
    }

    /// Handle a per-segment signal: plan the (channel, partition) of the
    /// flushed segment.
    async fn handle_signal(&self, signal: &CompactionSignal) {
        let _guard = self.force_mu.lock().await;

        if self.executor.is_full() {
            log_warn!(
                component = "trigger",
                event = "executor_full_signal_skipped",
                signal_id = signal.id,
            );
            return;
        }

        let Some(segment) = self.meta.get_healthy_segment(signal.segment_id).await else {
            log_warn!(
                component = "trigger",
                event = "signal_segment_missing",
                signal_id = signal.id,
                segment_id = signal.segment_id,
            );
            return;
        };
        let channel = segment.channel.clone();
        let partition_id = segment.partition_id;
        let collection_id = segment.collection_id;

        let mut segments = inventory::candidates_for_channel_partition(
            self.meta.as_ref(),
            &channel,
            partition_id,
        )
        .await;
        if self.options.index_based_compaction {
            segments = inventory::filter_indexed_segments(self.meta.as_ref(), segments).await;
        }
        if segments.is_empty() {
            log_info!(
                component = "trigger",
                event = "no_candidate_segments",
                signal_id = signal.id,
                channel = %channel,
                partition_id,
            );
            return;
        }

        let is_disk_index = match sizing::update_segment_max_size(
            self.meta.as_ref(),
            self.schemas.as_ref(),
            &mut segments,
            &self.options,
        )
        .await
        {
            Ok(is_disk_index) => is_disk_index,
            Err(err) => {
                log_warn!(
                    component = "trigger",
                    event = "update_segment_max_size_failed",
                    collection_id,
                    error = %err,
                );
                return;
            }
        };

        let ts = match alloc_ts_with_deadline(self.allocator.as_ref()).await {
            Ok(ts) => ts,
            Err(err) => {
                log_warn!(
                    component = "trigger",
                    event = "alloc_ts_failed",
                    signal_id = signal.id,
                    error = %err,
                );
                return;
            }
        };

        let collection =
            match get_collection_with_deadline(self.schemas.as_ref(), collection_id).await {
                Ok(collection) => collection,
                Err(err) => {
                    log_warn!(
                        component = "trigger",
                        event = "collection_fetch_failed",
                        collection_id,
                        error = %err,
                    );
                    return;
                }
            };

        if !signal.is_force && !collection.auto_compaction_enabled_or_false() {
            log_info!(
                component = "trigger",
                event = "collection_auto_compaction_disabled",
                signal_id = signal.id,
                collection_id,
            );
            return;
        }

        let compact_time = CompactTime::new(ts, collection.ttl_or_zero());
        let plans = PlanGenerator::new(self.oracle.as_ref(), &self.options).generate_plans(
            segments,
            signal.is_force,
            is_disk_index,
            &compact_time,
        );
        self.submit_plans(signal, plans, &channel, partition_id).await;
    }

    /// Fill and submit plans in emission order, re-checking executor
    /// capacity before each one unless the signal is forced.
    async fn submit_plans(
        &self,
        signal: &CompactionSignal,
        plans: Vec<CompactionPlan>,
        channel: &str,
        partition_id: PartitionId,
    ) {
        for mut plan in plans {
            if !signal.is_force && self.executor.is_full() {
                self.metrics.record_plan_skipped_executor_full();
                log_warn!(
                    component = "trigger",
                    event = "executor_full_plan_skipped",
                    signal_id = signal.id,
                    segment_ids = ?plan.segment_ids(),
                );
                break;
            }
            let started = Instant::now();
            if let Err(err) = self.fill_plan(&mut plan).await {
                self.metrics.record_plan_fill_failure();
                log_warn!(
                    component = "trigger",
                    event = "plan_fill_failed",
                    signal_id = signal.id,
                    segment_ids = ?plan.segment_ids(),
                    error = %err,
                );
                continue;
            }
            let plan_id = plan.plan_id;
            let segment_ids = plan.segment_ids();
            let total_rows = plan.total_rows;
            if let Err(source) = self.executor.submit(signal, plan).await {
                self.metrics.record_submit_failure();
                let err = TriggerError::Submit { plan_id, source };
                log_warn!(
                    component = "trigger",
                    event = "plan_submit_failed",
                    signal_id = signal.id,
                    plan_id,
                    segment_ids = ?segment_ids,
                    error = %err,
                );
                continue;
            }
            self.metrics.record_plan_submitted();
            log_info!(
                component = "trigger",
                event = "plan_submitted",
                signal_id = signal.id,
                plan_id,
                channel = %channel,
                partition_id,
                segment_ids = ?segment_ids,
                total_rows,
                elapsed_ms = started.elapsed().as_millis() as u64,
            );
        }
    }

    /// Assign the plan id from the cluster id space.
    async fn fill_plan(&self, plan: &mut CompactionPlan) -> Result<(), TriggerError> {
        plan.plan_id = alloc_id_with_deadline(self.allocator.as_ref()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicBool, AtomicU64, Ordering},
        time::{Duration, SystemTime},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        error::BoxError,
        index::IndexInfo,
        meta::{FieldBinlog, LogEntry, SegmentIndex, SegmentInfo, SegmentLevel, SegmentState},
        schema::{
            CollectionInfo, CollectionSchema, DataType, FieldSchema, PROPERTY_AUTO_COMPACTION,
        },
        tso::{compose, Timestamp},
    };

    struct MockMeta {
        segments: Vec<SegmentInfo>,
    }

    #[async_trait]
    impl MetaStore for MockMeta {
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
            Ok(Vec::new())
        }

        async fn segments_by_channel(&self, channel: &str) -> Vec<SegmentInfo> {
            self.segments
                .iter()
                .filter(|s| s.channel == channel)
                .cloned()
                .collect()
        }
    }

    struct MockSchemas {
        collections: HashMap<CollectionId, CollectionInfo>,
    }

    #[async_trait]
    impl SchemaHandler for MockSchemas {
        async fn get_collection(
            &self,
            collection_id: CollectionId,
        ) -> Result<CollectionInfo, BoxError> {
            self.collections
                .get(&collection_id)
                .cloned()
                .ok_or_else(|| format!("collection {collection_id} not found").into())
        }
    }

    struct SequenceAllocator {
        next_id: AtomicU64,
        ts: Timestamp,
    }

    impl SequenceAllocator {
        fn new() -> Self {
            Self {
                next_id: AtomicU64::new(1),
                ts: compose(1_000_000_000, 0),
            }
        }
    }

    #[async_trait]
    impl Allocator for SequenceAllocator {
        async fn alloc_id(&self) -> Result<u64, BoxError> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn alloc_timestamp(&self) -> Result<Timestamp, BoxError> {
            Ok(self.ts)
        }
    }

    #[derive(Default)]
    struct CollectingExecutor {
        full: AtomicBool,
        reject: AtomicBool,
        plans: StdMutex<Vec<CompactionPlan>>,
    }

    impl CollectingExecutor {
        fn submitted(&self) -> Vec<CompactionPlan> {
            self.plans.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlanExecutor for CollectingExecutor {
        fn is_full(&self) -> bool {
            self.full.load(Ordering::SeqCst)
        }

        async fn submit(
            &self,
            _signal: &CompactionSignal,
            plan: CompactionPlan,
        ) -> Result<(), BoxError> {
            if self.reject.load(Ordering::SeqCst) {
                return Err("executor rejected plan".into());
            }
            self.plans.lock().unwrap().push(plan);
            Ok(())
        }
    }

    struct FixedOracle(i32);

    impl IndexVersionOracle for FixedOracle {
        fn current(&self) -> i32 {
            self.0
        }
    }

    fn collection(collection_id: CollectionId) -> CollectionInfo {
        CollectionInfo {
            collection_id,
            schema: CollectionSchema {
                name: format!("coll_{collection_id}"),
                fields: vec![
                    FieldSchema {
                        field_id: 100,
                        name: "pk".to_string(),
                        data_type: DataType::Int64,
                        dim: 0,
                        max_length: 0,
                    },
                    FieldSchema {
                        field_id: 101,
                        name: "embedding".to_string(),
                        data_type: DataType::FloatVector,
                        dim: 128,
                        max_length: 0,
                    },
                ],
            },
            properties: HashMap::new(),
        }
    }

    fn segment(id: SegmentId, collection_id: CollectionId, num_rows: u64) -> SegmentInfo {
        SegmentInfo {
            id,
            collection_id,
            partition_id: 1,
            channel: "ch-0".to_string(),
            level: SegmentLevel::L1,
            state: SegmentState::Flushed,
            num_rows,
            max_row_num: 0,
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

    /// Segment with enough delta logs to independently warrant compaction.
    fn delta_heavy_segment(
        id: SegmentId,
        collection_id: CollectionId,
        options: &TriggerOptions,
    ) -> SegmentInfo {
        let mut s = segment(id, collection_id, 1000);
        s.deltalogs = vec![FieldBinlog {
            field_id: 100,
            logs: (0..options.single_compaction_deltalog_max_num as u64 + 1)
                .map(|i| LogEntry {
                    log_id: i,
                    entries_num: 0,
                    log_size: 0,
                    timestamp_from: 0,
                    timestamp_to: 0,
                })
                .collect(),
        }];
        s
    }

    struct Fixture {
        trigger: CompactionTrigger,
        executor: Arc<CollectingExecutor>,
    }

    fn fixture(
        segments: Vec<SegmentInfo>,
        collections: Vec<CollectionInfo>,
        options: TriggerOptions,
    ) -> Fixture {
        let executor = Arc::new(CollectingExecutor::default());
        let trigger = CompactionTrigger::new(
            Arc::new(MockMeta { segments }),
            Arc::new(MockSchemas {
                collections: collections
                    .into_iter()
                    .map(|c| (c.collection_id, c))
                    .collect(),
            }),
            Arc::new(SequenceAllocator::new()),
            Arc::clone(&executor) as Arc<dyn PlanExecutor>,
            Arc::new(FixedOracle(1)),
            options,
        )
        .unwrap();
        Fixture { trigger, executor }
    }

    async fn wait_for_plans(executor: &CollectingExecutor, count: usize) {
        for _ in 0..200 {
            if executor.plans.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} plans, got {}", executor.plans.lock().unwrap().len());
    }

    #[tokio::test]
    async fn force_submits_even_when_executor_is_full() {
        let options = TriggerOptions::default();
        let fx = fixture(
            vec![segment(1, 1, 1000)],
            vec![collection(1)],
            options,
        );
        fx.executor.full.store(true, Ordering::SeqCst);

        let signal_id = fx.trigger.force_trigger_compaction(1).await.unwrap();
        assert!(signal_id > 0);

        let plans = fx.executor.submitted();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].segment_ids(), vec![1]);
        assert!(plans[0].plan_id > 0);
    }

    #[tokio::test]
    async fn non_forced_global_defers_when_executor_is_full() {
        let options = TriggerOptions::default();
        let fx = fixture(
            vec![delta_heavy_segment(1, 1, &TriggerOptions::default())],
            vec![collection(1)],
            options,
        );
        fx.executor.full.store(true, Ordering::SeqCst);

        let signal = CompactionSignal::global(7, 0, false);
        fx.trigger.inner.handle_global_signal(&signal).await.unwrap();
        assert!(fx.executor.submitted().is_empty());
    }

    #[tokio::test]
    async fn nonblocking_single_signal_drops_on_full_queue() {
        let options = TriggerOptions::default().signal_queue_capacity(1);
        let fx = fixture(Vec::new(), vec![collection(1)], options);
        // dispatcher not started: the first signal occupies the queue

        fx.trigger
            .trigger_single_compaction(1, 1, 10, "ch-0", false)
            .await
            .unwrap();
        fx.trigger
            .trigger_single_compaction(1, 1, 11, "ch-0", false)
            .await
            .unwrap();

        assert_eq!(fx.trigger.metrics().signals_dropped_queue_full, 1);
        assert!(fx.executor.submitted().is_empty());
    }

    #[tokio::test]
    async fn disabled_collection_aborts_the_whole_global_signal() {
        let options = TriggerOptions::default();
        let mut disabled = collection(1);
        disabled
            .properties
            .insert(PROPERTY_AUTO_COMPACTION.to_string(), "false".to_string());
        let enabled = collection(2);

        let fx = fixture(
            vec![
                delta_heavy_segment(1, 1, &TriggerOptions::default()),
                delta_heavy_segment(2, 2, &TriggerOptions::default()),
            ],
            vec![disabled, enabled],
            options,
        );

        let signal = CompactionSignal::global(7, 0, false);
        fx.trigger.inner.handle_global_signal(&signal).await.unwrap();
        // collection 1 is disabled; collection 2 is never reached
        assert!(fx.executor.submitted().is_empty());

        // forced signals ignore the toggle
        fx.trigger.force_trigger_compaction(1).await.unwrap();
        assert_eq!(fx.executor.submitted().len(), 1);
    }

    #[tokio::test]
    async fn stale_index_segment_is_planned_alone() {
        let mut options = TriggerOptions::default();
        options.auto_upgrade_segment_index = true;

        let mut stale = segment(1, 1, 10);
        stale.segment_indexes.insert(
            7,
            SegmentIndex {
                index_id: 7,
                current_index_version: 1,
                index_file_keys: vec!["k".to_string()],
            },
        );

        let executor = Arc::new(CollectingExecutor::default());
        let trigger = CompactionTrigger::new(
            Arc::new(MockMeta {
                segments: vec![stale],
            }),
            Arc::new(MockSchemas {
                collections: [(1, collection(1))].into_iter().collect(),
            }),
            Arc::new(SequenceAllocator::new()),
            Arc::clone(&executor) as Arc<dyn PlanExecutor>,
            Arc::new(FixedOracle(2)),
            options,
        )
        .unwrap();

        let signal = CompactionSignal::global(7, 0, false);
        trigger.inner.handle_global_signal(&signal).await.unwrap();

        let plans = executor.submitted();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].segment_ids(), vec![1]);
    }

    #[tokio::test]
    async fn single_signal_plans_its_channel_partition() {
        let options = TriggerOptions::default();
        let fx = fixture(
            vec![delta_heavy_segment(1, 1, &TriggerOptions::default())],
            vec![collection(1)],
            options,
        );
        fx.trigger.start();

        fx.trigger
            .trigger_single_compaction(1, 1, 1, "ch-0", true)
            .await
            .unwrap();
        wait_for_plans(&fx.executor, 1).await;

        let plans = fx.executor.submitted();
        assert_eq!(plans[0].segment_ids(), vec![1]);
        assert_eq!(plans[0].channel, "ch-0");
        fx.trigger.stop().await;
    }

    #[tokio::test]
    async fn single_signal_for_missing_segment_is_dropped() {
        let options = TriggerOptions::default();
        let fx = fixture(Vec::new(), vec![collection(1)], options);

        let signal = CompactionSignal {
            id: 7,
            is_force: false,
            is_global: false,
            collection_id: 1,
            partition_id: 1,
            segment_id: 99,
            channel: "ch-0".to_string(),
        };
        fx.trigger.inner.handle_signal(&signal).await;
        assert!(fx.executor.submitted().is_empty());
    }

    #[tokio::test]
    async fn submit_failures_do_not_abort_the_signal() {
        let options = TriggerOptions::default();
        let fx = fixture(
            vec![delta_heavy_segment(1, 1, &TriggerOptions::default())],
            vec![collection(1)],
            options,
        );
        fx.executor.reject.store(true, Ordering::SeqCst);

        let signal = CompactionSignal::global(7, 0, false);
        fx.trigger.inner.handle_global_signal(&signal).await.unwrap();

        assert!(fx.executor.submitted().is_empty());
        assert_eq!(fx.trigger.metrics().submit_failures, 1);
    }

    #[tokio::test]
    async fn ticker_drives_global_compaction() {
        let options = TriggerOptions::default()
            .global_compaction_interval(Duration::from_millis(20));
        let fx = fixture(
            vec![delta_heavy_segment(1, 1, &TriggerOptions::default())],
            vec![collection(1)],
            options,
        );
        fx.trigger.start();

        wait_for_plans(&fx.executor, 1).await;
        assert!(fx.trigger.metrics().ticks >= 1);
        fx.trigger.stop().await;
    }

    #[tokio::test]
    async fn disabled_auto_compaction_ignores_single_signals() {
        let options = TriggerOptions::default().enable_auto_compaction(false);
        let fx = fixture(
            vec![delta_heavy_segment(1, 1, &TriggerOptions::default())],
            vec![collection(1)],
            options,
        );
        fx.trigger.start();

        fx.trigger
            .trigger_single_compaction(1, 1, 1, "ch-0", true)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fx.executor.submitted().is_empty());

        // forced compaction still works
        fx.trigger.force_trigger_compaction(1).await.unwrap();
        assert_eq!(fx.executor.submitted().len(), 1);
        fx.trigger.stop().await;
    }

    #[tokio::test]
    async fn stop_joins_both_tasks_and_closes_the_queue() {
        let options = TriggerOptions::default();
        let fx = fixture(Vec::new(), vec![collection(1)], options);
        fx.trigger.start();
        fx.trigger.stop().await;

        let err = fx.trigger.trigger_compaction().await.unwrap_err();
        assert!(matches!(err, TriggerError::Closed));
    }
}
