//! Contract between the trigger and the downstream plan execution engine.

use async_trait::async_trait;

use crate::{
    compaction::{planner::CompactionPlan, trigger::CompactionSignal},
    error::BoxError,
};

/// Execution engine that runs compaction plans produced by the trigger.
///
/// The trigger consults [`is_full`](PlanExecutor::is_full) for backpressure
/// before group processing and again before each submission; forced signals
/// bypass both checks and may submit into a saturated executor.
#[async_trait]
pub trait PlanExecutor: Send + Sync {
    /// Whether the executor is saturated and new plans should be deferred.
    fn is_full(&self) -> bool;

    /// Hand over one plan for execution.
    async fn submit(
        &self,
        signal: &CompactionSignal,
        plan: CompactionPlan,
    ) -> Result<(), BoxError>;
}
