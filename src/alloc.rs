//! Cluster id/timestamp allocation contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::{BoxError, TriggerError},
    tso::Timestamp,
};

/// Deadline applied to every allocator call.
pub(crate) const ALLOC_DEADLINE: Duration = Duration::from_secs(5);

/// Cluster-unique id and timestamp source.
#[async_trait]
pub trait Allocator: Send + Sync {
    /// Allocate one cluster-unique id.
    async fn alloc_id(&self) -> Result<u64, BoxError>;

    /// Allocate a hybrid logical timestamp.
    async fn alloc_timestamp(&self) -> Result<Timestamp, BoxError>;
}

/// Id allocation wrapped in the trigger-wide deadline.
pub(crate) async fn alloc_id_with_deadline(
    allocator: &dyn Allocator,
) -> Result<u64, TriggerError> {
    match tokio::time::timeout(ALLOC_DEADLINE, allocator.alloc_id()).await {
        Ok(Ok(id)) => Ok(id),
        Ok(Err(source)) => Err(TriggerError::Allocator { source }),
        Err(_) => Err(TriggerError::AllocatorTimeout(ALLOC_DEADLINE)),
    }
}

/// Timestamp allocation wrapped in the trigger-wide deadline.
pub(crate) async fn alloc_ts_with_deadline(
    allocator: &dyn Allocator,
) -> Result<Timestamp, TriggerError> {
    match tokio::time::timeout(ALLOC_DEADLINE, allocator.alloc_timestamp()).await {
        Ok(Ok(ts)) => Ok(ts),
        Ok(Err(source)) => Err(TriggerError::Allocator { source }),
        Err(_) => Err(TriggerError::AllocatorTimeout(ALLOC_DEADLINE)),
    }
}
