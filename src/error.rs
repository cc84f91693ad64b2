//! Error taxonomy of the compaction trigger.

use std::time::Duration;

use thiserror::Error;

use crate::meta::CollectionId;

/// Opaque error produced by a collaborator implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by trigger operations.
///
/// None of these are fatal to the dispatcher task: transient failures abort
/// the current signal or group and the next tick retries.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The allocator rejected an id or timestamp request.
    #[error("allocator request failed: {source}")]
    Allocator {
        /// Underlying allocator error.
        #[source]
        source: BoxError,
    },

    /// The allocator did not answer within the deadline.
    #[error("allocator request timed out after {0:?}")]
    AllocatorTimeout(Duration),

    /// Collection lookup failed.
    #[error("collection {collection_id} lookup failed: {source}")]
    Collection {
        /// Collection that was being fetched.
        collection_id: CollectionId,
        /// Underlying handler error.
        #[source]
        source: BoxError,
    },

    /// Collection lookup did not answer within the deadline.
    #[error("collection {collection_id} lookup timed out")]
    CollectionTimeout {
        /// Collection that was being fetched.
        collection_id: CollectionId,
    },

    /// Index metadata lookup failed.
    #[error("index lookup for collection {collection_id} failed: {source}")]
    IndexLookup {
        /// Collection whose indexes were being fetched.
        collection_id: CollectionId,
        /// Underlying metastore error.
        #[source]
        source: BoxError,
    },

    /// A collection property did not parse.
    #[error("malformed collection property {key}={value:?}")]
    MalformedProperty {
        /// Property key.
        key: &'static str,
        /// Raw property value.
        value: String,
    },

    /// The average row size of a collection cannot be estimated, so the
    /// sizing policy cannot run.
    #[error("cannot estimate row size for collection {0}")]
    RowSizeUnknown(CollectionId),

    /// Plan submission was rejected by the executor.
    #[error("plan {plan_id} submission failed: {source}")]
    Submit {
        /// Plan that was being submitted.
        plan_id: u64,
        /// Underlying executor error.
        #[source]
        source: BoxError,
    },

    /// The trigger has been stopped; the signal queue is closed.
    #[error("compaction trigger is closed")]
    Closed,

    /// Rejected configuration.
    #[error("invalid trigger options: {0}")]
    InvalidOptions(&'static str),
}
