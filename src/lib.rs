#![deny(missing_docs)]
//! Compaction triggering for the Quiver storage coordinator.
//!
//! Ingestion leaves a trail of flushed, append-only segments behind; deletes
//! and TTLs fragment them further. This crate watches the segment inventory
//! and decides *which* segments to merge, *when*, and *in what groupings*,
//! then hands execution plans to a downstream engine. It never performs
//! merges and persists no state of its own.
//!
//! The entry point is [`CompactionTrigger`]: construct it over the
//! collaborator traits ([`MetaStore`], [`SchemaHandler`], [`Allocator`],
//! [`PlanExecutor`], [`IndexVersionOracle`]), call
//! [`start`](CompactionTrigger::start), and post signals.

/// Cluster id/timestamp allocation contract.
pub mod alloc;
/// Compaction triggering, evaluation, and planning.
pub mod compaction;
/// Error taxonomy.
pub mod error;
/// Index metadata model.
pub mod index;
/// Segment metadata model and the metastore contract.
pub mod meta;
pub(crate) mod observability;
/// Trigger configuration.
pub mod option;
/// Collection schemas and the schema handler contract.
pub mod schema;
/// Hybrid logical timestamp helpers.
pub mod tso;

pub use alloc::Allocator;
pub use compaction::{
    CompactTime, CompactionPlan, CompactionSignal, CompactionTrigger, PlanExecutor, PlanId,
    PlanSegment, PlanType, SignalId,
};
pub use error::{BoxError, TriggerError};
pub use index::{IndexInfo, IndexType, IndexVersionOracle};
pub use meta::{
    CollectionId, FieldBinlog, FieldId, IndexId, LogEntry, MetaStore, PartitionId, SegmentId,
    SegmentIndex, SegmentInfo, SegmentLevel, SegmentState,
};
pub use option::TriggerOptions;
pub use schema::{CollectionInfo, CollectionSchema, DataType, FieldSchema, SchemaHandler};
pub use tso::Timestamp;
