//! Collection schemas, collection properties, and the schema handler
//! contract.
//!
//! The sizing policy converts byte budgets into row budgets using the
//! average row size estimated from the schema, so the field model here only
//! carries what that estimate needs.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;

use crate::{
    error::{BoxError, TriggerError},
    meta::{CollectionId, FieldId},
    observability::log_warn,
};

/// Collection property holding the data TTL in seconds.
pub const PROPERTY_COLLECTION_TTL: &str = "collection.ttl.seconds";
/// Collection property toggling automatic compaction.
pub const PROPERTY_AUTO_COMPACTION: &str = "collection.autocompaction.enabled";

/// Deadline applied to every collection fetch.
pub(crate) const COLLECTION_FETCH_DEADLINE: Duration = Duration::from_secs(1);

/// Logical type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Boolean scalar.
    Bool,
    /// 8-bit integer scalar.
    Int8,
    /// 16-bit integer scalar.
    Int16,
    /// 32-bit integer scalar.
    Int32,
    /// 64-bit integer scalar.
    Int64,
    /// 32-bit float scalar.
    Float,
    /// 64-bit float scalar.
    Double,
    /// Variable-length string.
    VarChar,
    /// JSON document.
    Json,
    /// Dense float vector.
    FloatVector,
    /// Packed binary vector.
    BinaryVector,
    /// Sparse float vector.
    SparseFloatVector,
}

impl DataType {
    /// Whether the type is a vector type.
    pub fn is_vector(self) -> bool {
        matches!(
            self,
            DataType::FloatVector | DataType::BinaryVector | DataType::SparseFloatVector
        )
    }
}

/// One field of a collection schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    /// Field identifier.
    pub field_id: FieldId,
    /// Field name.
    pub name: String,
    /// Logical type.
    pub data_type: DataType,
    /// Dimensionality for dense vector fields, zero otherwise.
    pub dim: u32,
    /// Declared maximum length for var-length fields, zero otherwise.
    pub max_length: u32,
}

impl FieldSchema {
    /// Average on-disk bytes one row of this field occupies.
    ///
    /// Returns `None` for types whose footprint cannot be estimated from the
    /// schema alone (sparse vectors).
    fn average_row_size(&self) -> Option<u64> {
        match self.data_type {
            DataType::Bool | DataType::Int8 => Some(1),
            DataType::Int16 => Some(2),
            DataType::Int32 | DataType::Float => Some(4),
            DataType::Int64 | DataType::Double => Some(8),
            // Assume half of the declared capacity is used on average.
            DataType::VarChar => Some(u64::from(self.max_length.max(2)) / 2),
            DataType::Json => Some(64),
            DataType::FloatVector => Some(u64::from(self.dim) * 4),
            DataType::BinaryVector => Some(u64::from(self.dim) / 8),
            DataType::SparseFloatVector => None,
        }
    }
}

/// Schema of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldSchema>,
}

impl CollectionSchema {
    /// Fields with a vector type.
    pub fn vector_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.data_type.is_vector())
    }

    /// Estimated average bytes per row across all fields.
    ///
    /// Returns `None` when the schema is empty or contains a field whose
    /// footprint cannot be estimated, in which case sizing cannot run.
    pub fn estimate_row_size(&self) -> Option<u64> {
        if self.fields.is_empty() {
            return None;
        }
        self.fields
            .iter()
            .map(FieldSchema::average_row_size)
            .try_fold(0u64, |acc, size| size.map(|s| acc + s))
    }
}

/// Collection metadata as served by the schema handler.
#[derive(Debug, Clone, Default)]
pub struct CollectionInfo {
    /// Collection identifier.
    pub collection_id: CollectionId,
    /// Collection schema.
    pub schema: CollectionSchema,
    /// Free-form collection properties.
    pub properties: HashMap<String, String>,
}

impl CollectionInfo {
    /// Parsed `collection.ttl.seconds` property. Absent means no TTL.
    pub fn ttl(&self) -> Result<Duration, TriggerError> {
        match self.properties.get(PROPERTY_COLLECTION_TTL) {
            None => Ok(Duration::ZERO),
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| TriggerError::MalformedProperty {
                    key: PROPERTY_COLLECTION_TTL,
                    value: raw.clone(),
                }),
        }
    }

    /// Parsed `collection.autocompaction.enabled` property. Absent means
    /// enabled.
    pub fn auto_compaction_enabled(&self) -> Result<bool, TriggerError> {
        match self.properties.get(PROPERTY_AUTO_COMPACTION) {
            None => Ok(true),
            Some(raw) => raw
                .parse::<bool>()
                .map_err(|_| TriggerError::MalformedProperty {
                    key: PROPERTY_AUTO_COMPACTION,
                    value: raw.clone(),
                }),
        }
    }

    /// TTL with the documented recovery for malformed properties: warn and
    /// treat as no TTL.
    pub(crate) fn ttl_or_zero(&self) -> Duration {
        match self.ttl() {
            Ok(ttl) => ttl,
            Err(err) => {
                log_warn!(
                    component = "trigger",
                    event = "collection_ttl_invalid",
                    collection_id = self.collection_id,
                    error = %err,
                );
                Duration::ZERO
            }
        }
    }

    /// Auto-compaction flag with the documented recovery for malformed
    /// properties: warn and treat as disabled.
    pub(crate) fn auto_compaction_enabled_or_false(&self) -> bool {
        match self.auto_compaction_enabled() {
            Ok(enabled) => enabled,
            Err(err) => {
                log_warn!(
                    component = "trigger",
                    event = "collection_auto_compaction_invalid",
                    collection_id = self.collection_id,
                    error = %err,
                );
                false
            }
        }
    }
}

/// Collection lookup contract.
#[async_trait]
pub trait SchemaHandler: Send + Sync {
    /// Fetch schema and properties of a collection.
    async fn get_collection(
        &self,
        collection_id: CollectionId,
    ) -> Result<CollectionInfo, BoxError>;
}

/// Collection fetch wrapped in the trigger-wide deadline.
pub(crate) async fn get_collection_with_deadline(
    schemas: &dyn SchemaHandler,
    collection_id: CollectionId,
) -> Result<CollectionInfo, TriggerError> {
    match tokio::time::timeout(COLLECTION_FETCH_DEADLINE, schemas.get_collection(collection_id))
        .await
    {
        Ok(Ok(collection)) => Ok(collection),
        Ok(Err(source)) => Err(TriggerError::Collection {
            collection_id,
            source,
        }),
        Err(_) => Err(TriggerError::CollectionTimeout { collection_id }),
    }
}
