//! Batch: a registered quantity of product whose history is tracked.
//!
//! Only the identity fields feed `batch_hash`. Status and custodian are
//! operational state and can change without affecting verification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical::canonical_hash;
use crate::crypto::Digest;
use crate::error::{CoreError, ValidationError};
use crate::types::BatchId;

/// Descriptive fields of the product in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,

    /// Unit that `quantity` is expressed in (kg, crates, litres, ...).
    pub unit: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,

    /// Free-form structured attributes. Nested values are allowed and are
    /// canonicalized recursively.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl ProductDescriptor {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            product_type: None,
            unit: unit.into(),
            origin: None,
            attributes: Map::new(),
        }
    }

    pub fn product_type(mut self, product_type: impl Into<String>) -> Self {
        self.product_type = Some(product_type.into());
        self
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Where a batch was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub farm: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Lifecycle status of a batch. Not part of the batch hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Created,
    InTransit,
    Processing,
    Split,
    Completed,
    Recalled,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::InTransit => "in_transit",
            Self::Processing => "processing",
            Self::Split => "split",
            Self::Completed => "completed",
            Self::Recalled => "recalled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "in_transit" => Some(Self::InTransit),
            "processing" => Some(Self::Processing),
            "split" => Some(Self::Split),
            "completed" => Some(Self::Completed),
            "recalled" => Some(Self::Recalled),
            _ => None,
        }
    }

    /// Terminal states accept no further custody changes.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Recalled)
    }

    /// Whether a batch in this status may move to `next`.
    ///
    /// A recall is always allowed, including for completed batches. Nothing
    /// leaves `Recalled`, and `Completed` only moves to `Recalled`.
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        match self {
            Self::Recalled => next == Self::Recalled,
            Self::Completed => matches!(next, Self::Completed | Self::Recalled),
            _ => true,
        }
    }
}

/// The identity record hashed into `batch_hash`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchIdentity<'a> {
    pub product: &'a ProductDescriptor,
    pub quantity: f64,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_batch_id: Option<BatchId>,
}

impl BatchIdentity<'_> {
    pub fn hash(&self) -> Result<Digest, CoreError> {
        canonical_hash(self)
    }
}

/// A batch ready to be persisted: identity pinned, hash computed, no id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    pub code: String,
    pub product: ProductDescriptor,
    pub quantity: f64,
    pub created_at: i64,
    pub parent_batch_id: Option<BatchId>,
    pub batch_hash: Digest,
    pub status: BatchStatus,
    pub current_holder: Option<String>,
}

impl NewBatch {
    /// Attach a repository-assigned id.
    pub fn into_batch(self, id: BatchId) -> Batch {
        Batch {
            id,
            code: self.code,
            product: self.product,
            quantity: self.quantity,
            created_at: self.created_at,
            parent_batch_id: self.parent_batch_id,
            batch_hash: self.batch_hash,
            status: self.status,
            current_holder: self.current_holder,
        }
    }
}

/// A persisted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: BatchId,
    pub code: String,
    pub product: ProductDescriptor,
    pub quantity: f64,
    /// Unix milliseconds, pinned at creation and reused for verification.
    pub created_at: i64,
    pub parent_batch_id: Option<BatchId>,
    pub batch_hash: Digest,
    pub status: BatchStatus,
    pub current_holder: Option<String>,
}

impl Batch {
    pub fn identity(&self) -> BatchIdentity<'_> {
        BatchIdentity {
            product: &self.product,
            quantity: self.quantity,
            created_at: self.created_at,
            parent_batch_id: self.parent_batch_id,
        }
    }

    /// Recompute the batch hash from the stored identity fields.
    pub fn compute_hash(&self) -> Result<Digest, CoreError> {
        self.identity().hash()
    }

    pub fn is_split_child(&self) -> bool {
        self.parent_batch_id.is_some()
    }
}

/// Caller input for creating a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDraft {
    pub product: ProductDescriptor,
    pub quantity: f64,
    /// Human-readable code; derived from the hash when absent.
    #[serde(default)]
    pub code: Option<String>,
    /// Creation time override (Unix ms) for importing historical batches.
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub current_holder: Option<String>,
}

impl BatchDraft {
    pub fn new(product: ProductDescriptor, quantity: f64) -> Self {
        Self {
            product,
            quantity,
            code: None,
            created_at: None,
            current_holder: None,
        }
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn created_at(mut self, millis: i64) -> Self {
        self.created_at = Some(millis);
        self
    }

    pub fn holder(mut self, holder: impl Into<String>) -> Self {
        self.current_holder = Some(holder.into());
        self
    }

    /// Pin the identity and compute the hash.
    ///
    /// `code_prefix` is used when the draft carries no code of its own.
    pub fn seal(
        self,
        created_at: i64,
        parent_batch_id: Option<BatchId>,
        code_prefix: &str,
    ) -> Result<NewBatch, ValidationError> {
        crate::validation::validate_product(&self.product, self.quantity)?;

        let created_at = self.created_at.unwrap_or(created_at);
        let identity = BatchIdentity {
            product: &self.product,
            quantity: self.quantity,
            created_at,
            parent_batch_id,
        };
        let batch_hash = identity.hash()?;

        let code = match self.code.filter(|c| !c.trim().is_empty()) {
            Some(code) => code,
            None => derive_code(code_prefix, &batch_hash),
        };

        Ok(NewBatch {
            code,
            product: self.product,
            quantity: self.quantity,
            created_at,
            parent_batch_id,
            batch_hash,
            status: BatchStatus::Created,
            current_holder: self.current_holder,
        })
    }
}

/// Derive a batch code from its hash: `PREFIX-1A2B3C4D`.
pub fn derive_code(prefix: &str, batch_hash: &Digest) -> String {
    format!("{}-{}", prefix, batch_hash.to_hex()[..8].to_uppercase())
}
