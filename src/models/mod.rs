// Tenant-scoped record model
// Every entity carries its tenant id; the record store hands out untyped
// documents and the subscription manager decodes them into these types.

pub mod business;
pub mod lenient;
pub mod talent;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::core::{RecordId, TenantId};
use crate::error::{AppError, AppResult};

pub use business::{ContentPosting, Product, Sale, Shop, Tenant};
pub use talent::{DailyContentTarget, KpiTarget, Talent, TalentPosting, TalentStatus};

/// Collections the record store knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Profile,
    Shop,
    Product,
    Sale,
    Content,
    Talent,
    KpiTarget,
    TalentPosting,
    DailyTarget,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Profile,
        EntityKind::Shop,
        EntityKind::Product,
        EntityKind::Sale,
        EntityKind::Content,
        EntityKind::Talent,
        EntityKind::KpiTarget,
        EntityKind::TalentPosting,
        EntityKind::DailyTarget,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Profile => "profiles",
            EntityKind::Shop => "shops",
            EntityKind::Product => "products",
            EntityKind::Sale => "sales",
            EntityKind::Content => "contents",
            EntityKind::Talent => "talents",
            EntityKind::KpiTarget => "kpi_targets",
            EntityKind::TalentPosting => "talent_postings",
            EntityKind::DailyTarget => "daily_targets",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("Unknown entity kind: {}", s)))
    }
}

/// A stored record as delivered by the record store: an id plus a JSON body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: RecordId,
    pub body: Value,
}

impl Document {
    pub fn new(id: impl Into<RecordId>, body: Value) -> Self {
        Self { id: id.into(), body }
    }

    /// Value of a top-level body field, if the body is an object
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.as_object().and_then(|obj| obj.get(name))
    }

    /// Decode into a typed record. The document id always wins over any `id`
    /// field inside the body.
    pub fn decode<T: DeserializeOwned>(&self) -> AppResult<T> {
        let mut obj = match &self.body {
            Value::Object(map) => map.clone(),
            other => {
                return Err(AppError::DeserializationError(format!(
                    "Document {} body is not an object: {}",
                    self.id, other
                )))
            }
        };
        obj.insert("id".to_string(), Value::String(self.id.to_string()));
        // both keys at once is a duplicate field; tenantId wins
        if obj.contains_key("tenantId") {
            obj.remove("profileId");
        }
        serde_json::from_value(Value::Object(obj)).map_err(|e| {
            AppError::DeserializationError(format!("Document {}: {}", self.id, e))
        })
    }

    /// Force the tenant key on a body before it is written. A legacy
    /// `profileId` key is replaced by `tenantId`.
    pub fn stamp_tenant(body: Value, tenant: &TenantId) -> AppResult<Value> {
        let mut obj: Map<String, Value> = match body {
            Value::Object(map) => map,
            other => {
                return Err(AppError::Validation(format!(
                    "Record body must be a JSON object, got {}",
                    other
                )))
            }
        };
        obj.remove("id");
        obj.remove("profileId");
        obj.insert("tenantId".to_string(), Value::String(tenant.to_string()));
        Ok(Value::Object(obj))
    }
}

/// Typed record with a tenant owner
pub trait TenantScoped {
    fn tenant_id(&self) -> &TenantId;
}

/// Record that participates in filter scoping: it has an event date and a
/// group key (shop for business records, talent for talent records)
pub trait Scoped: TenantScoped {
    fn occurred_at(&self) -> Option<DateTime<Utc>>;
    fn group_id(&self) -> &str;
}
