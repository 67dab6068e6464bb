// In-memory state bag for one tenant: the typed collections the engines
// read, plus a status per collection so views can tell "empty" from
// "not loaded yet" or "failed".

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::core::TenantId;
use crate::engine::{BusinessInput, TalentInput};
use crate::models::{
    ContentPosting, DailyContentTarget, Document, EntityKind, KpiTarget, Product, Sale, Shop,
    Talent, TalentPosting, Tenant, TenantScoped,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum CollectionStatus {
    /// subscribed, nothing delivered yet
    Pending,
    Live,
    /// the last delivery was an error; the collection is held empty
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedCollection {
    pub kind: EntityKind,
    pub reason: String,
}

/// Whether the rollups were computed over every collection the view needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCompleteness {
    pub pending: Vec<EntityKind>,
    pub failed: Vec<FailedCollection>,
    pub is_complete: bool,
}

#[derive(Debug, Clone)]
pub struct Collections {
    tenant: TenantId,
    pub profiles: Vec<Tenant>,
    pub shops: Vec<Shop>,
    pub products: Vec<Product>,
    pub sales: Vec<Sale>,
    pub contents: Vec<ContentPosting>,
    pub talents: Vec<Talent>,
    pub kpi_targets: Vec<KpiTarget>,
    pub talent_postings: Vec<TalentPosting>,
    pub daily_targets: Vec<DailyContentTarget>,
    status: BTreeMap<EntityKind, CollectionStatus>,
}

impl Collections {
    /// Empty bag for `tenant` with every tracked kind pending
    pub fn for_tenant(tenant: TenantId, kinds: &[EntityKind]) -> Self {
        Self {
            tenant,
            profiles: Vec::new(),
            shops: Vec::new(),
            products: Vec::new(),
            sales: Vec::new(),
            contents: Vec::new(),
            talents: Vec::new(),
            kpi_targets: Vec::new(),
            talent_postings: Vec::new(),
            daily_targets: Vec::new(),
            status: kinds
                .iter()
                .map(|kind| (*kind, CollectionStatus::Pending))
                .collect(),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn status(&self, kind: EntityKind) -> Option<&CollectionStatus> {
        self.status.get(&kind)
    }

    /// Swap in a delivered result set wholesale. Returns the number of
    /// records kept; undecodable or foreign-tenant documents are dropped.
    pub fn replace(&mut self, kind: EntityKind, documents: &[Document]) -> usize {
        let tenant = &self.tenant;
        let kept = match kind {
            EntityKind::Profile => replace_with(&mut self.profiles, tenant, kind, documents),
            EntityKind::Shop => replace_with(&mut self.shops, tenant, kind, documents),
            EntityKind::Product => replace_with(&mut self.products, tenant, kind, documents),
            EntityKind::Sale => replace_with(&mut self.sales, tenant, kind, documents),
            EntityKind::Content => replace_with(&mut self.contents, tenant, kind, documents),
            EntityKind::Talent => replace_with(&mut self.talents, tenant, kind, documents),
            EntityKind::KpiTarget => replace_with(&mut self.kpi_targets, tenant, kind, documents),
            EntityKind::TalentPosting => {
                replace_with(&mut self.talent_postings, tenant, kind, documents)
            }
            EntityKind::DailyTarget => {
                replace_with(&mut self.daily_targets, tenant, kind, documents)
            }
        };
        self.status.insert(kind, CollectionStatus::Live);
        kept
    }

    /// Fail-open: a broken stream reads as an empty collection
    pub fn mark_failed(&mut self, kind: EntityKind, reason: impl Into<String>) {
        self.replace(kind, &[]);
        self.status.insert(kind, CollectionStatus::Failed(reason.into()));
    }

    pub fn completeness(&self) -> DataCompleteness {
        let mut completeness = DataCompleteness::default();
        for (kind, status) in &self.status {
            match status {
                CollectionStatus::Pending => completeness.pending.push(*kind),
                CollectionStatus::Failed(reason) => completeness.failed.push(FailedCollection {
                    kind: *kind,
                    reason: reason.clone(),
                }),
                CollectionStatus::Live => {}
            }
        }
        completeness.is_complete = completeness.pending.is_empty() && completeness.failed.is_empty();
        completeness
    }

    pub fn tenant_name(&self) -> Option<&str> {
        self.profiles
            .iter()
            .find(|p| p.id.as_str() == self.tenant.as_str())
            .map(|p| p.display_name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn business_input(&self) -> BusinessInput<'_> {
        BusinessInput {
            shops: &self.shops,
            products: &self.products,
            sales: &self.sales,
            contents: &self.contents,
        }
    }

    pub fn talent_input(&self) -> TalentInput<'_> {
        TalentInput {
            talents: &self.talents,
            kpi_targets: &self.kpi_targets,
            postings: &self.talent_postings,
            daily_targets: &self.daily_targets,
        }
    }
}

fn replace_with<T>(slot: &mut Vec<T>, tenant: &TenantId, kind: EntityKind, documents: &[Document]) -> usize
where
    T: DeserializeOwned + TenantScoped,
{
    let mut records = Vec::with_capacity(documents.len());
    for doc in documents {
        match doc.decode::<T>() {
            Ok(record) if record.tenant_id() == tenant => records.push(record),
            Ok(record) => warn!(
                "Dropping {} {} owned by tenant {} from tenant {} snapshot",
                kind,
                doc.id,
                record.tenant_id(),
                tenant
            ),
            Err(e) => warn!("Skipping undecodable {} document: {}", kind, e),
        }
    }
    *slot = records;
    slot.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tenant() -> TenantId {
        TenantId::new("t-1")
    }

    #[test]
    fn test_replace_is_wholesale() {
        let mut bag = Collections::for_tenant(tenant(), &[EntityKind::Shop]);
        assert_eq!(bag.status(EntityKind::Shop), Some(&CollectionStatus::Pending));

        let first = vec![
            Document::new("a", json!({"tenantId": "t-1", "name": "A"})),
            Document::new("b", json!({"tenantId": "t-1", "name": "B"})),
        ];
        assert_eq!(bag.replace(EntityKind::Shop, &first), 2);

        let second = vec![Document::new("c", json!({"tenantId": "t-1", "name": "C"}))];
        assert_eq!(bag.replace(EntityKind::Shop, &second), 1);
        assert_eq!(bag.shops.len(), 1);
        assert_eq!(bag.shops[0].id.as_str(), "c");
        assert_eq!(bag.status(EntityKind::Shop), Some(&CollectionStatus::Live));
    }

    #[test]
    fn test_foreign_and_broken_documents_are_dropped() {
        let mut bag = Collections::for_tenant(tenant(), &[EntityKind::Sale]);
        let docs = vec![
            Document::new("ok", json!({"tenantId": "t-1", "revenue": 5})),
            Document::new("foreign", json!({"tenantId": "t-2", "revenue": 500})),
            Document::new("broken", json!("not an object")),
        ];
        assert_eq!(bag.replace(EntityKind::Sale, &docs), 1);
        assert_eq!(bag.sales[0].id.as_str(), "ok");
    }

    #[test]
    fn test_failure_empties_collection() {
        let kinds = [EntityKind::Shop, EntityKind::Sale];
        let mut bag = Collections::for_tenant(tenant(), &kinds);
        bag.replace(
            EntityKind::Sale,
            &[Document::new("s", json!({"tenantId": "t-1", "revenue": 5}))],
        );
        bag.mark_failed(EntityKind::Sale, "permission denied");

        assert!(bag.sales.is_empty());
        let completeness = bag.completeness();
        assert!(!completeness.is_complete);
        assert_eq!(completeness.pending, vec![EntityKind::Shop]);
        assert_eq!(completeness.failed[0].kind, EntityKind::Sale);
        assert_eq!(completeness.failed[0].reason, "permission denied");

        bag.replace(EntityKind::Shop, &[]);
        bag.replace(EntityKind::Sale, &[]);
        assert!(bag.completeness().is_complete);
    }

    #[test]
    fn test_tenant_name() {
        let mut bag = Collections::for_tenant(tenant(), &[EntityKind::Profile]);
        assert_eq!(bag.tenant_name(), None);
        bag.replace(
            EntityKind::Profile,
            &[Document::new("t-1", json!({"tenantId": "t-1", "displayName": "Kopi Kita"}))],
        );
        assert_eq!(bag.tenant_name(), Some("Kopi Kita"));
    }
}
