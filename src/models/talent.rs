// Talent-mode records: roster, monthly KPI targets, posting log, daily targets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lenient;
use super::{Scoped, TenantScoped};
use crate::core::{RecordId, TalentId, TenantId, YearMonth};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TalentStatus {
    #[default]
    #[serde(alias = "AKTIF")]
    Active,
    #[serde(alias = "NONAKTIF")]
    Inactive,
}

/// A content creator on the tenant's roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Talent {
    pub id: RecordId,
    #[serde(alias = "profileId")]
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub account_handles: Vec<String>,
    #[serde(default)]
    pub status: TalentStatus,
}

impl Talent {
    pub fn talent_id(&self) -> TalentId {
        TalentId::new(self.id.as_str())
    }
}

/// Monthly posting target. Sparse: a missing row means a target of 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiTarget {
    pub id: RecordId,
    #[serde(alias = "profileId")]
    pub tenant_id: TenantId,
    #[serde(default)]
    pub talent_id: TalentId,
    #[serde(default, deserialize_with = "lenient::month")]
    pub month: u32,
    #[serde(default, deserialize_with = "lenient::year")]
    pub year: i32,
    #[serde(default, deserialize_with = "lenient::number")]
    pub target_count: i64,
}

impl KpiTarget {
    pub fn applies_to(&self, talent: &TalentId, period: YearMonth) -> bool {
        &self.talent_id == talent && self.month == period.month && self.year == period.year
    }
}

/// One logged batch of posts. `links.len()` should equal `post_count` but
/// nothing enforces it here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalentPosting {
    pub id: RecordId,
    #[serde(alias = "profileId")]
    pub tenant_id: TenantId,
    #[serde(default)]
    pub talent_id: TalentId,
    #[serde(default)]
    pub account_handle: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub post_count: i64,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub links: Vec<String>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub date: Option<DateTime<Utc>>,
}

/// Planned content for a talent on a given day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyContentTarget {
    pub id: RecordId,
    #[serde(alias = "profileId")]
    pub tenant_id: TenantId,
    #[serde(default)]
    pub talent_id: TalentId,
    #[serde(default)]
    pub product_name: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub content_count: i64,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: String,
}

impl TenantScoped for Talent {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for KpiTarget {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for TalentPosting {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for DailyContentTarget {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl Scoped for TalentPosting {
    fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    fn group_id(&self) -> &str {
        self.talent_id.as_str()
    }
}

impl Scoped for DailyContentTarget {
    fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    fn group_id(&self) -> &str {
        self.talent_id.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use serde_json::json;

    #[test]
    fn test_talent_status_aliases() {
        let doc = Document::new(
            "tal-1",
            json!({"tenantId": "t-1", "name": "Sari", "accountHandles": ["@sari"], "status": "NONAKTIF"}),
        );
        let talent: Talent = doc.decode().unwrap();
        assert_eq!(talent.status, TalentStatus::Inactive);
        assert_eq!(talent.account_handles, vec!["@sari".to_string()]);

        let doc = Document::new("tal-2", json!({"tenantId": "t-1", "name": "Budi"}));
        let talent: Talent = doc.decode().unwrap();
        assert_eq!(talent.status, TalentStatus::Active);
        assert!(talent.account_handles.is_empty());
    }

    #[test]
    fn test_kpi_target_period_match() {
        let doc = Document::new(
            "k-1",
            json!({"tenantId": "t-1", "talentId": "tal-1", "month": "Maret", "year": "2024", "targetCount": 30}),
        );
        let target: KpiTarget = doc.decode().unwrap();
        let talent = TalentId::new("tal-1");

        assert!(target.applies_to(&talent, YearMonth::new(2024, 3).unwrap()));
        assert!(!target.applies_to(&talent, YearMonth::new(2024, 4).unwrap()));
        assert!(!target.applies_to(&TalentId::new("tal-2"), YearMonth::new(2024, 3).unwrap()));
    }

    #[test]
    fn test_posting_count_is_lenient() {
        let doc = Document::new(
            "post-1",
            json!({"tenantId": "t-1", "talentId": "tal-1", "postCount": "3", "links": ["a", "b", "c"]}),
        );
        let posting: TalentPosting = doc.decode().unwrap();
        assert_eq!(posting.post_count, 3);
        assert_eq!(posting.links.len(), 3);
    }
}
