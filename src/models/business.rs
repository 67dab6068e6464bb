// Business-mode records: tenants, shops, products, sales and content postings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lenient;
use super::{Scoped, TenantScoped};
use crate::core::{ProductId, RecordId, ShopId, TenantId};

/// A tenant profile. Stored under its own id as tenant key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: RecordId,
    #[serde(alias = "profileId")]
    pub tenant_id: TenantId,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: RecordId,
    #[serde(alias = "profileId")]
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
}

impl Shop {
    pub fn shop_id(&self) -> ShopId {
        ShopId::new(self.id.as_str())
    }
}

/// `shop_id` may point at a shop that no longer exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: RecordId,
    #[serde(alias = "profileId")]
    pub tenant_id: TenantId,
    #[serde(default)]
    pub shop_id: ShopId,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub unit_price: i64,
}

impl Product {
    pub fn product_id(&self) -> ProductId {
        ProductId::new(self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: RecordId,
    #[serde(alias = "profileId")]
    pub tenant_id: TenantId,
    #[serde(default)]
    pub shop_id: ShopId,
    #[serde(default)]
    pub product_id: ProductId,
    #[serde(default, deserialize_with = "lenient::number")]
    pub quantity: i64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub revenue: i64,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub date: Option<DateTime<Utc>>,
}

/// Promotional content posted for a product; counted, never monetized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPosting {
    pub id: RecordId,
    #[serde(alias = "profileId")]
    pub tenant_id: TenantId,
    #[serde(default)]
    pub shop_id: ShopId,
    #[serde(default)]
    pub product_id: ProductId,
    #[serde(default)]
    pub url: String,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub date: Option<DateTime<Utc>>,
}

impl TenantScoped for Tenant {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for Shop {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for Product {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for Sale {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for ContentPosting {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl Scoped for Sale {
    fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    fn group_id(&self) -> &str {
        self.shop_id.as_str()
    }
}

impl Scoped for ContentPosting {
    fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    fn group_id(&self) -> &str {
        self.shop_id.as_str()
    }
}
