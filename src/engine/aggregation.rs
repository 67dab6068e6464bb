// Aggregation Engine - business rollups (global -> shop -> product)
//
// Pure function of (tenant, collections, filter). Shop totals are built from
// their product rollups, and global unit/revenue totals from the shop
// rollups, so parent == sum(children) holds by construction.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::core::{ProductId, ShopId, TenantId};
use crate::engine::filter::FilterContext;
use crate::models::{ContentPosting, Product, Sale, Shop};

/// Borrowed view over the business collections of one snapshot
#[derive(Debug, Clone, Copy)]
pub struct BusinessInput<'a> {
    pub shops: &'a [Shop],
    pub products: &'a [Product],
    pub sales: &'a [Sale],
    pub contents: &'a [ContentPosting],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRollup {
    pub product_id: ProductId,
    pub name: String,
    pub units_sold: i64,
    pub revenue: i64,
    pub content_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopRollup {
    pub shop_id: ShopId,
    pub name: String,
    pub product_count: usize,
    pub units_sold: i64,
    pub revenue: i64,
    pub content_count: usize,
    pub products: Vec<ProductRollup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTotals {
    pub shop_count: usize,
    pub product_count: usize,
    pub units_sold: i64,
    pub revenue: i64,
    pub content_count: usize,
}

/// Matching records whose shop or product is not in the current snapshot.
/// They are left out of unit/revenue totals instead of failing the rollup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unattributed {
    pub sales: usize,
    pub units_sold: i64,
    pub revenue: i64,
    pub contents: usize,
}

impl Unattributed {
    pub fn is_empty(&self) -> bool {
        self.sales == 0 && self.contents == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRollup {
    pub shop_rollups: Vec<ShopRollup>,
    pub global: GlobalTotals,
    pub unattributed: Unattributed,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    units_sold: i64,
    revenue: i64,
}

impl Tally {
    fn add(&mut self, sale: &Sale) {
        self.units_sold = self.units_sold.saturating_add(sale.quantity);
        self.revenue = self.revenue.saturating_add(sale.revenue);
    }
}

/// Build the shop/product rollups for `tenant` under `filter`.
///
/// Shops and products within a shop are ordered by revenue, highest first.
/// Ties keep the order the records were delivered in.
pub fn aggregate_business(
    tenant: &TenantId,
    input: BusinessInput<'_>,
    filter: &FilterContext,
) -> BusinessRollup {
    let shops: Vec<&Shop> = input
        .shops
        .iter()
        .filter(|s| &s.tenant_id == tenant && filter.matches_group(s.id.as_str()))
        .collect();
    let products: Vec<&Product> = input
        .products
        .iter()
        .filter(|p| &p.tenant_id == tenant)
        .collect();
    let sales = input
        .sales
        .iter()
        .filter(|s| &s.tenant_id == tenant && filter.matches(*s));
    let contents: Vec<&ContentPosting> = input
        .contents
        .iter()
        .filter(|c| &c.tenant_id == tenant && filter.matches(*c))
        .collect();

    let mut sale_tallies: HashMap<(&str, &str), Tally> = HashMap::new();
    let mut sale_counts: HashMap<(&str, &str), usize> = HashMap::new();
    for sale in sales {
        let key = (sale.shop_id.as_str(), sale.product_id.as_str());
        sale_tallies.entry(key).or_default().add(sale);
        *sale_counts.entry(key).or_default() += 1;
    }

    let mut content_by_product: HashMap<(&str, &str), usize> = HashMap::new();
    let mut content_by_shop: HashMap<&str, usize> = HashMap::new();
    for content in &contents {
        *content_by_product
            .entry((content.shop_id.as_str(), content.product_id.as_str()))
            .or_default() += 1;
        *content_by_shop.entry(content.shop_id.as_str()).or_default() += 1;
    }

    let mut attributed: HashSet<(&str, &str)> = HashSet::new();
    let mut shop_rollups: Vec<ShopRollup> = shops
        .iter()
        .map(|shop| {
            let shop_key = shop.id.as_str();
            let mut product_rollups: Vec<ProductRollup> = products
                .iter()
                .filter(|p| p.shop_id.as_str() == shop_key)
                .map(|product| {
                    let key = (shop_key, product.id.as_str());
                    attributed.insert(key);
                    let tally = sale_tallies.get(&key).copied().unwrap_or_default();
                    ProductRollup {
                        product_id: product.product_id(),
                        name: product.name.clone(),
                        units_sold: tally.units_sold,
                        revenue: tally.revenue,
                        content_count: content_by_product.get(&key).copied().unwrap_or(0),
                    }
                })
                .collect();

            // sort_by is stable: equal revenue keeps delivery order
            product_rollups.sort_by(|a, b| b.revenue.cmp(&a.revenue));

            ShopRollup {
                shop_id: shop.shop_id(),
                name: shop.name.clone(),
                product_count: product_rollups.len(),
                units_sold: product_rollups.iter().map(|p| p.units_sold).fold(0, i64::saturating_add),
                revenue: product_rollups.iter().map(|p| p.revenue).fold(0, i64::saturating_add),
                content_count: content_by_shop.get(shop_key).copied().unwrap_or(0),
                products: product_rollups,
            }
        })
        .collect();

    shop_rollups.sort_by(|a, b| b.revenue.cmp(&a.revenue));

    let mut unattributed = Unattributed::default();
    for (key, tally) in &sale_tallies {
        if !attributed.contains(key) {
            unattributed.sales += sale_counts.get(key).copied().unwrap_or(0);
            unattributed.units_sold = unattributed.units_sold.saturating_add(tally.units_sold);
            unattributed.revenue = unattributed.revenue.saturating_add(tally.revenue);
        }
    }
    let working_shops: HashSet<&str> = shops.iter().map(|s| s.id.as_str()).collect();
    unattributed.contents = contents
        .iter()
        .filter(|c| !working_shops.contains(c.shop_id.as_str()))
        .count();

    let global = GlobalTotals {
        shop_count: shop_rollups.len(),
        product_count: products
            .iter()
            .filter(|p| filter.matches_group(p.shop_id.as_str()))
            .count(),
        units_sold: shop_rollups.iter().map(|s| s.units_sold).fold(0, i64::saturating_add),
        revenue: shop_rollups.iter().map(|s| s.revenue).fold(0, i64::saturating_add),
        content_count: contents.len(),
    };

    BusinessRollup {
        shop_rollups,
        global,
        unattributed,
    }
}
