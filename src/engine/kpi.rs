// KPI Engine - monthly achievement per roster member, plus the talent
// overview figures (daily plan vs. posted) shown above it.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::core::{TalentId, TenantId, YearMonth};
use crate::engine::filter::FilterContext;
use crate::models::{DailyContentTarget, KpiTarget, Talent, TalentPosting};

/// Borrowed view over the talent collections of one snapshot
#[derive(Debug, Clone, Copy)]
pub struct TalentInput<'a> {
    pub talents: &'a [Talent],
    pub kpi_targets: &'a [KpiTarget],
    pub postings: &'a [TalentPosting],
    pub daily_targets: &'a [DailyContentTarget],
}

/// `target` and `actual` are uncapped; only `percent` is clamped to 0..=100
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiAchievement {
    pub talent_id: TalentId,
    pub name: String,
    pub target: i64,
    pub actual: i64,
    pub percent: u32,
    pub is_achieved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TalentPosted {
    pub talent_id: TalentId,
    pub name: String,
    pub posted: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TalentOverview {
    pub talent_count: usize,
    pub daily_target_total: i64,
    pub posted_total: i64,
    /// posted vs. planned, not capped
    pub completion_rate: i64,
    pub leaderboard: Vec<TalentPosted>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TalentReport {
    pub period: YearMonth,
    pub achievements: Vec<KpiAchievement>,
    pub overview: TalentOverview,
    /// postings in scope whose talent is not on the current roster
    pub unattributed_postings: usize,
}

/// Achievement percentage, rounded and clamped to 0..=100.
///
/// With no target any activity counts as full achievement and no activity
/// as none, which keeps the division well defined.
pub fn achievement_percent(actual: i64, target: i64) -> u32 {
    let raw = if target > 0 {
        actual as f64 / target as f64 * 100.0
    } else if actual > 0 {
        100.0
    } else {
        0.0
    };
    raw.clamp(0.0, 100.0).round() as u32
}

pub fn is_achieved(actual: i64, target: i64) -> bool {
    target > 0 && actual >= target
}

fn roster<'a>(
    tenant: &'a TenantId,
    talents: &'a [Talent],
    filter: &'a FilterContext,
) -> impl Iterator<Item = &'a Talent> + 'a {
    talents
        .iter()
        .filter(move |t| &t.tenant_id == tenant && filter.matches_group(t.id.as_str()))
}

/// Achievement for every roster member in `period`, in roster order.
///
/// Only the group part of `filter` applies here (it narrows the roster);
/// the period replaces any date bounds.
pub fn compute_kpi(
    tenant: &TenantId,
    input: TalentInput<'_>,
    period: YearMonth,
    filter: &FilterContext,
) -> Vec<KpiAchievement> {
    let offset = filter.utc_offset();

    let mut actual_by_talent: HashMap<&str, i64> = HashMap::new();
    for posting in input.postings.iter().filter(|p| &p.tenant_id == tenant) {
        let in_period = posting
            .date
            .map_or(false, |date| period.contains(date, offset));
        if in_period {
            let actual = actual_by_talent.entry(posting.talent_id.as_str()).or_default();
            *actual = actual.saturating_add(posting.post_count);
        }
    }

    roster(tenant, input.talents, filter)
        .map(|talent| {
            let talent_id = talent.talent_id();
            // first matching row wins if duplicates slipped in
            let target = input
                .kpi_targets
                .iter()
                .filter(|k| &k.tenant_id == tenant)
                .find(|k| k.applies_to(&talent_id, period))
                .map_or(0, |k| k.target_count);
            let actual = actual_by_talent.get(talent.id.as_str()).copied().unwrap_or(0);

            KpiAchievement {
                talent_id,
                name: talent.name.clone(),
                target,
                actual,
                percent: achievement_percent(actual, target),
                is_achieved: is_achieved(actual, target),
            }
        })
        .collect()
}

/// Roster size, planned vs. posted totals and the posted leaderboard under
/// the full filter (group and dates).
pub fn talent_overview(
    tenant: &TenantId,
    input: TalentInput<'_>,
    filter: &FilterContext,
) -> TalentOverview {
    let postings: Vec<&TalentPosting> = input
        .postings
        .iter()
        .filter(|p| &p.tenant_id == tenant && filter.matches(*p))
        .collect();

    let daily_target_total: i64 = input
        .daily_targets
        .iter()
        .filter(|d| &d.tenant_id == tenant && filter.matches(*d))
        .map(|d| d.content_count)
        .fold(0, i64::saturating_add);
    let posted_total: i64 = postings.iter().map(|p| p.post_count).fold(0, i64::saturating_add);
    let completion_rate = if daily_target_total > 0 {
        (posted_total as f64 / daily_target_total as f64 * 100.0).round() as i64
    } else {
        0
    };

    let mut posted_by_talent: HashMap<&str, i64> = HashMap::new();
    for posting in &postings {
        let posted = posted_by_talent.entry(posting.talent_id.as_str()).or_default();
        *posted = posted.saturating_add(posting.post_count);
    }

    let mut leaderboard: Vec<TalentPosted> = roster(tenant, input.talents, filter)
        .map(|talent| TalentPosted {
            talent_id: talent.talent_id(),
            name: talent.name.clone(),
            posted: posted_by_talent.get(talent.id.as_str()).copied().unwrap_or(0),
        })
        .collect();
    leaderboard.sort_by(|a, b| b.posted.cmp(&a.posted));

    TalentOverview {
        talent_count: leaderboard.len(),
        daily_target_total,
        posted_total,
        completion_rate,
        leaderboard,
    }
}

pub fn talent_report(
    tenant: &TenantId,
    input: TalentInput<'_>,
    period: YearMonth,
    filter: &FilterContext,
) -> TalentReport {
    let known: HashSet<&str> = input
        .talents
        .iter()
        .filter(|t| &t.tenant_id == tenant)
        .map(|t| t.id.as_str())
        .collect();
    let unattributed_postings = input
        .postings
        .iter()
        .filter(|p| &p.tenant_id == tenant && filter.matches(*p))
        .filter(|p| !known.contains(p.talent_id.as_str()))
        .count();

    TalentReport {
        period,
        achievements: compute_kpi(tenant, input, period, filter),
        overview: talent_overview(tenant, input, filter),
        unattributed_postings,
    }
}
