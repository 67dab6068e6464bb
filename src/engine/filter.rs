// Filter Context - the user's current scope over already-loaded collections.
// Narrowing the scope never re-queries the record store.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::Scoped;

/// Date interval plus an optional group restriction (shop id in business
/// mode, talent id in talent mode). Both date bounds are inclusive calendar
/// days on the configured wall clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterContext {
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub group_id: Option<String>,
    #[serde(default)]
    pub utc_offset_seconds: i32,
}

impl FilterContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset_seconds = offset.local_minus_utc();
        self
    }

    pub fn with_dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.date_start = start;
        self.date_end = end;
        self
    }

    pub fn with_group(mut self, group_id: Option<String>) -> Self {
        self.set_group(group_id);
        self
    }

    /// Empty strings mean "no group", same as the "all shops" choice
    pub fn set_group(&mut self, group_id: Option<String>) {
        self.group_id = group_id.filter(|g| !g.trim().is_empty());
    }

    /// Clear dates and group in a single assignment. The wall-clock offset is
    /// configuration, not scope, and survives.
    pub fn reset(&mut self) {
        *self = Self {
            utc_offset_seconds: self.utc_offset_seconds,
            ..Self::default()
        };
    }

    pub fn is_active(&self) -> bool {
        self.date_start.is_some() || self.date_end.is_some() || self.group_id.is_some()
    }

    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_seconds).unwrap_or_else(|| Utc.fix())
    }

    pub fn validate(&self) -> AppResult<()> {
        if let (Some(start), Some(end)) = (self.date_start, self.date_end) {
            if start > end {
                return Err(AppError::Validation(format!(
                    "dateStart {} is after dateEnd {}",
                    start, end
                )));
            }
        }
        if FixedOffset::east_opt(self.utc_offset_seconds).is_none() {
            return Err(AppError::Validation(format!(
                "UTC offset out of range: {}s",
                self.utc_offset_seconds
            )));
        }
        Ok(())
    }

    pub fn matches<R: Scoped>(&self, record: &R) -> bool {
        self.matches_group(record.group_id()) && self.matches_date(record.occurred_at())
    }

    pub fn matches_group(&self, group_id: &str) -> bool {
        self.group_id.as_deref().map_or(true, |g| g == group_id)
    }

    /// Undated records only pass when no date bound is set
    pub fn matches_date(&self, at: Option<DateTime<Utc>>) -> bool {
        if self.date_start.is_none() && self.date_end.is_none() {
            return true;
        }
        let Some(at) = at else {
            return false;
        };

        let day = at.with_timezone(&self.utc_offset()).date_naive();
        self.date_start.map_or(true, |start| day >= start)
            && self.date_end.map_or(true, |end| day <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RecordId, TenantId};
    use crate::models::Sale;
    use chrono::TimeZone;

    fn sale(shop: &str, date: Option<DateTime<Utc>>) -> Sale {
        Sale {
            id: RecordId::new("sale"),
            tenant_id: TenantId::new("t-1"),
            shop_id: shop.into(),
            product_id: "p-1".into(),
            quantity: 1,
            revenue: 100,
            date,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = FilterContext::new();
        assert!(!filter.is_active());
        assert!(filter.matches(&sale("s-1", None)));
        assert!(filter.matches(&sale("", Some(Utc::now()))));
    }

    #[test]
    fn test_end_date_is_inclusive_to_end_of_day() {
        let filter = FilterContext::new().with_dates(None, Some(day(2024, 1, 5)));
        let late = Utc.with_ymd_and_hms(2024, 1, 5, 23, 59, 59).unwrap();
        let next = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();

        assert!(filter.matches(&sale("s-1", Some(late))));
        assert!(!filter.matches(&sale("s-1", Some(next))));
    }

    #[test]
    fn test_start_date_is_inclusive_from_midnight() {
        let filter = FilterContext::new().with_dates(Some(day(2024, 2, 1)), None);
        let midnight = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();

        assert!(filter.matches(&sale("s-1", Some(midnight))));
        assert!(!filter.matches(&sale("s-1", Some(before))));
    }

    #[test]
    fn test_undated_records_fail_date_bounds() {
        let filter = FilterContext::new().with_dates(Some(day(2024, 2, 1)), None);
        assert!(!filter.matches(&sale("s-1", None)));
    }

    #[test]
    fn test_day_boundaries_follow_offset() {
        let jakarta = FixedOffset::east_opt(7 * 3600).unwrap();
        let filter = FilterContext::new()
            .with_utc_offset(jakarta)
            .with_dates(Some(day(2024, 2, 1)), Some(day(2024, 2, 1)));
        // 18:00 UTC on Jan 31 is 01:00 on Feb 1 in UTC+7
        let instant = Utc.with_ymd_and_hms(2024, 1, 31, 18, 0, 0).unwrap();
        assert!(filter.matches(&sale("s-1", Some(instant))));
    }

    #[test]
    fn test_group_filter() {
        let filter = FilterContext::new().with_group(Some("s-1".to_string()));
        assert!(filter.matches(&sale("s-1", None)));
        assert!(!filter.matches(&sale("s-2", None)));

        let blank = FilterContext::new().with_group(Some("  ".to_string()));
        assert_eq!(blank.group_id, None);
    }

    #[test]
    fn test_reset_clears_scope_but_keeps_offset() {
        let jakarta = FixedOffset::east_opt(7 * 3600).unwrap();
        let mut filter = FilterContext::new()
            .with_utc_offset(jakarta)
            .with_dates(Some(day(2024, 1, 1)), Some(day(2024, 1, 31)))
            .with_group(Some("s-1".to_string()));
        assert!(filter.is_active());

        filter.reset();
        assert!(!filter.is_active());
        assert_eq!(filter.utc_offset(), jakarta);
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let filter = FilterContext::new().with_dates(Some(day(2024, 2, 1)), Some(day(2024, 1, 1)));
        assert!(filter.validate().is_err());
        assert!(FilterContext::new().validate().is_ok());
    }
}
