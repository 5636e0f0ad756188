//! Tariff plan and its day/month/hour price groups

use super::timestamp;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Response of `GET /dataAccess/tariff-details`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffDetails {
    pub status: String,

    #[serde(default)]
    pub plan_id: Option<i64>,

    pub tariff: Tariff,
}

/// Pricing plan
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tariff {
    #[serde(default)]
    pub dnsp_code: Option<String>,

    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub retailer_code: Option<String>,

    #[serde(default)]
    pub retailer_name: Option<String>,

    #[serde(default)]
    pub plan_id: Option<i64>,

    #[serde(default)]
    pub plan_name: Option<String>,

    #[serde(default)]
    pub tariff_type: Option<String>,

    #[serde(default)]
    pub source: Option<String>,

    /// Supply charge per day
    #[serde(default)]
    pub daily_fee: Option<f64>,

    /// Export rate per kWh
    #[serde(default)]
    pub feed_in_cost: Option<f64>,

    #[serde(default, deserialize_with = "timestamp::optional_instant")]
    pub as_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "timestamp::optional_instant")]
    pub updated: Option<DateTime<Utc>>,

    #[serde(default)]
    pub groups: Vec<TariffGroup>,
}

impl Tariff {
    /// Cost from the first group that applies at `at`
    pub fn cost_at<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> Option<f64> {
        self.groups.iter().find_map(|group| group.cost_at(at))
    }
}

/// Day/month/hour keyed price table
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TariffGroup {
    /// ISO weekdays, Monday = 1
    pub days: Vec<u32>,

    /// Months, January = 1
    pub months: Vec<u32>,

    /// Hour breakpoints, ascending
    pub periods: Vec<u32>,

    /// Cost per breakpoint
    pub costs: Vec<f64>,
}

impl TariffGroup {
    pub fn applies_on<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        self.months.contains(&at.month()) && self.days.contains(&at.weekday().number_from_monday())
    }

    /// Cost for the hour of `at`, evaluated in `at`'s own timezone.
    ///
    /// Hours outside every `[periods[i], periods[i+1])` interval take the last cost.
    pub fn cost_at<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> Option<f64> {
        if !self.applies_on(at) {
            return None;
        }
        let hour = at.hour();
        self.periods
            .windows(2)
            .zip(&self.costs)
            .find(|(bounds, _)| bounds[0] <= hour && hour < bounds[1])
            .map(|(_, cost)| *cost)
            .or_else(|| self.costs.last().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekday_group() -> TariffGroup {
        TariffGroup {
            days: vec![1, 2, 3, 4, 5],
            months: (1..=12).collect(),
            periods: vec![0, 7, 16, 20, 22],
            costs: vec![0.2, 0.3, 0.4, 0.5, 0.25],
        }
    }

    #[test]
    fn breakpoint_hour_starts_next_bucket() {
        let group = weekday_group();
        // 2025-04-14 is a Monday
        let at = |h| Utc.with_ymd_and_hms(2025, 4, 14, h, 0, 0).unwrap();
        assert_eq!(group.cost_at(&at(0)), Some(0.2));
        assert_eq!(group.cost_at(&at(6)), Some(0.2));
        assert_eq!(group.cost_at(&at(7)), Some(0.3));
        assert_eq!(group.cost_at(&at(16)), Some(0.4));
        assert_eq!(group.cost_at(&at(21)), Some(0.5));
        assert_eq!(group.cost_at(&at(22)), Some(0.25));
        assert_eq!(group.cost_at(&at(23)), Some(0.25));
    }

    #[test]
    fn weekend_does_not_match() {
        let group = weekday_group();
        // Sunday
        let at = Utc.with_ymd_and_hms(2025, 4, 13, 12, 0, 0).unwrap();
        assert_eq!(group.cost_at(&at), None);
    }

    #[test]
    fn tariff_uses_first_matching_group() {
        let weekend = TariffGroup {
            days: vec![6, 7],
            months: (1..=12).collect(),
            periods: vec![0],
            costs: vec![0.1],
        };
        let tariff = Tariff {
            dnsp_code: None,
            state: None,
            retailer_code: None,
            retailer_name: None,
            plan_id: Some(1),
            plan_name: None,
            tariff_type: None,
            source: None,
            daily_fee: None,
            feed_in_cost: None,
            as_at: None,
            updated: None,
            groups: vec![weekday_group(), weekend],
        };
        let sunday = Utc.with_ymd_and_hms(2025, 4, 13, 12, 0, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2025, 4, 14, 12, 0, 0).unwrap();
        assert_eq!(tariff.cost_at(&sunday), Some(0.1));
        assert_eq!(tariff.cost_at(&monday), Some(0.3));

        let empty = Tariff {
            groups: Vec::new(),
            ..tariff
        };
        assert_eq!(empty.cost_at(&monday), None);
    }

    #[test]
    fn evaluated_in_local_time() {
        let group = weekday_group();
        // 21:00 UTC Sunday is 07:00 Monday in Sydney (AEST, +10)
        let utc = Utc.with_ymd_and_hms(2025, 4, 13, 21, 0, 0).unwrap();
        assert_eq!(group.cost_at(&utc), None);
        let local = utc.with_timezone(&chrono_tz::Australia::Sydney);
        assert_eq!(group.cost_at(&local), Some(0.3));
    }
}
