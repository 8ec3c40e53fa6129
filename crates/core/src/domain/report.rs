use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::category::CategoryId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonthlyReportId(pub String);

impl MonthlyReportId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// A calendar month in `YYYY-MM` form, the reporting granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportMonth {
    year: i32,
    month: u32,
}

impl ReportMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, String> {
        if !(1..=12).contains(&month) {
            return Err(format!("month must be in 1..=12, got {month}"));
        }
        if !(1970..=9999).contains(&year) {
            return Err(format!("year must be in 1970..=9999, got {year}"));
        }
        Ok(Self { year, month })
    }

    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// Inclusive start of the month, UTC midnight.
    pub fn start(&self) -> DateTime<Utc> {
        // new() guarantees a representable date.
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Exclusive end of the month: the start of the following month.
    pub fn end(&self) -> DateTime<Utc> {
        let (year, month) =
            if self.month == 12 { (self.year + 1, 1) } else { (self.year, self.month + 1) };
        Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl std::fmt::Display for ReportMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

impl std::str::FromStr for ReportMonth {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (year, month) = value
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got `{value}`"))?;
        let year: i32 =
            year.parse().map_err(|_| format!("expected YYYY-MM, got `{value}`"))?;
        let month: u32 =
            month.parse().map_err(|_| format!("expected YYYY-MM, got `{value}`"))?;
        Self::new(year, month)
    }
}

/// Cached counters for one month, optionally scoped to a category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub id: MonthlyReportId,
    pub month: ReportMonth,
    pub category_id: Option<CategoryId>,
    pub total_items: i64,
    pub total_usage: i64,
    pub total_maintenance: i64,
    pub generated_at: DateTime<Utc>,
}
