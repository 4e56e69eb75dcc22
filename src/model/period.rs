use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc, Weekday};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cadence at which calculations, payouts, or rank evaluations run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    /// Key doesn't match `YYYY-MM`, `YYYY-Www`, or `YYYY-MM-DD`.
    #[error("invalid period key '{0}' (expected YYYY-MM, YYYY-Www, or YYYY-MM-DD)")]
    InvalidKey(String),
    /// Key parsed but names a date outside the calendar (e.g. month 13, week 54).
    #[error("period key '{0}' names an out-of-range date")]
    OutOfRange(String),
}

/// One commission period: a half-open UTC window `[start, end)` with a
/// stable key. The key doubles as the advisory-lock name and as the
/// idempotency scope for everything the period run writes.
///
/// Key shapes: `2025-08` (monthly), `2025-W34` (ISO weekly), `2025-08-26`
/// (daily).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub key: String,
    pub cadence: Cadence,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

impl Period {
    pub fn daily(date: NaiveDate) -> Self {
        Period {
            key: date.format("%Y-%m-%d").to_string(),
            cadence: Cadence::Daily,
            start: day_start(date),
            end: day_start(date + Days::new(1)),
        }
    }

    /// ISO week: Monday through Sunday.
    pub fn weekly(year: i32, week: u32) -> Option<Self> {
        let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
        Some(Period {
            key: format!("{year}-W{week:02}"),
            cadence: Cadence::Weekly,
            start: day_start(monday),
            end: day_start(monday + Days::new(7)),
        })
    }

    pub fn monthly(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Period {
            key: format!("{year}-{month:02}"),
            cadence: Cadence::Monthly,
            start: day_start(first),
            end: day_start(next),
        })
    }

    /// The period of the given cadence containing `at`.
    pub fn containing(cadence: Cadence, at: DateTime<Utc>) -> Self {
        let date = at.date_naive();
        match cadence {
            Cadence::Daily => Period::daily(date),
            Cadence::Weekly => {
                let iso = date.iso_week();
                // Valid for any calendar date, so the lookup cannot miss.
                Period::weekly(iso.year(), iso.week())
                    .unwrap_or_else(|| Period::daily(date))
            }
            Cadence::Monthly => Period::monthly(date.year(), date.month())
                .unwrap_or_else(|| Period::daily(date)),
        }
    }

    /// Parse a period key back into its window. The shape of the key
    /// decides the cadence.
    pub fn parse(key: &str) -> Result<Self, PeriodError> {
        let bad = || PeriodError::InvalidKey(key.to_string());
        if let Some((year, week)) = key.split_once("-W") {
            let year: i32 = year.parse().map_err(|_| bad())?;
            let week: u32 = week.parse().map_err(|_| bad())?;
            return Period::weekly(year, week).ok_or_else(|| PeriodError::OutOfRange(key.to_string()));
        }
        match key.split('-').count() {
            2 => {
                let (year, month) = key.split_once('-').ok_or_else(bad)?;
                let year: i32 = year.parse().map_err(|_| bad())?;
                let month: u32 = month.parse().map_err(|_| bad())?;
                Period::monthly(year, month).ok_or_else(|| PeriodError::OutOfRange(key.to_string()))
            }
            3 => {
                let date = NaiveDate::parse_from_str(key, "%Y-%m-%d").map_err(|_| bad())?;
                Ok(Period::daily(date))
            }
            _ => Err(bad()),
        }
    }

    /// The period of the same cadence immediately before this one.
    /// Carry-over volume is read from here.
    pub fn previous(&self) -> Self {
        let last_day = self.start.date_naive() - Days::new(1);
        Period::containing(self.cadence, day_start(last_day))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}
