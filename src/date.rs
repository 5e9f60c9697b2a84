use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Bound, Error, Result};

/// A calendar date with hour resolution, rendered as `YYYY-MM-DDTHH`.
///
/// Accepted inputs:
/// - "YYYY-MM-DD" or the compact "YYYYMMDD"
/// - "YYYY-MM-DDTHH", "YYYY-MM-DDTHH:MM" or "YYYY-MM-DDTHH:MM:SS" (a space may
///   replace the `T`)
///
/// Minutes and seconds are accepted but dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaveDate(NaiveDateTime);

impl WaveDate {
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let malformed = |reason: &str| Error::DateFormat {
            input: trimmed.to_string(),
            reason: reason.to_string(),
        };

        let (date_part, time_part) = match trimmed.split_once(|c: char| c == 'T' || c == ' ') {
            Some((d, t)) => (d, Some(t)),
            None => (trimmed, None),
        };

        let date = match date_part.len() {
            10 => NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
                .map_err(|e| malformed(&e.to_string()))?,
            8 if date_part.bytes().all(|b| b.is_ascii_digit()) => {
                NaiveDate::parse_from_str(date_part, "%Y%m%d").map_err(|e| malformed(&e.to_string()))?
            }
            _ => return Err(malformed("expected YYYY-MM-DD")),
        };

        let hour = match time_part {
            None => 0,
            Some(t) => parse_hour(t).map_err(malformed)?,
        };

        Self::from_parts(date, hour).ok_or_else(|| malformed("hour is out of range"))
    }

    pub fn from_ymdh(year: i32, month: u32, day: u32, hour: u32) -> Result<Self> {
        let input = format!("{year:04}-{month:02}-{day:02}T{hour:02}");
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| Error::DateFormat {
            input: input.clone(),
            reason: "day is out of range for month".to_string(),
        })?;
        Self::from_parts(date, hour).ok_or(Error::DateFormat {
            input,
            reason: "hour is out of range".to_string(),
        })
    }

    /// Truncates `dt` to the hour.
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        let hour = NaiveTime::from_hms_opt(dt.hour(), 0, 0).unwrap_or_default();
        WaveDate(dt.date().and_time(hour))
    }

    fn from_parts(date: NaiveDate, hour: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, 0, 0).map(|t| WaveDate(date.and_time(t)))
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    /// Same day-of-month and hour in another year. Feb 29 has no counterpart
    /// in a common year and is rejected.
    pub fn with_year(self, year: i32) -> Result<Self> {
        Self::from_ymdh(year, self.month(), self.day(), self.hour())
    }

    /// Same day-of-month and hour in another month (fails for e.g. day 30 in February).
    pub fn with_month(self, month: u32) -> Result<Self> {
        Self::from_ymdh(self.year(), month, self.day(), self.hour())
    }

    /// Shift by whole calendar months, clamping the day to the target month's length.
    pub fn add_months(self, months: i32) -> Result<Self> {
        let delta = Months::new(months.unsigned_abs());
        let shifted = if months >= 0 {
            self.0.checked_add_months(delta)
        } else {
            self.0.checked_sub_months(delta)
        };
        shifted.map(WaveDate).ok_or_else(|| Error::DateFormat {
            input: self.to_string(),
            reason: format!("cannot shift by {months} months"),
        })
    }

    pub fn same_month(&self, other: &WaveDate) -> bool {
        self.year() == other.year() && self.month() == other.month()
    }

    /// `{year}{month:02}` as used in archive file names.
    pub fn yyyymm(&self) -> String {
        format!("{}{:02}", self.year(), self.month())
    }
}

fn parse_hour(time: &str) -> std::result::Result<u32, &'static str> {
    let mut fields = time.split(':');
    let hour = fields
        .next()
        .filter(|h| h.len() == 2)
        .and_then(|h| h.parse::<u32>().ok())
        .ok_or("expected a two-digit hour")?;

    for (i, field) in fields.enumerate() {
        let whole = field.split_once('.').map(|(w, _)| w).unwrap_or(field);
        let value: u32 = whole.parse().map_err(|_| "invalid minutes or seconds")?;
        if i > 1 || value > 59 {
            return Err("invalid minutes or seconds");
        }
    }

    if hour > 23 {
        return Err("hour is out of range");
    }
    Ok(hour)
}

impl fmt::Display for WaveDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H"))
    }
}

impl FromStr for WaveDate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WaveDate::parse(s)
    }
}

/// Inclusive span of calendar dates a source provides data for. A missing
/// bound is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateSpan {
    pub min: Option<NaiveDate>,
    pub max: Option<NaiveDate>,
}

impl DateSpan {
    pub fn new(min: Option<NaiveDate>, max: Option<NaiveDate>) -> Self {
        Self { min, max }
    }

    pub fn check(&self, date: &WaveDate) -> Result<()> {
        let day = date.date();
        if let Some(min) = self.min {
            if day < min {
                return Err(Error::DateRange {
                    date: date.to_string(),
                    bound: Bound::Minimum,
                    limit: min.to_string(),
                });
            }
        }
        if let Some(max) = self.max {
            if day > max {
                return Err(Error::DateRange {
                    date: date.to_string(),
                    bound: Bound::Maximum,
                    limit: max.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn contains(&self, date: &WaveDate) -> bool {
        self.check(date).is_ok()
    }
}
