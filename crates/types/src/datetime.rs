//! UTC instant at microsecond ("tick") resolution.

use chrono::{Datelike, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Microseconds since the Unix epoch, UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateTime(pub i64);

impl DateTime {
    pub fn from_unix_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros())
    }

    pub fn ticks(&self) -> i64 {
        self.0
    }

    fn chrono(&self) -> chrono::DateTime<Utc> {
        Utc.timestamp_micros(self.0)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
    }

    pub fn year(&self) -> i32 {
        self.chrono().year()
    }

    pub fn month(&self) -> u32 {
        self.chrono().month()
    }

    pub fn day(&self) -> u32 {
        self.chrono().day()
    }

    pub fn hour(&self) -> u32 {
        self.chrono().hour()
    }

    pub fn minute(&self) -> u32 {
        self.chrono().minute()
    }

    pub fn second(&self) -> u32 {
        self.chrono().second()
    }

    /// Midnight of the same day, i.e. the `Date` component.
    pub fn date(&self) -> Self {
        let d = self.chrono().date_naive();
        Self(
            d.and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
                .timestamp_micros(),
        )
    }

    pub fn day_of_week(&self) -> Weekday {
        self.chrono().weekday()
    }

    pub fn add_days(&self, days: i64) -> Self {
        Self(self.0 + days * 86_400_000_000)
    }

    pub fn add_hours(&self, hours: i64) -> Self {
        Self(self.0 + hours * 3_600_000_000)
    }

    pub fn add_minutes(&self, minutes: i64) -> Self {
        Self(self.0 + minutes * 60_000_000)
    }

    pub fn add_seconds(&self, seconds: i64) -> Self {
        Self(self.0 + seconds * 1_000_000)
    }

    pub fn add_months(&self, months: i32) -> Self {
        let c = self.chrono();
        let total_months = c.year() * 12 + c.month() as i32 - 1 + months;
        let year = total_months.div_euclid(12);
        let month = total_months.rem_euclid(12) as u32 + 1;
        let day = c.day().min(days_in_month(year, month));
        let replaced = Utc
            .with_ymd_and_hms(year, month, day, c.hour(), c.minute(), c.second())
            .single()
            .unwrap_or(c);
        Self(replaced.timestamp_micros())
    }

    pub fn add_years(&self, years: i32) -> Self {
        self.add_months(years * 12)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).unwrap()
    } else {
        Utc.with_ymd_and_hms(year, month + 1, 1, 0, 0, 0).unwrap()
    };
    let this = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap();
    (next - this).num_days() as u32
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.chrono().format("%Y-%m-%dT%H:%M:%S%.6fZ"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_accessors() {
        let dt = DateTime::from_unix_micros(
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 5)
                .unwrap()
                .timestamp_micros(),
        );
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 3);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 30);
        assert_eq!(dt.second(), 5);
    }

    #[test]
    fn add_months_clamps_short_months() {
        let jan31 = DateTime::from_unix_micros(
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0)
                .unwrap()
                .timestamp_micros(),
        );
        let next = jan31.add_months(1);
        assert_eq!(next.month(), 2);
        assert_eq!(next.day(), 29); // 2024 is a leap year
    }

    #[test]
    fn ordering_is_by_ticks() {
        let a = DateTime::from_unix_micros(100);
        let b = DateTime::from_unix_micros(200);
        assert!(a < b);
    }
}
