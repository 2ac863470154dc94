//! Timezone-correct elapsed-time checks.
//!
//! Thresholds are evaluated in civil time: a 9-hour shift that starts at
//! 9 AM local ends at 6 PM local, even if a daylight-saving transition falls
//! inside the window. For UTC the check degrades to plain elapsed duration.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Civil (wall-clock) timestamp components in some timezone.
/// Ordered comparison is field-by-field: year, month, day, hour, minute, second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct CivilTime {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
}

impl CivilTime {
    fn of<T: TimeZone>(instant: &DateTime<T>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
            day: instant.day(),
            hour: instant.hour(),
            minute: instant.minute(),
            second: instant.second(),
        }
    }

    /// Add whole hours, carrying into day/month/year using real month lengths.
    /// Minute and second are inherited unchanged.
    fn plus_hours(mut self, hours: u32) -> Self {
        let total = self.hour + hours;
        self.hour = total % 24;
        let mut extra_days = total / 24;

        while extra_days > 0 {
            let remaining_in_month = days_in_month(self.year, self.month) - self.day;
            if extra_days <= remaining_in_month {
                self.day += extra_days;
                break;
            }
            extra_days -= remaining_in_month + 1;
            self.day = 1;
            if self.month == 12 {
                self.month = 1;
                self.year += 1;
            } else {
                self.month += 1;
            }
        }

        self
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

/// True iff at least `threshold_hours` wall-clock hours have elapsed since
/// `reference`, evaluated in `timezone` (IANA name, or "UTC").
pub fn hours_elapsed_exceeds(reference: DateTime<Utc>, timezone: &str, threshold_hours: u32) -> bool {
    hours_elapsed_exceeds_at(reference, timezone, threshold_hours, Utc::now())
}

/// Same as [`hours_elapsed_exceeds`] with an explicit `now`, for callers that
/// already hold a sweep timestamp and for tests.
pub fn hours_elapsed_exceeds_at(
    reference: DateTime<Utc>,
    timezone: &str,
    threshold_hours: u32,
    now: DateTime<Utc>,
) -> bool {
    if timezone.is_empty() || timezone.eq_ignore_ascii_case("utc") {
        return (now - reference).num_hours() >= threshold_hours as i64;
    }

    let tz: Tz = match timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Unknown timezone {:?}, falling back to UTC", timezone);
            return (now - reference).num_hours() >= threshold_hours as i64;
        }
    };

    let threshold = CivilTime::of(&reference.with_timezone(&tz)).plus_hours(threshold_hours);
    let now_civil = CivilTime::of(&now.with_timezone(&tz));

    now_civil >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use chrono_tz::America::New_York;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
            .and_utc()
    }

    /// Build the UTC instant corresponding to a New York local time.
    fn ny_local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        New_York
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_utc_direct_elapsed() {
        let reference = utc(2025, 6, 1, 9, 0);
        assert!(!hours_elapsed_exceeds_at(
            reference,
            "UTC",
            9,
            utc(2025, 6, 1, 17, 59)
        ));
        assert!(hours_elapsed_exceeds_at(
            reference,
            "UTC",
            9,
            utc(2025, 6, 1, 18, 0)
        ));
    }

    #[test]
    fn test_named_timezone_wall_clock_boundary() {
        // Punch in 09:00 New York local, threshold 9h: 17:59 local is under,
        // 18:00 local is at the threshold.
        let punch_in = ny_local(2025, 3, 3, 9, 0);
        assert!(!hours_elapsed_exceeds_at(
            punch_in,
            "America/New_York",
            9,
            ny_local(2025, 3, 3, 17, 59)
        ));
        assert!(hours_elapsed_exceeds_at(
            punch_in,
            "America/New_York",
            9,
            ny_local(2025, 3, 3, 18, 0)
        ));
    }

    #[test]
    fn test_dst_spring_forward_uses_civil_time() {
        // US DST starts 2025-03-09 02:00 local. 9 civil hours after 01:00
        // local is 10:00 local even though only 8 UTC hours elapsed.
        let reference = ny_local(2025, 3, 9, 1, 0);
        let nine_fifty_nine = ny_local(2025, 3, 9, 9, 59);
        let ten = ny_local(2025, 3, 9, 10, 0);

        assert!(!hours_elapsed_exceeds_at(
            reference,
            "America/New_York",
            9,
            nine_fifty_nine
        ));
        assert!(hours_elapsed_exceeds_at(
            reference,
            "America/New_York",
            9,
            ten
        ));
    }

    #[test]
    fn test_day_rollover() {
        let reference = ny_local(2025, 5, 15, 23, 0);
        // 23:00 + 9h → next day 08:00 local.
        assert!(!hours_elapsed_exceeds_at(
            reference,
            "America/New_York",
            9,
            ny_local(2025, 5, 16, 7, 59)
        ));
        assert!(hours_elapsed_exceeds_at(
            reference,
            "America/New_York",
            9,
            ny_local(2025, 5, 16, 8, 0)
        ));
    }

    #[test]
    fn test_year_rollover_dec_31() {
        // Dec 31 23:00 local + 9h → Jan 1 08:00 local of the next year.
        let reference = ny_local(2024, 12, 31, 23, 0);
        assert!(!hours_elapsed_exceeds_at(
            reference,
            "America/New_York",
            9,
            ny_local(2025, 1, 1, 7, 59)
        ));
        assert!(hours_elapsed_exceeds_at(
            reference,
            "America/New_York",
            9,
            ny_local(2025, 1, 1, 8, 0)
        ));
    }

    #[test]
    fn test_month_rollover_respects_month_length() {
        // Feb 28 2025 (non-leap) 20:00 + 9h → Mar 1 05:00.
        let threshold = CivilTime {
            year: 2025,
            month: 2,
            day: 28,
            hour: 20,
            minute: 30,
            second: 0,
        }
        .plus_hours(9);

        assert_eq!(threshold.year, 2025);
        assert_eq!(threshold.month, 3);
        assert_eq!(threshold.day, 1);
        assert_eq!(threshold.hour, 5);
        assert_eq!(threshold.minute, 30);
    }

    #[test]
    fn test_leap_year_february() {
        // Feb 28 2024 (leap) 20:00 + 9h → Feb 29 05:00.
        let threshold = CivilTime {
            year: 2024,
            month: 2,
            day: 28,
            hour: 20,
            minute: 0,
            second: 0,
        }
        .plus_hours(9);

        assert_eq!(threshold.month, 2);
        assert_eq!(threshold.day, 29);
        assert_eq!(threshold.hour, 5);
    }

    #[test]
    fn test_multi_day_carry() {
        let threshold = CivilTime {
            year: 2025,
            month: 1,
            day: 30,
            hour: 12,
            minute: 0,
            second: 0,
        }
        .plus_hours(72);

        assert_eq!(threshold.month, 2);
        assert_eq!(threshold.day, 2);
        assert_eq!(threshold.hour, 12);
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        let reference = utc(2025, 6, 1, 0, 0);
        assert!(hours_elapsed_exceeds_at(
            reference,
            "Not/AZone",
            9,
            utc(2025, 6, 1, 9, 0)
        ));
    }
}
