//! Recurrence resolver: schedule + "now" → next fire instant.
//!
//! Pure functions: no wall clock, no I/O. A candidate equal to `now` counts as
//! already passed, so a recurring result is always strictly after `now`.

use agentdesk_core::ResolutionError;
use chrono::{Datelike, Days, NaiveDate, NaiveTime, Weekday};

use crate::tasks::{NextExecution, Recurrence, Schedule, Season, Timestamp};

/// Compute the next occurrence of `schedule` relative to `now`.
pub fn compute_next(schedule: &Schedule, now: Timestamp) -> Result<NextExecution, ResolutionError> {
    let at = match schedule {
        Schedule::Datetime { datetime } => *datetime,
        Schedule::Recurring(rule) => next_recurring(rule, now)?,
        Schedule::Seasonal { season, time } => next_seasonal(*season, parse_time_of_day(time)?, now)?,
        Schedule::Conditional { .. } => return Ok(NextExecution::Conditional),
    };
    Ok(NextExecution::At(at))
}

fn next_recurring(rule: &Recurrence, now: Timestamp) -> Result<Timestamp, ResolutionError> {
    match rule {
        Recurrence::Daily { time } => next_daily(parse_time_of_day(time)?, now),
        Recurrence::Weekly { day, time } => {
            next_weekly(parse_weekday(day)?, parse_time_of_day(time)?, now)
        }
        Recurrence::Monthly { day, time } => {
            if !(1..=28).contains(day) {
                return Err(ResolutionError::DayOutOfRange(*day));
            }
            next_monthly(*day, parse_time_of_day(time)?, now)
        }
        Recurrence::Weekend { time } => next_weekend(parse_time_of_day(time)?, now),
    }
}

/// Parse `HH:MM` (seconds tolerated).
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ResolutionError> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| ResolutionError::InvalidTime(raw.to_string()))
}

/// Parse an English day name, full or three-letter, case-insensitive.
pub fn parse_weekday(raw: &str) -> Result<Weekday, ResolutionError> {
    let day = match raw.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return Err(ResolutionError::UnknownDay(raw.to_string())),
    };
    Ok(day)
}

fn next_daily(time: NaiveTime, now: Timestamp) -> Result<Timestamp, ResolutionError> {
    let today = now.date().and_time(time);
    if today > now {
        return Ok(today);
    }
    add_days(now.date(), 1, now).map(|d| d.and_time(time))
}

fn next_weekly(day: Weekday, time: NaiveTime, now: Timestamp) -> Result<Timestamp, ResolutionError> {
    let target = day.num_days_from_monday();
    let current = now.weekday().num_days_from_monday();
    let mut days_ahead = (target + 7 - current) % 7;
    if days_ahead == 0 && now.date().and_time(time) <= now {
        days_ahead = 7;
    }
    add_days(now.date(), days_ahead, now).map(|d| d.and_time(time))
}

fn next_monthly(day: u32, time: NaiveTime, now: Timestamp) -> Result<Timestamp, ResolutionError> {
    let this_month = NaiveDate::from_ymd_opt(now.year(), now.month(), day)
        .ok_or_else(|| ResolutionError::OutOfRange(now.to_string()))?
        .and_time(time);
    if this_month > now {
        return Ok(this_month);
    }
    // First of next month, then offset to the target day.
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ResolutionError::OutOfRange(now.to_string()))?;
    add_days(first, day - 1, now).map(|d| d.and_time(time))
}

fn next_weekend(time: NaiveTime, now: Timestamp) -> Result<Timestamp, ResolutionError> {
    for offset in 0..=7 {
        let date = add_days(now.date(), offset, now)?;
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && date.and_time(time) > now {
            return Ok(date.and_time(time));
        }
    }
    Err(ResolutionError::OutOfRange(now.to_string()))
}

fn next_seasonal(season: Season, time: NaiveTime, now: Timestamp) -> Result<Timestamp, ResolutionError> {
    let (month, day) = season.anchor();
    for year in [now.year(), now.year() + 1] {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            let candidate = date.and_time(time);
            if candidate > now {
                return Ok(candidate);
            }
        }
    }
    Err(ResolutionError::OutOfRange(now.to_string()))
}

fn add_days(date: NaiveDate, days: u32, now: Timestamp) -> Result<NaiveDate, ResolutionError> {
    date.checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(|| ResolutionError::OutOfRange(now.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Timelike};

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    fn at(result: Result<NextExecution, ResolutionError>) -> Timestamp {
        match result.unwrap() {
            NextExecution::At(t) => t,
            other => panic!("expected timestamp, got {other:?}"),
        }
    }

    fn daily(time: &str) -> Schedule {
        Schedule::Recurring(Recurrence::Daily { time: time.into() })
    }

    fn weekly(day: &str, time: &str) -> Schedule {
        Schedule::Recurring(Recurrence::Weekly { day: day.into(), time: time.into() })
    }

    fn monthly(day: u32, time: &str) -> Schedule {
        Schedule::Recurring(Recurrence::Monthly { day, time: time.into() })
    }

    fn weekend(time: &str) -> Schedule {
        Schedule::Recurring(Recurrence::Weekend { time: time.into() })
    }

    #[test]
    fn test_daily_before_and_after() {
        let s = daily("09:00");
        assert_eq!(at(compute_next(&s, ts(2024, 1, 15, 8, 0))), ts(2024, 1, 15, 9, 0));
        assert_eq!(at(compute_next(&s, ts(2024, 1, 15, 9, 30))), ts(2024, 1, 16, 9, 0));
        // Exactly at the time counts as passed.
        assert_eq!(at(compute_next(&s, ts(2024, 1, 15, 9, 0))), ts(2024, 1, 16, 9, 0));
        // Year rollover.
        assert_eq!(at(compute_next(&s, ts(2024, 12, 31, 23, 0))), ts(2025, 1, 1, 9, 0));
    }

    #[test]
    fn test_weekly_lands_on_day_within_a_week() {
        let days = ["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"];
        let mut now = ts(2024, 1, 1, 0, 0); // a Monday
        for _ in 0..(14 * 6) {
            for (idx, day) in days.iter().enumerate() {
                let next = at(compute_next(&weekly(day, "12:00"), now));
                assert_eq!(next.weekday().num_days_from_monday() as usize, idx);
                assert!(next >= now && next <= now + Duration::days(7), "{day} from {now}: {next}");
                assert_eq!((next.hour(), next.minute()), (12, 0));
            }
            now += Duration::hours(4);
        }
    }

    #[test]
    fn test_weekly_same_day() {
        // 2024-01-15 is a Monday.
        let s = weekly("Monday", "09:00");
        assert_eq!(at(compute_next(&s, ts(2024, 1, 15, 8, 0))), ts(2024, 1, 15, 9, 0));
        assert_eq!(at(compute_next(&s, ts(2024, 1, 15, 10, 0))), ts(2024, 1, 22, 9, 0));
        assert_eq!(at(compute_next(&weekly("wed", "09:00"), ts(2024, 1, 15, 10, 0))), ts(2024, 1, 17, 9, 0));
    }

    #[test]
    fn test_monthly() {
        let s = monthly(10, "08:00");
        assert_eq!(at(compute_next(&s, ts(2024, 3, 5, 12, 0))), ts(2024, 3, 10, 8, 0));
        assert_eq!(at(compute_next(&s, ts(2024, 3, 10, 9, 0))), ts(2024, 4, 10, 8, 0));
        // Year boundary.
        assert_eq!(at(compute_next(&s, ts(2024, 12, 20, 0, 0))), ts(2025, 1, 10, 8, 0));
        // Late-month day across February.
        let s = monthly(28, "23:30");
        assert_eq!(at(compute_next(&s, ts(2024, 1, 29, 0, 0))), ts(2024, 2, 28, 23, 30));
        assert_eq!(at(compute_next(&s, ts(2023, 2, 28, 23, 45))), ts(2023, 3, 28, 23, 30));
    }

    #[test]
    fn test_monthly_day_out_of_range() {
        for day in [0, 29, 31] {
            assert_eq!(
                compute_next(&monthly(day, "08:00"), ts(2024, 1, 1, 0, 0)),
                Err(ResolutionError::DayOutOfRange(day))
            );
        }
    }

    #[test]
    fn test_weekend_earliest_slot() {
        let s = weekend("10:00");
        // Wednesday → Saturday.
        assert_eq!(at(compute_next(&s, ts(2024, 1, 17, 12, 0))), ts(2024, 1, 20, 10, 0));
        // Saturday before the time → today.
        assert_eq!(at(compute_next(&s, ts(2024, 1, 20, 9, 0))), ts(2024, 1, 20, 10, 0));
        // Saturday after the time → Sunday.
        assert_eq!(at(compute_next(&s, ts(2024, 1, 20, 11, 0))), ts(2024, 1, 21, 10, 0));
        // Sunday after the time → next Saturday.
        assert_eq!(at(compute_next(&s, ts(2024, 1, 21, 11, 0))), ts(2024, 1, 27, 10, 0));
    }

    #[test]
    fn test_weekend_property() {
        let mut now = ts(2024, 2, 26, 0, 0);
        for _ in 0..(7 * 24) {
            let next = at(compute_next(&weekend("10:00"), now));
            assert!(matches!(next.weekday(), Weekday::Sat | Weekday::Sun));
            assert!(next > now);
            // No weekend 10:00 slot strictly between now and next.
            let mut probe = now.date();
            while probe < next.date() {
                let slot = probe.and_hms_opt(10, 0, 0).unwrap();
                let weekend_day = matches!(probe.weekday(), Weekday::Sat | Weekday::Sun);
                assert!(!(weekend_day && slot > now), "missed {slot} from {now}");
                probe = probe.succ_opt().unwrap();
            }
            now += Duration::hours(1);
        }
    }

    #[test]
    fn test_seasonal() {
        let s = Schedule::Seasonal { season: Season::Summer, time: "09:00".into() };
        assert_eq!(at(compute_next(&s, ts(2024, 1, 1, 0, 0))), ts(2024, 6, 21, 9, 0));
        assert_eq!(at(compute_next(&s, ts(2024, 6, 21, 9, 0))), ts(2025, 6, 21, 9, 0));
        let s = Schedule::Seasonal { season: Season::Winter, time: "18:00".into() };
        assert_eq!(at(compute_next(&s, ts(2024, 12, 22, 0, 0))), ts(2025, 12, 21, 18, 0));
        for season in [Season::Spring, Season::Summer, Season::Autumn, Season::Winter] {
            let now = ts(2024, 7, 4, 12, 0);
            let next = at(compute_next(&Schedule::Seasonal { season, time: "00:00".into() }, now));
            assert_eq!((next.month(), next.day()), season.anchor());
            assert!(next > now);
        }
    }

    #[test]
    fn test_datetime_is_returned_unchanged() {
        let when = ts(2024, 1, 20, 10, 0);
        let s = Schedule::Datetime { datetime: when };
        assert_eq!(at(compute_next(&s, ts(2030, 1, 1, 0, 0))), when);
    }

    #[test]
    fn test_conditional_sentinel() {
        let s = Schedule::Conditional {
            condition: crate::tasks::Condition::Email { email_subject: None, email_sender: None },
        };
        assert_eq!(compute_next(&s, ts(2024, 1, 1, 0, 0)), Ok(NextExecution::Conditional));
    }

    #[test]
    fn test_idempotent() {
        let now = ts(2024, 5, 5, 5, 5);
        for s in [daily("07:15"), weekly("sun", "23:59"), monthly(3, "00:00"), weekend("06:00")] {
            assert_eq!(compute_next(&s, now), compute_next(&s, now));
        }
    }

    #[test]
    fn test_resolution_errors() {
        let now = ts(2024, 1, 1, 0, 0);
        assert_eq!(
            compute_next(&daily("9am"), now),
            Err(ResolutionError::InvalidTime("9am".into()))
        );
        assert_eq!(
            compute_next(&weekly("someday", "09:00"), now),
            Err(ResolutionError::UnknownDay("someday".into()))
        );
        assert!(compute_next(&daily("24:00"), now).is_err());
    }
}
