//! Condition evaluator for conditional tasks.

use agentdesk_core::ResolutionError;
use chrono::NaiveTime;

use crate::recurrence::parse_time_of_day;
use crate::tasks::{Condition, TimeWindow, Timestamp};

/// Check whether `condition` holds at `now`.
pub fn evaluate(condition: &Condition, now: Timestamp) -> bool {
    match condition {
        Condition::File { file_path } => file_path.exists(),
        Condition::Time { time_condition } => match in_window(time_condition, now.time()) {
            Ok(inside) => inside,
            Err(e) => {
                tracing::warn!("⚠️ Ignoring time condition: {e}");
                false
            }
        },
        // Mailbox polling is not wired up; this hook never fires.
        Condition::Email { .. } => false,
    }
}

/// Whether `t` is inside the window. Bounds are inclusive and a missing or
/// blank bound is open. `after > before` wraps past midnight.
pub fn in_window(window: &TimeWindow, t: NaiveTime) -> Result<bool, ResolutionError> {
    let after = bound(window.after.as_deref())?;
    let before = bound(window.before.as_deref())?;
    let inside = match (after, before) {
        (None, None) => true,
        (Some(a), None) => t >= a,
        (None, Some(b)) => t <= b,
        (Some(a), Some(b)) if a <= b => t >= a && t <= b,
        (Some(a), Some(b)) => t >= a || t <= b,
    };
    Ok(inside)
}

fn bound(raw: Option<&str>) -> Result<Option<NaiveTime>, ResolutionError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_time_of_day(s).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn window(after: Option<&str>, before: Option<&str>) -> Condition {
        Condition::Time {
            time_condition: TimeWindow {
                after: after.map(String::from),
                before: before.map(String::from),
            },
        }
    }

    #[test]
    fn test_file_condition() {
        let dir = tempfile::tempdir().unwrap();
        let flag = dir.path().join("flag");
        let cond = Condition::File { file_path: flag.clone() };
        assert!(!evaluate(&cond, at(12, 0)));
        std::fs::write(&flag, b"").unwrap();
        assert!(evaluate(&cond, at(12, 0)));
    }

    #[test]
    fn test_day_window() {
        let cond = window(Some("08:00"), Some("18:00"));
        assert!(!evaluate(&cond, at(7, 59)));
        assert!(evaluate(&cond, at(8, 0)));
        assert!(evaluate(&cond, at(18, 0)));
        assert!(!evaluate(&cond, at(18, 1)));
    }

    #[test]
    fn test_open_bounds() {
        assert!(evaluate(&window(None, None), at(3, 0)));
        assert!(evaluate(&window(Some("08:00"), None), at(23, 0)));
        assert!(!evaluate(&window(None, Some("08:00")), at(9, 0)));
        // Blank strings from a form count as missing.
        assert!(evaluate(&window(Some(""), Some(" ")), at(9, 0)));
    }

    #[test]
    fn test_overnight_window_wraps() {
        let cond = window(Some("22:00"), Some("06:00"));
        assert!(evaluate(&cond, at(23, 30)));
        assert!(evaluate(&cond, at(2, 0)));
        assert!(evaluate(&cond, at(6, 0)));
        assert!(!evaluate(&cond, at(12, 0)));
        assert!(!evaluate(&cond, at(21, 59)));
    }

    #[test]
    fn test_malformed_bound_is_false() {
        assert!(!evaluate(&window(Some("late"), None), at(12, 0)));
        assert!(in_window(&TimeWindow { after: Some("late".into()), before: None }, at(12, 0).time()).is_err());
    }

    #[test]
    fn test_email_never_fires() {
        let cond = Condition::Email {
            email_subject: Some("Invoice".into()),
            email_sender: Some("billing@example.com".into()),
        };
        assert!(!evaluate(&cond, at(12, 0)));
    }
}
