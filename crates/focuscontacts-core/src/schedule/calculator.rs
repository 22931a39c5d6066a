//! Next-occurrence and window-membership calculations.
//!
//! All arithmetic is on local wall-clock fields ([`NaiveDateTime`]); there is
//! no timezone or DST correction.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use super::{Schedule, WeeklyWindow};

fn at_minutes(date: NaiveDate, minutes: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(minutes))
}

fn weekday_of(now: NaiveDateTime) -> u32 {
    now.weekday().num_days_from_sunday()
}

fn minutes_of_day(now: NaiveDateTime) -> u32 {
    now.hour() * 60 + now.minute()
}

fn next_start_in(window: &WeeklyWindow, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let today = weekday_of(now);
    window
        .days()
        .map(|day| {
            let delta = (day + 7 - today) % 7;
            let candidate = at_minutes(now.date() + Duration::days(i64::from(delta)), window.start_minutes());
            if candidate <= now {
                candidate + Duration::days(7)
            } else {
                candidate
            }
        })
        .min()
}

/// Earliest start of the schedule strictly after `now`.
///
/// `None` when the schedule behaves as disabled.
pub fn next_occurrence(schedule: &Schedule, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let window = schedule.window()?;
    next_start_in(&window, now)
}

/// End of the window that begins at [`next_occurrence`].
///
/// Takes the date of the next start, sets the end clock, moves one day
/// forward for overnight windows, and a week forward if that is still not
/// after `now`.
pub fn next_end_occurrence(schedule: &Schedule, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let window = schedule.window()?;
    let start = next_start_in(&window, now)?;

    let mut end = at_minutes(start.date(), window.end_minutes());
    if window.is_overnight() {
        end += Duration::days(1);
    }
    if end <= now {
        end += Duration::days(7);
    }
    Some(end)
}

/// End of the window containing `now`, if `now` is inside one.
///
/// [`next_end_occurrence`] looks at the *next* window only; while a window
/// is in progress its own end is earlier than that.
pub fn current_window_end(schedule: &Schedule, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let window = schedule.window()?;
    let (weekday, minutes) = (weekday_of(now), minutes_of_day(now));
    if !window.contains(weekday, minutes) {
        return None;
    }

    let today = now.date();
    let end_date = if window.is_overnight() && window.has_day(weekday) && minutes >= window.start_minutes() {
        today + Duration::days(1)
    } else {
        today
    };
    Some(at_minutes(end_date, window.end_minutes()))
}

/// Whether `minutes_now` on `weekday` (0=Sunday) falls inside the schedule.
///
/// A normal window is `[start, end)` on scheduled days. An overnight window
/// covers `[start, midnight)` on a scheduled day and `[midnight, end)` on the
/// day after a scheduled day.
pub fn is_within_window(weekday: u32, minutes_now: u32, schedule: &Schedule) -> bool {
    schedule
        .window()
        .is_some_and(|window| window.contains(weekday, minutes_now))
}

/// [`is_within_window`] for a wall-clock timestamp.
pub fn is_active_at(schedule: &Schedule, now: NaiveDateTime) -> bool {
    is_within_window(weekday_of(now), minutes_of_day(now), schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, 0)
            .unwrap()
    }

    // 2026-10-16 is a Friday.
    fn friday_overnight() -> Schedule {
        Schedule::new([5], 1320, 420)
    }

    #[test]
    fn overnight_window_membership() {
        let s = friday_overnight();
        assert!(is_within_window(5, 23 * 60, &s), "Fri 23:00");
        assert!(is_within_window(6, 3 * 60, &s), "Sat 03:00");
        assert!(!is_within_window(6, 8 * 60, &s), "Sat 08:00");
        assert!(!is_within_window(4, 23 * 60, &s), "Thu 23:00");
    }

    #[test]
    fn overnight_window_boundaries() {
        let s = friday_overnight();
        assert!(is_within_window(5, 1320, &s));
        assert!(!is_within_window(5, 1319, &s));
        assert!(is_within_window(6, 419, &s));
        assert!(!is_within_window(6, 420, &s));
    }

    #[test]
    fn normal_window_is_half_open() {
        let s = Schedule::new([1], 540, 1080);
        assert!(is_within_window(1, 540, &s));
        assert!(is_within_window(1, 1079, &s));
        assert!(!is_within_window(1, 1080, &s));
        assert!(!is_within_window(2, 600, &s));
    }

    #[test]
    fn equal_start_and_end_is_never_active_and_never_scheduled() {
        let s = Schedule::new([0, 1, 2, 3, 4, 5, 6], 600, 600);
        for day in 0..7 {
            for minutes in [0, 599, 600, 601, 1439] {
                assert!(!is_within_window(day, minutes, &s));
            }
        }
        let now = at(2026, 10, 19, 8, 0);
        assert_eq!(next_occurrence(&s, now), None);
        assert_eq!(next_end_occurrence(&s, now), None);
    }

    #[test]
    fn next_occurrence_later_today() {
        let s = Schedule::new([1], 540, 1080);
        let now = at(2026, 10, 19, 8, 0); // Monday
        assert_eq!(next_occurrence(&s, now), Some(at(2026, 10, 19, 9, 0)));
        assert_eq!(next_end_occurrence(&s, now), Some(at(2026, 10, 19, 18, 0)));
    }

    #[test]
    fn passed_today_rolls_to_next_week() {
        let s = Schedule::new([1], 540, 1080);
        let now = at(2026, 10, 19, 9, 0); // exactly at start
        assert_eq!(next_occurrence(&s, now), Some(at(2026, 10, 26, 9, 0)));
    }

    #[test]
    fn picks_the_earliest_weekday() {
        let s = Schedule::new([3, 6, 0], 600, 660);
        let now = at(2026, 10, 19, 12, 0); // Monday
        assert_eq!(next_occurrence(&s, now), Some(at(2026, 10, 21, 10, 0)));
    }

    #[test]
    fn overnight_end_is_next_day() {
        let s = friday_overnight();
        let now = at(2026, 10, 15, 12, 0); // Thursday
        assert_eq!(next_occurrence(&s, now), Some(at(2026, 10, 16, 22, 0)));
        assert_eq!(next_end_occurrence(&s, now), Some(at(2026, 10, 17, 7, 0)));
    }

    #[test]
    fn next_end_inside_window_refers_to_next_window() {
        let s = friday_overnight();
        let now = at(2026, 10, 17, 3, 0); // Saturday, inside the window
        assert_eq!(next_end_occurrence(&s, now), Some(at(2026, 10, 24, 7, 0)));
        assert_eq!(current_window_end(&s, now), Some(at(2026, 10, 17, 7, 0)));
    }

    #[test]
    fn current_window_end_before_midnight() {
        let s = friday_overnight();
        let now = at(2026, 10, 16, 23, 0);
        assert_eq!(current_window_end(&s, now), Some(at(2026, 10, 17, 7, 0)));
    }

    #[test]
    fn current_window_end_outside_window() {
        let s = Schedule::new([1], 540, 1080);
        assert_eq!(current_window_end(&s, at(2026, 10, 19, 18, 0)), None);
        assert_eq!(current_window_end(&s, at(2026, 10, 19, 10, 30)), Some(at(2026, 10, 19, 18, 0)));
    }

    #[test]
    fn disabled_schedule_yields_nothing() {
        let mut s = Schedule::new([1], 540, 1080);
        s.enabled = false;
        let now = at(2026, 10, 19, 8, 0);
        assert_eq!(next_occurrence(&s, now), None);
        assert!(!is_active_at(&s, at(2026, 10, 19, 10, 0)));
    }

    #[test]
    fn is_active_at_uses_wall_clock_fields() {
        let s = friday_overnight();
        assert!(is_active_at(&s, at(2026, 10, 17, 6, 59)));
        assert!(!is_active_at(&s, at(2026, 10, 17, 7, 0)));
    }

    fn base() -> NaiveDateTime {
        at(2024, 1, 1, 0, 0)
    }

    proptest! {
        #[test]
        fn next_occurrence_is_strictly_after_now(
            days in proptest::collection::btree_set(0i32..7, 1..=7),
            start in 0i32..1440,
            end in 0i32..1440,
            offset_secs in 0i64..(4 * 365 * 24 * 3600),
        ) {
            let now = base() + Duration::seconds(offset_secs);
            let s = Schedule::new(days, start, end);

            match next_occurrence(&s, now) {
                Some(next) => {
                    prop_assert!(next > now);
                    prop_assert!(next <= now + Duration::days(7));
                    let next_end = next_end_occurrence(&s, now).unwrap();
                    prop_assert!(next_end > now);
                }
                None => prop_assert_eq!(start, end),
            }
        }

        #[test]
        fn current_window_end_is_after_now(
            days in proptest::collection::btree_set(0i32..7, 1..=7),
            start in 0i32..1440,
            end in 0i32..1440,
            offset_secs in 0i64..(365 * 24 * 3600),
        ) {
            let now = base() + Duration::seconds(offset_secs);
            let s = Schedule::new(days, start, end);

            if let Some(window_end) = current_window_end(&s, now) {
                prop_assert!(is_active_at(&s, now));
                prop_assert!(window_end > now);
                prop_assert!(window_end <= now + Duration::days(1));
            } else {
                prop_assert!(!is_active_at(&s, now));
            }
        }
    }
}
