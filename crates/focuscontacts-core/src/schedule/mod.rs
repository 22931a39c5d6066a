//! Recurring weekly schedules.
//!
//! A [`Schedule`] is stored exactly as the user (or an older app version)
//! wrote it, malformed values included. Every computation goes through
//! [`Schedule::window`], which normalizes it into a [`WeeklyWindow`] or
//! reports that the schedule behaves as disabled.

mod calculator;
mod clock;

pub use calculator::{
    current_window_end, is_active_at, is_within_window, next_end_occurrence, next_occurrence,
};
pub use clock::{format_hhmm, parse_hhmm};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Current local wall-clock time.
pub fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Minutes in one day; valid clock values are `0..MINUTES_PER_DAY`.
pub const MINUTES_PER_DAY: i32 = 24 * 60;

/// Weekdays Monday..Friday, 0=Sunday.
pub const WORKWEEK: [i32; 5] = [1, 2, 3, 4, 5];

/// A recurring weekly time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Weekday indices, 0=Sunday..6=Saturday. Order is irrelevant.
    #[serde(default)]
    pub days_of_week: Vec<i32>,
    /// Minutes since midnight.
    #[serde(default = "default_start_minutes")]
    pub start_minutes: i32,
    /// Minutes since midnight. Earlier than `start_minutes` means the window
    /// runs overnight.
    #[serde(default = "default_end_minutes")]
    pub end_minutes: i32,
}

fn default_enabled() -> bool {
    true
}
fn default_start_minutes() -> i32 {
    9 * 60
}
fn default_end_minutes() -> i32 {
    18 * 60
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            enabled: true,
            days_of_week: WORKWEEK.to_vec(),
            start_minutes: default_start_minutes(),
            end_minutes: default_end_minutes(),
        }
    }
}

impl Schedule {
    pub fn new(days_of_week: impl IntoIterator<Item = i32>, start_minutes: i32, end_minutes: i32) -> Self {
        Self {
            enabled: true,
            days_of_week: days_of_week.into_iter().collect(),
            start_minutes,
            end_minutes,
        }
    }

    /// Normalized view of this schedule, or `None` if it never fires.
    ///
    /// Weekdays outside 0..=6 are dropped. The schedule behaves as disabled
    /// when it is switched off, has no valid weekday left, has a clock value
    /// outside the day, or has `start == end` (an empty window).
    pub fn window(&self) -> Option<WeeklyWindow> {
        if !self.enabled {
            return None;
        }
        let clock_range = 0..MINUTES_PER_DAY;
        if !clock_range.contains(&self.start_minutes) || !clock_range.contains(&self.end_minutes) {
            return None;
        }
        if self.start_minutes == self.end_minutes {
            return None;
        }

        let mut days = [false; 7];
        for &d in &self.days_of_week {
            if (0..7).contains(&d) {
                days[d as usize] = true;
            }
        }
        if !days.iter().any(|&d| d) {
            return None;
        }

        Some(WeeklyWindow {
            days,
            start_minutes: self.start_minutes as u32,
            end_minutes: self.end_minutes as u32,
        })
    }

    /// Whether the schedule will ever register timers.
    pub fn is_effective(&self) -> bool {
        self.window().is_some()
    }

    /// Human-readable summary, e.g. `Mon,Tue 22:00-07:00 (overnight)`.
    pub fn describe(&self) -> String {
        const LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
        let Some(window) = self.window() else {
            return "disabled".to_string();
        };
        let days: Vec<&str> = (0..7)
            .filter(|&d| window.days[d])
            .map(|d| LABELS[d])
            .collect();
        let mut out = format!(
            "{} {}-{}",
            days.join(","),
            format_hhmm(window.start_minutes),
            format_hhmm(window.end_minutes)
        );
        if window.is_overnight() {
            out.push_str(" (overnight)");
        }
        out
    }
}

/// A validated schedule: at least one weekday, in-range clock values,
/// `start != end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyWindow {
    days: [bool; 7],
    start_minutes: u32,
    end_minutes: u32,
}

impl WeeklyWindow {
    pub fn has_day(&self, weekday: u32) -> bool {
        self.days.get(weekday as usize).copied().unwrap_or(false)
    }

    pub fn days(&self) -> impl Iterator<Item = u32> + '_ {
        (0..7u32).filter(move |&d| self.has_day(d))
    }

    pub fn start_minutes(&self) -> u32 {
        self.start_minutes
    }

    pub fn end_minutes(&self) -> u32 {
        self.end_minutes
    }

    pub fn is_overnight(&self) -> bool {
        self.end_minutes < self.start_minutes
    }

    /// Window membership for a weekday (0=Sunday) and minutes since midnight.
    pub fn contains(&self, weekday: u32, minutes_now: u32) -> bool {
        let (start, end) = (self.start_minutes, self.end_minutes);
        if !self.is_overnight() {
            return self.has_day(weekday) && start <= minutes_now && minutes_now < end;
        }

        let previous = (weekday + 6) % 7;
        (self.has_day(weekday) && minutes_now >= start)
            || (self.has_day(previous) && minutes_now < end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_days_are_dropped() {
        let s = Schedule::new([-1, 3, 9, 3], 60, 120);
        let w = s.window().unwrap();
        assert_eq!(w.days().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn only_malformed_days_behaves_as_disabled() {
        let s = Schedule::new([7, 8, -2], 60, 120);
        assert!(s.window().is_none());
        assert!(!s.is_effective());
    }

    #[test]
    fn disabled_schedule_has_no_window() {
        let mut s = Schedule::default();
        s.enabled = false;
        assert!(s.window().is_none());
    }

    #[test]
    fn out_of_range_clock_behaves_as_disabled() {
        assert!(Schedule::new([1], 1440, 60).window().is_none());
        assert!(Schedule::new([1], 60, -5).window().is_none());
    }

    #[test]
    fn equal_start_and_end_is_an_empty_window() {
        let s = Schedule::new([0, 1, 2, 3, 4, 5, 6], 600, 600);
        assert!(s.window().is_none());
    }

    #[test]
    fn default_is_workweek_nine_to_six() {
        let s = Schedule::default();
        assert_eq!(s.describe(), "Mon,Tue,Wed,Thu,Fri 09:00-18:00");
    }

    #[test]
    fn describe_marks_overnight() {
        let s = Schedule::new([5], 1320, 420);
        assert_eq!(s.describe(), "Fri 22:00-07:00 (overnight)");
    }

    #[test]
    fn deserializes_with_defaults() {
        let s: Schedule = serde_json::from_str(r#"{"daysOfWeek":[1]}"#).unwrap();
        assert!(s.enabled);
        assert_eq!(s.start_minutes, 540);
        assert_eq!(s.end_minutes, 1080);
        assert!(s.is_effective());
    }

    #[test]
    fn missing_fields_match_default() {
        let s: Schedule = serde_json::from_str(r#"{"daysOfWeek":[1,2,3,4,5]}"#).unwrap();
        assert_eq!(s, Schedule::default());
        let off: Schedule = serde_json::from_str(r#"{"enabled":false}"#).unwrap();
        assert!(!off.enabled);
    }
}
