//! Quiet-hours windows.
//!
//! While a window is active no new jobs are admitted, regardless of
//! free capacity; already-running jobs are never interrupted. Windows
//! are per weekday and wrap overnight when the start hour is after the
//! end hour (22..6 covers 22:00 through 05:59 into the next window's
//! day).

use chrono::{Datelike, Local, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// One window of hours, `[start, end)` on a 24h clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start: u32,
    pub end: u32,
}

/// Per-weekday quiet windows. Index 0 is Monday.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuietHours {
    windows: [Option<HourWindow>; 7],
}

impl QuietHours {
    /// No quiet hours anywhere.
    pub fn none() -> Self {
        Self::default()
    }

    /// The same window every day of the week.
    pub fn every_day(start: u32, end: u32) -> Self {
        let mut q = Self::default();
        for day in [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ] {
            q.set(day, start, end);
        }
        q
    }

    /// Enable a window on one weekday. A start equal to the end
    /// disables the window.
    pub fn set(&mut self, day: Weekday, start: u32, end: u32) {
        let idx = day.num_days_from_monday() as usize;
        self.windows[idx] = if start == end {
            None
        } else {
            Some(HourWindow { start, end })
        };
    }

    /// Whether `hour` on `day` falls inside a quiet window.
    pub fn is_quiet_at(&self, day: Weekday, hour: u32) -> bool {
        let idx = day.num_days_from_monday() as usize;
        match self.windows[idx] {
            None => false,
            Some(HourWindow { start, end }) => {
                if start < end {
                    start <= hour && hour < end
                } else {
                    // Overnight wraparound, e.g. 22..6.
                    hour >= start || hour < end
                }
            }
        }
    }

    /// Whether the local clock is currently inside a quiet window.
    pub fn is_quiet_now(&self) -> bool {
        let now = Local::now();
        self.is_quiet_at(now.weekday(), now.hour())
    }

    /// Whether any window is configured at all.
    pub fn is_empty(&self) -> bool {
        self.windows.iter().all(Option::is_none)
    }
}
