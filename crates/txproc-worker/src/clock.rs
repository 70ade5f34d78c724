//! Per-iteration wall-clock snapshot and calendar rollover tracking.
//!
//! The dispatcher refreshes one [`LogContext`] at the top of every loop
//! iteration and hands it to hooks through the worker context, so every log
//! line and trace stamp written during that iteration agrees on the time.

use std::process;

use time::OffsetDateTime;

/// Wall-clock snapshot shared by everything running in one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    now: OffsetDateTime,
    pid: u32,
    stamp: String,
}

impl LogContext {
    /// Captures the current local time.
    #[must_use]
    pub fn new() -> Self {
        Self::at(local_now())
    }

    /// Captures an explicit instant.
    #[must_use]
    pub fn at(now: OffsetDateTime) -> Self {
        let pid = process::id();
        Self {
            now,
            pid,
            stamp: format_stamp(now, pid),
        }
    }

    /// Re-reads the clock.
    pub fn refresh(&mut self) {
        self.refresh_at(local_now());
    }

    /// Moves the snapshot to an explicit instant.
    pub fn refresh_at(&mut self, now: OffsetDateTime) {
        self.now = now;
        self.stamp = format_stamp(now, self.pid);
    }

    /// Broken-down time of the snapshot.
    #[must_use]
    pub const fn now(&self) -> OffsetDateTime {
        self.now
    }

    /// Seconds since the Unix epoch.
    #[must_use]
    pub const fn epoch_seconds(&self) -> i64 {
        self.now.unix_timestamp()
    }

    /// Process id baked into the stamp.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Formatted stamp, `[DDMMYYYY HH:MM:SS PPPPPP]`.
    #[must_use]
    pub fn stamp(&self) -> &str {
        &self.stamp
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new()
    }
}

// The local offset is unavailable on some platforms once threads exist.
fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn format_stamp(now: OffsetDateTime, pid: u32) -> String {
    format!(
        "[{:02}{:02}{:04} {:02}:{:02}:{:02} {:06}]",
        now.day(),
        u8::from(now.month()),
        now.year(),
        now.hour(),
        now.minute(),
        now.second(),
        pid
    )
}

/// Calendar boundaries crossed since the flags were last cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rollovers {
    /// The minute changed.
    pub minute: bool,
    /// The hour changed.
    pub hour: bool,
    /// The day of the month changed.
    pub day: bool,
    /// The month changed.
    pub month: bool,
}

impl Rollovers {
    /// Returns `true` when any flag is set.
    #[must_use]
    pub const fn any(self) -> bool {
        self.minute || self.hour || self.day || self.month
    }

    /// Sets every flag that is set in `other`.
    pub(crate) const fn merge(&mut self, other: Self) {
        self.minute |= other.minute;
        self.hour |= other.hour;
        self.day |= other.day;
        self.month |= other.month;
    }
}

/// Remembers the last observed minute, hour, day and month.
///
/// All four start at zero, so the first observation reports every non-zero
/// field as changed. With `skip_zero` set, a change *to* zero is recorded
/// but not reported. Only minute and hour can be zero, so midnight and the
/// top of each hour are the cases it suppresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloverTracker {
    minute: u8,
    hour: u8,
    day: u8,
    month: u8,
    skip_zero: bool,
}

impl RolloverTracker {
    /// Creates a tracker with no observations.
    #[must_use]
    pub const fn new(skip_zero: bool) -> Self {
        Self {
            minute: 0,
            hour: 0,
            day: 0,
            month: 0,
            skip_zero,
        }
    }

    /// Records `now` and reports which fields changed.
    pub fn observe(&mut self, now: OffsetDateTime) -> Rollovers {
        let skip_zero = self.skip_zero;
        Rollovers {
            minute: advance(&mut self.minute, now.minute(), skip_zero),
            hour: advance(&mut self.hour, now.hour(), skip_zero),
            day: advance(&mut self.day, now.day(), skip_zero),
            month: advance(&mut self.month, u8::from(now.month()), skip_zero),
        }
    }
}

fn advance(current: &mut u8, observed: u8, skip_zero: bool) -> bool {
    if *current == observed {
        return false;
    }
    *current = observed;
    !(skip_zero && observed == 0)
}
