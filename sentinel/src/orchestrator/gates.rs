//! Pure effective-state gates. Grounded on
//! `original_source/app/main.py::RuntimeState.current_schedule_context` /
//! `monitoring_enabled_now` / `sponsorblock_enabled_now` /
//! `_is_remote_release_active`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sentinel_common::db::models::ScheduleRow;
use sentinel_common::schedule::{self, Mode, Window};

#[derive(Debug, Clone)]
pub struct ScheduleContext {
    pub active: bool,
    pub mode: Mode,
    pub timezone: String,
    pub schedule_id: Option<i64>,
    pub schedule_name: String,
    pub schedules_count: i64,
}

fn to_window(row: &ScheduleRow) -> Window {
    Window {
        id: row.id,
        name: row.name.clone(),
        enabled: row.enabled,
        start: row.start.clone(),
        end: row.end.clone(),
        timezone: row.timezone.clone(),
        mode: row.mode.parse().unwrap_or_default(),
    }
}

/// When `schedules` is non-empty, uses the first active row (or the
/// "no window is active" default if none is). When it's empty, falls back
/// to the legacy single-window settings keys (DESIGN.md Open Question #2).
pub fn current_schedule_context(settings: &HashMap<String, String>, schedules: &[ScheduleRow]) -> ScheduleContext {
    if !schedules.is_empty() {
        let windows: Vec<Window> = schedules.iter().map(to_window).collect();
        return match schedule::pick_active(&windows) {
            Some(active) => ScheduleContext {
                active: true,
                mode: active.mode,
                timezone: active.timezone.clone(),
                schedule_id: Some(active.id),
                schedule_name: active.name.clone(),
                schedules_count: schedules.len() as i64,
            },
            None => ScheduleContext {
                active: false,
                mode: Mode::Blocklist,
                timezone: settings.get("timezone").cloned().unwrap_or_else(|| "UTC".to_string()),
                schedule_id: None,
                schedule_name: String::new(),
                schedules_count: schedules.len() as i64,
            },
        };
    }

    let enabled = settings.get("schedule_enabled").map(|v| v == "true").unwrap_or(true);
    let start = settings.get("schedule_start").cloned().unwrap_or_else(|| "07:00".to_string());
    let end = settings.get("schedule_end").cloned().unwrap_or_else(|| "19:00".to_string());
    let timezone = settings.get("timezone").cloned().unwrap_or_else(|| "UTC".to_string());
    let active = schedule::is_active(enabled, &start, &end, &timezone);
    let mode = settings.get("schedule_mode").and_then(|v| v.parse().ok()).unwrap_or_default();
    ScheduleContext {
        active,
        mode,
        timezone,
        schedule_id: None,
        schedule_name: "Legacy".to_string(),
        schedules_count: 0,
    }
}

pub fn monitoring_enabled_now(settings: &HashMap<String, String>, schedules: &[ScheduleRow]) -> bool {
    let active = settings.get("active").map(|v| v == "true").unwrap_or(true);
    active && current_schedule_context(settings, schedules).active
}

pub fn sponsorblock_enabled_now(settings: &HashMap<String, String>) -> bool {
    let configured = settings.get("sponsorblock_active").map(|v| v == "true").unwrap_or(false);
    if !configured {
        return false;
    }
    let enabled = settings.get("sponsorblock_schedule_enabled").map(|v| v == "true").unwrap_or(false);
    let start = settings.get("sponsorblock_schedule_start").cloned().unwrap_or_else(|| "00:00".to_string());
    let end = settings.get("sponsorblock_schedule_end").cloned().unwrap_or_else(|| "23:59".to_string());
    let timezone = settings
        .get("sponsorblock_timezone")
        .or_else(|| settings.get("timezone"))
        .cloned()
        .unwrap_or_else(|| "UTC".to_string());
    schedule::is_active(enabled, &start, &end, &timezone)
}

/// A future `sponsorblock_release_until` timestamp suppresses both
/// sponsor-skip and block intervention (DESIGN.md Open Question #1).
pub fn remote_release_active(raw: &str) -> bool {
    let raw = raw.trim();
    if raw.is_empty() {
        return false;
    }
    let Ok(until) = DateTime::parse_from_rfc3339(raw) else {
        return false;
    };
    until.with_timezone(&Utc) > Utc::now()
}

pub fn remote_release_minutes_remaining(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    let Ok(until) = DateTime::parse_from_rfc3339(raw) else {
        return 0;
    };
    let remaining = until.with_timezone(&Utc).signed_duration_since(Utc::now()).num_seconds();
    if remaining <= 0 {
        0
    } else {
        (remaining / 60).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, enabled: bool, start: &str, end: &str, mode: &str) -> ScheduleRow {
        ScheduleRow {
            id,
            name: "w".to_string(),
            enabled,
            start: start.to_string(),
            end: end.to_string(),
            timezone: "UTC".to_string(),
            mode: mode.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_schedules_falls_back_to_legacy_keys() {
        let mut settings = HashMap::new();
        settings.insert("schedule_enabled".to_string(), "false".to_string());
        let ctx = current_schedule_context(&settings, &[]);
        assert!(ctx.active);
        assert_eq!(ctx.schedule_name, "Legacy");
    }

    #[test]
    fn non_empty_schedules_use_pick_active() {
        let schedules = vec![row(1, true, "00:00", "00:00", "whitelist")];
        let ctx = current_schedule_context(&HashMap::new(), &schedules);
        assert!(ctx.active);
        assert_eq!(ctx.mode, Mode::Whitelist);
        assert_eq!(ctx.schedules_count, 1);
    }

    #[test]
    fn remote_release_active_requires_future_timestamp() {
        assert!(!remote_release_active(""));
        assert!(!remote_release_active("not-a-date"));
        let future = (Utc::now() + chrono::Duration::minutes(5)).to_rfc3339();
        assert!(remote_release_active(&future));
        let past = (Utc::now() - chrono::Duration::minutes(5)).to_rfc3339();
        assert!(!remote_release_active(&past));
    }

    #[test]
    fn sponsorblock_enabled_now_requires_configured_flag() {
        let mut settings = HashMap::new();
        settings.insert("sponsorblock_active".to_string(), "false".to_string());
        assert!(!sponsorblock_enabled_now(&settings));
    }
}
