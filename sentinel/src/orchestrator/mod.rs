//! Runtime orchestration: the 5-second supervisor tick that starts/stops
//! device workers as the effective schedule state changes and drives the
//! MQTT bridge. Grounded on
//! `original_source/app/main.py::RuntimeState.supervisor` /
//! `sync_workers` / `tick_mqtt` / `process_mqtt_commands`.

pub mod fallback;
pub mod gates;
pub mod processor;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sentinel_common::db::queries::{decisions, devices, schedules, settings};
use sentinel_common::events::{EventBus, SentinelEvent};
use sqlx::SqlitePool;
use tokio::sync::{watch, Mutex};
use tracing::warn;

pub use processor::EventProcessor;

use crate::device::DeviceRegistry;
use crate::mqtt::{MqttBridge, StatusSnapshot};

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Owns the device registry and MQTT bridge's lifecycle: starts/pauses
/// workers as `monitoring_enabled_now`/`sponsorblock_enabled_now` change,
/// and republishes MQTT state on its own interval independent of events.
pub struct Supervisor {
    pool: SqlitePool,
    devices: Arc<DeviceRegistry>,
    processor: Arc<EventProcessor>,
    mqtt: Arc<MqttBridge>,
    events: EventBus,
    build_version: String,
    workers_enabled: Mutex<bool>,
    mqtt_publish_due_at: Mutex<Instant>,
}

impl Supervisor {
    pub fn new(
        pool: SqlitePool,
        devices: Arc<DeviceRegistry>,
        processor: Arc<EventProcessor>,
        mqtt: Arc<MqttBridge>,
        events: EventBus,
        build_version: String,
    ) -> Self {
        Self {
            pool,
            devices,
            processor,
            mqtt,
            events,
            build_version,
            workers_enabled: Mutex::new(false),
            mqtt_publish_due_at: Mutex::new(Instant::now()),
        }
    }

    /// Runs the 5-second tick until `shutdown` is signalled.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        let settings_map = match settings::all(&self.pool).await {
            Ok(map) => map,
            Err(err) => {
                warn!(error = %err, "supervisor tick: failed to load settings");
                return;
            }
        };
        self.sync_workers(&settings_map).await;
        self.tick_mqtt(settings_map).await;
    }

    /// Starts or pauses every device worker as a unit when the combined
    /// "should anything be watching video at all" state flips, mirroring
    /// `workers_should_run` / `sync_workers`.
    async fn sync_workers(&self, settings_map: &std::collections::HashMap<String, String>) {
        let schedule_rows = schedules::list(&self.pool).await.unwrap_or_default();
        let should_run = gates::monitoring_enabled_now(settings_map, &schedule_rows)
            || gates::sponsorblock_enabled_now(settings_map);

        let mut enabled = self.workers_enabled.lock().await;
        if should_run && !*enabled {
            if let Err(err) = self.devices.start_for_existing_devices().await {
                warn!(error = %err, "failed to start device workers");
                return;
            }
            *enabled = true;
            self.events.emit_lossy(SentinelEvent::MonitoringState { timestamp: Utc::now(), active: true });
        } else if !should_run && *enabled {
            self.devices.pause_all().await;
            self.processor.cancel_reinforce_tasks().await;
            self.processor.clear_retry_state().await;
            *enabled = false;
            self.events.emit_lossy(SentinelEvent::MonitoringState { timestamp: Utc::now(), active: false });
        }
    }

    /// Applies settings to the MQTT bridge, drains and applies any inbound
    /// commands, and republishes the status snapshot on its own interval
    /// (or immediately after a command changed something).
    async fn tick_mqtt(&self, mut settings_map: std::collections::HashMap<String, String>) {
        self.mqtt.apply_settings(&settings_map).await;
        let changed = self.process_mqtt_commands(&mut settings_map).await;

        let info = self.mqtt.info().await;
        if !info.enabled {
            return;
        }

        let now = Instant::now();
        let mut due_at = self.mqtt_publish_due_at.lock().await;
        if !changed && now < *due_at {
            return;
        }

        self.mqtt.publish_discovery(&self.build_version, changed).await;
        let snapshot = self.build_snapshot(&settings_map).await;
        self.mqtt.publish_snapshot(&snapshot).await;
        *due_at = now + Duration::from_secs(self.mqtt.publish_interval_seconds().await.max(5) as u64);
    }

    /// Applies any MQTT command topic payloads (`active`,
    /// `sponsorblock_active`, `remote_release_minutes`) to settings,
    /// mirroring `process_mqtt_commands`. Returns whether anything changed.
    async fn process_mqtt_commands(&self, settings_map: &mut std::collections::HashMap<String, String>) -> bool {
        let commands = self.mqtt.drain_commands().await;
        if commands.is_empty() {
            return false;
        }

        let mut changed = false;
        for (command, payload) in commands {
            match command.as_str() {
                "active" | "sponsorblock_active" => {
                    let Some(parsed) = parse_mqtt_bool(&payload) else { continue };
                    let key = command.as_str();
                    if settings::set_bool_confirmed(&self.pool, key, parsed).await.is_err() {
                        continue;
                    }
                    settings_map.insert(key.to_string(), if parsed { "true".to_string() } else { "false".to_string() });
                    if key == "active" && !parsed {
                        self.processor.cancel_reinforce_tasks().await;
                        self.processor.clear_retry_state().await;
                    }
                    let _ = settings::set(&self.pool, "last_error", "").await;
                    self.events.emit_lossy(SentinelEvent::MqttStateChange { timestamp: Utc::now(), enabled: parsed });
                    changed = true;
                }
                "remote_release_minutes" => {
                    let Ok(minutes) = payload.trim().parse::<i64>() else { continue };
                    let safe_minutes = minutes.clamp(0, 240);
                    let until = if safe_minutes > 0 {
                        (Utc::now() + chrono::Duration::minutes(safe_minutes)).to_rfc3339()
                    } else {
                        String::new()
                    };
                    if settings::set(&self.pool, "sponsorblock_release_until", &until).await.is_err() {
                        continue;
                    }
                    settings_map.insert("sponsorblock_release_until".to_string(), until.clone());
                    self.events.emit_lossy(SentinelEvent::RemoteReleaseChange {
                        timestamp: Utc::now(),
                        active: gates::remote_release_active(&until),
                        until: chrono::DateTime::parse_from_rfc3339(&until).ok().map(|d| d.with_timezone(&Utc)),
                    });
                    changed = true;
                }
                _ => {}
            }
        }
        changed
    }

    async fn build_snapshot(&self, settings_map: &std::collections::HashMap<String, String>) -> StatusSnapshot {
        build_status_snapshot(&self.pool, settings_map, &self.build_version).await
    }
}

/// Builds the published-state snapshot from current settings and storage.
/// Shared by the MQTT tick (above) and the `/status` API handler so both
/// surfaces report identical numbers.
pub async fn build_status_snapshot(
    pool: &SqlitePool,
    settings_map: &std::collections::HashMap<String, String>,
    build_version: &str,
) -> StatusSnapshot {
    let schedule_rows = schedules::list(pool).await.unwrap_or_default();
    let schedule_ctx = gates::current_schedule_context(settings_map, &schedule_rows);
    let release_raw = settings_map.get("sponsorblock_release_until").map(String::as_str).unwrap_or("");
    let (devices_total, devices_connected) = devices::counts(pool).await.unwrap_or((0, 0));

    let today_start = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
    let week_start = Utc::now() - chrono::Duration::days(7);
    let (reviewed_today, allowed_today, blocked_today) =
        decisions::counts_since(pool, today_start).await.unwrap_or((0, 0, 0));
    let (reviewed_7d, allowed_7d, blocked_7d) =
        decisions::counts_since(pool, week_start).await.unwrap_or((0, 0, 0));
    let (_, allowed_total, blocked_total) = decisions::counts_total(pool).await.unwrap_or((0, 0, 0));
    let db_size_bytes = decisions::count_bytes(pool).await.unwrap_or(0);

    StatusSnapshot {
        active: settings_map.get("active").map(|v| v == "true").unwrap_or(true),
        sponsorblock_active: settings_map.get("sponsorblock_active").map(|v| v == "true").unwrap_or(false),
        monitoring_effective: gates::monitoring_enabled_now(settings_map, &schedule_rows),
        sponsorblock_effective: gates::sponsorblock_enabled_now(settings_map),
        judge_ok: settings_map.get("judge_ok").map(|v| v == "true").unwrap_or(true),
        schedule_active_now: schedule_ctx.active,
        schedule_mode_now: schedule_ctx.mode.as_str().to_string(),
        schedules_count: schedule_ctx.schedules_count,
        timezone: schedule_ctx.timezone,
        build_version: build_version.to_string(),
        remote_release_active: gates::remote_release_active(release_raw),
        devices_connected,
        devices_total,
        blocked_today,
        blocked_7d,
        allowed_today,
        allowed_7d,
        reviewed_today,
        reviewed_7d,
        blocked_total,
        allowed_total,
        db_size_bytes,
        remote_release_minutes: gates::remote_release_minutes_remaining(release_raw),
        last_error: settings_map.get("last_error").cloned().unwrap_or_default(),
    }
}

fn parse_mqtt_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Some(true),
        "0" | "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mqtt_bool_recognizes_common_spellings() {
        assert_eq!(parse_mqtt_bool("ON"), Some(true));
        assert_eq!(parse_mqtt_bool("0"), Some(false));
        assert_eq!(parse_mqtt_bool("maybe"), None);
    }
}
