//! Home Assistant MQTT bridge. Grounded on
//! `original_source/app/services/mqtt_bridge.py::MQTTBridge`, ported from
//! paho-mqtt's threaded client onto `rumqttc`'s async client/event loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

fn bool_from_setting(raw: Option<&String>, default: bool) -> bool {
    match raw {
        None => default,
        Some(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
    }
}

fn safe_int(raw: Option<&String>, default: i64, minimum: i64, maximum: i64) -> i64 {
    let value = raw.and_then(|v| v.trim().parse::<i64>().ok()).unwrap_or(default);
    value.clamp(minimum, maximum)
}

fn topic_slug(raw: Option<&String>, default: &str) -> String {
    let raw = raw.map(|s| s.as_str()).unwrap_or("");
    let filtered: String = raw.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '/' || *c == '-').collect();
    let trimmed = filtered.trim_matches('/');
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

fn switch_payload(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

#[derive(Debug, Clone, PartialEq)]
struct MqttConfig {
    enabled: bool,
    host: String,
    port: u16,
    username: String,
    password: String,
    base_topic: String,
    discovery_prefix: String,
    retain: bool,
    tls: bool,
    publish_interval_seconds: i64,
    client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            base_topic: "sentinel".to_string(),
            discovery_prefix: "homeassistant".to_string(),
            retain: true,
            tls: false,
            publish_interval_seconds: 30,
            client_id: "sentinel".to_string(),
        }
    }
}

impl MqttConfig {
    fn from_settings(settings: &HashMap<String, String>) -> Self {
        Self {
            enabled: bool_from_setting(settings.get("mqtt_enabled"), false),
            host: settings.get("mqtt_host").cloned().unwrap_or_default().trim().to_string(),
            port: safe_int(settings.get("mqtt_port"), 1883, 1, 65535) as u16,
            username: settings.get("mqtt_username").cloned().unwrap_or_default().trim().to_string(),
            password: settings.get("mqtt_password").cloned().unwrap_or_default(),
            base_topic: topic_slug(settings.get("mqtt_base_topic"), "sentinel"),
            discovery_prefix: topic_slug(settings.get("mqtt_discovery_prefix"), "homeassistant"),
            retain: bool_from_setting(settings.get("mqtt_retain"), true),
            tls: bool_from_setting(settings.get("mqtt_tls"), false),
            publish_interval_seconds: safe_int(settings.get("mqtt_publish_interval_seconds"), 30, 5, 3600),
            client_id: topic_slug(settings.get("mqtt_client_id"), "sentinel-yt"),
        }
    }
}

/// Snapshot of runtime state published to Home Assistant state topics.
/// Field names match the MQTT state-topic suffixes they publish under.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub active: bool,
    pub sponsorblock_active: bool,
    pub monitoring_effective: bool,
    pub sponsorblock_effective: bool,
    pub judge_ok: bool,
    pub schedule_active_now: bool,
    pub schedule_mode_now: String,
    pub schedules_count: i64,
    pub timezone: String,
    pub build_version: String,
    pub remote_release_active: bool,
    pub devices_connected: i64,
    pub devices_total: i64,
    pub blocked_today: i64,
    pub blocked_7d: i64,
    pub allowed_today: i64,
    pub allowed_7d: i64,
    pub reviewed_today: i64,
    pub reviewed_7d: i64,
    pub blocked_total: i64,
    pub allowed_total: i64,
    pub db_size_bytes: i64,
    pub remote_release_minutes: i64,
    pub last_error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MqttInfo {
    pub enabled: bool,
    pub connected: bool,
    pub host: String,
    pub port: u16,
    pub base_topic: String,
    pub discovery_prefix: String,
    pub retain: bool,
    pub tls: bool,
    pub publish_interval_seconds: i64,
    pub command_topics: HashMap<String, String>,
    pub last_error: String,
}

struct State {
    config: MqttConfig,
    config_signature: String,
    discovery_signature: String,
    client: Option<AsyncClient>,
    poll_task: Option<JoinHandle<()>>,
}

/// Bridges Sentinel's runtime state onto an MQTT broker for Home Assistant
/// discovery, mirroring `MQTTBridge`'s command topics (`active`,
/// `sponsorblock_active`, `remote_release_minutes`) and state topics.
pub struct MqttBridge {
    state: Mutex<State>,
    connected: Arc<AtomicBool>,
    last_error: Mutex<String>,
    command_tx: mpsc::Sender<(String, String)>,
    command_rx: Mutex<mpsc::Receiver<(String, String)>>,
}

impl MqttBridge {
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::channel(256);
        Self {
            state: Mutex::new(State {
                config: MqttConfig::default(),
                config_signature: String::new(),
                discovery_signature: String::new(),
                client: None,
                poll_task: None,
            }),
            connected: Arc::new(AtomicBool::new(false)),
            last_error: Mutex::new(String::new()),
            command_tx,
            command_rx: Mutex::new(command_rx),
        }
    }

    pub async fn last_error(&self) -> String {
        self.last_error.lock().await.clone()
    }

    pub async fn publish_interval_seconds(&self) -> i64 {
        self.state.lock().await.config.publish_interval_seconds.max(5)
    }

    pub async fn command_topics(&self) -> HashMap<String, String> {
        let base = self.state.lock().await.config.base_topic.clone();
        command_topics_for(&base)
    }

    pub async fn info(&self) -> MqttInfo {
        let state = self.state.lock().await;
        MqttInfo {
            enabled: state.config.enabled,
            connected: self.connected.load(Ordering::Relaxed),
            host: state.config.host.clone(),
            port: state.config.port,
            base_topic: state.config.base_topic.clone(),
            discovery_prefix: state.config.discovery_prefix.clone(),
            retain: state.config.retain,
            tls: state.config.tls,
            publish_interval_seconds: state.config.publish_interval_seconds,
            command_topics: command_topics_for(&state.config.base_topic),
            last_error: self.last_error.lock().await.clone(),
        }
    }

    /// Rebuilds the broker connection when `settings` describes a changed
    /// configuration. A no-op when nothing relevant changed and a client is
    /// already connected.
    pub async fn apply_settings(&self, settings: &HashMap<String, String>) {
        let cfg = MqttConfig::from_settings(settings);
        let signature = format!("{cfg:?}");

        if !cfg.enabled {
            *self.last_error.lock().await = String::new();
            self.disconnect().await;
            let mut state = self.state.lock().await;
            state.config = cfg;
            state.config_signature = signature;
            state.discovery_signature = String::new();
            return;
        }

        if cfg.host.is_empty() {
            *self.last_error.lock().await = "MQTT is enabled but broker host is empty.".to_string();
            self.disconnect().await;
            let mut state = self.state.lock().await;
            state.config = cfg;
            state.config_signature = signature;
            state.discovery_signature = String::new();
            return;
        }

        {
            let state = self.state.lock().await;
            if signature == state.config_signature && state.client.is_some() {
                return;
            }
        }

        self.disconnect().await;
        {
            let mut state = self.state.lock().await;
            state.config = cfg.clone();
            state.config_signature = signature;
            state.discovery_signature = String::new();
        }
        self.connect(&cfg).await;
    }

    async fn connect(&self, cfg: &MqttConfig) {
        let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        options.set_keep_alive(Duration::from_secs(45));
        options.set_clean_session(true);
        if !cfg.username.is_empty() {
            options.set_credentials(cfg.username.clone(), cfg.password.clone());
        }
        if cfg.tls {
            options.set_transport(Transport::Tls(Default::default()));
        }

        let (client, event_loop) = AsyncClient::new(options, 64);
        let command_topics = command_topics_for(&cfg.base_topic);
        for topic in command_topics.values() {
            if let Err(err) = client.subscribe(topic, QoS::AtLeastOnce).await {
                warn!(?err, topic, "failed to subscribe to MQTT command topic");
            }
        }

        let connected = self.connected.clone();
        let command_tx = self.command_tx.clone();
        let poll_task = tokio::spawn(poll_event_loop(event_loop, connected, command_tx, command_topics));

        let mut state = self.state.lock().await;
        state.client = Some(client);
        state.poll_task = Some(poll_task);
    }

    async fn disconnect(&self) {
        let (client, task) = {
            let mut state = self.state.lock().await;
            (state.client.take(), state.poll_task.take())
        };
        self.connected.store(false, Ordering::Relaxed);
        if let Some(client) = client {
            let _ = client.disconnect().await;
        }
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Drains queued inbound commands (`active`, `sponsorblock_active`,
    /// `remote_release_minutes`) accumulated since the last call.
    pub async fn drain_commands(&self) -> Vec<(String, String)> {
        let mut rx = self.command_rx.lock().await;
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    async fn publish(&self, topic: &str, payload: &str, retain: Option<bool>) -> bool {
        let (client, retain_flag) = {
            let state = self.state.lock().await;
            (state.client.clone(), retain.unwrap_or(state.config.retain))
        };
        let Some(client) = client else { return false };
        match client.publish(topic, QoS::AtLeastOnce, retain_flag, payload.as_bytes()).await {
            Ok(()) => true,
            Err(err) => {
                *self.last_error.lock().await = format!("MQTT publish failed for topic {topic}: {err}");
                false
            }
        }
    }

    fn discovery_topic(&self, discovery_prefix: &str, node: &str, component: &str, object_id: &str) -> String {
        format!("{discovery_prefix}/{component}/{node}/{object_id}/config")
    }

    fn state_topic(&self, base_topic: &str, key: &str) -> String {
        format!("{base_topic}/state/{key}")
    }

    /// Publishes Home Assistant MQTT discovery payloads for the two
    /// control switches, effective-state binary sensors, and measurement
    /// sensors. Skips re-publishing when nothing relevant changed unless
    /// `force` is set.
    pub async fn publish_discovery(&self, build_version: &str, force: bool) {
        let (enabled, host, client_present, base_topic, discovery_prefix, retain, client_id) = {
            let state = self.state.lock().await;
            (
                state.config.enabled,
                state.config.host.clone(),
                state.client.is_some(),
                state.config.base_topic.clone(),
                state.config.discovery_prefix.clone(),
                state.config.retain,
                state.config.client_id.clone(),
            )
        };
        if !enabled || host.is_empty() || !client_present {
            return;
        }

        let signature = format!("{base_topic}|{discovery_prefix}|{retain}|{build_version}");
        {
            let state = self.state.lock().await;
            if !force && signature == state.discovery_signature {
                return;
            }
        }

        let node = topic_slug(Some(&client_id), "sentinel-yt");
        let availability_topic = self.state_topic(&base_topic, "availability");
        let device = serde_json::json!({
            "identifiers": [format!("{node}_device")],
            "name": "Sentinel YouTube Guardian",
            "manufacturer": "Sentinel",
            "model": "sentinel-yt",
            "sw_version": build_version,
        });

        let entities: Vec<(&str, &str, serde_json::Value)> = vec![
            ("switch", "sentinel_active", serde_json::json!({
                "name": "Sentinel Active",
                "unique_id": format!("{node}_sentinel_active"),
                "state_topic": self.state_topic(&base_topic, "active"),
                "command_topic": format!("{base_topic}/command/active/set"),
                "payload_on": "ON", "payload_off": "OFF", "state_on": "ON", "state_off": "OFF",
                "icon": "mdi:shield-check",
            })),
            ("switch", "sponsorblock_active", serde_json::json!({
                "name": "SponsorBlock Active",
                "unique_id": format!("{node}_sponsorblock_active"),
                "state_topic": self.state_topic(&base_topic, "sponsorblock_active"),
                "command_topic": format!("{base_topic}/command/sponsorblock_active/set"),
                "payload_on": "ON", "payload_off": "OFF", "state_on": "ON", "state_off": "OFF",
                "icon": "mdi:skip-next-circle",
            })),
            ("binary_sensor", "monitoring_effective", serde_json::json!({
                "name": "Sentinel Monitoring Effective",
                "unique_id": format!("{node}_monitoring_effective"),
                "state_topic": self.state_topic(&base_topic, "monitoring_effective"),
                "payload_on": "ON", "payload_off": "OFF",
                "icon": "mdi:shield-search",
            })),
            ("binary_sensor", "sponsorblock_effective", serde_json::json!({
                "name": "SponsorBlock Effective",
                "unique_id": format!("{node}_sponsorblock_effective"),
                "state_topic": self.state_topic(&base_topic, "sponsorblock_effective"),
                "payload_on": "ON", "payload_off": "OFF",
                "icon": "mdi:skip-forward-outline",
            })),
            ("binary_sensor", "judge_ok", serde_json::json!({
                "name": "Sentinel Judge OK",
                "unique_id": format!("{node}_judge_ok"),
                "state_topic": self.state_topic(&base_topic, "judge_ok"),
                "payload_on": "ON", "payload_off": "OFF",
                "icon": "mdi:robot",
            })),
            ("binary_sensor", "schedule_active_now", serde_json::json!({
                "name": "Sentinel Schedule Active",
                "unique_id": format!("{node}_schedule_active_now"),
                "state_topic": self.state_topic(&base_topic, "schedule_active_now"),
                "payload_on": "ON", "payload_off": "OFF",
                "icon": "mdi:calendar-clock",
            })),
            ("binary_sensor", "remote_release_active", serde_json::json!({
                "name": "Sentinel Remote Release Active",
                "unique_id": format!("{node}_remote_release_active"),
                "state_topic": self.state_topic(&base_topic, "remote_release_active"),
                "payload_on": "ON", "payload_off": "OFF",
                "icon": "mdi:television-play",
            })),
            ("sensor", "schedule_mode_now", serde_json::json!({
                "name": "Sentinel Schedule Mode",
                "unique_id": format!("{node}_schedule_mode_now"),
                "state_topic": self.state_topic(&base_topic, "schedule_mode_now"),
                "icon": "mdi:timeline-text",
            })),
            ("sensor", "timezone", serde_json::json!({
                "name": "Sentinel Timezone",
                "unique_id": format!("{node}_timezone"),
                "state_topic": self.state_topic(&base_topic, "timezone"),
                "icon": "mdi:map-clock",
            })),
            ("sensor", "build_version", serde_json::json!({
                "name": "Sentinel Build Version",
                "unique_id": format!("{node}_build_version"),
                "state_topic": self.state_topic(&base_topic, "build_version"),
                "icon": "mdi:source-branch",
            })),
            ("sensor", "blocked_today", serde_json::json!({
                "name": "Sentinel Blocked Today",
                "unique_id": format!("{node}_blocked_today"),
                "state_topic": self.state_topic(&base_topic, "blocked_today"),
                "state_class": "measurement", "icon": "mdi:shield-remove",
            })),
            ("sensor", "blocked_7d", serde_json::json!({
                "name": "Sentinel Blocked 7d",
                "unique_id": format!("{node}_blocked_7d"),
                "state_topic": self.state_topic(&base_topic, "blocked_7d"),
                "state_class": "measurement", "icon": "mdi:calendar-week",
            })),
            ("sensor", "allowed_today", serde_json::json!({
                "name": "Sentinel Allowed Today",
                "unique_id": format!("{node}_allowed_today"),
                "state_topic": self.state_topic(&base_topic, "allowed_today"),
                "state_class": "measurement", "icon": "mdi:shield-check",
            })),
            ("sensor", "allowed_7d", serde_json::json!({
                "name": "Sentinel Allowed 7d",
                "unique_id": format!("{node}_allowed_7d"),
                "state_topic": self.state_topic(&base_topic, "allowed_7d"),
                "state_class": "measurement", "icon": "mdi:calendar-week",
            })),
            ("sensor", "reviewed_today", serde_json::json!({
                "name": "Sentinel Reviewed Today",
                "unique_id": format!("{node}_reviewed_today"),
                "state_topic": self.state_topic(&base_topic, "reviewed_today"),
                "state_class": "measurement", "icon": "mdi:counter",
            })),
            ("sensor", "reviewed_7d", serde_json::json!({
                "name": "Sentinel Reviewed 7d",
                "unique_id": format!("{node}_reviewed_7d"),
                "state_topic": self.state_topic(&base_topic, "reviewed_7d"),
                "state_class": "measurement", "icon": "mdi:calendar-week",
            })),
            ("sensor", "devices_connected", serde_json::json!({
                "name": "Sentinel Devices Connected",
                "unique_id": format!("{node}_devices_connected"),
                "state_topic": self.state_topic(&base_topic, "devices_connected"),
                "state_class": "measurement", "icon": "mdi:cast-connected",
            })),
            ("sensor", "devices_total", serde_json::json!({
                "name": "Sentinel Devices Total",
                "unique_id": format!("{node}_devices_total"),
                "state_topic": self.state_topic(&base_topic, "devices_total"),
                "state_class": "measurement", "icon": "mdi:television",
            })),
            ("sensor", "schedules_count", serde_json::json!({
                "name": "Sentinel Schedules Count",
                "unique_id": format!("{node}_schedules_count"),
                "state_topic": self.state_topic(&base_topic, "schedules_count"),
                "state_class": "measurement", "icon": "mdi:calendar-multiselect",
            })),
            ("sensor", "blocked_total", serde_json::json!({
                "name": "Sentinel Blocked Total",
                "unique_id": format!("{node}_blocked_total"),
                "state_topic": self.state_topic(&base_topic, "blocked_total"),
                "state_class": "total_increasing", "icon": "mdi:shield-lock",
            })),
            ("sensor", "allowed_total", serde_json::json!({
                "name": "Sentinel Allowed Total",
                "unique_id": format!("{node}_allowed_total"),
                "state_topic": self.state_topic(&base_topic, "allowed_total"),
                "state_class": "total_increasing", "icon": "mdi:playlist-check",
            })),
            ("sensor", "db_size_bytes", serde_json::json!({
                "name": "Sentinel DB Size",
                "unique_id": format!("{node}_db_size_bytes"),
                "state_topic": self.state_topic(&base_topic, "db_size_bytes"),
                "state_class": "measurement", "unit_of_measurement": "B", "icon": "mdi:database",
            })),
            ("sensor", "last_error", serde_json::json!({
                "name": "Sentinel Last Error",
                "unique_id": format!("{node}_last_error"),
                "state_topic": self.state_topic(&base_topic, "last_error"),
                "icon": "mdi:alert-circle-outline",
            })),
            ("number", "remote_release_minutes", serde_json::json!({
                "name": "Sentinel Release Minutes",
                "unique_id": format!("{node}_remote_release_minutes"),
                "state_topic": self.state_topic(&base_topic, "remote_release_minutes"),
                "command_topic": format!("{base_topic}/command/remote_release_minutes/set"),
                "min": 0, "max": 240, "step": 1, "mode": "box",
                "icon": "mdi:timer-cog",
            })),
        ];

        for (component, object_id, mut payload) in entities {
            if let Some(obj) = payload.as_object_mut() {
                obj.insert("availability_topic".to_string(), serde_json::json!(availability_topic));
                obj.insert("payload_available".to_string(), serde_json::json!("online"));
                obj.insert("payload_not_available".to_string(), serde_json::json!("offline"));
                obj.insert("device".to_string(), device.clone());
            }
            let topic = self.discovery_topic(&discovery_prefix, &node, component, object_id);
            self.publish(&topic, &payload.to_string(), Some(true)).await;
        }

        self.state.lock().await.discovery_signature = signature;
    }

    /// Publishes every state-topic value in `snapshot`.
    pub async fn publish_snapshot(&self, snapshot: &StatusSnapshot) {
        let (enabled, host, client_present, base_topic) = {
            let state = self.state.lock().await;
            (state.config.enabled, state.config.host.clone(), state.client.is_some(), state.config.base_topic.clone())
        };
        if !enabled || host.is_empty() || !client_present {
            return;
        }

        self.publish(&self.state_topic(&base_topic, "availability"), "online", Some(true)).await;

        let pairs: Vec<(&str, String)> = vec![
            ("active", switch_payload(snapshot.active).to_string()),
            ("sponsorblock_active", switch_payload(snapshot.sponsorblock_active).to_string()),
            ("monitoring_effective", switch_payload(snapshot.monitoring_effective).to_string()),
            ("sponsorblock_effective", switch_payload(snapshot.sponsorblock_effective).to_string()),
            ("judge_ok", switch_payload(snapshot.judge_ok).to_string()),
            ("schedule_active_now", switch_payload(snapshot.schedule_active_now).to_string()),
            ("schedule_mode_now", snapshot.schedule_mode_now.clone()),
            ("schedules_count", snapshot.schedules_count.to_string()),
            ("timezone", snapshot.timezone.clone()),
            ("build_version", snapshot.build_version.clone()),
            ("remote_release_active", switch_payload(snapshot.remote_release_active).to_string()),
            ("devices_connected", snapshot.devices_connected.to_string()),
            ("devices_total", snapshot.devices_total.to_string()),
            ("blocked_today", snapshot.blocked_today.to_string()),
            ("blocked_7d", snapshot.blocked_7d.to_string()),
            ("allowed_today", snapshot.allowed_today.to_string()),
            ("allowed_7d", snapshot.allowed_7d.to_string()),
            ("reviewed_today", snapshot.reviewed_today.to_string()),
            ("reviewed_7d", snapshot.reviewed_7d.to_string()),
            ("blocked_total", snapshot.blocked_total.to_string()),
            ("allowed_total", snapshot.allowed_total.to_string()),
            ("db_size_bytes", snapshot.db_size_bytes.to_string()),
            ("remote_release_minutes", snapshot.remote_release_minutes.to_string()),
            ("updated_at", chrono::Utc::now().to_rfc3339()),
            ("last_error", snapshot.last_error.clone()),
        ];
        for (key, value) in pairs {
            self.publish(&self.state_topic(&base_topic, key), &value, None).await;
        }
    }

    pub async fn close(&self) {
        self.disconnect().await;
    }
}

impl Default for MqttBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn command_topics_for(base: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert("active".to_string(), format!("{base}/command/active/set"));
    map.insert("sponsorblock_active".to_string(), format!("{base}/command/sponsorblock_active/set"));
    map.insert("remote_release_minutes".to_string(), format!("{base}/command/remote_release_minutes/set"));
    map
}

async fn poll_event_loop(
    mut event_loop: rumqttc::EventLoop,
    connected: Arc<AtomicBool>,
    command_tx: mpsc::Sender<(String, String)>,
    command_topics: HashMap<String, String>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::Relaxed);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connected.store(false, Ordering::Relaxed);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.retain {
                    continue;
                }
                let topic = publish.topic.clone();
                let command_name = command_topics.iter().find(|(_, v)| **v == topic).map(|(k, _)| k.clone());
                let Some(command_name) = command_name else { continue };
                let payload = String::from_utf8_lossy(&publish.payload).trim().to_string();
                if payload.is_empty() {
                    continue;
                }
                if command_tx.try_send((command_name.clone(), payload)).is_err() {
                    warn!(command = %command_name, "MQTT command queue full; dropping command");
                }
            }
            Ok(_) => {}
            Err(_) => {
                connected.store(false, Ordering::Relaxed);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_slug_strips_unsafe_characters_and_falls_back_to_default() {
        assert_eq!(topic_slug(Some(&"my home!!".to_string()), "sentinel"), "myhome");
        assert_eq!(topic_slug(None, "sentinel"), "sentinel");
        assert_eq!(topic_slug(Some(&"/leading-trailing/".to_string()), "sentinel"), "leading-trailing");
    }

    #[test]
    fn safe_int_clamps_to_range_and_falls_back_on_parse_failure() {
        assert_eq!(safe_int(Some(&"9999".to_string()), 30, 5, 3600), 3600);
        assert_eq!(safe_int(Some(&"not-a-number".to_string()), 30, 5, 3600), 30);
        assert_eq!(safe_int(Some(&"45".to_string()), 30, 5, 3600), 45);
    }

    #[tokio::test]
    async fn command_topics_are_scoped_under_the_base_topic() {
        let bridge = MqttBridge::new();
        let mut settings = HashMap::new();
        settings.insert("mqtt_base_topic".to_string(), "home/sentinel".to_string());
        bridge.apply_settings(&settings).await;
        let topics = bridge.command_topics().await;
        assert_eq!(topics.get("active").unwrap(), "home/sentinel/command/active/set");
    }

    #[tokio::test]
    async fn disabled_bridge_skips_publish_without_a_client() {
        let bridge = MqttBridge::new();
        let snapshot = StatusSnapshot::default();
        bridge.publish_snapshot(&snapshot).await;
        assert!(!bridge.info().await.connected);
    }
}
