//! The lounge control-channel seam. Grounded on
//! `original_source/app/services/lounge_manager.py`'s `YtLoungeApi` usage
//! and `_humanize_lounge_error`/`_normalize_auth_state` helpers. The actual
//! remote-control wire protocol is out of scope, so this module exposes it
//! as a trait plus the error-humanizing and auth-normalizing logic that
//! wraps it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Persisted device auth state, normalized to the pyytlounge `AuthState` v1
/// schema (`_normalize_auth_state`), with a fallback path for legacy keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthState {
    pub version: i32,
    pub screen_id: Option<String>,
    pub lounge_id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expiry: i64,
}

pub fn normalize_auth_state(data: &Value) -> AuthState {
    if data.get("version").is_some() && data.get("screenId").is_some() {
        return AuthState {
            version: data["version"].as_i64().unwrap_or(0) as i32,
            screen_id: data["screenId"].as_str().map(str::to_string),
            lounge_id_token: data.get("loungeIdToken").and_then(|v| v.as_str()).map(str::to_string),
            refresh_token: data.get("refreshToken").and_then(|v| v.as_str()).map(str::to_string),
            expiry: data.get("expiry").and_then(|v| v.as_i64()).unwrap_or(0),
        };
    }

    AuthState {
        version: 0,
        screen_id: pick_str(data, &["screenId", "screen_id"]),
        lounge_id_token: pick_str(data, &["loungeIdToken", "lounge_id_token", "loungeToken"]),
        refresh_token: pick_str(data, &["refreshToken", "refresh_token"]),
        expiry: data.get("expiry").and_then(|v| v.as_i64()).unwrap_or(0),
    }
}

fn pick_str(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| data.get(*key).and_then(|v| v.as_str()).map(str::to_string))
}

/// Rewrites raw control-channel error text into an operator-facing
/// explanation. Mirrors `_humanize_lounge_error` verbatim.
pub fn humanize_lounge_error(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "Unknown lounge error.".to_string();
    }
    let lower = raw.to_lowercase();
    if lower.contains("not connected") {
        return "The TV session is not connected yet. Sentinel will retry automatically.".to_string();
    }
    if lower.contains("unsupported client") {
        return "The current YouTube client profile on the TV is not supported for remote control. Switch profile on TV and try again.".to_string();
    }
    if lower.contains("refresh_auth_failed") {
        return "The TV pairing token expired. Re-pair this TV using a fresh code.".to_string();
    }
    if lower.contains("connect_failed") {
        return "Sentinel could not connect to the TV lounge session. Check that YouTube is open on the TV.".to_string();
    }
    if lower.contains("timeout") || lower.contains("timed out") {
        return "The TV did not respond in time. Please keep YouTube open and retry.".to_string();
    }
    if lower.contains("network") || lower.contains("host") || lower.contains("connection") {
        return "Network communication with the TV failed. Check local network connectivity.".to_string();
    }
    if lower.contains("subscription_ended") {
        return "The TV ended the lounge subscription. Sentinel will reconnect automatically.".to_string();
    }
    if lower.contains("disconnected") {
        return "The TV session disconnected. Sentinel is reconnecting automatically.".to_string();
    }
    raw.to_string()
}

#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub struct ControlError(pub String);

impl ControlError {
    pub fn humanized(&self) -> String {
        humanize_lounge_error(&self.0)
    }
}

/// Playback events a subscribed control channel pushes asynchronously.
/// Mirrors `NowPlayingEvent`/`AutoplayUpNextEvent`/`DisconnectedEvent`.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    NowPlaying {
        video_id: String,
        current_time: Option<f64>,
        duration: Option<f64>,
        play_state: Option<String>,
    },
    UpNext {
        video_id: String,
    },
    Disconnected {
        reason: String,
    },
}

/// One TV's lounge session. Created fresh per connection attempt, the way
/// `DeviceWorker.run` opens a new `YtLoungeApi` on every reconnect.
#[async_trait]
pub trait ControlChannel: Send {
    async fn load_auth_state(&mut self, auth: &AuthState);
    async fn refresh_auth(&mut self) -> Result<(), ControlError>;
    async fn connect(&mut self) -> Result<(), ControlError>;
    /// Subscribes and blocks until disconnected, pushing events to `events`.
    async fn subscribe(&mut self, events: tokio::sync::mpsc::Sender<ControlEvent>) -> Result<(), ControlError>;
    async fn disconnect(&mut self);
    async fn seek_to(&mut self, seconds: f64) -> Result<bool, ControlError>;
    async fn next(&mut self) -> Result<bool, ControlError>;
    async fn play_video(&mut self, video_id: &str) -> Result<bool, ControlError>;
    fn serialize_auth(&self) -> AuthState;
    fn screen_name(&self) -> Option<String>;
}

/// Builds a fresh [`ControlChannel`] for a device. The concrete factory
/// (backed by whatever remote-control client the deployment uses) is
/// supplied at startup.
#[async_trait]
pub trait ControlChannelFactory: Send + Sync {
    async fn open(&self, device_id: i64) -> Box<dyn ControlChannel>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_auth_state_prefers_v1_schema() {
        let data = json!({"version": 2, "screenId": "abc", "loungeIdToken": "tok", "refreshToken": "r", "expiry": 123});
        let auth = normalize_auth_state(&data);
        assert_eq!(auth.version, 2);
        assert_eq!(auth.screen_id.as_deref(), Some("abc"));
    }

    #[test]
    fn normalize_auth_state_falls_back_to_legacy_keys() {
        let data = json!({"screen_id": "abc", "lounge_token": "tok"});
        let auth = normalize_auth_state(&data);
        assert_eq!(auth.version, 0);
        assert_eq!(auth.screen_id.as_deref(), Some("abc"));
        assert_eq!(auth.lounge_id_token.as_deref(), Some("tok"));
    }

    #[test]
    fn humanize_lounge_error_maps_known_causes() {
        assert!(humanize_lounge_error("refresh_auth_failed").contains("Re-pair"));
        assert!(humanize_lounge_error("connect_failed").contains("could not connect"));
        assert!(humanize_lounge_error("").contains("Unknown"));
    }

    #[test]
    fn humanize_lounge_error_passes_through_unknown_causes() {
        assert_eq!(humanize_lounge_error("some unique cause"), "some unique cause");
    }
}
