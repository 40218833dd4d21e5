//! Per-device connection state machine. Grounded on
//! `original_source/app/services/lounge_manager.py::DeviceWorker`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sentinel_common::db::queries::devices;
use sentinel_common::events::{EventBus, SentinelEvent};
use sqlx::SqlitePool;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use super::control::{AuthState, ControlChannel, ControlChannelFactory, ControlEvent};

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

struct LastSeen {
    video_id: Option<String>,
}

/// Owns one TV's reconnect loop and exposes the operations the rest of
/// Sentinel can issue against it once connected.
pub struct DeviceWorker {
    device_id: i64,
    screen_id: String,
    pool: SqlitePool,
    factory: Arc<dyn ControlChannelFactory>,
    events: EventBus,
    channel: Mutex<Option<Box<dyn ControlChannel>>>,
    last_seen: Mutex<LastSeen>,
    stop_requested: AtomicBool,
}

impl DeviceWorker {
    pub fn new(
        device_id: i64,
        screen_id: String,
        pool: SqlitePool,
        factory: Arc<dyn ControlChannelFactory>,
        events: EventBus,
    ) -> Self {
        Self {
            device_id,
            screen_id,
            pool,
            factory,
            events,
            channel: Mutex::new(None),
            last_seen: Mutex::new(LastSeen { video_id: None }),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Reconnect loop with exponential backoff, doubling 2s up to a 30s cap.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = INITIAL_BACKOFF;
        while !self.stop_requested.load(Ordering::SeqCst) {
            match self.connect_and_subscribe().await {
                Ok(()) => {
                    backoff = INITIAL_BACKOFF;
                }
                Err(reason) => {
                    self.set_status("offline", &reason).await;
                    if self.stop_requested.load(Ordering::SeqCst) {
                        break;
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_and_subscribe(&self) -> Result<(), String> {
        self.set_status("connecting", "").await;

        let device = devices::get(&self.pool, self.device_id)
            .await
            .map_err(|err| err.to_string())?
            .ok_or_else(|| "Device record missing.".to_string())?;

        let mut channel = self.factory.open(self.device_id).await;
        let auth: AuthState = serde_json::from_str(&device.auth_state_json).unwrap_or(AuthState {
            version: 0,
            screen_id: Some(self.screen_id.clone()),
            lounge_id_token: None,
            refresh_token: None,
            expiry: 0,
        });
        channel.load_auth_state(&auth).await;

        channel.refresh_auth().await.map_err(|err| err.humanized())?;
        self.persist_auth(&*channel).await;
        self.set_status("linked", "").await;

        channel.connect().await.map_err(|err| err.humanized())?;
        self.set_status("connected", "").await;

        let (tx, mut rx) = mpsc::channel::<ControlEvent>(32);
        *self.channel.lock().await = Some(channel);

        let listener = {
            let events = self.events.clone();
            let device_id = self.device_id;
            let last_seen = &self.last_seen;
            async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        ControlEvent::NowPlaying { video_id, current_time, duration, play_state } => {
                            let mut seen = last_seen.lock().await;
                            if seen.video_id.as_deref() == Some(video_id.as_str()) && current_time.is_none() {
                                continue;
                            }
                            seen.video_id = Some(video_id.clone());
                            drop(seen);
                            events.emit_lossy(SentinelEvent::NowPlaying {
                                timestamp: Utc::now(),
                                device_id,
                                video_id,
                                current_time,
                                duration,
                                play_state,
                            });
                        }
                        ControlEvent::UpNext { video_id } => {
                            events.emit_lossy(SentinelEvent::UpNext {
                                timestamp: Utc::now(),
                                device_id,
                                video_id,
                            });
                        }
                        ControlEvent::Disconnected { .. } => break,
                    }
                }
            }
        };

        let subscribe_result = {
            let mut guard = self.channel.lock().await;
            let channel = guard.as_mut().expect("channel stored before subscribe");
            tokio::select! {
                result = channel.subscribe(tx) => result,
                _ = listener => Err(super::control::ControlError("subscription_ended".to_string())),
            }
        };

        *self.channel.lock().await = None;
        subscribe_result.map_err(|err| err.humanized())
    }

    async fn persist_auth(&self, channel: &dyn ControlChannel) {
        let auth = channel.serialize_auth();
        let payload = serde_json::to_string(&auth).unwrap_or_default();
        let display_name = channel.screen_name().unwrap_or_else(|| self.screen_id.clone());
        if let Err(err) = devices::upsert(
            &self.pool,
            &display_name,
            &self.screen_id,
            auth.lounge_id_token.as_deref().unwrap_or(""),
            &payload,
            "linked",
            "",
        )
        .await
        {
            warn!(device_id = self.device_id, error = %err, "failed to persist device auth state");
        }
    }

    async fn set_status(&self, status: &str, error: &str) {
        if let Err(err) = devices::update_status(&self.pool, self.device_id, status, error).await {
            warn!(device_id = self.device_id, error = %err, "failed to update device status");
        }
        self.events.emit_lossy(SentinelEvent::DeviceStatus {
            timestamp: Utc::now(),
            device_id: self.device_id,
            status: status.to_string(),
            error: if error.is_empty() { None } else { Some(error.to_string()) },
        });
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub async fn disconnect(&self) {
        if let Some(channel) = self.channel.lock().await.as_mut() {
            channel.disconnect().await;
        }
    }

    pub async fn next_video(&self) -> Result<(), String> {
        let mut guard = self.channel.lock().await;
        let Some(channel) = guard.as_mut() else {
            return Err("No active TV session. Try again shortly.".to_string());
        };
        match channel.seek_to(99999.0).await {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => match channel.next().await {
                Ok(true) => Ok(()),
                Ok(false) => Err("The TV did not advance to the next video.".to_string()),
                Err(err) => Err(err.humanized()),
            },
        }
    }

    pub async fn seek_video(&self, position_seconds: f64) -> Result<(), String> {
        let mut guard = self.channel.lock().await;
        let Some(channel) = guard.as_mut() else {
            return Err("No active TV session. Try again shortly.".to_string());
        };
        match channel.seek_to(position_seconds).await {
            Ok(true) => Ok(()),
            Ok(false) => Err("The TV rejected the seek request.".to_string()),
            Err(err) => Err(err.humanized()),
        }
    }

    pub async fn play_video(&self, video_id: &str) -> Result<(), String> {
        let mut guard = self.channel.lock().await;
        let Some(channel) = guard.as_mut() else {
            return Err("No active TV session. Try again shortly.".to_string());
        };
        match channel.play_video(video_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err("The TV rejected the play request.".to_string()),
            Err(err) => Err(err.humanized()),
        }
    }

    pub async fn has_active_session(&self) -> bool {
        self.channel.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::control::ControlError;
    use async_trait::async_trait;
    use sentinel_common::db::init::init_database;
    use std::path::Path;

    async fn setup_pool() -> SqlitePool {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::mem::forget(tmp);
        init_database(Path::new(&path)).await.unwrap()
    }

    struct StubChannel {
        connect_fails: bool,
    }

    #[async_trait]
    impl ControlChannel for StubChannel {
        async fn load_auth_state(&mut self, _auth: &AuthState) {}
        async fn refresh_auth(&mut self) -> Result<(), ControlError> {
            Ok(())
        }
        async fn connect(&mut self) -> Result<(), ControlError> {
            if self.connect_fails {
                Err(ControlError("connect_failed".to_string()))
            } else {
                Ok(())
            }
        }
        async fn subscribe(&mut self, _events: mpsc::Sender<ControlEvent>) -> Result<(), ControlError> {
            Err(ControlError("subscription_ended".to_string()))
        }
        async fn disconnect(&mut self) {}
        async fn seek_to(&mut self, _seconds: f64) -> Result<bool, ControlError> {
            Ok(true)
        }
        async fn next(&mut self) -> Result<bool, ControlError> {
            Ok(true)
        }
        async fn play_video(&mut self, _video_id: &str) -> Result<bool, ControlError> {
            Ok(true)
        }
        fn serialize_auth(&self) -> AuthState {
            AuthState { version: 1, screen_id: Some("scr".to_string()), lounge_id_token: None, refresh_token: None, expiry: 0 }
        }
        fn screen_name(&self) -> Option<String> {
            Some("Living Room TV".to_string())
        }
    }

    struct StubFactory {
        connect_fails: bool,
    }

    #[async_trait]
    impl ControlChannelFactory for StubFactory {
        async fn open(&self, _device_id: i64) -> Box<dyn ControlChannel> {
            Box::new(StubChannel { connect_fails: self.connect_fails })
        }
    }

    #[tokio::test]
    async fn commands_without_active_session_report_no_session() {
        let pool = setup_pool().await;
        let device_id = devices::upsert(&pool, "TV", "scr-1", "", "{}", "offline", "").await.unwrap();
        let worker = DeviceWorker::new(
            device_id,
            "scr-1".to_string(),
            pool,
            Arc::new(StubFactory { connect_fails: false }),
            EventBus::default(),
        );
        let err = worker.next_video().await.unwrap_err();
        assert!(err.contains("No active TV session"));
    }

    #[tokio::test]
    async fn connect_and_subscribe_surfaces_humanized_connect_failure() {
        let pool = setup_pool().await;
        let device_id = devices::upsert(&pool, "TV", "scr-2", "", "{}", "offline", "").await.unwrap();
        let worker = DeviceWorker::new(
            device_id,
            "scr-2".to_string(),
            pool,
            Arc::new(StubFactory { connect_fails: true }),
            EventBus::default(),
        );
        let err = worker.connect_and_subscribe().await.unwrap_err();
        assert!(err.contains("could not connect"));
    }
}
