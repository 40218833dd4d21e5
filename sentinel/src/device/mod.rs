//! TV device registry. Grounded on
//! `original_source/app/services/lounge_manager.py::LoungeManager`.

pub mod control;
pub mod pairing;
pub mod unavailable;
pub mod worker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sentinel_common::db::queries::devices;
use sentinel_common::events::{EventBus, SentinelEvent};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use control::ControlChannelFactory;
use pairing::{classify_pairing_failure, normalize_pairing_code, PairingError, Pairer};
use worker::DeviceWorker;

struct WorkerHandle {
    worker: Arc<DeviceWorker>,
    task: JoinHandle<()>,
}

/// Owns every [`DeviceWorker`], starting, stopping, and dispatching
/// commands to them. Mirrors `LoungeManager`'s worker dict of asyncio
/// tasks, replacing it with a map of `tokio::task::JoinHandle`s.
pub struct DeviceRegistry {
    pool: SqlitePool,
    factory: Arc<dyn ControlChannelFactory>,
    pairer: Arc<dyn Pairer>,
    events: EventBus,
    workers: Mutex<HashMap<i64, WorkerHandle>>,
}

impl DeviceRegistry {
    pub fn new(
        pool: SqlitePool,
        factory: Arc<dyn ControlChannelFactory>,
        pairer: Arc<dyn Pairer>,
        events: EventBus,
    ) -> Self {
        Self { pool, factory, pairer, events, workers: Mutex::new(HashMap::new()) }
    }

    /// Spawns a worker for every device row already in the database, used
    /// at startup.
    pub async fn start_for_existing_devices(&self) -> sentinel_common::Result<()> {
        let rows = devices::list(&self.pool).await?;
        for row in rows {
            self.ensure_worker(row.id, row.screen_id).await;
        }
        Ok(())
    }

    /// Starts a worker for `device_id` if one isn't already running.
    pub async fn ensure_worker(&self, device_id: i64, screen_id: String) {
        let mut workers = self.workers.lock().await;
        if let Some(handle) = workers.get(&device_id) {
            if !handle.task.is_finished() {
                return;
            }
        }
        let worker = Arc::new(DeviceWorker::new(
            device_id,
            screen_id,
            self.pool.clone(),
            self.factory.clone(),
            self.events.clone(),
        ));
        let run_worker = worker.clone();
        let task = tokio::spawn(async move {
            run_worker.run().await;
        });
        workers.insert(device_id, WorkerHandle { worker, task });
    }

    /// Stops every worker, waiting briefly for a graceful shutdown before
    /// cancelling anything still running.
    pub async fn stop_all(&self) {
        let mut workers = self.workers.lock().await;
        for (device_id, handle) in workers.iter() {
            handle.worker.request_stop();
            handle.worker.disconnect().await;
            if tokio::time::timeout(Duration::from_secs(3), wait_finished(&handle.task)).await.is_err() {
                warn!(device_id, "worker did not stop within grace period, aborting");
                handle.task.abort();
            }
        }
        workers.clear();
    }

    /// Stops every worker and marks all devices paused, used when a
    /// schedule or manual toggle takes monitoring offline.
    pub async fn pause_all(&self) {
        self.stop_all().await;
        if let Ok(rows) = devices::list(&self.pool).await {
            for row in rows {
                let _ = devices::update_status(&self.pool, row.id, "paused", "schedule_or_state_inactive").await;
            }
        }
    }

    pub async fn pair_device(&self, pairing_code: &str, device_ref: &str) -> Result<i64, PairingError> {
        let code = normalize_pairing_code(pairing_code)?;
        let result = self.pairer.pair(&code, device_ref).await.map_err(|err| classify_pairing_failure(&err.message))?;

        let auth_json = serde_json::to_string(&result.auth_state).unwrap_or_default();
        let display_name = result.screen_name.clone().unwrap_or_else(|| result.screen_id.clone());
        let device_id = devices::upsert(
            &self.pool,
            &display_name,
            &result.screen_id,
            result.auth_state.lounge_id_token.as_deref().unwrap_or(""),
            &auth_json,
            "paired",
            "",
        )
        .await
        .map_err(|err| PairingError { code: "pair_failed", message: err.to_string() })?;

        self.ensure_worker(device_id, result.screen_id).await;
        self.events.emit_lossy(SentinelEvent::PairSuccess { timestamp: chrono::Utc::now(), device_id });
        Ok(device_id)
    }

    pub async fn next_video(&self, device_id: i64) -> Result<(), String> {
        self.dispatch(device_id, |worker| Box::pin(async move { worker.next_video().await })).await
    }

    pub async fn seek_video(&self, device_id: i64, position_seconds: f64) -> Result<(), String> {
        self.dispatch(device_id, move |worker| Box::pin(async move { worker.seek_video(position_seconds).await })).await
    }

    pub async fn play_video(&self, device_id: i64, video_id: String) -> Result<(), String> {
        self.dispatch(device_id, move |worker| Box::pin(async move { worker.play_video(&video_id).await })).await
    }

    async fn dispatch<F>(&self, device_id: i64, op: F) -> Result<(), String>
    where
        F: for<'a> FnOnce(&'a DeviceWorker) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + 'a>>,
    {
        let workers = self.workers.lock().await;
        let Some(handle) = workers.get(&device_id) else {
            return Err("No active TV session for this device.".to_string());
        };
        if handle.task.is_finished() {
            return Err("The TV worker is reconnecting. Try again shortly.".to_string());
        }
        op(&handle.worker).await
    }
}

async fn wait_finished(task: &JoinHandle<()>) {
    while !task.is_finished() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_common::db::init::init_database;
    use std::path::Path;

    async fn setup_pool() -> SqlitePool {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::mem::forget(tmp);
        init_database(Path::new(&path)).await.unwrap()
    }

    struct RejectingPairer;

    #[async_trait]
    impl Pairer for RejectingPairer {
        async fn pair(&self, _code: &str, _device_ref: &str) -> Result<pairing::PairResult, PairingError> {
            Err(PairingError { code: "pair_rejected", message: "code rejected by TV".to_string() })
        }
    }

    struct NullFactory;

    #[async_trait]
    impl ControlChannelFactory for NullFactory {
        async fn open(&self, _device_id: i64) -> Box<dyn control::ControlChannel> {
            unimplemented!("not exercised in this test")
        }
    }

    #[tokio::test]
    async fn pair_device_rejects_short_codes_before_calling_pairer() {
        let pool = setup_pool().await;
        let registry = DeviceRegistry::new(pool, Arc::new(NullFactory), Arc::new(RejectingPairer), EventBus::default());
        let err = registry.pair_device("123", "tv-1").await.unwrap_err();
        assert_eq!(err.code, "pair_code_invalid");
    }

    #[tokio::test]
    async fn pair_device_surfaces_classified_pairer_failure() {
        let pool = setup_pool().await;
        let registry = DeviceRegistry::new(pool, Arc::new(NullFactory), Arc::new(RejectingPairer), EventBus::default());
        let err = registry.pair_device("123456", "tv-1").await.unwrap_err();
        assert_eq!(err.code, "pair_rejected");
    }

    #[tokio::test]
    async fn dispatch_without_worker_reports_no_session() {
        let pool = setup_pool().await;
        let registry = DeviceRegistry::new(pool, Arc::new(NullFactory), Arc::new(RejectingPairer), EventBus::default());
        let err = registry.next_video(42).await.unwrap_err();
        assert!(err.contains("No active TV session"));
    }
}
