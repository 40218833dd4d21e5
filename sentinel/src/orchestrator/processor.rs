//! Lounge-event processing: sponsor-skip dispatch, judge evaluation, and
//! safe-fallback intervention. Grounded on
//! `original_source/app/main.py::RuntimeState.process_lounge_event` /
//! `process_sponsorblock_event`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use sentinel_common::db::queries::{decisions, schedules, settings};
use sentinel_common::events::{EventBus, SentinelEvent};
use sentinel_common::schedule::Mode;
use serde_json::json;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use super::fallback;
use super::gates;
use crate::device::DeviceRegistry;
use crate::judge::{EvaluateRequest, Judge, Verdict};
use crate::metadata::MetadataFetcher;
use crate::sponsorblock::{SeekSink, SponsorBlockService};

/// Repeated `up_next` sightings (without an intervening `now_playing`)
/// this many times are treated as the real now-playing video, matching
/// `UP_NEXT_REPEAT_THRESHOLD` in the teacher source.
const UP_NEXT_REPEAT_THRESHOLD: i32 = 2;
/// A `now_playing` event within this many seconds counts as still fresh,
/// matching `NOW_PLAYING_STALE_SECS`.
const NOW_PLAYING_STALE_SECS: f64 = 4.0;
const NOW_PLAYING_DEDUPE_SECS: f64 = 5.0;
const BLOCK_RETRY_DEBOUNCE_SECS: f64 = 1.5;

struct DeviceSeekSink<'a> {
    devices: &'a DeviceRegistry,
}

#[async_trait]
impl<'a> SeekSink for DeviceSeekSink<'a> {
    async fn seek(&self, device_id: i64, seek_to: f64) -> Result<(), String> {
        self.devices.seek_video(device_id, seek_to).await
    }
}

#[derive(Default)]
struct Bookkeeping {
    up_next_repeat: HashMap<i64, (String, i32)>,
    last_now_playing_at: HashMap<i64, Instant>,
    last_now_playing_video: HashMap<i64, (String, Instant)>,
    block_retry_at: HashMap<String, Instant>,
    up_next_candidates: HashMap<i64, Vec<String>>,
    reinforce_tasks: HashMap<i64, JoinHandle<()>>,
}

pub struct EventProcessor {
    pool: SqlitePool,
    judge: Arc<Judge>,
    devices: Arc<DeviceRegistry>,
    sponsorblock: Arc<SponsorBlockService>,
    metadata: Arc<MetadataFetcher>,
    events: EventBus,
    gemini_api_key: String,
    gemini_model: String,
    state: Mutex<Bookkeeping>,
    last_history_choice: Mutex<HashMap<i64, String>>,
}

impl EventProcessor {
    pub fn new(
        pool: SqlitePool,
        judge: Arc<Judge>,
        devices: Arc<DeviceRegistry>,
        sponsorblock: Arc<SponsorBlockService>,
        metadata: Arc<MetadataFetcher>,
        events: EventBus,
        gemini_api_key: String,
        gemini_model: String,
    ) -> Self {
        Self {
            pool,
            judge,
            devices,
            sponsorblock,
            metadata,
            events,
            gemini_api_key,
            gemini_model,
            state: Mutex::new(Bookkeeping::default()),
            last_history_choice: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle_event(self: &Arc<Self>, event: SentinelEvent) {
        match event {
            SentinelEvent::NowPlaying { device_id, video_id, current_time, duration, play_state, .. } => {
                self.process_sponsorblock_event(device_id, &video_id, true, current_time, play_state.as_deref()).await;
                self.process_lounge_event(device_id, &video_id, true, duration).await;
            }
            SentinelEvent::UpNext { device_id, video_id, .. } => {
                self.process_sponsorblock_event(device_id, &video_id, false, None, None).await;
                self.process_lounge_event(device_id, &video_id, false, None).await;
            }
            _ => {}
        }
    }

    async fn process_sponsorblock_event(
        &self,
        device_id: i64,
        video_id: &str,
        is_now_playing: bool,
        current_time: Option<f64>,
        play_state: Option<&str>,
    ) {
        if video_id.is_empty() {
            return;
        }
        let settings_map = match settings::all(&self.pool).await {
            Ok(map) => map,
            Err(_) => return,
        };
        if !gates::sponsorblock_enabled_now(&settings_map) {
            return;
        }
        if gates::remote_release_active(settings_map.get("sponsorblock_release_until").map(String::as_str).unwrap_or("")) {
            return;
        }

        let categories = parse_sponsorblock_categories(settings_map.get("sponsorblock_categories_json").map(String::as_str).unwrap_or("[]"));
        let min_length = settings_map
            .get("sponsorblock_min_length_seconds")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.0);

        if !is_now_playing {
            self.sponsorblock.prefetch(video_id, &categories, min_length).await;
            return;
        }
        if let Some(state) = play_state {
            if state != "1" {
                return;
            }
        }

        let sink = DeviceSeekSink { devices: &self.devices };
        let (ok, err, segment) = self
            .sponsorblock
            .try_skip_current(device_id, video_id, current_time, &categories, min_length, &sink)
            .await;
        let Some(segment) = segment else {
            return;
        };
        let action = if ok { "seek_end" } else { "none" };
        let _ = sentinel_common::db::queries::sponsor_actions::add(
            &self.pool,
            device_id,
            video_id,
            &segment.category,
            segment.start,
            segment.end,
            action,
            if ok { "ok" } else { "error" },
            &err,
        )
        .await;

        if ok {
            self.events.emit_lossy(SentinelEvent::SponsorblockSkip {
                timestamp: chrono::Utc::now(),
                device_id,
                video_id: video_id.to_string(),
                seek_to: segment.end,
            });
        } else if !err.is_empty() {
            self.events.emit_lossy(SentinelEvent::SponsorblockError {
                timestamp: chrono::Utc::now(),
                device_id,
                video_id: video_id.to_string(),
                error: err,
            });
        }
    }

    async fn process_lounge_event(self: &Arc<Self>, device_id: i64, video_id: &str, is_now_playing: bool, _duration: Option<f64>) {
        if video_id.is_empty() {
            return;
        }
        let settings_map = match settings::all(&self.pool).await {
            Ok(map) => map,
            Err(_) => return,
        };
        let schedule_rows = schedules::list(&self.pool).await.unwrap_or_default();
        if !gates::monitoring_enabled_now(&settings_map, &schedule_rows) {
            return;
        }

        let now = Instant::now();
        let inferred_now_playing;
        {
            let mut state = self.state.lock().await;
            if is_now_playing {
                state.up_next_candidates.entry(device_id).or_default().retain(|v| v != video_id);
            } else {
                state.up_next_candidates.entry(device_id).or_default().retain(|v| v != video_id);
                state.up_next_candidates.entry(device_id).or_default().push(video_id.to_string());
                let queue = state.up_next_candidates.entry(device_id).or_default();
                if queue.len() > 30 {
                    let drop = queue.len() - 30;
                    queue.drain(0..drop);
                }
            }

            if is_now_playing {
                let dedupe = state
                    .last_now_playing_video
                    .get(&device_id)
                    .map(|(prev_id, at)| prev_id == video_id && now.duration_since(*at).as_secs_f64() < NOW_PLAYING_DEDUPE_SECS)
                    .unwrap_or(false);
                if dedupe {
                    return;
                }
                state.last_now_playing_video.insert(device_id, (video_id.to_string(), now));
                state.last_now_playing_at.insert(device_id, now);
                state.up_next_repeat.remove(&device_id);
                inferred_now_playing = false;
            } else {
                let (prev_video, prev_count) = state.up_next_repeat.get(&device_id).cloned().unwrap_or_default();
                let count = if prev_video == video_id { prev_count + 1 } else { 1 };
                state.up_next_repeat.insert(device_id, (video_id.to_string(), count));
                let recent_now_playing = state
                    .last_now_playing_at
                    .get(&device_id)
                    .map(|at| now.duration_since(*at).as_secs_f64() < NOW_PLAYING_STALE_SECS)
                    .unwrap_or(false);
                inferred_now_playing = !recent_now_playing && count >= UP_NEXT_REPEAT_THRESHOLD;
            }
        }

        let meta = self.metadata.fetch(video_id).await;
        let video_url = format!("https://www.youtube.com/watch?v={video_id}");
        let schedule_ctx = gates::current_schedule_context(&settings_map, &schedule_rows);
        let mode = schedule_ctx.mode;

        let req = EvaluateRequest {
            video_id,
            title: &meta.title,
            channel_id: &meta.channel_id,
            channel_title: &meta.channel_title,
            video_url: &video_url,
            mode,
        };
        let decision = match self.judge.evaluate(req, &self.gemini_api_key, &self.gemini_model).await {
            Ok(decision) => {
                let _ = settings::set(&self.pool, "judge_ok", "true").await;
                let _ = settings::set(&self.pool, "last_error", "").await;
                decision
            }
            Err(err) => {
                // A fatal auth/quota failure gets the degraded bookkeeping and a
                // judge_failure event; a transient output-parse glitch (already
                // retried once inside the judge) just applies the fail-mode.
                if err.is_classifier_fatal() {
                    let _ = self.judge.handle_fatal_failure(&err).await;
                    self.events.emit_lossy(SentinelEvent::JudgeFailure { timestamp: chrono::Utc::now(), error: err.to_string() });
                }
                if mode == Mode::Whitelist {
                    Verdict {
                        verdict: "BLOCK".to_string(),
                        reason: "Whitelist mode: Gemini unavailable and no explicit allowlist match.".to_string(),
                        confidence: 100,
                        source: "fallback".to_string(),
                    }
                } else {
                    Verdict {
                        verdict: "ALLOW".to_string(),
                        reason: "Gemini is temporarily unavailable (quota/auth). Allowed by fail-open policy.".to_string(),
                        confidence: 0,
                        source: "fallback".to_string(),
                    }
                }
            }
        };

        let should_treat_as_current = is_now_playing || inferred_now_playing || (!is_now_playing && !decision.is_allow());
        let release_active = gates::remote_release_active(settings_map.get("sponsorblock_release_until").map(String::as_str).unwrap_or(""));
        let mut action = "none";

        if should_treat_as_current && !decision.is_allow() {
            if release_active {
                action = "none";
            } else {
                let retry_key = format!("{device_id}:{video_id}");
                let skip_debounced = {
                    let mut state = self.state.lock().await;
                    let last_try = state.block_retry_at.get(&retry_key).copied();
                    let debounced = last_try.map(|t| now.duration_since(t).as_secs_f64() < BLOCK_RETRY_DEBOUNCE_SECS).unwrap_or(false);
                    if !debounced {
                        state.block_retry_at.insert(retry_key.clone(), now);
                    }
                    debounced
                };
                if skip_debounced {
                    action = "none";
                } else {
                    let queue = { self.state.lock().await.up_next_candidates.get(&device_id).cloned().unwrap_or_default() };
                    let (ok, skip_error, safe_video_id) = fallback::play_safe_from_queue(
                        &self.pool,
                        &self.judge,
                        &self.devices,
                        &self.metadata,
                        device_id,
                        video_id,
                        mode,
                        &self.gemini_api_key,
                        &self.gemini_model,
                        queue,
                        &self.last_history_choice,
                    )
                    .await;
                    action = if ok { "play_safe" } else { "none" };
                    if ok {
                        self.spawn_reinforcement(device_id, safe_video_id.clone());
                        let mut state = self.state.lock().await;
                        let prefix = format!("{device_id}:");
                        state.block_retry_at.retain(|k, _| !k.starts_with(&prefix));
                        drop(state);
                        self.events.emit_lossy(SentinelEvent::InterventionPlaySafe {
                            timestamp: chrono::Utc::now(),
                            device_id,
                            video_id: safe_video_id,
                        });
                    } else if !skip_error.is_empty() {
                        self.events.emit_lossy(SentinelEvent::InterventionError { timestamp: chrono::Utc::now(), device_id, error: skip_error });
                    }
                }
            }
        } else if should_treat_as_current {
            action = "allow";
        }

        if let Err(err) = decisions::add(
            &self.pool,
            device_id,
            video_id,
            &meta.channel_id,
            &meta.title,
            &meta.thumbnail_url,
            &decision.verdict,
            &decision.reason,
            decision.confidence,
            &decision.source,
            action,
        )
        .await
        {
            warn!(device_id, video_id, error = %err, "failed to persist decision");
        }

        self.events.emit_lossy(SentinelEvent::Status {
            timestamp: chrono::Utc::now(),
            payload: json!({
                "event": if is_now_playing { "now_playing" } else { "up_next" },
                "device_id": device_id,
                "video_id": video_id,
                "title": meta.title,
                "channel_title": meta.channel_title,
                "thumbnail_url": meta.thumbnail_url,
                "verdict": decision.verdict,
                "reason": decision.reason,
                "confidence": decision.confidence,
                "source": decision.source,
                "action_taken": action,
                "inferred_now_playing": inferred_now_playing,
            }),
        });
    }

    /// Re-applies the safe video a couple of seconds later, since some TVs
    /// ignore the first override while user-initiated playback settles.
    fn spawn_reinforcement(self: &Arc<Self>, device_id: i64, safe_video_id: String) {
        let this = self.clone();
        let task = tokio::spawn(async move {
            for delay_secs in [1.0_f64, 3.0_f64] {
                tokio::time::sleep(std::time::Duration::from_secs_f64(delay_secs)).await;
                let settings_map = match settings::all(&this.pool).await {
                    Ok(map) => map,
                    Err(_) => return,
                };
                let schedule_rows = schedules::list(&this.pool).await.unwrap_or_default();
                if !gates::monitoring_enabled_now(&settings_map, &schedule_rows) {
                    return;
                }
                if gates::remote_release_active(settings_map.get("sponsorblock_release_until").map(String::as_str).unwrap_or("")) {
                    return;
                }
                if this.devices.play_video(device_id, safe_video_id.clone()).await.is_ok() {
                    this.events.emit_lossy(SentinelEvent::InterventionPlaySafeReinforce {
                        timestamp: chrono::Utc::now(),
                        device_id,
                        video_id: safe_video_id.clone(),
                    });
                }
            }
        });

        tokio::spawn({
            let this = self.clone();
            async move {
                let mut state = this.state.lock().await;
                if let Some(old) = state.reinforce_tasks.insert(device_id, task) {
                    old.abort();
                }
            }
        });
    }

    pub async fn cancel_reinforce_tasks(&self) {
        let mut state = self.state.lock().await;
        for (_, task) in state.reinforce_tasks.drain() {
            task.abort();
        }
    }

    pub async fn clear_retry_state(&self) {
        let mut state = self.state.lock().await;
        state.block_retry_at.clear();
        state.up_next_candidates.clear();
    }
}

fn parse_sponsorblock_categories(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(list) if !list.is_empty() => list.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
        _ => crate::policy::DEFAULT_SPONSORBLOCK_CATEGORIES.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sponsorblock_categories_falls_back_to_defaults_on_empty_json() {
        let categories = parse_sponsorblock_categories("[]");
        assert_eq!(categories, crate::policy::DEFAULT_SPONSORBLOCK_CATEGORIES.to_vec());
    }

    #[test]
    fn parse_sponsorblock_categories_honors_explicit_list() {
        let categories = parse_sponsorblock_categories(r#"["sponsor", "selfpromo"]"#);
        assert_eq!(categories, vec!["sponsor".to_string(), "selfpromo".to_string()]);
    }
}
