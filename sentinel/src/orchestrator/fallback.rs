//! Safe-fallback playback: queue-first, then a shuffled known-safe history
//! pool. Grounded on `original_source/app/main.py::RuntimeState`'s
//! `_play_safe_from_queue` / `_play_safe_from_history` /
//! `_history_allow_candidates` / `_randomized_history_candidates`.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use sentinel_common::db::models::DecisionRow;
use sentinel_common::db::queries::decisions;
use sentinel_common::schedule::Mode;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::device::DeviceRegistry;
use crate::judge::{EvaluateRequest, Judge, Verdict};
use crate::metadata::MetadataFetcher;

/// ALLOW-verdict video ids from decision history, de-duplicated and with
/// the just-blocked video excluded. Preserves row order (most recent first).
pub fn history_allow_candidates(rows: &[DecisionRow], blocked_video_id: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        if row.verdict != "ALLOW" {
            continue;
        }
        let id = row.video_id.trim();
        if id.is_empty() || id == blocked_video_id || !seen.insert(id.to_string()) {
            continue;
        }
        out.push(id.to_string());
    }
    out
}

/// Shuffles candidates, nudging away from repeating the device's last pick
/// when more than one candidate is available.
pub fn randomized_history_candidates(candidate_ids: &[String], last_choice: Option<&str>) -> Vec<String> {
    if candidate_ids.is_empty() {
        return Vec::new();
    }
    let mut randomized = candidate_ids.to_vec();
    randomized.shuffle(&mut rand::thread_rng());
    if let Some(last) = last_choice {
        if !last.is_empty() && randomized.len() > 1 && randomized[0] == last {
            if let Some(idx) = randomized.iter().position(|c| c != last) {
                randomized.swap(0, idx);
            }
        }
    }
    randomized
}

async fn evaluate_candidate(
    judge: &Judge,
    metadata: &MetadataFetcher,
    candidate_id: &str,
    mode: Mode,
    configured_gemini_key: &str,
    gemini_model: &str,
) -> Verdict {
    let meta = metadata.fetch(candidate_id).await;
    let video_url = format!("https://www.youtube.com/watch?v={candidate_id}");
    let req = EvaluateRequest {
        video_id: candidate_id,
        title: &meta.title,
        channel_id: &meta.channel_id,
        channel_title: &meta.channel_title,
        video_url: &video_url,
        mode,
    };
    match judge.evaluate(req, configured_gemini_key, gemini_model).await {
        Ok(verdict) => verdict,
        Err(err) => {
            if err.is_classifier_fatal() {
                let _ = judge.handle_fatal_failure(&err).await;
            }
            if mode == Mode::Whitelist {
                Verdict {
                    verdict: "BLOCK".to_string(),
                    reason: "Whitelist mode: candidate evaluation failed.".to_string(),
                    confidence: 100,
                    source: "fallback".to_string(),
                }
            } else {
                Verdict {
                    verdict: "ALLOW".to_string(),
                    reason: "Candidate evaluation failed; fail-open candidate allow.".to_string(),
                    confidence: 0,
                    source: "fallback".to_string(),
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn play_safe_from_queue(
    pool: &SqlitePool,
    judge: &Judge,
    devices: &DeviceRegistry,
    metadata: &MetadataFetcher,
    device_id: i64,
    blocked_video_id: &str,
    mode: Mode,
    configured_gemini_key: &str,
    gemini_model: &str,
    queue: Vec<String>,
    last_history_choice: &Mutex<HashMap<i64, String>>,
) -> (bool, String, String) {
    let candidates: Vec<String> = queue.into_iter().filter(|v| !v.is_empty() && v != blocked_video_id).collect();
    if candidates.is_empty() {
        return play_safe_from_history(pool, judge, devices, metadata, device_id, blocked_video_id, mode, configured_gemini_key, gemini_model, last_history_choice).await;
    }

    let mut last_error = String::new();
    for candidate_id in candidates.iter().take(12) {
        let decision = evaluate_candidate(judge, metadata, candidate_id, mode, configured_gemini_key, gemini_model).await;
        if !decision.is_allow() {
            continue;
        }
        match devices.play_video(device_id, candidate_id.clone()).await {
            Ok(()) => return (true, String::new(), candidate_id.clone()),
            Err(err) => last_error = err,
        }
    }

    let (hist_ok, hist_err, hist_id) =
        play_safe_from_history(pool, judge, devices, metadata, device_id, blocked_video_id, mode, configured_gemini_key, gemini_model, last_history_choice).await;
    if hist_ok {
        return (true, String::new(), hist_id);
    }
    if !last_error.is_empty() {
        return (false, format!("{last_error} {hist_err}").trim().to_string(), String::new());
    }
    (false, hist_err, String::new())
}

#[allow(clippy::too_many_arguments)]
pub async fn play_safe_from_history(
    pool: &SqlitePool,
    judge: &Judge,
    devices: &DeviceRegistry,
    metadata: &MetadataFetcher,
    device_id: i64,
    blocked_video_id: &str,
    mode: Mode,
    configured_gemini_key: &str,
    gemini_model: &str,
    last_history_choice: &Mutex<HashMap<i64, String>>,
) -> (bool, String, String) {
    let rows = match decisions::recent(pool, 500).await {
        Ok(rows) => rows,
        Err(_) => return (false, "No known-safe history video available for fallback.".to_string(), String::new()),
    };
    let allow_candidates = history_allow_candidates(&rows, blocked_video_id);
    let last_choice = { last_history_choice.lock().await.get(&device_id).cloned() };
    let candidates = randomized_history_candidates(&allow_candidates, last_choice.as_deref());
    if candidates.is_empty() {
        return (false, "No known-safe history video available for fallback.".to_string(), String::new());
    }

    let mut last_error = String::new();
    for candidate_id in &candidates {
        let decision = evaluate_candidate(judge, metadata, candidate_id, mode, configured_gemini_key, gemini_model).await;
        if !decision.is_allow() {
            continue;
        }
        match devices.play_video(device_id, candidate_id.clone()).await {
            Ok(()) => {
                last_history_choice.lock().await.insert(device_id, candidate_id.clone());
                return (true, String::new(), candidate_id.clone());
            }
            Err(err) => last_error = err,
        }
    }

    if !last_error.is_empty() {
        (false, last_error, String::new())
    } else {
        (false, "No known-safe history video available for fallback.".to_string(), String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn decision_row(video_id: &str, verdict: &str) -> DecisionRow {
        DecisionRow {
            id: 1,
            device_id: 1,
            video_id: video_id.to_string(),
            channel_id: None,
            title: None,
            thumbnail: None,
            verdict: verdict.to_string(),
            reason: String::new(),
            confidence: 100,
            source: "gemini".to_string(),
            action_taken: "allow".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn history_allow_candidates_excludes_blocked_and_duplicates() {
        let rows = vec![
            decision_row("aaaaaaaaaaa", "ALLOW"),
            decision_row("bbbbbbbbbbb", "BLOCK"),
            decision_row("aaaaaaaaaaa", "ALLOW"),
            decision_row("ccccccccccc", "ALLOW"),
        ];
        let candidates = history_allow_candidates(&rows, "ccccccccccc");
        assert_eq!(candidates, vec!["aaaaaaaaaaa".to_string()]);
    }

    #[test]
    fn randomized_history_candidates_avoids_repeating_last_choice_when_possible() {
        let candidates = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        for _ in 0..20 {
            let randomized = randomized_history_candidates(&candidates, Some("a"));
            assert_ne!(randomized[0], "a");
        }
    }

    #[test]
    fn randomized_history_candidates_handles_single_candidate() {
        let candidates = vec!["a".to_string()];
        let randomized = randomized_history_candidates(&candidates, Some("a"));
        assert_eq!(randomized, vec!["a".to_string()]);
    }
}
