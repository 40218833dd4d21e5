//! SponsorBlock segment lookup and skip coordination. Grounded in full on
//! `original_source/app/services/sponsorblock.py`'s `SponsorBlockService`.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub category: String,
    pub uuid: String,
}

struct CacheEntry {
    expires_at: Instant,
    segments: Vec<Segment>,
}

/// A lounge-device seek sink. The wire protocol for sending the command to
/// the device is out of scope here; [`crate::device`] provides the real
/// implementation.
#[async_trait]
pub trait SeekSink: Send + Sync {
    async fn seek(&self, device_id: i64, seek_to: f64) -> Result<(), String>;
}

pub struct SponsorBlockService {
    api_base: String,
    cache: Mutex<HashMap<String, CacheEntry>>,
    skip_guard: Mutex<HashMap<String, Instant>>,
    http: reqwest::Client,
    segment_cache_ttl: Duration,
}

impl SponsorBlockService {
    pub fn new(api_base: String, segment_cache_ttl_seconds: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(6))
            .build()
            .expect("reqwest client with timeout always builds");
        Self {
            api_base,
            cache: Mutex::new(HashMap::new()),
            skip_guard: Mutex::new(HashMap::new()),
            http,
            segment_cache_ttl: Duration::from_secs(segment_cache_ttl_seconds.max(30)),
        }
    }

    pub async fn prefetch(&self, video_id: &str, categories: &[String], min_length: f64) {
        if video_id.is_empty() {
            return;
        }
        let _ = self.get_segments(video_id, categories, min_length).await;
    }

    /// Tries to skip the sponsor segment at `current_time`, de-bounced by a
    /// 2-second per-(device, video, segment-end) guard to avoid repeated
    /// seeks while a device is already mid-skip.
    pub async fn try_skip_current(
        &self,
        device_id: i64,
        video_id: &str,
        current_time: Option<f64>,
        categories: &[String],
        min_length: f64,
        sink: &dyn SeekSink,
    ) -> (bool, String, Option<Segment>) {
        let Some(current_time) = current_time else {
            return (false, String::new(), None);
        };
        let segments = self.get_segments(video_id, categories, min_length).await;
        if segments.is_empty() {
            return (false, String::new(), None);
        }
        let Some(selected) = select_segment(&segments, current_time) else {
            return (false, String::new(), None);
        };

        let guard_key = format!("{device_id}:{video_id}:{:.2}", selected.end);
        let now = Instant::now();
        {
            let mut guard = self.skip_guard.lock().await;
            if let Some(last) = guard.get(&guard_key) {
                if now.duration_since(*last) < Duration::from_secs_f64(2.0) {
                    return (false, String::new(), Some(selected));
                }
            }
            guard.insert(guard_key, now);
        }

        let seek_to = (selected.end + 0.08).max(current_time + 0.1);
        match sink.seek(device_id, seek_to).await {
            Ok(()) => (true, String::new(), Some(selected)),
            Err(err) => (false, err, Some(selected)),
        }
    }

    pub async fn get_segments(&self, video_id: &str, categories: &[String], min_length: f64) -> Vec<Segment> {
        let now = Instant::now();
        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(video_id) {
                if entry.expires_at > now {
                    return entry.segments.clone();
                }
            }
        }

        let fetched = self.fetch_segments(video_id, categories, min_length).await;
        let mut cache = self.cache.lock().await;
        cache.insert(
            video_id.to_string(),
            CacheEntry {
                expires_at: now + self.segment_cache_ttl,
                segments: fetched.clone(),
            },
        );
        fetched
    }

    async fn fetch_segments(&self, video_id: &str, categories: &[String], min_length: f64) -> Vec<Segment> {
        let prefix = hash_prefix(video_id);
        let url = format!("{}/skipSegments/{prefix}", self.api_base.trim_end_matches('/'));

        let mut query: Vec<(&str, &str)> = vec![("service", "YouTube"), ("actionType", "skip")];
        for cat in categories {
            query.push(("category", cat));
        }

        let response = match self
            .http
            .get(&url)
            .query(&query)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return Vec::new(),
        };

        let payload: serde_json::Value = match response.json().await {
            Ok(value) => value,
            Err(_) => return Vec::new(),
        };

        let Some(items) = payload.as_array() else {
            return Vec::new();
        };
        let Some(target) = items.iter().find(|item| item.get("videoID").and_then(|v| v.as_str()) == Some(video_id)) else {
            return Vec::new();
        };
        let Some(raw_segments) = target.get("segments").and_then(|v| v.as_array()) else {
            return Vec::new();
        };

        let mut parsed: Vec<Segment> = raw_segments
            .iter()
            .filter_map(|seg| {
                let pair = seg.get("segment")?.as_array()?;
                if pair.len() != 2 {
                    return None;
                }
                let start = pair[0].as_f64()?;
                let end = pair[1].as_f64()?;
                if end <= start || (end - start) < min_length {
                    return None;
                }
                Some(Segment {
                    start,
                    end,
                    category: seg.get("category").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    uuid: seg.get("UUID").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                })
            })
            .collect();

        if parsed.is_empty() {
            return Vec::new();
        }
        parsed.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap().then(a.end.partial_cmp(&b.end).unwrap()));
        merge_segments(parsed)
    }
}

fn hash_prefix(video_id: &str) -> String {
    let digest = Sha256::digest(video_id.as_bytes());
    hex_prefix(&digest, 4)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    hex.chars().take(chars).collect()
}

fn merge_segments(segments: Vec<Segment>) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::new();
    for seg in segments {
        match merged.last_mut() {
            Some(prev) if seg.start <= prev.end + 0.8 => {
                prev.end = prev.end.max(seg.end);
                if prev.category.is_empty() && !seg.category.is_empty() {
                    prev.category = seg.category;
                }
            }
            _ => merged.push(seg),
        }
    }
    merged
}

fn select_segment(segments: &[Segment], position: f64) -> Option<Segment> {
    segments
        .iter()
        .find(|seg| (seg.start - 0.1) <= position && position < (seg.end - 0.05))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, category: &str) -> Segment {
        Segment { start, end, category: category.to_string(), uuid: String::new() }
    }

    #[test]
    fn hash_prefix_is_four_hex_chars() {
        let prefix = hash_prefix("abcdefghijk");
        assert_eq!(prefix.len(), 4);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn merge_segments_joins_overlapping_ranges_within_gap() {
        let merged = merge_segments(vec![seg(0.0, 10.0, "sponsor"), seg(10.5, 15.0, "")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].end, 15.0);
        assert_eq!(merged[0].category, "sponsor");
    }

    #[test]
    fn merge_segments_keeps_distant_segments_separate() {
        let merged = merge_segments(vec![seg(0.0, 10.0, "sponsor"), seg(20.0, 25.0, "selfpromo")]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn select_segment_finds_containing_window() {
        let segments = vec![seg(10.0, 20.0, "sponsor")];
        assert!(select_segment(&segments, 15.0).is_some());
        assert!(select_segment(&segments, 9.0).is_none());
        assert!(select_segment(&segments, 19.96).is_none());
    }

    struct RecordingSink {
        seeks: Mutex<Vec<(i64, f64)>>,
    }

    #[async_trait]
    impl SeekSink for RecordingSink {
        async fn seek(&self, device_id: i64, seek_to: f64) -> Result<(), String> {
            self.seeks.lock().await.push((device_id, seek_to));
            Ok(())
        }
    }

    #[tokio::test]
    async fn try_skip_current_debounces_repeated_skips() {
        let service = SponsorBlockService::new("https://sponsor.example/api".to_string(), 900);
        // Pre-seed the cache so we don't hit the network.
        service.cache.lock().await.insert(
            "abcdefghijk".to_string(),
            CacheEntry { expires_at: Instant::now() + Duration::from_secs(60), segments: vec![seg(10.0, 20.0, "sponsor")] },
        );
        let sink = RecordingSink { seeks: Mutex::new(Vec::new()) };

        let (ok1, _, _) = service
            .try_skip_current(1, "abcdefghijk", Some(15.0), &["sponsor".to_string()], 1.0, &sink)
            .await;
        assert!(ok1);

        let (ok2, _, _) = service
            .try_skip_current(1, "abcdefghijk", Some(15.0), &["sponsor".to_string()], 1.0, &sink)
            .await;
        assert!(!ok2);

        assert_eq!(sink.seeks.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn try_skip_current_is_noop_without_current_time() {
        let service = SponsorBlockService::new("https://sponsor.example/api".to_string(), 900);
        let sink = RecordingSink { seeks: Mutex::new(Vec::new()) };
        let (ok, _, segment) = service
            .try_skip_current(1, "abcdefghijk", None, &["sponsor".to_string()], 1.0, &sink)
            .await;
        assert!(!ok);
        assert!(segment.is_none());
    }
}
