//! Decision cache backed by the `judge_cache` table. Grounded on
//! `judge.py::evaluate`'s `cache_get`/`cache_set` calls and
//! `JudgeService._apply_strict_allow_gate`'s re-gating of cached decisions.

use chrono::{Duration, Utc};
use sentinel_common::db::queries::judge_cache::{self, CachedDecision};
use sentinel_common::Result;
use sqlx::SqlitePool;

/// Builds the `"{mode}:{video_id}"` cache key `judge.py::evaluate` uses.
pub fn cache_key(mode: sentinel_common::schedule::Mode, video_id: &str) -> String {
    format!("{}:{video_id}", mode.as_str())
}

pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<CachedDecision>> {
    Ok(judge_cache::get(pool, key).await?.map(|row| CachedDecision {
        verdict: row.verdict,
        reason: row.reason,
        confidence: row.confidence as i32,
        source: row.source,
    }))
}

pub async fn set(
    pool: &SqlitePool,
    key: &str,
    decision: &CachedDecision,
    ttl_seconds: i64,
) -> Result<()> {
    let expires_at = Utc::now() + Duration::seconds(ttl_seconds.max(0));
    judge_cache::set(pool, key, decision, expires_at).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_common::db::init::init_database;
    use std::path::Path;

    async fn setup_pool() -> SqlitePool {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::mem::forget(tmp);
        init_database(Path::new(&path)).await.unwrap()
    }

    #[test]
    fn cache_key_prefixes_mode() {
        assert_eq!(
            cache_key(sentinel_common::schedule::Mode::Blocklist, "abcdefghijk"),
            "blocklist:abcdefghijk"
        );
        assert_eq!(
            cache_key(sentinel_common::schedule::Mode::Whitelist, "abcdefghijk"),
            "whitelist:abcdefghijk"
        );
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let pool = setup_pool().await;
        let decision = CachedDecision {
            verdict: "ALLOW".to_string(),
            reason: "fine".to_string(),
            confidence: 88,
            source: "gemini".to_string(),
        };
        set(&pool, "blocklist:abcdefghijk", &decision, 3600).await.unwrap();
        let got = get(&pool, "blocklist:abcdefghijk").await.unwrap().unwrap();
        assert_eq!(got.verdict, "ALLOW");
        assert_eq!(got.confidence, 88);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss() {
        let pool = setup_pool().await;
        let decision = CachedDecision {
            verdict: "BLOCK".to_string(),
            reason: "unsafe".to_string(),
            confidence: 100,
            source: "gemini".to_string(),
        };
        set(&pool, "blocklist:abcdefghijk", &decision, -1).await.unwrap();
        assert!(get(&pool, "blocklist:abcdefghijk").await.unwrap().is_none());
    }
}
