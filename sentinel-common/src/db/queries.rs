//! Repository functions, one module per table, grounded on
//! `original_source/app/db.py`'s `Database` methods and `wkmp-common/src/db/models.rs`'s
//! `sqlx::query_as` idiom.

use crate::db::models::{DecisionRow, DeviceRow, JudgeCacheRow, RuleRow, ScheduleRow};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;

pub mod settings {
    use super::*;

    pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings(key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn all(pool: &SqlitePool) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    /// Retry-with-readback loop from spec §5 ("compare-after-write loop, up to
    /// 3 attempts, 50ms apart") for settings racing writers might contest.
    pub async fn set_bool_confirmed(pool: &SqlitePool, key: &str, value: bool) -> Result<()> {
        let target = if value { "true" } else { "false" };
        for _ in 0..3 {
            set(pool, key, target).await?;
            if get(pool, key).await?.as_deref() == Some(target) {
                return Ok(());
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        Err(crate::Error::Internal(format!(
            "failed to persist setting \"{key}\" as {target}"
        )))
    }
}

pub mod schedules {
    use super::*;

    pub async fn list(pool: &SqlitePool) -> Result<Vec<ScheduleRow>> {
        Ok(sqlx::query_as(
            "SELECT id, name, enabled, start, end, timezone, mode, created_at \
             FROM schedules ORDER BY id ASC",
        )
        .fetch_all(pool)
        .await?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add(
        pool: &SqlitePool,
        name: &str,
        enabled: bool,
        start: &str,
        end: &str,
        timezone: &str,
        mode: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO schedules(name, enabled, start, end, timezone, mode) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(name.trim())
        .bind(enabled)
        .bind(start)
        .bind(end)
        .bind(timezone)
        .bind(mode)
        .execute(pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update(
        pool: &SqlitePool,
        id: i64,
        name: &str,
        enabled: bool,
        start: &str,
        end: &str,
        timezone: &str,
        mode: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE schedules SET name=?, enabled=?, start=?, end=?, timezone=?, mode=? WHERE id=?",
        )
        .bind(name.trim())
        .bind(enabled)
        .bind(start)
        .bind(end)
        .bind(timezone)
        .bind(mode)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Spec §3: "deletable only while >= 1 remains."
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schedules")
            .fetch_one(pool)
            .await?;
        if count.0 <= 1 {
            return Ok(false);
        }
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub mod devices {
    use super::*;

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        pool: &SqlitePool,
        display_name: &str,
        screen_id: &str,
        lounge_token: &str,
        auth_state_json: &str,
        status: &str,
        last_error: &str,
    ) -> Result<i64> {
        sqlx::query(
            "INSERT INTO devices(display_name, screen_id, lounge_token, auth_state_json, status, last_seen, last_error) \
             VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP, ?) \
             ON CONFLICT(screen_id) DO UPDATE SET \
                display_name = excluded.display_name, \
                lounge_token = excluded.lounge_token, \
                auth_state_json = excluded.auth_state_json, \
                status = excluded.status, \
                last_seen = excluded.last_seen, \
                last_error = excluded.last_error",
        )
        .bind(display_name)
        .bind(screen_id)
        .bind(lounge_token)
        .bind(auth_state_json)
        .bind(status)
        .bind(last_error)
        .execute(pool)
        .await?;

        let row: (i64,) = sqlx::query_as("SELECT id FROM devices WHERE screen_id = ?")
            .bind(screen_id)
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }

    pub async fn list(pool: &SqlitePool) -> Result<Vec<DeviceRow>> {
        Ok(sqlx::query_as(
            "SELECT id, display_name, screen_id, auth_state_json, lounge_token, status, last_error, last_seen \
             FROM devices ORDER BY id ASC",
        )
        .fetch_all(pool)
        .await?)
    }

    pub async fn get(pool: &SqlitePool, device_id: i64) -> Result<Option<DeviceRow>> {
        Ok(sqlx::query_as(
            "SELECT id, display_name, screen_id, auth_state_json, lounge_token, status, last_error, last_seen \
             FROM devices WHERE id = ?",
        )
        .bind(device_id)
        .fetch_optional(pool)
        .await?)
    }

    pub async fn update_status(
        pool: &SqlitePool,
        device_id: i64,
        status: &str,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE devices SET status = ?, last_error = ?, last_seen = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status)
        .bind(error)
        .bind(device_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Device counts for the status snapshot (`counts()` in the teacher source).
    pub async fn counts(pool: &SqlitePool) -> Result<(i64, i64)> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM devices")
            .fetch_one(pool)
            .await?;
        let connected: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM devices WHERE status IN ('connected', 'linked')")
                .fetch_one(pool)
                .await?;
        Ok((total.0, connected.0))
    }
}

pub mod rules {
    use super::*;

    pub async fn add(
        pool: &SqlitePool,
        rule_type: &str,
        scope: &str,
        value: &str,
        label: &str,
        url: &str,
        source_list: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO rules(rule_type, scope, value, label, url, source_list) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(rule_type)
        .bind(scope)
        .bind(value)
        .bind(label)
        .bind(url)
        .bind(source_list)
        .execute(pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn list(pool: &SqlitePool, rule_type: Option<&str>, limit: i64) -> Result<Vec<RuleRow>> {
        match rule_type {
            Some(t) => Ok(sqlx::query_as(
                "SELECT id, rule_type, scope, value, label, url, source_list, created_at \
                 FROM rules WHERE rule_type = ? ORDER BY id DESC LIMIT ?",
            )
            .bind(t)
            .bind(limit)
            .fetch_all(pool)
            .await?),
            None => Ok(sqlx::query_as(
                "SELECT id, rule_type, scope, value, label, url, source_list, created_at \
                 FROM rules ORDER BY id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(pool)
            .await?),
        }
    }

    /// A rule scope/value match, preferring `preferred_rule_type` when given.
    /// Video scope is checked before channel scope (`find_rule_match` order).
    pub struct RuleMatch {
        pub rule_type: String,
        pub scope: String,
        pub value: String,
        pub source_list: String,
    }

    pub async fn find_match(
        pool: &SqlitePool,
        video_id: &str,
        channel_id: &str,
        preferred_rule_type: Option<&str>,
    ) -> Result<Option<RuleMatch>> {
        if !video_id.is_empty() {
            if let Some(m) = find_scoped(pool, "video", video_id, preferred_rule_type).await? {
                return Ok(Some(m));
            }
        }
        if !channel_id.is_empty() {
            if let Some(m) = find_scoped(pool, "channel", channel_id, preferred_rule_type).await? {
                return Ok(Some(m));
            }
        }
        Ok(None)
    }

    async fn find_scoped(
        pool: &SqlitePool,
        scope: &str,
        value: &str,
        preferred_rule_type: Option<&str>,
    ) -> Result<Option<RuleMatch>> {
        let row: Option<(String, String, String, String)> = match preferred_rule_type {
            Some(rt) => {
                sqlx::query_as(
                    "SELECT rule_type, scope, value, source_list FROM rules \
                     WHERE scope = ? AND value = ? AND rule_type = ? ORDER BY id DESC LIMIT 1",
                )
                .bind(scope)
                .bind(value)
                .bind(rt)
                .fetch_optional(pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT rule_type, scope, value, source_list FROM rules \
                     WHERE scope = ? AND value = ? ORDER BY id DESC LIMIT 1",
                )
                .bind(scope)
                .bind(value)
                .fetch_optional(pool)
                .await?
            }
        };
        Ok(row.map(|(rule_type, scope, value, source_list)| RuleMatch {
            rule_type,
            scope,
            value,
            source_list,
        }))
    }
}

pub mod decisions {
    use super::*;

    #[allow(clippy::too_many_arguments)]
    pub async fn add(
        pool: &SqlitePool,
        device_id: i64,
        video_id: &str,
        channel_id: &str,
        title: &str,
        thumbnail: &str,
        verdict: &str,
        reason: &str,
        confidence: i32,
        source: &str,
        action_taken: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO decisions(device_id, video_id, channel_id, title, thumbnail, verdict, reason, confidence, source, action_taken) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(video_id)
        .bind(channel_id)
        .bind(title)
        .bind(thumbnail)
        .bind(verdict)
        .bind(reason)
        .bind(confidence)
        .bind(source)
        .bind(action_taken)
        .execute(pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<DecisionRow>> {
        Ok(sqlx::query_as(
            "SELECT id, device_id, video_id, channel_id, title, thumbnail, verdict, reason, confidence, source, action_taken, created_at \
             FROM decisions ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?)
    }

    pub struct Page {
        pub rows: Vec<DecisionRow>,
        pub page: i64,
        pub page_size: i64,
        pub total_count: i64,
        pub page_count: i64,
    }

    pub async fn paged(pool: &SqlitePool, page: i64, page_size: i64, max_total: i64) -> Result<Page> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let max_total = max_total.max(page_size);
        let offset = (page - 1) * page_size;

        let total_row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM decisions")
            .fetch_one(pool)
            .await?;
        let total_count = total_row.0.min(max_total);

        let rows: Vec<DecisionRow> = sqlx::query_as(
            "SELECT id, device_id, video_id, channel_id, title, thumbnail, verdict, reason, confidence, source, action_taken, created_at \
             FROM (SELECT * FROM decisions ORDER BY id DESC LIMIT ?) ORDER BY id DESC LIMIT ? OFFSET ?",
        )
        .bind(max_total)
        .bind(page_size)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let page_count = ((total_count + page_size - 1) / page_size).max(1);
        let page = page.min(page_count);
        Ok(Page {
            rows,
            page,
            page_size,
            total_count,
            page_count,
        })
    }

    /// Spec §3: "purgeable in bulk." Returns the number of rows removed.
    pub async fn purge_all(pool: &SqlitePool) -> Result<i64> {
        let before: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM decisions")
            .fetch_one(pool)
            .await?;
        sqlx::query("DELETE FROM decisions").execute(pool).await?;
        Ok(before.0)
    }

    pub async fn count_bytes(pool: &SqlitePool) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    /// `(total, allow, block)` triple for decisions recorded since `since`.
    /// Backs the MQTT snapshot's today/7d counters (`home_dashboard_stats`
    /// in the teacher source, narrowed to the totals the snapshot needs).
    pub async fn counts_since(pool: &SqlitePool, since: DateTime<Utc>) -> Result<(i64, i64, i64)> {
        let row: (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                COALESCE(SUM(CASE WHEN verdict = 'ALLOW' THEN 1 ELSE 0 END), 0), \
                COALESCE(SUM(CASE WHEN verdict = 'BLOCK' THEN 1 ELSE 0 END), 0) \
             FROM decisions WHERE created_at >= ?",
        )
        .bind(since)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// `(total, allow, block)` triple across all recorded decisions.
    pub async fn counts_total(pool: &SqlitePool) -> Result<(i64, i64, i64)> {
        let row: (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                COALESCE(SUM(CASE WHEN verdict = 'ALLOW' THEN 1 ELSE 0 END), 0), \
                COALESCE(SUM(CASE WHEN verdict = 'BLOCK' THEN 1 ELSE 0 END), 0) \
             FROM decisions",
        )
        .fetch_one(pool)
        .await?;
        Ok(row)
    }
}

pub mod judge_cache {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CachedDecision {
        pub verdict: String,
        pub reason: String,
        pub confidence: i32,
        pub source: String,
    }

    pub async fn set(
        pool: &SqlitePool,
        cache_key: &str,
        decision: &CachedDecision,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO judge_cache(cache_key, verdict, reason, confidence, source, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(cache_key) DO UPDATE SET \
                verdict = excluded.verdict, reason = excluded.reason, \
                confidence = excluded.confidence, source = excluded.source, \
                expires_at = excluded.expires_at",
        )
        .bind(cache_key)
        .bind(&decision.verdict)
        .bind(&decision.reason)
        .bind(decision.confidence)
        .bind(&decision.source)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Returns `None` both on a genuine miss and on a malformed/expired
    /// entry (spec §9: "Validate on read; treat malformed entries as miss.").
    pub async fn get(pool: &SqlitePool, cache_key: &str) -> Result<Option<JudgeCacheRow>> {
        let row: Option<JudgeCacheRow> = sqlx::query_as(
            "SELECT cache_key, verdict, reason, confidence, source, expires_at FROM judge_cache WHERE cache_key = ?",
        )
        .bind(cache_key)
        .fetch_optional(pool)
        .await?;
        Ok(row.filter(|r| r.expires_at > Utc::now() && matches!(r.verdict.as_str(), "ALLOW" | "BLOCK")))
    }

    pub async fn purge_all(pool: &SqlitePool) -> Result<i64> {
        let before: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM judge_cache")
            .fetch_one(pool)
            .await?;
        sqlx::query("DELETE FROM judge_cache").execute(pool).await?;
        Ok(before.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_database;
    use std::path::Path;

    async fn setup_test_db() -> SqlitePool {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::mem::forget(tmp);
        init_database(Path::new(&path)).await.unwrap()
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let pool = setup_test_db().await;
        assert_eq!(
            settings::get(&pool, "active").await.unwrap(),
            Some("true".to_string())
        );
        settings::set(&pool, "active", "false").await.unwrap();
        assert_eq!(
            settings::get(&pool, "active").await.unwrap(),
            Some("false".to_string())
        );
        assert_eq!(settings::get(&pool, "missing_key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn settings_set_bool_confirmed_persists() {
        let pool = setup_test_db().await;
        settings::set_bool_confirmed(&pool, "sponsorblock_active", true)
            .await
            .unwrap();
        assert_eq!(
            settings::get(&pool, "sponsorblock_active").await.unwrap(),
            Some("true".to_string())
        );
    }

    #[tokio::test]
    async fn schedules_seeded_with_default_row() {
        let pool = setup_test_db().await;
        let rows = schedules::list(&pool).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "default");
    }

    #[tokio::test]
    async fn schedules_cannot_delete_last_row() {
        let pool = setup_test_db().await;
        let rows = schedules::list(&pool).await.unwrap();
        let deleted = schedules::delete(&pool, rows[0].id).await.unwrap();
        assert!(!deleted);
    }

    #[tokio::test]
    async fn schedules_add_then_delete() {
        let pool = setup_test_db().await;
        let id = schedules::add(&pool, "evening", true, "18:00", "22:00", "UTC", "whitelist")
            .await
            .unwrap();
        assert_eq!(schedules::list(&pool).await.unwrap().len(), 2);
        assert!(schedules::delete(&pool, id).await.unwrap());
        assert_eq!(schedules::list(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn devices_upsert_is_idempotent_on_screen_id() {
        let pool = setup_test_db().await;
        let id1 = devices::upsert(&pool, "Living Room TV", "screen-1", "", "{}", "connecting", "")
            .await
            .unwrap();
        let id2 = devices::upsert(&pool, "Living Room TV", "screen-1", "tok", "{}", "connected", "")
            .await
            .unwrap();
        assert_eq!(id1, id2);
        let row = devices::get(&pool, id1).await.unwrap().unwrap();
        assert_eq!(row.status, "connected");
        assert_eq!(row.lounge_token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn devices_counts_only_counts_connected_or_linked() {
        let pool = setup_test_db().await;
        devices::upsert(&pool, "A", "s1", "", "{}", "connected", "").await.unwrap();
        devices::upsert(&pool, "B", "s2", "", "{}", "offline", "").await.unwrap();
        devices::upsert(&pool, "C", "s3", "", "{}", "linked", "").await.unwrap();
        let (total, connected) = devices::counts(&pool).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(connected, 2);
    }

    #[tokio::test]
    async fn rules_find_match_prefers_video_scope_over_channel() {
        let pool = setup_test_db().await;
        rules::add(&pool, "blacklist", "channel", "UCabc", "bad channel", "", "manual")
            .await
            .unwrap();
        rules::add(&pool, "whitelist", "video", "abcdefghijk", "good video", "", "manual")
            .await
            .unwrap();
        let m = rules::find_match(&pool, "abcdefghijk", "UCabc", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.rule_type, "whitelist");
        assert_eq!(m.scope, "video");
    }

    #[tokio::test]
    async fn rules_find_match_falls_back_to_channel() {
        let pool = setup_test_db().await;
        rules::add(&pool, "blacklist", "channel", "UCabc", "bad channel", "", "manual")
            .await
            .unwrap();
        let m = rules::find_match(&pool, "zzzzzzzzzzz", "UCabc", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.scope, "channel");
    }

    #[tokio::test]
    async fn rules_find_match_none_when_no_rows() {
        let pool = setup_test_db().await;
        let m = rules::find_match(&pool, "abcdefghijk", "UCabc", None).await.unwrap();
        assert!(m.is_none());
    }

    #[tokio::test]
    async fn decisions_add_and_recent_order() {
        let pool = setup_test_db().await;
        let device_id = devices::upsert(&pool, "TV", "s1", "", "{}", "connected", "")
            .await
            .unwrap();
        decisions::add(
            &pool, device_id, "abcdefghijk", "UCabc", "title", "thumb", "BLOCK", "blacklist", 100,
            "cache", "skip",
        )
        .await
        .unwrap();
        decisions::add(
            &pool, device_id, "lmnopqrstuv", "UCabc", "title2", "thumb", "ALLOW", "whitelist", 100,
            "cache", "none",
        )
        .await
        .unwrap();
        let recent = decisions::recent(&pool, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].video_id, "lmnopqrstuv");
    }

    #[tokio::test]
    async fn decisions_paged_respects_page_size() {
        let pool = setup_test_db().await;
        let device_id = devices::upsert(&pool, "TV", "s1", "", "{}", "connected", "")
            .await
            .unwrap();
        for i in 0..5 {
            decisions::add(
                &pool,
                device_id,
                &format!("vid000000{i}"),
                "",
                "",
                "",
                "ALLOW",
                "cache",
                100,
                "cache",
                "none",
            )
            .await
            .unwrap();
        }
        let page = decisions::paged(&pool, 1, 2, 1000).await.unwrap();
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.total_count, 5);
        assert_eq!(page.page_count, 3);
    }

    #[tokio::test]
    async fn decisions_purge_all_clears_table() {
        let pool = setup_test_db().await;
        let device_id = devices::upsert(&pool, "TV", "s1", "", "{}", "connected", "")
            .await
            .unwrap();
        decisions::add(
            &pool, device_id, "abcdefghijk", "", "", "", "ALLOW", "cache", 100, "cache", "none",
        )
        .await
        .unwrap();
        let purged = decisions::purge_all(&pool).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(decisions::recent(&pool, 10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn judge_cache_set_then_get() {
        let pool = setup_test_db().await;
        let decision = judge_cache::CachedDecision {
            verdict: "BLOCK".to_string(),
            reason: "clickbait".to_string(),
            confidence: 95,
            source: "llm".to_string(),
        };
        judge_cache::set(&pool, "abcdefghijk", &decision, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        let row = judge_cache::get(&pool, "abcdefghijk").await.unwrap().unwrap();
        assert_eq!(row.verdict, "BLOCK");
        assert_eq!(row.confidence, 95);
    }

    #[tokio::test]
    async fn judge_cache_get_treats_expired_as_miss() {
        let pool = setup_test_db().await;
        let decision = judge_cache::CachedDecision {
            verdict: "ALLOW".to_string(),
            reason: "fine".to_string(),
            confidence: 80,
            source: "llm".to_string(),
        };
        judge_cache::set(&pool, "abcdefghijk", &decision, Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(judge_cache::get(&pool, "abcdefghijk").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn decisions_counts_since_and_total_split_allow_block() {
        let pool = setup_test_db().await;
        let device_id = devices::upsert(&pool, "TV", "s1", "", "{}", "connected", "").await.unwrap();
        decisions::add(&pool, device_id, "abcdefghijk", "", "", "", "ALLOW", "cache", 100, "cache", "none").await.unwrap();
        decisions::add(&pool, device_id, "lmnopqrstuv", "", "", "", "BLOCK", "cache", 100, "cache", "skip").await.unwrap();
        let (total, allow, block) = decisions::counts_total(&pool).await.unwrap();
        assert_eq!((total, allow, block), (2, 1, 1));
        let (total_since, _, _) = decisions::counts_since(&pool, Utc::now() - chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(total_since, 2);
        let (total_future, _, _) = decisions::counts_since(&pool, Utc::now() + chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(total_future, 0);
    }

    #[tokio::test]
    async fn sponsor_actions_add_and_recent() {
        let pool = setup_test_db().await;
        let device_id = devices::upsert(&pool, "TV", "s1", "", "{}", "connected", "")
            .await
            .unwrap();
        sponsor_actions::add(
            &pool, device_id, "abcdefghijk", "sponsor", 10.0, 25.0, "skipped", "ok", "",
        )
        .await
        .unwrap();
        let recent = sponsor_actions::recent(&pool, 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].category.as_deref(), Some("sponsor"));
    }
}

pub mod sponsor_actions {
    use super::*;

    #[allow(clippy::too_many_arguments)]
    pub async fn add(
        pool: &SqlitePool,
        device_id: i64,
        video_id: &str,
        category: &str,
        start: f64,
        end: f64,
        action_taken: &str,
        status: &str,
        error: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO sponsor_actions(device_id, video_id, category, start, end, action_taken, status, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(video_id)
        .bind(category)
        .bind(start)
        .bind(end)
        .bind(action_taken)
        .bind(status)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<crate::db::models::SponsorActionRow>> {
        Ok(sqlx::query_as(
            "SELECT id, device_id, video_id, category, start, end, action_taken, status, error, created_at \
             FROM sponsor_actions ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?)
    }
}
