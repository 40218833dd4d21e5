//! Schema creation. Grounded on `wkmp-common/src/db/init.rs`: one
//! `create_*_table` function per table, defaults seeded with
//! `INSERT OR IGNORE`.

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePool::connect(&db_url).await?;

    create_settings_table(&pool).await?;
    create_schedules_table(&pool).await?;
    create_devices_table(&pool).await?;
    create_rules_table(&pool).await?;
    create_decisions_table(&pool).await?;
    create_judge_cache_table(&pool).await?;
    create_sponsor_actions_table(&pool).await?;

    Ok(pool)
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Defaults from spec §6 "Persisted settings keys".
    let defaults: &[(&str, &str)] = &[
        ("active", "true"),
        ("sponsorblock_active", "false"),
        ("schedule_mode", "blocklist"),
        ("policy_flags_json", "{}"),
        ("allow_policy_flags_json", "{}"),
        ("custom_prompt", ""),
        ("gemini_enabled", "true"),
        ("gemini_api_key_runtime", ""),
        ("judge_ok", "true"),
        ("last_error", ""),
        ("last_failure_alert_at", ""),
        ("blocklist_source_urls", ""),
        ("allowlist_source_urls", ""),
        (
            "sponsorblock_categories_json",
            r#"["sponsor","selfpromo","interaction","intro","outro","music_offtopic"]"#,
        ),
        ("sponsorblock_min_length_seconds", "1.0"),
        ("sponsorblock_release_until", ""),
        // Legacy single-window fallback (spec §4.8, §9 Open Question #2).
        ("schedule_enabled", "false"),
        ("schedule_start", "07:00"),
        ("schedule_end", "19:00"),
        ("timezone", "UTC"),
        ("sponsorblock_schedule_enabled", "false"),
        ("sponsorblock_schedule_start", "00:00"),
        ("sponsorblock_schedule_end", "23:59"),
        ("webhook_url", ""),
    ];
    for (key, value) in defaults {
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
    }

    Ok(())
}

async fn create_schedules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            start TEXT NOT NULL,
            end TEXT NOT NULL,
            timezone TEXT NOT NULL,
            mode TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Migration guarantee: at least one schedule row always exists.
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schedules")
        .fetch_one(pool)
        .await?;
    if count.0 == 0 {
        sqlx::query(
            "INSERT INTO schedules (name, enabled, start, end, timezone, mode) \
             VALUES ('default', 1, '07:00', '19:00', 'UTC', 'blocklist')",
        )
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn create_devices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            display_name TEXT NOT NULL,
            screen_id TEXT NOT NULL UNIQUE,
            auth_state_json TEXT,
            lounge_token TEXT,
            status TEXT NOT NULL DEFAULT 'offline',
            last_error TEXT,
            last_seen TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_rules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_type TEXT NOT NULL,
            scope TEXT NOT NULL,
            value TEXT NOT NULL,
            label TEXT,
            url TEXT,
            source_list TEXT NOT NULL DEFAULT 'manual',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(scope, value, source_list)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_decisions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS decisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id INTEGER NOT NULL,
            video_id TEXT NOT NULL,
            channel_id TEXT,
            title TEXT,
            thumbnail TEXT,
            verdict TEXT NOT NULL,
            reason TEXT NOT NULL,
            confidence INTEGER NOT NULL,
            source TEXT NOT NULL,
            action_taken TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_created_at ON decisions(created_at)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_judge_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS judge_cache (
            cache_key TEXT PRIMARY KEY,
            verdict TEXT NOT NULL,
            reason TEXT NOT NULL,
            confidence INTEGER NOT NULL,
            source TEXT NOT NULL,
            expires_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_sponsor_actions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sponsor_actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id INTEGER NOT NULL,
            video_id TEXT NOT NULL,
            category TEXT,
            start REAL NOT NULL,
            end REAL NOT NULL,
            action_taken TEXT NOT NULL,
            status TEXT NOT NULL,
            error TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
