//! Row types for every table created by `db::init`. Grounded on
//! `original_source/app/db.py`'s row-dict shapes and `wkmp-common/src/db/models.rs`'s
//! `FromRow` derive idiom.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduleRow {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub start: String,
    pub end: String,
    pub timezone: String,
    pub mode: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeviceRow {
    pub id: i64,
    pub display_name: String,
    pub screen_id: String,
    pub auth_state_json: Option<String>,
    pub lounge_token: Option<String>,
    pub status: String,
    pub last_error: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RuleRow {
    pub id: i64,
    pub rule_type: String,
    pub scope: String,
    pub value: String,
    pub label: Option<String>,
    pub url: Option<String>,
    pub source_list: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DecisionRow {
    pub id: i64,
    pub device_id: i64,
    pub video_id: String,
    pub channel_id: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub verdict: String,
    pub reason: String,
    pub confidence: i64,
    pub source: String,
    pub action_taken: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JudgeCacheRow {
    pub cache_key: String,
    pub verdict: String,
    pub reason: String,
    pub confidence: i64,
    pub source: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SponsorActionRow {
    pub id: i64,
    pub device_id: i64,
    pub video_id: String,
    pub category: Option<String>,
    pub start: f64,
    pub end: f64,
    pub action_taken: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
