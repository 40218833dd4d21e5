//! Configuration loading. Grounded on `wkmp-common/src/config.rs`'s
//! priority-chain resolver (CLI > env > TOML > default) and
//! `original_source/app/config.py`'s env-var-driven `Settings`.

use crate::{Error, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "sentinel", about = "Household content-control supervisor")]
pub struct Args {
    /// Path to a TOML config file.
    #[arg(long, env = "SENTINEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory (blocklists/, sqlite db unless overridden).
    #[arg(long, env = "SENTINEL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Sqlite database path. Defaults to `<data_dir>/sentinel.db`.
    #[arg(long, env = "SENTINEL_DB_PATH")]
    pub db_path: Option<PathBuf>,

    #[arg(long, env = "SENTINEL_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "SENTINEL_PORT")]
    pub port: Option<u16>,
}

/// Resolved, immutable runtime configuration. Field defaults mirror
/// `original_source/app/config.py`'s `Settings` dataclass.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub schedule_timezone_default: String,
    pub webhook_timeout_seconds: u64,
    pub decision_cache_ttl_seconds: i64,
    pub strict_allow_min_confidence: i32,
    pub sponsorblock_api_base: String,
    pub sponsorblock_segment_cache_ttl_seconds: i64,
    pub remote_blocklists_cache_ttl_seconds: i64,
}

#[derive(Debug, Default, serde::Deserialize)]
struct TomlConfig {
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    gemini_model: Option<String>,
    schedule_timezone_default: Option<String>,
}

impl Config {
    /// CLI arg > env var (already folded into `Args` by clap's `env`
    /// attribute) > TOML file > compiled default, same order as
    /// `resolve_root_folder` in the teacher.
    pub fn load(args: &Args) -> Result<Self> {
        let toml_cfg = args
            .config
            .as_ref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|content| toml::from_str::<TomlConfig>(&content).ok())
            .unwrap_or_default();

        let data_dir = args
            .data_dir
            .clone()
            .or(toml_cfg.data_dir)
            .unwrap_or_else(default_data_dir);

        let db_path = args
            .db_path
            .clone()
            .or(toml_cfg.db_path)
            .unwrap_or_else(|| data_dir.join("sentinel.db"));

        Ok(Config {
            host: args
                .host
                .clone()
                .or(toml_cfg.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: args.port.or(toml_cfg.port).unwrap_or(8090),
            data_dir,
            db_path,
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            gemini_model: std::env::var("GEMINI_MODEL")
                .ok()
                .or(toml_cfg.gemini_model)
                .unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            schedule_timezone_default: std::env::var("SENTINEL_TIMEZONE_DEFAULT")
                .ok()
                .or(toml_cfg.schedule_timezone_default)
                .unwrap_or_else(host_timezone_name),
            webhook_timeout_seconds: env_u64("SENTINEL_WEBHOOK_TIMEOUT_SECONDS", 8),
            decision_cache_ttl_seconds: env_i64("SENTINEL_DECISION_CACHE_TTL_SECONDS", 2_592_000),
            strict_allow_min_confidence: env_i32("SENTINEL_STRICT_ALLOW_MIN_CONFIDENCE", 95),
            sponsorblock_api_base: std::env::var("SENTINEL_SPONSORBLOCK_API_BASE")
                .unwrap_or_else(|_| "https://sponsor.ajay.app/api".to_string()),
            sponsorblock_segment_cache_ttl_seconds: env_i64(
                "SENTINEL_SPONSORBLOCK_SEGMENT_CACHE_TTL_SECONDS",
                900,
            ),
            remote_blocklists_cache_ttl_seconds: env_i64(
                "SENTINEL_REMOTE_BLOCKLISTS_CACHE_TTL_SECONDS",
                900,
            ),
        })
    }

    /// Directory holding `custom-blacklist.txt` / `custom-whitelist.txt`
    /// (spec §6 "File layout"). Falls back to a sibling directory of the
    /// database file if `data_dir/blocklists` cannot be created.
    pub fn blocklists_dir(&self) -> PathBuf {
        let primary = self.data_dir.join("blocklists");
        if std::fs::create_dir_all(&primary).is_ok() {
            return primary;
        }
        self.db_path
            .parent()
            .map(|p| p.join("blocklists"))
            .unwrap_or(primary)
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sentinel"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/sentinel"))
}

/// Mirrors `config.py:get_host_timezone_name` — prefers the `TZ` env var,
/// falls back to UTC (the teacher's host has no notion of "localtime" zone
/// introspection available without a libc binding, which the corpus does
/// not use).
fn host_timezone_name() -> String {
    std::env::var("TZ").unwrap_or_else(|_| "UTC".to_string())
}

pub fn config_error(msg: impl Into<String>) -> Error {
    Error::Config(msg.into())
}
