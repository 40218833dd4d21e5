//! Database models and queries.

pub mod init;
pub mod models;
pub mod queries;

pub use init::init_database;
pub use models::*;
pub use queries::*;

use chrono::Utc;

/// `utc_now_iso()` from `original_source/app/db.py`.
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339()
}
