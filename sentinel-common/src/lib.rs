//! Shared types, error handling, persistence schema, and config loading for
//! the Sentinel workspace. Mirrors `wkmp-common`'s role: a thin crate with no
//! runtime of its own, imported by the `sentinel` binary crate.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ids;
pub mod schedule;

pub use error::{Error, Result};
