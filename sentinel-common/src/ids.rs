//! Shape validation for YouTube-style video and channel identifiers.
//!
//! Grounded on `blocklists.py`'s `_VIDEO_ID_RE` / `_CHANNEL_ID_RE`.

use once_cell::sync::Lazy;
use regex::Regex;

static VIDEO_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

static CHANNEL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(UC[A-Za-z0-9_-]{22}|@[A-Za-z0-9_.-]+)$").unwrap());

pub fn is_valid_video_id(id: &str) -> bool {
    VIDEO_ID_RE.is_match(id)
}

pub fn is_valid_channel_id(id: &str) -> bool {
    CHANNEL_ID_RE.is_match(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_id_shape() {
        assert!(is_valid_video_id("abc12345678"));
        assert!(!is_valid_video_id("short"));
        assert!(!is_valid_video_id("has a space"));
    }

    #[test]
    fn channel_id_shape() {
        assert!(is_valid_channel_id(&format!("UC{}", "a".repeat(22))));
        assert!(is_valid_channel_id("@some_handle.1"));
        assert!(!is_valid_channel_id("UCshort"));
    }
}
