//! TV pairing handshake. Grounded on
//! `original_source/app/services/lounge_manager.py::LoungeManager.pair_device`.

use async_trait::async_trait;
use thiserror::Error;

use super::control::AuthState;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct PairingError {
    pub code: &'static str,
    pub message: String,
}

impl PairingError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

pub struct PairResult {
    pub screen_id: String,
    pub screen_name: Option<String>,
    pub auth_state: AuthState,
}

/// Normalizes a pairing code to digits-only and checks its minimum length,
/// mirroring `pair_device`'s leading validation.
pub fn normalize_pairing_code(raw: &str) -> Result<String, PairingError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 6 {
        return Err(PairingError::new(
            "pair_code_invalid",
            "Pairing code must be at least 6 digits.",
        ));
    }
    Ok(digits)
}

/// Completes a pairing handshake against a TV lounge session. The wire
/// protocol backing this is out of scope; implementations wrap whatever
/// remote-control client the deployment runs.
#[async_trait]
pub trait Pairer: Send + Sync {
    async fn pair(&self, code: &str, device_ref: &str) -> Result<PairResult, PairingError>;
}

pub fn classify_pairing_failure(raw: &str) -> PairingError {
    let lower = raw.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        return PairingError::new("pair_timeout", "Pairing timed out. Re-enter the code on the TV and try again.");
    }
    if lower.contains("reject") {
        return PairingError::new("pair_rejected", "The TV rejected the pairing code.");
    }
    if lower.contains("screen") && lower.contains("id") {
        return PairingError::new("pair_missing_screen_id", "The TV did not return a screen id during pairing.");
    }
    if lower.contains("network") || lower.contains("host") || lower.contains("connection") {
        return PairingError::new("pair_network_error", "Network communication with the TV failed during pairing.");
    }
    PairingError::new("pair_failed", raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_pairing_code_strips_non_digits() {
        assert_eq!(normalize_pairing_code("12 34-56").unwrap(), "123456");
    }

    #[test]
    fn normalize_pairing_code_rejects_short_codes() {
        let err = normalize_pairing_code("123").unwrap_err();
        assert_eq!(err.code, "pair_code_invalid");
    }

    #[test]
    fn classify_pairing_failure_maps_known_causes() {
        assert_eq!(classify_pairing_failure("request timed out").code, "pair_timeout");
        assert_eq!(classify_pairing_failure("code rejected by TV").code, "pair_rejected");
        assert_eq!(classify_pairing_failure("missing screen id").code, "pair_missing_screen_id");
        assert_eq!(classify_pairing_failure("host unreachable").code, "pair_network_error");
        assert_eq!(classify_pairing_failure("weird failure").code, "pair_failed");
    }
}
