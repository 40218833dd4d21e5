//! Default [`ControlChannelFactory`]/[`Pairer`] wiring for builds with no
//! concrete remote-control backend configured. The wire protocol itself is
//! out of scope (see spec.md §1); this keeps the binary runnable and the
//! failure mode honest rather than inventing a fake client.

use async_trait::async_trait;

use super::control::{AuthState, ControlChannel, ControlChannelFactory, ControlError, ControlEvent};
use super::pairing::{PairResult, Pairer, PairingError};

const NO_BACKEND_MESSAGE: &str = "no remote-control backend is configured for this Sentinel build";

struct UnavailableChannel;

#[async_trait]
impl ControlChannel for UnavailableChannel {
    async fn load_auth_state(&mut self, _auth: &AuthState) {}

    async fn refresh_auth(&mut self) -> Result<(), ControlError> {
        Err(ControlError(format!("connect_failed: {NO_BACKEND_MESSAGE}")))
    }

    async fn connect(&mut self) -> Result<(), ControlError> {
        Err(ControlError(format!("connect_failed: {NO_BACKEND_MESSAGE}")))
    }

    async fn subscribe(&mut self, _events: tokio::sync::mpsc::Sender<ControlEvent>) -> Result<(), ControlError> {
        Err(ControlError(format!("connect_failed: {NO_BACKEND_MESSAGE}")))
    }

    async fn disconnect(&mut self) {}

    async fn seek_to(&mut self, _seconds: f64) -> Result<bool, ControlError> {
        Err(ControlError(format!("connect_failed: {NO_BACKEND_MESSAGE}")))
    }

    async fn next(&mut self) -> Result<bool, ControlError> {
        Err(ControlError(format!("connect_failed: {NO_BACKEND_MESSAGE}")))
    }

    async fn play_video(&mut self, _video_id: &str) -> Result<bool, ControlError> {
        Err(ControlError(format!("connect_failed: {NO_BACKEND_MESSAGE}")))
    }

    fn serialize_auth(&self) -> AuthState {
        AuthState { version: 0, screen_id: None, lounge_id_token: None, refresh_token: None, expiry: 0 }
    }

    fn screen_name(&self) -> Option<String> {
        None
    }
}

/// Always opens a channel that immediately reports `connect_failed`.
/// Device workers still run their normal reconnect-with-backoff loop and
/// surface a humanized "could not connect" status, rather than the binary
/// refusing to start.
pub struct UnavailableControlChannelFactory;

#[async_trait]
impl ControlChannelFactory for UnavailableControlChannelFactory {
    async fn open(&self, _device_id: i64) -> Box<dyn ControlChannel> {
        Box::new(UnavailableChannel)
    }
}

/// Always rejects pairing attempts with `pair_failed`, so the API layer can
/// surface a clear "pairing is not available in this build" error instead
/// of hanging or panicking.
pub struct UnavailablePairer;

#[async_trait]
impl Pairer for UnavailablePairer {
    async fn pair(&self, _code: &str, _device_ref: &str) -> Result<PairResult, PairingError> {
        Err(PairingError { code: "pair_failed", message: NO_BACKEND_MESSAGE.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_channel_reports_connect_failed() {
        let mut channel = UnavailableChannel;
        let err = channel.connect().await.unwrap_err();
        assert!(err.0.contains("connect_failed"));
    }

    #[tokio::test]
    async fn unavailable_pairer_reports_pair_failed() {
        let err = UnavailablePairer.pair("123456", "tv-1").await.unwrap_err();
        assert_eq!(err.code, "pair_failed");
    }
}
