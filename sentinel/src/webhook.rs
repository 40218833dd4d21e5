//! Outbound webhook delivery. Grounded on
//! `original_source/app/services/webhook.py`'s `WebhookClient`.

use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Posts JSON payloads to a configurable URL, used for state-change and
/// failure notifications. Mirrors `WebhookClient.post_json`: never raises,
/// reports success and a truncated response/error body instead.
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new(timeout_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .expect("reqwest client with timeout always builds");
        Self { client }
    }

    /// Posts `payload` to `url`. Returns `(ok, detail)` where `detail` is the
    /// response body (success) or an error description (failure), truncated
    /// to 300 bytes like the original.
    pub async fn post_json(&self, url: &str, payload: &Value) -> (bool, String) {
        if url.is_empty() {
            return (false, "webhook_url_empty".to_string());
        }

        match self.client.post(url).json(payload).send().await {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                let truncated = truncate(&body, 300);
                if status.is_success() {
                    (true, truncated)
                } else {
                    (false, format!("status={} body={truncated}", status.as_u16()))
                }
            }
            Err(err) => {
                warn!(%url, error = %err, "webhook post failed");
                (false, err.to_string())
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn post_json_rejects_empty_url() {
        let client = WebhookClient::new(8);
        let (ok, detail) = client.post_json("", &json!({"event": "test"})).await;
        assert!(!ok);
        assert_eq!(detail, "webhook_url_empty");
    }

    #[tokio::test]
    async fn post_json_reports_success_against_wiremock() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/hook"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = WebhookClient::new(8);
        let url = format!("{}/hook", server.uri());
        let (ok, detail) = client.post_json(&url, &json!({"event": "test"})).await;
        assert!(ok);
        assert_eq!(detail, "ok");
    }

    #[tokio::test]
    async fn post_json_reports_non_2xx_status() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/hook"))
            .respond_with(wiremock::ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = WebhookClient::new(8);
        let url = format!("{}/hook", server.uri());
        let (ok, detail) = client.post_json(&url, &json!({"event": "test"})).await;
        assert!(!ok);
        assert!(detail.contains("status=500"));
    }
}
