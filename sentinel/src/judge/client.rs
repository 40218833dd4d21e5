//! LLM classifier client. Grounded on `wkmp-ai/src/services/musicbrainz_client.rs`'s
//! reqwest idiom; the request/response payload shape follows
//! `original_source/app/services/judge.py::_call_gemini`/`_parse_output`, but
//! the exact wire format of the classifier call is out of scope, so this
//! crate exposes it behind a trait with one concrete implementation against
//! the public Gemini REST endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const USER_AGENT: &str = "sentinel/0.1.0";

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("network error: {0}")]
    Network(String),

    #[error("classifier returned an error: {0}")]
    Api(String),

    #[error("classifier output could not be parsed: {0}")]
    Output(String),

    #[error("classifier is unavailable without credentials")]
    MissingKey,
}

impl ClassifierError {
    /// Mirrors `JudgeService._is_fatal_auth_or_quota`: errors that mean the
    /// classifier cannot recover without operator intervention (bad/missing
    /// key, exhausted quota) versus transient output glitches worth retrying.
    pub fn is_fatal(&self) -> bool {
        match self {
            ClassifierError::MissingKey => true,
            ClassifierError::Output(_) => false,
            ClassifierError::Network(msg) | ClassifierError::Api(msg) => {
                let check = msg.to_lowercase();
                const NEEDLES: &[&str] = &[
                    "401",
                    "403",
                    "429",
                    "quota",
                    "api key",
                    "permission",
                    "invalid argument",
                    "unauthenticated",
                    "api_key_invalid",
                    "billing",
                ];
                NEEDLES.iter().any(|n| check.contains(n))
            }
        }
    }
}

/// The context a video is classified from. Fields mirror `judge.py::evaluate`'s
/// payload dict.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyRequest {
    pub video_id: String,
    pub video_url: String,
    pub title: String,
    pub channel_id: String,
    pub channel_title: String,
}

/// A raw, unvalidated classification. [`super::evaluate`] applies the strict
/// allow gate on top of this.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyOutput {
    pub verdict: String,
    pub reason: String,
    pub confidence: i32,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// `api_key`/`model` are the caller's *effective* values for this call
    /// (runtime-setting override or configured default, already resolved by
    /// [`super::Judge`]) — never baked into the client at construction time,
    /// so a runtime key change takes effect on the very next evaluation.
    async fn classify(
        &self,
        system_prompt: &str,
        request: &ClassifyRequest,
        api_key: &str,
        model: &str,
    ) -> Result<ClassifyOutput, ClassifierError>;
}

pub struct GeminiClient {
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(USER_AGENT)
            .build()
            .expect("reqwest client with timeout always builds");
        Self { client }
    }

    fn request_body(system_prompt: &str, request: &ClassifyRequest) -> Value {
        json!({
            "systemInstruction": {"parts": [{"text": system_prompt}]},
            "contents": [{
                "role": "user",
                "parts": [{"text": format!(
                    "Analyze this YouTube video for a 6-year-old safety policy.\n\
                     Video URL: {}\nVideo ID: {}\nTitle: {}\nChannel ID: {}\nChannel title: {}",
                    request.video_url, request.video_id, request.title, request.channel_id, request.channel_title,
                )}],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "required": ["verdict", "reason", "confidence"],
                    "properties": {
                        "verdict": {"type": "STRING", "enum": ["ALLOW", "BLOCK"]},
                        "reason": {"type": "STRING"},
                        "confidence": {"type": "INTEGER"},
                    },
                },
            },
        })
    }
}

#[async_trait]
impl Classifier for GeminiClient {
    async fn classify(
        &self,
        system_prompt: &str,
        request: &ClassifyRequest,
        api_key: &str,
        model: &str,
    ) -> Result<ClassifyOutput, ClassifierError> {
        if api_key.trim().is_empty() {
            return Err(ClassifierError::MissingKey);
        }

        let url = format!("{GEMINI_BASE_URL}/{model}:generateContent?key={api_key}");
        let body = Self::request_body(system_prompt, request);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ClassifierError::Network(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ClassifierError::Network(err.to_string()))?;

        if !status.is_success() {
            return Err(ClassifierError::Api(format!("status={} body={text}", status.as_u16())));
        }

        parse_classify_response(&text)
    }
}

fn parse_classify_response(body: &str) -> Result<ClassifyOutput, ClassifierError> {
    let envelope: Value = serde_json::from_str(body)
        .map_err(|err| ClassifierError::Output(format!("envelope_decode_error: {err}")))?;

    let text = envelope["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| ClassifierError::Output("json_not_found".to_string()))?
        .trim();

    if text.is_empty() {
        return Err(ClassifierError::Output("empty_output".to_string()));
    }

    let json_slice = if text.starts_with('{') {
        text
    } else {
        let start = text.find('{').ok_or_else(|| ClassifierError::Output("json_not_found".to_string()))?;
        let end = text.rfind('}').ok_or_else(|| ClassifierError::Output("json_not_found".to_string()))?;
        &text[start..=end]
    };

    let data: Value = serde_json::from_str(json_slice)
        .map_err(|err| ClassifierError::Output(format!("json_decode_error: {err}")))?;

    let verdict = data["verdict"].as_str().unwrap_or_default();
    if verdict != "ALLOW" && verdict != "BLOCK" {
        return Err(ClassifierError::Output("invalid_verdict".to_string()));
    }

    let reason = data["reason"].as_str().unwrap_or_default().trim();
    let reason = if reason.is_empty() {
        "No reason provided".to_string()
    } else {
        reason.to_string()
    };

    let confidence = data["confidence"]
        .as_i64()
        .ok_or_else(|| ClassifierError::Output("invalid_confidence".to_string()))?;
    let confidence = confidence.clamp(0, 100) as i32;

    Ok(ClassifyOutput {
        verdict: verdict.to_string(),
        reason,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_fatal_detects_auth_and_quota_errors() {
        assert!(ClassifierError::Api("status=401 body=unauthorized".to_string()).is_fatal());
        assert!(ClassifierError::Api("RESOURCE_EXHAUSTED: quota exceeded".to_string()).is_fatal());
        assert!(ClassifierError::MissingKey.is_fatal());
        assert!(!ClassifierError::Output("json_decode_error".to_string()).is_fatal());
    }

    #[test]
    fn parse_classify_response_extracts_embedded_json() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Here you go:\n{\"verdict\":\"BLOCK\",\"reason\":\"unsafe\",\"confidence\":97}\nthanks"}]},
            }],
        })
        .to_string();
        let parsed = parse_classify_response(&body).unwrap();
        assert_eq!(parsed.verdict, "BLOCK");
        assert_eq!(parsed.confidence, 97);
    }

    #[test]
    fn parse_classify_response_rejects_invalid_verdict() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"verdict\":\"MAYBE\",\"reason\":\"x\",\"confidence\":50}"}]},
            }],
        })
        .to_string();
        assert!(parse_classify_response(&body).is_err());
    }

    #[test]
    fn parse_classify_response_defaults_missing_reason() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"verdict\":\"ALLOW\",\"reason\":\"\",\"confidence\":80}"}]},
            }],
        })
        .to_string();
        let parsed = parse_classify_response(&body).unwrap();
        assert_eq!(parsed.reason, "No reason provided");
    }

    #[test]
    fn parse_classify_response_errors_on_empty_output() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "   "}]}}],
        })
        .to_string();
        assert!(matches!(
            parse_classify_response(&body),
            Err(ClassifierError::Output(_))
        ));
    }
}
