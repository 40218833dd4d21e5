//! The content judge: precedence chain, policy keyword matching, the
//! strict allow gate, and classifier-failure bookkeeping. Grounded in full
//! on `original_source/app/services/judge.py`'s `JudgeService`.

pub mod cache;
pub mod client;

use crate::lists::{ListStore, Scope};
use crate::policy::{ALLOW_POLICY_PRESETS, POLICY_PRESETS};
use crate::webhook::WebhookClient;
use client::{Classifier, ClassifierError, ClassifyRequest};
use sentinel_common::db::queries::{judge_cache::CachedDecision, rules};
use sentinel_common::schedule::Mode;
use sentinel_common::Result;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Policy toggles default to on. From `judge.py::_POLICY_DEFAULTS`.
fn default_policy_flags() -> HashMap<&'static str, bool> {
    HashMap::from([
        ("block_cocomelon", true),
        ("block_nursery_factory", true),
        ("block_kids_clickbait_animals", true),
    ])
}

/// From `judge.py::_ALLOW_POLICY_DEFAULTS`.
fn default_allow_flags() -> HashMap<&'static str, bool> {
    HashMap::from([
        ("allow_90s_cartoons", true),
        ("allow_00s_cartoons", true),
        ("allow_disney_family", true),
        ("allow_educational", true),
    ])
}

/// From `judge.py::_POLICY_KEYWORDS`.
fn policy_keywords(key: &str) -> &'static [&'static str] {
    match key {
        "block_cocomelon" => &["cocomelon", "coco melon", "jj and friends", "cocomelon nederlands", "cocomelon songs for kids"],
        "block_nursery_factory" => &["nursery rhymes", "kids songs", "for toddlers", "baby songs", "baby anna", "zoki nursery", "bebe zoki", "wheels on the bus"],
        "block_kids_clickbait_animals" => &["monkey baby", "baby monkey", "bon bon", "animal ht", "toilet", "poop", "potty", "ducklings in the swimming pool"],
        "block_skibidi" => &["skibidi", "skibidi toilet"],
        "block_huggy_wuggy" => &["huggy wuggy", "poppy playtime"],
        "block_rainbow_friends" => &["rainbow friends"],
        "block_siren_momo" => &["siren head", "momo"],
        "block_prank" => &["prank"],
        "block_challenge" => &["challenge", "24 hour challenge", "24h challenge"],
        "block_granny" => &["granny"],
        "block_fnaf" => &["fnaf", "five nights at freddy", "five nights at freddy's"],
        "block_unboxing_eggs" => &["unboxing", "surprise egg", "surprise eggs"],
        "block_kill_die" => &[" kill ", "killing", " die ", "dies", "died"],
        "block_blood_gore_horror" => &["blood", "bloed", "gore", "horror"],
        "block_guns_weapons" => &["gun", "shoot", "weapon", "wapen", "firearm"],
        "block_elsagate_pregnant" => &["pregnant", "zwanger"],
        "block_elsagate_injection" => &["injection", "spuit", "doctor", "needle", "surgery"],
        "block_suicide" => &["suicide", "zelfmoord", "self harm", "self-harm"],
        _ => &[],
    }
}

/// From `judge.py::_ALLOW_POLICY_KEYWORDS`.
fn allow_policy_keywords(key: &str) -> &'static [&'static str] {
    match key {
        "allow_90s_cartoons" => &["90s cartoon", "1990s cartoon", "rugrats", "hey arnold", "animaniacs"],
        "allow_00s_cartoons" => &["2000s cartoon", "00s cartoon", "kim possible", "fairly oddparents", "avatar"],
        "allow_all_cartoons" => &["cartoon", "animation", "animated", "wb kids", "cartoon network"],
        "allow_disney_family" => &["disney", "disney jr", "pixar", "mickey", "minnie", "spidey and his amazing friends"],
        "allow_educational" => &["educational", "learn", "science", "math", "reading", "school", "kids academy"],
        "allow_religion" => &["bible", "church", "faith", "christian kids", "quran", "torah", "sunday school"],
        "allow_pbs_kids" => &["pbs kids", "sesame street", "arthur", "magic school bus", "reading rainbow"],
        "allow_nickelodeon_90s" => &["nickelodeon", "rugrats", "doug", "ren and stimpy", "catdog"],
        "allow_cartoon_network_classics" => &["dexter's laboratory", "powerpuff girls", "johnny bravo", "ed edd n eddy"],
        "allow_disney_afternoon" => &["ducktales", "darkwing duck", "talespin", "goof troop"],
        "allow_animal_documentaries" => &["animal documentary", "wildlife", "national geographic kids", "nat geo kids"],
        "allow_nature_science" => &["space", "planet", "solar system", "nature", "experiment", "science for kids"],
        "allow_music_rhythm" => &["music for kids", "rhythm", "sing-along", "children's choir"],
        "allow_arts_crafts" => &["arts and crafts", "drawing for kids", "origami", "craft tutorial"],
        "allow_storytelling_books" => &["story time", "read aloud", "storybook", "bedtime story"],
        "allow_family_game_shows" => &["family quiz", "kids game show", "trivia for kids", "family challenge"],
        _ => &[],
    }
}

/// From `judge.py::_STRICT_CLICKBAIT_KEYWORDS`.
const STRICT_CLICKBAIT_KEYWORDS: &[&str] =
    &["monkey baby", "baby monkey", "bon bon", "toilet", "poop", "potty", "animal ht"];

/// Parses a persisted `policy_flags_json`/`allow_policy_flags_json` value,
/// filling in the preset's default when a key is missing. Mirrors
/// `judge.py::normalize_policy_flags`/`normalize_allow_policy_flags`.
fn normalize_flags(
    raw: &str,
    keys: &[&'static str],
    defaults: &HashMap<&'static str, bool>,
) -> HashMap<String, bool> {
    let parsed: HashMap<String, bool> = serde_json::from_str(raw.trim()).unwrap_or_default();
    keys.iter()
        .map(|key| {
            let value = parsed
                .get(*key)
                .copied()
                .unwrap_or_else(|| defaults.get(key).copied().unwrap_or(false));
            (key.to_string(), value)
        })
        .collect()
}

fn policy_keys() -> Vec<&'static str> {
    POLICY_PRESETS.iter().map(|p| p.key).collect()
}

fn allow_policy_keys() -> Vec<&'static str> {
    ALLOW_POLICY_PRESETS.iter().map(|p| p.key).collect()
}

/// Builds the block-policy prompt addon, matching `judge.py::build_policy_prompt_addon`.
pub fn build_policy_prompt_addon(flags: &HashMap<String, bool>) -> String {
    let enabled: Vec<_> = POLICY_PRESETS.iter().filter(|p| flags.get(p.key).copied().unwrap_or(false)).collect();
    if enabled.is_empty() {
        return String::new();
    }
    let mut lines = vec![
        "Strict policy overrides enabled by admin toggles:".to_string(),
        "If a toggle matches the video context, return BLOCK even when content is popular.".to_string(),
    ];
    for preset in enabled {
        lines.push(format!("- {}: {}", preset.label, preset.prompt_addon));
    }
    lines.join("\n")
}

/// Matches `judge.py::build_allow_policy_prompt_addon`.
pub fn build_allow_policy_prompt_addon(flags: &HashMap<String, bool>) -> String {
    let enabled: Vec<_> = ALLOW_POLICY_PRESETS.iter().filter(|p| flags.get(p.key).copied().unwrap_or(false)).collect();
    if enabled.is_empty() {
        return "No allow profile categories are enabled. Default to BLOCK.".to_string();
    }
    let mut lines = vec![
        "Allow profile categories enabled by admin toggles:".to_string(),
        "Only ALLOW when the video clearly belongs to these categories.".to_string(),
    ];
    for preset in enabled {
        lines.push(format!("- {}: {}", preset.label, preset.prompt_addon));
    }
    lines.join("\n")
}

#[derive(Debug, Clone)]
pub struct Verdict {
    pub verdict: String,
    pub reason: String,
    pub confidence: i32,
    pub source: String,
}

impl Verdict {
    fn block(reason: impl Into<String>, source: &str) -> Self {
        Self {
            verdict: "BLOCK".to_string(),
            reason: reason.into(),
            confidence: 100,
            source: source.to_string(),
        }
    }

    fn allow(reason: impl Into<String>, source: &str) -> Self {
        Self {
            verdict: "ALLOW".to_string(),
            reason: reason.into(),
            confidence: 100,
            source: source.to_string(),
        }
    }

    pub fn is_allow(&self) -> bool {
        self.verdict == "ALLOW"
    }
}

pub struct EvaluateRequest<'a> {
    pub video_id: &'a str,
    pub title: &'a str,
    pub channel_id: &'a str,
    pub channel_title: &'a str,
    pub video_url: &'a str,
    pub mode: Mode,
}

/// Ports `JudgeService`: holds the shared classifier, webhook client, and
/// file lists, and evaluates one video through the full precedence chain.
pub struct Judge {
    pool: SqlitePool,
    classifier: Arc<dyn Classifier>,
    webhook: Arc<WebhookClient>,
    blocklist: Arc<ListStore>,
    allowlist: Arc<ListStore>,
    decision_cache_ttl_seconds: i64,
    strict_allow_min_confidence: i32,
}

impl Judge {
    pub fn new(
        pool: SqlitePool,
        classifier: Arc<dyn Classifier>,
        webhook: Arc<WebhookClient>,
        blocklist: Arc<ListStore>,
        allowlist: Arc<ListStore>,
        decision_cache_ttl_seconds: i64,
        strict_allow_min_confidence: i32,
    ) -> Self {
        Self {
            pool,
            classifier,
            webhook,
            blocklist,
            allowlist,
            decision_cache_ttl_seconds,
            strict_allow_min_confidence: strict_allow_min_confidence.clamp(0, 100),
        }
    }

    async fn effective_gemini_key(&self, configured_key: &str) -> Result<String> {
        let runtime = sentinel_common::db::queries::settings::get(&self.pool, "gemini_api_key_runtime")
            .await?
            .unwrap_or_default();
        if !runtime.trim().is_empty() {
            return Ok(runtime.trim().to_string());
        }
        Ok(configured_key.trim().to_string())
    }

    async fn gemini_enabled(&self) -> Result<bool> {
        Ok(sentinel_common::db::queries::settings::get(&self.pool, "gemini_enabled")
            .await?
            .unwrap_or_else(|| "true".to_string())
            .trim()
            .eq_ignore_ascii_case("true"))
    }

    async fn custom_prompt(&self) -> Result<String> {
        Ok(sentinel_common::db::queries::settings::get(&self.pool, "custom_prompt")
            .await?
            .unwrap_or_default())
    }

    async fn policy_flags(&self) -> Result<HashMap<String, bool>> {
        let raw = sentinel_common::db::queries::settings::get(&self.pool, "policy_flags_json")
            .await?
            .unwrap_or_else(|| "{}".to_string());
        Ok(normalize_flags(&raw, &policy_keys(), &default_policy_flags()))
    }

    async fn allow_policy_flags(&self) -> Result<HashMap<String, bool>> {
        let raw = sentinel_common::db::queries::settings::get(&self.pool, "allow_policy_flags_json")
            .await?
            .unwrap_or_else(|| "{}".to_string());
        Ok(normalize_flags(&raw, &allow_policy_keys(), &default_allow_flags()))
    }

    async fn effective_prompt(&self) -> Result<String> {
        let custom = self.custom_prompt().await?;
        let base = if custom.trim().is_empty() {
            crate::policy::DEFAULT_SAFE_PROMPT.to_string()
        } else {
            custom.trim().to_string()
        };
        let addon = build_policy_prompt_addon(&self.policy_flags().await?);
        let base = if addon.is_empty() { base } else { format!("{base}\n\n{addon}") };
        Ok(format!("{base}{}", crate::policy::OUTPUT_CONTRACT_SUFFIX))
    }

    async fn effective_whitelist_prompt(&self) -> Result<String> {
        let custom = self.custom_prompt().await?;
        let base = if custom.trim().is_empty() {
            crate::policy::DEFAULT_WHITELIST_PROMPT.to_string()
        } else {
            custom.trim().to_string()
        };
        let addon = build_allow_policy_prompt_addon(&self.allow_policy_flags().await?);
        Ok(format!("{base}\n\n{addon}{}", crate::policy::OUTPUT_CONTRACT_SUFFIX))
    }

    async fn match_policy_override(&self, title: &str, channel_title: &str, video_url: &str) -> Result<Option<String>> {
        let flags = self.policy_flags().await?;
        let hay = format!(" {title} {channel_title} {video_url} ").to_lowercase();
        for preset in POLICY_PRESETS {
            if !flags.get(preset.key).copied().unwrap_or(false) {
                continue;
            }
            if policy_keywords(preset.key).iter().any(|needle| hay.contains(needle)) {
                return Ok(Some(preset.label.to_string()));
            }
        }
        Ok(None)
    }

    async fn match_allow_policy(&self, title: &str, channel_title: &str, video_url: &str) -> Result<Option<String>> {
        let flags = self.allow_policy_flags().await?;
        let hay = format!(" {title} {channel_title} {video_url} ").to_lowercase();
        for preset in ALLOW_POLICY_PRESETS {
            if !flags.get(preset.key).copied().unwrap_or(false) {
                continue;
            }
            if allow_policy_keywords(preset.key).iter().any(|needle| hay.contains(needle)) {
                return Ok(Some(preset.label.to_string()));
            }
        }
        Ok(None)
    }

    fn apply_strict_allow_gate(&self, decision: Verdict, title: &str, channel_title: &str, video_url: &str) -> Verdict {
        if decision.verdict != "ALLOW" {
            return decision;
        }
        if decision.confidence < self.strict_allow_min_confidence {
            return Verdict::block(
                format!(
                    "Strict nanny mode: ALLOW confidence {} is below minimum {}.",
                    decision.confidence, self.strict_allow_min_confidence
                ),
                "policy",
            );
        }
        let hay = format!(" {title} {channel_title} {video_url} ").to_lowercase();
        if STRICT_CLICKBAIT_KEYWORDS.iter().any(|needle| hay.contains(needle)) {
            return Verdict::block("Strict nanny mode: blocked by clickbait-animal safety filter.", "policy");
        }
        decision
    }

    /// The full precedence chain from `judge.py::evaluate`.
    pub async fn evaluate(&self, req: EvaluateRequest<'_>, configured_gemini_key: &str, gemini_model: &str) -> Result<Verdict> {
        let EvaluateRequest { video_id, title, channel_id, channel_title, video_url, mode } = req;
        let cache_key = cache::cache_key(mode, video_id);

        if let Some(m) = rules::find_match(&self.pool, video_id, channel_id, Some("blacklist")).await? {
            return Ok(Verdict::block(format!("Blocked by local blacklist ({})", m.scope), "blacklist"));
        }
        if let Some(m) = self.blocklist.find_match(video_id, channel_id).await {
            return Ok(Verdict::block(format!("Blocked by file blocklist ({})", m.scope.as_str()), "file_blacklist"));
        }

        if mode == Mode::Whitelist {
            if let Some(m) = rules::find_match(&self.pool, video_id, channel_id, Some("whitelist")).await? {
                return Ok(Verdict::allow(format!("Allowed by local whitelist ({})", m.scope), "whitelist"));
            }
            if let Some(m) = self.allowlist.find_match(video_id, channel_id).await {
                return Ok(Verdict::allow(format!("Allowed by file whitelist ({})", m.scope.as_str()), "file_whitelist"));
            }
            if let Some(label) = self.match_allow_policy(title, channel_title, video_url).await? {
                return Ok(Verdict::allow(format!("Allowed by whitelist policy toggle \"{label}\""), "policy_allowlist"));
            }

            if let Some(cached) = cache::get(&self.pool, &cache_key).await? {
                let gated = self.apply_strict_allow_gate(
                    Verdict { verdict: cached.verdict, reason: cached.reason, confidence: cached.confidence, source: cached.source },
                    title, channel_title, video_url,
                );
                if gated.is_allow() {
                    return Ok(gated);
                }
                return Ok(Verdict::block(gated.reason, &gated.source));
            }

            if !self.gemini_enabled().await? {
                return Ok(Verdict::block("Whitelist mode: Gemini is disabled and no allowlist match was found.", "policy"));
            }

            let prompt = self.effective_whitelist_prompt().await?;
            let key = self.effective_gemini_key(configured_gemini_key).await?;
            if key.is_empty() {
                return Err(sentinel_common::Error::Classifier { message: "missing_gemini_key".to_string(), fatal: true });
            }
            let parsed = self.classify_with_repair(&prompt, video_id, video_url, title, channel_id, channel_title, &key, gemini_model).await?;
            cache::set(
                &self.pool, &cache_key,
                &CachedDecision { verdict: parsed.verdict.clone(), reason: parsed.reason.clone(), confidence: parsed.confidence, source: "gemini".to_string() },
                self.decision_cache_ttl_seconds,
            ).await?;
            let gated = self.apply_strict_allow_gate(
                Verdict { verdict: parsed.verdict, reason: parsed.reason, confidence: parsed.confidence, source: "gemini".to_string() },
                title, channel_title, video_url,
            );
            if gated.is_allow() {
                return Ok(gated);
            }
            return Ok(Verdict::block(gated.reason, &gated.source));
        }

        // Blocklist mode.
        if let Some(label) = self.match_policy_override(title, channel_title, video_url).await? {
            return Ok(Verdict::block(format!("Blocked by policy toggle \"{label}\""), "policy"));
        }

        if let Some(cached) = cache::get(&self.pool, &cache_key).await? {
            return Ok(self.apply_strict_allow_gate(
                Verdict { verdict: cached.verdict, reason: cached.reason, confidence: cached.confidence, source: cached.source },
                title, channel_title, video_url,
            ));
        }

        if !self.gemini_enabled().await? {
            return Ok(Verdict {
                verdict: "ALLOW".to_string(),
                reason: "Gemini is disabled. Only local rules and blocklists are enforced.".to_string(),
                confidence: 0,
                source: "fallback".to_string(),
            });
        }

        let prompt = self.effective_prompt().await?;
        let key = self.effective_gemini_key(configured_gemini_key).await?;
        if key.is_empty() {
            return Err(sentinel_common::Error::Classifier { message: "missing_gemini_key".to_string(), fatal: true });
        }
        let parsed = self.classify_with_repair(&prompt, video_id, video_url, title, channel_id, channel_title, &key, gemini_model).await?;
        cache::set(
            &self.pool, &cache_key,
            &CachedDecision { verdict: parsed.verdict.clone(), reason: parsed.reason.clone(), confidence: parsed.confidence, source: "gemini".to_string() },
            self.decision_cache_ttl_seconds,
        ).await?;
        Ok(self.apply_strict_allow_gate(
            Verdict { verdict: parsed.verdict, reason: parsed.reason, confidence: parsed.confidence, source: "gemini".to_string() },
            title, channel_title, video_url,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    async fn classify_with_repair(
        &self,
        prompt: &str,
        video_id: &str,
        video_url: &str,
        title: &str,
        channel_id: &str,
        channel_title: &str,
        key: &str,
        model: &str,
    ) -> Result<client::ClassifyOutput> {
        let request = ClassifyRequest {
            video_id: video_id.to_string(),
            video_url: video_url.to_string(),
            title: title.to_string(),
            channel_id: channel_id.to_string(),
            channel_title: channel_title.to_string(),
        };
        match self.classifier.classify(prompt, &request, key, model).await {
            Ok(output) => Ok(output),
            Err(ClassifierError::Output(_)) => {
                let repair_prompt = format!("{prompt}\nReturn strict valid JSON exactly as requested.");
                self.classifier.classify(&repair_prompt, &request, key, model).await.map_err(classifier_err)
            }
            Err(other) => Err(classifier_err(other)),
        }
    }

    /// Degrades gracefully on a fatal classifier failure: persists
    /// `judge_ok=false`/`last_error`, and fires a rate-limited (5 minute)
    /// webhook alert. Mirrors `judge.py::handle_fatal_failure`.
    pub async fn handle_fatal_failure(&self, err: &sentinel_common::Error) -> Result<()> {
        let message = err.to_string();
        sentinel_common::db::queries::settings::set(&self.pool, "judge_ok", "false").await?;
        sentinel_common::db::queries::settings::set(&self.pool, "last_error", &message).await?;

        let now = chrono::Utc::now();
        let last_sent_raw = sentinel_common::db::queries::settings::get(&self.pool, "last_failure_alert_at")
            .await?
            .unwrap_or_default();
        let mut should_alert = true;
        if !last_sent_raw.is_empty() {
            if let Ok(last) = chrono::DateTime::parse_from_rfc3339(&last_sent_raw) {
                if now.signed_duration_since(last.with_timezone(&chrono::Utc)) < chrono::Duration::minutes(5) {
                    should_alert = false;
                }
            }
        }

        if should_alert {
            let hook = sentinel_common::db::queries::settings::get(&self.pool, "webhook_url")
                .await?
                .unwrap_or_default();
            if !hook.is_empty() {
                let active = sentinel_common::db::queries::settings::get(&self.pool, "active")
                    .await?
                    .unwrap_or_else(|| "true".to_string())
                    == "true";
                let payload = json!({
                    "event": "sentinel_gemini_failure_degraded",
                    "active": active,
                    "judge_ok": false,
                    "error": message,
                    "timestamp": sentinel_common::db::utc_now_iso(),
                });
                let (ok, detail) = self.webhook.post_json(&hook, &payload).await;
                if !ok {
                    warn!(detail = %detail, "failure alert webhook delivery failed");
                }
            }
            sentinel_common::db::queries::settings::set(&self.pool, "last_failure_alert_at", &now.to_rfc3339()).await?;
        }
        Ok(())
    }
}

fn classifier_err(err: ClassifierError) -> sentinel_common::Error {
    let fatal = err.is_fatal();
    sentinel_common::Error::Classifier { message: err.to_string(), fatal }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_err_marks_auth_failures_fatal_and_parse_failures_not() {
        let fatal = classifier_err(ClassifierError::Api("status=401 body=unauthorized".to_string()));
        assert!(fatal.is_classifier_fatal());

        let transient = classifier_err(ClassifierError::Output("json_decode_error".to_string()));
        assert!(!transient.is_classifier_fatal());
    }

    #[test]
    fn normalize_flags_fills_in_defaults_for_missing_keys() {
        let flags = normalize_flags("{}", &policy_keys(), &default_policy_flags());
        assert_eq!(flags.get("block_cocomelon"), Some(&true));
        assert_eq!(flags.get("block_skibidi"), Some(&false));
    }

    #[test]
    fn normalize_flags_honors_explicit_overrides() {
        let flags = normalize_flags(r#"{"block_cocomelon": false}"#, &policy_keys(), &default_policy_flags());
        assert_eq!(flags.get("block_cocomelon"), Some(&false));
    }

    #[test]
    fn normalize_flags_tolerates_malformed_json() {
        let flags = normalize_flags("not json", &policy_keys(), &default_policy_flags());
        assert_eq!(flags.get("block_cocomelon"), Some(&true));
    }

    #[test]
    fn build_policy_prompt_addon_empty_when_nothing_enabled() {
        let flags: HashMap<String, bool> = policy_keys().into_iter().map(|k| (k.to_string(), false)).collect();
        assert_eq!(build_policy_prompt_addon(&flags), "");
    }

    #[test]
    fn build_allow_policy_prompt_addon_defaults_to_block_message() {
        let flags: HashMap<String, bool> = allow_policy_keys().into_iter().map(|k| (k.to_string(), false)).collect();
        assert_eq!(build_allow_policy_prompt_addon(&flags), "No allow profile categories are enabled. Default to BLOCK.");
    }

    #[test]
    fn strict_allow_gate_blocks_low_confidence_allow() {
        let allow = Verdict::allow("seems fine", "gemini");
        let decision = Verdict { confidence: 50, ..allow };
        let gated = gate_for_test(decision, "Some Title", "Some Channel", "https://example.com");
        assert_eq!(gated.verdict, "BLOCK");
    }

    #[test]
    fn strict_allow_gate_blocks_clickbait_keywords_even_at_high_confidence() {
        let decision = Verdict { verdict: "ALLOW".to_string(), reason: "fine".to_string(), confidence: 99, source: "gemini".to_string() };
        let gated = gate_for_test(decision, "Baby Monkey Toilet Prank", "Channel", "https://example.com");
        assert_eq!(gated.verdict, "BLOCK");
    }

    #[test]
    fn strict_allow_gate_passes_high_confidence_clean_allow() {
        let decision = Verdict { verdict: "ALLOW".to_string(), reason: "fine".to_string(), confidence: 99, source: "gemini".to_string() };
        let gated = gate_for_test(decision, "Sesame Street Learning", "PBS Kids", "https://example.com");
        assert_eq!(gated.verdict, "ALLOW");
    }

    fn gate_for_test(decision: Verdict, title: &str, channel_title: &str, video_url: &str) -> Verdict {
        let judge = TestJudge { strict_allow_min_confidence: 95 };
        judge.apply_strict_allow_gate(decision, title, channel_title, video_url)
    }

    /// A minimal stand-in exposing only the pure gating logic, avoiding a
    /// database pool in tests that don't exercise the precedence chain.
    struct TestJudge {
        strict_allow_min_confidence: i32,
    }

    impl TestJudge {
        fn apply_strict_allow_gate(&self, decision: Verdict, title: &str, channel_title: &str, video_url: &str) -> Verdict {
            if decision.verdict != "ALLOW" {
                return decision;
            }
            if decision.confidence < self.strict_allow_min_confidence {
                return Verdict::block(
                    format!("Strict nanny mode: ALLOW confidence {} is below minimum {}.", decision.confidence, self.strict_allow_min_confidence),
                    "policy",
                );
            }
            let hay = format!(" {title} {channel_title} {video_url} ").to_lowercase();
            if STRICT_CLICKBAIT_KEYWORDS.iter().any(|needle| hay.contains(needle)) {
                return Verdict::block("Strict nanny mode: blocked by clickbait-animal safety filter.", "policy");
            }
            decision
        }
    }
}
