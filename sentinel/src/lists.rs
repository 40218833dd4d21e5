//! File-backed block/allow lists. Grounded on
//! `original_source/app/services/blocklists.py`'s `BlocklistService` in full:
//! local file format, append/remove, remote source merge-in.

use reqwest::Url;
use sentinel_common::ids::{is_valid_channel_id, is_valid_video_id};
use sentinel_common::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Blacklist,
    Whitelist,
}

impl ListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ListKind::Blacklist => "blacklist",
            ListKind::Whitelist => "whitelist",
        }
    }

    fn file_name(self) -> String {
        format!("custom-{}.txt", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Video,
    Channel,
}

impl Scope {
    fn as_str(&self) -> &'static str {
        match self {
            Scope::Video => "video",
            Scope::Channel => "channel",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListEntry {
    pub scope: Scope,
    pub value: String,
    pub label: String,
    pub url: String,
    pub source_list: String,
}

#[derive(Debug, Clone, Default)]
struct ListSnapshot {
    video_ids: HashSet<String>,
    channel_ids: HashSet<String>,
    entries: Vec<ListEntry>,
    loaded_at: Option<chrono::DateTime<chrono::Utc>>,
    remote_sources: Vec<String>,
}

pub struct ListMatch {
    pub rule_type: &'static str,
    pub scope: Scope,
    pub value: String,
}

/// A single blacklist or whitelist: a local text file plus zero or more
/// remote source URLs merged in on `reload`.
pub struct ListStore {
    kind: ListKind,
    local_path: Mutex<PathBuf>,
    fallback_path: PathBuf,
    snapshot: Mutex<ListSnapshot>,
    http: reqwest::Client,
}

impl ListStore {
    pub fn new(data_dir: &Path, db_path: &Path, kind: ListKind) -> Self {
        let local_path = data_dir.join("blocklists").join(kind.file_name());
        let fallback_path = db_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("blocklists")
            .join(kind.file_name());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client with timeout always builds");
        Self {
            kind,
            local_path: Mutex::new(local_path),
            fallback_path,
            snapshot: Mutex::new(ListSnapshot::default()),
            http,
        }
    }

    pub fn sources_setting_key(&self) -> String {
        format!("{}_source_urls", self.kind.as_str())
    }

    async fn local_path(&self) -> PathBuf {
        self.local_path.lock().await.clone()
    }

    async fn activate_fallback_path(&self) {
        let mut guard = self.local_path.lock().await;
        if *guard == self.fallback_path {
            return;
        }
        *guard = self.fallback_path.clone();
        if let Some(parent) = guard.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
    }

    fn header(&self) -> String {
        let label = match self.kind {
            ListKind::Blacklist => "Blacklist",
            ListKind::Whitelist => "Whitelist",
        };
        format!(
            "# Sentinel {label} File v1\n\
             # Supported entry formats:\n\
             # 1) video:<VIDEO_ID> | Human readable title | https://www.youtube.com/watch?v=<VIDEO_ID>\n\
             # 2) channel:<CHANNEL_ID_OR_HANDLE> | Channel name | https://www.youtube.com/channel/<CHANNEL_ID>\n\
             # 3) Direct YouTube links are accepted and parsed.\n\
             # Lines starting with # are comments.\n"
        )
    }

    pub async fn ensure_local_file(&self) -> Result<()> {
        let path = self.local_path().await;
        if let Some(parent) = path.parent() {
            if tokio::fs::create_dir_all(parent).await.is_err() {
                self.activate_fallback_path().await;
            }
        }
        let path = self.local_path().await;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        if tokio::fs::write(&path, self.header()).await.is_err() {
            self.activate_fallback_path().await;
            let path = self.local_path().await;
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tokio::fs::write(&path, self.header()).await?;
            }
        }
        Ok(())
    }

    pub async fn get_local_content(&self) -> Result<String> {
        self.ensure_local_file().await?;
        let path = self.local_path().await;
        Ok(tokio::fs::read_to_string(path).await?)
    }

    pub async fn save_local_content(&self, content: &str) -> Result<()> {
        self.ensure_local_file().await?;
        let path = self.local_path().await;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub async fn append_entry(
        &self,
        scope: Scope,
        value: &str,
        label: &str,
        url: &str,
        source_list: &str,
    ) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(());
        }
        self.ensure_local_file().await?;

        let safe_label = label.trim().replace(['\n', '\r'], " ");
        let safe_url = url.trim();
        let comment = if safe_label.is_empty() {
            format!("# [{source_list}] {}:{value}", scope.as_str())
        } else {
            format!("# [{source_list}] {safe_label}")
        };
        let mut line = format!("{}:{value}", scope.as_str());
        if !safe_label.is_empty() {
            line.push_str(&format!(" | {safe_label}"));
        }
        if !safe_url.is_empty() {
            line.push_str(&format!(" | {safe_url}"));
        }

        let mut snap = self.snapshot.lock().await;
        let text = self.get_local_content().await?;
        let needle = format!("{}:{value}", scope.as_str());
        if text.contains(&needle) {
            return Ok(());
        }
        let path = self.local_path().await;
        let mut file = tokio::fs::OpenOptions::new().append(true).open(&path).await?;
        use tokio::io::AsyncWriteExt;
        file.write_all(format!("\n{comment}\n{line}\n").as_bytes()).await?;

        match scope {
            Scope::Video => {
                snap.video_ids.insert(value.to_string());
            }
            Scope::Channel => {
                snap.channel_ids.insert(value.to_string());
            }
        }
        snap.entries.push(ListEntry {
            scope,
            value: value.to_string(),
            label: safe_label,
            url: safe_url.to_string(),
            source_list: source_list.to_string(),
        });
        Ok(())
    }

    pub async fn remove_entry(&self, scope: Scope, value: &str) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(());
        }
        self.ensure_local_file().await?;
        let _guard = self.snapshot.lock().await;
        let path = self.local_path().await;
        let content = tokio::fs::read_to_string(&path).await?;
        let target = format!("{}:{value}", scope.as_str());
        let mut filtered: Vec<&str> = Vec::new();
        let mut skip_next_comment = false;
        for line in content.lines() {
            let stripped = line.trim();
            if stripped.starts_with("# [manual]") {
                skip_next_comment = true;
                filtered.push(line);
                continue;
            }
            if stripped.starts_with(&target) {
                if skip_next_comment && !filtered.is_empty() {
                    filtered.pop();
                }
                skip_next_comment = false;
                continue;
            }
            skip_next_comment = false;
            filtered.push(line);
        }
        let mut out = filtered.join("\n").trim_end().to_string();
        out.push('\n');
        tokio::fs::write(&path, out).await?;
        Ok(())
    }

    pub async fn reload(&self, sources: Vec<String>) -> Result<()> {
        self.ensure_local_file().await?;
        let local_content = self.get_local_content().await?;
        let local_path = self.local_path().await.display().to_string();
        let remote_contents = self.download_sources(&sources).await;

        let mut snapshot = ListSnapshot::default();
        let mut merged: Vec<(&str, String, String)> = vec![("local", local_path, local_content)];
        for (src, content) in remote_contents {
            merged.push(("remote", src, content));
        }

        for (source_kind, source_name, content) in merged {
            let source_list = if source_kind == "remote" {
                source_name.clone()
            } else {
                "local".to_string()
            };
            for mut entry in parse_content(&content) {
                match entry.scope {
                    Scope::Video => {
                        snapshot.video_ids.insert(entry.value.clone());
                    }
                    Scope::Channel => {
                        snapshot.channel_ids.insert(entry.value.clone());
                    }
                }
                entry.source_list = source_list.clone();
                snapshot.entries.push(entry);
            }
        }
        snapshot.loaded_at = Some(chrono::Utc::now());
        snapshot.remote_sources = sources;

        *self.snapshot.lock().await = snapshot;
        Ok(())
    }

    async fn download_sources(&self, sources: &[String]) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for src in sources {
            match self.http.get(src).send().await {
                Ok(resp) if resp.status().is_success() => match resp.text().await {
                    Ok(text) => out.push((src.clone(), text)),
                    Err(err) => warn!(source = %src, error = %err, "failed reading remote list body"),
                },
                Ok(resp) => warn!(source = %src, status = %resp.status(), "remote list fetch returned non-2xx"),
                Err(err) => warn!(source = %src, error = %err, "failed fetching remote list"),
            }
        }
        out
    }

    pub async fn find_match(&self, video_id: &str, channel_id: &str) -> Option<ListMatch> {
        let snap = self.snapshot.lock().await;
        if !video_id.is_empty() && snap.video_ids.contains(video_id) {
            return Some(ListMatch {
                rule_type: self.kind.as_str(),
                scope: Scope::Video,
                value: video_id.to_string(),
            });
        }
        if !channel_id.is_empty() && snap.channel_ids.contains(channel_id) {
            return Some(ListMatch {
                rule_type: self.kind.as_str(),
                scope: Scope::Channel,
                value: channel_id.to_string(),
            });
        }
        None
    }

    pub async fn summary(&self) -> ListSummary {
        let snap = self.snapshot.lock().await;
        ListSummary {
            list_kind: self.kind.as_str(),
            video_count: snap.video_ids.len(),
            channel_count: snap.channel_ids.len(),
            entries_count: snap.entries.len(),
            loaded_at: snap.loaded_at,
            local_path: self.local_path().await.display().to_string(),
            sources: snap.remote_sources.clone(),
        }
    }

    pub async fn recent_entries(&self, limit: usize) -> Vec<ListEntry> {
        let snap = self.snapshot.lock().await;
        let start = snap.entries.len().saturating_sub(limit);
        snap.entries[start..].iter().rev().cloned().collect()
    }
}

pub struct ListSummary {
    pub list_kind: &'static str,
    pub video_count: usize,
    pub channel_count: usize,
    pub entries_count: usize,
    pub loaded_at: Option<chrono::DateTime<chrono::Utc>>,
    pub local_path: String,
    pub sources: Vec<String>,
}

fn parse_content(content: &str) -> Vec<ListEntry> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Option<ListEntry> {
    let parts: Vec<&str> = line.split('|').map(str::trim).collect();
    let primary = parts[0];
    let label = parts.get(1).copied().unwrap_or("").to_string();
    let url = parts.get(2).copied().unwrap_or("").to_string();

    if let Some(rest) = primary.strip_prefix("video:") {
        let vid = rest.trim();
        return is_valid_video_id(vid).then(|| ListEntry {
            scope: Scope::Video,
            value: vid.to_string(),
            label: label.clone(),
            url: if url.is_empty() {
                format!("https://www.youtube.com/watch?v={vid}")
            } else {
                url.clone()
            },
            source_list: String::new(),
        });
    }

    if let Some(rest) = primary.strip_prefix("channel:") {
        let ch = rest.trim();
        return is_valid_channel_id(ch).then(|| ListEntry {
            scope: Scope::Channel,
            value: ch.to_string(),
            label: label.clone(),
            url: if url.is_empty() { channel_default_url(ch) } else { url.clone() },
            source_list: String::new(),
        });
    }

    if let Some(entry) = extract_from_url(primary) {
        return Some(entry);
    }

    let token = primary.trim();
    if is_valid_video_id(token) {
        return Some(ListEntry {
            scope: Scope::Video,
            value: token.to_string(),
            label,
            url: if url.is_empty() {
                format!("https://www.youtube.com/watch?v={token}")
            } else {
                url
            },
            source_list: String::new(),
        });
    }
    if is_valid_channel_id(token) {
        return Some(ListEntry {
            scope: Scope::Channel,
            value: token.to_string(),
            label,
            url: if url.is_empty() { channel_default_url(token) } else { url },
            source_list: String::new(),
        });
    }
    None
}

fn channel_default_url(channel_id: &str) -> String {
    if let Some(handle) = channel_id.strip_prefix('@') {
        format!("https://www.youtube.com/@{handle}")
    } else {
        format!("https://www.youtube.com/channel/{channel_id}")
    }
}

fn extract_from_url(text: &str) -> Option<ListEntry> {
    let parsed = Url::parse(text).ok()?;
    let host = parsed.host_str().unwrap_or("").to_lowercase();
    if !host.contains("youtube.com") && !host.contains("youtu.be") {
        return None;
    }

    if host.contains("youtu.be") {
        let vid = parsed.path().trim_start_matches('/').split('/').next().unwrap_or("");
        return is_valid_video_id(vid).then(|| ListEntry {
            scope: Scope::Video,
            value: vid.to_string(),
            label: String::new(),
            url: format!("https://www.youtube.com/watch?v={vid}"),
            source_list: String::new(),
        });
    }

    if let Some((_, vid)) = parsed.query_pairs().find(|(k, _)| k == "v") {
        if is_valid_video_id(&vid) {
            return Some(ListEntry {
                scope: Scope::Video,
                value: vid.to_string(),
                label: String::new(),
                url: format!("https://www.youtube.com/watch?v={vid}"),
                source_list: String::new(),
            });
        }
    }

    let path_parts: Vec<&str> = parsed.path().split('/').filter(|p| !p.is_empty()).collect();
    if path_parts.len() >= 2 && path_parts[0] == "channel" {
        let channel_id = path_parts[1];
        if is_valid_channel_id(channel_id) {
            return Some(ListEntry {
                scope: Scope::Channel,
                value: channel_id.to_string(),
                label: String::new(),
                url: format!("https://www.youtube.com/channel/{channel_id}"),
                source_list: String::new(),
            });
        }
    }
    if let Some(handle) = path_parts.first() {
        if handle.starts_with('@') && is_valid_channel_id(handle) {
            return Some(ListEntry {
                scope: Scope::Channel,
                value: handle.to_string(),
                label: String::new(),
                url: format!("https://www.youtube.com/{handle}"),
                source_list: String::new(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_accepts_explicit_video_scope() {
        let entry = parse_line("video:abcdefghijk | My Title").unwrap();
        assert_eq!(entry.scope, Scope::Video);
        assert_eq!(entry.value, "abcdefghijk");
        assert_eq!(entry.url, "https://www.youtube.com/watch?v=abcdefghijk");
    }

    #[test]
    fn parse_line_accepts_explicit_channel_scope() {
        let channel = "UC".to_string() + &"a".repeat(22);
        let entry = parse_line(&format!("channel:{channel}")).unwrap();
        assert_eq!(entry.scope, Scope::Channel);
        assert_eq!(entry.value, channel);
    }

    #[test]
    fn parse_line_rejects_malformed_video_id() {
        assert!(parse_line("video:short").is_none());
    }

    #[test]
    fn parse_line_extracts_video_id_from_watch_url() {
        let entry = parse_line("https://www.youtube.com/watch?v=abcdefghijk").unwrap();
        assert_eq!(entry.scope, Scope::Video);
        assert_eq!(entry.value, "abcdefghijk");
    }

    #[test]
    fn parse_line_extracts_video_id_from_short_url() {
        let entry = parse_line("https://youtu.be/abcdefghijk").unwrap();
        assert_eq!(entry.scope, Scope::Video);
        assert_eq!(entry.value, "abcdefghijk");
    }

    #[test]
    fn parse_line_extracts_channel_from_channel_url() {
        let channel = "UC".to_string() + &"a".repeat(22);
        let entry = parse_line(&format!("https://www.youtube.com/channel/{channel}")).unwrap();
        assert_eq!(entry.scope, Scope::Channel);
        assert_eq!(entry.value, channel);
    }

    #[test]
    fn parse_line_accepts_bare_handle() {
        let entry = parse_line("@SomeKidsChannel").unwrap();
        assert_eq!(entry.scope, Scope::Channel);
        assert_eq!(entry.value, "@SomeKidsChannel");
    }

    #[test]
    fn parse_content_skips_comments_and_blank_lines() {
        let content = "# comment\n\nvideo:abcdefghijk\n";
        let entries = parse_content(content);
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn append_then_match_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ListStore::new(dir.path(), &dir.path().join("sentinel.db"), ListKind::Blacklist);
        store
            .append_entry(Scope::Video, "abcdefghijk", "Bad video", "", "manual")
            .await
            .unwrap();
        store.reload(Vec::new()).await.unwrap();
        let found = store.find_match("abcdefghijk", "").await;
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn append_entry_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ListStore::new(dir.path(), &dir.path().join("sentinel.db"), ListKind::Blacklist);
        store.append_entry(Scope::Video, "abcdefghijk", "", "", "manual").await.unwrap();
        store.append_entry(Scope::Video, "abcdefghijk", "", "", "manual").await.unwrap();
        let content = store.get_local_content().await.unwrap();
        assert_eq!(content.matches("abcdefghijk").count(), 1);
    }

    #[tokio::test]
    async fn remove_entry_deletes_line_and_comment() {
        let dir = tempfile::tempdir().unwrap();
        let store = ListStore::new(dir.path(), &dir.path().join("sentinel.db"), ListKind::Blacklist);
        store
            .append_entry(Scope::Video, "abcdefghijk", "Bad video", "", "manual")
            .await
            .unwrap();
        store.remove_entry(Scope::Video, "abcdefghijk").await.unwrap();
        let content = store.get_local_content().await.unwrap();
        assert!(!content.contains("abcdefghijk"));
    }
}
