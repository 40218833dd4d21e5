//! Video metadata lookup. Grounded on
//! `original_source/app/main.py::fetch_video_metadata` (oEmbed, 5s timeout,
//! stub fallback on any failure).

use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct VideoMetadata {
    pub title: String,
    pub channel_title: String,
    pub channel_id: String,
    pub thumbnail_url: String,
}

fn stub(video_id: &str) -> VideoMetadata {
    VideoMetadata {
        title: format!("Video {video_id}"),
        channel_title: String::new(),
        channel_id: String::new(),
        thumbnail_url: format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg"),
    }
}

pub struct MetadataFetcher {
    http: reqwest::Client,
}

impl MetadataFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client with timeout always builds");
        Self { http }
    }

    pub async fn fetch(&self, video_id: &str) -> VideoMetadata {
        let url = format!(
            "https://www.youtube.com/oembed?url=https://www.youtube.com/watch?v={video_id}&format=json"
        );
        let response = match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return stub(video_id),
        };
        let data: serde_json::Value = match response.json().await {
            Ok(value) => value,
            Err(_) => return stub(video_id),
        };
        VideoMetadata {
            title: data.get("title").and_then(|v| v.as_str()).unwrap_or(&format!("Video {video_id}")).to_string(),
            channel_title: data.get("author_name").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            channel_id: String::new(),
            thumbnail_url: data
                .get("thumbnail_url")
                .and_then(|v| v.as_str())
                .unwrap_or(&format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg"))
                .to_string(),
        }
    }
}

impl Default for MetadataFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_metadata_carries_a_readable_title_and_thumbnail() {
        let meta = stub("abcdefghijk");
        assert_eq!(meta.title, "Video abcdefghijk");
        assert!(meta.thumbnail_url.contains("abcdefghijk"));
    }
}
