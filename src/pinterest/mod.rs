pub mod extract;
pub mod filesize;
pub mod robots;
pub mod validate;

use std::time::Duration;

use reqwest::header;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cache::CacheStore;
use crate::error::AppError;
use robots::RobotsGate;

const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const CACHE_NAMESPACE: &str = "pinterest:video:";

/// One discovered rendition of a pin's video. The URL is the identity
/// within an extraction; the size augmenter fills `file_size` in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoQuality {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
}

/// Extraction result. `video_url` always equals the first (best) quality's
/// URL; `qualities` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub source_url: String,
    pub video_url: String,
    pub qualities: Vec<VideoQuality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
}

fn cache_key(normalized_url: &str) -> String {
    let digest = Sha256::digest(normalized_url.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", CACHE_NAMESPACE, hex)
}

/// The scraping pipeline: validate → cache lookup → robots gate → page
/// fetch → extraction → size probes → cache write.
pub struct PinterestService {
    http: reqwest::Client,
    cache: CacheStore,
    robots: RobotsGate,
    user_agent: String,
}

impl PinterestService {
    pub fn new(http: reqwest::Client, cache: CacheStore, user_agent: String) -> Self {
        let robots = RobotsGate::new(http.clone(), user_agent.clone());
        Self {
            http,
            cache,
            robots,
            user_agent,
        }
    }

    pub async fn fetch_video(
        &self,
        url: &str,
        client_ip: &str,
        cache_duration: u64,
    ) -> Result<VideoMetadata, AppError> {
        let normalized = validate::ensure_pinterest_pin_url(url)?;
        let key = cache_key(&normalized);

        // A hit short-circuits the whole pipeline, robots re-check included.
        if let Some(raw) = self.cache.get(&key).await {
            match serde_json::from_str(&raw) {
                Ok(metadata) => {
                    log::info!("Cache hit: {}", normalized);
                    return Ok(metadata);
                }
                Err(err) => log::warn!("Discarding corrupt cache entry for {}: {}", normalized, err),
            }
        }

        self.robots.ensure_allowed(&normalized).await?;

        let html = self.fetch_pin_html(&normalized, client_ip).await?;
        let mut metadata = extract::extract_video_metadata(&html, &normalized)?;

        filesize::attach_file_sizes(&self.http, &self.user_agent, &mut metadata.qualities).await;

        if cache_duration > 0 {
            if let Ok(json) = serde_json::to_string(&metadata) {
                if self.cache.set(&key, &json, cache_duration).await {
                    log::info!("Cached: {}", normalized);
                }
            }
        }

        Ok(metadata)
    }

    async fn fetch_pin_html(&self, url: &str, client_ip: &str) -> Result<String, AppError> {
        let response = self
            .http
            .get(url)
            .timeout(PAGE_FETCH_TIMEOUT)
            .header(header::USER_AGENT, &self.user_agent)
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            )
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(header::REFERER, "https://www.pinterest.com/")
            .header("X-Client-IP", client_ip)
            .send()
            .await
            .map_err(|err| AppError::UpstreamFetchFailed(err.to_string()))?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(AppError::UpstreamFetchFailed(format!(
                "unexpected status {}",
                status
            )));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html");
        if !content_type.contains("text") {
            return Err(AppError::UpstreamFetchFailed(
                "unexpected non-text response body".to_string(),
            ));
        }

        response
            .text()
            .await
            .map_err(|err| AppError::UpstreamFetchFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_deterministic_and_namespaced() {
        let a = cache_key("https://www.pinterest.com/pin/123/");
        let b = cache_key("https://www.pinterest.com/pin/123/");
        let c = cache_key("https://www.pinterest.com/pin/124/");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("pinterest:video:"));
        // sha256 hex digest
        assert_eq!(a.len(), "pinterest:video:".len() + 64);
    }

    #[test]
    fn metadata_round_trips_through_cache_serialization() {
        let metadata = VideoMetadata {
            source_url: "https://www.pinterest.com/pin/123/".into(),
            video_url: "https://v.pinimg.com/videos/mc/a_hd.mp4".into(),
            qualities: vec![
                VideoQuality {
                    url: "https://v.pinimg.com/videos/mc/a_hd.mp4".into(),
                    quality_label: Some("HD".into()),
                    file_size: Some(1_048_576),
                    ..Default::default()
                },
                VideoQuality {
                    url: "https://v.pinimg.com/videos/mc/a_480.mp4".into(),
                    quality_label: Some("480p".into()),
                    ..Default::default()
                },
            ],
            title: Some("A pin".into()),
            author: None,
            duration_seconds: None,
        };

        let json = serde_json::to_string(&metadata).unwrap();
        // Absent duration serializes as an explicit null; absent author is omitted.
        assert!(json.contains("\"durationSeconds\":null"));
        assert!(!json.contains("\"author\""));
        assert!(json.contains("\"fileSize\":1048576"));

        let back: VideoMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
        assert_eq!(back.video_url, back.qualities[0].url);
    }
}
