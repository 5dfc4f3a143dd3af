use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use chrono::Utc;
use serde::Deserialize;

use super::AppState;
use crate::error::AppError;

const STREAM_TIMEOUT: Duration = Duration::from_secs(30);
const PROXY_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    #[serde(rename = "videoUrl")]
    pub video_url: Option<String>,
}

fn is_pinterest_video_url(url: &str) -> bool {
    url.contains("pinimg.com/videos/")
}

/// Stream a verified CDN video back with forced-download headers. Once the
/// response headers are sent, an upstream failure can only terminate the
/// stream; it is no longer representable as a JSON error.
pub async fn proxy_download(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response, AppError> {
    let video_url = query.video_url.ok_or_else(|| {
        AppError::InvalidInput("Missing required query parameter: videoUrl".to_string())
    })?;

    if !is_pinterest_video_url(&video_url) {
        return Err(AppError::InvalidInput("Invalid video URL".to_string()));
    }

    let upstream = state
        .http
        .get(&video_url)
        .timeout(STREAM_TIMEOUT)
        .header(header::USER_AGENT, PROXY_USER_AGENT)
        .send()
        .await
        .map_err(|err| AppError::UpstreamFetchFailed(err.to_string()))?;

    let status = upstream.status();
    if !status.is_success() {
        return Err(AppError::UpstreamFetchFailed(format!(
            "unexpected status {}",
            status
        )));
    }

    let filename = format!("pinterest-video-{}.mp4", Utc::now().timestamp_millis());
    let content_length = upstream.content_length();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        );
    if let Some(length) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|err| AppError::Internal(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_pinterest_cdn_paths() {
        assert!(is_pinterest_video_url(
            "https://v1.pinimg.com/videos/mc/a_hd.mp4"
        ));
        assert!(is_pinterest_video_url(
            "https://v.pinimg.com/videos/mc/720p/b.mp4?x=1"
        ));
    }

    #[test]
    fn rejects_foreign_urls() {
        assert!(!is_pinterest_video_url("https://example.com/video.mp4"));
        assert!(!is_pinterest_video_url(
            "https://i.pinimg.com/originals/photo.jpg"
        ));
    }
}
