use std::sync::LazyLock;

use regex::Regex;

use super::{VideoMetadata, VideoQuality};
use crate::error::AppError;

// Embedded player objects: {"video":{"url":"...mp4","width":W,"height":H}}.
static VIDEO_OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""video"\s*:\s*\{[^}]*?"url"\s*:\s*"([^"]+?\.mp4[^"]*?)"(?:[^}]*?"width"\s*:\s*(\d+))?(?:[^}]*?"height"\s*:\s*(\d+))?[^}]*\}"#,
    )
    .unwrap()
});

// schema.org VideoObject contentUrl fields.
static CONTENT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""contentUrl"\s*:\s*"(https:[^"\\]*\.mp4[^"\\]*)""#).unwrap()
});

// Bare CDN URLs anywhere in the markup.
static DIRECT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https://v\d*\.pinimg\.com/videos/[^"\s]+\.mp4[^"\s]*"#).unwrap()
});

static OG_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+property="og:title"[^>]+content="([^"]+)""#).unwrap()
});

static AUTHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"owner"\s*:\s*\{[^}]*"full_name"\s*:\s*"([^"]+)""#).unwrap()
});

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"duration"\s*:\s*"PT([0-9]+)S""#).unwrap()
});

fn unescape_url(raw: &str) -> String {
    raw.replace(r"\u0026", "&")
}

/// Subtitle tracks occasionally surface next to the real renditions.
fn is_caption_track(url: &str) -> bool {
    url.contains(".vtt") || url.contains("/captions/")
}

/// Pass 1: structured video objects. Label derives from the explicit
/// height when present, `default` otherwise.
fn scan_video_objects(html: &str) -> Vec<VideoQuality> {
    VIDEO_OBJECT_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let url = unescape_url(&caps[1]);
            if is_caption_track(&url) {
                return None;
            }
            let width = caps.get(2).and_then(|m| m.as_str().parse().ok());
            let height: Option<u32> = caps.get(3).and_then(|m| m.as_str().parse().ok());
            let quality_label = match height {
                Some(h) => format!("{}p", h),
                None => "default".to_string(),
            };
            Some(VideoQuality {
                url,
                quality_label: Some(quality_label),
                width,
                height,
                ..Default::default()
            })
        })
        .collect()
}

/// Pass 2: schema contentUrl fields, labeled `SD`.
fn scan_content_urls(html: &str) -> Vec<VideoQuality> {
    CONTENT_URL_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let url = unescape_url(&caps[1]);
            if is_caption_track(&url) {
                return None;
            }
            Some(VideoQuality {
                url,
                quality_label: Some("SD".to_string()),
                ..Default::default()
            })
        })
        .collect()
}

fn quality_from_url(url: &str) -> &'static str {
    if url.contains("_hd") {
        "HD"
    } else if url.contains("_720") {
        "720p"
    } else if url.contains("_480") {
        "480p"
    } else if url.contains("_360") {
        "360p"
    } else {
        "SD"
    }
}

/// Pass 3: bare CDN URLs, quality inferred from the URL itself.
fn scan_direct_urls(html: &str) -> Vec<VideoQuality> {
    DIRECT_URL_RE
        .find_iter(html)
        .filter_map(|m| {
            let url = unescape_url(m.as_str());
            if is_caption_track(&url) {
                return None;
            }
            let quality_label = quality_from_url(&url).to_string();
            Some(VideoQuality {
                url,
                quality_label: Some(quality_label),
                ..Default::default()
            })
        })
        .collect()
}

/// Merge candidate lists in pass order. The URL is the identity: the first
/// pass to see a URL fixes its quality guess, later sightings are dropped.
fn merge_first_wins(passes: Vec<Vec<VideoQuality>>) -> Vec<VideoQuality> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for pass in passes {
        for candidate in pass {
            if seen.insert(candidate.url.clone()) {
                merged.push(candidate);
            }
        }
    }
    merged
}

/// Sort key only. The guess derived from the label is never written back
/// into the quality's `height` field.
fn effective_height(quality: &VideoQuality) -> u32 {
    if let Some(height) = quality.height {
        return height;
    }
    match quality.quality_label.as_deref() {
        Some(label) if label.contains("HD") => 1080,
        Some(label) if label.contains("720") => 720,
        _ => 480,
    }
}

/// Scan raw pin HTML for video renditions and auxiliary fields.
pub fn extract_video_metadata(html: &str, page_url: &str) -> Result<VideoMetadata, AppError> {
    let mut qualities = merge_first_wins(vec![
        scan_video_objects(html),
        scan_content_urls(html),
        scan_direct_urls(html),
    ]);

    if qualities.is_empty() {
        return Err(AppError::NoVideoFound);
    }

    qualities.sort_by(|a, b| effective_height(b).cmp(&effective_height(a)));

    let video_url = qualities[0].url.clone();

    // A lone rendition loses whatever label its pass assigned.
    if qualities.len() == 1 {
        qualities = vec![VideoQuality {
            url: video_url.clone(),
            quality_label: Some("default".to_string()),
            ..Default::default()
        }];
    }

    Ok(VideoMetadata {
        source_url: page_url.to_string(),
        video_url,
        qualities,
        title: OG_TITLE_RE
            .captures(html)
            .map(|caps| caps[1].to_string()),
        author: AUTHOR_RE.captures(html).map(|caps| caps[1].to_string()),
        duration_seconds: DURATION_RE
            .captures(html)
            .and_then(|caps| caps[1].parse().ok()),
    })
}
