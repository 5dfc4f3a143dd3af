use std::time::Duration;

use futures_util::future::join_all;
use reqwest::header;

use super::VideoQuality;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Enrich each quality with its byte size via concurrent HEAD probes.
/// Individual failures leave `file_size` unset; the fan-out always waits
/// for every probe to settle and never fails the overall request.
pub async fn attach_file_sizes(
    http: &reqwest::Client,
    user_agent: &str,
    qualities: &mut [VideoQuality],
) {
    let probes = qualities
        .iter()
        .map(|quality| probe_content_length(http, user_agent, quality.url.clone()));
    let sizes = join_all(probes).await;

    for (quality, size) in qualities.iter_mut().zip(sizes) {
        match size {
            Some(bytes) => quality.file_size = Some(bytes),
            None => log::warn!(
                "Failed to fetch file size for {}",
                quality.quality_label.as_deref().unwrap_or("unknown")
            ),
        }
    }
}

async fn probe_content_length(
    http: &reqwest::Client,
    user_agent: &str,
    url: String,
) -> Option<u64> {
    let response = http
        .head(&url)
        .timeout(PROBE_TIMEOUT)
        .header(header::USER_AGENT, user_agent)
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        return None;
    }

    response
        .headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
