use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::AppError;

// Country-code Pinterest domains, matched on a label boundary so lookalike
// hosts ending in "pinterest.com" are rejected.
static MAIN_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|\.)pinterest\.(com|co\.uk|de|fr|it|es|ca|jp|ru|br|in)$").unwrap()
});

const SHORT_LINK_HOST: &str = "pin.it";

/// Validate that `raw` is a well-formed URL pointing at a single public
/// pin, returning the normalized URL string. No side effects.
pub fn ensure_pinterest_pin_url(raw: &str) -> Result<String, AppError> {
    let parsed = Url::parse(raw).map_err(|_| AppError::InvalidInput("Invalid URL".to_string()))?;

    let host = parsed
        .host_str()
        .ok_or(AppError::UnsupportedDomain)?
        .to_lowercase();

    let is_main = MAIN_DOMAIN_RE.is_match(&host);
    let is_short = host == SHORT_LINK_HOST;

    if !is_main && !is_short {
        return Err(AppError::UnsupportedDomain);
    }

    // Short links redirect to a pin, so only main domains need a pin path.
    if is_main && !parsed.path().contains("/pin/") {
        return Err(AppError::InvalidInput(
            "URL must point to a specific public pin".to_string(),
        ));
    }

    Ok(parsed.to_string())
}
