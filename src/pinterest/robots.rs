use std::sync::{Arc, RwLock};
use std::time::Duration;

use robotstxt::DefaultMatcher;

use crate::error::AppError;

const ROBOTS_URL: &str = "https://www.pinterest.com/robots.txt";
const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Process-lifetime robots.txt gate. The rules body is fetched once on
/// first use and never refreshed; an operator restart picks up policy
/// changes. Verification failures fail closed.
pub struct RobotsGate {
    http: reqwest::Client,
    user_agent: String,
    rules: RwLock<Option<Arc<str>>>,
}

impl RobotsGate {
    pub fn new(http: reqwest::Client, user_agent: String) -> Self {
        Self {
            http,
            user_agent,
            rules: RwLock::new(None),
        }
    }

    /// `Ok(())` when the configured user agent may fetch `url`.
    /// `PolicyDenied` on an explicit disallow, `PolicyUnverifiable` when the
    /// rules cannot be obtained.
    pub async fn ensure_allowed(&self, url: &str) -> Result<(), AppError> {
        let rules = self.rules().await?;
        if !allowed_by(&rules, &self.user_agent, url) {
            return Err(AppError::PolicyDenied);
        }
        Ok(())
    }

    async fn rules(&self) -> Result<Arc<str>, AppError> {
        if let Some(cached) = self.rules.read().unwrap().clone() {
            return Ok(cached);
        }

        // Concurrent first-time callers may fetch twice; the value is
        // idempotent so the lock is not held across the await.
        let body = self.fetch_rules().await.map_err(|err| {
            log::warn!("Failed to fetch robots.txt, failing closed: {}", err);
            AppError::PolicyUnverifiable
        })?;

        let body: Arc<str> = body.into();
        *self.rules.write().unwrap() = Some(Arc::clone(&body));
        Ok(body)
    }

    async fn fetch_rules(&self) -> Result<String, reqwest::Error> {
        let response = self
            .http
            .get(ROBOTS_URL)
            .timeout(ROBOTS_FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        response.text().await
    }
}

fn allowed_by(rules: &str, user_agent: &str, url: &str) -> bool {
    let mut matcher = DefaultMatcher::default();
    matcher.one_agent_allowed_by_robots(rules, user_agent, url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = "User-agent: *\nDisallow: /private/\nAllow: /pin/\n";
    const UA: &str = "Mozilla/5.0 Chrome/120";

    #[test]
    fn explicit_disallow_is_denied() {
        assert!(!allowed_by(
            RULES,
            UA,
            "https://www.pinterest.com/private/secret/"
        ));
    }

    #[test]
    fn pin_paths_are_allowed() {
        assert!(allowed_by(RULES, UA, "https://www.pinterest.com/pin/123/"));
    }

    #[test]
    fn empty_rules_allow_everything() {
        assert!(allowed_by("", UA, "https://www.pinterest.com/pin/123/"));
    }
}
