use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max: u32,
    pub api_key_required: bool,
    /// Static key fallback, `key:tier:name` triples.
    pub api_keys: Vec<String>,
    pub pinterest_user_agent: String,
    pub redis_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            port: 8080,
            allowed_origins: Vec::new(),
            rate_limit_window_ms: 60_000,
            rate_limit_max: 60,
            api_key_required: false,
            api_keys: Vec::new(),
            pinterest_user_agent: DEFAULT_USER_AGENT.to_string(),
            redis_url: String::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            env: env_string("NODE_ENV").unwrap_or(defaults.env),
            port: env_number("PORT", defaults.port),
            allowed_origins: env_list("ALLOWED_ORIGINS"),
            rate_limit_window_ms: env_number(
                "GLOBAL_RATE_LIMIT_WINDOW_MS",
                defaults.rate_limit_window_ms,
            ),
            rate_limit_max: env_number("GLOBAL_RATE_LIMIT_MAX", defaults.rate_limit_max),
            api_key_required: env_bool("API_KEY_REQUIRED", defaults.api_key_required),
            api_keys: env_list("API_KEYS"),
            pinterest_user_agent: env_string("PINTEREST_USER_AGENT")
                .unwrap_or(defaults.pinterest_user_agent),
            redis_url: env_string("REDIS_URL").unwrap_or(defaults.redis_url),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_number<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

fn env_bool(key: &str, fallback: bool) -> bool {
    match env_string(key) {
        Some(v) => v == "true" || v == "1",
        None => fallback,
    }
}

fn env_list(key: &str) -> Vec<String> {
    env_string(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
