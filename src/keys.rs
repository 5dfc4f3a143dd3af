use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::error::AppError;

const API_KEY_PREFIX: &str = "apikey:";
const KEY_RECORD_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyTier {
    Free,
    Pro,
    Enterprise,
}

impl ApiKeyTier {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Free, Self::Pro, Self::Enterprise]
    }
}

/// Static per-tier ceilings; never mutated at runtime.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierLimits {
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
    /// Result-cache expiry, seconds.
    pub cache_duration: u64,
    pub allow_bulk_download: bool,
    pub allow_high_quality: bool,
}

pub fn tier_limits(tier: ApiKeyTier) -> TierLimits {
    match tier {
        ApiKeyTier::Free => TierLimits {
            requests_per_minute: 10,
            requests_per_day: 100,
            cache_duration: 3_600,
            allow_bulk_download: false,
            allow_high_quality: false,
        },
        ApiKeyTier::Pro => TierLimits {
            requests_per_minute: 60,
            requests_per_day: 5_000,
            cache_duration: 7_200,
            allow_bulk_download: true,
            allow_high_quality: true,
        },
        ApiKeyTier::Enterprise => TierLimits {
            requests_per_minute: 300,
            requests_per_day: 50_000,
            cache_duration: 14_400,
            allow_bulk_download: true,
            allow_high_quality: true,
        },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRecord {
    pub key: String,
    pub tier: ApiKeyTier,
    pub name: String,
    pub requests_per_day: u32,
    pub requests_today: u32,
    /// Calendar day (YYYY-MM-DD) the daily counter was last reset on.
    pub last_reset_date: String,
    pub active: bool,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl ApiKeyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|expiry| expiry < now)
            .unwrap_or(false)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub requests_today: u32,
    pub requests_per_day: u32,
    pub remaining: u32,
    pub tier: ApiKeyTier,
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Reset the daily counter once the stored reset date falls behind `today`.
fn roll_day(record: &mut ApiKeyRecord, today: &str) {
    if record.last_reset_date != today {
        record.requests_today = 0;
        record.last_reset_date = today.to_string();
    }
}

/// Owns API key records: shared store first, then an in-memory fallback,
/// then static `key:tier:name` config triples. In fallback mode the daily
/// accounting is per-process rather than global.
pub struct KeyLedger {
    store: CacheStore,
    fallback: Mutex<HashMap<String, ApiKeyRecord>>,
    config_keys: Vec<String>,
}

impl KeyLedger {
    pub fn new(store: CacheStore, config_keys: Vec<String>) -> Self {
        Self {
            store,
            fallback: Mutex::new(HashMap::new()),
            config_keys,
        }
    }

    fn parse_config_record(&self, key: &str) -> Option<ApiKeyRecord> {
        // Anchored on the key's colon boundary so a prefix of a configured
        // key never resolves to that key's record.
        let entry = self
            .config_keys
            .iter()
            .find(|k| k.as_str() == key || k.starts_with(&format!("{}:", key)))?;
        let mut parts = entry.split(':');
        parts.next(); // the key itself
        let tier = parts
            .next()
            .and_then(ApiKeyTier::from_str_loose)
            .unwrap_or(ApiKeyTier::Free);
        let name = parts.next().unwrap_or("Unknown").to_string();

        Some(ApiKeyRecord {
            key: key.to_string(),
            tier,
            name,
            requests_per_day: tier_limits(tier).requests_per_day,
            requests_today: 0,
            last_reset_date: today(),
            active: true,
            created_at: Utc::now().to_rfc3339(),
            expires_at: None,
        })
    }

    async fn load(&self, key: &str) -> Option<ApiKeyRecord> {
        if let Some(raw) = self.store.get(&format!("{}{}", API_KEY_PREFIX, key)).await {
            match serde_json::from_str(&raw) {
                Ok(record) => return Some(record),
                Err(err) => log::error!("Corrupt API key record for {}: {}", key, err),
            }
        }

        if let Some(record) = self.fallback.lock().unwrap().get(key).cloned() {
            return Some(record);
        }

        let record = self.parse_config_record(key)?;
        self.save(&record).await;
        Some(record)
    }

    async fn save(&self, record: &ApiKeyRecord) {
        let stored = match serde_json::to_string(record) {
            Ok(json) => {
                self.store
                    .set(
                        &format!("{}{}", API_KEY_PREFIX, record.key),
                        &json,
                        KEY_RECORD_TTL_SECS,
                    )
                    .await
            }
            Err(_) => false,
        };
        if !stored {
            self.fallback
                .lock()
                .unwrap()
                .insert(record.key.clone(), record.clone());
        }
    }

    /// Full per-request check: existence, active flag, expiry, daily quota.
    /// Increments the day counter on success.
    pub async fn authorize(&self, key: &str) -> Result<ApiKeyRecord, AppError> {
        let mut record = self.load(key).await.ok_or(AppError::InvalidKey)?;

        if !record.active {
            return Err(AppError::InvalidKey);
        }
        if record.is_expired(Utc::now()) {
            return Err(AppError::KeyExpired);
        }

        roll_day(&mut record, &today());
        record.requests_today += 1;
        self.save(&record).await;

        let limit = tier_limits(record.tier).requests_per_day;
        if record.requests_today > limit {
            return Err(AppError::DailyLimitExceeded { limit });
        }

        Ok(record)
    }

    pub async fn create(
        &self,
        name: &str,
        tier: ApiKeyTier,
        expires_in_days: Option<u32>,
    ) -> ApiKeyRecord {
        let now = Utc::now();
        let record = ApiKeyRecord {
            key: format!("pvd_{}", uuid::Uuid::new_v4().simple()),
            tier,
            name: name.to_string(),
            requests_per_day: tier_limits(tier).requests_per_day,
            requests_today: 0,
            last_reset_date: now.format("%Y-%m-%d").to_string(),
            active: true,
            created_at: now.to_rfc3339(),
            expires_at: expires_in_days
                .map(|days| (now + Duration::days(days as i64)).to_rfc3339()),
        };
        self.save(&record).await;
        record
    }

    pub async fn usage(&self, key: &str) -> Result<UsageStats, AppError> {
        let mut record = self.load(key).await.ok_or(AppError::InvalidKey)?;
        if !record.active {
            return Err(AppError::InvalidKey);
        }
        if record.is_expired(Utc::now()) {
            return Err(AppError::KeyExpired);
        }

        roll_day(&mut record, &today());
        let limit = tier_limits(record.tier).requests_per_day;
        Ok(UsageStats {
            requests_today: record.requests_today,
            requests_per_day: limit,
            remaining: limit.saturating_sub(record.requests_today),
            tier: record.tier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with_keys(keys: &[&str]) -> KeyLedger {
        KeyLedger::new(
            CacheStore::disabled(),
            keys.iter().map(|k| k.to_string()).collect(),
        )
    }

    #[test]
    fn tier_parsing_is_loose() {
        assert_eq!(ApiKeyTier::from_str_loose("PRO"), Some(ApiKeyTier::Pro));
        assert_eq!(ApiKeyTier::from_str_loose(" free "), Some(ApiKeyTier::Free));
        assert_eq!(ApiKeyTier::from_str_loose("gold"), None);
    }

    #[test]
    fn roll_day_resets_once() {
        let mut record = ApiKeyRecord {
            key: "k".into(),
            tier: ApiKeyTier::Free,
            name: "n".into(),
            requests_per_day: 100,
            requests_today: 42,
            last_reset_date: "2024-01-01".into(),
            active: true,
            created_at: Utc::now().to_rfc3339(),
            expires_at: None,
        };
        roll_day(&mut record, "2024-01-02");
        assert_eq!(record.requests_today, 0);
        assert_eq!(record.last_reset_date, "2024-01-02");

        record.requests_today = 7;
        roll_day(&mut record, "2024-01-02");
        assert_eq!(record.requests_today, 7);
    }

    #[test]
    fn expiry_uses_rfc3339_timestamps() {
        let now = Utc::now();
        let mut record = ApiKeyRecord {
            key: "k".into(),
            tier: ApiKeyTier::Free,
            name: "n".into(),
            requests_per_day: 100,
            requests_today: 0,
            last_reset_date: today(),
            active: true,
            created_at: now.to_rfc3339(),
            expires_at: Some((now - Duration::days(1)).to_rfc3339()),
        };
        assert!(record.is_expired(now));
        record.expires_at = Some((now + Duration::days(1)).to_rfc3339());
        assert!(!record.is_expired(now));
        record.expires_at = None;
        assert!(!record.is_expired(now));
    }

    #[tokio::test]
    async fn config_triples_resolve_tier_and_name() {
        let ledger = ledger_with_keys(&["abc123:pro:Company A", "xyz:enterprise"]);
        let record = ledger.authorize("abc123").await.unwrap();
        assert_eq!(record.tier, ApiKeyTier::Pro);
        assert_eq!(record.name, "Company A");

        let record = ledger.authorize("xyz").await.unwrap();
        assert_eq!(record.tier, ApiKeyTier::Enterprise);
        assert_eq!(record.name, "Unknown");
    }

    #[tokio::test]
    async fn config_lookup_rejects_key_prefixes() {
        let ledger = ledger_with_keys(&["abc123:pro:Company A", "bare-key"]);
        assert!(matches!(
            ledger.authorize("abc").await,
            Err(AppError::InvalidKey)
        ));
        assert!(matches!(
            ledger.authorize("bare").await,
            Err(AppError::InvalidKey)
        ));
        // Exact matches still resolve, with and without tier suffix.
        assert!(ledger.authorize("abc123").await.is_ok());
        assert!(ledger.authorize("bare-key").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_key_is_rejected() {
        let ledger = ledger_with_keys(&["abc123:pro:Company A"]);
        assert!(matches!(
            ledger.authorize("nope").await,
            Err(AppError::InvalidKey)
        ));
    }

    #[tokio::test]
    async fn daily_quota_enforced_in_fallback_mode() {
        let ledger = ledger_with_keys(&[]);
        let record = ledger.create("tester", ApiKeyTier::Free, None).await;

        for _ in 0..100 {
            ledger.authorize(&record.key).await.unwrap();
        }
        match ledger.authorize(&record.key).await {
            Err(AppError::DailyLimitExceeded { limit }) => assert_eq!(limit, 100),
            other => panic!("expected DailyLimitExceeded, got {:?}", other.map(|r| r.key)),
        }
    }

    #[tokio::test]
    async fn expired_key_is_rejected() {
        let ledger = ledger_with_keys(&[]);
        let now = Utc::now();
        let record = ApiKeyRecord {
            key: "pvd_stale".into(),
            tier: ApiKeyTier::Pro,
            name: "tester".into(),
            requests_per_day: 5_000,
            requests_today: 0,
            last_reset_date: today(),
            active: true,
            created_at: (now - Duration::days(30)).to_rfc3339(),
            expires_at: Some((now - Duration::days(1)).to_rfc3339()),
        };
        ledger.save(&record).await;

        assert!(matches!(
            ledger.authorize("pvd_stale").await,
            Err(AppError::KeyExpired)
        ));

        // A future expiry still authorizes.
        let record = ledger.create("tester", ApiKeyTier::Pro, Some(1)).await;
        assert!(ledger.authorize(&record.key).await.is_ok());
    }

    #[tokio::test]
    async fn usage_reports_remaining_without_incrementing() {
        let ledger = ledger_with_keys(&[]);
        let record = ledger.create("tester", ApiKeyTier::Free, None).await;
        ledger.authorize(&record.key).await.unwrap();

        let stats = ledger.usage(&record.key).await.unwrap();
        assert_eq!(stats.requests_today, 1);
        assert_eq!(stats.remaining, 99);

        let stats = ledger.usage(&record.key).await.unwrap();
        assert_eq!(stats.requests_today, 1);
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = ApiKeyRecord {
            key: "pvd_x".into(),
            tier: ApiKeyTier::Enterprise,
            name: "Big Corp".into(),
            requests_per_day: 50_000,
            requests_today: 3,
            last_reset_date: "2024-06-01".into(),
            active: true,
            created_at: "2024-05-01T00:00:00+00:00".into(),
            expires_at: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"requestsPerDay\":50000"));
        assert!(json.contains("\"tier\":\"enterprise\""));
        let back: ApiKeyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.requests_today, 3);
    }
}
