use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Thin wrapper around a shared Redis connection. Every operation degrades
/// to a no-op miss when the store is unconfigured or unreachable, so the
/// request pipeline never depends on cache availability.
#[derive(Clone)]
pub struct CacheStore {
    conn: Option<ConnectionManager>,
}

impl CacheStore {
    pub async fn connect(redis_url: &str) -> Self {
        if redis_url.is_empty() {
            log::warn!("Redis not configured - caching disabled");
            return Self::disabled();
        }

        let client = match redis::Client::open(redis_url) {
            Ok(client) => client,
            Err(err) => {
                log::warn!("Redis initialization failed: {}", err);
                return Self::disabled();
            }
        };

        match ConnectionManager::new(client).await {
            Ok(conn) => {
                log::info!("Redis connected");
                Self { conn: Some(conn) }
            }
            Err(err) => {
                log::warn!("Redis connection failed: {}", err);
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { conn: None }
    }

    pub fn is_ready(&self) -> bool {
        self.conn.is_some()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone()?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(err) => {
                log::error!("Redis GET error: {}", err);
                None
            }
        }
    }

    /// Set a value, with expiry when `expiry_secs > 0`.
    pub async fn set(&self, key: &str, value: &str, expiry_secs: u64) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        let result = if expiry_secs > 0 {
            conn.set_ex::<_, _, ()>(key, value, expiry_secs).await
        } else {
            conn.set::<_, _, ()>(key, value).await
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                log::error!("Redis SET error: {}", err);
                false
            }
        }
    }

    /// Increment a counter, returning the new value. `None` means the store
    /// is unavailable and the caller should fall back to local state.
    pub async fn incr(&self, key: &str) -> Option<i64> {
        let mut conn = self.conn.clone()?;
        match conn.incr::<_, _, i64>(key, 1).await {
            Ok(value) => Some(value),
            Err(err) => {
                log::error!("Redis INCR error: {}", err);
                None
            }
        }
    }

    pub async fn expire(&self, key: &str, seconds: i64) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        match conn.expire::<_, ()>(key, seconds).await {
            Ok(()) => true,
            Err(err) => {
                log::error!("Redis EXPIRE error: {}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_store_misses_everything() {
        let store = CacheStore::disabled();
        assert!(!store.is_ready());
        assert_eq!(store.get("pinterest:video:abc").await, None);
        assert!(!store.set("pinterest:video:abc", "{}", 60).await);
        assert_eq!(store.incr("ratelimit:ip:1.2.3.4").await, None);
        assert!(!store.expire("ratelimit:ip:1.2.3.4", 60).await);
    }

    #[tokio::test]
    async fn empty_url_disables_store() {
        let store = CacheStore::connect("").await;
        assert!(!store.is_ready());
    }
}
