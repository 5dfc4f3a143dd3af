pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::CacheStore;
use crate::config::AppConfig;
use crate::keys::KeyLedger;
use crate::pinterest::PinterestService;
use crate::ratelimit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pinterest: Arc<PinterestService>,
    pub keys: Arc<KeyLedger>,
    pub limiter: Arc<RateLimiter>,
    pub http: reqwest::Client,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, cache: CacheStore) -> Self {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_default();

        let pinterest = Arc::new(PinterestService::new(
            http.clone(),
            cache.clone(),
            config.pinterest_user_agent.clone(),
        ));
        let keys = Arc::new(KeyLedger::new(cache.clone(), config.api_keys.clone()));
        let limiter = Arc::new(RateLimiter::new(
            cache,
            std::time::Duration::from_millis(config.rate_limit_window_ms),
        ));

        Self {
            config: Arc::new(config),
            pinterest,
            keys,
            limiter,
            http,
            started_at: Instant::now(),
        }
    }
}

pub async fn start(state: AppState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    state.limiter.spawn_sweeper();

    let port = state.config.port;
    let app = router::create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("pinfetch API listening on {}", addr);

    // ConnectInfo backs the per-IP rate-limit identity for unproxied clients.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
