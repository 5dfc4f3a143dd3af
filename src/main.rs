mod cache;
mod config;
mod error;
mod keys;
mod pinterest;
mod ratelimit;
mod server;

use crate::cache::CacheStore;
use crate::config::AppConfig;
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    let cache = CacheStore::connect(&config.redis_url).await;
    let state = AppState::new(config, cache);

    server::start(state).await
}
