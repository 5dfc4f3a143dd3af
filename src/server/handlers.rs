use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{middleware, AppState};
use crate::error::AppError;
use crate::keys::{tier_limits, ApiKeyRecord, ApiKeyTier};
use crate::ratelimit::rate_limit_key;

const DEFAULT_CACHE_DURATION_SECS: u64 = 3_600;

const DISCLAIMER: &str = "This tool is for downloading public Pinterest videos only. \
Users are responsible for copyright compliance and must only download content they \
own or have permission to use.";

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: Option<String>,
}

pub async fn download_video(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<DownloadRequest>,
) -> Result<Response, AppError> {
    let url = body
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput("Missing required field: url".to_string()))?;

    let client_ip = middleware::client_ip(&headers, peer);
    let api_key = middleware::extract_api_key(&headers, &query);

    let key_record: Option<ApiKeyRecord> = match &api_key {
        Some(key) => Some(state.keys.authorize(key).await?),
        None if state.config.api_key_required => return Err(AppError::MissingApiKey),
        None => None,
    };

    let (max_requests, cache_duration) = match &key_record {
        Some(record) => {
            let limits = tier_limits(record.tier);
            (limits.requests_per_minute, limits.cache_duration)
        }
        None => (state.config.rate_limit_max, DEFAULT_CACHE_DURATION_SECS),
    };

    let identifier = rate_limit_key(
        key_record
            .as_ref()
            .map(|r| (r.tier.as_str(), r.key.as_str())),
        &client_ip,
    );
    let decision = state.limiter.check(&identifier, max_requests).await?;

    let video = state
        .pinterest
        .fetch_video(&url, &client_ip, cache_duration)
        .await?;

    let mut response = Json(json!({
        "success": true,
        "data": video,
        "disclaimer": DISCLAIMER,
    }))
    .into_response();
    middleware::apply_rate_limit_headers(response.headers_mut(), &decision);
    Ok(response)
}

pub async fn key_usage(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::MissingApiKey)?;

    let stats = state.keys.usage(api_key).await?;
    Ok(Json(json!({
        "success": true,
        "data": stats,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    pub name: Option<String>,
    pub tier: Option<String>,
    pub expires_in_days: Option<u32>,
}

pub async fn create_key(
    State(state): State<AppState>,
    Json(body): Json<CreateKeyRequest>,
) -> Result<Response, AppError> {
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Name is required".to_string()))?;

    let tier = match body.tier.as_deref() {
        Some(raw) => ApiKeyTier::from_str_loose(raw)
            .ok_or_else(|| AppError::InvalidInput("Invalid tier".to_string()))?,
        None => ApiKeyTier::Free,
    };

    if body.expires_in_days == Some(0) {
        return Err(AppError::InvalidInput("Invalid expiration".to_string()));
    }

    let record = state.keys.create(name, tier, body.expires_in_days).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": record,
            "message": "API key created successfully. Store it securely - it cannot be retrieved again.",
        })),
    )
        .into_response())
}

pub async fn list_tiers() -> Json<Value> {
    let tiers: Vec<Value> = ApiKeyTier::all()
        .iter()
        .map(|tier| {
            let mut entry = serde_json::to_value(tier_limits(*tier)).unwrap_or(json!({}));
            if let Some(object) = entry.as_object_mut() {
                object.insert("tier".to_string(), json!(tier.as_str()));
            }
            entry
        })
        .collect();

    Json(json!({
        "success": true,
        "data": { "tiers": tiers },
    }))
}
