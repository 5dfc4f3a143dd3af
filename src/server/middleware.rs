use std::collections::HashMap;
use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderValue};

use crate::ratelimit::RateLimitDecision;

/// API key lookup order: x-api-key header, then api_key / apiKey query
/// params.
pub fn extract_api_key(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.get("api_key").cloned())
        .or_else(|| query.get("apiKey").cloned())
}

/// Client address: first hop of x-forwarded-for when proxied, the peer
/// socket address otherwise. Unproxied clients must not collapse into a
/// single shared rate-limit bucket.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.reset_at.to_rfc3339()) {
        headers.insert("x-ratelimit-reset", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn header_key_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "from-header".parse().unwrap());
        let mut query = HashMap::new();
        query.insert("api_key".to_string(), "from-query".to_string());

        assert_eq!(
            extract_api_key(&headers, &query).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn query_fallbacks_in_order() {
        let headers = HeaderMap::new();
        let mut query = HashMap::new();
        query.insert("apiKey".to_string(), "camel".to_string());
        assert_eq!(extract_api_key(&headers, &query).as_deref(), Some("camel"));

        query.insert("api_key".to_string(), "snake".to_string());
        assert_eq!(extract_api_key(&headers, &query).as_deref(), Some("snake"));

        assert_eq!(extract_api_key(&headers, &HashMap::new()), None);
    }

    fn peer(addr: &str) -> SocketAddr {
        addr.parse().unwrap()
    }

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "9.9.9.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, peer("192.0.2.1:443")), "9.9.9.9");
    }

    #[test]
    fn client_ip_falls_back_to_peer_address() {
        assert_eq!(
            client_ip(&HeaderMap::new(), peer("203.0.113.9:50214")),
            "203.0.113.9"
        );
    }

    #[test]
    fn unproxied_clients_get_distinct_buckets() {
        let a = client_ip(&HeaderMap::new(), peer("203.0.113.9:50214"));
        let b = client_ip(&HeaderMap::new(), peer("198.51.100.7:39001"));
        assert_ne!(
            crate::ratelimit::rate_limit_key(None, &a),
            crate::ratelimit::rate_limit_key(None, &b)
        );
    }

    #[test]
    fn rate_limit_headers_are_set() {
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(
            &mut headers,
            &RateLimitDecision {
                limit: 10,
                remaining: 4,
                reset_at: Utc::now(),
            },
        );
        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "10");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "4");
        assert!(headers.contains_key("x-ratelimit-reset"));
    }
}
