//! Per-client fixed-window rate limiting for unauthenticated endpoints.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::audit::client_ip;
use super::error::{ErrorBody, ErrorResponse};
use crate::config::RateLimitConfig;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Login and registration
    Auth,
    /// Public listings and application submission
    Public,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    used: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<(String, RateLimitTier), Window>,
    config: RateLimitConfig,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
        }
    }

    fn limit(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Auth => self.config.auth_requests_per_window,
            RateLimitTier::Public => self.config.public_requests_per_window,
        }
    }

    /// Count one request from `client`. Returns the remaining allowance, or
    /// the number of seconds to wait when the window is used up.
    pub fn check(&self, client: &str, tier: RateLimitTier) -> Result<u32, u64> {
        if !self.config.enabled {
            return Ok(u32::MAX);
        }

        let limit = self.limit(tier);
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry((client.to_string(), tier))
            .or_insert(Window { started: now, used: 0 });

        let elapsed = now.duration_since(entry.started);
        if elapsed >= self.window {
            *entry = Window { started: now, used: 0 };
        }

        if entry.used < limit {
            entry.used += 1;
            Ok(limit - entry.used)
        } else {
            let wait = self.window.saturating_sub(now.duration_since(entry.started));
            Err(wait.as_secs().max(1))
        }
    }

    /// Drop windows that ended long enough ago to be irrelevant
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let keep = self.window * 2;
        self.windows
            .retain(|_, w| now.duration_since(w.started) < keep);
    }

    pub fn entry_count(&self) -> usize {
        self.windows.len()
    }
}

pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    limit_request(&state, request, next, RateLimitTier::Auth).await
}

pub async fn rate_limit_public(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    limit_request(&state, request, next, RateLimitTier::Public).await
}

/// Bucket key for a request: the peer address, or the proxy-reported client
/// when proxy headers are trusted
fn client_key(request: &Request, trust_proxy_headers: bool) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr);

    let ip = if trust_proxy_headers {
        client_ip(request.headers(), peer)
    } else {
        peer.map(|addr| addr.ip().to_string())
    };
    ip.unwrap_or_else(|| "unknown".to_string())
}

async fn limit_request(
    state: &AppState,
    request: Request,
    next: Next,
    tier: RateLimitTier,
) -> Response {
    let client = client_key(&request, state.config.rate_limit.trust_proxy_headers);

    match state.rate_limiter.check(&client, tier) {
        Ok(remaining) => {
            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
                response.headers_mut().insert("X-RateLimit-Remaining", value);
            }
            response
        }
        Err(retry_after) => {
            tracing::warn!(client = %client, ?tier, "Rate limit exceeded");
            let body = ErrorResponse {
                error: ErrorBody {
                    code: "too_many_requests".to_string(),
                    message: format!("Rate limit exceeded. Try again in {} seconds.", retry_after),
                    details: None,
                },
            };
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.to_string())],
                Json(body),
            )
                .into_response()
        }
    }
}

/// Periodically forget stale windows
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            rate_limiter.cleanup_expired();
            tracing::debug!(entries = rate_limiter.entry_count(), "Rate limiter cleanup complete");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auth: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            window_seconds: 60,
            auth_requests_per_window: auth,
            public_requests_per_window: 50,
            cleanup_interval: 300,
            trust_proxy_headers: false,
        }
    }

    #[test]
    fn test_blocks_after_limit() {
        let limiter = RateLimiter::new(config(3));
        assert_eq!(limiter.check("10.0.0.1", RateLimitTier::Auth), Ok(2));
        assert_eq!(limiter.check("10.0.0.1", RateLimitTier::Auth), Ok(1));
        assert_eq!(limiter.check("10.0.0.1", RateLimitTier::Auth), Ok(0));
        let wait = limiter.check("10.0.0.1", RateLimitTier::Auth).unwrap_err();
        assert!(wait >= 1 && wait <= 60);
    }

    #[test]
    fn test_clients_and_tiers_are_separate() {
        let limiter = RateLimiter::new(config(1));
        assert!(limiter.check("10.0.0.1", RateLimitTier::Auth).is_ok());
        assert!(limiter.check("10.0.0.1", RateLimitTier::Auth).is_err());
        assert!(limiter.check("10.0.0.2", RateLimitTier::Auth).is_ok());
        assert!(limiter.check("10.0.0.1", RateLimitTier::Public).is_ok());
    }

    #[test]
    fn test_disabled_never_blocks() {
        let mut cfg = config(1);
        cfg.enabled = false;
        let limiter = RateLimiter::new(cfg);
        for _ in 0..20 {
            assert!(limiter.check("10.0.0.1", RateLimitTier::Auth).is_ok());
        }
        assert_eq!(limiter.entry_count(), 0);
    }

    #[test]
    fn test_cleanup_keeps_recent_windows() {
        let limiter = RateLimiter::new(config(5));
        let _ = limiter.check("10.0.0.1", RateLimitTier::Auth);
        limiter.cleanup_expired();
        assert_eq!(limiter.entry_count(), 1);
    }

    fn request_from(peer: Option<[u8; 4]>, forwarded_for: Option<&'static str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/auth/login");
        if let Some(value) = forwarded_for {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut request = builder.body(axum::body::Body::empty()).unwrap();
        if let Some(ip) = peer {
            request
                .extensions_mut()
                .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
        }
        request
    }

    #[test]
    fn test_client_key_uses_peer_address_by_default() {
        let request = request_from(Some([198, 51, 100, 7]), Some("203.0.113.9"));
        assert_eq!(client_key(&request, false), "198.51.100.7");

        let other = request_from(Some([198, 51, 100, 8]), None);
        assert_eq!(client_key(&other, false), "198.51.100.8");

        assert_eq!(client_key(&request_from(None, None), false), "unknown");
    }

    #[test]
    fn test_client_key_trusts_proxy_headers_when_configured() {
        let request = request_from(Some([10, 0, 0, 2]), Some("203.0.113.9, 10.0.0.2"));
        assert_eq!(client_key(&request, true), "203.0.113.9");

        let garbage = request_from(Some([10, 0, 0, 2]), Some("spoofed"));
        assert_eq!(client_key(&garbage, true), "10.0.0.2");
    }
}
