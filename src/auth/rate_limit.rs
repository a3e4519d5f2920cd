use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::AppState;

/// Fixed-window counters keyed by client and route, for single-instance
/// deployments.
#[derive(Clone, Default)]
pub struct RateLimitState {
    entries: Arc<Mutex<HashMap<String, RateLimitEntry>>>,
}

struct RateLimitEntry {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a request against `key`. Returns the remaining allowance, or how
    /// long until the window resets.
    pub async fn check_with_limits(
        &self,
        key: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> Result<u32, Duration> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(window_secs);

        let entry = entries.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
            window,
        });

        if now.duration_since(entry.window_start) > window {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.window = window;

        if entry.count >= max_requests {
            return Err(window.saturating_sub(now.duration_since(entry.window_start)));
        }

        entry.count += 1;
        Ok(max_requests - entry.count)
    }

    /// Drops entries idle for two of their windows.
    pub async fn cleanup(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.window_start) < e.window * 2);
        before - entries.len()
    }

    pub fn spawn_cleanup_worker(&self, every: Duration) {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = limiter.cleanup().await;
                if removed > 0 {
                    tracing::debug!(removed, "Rate limit entries expired");
                }
            }
        });
    }
}

async fn enforce(
    state: &AppState,
    key: String,
    max_requests: u32,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let window = state.config.auth_rate_limit_window_secs;
    match state.rate_limiter.check_with_limits(&key, max_requests, window).await {
        Ok(remaining) => {
            tracing::debug!(key = %key, remaining, "Rate limit check passed");
            Ok(next.run(req).await)
        }
        Err(retry_after) => {
            tracing::warn!(
                key = %key,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            Err(AppError::RateLimited)
        }
    }
}

/// Per IP and path, so /login and /register are limited separately.
pub async fn rate_limit_auth(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = format!("{}:{}", addr.ip(), req.uri().path());
    let max = state.config.auth_rate_limit_max;
    enforce(&state, key, max, req, next).await
}

/// Photo analysis fans out to several AI calls, so it gets its own budget.
pub async fn rate_limit_analyze(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = format!("analyze:{}", addr.ip());
    let max = state.config.analyze_rate_limit_max;
    enforce(&state, key, max, req, next).await
}
