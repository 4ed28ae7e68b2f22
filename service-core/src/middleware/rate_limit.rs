use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use crate::error::AppError;
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

type KeyedLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Rate limiter keyed by client IP address
#[derive(Clone)]
pub struct IpRateLimiter {
    limiter: Arc<KeyedLimiter>,
    trusted_proxy_hops: usize,
}

fn quota(attempts: u32, window_seconds: u64) -> Quota {
    let burst = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);
    let period_ms = (window_seconds.saturating_mul(1000) / u64::from(burst.get())).max(1);

    Quota::with_period(Duration::from_millis(period_ms))
        .map(|q| q.allow_burst(burst))
        .unwrap_or_else(|| Quota::per_second(burst))
}

/// Allows `attempts` requests per IP within `window_seconds`, refilling evenly.
///
/// `trusted_proxy_hops` is the number of reverse proxies in front of the
/// service; see [`resolve_client_ip`].
pub fn create_ip_rate_limiter(
    attempts: u32,
    window_seconds: u64,
    trusted_proxy_hops: usize,
) -> IpRateLimiter {
    IpRateLimiter {
        limiter: Arc::new(RateLimiter::dashmap(quota(attempts, window_seconds))),
        trusted_proxy_hops,
    }
}

/// Resolves the caller address.
///
/// With no trusted proxies the socket peer is the client and
/// `x-forwarded-for` is ignored. Behind `trusted_proxy_hops` proxies the
/// client is the entry the outermost proxy appended, counted from the right;
/// anything further left is caller-supplied.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted_proxy_hops: usize,
) -> Option<IpAddr> {
    if trusted_proxy_hops == 0 {
        return peer;
    }

    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    hops.len()
        .checked_sub(trusted_proxy_hops)
        .and_then(|i| hops[i].parse::<IpAddr>().ok())
        .or(peer)
}

/// Caller address of `request` for a limiter trusting `trusted_proxy_hops`.
pub fn client_ip(request: &Request, trusted_proxy_hops: usize) -> Option<IpAddr> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    resolve_client_ip(request.headers(), peer, trusted_proxy_hops)
}

/// Middleware for per-IP rate limiting
pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match client_ip(&request, limiter.trusted_proxy_hops) {
        Some(ip) => match limiter.limiter.check_key(&ip) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                tracing::warn!(ip = %ip, "Rate limit exceeded");
                Err(AppError::TooManyRequests(
                    "Too many requests from this IP. Please try again later.".to_string(),
                    Some(wait_time.as_secs()),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}
