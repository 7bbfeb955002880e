/// Rate limiting middleware for `/api`
///
/// Token bucket per caller, with Redis-backed state so every API instance
/// shares the same budget.
///
/// # Algorithm
///
/// - The bucket holds `per_minute` tokens and refills at `per_minute / 60`
///   tokens per second
/// - Each request consumes 1 token
/// - An empty bucket means 429 until a token refills
///
/// # Keys
///
/// `ratelimit:<sha256(method|path|client ip|authorization)>`, TTL 2 minutes.
/// The client IP comes from the socket address, falling back to the first
/// `X-Forwarded-For` entry.
///
/// # Headers
///
/// - `X-RateLimit-Limit`: Requests allowed per minute
/// - `X-RateLimit-Remaining`: Tokens left after this request
/// - `Retry-After`: Seconds to wait (429 responses only)
///
/// If Redis is unreachable the request goes through without headers and a
/// warning is logged.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use todo_shared::auth::reset_token::sha256_hex;
use todo_shared::redis::{RedisClient, RedisClientError};
use todo_shared::unix_now;

use crate::app::AppState;
use crate::error::ApiError;
use crate::response::ResultCode;

/// Redis key prefix for buckets
pub const RATE_LIMIT_PREFIX: &str = "ratelimit:";

/// Bucket keys outlive a full refill by a minute
const BUCKET_TTL_SECS: u64 = 120;

const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1])
local last_refill = tonumber(bucket[2])

if not tokens then
    tokens = capacity
    last_refill = now
end

local elapsed = math.max(0, now - last_refill)
tokens = math.min(capacity, tokens + (elapsed * refill_rate))

if tokens >= 1 then
    tokens = tokens - 1
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, ttl)
    return {1, math.floor(tokens), 0}
else
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, ttl)
    return {0, 0, math.ceil((1 - tokens) / refill_rate)}
end
"#;

/// Bucket parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    /// Maximum requests per minute
    pub requests_per_minute: u32,

    /// Token refill rate (tokens per second)
    pub refill_rate: f64,

    /// Maximum tokens in bucket (burst capacity)
    pub bucket_capacity: u32,
}

impl RateLimit {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let requests_per_minute = requests_per_minute.max(1);

        RateLimit {
            requests_per_minute,
            refill_rate: requests_per_minute as f64 / 60.0,
            bucket_capacity: requests_per_minute,
        }
    }
}

/// Result of a bucket check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether request is allowed
    pub ok: bool,

    /// Tokens remaining
    pub remaining: u32,

    /// Seconds until the next token (0 when allowed)
    pub retry_after: u64,
}

/// Rate limiting middleware layer
///
/// # Errors
///
/// - 429 Too Many Requests: bucket empty
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let settings = &state.config.rate_limit;
    if !settings.enabled {
        return Ok(next.run(request).await);
    }

    let limit = RateLimit::per_minute(settings.per_minute);
    let key = bucket_key(&request);

    let result = match check_rate_limit(&state.redis, &key, limit).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, "Rate limit check failed, allowing request");
            return Ok(next.run(request).await);
        }
    };

    if !result.ok {
        tracing::debug!(
            path = %request.uri().path(),
            retry_after = result.retry_after,
            "Rate limit exceeded"
        );
        return Err(create_rate_limit_error(result));
    }

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit.requests_per_minute));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));

    Ok(response)
}

/// Bucket key for a request
pub fn bucket_key(request: &Request) -> String {
    let ip = client_ip(request).unwrap_or_default();
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    rate_limit_key(request.method().as_str(), request.uri().path(), &ip, authorization)
}

/// `ratelimit:` + SHA-256 of `method|path|ip|authorization`
pub fn rate_limit_key(method: &str, path: &str, ip: &str, authorization: &str) -> String {
    let digest = sha256_hex(&format!("{}|{}|{}|{}", method, path, ip, authorization));
    format!("{}{}", RATE_LIMIT_PREFIX, digest)
}

/// Peer address, or the first `X-Forwarded-For` hop when there is none
pub fn client_ip(request: &Request) -> Option<String> {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip().to_string());
    }

    request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

/// Runs the token bucket script atomically in Redis
pub async fn check_rate_limit(
    redis: &RedisClient,
    key: &str,
    limit: RateLimit,
) -> Result<RateLimitResult, RedisClientError> {
    let mut conn = redis.connection().await?;

    let result: Vec<i64> = redis::Script::new(TOKEN_BUCKET_SCRIPT)
        .key(key)
        .arg(limit.bucket_capacity)
        .arg(limit.refill_rate)
        .arg(unix_now())
        .arg(BUCKET_TTL_SECS)
        .invoke_async(&mut conn)
        .await?;

    match result.as_slice() {
        [ok, remaining, retry_after] => {
            let ok = *ok == 1;
            Ok(RateLimitResult {
                ok,
                remaining: (*remaining).max(0) as u32,
                retry_after: if ok { 0 } else { (*retry_after).max(1) as u64 },
            })
        }
        _ => Err(RedisClientError::CommandError(format!(
            "Unexpected rate limit reply: {:?}",
            result
        ))),
    }
}

/// Creates a rate limit exceeded error response
fn create_rate_limit_error(result: RateLimitResult) -> ApiError {
    ApiError::RateLimitExceeded {
        retry_after: result.retry_after,
        message: ResultCode::TooFrequent.message().to_string(),
    }
}
