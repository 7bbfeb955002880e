/// Redis integration
///
/// Redis holds the short-lived state of the service:
///
/// - `wechat:session:<id>`: WeChat login sessions (hash, 24 h TTL)
/// - `token:revoked:<sha256>`: access tokens revoked by logout, kept until
///   the token would have expired anyway
/// - `ratelimit:<sha256>`: token buckets used by the API rate limiter
///
/// # Example
///
/// ```no_run
/// use todo_shared::redis::client::{RedisClient, RedisConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RedisClient::new(RedisConfig::from_env()?).await?;
///
/// let healthy = client.ping().await?;
/// println!("Redis healthy: {}", healthy);
/// # Ok(())
/// # }
/// ```

pub mod client;

pub use client::{RedisClient, RedisClientError, RedisConfig, RedisStats};
