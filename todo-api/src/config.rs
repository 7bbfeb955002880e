/// Configuration management for the API server
///
/// Loads configuration from environment variables (and `.env` in
/// development) into a typed struct.
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: Bind address (default: 0.0.0.0:8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins, `*` for any (default: *)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `DATABASE_CREATE_IF_MISSING`: Create the database on startup (default: false)
/// - `REDIS_URL`: Redis connection string (default: redis://127.0.0.1:6379)
/// - `JWT_SECRET`: Token signing secret, at least 32 characters (required)
/// - `APP_KEY`: Reset-token HMAC key, at least 32 characters (required)
/// - `WECHAT_APP_ID` / `WECHAT_APP_SECRET` / `WECHAT_API_BASE`: Mini-program credentials
/// - `SMTP_HOST` / `SMTP_PORT` / `SMTP_USERNAME` / `SMTP_PASSWORD` / `SMTP_SECURITY`:
///   Mail transport; without `SMTP_HOST` mail is only logged
/// - `MAIL_FROM`: Sender address (default: Todo <noreply@localhost>)
/// - `PASSWORD_RESET_URL`: Front-end reset page (default: http://localhost:8080/#/resetPassword)
/// - `RATE_LIMIT_ENABLED` / `RATE_LIMIT_PER_MINUTE`: Limiter switch and budget (default: true / 60)
///
/// # Example
///
/// ```no_run
/// use todo_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use todo_shared::mail::{SmtpConfig, SmtpSecurity};
use todo_shared::redis::RedisConfig;
use todo_shared::wechat::{WechatConfig, DEFAULT_API_BASE};

/// Minimum length of `JWT_SECRET` and `APP_KEY`
pub const MIN_SECRET_LEN: usize = 32;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,

    /// HMAC key for password-reset tokens
    pub app_key: String,

    pub wechat: WechatConfig,
    pub mail: MailConfig,
    pub rate_limit: RateLimitConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `["*"]` allows any
    pub cors_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,

    /// Create the database before connecting if it doesn't exist
    pub create_if_missing: bool,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
}

/// Mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// `None` when `SMTP_HOST` is unset
    pub smtp: Option<SmtpConfig>,

    /// Page the reset link points at
    pub reset_url: String,
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_minute: 60,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is
    /// invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow::anyhow!("{} environment variable is required", key))
        };

        let api_host = get_or("API_HOST", "0.0.0.0");
        let api_port = parse_var::<u16>("API_PORT", &get_or("API_PORT", "8080"))?;
        let cors_origins = parse_origins(&get_or("CORS_ORIGINS", "*"));

        let database_url = require("DATABASE_URL")?;
        let max_connections =
            parse_var::<u32>("DATABASE_MAX_CONNECTIONS", &get_or("DATABASE_MAX_CONNECTIONS", "10"))?;
        let create_if_missing = parse_bool(
            "DATABASE_CREATE_IF_MISSING",
            &get_or("DATABASE_CREATE_IF_MISSING", "false"),
        )?;

        let redis = RedisConfig {
            url: get_or("REDIS_URL", "redis://127.0.0.1:6379"),
            ..Default::default()
        };

        let jwt_secret = require("JWT_SECRET")?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("JWT_SECRET must be at least {} characters long", MIN_SECRET_LEN);
        }

        let app_key = require("APP_KEY")?;
        if app_key.len() < MIN_SECRET_LEN {
            anyhow::bail!("APP_KEY must be at least {} characters long", MIN_SECRET_LEN);
        }

        let wechat = WechatConfig {
            app_id: get_or("WECHAT_APP_ID", ""),
            app_secret: get_or("WECHAT_APP_SECRET", ""),
            api_base: get_or("WECHAT_API_BASE", DEFAULT_API_BASE),
            ..Default::default()
        };

        let smtp = match lookup("SMTP_HOST").filter(|h| !h.is_empty()) {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_var::<u16>("SMTP_PORT", &get_or("SMTP_PORT", "465"))?,
                username: lookup("SMTP_USERNAME").filter(|v| !v.is_empty()),
                password: lookup("SMTP_PASSWORD").filter(|v| !v.is_empty()),
                from: get_or("MAIL_FROM", "Todo <noreply@localhost>"),
                security: SmtpSecurity::from_str(&get_or("SMTP_SECURITY", "tls"))
                    .map_err(|e| anyhow::anyhow!("SMTP_SECURITY: {}", e))?,
            }),
            None => None,
        };

        let rate_limit = RateLimitConfig {
            enabled: parse_bool("RATE_LIMIT_ENABLED", &get_or("RATE_LIMIT_ENABLED", "true"))?,
            per_minute: parse_var::<u32>("RATE_LIMIT_PER_MINUTE", &get_or("RATE_LIMIT_PER_MINUTE", "60"))?,
        };
        if rate_limit.per_minute == 0 {
            anyhow::bail!("RATE_LIMIT_PER_MINUTE must be greater than zero");
        }

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                cors_origins,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
                create_if_missing,
            },
            redis,
            jwt: JwtConfig { secret: jwt_secret },
            app_key,
            wechat,
            mail: MailConfig {
                smtp,
                reset_url: get_or("PASSWORD_RESET_URL", "http://localhost:8080/#/resetPassword"),
            },
            rate_limit,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Pool settings for the shared database layer
    pub fn pool_config(&self) -> todo_shared::db::pool::DatabaseConfig {
        todo_shared::db::pool::DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            ..Default::default()
        }
    }
}

fn parse_var<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{} has invalid value {:?}: {}", key, value, e))
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} has invalid boolean value {:?}", key, value),
    }
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DATABASE_URL", "postgresql://localhost/todo"),
            ("JWT_SECRET", SECRET),
            ("APP_KEY", SECRET),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&minimal())).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.api.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.database.max_connections, 10);
        assert!(!config.database.create_if_missing);
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
        assert_eq!(config.wechat.api_base, DEFAULT_API_BASE);
        assert!(config.mail.smtp.is_none());
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.per_minute, 60);
    }

    #[test]
    fn test_missing_required() {
        let err = Config::from_lookup(lookup_from(&[("JWT_SECRET", SECRET), ("APP_KEY", SECRET)]))
            .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgresql://localhost/todo"),
            ("JWT_SECRET", SECRET),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("APP_KEY"));
    }

    #[test]
    fn test_short_secrets_rejected() {
        let mut vars = minimal();
        vars[1] = ("JWT_SECRET", "short");
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());

        let mut vars = minimal();
        vars[2] = ("APP_KEY", "short");
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());
    }

    #[test]
    fn test_invalid_port() {
        let mut vars = minimal();
        vars.push(("API_PORT", "eighty"));
        let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(err.to_string().contains("API_PORT"));
    }

    #[test]
    fn test_cors_origins() {
        let mut vars = minimal();
        vars.push(("CORS_ORIGINS", "http://a.example, https://b.example/ ,"));
        let config = Config::from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(
            config.api.cors_origins,
            vec!["http://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_smtp_config() {
        let mut vars = minimal();
        vars.push(("SMTP_HOST", "smtp.example.com"));
        vars.push(("SMTP_PORT", "587"));
        vars.push(("SMTP_SECURITY", "starttls"));
        vars.push(("SMTP_USERNAME", "mailer"));
        let config = Config::from_lookup(lookup_from(&vars)).unwrap();

        let smtp = config.mail.smtp.unwrap();
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.security, SmtpSecurity::StartTls);
        assert_eq!(smtp.username.as_deref(), Some("mailer"));
        assert!(smtp.password.is_none());
    }

    #[test]
    fn test_rate_limit_config() {
        let mut vars = minimal();
        vars.push(("RATE_LIMIT_ENABLED", "off"));
        vars.push(("RATE_LIMIT_PER_MINUTE", "120"));
        let config = Config::from_lookup(lookup_from(&vars)).unwrap();
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.per_minute, 120);

        let mut vars = minimal();
        vars.push(("RATE_LIMIT_PER_MINUTE", "0"));
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());

        let mut vars = minimal();
        vars.push(("RATE_LIMIT_ENABLED", "maybe"));
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());
    }

    #[test]
    fn test_pool_config() {
        let mut vars = minimal();
        vars.push(("DATABASE_MAX_CONNECTIONS", "25"));
        vars.push(("DATABASE_CREATE_IF_MISSING", "yes"));
        let config = Config::from_lookup(lookup_from(&vars)).unwrap();
        let pool = config.pool_config();

        assert!(config.database.create_if_missing);

        assert_eq!(pool.url, "postgresql://localhost/todo");
        assert_eq!(pool.max_connections, 25);
    }
}
