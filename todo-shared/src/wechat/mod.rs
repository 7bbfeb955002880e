/// WeChat mini-program session exchange
///
/// A mini-program obtains a one-time `code` from `wx.login()`. The server
/// trades it at `jscode2session` for the user's `openid` and a
/// `session_key`.
///
/// [`WechatApi`] is the seam handlers depend on; [`WechatClient`] is the
/// reqwest implementation.
///
/// # Example
///
/// ```no_run
/// use todo_shared::wechat::{WechatApi, WechatClient, WechatConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = WechatClient::new(WechatConfig {
///     app_id: "wx1234567890".to_string(),
///     app_secret: "secret".to_string(),
///     ..Default::default()
/// })?;
///
/// let session = client.code_to_session("061abc...").await?;
/// println!("openid: {}", session.openid);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Production API host
pub const DEFAULT_API_BASE: &str = "https://api.weixin.qq.com";

/// WeChat integration errors
#[derive(Debug, thiserror::Error)]
pub enum WechatError {
    /// Transport failure or non-success HTTP status
    #[error("WeChat request failed: {0}")]
    Http(String),

    /// WeChat answered with a non-zero errcode
    #[error("WeChat error {code}: {message}")]
    Api { code: i64, message: String },

    /// Response body couldn't be understood
    #[error("Invalid WeChat response: {0}")]
    InvalidResponse(String),

    /// Client couldn't be built
    #[error("WeChat configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for WechatError {
    fn from(err: reqwest::Error) -> Self {
        WechatError::Http(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WechatConfig {
    pub app_id: String,
    pub app_secret: String,

    /// Overridable for tests and proxies
    pub api_base: String,

    pub timeout_secs: u64,
}

impl Default for WechatConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Result of a successful code exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WechatSession {
    pub openid: String,
    pub session_key: String,
    pub unionid: Option<String>,
}

/// Raw `jscode2session` payload
///
/// Errors come back with HTTP 200 and an `errcode` field.
#[derive(Debug, Deserialize)]
struct Code2SessionResponse {
    openid: Option<String>,
    session_key: Option<String>,
    unionid: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl Code2SessionResponse {
    fn into_session(self) -> Result<WechatSession, WechatError> {
        if self.errcode != 0 {
            return Err(WechatError::Api {
                code: self.errcode,
                message: self.errmsg,
            });
        }

        match (self.openid, self.session_key) {
            (Some(openid), Some(session_key)) if !openid.is_empty() && !session_key.is_empty() => {
                Ok(WechatSession {
                    openid,
                    session_key,
                    unionid: self.unionid,
                })
            }
            _ => Err(WechatError::InvalidResponse(
                "missing openid or session_key".to_string(),
            )),
        }
    }
}

/// Parses a `jscode2session` body
pub fn parse_code2session(body: &str) -> Result<WechatSession, WechatError> {
    let response: Code2SessionResponse =
        serde_json::from_str(body).map_err(|e| WechatError::InvalidResponse(e.to_string()))?;

    response.into_session()
}

/// WeChat operations the API needs
#[async_trait]
pub trait WechatApi: Send + Sync {
    /// Trades a `wx.login()` code for an openid and session key
    async fn code_to_session(&self, code: &str) -> Result<WechatSession, WechatError>;
}

/// reqwest-backed WeChat client
#[derive(Clone)]
pub struct WechatClient {
    config: WechatConfig,
    client: Client,
}

impl WechatClient {
    pub fn new(config: WechatConfig) -> Result<Self, WechatError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WechatError::Config(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn with_client(config: WechatConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn code2session_url(&self) -> String {
        format!("{}/sns/jscode2session", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl WechatApi for WechatClient {
    async fn code_to_session(&self, code: &str) -> Result<WechatSession, WechatError> {
        tracing::debug!("Exchanging WeChat login code");

        let response = self
            .client
            .get(self.code2session_url())
            .query(&[
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.app_secret.as_str()),
                ("js_code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .error_for_status()?;

        // served as text/plain, so parse the body ourselves
        let body = response.text().await?;

        let session = parse_code2session(&body).map_err(|e| {
            tracing::warn!(error = %e, "WeChat code exchange rejected");
            e
        })?;

        Ok(session)
    }
}
