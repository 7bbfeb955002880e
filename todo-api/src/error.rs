/// Error handling for the API server
///
/// Handlers return `ApiResult<T>`; every `ApiError` renders as the standard
/// envelope with a non-zero code and an empty `data` array:
///
/// ```json
/// {"code": 1029, "msg": "username already exists", "data": [], "errors": {"username": "username already exists"}}
/// ```
///
/// # Example
///
/// ```
/// use todo_api::error::{ApiError, ApiResult};
/// use todo_api::response::ApiResponse;
///
/// async fn handler(id: i64) -> ApiResult<ApiResponse<i64>> {
///     if id <= 0 {
///         return Err(ApiError::field("id", "id must be positive"));
///     }
///     Ok(ApiResponse::ok(id))
/// }
/// ```

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use todo_shared::auth::jwt::JwtError;
use todo_shared::auth::middleware::AuthError;
use todo_shared::auth::password::PasswordError;
use todo_shared::mail::MailError;
use todo_shared::models::user::{EMAIL_UNIQUE_CONSTRAINT, USERNAME_UNIQUE_CONSTRAINT};
use todo_shared::redis::RedisClientError;
use todo_shared::wechat::WechatError;

use crate::response::ResultCode;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request (400)
    BadRequest(String),

    /// Missing or invalid credentials (401)
    Unauthorized(String),

    /// Forbidden (403), e.g. disallowed CORS origin
    Forbidden(String),

    /// Target doesn't exist or isn't the caller's (404)
    NotFound(String),

    /// Field validation failed (422)
    ValidationError(Vec<ValidationErrorDetail>),

    /// Too many requests (429)
    RateLimitExceeded { retry_after: u64, message: String },

    /// Internal server error (500); details are logged, never returned
    InternalError(String),

    /// Dependency unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// Error envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: i32,
    pub msg: String,

    /// Always an empty array
    pub data: Vec<serde_json::Value>,

    /// First message per failing field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl ApiError {
    /// Single-field validation error
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn result_code(&self) -> ResultCode {
        match self {
            ApiError::BadRequest(_) => ResultCode::DataFormatError,
            ApiError::Unauthorized(_) => ResultCode::Unauthorized,
            ApiError::Forbidden(_) => ResultCode::NeedPermission,
            ApiError::NotFound(_) => ResultCode::TargetNotFound,
            ApiError::ValidationError(_) => ResultCode::ParameterValidationError,
            ApiError::RateLimitExceeded { .. } => ResultCode::TooFrequent,
            ApiError::InternalError(_) => ResultCode::CommonError,
            ApiError::ServiceUnavailable(_) => ResultCode::UnknownError,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::RateLimitExceeded { message, .. } => {
                write!(f, "Rate limit exceeded: {}", message)
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.result_code().code();

        let mut retry_after = None;
        let (msg, errors) = match self {
            ApiError::ValidationError(details) => {
                let msg = details
                    .first()
                    .map(|d| d.message.clone())
                    .unwrap_or_else(|| ResultCode::ParameterValidationError.message().to_string());

                let mut errors = BTreeMap::new();
                for detail in details {
                    errors.entry(detail.field).or_insert(detail.message);
                }
                (msg, Some(errors))
            }
            ApiError::RateLimitExceeded {
                retry_after: secs,
                message,
            } => {
                retry_after = Some(secs);
                (message, None)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (ResultCode::CommonError.message().to_string(), None)
            }
            ApiError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (msg, None)
            }
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg) => (msg, None),
        };

        let body = Json(ErrorResponse {
            code,
            msg,
            data: Vec::new(),
            errors,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(secs));
        }
        response
    }
}

/// Convert sqlx errors to API errors
///
/// Username/email unique violations become field errors so a lost race
/// with a concurrent registration reads the same as the pre-check.
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Target not found".to_string()),
            sqlx::Error::Database(db_err) => match db_err.constraint() {
                Some(USERNAME_UNIQUE_CONSTRAINT) => {
                    ApiError::field("username", "username already exists")
                }
                Some(EMAIL_UNIQUE_CONSTRAINT) => ApiError::field("email", "email already exists"),
                _ => ApiError::InternalError(format!("Database error: {}", db_err)),
            },
            sqlx::Error::PoolTimedOut => {
                ApiError::ServiceUnavailable("Database is busy, try again later".to_string())
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert derive-validator errors to field errors, sorted by field
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, field_errors)| {
                let field = field.to_string();
                field_errors.iter().map(move |e| ValidationErrorDetail {
                    field: field.clone(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field)),
                })
            })
            .collect();

        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidFormat(msg) => ApiError::BadRequest(msg),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => ApiError::InternalError(msg),
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer { .. } => {
                ApiError::Unauthorized("Invalid token issuer".to_string())
            }
            JwtError::ValidationError(_) => ApiError::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        ApiError::ServiceUnavailable(err.to_string())
    }
}

impl From<WechatError> for ApiError {
    fn from(err: WechatError) -> Self {
        match err {
            WechatError::Api { code, message } => {
                ApiError::ServiceUnavailable(format!("WeChat login failed ({}): {}", code, message))
            }
            WechatError::Config(msg) => ApiError::InternalError(msg),
            other => ApiError::ServiceUnavailable(other.to_string()),
        }
    }
}

impl From<RedisClientError> for ApiError {
    fn from(err: RedisClientError) -> Self {
        ApiError::ServiceUnavailable(format!("Session store unavailable: {}", err))
    }
}
