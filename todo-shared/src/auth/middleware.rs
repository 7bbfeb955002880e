/// Request authentication primitives for Axum
///
/// Parses `Authorization: Bearer <token>` headers and exposes the
/// authenticated user as an [`AuthContext`] request extension.
///
/// The middleware that validates tokens lives in the API crate
/// (`jwt_auth_layer`) because it must also consult the Redis revocation
/// list. Handlers behind it take [`AuthContext`] as an extractor; without
/// the layer the extractor rejects with 401.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::jwt::{Claims, JwtError};

/// Authentication context added to request extensions
///
/// Handlers take it directly as an extractor:
///
/// ```
/// use todo_shared::auth::middleware::AuthContext;
///
/// async fn handler(auth: AuthContext) -> String {
///     format!("User: {} ({})", auth.user_id, auth.username)
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user ID
    pub user_id: i64,

    /// Username carried in the token
    pub username: String,
}

impl AuthContext {
    /// Creates auth context from validated JWT claims
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.uid,
            username: claims.username.clone(),
        }
    }
}

/// Error type for authentication middleware
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing authorization header
    #[error("Missing credentials")]
    MissingCredentials,

    /// Invalid authorization header format
    #[error("{0}")]
    InvalidFormat(String),

    /// Token validation failed
    #[error("{0}")]
    InvalidToken(String),

    /// Token was revoked by logout
    #[error("Token has been revoked")]
    Revoked,
}

impl AuthError {
    /// HTTP status and result code for this error
    pub fn status_and_code(&self) -> (StatusCode, i32) {
        match self {
            AuthError::InvalidFormat(_) => (StatusCode::BAD_REQUEST, 1018),
            _ => (StatusCode::UNAUTHORIZED, 401),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            JwtError::InvalidIssuer { .. } => AuthError::InvalidToken("Invalid issuer".to_string()),
            other => AuthError::InvalidToken(format!("Invalid token: {}", other)),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = serde_json::json!({
            "code": code,
            "msg": self.to_string(),
            "data": [],
        });

        (status, Json(body)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

/// Extracts the raw bearer token from request headers
///
/// # Errors
///
/// - `MissingCredentials` if there is no usable Authorization header
/// - `InvalidFormat` if the header is not a Bearer token
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?;

    if token.is_empty() {
        return Err(AuthError::InvalidFormat("Empty Bearer token".to_string()));
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::TokenType;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_auth_context_from_claims() {
        let claims = Claims::new(12, "alice", TokenType::Access);
        let context = AuthContext::from_claims(&claims);

        assert_eq!(context.user_id, 12);
        assert_eq!(context.username, "alice");
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def")).unwrap(), "abc.def");

        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingCredentials)
        ));
        assert!(matches!(
            bearer_token(&headers_with("Basic dXNlcjpwYXNz")),
            Err(AuthError::InvalidFormat(_))
        ));
        assert!(matches!(
            bearer_token(&headers_with("Bearer ")),
            Err(AuthError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_auth_context_requires_layer() {
        let (mut parts, _) = axum::http::Request::new(()).into_parts();

        let err = AuthContext::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));

        parts.extensions.insert(AuthContext {
            user_id: 5,
            username: "carol".to_string(),
        });
        let context = AuthContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(context.user_id, 5);
    }

    #[test]
    fn test_auth_error_into_response() {
        let response = AuthError::MissingCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthError::InvalidFormat("test".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AuthError::Revoked.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
