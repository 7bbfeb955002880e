/// CORS layer and origin guard
///
/// The tower-http [`CorsLayer`] answers preflights and decorates responses.
/// It never rejects anything by itself, so [`origin_guard`] runs in front of
/// it and turns requests from origins outside the allow-list into 403s.
///
/// A `*` entry in `CORS_ORIGINS` disables the guard and mirrors whatever
/// origin the browser sent.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::app::AppState;
use crate::error::ApiError;

/// Preflight cache lifetime (20 days)
pub const CORS_MAX_AGE_SECS: u64 = 1_728_000;

/// Whether the allow-list accepts any origin
pub fn allows_any(origins: &[String]) -> bool {
    origins.iter().any(|o| o == "*")
}

/// Whether `origin` may call the API
pub fn is_origin_allowed(origins: &[String], origin: &str) -> bool {
    allows_any(origins) || origins.iter().any(|o| o.trim_end_matches('/') == origin)
}

/// Builds the CORS layer for the configured origins
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if allows_any(origins) {
        // credentials rule out a literal `*`
        AllowOrigin::mirror_request()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.trim_end_matches('/').parse().ok())
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS))
}

/// Rejects cross-origin requests from origins outside the allow-list
///
/// Requests without an `Origin` header (curl, server-to-server) pass.
pub async fn origin_guard(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let origins = &state.config.api.cors_origins;

    if let Some(origin) = req.headers().get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !is_origin_allowed(origins, origin) {
            tracing::warn!(origin = %origin, path = %req.uri().path(), "Rejected request from disallowed origin");
            return Err(ApiError::Forbidden("Origin not allowed".to_string()));
        }
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origins(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_wildcard_allows_everything() {
        let list = origins(&["*"]);
        assert!(allows_any(&list));
        assert!(is_origin_allowed(&list, "https://evil.example"));
    }

    #[test]
    fn test_allow_list() {
        let list = origins(&["https://todo.example", "http://localhost:3000/"]);

        assert!(!allows_any(&list));
        assert!(is_origin_allowed(&list, "https://todo.example"));
        assert!(is_origin_allowed(&list, "http://localhost:3000"));
        assert!(!is_origin_allowed(&list, "https://evil.example"));
        assert!(!is_origin_allowed(&list, "null"));
    }

    #[test]
    fn test_empty_list_allows_nothing() {
        assert!(!is_origin_allowed(&[], "https://todo.example"));
    }
}
