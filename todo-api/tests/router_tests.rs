//! Router tests that need neither PostgreSQL nor Redis
//!
//! The state points at closed ports, so every request here must be decided
//! before a dependency is touched, or must exercise the failure path.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{get, offline_app, offline_state, post_json, send, TEST_JWT_SECRET};
use serde_json::json;
use todo_shared::auth::jwt::{create_token, Claims, TokenType};

fn token(token_type: TokenType) -> String {
    create_token(&Claims::new(42, "alice", token_type), TEST_JWT_SECRET).unwrap()
}

#[tokio::test]
async fn test_random_string_endpoints() {
    let app = offline_app(&[]);

    for uri in ["/", "/key"] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::OK);

        let s = body.as_str().unwrap();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}

#[tokio::test]
async fn test_health_reports_degraded() {
    let app = offline_app(&[]);

    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["redis"], "disconnected");
    assert_eq!(body["pool"]["total_connections"], 0);
    assert_eq!(body["pool"]["active_connections"], 0);
}

#[tokio::test]
async fn test_protected_route_without_token() {
    let app = offline_app(&[]);

    let (status, body) = post_json(&app, "/api/task/detail", json!({"id": 1}), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_protected_route_with_garbage_token() {
    let app = offline_app(&[]);

    let (status, body) = post_json(&app, "/api/user/detail", json!({}), Some("not-a-jwt")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);
}

#[tokio::test]
async fn test_protected_route_with_refresh_token() {
    let app = offline_app(&[]);

    let refresh = token(TokenType::Refresh);
    let (status, _) = post_json(&app, "/api/user/detail", json!({}), Some(&refresh)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_bearer_authorization() {
    let app = offline_app(&[]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/user/detail")
        .header(header::AUTHORIZATION, "Token abc")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1018);
}

#[tokio::test]
async fn test_revocation_store_down_is_503() {
    let app = offline_app(&[]);

    let access = token(TokenType::Access);
    let (status, body) = post_json(&app, "/api/user/detail", json!({}), Some(&access)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], 999);
}

#[tokio::test]
async fn test_register_validation_errors() {
    let app = offline_app(&[]);

    let (status, body) = post_json(
        &app,
        "/api/user/store",
        json!({
            "username": "",
            "email": "nope",
            "password": "secret1",
            "password_confirmation": "secret2"
        }),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], 1029);
    assert_eq!(body["data"], json!([]));
    assert!(body["errors"]["username"].is_string());
    assert!(body["errors"]["email"].is_string());
    assert_eq!(
        body["errors"]["password_confirmation"],
        "password confirmation does not match"
    );
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let app = offline_app(&[]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/user/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"username\":"))
        .unwrap();
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1018);
}

#[tokio::test]
async fn test_refresh_needs_revocation_store() {
    let app = offline_app(&[]);

    // a valid refresh token can't be honoured without checking revocation
    let refresh = token(TokenType::Refresh);
    let (status, body) =
        post_json(&app, "/api/user/refresh", json!({"refresh_token": refresh}), None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], 999);
}

#[tokio::test]
async fn test_refresh_rejects_access_token() {
    let app = offline_app(&[]);

    let access = token(TokenType::Access);
    let (status, body) =
        post_json(&app, "/api/user/refresh", json!({"refresh_token": access}), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);
}

#[tokio::test]
async fn test_check_login_without_token() {
    let app = offline_app(&[]);

    let (status, body) = post_json(&app, "/api/user/check-login", json!({}), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["login"], false);

    let (_, body) = post_json(&app, "/api/user/check-login", json!({"token": "junk"}), None).await;
    assert_eq!(body["data"]["login"], false);
}

#[tokio::test]
async fn test_wechat_login_requires_code() {
    let app = offline_app(&[]);

    let (status, body) = post_json(&app, "/api/wechat/login", json!({}), None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"]["code"], "code is required");
}

#[tokio::test]
async fn test_wechat_upstream_error_is_503() {
    let app = offline_app(&[]);

    let (status, body) = post_json(
        &app,
        "/api/wechat/login",
        json!({"code": common::BAD_WECHAT_CODE}),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], 999);
}

#[tokio::test]
async fn test_disallowed_origin_is_403() {
    let app = offline_app(&[("CORS_ORIGINS", "https://todo.example")]);

    let request = Request::builder()
        .uri("/")
        .header(header::ORIGIN, "https://evil.example")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 1000);
}

#[tokio::test]
async fn test_allowed_origin_gets_cors_headers() {
    let app = offline_app(&[("CORS_ORIGINS", "https://todo.example")]);

    let request = Request::builder()
        .uri("/key")
        .header(header::ORIGIN, "https://todo.example")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://todo.example"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_preflight() {
    let app = offline_app(&[]);

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/task/list-or-search")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,content-type")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );
    assert_eq!(headers.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "1728000");
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
        "authorization,content-type"
    );
}

#[tokio::test]
async fn test_rate_limiter_fails_open() {
    // rate limiting on, Redis unreachable
    let (state, _) = offline_state(&[]);
    let app = todo_api::app::build_router(state);

    let (status, body) = post_json(&app, "/api/user/check-login", json!({}), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["login"], false);
}
