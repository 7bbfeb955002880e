/// WeChat mini-program login
///
/// # Endpoints
///
/// - `POST /api/wechat/login` - Trade a `wx.login()` code for a session and token
/// - `POST /api/wechat/check-session` - Whether a session is still alive (renews it)
///
/// Sessions live in Redis as `wechat:session:<session_id>` hashes holding
/// `openid` and `session_key`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidatedJson,
    response::ApiResponse,
};
use axum::extract::State;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use todo_shared::{
    auth::{
        jwt::{self, Claims, TokenType},
        reset_token::generate_random_string,
    },
    models::{category::Category, user::User},
    wechat::WechatSession,
};
use validator::Validate;

/// Session lifetime (24 hours)
pub const WECHAT_SESSION_TTL_SECS: i64 = 86_400;

/// Length of generated session ids
pub const SESSION_ID_LEN: usize = 40;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct WechatLoginRequest {
    #[validate(length(min = 1, message = "code is required"))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WechatLoginResponse {
    pub session_id: String,

    /// Access token (24h)
    pub token: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CheckSessionRequest {
    #[validate(length(min = 1, message = "session_id is required"))]
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckSessionResponse {
    pub res: bool,
}

/// WeChat login
///
/// First-time users are created together with their default category.
///
/// # Errors
///
/// - `422`: Missing code
/// - `503`: WeChat rejected the code or couldn't be reached, or Redis is down
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<WechatLoginRequest>,
) -> ApiResult<ApiResponse<WechatLoginResponse>> {
    let session = state.wechat.code_to_session(&req.code).await?;

    let user = find_or_create_user(&state.db, &session).await?;

    let session_id = generate_random_string(SESSION_ID_LEN);
    state
        .redis
        .store_session(
            &session_id,
            &[
                ("openid", session.openid.as_str()),
                ("session_key", session.session_key.as_str()),
            ],
            WECHAT_SESSION_TTL_SECS,
        )
        .await?;

    let claims = Claims::new(user.id, user.display_name(), TokenType::Access);
    let token = jwt::create_token(&claims, state.jwt_secret())?;

    tracing::info!(user_id = user.id, "WeChat login");

    Ok(ApiResponse::ok(WechatLoginResponse { session_id, token }))
}

/// Looks up the user for an openid, creating it with its default category
/// on first login
///
/// Two first logins racing on one openid both end up with the same user.
async fn find_or_create_user(db: &PgPool, session: &WechatSession) -> ApiResult<User> {
    if let Some(user) = User::find_by_openid(db, &session.openid).await? {
        User::update_session_key(db, user.id, &session.session_key).await?;
        return Ok(user);
    }

    let mut tx = db.begin().await?;
    match User::create_wechat(&mut *tx, &session.openid, &session.session_key).await? {
        Some(user) => {
            Category::create_default(&mut *tx, user.id).await?;
            tx.commit().await?;

            tracing::info!(user_id = user.id, "WeChat user created");
            Ok(user)
        }
        None => {
            tx.rollback().await?;
            tracing::debug!("WeChat user created concurrently, reloading");

            let user = User::find_by_openid(db, &session.openid)
                .await?
                .ok_or_else(|| ApiError::InternalError("WeChat user disappeared".to_string()))?;
            User::update_session_key(db, user.id, &session.session_key).await?;
            Ok(user)
        }
    }
}

/// Renews a live session; `res` is false when it has expired
pub async fn check_session(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CheckSessionRequest>,
) -> ApiResult<ApiResponse<CheckSessionResponse>> {
    let res = state
        .redis
        .touch_session(&req.session_id, WECHAT_SESSION_TTL_SECS)
        .await?;

    Ok(ApiResponse::ok(CheckSessionResponse { res }))
}
