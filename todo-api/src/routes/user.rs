/// User account endpoints
///
/// # Endpoints
///
/// Public:
/// - `POST /api/user/store` - Register
/// - `POST /api/user/login` - Login and get tokens
/// - `POST /api/user/refresh` - Exchange a refresh token for an access token
/// - `POST /api/user/check-login` - Whether a token is still usable
/// - `POST /api/user/password/email` - Mail a password-reset link
/// - `POST /api/user/password/reset` - Set a new password with a reset token
///
/// Authenticated:
/// - `POST /api/user/logout` - Revoke the presented token
/// - `POST /api/user/detail` - Current user's profile
/// - `POST /api/user/update` - Update profile and optionally the password

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidatedJson,
    response::ApiResponse,
};
use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use todo_shared::{
    auth::{
        jwt::{self, TokenPair, TokenType},
        middleware::{bearer_token, AuthContext, AuthError},
        password, reset_token,
    },
    mail,
    models::{
        category::Category,
        password_reset::PasswordReset,
        user::{CreateUser, UpdateUser, User},
    },
    unix_now,
};
use validator::Validate;

/// Register request
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 20, message = "username must be 1 to 20 characters"))]
    pub username: String,

    #[validate(
        length(min = 1, max = 30, message = "email must be 1 to 30 characters"),
        email(message = "email must be a valid email address")
    )]
    pub email: String,

    #[validate(length(min = 1, max = 32, message = "password must be 1 to 32 characters"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "password confirmation does not match"))]
    pub password_confirmation: String,
}

/// Login request
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

/// Profile update request
///
/// `password` switches on the password change; `old_password` and
/// `password_confirmation` are then required too.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 255, message = "avatar must be at most 255 characters"))]
    pub avatar: Option<String>,

    #[validate(range(min = 0, max = 2, message = "gender must be 0, 1 or 2"))]
    pub gender: Option<i16>,

    pub old_password: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

/// Refresh token request
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "refresh_token is required"))]
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// New access token (24h)
    pub token: String,

    pub expires_in: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckLoginRequest {
    /// Falls back to the Authorization header when absent
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckLoginResponse {
    pub login: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogoutRequest {
    /// Refresh token from the same login, revoked alongside the access token
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// The token that was revoked
    pub token: String,
    pub msg: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct PasswordEmailRequest {
    #[validate(
        length(min = 1, message = "email is required"),
        email(message = "email must be a valid email address")
    )]
    pub email: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct PasswordResetRequest {
    #[validate(
        length(min = 1, message = "email is required"),
        email(message = "email must be a valid email address")
    )]
    pub email: String,

    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,

    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "password confirmation does not match"))]
    pub password_confirmation: String,
}

/// Echoed back by the password mail/reset endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct EmailResponse {
    pub email: String,
}

/// Register a new user
///
/// Creates the user and its default category in one transaction.
///
/// # Errors
///
/// - `422`: Validation failed, or username/email already taken
pub async fn store(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> ApiResult<ApiResponse<User>> {
    if User::username_exists(&state.db, &req.username).await? {
        return Err(ApiError::field("username", "username already exists"));
    }
    if User::email_exists(&state.db, &req.email).await? {
        return Err(ApiError::field("email", "email already exists"));
    }

    let password_hash = password::hash_password(&req.password)?;

    let mut tx = state.db.begin().await?;
    let user = User::create(
        &mut *tx,
        CreateUser {
            username: req.username,
            email: req.email,
            password_hash,
        },
    )
    .await?;
    Category::create_default(&mut *tx, user.id).await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, "User registered");

    Ok(ApiResponse::ok(user))
}

/// Login with username and password
///
/// # Errors
///
/// - `422`: Unknown username, or wrong password (on the `password` field)
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> ApiResult<ApiResponse<TokenPair>> {
    let user = User::find_by_username(&state.db, &req.username)
        .await?
        .ok_or_else(|| ApiError::field("username", "username does not exist"))?;

    let verified = match user.password_hash.as_deref() {
        Some(hash) => password::verify_password(&req.password, hash)?,
        None => false,
    };
    if !verified {
        tracing::debug!(user_id = user.id, "Login rejected: wrong password");
        return Err(ApiError::field("password", "password is incorrect"));
    }

    User::update_last_login(&state.db, user.id).await?;

    let tokens = jwt::issue_token_pair(user.id, user.display_name(), state.jwt_secret())?;

    tracing::info!(user_id = user.id, "User logged in");

    Ok(ApiResponse::ok(tokens))
}

/// Revoke the presented access token until it would have expired
///
/// A `refresh_token` in the body is revoked too, so the session can't be
/// revived through `user/refresh`.
///
/// # Errors
///
/// - `422`: `refresh_token` isn't a valid refresh token of the same user
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> ApiResult<ApiResponse<LogoutResponse>> {
    let token = bearer_token(&headers)?;
    let claims = jwt::validate_access_token(token, state.jwt_secret())?;

    let refresh_token = body
        .and_then(|Json(req)| req.refresh_token)
        .filter(|t| !t.is_empty());
    if let Some(refresh_token) = refresh_token {
        let refresh_claims = jwt::validate_refresh_token(&refresh_token, state.jwt_secret())
            .ok()
            .filter(|c| c.uid == auth.user_id)
            .ok_or_else(|| ApiError::field("refresh_token", "refresh_token is invalid"))?;

        let ttl = refresh_claims.seconds_until_expiration().unwrap_or(0);
        state.redis.revoke_token(&refresh_token, ttl).await?;
    }

    let ttl = claims.seconds_until_expiration().unwrap_or(0);
    state.redis.revoke_token(token, ttl).await?;

    tracing::info!(user_id = auth.user_id, "User logged out");

    Ok(ApiResponse::ok(LogoutResponse {
        token: token.to_string(),
        msg: "token revoked".to_string(),
    }))
}

/// Current user's profile
pub async fn detail(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<ApiResponse<User>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok(user))
}

/// Update avatar/gender and optionally change the password
///
/// # Errors
///
/// - `422`: Field rules, wrong old password, or new password rules
pub async fn update(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> ApiResult<ApiResponse<User>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let password_hash = match requested_password(&req)? {
        Some(new_password) => Some(change_password(
            &user,
            req.old_password.as_deref(),
            new_password,
            req.password_confirmation.as_deref(),
        )?),
        None => None,
    };

    let updated = User::update(
        &state.db,
        user.id,
        UpdateUser {
            avatar: req.avatar,
            gender: req.gender,
            password_hash,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok(updated))
}

/// The new password, if the request asks for a password change
///
/// `old_password` on its own is rejected rather than ignored.
fn requested_password(req: &UpdateProfileRequest) -> ApiResult<Option<&str>> {
    let password = req.password.as_deref().filter(|p| !p.is_empty());
    let old_password = req.old_password.as_deref().filter(|p| !p.is_empty());

    if password.is_none() && old_password.is_some() {
        return Err(ApiError::field(
            "password",
            "password is required when old_password is present",
        ));
    }

    Ok(password)
}

/// Checks the password-change fields and hashes the new password
fn change_password(
    user: &User,
    old_password: Option<&str>,
    new_password: &str,
    confirmation: Option<&str>,
) -> ApiResult<String> {
    let old_password = old_password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::field("old_password", "old_password is required"))?;

    let verified = match user.password_hash.as_deref() {
        Some(hash) => password::verify_password(old_password, hash)?,
        None => false,
    };
    if !verified {
        return Err(ApiError::field("old_password", "old password is incorrect"));
    }

    password::validate_new_password(new_password).map_err(|e| ApiError::field("password", e))?;

    if new_password == old_password {
        return Err(ApiError::field(
            "password",
            "new password must differ from the old password",
        ));
    }
    if confirmation != Some(new_password) {
        return Err(ApiError::field(
            "password_confirmation",
            "password confirmation does not match",
        ));
    }

    Ok(password::hash_password(new_password)?)
}

/// Exchange a refresh token for a new access token
///
/// # Errors
///
/// - `401`: Invalid, expired or revoked refresh token
/// - `503`: Revocation list unavailable
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> ApiResult<ApiResponse<RefreshResponse>> {
    let token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;

    if state.redis.is_token_revoked(&req.refresh_token).await? {
        return Err(AuthError::Revoked.into());
    }

    Ok(ApiResponse::ok(RefreshResponse {
        token,
        expires_in: TokenType::Access.default_expiration().num_seconds(),
    }))
}

/// Whether the token in the body (or Authorization header) is a live access token
pub async fn check_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<CheckLoginRequest>>,
) -> ApiResult<ApiResponse<CheckLoginResponse>> {
    let body_token = body.and_then(|Json(req)| req.token).filter(|t| !t.is_empty());
    let token = match body_token {
        Some(token) => Some(token),
        None => bearer_token(&headers).ok().map(str::to_string),
    };

    let login = match token {
        Some(token) => match jwt::validate_access_token(&token, state.jwt_secret()) {
            Ok(_) => !state.redis.is_token_revoked(&token).await?,
            Err(_) => false,
        },
        None => false,
    };

    Ok(ApiResponse::ok(CheckLoginResponse { login }))
}

/// Mail a password-reset link
///
/// At most one mail per email every 60 seconds. Delivery failures are
/// logged, not returned.
///
/// # Errors
///
/// - `422`: Unknown email
/// - `429`: Asked again within the throttle window
pub async fn send_password_email(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordEmailRequest>,
) -> ApiResult<ApiResponse<EmailResponse>> {
    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::field("email", "email does not exist"))?;

    let now = unix_now();
    if let Some(previous) = PasswordReset::find_by_email(&state.db, &req.email).await? {
        if let Some(wait) = reset_token::throttle_remaining(previous.created_at, now) {
            return Err(ApiError::RateLimitExceeded {
                retry_after: wait as u64,
                message: crate::response::ResultCode::TooFrequent.message().to_string(),
            });
        }
    }

    let token = reset_token::generate_reset_token(&state.config.app_key);
    PasswordReset::replace(&state.db, &req.email, &reset_token::hash_token(&token), now).await?;

    let sent = match mail::password_reset_mail(
        &state.config.mail.reset_url,
        &req.email,
        user.username.as_deref(),
        &token,
    ) {
        Ok(message) => state.mailer.send(message).await,
        Err(e) => Err(e),
    };
    if let Err(e) = sent {
        tracing::error!(error = %e, user_id = user.id, "Failed to send password reset mail");
    } else {
        tracing::info!(user_id = user.id, "Password reset mail sent");
    }

    Ok(ApiResponse::ok(EmailResponse { email: req.email }))
}

/// Set a new password using a mailed reset token
///
/// # Errors
///
/// - `422`: Password rules, or a token that doesn't match or is older than 600 s
pub async fn password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> ApiResult<ApiResponse<EmailResponse>> {
    password::validate_new_password(&req.password).map_err(|e| ApiError::field("password", e))?;

    let reset = PasswordReset::find_by_email(&state.db, &req.email)
        .await?
        .filter(|reset| reset_token::verify_token(&req.token, &reset.token))
        .ok_or_else(|| ApiError::field("token", "reset token is invalid"))?;

    if reset_token::is_expired(reset.created_at, unix_now()) {
        return Err(ApiError::field("token", "reset token has expired"));
    }

    let password_hash = password::hash_password(&req.password)?;

    let mut tx = state.db.begin().await?;
    if !User::update_password_by_email(&mut *tx, &req.email, &password_hash).await? {
        return Err(ApiError::field("email", "email does not exist"));
    }
    PasswordReset::delete(&mut *tx, &req.email).await?;
    tx.commit().await?;

    tracing::info!(email = %req.email, "Password reset");

    Ok(ApiResponse::ok(EmailResponse { email: req.email }))
}
