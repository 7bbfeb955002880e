/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use todo_api::{app::AppState, config::Config};
/// use todo_shared::mail::LogMailer;
/// use todo_shared::redis::RedisClient;
/// use todo_shared::wechat::WechatClient;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = sqlx::PgPool::connect(&config.database.url).await?;
/// let redis = RedisClient::new(config.redis.clone()).await?;
/// let wechat = WechatClient::new(config.wechat.clone())?;
/// let state = AppState::new(pool, redis, config, Arc::new(LogMailer), Arc::new(wechat));
/// let app = todo_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::{cors, rate_limit},
};
use axum::{
    extract::{Request, State},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use todo_shared::auth::{
    jwt,
    middleware::{bearer_token, AuthContext, AuthError},
};
use todo_shared::mail::Mailer;
use todo_shared::redis::RedisClient;
use todo_shared::wechat::WechatApi;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Token revocation, WeChat sessions, rate limit buckets
    pub redis: RedisClient,

    /// Application configuration
    pub config: Arc<Config>,

    /// Delivers password-reset mail
    pub mailer: Arc<dyn Mailer>,

    /// WeChat code exchange
    pub wechat: Arc<dyn WechatApi>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        redis: RedisClient,
        config: Config,
        mailer: Arc<dyn Mailer>,
        wechat: Arc<dyn WechatApi>,
    ) -> Self {
        Self {
            db,
            redis,
            config: Arc::new(config),
            mailer,
            wechat,
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /                          # Random 32-char string
/// ├── GET /key                       # Random 32-char app key
/// ├── GET /health                    # Database + Redis status
/// └── POST /api/                     # Rate limited
///     ├── user/store                 # public
///     ├── user/login                 # public
///     ├── user/refresh               # public
///     ├── user/check-login           # public
///     ├── user/password/email        # public
///     ├── user/password/reset        # public
///     ├── wechat/login               # public
///     ├── wechat/check-session       # public
///     ├── user/{logout,detail,update}
///     ├── task/{create-or-update,list-or-search,detail,delete}
///     └── task/category/{create-or-update,list-or-search,detail,delete}
/// ```
///
/// # Middleware Stack
///
/// Outermost first:
/// 1. Origin guard (403 for origins outside the allow-list)
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Rate limiting (`/api` only)
/// 5. Authentication (per-route basis)
pub fn build_router(state: AppState) -> Router {
    use crate::routes::{category, home, task, user, wechat};

    let home_routes = Router::new()
        .route("/", get(home::random_string))
        .route("/key", get(home::app_key))
        .route("/health", get(home::health_check));

    let public_routes = Router::new()
        .route("/user/store", post(user::store))
        .route("/user/login", post(user::login))
        .route("/user/refresh", post(user::refresh))
        .route("/user/check-login", post(user::check_login))
        .route("/user/password/email", post(user::send_password_email))
        .route("/user/password/reset", post(user::password_reset))
        .route("/wechat/login", post(wechat::login))
        .route("/wechat/check-session", post(wechat::check_session));

    let authed_routes = Router::new()
        .route("/user/logout", post(user::logout))
        .route("/user/detail", post(user::detail))
        .route("/user/update", post(user::update))
        .route("/task/create-or-update", post(task::create_or_update))
        .route("/task/list-or-search", post(task::list_or_search))
        .route("/task/detail", post(task::detail))
        .route("/task/delete", post(task::delete))
        .route("/task/category/create-or-update", post(category::create_or_update))
        .route("/task/category/list-or-search", post(category::list_or_search))
        .route("/task/category/detail", post(category::detail))
        .route("/task/category/delete", post(category::delete))
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let api_routes = Router::new()
        .merge(public_routes)
        .merge(authed_routes)
        .layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_layer));

    Router::new()
        .merge(home_routes)
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors::cors_layer(&state.config.api.cors_origins))
        .layer(from_fn_with_state(state.clone(), cors::origin_guard))
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Validates the bearer access token, rejects tokens revoked by logout,
/// then injects AuthContext into request extensions.
pub async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?;
    let claims = jwt::validate_access_token(token, state.jwt_secret()).map_err(AuthError::from)?;

    if state.redis.is_token_revoked(token).await? {
        tracing::debug!(user_id = claims.uid, "Rejected revoked token");
        return Err(AuthError::Revoked.into());
    }

    req.extensions_mut().insert(AuthContext::from_claims(&claims));

    Ok(next.run(req).await)
}
