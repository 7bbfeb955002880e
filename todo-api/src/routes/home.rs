/// Root endpoints
///
/// ```text
/// GET /        random 32-character alphanumeric string
/// GET /key     random 32-character string suitable as APP_KEY
/// GET /health  database and Redis connectivity
/// ```
///
/// # Health response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "redis": "connected",
///   "pool": {"active_connections": 1, "idle_connections": 1, "total_connections": 2}
/// }
/// ```

use crate::app::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use todo_shared::auth::reset_token::generate_random_string;
use todo_shared::db::pool;

/// Length of the strings served by `/` and `/key`
pub const RANDOM_STRING_LEN: usize = 32;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,

    /// Application version
    pub version: String,

    /// Database status
    pub database: String,

    /// Redis status
    pub redis: String,

    /// Database pool occupancy
    pub pool: pool::PoolStats,
}

pub async fn random_string() -> String {
    generate_random_string(RANDOM_STRING_LEN)
}

pub async fn app_key() -> String {
    generate_random_string(RANDOM_STRING_LEN)
}

/// Health check handler
///
/// Always answers 200; a failed dependency shows up as `degraded`.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ok = match pool::health_check(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };
    let redis_ok = state.redis.stats().await.healthy;

    Json(HealthResponse {
        status: if database_ok && redis_ok {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: todo_shared::VERSION.to_string(),
        database: connectivity(database_ok).to_string(),
        redis: connectivity(redis_ok).to_string(),
        pool: pool::get_pool_stats(&state.db),
    })
}

fn connectivity(ok: bool) -> &'static str {
    if ok {
        "connected"
    } else {
        "disconnected"
    }
}
