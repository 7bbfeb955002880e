/// Middleware modules for the API server
///
/// - `cors`: CORS layer and origin allow-list guard
/// - `rate_limit`: Redis token bucket for `/api`

pub mod cors;
pub mod rate_limit;
