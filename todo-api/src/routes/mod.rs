/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `home`: Random strings and health check
/// - `user`: Registration, login, tokens, profile, password reset
/// - `wechat`: Mini-program login and session check
/// - `task`: Task CRUD and search
/// - `category`: Task category CRUD and search

pub mod category;
pub mod home;
pub mod task;
pub mod user;
pub mod wechat;

use serde::Deserialize;
use validator::Validate;

/// `{"id": 1}` body of the detail endpoints
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct IdRequest {
    #[validate(required(message = "id is required"))]
    pub id: Option<i64>,
}

impl IdRequest {
    /// The validated id
    pub fn id(&self) -> i64 {
        self.id.unwrap_or_default()
    }
}

/// `{"id": [1, 2]}` body of the delete endpoints
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct IdsRequest {
    #[validate(length(min = 1, message = "id must be a non-empty array"))]
    pub id: Vec<i64>,
}

impl IdsRequest {
    /// Ids with duplicates removed, in request order
    pub fn unique_ids(&self) -> Vec<i64> {
        let mut seen = std::collections::HashSet::new();
        self.id.iter().copied().filter(|id| seen.insert(*id)).collect()
    }
}
