/// Task category endpoints (authenticated, scoped to the current user)
///
/// # Endpoints
///
/// - `POST /api/task/category/create-or-update` - Create without `id`, partial update with it
/// - `POST /api/task/category/list-or-search` - Filtered, paginated list with task counts
/// - `POST /api/task/category/detail` - One category with its task count
/// - `POST /api/task/category/delete` - Soft-delete a batch
///
/// A user has at most 15 live categories, and the default category created
/// at registration can't be deleted.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidatedJson,
    response::ApiResponse,
    routes::{IdRequest, IdsRequest},
};
use axum::extract::State;
use serde::Deserialize;
use std::borrow::Cow;
use todo_shared::{
    auth::middleware::AuthContext,
    models::{
        category::{
            is_valid_color, Category, CategoryFilter, CategoryWithCount, CreateCategory,
            CreateOutcome, UpdateCategory, CATEGORY_PAGE_SIZE, MAX_CATEGORIES_PER_USER,
        },
        pagination::{OrderBy, Page, PageRequest},
    },
};
use validator::{Validate, ValidationError};

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct SaveCategoryRequest {
    /// Present for updates
    pub id: Option<i64>,

    #[validate(length(min = 1, max = 10, message = "name must be 1 to 10 characters"))]
    pub name: String,

    /// Required on create
    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,

    #[validate(range(min = 0, max = 4, message = "status must be between 0 and 4"))]
    pub status: Option<i16>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ListCategoriesRequest {
    /// Name contains
    #[validate(length(max = 20, message = "s must be at most 20 characters"))]
    pub s: Option<String>,

    #[validate(range(min = 0, max = 4, message = "status must be between 0 and 4"))]
    pub status: Option<i16>,

    pub order_by: Option<OrderBy>,

    /// 1-based; missing or non-positive means the first page
    pub page: Option<i64>,
}

fn validate_color(color: &str) -> Result<(), ValidationError> {
    if is_valid_color(color) {
        return Ok(());
    }

    let mut err = ValidationError::new("color");
    err.message = Some(Cow::Borrowed(
        "color must be # followed by 6 letters or digits",
    ));
    Err(err)
}

/// Create a category, or update one when `id` is given
///
/// # Errors
///
/// - `422`: Field rules, missing color on create, or the 15-category cap
/// - `404`: `id` doesn't name one of the user's categories
pub async fn create_or_update(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<SaveCategoryRequest>,
) -> ApiResult<ApiResponse<Category>> {
    let category = match req.id {
        None => {
            let color = req
                .color
                .ok_or_else(|| ApiError::field("color", "color is required"))?;

            let outcome = Category::create_capped(
                &state.db,
                auth.user_id,
                CreateCategory {
                    name: req.name,
                    color,
                    status: req.status.unwrap_or_default(),
                },
            )
            .await?;

            match outcome {
                CreateOutcome::Created(category) => {
                    tracing::debug!(user_id = auth.user_id, category_id = category.id, "Category created");
                    category
                }
                CreateOutcome::LimitReached => {
                    return Err(ApiError::field(
                        "name",
                        format!("at most {} categories", MAX_CATEGORIES_PER_USER),
                    ));
                }
            }
        }
        Some(id) => Category::update(
            &state.db,
            id,
            auth.user_id,
            UpdateCategory {
                name: Some(req.name),
                color: req.color,
                status: req.status,
            },
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?,
    };

    Ok(ApiResponse::ok(category))
}

/// List or search categories, each with its live task count
pub async fn list_or_search(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<ListCategoriesRequest>,
) -> ApiResult<ApiResponse<Page<CategoryWithCount>>> {
    let filter = CategoryFilter {
        search: req.s,
        status: req.status,
        order_by: req.order_by.unwrap_or_default(),
    };
    let page = PageRequest::new(req.page, CATEGORY_PAGE_SIZE);

    let categories = Category::list(&state.db, auth.user_id, &filter, page).await?;

    Ok(ApiResponse::ok(categories))
}

pub async fn detail(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<IdRequest>,
) -> ApiResult<ApiResponse<CategoryWithCount>> {
    let category = Category::find_owned_with_count(&state.db, req.id(), auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;

    Ok(ApiResponse::ok(category))
}

/// Soft-delete a batch of categories
///
/// All or nothing: every id must be a live, non-default category of the
/// user.
pub async fn delete(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<IdsRequest>,
) -> ApiResult<ApiResponse<Vec<i64>>> {
    let ids = req.unique_ids();
    let found = Category::find_many_owned(&state.db, &ids, auth.user_id).await?;

    check_deletable(&ids, &found)?;

    let deleted = Category::soft_delete(&state.db, &ids, auth.user_id).await?;
    tracing::debug!(user_id = auth.user_id, count = deleted, "Categories deleted");

    Ok(ApiResponse::ok(ids))
}

fn check_deletable(ids: &[i64], found: &[Category]) -> ApiResult<()> {
    if found.len() != ids.len() {
        return Err(ApiError::field("id", "category does not exist"));
    }
    if found.iter().any(|c| c.is_default) {
        return Err(ApiError::field("id", "the default category cannot be deleted"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: i64, is_default: bool) -> Category {
        Category {
            id,
            name: format!("c{}", id),
            user_id: 1,
            status: 0,
            color: "#1890ff".to_string(),
            is_default,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_save_request_rules() {
        let req = SaveCategoryRequest {
            name: "a very long name".to_string(),
            color: Some("1890ff".to_string()),
            status: Some(5),
            ..Default::default()
        };

        let err = req.validate().unwrap_err();
        let mut fields: Vec<String> = err.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();

        assert_eq!(fields, vec!["color", "name", "status"]);
    }

    #[test]
    fn test_save_request_valid() {
        let req = SaveCategoryRequest {
            name: "Work".to_string(),
            color: Some("#ff00AA".to_string()),
            status: Some(4),
            ..Default::default()
        };

        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_name_is_required() {
        let err = SaveCategoryRequest::default().validate().unwrap_err();
        assert!(err.field_errors().contains_key("name"));
    }

    #[test]
    fn test_color_message() {
        let err = validate_color("#12345").unwrap_err();
        assert_eq!(
            err.message.as_deref(),
            Some("color must be # followed by 6 letters or digits")
        );
    }

    #[test]
    fn test_check_deletable() {
        assert!(check_deletable(&[1, 2], &[category(1, false), category(2, false)]).is_ok());

        let missing = check_deletable(&[1, 2], &[category(1, false)]).unwrap_err();
        assert!(matches!(missing, ApiError::ValidationError(ref d) if d[0].message == "category does not exist"));

        let default = check_deletable(&[1], &[category(1, true)]).unwrap_err();
        assert!(
            matches!(default, ApiError::ValidationError(ref d) if d[0].message == "the default category cannot be deleted")
        );
    }
}
