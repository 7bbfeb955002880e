/// Task endpoints (authenticated, scoped to the current user)
///
/// # Endpoints
///
/// - `POST /api/task/create-or-update` - Create without `id`, partial update with it
/// - `POST /api/task/list-or-search` - Filtered, paginated list
/// - `POST /api/task/detail` - One task
/// - `POST /api/task/delete` - Soft-delete a batch

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidatedJson,
    response::ApiResponse,
    routes::{IdRequest, IdsRequest},
};
use axum::extract::State;
use serde::Deserialize;
use sqlx::PgPool;
use todo_shared::{
    auth::middleware::AuthContext,
    models::{
        category::Category,
        pagination::{OrderBy, Page, PageRequest},
        task::{CreateTask, Task, TaskFilter, UpdateTask, TASK_PAGE_SIZE},
    },
};
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct SaveTaskRequest {
    /// Present for updates
    pub id: Option<i64>,

    #[validate(length(min = 1, max = 100, message = "title must be 1 to 100 characters"))]
    pub title: Option<String>,

    pub category_id: Option<i64>,

    #[validate(length(max = 255, message = "content must be at most 255 characters"))]
    pub content: Option<String>,

    /// Unix time; 0 on create means now
    #[validate(range(min = 0, message = "deadline must not be negative"))]
    pub deadline: Option<i64>,

    #[validate(range(min = 0, max = 1, message = "status must be 0 or 1"))]
    pub status: Option<i16>,

    #[validate(length(min = 1, max = 100, message = "tags must be 1 to 100 characters"))]
    pub tags: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ListTasksRequest {
    /// Title contains
    #[validate(length(max = 20, message = "s must be at most 20 characters"))]
    pub s: Option<String>,

    /// Tags contain
    #[validate(length(max = 20, message = "tag must be at most 20 characters"))]
    pub tag: Option<String>,

    pub category_id: Option<i64>,

    #[validate(range(min = 0, max = 1, message = "status must be 0 or 1"))]
    pub status: Option<i16>,

    /// Due on or before
    pub deadline: Option<i64>,

    pub order_by: Option<OrderBy>,

    /// 1-based; missing or non-positive means the first page
    pub page: Option<i64>,
}

impl ListTasksRequest {
    fn filter(self) -> (TaskFilter, PageRequest) {
        let page = PageRequest::new(self.page, TASK_PAGE_SIZE);
        let filter = TaskFilter {
            search: self.s,
            tag: self.tag,
            category_id: self.category_id,
            status: self.status,
            deadline: self.deadline,
            order_by: self.order_by.unwrap_or_default(),
        };
        (filter, page)
    }
}

/// Create a task, or update one when `id` is given
///
/// # Errors
///
/// - `422`: Field rules, missing title/category on create, or a category
///   that isn't one of the user's live categories
/// - `404`: `id` doesn't name one of the user's tasks
pub async fn create_or_update(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<SaveTaskRequest>,
) -> ApiResult<ApiResponse<Task>> {
    if let Some(category_id) = req.category_id {
        ensure_category(&state.db, category_id, auth.user_id).await?;
    }

    let task = match req.id {
        None => {
            let title = req
                .title
                .ok_or_else(|| ApiError::field("title", "title is required"))?;
            let category_id = req
                .category_id
                .ok_or_else(|| ApiError::field("category_id", "category_id is required"))?;

            let task = Task::create(
                &state.db,
                auth.user_id,
                CreateTask {
                    title,
                    category_id,
                    content: req.content,
                    deadline: req.deadline,
                    status: req.status,
                    tags: req.tags,
                },
            )
            .await?;

            tracing::debug!(user_id = auth.user_id, task_id = task.id, "Task created");
            task
        }
        Some(id) => Task::update(
            &state.db,
            id,
            auth.user_id,
            UpdateTask {
                title: req.title,
                category_id: req.category_id,
                content: req.content,
                deadline: req.deadline,
                status: req.status,
                tags: req.tags,
            },
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?,
    };

    Ok(ApiResponse::ok(task))
}

/// List or search tasks, open before done
pub async fn list_or_search(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<ListTasksRequest>,
) -> ApiResult<ApiResponse<Page<Task>>> {
    let (filter, page) = req.filter();
    let tasks = Task::list(&state.db, auth.user_id, &filter, page).await?;

    Ok(ApiResponse::ok(tasks))
}

pub async fn detail(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<IdRequest>,
) -> ApiResult<ApiResponse<Task>> {
    let task = Task::find_owned(&state.db, req.id(), auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    Ok(ApiResponse::ok(task))
}

/// Soft-delete the user's tasks among `id`; returns the ids deleted
pub async fn delete(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<IdsRequest>,
) -> ApiResult<ApiResponse<Vec<i64>>> {
    let deleted = Task::soft_delete(&state.db, &req.unique_ids(), auth.user_id).await?;

    tracing::debug!(user_id = auth.user_id, count = deleted.len(), "Tasks deleted");

    Ok(ApiResponse::ok(deleted))
}

/// The category must be one of the user's live categories
async fn ensure_category(pool: &PgPool, category_id: i64, user_id: i64) -> ApiResult<()> {
    match Category::find_owned(pool, category_id, user_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::field("category_id", "category does not exist")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_request_rules() {
        let req = SaveTaskRequest {
            title: Some(String::new()),
            content: Some("c".repeat(256)),
            deadline: Some(-1),
            status: Some(2),
            tags: Some("t".repeat(101)),
            ..Default::default()
        };

        let err = req.validate().unwrap_err();
        let mut fields: Vec<String> = err.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();

        assert_eq!(fields, vec!["content", "deadline", "status", "tags", "title"]);
    }

    #[test]
    fn test_save_request_partial_update_is_valid() {
        let req = SaveTaskRequest {
            id: Some(7),
            status: Some(1),
            ..Default::default()
        };

        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_list_request_deserialize() {
        let req: ListTasksRequest = serde_json::from_value(serde_json::json!({
            "s": "report",
            "status": 0,
            "order_by": "updated_at_asc",
            "page": 2
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        let (filter, page) = req.filter();
        assert_eq!(filter.search.as_deref(), Some("report"));
        assert_eq!(filter.status, Some(0));
        assert_eq!(filter.order_by, OrderBy::UpdatedAtAsc);
        assert_eq!(page.page, 2);
        assert_eq!(page.size, TASK_PAGE_SIZE);
    }

    #[test]
    fn test_list_request_defaults() {
        let (filter, page) = ListTasksRequest::default().filter();

        assert_eq!(filter.order_by, OrderBy::CreatedAtDesc);
        assert_eq!(page.page, 1);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_list_request_huge_page() {
        let req: ListTasksRequest =
            serde_json::from_value(serde_json::json!({"page": i64::MAX})).unwrap();
        assert!(req.validate().is_ok());

        let (_, page) = req.filter();
        assert_eq!(page.page, i64::MAX);
        assert_eq!(page.offset(), i64::MAX);
    }

    #[test]
    fn test_list_request_long_search() {
        let req = ListTasksRequest {
            s: Some("x".repeat(21)),
            ..Default::default()
        };

        assert!(req.validate().is_err());
    }
}
