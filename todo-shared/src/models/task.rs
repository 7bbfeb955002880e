/// Task model and database operations
///
/// A task belongs to exactly one user and one of that user's categories.
/// Deleting a task only stamps `deleted_at`; every query here skips
/// soft-deleted rows.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id BIGSERIAL PRIMARY KEY,
///     title VARCHAR(100) NOT NULL,
///     content VARCHAR(255) NOT NULL DEFAULT '',
///     deadline BIGINT NOT NULL DEFAULT 0,
///     category_id BIGINT NOT NULL REFERENCES task_categories(id),
///     status SMALLINT NOT NULL DEFAULT 0,
///     user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     tags VARCHAR(100) NOT NULL DEFAULT '',
///     created_at BIGINT NOT NULL,
///     updated_at BIGINT NOT NULL,
///     deleted_at BIGINT
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use todo_shared::models::task::{Task, CreateTask, TaskFilter};
/// use todo_shared::models::pagination::PageRequest;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool, user_id: i64, category_id: i64) -> Result<(), sqlx::Error> {
/// Task::create(&pool, user_id, CreateTask {
///     title: "Write report".to_string(),
///     category_id,
///     ..Default::default()
/// }).await?;
///
/// let page = Task::list(&pool, user_id, &TaskFilter::default(), PageRequest::new(None, 20)).await?;
/// println!("{} open tasks", page.total);
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::pagination::{OrderBy, Page, PageRequest};
use crate::unix_now;

/// Page size of the task list
pub const TASK_PAGE_SIZE: i64 = 20;

/// Open task
pub const STATUS_OPEN: i16 = 0;

/// Completed task
pub const STATUS_DONE: i16 = 1;

const TASK_COLUMNS: &str =
    "id, title, content, deadline, category_id, status, user_id, tags, created_at, updated_at";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub content: String,

    /// Unix seconds
    pub deadline: i64,

    pub category_id: i64,

    /// 0 open, 1 done
    pub status: i16,

    pub user_id: i64,
    pub tags: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct CreateTask {
    pub title: String,
    pub category_id: i64,
    pub content: Option<String>,

    /// `None` or 0 means "now"
    pub deadline: Option<i64>,

    pub status: Option<i16>,
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub category_id: Option<i64>,
    pub content: Option<String>,
    pub deadline: Option<i64>,
    pub status: Option<i16>,
    pub tags: Option<String>,
}

/// Filters for the task list
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Title contains
    pub search: Option<String>,

    /// Tags contain
    pub tag: Option<String>,

    pub category_id: Option<i64>,
    pub status: Option<i16>,

    /// Due on or before
    pub deadline: Option<i64>,

    pub order_by: OrderBy,
}

/// Resolves the deadline stored on create
pub fn effective_deadline(deadline: Option<i64>, now: i64) -> i64 {
    match deadline {
        Some(d) if d > 0 => d,
        _ => now,
    }
}

impl Task {
    pub async fn create(pool: &PgPool, user_id: i64, data: CreateTask) -> Result<Self, sqlx::Error> {
        let now = unix_now();
        let query = format!(
            "INSERT INTO tasks (title, content, deadline, category_id, status, user_id, tags, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
             RETURNING {}",
            TASK_COLUMNS
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(data.title)
            .bind(data.content.unwrap_or_default())
            .bind(effective_deadline(data.deadline, now))
            .bind(data.category_id)
            .bind(data.status.unwrap_or(STATUS_OPEN))
            .bind(user_id)
            .bind(data.tags.unwrap_or_default())
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Finds a live task owned by the user
    pub async fn find_owned(
        pool: &PgPool,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM tasks WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
            TASK_COLUMNS
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Applies a partial update to a task the user owns
    ///
    /// Returns `None` if no live task with that id belongs to the user.
    pub async fn update(
        pool: &PgPool,
        id: i64,
        user_id: i64,
        data: UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE tasks SET updated_at = ");
        builder.push_bind(unix_now());

        if let Some(title) = data.title {
            builder.push(", title = ").push_bind(title);
        }
        if let Some(category_id) = data.category_id {
            builder.push(", category_id = ").push_bind(category_id);
        }
        if let Some(content) = data.content {
            builder.push(", content = ").push_bind(content);
        }
        if let Some(deadline) = data.deadline {
            builder.push(", deadline = ").push_bind(deadline);
        }
        if let Some(status) = data.status {
            builder.push(", status = ").push_bind(status);
        }
        if let Some(tags) = data.tags {
            builder.push(", tags = ").push_bind(tags);
        }

        builder.push(" WHERE id = ").push_bind(id);
        builder.push(" AND user_id = ").push_bind(user_id);
        builder.push(" AND deleted_at IS NULL RETURNING ");
        builder.push(TASK_COLUMNS);

        builder.build_query_as::<Task>().fetch_optional(pool).await
    }

    /// Lists or searches the user's tasks
    ///
    /// Open tasks come before done ones; within a status the requested
    /// order applies.
    pub async fn list(
        pool: &PgPool,
        user_id: i64,
        filter: &TaskFilter,
        page: PageRequest,
    ) -> Result<Page<Task>, sqlx::Error> {
        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM tasks");
        Self::push_filters(&mut count_builder, user_id, filter);

        let total: i64 = count_builder.build_query_scalar().fetch_one(pool).await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        builder.push(TASK_COLUMNS).push(" FROM tasks");
        Self::push_filters(&mut builder, user_id, filter);
        builder.push(" ORDER BY status ASC, ");
        builder.push(filter.order_by.as_sql());
        builder.push(", id DESC");
        builder.push(" LIMIT ").push_bind(page.limit());
        builder.push(" OFFSET ").push_bind(page.offset());

        let records = builder.build_query_as::<Task>().fetch_all(pool).await?;

        Ok(Page::new(records, total, page))
    }

    /// Soft-deletes the user's tasks among `ids`
    ///
    /// Returns the ids that were actually deleted.
    pub async fn soft_delete(
        pool: &PgPool,
        ids: &[i64],
        user_id: i64,
    ) -> Result<Vec<i64>, sqlx::Error> {
        let now = unix_now();

        sqlx::query_scalar(
            "UPDATE tasks SET deleted_at = $1, updated_at = $1 \
             WHERE id = ANY($2) AND user_id = $3 AND deleted_at IS NULL \
             RETURNING id",
        )
        .bind(now)
        .bind(ids)
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, user_id: i64, filter: &TaskFilter) {
        builder.push(" WHERE deleted_at IS NULL AND user_id = ");
        builder.push_bind(user_id);

        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            builder.push(" AND strpos(title, ");
            builder.push_bind(search.to_string());
            builder.push(") > 0");
        }
        if let Some(tag) = filter.tag.as_deref().filter(|s| !s.is_empty()) {
            builder.push(" AND strpos(tags, ");
            builder.push_bind(tag.to_string());
            builder.push(") > 0");
        }
        if let Some(category_id) = filter.category_id {
            builder.push(" AND category_id = ").push_bind(category_id);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(deadline) = filter.deadline {
            builder.push(" AND deadline <= ").push_bind(deadline);
        }
    }
}
