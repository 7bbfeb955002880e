/// Task category model and database operations
///
/// Categories group a user's tasks. Every user gets one default category
/// on registration; it can be renamed but never deleted. A user holds at
/// most [`MAX_CATEGORIES_PER_USER`] live categories.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE task_categories (
///     id BIGSERIAL PRIMARY KEY,
///     name VARCHAR(10) NOT NULL,
///     user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     status SMALLINT NOT NULL DEFAULT 0,
///     color CHAR(7) NOT NULL,
///     is_default BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at BIGINT NOT NULL,
///     updated_at BIGINT NOT NULL,
///     deleted_at BIGINT
/// );
/// ```

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, QueryBuilder};

use super::pagination::{OrderBy, Page, PageRequest};
use crate::unix_now;

/// Live categories a single user may own
pub const MAX_CATEGORIES_PER_USER: i64 = 15;

/// Page size of the category list
pub const CATEGORY_PAGE_SIZE: i64 = 10;

/// Name given to the category created at registration
pub const DEFAULT_CATEGORY_NAME: &str = "Inbox";

/// Color given to the category created at registration
pub const DEFAULT_CATEGORY_COLOR: &str = "#1890ff";

const CATEGORY_COLUMNS: &str = "id, name, user_id, status, color, is_default, created_at, updated_at";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
    pub status: i16,

    /// `#` followed by six alphanumerics
    pub color: String,

    pub is_default: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Category plus the number of live tasks filed under it
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CategoryWithCount {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub category: Category,

    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct CreateCategory {
    pub name: String,
    pub color: String,
    pub status: i16,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub color: Option<String>,
    pub status: Option<i16>,
}

/// Filters for the category list
#[derive(Debug, Clone, Default)]
pub struct CategoryFilter {
    /// Name contains
    pub search: Option<String>,
    pub status: Option<i16>,
    pub order_by: OrderBy,
}

/// Outcome of [`Category::create_capped`]
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Category),
    LimitReached,
}

impl Category {
    /// Inserts a category without checking the per-user cap
    pub async fn create<'e, E>(
        executor: E,
        user_id: i64,
        data: CreateCategory,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO task_categories (name, user_id, status, color, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             RETURNING {}",
            CATEGORY_COLUMNS
        );

        sqlx::query_as::<_, Category>(&query)
            .bind(data.name)
            .bind(user_id)
            .bind(data.status)
            .bind(data.color)
            .bind(unix_now())
            .fetch_one(executor)
            .await
    }

    /// Creates the undeletable default category for a new user
    pub async fn create_default<'e, E>(executor: E, user_id: i64) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO task_categories (name, user_id, color, is_default, created_at, updated_at) \
             VALUES ($1, $2, $3, TRUE, $4, $4) \
             RETURNING {}",
            CATEGORY_COLUMNS
        );

        sqlx::query_as::<_, Category>(&query)
            .bind(DEFAULT_CATEGORY_NAME)
            .bind(user_id)
            .bind(DEFAULT_CATEGORY_COLOR)
            .bind(unix_now())
            .fetch_one(executor)
            .await
    }

    /// Creates a category unless the user already has the maximum
    ///
    /// The user row is locked for the duration so concurrent creates can't
    /// both slip under the cap.
    pub async fn create_capped(
        pool: &PgPool,
        user_id: i64,
        data: CreateCategory,
    ) -> Result<CreateOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let live = Self::count_live(&mut *tx, user_id).await?;
        if live >= MAX_CATEGORIES_PER_USER {
            tx.rollback().await?;
            return Ok(CreateOutcome::LimitReached);
        }

        let category = Self::create(&mut *tx, user_id, data).await?;
        tx.commit().await?;

        Ok(CreateOutcome::Created(category))
    }

    /// Number of live categories the user owns
    pub async fn count_live<'e, E>(executor: E, user_id: i64) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM task_categories WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(executor)
        .await
    }

    /// Finds a live category owned by the user
    pub async fn find_owned(
        pool: &PgPool,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM task_categories \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
            CATEGORY_COLUMNS
        );

        sqlx::query_as::<_, Category>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a live category owned by the user, with its task count
    pub async fn find_owned_with_count(
        pool: &PgPool,
        id: i64,
        user_id: i64,
    ) -> Result<Option<CategoryWithCount>, sqlx::Error> {
        let mut builder = Self::select_with_count();
        builder.push(" WHERE c.id = ").push_bind(id);
        builder.push(" AND c.user_id = ").push_bind(user_id);
        builder.push(" AND c.deleted_at IS NULL");

        builder
            .build_query_as::<CategoryWithCount>()
            .fetch_optional(pool)
            .await
    }

    /// All live categories of the user among `ids`
    pub async fn find_many_owned(
        pool: &PgPool,
        ids: &[i64],
        user_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM task_categories \
             WHERE id = ANY($1) AND user_id = $2 AND deleted_at IS NULL",
            CATEGORY_COLUMNS
        );

        sqlx::query_as::<_, Category>(&query)
            .bind(ids)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Applies a partial update to a category the user owns
    ///
    /// Returns `None` if no live category with that id belongs to the user.
    pub async fn update(
        pool: &PgPool,
        id: i64,
        user_id: i64,
        data: UpdateCategory,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE task_categories SET updated_at = ");
        builder.push_bind(unix_now());

        if let Some(name) = data.name {
            builder.push(", name = ").push_bind(name);
        }
        if let Some(color) = data.color {
            builder.push(", color = ").push_bind(color);
        }
        if let Some(status) = data.status {
            builder.push(", status = ").push_bind(status);
        }

        builder.push(" WHERE id = ").push_bind(id);
        builder.push(" AND user_id = ").push_bind(user_id);
        builder.push(" AND deleted_at IS NULL RETURNING ");
        builder.push(CATEGORY_COLUMNS);

        builder
            .build_query_as::<Category>()
            .fetch_optional(pool)
            .await
    }

    /// Lists the user's categories, newest first by default
    pub async fn list(
        pool: &PgPool,
        user_id: i64,
        filter: &CategoryFilter,
        page: PageRequest,
    ) -> Result<Page<CategoryWithCount>, sqlx::Error> {
        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM task_categories c");
        Self::push_filters(&mut count_builder, user_id, filter);

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(pool)
            .await?;

        let mut builder = Self::select_with_count();
        Self::push_filters(&mut builder, user_id, filter);
        builder.push(" ORDER BY c.").push(filter.order_by.as_sql());
        builder.push(", c.id DESC");
        builder.push(" LIMIT ").push_bind(page.limit());
        builder.push(" OFFSET ").push_bind(page.offset());

        let records = builder
            .build_query_as::<CategoryWithCount>()
            .fetch_all(pool)
            .await?;

        Ok(Page::new(records, total, page))
    }

    /// Soft-deletes the user's categories among `ids`
    ///
    /// Default categories are never touched. Returns the number deleted.
    pub async fn soft_delete(pool: &PgPool, ids: &[i64], user_id: i64) -> Result<u64, sqlx::Error> {
        let now = unix_now();
        let result = sqlx::query(
            "UPDATE task_categories SET deleted_at = $1, updated_at = $1 \
             WHERE id = ANY($2) AND user_id = $3 AND is_default = FALSE AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(ids)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    fn select_with_count() -> QueryBuilder<'static, Postgres> {
        QueryBuilder::new(
            "SELECT c.id, c.name, c.user_id, c.status, c.color, c.is_default, \
             c.created_at, c.updated_at, \
             (SELECT COUNT(*) FROM tasks t WHERE t.category_id = c.id AND t.deleted_at IS NULL) AS count \
             FROM task_categories c",
        )
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, user_id: i64, filter: &CategoryFilter) {
        builder.push(" WHERE c.deleted_at IS NULL AND c.user_id = ");
        builder.push_bind(user_id);

        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            builder.push(" AND strpos(c.name, ");
            builder.push_bind(search.to_string());
            builder.push(") > 0");
        }
        if let Some(status) = filter.status {
            builder.push(" AND c.status = ").push_bind(status);
        }
    }
}

/// Whether `color` is `#` followed by six ASCII alphanumerics
pub fn is_valid_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_color() {
        assert!(is_valid_color("#1890ff"));
        assert!(is_valid_color(DEFAULT_CATEGORY_COLOR));
        assert!(is_valid_color("#ABC123"));

        assert!(!is_valid_color("1890ff"));
        assert!(!is_valid_color("#1890f"));
        assert!(!is_valid_color("#1890fff"));
        assert!(!is_valid_color("#1890f-"));
        assert!(!is_valid_color("#é890f"));
    }

    #[test]
    fn test_filters_sql() {
        let filter = CategoryFilter {
            search: Some("work".to_string()),
            status: Some(1),
            order_by: OrderBy::UpdatedAtAsc,
        };

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM task_categories c");
        Category::push_filters(&mut builder, 7, &filter);
        let sql = builder.sql().to_string();

        assert!(sql.contains("c.deleted_at IS NULL AND c.user_id = $1"));
        assert!(sql.contains("strpos(c.name, $2) > 0"));
        assert!(sql.contains("c.status = $3"));
    }

    #[test]
    fn test_empty_search_is_ignored() {
        let filter = CategoryFilter {
            search: Some(String::new()),
            ..Default::default()
        };

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 FROM task_categories c");
        Category::push_filters(&mut builder, 7, &filter);

        assert!(!builder.sql().contains("strpos"));
    }

    #[test]
    fn test_category_with_count_serializes_flat() {
        let item = CategoryWithCount {
            category: Category {
                id: 3,
                name: "Work".to_string(),
                user_id: 1,
                status: 0,
                color: "#ff0000".to_string(),
                is_default: false,
                created_at: 0,
                updated_at: 0,
            },
            count: 4,
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["name"], "Work");
        assert_eq!(json["count"], 4);
        assert!(json.get("category").is_none());
    }
}
