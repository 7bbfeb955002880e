/// User model and database operations
///
/// A user either registers with username/email/password or is created on
/// first WeChat login, in which case only `openid` and `session_key` are set.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id BIGSERIAL PRIMARY KEY,
///     username VARCHAR(20) UNIQUE,
///     email VARCHAR(30) UNIQUE,
///     password_hash VARCHAR(255),
///     avatar VARCHAR(255),
///     openid VARCHAR(64) UNIQUE,
///     session_key VARCHAR(64),
///     gender SMALLINT NOT NULL DEFAULT 0,
///     status SMALLINT NOT NULL DEFAULT 0,
///     last_login_time BIGINT NOT NULL DEFAULT 0,
///     created_at BIGINT NOT NULL,
///     updated_at BIGINT NOT NULL
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use todo_shared::models::user::{User, CreateUser};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser {
///     username: "alice".to_string(),
///     email: "alice@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
/// }).await?;
///
/// let found = User::find_by_username(&pool, "alice").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, QueryBuilder};

use crate::unix_now;

/// Column list shared by every SELECT/RETURNING on `users`
const USER_COLUMNS: &str = "id, username, email, password_hash, avatar, openid, session_key, \
                            gender, status, last_login_time, created_at, updated_at";

/// Unique constraint on `users.username`
pub const USERNAME_UNIQUE_CONSTRAINT: &str = "users_username_key";

/// Unique constraint on `users.email`
pub const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_key";

/// User account
///
/// `password_hash`, `openid` and `session_key` never leave the server.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username (None for WeChat-only accounts)
    pub username: Option<String>,

    /// Unique email (None for WeChat-only accounts)
    pub email: Option<String>,

    /// Argon2id PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,

    pub avatar: Option<String>,

    /// WeChat openid
    #[serde(skip_serializing, default)]
    pub openid: Option<String>,

    /// WeChat session key from the last code exchange
    #[serde(skip_serializing, default)]
    pub session_key: Option<String>,

    /// 0 unknown, 1 male, 2 female
    pub gender: i16,

    pub status: i16,

    /// Unix seconds of the last successful login (0 if never)
    pub last_login_time: i64,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for registering a password user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub email: String,

    /// Argon2id password hash (NOT the plaintext password)
    pub password_hash: String,
}

/// Profile fields a user may change
///
/// Only `Some` fields are written.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub avatar: Option<String>,
    pub gender: Option<i16>,
    pub password_hash: Option<String>,
}

impl UpdateUser {
    pub fn is_empty(&self) -> bool {
        self.avatar.is_none() && self.gender.is_none() && self.password_hash.is_none()
    }
}

impl User {
    /// Creates a password user
    ///
    /// # Errors
    ///
    /// Returns a database error carrying [`USERNAME_UNIQUE_CONSTRAINT`] or
    /// [`EMAIL_UNIQUE_CONSTRAINT`] when either value is taken.
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let now = unix_now();
        let query = format!(
            "INSERT INTO users (username, email, password_hash, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) \
             RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(data.username)
            .bind(data.email)
            .bind(data.password_hash)
            .bind(now)
            .fetch_one(executor)
            .await
    }

    /// Creates a WeChat user from an openid/session key pair
    ///
    /// Returns `None` when another request registered the openid first.
    pub async fn create_wechat<'e, E>(
        executor: E,
        openid: &str,
        session_key: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let now = unix_now();
        let query = format!(
            "INSERT INTO users (openid, session_key, last_login_time, created_at, updated_at) \
             VALUES ($1, $2, $3, $3, $3) \
             ON CONFLICT (openid) DO NOTHING \
             RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(openid)
            .bind(session_key)
            .bind(now)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);

        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);

        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_openid(pool: &PgPool, openid: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE openid = $1", USER_COLUMNS);

        sqlx::query_as::<_, User>(&query)
            .bind(openid)
            .fetch_optional(pool)
            .await
    }

    /// Whether a username is already registered
    pub async fn username_exists(pool: &PgPool, username: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(pool)
            .await
    }

    /// Whether an email is already registered
    pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(pool)
            .await
    }

    /// Applies a partial update
    ///
    /// Returns `None` if the user doesn't exist. An empty update still bumps
    /// `updated_at`.
    pub async fn update(
        pool: &PgPool,
        id: i64,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET updated_at = ");
        builder.push_bind(unix_now());

        if let Some(avatar) = data.avatar {
            builder.push(", avatar = ").push_bind(avatar);
        }
        if let Some(gender) = data.gender {
            builder.push(", gender = ").push_bind(gender);
        }
        if let Some(password_hash) = data.password_hash {
            builder.push(", password_hash = ").push_bind(password_hash);
        }

        builder.push(" WHERE id = ").push_bind(id);
        builder.push(" RETURNING ").push(USER_COLUMNS);

        builder
            .build_query_as::<User>()
            .fetch_optional(pool)
            .await
    }

    /// Replaces the password hash of the user with this email
    pub async fn update_password_by_email<'e, E>(
        executor: E,
        email: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = $2 WHERE email = $3",
        )
        .bind(password_hash)
        .bind(unix_now())
        .bind(email)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stores the latest WeChat session key and stamps the login time
    pub async fn update_session_key(
        pool: &PgPool,
        id: i64,
        session_key: &str,
    ) -> Result<bool, sqlx::Error> {
        let now = unix_now();
        let result = sqlx::query(
            "UPDATE users SET session_key = $1, last_login_time = $2, updated_at = $2 WHERE id = $3",
        )
        .bind(session_key)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stamps `last_login_time` after a successful login
    pub async fn update_last_login(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_time = $1 WHERE id = $2")
            .bind(unix_now())
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Name to embed in tokens
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }
}
