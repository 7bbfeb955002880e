/// Database models for the todo backend
///
/// Each model owns its SQL; handlers never write queries directly.
///
/// # Models
///
/// - `user`: Accounts (password and WeChat users)
/// - `category`: Task categories, capped per user, one default each
/// - `task`: Tasks with soft delete and search
/// - `password_reset`: Outstanding password-reset tokens
/// - `pagination`: Page envelope and sort orders shared by the list queries
///
/// # Example
///
/// ```no_run
/// use todo_shared::models::user::{User, CreateUser};
/// use todo_shared::models::category::Category;
/// use todo_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let mut tx = pool.begin().await?;
///
/// let user = User::create(&mut *tx, CreateUser {
///     username: "alice".to_string(),
///     email: "alice@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
/// }).await?;
/// Category::create_default(&mut *tx, user.id).await?;
///
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

pub mod category;
pub mod pagination;
pub mod password_reset;
pub mod task;
pub mod user;
