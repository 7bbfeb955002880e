/// Password-reset tokens
///
/// At most one row per email. The `token` column holds the SHA-256 digest
/// of the token that was mailed out, never the token itself.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE password_resets (
///     email VARCHAR(30) PRIMARY KEY,
///     token VARCHAR(64) NOT NULL,
///     created_at BIGINT NOT NULL
/// );
/// ```

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PasswordReset {
    pub email: String,

    /// SHA-256 hex digest of the mailed token
    #[serde(skip_serializing)]
    pub token: String,

    pub created_at: i64,
}

impl PasswordReset {
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PasswordReset>(
            "SELECT email, token, created_at FROM password_resets WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    /// Stores a new token digest for `email`, replacing any previous one
    pub async fn replace(
        pool: &PgPool,
        email: &str,
        token_hash: &str,
        created_at: i64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PasswordReset>(
            r#"
            INSERT INTO password_resets (email, token, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET token = EXCLUDED.token, created_at = EXCLUDED.created_at
            RETURNING email, token, created_at
            "#,
        )
        .bind(email)
        .bind(token_hash)
        .bind(created_at)
        .fetch_one(pool)
        .await
    }

    pub async fn delete<'e, E>(executor: E, email: &str) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM password_resets WHERE email = $1")
            .bind(email)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_digest_is_not_serialized() {
        let reset = PasswordReset {
            email: "alice@example.com".to_string(),
            token: "ab".repeat(32),
            created_at: 1_700_000_000,
        };

        let json = serde_json::to_value(&reset).unwrap();
        assert_eq!(json["email"], "alice@example.com");
        assert!(json.get("token").is_none());
    }
}
