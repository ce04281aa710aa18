/// User model and database operations
///
/// Users go through a two-step registration: a first registration attempt
/// creates an unverified row holding a hashed one-time code; verifying the
/// code marks the user verified exactly once, sets their generated password,
/// and clears the code. Repeat registration attempts against a
/// still-unverified email re-issue the row (new name, fresh code); against
/// a verified email they fail.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(100) NOT NULL,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     password_hash TEXT,
///     is_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     otp_hash TEXT,
///     otp_expiry TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Emails are lowercase-normalized before every read and write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// User model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Email address (unique, lowercase)
    pub email: String,

    /// Argon2id password hash; absent until OTP verification completes
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    /// Whether the email has been verified
    pub is_verified: bool,

    /// SHA-256 digest of the pending one-time code, if any
    #[serde(skip_serializing)]
    pub otp_hash: Option<String>,

    /// When the pending one-time code expires
    #[serde(skip_serializing)]
    pub otp_expiry: Option<DateTime<Utc>>,

    /// When the user was created
    pub created_at: DateTime<Utc>,

    /// When the user was last updated
    pub updated_at: DateTime<Utc>,
}

/// Denormalized user reference used in responses and event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRef {
    /// User ID
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Email address
    pub email: String,
}

impl User {
    /// Returns the denormalized reference shape for this user
    pub fn to_ref(&self) -> UserRef {
        UserRef {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    /// Creates or re-issues an unverified user for a registration attempt
    ///
    /// One atomic upsert: a new email inserts an unverified row; an existing
    /// unverified email gets its name updated and a fresh code; an existing
    /// verified email matches neither arm and yields `None`, which callers
    /// surface as Conflict.
    pub async fn upsert_unverified(
        pool: &PgPool,
        name: &str,
        email: &str,
        otp_hash: &str,
        otp_expiry: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, otp_hash, otp_expiry)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name,
                otp_hash = EXCLUDED.otp_hash,
                otp_expiry = EXCLUDED.otp_expiry,
                updated_at = NOW()
            WHERE users.is_verified = FALSE
            RETURNING id, name, email, password_hash, is_verified, otp_hash, otp_expiry,
                      created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(email.to_lowercase())
        .bind(otp_hash)
        .bind(otp_expiry)
        .fetch_optional(pool)
        .await
    }

    /// Marks a user verified, storing their first password and clearing the
    /// one-time code
    ///
    /// The `is_verified = FALSE` guard makes verification happen exactly
    /// once; a second attempt returns `None`.
    pub async fn mark_verified(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET is_verified = TRUE,
                password_hash = $2,
                otp_hash = NULL,
                otp_expiry = NULL,
                updated_at = NOW()
            WHERE id = $1 AND is_verified = FALSE
            RETURNING id, name, email, password_hash, is_verified, otp_hash, otp_expiry,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .fetch_optional(pool)
        .await
    }

    /// Finds a user by ID
    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, is_verified, otp_hash, otp_expiry,
                   created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Finds a user by email (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, is_verified, otp_hash, otp_expiry,
                   created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.to_lowercase())
        .fetch_optional(pool)
        .await
    }

    /// Fetches the denormalized reference for one user
    pub async fn find_ref(pool: &PgPool, id: Uuid) -> Result<Option<UserRef>, sqlx::Error> {
        sqlx::query_as::<_, UserRef>("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Fetches denormalized references for a set of users
    ///
    /// Missing IDs are silently absent from the result.
    pub async fn find_refs(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<UserRef>, sqlx::Error> {
        sqlx::query_as::<_, UserRef>("SELECT id, name, email FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_ref() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: None,
            is_verified: false,
            otp_hash: None,
            otp_expiry: None,
            created_at: now,
            updated_at: now,
        };

        let user_ref = user.to_ref();
        assert_eq!(user_ref.id, user.id);
        assert_eq!(user_ref.name, "Ada");
        assert_eq!(user_ref.email, "ada@example.com");
    }

    #[test]
    fn test_sensitive_fields_not_serialized() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: Some("$argon2id$...".to_string()),
            is_verified: true,
            otp_hash: Some("abc".to_string()),
            otp_expiry: Some(now),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("otp_hash").is_none());
        assert!(json.get("otp_expiry").is_none());
    }
}
