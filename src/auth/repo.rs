use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::codes;

/// Subscription tier, stored as a Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    None,
    Basic,
    Pro,
    Premium,
}

/// User record in the database. Read from rows, serialized outward only;
/// the password hash never leaves the process in JSON and the dashboard blob
/// is opaque to this subsystem.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub tier: Tier,
    pub tier_expires_at: Option<OffsetDateTime>,
    pub verified: bool,
    pub is_admin: bool,
    #[serde(skip_serializing)]
    pub dashboard: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const COLUMNS: &str = "id, email, password_hash, name, phone, tier, tier_expires_at, \
                       verified, is_admin, dashboard, created_at, updated_at";

impl User {
    /// Find a user by (already normalized) email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Create a new, unverified user. Login stays gated on the verified flag
    /// until the email code is consumed.
    pub async fn create(
        db: &PgPool,
        email: &str,
        password_hash: &str,
        name: &str,
        phone: Option<&str>,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, name, phone) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        ))
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(phone)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn mark_verified(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET verified = TRUE, updated_at = now() \
             WHERE email = $1 \
             RETURNING {COLUMNS}"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Overwrite the stored hash (password-reset confirm). Returns false when
    /// no user exists for the email.
    pub async fn set_password_hash(
        db: &PgPool,
        email: &str,
        password_hash: &str,
    ) -> anyhow::Result<bool> {
        let row = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() \
             WHERE email = $1 \
             RETURNING id",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_optional(db)
        .await?;
        Ok(row.is_some())
    }

    /// Partial profile update. The hash argument is set iff the caller
    /// supplied a new plaintext password on this write; absent fields keep
    /// their current values.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        phone: Option<&str>,
        password_hash: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                phone = COALESCE($3, phone), \
                password_hash = COALESCE($4, password_hash), \
                updated_at = now() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(phone)
        .bind(password_hash)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn set_tier(
        db: &PgPool,
        id: Uuid,
        tier: Tier,
        expires_at: Option<OffsetDateTime>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET tier = $2, tier_expires_at = $3, updated_at = now() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(tier)
        .bind(expires_at)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Delete a user and every outstanding code for that email in one
    /// transaction, so a mid-flight failure cannot orphan code rows. Returns
    /// the email and the number of codes purged.
    pub async fn delete_cascading(
        db: &PgPool,
        id: Uuid,
    ) -> anyhow::Result<Option<(String, u64)>> {
        let mut tx = db.begin().await?;
        let row: Option<(String,)> =
            sqlx::query_as("DELETE FROM users WHERE id = $1 RETURNING email")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((email,)) = row else {
            return Ok(None);
        };
        let purged = codes::delete_all_for(&mut *tx, &email).await?;
        tx.commit().await?;
        Ok(Some((email, purged)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            email: "alice@example.com".into(),
            password_hash: "$argon2id$v=19$secret".into(),
            name: "Alice".into(),
            phone: None,
            tier: Tier::Basic,
            tier_expires_at: None,
            verified: true,
            is_admin: false,
            dashboard: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password_hash"));
        assert!(json.contains("alice@example.com"));
    }

    #[test]
    fn tier_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Tier::Premium).unwrap(), r#""premium""#);
        assert_eq!(
            serde_json::from_str::<Tier>(r#""none""#).unwrap(),
            Tier::None
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn delete_cascading_removes_user_and_codes(db: PgPool) {
        use crate::auth::codes::CodeKind;

        let user = User::create(&db, "gone@example.com", "$argon2id$stub", "Gone", None)
            .await
            .unwrap();
        codes::issue(&db, 10, "gone@example.com", CodeKind::Verification)
            .await
            .unwrap();
        let reset = codes::issue(&db, 10, "gone@example.com", CodeKind::Reset)
            .await
            .unwrap();

        let (email, purged) = User::delete_cascading(&db, user.id)
            .await
            .unwrap()
            .expect("user existed");
        assert_eq!(email, "gone@example.com");
        assert_eq!(purged, 2);
        assert!(User::find_by_id(&db, user.id).await.unwrap().is_none());
        assert!(!codes::consume(&db, "gone@example.com", CodeKind::Reset, &reset)
            .await
            .unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn delete_cascading_is_none_for_unknown_user(db: PgPool) {
        assert!(User::delete_cascading(&db, Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }
}
