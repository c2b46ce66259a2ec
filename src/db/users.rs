//! Credential store: repository for user identities.
//!
//! All user reads and writes go through [`UserStore`]; handlers never touch
//! the `users` table directly. The store owns the duplicate-identity check
//! and the guarded activation transition.

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use super::{DbPool, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("A user with that username already exists.")]
    DuplicateUsername,
    #[error("A user with that email already exists.")]
    DuplicateEmail,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub struct UserStore<'a> {
    db: &'a DbPool,
}

impl<'a> UserStore<'a> {
    pub fn new(db: &'a DbPool) -> Self {
        Self { db }
    }

    /// Create a new, inactive, non-staff user. The password must already be
    /// hashed by the caller.
    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        // Pre-check for a field-accurate error; the UNIQUE constraints are
        // the real guarantee under concurrent registration.
        let taken: Option<(String,)> =
            sqlx::query_as("SELECT username FROM users WHERE username = ? OR email = ? LIMIT 1")
                .bind(username)
                .bind(email)
                .fetch_optional(self.db)
                .await?;
        if let Some((existing,)) = taken {
            if existing == username {
                return Err(StoreError::DuplicateUsername);
            }
            return Err(StoreError::DuplicateEmail);
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, is_active, is_staff, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 0, 0, ?, ?)",
        )
        .bind(&id)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(&now)
        .bind(&now)
        .execute(self.db)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &result {
            let msg = db_err.message();
            if msg.contains("users.username") {
                return Err(StoreError::DuplicateUsername);
            }
            if msg.contains("users.email") {
                return Err(StoreError::DuplicateEmail);
            }
        }
        result?;

        self.find_by_id(&id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.db)
            .await?;
        Ok(user)
    }

    /// Login lookup: the identifier may be a username or an email address.
    pub async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE username = ? OR email = ?")
            .bind(identifier)
            .bind(identifier)
            .fetch_optional(self.db)
            .await?;
        Ok(user)
    }

    /// Activate a user after email verification. Guarded single transition:
    /// `email_verified_at` is only written while it is still NULL, so a
    /// replayed activation never moves the timestamp.
    pub async fn mark_verified(&self, user_id: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE users SET is_active = 1, \
             email_verified_at = COALESCE(email_verified_at, ?), \
             updated_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(user_id)
        .execute(self.db)
        .await?;
        Ok(())
    }

    /// Promote a user to staff and activate them. Only used by the startup
    /// admin bootstrap; the HTTP surface never grants staff.
    pub async fn grant_staff(&self, user_id: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE users SET is_staff = 1, is_active = 1, \
             email_verified_at = COALESCE(email_verified_at, ?), \
             updated_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(user_id)
        .execute(self.db)
        .await?;
        Ok(())
    }

    /// Persist a new password hash. Deliberately touches nothing else; in
    /// particular it does not revoke live sessions (known gap, kept as-is).
    pub async fn set_password(&self, user_id: &str, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_create_starts_inactive() {
        let pool = test_pool().await;
        let store = UserStore::new(&pool);
        let user = store
            .create("alice", "alice@example.com", "hash")
            .await
            .unwrap();
        assert!(!user.is_active);
        assert!(!user.is_staff);
        assert!(user.email_verified_at.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let pool = test_pool().await;
        let store = UserStore::new(&pool);
        store
            .create("alice", "alice@example.com", "hash")
            .await
            .unwrap();

        let err = store
            .create("alice", "other@example.com", "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername));

        let err = store
            .create("bob", "alice@example.com", "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_mark_verified_is_guarded() {
        let pool = test_pool().await;
        let store = UserStore::new(&pool);
        let user = store
            .create("alice", "alice@example.com", "hash")
            .await
            .unwrap();

        store.mark_verified(&user.id).await.unwrap();
        let first = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(first.is_active);
        let stamp = first.email_verified_at.clone().unwrap();

        // Second activation must not move the timestamp
        store.mark_verified(&user.id).await.unwrap();
        let second = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(second.email_verified_at.unwrap(), stamp);
    }

    #[tokio::test]
    async fn test_find_by_identifier_matches_username_and_email() {
        let pool = test_pool().await;
        let store = UserStore::new(&pool);
        store
            .create("alice", "alice@example.com", "hash")
            .await
            .unwrap();

        assert!(store.find_by_identifier("alice").await.unwrap().is_some());
        assert!(store
            .find_by_identifier("alice@example.com")
            .await
            .unwrap()
            .is_some());
        assert!(store.find_by_identifier("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_password_replaces_hash_only() {
        let pool = test_pool().await;
        let store = UserStore::new(&pool);
        let user = store
            .create("alice", "alice@example.com", "old-hash")
            .await
            .unwrap();

        store.set_password(&user.id, "new-hash").await.unwrap();
        let updated = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(updated.password_hash, "new-hash");
        assert!(!updated.is_active);
    }
}
