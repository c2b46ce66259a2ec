//! Token issuer: single-use tokens and opaque session keys.
//!
//! Verification and reset tokens live in separate tables (namespaces) with
//! the same shape: at most one live token per user, hashed at rest, checked
//! lazily against a TTL when presented. Session keys are get-or-create and
//! live until logout.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::{DbPool, SessionToken, SingleUseToken, User};
use crate::config::AuthConfig;

const VERIFICATION_TABLE: &str = "email_verification_tokens";
const RESET_TABLE: &str = "password_reset_tokens";

/// Generate a random opaque token value (256 bits, hex-encoded)
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct TokenStore<'a> {
    db: &'a DbPool,
    verification_ttl: Duration,
    reset_ttl: Duration,
}

impl<'a> TokenStore<'a> {
    pub fn new(db: &'a DbPool, auth: &AuthConfig) -> Self {
        Self {
            db,
            verification_ttl: Duration::hours(auth.verification_ttl_hours),
            reset_ttl: Duration::hours(auth.reset_ttl_hours),
        }
    }

    /// Issue a fresh verification token, replacing any prior one. Returns the
    /// plaintext value; only its hash is stored.
    pub async fn issue_verification(&self, user_id: &str) -> Result<String, sqlx::Error> {
        self.replace_and_issue(VERIFICATION_TABLE, user_id).await
    }

    /// Issue a fresh password reset token, replacing any prior one.
    pub async fn issue_reset(&self, user_id: &str) -> Result<String, sqlx::Error> {
        self.replace_and_issue(RESET_TABLE, user_id).await
    }

    async fn replace_and_issue(&self, table: &str, user_id: &str) -> Result<String, sqlx::Error> {
        let value = generate_token();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        // Delete-then-insert in one transaction; UNIQUE(user_id) backstops
        // the one-live-token invariant under concurrent issuance.
        let mut tx = self.db.begin().await?;
        sqlx::query(&format!("DELETE FROM {table} WHERE user_id = ?"))
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "INSERT INTO {table} (id, user_id, token_hash, created_at) VALUES (?, ?, ?, ?)"
        ))
        .bind(&id)
        .bind(user_id)
        .bind(hash_token(&value))
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(value)
    }

    /// Validate a presented verification token. Returns the stored row on
    /// success; `None` uniformly covers missing, wrong and expired tokens.
    pub async fn validate_verification(
        &self,
        user_id: &str,
        value: &str,
    ) -> Result<Option<SingleUseToken>, sqlx::Error> {
        self.validate(VERIFICATION_TABLE, self.verification_ttl, user_id, value)
            .await
    }

    pub async fn validate_reset(
        &self,
        user_id: &str,
        value: &str,
    ) -> Result<Option<SingleUseToken>, sqlx::Error> {
        self.validate(RESET_TABLE, self.reset_ttl, user_id, value).await
    }

    async fn validate(
        &self,
        table: &str,
        ttl: Duration,
        user_id: &str,
        value: &str,
    ) -> Result<Option<SingleUseToken>, sqlx::Error> {
        let row: Option<SingleUseToken> =
            sqlx::query_as(&format!("SELECT * FROM {table} WHERE user_id = ?"))
                .bind(user_id)
                .fetch_optional(self.db)
                .await?;

        let Some(token) = row else {
            return Ok(None);
        };

        // Constant-time comparison of the presented hash against the stored one
        let presented = hash_token(value);
        let stored = token.token_hash.as_bytes();
        if presented.len() != stored.len() || !bool::from(presented.as_bytes().ct_eq(stored)) {
            return Ok(None);
        }

        let Ok(created_at) = DateTime::parse_from_rfc3339(&token.created_at) else {
            return Ok(None);
        };
        if Utc::now() - created_at.with_timezone(&Utc) > ttl {
            return Ok(None);
        }

        Ok(Some(token))
    }

    /// Delete a spent verification token. Called exactly once per successful
    /// verification; a consumed token never validates again.
    pub async fn consume_verification(&self, token_id: &str) -> Result<(), sqlx::Error> {
        self.consume(VERIFICATION_TABLE, token_id).await
    }

    pub async fn consume_reset(&self, token_id: &str) -> Result<(), sqlx::Error> {
        self.consume(RESET_TABLE, token_id).await
    }

    async fn consume(&self, table: &str, token_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
            .bind(token_id)
            .execute(self.db)
            .await?;
        Ok(())
    }

    /// Get-or-create the session key for a user. `ON CONFLICT DO NOTHING`
    /// plus re-select keeps concurrent logins on a single key. A logout can
    /// land between the conflicting insert and the re-select, so the loop
    /// retries the insert instead of treating the missing row as an error.
    pub async fn issue_session(&self, user_id: &str) -> Result<String, sqlx::Error> {
        for _ in 0..3 {
            let id = Uuid::new_v4().to_string();
            let key = generate_token();
            let result = sqlx::query(
                "INSERT INTO session_tokens (id, user_id, token, created_at) VALUES (?, ?, ?, ?) \
                 ON CONFLICT(user_id) DO NOTHING",
            )
            .bind(&id)
            .bind(user_id)
            .bind(&key)
            .bind(Utc::now().to_rfc3339())
            .execute(self.db)
            .await?;

            // Our insert won: the key we generated is the live session
            if result.rows_affected() == 1 {
                return Ok(key);
            }

            // Lost the race to an earlier login: hand back the existing key.
            // If a concurrent logout already removed it, go around again.
            let session: Option<SessionToken> =
                sqlx::query_as("SELECT * FROM session_tokens WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(self.db)
                    .await?;
            if let Some(session) = session {
                return Ok(session.token);
            }
        }
        Err(sqlx::Error::RowNotFound)
    }

    /// Delete a session by its key. Logout is best-effort: a missing row is
    /// not an error.
    pub async fn revoke_session(&self, key: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM session_tokens WHERE token = ?")
            .bind(key)
            .execute(self.db)
            .await?;
        Ok(())
    }

    /// Resolve a bearer key to its owning user.
    pub async fn session_user(&self, key: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(
            "SELECT u.* FROM users u \
             JOIN session_tokens s ON s.user_id = u.id \
             WHERE s.token = ?",
        )
        .bind(key)
        .fetch_optional(self.db)
        .await
    }
}
