//! Token rows and the request/response types of the token-driven flows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored single-use token (verification or reset namespace). Only the
/// SHA-256 hash of the value is persisted.
#[derive(Debug, Clone, FromRow)]
pub struct SingleUseToken {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub created_at: String,
}

/// Opaque bearer credential. The key itself is stored so that repeat logins
/// can hand the same session back.
#[derive(Debug, Clone, FromRow)]
pub struct SessionToken {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: Option<String>,
    pub token: Option<String>,
}

/// Body shape shared by the forgot-password and resend-verification
/// endpoints: just an email address.
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub email: String,
    pub token: String,
    pub password: String,
    pub password_confirm: String,
}

/// Standard `{"detail": "..."}` envelope for message-only responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct DetailResponse {
    pub detail: String,
}

impl DetailResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}
