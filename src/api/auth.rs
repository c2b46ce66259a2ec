//! Registration, email verification, login and the password reset flow.
//!
//! Failure messages here are part of the security contract: the verify-email
//! and forgot-password endpoints answer identically whether or not the email
//! exists, so the API cannot be used to probe for accounts.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::db::{
    DbPool, DetailResponse, EmailRequest, LoginRequest, LoginResponse,
    PasswordResetConfirmRequest, RegisterRequest, TokenStore, User, UserStore,
    VerifyEmailRequest,
};
use crate::AppState;

use super::error::ApiError;
use super::validation::{validate_email, validate_password, validate_username};

const INVALID_VERIFICATION_LINK: &str = "Invalid or expired verification link.";
const INVALID_RESET_TOKEN: &str = "Invalid or expired token.";
const RESET_REQUESTED: &str =
    "If a user with that email exists, a password reset link has been sent.";
const VERIFICATION_RESENT: &str =
    "If an unverified account with that email exists, a verification link has been sent.";

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get("Authorization").and_then(|h| h.to_str().ok())?;
    auth_header
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}

/// The authenticated caller: resolved from the bearer session key before the
/// handler runs. Carries the presented key so logout can revoke it.
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(&parts.headers).ok_or_else(|| {
            ApiError::unauthorized("Authentication credentials were not provided.")
        })?;
        let user = TokenStore::new(&state.db, &state.config.auth)
            .session_user(&token)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::unauthorized("Invalid session token."))?;
        Ok(CurrentUser { user, token })
    }
}

/// Authenticated caller with the staff flag set; rejects with 403 otherwise.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let current = CurrentUser::from_request_parts(parts, state).await?;
        if !current.user.is_staff {
            return Err(ApiError::forbidden(
                "You do not have permission to perform this action.",
            ));
        }
        Ok(AdminUser(current.user))
    }
}

/// Issue a verification token for the user and dispatch the email. The send
/// itself is fire-and-forget: a delivery failure is logged, never surfaced.
async fn dispatch_verification_email(state: &AppState, user: &User) -> Result<(), ApiError> {
    let token = TokenStore::new(&state.db, &state.config.auth)
        .issue_verification(&user.id)
        .await?;
    let link = state.mailer.verification_link(&token, &user.email);
    if let Err(e) = state
        .mailer
        .send_verification_email(&user.email, &user.username, &link)
        .await
    {
        tracing::warn!(error = %e, email = %user.email, "Failed to send verification email");
    }
    Ok(())
}

/// Register a new account. The user starts inactive and must verify their
/// email address before they can log in.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<DetailResponse>), ApiError> {
    validate_username(&req.username).map_err(ApiError::validation)?;
    validate_email(&req.email).map_err(ApiError::validation)?;
    validate_password(&req.password).map_err(ApiError::validation)?;

    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let user = UserStore::new(&state.db)
        .create(&req.username, &req.email, &password_hash)
        .await?;

    tracing::info!(username = %user.username, "Registered new user");
    dispatch_verification_email(&state, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(DetailResponse::new(
            "User registered successfully. Please check your email to verify your account.",
        )),
    ))
}

/// Re-issue the verification email. Answers generically whether or not the
/// email belongs to an account, and does nothing for already-active users.
pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<DetailResponse>, ApiError> {
    if let Some(user) = UserStore::new(&state.db).find_by_email(&req.email).await? {
        if !user.is_active {
            dispatch_verification_email(&state, &user).await?;
        }
    }
    Ok(Json(DetailResponse::new(VERIFICATION_RESENT)))
}

/// Confirm control of the registered email address. All failure modes
/// (unknown email, wrong token, expired token) share one generic message.
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<DetailResponse>, ApiError> {
    let (Some(email), Some(value)) = (req.email, req.token) else {
        return Err(ApiError::bad_request("Token and email are required."));
    };

    let users = UserStore::new(&state.db);
    let tokens = TokenStore::new(&state.db, &state.config.auth);

    let user = users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::bad_request(INVALID_VERIFICATION_LINK))?;
    let token = tokens
        .validate_verification(&user.id, &value)
        .await?
        .ok_or_else(|| ApiError::bad_request(INVALID_VERIFICATION_LINK))?;

    users.mark_verified(&user.id).await?;
    tokens.consume_verification(&token.id).await?;

    tracing::info!(username = %user.username, "Email verified");
    Ok(Json(DetailResponse::new(
        "Email verified successfully. You can now log in.",
    )))
}

/// Log in with a username or email plus password. Issues (or re-hands-out)
/// the caller's opaque session key.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let identifier = req
        .username
        .as_deref()
        .or(req.email.as_deref())
        .ok_or_else(|| ApiError::validation("Must include either username or email."))?;

    let user = UserStore::new(&state.db)
        .find_by_identifier(identifier)
        .await?;
    let user = match user {
        Some(u) if verify_password(&req.password, &u.password_hash) => u,
        _ => return Err(ApiError::bad_request("Invalid credentials.")),
    };

    if !user.is_active {
        return Err(ApiError::bad_request(
            "Please verify your email address before logging in.",
        ));
    }

    let token = TokenStore::new(&state.db, &state.config.auth)
        .issue_session(&user.id)
        .await?;

    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

/// Revoke the caller's session. Best-effort: succeeds even if the key was
/// already gone.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<DetailResponse>, ApiError> {
    TokenStore::new(&state.db, &state.config.auth)
        .revoke_session(&current.token)
        .await?;
    Ok(Json(DetailResponse::new("Successfully logged out.")))
}

/// Request a password reset link. The response is identical whether or not
/// the email belongs to an account.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<DetailResponse>, ApiError> {
    if let Some(user) = UserStore::new(&state.db).find_by_email(&req.email).await? {
        let token = TokenStore::new(&state.db, &state.config.auth)
            .issue_reset(&user.id)
            .await?;
        let link = state.mailer.reset_link(&token, &user.email);
        if let Err(e) = state
            .mailer
            .send_password_reset_email(&user.email, &user.username, &link)
            .await
        {
            tracing::warn!(error = %e, email = %user.email, "Failed to send password reset email");
        }
    }
    Ok(Json(DetailResponse::new(RESET_REQUESTED)))
}

/// Complete a password reset. The mismatch check runs before any lookup, so
/// nothing is mutated unless both fields agree and the token is live.
/// Existing sessions are intentionally left untouched.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetConfirmRequest>,
) -> Result<Json<DetailResponse>, ApiError> {
    if req.password != req.password_confirm {
        return Err(ApiError::validation("Passwords do not match."));
    }
    validate_password(&req.password).map_err(ApiError::validation)?;

    let users = UserStore::new(&state.db);
    let tokens = TokenStore::new(&state.db, &state.config.auth);

    let user = users
        .find_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::bad_request(INVALID_RESET_TOKEN))?;
    let token = tokens
        .validate_reset(&user.id, &req.token)
        .await?
        .ok_or_else(|| ApiError::bad_request(INVALID_RESET_TOKEN))?;

    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    users.set_password(&user.id, &password_hash).await?;
    tokens.consume_reset(&token.id).await?;

    tracing::info!(username = %user.username, "Password reset completed");
    Ok(Json(DetailResponse::new(
        "Password has been reset successfully.",
    )))
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub message: String,
}

/// Capability probe for the staff-gated surface
pub async fn admin_only(AdminUser(_user): AdminUser) -> Json<ProbeResponse> {
    Json(ProbeResponse {
        message: "Welcome, Admin! You have access to this restricted area.".to_string(),
    })
}

/// Capability probe for the session-gated surface
pub async fn authenticated_only(current: CurrentUser) -> Json<ProbeResponse> {
    Json(ProbeResponse {
        message: format!(
            "Hello, {}! You are authenticated and your email verification status is: {}",
            current.user.username,
            current.user.email_verified_at.is_some()
        ),
    })
}

/// Create the bootstrap staff account from config if it does not exist yet.
/// Stands in for an out-of-band superuser command.
pub async fn ensure_admin_user(db: &DbPool, auth: &AuthConfig) -> anyhow::Result<()> {
    let (Some(username), Some(email), Some(password)) = (
        auth.admin_username.as_deref(),
        auth.admin_email.as_deref(),
        auth.admin_password.as_deref(),
    ) else {
        return Ok(());
    };

    let users = UserStore::new(db);
    if users.find_by_email(email).await?.is_some() {
        return Ok(());
    }

    let password_hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;
    let user = users.create(username, email, &password_hash).await?;
    users.grant_staff(&user.id).await?;

    tracing::info!("Created admin user {}", email);
    Ok(())
}
