//! Passwords, session cookies and the logged-in user extractor.

use crate::error::AppError;
use crate::state::SharedState;
use axum::extract::FromRequestParts;
use axum::http::{header::COOKIE, request::Parts, HeaderMap};
use rollcall_store::{Role, User};

pub const SESSION_COOKIE: &str = "rollcall_session";

/// bcrypt is deliberately slow; hash off the async runtime.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??)
}

/// A stored hash that bcrypt cannot parse never verifies.
pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    let verdict = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await?;
    Ok(verdict.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "unreadable password hash");
        false
    }))
}

/// The session token carried in the request's cookies, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Max-Age={max_age_secs}; Path=/; HttpOnly; SameSite=Lax{}",
        if secure { "; Secure" } else { "" }
    )
}

pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// The account behind the request's session cookie. Rejects with 401.
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn require(&self, role: Role) -> Result<&User, AppError> {
        if self.0.role == role {
            Ok(&self.0)
        } else {
            Err(AppError::Forbidden(match role {
                Role::Faculty => "Faculty access only".to_string(),
                Role::Student => "Student access only".to_string(),
            }))
        }
    }
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let not_logged_in = || AppError::Unauthorized("Please log in".to_string());
        let token = session_token(&parts.headers).ok_or_else(not_logged_in)?;
        state
            .store
            .resolve_session(&token)
            .await?
            .map(CurrentUser)
            .ok_or_else(not_logged_in)
    }
}
