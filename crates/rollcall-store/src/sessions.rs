use crate::models::{format_ts, User};
use crate::users::user_from_row;
use crate::{Result, Store};
use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};

/// Session lifetimes are capped here so expiry stays a four-digit year.
const MAX_SESSION_TTL_DAYS: i64 = 100 * 365;

impl Store {
    /// Open a login session and return its opaque token.
    pub async fn create_session(&self, user_id: i64, ttl: Duration) -> Result<String> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let ttl = ttl.min(Duration::days(MAX_SESSION_TTL_DAYS));
        let expires_at = format_ts(&(Utc::now() + ttl));
        let stored = token.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
                    params![stored, user_id, expires_at],
                )?;
                Ok(())
            })
            .await?;
        tracing::debug!(user_id, "session created");
        Ok(token)
    }

    /// The user behind a live session token. Expired sessions are removed.
    pub async fn resolve_session(&self, token: &str) -> Result<Option<User>> {
        let token = token.to_string();
        let now = format_ts(&Utc::now());

        let user = self
            .conn
            .call(move |conn| {
                let expired = conn.execute(
                    "DELETE FROM sessions WHERE token = ?1 AND expires_at <= ?2",
                    params![token, now],
                )?;
                if expired > 0 {
                    return Ok(None);
                }
                let user = conn
                    .query_row(
                        "SELECT u.id, u.role, u.name, u.reg_id, u.email, u.mobile, u.password_hash, u.created_at
                         FROM sessions s JOIN users u ON u.id = s.user_id
                         WHERE s.token = ?1",
                        params![token],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    /// End a session. Returns false if the token was unknown.
    pub async fn delete_session(&self, token: &str) -> Result<bool> {
        let token = token.to_string();
        let deleted = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])? > 0))
            .await?;
        Ok(deleted)
    }

    /// Drop every expired session; returns how many were removed.
    pub async fn purge_expired_sessions(&self) -> Result<usize> {
        let now = format_ts(&Utc::now());
        let purged = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?))
            .await?;
        if purged > 0 {
            tracing::debug!(purged, "purged expired sessions");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::*;
    use crate::{Role, Store};
    use chrono::Duration;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = Store::open_in_memory(None).await.unwrap();
        let user = store
            .register_user(new_user("S1", Role::Student), &embedding(&[1.0]))
            .await
            .unwrap();

        let token = store.create_session(user.id, Duration::hours(1)).await.unwrap();
        assert_eq!(token.len(), 32);
        let resolved = store.resolve_session(&token).await.unwrap().unwrap();
        assert_eq!(resolved.reg_id, "S1");

        assert!(store.delete_session(&token).await.unwrap());
        assert!(store.resolve_session(&token).await.unwrap().is_none());
        assert!(!store.delete_session(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_session_resolves_to_none() {
        let store = Store::open_in_memory(None).await.unwrap();
        let user = store
            .register_user(new_user("S1", Role::Student), &embedding(&[1.0]))
            .await
            .unwrap();

        let stale = store.create_session(user.id, Duration::seconds(-5)).await.unwrap();
        let live = store.create_session(user.id, Duration::hours(1)).await.unwrap();
        let _also_stale = store.create_session(user.id, Duration::seconds(-1)).await.unwrap();

        assert!(store.resolve_session(&stale).await.unwrap().is_none());
        assert_eq!(store.purge_expired_sessions().await.unwrap(), 1);
        assert!(store.resolve_session(&live).await.unwrap().is_some());
        assert!(store.resolve_session("not-a-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_huge_ttl_is_capped() {
        let store = Store::open_in_memory(None).await.unwrap();
        let user = store
            .register_user(new_user("S1", Role::Student), &embedding(&[1.0]))
            .await
            .unwrap();

        let token = store.create_session(user.id, Duration::MAX).await.unwrap();
        assert!(store.resolve_session(&token).await.unwrap().is_some());
        assert_eq!(store.purge_expired_sessions().await.unwrap(), 0);
    }
}
