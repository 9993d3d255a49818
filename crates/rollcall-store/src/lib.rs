//! SQLite persistence for the attendance service.
//!
//! A thin async façade over `tokio-rusqlite`: every query runs on the
//! connection's own thread, so callers never block the runtime.

mod attendance;
mod faces;
pub mod models;
mod schema;
pub mod sealing;
mod sessions;
mod users;

use rollcall_core::CodecError;
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;

pub use models::{AttendanceOutcome, AttendanceRecord, NewUser, Role, StoreCounts, User};
pub use sealing::{SealError, TemplateCipher};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("user already exists")]
    Conflict,
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("unreadable face template for {reg_id}: {reason}")]
    Template { reg_id: String, reason: String },
    #[error("template sealing: {0}")]
    Seal(#[from] SealError),
    #[error("template codec: {0}")]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Handle to the attendance database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
    cipher: Option<TemplateCipher>,
}

impl Store {
    /// Open (or create) the database file and apply the schema.
    pub async fn open(path: impl AsRef<Path>, cipher: Option<TemplateCipher>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).await?;
        tracing::info!(path = %path.display(), sealed = cipher.is_some(), "opened attendance database");
        Self::init(conn, cipher).await
    }

    /// Private in-memory database (tests, dry runs).
    pub async fn open_in_memory(cipher: Option<TemplateCipher>) -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, cipher).await
    }

    async fn init(conn: Connection, cipher: Option<TemplateCipher>) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(schema::SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn, cipher })
    }

    pub async fn counts(&self) -> Result<StoreCounts> {
        let counts = self
            .conn
            .call(|conn| {
                let count = |table: &str| -> rusqlite::Result<i64> {
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                };
                Ok(StoreCounts {
                    users: count("users")?,
                    templates: count("face_encodings")?,
                    attendance: count("attendance")?,
                })
            })
            .await?;
        Ok(counts)
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    #[tokio::test]
    async fn test_open_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.db");

        let store = Store::open(&path, None).await.unwrap();
        store
            .register_user(new_user("S1", Role::Student), &embedding(&[1.0, 0.0]))
            .await
            .unwrap();
        drop(store);

        let reopened = Store::open(&path, None).await.unwrap();
        let counts = reopened.counts().await.unwrap();
        assert_eq!(counts.users, 1);
        assert_eq!(counts.templates, 1);
        assert_eq!(counts.attendance, 0);
    }
}
