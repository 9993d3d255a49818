use crate::models::{format_ts, parse_role, parse_ts, NewUser, Role, User};
use crate::{faces, Result, Store, StoreError};
use chrono::Utc;
use rollcall_core::Embedding;
use rusqlite::{params, ErrorCode, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, role, name, reg_id, email, mobile, password_hash, created_at";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(1)?;
    let created_at: String = row.get(7)?;
    Ok(User {
        id: row.get(0)?,
        role: parse_role(1, &role)?,
        name: row.get(2)?,
        reg_id: row.get(3)?,
        email: row.get(4)?,
        mobile: row.get(5)?,
        password_hash: row.get(6)?,
        created_at: parse_ts(7, &created_at)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

impl Store {
    /// True if an account already uses this reg_id or email.
    pub async fn user_exists(&self, reg_id: &str, email: &str) -> Result<bool> {
        let (reg_id, email) = (reg_id.to_string(), email.to_string());
        let exists = self
            .conn
            .call(move |conn| {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE reg_id = ?1 OR email = ?2)",
                    params![reg_id, email],
                    |r| r.get(0),
                )?;
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    /// Create an account and its face template atomically.
    ///
    /// Fails with [`StoreError::Conflict`] if the reg_id or email is taken;
    /// nothing is written in that case.
    pub async fn register_user(&self, user: NewUser, template: &Embedding) -> Result<User> {
        let blob = faces::seal_template(self.cipher.as_ref(), template)?;
        let model_version = template.model_version.clone();
        let now = format_ts(&Utc::now());
        let reg_id = user.reg_id.clone();

        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let taken: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE reg_id = ?1 OR email = ?2)",
                    params![user.reg_id, user.email],
                    |r| r.get(0),
                )?;
                if taken {
                    return Ok(None);
                }

                let inserted = tx.execute(
                    "INSERT INTO users (role, name, reg_id, email, mobile, password_hash, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        user.role.as_str(),
                        user.name,
                        user.reg_id,
                        user.email,
                        user.mobile,
                        user.password_hash,
                        now
                    ],
                );
                match inserted {
                    Err(e) if is_constraint_violation(&e) => return Ok(None),
                    other => other?,
                };
                let id = tx.last_insert_rowid();

                tx.execute(
                    "INSERT INTO face_encodings (reg_id, encoding_blob, model_version, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![user.reg_id, blob, model_version, now],
                )?;
                tx.commit()?;
                Ok(Some(id))
            })
            .await?;

        let id = id.ok_or(StoreError::Conflict)?;
        tracing::info!(reg_id = %reg_id, id, "registered user");
        self.get_user(id)
            .await?
            .ok_or_else(|| StoreError::UnknownUser(format!("id {id}")))
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                        params![id],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_reg_id(&self, reg_id: &str) -> Result<Option<User>> {
        let reg_id = reg_id.to_string();
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE reg_id = ?1"),
                        params![reg_id],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    /// Look up an account by reg_id within a role (the login lookup).
    pub async fn find_user(&self, reg_id: &str, role: Role) -> Result<Option<User>> {
        Ok(self
            .get_user_by_reg_id(reg_id)
            .await?
            .filter(|u| u.role == role))
    }

    /// All accounts, optionally of one role, ordered by reg_id.
    pub async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        let role = role.map(|r| r.as_str());
        let users = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE ?1 IS NULL OR role = ?1 ORDER BY reg_id"
                ))?;
                let users = stmt
                    .query_map(params![role], user_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(users)
            })
            .await?;
        Ok(users)
    }

    /// Remove an account with its template and sessions. Returns false if absent.
    ///
    /// Attendance rows that reference the account are removed too.
    pub async fn delete_user(&self, reg_id: &str) -> Result<bool> {
        let reg_id = reg_id.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM attendance WHERE student_reg_id = ?1 OR faculty_reg_id = ?1",
                    params![reg_id],
                )?;
                let n = tx.execute("DELETE FROM users WHERE reg_id = ?1", params![reg_id])?;
                tx.commit()?;
                Ok(n > 0)
            })
            .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::*;
    use crate::{Role, Store, StoreError};

    #[tokio::test]
    async fn test_register_and_lookup() {
        let store = Store::open_in_memory(None).await.unwrap();
        let user = store
            .register_user(new_user("F1", Role::Faculty), &embedding(&[0.5, 0.5]))
            .await
            .unwrap();
        assert_eq!(user.reg_id, "F1");
        assert_eq!(user.role, Role::Faculty);

        assert!(store.find_user("F1", Role::Faculty).await.unwrap().is_some());
        assert!(store.find_user("F1", Role::Student).await.unwrap().is_none());
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().email, "f1@campus.edu");
    }

    #[tokio::test]
    async fn test_register_conflict_writes_nothing() {
        let store = Store::open_in_memory(None).await.unwrap();
        store
            .register_user(new_user("S1", Role::Student), &embedding(&[1.0]))
            .await
            .unwrap();

        // Same email, different reg_id.
        let mut dup = new_user("S2", Role::Student);
        dup.email = "s1@campus.edu".into();
        let err = store.register_user(dup, &embedding(&[1.0])).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        assert!(store.user_exists("S1", "x@y").await.unwrap());
        assert!(!store.user_exists("S2", "s2@campus.edu").await.unwrap());
        assert_eq!(store.counts().await.unwrap().templates, 1);
    }

    #[tokio::test]
    async fn test_list_users_by_role() {
        let store = Store::open_in_memory(None).await.unwrap();
        for (id, role) in [("S2", Role::Student), ("F1", Role::Faculty), ("S1", Role::Student)] {
            store.register_user(new_user(id, role), &embedding(&[1.0])).await.unwrap();
        }

        let students: Vec<String> = store
            .list_users(Some(Role::Student))
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.reg_id)
            .collect();
        assert_eq!(students, vec!["S1", "S2"]);
        assert_eq!(store.list_users(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let store = Store::open_in_memory(None).await.unwrap();
        let user = store
            .register_user(new_user("S1", Role::Student), &embedding(&[1.0]))
            .await
            .unwrap();
        store.create_session(user.id, chrono::Duration::hours(1)).await.unwrap();

        assert!(store.delete_user("S1").await.unwrap());
        assert!(!store.delete_user("S1").await.unwrap());
        let counts = store.counts().await.unwrap();
        assert_eq!((counts.users, counts.templates), (0, 0));
    }
}
