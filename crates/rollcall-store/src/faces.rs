use crate::models::format_ts;
use crate::sealing::{self, TemplateCipher};
use crate::{Result, Store, StoreError};
use chrono::Utc;
use rollcall_core::codec::{decode_template, encode_template};
use rollcall_core::{Embedding, FaceTemplate};
use rusqlite::{params, OptionalExtension};

pub(crate) fn seal_template(cipher: Option<&TemplateCipher>, embedding: &Embedding) -> Result<Vec<u8>> {
    let plain = encode_template(embedding)?;
    Ok(sealing::pack(cipher, &plain)?)
}

fn open_template(
    cipher: Option<&TemplateCipher>,
    reg_id: &str,
    blob: &[u8],
    model_version: Option<String>,
) -> Result<Embedding> {
    let template_error = |reason: String| StoreError::Template {
        reg_id: reg_id.to_string(),
        reason,
    };
    let plain = sealing::unpack(cipher, blob).map_err(|e| template_error(e.to_string()))?;
    decode_template(&plain, model_version).map_err(|e| template_error(e.to_string()))
}

impl Store {
    /// Store (or replace) the face template of an existing account.
    pub async fn put_face_encoding(&self, reg_id: &str, embedding: &Embedding) -> Result<()> {
        let blob = seal_template(self.cipher.as_ref(), embedding)?;
        let model_version = embedding.model_version.clone();
        let now = format_ts(&Utc::now());
        let owned_reg_id = reg_id.to_string();

        let updated = self
            .conn
            .call(move |conn| {
                let known: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE reg_id = ?1)",
                    params![owned_reg_id],
                    |r| r.get(0),
                )?;
                if !known {
                    return Ok(false);
                }
                conn.execute(
                    "INSERT INTO face_encodings (reg_id, encoding_blob, model_version, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(reg_id) DO UPDATE SET
                         encoding_blob = excluded.encoding_blob,
                         model_version = excluded.model_version,
                         updated_at = excluded.updated_at",
                    params![owned_reg_id, blob, model_version, now],
                )?;
                Ok(true)
            })
            .await?;

        if !updated {
            return Err(StoreError::UnknownUser(reg_id.to_string()));
        }
        tracing::info!(reg_id, "face template stored");
        Ok(())
    }

    /// The stored template of one account, if any.
    pub async fn get_face_encoding(&self, reg_id: &str) -> Result<Option<Embedding>> {
        let owned_reg_id = reg_id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT encoding_blob, model_version FROM face_encodings WHERE reg_id = ?1",
                        params![owned_reg_id],
                        |r| Ok((r.get::<_, Vec<u8>>(0)?, r.get::<_, Option<String>>(1)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        row.map(|(blob, version)| open_template(self.cipher.as_ref(), reg_id, &blob, version))
            .transpose()
    }

    /// Every readable template joined with its owner (the identification gallery).
    ///
    /// Unreadable templates are logged and skipped.
    pub async fn load_templates(&self) -> Result<Vec<FaceTemplate>> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT f.reg_id, f.encoding_blob, f.model_version, u.name, u.role
                     FROM face_encodings f JOIN users u ON u.reg_id = f.reg_id
                     ORDER BY f.reg_id",
                )?;
                let rows = stmt
                    .query_map([], |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, Vec<u8>>(1)?,
                            r.get::<_, Option<String>>(2)?,
                            r.get::<_, String>(3)?,
                            r.get::<_, String>(4)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut templates = Vec::with_capacity(rows.len());
        for (reg_id, blob, version, name, role) in rows {
            match open_template(self.cipher.as_ref(), &reg_id, &blob, version) {
                Ok(embedding) => templates.push(FaceTemplate {
                    reg_id,
                    name,
                    role,
                    embedding,
                }),
                Err(e) => tracing::warn!(reg_id = %reg_id, error = %e, "skipping face template"),
            }
        }
        tracing::info!(count = templates.len(), "loaded face templates");
        Ok(templates)
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::*;
    use crate::{Role, Store, StoreError, TemplateCipher};

    #[tokio::test]
    async fn test_template_survives_storage() {
        let store = Store::open_in_memory(None).await.unwrap();
        store
            .register_user(new_user("S1", Role::Student), &embedding(&[0.6, 0.8]))
            .await
            .unwrap();

        let stored = store.get_face_encoding("S1").await.unwrap().unwrap();
        assert_eq!(stored.values, vec![0.6, 0.8]);
        assert_eq!(stored.model_version.as_deref(), Some("test"));
        assert!(store.get_face_encoding("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_template() {
        let store = Store::open_in_memory(None).await.unwrap();
        store
            .register_user(new_user("S1", Role::Student), &embedding(&[1.0, 0.0]))
            .await
            .unwrap();
        store.put_face_encoding("S1", &embedding(&[0.0, 1.0])).await.unwrap();

        let stored = store.get_face_encoding("S1").await.unwrap().unwrap();
        assert_eq!(stored.values, vec![0.0, 1.0]);
        assert_eq!(store.counts().await.unwrap().templates, 1);
    }

    #[tokio::test]
    async fn test_put_requires_account() {
        let store = Store::open_in_memory(None).await.unwrap();
        let err = store.put_face_encoding("ghost", &embedding(&[1.0])).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownUser(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_sealed_templates_need_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sealed.db");

        let sealed = Store::open(&path, Some(TemplateCipher::from_secret("k1"))).await.unwrap();
        sealed
            .register_user(new_user("S1", Role::Student), &embedding(&[0.6, 0.8]))
            .await
            .unwrap();
        assert_eq!(sealed.load_templates().await.unwrap().len(), 1);
        drop(sealed);

        let keyless = Store::open(&path, None).await.unwrap();
        assert!(matches!(
            keyless.get_face_encoding("S1").await,
            Err(StoreError::Template { .. })
        ));
        // The gallery skips what it cannot read.
        assert!(keyless.load_templates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gallery_carries_owner_fields() {
        let store = Store::open_in_memory(None).await.unwrap();
        store
            .register_user(new_user("F9", Role::Faculty), &embedding(&[1.0]))
            .await
            .unwrap();

        let gallery = store.load_templates().await.unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].reg_id, "F9");
        assert_eq!(gallery[0].name, "User F9");
        assert_eq!(gallery[0].role, "faculty");
    }
}
