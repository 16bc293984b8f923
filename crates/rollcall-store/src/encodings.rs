//! Registered identities and their accumulated embedding sets.
//!
//! Embeddings persist as a JSON array of fixed-length float arrays per
//! identity, the same shape the extractor produces, so a vector written by
//! [`EncodingStore::register`] reads back bit-identical from
//! [`EncodingStore::all`].

use rusqlite::{params, OptionalExtension};

use rollcall_core::{Embedding, EnrolledIdentity};

use crate::{Store, StoreError};

pub struct EncodingStore<'a> {
    pub(crate) store: &'a Store,
}

impl EncodingStore<'_> {
    /// Register (or re-register) an identity.
    ///
    /// An existing identity gets `new_embeddings` appended to its stored
    /// set — order-preserving concatenation, never replacement — and its
    /// name/thumbnail updated. The read-modify-write on the embedding list
    /// runs inside one transaction on the store's single connection, so
    /// concurrent appends to the same identity cannot lose updates.
    pub fn register(
        &self,
        student_id: &str,
        name: &str,
        thumbnail: Option<&str>,
        new_embeddings: &[Embedding],
    ) -> Result<EnrolledIdentity, StoreError> {
        if new_embeddings.is_empty() {
            return Err(StoreError::EmptyRegistration);
        }
        let expected_dim = self.store.embedding_dim();
        if let Some(e) = new_embeddings.iter().find(|e| e.dim() != expected_dim) {
            return Err(rollcall_core::EmbeddingError::DimensionMismatch {
                expected: expected_dim,
                got: e.dim(),
            }
            .into());
        }

        let mut conn = self.store.lock();
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT encodings FROM identities WHERE student_id = ?1",
                params![student_id],
                |row| row.get(0),
            )
            .optional()?;

        let mut embeddings: Vec<Embedding> = match existing {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };
        embeddings.extend_from_slice(new_embeddings);
        let encodings_json = serde_json::to_string(&embeddings)?;

        tx.execute(
            "INSERT INTO identities (student_id, name, thumbnail, encodings)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(student_id) DO UPDATE SET
                 name = excluded.name,
                 thumbnail = excluded.thumbnail,
                 encodings = excluded.encodings",
            params![student_id, name, thumbnail, encodings_json],
        )?;
        tx.commit()?;

        tracing::info!(
            student_id,
            name,
            added = new_embeddings.len(),
            total = embeddings.len(),
            "identity registered"
        );

        Ok(EnrolledIdentity {
            student_id: student_id.to_string(),
            name: name.to_string(),
            thumbnail: thumbnail.map(str::to_string),
            embeddings,
        })
    }

    /// Full corpus snapshot, ordered by `student_id` ascending.
    ///
    /// The ordering is load-bearing: it is the documented tie-break order
    /// for the matcher, so two identities at exactly equal minimum distance
    /// resolve reproducibly to the lower `student_id`.
    pub fn all(&self) -> Result<Vec<EnrolledIdentity>, StoreError> {
        let conn = self.store.lock();
        let mut stmt = conn.prepare(
            "SELECT student_id, name, thumbnail, encodings
             FROM identities ORDER BY student_id ASC",
        )?;
        let rows = stmt.query_map(params![], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut corpus = Vec::new();
        for row in rows {
            let (student_id, name, thumbnail, encodings_json) = row?;
            let raw: Vec<Vec<f32>> = serde_json::from_str(&encodings_json)?;
            let embeddings = raw
                .into_iter()
                .map(|v| Embedding::checked(v, self.store.embedding_dim()))
                .collect::<Result<Vec<_>, _>>()?;
            corpus.push(EnrolledIdentity {
                student_id,
                name,
                thumbnail,
                embeddings,
            });
        }
        Ok(corpus)
    }

    pub fn get(&self, student_id: &str) -> Result<Option<EnrolledIdentity>, StoreError> {
        let conn = self.store.lock();
        let row = conn
            .query_row(
                "SELECT student_id, name, thumbnail, encodings
                 FROM identities WHERE student_id = ?1",
                params![student_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((student_id, name, thumbnail, encodings_json)) => {
                let raw: Vec<Vec<f32>> = serde_json::from_str(&encodings_json)?;
                let embeddings = raw
                    .into_iter()
                    .map(|v| Embedding::checked(v, self.store.embedding_dim()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(EnrolledIdentity {
                    student_id,
                    name,
                    thumbnail,
                    embeddings,
                }))
            }
        }
    }

    /// Remove an identity. Returns whether a row was deleted.
    pub fn remove(&self, student_id: &str) -> Result<bool, StoreError> {
        let conn = self.store.lock();
        let deleted =
            conn.execute("DELETE FROM identities WHERE student_id = ?1", params![student_id])?;
        if deleted > 0 {
            tracing::info!(student_id, "identity removed");
        }
        Ok(deleted > 0)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.store.lock();
        let n: u64 =
            conn.query_row("SELECT COUNT(*) FROM identities", params![], |row| row.get(0))?;
        Ok(n)
    }
}
