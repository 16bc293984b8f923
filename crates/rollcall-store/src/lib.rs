//! rollcall-store — SQLite persistence for the attendance engine.
//!
//! One [`Store`] owns the database connection, with two facades on top:
//! [`Store::encodings`] (registered identities with their accumulated
//! embeddings) and [`Store::ledger`] (append-only attendance history with
//! per-day dedup).
//!
//! The check-then-act dedup race is closed at this layer: a composite
//! UNIQUE index on (student_id, day) makes the second concurrent writer
//! fail with a constraint violation, which the ledger recovers locally as
//! [`ledger::AppendOutcome::Duplicate`].

pub mod encodings;
pub mod ledger;

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;
use thiserror::Error;

use rollcall_core::EmbeddingError;

pub use encodings::EncodingStore;
pub use ledger::{AppendOutcome, AttendanceLedger, AttendanceRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored encodings are not valid JSON: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("stored timestamp is not valid RFC 3339: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("registration must contribute at least one embedding")]
    EmptyRegistration,
    #[error(transparent)]
    Dimension(#[from] EmbeddingError),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    student_id TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    thumbnail  TEXT,
    encodings  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id TEXT NOT NULL,
    name       TEXT NOT NULL,
    timestamp  TEXT NOT NULL,
    day        TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'present'
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_student_day
    ON attendance (student_id, day);
";

/// Handle to the rollcall database.
///
/// The connection sits behind a mutex; requests from concurrent workers
/// serialize here. The (student_id, day) uniqueness index still holds
/// across processes sharing the database file.
pub struct Store {
    conn: Mutex<Connection>,
    embedding_dim: usize,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open<P: AsRef<Path>>(path: P, embedding_dim: usize) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(
            path = %path.as_ref().display(),
            embedding_dim,
            "store opened"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            embedding_dim,
        })
    }

    /// In-memory database, for tests.
    pub fn open_in_memory(embedding_dim: usize) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedding_dim,
        })
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn encodings(&self) -> EncodingStore<'_> {
        EncodingStore { store: self }
    }

    pub fn ledger(&self) -> AttendanceLedger<'_> {
        AttendanceLedger { store: self }
    }

    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}
