use std::path::PathBuf;

use rollcall_core::{DEFAULT_EMBEDDING_DIM, DEFAULT_TOLERANCE};

/// Service configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory for thumbnail images written at registration.
    pub data_dir: PathBuf,
    /// Maximum accepted Euclidean distance for a match.
    pub tolerance: f32,
    /// Embedding dimensionality of the extraction model.
    pub embedding_dim: usize,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("rollcall")
            });

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("rollcall.db"));

        Self {
            db_path,
            data_dir,
            tolerance: env_f32("ROLLCALL_TOLERANCE", DEFAULT_TOLERANCE),
            embedding_dim: env_usize("ROLLCALL_EMBEDDING_DIM", DEFAULT_EMBEDDING_DIM),
        }
    }

    /// Directory thumbnail images are written to.
    pub fn thumbnail_dir(&self) -> PathBuf {
        self.data_dir.join("thumbnails")
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
