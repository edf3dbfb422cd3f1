use crate::records::encode_record;
use analyzer_core::{CoreError, StorageError, StoredRecord};
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// Persists encoded records under object keys.
pub trait RecordWriter {
    async fn write_record(&self, record: &StoredRecord, key: &str) -> Result<(), CoreError>;
}

/// Writes records as Parquet files below a local root directory, using the
/// object key as the relative path.
#[derive(Debug, Clone)]
pub struct LocalParquetWriter {
    root: PathBuf,
}

impl LocalParquetWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves `key` below the root. Keys must be relative and may not
    /// climb out of the root.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, CoreError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !valid {
            return Err(CoreError::Storage(StorageError::InvalidKey {
                key: key.to_string(),
            }));
        }
        Ok(self.root.join(relative))
    }
}

impl RecordWriter for LocalParquetWriter {
    async fn write_record(&self, record: &StoredRecord, key: &str) -> Result<(), CoreError> {
        let path = self.path_for(key)?;
        let bytes = encode_record(record)?;

        let write_failed = |e: std::io::Error| {
            CoreError::Storage(StorageError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
        tokio::fs::write(&path, &bytes).await.map_err(write_failed)?;

        info!(
            "Stored record for post {} at {} ({} bytes)",
            record.post_id,
            path.display(),
            bytes.len()
        );
        Ok(())
    }
}
