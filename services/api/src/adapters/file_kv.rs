//! services/api/src/adapters/file_kv.rs
//!
//! The on-disk backend of the local mirror. Each key is stored as one JSON document
//! under the configured directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use case_tutor_core::ports::{KeyValueStore, PortError, PortResult};
use tracing::debug;

/// A `KeyValueStore` that keeps one file per key.
#[derive(Clone, Debug)]
pub struct FileKv {
    root: PathBuf,
}

impl FileKv {
    /// Creates the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PortResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            && !key.starts_with('.');
        if !valid {
            return Err(PortError::Unexpected(format!("Invalid storage key '{}'", key)));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileKv {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PortError::Unavailable(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn set(&self, key: &str, value: String) -> PortResult<()> {
        let path = self.path_for(key)?;
        // Write next to the target and rename so readers never see a torn file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value.as_bytes())
            .await
            .map_err(|e| PortError::Unavailable(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| PortError::Unavailable(format!("Failed to replace {}: {}", path.display(), e)))?;
        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }
}
