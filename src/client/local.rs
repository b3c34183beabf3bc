use super::{ObjectType, StorageConnector};
use crate::error::{RemoteFsError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Local disk. A non-empty address acts as the root every path is resolved
/// under.
pub struct LocalConnector {
    root: String,
}

impl LocalConnector {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        if self.root.is_empty() {
            PathBuf::from(path)
        } else {
            PathBuf::from(&self.root).join(path.trim_start_matches('/'))
        }
    }

    fn io_error(operation: &'static str, path: &str, err: std::io::Error) -> RemoteFsError {
        if err.kind() == ErrorKind::NotFound {
            RemoteFsError::NotFound {
                path: path.to_string(),
            }
        } else {
            RemoteFsError::io(operation, path, err)
        }
    }
}

#[async_trait]
impl StorageConnector for LocalConnector {
    async fn list(&self, path: &str, object_type: ObjectType) -> Result<Vec<String>> {
        let mut reader = tokio::fs::read_dir(self.resolve(path))
            .await
            .map_err(|e| Self::io_error("list", path, e))?;

        let mut names = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| Self::io_error("list", path, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Self::io_error("list", path, e))?;
            if object_type.accepts(file_type.is_dir()) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.resolve(path))
            .await
            .map_err(|e| Self::io_error("read", path, e))
    }

    async fn write(&self, path: &str, data: &[u8], overwrite: bool) -> Result<()> {
        let target = self.resolve(path);
        if !overwrite && tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(RemoteFsError::AlreadyExists {
                path: path.to_string(),
            });
        }
        tokio::fs::write(&target, data)
            .await
            .map_err(|e| RemoteFsError::io("write", path, e))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        let metadata = tokio::fs::metadata(&target)
            .await
            .map_err(|e| Self::io_error("delete", path, e))?;
        if metadata.is_dir() {
            return Err(RemoteFsError::InvalidInput {
                field: "path",
                reason: format!("{path} is a directory"),
            });
        }
        tokio::fs::remove_file(&target)
            .await
            .map_err(|e| Self::io_error("delete", path, e))
    }

    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()> {
        let target = self.resolve(path);
        if let Ok(metadata) = tokio::fs::metadata(&target).await {
            if metadata.is_dir() {
                return Ok(());
            }
            return Err(RemoteFsError::AlreadyExists {
                path: path.to_string(),
            });
        }

        let created = if recursive {
            tokio::fs::create_dir_all(&target).await
        } else {
            tokio::fs::create_dir(&target).await
        };
        created.map_err(|e| Self::io_error("create_dir", path, e))
    }
}
