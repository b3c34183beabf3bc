use super::{ObjectType, StorageConnector};
use crate::connection::{ConnectionDescriptor, ConnectionType};
use crate::error::{RemoteFsError, Result};
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible object storage. Directories are key prefixes, so
/// `create_dir` has nothing to create.
pub struct S3Client {
    endpoint: String,
    bucket: Box<Bucket>,
}

impl S3Client {
    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let endpoint = endpoint_url(descriptor.address());
        let region = Region::Custom {
            region: descriptor.s3_region().unwrap_or(DEFAULT_REGION).to_string(),
            endpoint: endpoint.clone(),
        };
        let credentials = Credentials::new(descriptor.secret_id(), descriptor.secret_key(), None, None, None)
            .map_err(|e| RemoteFsError::invalid_config(format!("S3 credentials rejected: {e}")))?;
        let bucket_name = descriptor
            .s3_bucket()
            .ok_or_else(|| RemoteFsError::invalid_config("S3 connections require S3Bucket"))?;
        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| RemoteFsError::invalid_config(format!("S3 bucket {bucket_name:?}: {e}")))?
            .with_path_style();

        Ok(Self { endpoint, bucket })
    }

    fn server(&self) -> String {
        format!("{}/{}", self.endpoint, self.bucket.name())
    }

    fn check_status(&self, operation: &'static str, path: &str, status: u16) -> Result<()> {
        match status {
            200..=299 => Ok(()),
            404 => Err(RemoteFsError::NotFound { path: path.to_string() }),
            other => Err(RemoteFsError::connector(
                operation,
                self.server(),
                path,
                format!("unexpected HTTP status {other}"),
            )),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self.bucket.head_object(object_key(path)).await {
            Ok((_, 404)) => Ok(false),
            Ok((_, status)) => self.check_status("stat", path, status).map(|_| true),
            Err(e) => Err(RemoteFsError::connector("stat", self.server(), path, e)),
        }
    }
}

fn endpoint_url(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("https://{address}")
    }
}

fn object_key(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

fn list_prefix(path: &str) -> String {
    let key = object_key(path);
    let key = key.trim_end_matches('/');
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    }
}

#[async_trait]
impl StorageConnector for S3Client {
    async fn list(&self, path: &str, object_type: ObjectType) -> Result<Vec<String>> {
        let prefix = list_prefix(path);
        let pages = self
            .bucket
            .list(prefix.clone(), Some("/".to_string()))
            .await
            .map_err(|e| RemoteFsError::connector("list", self.server(), path, e))?;

        let mut names = Vec::new();
        for page in pages {
            if object_type.accepts(false) {
                names.extend(
                    page.contents
                        .iter()
                        .filter_map(|object| object.key.strip_prefix(&prefix))
                        .filter(|name| !name.is_empty())
                        .map(str::to_string),
                );
            }
            if object_type.accepts(true) {
                names.extend(
                    page.common_prefixes
                        .iter()
                        .flatten()
                        .filter_map(|common| common.prefix.strip_prefix(&prefix))
                        .map(|name| name.trim_end_matches('/').to_string())
                        .filter(|name| !name.is_empty()),
                );
            }
        }
        Ok(names)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let response = self
            .bucket
            .get_object(object_key(path))
            .await
            .map_err(|e| RemoteFsError::connector("read", self.server(), path, e))?;
        self.check_status("read", path, response.status_code())?;
        Ok(response.bytes().to_vec())
    }

    async fn write(&self, path: &str, data: &[u8], overwrite: bool) -> Result<()> {
        if !overwrite && self.exists(path).await? {
            return Err(RemoteFsError::AlreadyExists { path: path.to_string() });
        }
        let response = self
            .bucket
            .put_object(object_key(path), data)
            .await
            .map_err(|e| RemoteFsError::connector("write", self.server(), path, e))?;
        self.check_status("write", path, response.status_code())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        // DeleteObject succeeds for missing keys
        if !self.exists(path).await? {
            return Err(RemoteFsError::NotFound { path: path.to_string() });
        }
        let response = self
            .bucket
            .delete_object(object_key(path))
            .await
            .map_err(|e| RemoteFsError::connector("delete", self.server(), path, e))?;
        self.check_status("delete", path, response.status_code())
    }

    async fn create_dir(&self, path: &str, _recursive: bool) -> Result<()> {
        tracing::debug!(
            backend = %ConnectionType::S3,
            path,
            "directories are implicit key prefixes; nothing to create"
        );
        Ok(())
    }
}
