//! Single-file operations dispatched to the right connector with retries.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::{ConnectorFactory, ProtocolConnectors, StorageConnector};
use crate::connection::{ConnectionDescriptor, ConnectorPool, ServerParams};
use crate::error::{error_message, RemoteFsError, Result};
use crate::filter::match_names;
use crate::model::{
    CopyResult, CreateDirRequest, CreateDirResult, DeleteRequest, DeleteResult, FileContent, ListRequest, ListResult,
    MoveResult, ReadRequest, ReadResult, WriteRequest, WriteResult,
};

/// Facade over every storage backend. Owns the pool of connector handles it
/// dispatches to.
pub struct FileOps {
    pool: ConnectorPool,
}

impl FileOps {
    pub fn new(factory: Arc<dyn ConnectorFactory>) -> Self {
        Self::with_capacity(factory, ConnectorPool::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(factory: Arc<dyn ConnectorFactory>, capacity: usize) -> Self {
        Self {
            pool: ConnectorPool::new(factory, capacity),
        }
    }

    /// A facade backed by the built-in protocol connectors.
    pub fn with_protocols() -> Self {
        Self::new(Arc::new(ProtocolConnectors))
    }

    pub fn pool(&self) -> &ConnectorPool {
        &self.pool
    }

    async fn connector(&self, server: &ConnectionDescriptor) -> Result<Arc<dyn StorageConnector>> {
        self.pool.get(server).await
    }

    pub async fn list(&self, request: &ListRequest, server: &ConnectionDescriptor) -> Result<ListResult> {
        let connector = self.connector(server).await?;
        let names = with_retry(server, "list", &request.path, || {
            connector.list(&request.path, request.object_type)
        })
        .await?;

        let files = match_names(names, &request.pattern, request.filter)?;
        debug!(path = %request.path, count = files.len(), "listed files");
        Ok(ListResult::new(files))
    }

    pub async fn read(&self, request: &ReadRequest, server: &ConnectionDescriptor) -> Result<ReadResult> {
        let path = request.full_path();
        let connector = self.connector(server).await?;
        let bytes = with_retry(server, "read", &path, || connector.read(&path)).await?;

        let content = if request.encoding.is_text() {
            request.encoding.decode(&bytes)
        } else {
            String::new()
        };
        Ok(ReadResult {
            content,
            byte_content: bytes,
            path,
            encoding: request.encoding,
        })
    }

    pub async fn write(&self, request: &WriteRequest, server: &ConnectionDescriptor) -> Result<WriteResult> {
        let path = request.full_path();
        let bytes = match &request.content {
            FileContent::Bytes(bytes) => bytes.clone(),
            FileContent::Text(_) if !request.encoding.is_text() => {
                return Err(RemoteFsError::InvalidInput {
                    field: "encoding",
                    reason: format!("text content cannot be written with {} encoding", request.encoding),
                })
            }
            FileContent::Text(text) => request.encoding.encode(text)?,
        };

        let connector = self.connector(server).await?;
        with_retry(server, "write", &path, || connector.write(&path, &bytes, request.overwrite)).await?;

        debug!(path = %path, bytes = bytes.len(), "wrote file");
        Ok(WriteResult {
            success: true,
            path,
            encoding: request.encoding,
        })
    }

    pub async fn create_dir(&self, request: &CreateDirRequest, server: &ConnectionDescriptor) -> Result<CreateDirResult> {
        let connector = self.connector(server).await?;
        with_retry(server, "create_dir", &request.path, || {
            connector.create_dir(&request.path, request.recursive)
        })
        .await?;
        Ok(CreateDirResult { success: true })
    }

    /// A missing target yields `success: false`; every other failure is an
    /// error.
    pub async fn delete(&self, request: &DeleteRequest, server: &ConnectionDescriptor) -> Result<DeleteResult> {
        let path = request.full_path();
        let connector = self.connector(server).await?;

        match with_retry(server, "delete", &path, || connector.delete(&path)).await {
            Ok(()) => Ok(DeleteResult { success: true, path }),
            Err(e) if e.is_not_found() => {
                debug!(path = %path, "delete target not found");
                Ok(DeleteResult { success: false, path })
            }
            Err(e) => Err(e),
        }
    }

    /// Reads the source and writes it to the destination. `destination.content`
    /// is ignored. Text is transcoded only when both sides use different text
    /// encodings.
    pub async fn copy(
        &self,
        source: &ReadRequest,
        source_server: &ConnectionDescriptor,
        destination: &WriteRequest,
        destination_server: &ConnectionDescriptor,
    ) -> Result<CopyResult> {
        let read = self.read(source, source_server).await?;

        let transcode = source.encoding.is_text()
            && destination.encoding.is_text()
            && source.encoding != destination.encoding;
        let content = if transcode {
            FileContent::Text(read.content)
        } else {
            FileContent::Bytes(read.byte_content)
        };

        let request = WriteRequest {
            content,
            ..destination.clone()
        };
        let written = self.write(&request, destination_server).await?;
        Ok(CopyResult {
            success: written.success,
        })
    }

    /// Copy, then delete the source. A failed delete is reported in the
    /// result and never undoes the copy.
    pub async fn move_file(
        &self,
        source: &ReadRequest,
        source_server: &ConnectionDescriptor,
        destination: &WriteRequest,
        destination_server: &ConnectionDescriptor,
    ) -> Result<MoveResult> {
        let copied = self.copy(source, source_server, destination, destination_server).await?;

        let delete = DeleteRequest::new(source.path.clone(), source.file.clone());
        let (source_deleted, delete_error) = match self.delete(&delete, source_server).await {
            Ok(DeleteResult { success: true, .. }) => (true, None),
            Ok(DeleteResult { path, .. }) => (false, Some(format!("not found: {path}"))),
            Err(e) => {
                let message = error_message(&e);
                warn!(path = %delete.full_path(), error = %message, "source delete failed after copy");
                (false, Some(message))
            }
        };

        Ok(MoveResult {
            success: copied.success,
            source_deleted,
            delete_error,
        })
    }

    pub async fn list_with_params(&self, request: &ListRequest, params: &ServerParams) -> Result<ListResult> {
        self.list(request, &params.resolve()?).await
    }

    pub async fn read_with_params(&self, request: &ReadRequest, params: &ServerParams) -> Result<ReadResult> {
        self.read(request, &params.resolve()?).await
    }

    pub async fn write_with_params(&self, request: &WriteRequest, params: &ServerParams) -> Result<WriteResult> {
        self.write(request, &params.resolve()?).await
    }

    pub async fn create_dir_with_params(
        &self,
        request: &CreateDirRequest,
        params: &ServerParams,
    ) -> Result<CreateDirResult> {
        self.create_dir(request, &params.resolve()?).await
    }

    pub async fn delete_with_params(&self, request: &DeleteRequest, params: &ServerParams) -> Result<DeleteResult> {
        self.delete(request, &params.resolve()?).await
    }

    pub async fn copy_with_params(
        &self,
        source: &ReadRequest,
        source_params: &ServerParams,
        destination: &WriteRequest,
        destination_params: &ServerParams,
    ) -> Result<CopyResult> {
        let source_server = source_params.resolve()?;
        let destination_server = destination_params.resolve()?;
        self.copy(source, &source_server, destination, &destination_server).await
    }

    pub async fn move_with_params(
        &self,
        source: &ReadRequest,
        source_params: &ServerParams,
        destination: &WriteRequest,
        destination_params: &ServerParams,
    ) -> Result<MoveResult> {
        let source_server = source_params.resolve()?;
        let destination_server = destination_params.resolve()?;
        self.move_file(source, &source_server, destination, &destination_server).await
    }
}

/// Runs `op` once, then up to `server.retries()` more times while it keeps
/// failing with a transient error.
async fn with_retry<T, F, Fut>(server: &ConnectionDescriptor, operation: &'static str, path: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = server.retries().saturating_add(1);
    let delay = server.retry_delay();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_permanent() || attempt >= max_attempts => return Err(e),
            Err(e) => {
                warn!(
                    operation,
                    path,
                    server = %server.address(),
                    attempt,
                    max_attempts,
                    error = %error_message(&e),
                    "operation failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
