//! Batch transfers: per-item counter bookkeeping, backup routing, templated
//! destination names and a per-file result ledger.
//!
//! Per-file failures are recorded in the ledger and never stop the run.
//! Failures of the counter or backup infrastructure, of connection
//! resolution and of the source listing abort the whole run with
//! [`RemoteFsError::BatchFatal`].

use std::time::Duration;

use chrono::Local;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::connection::{ConnectionDescriptor, ServerParams};
use crate::error::{error_message, RemoteFsError, Result};
use crate::filter::FilterKind;
use crate::model::{
    BatchConfig, BatchItem, BatchResult, BatchResults, CreateDirRequest, DeleteRequest, FileContent, ListRequest,
    ReadRequest, ReadResult, WriteRequest,
};
use crate::ops::FileOps;
use crate::template::substitute;
use crate::utils::join_path;

pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

/// Where the counter file of the current item lives.
struct CounterStore {
    server: ConnectionDescriptor,
    path: String,
    file: String,
}

/// Resolved backup destinations for one item.
struct Backups {
    server: Option<(ConnectionDescriptor, String)>,
    subfolder: Option<String>,
}

/// Connections and state shared by every file of one item.
struct ItemContext<'a> {
    item: &'a BatchItem,
    source: ConnectionDescriptor,
    destination: ConnectionDescriptor,
    backups: Backups,
    backup_template: &'a str,
    incremental: u64,
}

pub struct BatchEngine {
    ops: FileOps,
    pacing: Duration,
    default_retries: u32,
    default_retry_delay_ms: u64,
}

impl BatchEngine {
    pub fn new(ops: FileOps) -> Self {
        Self {
            ops,
            pacing: DEFAULT_PACING,
            default_retries: 0,
            default_retry_delay_ms: 0,
        }
    }

    pub fn with_protocols() -> Self {
        Self::new(FileOps::with_protocols())
    }

    /// Delay applied before every item but the first.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Retry settings for server descriptors that carry none.
    pub fn with_retry_defaults(mut self, retries: u32, retry_delay_ms: u64) -> Self {
        self.default_retries = retries;
        self.default_retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn ops(&self) -> &FileOps {
        &self.ops
    }

    /// Processes `items` in order and returns one result per listed source
    /// file.
    pub async fn run(&self, config: &BatchConfig, items: &[BatchItem]) -> Result<BatchResults> {
        if !config.enabled {
            info!(items = items.len(), "batching disabled, nothing to do");
            return Ok(BatchResults::default());
        }

        let mut results = Vec::new();
        for (index, item) in items.iter().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let span = info_span!("batch_item", object_guid = %item.object_guid);
            let item_results = self.process_item(config, item).instrument(span).await?;
            results.extend(item_results);
        }

        info!(items = items.len(), results = results.len(), "batch finished");
        Ok(BatchResults::new(results))
    }

    fn resolve(&self, params: &ServerParams) -> Result<ConnectionDescriptor> {
        params.resolve_with_defaults(self.default_retries, self.default_retry_delay_ms)
    }

    async fn process_item(&self, config: &BatchConfig, item: &BatchItem) -> Result<Vec<BatchResult>> {
        let guid = item.object_guid.as_str();

        let counter = self.prepare_counter(config, guid).await?;
        let mut incremental = match &counter {
            Some(store) => self.read_counter(store, guid).await?,
            None => 0,
        };
        debug!(incremental, "counter loaded");

        let source = self
            .resolve(&item.source_server_params())
            .map_err(|e| RemoteFsError::fatal(guid, "source_resolve", e))?;
        let destination = self
            .resolve(&item.destination_server_params())
            .map_err(|e| RemoteFsError::fatal(guid, "destination_resolve", e))?;

        let backups = self.prepare_backups(config, item, &source).await?;

        let listing = ListRequest::new(item.source_path.clone())
            .filtered(item.source_filter_type, item.source_filter_pattern.clone());
        let files = self
            .ops
            .list(&listing, &source)
            .await
            .map_err(|e| RemoteFsError::fatal(guid, "source_enumerate", e))?
            .files;
        info!(files = files.len(), path = %item.source_path, "source listed");

        let context = ItemContext {
            item,
            source,
            destination,
            backups,
            backup_template: &config.backup_filename,
            incremental,
        };

        let mut results = Vec::with_capacity(files.len());
        for file in &files {
            results.push(self.transfer_file(&context, file).await);
        }

        incremental += 1;
        if let Some(store) = &counter {
            self.write_counter(store, guid, incremental).await?;
        }

        Ok(results)
    }

    async fn prepare_counter(&self, config: &BatchConfig, guid: &str) -> Result<Option<CounterStore>> {
        let Some(params) = config.config_server_params() else {
            return Ok(None);
        };
        let server = self
            .resolve(&params)
            .map_err(|e| RemoteFsError::fatal(guid, "config_resolve", e))?;

        self.ops
            .create_dir(&CreateDirRequest::new(config.config_path.clone(), true), &server)
            .await
            .map_err(|e| RemoteFsError::fatal(guid, "config_dir", e))?;

        Ok(Some(CounterStore {
            server,
            path: config.config_path.clone(),
            file: format!("{guid}.json"),
        }))
    }

    async fn read_counter(&self, store: &CounterStore, guid: &str) -> Result<u64> {
        let existing = self
            .ops
            .list(
                &ListRequest::new(store.path.clone()).filtered(FilterKind::Exact, store.file.clone()),
                &store.server,
            )
            .await
            .map_err(|e| RemoteFsError::fatal(guid, "counter_read", e))?;
        if existing.files.is_empty() {
            return Ok(0);
        }

        let read = self
            .ops
            .read(&ReadRequest::new(store.path.clone(), store.file.clone()), &store.server)
            .await
            .map_err(|e| RemoteFsError::fatal(guid, "counter_read", e))?;
        let raw = read.content.trim();
        if raw.is_empty() {
            return Ok(0);
        }
        raw.parse::<u64>().map_err(|e| {
            RemoteFsError::fatal(
                guid,
                "counter_read",
                RemoteFsError::InvalidInput {
                    field: "counter",
                    reason: format!("{:?} in {} is not an integer: {e}", raw, read.path),
                },
            )
        })
    }

    async fn write_counter(&self, store: &CounterStore, guid: &str, value: u64) -> Result<()> {
        let request = WriteRequest::new(
            store.path.clone(),
            store.file.clone(),
            FileContent::Text(value.to_string()),
        )
        .overwrite(true);

        self.ops
            .write(&request, &store.server)
            .await
            .map_err(|e| RemoteFsError::fatal(guid, "counter_write", e))?;
        debug!(incremental = value, "counter persisted");
        Ok(())
    }

    async fn prepare_backups(
        &self,
        config: &BatchConfig,
        item: &BatchItem,
        source: &ConnectionDescriptor,
    ) -> Result<Backups> {
        let guid = item.object_guid.as_str();
        let fatal = |e| RemoteFsError::fatal(guid, "backup_prepare", e);

        let server = match config.backup_server_params() {
            Some(params) => {
                let server = self.resolve(&params).map_err(fatal)?;
                let dir = join_path(&[config.backup_path.as_str(), guid]);
                self.ops
                    .create_dir(&CreateDirRequest::new(dir.clone(), true), &server)
                    .await
                    .map_err(fatal)?;
                Some((server, dir))
            }
            None => None,
        };

        let subfolder = match config.subfolder_backup() {
            Some(name) => {
                let dir = join_path(&[item.source_path.as_str(), name]);
                self.ops
                    .create_dir(&CreateDirRequest::new(dir.clone(), true), source)
                    .await
                    .map_err(fatal)?;
                Some(dir)
            }
            None => None,
        };

        Ok(Backups { server, subfolder })
    }

    async fn transfer_file(&self, context: &ItemContext<'_>, file: &str) -> BatchResult {
        let item = context.item;
        let mut destination_name = String::new();
        let outcome = self.transfer_steps(context, file, &mut destination_name).await;

        let source_file = join_path(&[
            context.source.display_prefix().as_str(),
            item.source_path.as_str(),
            file,
        ]);
        let destination_file = join_path(&[
            context.destination.display_prefix().as_str(),
            item.destination_path.as_str(),
            destination_name.as_str(),
        ]);

        let message = match outcome {
            Ok(()) => {
                info!(source = %source_file, destination = %destination_file, "file transferred");
                String::new()
            }
            Err(e) => {
                let message = error_message(&e);
                warn!(source = %source_file, error = %message, "file transfer failed");
                message
            }
        };

        BatchResult {
            object_guid: item.object_guid.clone(),
            source_file,
            destination_file,
            success: message.is_empty(),
            message,
            timestamp: Local::now(),
        }
    }

    async fn transfer_steps(&self, context: &ItemContext<'_>, file: &str, destination_name: &mut String) -> Result<()> {
        let item = context.item;
        let guid = item.object_guid.as_str();

        let read = self
            .ops
            .read(
                &ReadRequest::new(item.source_path.clone(), file).encoding(item.source_encoding),
                &context.source,
            )
            .await?;

        *destination_name = substitute(&item.destination_filename, file, guid, context.incremental);
        if destination_name.is_empty() {
            return Err(RemoteFsError::InvalidInput {
                field: "destination_filename",
                reason: format!("template {:?} produced an empty name", item.destination_filename),
            });
        }

        let content = transfer_content(&read, item);
        let write = WriteRequest::new(item.destination_path.clone(), destination_name.clone(), content)
            .encoding(item.destination_encoding)
            .overwrite(item.overwrite);
        self.ops.write(&write, &context.destination).await?;

        self.write_backups(context, file, &read).await?;

        if item.delete_source {
            let delete = DeleteRequest::new(item.source_path.clone(), file);
            let deleted = self.ops.delete(&delete, &context.source).await?;
            if !deleted.success {
                return Err(RemoteFsError::NotFound { path: deleted.path });
            }
        }
        Ok(())
    }

    /// Writes the untouched source bytes to every configured backup
    /// destination.
    async fn write_backups(&self, context: &ItemContext<'_>, file: &str, read: &ReadResult) -> Result<()> {
        let backups = &context.backups;
        if backups.server.is_none() && backups.subfolder.is_none() {
            return Ok(());
        }

        let item = context.item;
        let mut name = substitute(context.backup_template, file, &item.object_guid, context.incremental);
        if name.is_empty() {
            name = file.to_string();
        }
        let backup = |dir: &str| {
            WriteRequest::new(dir, name.clone(), FileContent::Bytes(read.byte_content.clone()))
                .encoding(item.source_encoding)
                .overwrite(item.overwrite)
        };

        if let Some((server, dir)) = &backups.server {
            self.ops.write(&backup(dir), server).await?;
            debug!(dir = %dir, file = %name, "backed up to backup server");
        }
        if let Some(dir) = &backups.subfolder {
            self.ops.write(&backup(dir), &context.source).await?;
            debug!(dir = %dir, file = %name, "backed up to source subfolder");
        }
        Ok(())
    }
}

/// Destination payload: transcoded text when both sides use different text
/// encodings, the source bytes otherwise.
fn transfer_content(read: &ReadResult, item: &BatchItem) -> FileContent {
    let transcode = item.source_encoding.is_text()
        && item.destination_encoding.is_text()
        && item.source_encoding != item.destination_encoding;
    if transcode {
        FileContent::Text(read.content.clone())
    } else {
        FileContent::Bytes(read.byte_content.clone())
    }
}
