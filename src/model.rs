//! Request and result shapes for the file operation facade and the batch
//! engine.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::client::ObjectType;
use crate::connection::ServerParams;
use crate::encoding::FileEncoding;
use crate::filter::FilterKind;
use crate::utils::join_path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListRequest {
    pub path: String,
    pub filter: FilterKind,
    pub pattern: String,
    pub object_type: ObjectType,
}

impl ListRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn filtered(mut self, filter: FilterKind, pattern: impl Into<String>) -> Self {
        self.filter = filter;
        self.pattern = pattern.into();
        self
    }

    pub fn object_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = object_type;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadRequest {
    pub path: String,
    pub file: String,
    pub encoding: FileEncoding,
}

impl ReadRequest {
    pub fn new(path: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file: file.into(),
            encoding: FileEncoding::default(),
        }
    }

    pub fn encoding(mut self, encoding: FileEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn full_path(&self) -> String {
        join_path(&[self.path.as_str(), self.file.as_str()])
    }
}

/// Payload for a write: text is encoded with the request encoding, bytes are
/// written as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileContent {
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl Default for FileContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteRequest {
    pub path: String,
    pub file: String,
    pub content: FileContent,
    pub encoding: FileEncoding,
    pub overwrite: bool,
}

impl WriteRequest {
    pub fn new(path: impl Into<String>, file: impl Into<String>, content: FileContent) -> Self {
        Self {
            path: path.into(),
            file: file.into(),
            content,
            ..Self::default()
        }
    }

    pub fn encoding(mut self, encoding: FileEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn full_path(&self) -> String {
        join_path(&[self.path.as_str(), self.file.as_str()])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateDirRequest {
    pub path: String,
    pub recursive: bool,
}

impl CreateDirRequest {
    pub fn new(path: impl Into<String>, recursive: bool) -> Self {
        Self {
            path: path.into(),
            recursive,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteRequest {
    pub path: String,
    pub file: String,
}

impl DeleteRequest {
    pub fn new(path: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file: file.into(),
        }
    }

    pub fn full_path(&self) -> String {
        join_path(&[self.path.as_str(), self.file.as_str()])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    pub count: usize,
    pub files: Vec<String>,
}

impl ListResult {
    pub fn new(files: Vec<String>) -> Self {
        Self {
            count: files.len(),
            files,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResult {
    /// Decoded text; empty for `Raw` reads.
    pub content: String,
    #[serde(with = "base64_bytes")]
    pub byte_content: Vec<u8>,
    pub path: String,
    pub encoding: FileEncoding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub success: bool,
    pub path: String,
    pub encoding: FileEncoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDirResult {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub success: bool,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyResult {
    pub success: bool,
}

/// `success` is the copy outcome; a failed delete does not roll it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResult {
    pub success: bool,
    pub source_deleted: bool,
    pub delete_error: Option<String>,
}

/// Run-wide batch settings: counter tracking and backup routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// On unless a document turns it off.
    pub enabled: bool,
    pub use_config_server: bool,
    /// JSON descriptor of the server holding counter files.
    pub config_server: String,
    pub config_path: String,
    pub backup_files: bool,
    /// Back up to the config server instead of `backup_server`.
    pub backup_to_config_server: bool,
    pub backup_server: String,
    pub backup_path: String,
    pub backup_filename: String,
    /// Also back up into a subfolder of each item's source path.
    pub backup_to_subfolder: bool,
    pub backup_subfolder_name: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_config_server: false,
            config_server: String::new(),
            config_path: String::new(),
            backup_files: false,
            backup_to_config_server: false,
            backup_server: String::new(),
            backup_path: String::new(),
            backup_filename: String::new(),
            backup_to_subfolder: false,
            backup_subfolder_name: String::new(),
        }
    }
}

impl BatchConfig {
    pub fn config_server_params(&self) -> Option<ServerParams> {
        (self.enabled && self.use_config_server).then(|| ServerParams::json(self.config_server.clone()))
    }

    /// The dedicated backup server, if any. Blank configuration means no
    /// dedicated backup destination.
    pub fn backup_server_params(&self) -> Option<ServerParams> {
        if !self.backup_files {
            return None;
        }
        if self.backup_to_config_server {
            return self.config_server_params();
        }
        (!self.backup_server.trim().is_empty()).then(|| ServerParams::json(self.backup_server.clone()))
    }

    pub fn subfolder_backup(&self) -> Option<&str> {
        (self.backup_files && self.backup_to_subfolder && !self.backup_subfolder_name.trim().is_empty())
            .then_some(self.backup_subfolder_name.as_str())
    }
}

/// One source-to-destination transfer job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchItem {
    pub object_guid: String,
    /// JSON descriptor of the source server.
    pub source_server: String,
    pub source_path: String,
    pub source_filter_type: FilterKind,
    pub source_filter_pattern: String,
    pub source_encoding: FileEncoding,
    /// JSON descriptor of the destination server.
    pub destination_server: String,
    pub destination_path: String,
    pub destination_filename: String,
    pub destination_encoding: FileEncoding,
    pub overwrite: bool,
    pub delete_source: bool,
}

impl BatchItem {
    pub fn source_server_params(&self) -> ServerParams {
        ServerParams::json(self.source_server.clone())
    }

    pub fn destination_server_params(&self) -> ServerParams {
        ServerParams::json(self.destination_server.clone())
    }
}

/// Outcome for one listed source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub object_guid: String,
    pub source_file: String,
    pub destination_file: String,
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResults {
    pub count: usize,
    pub results: Vec<BatchResult>,
}

impl BatchResults {
    pub fn new(results: Vec<BatchResult>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
