pub mod ftp;
pub mod local;
#[cfg(feature = "s3")]
pub mod s3;
#[cfg(feature = "sftp")]
pub mod sftp;
pub mod smb;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::connection::{ConnectionDescriptor, ConnectionType};
use crate::error::Result;
#[cfg(not(all(feature = "s3", feature = "sftp")))]
use crate::error::RemoteFsError;

/// Which kinds of directory entries a listing returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    #[default]
    Files,
    Directories,
    Both,
}

impl ObjectType {
    pub const fn accepts(self, is_dir: bool) -> bool {
        match self {
            Self::Files => !is_dir,
            Self::Directories => is_dir,
            Self::Both => true,
        }
    }
}

/// One entry from a protocol listing, before type selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Uniform storage operations every backend provides.
///
/// Paths are full paths on the server. Contract shared by all backends:
/// `create_dir` on an existing directory succeeds, `write` without
/// `overwrite` on an existing file fails with `AlreadyExists`, and `delete`
/// of a missing file fails with `NotFound`.
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn list(&self, path: &str, object_type: ObjectType) -> Result<Vec<String>>;
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    async fn write(&self, path: &str, data: &[u8], overwrite: bool) -> Result<()>;
    async fn delete(&self, path: &str) -> Result<()>;
    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()>;
}

/// Builds connectors for resolved descriptors.
pub trait ConnectorFactory: Send + Sync {
    fn build(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn StorageConnector>>;
}

/// Maps each connection type to its protocol implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtocolConnectors;

impl ConnectorFactory for ProtocolConnectors {
    fn build(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn StorageConnector>> {
        let connector: Arc<dyn StorageConnector> = match descriptor.connection_type() {
            ConnectionType::LocalStorage => Arc::new(local::LocalConnector::new(descriptor.address())),
            ConnectionType::Ftp => Arc::new(ftp::FtpClient::from_descriptor(descriptor)?),
            ConnectionType::Smb => Arc::new(smb::SmbClient::from_descriptor(descriptor)?),
            #[cfg(feature = "sftp")]
            ConnectionType::Sftp => Arc::new(sftp::SftpClient::from_descriptor(descriptor)?),
            #[cfg(not(feature = "sftp"))]
            ConnectionType::Sftp => {
                return Err(RemoteFsError::Unsupported {
                    backend: ConnectionType::Sftp,
                    operation: "connect (built without the sftp feature)",
                })
            }
            #[cfg(feature = "s3")]
            ConnectionType::S3 => Arc::new(s3::S3Client::from_descriptor(descriptor)?),
            #[cfg(not(feature = "s3"))]
            ConnectionType::S3 => {
                return Err(RemoteFsError::Unsupported {
                    backend: ConnectionType::S3,
                    operation: "connect (built without the s3 feature)",
                })
            }
        };
        Ok(connector)
    }
}
