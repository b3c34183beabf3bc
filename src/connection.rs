//! Connection descriptors, their resolution from server parameters, and the
//! scoped pool of connector handles.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::{ConnectorFactory, StorageConnector};
use crate::error::{RemoteFsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionType {
    #[serde(rename = "SMB", alias = "Smb", alias = "smb")]
    Smb,
    #[serde(rename = "FTP", alias = "Ftp", alias = "ftp")]
    Ftp,
    #[serde(rename = "SFTP", alias = "Sftp", alias = "sftp")]
    Sftp,
    #[serde(rename = "LocalStorage", alias = "localstorage", alias = "local")]
    LocalStorage,
    #[serde(rename = "S3", alias = "s3")]
    S3,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Smb => "SMB",
            Self::Ftp => "FTP",
            Self::Sftp => "SFTP",
            Self::LocalStorage => "LocalStorage",
            Self::S3 => "S3",
        })
    }
}

/// Where a connection's settings come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigurationSource {
    /// An opaque JSON document describing the server.
    #[default]
    Json,
    Smb,
    Ftp,
    Sftp,
    LocalStorage,
    S3,
}

impl ConfigurationSource {
    const fn connection_type(self) -> Option<ConnectionType> {
        match self {
            Self::Json => None,
            Self::Smb => Some(ConnectionType::Smb),
            Self::Ftp => Some(ConnectionType::Ftp),
            Self::Sftp => Some(ConnectionType::Sftp),
            Self::LocalStorage => Some(ConnectionType::LocalStorage),
            Self::S3 => Some(ConnectionType::S3),
        }
    }
}

/// Resolved, immutable description of one storage server.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionDescriptor {
    connection_type: ConnectionType,
    address: String,
    domain: Option<String>,
    username: Option<String>,
    password: Option<String>,
    private_key: Option<String>,
    private_key_password: Option<String>,
    fingerprint: Option<String>,
    secret_id: Option<String>,
    secret_key: Option<String>,
    s3_region: Option<String>,
    s3_bucket: Option<String>,
    retries: u32,
    retry_delay_ms: u64,
}

impl ConnectionDescriptor {
    pub fn builder(connection_type: ConnectionType, address: impl Into<String>) -> ConnectionDescriptorBuilder {
        ConnectionDescriptorBuilder::new(connection_type, address)
    }

    /// A local-disk descriptor rooted at `root` (empty for no root).
    pub fn local(root: impl Into<String>) -> Self {
        ConnectionDescriptorBuilder::new(ConnectionType::LocalStorage, root).descriptor
    }

    pub const fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }

    pub fn private_key_password(&self) -> Option<&str> {
        self.private_key_password.as_deref()
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn secret_id(&self) -> Option<&str> {
        self.secret_id.as_deref()
    }

    pub fn secret_key(&self) -> Option<&str> {
        self.secret_key.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.s3_region.as_deref()
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.s3_bucket.as_deref()
    }

    pub const fn retries(&self) -> u32 {
        self.retries
    }

    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Canonical serialization, used to key pooled connector handles.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{}|{}", self.connection_type, self.address))
    }

    /// `user@address`, or just the address when there is no user.
    pub fn display_prefix(&self) -> String {
        match self.username() {
            Some(user) => format!("{user}@{}", self.address),
            None => self.address.clone(),
        }
    }

    /// Host and port split out of `address`, with `default_port` when absent.
    pub fn host_port(&self, default_port: u16) -> Result<(String, u16)> {
        match self.address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    RemoteFsError::invalid_config(format!("invalid port in address {:?}", self.address))
                })?;
                Ok((host.to_string(), port))
            }
            None => Ok((self.address.clone(), default_port)),
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("ConnectionDescriptor")
            .field("connection_type", &self.connection_type)
            .field("address", &self.address)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("private_key", &redact(&self.private_key))
            .field("fingerprint", &self.fingerprint)
            .field("secret_id", &self.secret_id)
            .field("secret_key", &redact(&self.secret_key))
            .field("s3_region", &self.s3_region)
            .field("s3_bucket", &self.s3_bucket)
            .field("retries", &self.retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionDescriptorBuilder {
    descriptor: ConnectionDescriptor,
}

impl ConnectionDescriptorBuilder {
    fn new(connection_type: ConnectionType, address: impl Into<String>) -> Self {
        Self {
            descriptor: ConnectionDescriptor {
                connection_type,
                address: address.into().trim().to_string(),
                domain: None,
                username: None,
                password: None,
                private_key: None,
                private_key_password: None,
                fingerprint: None,
                secret_id: None,
                secret_key: None,
                s3_region: None,
                s3_bucket: None,
                retries: 0,
                retry_delay_ms: 0,
            },
        }
    }

    pub fn domain(mut self, value: impl Into<String>) -> Self {
        self.descriptor.domain = non_blank(value.into());
        self
    }

    pub fn username(mut self, value: impl Into<String>) -> Self {
        self.descriptor.username = non_blank(value.into());
        self
    }

    pub fn password(mut self, value: impl Into<String>) -> Self {
        self.descriptor.password = non_blank(value.into());
        self
    }

    pub fn private_key(mut self, value: impl Into<String>) -> Self {
        self.descriptor.private_key = non_blank(value.into());
        self
    }

    pub fn private_key_password(mut self, value: impl Into<String>) -> Self {
        self.descriptor.private_key_password = non_blank(value.into());
        self
    }

    pub fn fingerprint(mut self, value: impl Into<String>) -> Self {
        self.descriptor.fingerprint = non_blank(value.into());
        self
    }

    pub fn secret_id(mut self, value: impl Into<String>) -> Self {
        self.descriptor.secret_id = non_blank(value.into());
        self
    }

    pub fn secret_key(mut self, value: impl Into<String>) -> Self {
        self.descriptor.secret_key = non_blank(value.into());
        self
    }

    pub fn s3_region(mut self, value: impl Into<String>) -> Self {
        self.descriptor.s3_region = non_blank(value.into());
        self
    }

    pub fn s3_bucket(mut self, value: impl Into<String>) -> Self {
        self.descriptor.s3_bucket = non_blank(value.into());
        self
    }

    pub const fn retries(mut self, retries: u32) -> Self {
        self.descriptor.retries = retries;
        self
    }

    pub const fn retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.descriptor.retry_delay_ms = delay_ms;
        self
    }

    pub fn build(self) -> Result<ConnectionDescriptor> {
        let d = self.descriptor;
        if d.connection_type != ConnectionType::LocalStorage && d.address.is_empty() {
            return Err(RemoteFsError::invalid_config(format!(
                "{} connections require an address",
                d.connection_type
            )));
        }
        if d.connection_type == ConnectionType::S3 {
            for (field, value) in [
                ("S3Bucket", &d.s3_bucket),
                ("SecretId", &d.secret_id),
                ("SecretKey", &d.secret_key),
            ] {
                if value.is_none() {
                    return Err(RemoteFsError::invalid_config(format!(
                        "S3 connections require {field}"
                    )));
                }
            }
        }
        Ok(d)
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Server parameters as supplied by a caller: either an opaque JSON document
/// or structured fields for a known protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerParams {
    pub source: ConfigurationSource,
    pub json_configuration: String,
    pub address: String,
    pub domain: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub private_key: String,
    #[serde(skip_serializing)]
    pub private_key_password: String,
    pub fingerprint: String,
    pub secret_id: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub s3_region: String,
    pub s3_bucket: String,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl ServerParams {
    pub fn json(raw: impl Into<String>) -> Self {
        Self {
            source: ConfigurationSource::Json,
            json_configuration: raw.into(),
            ..Self::default()
        }
    }

    pub fn resolve(&self) -> Result<ConnectionDescriptor> {
        self.resolve_with_defaults(0, 0)
    }

    /// Resolves the descriptor, using the given retry settings when the
    /// parameters do not carry their own.
    pub fn resolve_with_defaults(&self, retries: u32, retry_delay_ms: u64) -> Result<ConnectionDescriptor> {
        match self.source.connection_type() {
            None => parse_json_descriptor(&self.json_configuration, retries, retry_delay_ms),
            Some(connection_type) => ConnectionDescriptor::builder(connection_type, self.address.clone())
                .domain(self.domain.clone())
                .username(self.username.clone())
                .password(self.password.clone())
                .private_key(self.private_key.clone())
                .private_key_password(self.private_key_password.clone())
                .fingerprint(self.fingerprint.clone())
                .secret_id(self.secret_id.clone())
                .secret_key(self.secret_key.clone())
                .s3_region(self.s3_region.clone())
                .s3_bucket(self.s3_bucket.clone())
                .retries(self.retries.unwrap_or(retries))
                .retry_delay_ms(self.retry_delay_ms.unwrap_or(retry_delay_ms))
                .build(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawServerConfiguration {
    #[serde(alias = "connectiontype", alias = "connection_type")]
    connection_type: Option<ConnectionType>,
    #[serde(alias = "address")]
    address: String,
    #[serde(alias = "domain")]
    domain: String,
    #[serde(alias = "username")]
    username: String,
    #[serde(alias = "password")]
    password: String,
    #[serde(alias = "privatekey", alias = "private_key")]
    private_key: String,
    #[serde(alias = "privatekeypassword", alias = "private_key_password")]
    private_key_password: String,
    #[serde(alias = "fingerprint")]
    fingerprint: String,
    #[serde(alias = "secretid", alias = "secret_id")]
    secret_id: String,
    #[serde(alias = "secretkey", alias = "secret_key")]
    secret_key: String,
    #[serde(rename = "S3Region", alias = "s3region", alias = "s3_region")]
    s3_region: String,
    #[serde(rename = "S3Bucket", alias = "s3bucket", alias = "s3_bucket")]
    s3_bucket: String,
    #[serde(alias = "retries")]
    retries: Option<u32>,
    #[serde(alias = "retrydelay", alias = "retry_delay", alias = "retry_delay_ms")]
    retry_delay: Option<u64>,
}

/// Parses the opaque JSON server configuration used throughout batch items.
pub fn parse_json_descriptor(raw: &str, retries: u32, retry_delay_ms: u64) -> Result<ConnectionDescriptor> {
    if raw.trim().is_empty() {
        return Err(RemoteFsError::invalid_config("server configuration is empty"));
    }
    let parsed: RawServerConfiguration = serde_json::from_str(raw).map_err(|source| RemoteFsError::Json {
        context: "parse server configuration",
        source,
    })?;
    let connection_type = parsed
        .connection_type
        .ok_or_else(|| RemoteFsError::invalid_config("ConnectionType is missing"))?;

    ConnectionDescriptor::builder(connection_type, parsed.address)
        .domain(parsed.domain)
        .username(parsed.username)
        .password(parsed.password)
        .private_key(parsed.private_key)
        .private_key_password(parsed.private_key_password)
        .fingerprint(parsed.fingerprint)
        .secret_id(parsed.secret_id)
        .secret_key(parsed.secret_key)
        .s3_region(parsed.s3_region)
        .s3_bucket(parsed.s3_bucket)
        .retries(parsed.retries.unwrap_or(retries))
        .retry_delay_ms(parsed.retry_delay.unwrap_or(retry_delay_ms))
        .build()
}

/// Connector handles keyed by descriptor, bounded by `capacity` with
/// least-recently-used eviction. Owned by one facade; nothing is global.
pub struct ConnectorPool {
    factory: Arc<dyn ConnectorFactory>,
    capacity: usize,
    entries: Mutex<VecDeque<(String, Arc<dyn StorageConnector>)>>,
}

impl ConnectorPool {
    pub const DEFAULT_CAPACITY: usize = 16;

    pub fn new(factory: Arc<dyn ConnectorFactory>, capacity: usize) -> Self {
        Self {
            factory,
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn get(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn StorageConnector>> {
        let key = descriptor.cache_key();
        let mut entries = self.entries.lock().await;

        if let Some(pos) = entries.iter().position(|(k, _)| *k == key) {
            if let Some(entry) = entries.remove(pos) {
                let connector = entry.1.clone();
                entries.push_back(entry);
                return Ok(connector);
            }
        }

        let connector = self.factory.build(descriptor)?;
        if entries.len() >= self.capacity {
            if let Some((_, evicted)) = entries.pop_front() {
                debug!(
                    server = %descriptor.address(),
                    handles = Arc::strong_count(&evicted),
                    "evicting least recently used connector"
                );
            }
        }
        entries.push_back((key, connector.clone()));
        Ok(connector)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
