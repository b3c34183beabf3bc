use super::{ObjectType, StorageConnector};
use crate::connection::ConnectionDescriptor;
use crate::error::{RemoteFsError, Result};
use crate::utils::{path_prefixes, split_parent};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use ssh2::{ErrorCode, HashType, Session, Sftp};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;

const DEFAULT_PORT: u16 = 22;
const SFTP_NO_SUCH_FILE: i32 = 2;
const DIR_MODE: i32 = 0o755;

#[derive(Clone)]
struct Credentials {
    username: String,
    password: Option<String>,
    private_key: Option<String>,
    private_key_password: Option<String>,
    fingerprint: Option<String>,
}

/// SFTP over libssh2. Sessions are opened per operation on the blocking
/// pool.
pub struct SftpClient {
    host: String,
    port: u16,
    credentials: Credentials,
}

impl SftpClient {
    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let (host, port) = descriptor.host_port(DEFAULT_PORT)?;
        let username = descriptor
            .username()
            .ok_or_else(|| RemoteFsError::invalid_config("SFTP connections require a Username"))?;
        if descriptor.password().is_none() && descriptor.private_key().is_none() {
            return Err(RemoteFsError::invalid_config(
                "SFTP connections require a Password or a PrivateKey",
            ));
        }

        Ok(Self {
            host,
            port,
            credentials: Credentials {
                username: username.to_string(),
                password: descriptor.password().map(str::to_string),
                private_key: descriptor.private_key().map(decode_private_key),
                private_key_password: descriptor.private_key_password().map(str::to_string),
                fingerprint: descriptor.fingerprint().map(str::to_string),
            },
        })
    }

    fn server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect(server: &str, credentials: &Credentials) -> std::result::Result<Sftp, String> {
        let tcp = TcpStream::connect(server).map_err(|e| format!("TCP connection to {server} failed: {e}"))?;
        let mut sess = Session::new().map_err(|e| e.to_string())?;
        sess.set_tcp_stream(tcp);
        sess.handshake().map_err(|e| format!("SSH handshake failed: {e}"))?;

        if let Some(expected) = &credentials.fingerprint {
            let actual = sess
                .host_key_hash(HashType::Sha256)
                .map(|hash| STANDARD_NO_PAD.encode(hash))
                .ok_or("server did not present a host key")?;
            if !fingerprint_matches(expected, &actual) {
                return Err(format!("host key fingerprint mismatch: server presented SHA256:{actual}"));
            }
        }

        let mut auth_errs: Vec<String> = Vec::new();
        if let Some(key) = &credentials.private_key {
            if let Err(e) = sess.userauth_pubkey_memory(
                &credentials.username,
                None,
                key,
                credentials.private_key_password.as_deref(),
            ) {
                auth_errs.push(format!("publickey: {e}"));
            }
        }
        if !sess.authenticated() {
            if let Some(password) = &credentials.password {
                if let Err(e) = sess.userauth_password(&credentials.username, password) {
                    auth_errs.push(format!("password: {e}"));
                }
            }
        }
        if !sess.authenticated() {
            return Err(format!("SSH authentication failed: {}", auth_errs.join("; ")));
        }

        sess.sftp().map_err(|e| format!("SFTP subsystem unavailable: {e}"))
    }

    async fn with_sftp<T, F>(&self, operation: &'static str, path: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp) -> Result<T> + Send + 'static,
    {
        let server = self.server();
        let credentials = self.credentials.clone();
        let target = path.to_string();

        tokio::task::spawn_blocking(move || {
            let sftp = Self::connect(&server, &credentials)
                .map_err(|e| RemoteFsError::connector(operation, server.clone(), target.clone(), e))?;
            op(&sftp)
        })
        .await
        .map_err(|e| RemoteFsError::connector(operation, self.server(), path, e))?
    }
}

fn decode_private_key(raw: &str) -> String {
    if raw.contains("-----BEGIN") {
        return raw.to_string();
    }
    STANDARD
        .decode(raw.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

fn fingerprint_matches(expected: &str, actual: &str) -> bool {
    let expected = expected.trim();
    let expected = expected.strip_prefix("SHA256:").unwrap_or(expected);
    expected.trim_end_matches('=') == actual.trim_end_matches('=')
}

fn map_sftp_error(operation: &'static str, server: &str, path: &str, err: ssh2::Error) -> RemoteFsError {
    if matches!(err.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE)) {
        RemoteFsError::NotFound { path: path.to_string() }
    } else {
        RemoteFsError::connector(operation, server, path, err)
    }
}

fn is_dir(sftp: &Sftp, path: &str) -> bool {
    sftp.stat(Path::new(path)).map(|st| st.is_dir()).unwrap_or(false)
}

#[async_trait]
impl StorageConnector for SftpClient {
    async fn list(&self, path: &str, object_type: ObjectType) -> Result<Vec<String>> {
        let server = self.server();
        let target = path.to_string();

        self.with_sftp("list", path, move |sftp| {
            let entries = sftp
                .readdir(Path::new(&target))
                .map_err(|e| map_sftp_error("list", &server, &target, e))?;

            Ok(entries
                .into_iter()
                .filter(|(_, stat)| object_type.accepts(stat.is_dir()))
                .filter_map(|(entry, _)| entry.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect())
        })
        .await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let server = self.server();
        let target = path.to_string();

        self.with_sftp("read", path, move |sftp| {
            let mut remote_f = sftp
                .open(Path::new(&target))
                .map_err(|e| map_sftp_error("read", &server, &target, e))?;
            let mut buf = Vec::new();
            remote_f
                .read_to_end(&mut buf)
                .map_err(|e| RemoteFsError::connector("read", server.clone(), target.clone(), e))?;
            Ok(buf)
        })
        .await
    }

    async fn write(&self, path: &str, data: &[u8], overwrite: bool) -> Result<()> {
        let server = self.server();
        let target = path.to_string();
        let data = data.to_vec();

        self.with_sftp("write", path, move |sftp| {
            if !overwrite && sftp.stat(Path::new(&target)).is_ok() {
                return Err(RemoteFsError::AlreadyExists { path: target });
            }
            let mut remote_f = sftp
                .create(Path::new(&target))
                .map_err(|e| map_sftp_error("write", &server, &target, e))?;
            remote_f
                .write_all(&data)
                .map_err(|e| RemoteFsError::connector("write", server.clone(), target.clone(), e))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let server = self.server();
        let target = path.to_string();

        self.with_sftp("delete", path, move |sftp| {
            sftp.unlink(Path::new(&target))
                .map_err(|e| map_sftp_error("delete", &server, &target, e))
        })
        .await
    }

    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()> {
        let server = self.server();
        let target = path.to_string();

        self.with_sftp("create_dir", path, move |sftp| {
            if is_dir(sftp, &target) {
                return Ok(());
            }
            let (parent, _) = split_parent(&target);
            if !recursive && !parent.is_empty() && !is_dir(sftp, parent) {
                return Err(RemoteFsError::NotFound {
                    path: parent.to_string(),
                });
            }

            let segments = if recursive {
                path_prefixes(&target)
            } else {
                vec![target.clone()]
            };
            for segment in segments {
                if !is_dir(sftp, &segment) {
                    sftp.mkdir(Path::new(&segment), DIR_MODE)
                        .map_err(|e| map_sftp_error("create_dir", &server, &segment, e))?;
                }
            }
            Ok(())
        })
        .await
    }
}
