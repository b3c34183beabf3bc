use super::{ObjectType, RemoteEntry, StorageConnector};
use crate::connection::ConnectionDescriptor;
use crate::error::{RemoteFsError, Result};
use crate::utils::{path_prefixes, split_parent, token_start};
use async_trait::async_trait;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};

const DEFAULT_PORT: u16 = 21;

pub struct FtpClient {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl FtpClient {
    pub fn new(host: String, port: u16, username: String, password: String) -> Self {
        Self {
            host,
            port,
            username,
            password,
        }
    }

    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let (host, port) = descriptor.host_port(DEFAULT_PORT)?;
        Ok(Self::new(
            host,
            port,
            descriptor.username().unwrap_or("anonymous").to_string(),
            descriptor.password().unwrap_or_default().to_string(),
        ))
    }

    fn server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect_ftp(host: &str, port: u16, username: &str, password: &str) -> std::result::Result<FtpStream, FtpError> {
        let mut ftp = FtpStream::connect((host, port))?;
        ftp.login(username, password)?;
        ftp.transfer_type(FileType::Binary)?;
        Ok(ftp)
    }

    /// Runs `op` against a fresh session on the blocking pool.
    async fn with_session<T, F>(&self, operation: &'static str, path: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T> + Send + 'static,
    {
        let host = self.host.clone();
        let port = self.port;
        let username = self.username.clone();
        let password = self.password.clone();
        let server = self.server();
        let target = path.to_string();

        tokio::task::spawn_blocking(move || {
            let mut ftp = Self::connect_ftp(&host, port, &username, &password)
                .map_err(|e| RemoteFsError::connector(operation, server.clone(), target.clone(), e))?;
            let result = op(&mut ftp);
            let _ = ftp.quit();
            result
        })
        .await
        .map_err(|e| RemoteFsError::connector(operation, self.server(), path, e))?
    }

    fn is_unavailable(err: &FtpError) -> bool {
        matches!(err, FtpError::UnexpectedResponse(resp) if matches!(resp.status, Status::FileUnavailable))
    }

    fn parse_list_line(line: &str) -> Option<RemoteEntry> {
        let is_dir = line.split_whitespace().next()?.starts_with('d');
        let name = line[token_start(line, 8)?..].trim_end_matches(['\r', '\n']).to_string();

        Some(RemoteEntry { name, is_dir })
    }

    fn exists(ftp: &mut FtpStream, path: &str) -> bool {
        ftp.size(path).is_ok()
    }

    fn is_dir(ftp: &mut FtpStream, path: &str) -> bool {
        let Ok(previous) = ftp.pwd() else {
            return false;
        };
        let entered = ftp.cwd(path).is_ok();
        if entered {
            let _ = ftp.cwd(&previous);
        }
        entered
    }
}

#[async_trait]
impl StorageConnector for FtpClient {
    async fn list(&self, path: &str, object_type: ObjectType) -> Result<Vec<String>> {
        let server = self.server();
        let target = path.to_string();

        self.with_session("list", path, move |ftp| {
            let lines = ftp.list(Some(&target)).map_err(|e| {
                if Self::is_unavailable(&e) {
                    RemoteFsError::NotFound { path: target.clone() }
                } else {
                    RemoteFsError::connector("list", server.clone(), target.clone(), e)
                }
            })?;

            Ok(lines
                .iter()
                .filter_map(|line| Self::parse_list_line(line))
                .filter(|entry| object_type.accepts(entry.is_dir))
                .map(|entry| entry.name)
                .collect())
        })
        .await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let server = self.server();
        let target = path.to_string();

        self.with_session("read", path, move |ftp| {
            ftp.retr_as_buffer(&target)
                .map(|cursor| cursor.into_inner())
                .map_err(|e| {
                    if Self::is_unavailable(&e) {
                        RemoteFsError::NotFound { path: target.clone() }
                    } else {
                        RemoteFsError::connector("read", server.clone(), target.clone(), e)
                    }
                })
        })
        .await
    }

    async fn write(&self, path: &str, data: &[u8], overwrite: bool) -> Result<()> {
        let server = self.server();
        let target = path.to_string();
        let data = data.to_vec();

        self.with_session("write", path, move |ftp| {
            if !overwrite && Self::exists(ftp, &target) {
                return Err(RemoteFsError::AlreadyExists { path: target });
            }
            ftp.put_file(&target, &mut data.as_slice())
                .map_err(|e| RemoteFsError::connector("write", server, target.clone(), e))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let server = self.server();
        let target = path.to_string();

        self.with_session("delete", path, move |ftp| {
            ftp.rm(&target).map_err(|e| {
                if Self::is_unavailable(&e) {
                    RemoteFsError::NotFound { path: target.clone() }
                } else {
                    RemoteFsError::connector("delete", server, target.clone(), e)
                }
            })
        })
        .await
    }

    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()> {
        let server = self.server();
        let target = path.to_string();

        self.with_session("create_dir", path, move |ftp| {
            if Self::is_dir(ftp, &target) {
                return Ok(());
            }
            let (parent, _) = split_parent(&target);
            if !recursive && !parent.is_empty() && !Self::is_dir(ftp, parent) {
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
                if !Self::is_dir(ftp, &segment) {
                    ftp.mkdir(&segment)
                        .map_err(|e| RemoteFsError::connector("create_dir", server.clone(), segment.clone(), e))?;
                }
            }
            Ok(())
        })
        .await
    }
}
