use super::{ObjectType, RemoteEntry, StorageConnector};
use crate::connection::ConnectionDescriptor;
use crate::error::{RemoteFsError, Result};
use crate::utils::{path_prefixes, token_start};
use async_trait::async_trait;
use std::io::ErrorKind;
use tempfile::NamedTempFile;
use tokio::process::Command as TokioCommand;

const NOT_FOUND_STATUSES: [&str; 3] = [
    "NT_STATUS_NO_SUCH_FILE",
    "NT_STATUS_OBJECT_NAME_NOT_FOUND",
    "NT_STATUS_OBJECT_PATH_NOT_FOUND",
];
const COLLISION_STATUS: &str = "NT_STATUS_OBJECT_NAME_COLLISION";

/// SMB share driven through the `smbclient` binary. Every operation is a
/// separate `smbclient -c` invocation.
pub struct SmbClient {
    host: String,
    share: String,
    domain: Option<String>,
    username: String,
    password: String,
}

impl SmbClient {
    pub fn new(host: String, share: String, domain: Option<String>, username: String, password: String) -> Self {
        Self {
            host,
            share,
            domain,
            username,
            password,
        }
    }

    /// The descriptor address is `host/share`; leading slashes or
    /// backslashes are ignored.
    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let address = descriptor.address().replace('\\', "/");
        let address = address.trim_matches('/');
        let (host, share) = address.split_once('/').ok_or_else(|| {
            RemoteFsError::invalid_config(format!(
                "SMB address {:?} must have the form host/share",
                descriptor.address()
            ))
        })?;
        if host.is_empty() || share.is_empty() {
            return Err(RemoteFsError::invalid_config(format!(
                "SMB address {:?} must have the form host/share",
                descriptor.address()
            )));
        }

        Ok(Self::new(
            host.to_string(),
            share.trim_matches('/').to_string(),
            descriptor.domain().map(str::to_string),
            descriptor.username().unwrap_or_default().to_string(),
            descriptor.password().unwrap_or_default().to_string(),
        ))
    }

    fn service(&self) -> String {
        format!("//{}/{}", self.host, self.share)
    }

    fn remote(path: &str) -> String {
        path.trim_start_matches('/').to_string()
    }

    async fn run_smbclient_command(&self, operation: &'static str, path: &str, command: &str) -> Result<String> {
        let mut cmd = TokioCommand::new("smbclient");
        cmd.arg(self.service()).arg("-c").arg(command);
        cmd.arg("-U").arg(format!("{}%{}", self.username, self.password));
        if let Some(domain) = &self.domain {
            cmd.arg("-W").arg(domain);
        }
        cmd.arg("-N");

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                RemoteFsError::connector(
                    operation,
                    self.service(),
                    path,
                    "smbclient not found. Please install samba-client package",
                )
            } else {
                RemoteFsError::connector(operation, self.service(), path, e)
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        let status = failure_status(&stdout).or_else(|| failure_status(&stderr));

        match status {
            Some(status) if NOT_FOUND_STATUSES.contains(&status.as_str()) => {
                Err(RemoteFsError::NotFound { path: path.to_string() })
            }
            Some(status) => Err(RemoteFsError::connector(operation, self.service(), path, status)),
            None if !output.status.success() => Err(RemoteFsError::connector(
                operation,
                self.service(),
                path,
                format!("SMB command failed: {}", stderr.trim()),
            )),
            None => Ok(stdout),
        }
    }

    fn parse_list_line(line: &str) -> Option<RemoteEntry> {
        // smbclient ls output:
        //   filename                          D        0  Wed Dec 25 10:30:45 2024
        //   filename                         AH     1234  Wed Dec 25 10:30:45 2024
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.contains("blocks of size") {
            return None;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        // name, size and five date fields at minimum
        if tokens.len() < 7 {
            return None;
        }
        let size_at = tokens.len() - 6;
        tokens[size_at].parse::<u64>().ok()?;

        let (name_end, attributes) = match tokens[size_at - 1] {
            attrs if size_at >= 2 && is_attribute_field(attrs) => (size_at - 1, attrs),
            _ => (size_at, ""),
        };
        let name = trimmed[..token_start(trimmed, name_end)?].trim_end();
        if name.is_empty() || name == "." || name == ".." {
            return None;
        }

        Some(RemoteEntry {
            name: name.to_string(),
            is_dir: attributes.contains('D'),
        })
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self
            .run_smbclient_command("stat", path, &format!("ls \"{}\"", Self::remote(path)))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn mkdir_one(&self, path: &str) -> Result<()> {
        match self
            .run_smbclient_command("create_dir", path, &format!("mkdir \"{}\"", Self::remote(path)))
            .await
        {
            Err(RemoteFsError::Connector { source, .. }) if source.to_string() == COLLISION_STATUS => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

fn is_attribute_field(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| "DAHSRNV".contains(c))
}

fn failure_status(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .find(|token| token.starts_with("NT_STATUS_") && *token != "NT_STATUS_OK")
        .map(|token| token.trim_end_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_').to_string())
}

#[async_trait]
impl StorageConnector for SmbClient {
    async fn list(&self, path: &str, object_type: ObjectType) -> Result<Vec<String>> {
        let clean_path = Self::remote(path);
        let ls_command = if clean_path.is_empty() {
            "ls".to_string()
        } else {
            format!("ls \"{}/*\"", clean_path.trim_end_matches('/'))
        };

        let output = self.run_smbclient_command("list", path, &ls_command).await?;
        Ok(output
            .lines()
            .filter_map(Self::parse_list_line)
            .filter(|entry| object_type.accepts(entry.is_dir))
            .map(|entry| entry.name)
            .collect())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let local = NamedTempFile::new().map_err(|e| RemoteFsError::io("read", path, e))?;
        let get_command = format!("get \"{}\" \"{}\"", Self::remote(path), local.path().to_string_lossy());

        self.run_smbclient_command("read", path, &get_command).await?;
        tokio::fs::read(local.path())
            .await
            .map_err(|e| RemoteFsError::io("read", path, e))
    }

    async fn write(&self, path: &str, data: &[u8], overwrite: bool) -> Result<()> {
        if !overwrite && self.exists(path).await? {
            return Err(RemoteFsError::AlreadyExists { path: path.to_string() });
        }

        let local = NamedTempFile::new().map_err(|e| RemoteFsError::io("write", path, e))?;
        tokio::fs::write(local.path(), data)
            .await
            .map_err(|e| RemoteFsError::io("write", path, e))?;

        let put_command = format!("put \"{}\" \"{}\"", local.path().to_string_lossy(), Self::remote(path));
        self.run_smbclient_command("write", path, &put_command).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let del_command = format!("del \"{}\"", Self::remote(path));
        self.run_smbclient_command("delete", path, &del_command).await?;
        Ok(())
    }

    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()> {
        if !recursive {
            return self.mkdir_one(path).await;
        }
        for segment in path_prefixes(path) {
            self.mkdir_one(&segment).await?;
        }
        Ok(())
    }
}
