#![allow(dead_code)]

use async_trait::async_trait;
use remotefs::connection::ConnectionDescriptor;
use remotefs::{ConnectorFactory, ObjectType, RemoteFsError, Result, StorageConnector};
use rstest::fixture;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Read,
    Write,
    Delete,
    CreateDir,
}

struct Fault {
    op: Op,
    path: String,
    remaining: usize,
}

/// In-memory storage server with injectable failures.
#[derive(Default)]
pub struct MemoryConnector {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<BTreeSet<String>>,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<HashMap<Op, usize>>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => path[..pos].to_string(),
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl MemoryConnector {
    pub fn put(&self, path: &str, data: &[u8]) {
        let path = normalize(path);
        self.add_dirs(&parent_of(&path));
        self.files.lock().unwrap().insert(path, data.to_vec());
    }

    pub fn mkdir(&self, path: &str) {
        self.add_dirs(&normalize(path));
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(&normalize(path)).cloned()
    }

    pub fn get_text(&self, path: &str) -> Option<String> {
        self.get(path).map(|bytes| String::from_utf8(bytes).unwrap())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(&normalize(path))
    }

    pub fn has_dir(&self, path: &str) -> bool {
        let path = normalize(path);
        path == "/" || self.dirs.lock().unwrap().contains(&path)
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    /// Fails the next `times` calls of `op` whose path contains `path`.
    pub fn fail(&self, op: Op, path: &str, times: usize) {
        self.faults.lock().unwrap().push(Fault {
            op,
            path: path.to_string(),
            remaining: times,
        });
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    fn add_dirs(&self, path: &str) {
        let mut dirs = self.dirs.lock().unwrap();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            dirs.insert(current.clone());
        }
    }

    fn enter(&self, op: Op, path: &str) -> Result<()> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;

        let mut faults = self.faults.lock().unwrap();
        if let Some(fault) = faults
            .iter_mut()
            .find(|f| f.op == op && f.remaining > 0 && path.contains(&f.path))
        {
            fault.remaining -= 1;
            return Err(RemoteFsError::Connector {
                operation: "memory",
                server: "memory".to_string(),
                path: path.to_string(),
                source: "injected fault".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorageConnector for MemoryConnector {
    async fn list(&self, path: &str, object_type: ObjectType) -> Result<Vec<String>> {
        self.enter(Op::List, path)?;
        let dir = normalize(path);
        if !self.has_dir(&dir) {
            return Err(RemoteFsError::NotFound { path: dir });
        }

        let mut names = Vec::new();
        if object_type.accepts(false) {
            names.extend(
                self.files
                    .lock()
                    .unwrap()
                    .keys()
                    .filter(|p| parent_of(p) == dir)
                    .map(|p| name_of(p).to_string()),
            );
        }
        if object_type.accepts(true) {
            names.extend(
                self.dirs
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|p| parent_of(p) == dir)
                    .map(|p| name_of(p).to_string()),
            );
        }
        Ok(names)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.enter(Op::Read, path)?;
        self.get(path).ok_or_else(|| RemoteFsError::NotFound {
            path: path.to_string(),
        })
    }

    async fn write(&self, path: &str, data: &[u8], overwrite: bool) -> Result<()> {
        self.enter(Op::Write, path)?;
        if !overwrite && self.exists(path) {
            return Err(RemoteFsError::AlreadyExists {
                path: path.to_string(),
            });
        }
        self.put(path, data);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.enter(Op::Delete, path)?;
        match self.files.lock().unwrap().remove(&normalize(path)) {
            Some(_) => Ok(()),
            None => Err(RemoteFsError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()> {
        self.enter(Op::CreateDir, path)?;
        let dir = normalize(path);
        if !recursive && !self.has_dir(&parent_of(&dir)) {
            return Err(RemoteFsError::NotFound {
                path: parent_of(&dir),
            });
        }
        self.add_dirs(&dir);
        Ok(())
    }
}

/// One [`MemoryConnector`] per descriptor address.
#[derive(Default)]
pub struct MemoryServers {
    servers: Mutex<HashMap<String, Arc<MemoryConnector>>>,
}

impl MemoryServers {
    pub fn server(&self, address: &str) -> Arc<MemoryConnector> {
        self.servers
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .clone()
    }
}

impl ConnectorFactory for MemoryServers {
    fn build(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn StorageConnector>> {
        Ok(self.server(descriptor.address()))
    }
}

/// JSON descriptor for an in-memory server reached as `svc@{address}`.
pub fn descriptor_json(address: &str) -> String {
    serde_json::json!({
        "ConnectionType": "FTP",
        "Address": address,
        "Username": "svc",
        "Password": "secret",
    })
    .to_string()
}

#[fixture]
pub fn servers() -> Arc<MemoryServers> {
    Arc::new(MemoryServers::default())
}
