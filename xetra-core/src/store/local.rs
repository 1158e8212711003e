//! Directory-backed object store.
//!
//! Layout: `{root}/{key}`, where `/` in a key becomes a directory separator.
//! Writes are atomic (write to `.tmp`, rename into place).

use super::{ObjectStore, StoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key to a path under the root, rejecting traversal.
    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if key.is_empty() {
        return Err(invalid("key must not be empty"));
    }
    if key.contains('\\') {
        return Err(invalid("key must use '/' separators"));
    }
    if Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(invalid("key must be a relative path without '.' or '..'"));
    }
    Ok(())
}

fn io_err(key: &str, source: std::io::Error) -> StoreError {
    StoreError::Io {
        key: key.to_string(),
        source,
    }
}

/// Collect every file under `dir` as a `/`-joined key relative to `root`.
fn collect_keys(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| io_err(&dir.to_string_lossy(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(&dir.to_string_lossy(), e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| io_err(&path.to_string_lossy(), e))?;
        if file_type.is_dir() {
            collect_keys(root, &path, out)?;
        } else if file_type.is_file() {
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            // In-flight atomic writes are not objects yet
            if !key.ends_with(TMP_SUFFIX) {
                out.push(key);
            }
        }
    }
    Ok(())
}

impl ObjectStore for LocalStore {
    fn location(&self) -> String {
        format!("file://{}", self.root.display())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        collect_keys(&self.root, &self.root, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(key)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound {
                key: key.to_string(),
            },
            _ => io_err(key, e),
        })
    }

    fn put(&self, key: &str, body: &[u8]) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(key, e))?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(TMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, body).map_err(|e| io_err(key, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_err(key, e)
        })
    }
}
