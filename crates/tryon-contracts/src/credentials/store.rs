use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::TryOnError;

/// Local key-value store backed by one JSON object file.
///
/// Every read goes to disk, and writes merge into whatever is on disk so a
/// second process sharing the file does not lose its keys.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        read_json_object(&self.path)?
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), TryOnError> {
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        if on_disk.get(key).and_then(Value::as_str) == Some(value) {
            return Ok(());
        }
        on_disk.insert(key.to_string(), Value::String(value.to_string()));
        write_json_object(&self.path, &on_disk)
    }

    pub fn remove(&self, key: &str) -> Result<bool, TryOnError> {
        let Some(mut on_disk) = read_json_object(&self.path) else {
            return Ok(false);
        };
        if on_disk.remove(key).is_none() {
            return Ok(false);
        }
        write_json_object(&self.path, &on_disk)?;
        Ok(true)
    }
}

/// Missing files read as `None`; unparsable ones too, with a warning since
/// the next write replaces them.
fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            warn!(path = %path.display(), "credential store is not a JSON object; ignoring its contents");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), "credential store is not valid JSON, ignoring its contents: {err}");
            None
        }
    }
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> Result<(), TryOnError> {
    let store_err = |err: std::io::Error| TryOnError::Store(format!("{}: {err}", path.display()));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(store_err)?;
    }
    let body = serde_json::to_string_pretty(&Value::Object(payload.clone()))
        .map_err(|err| TryOnError::Store(err.to_string()))?;
    write_private(path, body.as_bytes()).map_err(store_err)
}

/// New files are created owner-only; an existing file is narrowed before
/// the secret is written into it.
#[cfg(unix)]
fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(body)
}

#[cfg(not(unix))]
fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(body)
}
