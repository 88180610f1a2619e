//! Key/value backends behind the durable and ephemeral flag stores.
//!
//! Writes are applied as batches so a multi-key update lands together or not
//! at all. The file backend persists each batch with a temp-file + rename,
//! keeping the previous file as a `.bak` copy for recovery.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const FILE_STORE_SCHEMA_VERSION: u32 = 1;

static TEMP_SUFFIX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One mutation inside a write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Set { key: String, value: String },
    Remove { key: String },
    Clear,
}

impl StoreOp {
    pub fn set(key: &str, value: impl Into<String>) -> Self {
        Self::Set {
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn remove(key: &str) -> Self {
        Self::Remove {
            key: key.to_string(),
        }
    }
}

/// A string key/value medium.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    /// Apply every op in order. On error no op is visible.
    fn apply(&mut self, ops: &[StoreOp]) -> Result<(), StoreError>;
}

fn apply_ops(entries: &mut BTreeMap<String, String>, ops: &[StoreOp]) {
    for op in ops {
        match op {
            StoreOp::Set { key, value } => {
                entries.insert(key.clone(), value.clone());
            }
            StoreOp::Remove { key } => {
                entries.remove(key);
            }
            StoreOp::Clear => entries.clear(),
        }
    }
}

/// Process-lifetime store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn apply(&mut self, ops: &[StoreOp]) -> Result<(), StoreError> {
        apply_ops(&mut self.entries, ops);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoverySource {
    #[default]
    None,
    Primary,
    Backup,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    schema_version: u32,
    entries: BTreeMap<String, String>,
}

/// JSON file store that survives process restarts.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    source: RecoverySource,
    warnings: Vec<String>,
}

impl FileStore {
    /// Open the store at `path`, recovering from the backup when the primary
    /// file is unreadable. A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut warnings = Vec::new();

        if let Some(entries) = try_load(&path, "primary store", &mut warnings) {
            return Self {
                path,
                entries,
                source: RecoverySource::Primary,
                warnings,
            };
        }

        let backup = backup_path(&path);
        if let Some(entries) = try_load(&backup, "backup store", &mut warnings) {
            warnings.push("recovered flags from backup store".to_owned());
            tracing::warn!(path = %path.display(), "recovered durable flags from backup");
            return Self {
                path,
                entries,
                source: RecoverySource::Backup,
                warnings,
            };
        }

        Self {
            path,
            entries: BTreeMap::new(),
            source: RecoverySource::None,
            warnings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn recovery_source(&self) -> RecoverySource {
        self.source
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let file = StoreFile {
            schema_version: FILE_STORE_SCHEMA_VERSION,
            entries: entries.clone(),
        };
        let serialized = serde_json::to_string_pretty(&file).map_err(|err| StoreError::Encode {
            message: err.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }

        if self.path.exists() {
            let backup = backup_path(&self.path);
            fs::copy(&self.path, &backup).map_err(|source| io_error(&backup, source))?;
        }

        let temp = temp_path(&self.path);
        write_file_synced(&temp, serialized.as_bytes())?;
        if let Err(source) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(io_error(&self.path, source));
        }

        sync_parent_dir(&self.path);
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn apply(&mut self, ops: &[StoreOp]) -> Result<(), StoreError> {
        let mut next = self.entries.clone();
        apply_ops(&mut next, ops);
        self.persist(&next)?;
        self.entries = next;
        self.source = RecoverySource::Primary;
        Ok(())
    }
}

fn try_load(
    path: &Path,
    label: &str,
    warnings: &mut Vec<String>,
) -> Option<BTreeMap<String, String>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return None,
        Err(err) => {
            warnings.push(format!("{label} unreadable; ignored ({err})"));
            return None;
        }
    };

    match serde_json::from_str::<StoreFile>(&raw) {
        Ok(file) if file.schema_version == FILE_STORE_SCHEMA_VERSION => Some(file.entries),
        Ok(file) => {
            warnings.push(format!(
                "{label} has unsupported schema version {}; ignored",
                file.schema_version
            ));
            None
        }
        Err(err) => {
            warnings.push(format!("{label} invalid; ignored ({err})"));
            None
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn write_file_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .map_err(|source| io_error(path, source))?;
    file.write_all(bytes)
        .map_err(|source| io_error(path, source))?;
    file.sync_all().map_err(|source| io_error(path, source))?;
    Ok(())
}

fn backup_path(path: &Path) -> PathBuf {
    path_with_suffix(path, ".bak")
}

fn temp_path(path: &Path) -> PathBuf {
    let pid = std::process::id();
    let suffix = TEMP_SUFFIX_COUNTER.fetch_add(1, Ordering::Relaxed);
    path_with_suffix(path, &format!(".tmp-{pid}-{suffix}"))
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) else {
        return;
    };
    if let Ok(dir) = OpenOptions::new().read(true).open(parent) {
        let _ = dir.sync_all();
    }
}
