//! Durable key-value state owned by one job.
//!
//! Each job gets its own namespace, persisted as a single JSON object at
//! `<state dir>/<job id>.json`. Values are replaced wholesale on `set`.

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Read `key` and deserialize it. A value of the wrong shape is logged and treated as absent.
pub fn load<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    let Some(value) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            tracing::warn!("Ignoring unreadable state under {:?}: {}", key, e);
            Ok(None)
        }
    }
}

pub fn save<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)
        .with_context(|| format!("Failed to serialize state for {:?}", key))?;
    store.set(key, value)
}

// =============================================================================
// File-backed store
// =============================================================================

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `job_id` inside `dir`
    pub fn for_job(dir: &Path, job_id: &str) -> Self {
        Self::new(dir.join(format!("{}.json", job_id)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn open_lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .with_context(|| format!("Failed to open lock for {}", self.path.display()))
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let mut content = String::new();
        File::open(&self.path)?.read_to_string(&mut content)?;

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state from {}", self.path.display()))
    }

    /// Write to a temp file and rename over the target so readers never see a torn file.
    fn write_all(&self, map: &Map<String, Value>) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(map)?;
        {
            let mut writer = std::io::BufWriter::new(File::create(&tmp)?);
            writer.write_all(content.as_bytes())?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to write state to {}", self.path.display()))?;
        Ok(())
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let result = self.read_all();
        lock.unlock()?;
        Ok(result?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;
        let result = self.read_all().and_then(|mut map| {
            map.insert(key.to_string(), value);
            self.write_all(&map)
        });
        lock.unlock()?;
        result
    }
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}
