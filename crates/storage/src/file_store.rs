use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};
use snafu::ResultExt;

use super::KeyValueStore;
use super::error::{
    CreateStoreDirectorySnafu, ParseStoreFileSnafu, ReadStoreFileSnafu, RenameTempFileSnafu,
    SerializeStoreSnafu, StorageResult, WriteStoreFileSnafu,
};

pub const STORE_DIRECTORY_NAME: &str = "econ-chat";
pub const STORE_FILE_NAME: &str = "session.json";

/// Key-value store backed by a single JSON object file.
///
/// Every write rewrites the whole object through a temporary sibling file followed by a
/// rename, so a crash mid-write leaves the previous contents intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn default_store_dir() -> PathBuf {
        dirs::data_dir()
            .map(|path| path.join(STORE_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".econ-chat"))
    }

    pub fn default_store_path() -> PathBuf {
        Self::default_store_dir().join(STORE_FILE_NAME)
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Self {
        Self::new(Self::default_store_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_object(&self) -> StorageResult<Option<Map<String, Value>>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error).context(ReadStoreFileSnafu {
                    stage: "read-store-file",
                    path: self.path.clone(),
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(Some(Map::new()));
        }

        let object = serde_json::from_str::<Map<String, Value>>(&content).context(
            ParseStoreFileSnafu {
                stage: "parse-store-file",
                path: self.path.clone(),
            },
        )?;
        Ok(Some(object))
    }

    fn write_object(&self, object: &Map<String, Value>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateStoreDirectorySnafu {
                stage: "create-store-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(object).context(SerializeStoreSnafu {
            stage: "serialize-store-json",
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteStoreFileSnafu {
            stage: "write-temporary-store-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.path).context(RenameTempFileSnafu {
            stage: "rename-temporary-store-file",
            from: temp_path,
            to: self.path.clone(),
        })?;

        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let Some(object) = self.read_object()? else {
            return Ok(None);
        };

        Ok(object
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut object = match self.read_object() {
            Ok(object) => object.unwrap_or_default(),
            Err(error @ super::StorageError::ParseStoreFile { .. }) => {
                tracing::warn!(
                    path = ?self.path,
                    %error,
                    "replacing unreadable store file contents"
                );
                Map::new()
            }
            Err(error) => return Err(error),
        };

        object.insert(key.to_string(), Value::String(value.to_string()));
        self.write_object(&object)?;
        tracing::debug!(path = ?self.path, key, "persisted store entry");
        Ok(())
    }
}

/// Process-local store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
