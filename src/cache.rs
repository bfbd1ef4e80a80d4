use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::warn;

pub const CHAT_HISTORY_KEY: &str = "efl_chat_history";
pub const SAVED_WORDS_KEY: &str = "efl_lexicon_saved";
pub const REMOTE_URL_KEY: &str = "supabase_url";
pub const REMOTE_KEY_KEY: &str = "supabase_key";
pub const REMOTE_USER_KEY: &str = "supabase_user_id";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Directory-backed key/value store, one JSON file per key.
///
/// Reads never fail: absent or corrupt entries come back as the default
/// value. Writes go through a temp file so a crash never leaves half a file.
#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load<T>(&self, key: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        self.load_opt(key).unwrap_or_default()
    }

    pub fn load_opt<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let path = self.path_for(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(key, error = %err, "failed to read cache entry");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "ignoring malformed cache entry");
                None
            }
        }
    }

    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let io_err = |source| CacheError::Io {
            key: key.to_string(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(io_err)?;
        let bytes = serde_json::to_vec(value).map_err(|source| CacheError::Serialize {
            key: key.to_string(),
            source,
        })?;
        let temp_file = NamedTempFile::new_in(&self.root).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(&temp_file);
            writer.write_all(&bytes).map_err(io_err)?;
            writer.flush().map_err(io_err)?;
        }
        temp_file
            .persist(self.path_for(key))
            .map_err(|err| io_err(err.error))?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}
