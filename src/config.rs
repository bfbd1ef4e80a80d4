use crate::cache::{CacheError, LocalCache, REMOTE_KEY_KEY, REMOTE_URL_KEY, REMOTE_USER_KEY};
use reqwest::Url;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_USER_ID: &str = "default_user";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite-latest";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const MIN_KEY_LEN: usize = 20;

/// Connection settings for the remote word table.
///
/// Built once and handed to the store client; changing settings means
/// building a new client.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RemoteSyncConfig {
    pub endpoint_url: String,
    pub api_key: String,
    pub user_id: String,
}

impl RemoteSyncConfig {
    pub fn new(
        endpoint_url: impl AsRef<str>,
        api_key: impl AsRef<str>,
        user_id: impl AsRef<str>,
    ) -> Self {
        let user_id = user_id.as_ref().trim();
        Self {
            endpoint_url: endpoint_url.as_ref().trim().trim_end_matches('/').to_string(),
            api_key: api_key.as_ref().trim().to_string(),
            user_id: if user_id.is_empty() {
                DEFAULT_USER_ID.to_string()
            } else {
                user_id.to_string()
            },
        }
    }

    /// True when the endpoint is an http(s) URL and the key is long enough
    /// to plausibly be real. Nothing touches the network unless this holds.
    pub fn is_configured(&self) -> bool {
        let scheme_ok = Url::parse(&self.endpoint_url)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .unwrap_or(false);
        scheme_ok && self.api_key.len() > MIN_KEY_LEN
    }

    pub fn load(cache: &LocalCache) -> Self {
        let url: String = cache.load(REMOTE_URL_KEY);
        let key: String = cache.load(REMOTE_KEY_KEY);
        let user: String = cache.load(REMOTE_USER_KEY);
        Self::new(url, key, user)
    }

    pub fn save(&self, cache: &LocalCache) -> Result<(), CacheError> {
        cache.save(REMOTE_URL_KEY, &self.endpoint_url)?;
        cache.save(REMOTE_KEY_KEY, &self.api_key)?;
        cache.save(REMOTE_USER_KEY, &self.user_id)?;
        Ok(())
    }

    pub fn clear(cache: &LocalCache) -> Result<(), CacheError> {
        cache.remove(REMOTE_URL_KEY)?;
        cache.remove(REMOTE_KEY_KEY)?;
        cache.remove(REMOTE_USER_KEY)?;
        Ok(())
    }

    pub fn masked_key(&self) -> String {
        mask(&self.api_key)
    }
}

impl fmt::Debug for RemoteSyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSyncConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("api_key", &self.masked_key())
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Settings for the Gemini-backed tutor.
#[derive(Clone)]
pub struct TutorConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }
}

impl fmt::Debug for TutorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TutorConfig")
            .field("api_key", &self.api_key.as_deref().map(mask))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Resolves where the local cache lives when no explicit directory is given.
pub fn default_data_dir() -> PathBuf {
    if let Some(base) = dirs::data_dir() {
        return base.join("lexiai");
    }
    PathBuf::from(".lexiai")
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("…{tail}")
}
