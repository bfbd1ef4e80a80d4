//! Reconciles the in-memory word collection with the local cache and the
//! remote table.
//!
//! The collection is kept newest-first and never holds two entries whose
//! words match case-insensitively. Every change is mirrored to the cache,
//! whether or not a remote store is configured.
//!
//! Startup cannot tell a failed remote fetch from an empty remote table:
//! both fall back to the cached collection.

use crate::cache::{LocalCache, SAVED_WORDS_KEY};
use crate::model::{SavedWord, WordDetail, mint_local_id, now_millis};
use crate::remote::WordStore;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Unconfigured,
    Syncing,
    CloudAuthoritative,
}

/// Where the current collection was last taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    LocalCache,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Persisted remotely and merged into the collection.
    Remote(SavedWord),
    /// Remote unavailable or unconfigured; saved to the cache only.
    Local(SavedWord),
    /// Local fallback found the word already present and left it alone.
    Duplicate,
}

impl SaveOutcome {
    pub fn saved(&self) -> Option<&SavedWord> {
        match self {
            SaveOutcome::Remote(word) | SaveOutcome::Local(word) => Some(word),
            SaveOutcome::Duplicate => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub attempted: usize,
    pub uploaded: usize,
    /// Size of the collection after the post-upload fetch, when one ran.
    pub remote_total: Option<usize>,
}

pub struct Lexicon {
    cache: LocalCache,
    words: Vec<SavedWord>,
    mode: SyncMode,
    authority: Authority,
}

impl Lexicon {
    /// Loads the collection: remote when configured and non-empty,
    /// otherwise the local cache.
    pub async fn start<S: WordStore>(store: &S, cache: LocalCache) -> Self {
        let mut lexicon = Self {
            cache,
            words: Vec::new(),
            mode: SyncMode::Unconfigured,
            authority: Authority::LocalCache,
        };

        if store.is_configured() {
            let remote = store.fetch_all(&store.config().user_id).await;
            if !remote.is_empty() {
                info!(count = remote.len(), "using remote words");
                lexicon.replace(remote, Authority::Remote);
                lexicon.refresh_mode(store);
                return lexicon;
            }
            debug!("remote returned no words, falling back to local cache");
        }

        let cached: Vec<SavedWord> = lexicon.cache.load(SAVED_WORDS_KEY);
        info!(count = cached.len(), "using cached words");
        lexicon.replace(cached, Authority::LocalCache);
        lexicon.refresh_mode(store);
        lexicon
    }

    pub fn words(&self) -> &[SavedWord] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SavedWord> {
        self.words.iter().find(|word| word.id == id)
    }

    pub fn find_word(&self, word: &str) -> Option<&SavedWord> {
        self.words.iter().find(|saved| saved.matches(word))
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    /// Re-derives the mode from the store's configuration and the authority
    /// of the current collection. A configured store whose collection still
    /// comes from the cache is `Syncing` until the remote becomes authoritative.
    pub fn refresh_mode<S: WordStore>(&mut self, store: &S) {
        self.mode = if !store.is_configured() {
            SyncMode::Unconfigured
        } else if self.authority == Authority::Remote {
            SyncMode::CloudAuthoritative
        } else {
            SyncMode::Syncing
        };
    }

    pub async fn save_word<S: WordStore>(
        &mut self,
        store: &S,
        mut detail: WordDetail,
    ) -> SaveOutcome {
        if store.is_configured() {
            // The remote lookup is case-sensitive; reuse the stored spelling
            // so a case variant updates the existing row.
            if let Some(existing) = self.find_word(&detail.word) {
                detail.word = existing.word().to_string();
            }
            if let Some(saved) = store.upsert(&detail, &store.config().user_id).await {
                self.words.retain(|word| !word.matches(&detail.word));
                self.words.insert(0, saved.clone());
                self.persist();
                return SaveOutcome::Remote(saved);
            }
            warn!(word = %detail.word, "remote save failed, keeping word locally");
        }
        self.save_local_only(detail)
    }

    fn save_local_only(&mut self, detail: WordDetail) -> SaveOutcome {
        if self.find_word(&detail.word).is_some() {
            debug!(word = %detail.word, "word already saved");
            return SaveOutcome::Duplicate;
        }
        let id = mint_local_id(self.words.iter().map(|word| word.id.as_str()));
        let saved = SavedWord::new(detail, id, now_millis());
        self.words.insert(0, saved.clone());
        self.persist();
        SaveOutcome::Local(saved)
    }

    /// Removes the word from memory regardless of what the remote says.
    /// Only words that came from the remote table are deleted there.
    pub async fn delete<S: WordStore>(&mut self, store: &S, id: &str) -> Option<SavedWord> {
        let remote = self.get(id).is_some_and(|word| word.remote);
        if remote && store.is_configured() {
            let outcome = store.delete(id).await;
            debug!(id, ?outcome, "remote delete");
        }
        let removed = self
            .words
            .iter()
            .position(|word| word.id == id)
            .map(|index| self.words.remove(index));
        self.persist();
        removed
    }

    /// Pushes every word in the collection to the remote one at a time, then
    /// adopts whatever the remote holds afterwards.
    pub async fn upload_local<S: WordStore>(&mut self, store: &S) -> UploadReport {
        if !store.is_configured() || self.words.is_empty() {
            return UploadReport::default();
        }
        let user_id = store.config().user_id.clone();
        let pending = self.words.clone();
        let mut uploaded = 0;
        for word in &pending {
            if store.upsert(&word.detail, &user_id).await.is_some() {
                uploaded += 1;
            }
        }
        let fresh = store.fetch_all(&user_id).await;
        info!(
            attempted = pending.len(),
            uploaded,
            remote = fresh.len(),
            "bulk upload finished"
        );
        self.replace(fresh, Authority::Remote);
        self.refresh_mode(store);
        UploadReport {
            attempted: pending.len(),
            uploaded,
            remote_total: Some(self.words.len()),
        }
    }

    fn replace(&mut self, words: Vec<SavedWord>, authority: Authority) {
        self.words = dedup_words(words);
        self.authority = authority;
        self.persist();
    }

    fn persist(&self) {
        if let Err(err) = self.cache.save(SAVED_WORDS_KEY, &self.words) {
            warn!(error = %err, "failed to mirror words to local cache");
        }
    }
}

/// Keeps the first entry for each case-insensitive word.
pub fn dedup_words(words: Vec<SavedWord>) -> Vec<SavedWord> {
    let mut kept: Vec<SavedWord> = Vec::with_capacity(words.len());
    for word in words {
        if !kept.iter().any(|existing| existing.matches(word.word())) {
            kept.push(word);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteSyncConfig;
    use crate::testing::{MemoryStore, detail, remote_config};
    use tempfile::TempDir;

    fn cached(dir: &TempDir) -> Vec<SavedWord> {
        LocalCache::new(dir.path()).load(SAVED_WORDS_KEY)
    }

    fn seed_cache(dir: &TempDir, words: &[&str]) {
        let saved: Vec<SavedWord> = words
            .iter()
            .enumerate()
            .map(|(i, word)| SavedWord::new(detail(word), (1_000 + i).to_string(), 1_000))
            .collect();
        LocalCache::new(dir.path()).save(SAVED_WORDS_KEY, &saved).unwrap();
    }

    #[tokio::test]
    async fn unconfigured_start_loads_cache() {
        let dir = TempDir::new().unwrap();
        seed_cache(&dir, &["ephemeral"]);
        let store = MemoryStore::new(RemoteSyncConfig::default());

        let lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;
        assert_eq!(lexicon.mode(), SyncMode::Unconfigured);
        assert_eq!(lexicon.authority(), Authority::LocalCache);
        assert_eq!(lexicon.words()[0].word(), "ephemeral");
        assert_eq!(store.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn non_empty_remote_wins_over_cache() {
        let dir = TempDir::new().unwrap();
        seed_cache(&dir, &["stale"]);
        let store = MemoryStore::new(remote_config());
        store.seed(&["lucid", "stoic"]);

        let lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;
        assert_eq!(lexicon.authority(), Authority::Remote);
        assert_eq!(lexicon.mode(), SyncMode::CloudAuthoritative);
        let words: Vec<_> = lexicon.words().iter().map(|w| w.word().to_string()).collect();
        assert_eq!(words, vec!["stoic", "lucid"]);
        assert!(lexicon.find_word("stale").is_none());
        assert_eq!(cached(&dir).len(), 2);
    }

    #[tokio::test]
    async fn empty_or_failing_remote_falls_back_to_cache() {
        let dir = TempDir::new().unwrap();
        seed_cache(&dir, &["ephemeral"]);

        let empty = MemoryStore::new(remote_config());
        let lexicon = Lexicon::start(&empty, LocalCache::new(dir.path())).await;
        assert_eq!(lexicon.authority(), Authority::LocalCache);
        assert_eq!(lexicon.words()[0].word(), "ephemeral");
        assert_eq!(lexicon.mode(), SyncMode::Syncing);

        let failing = MemoryStore::new(remote_config());
        failing.seed(&["lucid"]);
        failing.set_offline(true);
        let lexicon = Lexicon::start(&failing, LocalCache::new(dir.path())).await;
        assert_eq!(lexicon.words().len(), 1);
        assert_eq!(lexicon.words()[0].word(), "ephemeral");
        assert_eq!(lexicon.mode(), SyncMode::Syncing);
    }

    #[tokio::test]
    async fn remote_save_replaces_case_insensitive_match() {
        let dir = TempDir::new().unwrap();
        seed_cache(&dir, &["Lucid", "stoic"]);
        let store = MemoryStore::new(remote_config());
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;

        let outcome = lexicon.save_word(&store, detail("lucid")).await;
        let saved = outcome.saved().cloned().unwrap();
        assert!(matches!(outcome, SaveOutcome::Remote(_)));
        assert!(saved.remote);
        assert_eq!(lexicon.len(), 2);
        assert_eq!(lexicon.words()[0].id, saved.id);
        assert_eq!(cached(&dir)[0].id, saved.id);
    }

    #[tokio::test]
    async fn saving_existing_remote_word_returns_its_identity() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(remote_config());
        store.seed(&["ephemeral"]);
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;
        let original_id = lexicon.words()[0].id.clone();

        let outcome = lexicon.save_word(&store, detail("ephemeral")).await;
        assert_eq!(outcome.saved().unwrap().id, original_id);
        assert_eq!(store.row_count(), 1);
        assert_eq!(lexicon.len(), 1);
    }

    #[tokio::test]
    async fn case_variant_save_reuses_remote_row() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(remote_config());
        store.seed(&["ephemeral"]);
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;
        let original_id = lexicon.words()[0].id.clone();

        let outcome = lexicon.save_word(&store, detail("Ephemeral")).await;
        let saved = outcome.saved().cloned().unwrap();
        assert!(matches!(outcome, SaveOutcome::Remote(_)));
        assert_eq!(saved.id, original_id);
        assert_eq!(saved.word(), "ephemeral");
        assert_eq!(store.row_count(), 1);
        assert_eq!(lexicon.len(), 1);
        assert_eq!(cached(&dir).len(), 1);
    }

    #[tokio::test]
    async fn remote_save_keeps_syncing_until_remote_is_authoritative() {
        let dir = TempDir::new().unwrap();
        seed_cache(&dir, &["stoic"]);
        let store = MemoryStore::new(remote_config());
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;
        assert_eq!(lexicon.mode(), SyncMode::Syncing);

        lexicon.save_word(&store, detail("lucid")).await;
        assert_eq!(lexicon.authority(), Authority::LocalCache);
        assert_eq!(lexicon.mode(), SyncMode::Syncing);
    }

    #[tokio::test]
    async fn remote_failure_falls_back_to_local_and_skips_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(remote_config());
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;
        store.set_offline(true);

        let first = lexicon.save_word(&store, detail("ephemeral")).await;
        let local = first.saved().cloned().unwrap();
        assert!(matches!(first, SaveOutcome::Local(_)));
        assert!(!local.remote);

        let again = lexicon.save_word(&store, detail("EPHEMERAL")).await;
        assert_eq!(again, SaveOutcome::Duplicate);
        assert_eq!(lexicon.len(), 1);
        assert_eq!(cached(&dir).len(), 1);
    }

    #[tokio::test]
    async fn local_saves_mint_distinct_ids() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(RemoteSyncConfig::default());
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;
        lexicon.save_word(&store, detail("lucid")).await;
        lexicon.save_word(&store, detail("stoic")).await;
        assert_ne!(lexicon.words()[0].id, lexicon.words()[1].id);
        assert_eq!(store.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn delete_is_local_even_when_remote_fails() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(remote_config());
        store.seed(&["lucid"]);
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;
        let id = lexicon.words()[0].id.clone();

        store.set_offline(true);
        let removed = lexicon.delete(&store, &id).await;
        assert_eq!(removed.map(|w| w.id), Some(id.clone()));
        assert!(lexicon.is_empty());
        assert!(cached(&dir).is_empty());
        assert_eq!(store.delete_requests(), vec![id]);
    }

    #[tokio::test]
    async fn delete_of_local_id_never_reaches_remote() {
        let dir = TempDir::new().unwrap();
        seed_cache(&dir, &["ephemeral"]);
        let store = MemoryStore::new(remote_config());
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;
        let id = lexicon.words()[0].id.clone();

        lexicon.delete(&store, &id).await;
        assert!(lexicon.is_empty());
        assert!(store.delete_requests().is_empty());
    }

    #[tokio::test]
    async fn delete_of_numeric_remote_id_reaches_remote() {
        let dir = TempDir::new().unwrap();
        let row = SavedWord::from_remote(detail("lucid"), "17", 1_000);
        LocalCache::new(dir.path()).save(SAVED_WORDS_KEY, &[row]).unwrap();
        let store = MemoryStore::new(remote_config());
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;

        let removed = lexicon.delete(&store, "17").await;
        assert_eq!(removed.map(|w| w.id), Some("17".to_string()));
        assert_eq!(store.delete_requests(), vec!["17".to_string()]);
    }

    #[tokio::test]
    async fn bulk_upload_adopts_remote_collection() {
        let dir = TempDir::new().unwrap();
        seed_cache(&dir, &["ephemeral", "lucid", "stoic"]);
        let store = MemoryStore::new(remote_config());
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;

        let report = lexicon.upload_local(&store).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.uploaded, 3);
        assert_eq!(report.remote_total, Some(3));
        assert_eq!(lexicon.authority(), Authority::Remote);
        assert_eq!(lexicon.words(), store.fetch_now("alice").as_slice());
        assert!(lexicon.words().iter().all(|w| w.remote));
        assert_eq!(lexicon.mode(), SyncMode::CloudAuthoritative);
        assert_eq!(store.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn bulk_upload_drops_words_that_failed_to_upload() {
        let dir = TempDir::new().unwrap();
        seed_cache(&dir, &["ephemeral", "lucid"]);
        let store = MemoryStore::new(remote_config());
        store.reject_word("lucid");
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;

        let report = lexicon.upload_local(&store).await;
        assert_eq!(report.uploaded, 1);
        assert_eq!(lexicon.len(), 1);
        assert_eq!(lexicon.words()[0].word(), "ephemeral");
    }

    #[tokio::test]
    async fn bulk_upload_is_a_no_op_when_unconfigured() {
        let dir = TempDir::new().unwrap();
        seed_cache(&dir, &["ephemeral"]);
        let store = MemoryStore::new(RemoteSyncConfig::default());
        let mut lexicon = Lexicon::start(&store, LocalCache::new(dir.path())).await;
        assert_eq!(lexicon.upload_local(&store).await, UploadReport::default());
        assert_eq!(lexicon.len(), 1);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let words = vec![
            SavedWord::new(detail("Lucid"), "a-1", 3),
            SavedWord::new(detail("lucid"), "a-2", 2),
            SavedWord::new(detail("stoic"), "a-3", 1),
        ];
        let kept = dedup_words(words);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, "a-1");
    }
}
