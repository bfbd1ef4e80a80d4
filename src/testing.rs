//! In-memory stand-ins for the remote table and the tutor.

use crate::config::RemoteSyncConfig;
use crate::model::{ContextExample, QuizQuestion, SavedWord, WordDetail, now_millis};
use crate::remote::{DeleteOutcome, WordStore};
use crate::tutor::{CATEGORIES, Tutor, TutorError};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const TEST_KEY: &str = "test-anon-key-0123456789abcdef";

pub fn remote_config() -> RemoteSyncConfig {
    RemoteSyncConfig::new("https://example.supabase.co", TEST_KEY, "alice")
}

pub fn detail(word: &str) -> WordDetail {
    WordDetail {
        word: word.to_string(),
        nuance: format!("the feel of {word}"),
        examples: CATEGORIES
            .iter()
            .map(|category| ContextExample {
                category: category.to_string(),
                sentence: format!("A sentence using {word}."),
                explanation: Some("note".to_string()),
            })
            .collect(),
    }
}

#[derive(Default)]
struct Rows {
    /// Newest first, as the table returns them.
    rows: Vec<(String, SavedWord)>,
    next_id: u64,
    deletes: Vec<String>,
    rejected: HashSet<String>,
}

pub struct MemoryStore {
    config: RemoteSyncConfig,
    state: Mutex<Rows>,
    offline: AtomicBool,
    fetches: AtomicUsize,
    upserts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new(config: RemoteSyncConfig) -> Self {
        Self {
            config,
            state: Mutex::new(Rows::default()),
            offline: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn seed(&self, words: &[&str]) {
        let user = self.config.user_id.clone();
        for word in words {
            self.insert_row(&user, detail(word));
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn reject_word(&self, word: &str) {
        self.state.lock().unwrap().rejected.insert(word.to_string());
    }

    pub fn row_count(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn delete_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn fetch_now(&self, user_id: &str) -> Vec<SavedWord> {
        self.state
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, word)| word.clone())
            .collect()
    }

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn insert_row(&self, user_id: &str, detail: WordDetail) -> SavedWord {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("00000000-0000-4000-8000-{:012}", state.next_id);
        let saved = SavedWord::from_remote(detail, id, now_millis() + state.next_id as i64);
        state.rows.insert(0, (user_id.to_string(), saved.clone()));
        saved
    }
}

impl WordStore for MemoryStore {
    fn config(&self) -> &RemoteSyncConfig {
        &self.config
    }

    async fn test_connection(&self) -> bool {
        self.is_configured() && !self.is_offline()
    }

    async fn fetch_all(&self, user_id: &str) -> Vec<SavedWord> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.is_configured() || self.is_offline() {
            return Vec::new();
        }
        self.fetch_now(user_id)
    }

    async fn upsert(&self, word: &WordDetail, user_id: &str) -> Option<SavedWord> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if !self.is_configured() || self.is_offline() {
            return None;
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let existing = {
            let state = self.state.lock().unwrap();
            if state.rejected.contains(&word.word) {
                return None;
            }
            state
                .rows
                .iter()
                // Case-sensitive, like the `word=eq.` filter.
                .find(|(owner, saved)| owner == user_id && saved.word() == word.word)
                .map(|(_, saved)| saved.clone())
        };
        match existing {
            Some(row) => Some(SavedWord::from_remote(word.clone(), row.id, row.saved_at)),
            None => Some(self.insert_row(user_id, word.clone())),
        }
    }

    async fn delete(&self, id: &str) -> DeleteOutcome {
        if !self.is_configured() {
            return DeleteOutcome::NotConfigured;
        }
        let mut state = self.state.lock().unwrap();
        state.deletes.push(id.to_string());
        if self.is_offline() {
            return DeleteOutcome::Failed;
        }
        state.rows.retain(|(_, saved)| saved.id != id);
        DeleteOutcome::Deleted
    }
}

/// Answers from canned details; the word `fail` always errors.
#[derive(Default)]
pub struct ScriptedTutor {
    pub explained: Mutex<Vec<String>>,
    pub quizzed: Mutex<Vec<String>>,
}

impl Tutor for ScriptedTutor {
    async fn explain(&self, word: &str) -> Result<WordDetail, TutorError> {
        self.explained.lock().unwrap().push(word.to_string());
        if word == "fail" {
            return Err(TutorError::Transport("connection reset".to_string()));
        }
        Ok(detail(word))
    }

    async fn quiz(&self, target_word: &str) -> Result<QuizQuestion, TutorError> {
        self.quizzed.lock().unwrap().push(target_word.to_string());
        Ok(QuizQuestion {
            sentence: "Pick the word: ____.".to_string(),
            correct_word: target_word.to_string(),
            options: vec![
                target_word.to_string(),
                "decoy".to_string(),
                "filler".to_string(),
                "other".to_string(),
            ],
        })
    }
}
