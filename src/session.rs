//! Drives the reconciler, the tutor and the chat log from user actions.

use crate::cache::{CHAT_HISTORY_KEY, CacheError, LocalCache};
use crate::config::RemoteSyncConfig;
use crate::model::{ChatMessage, QuizQuestion, SavedWord, WordDetail, mint_local_id};
use crate::quiz::{QUIZ_MIN_WORDS, QuizRound, Scoreboard, pick_target};
use crate::remote::WordStore;
use crate::sync::{Lexicon, SaveOutcome, UploadReport};
use crate::tutor::{Tutor, TutorError};
use thiserror::Error;
use tracing::{info, warn};

pub const WELCOME_MESSAGE: &str = "Hello! 💡 Just type any word you want to master. I'll provide the core nuance and 5 context examples based on EFL principles.";
pub const LOOKUP_FAILED_MESSAGE: &str =
    "Sorry, I had trouble processing that word. Check your connection or API configuration.";

#[derive(Debug)]
pub enum SearchOutcome {
    Found {
        detail: WordDetail,
        save: SaveOutcome,
    },
    /// The tutor failed; an apology was posted and nothing was saved.
    Failed(TutorError),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not reach the remote store; check the URL and key")]
    Unreachable,
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsOutcome {
    pub upload: Option<UploadReport>,
}

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("save at least {need} words to unlock the quiz (have {have})")]
    Locked { have: usize, need: usize },
    #[error("no active question")]
    NoQuestion,
    #[error("question already answered")]
    AlreadyAnswered,
    #[error(transparent)]
    Tutor(#[from] TutorError),
}

pub struct Session<S, T> {
    cache: LocalCache,
    store: S,
    tutor: T,
    lexicon: Lexicon,
    history: Vec<ChatMessage>,
    round: Option<QuizRound>,
    score: Scoreboard,
}

impl<S: WordStore, T: Tutor> Session<S, T> {
    pub async fn start(cache: LocalCache, store: S, tutor: T) -> Self {
        let mut history: Vec<ChatMessage> = cache.load(CHAT_HISTORY_KEY);
        if history.is_empty() {
            history.push(ChatMessage::assistant_text("welcome", WELCOME_MESSAGE));
        }
        let lexicon = Lexicon::start(&store, cache.clone()).await;
        Self {
            cache,
            store,
            tutor,
            lexicon,
            history,
            round: None,
            score: Scoreboard::default(),
        }
    }

    pub fn words(&self) -> &[SavedWord] {
        self.lexicon.words()
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn remote_config(&self) -> &RemoteSyncConfig {
        self.store.config()
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_configured()
    }

    pub fn score(&self) -> Scoreboard {
        self.score
    }

    pub fn current_round(&self) -> Option<&QuizRound> {
        self.round.as_ref()
    }

    /// Looks up a word and saves it. Blank input is ignored.
    pub async fn search(&mut self, query: &str) -> Option<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        let id = self.next_message_id();
        self.push_message(ChatMessage::user_text(id, query));

        match self.tutor.explain(query).await {
            Ok(detail) => {
                let id = self.next_message_id();
                self.push_message(ChatMessage::assistant_word(id, detail.clone()));
                let save = self.lexicon.save_word(&self.store, detail.clone()).await;
                Some(SearchOutcome::Found { detail, save })
            }
            Err(err) => {
                warn!(query, error = %err, "word lookup failed");
                let id = self.next_message_id();
                self.push_message(ChatMessage::assistant_text(id, LOOKUP_FAILED_MESSAGE));
                Some(SearchOutcome::Failed(err))
            }
        }
    }

    /// Re-posts a saved word's card to the chat.
    pub fn open_word(&mut self, id: &str) -> Option<SavedWord> {
        let saved = self.lexicon.get(id)?.clone();
        let message_id = self.next_message_id();
        self.push_message(ChatMessage::assistant_word(message_id, saved.detail.clone()));
        Some(saved)
    }

    pub async fn remove_word(&mut self, id: &str) -> Option<SavedWord> {
        self.lexicon.delete(&self.store, id).await
    }

    pub async fn upload_local_words(&mut self) -> UploadReport {
        self.lexicon.upload_local(&self.store).await
    }

    /// Commits `candidate` only if its connection test succeeds.
    pub async fn apply_settings(
        &mut self,
        candidate: S,
        upload_local: bool,
    ) -> Result<SettingsOutcome, SettingsError> {
        if !candidate.test_connection().await {
            warn!(
                endpoint = %candidate.config().endpoint_url,
                "settings rejected, store unreachable"
            );
            return Err(SettingsError::Unreachable);
        }
        candidate.config().save(&self.cache)?;
        self.store = candidate;
        self.lexicon.refresh_mode(&self.store);
        info!(user_id = %self.store.config().user_id, "remote settings saved");

        let upload = if upload_local && !self.lexicon.is_empty() {
            Some(self.lexicon.upload_local(&self.store).await)
        } else {
            None
        };
        Ok(SettingsOutcome { upload })
    }

    /// Forgets the remote settings and continues local-only.
    pub fn reset_settings(&mut self, local_store: S) -> Result<(), CacheError> {
        RemoteSyncConfig::clear(&self.cache)?;
        self.store = local_store;
        self.lexicon.refresh_mode(&self.store);
        Ok(())
    }

    pub async fn next_question(&mut self) -> Result<&QuizRound, QuizError> {
        let have = self.lexicon.len();
        if have < QUIZ_MIN_WORDS {
            return Err(QuizError::Locked {
                have,
                need: QUIZ_MIN_WORDS,
            });
        }
        let target = pick_target(self.lexicon.words(), &mut rand::thread_rng())
            .map(str::to_string)
            .ok_or(QuizError::NoQuestion)?;
        let question: QuizQuestion = self.tutor.quiz(&target).await?;
        Ok(self.round.insert(QuizRound::new(question)))
    }

    pub fn answer(&mut self, option: &str) -> Result<bool, QuizError> {
        let round = self.round.as_mut().ok_or(QuizError::NoQuestion)?;
        let correct = round.answer(option).ok_or(QuizError::AlreadyAnswered)?;
        self.score.record(correct);
        Ok(correct)
    }

    fn next_message_id(&self) -> String {
        mint_local_id(self.history.iter().map(|message| message.id.as_str()))
    }

    fn push_message(&mut self, message: ChatMessage) {
        self.history.push(message);
        if let Err(err) = self.cache.save(CHAT_HISTORY_KEY, &self.history) {
            warn!(error = %err, "failed to persist chat history");
        }
    }
}
