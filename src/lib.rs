//! Vocabulary notebook that keeps a local word cache reconciled with a
//! remote PostgREST table.

pub mod cache;
pub mod config;
pub mod model;
pub mod quiz;
pub mod remote;
pub mod session;
pub mod sync;
pub mod tutor;
#[cfg(feature = "web")]
pub mod web;

#[cfg(test)]
mod testing;

pub use cache::{CacheError, LocalCache};
pub use config::{RemoteSyncConfig, TutorConfig};
pub use model::{
    ChatMessage, ContextExample, MessageContent, QuizQuestion, Role, SavedWord, WordDetail,
};
pub use remote::{DeleteOutcome, RemoteError, RemoteStore, WordStore};
pub use session::{QuizError, SearchOutcome, Session, SettingsError};
pub use sync::{Authority, Lexicon, SaveOutcome, SyncMode, UploadReport};
pub use tutor::{GeminiClient, Tutor, TutorError};
