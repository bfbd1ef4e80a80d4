use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One categorized usage sentence for a word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextExample {
    pub category: String,
    pub sentence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Structured explanation of a word: its nuance plus categorized examples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordDetail {
    pub word: String,
    pub nuance: String,
    pub examples: Vec<ContextExample>,
}

/// A word that has been persisted locally or remotely.
///
/// Local ids are decimal millisecond timestamps; remote ids are whatever the
/// table assigns. `remote` records which of the two the id came from, so a
/// numeric table key is never mistaken for a local one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedWord {
    #[serde(flatten)]
    pub detail: WordDetail,
    pub id: String,
    pub saved_at: i64,
    #[serde(default)]
    pub remote: bool,
}

impl SavedWord {
    /// A word known only to the local cache.
    pub fn new(detail: WordDetail, id: impl Into<String>, saved_at: i64) -> Self {
        Self {
            detail,
            id: id.into(),
            saved_at,
            remote: false,
        }
    }

    /// A word backed by a row in the remote table.
    pub fn from_remote(detail: WordDetail, id: impl Into<String>, saved_at: i64) -> Self {
        Self {
            remote: true,
            ..Self::new(detail, id, saved_at)
        }
    }

    pub fn word(&self) -> &str {
        &self.detail.word
    }

    pub fn nuance(&self) -> &str {
        &self.detail.nuance
    }

    pub fn matches(&self, word: &str) -> bool {
        same_word(&self.detail.word, word)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Chat bubbles hold either plain text or a full word card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Word(WordDetail),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn user_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, MessageContent::Text(text.into()))
    }

    pub fn assistant_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, MessageContent::Text(text.into()))
    }

    pub fn assistant_word(id: impl Into<String>, detail: WordDetail) -> Self {
        Self::new(id, Role::Assistant, MessageContent::Word(detail))
    }

    fn new(id: impl Into<String>, role: Role, content: MessageContent) -> Self {
        Self {
            id: id.into(),
            role,
            content,
            timestamp: now_millis(),
        }
    }
}

/// Fill-in-the-blank question built around one saved word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub sentence: String,
    pub correct_word: String,
    pub options: Vec<String>,
}

/// Word identity is case-insensitive.
pub fn same_word(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// Mints a millisecond-timestamp id that is not already taken.
pub fn mint_local_id<'a, I>(taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: Vec<&str> = taken.into_iter().collect();
    let mut candidate = now_millis();
    while taken.contains(&candidate.to_string().as_str()) {
        candidate += 1;
    }
    candidate.to_string()
}
