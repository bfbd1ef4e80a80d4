//! Language-model collaborator: word explanations and quiz questions.
//!
//! Unlike the remote store, failures here propagate. The session turns them
//! into a user-facing apology and persists nothing.

use crate::config::TutorConfig;
use crate::model::{QuizQuestion, WordDetail, same_word};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

pub const CATEGORIES: [&str; 5] = [
    "Daily Conversation",
    "Business/Professional",
    "Abstract Emotion/Thought",
    "Science/Nature",
    "History/Culture",
];

pub const SYSTEM_INSTRUCTION: &str = "You are a world-class EFL (English as a Foreign Language) specialist.
Your goal is to help learners internalize vocabulary through nuances and varied contexts rather than rote definitions.

When a user provides a word:
1. DO NOT provide a standard dictionary definition.
2. NUANCE: Explain the core 'feeling' or 'essence' of the word concisely in Korean.
3. MULTI-CONTEXT EXAMPLES: Provide exactly 5 sentences, one for each of these categories:
   - Daily Conversation
   - Business/Professional
   - Abstract Emotion/Thought
   - Science/Nature
   - History/Culture
For each example, provide the English sentence first, then a brief Korean translation/context note.

Always respond in a structured JSON format.";

#[derive(Debug, Error)]
pub enum TutorError {
    #[error("no Gemini API key configured")]
    NotConfigured,

    #[error("word is empty")]
    EmptyWord,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("Gemini API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed model output: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TutorError {
    fn from(err: reqwest::Error) -> Self {
        TutorError::Transport(err.to_string())
    }
}

pub trait Tutor: Send + Sync {
    fn explain(&self, word: &str) -> impl Future<Output = Result<WordDetail, TutorError>> + Send;

    fn quiz(
        &self,
        target_word: &str,
    ) -> impl Future<Output = Result<QuizQuestion, TutorError>> + Send;
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: TutorConfig,
}

impl GeminiClient {
    pub fn new(config: TutorConfig) -> Result<Self, TutorError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("lexiai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TutorError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn generate(&self, body: Value) -> Result<String, TutorError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(TutorError::NotConfigured)?;
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(%status, "Gemini request failed");
            return Err(TutorError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| TutorError::Malformed(format!("response envelope: {e}")))?;
        Ok(parsed.first_text().unwrap_or_default())
    }
}

impl Tutor for GeminiClient {
    async fn explain(&self, word: &str) -> Result<WordDetail, TutorError> {
        let word = word.trim();
        if word.is_empty() {
            return Err(TutorError::EmptyWord);
        }
        let body = json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("Please explain the word: \"{word}\" according to the EFL principles.") }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": word_detail_schema(),
            }
        });
        debug!(word, model = %self.config.model, "requesting word explanation");
        let text = self.generate(body).await?;
        parse_word_detail(&text)
    }

    async fn quiz(&self, target_word: &str) -> Result<QuizQuestion, TutorError> {
        let target_word = target_word.trim();
        if target_word.is_empty() {
            return Err(TutorError::EmptyWord);
        }
        let prompt = format!(
            "Generate a fill-in-the-blank quiz question for the word: \"{target_word}\".\n\
             The sentence should be clear enough for an EFL learner to guess the word.\n\
             Provide 4 options including the correct word."
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": quiz_schema(),
            }
        });
        debug!(target_word, "requesting quiz question");
        let text = self.generate(body).await?;
        parse_quiz_question(&text)
    }
}

/// Removes markdown code fences the model sometimes wraps JSON in.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json\n", "")
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

pub fn parse_word_detail(text: &str) -> Result<WordDetail, TutorError> {
    let cleaned = non_empty_json(text);
    serde_json::from_str(&cleaned).map_err(|e| TutorError::Malformed(e.to_string()))
}

pub fn parse_quiz_question(text: &str) -> Result<QuizQuestion, TutorError> {
    let cleaned = non_empty_json(text);
    let question: QuizQuestion =
        serde_json::from_str(&cleaned).map_err(|e| TutorError::Malformed(e.to_string()))?;
    let blanks = count_blanks(&question.sentence);
    if blanks != 1 {
        return Err(TutorError::Malformed(format!(
            "expected one blank in quiz sentence, found {blanks}"
        )));
    }
    if !question
        .options
        .iter()
        .any(|option| same_word(option, &question.correct_word))
    {
        return Err(TutorError::Malformed(
            "quiz options do not include the correct word".to_string(),
        ));
    }
    Ok(question)
}

/// Counts runs of two or more underscores.
pub fn count_blanks(sentence: &str) -> usize {
    let mut blanks = 0;
    let mut run = 0;
    for ch in sentence.chars().chain(std::iter::once(' ')) {
        if ch == '_' {
            run += 1;
            continue;
        }
        if run >= 2 {
            blanks += 1;
        }
        run = 0;
    }
    blanks
}

fn non_empty_json(text: &str) -> String {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        "{}".to_string()
    } else {
        cleaned
    }
}

fn word_detail_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "word": { "type": "STRING" },
            "nuance": { "type": "STRING", "description": "Core nuance in Korean" },
            "examples": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "category": { "type": "STRING", "enum": CATEGORIES },
                        "sentence": { "type": "STRING", "description": "English sentence" },
                        "explanation": { "type": "STRING", "description": "Korean translation/note" }
                    },
                    "required": ["category", "sentence", "explanation"]
                }
            }
        },
        "required": ["word", "nuance", "examples"]
    })
}

fn quiz_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "sentence": { "type": "STRING", "description": "The sentence with ____" },
            "correctWord": { "type": "STRING" },
            "options": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "4 options including the correct word"
            }
        },
        "required": ["sentence", "correctWord", "options"]
    })
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .find_map(|part| part.text)
    }
}
