use crate::model::{QuizQuestion, SavedWord, same_word};
use rand::Rng;
use serde::Serialize;

/// Saved words required before the quiz unlocks.
pub const QUIZ_MIN_WORDS: usize = 3;

/// Uniformly picks the word the next question is built around.
pub fn pick_target<'a, R: Rng + ?Sized>(words: &'a [SavedWord], rng: &mut R) -> Option<&'a str> {
    if words.is_empty() {
        return None;
    }
    Some(words[rng.gen_range(0..words.len())].word())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRound {
    pub question: QuizQuestion,
    pub answered: Option<String>,
}

impl QuizRound {
    pub fn new(question: QuizQuestion) -> Self {
        Self {
            question,
            answered: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.answered.is_some()
    }

    /// Records the first answer only; later calls return `None`.
    pub fn answer(&mut self, option: &str) -> Option<bool> {
        if self.answered.is_some() {
            return None;
        }
        self.answered = Some(option.to_string());
        Some(same_word(option.trim(), &self.question.correct_word))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Scoreboard {
    pub correct: u32,
    pub attempted: u32,
}

impl Scoreboard {
    pub fn record(&mut self, correct: bool) {
        self.attempted += 1;
        if correct {
            self.correct += 1;
        }
    }
}
