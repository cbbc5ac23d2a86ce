use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Seconds granted per question when the quiz does not say otherwise.
pub const DEFAULT_TIME_PER_QUESTION: u64 = 30;
/// Seconds spent on the answer reveal before moving on, unless overridden.
pub const DEFAULT_TIME_BETWEEN_QUESTIONS: u64 = 5;

/// Immutable quiz definition shared by every session created from it.
///
/// Values reaching the session store have already been validated by the
/// markdown parser: non-empty title, at least one question, and every answer
/// listed among its question's options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Quiz {
    /// Title displayed to participants.
    pub title: String,
    /// Time limit of each question, in seconds.
    pub time_per_question: u64,
    /// Pause between the answer reveal and the next question, in seconds.
    pub time_between_questions: u64,
    /// Whether consecutive correct answers earn bonus points.
    pub streak_bonus: bool,
    /// Carried from the quiz definition; not consulted by scoring.
    pub quickest_answer_bonus: bool,
    /// Ordered questions of the quiz.
    pub questions: Vec<Question>,
}

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Question {
    /// Question prompt.
    pub text: String,
    /// Options in display order.
    pub options: Vec<String>,
    /// The correct option, verbatim.
    pub answer: String,
}

impl Quiz {
    /// Build a quiz with default timings and both bonus rules disabled.
    pub fn new(title: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            title: title.into(),
            time_per_question: DEFAULT_TIME_PER_QUESTION,
            time_between_questions: DEFAULT_TIME_BETWEEN_QUESTIONS,
            streak_bonus: false,
            quickest_answer_bonus: false,
            questions,
        }
    }

    /// Number of questions in the quiz.
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Question at `index`, if any.
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Length of the answering window.
    pub fn question_duration(&self) -> Duration {
        Duration::from_secs(self.time_per_question)
    }

    /// Length of the reveal window between two questions.
    pub fn pause_duration(&self) -> Duration {
        Duration::from_secs(self.time_between_questions)
    }
}

impl Question {
    /// Convenience constructor used by the parser and tests.
    pub fn new<I, S>(text: impl Into<String>, options: I, answer: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: text.into(),
            options: options.into_iter().map(Into::into).collect(),
            answer: answer.into(),
        }
    }
}
