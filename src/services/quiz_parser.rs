//! Markdown quiz format.
//!
//! ```text
//! # Title
//! # Settings
//! time_per_question: 10 seconds
//! streak_bonus: yes
//! ### Question text
//! - Option
//! - Option
//! * Answer: Option
//! ```

use thiserror::Error;
use tracing::warn;

use crate::state::quiz::{Question, Quiz};

const SETTINGS_HEADING: &str = "# Settings";
const TITLE_PREFIX: &str = "# ";
const QUESTION_PREFIX: &str = "###";
const OPTION_PREFIX: &str = "-";
const ANSWER_PREFIX: &str = "*";
const ANSWER_LABEL: &str = "Answer:";

/// Reasons a quiz document is rejected. Question numbers are one-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No `# ` heading precedes the questions.
    #[error("quiz must have a title")]
    MissingTitle,
    /// The document declares no question.
    #[error("quiz must have at least one question")]
    NoQuestions,
    /// A question lists no `-` option.
    #[error("question {0} has no options")]
    NoOptions(usize),
    /// A question lacks its `* Answer:` line.
    #[error("question {0} has no answer")]
    NoAnswer(usize),
    /// The declared answer matches none of the options.
    #[error("question {question}: answer '{answer}' not found in options")]
    AnswerNotInOptions {
        /// Offending question.
        question: usize,
        /// Answer as written in the document.
        answer: String,
    },
    /// A settings duration could not be read.
    #[error("invalid duration format: {0}")]
    InvalidDuration(String),
}

#[derive(Default)]
struct DraftQuestion {
    text: String,
    options: Vec<String>,
    answer: Option<String>,
}

/// Parse and validate a markdown quiz document.
pub fn parse_quiz_markdown(markdown: &str) -> Result<Quiz, ParseError> {
    let mut quiz = Quiz::new(String::new(), Vec::new());
    let mut drafts: Vec<DraftQuestion> = Vec::new();
    let mut current: Option<DraftQuestion> = None;
    let mut in_settings = false;

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed == SETTINGS_HEADING {
            in_settings = true;
            continue;
        }

        if in_settings {
            if trimmed.starts_with('#') {
                in_settings = false;
            } else {
                if let Some((key, value)) = trimmed.split_once(':') {
                    apply_setting(&mut quiz, key.trim(), value.trim());
                }
                continue;
            }
        }

        if let Some(text) = trimmed.strip_prefix(QUESTION_PREFIX) {
            drafts.extend(current.take().filter(|draft| !draft.text.is_empty()));
            current = Some(DraftQuestion {
                text: text.trim().to_string(),
                ..DraftQuestion::default()
            });
            continue;
        }

        if let Some(title) = trimmed.strip_prefix(TITLE_PREFIX) {
            if quiz.title.is_empty() {
                quiz.title = title.trim().to_string();
            }
            continue;
        }

        let Some(draft) = current.as_mut() else {
            continue;
        };

        if let Some(option) = trimmed.strip_prefix(OPTION_PREFIX) {
            draft.options.push(option.trim().to_string());
        } else if let Some(rest) = trimmed.strip_prefix(ANSWER_PREFIX) {
            if let Some(answer) = rest.trim().strip_prefix(ANSWER_LABEL) {
                draft.answer = Some(answer.trim().to_string());
            }
        }
    }
    drafts.extend(current.take().filter(|draft| !draft.text.is_empty()));

    if quiz.title.is_empty() {
        return Err(ParseError::MissingTitle);
    }
    if drafts.is_empty() {
        return Err(ParseError::NoQuestions);
    }

    quiz.questions = drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| validate_question(index + 1, draft))
        .collect::<Result<_, _>>()?;

    Ok(quiz)
}

fn validate_question(number: usize, draft: DraftQuestion) -> Result<Question, ParseError> {
    if draft.options.is_empty() {
        return Err(ParseError::NoOptions(number));
    }
    let answer = draft
        .answer
        .filter(|answer| !answer.is_empty())
        .ok_or(ParseError::NoAnswer(number))?;
    if !draft.options.contains(&answer) {
        return Err(ParseError::AnswerNotInOptions {
            question: number,
            answer,
        });
    }

    Ok(Question {
        text: draft.text,
        options: draft.options,
        answer,
    })
}

fn apply_setting(quiz: &mut Quiz, key: &str, value: &str) {
    match key {
        "time_per_question" => match parse_duration(value) {
            Ok(seconds) => quiz.time_per_question = seconds,
            Err(err) => warn!(error = %err, "ignoring time_per_question"),
        },
        "time_between_questions" => match parse_duration(value) {
            Ok(seconds) => quiz.time_between_questions = seconds,
            Err(err) => warn!(error = %err, "ignoring time_between_questions"),
        },
        "streak_bonus" => quiz.streak_bonus = parse_bool(value),
        "quickest_answer_bonus" => quiz.quickest_answer_bonus = parse_bool(value),
        _ => {}
    }
}

/// Parse a duration such as `10 seconds`, `1 minute`, `30s`, `2m` or `45` into seconds.
pub fn parse_duration(value: &str) -> Result<u64, ParseError> {
    let normalized = value.trim().to_lowercase();
    let split = normalized
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(normalized.len());
    let (digits, unit) = normalized.split_at(split);

    let invalid = || ParseError::InvalidDuration(value.trim().to_string());
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let multiplier = match unit.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        _ => return Err(invalid()),
    };

    amount.checked_mul(multiplier).ok_or_else(invalid)
}

/// `true`, `yes`, `1` and `on` (any case) are true; everything else is false.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "yes" | "1" | "on"
    )
}
