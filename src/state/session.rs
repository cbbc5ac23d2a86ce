use std::{sync::Arc, time::Duration};

use indexmap::IndexMap;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;
use utoipa::ToSchema;

use crate::state::{
    quiz::{Question, Quiz},
    scoring::score_answer,
    state_machine::{InvalidTransition, SessionEvent, SessionPhase, SessionStateMachine},
};

/// A participant as stored inside its session. Never handed out directly.
#[derive(Debug, Clone)]
pub(crate) struct Participant {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) score: u32,
    pub(crate) current_answer: Option<String>,
    pub(crate) answered_at: Option<OffsetDateTime>,
    pub(crate) streak: u32,
    pub(crate) is_spectator: bool,
    pub(crate) joined_at: OffsetDateTime,
    pub(crate) rejoin_token: String,
}

impl Participant {
    pub(crate) fn has_answered(&self) -> bool {
        self.current_answer.is_some()
    }

    fn clear_answer(&mut self) {
        self.current_answer = None;
        self.answered_at = None;
    }

    pub(crate) fn snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            score: self.score,
            current_answer: self.current_answer.clone(),
            has_answered: self.has_answered(),
            answered_at: self.answered_at,
            streak: self.streak,
            is_spectator: self.is_spectator,
            joined_at: self.joined_at,
        }
    }
}

/// Mutable aggregate for one live run of a quiz, owned by the session store.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) code: String,
    pub(crate) quiz: Arc<Quiz>,
    /// Keyed by participant id, iterated in join order.
    pub(crate) participants: IndexMap<String, Participant>,
    pub(crate) creator_id: Option<String>,
    pub(crate) current_question: Option<usize>,
    pub(crate) machine: SessionStateMachine,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) question_started_at: Option<OffsetDateTime>,
    /// Epoch of the orchestrator run allowed to drive this session.
    pub(crate) run_epoch: Option<u64>,
}

impl Session {
    pub(crate) fn new(code: String, quiz: Arc<Quiz>, created_at: OffsetDateTime) -> Self {
        Self {
            code,
            quiz,
            participants: IndexMap::new(),
            creator_id: None,
            current_question: None,
            machine: SessionStateMachine::new(),
            created_at,
            question_started_at: None,
            run_epoch: None,
        }
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        self.machine.phase()
    }

    pub(crate) fn transition(
        &mut self,
        event: SessionEvent,
    ) -> Result<SessionPhase, InvalidTransition> {
        let phase = self.machine.apply(event)?;
        debug!(
            code = %self.code,
            ?event,
            phase = %phase,
            version = self.machine.version(),
            "session transitioned"
        );
        Ok(phase)
    }

    fn players(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values().filter(|p| !p.is_spectator)
    }

    pub(crate) fn answer_progress(&self) -> AnswerProgress {
        let (answered, total) = self.players().fold((0, 0), |(answered, total), p| {
            (answered + usize::from(p.has_answered()), total + 1)
        });
        AnswerProgress { answered, total }
    }

    /// Enter question `index`, clearing every participant's previous answer.
    pub(crate) fn begin_question(&mut self, index: usize, now: OffsetDateTime) {
        self.current_question = Some(index);
        self.question_started_at = Some(now);
        for participant in self.participants.values_mut() {
            participant.clear_answer();
        }
    }

    /// Score every non-spectator against the current question.
    ///
    /// Callers must have checked that a question is active.
    pub(crate) fn score_current_question(&mut self, question: &Question) -> AnswerReveal {
        let streak_enabled = self.quiz.streak_bonus;
        let participants = self
            .participants
            .values_mut()
            .filter(|p| !p.is_spectator)
            .map(|participant| {
                let round = score_answer(
                    participant.current_answer.as_deref(),
                    &question.answer,
                    participant.streak,
                    streak_enabled,
                );
                participant.streak = round.streak;
                participant.score += round.points;

                ParticipantResult {
                    name: participant.name.clone(),
                    answer: participant.current_answer.clone().unwrap_or_default(),
                    is_correct: round.is_correct,
                    score: participant.score,
                    streak: participant.streak,
                    streak_bonus: round.streak_bonus,
                }
            })
            .collect();

        AnswerReveal {
            correct_answer: question.answer.clone(),
            participants,
        }
    }

    pub(crate) fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .players()
            .map(|p| LeaderboardEntry {
                name: p.name.clone(),
                score: p.score,
            })
            .collect();
        // `sort_by` is stable: equal scores keep join order.
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            code: self.code.clone(),
            quiz: Arc::clone(&self.quiz),
            participants: self.participants.values().map(Participant::snapshot).collect(),
            creator_id: self.creator_id.clone(),
            current_question: self.current_question,
            phase: self.phase(),
            created_at: self.created_at,
            question_started_at: self.question_started_at,
        }
    }
}

/// Immutable copy of a session's state at the time it was read.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Session code.
    pub code: String,
    /// Quiz being played.
    pub quiz: Arc<Quiz>,
    /// Participants in join order, spectators included.
    pub participants: Vec<ParticipantSnapshot>,
    /// Identifier of the creator (first participant), once someone joined.
    pub creator_id: Option<String>,
    /// Zero-based index of the active question; `None` before start.
    pub current_question: Option<usize>,
    /// Lifecycle phase.
    pub phase: SessionPhase,
    /// Creation time, used by the expiry sweep.
    pub created_at: OffsetDateTime,
    /// When the active question started.
    pub question_started_at: Option<OffsetDateTime>,
}

impl SessionSnapshot {
    /// Look up a participant by identifier.
    pub fn participant(&self, id: &str) -> Option<&ParticipantSnapshot> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Build the `question` payload for the active question, with the time
    /// left measured from the question start to `now`.
    ///
    /// Returns `None` outside of the question phase.
    pub fn question_view(&self, now: OffsetDateTime) -> Option<QuestionView> {
        if self.phase != SessionPhase::Question {
            return None;
        }
        let index = self.current_question?;
        let question = self.quiz.question(index)?;

        let limit = self.quiz.question_duration();
        let elapsed = self
            .question_started_at
            .and_then(|started| Duration::try_from(now - started).ok())
            .unwrap_or_default();
        let remaining = limit.saturating_sub(elapsed);

        Some(QuestionView {
            question_number: index + 1,
            total_questions: self.quiz.question_count(),
            text: question.text.clone(),
            options: question.options.clone(),
            time_remaining: whole_seconds(remaining),
        })
    }
}

/// Immutable copy of a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSnapshot {
    /// Participant identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Accumulated score.
    pub score: u32,
    /// Answer submitted for the active question.
    pub current_answer: Option<String>,
    /// Whether an answer was accepted for the active question.
    pub has_answered: bool,
    /// When the answer was accepted.
    pub answered_at: Option<OffsetDateTime>,
    /// Consecutive correct answers.
    pub streak: u32,
    /// True for the creator, who does not play.
    pub is_spectator: bool,
    /// When the participant joined.
    pub joined_at: OffsetDateTime,
}

/// Answered/total counters, spectators excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct AnswerProgress {
    /// Players who answered the active question.
    pub answered: usize,
    /// Players in the session.
    pub total: usize,
}

impl AnswerProgress {
    /// True once every player answered; vacuously true without players.
    pub fn is_complete(&self) -> bool {
        self.answered >= self.total
    }
}

/// Result of admitting a participant.
#[derive(Debug, Clone)]
pub struct Admission {
    /// The participant as stored.
    pub participant: ParticipantSnapshot,
    /// Secret credential proving this identity on start, answer and rejoin.
    pub rejoin_token: String,
    /// Participants in the session after admission, spectators included.
    pub participant_count: usize,
}

/// Handle given to the orchestrator loop started for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunToken {
    /// Session code the run drives.
    pub code: String,
    /// Store-wide unique epoch of this run.
    pub epoch: u64,
}

/// Payload describing the active question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuestionView {
    /// One-based question number.
    pub question_number: usize,
    /// Number of questions in the quiz.
    pub total_questions: usize,
    /// Question prompt.
    pub text: String,
    /// Options in display order.
    pub options: Vec<String>,
    /// Seconds left to answer.
    pub time_remaining: u64,
}

/// Outcome of revealing a question's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AnswerReveal {
    /// The correct option.
    pub correct_answer: String,
    /// Per-player results in join order, spectators excluded.
    pub participants: Vec<ParticipantResult>,
}

/// One player's result for a revealed question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ParticipantResult {
    /// Display name.
    pub name: String,
    /// Submitted answer, empty when none was given.
    pub answer: String,
    /// Whether the answer was correct.
    pub is_correct: bool,
    /// Score after this question.
    pub score: u32,
    /// Streak after this question.
    pub streak: u32,
    /// Streak bonus earned this question.
    pub streak_bonus: u32,
}

/// Leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// Display name.
    pub name: String,
    /// Final or current score.
    pub score: u32,
}

/// Round a duration to the nearest whole second for display.
pub(crate) fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs_f64().round() as u64
}
