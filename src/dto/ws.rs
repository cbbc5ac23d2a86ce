use serde::Serialize;
use utoipa::ToSchema;

use crate::state::session::{AnswerReveal, LeaderboardEntry, QuestionView};

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Events pushed to every WebSocket client attached to a session.
///
/// Serialized as `{"type": "...", "payload": {...}}`.
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A question opened (or is still open, for late joiners).
    Question(QuestionView),
    /// Countdown of the current question or reveal window.
    TimeUpdate {
        /// Seconds left in the window.
        time_remaining: u64,
    },
    /// Correct answer and per-player results.
    AnswerReveal(AnswerReveal),
    /// Someone entered the lobby.
    ParticipantJoined {
        /// Participant identifier.
        id: String,
        /// Display name.
        name: String,
        /// Whether the participant only watches.
        is_spectator: bool,
        /// Participants in the session, spectators included.
        participant_count: usize,
    },
    /// A player's answer was accepted.
    AnswerCountUpdate {
        /// Who answered.
        participant_id: String,
        /// Players who answered the active question.
        answered_count: usize,
        /// Players in the session.
        total_participants: usize,
    },
    /// Final standings.
    QuizFinished {
        /// Players by score, highest first.
        leaderboard: Vec<LeaderboardEntry>,
    },
}

impl ServerMessage {
    /// Wire name of the event, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Question(_) => "question",
            ServerMessage::TimeUpdate { .. } => "time_update",
            ServerMessage::AnswerReveal(_) => "answer_reveal",
            ServerMessage::ParticipantJoined { .. } => "participant_joined",
            ServerMessage::AnswerCountUpdate { .. } => "answer_count_update",
            ServerMessage::QuizFinished { .. } => "quiz_finished",
        }
    }
}
