use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dto::{format_timestamp, validation::validate_not_blank},
    state::{
        session::{ParticipantSnapshot, SessionSnapshot},
        state_machine::SessionPhase,
    },
};

/// Payload used to create a session from a markdown quiz.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateQuizRequest {
    /// Quiz document, at most 256 KiB.
    #[validate(
        length(min = 1, max = 262144),
        custom(function = "validate_not_blank")
    )]
    pub markdown: String,
}

/// Code of the freshly created session.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateQuizResponse {
    pub code: String,
}

/// Public projection of a session.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuizInfoResponse {
    pub code: String,
    pub title: String,
    pub question_count: usize,
    /// Zero-based index of the active question, absent before start.
    pub current_question: Option<usize>,
    pub state: SessionPhase,
    pub creator_id: Option<String>,
    /// Participants in join order, spectators included.
    pub participants: Vec<ParticipantSummary>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Participant as shown in the session info.
pub struct ParticipantSummary {
    pub id: String,
    pub name: String,
    pub score: u32,
    pub streak: u32,
    pub is_spectator: bool,
    pub has_answered: bool,
}

impl From<&ParticipantSnapshot> for ParticipantSummary {
    fn from(participant: &ParticipantSnapshot) -> Self {
        Self {
            id: participant.id.clone(),
            name: participant.name.clone(),
            score: participant.score,
            streak: participant.streak,
            is_spectator: participant.is_spectator,
            has_answered: participant.has_answered,
        }
    }
}

impl From<SessionSnapshot> for QuizInfoResponse {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            title: snapshot.quiz.title.clone(),
            question_count: snapshot.quiz.question_count(),
            current_question: snapshot.current_question,
            state: snapshot.phase,
            participants: snapshot.participants.iter().map(Into::into).collect(),
            created_at: format_timestamp(snapshot.created_at),
            creator_id: snapshot.creator_id,
            code: snapshot.code,
        }
    }
}

/// Payload used to enter a session's lobby.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinQuizRequest {
    #[validate(
        length(min = 1, max = 32),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    /// Ignored for the first participant, who always spectates.
    #[serde(default)]
    pub is_spectator: bool,
}

/// Identity handed to a participant after joining.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinQuizResponse {
    pub participant_id: String,
    /// Keep it to reclaim this identity after a reconnect.
    pub rejoin_token: String,
    pub is_spectator: bool,
}

/// Payload used to reclaim an identity.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RejoinRequest {
    #[validate(length(min = 1, max = 64))]
    pub rejoin_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Identity recovered from a rejoin token.
pub struct RejoinResponse {
    pub participant_id: String,
    pub name: String,
    pub is_spectator: bool,
}

impl From<ParticipantSnapshot> for RejoinResponse {
    fn from(participant: ParticipantSnapshot) -> Self {
        Self {
            participant_id: participant.id,
            name: participant.name,
            is_spectator: participant.is_spectator,
        }
    }
}

/// Payload used by the creator to start the quiz.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StartQuizRequest {
    #[validate(length(min = 1, max = 64))]
    pub participant_id: String,
    /// Token handed out on join; proves the caller is the creator.
    #[validate(length(min = 1, max = 64))]
    pub rejoin_token: String,
}

/// Payload carrying a participant's answer to the active question.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1, max = 64))]
    pub participant_id: String,
    #[validate(length(min = 1, max = 64))]
    pub rejoin_token: String,
    #[validate(length(min = 1, max = 512))]
    pub answer: String,
}

/// Query string of the WebSocket endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WsQuery {
    /// Participant the socket belongs to; omitted for pure viewers.
    pub participant_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_request_rejects_blank_and_long_names() {
        let blank = JoinQuizRequest {
            name: "   ".into(),
            is_spectator: false,
        };
        assert!(blank.validate().is_err());

        let long = JoinQuizRequest {
            name: "x".repeat(33),
            is_spectator: false,
        };
        assert!(long.validate().is_err());

        let ok = JoinQuizRequest {
            name: "Alice".into(),
            is_spectator: false,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn join_request_defaults_to_player() {
        let request: JoinQuizRequest = serde_json::from_str(r#"{"name": "Bob"}"#).unwrap();
        assert!(!request.is_spectator);
    }

    #[test]
    fn start_request_requires_a_token() {
        let result =
            serde_json::from_str::<StartQuizRequest>(r#"{"participant_id": "p1"}"#);
        assert!(result.is_err());

        let request = StartQuizRequest {
            participant_id: "p1".into(),
            rejoin_token: String::new(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn answer_request_requires_an_answer() {
        let request = SubmitAnswerRequest {
            participant_id: "p1".into(),
            rejoin_token: "token".into(),
            answer: String::new(),
        };
        assert!(request.validate().is_err());
    }
}
