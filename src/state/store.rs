//! Concurrency-safe registry of live quiz sessions.
//!
//! Every read hands out an owned snapshot; stored sessions are only reachable
//! through the locked operations below.

use std::{collections::HashMap, sync::Arc, time::Duration};

use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::{
    quiz::Quiz,
    session::{
        Admission, AnswerProgress, AnswerReveal, LeaderboardEntry, Participant,
        ParticipantSnapshot, RunToken, Session, SessionSnapshot,
    },
    state_machine::{InvalidTransition, SessionEvent, SessionPhase},
};

/// Sessions older than this are removed by the expiry sweep.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// How many codes are drawn before giving up on finding a free one.
pub const DEFAULT_CODE_ATTEMPTS: usize = 8;
/// Random bytes behind a session code (two hex characters each).
const CODE_BYTES: usize = 4;

/// Errors returned by session store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No live session uses this code.
    #[error("quiz session `{0}` not found")]
    NotFound(String),
    /// The participant is not part of the session.
    #[error("participant `{0}` not found")]
    UnknownParticipant(String),
    /// The session already left the lobby.
    #[error("quiz has already started")]
    AlreadyStarted,
    /// Starting requires at least one participant.
    #[error("no participants in quiz")]
    NoParticipants,
    /// One answer per participant per question.
    #[error("participant `{0}` already answered this question")]
    AlreadyAnswered(String),
    /// The operation is not legal in the current phase.
    #[error("cannot {operation} while the session is in the {phase} phase")]
    WrongState {
        /// Rejected operation.
        operation: &'static str,
        /// Phase the session was in.
        phase: SessionPhase,
    },
    /// A participant with this identifier already joined.
    #[error("participant `{0}` already joined")]
    DuplicateParticipant(String),
    /// Another participant already uses this display name.
    #[error("name `{0}` is already taken")]
    NameTaken(String),
    /// No participant holds this rejoin token.
    #[error("invalid rejoin token")]
    InvalidRejoinToken,
    /// The rejoin token does not belong to the claimed participant.
    #[error("credentials do not match participant `{0}`")]
    CredentialMismatch(String),
    /// Every generated code collided with a live session.
    #[error("could not allocate a unique session code after {0} attempts")]
    CodeSpaceExhausted(usize),
    /// The orchestrator run no longer drives this session.
    #[error("orchestrator run {epoch} is no longer current for `{code}`")]
    StaleRun {
        /// Session code.
        code: String,
        /// Epoch of the stale run.
        epoch: u64,
    },
}

impl From<InvalidTransition> for SessionError {
    fn from(err: InvalidTransition) -> Self {
        SessionError::WrongState {
            operation: err.event.operation(),
            phase: err.from,
        }
    }
}

/// What an orchestrator run sees on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStatus {
    /// Current phase of the session.
    pub phase: SessionPhase,
    /// Answer counters for the active question.
    pub progress: AnswerProgress,
}

struct Registry {
    sessions: HashMap<String, Session>,
    next_epoch: u64,
}

impl Registry {
    fn get(&self, code: &str) -> Result<&Session, SessionError> {
        self.sessions
            .get(code)
            .ok_or_else(|| SessionError::NotFound(code.to_string()))
    }

    fn get_mut(&mut self, code: &str) -> Result<&mut Session, SessionError> {
        self.sessions
            .get_mut(code)
            .ok_or_else(|| SessionError::NotFound(code.to_string()))
    }
}

/// Single source of truth for every live session.
///
/// Mutations take the write lock for their whole duration; queries take the
/// read lock.
pub struct SessionStore {
    registry: RwLock<Registry>,
    ttl: Duration,
    code_attempts: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL, DEFAULT_CODE_ATTEMPTS)
    }
}

impl SessionStore {
    /// Create an empty store expiring sessions after `ttl`.
    pub fn new(ttl: Duration, code_attempts: usize) -> Self {
        Self {
            registry: RwLock::new(Registry {
                sessions: HashMap::new(),
                next_epoch: 1,
            }),
            ttl,
            code_attempts: code_attempts.max(1),
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Register a new session in the waiting phase and return its code.
    pub async fn create_session(&self, quiz: Quiz) -> Result<String, SessionError> {
        let mut registry = self.registry.write().await;

        let code = (0..self.code_attempts)
            .map(|_| generate_code())
            .find(|candidate| {
                let taken = registry.sessions.contains_key(candidate);
                if taken {
                    warn!(code = %candidate, "session code collision; drawing another");
                }
                !taken
            })
            .ok_or(SessionError::CodeSpaceExhausted(self.code_attempts))?;

        let session = Session::new(code.clone(), Arc::new(quiz), OffsetDateTime::now_utc());
        registry.sessions.insert(code.clone(), session);
        debug!(code = %code, "session created");
        Ok(code)
    }

    /// Snapshot of the session registered under `code`.
    pub async fn get_session(&self, code: &str) -> Result<SessionSnapshot, SessionError> {
        let code = normalize_code(code);
        let registry = self.registry.read().await;
        registry.get(&code).map(Session::snapshot)
    }

    /// Admit a participant while the session is still waiting.
    ///
    /// The first participant becomes the creator and is always a spectator;
    /// later participants keep the requested flag.
    pub async fn add_participant(
        &self,
        code: &str,
        participant_id: &str,
        name: &str,
        spectator_requested: bool,
    ) -> Result<Admission, SessionError> {
        let code = normalize_code(code);
        let mut registry = self.registry.write().await;
        let session = registry.get_mut(&code)?;

        if session.phase() != SessionPhase::Waiting {
            return Err(SessionError::AlreadyStarted);
        }
        if session.participants.contains_key(participant_id) {
            return Err(SessionError::DuplicateParticipant(participant_id.to_string()));
        }
        if session.participants.values().any(|p| p.name == name) {
            return Err(SessionError::NameTaken(name.to_string()));
        }

        let is_creator = session.participants.is_empty();
        if is_creator {
            session.creator_id = Some(participant_id.to_string());
        }

        let participant = Participant {
            id: participant_id.to_string(),
            name: name.to_string(),
            score: 0,
            current_answer: None,
            answered_at: None,
            streak: 0,
            is_spectator: is_creator || spectator_requested,
            joined_at: OffsetDateTime::now_utc(),
            rejoin_token: Uuid::new_v4().simple().to_string(),
        };
        let admission = Admission {
            participant: participant.snapshot(),
            rejoin_token: participant.rejoin_token.clone(),
            participant_count: session.participants.len() + 1,
        };
        session
            .participants
            .insert(participant_id.to_string(), participant);

        Ok(admission)
    }

    /// Resolve a rejoin token back to the participant it was issued to.
    pub async fn rejoin(
        &self,
        code: &str,
        rejoin_token: &str,
    ) -> Result<ParticipantSnapshot, SessionError> {
        let code = normalize_code(code);
        let registry = self.registry.read().await;
        let session = registry.get(&code)?;

        session
            .participants
            .values()
            .find(|p| p.rejoin_token == rejoin_token)
            .map(Participant::snapshot)
            .ok_or(SessionError::InvalidRejoinToken)
    }

    /// Check that `rejoin_token` was issued to `participant_id`.
    ///
    /// Participant ids are public; the token is what proves the caller owns one.
    pub async fn authenticate(
        &self,
        code: &str,
        participant_id: &str,
        rejoin_token: &str,
    ) -> Result<ParticipantSnapshot, SessionError> {
        let code = normalize_code(code);
        let registry = self.registry.read().await;
        let participant = registry
            .get(&code)?
            .participants
            .get(participant_id)
            .ok_or_else(|| SessionError::UnknownParticipant(participant_id.to_string()))?;

        if participant.rejoin_token != rejoin_token {
            warn!(code = %code, participant = %participant_id, "rejected mismatched credentials");
            return Err(SessionError::CredentialMismatch(participant_id.to_string()));
        }
        Ok(participant.snapshot())
    }

    /// Leave the lobby and open the first question.
    ///
    /// Returns the token of the only orchestrator run allowed to drive the session.
    pub async fn start_quiz(&self, code: &str) -> Result<RunToken, SessionError> {
        let code = normalize_code(code);
        let mut registry = self.registry.write().await;
        let epoch = registry.next_epoch;
        let session = registry.get_mut(&code)?;

        if session.phase() != SessionPhase::Waiting {
            return Err(SessionError::AlreadyStarted);
        }
        if session.participants.is_empty() {
            return Err(SessionError::NoParticipants);
        }

        session.transition(SessionEvent::Start)?;
        session.begin_question(0, OffsetDateTime::now_utc());
        session.run_epoch = Some(epoch);
        registry.next_epoch += 1;

        info!(code = %code, epoch, "quiz started");
        Ok(RunToken { code, epoch })
    }

    /// Record a participant's answer to the active question.
    pub async fn submit_answer(
        &self,
        code: &str,
        participant_id: &str,
        answer: &str,
    ) -> Result<AnswerProgress, SessionError> {
        let code = normalize_code(code);
        let mut registry = self.registry.write().await;
        let session = registry.get_mut(&code)?;

        let phase = session.phase();
        if phase != SessionPhase::Question {
            return Err(SessionError::WrongState {
                operation: "submit answer",
                phase,
            });
        }

        let participant = session
            .participants
            .get_mut(participant_id)
            .ok_or_else(|| SessionError::UnknownParticipant(participant_id.to_string()))?;
        if participant.has_answered() {
            return Err(SessionError::AlreadyAnswered(participant_id.to_string()));
        }

        participant.current_answer = Some(answer.to_string());
        participant.answered_at = Some(OffsetDateTime::now_utc());

        Ok(session.answer_progress())
    }

    /// Answered/total counters for the active question, spectators excluded.
    pub async fn answered_counts(&self, code: &str) -> Result<AnswerProgress, SessionError> {
        let code = normalize_code(code);
        let registry = self.registry.read().await;
        registry.get(&code).map(Session::answer_progress)
    }

    /// Whether every non-spectator answered the active question.
    pub async fn all_answered(&self, code: &str) -> Result<bool, SessionError> {
        Ok(self.answered_counts(code).await?.is_complete())
    }

    /// Close the active question, score every player and show the answer.
    pub async fn reveal_answer(&self, code: &str) -> Result<AnswerReveal, SessionError> {
        let code = normalize_code(code);
        let mut registry = self.registry.write().await;
        let session = registry.get_mut(&code)?;

        let quiz = Arc::clone(&session.quiz);
        let question = session
            .current_question
            .and_then(|index| quiz.question(index))
            .ok_or(SessionError::WrongState {
                operation: SessionEvent::Reveal.operation(),
                phase: session.phase(),
            })?;

        session.transition(SessionEvent::Reveal)?;
        Ok(session.score_current_question(question))
    }

    /// Move past the revealed question.
    ///
    /// Returns `false` once the last question has been played and the session
    /// is finished.
    pub async fn next_question(&self, code: &str) -> Result<bool, SessionError> {
        let code = normalize_code(code);
        let mut registry = self.registry.write().await;
        let session = registry.get_mut(&code)?;

        let next_index = session.current_question.map_or(0, |index| index + 1);
        let has_next = next_index < session.quiz.question_count();
        let event = if has_next {
            SessionEvent::NextQuestion
        } else {
            SessionEvent::Finish
        };

        session.transition(event)?;
        if has_next {
            session.begin_question(next_index, OffsetDateTime::now_utc());
        } else {
            info!(code = %code, "quiz finished");
        }

        Ok(has_next)
    }

    /// Players ordered by score, highest first; ties keep join order.
    pub async fn leaderboard(&self, code: &str) -> Result<Vec<LeaderboardEntry>, SessionError> {
        let code = normalize_code(code);
        let registry = self.registry.read().await;
        registry.get(&code).map(Session::leaderboard)
    }

    /// Drop every session created more than the configured TTL before `now`.
    ///
    /// Returns the removed codes. Orchestrator runs of removed sessions stop
    /// at their next tick since the session can no longer be found. A TTL
    /// reaching past the representable date range expires nothing.
    pub async fn expire_old_sessions(&self, now: OffsetDateTime) -> Vec<String> {
        let Some(cutoff) = time::Duration::try_from(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_sub(ttl))
        else {
            return Vec::new();
        };
        let mut registry = self.registry.write().await;

        let expired: Vec<String> = registry
            .sessions
            .values()
            .filter(|session| session.created_at < cutoff)
            .map(|session| session.code.clone())
            .collect();
        for code in &expired {
            registry.sessions.remove(code);
        }

        expired
    }

    /// Confirm that `token` still designates the run driving its session.
    pub async fn check_run(&self, token: &RunToken) -> Result<RunStatus, SessionError> {
        let registry = self.registry.read().await;
        let session = registry.get(&token.code)?;

        if session.run_epoch != Some(token.epoch) {
            return Err(SessionError::StaleRun {
                code: token.code.clone(),
                epoch: token.epoch,
            });
        }

        Ok(RunStatus {
            phase: session.phase(),
            progress: session.answer_progress(),
        })
    }
}

/// Canonical form of a user-supplied session code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn generate_code() -> String {
    let bytes: [u8; CODE_BYTES] = rand::random();
    bytes.iter().map(|byte| format!("{byte:02X}")).collect()
}
