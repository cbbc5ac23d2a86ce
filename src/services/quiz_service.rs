use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::{
        quiz::{
            CreateQuizRequest, CreateQuizResponse, JoinQuizRequest, JoinQuizResponse,
            QuizInfoResponse, RejoinRequest, RejoinResponse, StartQuizRequest,
            SubmitAnswerRequest,
        },
        ws::ServerMessage,
    },
    error::ServiceError,
    services::{orchestrator, quiz_parser::parse_quiz_markdown},
    state::{SharedState, store::normalize_code},
};

/// Parse a markdown quiz and open a session for it.
pub async fn create_quiz(
    state: &SharedState,
    request: CreateQuizRequest,
) -> Result<CreateQuizResponse, ServiceError> {
    let quiz = parse_quiz_markdown(&request.markdown)?;
    let title = quiz.title.clone();
    let questions = quiz.question_count();

    let code = state.sessions().create_session(quiz).await?;
    info!(code = %code, title = %title, questions, "quiz created");

    Ok(CreateQuizResponse { code })
}

/// Return the public projection of a session.
pub async fn get_quiz(state: &SharedState, code: &str) -> Result<QuizInfoResponse, ServiceError> {
    let snapshot = state.sessions().get_session(code).await?;
    Ok(snapshot.into())
}

/// Admit a new participant and announce them to the session.
pub async fn join_quiz(
    state: &SharedState,
    code: &str,
    request: JoinQuizRequest,
) -> Result<JoinQuizResponse, ServiceError> {
    let code = normalize_code(code);
    let participant_id = Uuid::new_v4().to_string();
    let name = request.name.trim();

    let admission = state
        .sessions()
        .add_participant(&code, &participant_id, name, request.is_spectator)
        .await?;
    let participant = admission.participant;
    info!(
        code = %code,
        participant = %participant.id,
        name = %participant.name,
        spectator = participant.is_spectator,
        "participant joined"
    );

    state
        .connections()
        .broadcast(
            &code,
            &ServerMessage::ParticipantJoined {
                id: participant.id.clone(),
                name: participant.name.clone(),
                is_spectator: participant.is_spectator,
                participant_count: admission.participant_count,
            },
        )
        .await;

    Ok(JoinQuizResponse {
        participant_id: participant.id,
        rejoin_token: admission.rejoin_token,
        is_spectator: participant.is_spectator,
    })
}

/// Resolve a rejoin token back to its participant.
pub async fn rejoin_quiz(
    state: &SharedState,
    code: &str,
    request: RejoinRequest,
) -> Result<RejoinResponse, ServiceError> {
    let participant = state
        .sessions()
        .rejoin(code, &request.rejoin_token)
        .await?;
    info!(code = %normalize_code(code), participant = %participant.id, "participant rejoined");
    Ok(participant.into())
}

/// Start the quiz on behalf of its creator and launch its orchestrator.
pub async fn start_quiz(
    state: &SharedState,
    code: &str,
    request: StartQuizRequest,
) -> Result<(), ServiceError> {
    let caller = state
        .sessions()
        .authenticate(code, &request.participant_id, &request.rejoin_token)
        .await?;
    let snapshot = state.sessions().get_session(code).await?;
    if snapshot.creator_id.as_deref() != Some(caller.id.as_str()) {
        return Err(ServiceError::Forbidden(
            "only the quiz creator can start the quiz".into(),
        ));
    }

    let token = state.sessions().start_quiz(&snapshot.code).await?;
    if !orchestrator::spawn_session_loop(state, token) {
        return Err(ServiceError::Internal(format!(
            "session `{}` is still driven by a previous orchestrator",
            snapshot.code
        )));
    }

    Ok(())
}

/// Record an answer, publish the new answer count and nudge the orchestrator.
///
/// Spectator answers are stored but change no count, so nothing is published.
pub async fn submit_answer(
    state: &SharedState,
    code: &str,
    request: SubmitAnswerRequest,
) -> Result<(), ServiceError> {
    let code = normalize_code(code);
    let caller = state
        .sessions()
        .authenticate(&code, &request.participant_id, &request.rejoin_token)
        .await?;
    let progress = state
        .sessions()
        .submit_answer(&code, &caller.id, &request.answer)
        .await?;
    if caller.is_spectator {
        debug!(code = %code, participant = %caller.id, "spectator answer recorded");
        return Ok(());
    }

    state
        .connections()
        .broadcast(
            &code,
            &ServerMessage::AnswerCountUpdate {
                participant_id: caller.id,
                answered_count: progress.answered,
                total_participants: progress.total,
            },
        )
        .await;
    state.wake_run(&code);

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{
            AppState, connections::ClientConnection, session::RunToken,
            state_machine::SessionPhase,
        },
    };

    const MARKDOWN: &str = "# Capitals
### Capital of France?
- Paris
- Lyon
* Answer: Paris";

    async fn create(state: &SharedState) -> String {
        create_quiz(
            state,
            CreateQuizRequest {
                markdown: MARKDOWN.into(),
            },
        )
        .await
        .unwrap()
        .code
    }

    async fn join(state: &SharedState, code: &str, name: &str) -> JoinQuizResponse {
        join_quiz(
            state,
            code,
            JoinQuizRequest {
                name: name.into(),
                is_spectator: false,
            },
        )
        .await
        .unwrap()
    }

    fn event(message: Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_rejects_invalid_markdown() {
        let state = AppState::new(AppConfig::default());
        let err = create_quiz(
            &state,
            CreateQuizRequest {
                markdown: "no title here".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert!(state.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let state = AppState::new(AppConfig::default());
        let code = create(&state).await;

        let info = get_quiz(&state, &format!(" {} ", code.to_lowercase()))
            .await
            .unwrap();
        assert_eq!(info.code, code);
        assert_eq!(info.title, "Capitals");
        assert_eq!(info.question_count, 1);
        assert_eq!(info.state, SessionPhase::Waiting);
    }

    #[tokio::test]
    async fn join_announces_participant() {
        let state = AppState::new(AppConfig::default());
        let code = create(&state).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        state
            .connections()
            .register(&code, ClientConnection::new(None, tx))
            .await;

        let host = join(&state, &code.to_lowercase(), "  Host  ").await;
        assert!(host.is_spectator);

        let joined = event(rx.recv().await.unwrap());
        assert_eq!(joined["type"], "participant_joined");
        assert_eq!(joined["payload"]["id"], host.participant_id.as_str());
        assert_eq!(joined["payload"]["name"], "Host");
        assert_eq!(joined["payload"]["is_spectator"], true);
        assert_eq!(joined["payload"]["participant_count"], 1);
    }

    #[tokio::test]
    async fn rejoin_returns_the_same_identity() {
        let state = AppState::new(AppConfig::default());
        let code = create(&state).await;
        join(&state, &code, "Host").await;
        let alice = join(&state, &code, "Alice").await;

        let rejoined = rejoin_quiz(
            &state,
            &code,
            RejoinRequest {
                rejoin_token: alice.rejoin_token.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(rejoined.participant_id, alice.participant_id);
        assert_eq!(rejoined.name, "Alice");

        let err = rejoin_quiz(
            &state,
            &code,
            RejoinRequest {
                rejoin_token: "bogus".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    fn start_as(participant: &JoinQuizResponse) -> StartQuizRequest {
        StartQuizRequest {
            participant_id: participant.participant_id.clone(),
            rejoin_token: participant.rejoin_token.clone(),
        }
    }

    fn answer_as(participant: &JoinQuizResponse, answer: &str) -> SubmitAnswerRequest {
        SubmitAnswerRequest {
            participant_id: participant.participant_id.clone(),
            rejoin_token: participant.rejoin_token.clone(),
            answer: answer.into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_creator_can_start() {
        let state = AppState::new(AppConfig::default());
        let code = create(&state).await;
        let host = join(&state, &code, "Host").await;
        let alice = join(&state, &code, "Alice").await;

        let err = start_quiz(&state, &code, start_as(&alice)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        start_quiz(&state, &code, start_as(&host)).await.unwrap();
        assert_eq!(state.active_runs(), 1);

        let again = start_quiz(&state, &code, start_as(&host)).await.unwrap_err();
        assert!(matches!(again, ServiceError::InvalidState(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn published_creator_id_does_not_grant_start() {
        let state = AppState::new(AppConfig::default());
        let code = create(&state).await;
        join(&state, &code, "Host").await;
        let mallory = join(&state, &code, "Mallory").await;
        let creator_id = get_quiz(&state, &code).await.unwrap().creator_id.unwrap();

        let err = start_quiz(
            &state,
            &code,
            StartQuizRequest {
                participant_id: creator_id.clone(),
                rejoin_token: mallory.rejoin_token.clone(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = start_quiz(
            &state,
            &code,
            StartQuizRequest {
                participant_id: creator_id,
                rejoin_token: "guessed".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let info = get_quiz(&state, &code).await.unwrap();
        assert_eq!(info.state, SessionPhase::Waiting);
        assert_eq!(state.active_runs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_fails_when_a_previous_run_still_holds_the_code() {
        let state = AppState::new(AppConfig::default());
        let code = create(&state).await;
        let host = join(&state, &code, "Host").await;
        join(&state, &code, "Alice").await;
        let lingering = RunToken {
            code: code.clone(),
            epoch: 0,
        };
        assert!(state.claim_run(&lingering).is_some());

        let err = start_quiz(&state, &code, start_as(&host)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn answers_publish_counts_and_reject_duplicates() {
        let state = AppState::new(AppConfig::default());
        let code = create(&state).await;
        let host = join(&state, &code, "Host").await;
        let alice = join(&state, &code, "Alice").await;
        join(&state, &code, "Bob").await;
        start_quiz(&state, &code, start_as(&host)).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        state
            .connections()
            .register(&code, ClientConnection::new(None, tx))
            .await;

        submit_answer(&state, &code, answer_as(&alice, "Paris"))
            .await
            .unwrap();

        let update = loop {
            let next = event(rx.recv().await.unwrap());
            if next["type"] == "answer_count_update" {
                break next;
            }
        };
        assert_eq!(update["payload"]["participant_id"], alice.participant_id.as_str());
        assert_eq!(update["payload"]["answered_count"], 1);
        assert_eq!(update["payload"]["total_participants"], 2);

        let err = submit_answer(&state, &code, answer_as(&alice, "Paris"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cannot_answer_for_another_player() {
        let state = AppState::new(AppConfig::default());
        let code = create(&state).await;
        let host = join(&state, &code, "Host").await;
        let alice = join(&state, &code, "Alice").await;
        let bob = join(&state, &code, "Bob").await;
        start_quiz(&state, &code, start_as(&host)).await.unwrap();

        let err = submit_answer(
            &state,
            &code,
            SubmitAnswerRequest {
                participant_id: alice.participant_id.clone(),
                rejoin_token: bob.rejoin_token.clone(),
                answer: "Lyon".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let progress = state.sessions().answered_counts(&code).await.unwrap();
        assert_eq!(progress.answered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spectator_answers_are_not_announced() {
        let state = AppState::new(AppConfig::default());
        let code = create(&state).await;
        let host = join(&state, &code, "Host").await;
        join(&state, &code, "Alice").await;
        start_quiz(&state, &code, start_as(&host)).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        state
            .connections()
            .register(&code, ClientConnection::new(None, tx))
            .await;

        submit_answer(&state, &code, answer_as(&host, "Paris"))
            .await
            .unwrap();
        while let Ok(message) = rx.try_recv() {
            assert_ne!(event(message)["type"], "answer_count_update");
        }

        let progress = state.sessions().answered_counts(&code).await.unwrap();
        assert_eq!((progress.answered, progress.total), (0, 1));
    }
}
