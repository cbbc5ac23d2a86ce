use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::quiz::{
        CreateQuizRequest, CreateQuizResponse, JoinQuizRequest, JoinQuizResponse,
        QuizInfoResponse, RejoinRequest, RejoinResponse, StartQuizRequest, SubmitAnswerRequest,
    },
    error::AppError,
    services::quiz_service,
    state::SharedState,
};

/// Session lifecycle endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/quiz", post(create_quiz))
        .route("/api/quiz/{code}", get(get_quiz))
        .route("/api/quiz/{code}/join", post(join_quiz))
        .route("/api/quiz/{code}/rejoin", post(rejoin_quiz))
        .route("/api/quiz/{code}/start", post(start_quiz))
        .route("/api/quiz/{code}/answer", post(submit_answer))
}

#[utoipa::path(
    post,
    path = "/api/quiz",
    tag = "quiz",
    request_body = CreateQuizRequest,
    responses(
        (status = 200, description = "Session created", body = CreateQuizResponse),
        (status = 400, description = "Invalid quiz document")
    )
)]
/// Parse a markdown quiz and open a session for it.
pub async fn create_quiz(
    State(state): State<SharedState>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<Json<CreateQuizResponse>, AppError> {
    payload.validate()?;
    let response = quiz_service::create_quiz(&state, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/quiz/{code}",
    tag = "quiz",
    params(("code" = String, Path, description = "Session code, case-insensitive")),
    responses(
        (status = 200, description = "Session details", body = QuizInfoResponse),
        (status = 404, description = "Unknown session")
    )
)]
/// Return the session's quiz, participants and phase.
pub async fn get_quiz(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<QuizInfoResponse>, AppError> {
    let response = quiz_service::get_quiz(&state, &code).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/quiz/{code}/join",
    tag = "quiz",
    params(("code" = String, Path, description = "Session code, case-insensitive")),
    request_body = JoinQuizRequest,
    responses(
        (status = 200, description = "Participant admitted", body = JoinQuizResponse),
        (status = 400, description = "Invalid name"),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Quiz already started or name taken")
    )
)]
/// Enter the lobby. The first participant becomes the creator and spectates.
pub async fn join_quiz(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<JoinQuizRequest>,
) -> Result<Json<JoinQuizResponse>, AppError> {
    payload.validate()?;
    let response = quiz_service::join_quiz(&state, &code, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/quiz/{code}/rejoin",
    tag = "quiz",
    params(("code" = String, Path, description = "Session code, case-insensitive")),
    request_body = RejoinRequest,
    responses(
        (status = 200, description = "Identity recovered", body = RejoinResponse),
        (status = 401, description = "Unknown rejoin token"),
        (status = 404, description = "Unknown session")
    )
)]
/// Reclaim a participant identity after reconnecting.
pub async fn rejoin_quiz(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<RejoinRequest>,
) -> Result<Json<RejoinResponse>, AppError> {
    payload.validate()?;
    let response = quiz_service::rejoin_quiz(&state, &code, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/quiz/{code}/start",
    tag = "quiz",
    params(("code" = String, Path, description = "Session code, case-insensitive")),
    request_body = StartQuizRequest,
    responses(
        (status = 204, description = "Quiz started"),
        (status = 403, description = "Caller is not the creator or the token does not match"),
        (status = 404, description = "Unknown session or participant"),
        (status = 409, description = "Already started or no participants"),
        (status = 500, description = "A previous orchestrator still holds the session")
    )
)]
/// Start the quiz. Only the creator, proven by its rejoin token, may do this.
pub async fn start_quiz(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<StartQuizRequest>,
) -> Result<StatusCode, AppError> {
    payload.validate()?;
    quiz_service::start_quiz(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/quiz/{code}/answer",
    tag = "quiz",
    params(("code" = String, Path, description = "Session code, case-insensitive")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 204, description = "Answer recorded"),
        (status = 403, description = "Token does not match the participant"),
        (status = 404, description = "Unknown session or participant"),
        (status = 409, description = "No open question or already answered")
    )
)]
/// Submit an answer to the open question.
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<StatusCode, AppError> {
    payload.validate()?;
    quiz_service::submit_answer(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}
