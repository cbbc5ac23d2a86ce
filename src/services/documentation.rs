use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for QuicKwiz.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::quiz::create_quiz,
        crate::routes::quiz::get_quiz,
        crate::routes::quiz::join_quiz,
        crate::routes::quiz::rejoin_quiz,
        crate::routes::quiz::start_quiz,
        crate::routes::quiz::submit_answer,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::quiz::CreateQuizRequest,
            crate::dto::quiz::CreateQuizResponse,
            crate::dto::quiz::QuizInfoResponse,
            crate::dto::quiz::ParticipantSummary,
            crate::dto::quiz::JoinQuizRequest,
            crate::dto::quiz::JoinQuizResponse,
            crate::dto::quiz::RejoinRequest,
            crate::dto::quiz::RejoinResponse,
            crate::dto::quiz::StartQuizRequest,
            crate::dto::quiz::SubmitAnswerRequest,
            crate::dto::ws::ServerMessage,
            crate::state::session::QuestionView,
            crate::state::session::AnswerReveal,
            crate::state::session::ParticipantResult,
            crate::state::session::LeaderboardEntry,
            crate::state::state_machine::SessionPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "quiz", description = "Session lifecycle operations"),
        (name = "events", description = "WebSocket stream of session events"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/api/quiz",
            "/api/quiz/{code}",
            "/api/quiz/{code}/join",
            "/api/quiz/{code}/rejoin",
            "/api/quiz/{code}/start",
            "/api/quiz/{code}/answer",
            "/ws/{code}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
