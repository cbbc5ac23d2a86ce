use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status, always "ok" while the process serves requests.
    pub status: String,
    /// Sessions currently held in memory.
    pub active_sessions: usize,
    /// Sessions currently driven by an orchestrator loop.
    pub running_quizzes: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(active_sessions: usize, running_quizzes: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_sessions,
            running_quizzes,
        }
    }
}
