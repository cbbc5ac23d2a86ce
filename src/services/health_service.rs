use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness together with the number of sessions held in memory.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(state.sessions().len().await, state.active_runs())
}
