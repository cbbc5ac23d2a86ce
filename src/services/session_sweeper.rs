use time::OffsetDateTime;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::state::SharedState;

/// Periodically remove sessions older than the configured TTL.
///
/// Runs until the process stops. Orchestrator loops of removed sessions stop
/// on their own at their next tick.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep(&state, OffsetDateTime::now_utc()).await;
    }
}

/// Expire old sessions as of `now` and close their sockets.
pub async fn sweep(state: &SharedState, now: OffsetDateTime) -> Vec<String> {
    let removed = state.sessions().expire_old_sessions(now).await;
    if removed.is_empty() {
        debug!("session sweep found nothing to expire");
        return removed;
    }

    for code in &removed {
        let closed = state.connections().disconnect_all(code).await;
        info!(code = %code, closed, "session expired");
    }
    removed
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{
            AppState,
            connections::ClientConnection,
            quiz::{Question, Quiz},
        },
    };

    #[tokio::test]
    async fn sweep_removes_expired_sessions_and_their_sockets() {
        let state = AppState::new(AppConfig::default());
        let quiz = Quiz::new("Old", vec![Question::new("Q", ["A"], "A")]);
        let code = state.sessions().create_session(quiz).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state
            .connections()
            .register(&code, ClientConnection::new(None, tx))
            .await;

        let now = OffsetDateTime::now_utc();
        assert!(sweep(&state, now + time::Duration::hours(23)).await.is_empty());

        let removed = sweep(&state, now + time::Duration::hours(25)).await;
        assert_eq!(removed, vec![code.clone()]);
        assert!(matches!(rx.recv().await, Some(Message::Close(None))));
        assert_eq!(state.connections().connection_count(&code).await, 0);
        assert!(state.sessions().is_empty().await);
    }
}
