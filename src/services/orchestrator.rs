//! Timed loop driving a started session through its questions.
//!
//! Each question runs a question window (until the time limit or until every
//! player answered) followed by a reveal window, then advances or finishes.
//! The loop re-validates its [`RunToken`] on every tick and stops at the
//! first store error, so an expired or superseded session ends its loop on
//! its own.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::{
    sync::Notify,
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::ServerMessage,
    state::{
        SharedState,
        session::{RunToken, whole_seconds},
        state_machine::SessionPhase,
        store::SessionError,
    },
};

/// Spawn the loop for a freshly started session.
///
/// Returns `false` without spawning when a loop already drives the same code.
pub fn spawn_session_loop(state: &SharedState, token: RunToken) -> bool {
    let Some(wake) = state.claim_run(&token) else {
        return false;
    };

    let state = state.clone();
    tokio::spawn(async move {
        info!(code = %token.code, epoch = token.epoch, "orchestrator started");
        match run_session(&state, &token, &wake).await {
            Ok(()) => info!(code = %token.code, epoch = token.epoch, "orchestrator finished"),
            Err(err) => warn!(
                code = %token.code,
                epoch = token.epoch,
                error = %err,
                "orchestrator stopped"
            ),
        }
        state.release_run(&token);
    });

    true
}

async fn run_session(
    state: &SharedState,
    token: &RunToken,
    wake: &Notify,
) -> Result<(), SessionError> {
    let tick = state.config().tick_interval;

    loop {
        run_question_window(state, token, wake, tick).await?;

        let reveal = state.sessions().reveal_answer(&token.code).await?;
        broadcast(state, token, ServerMessage::AnswerReveal(reveal)).await;

        let pause = state.sessions().get_session(&token.code).await?.quiz.pause_duration();
        run_reveal_window(state, token, pause, tick).await?;

        if !state.sessions().next_question(&token.code).await? {
            let leaderboard = state.sessions().leaderboard(&token.code).await?;
            broadcast(state, token, ServerMessage::QuizFinished { leaderboard }).await;
            return Ok(());
        }
    }
}

/// Announce the active question and count it down.
///
/// Returns once the time limit elapsed or every player answered.
async fn run_question_window(
    state: &SharedState,
    token: &RunToken,
    wake: &Notify,
    tick: Duration,
) -> Result<(), SessionError> {
    state.sessions().check_run(token).await?;
    let snapshot = state.sessions().get_session(&token.code).await?;
    let view = snapshot
        .question_view(OffsetDateTime::now_utc())
        .ok_or(SessionError::WrongState {
            operation: "open question",
            phase: snapshot.phase,
        })?;
    let limit = snapshot.quiz.question_duration();
    debug!(code = %token.code, question = view.question_number, "question opened");
    broadcast(state, token, ServerMessage::Question(view)).await;

    let started = Instant::now();
    let mut ticker = ticker(started, tick);
    loop {
        let ticked = tokio::select! {
            _ = ticker.tick() => true,
            _ = wake.notified() => false,
        };

        let status = state.sessions().check_run(token).await?;
        if status.phase != SessionPhase::Question {
            return Err(SessionError::WrongState {
                operation: "count down question",
                phase: status.phase,
            });
        }

        let elapsed = started.elapsed();
        if elapsed >= limit || status.progress.is_complete() {
            return Ok(());
        }
        if ticked {
            let time_remaining = whole_seconds(limit - elapsed);
            broadcast(state, token, ServerMessage::TimeUpdate { time_remaining }).await;
        }
    }
}

/// Keep the answer on screen for `pause`, counting it down.
async fn run_reveal_window(
    state: &SharedState,
    token: &RunToken,
    pause: Duration,
    tick: Duration,
) -> Result<(), SessionError> {
    let started = Instant::now();
    let mut ticker = ticker(started, tick);

    while started.elapsed() < pause {
        ticker.tick().await;
        state.sessions().check_run(token).await?;

        let elapsed = started.elapsed();
        if elapsed >= pause {
            break;
        }
        let time_remaining = whole_seconds(pause - elapsed);
        broadcast(state, token, ServerMessage::TimeUpdate { time_remaining }).await;
    }

    Ok(())
}

fn ticker(started: Instant, tick: Duration) -> Interval {
    let mut ticker = interval_at(started + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn broadcast(state: &SharedState, token: &RunToken, message: ServerMessage) {
    let delivered = state.connections().broadcast(&token.code, &message).await;
    debug!(code = %token.code, event = message.kind(), delivered, "event broadcast");
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
            AppState,
            connections::ClientConnection,
            quiz::{Question, Quiz},
        },
    };

    struct Fixture {
        state: SharedState,
        code: String,
        rx: mpsc::UnboundedReceiver<Message>,
    }

    async fn fixture(quiz: Quiz) -> Fixture {
        let state = AppState::new(AppConfig::default());
        let code = state.sessions().create_session(quiz).await.unwrap();
        state
            .sessions()
            .add_participant(&code, "host", "Host", false)
            .await
            .unwrap();
        state
            .sessions()
            .add_participant(&code, "p1", "Alice", false)
            .await
            .unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        state
            .connections()
            .register(&code, ClientConnection::new(None, tx))
            .await;

        Fixture { state, code, rx }
    }

    fn quiz(questions: usize, time_per_question: u64, time_between_questions: u64) -> Quiz {
        let questions = (0..questions)
            .map(|i| Question::new(format!("Q{}", i + 1), ["A", "B"], "A"))
            .collect();
        let mut quiz = Quiz::new("Timed", questions);
        quiz.time_per_question = time_per_question;
        quiz.time_between_questions = time_between_questions;
        quiz
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Message>) -> Value {
        match rx.recv().await {
            Some(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_question_runs_to_the_time_limit() {
        let Fixture {
            state,
            code,
            mut rx,
        } = fixture(quiz(1, 3, 2)).await;
        let token = state.sessions().start_quiz(&code).await.unwrap();
        assert!(spawn_session_loop(&state, token));

        let question = next_event(&mut rx).await;
        assert_eq!(question["type"], "question");
        assert_eq!(question["payload"]["question_number"], 1);
        assert_eq!(question["payload"]["total_questions"], 1);
        assert_eq!(question["payload"]["time_remaining"], 3);

        for expected in [2, 1] {
            let update = next_event(&mut rx).await;
            assert_eq!(update["type"], "time_update");
            assert_eq!(update["payload"]["time_remaining"], expected);
        }

        let reveal = next_event(&mut rx).await;
        assert_eq!(reveal["type"], "answer_reveal");
        assert_eq!(reveal["payload"]["correct_answer"], "A");
        assert_eq!(reveal["payload"]["participants"][0]["answer"], "");
        assert_eq!(reveal["payload"]["participants"][0]["is_correct"], false);

        let pause = next_event(&mut rx).await;
        assert_eq!(pause["type"], "time_update");
        assert_eq!(pause["payload"]["time_remaining"], 1);

        let finished = next_event(&mut rx).await;
        assert_eq!(finished["type"], "quiz_finished");
        assert_eq!(
            finished["payload"]["leaderboard"],
            serde_json::json!([{"name": "Alice", "score": 0}])
        );

        tokio::task::yield_now().await;
        assert_eq!(state.active_runs(), 0);
        let snapshot = state.sessions().get_session(&code).await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn last_answer_wakes_the_loop_early() {
        let Fixture {
            state,
            code,
            mut rx,
        } = fixture(quiz(2, 30, 0)).await;
        let token = state.sessions().start_quiz(&code).await.unwrap();
        assert!(spawn_session_loop(&state, token));

        assert_eq!(next_event(&mut rx).await["type"], "question");
        state.sessions().submit_answer(&code, "p1", "A").await.unwrap();
        state.wake_run(&code);

        let reveal = next_event(&mut rx).await;
        assert_eq!(reveal["type"], "answer_reveal");
        assert_eq!(reveal["payload"]["participants"][0]["score"], 1);

        let second = next_event(&mut rx).await;
        assert_eq!(second["type"], "question");
        assert_eq!(second["payload"]["question_number"], 2);
        assert_eq!(second["payload"]["text"], "Q2");
    }

    #[tokio::test(start_paused = true)]
    async fn second_loop_for_the_same_session_is_refused() {
        let Fixture { state, code, .. } = fixture(quiz(1, 30, 5)).await;
        let token = state.sessions().start_quiz(&code).await.unwrap();

        assert!(spawn_session_loop(&state, token.clone()));
        assert!(!spawn_session_loop(&state, token));
        assert_eq!(state.active_runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_stops_its_loop() {
        let Fixture {
            state,
            code,
            mut rx,
        } = fixture(quiz(1, 30, 5)).await;
        let token = state.sessions().start_quiz(&code).await.unwrap();
        assert!(spawn_session_loop(&state, token));
        assert_eq!(next_event(&mut rx).await["type"], "question");

        let removed = state
            .sessions()
            .expire_old_sessions(OffsetDateTime::now_utc() + time::Duration::hours(25))
            .await;
        assert_eq!(removed, vec![code]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(state.active_runs(), 0);
        assert!(rx.try_recv().is_err());
    }
}
