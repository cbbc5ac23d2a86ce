pub mod connections;
pub mod quiz;
pub mod scoring;
pub mod session;
pub mod state_machine;
pub mod store;

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::Notify;
use tracing::warn;

use crate::config::AppConfig;

use self::{connections::ConnectionRegistry, session::RunToken, store::SessionStore};

pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Orchestrator loop currently driving a session.
pub struct RunHandle {
    /// Epoch handed out when the session was started.
    pub epoch: u64,
    /// Wakes the loop before its next tick, e.g. when an answer arrives.
    pub wake: Arc<Notify>,
}

/// Central application state: live sessions, their sockets and their orchestrator loops.
pub struct AppState {
    config: AppConfig,
    sessions: SessionStore,
    connections: ConnectionRegistry,
    runs: DashMap<String, RunHandle>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        let sessions = SessionStore::new(config.session_ttl, config.code_attempts);
        Arc::new(Self {
            config,
            sessions,
            connections: ConnectionRegistry::new(),
            runs: DashMap::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The session store, single source of truth for session state.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Live WebSocket connections grouped by session code.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Record `token` as the loop driving its session.
    ///
    /// Returns `None` when another loop already drives the same code.
    pub fn claim_run(&self, token: &RunToken) -> Option<Arc<Notify>> {
        match self.runs.entry(token.code.clone()) {
            Entry::Occupied(existing) => {
                warn!(
                    code = %token.code,
                    epoch = token.epoch,
                    running = existing.get().epoch,
                    "orchestrator already running for session"
                );
                None
            }
            Entry::Vacant(slot) => {
                let wake = Arc::new(Notify::new());
                slot.insert(RunHandle {
                    epoch: token.epoch,
                    wake: Arc::clone(&wake),
                });
                Some(wake)
            }
        }
    }

    /// Forget the loop of `token`, unless a newer one replaced it.
    pub fn release_run(&self, token: &RunToken) {
        self.runs
            .remove_if(&token.code, |_, handle| handle.epoch == token.epoch);
    }

    /// Nudge the loop driving `code`, if any.
    pub fn wake_run(&self, code: &str) {
        if let Some(handle) = self.runs.get(code) {
            handle.wake.notify_one();
        }
    }

    /// Number of orchestrator loops currently running.
    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }
}
