//! Deployment Controller (§4.E): the Ready/Processing state machine around one reconcile pass,
//! with its own commit-serializing lock and a status view the management surface can poll.

use crate::error::Result;
use crate::log::{BufferLogger, LogEntry};
use crate::reconcile;
use crate::store::Store;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fleetctl_k8s_util::OrchestratorClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Ready,
    Processing,
}

struct StatusInner {
    generation: u64,
    state: State,
    logger: Arc<BufferLogger>,
    terminal_error: Option<String>,
}

impl Default for StatusInner {
    fn default() -> Self {
        Self {
            generation: 0,
            state: State::Ready,
            logger: Arc::new(BufferLogger::new()),
            terminal_error: None,
        }
    }
}

/// The `(state, buffer-log, terminal-error)` triple `GET /deploy` reports.
pub struct Status {
    pub state: State,
    pub logs: Vec<LogEntry>,
    pub errors: Vec<LogEntry>,
    pub terminal_error: Option<String>,
}

pub struct DeploymentController<O: OrchestratorClient> {
    client: O,
    store: Arc<Store>,
    config_path: PathBuf,
    commit_lock: Arc<tokio::sync::Mutex<()>>,
    status: Arc<Mutex<StatusInner>>,
}

impl<O: OrchestratorClient> Clone for DeploymentController<O> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            store: Arc::clone(&self.store),
            config_path: self.config_path.clone(),
            commit_lock: Arc::clone(&self.commit_lock),
            status: Arc::clone(&self.status),
        }
    }
}

impl<O: OrchestratorClient> DeploymentController<O> {
    pub fn new(client: O, store: Arc<Store>, config_path: PathBuf) -> Self {
        Self {
            client,
            store,
            config_path,
            commit_lock: Arc::new(tokio::sync::Mutex::new(())),
            status: Arc::new(Mutex::new(StatusInner::default())),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Persist the current store and launch a reconcile pass. Returns once the pass has been
    /// scheduled, not once it has finished — a running or queued pass is observed through
    /// [`DeploymentController::status`].
    pub async fn commit(&self) -> Result<()> {
        let snapshot = self.store.snapshot().await;
        self.store.persist_to_path(&self.config_path).await?;

        let logger = Arc::new(BufferLogger::new());
        let generation = {
            let mut status = self.status.lock().unwrap();
            status.generation += 1;
            status.state = State::Processing;
            status.logger = Arc::clone(&logger);
            status.terminal_error = None;
            status.generation
        };

        let client = self.client.clone();
        let commit_lock = Arc::clone(&self.commit_lock);
        let status = Arc::clone(&self.status);

        tokio::spawn(async move {
            // Serializes this pass behind any already-running one; the caller has already moved
            // the visible state to Processing, so a second commit() while this one waits never
            // reports Ready.
            let _permit = commit_lock.lock().await;
            let terminal = reconcile::run(client, snapshot, Arc::clone(&logger)).await;

            let mut status = status.lock().unwrap();
            status.terminal_error = terminal.map(|e| e.to_string());
            if status.generation == generation {
                status.state = State::Ready;
            }
        });

        Ok(())
    }

    pub fn status(&self) -> Status {
        let status = self.status.lock().unwrap();
        Status {
            state: status.state,
            logs: status.logger.entries(),
            errors: status.logger.errors(),
            terminal_error: status.terminal_error.clone(),
        }
    }
}
