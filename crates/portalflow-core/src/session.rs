//! Session store.
//!
//! A session owns exactly one browser page from `create` until it is removed.
//! Removal takes the entry out of the map first and only then closes the page,
//! so a page is closed by whoever removed its session and nobody else.

use crate::error::{OrchestratorError, Result};
use crate::fields::AccumulatedFields;
use crate::task::TaskType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portalflow_browser::{BrowserDriver, BrowserPage, LaunchOptions};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mutable part of a session, guarded so only one call drives it at a time.
pub struct SessionState {
    pub page: Box<dyn BrowserPage>,
    pub fields: AccumulatedFields,
    current_step: Option<usize>,
    current_tag: Option<&'static str>,
}

impl SessionState {
    fn new(page: Box<dyn BrowserPage>) -> Self {
        Self {
            page,
            fields: AccumulatedFields::new(),
            current_step: None,
            current_tag: None,
        }
    }

    /// Index of the last completed step.
    pub fn current_step(&self) -> Option<usize> {
        self.current_step
    }

    pub fn current_tag(&self) -> Option<&'static str> {
        self.current_tag
    }

    /// Records a completed step. Never moves backwards.
    pub fn advance_to(&mut self, index: usize, tag: &'static str) {
        if self.current_step.is_none_or(|current| index > current) {
            self.current_step = Some(index);
            self.current_tag = Some(tag);
        }
    }
}

pub struct Session {
    pub id: String,
    pub task: TaskType,
    pub created_at: DateTime<Utc>,
    last_activity: parking_lot::Mutex<Instant>,
    state: Mutex<SessionState>,
}

impl Session {
    fn new(id: String, task: TaskType, page: Box<dyn BrowserPage>) -> Self {
        Self {
            id,
            task,
            created_at: Utc::now(),
            last_activity: parking_lot::Mutex::new(Instant::now()),
            state: Mutex::new(SessionState::new(page)),
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Claims the session for one call, or fails if another call holds it.
    pub fn try_claim(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.state
            .try_lock()
            .map_err(|_| OrchestratorError::SessionBusy(self.id.clone()))
    }

    pub async fn claim(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Err(err) = state.page.close().await {
            warn!(session_id = %self.id, error = %err, "Failed to close browser page");
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Opens a fresh page and registers a new session around it.
    async fn create(&self, task: TaskType) -> Result<Arc<Session>>;

    async fn get(&self, id: &str) -> Result<Arc<Session>>;

    /// Removes the session and closes its page. Returns whether it existed.
    async fn remove(&self, id: &str) -> bool;

    /// Removes every session idle for longer than `max_age`; returns their ids.
    async fn sweep(&self, max_age: Duration) -> Vec<String>;

    async fn len(&self) -> usize;
}

/// Single-process store backed by a map behind an async `RwLock`.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    driver: Arc<dyn BrowserDriver>,
    launch: LaunchOptions,
}

impl InMemorySessionStore {
    pub fn new(driver: Arc<dyn BrowserDriver>, launch: LaunchOptions) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            driver,
            launch,
        }
    }

    async fn detach(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(id)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, task: TaskType) -> Result<Arc<Session>> {
        let page = self
            .driver
            .open(&self.launch)
            .await
            .map_err(|err| OrchestratorError::ResourceUnavailable(err.to_string()))?;

        let mut sessions = self.sessions.write().await;
        let mut id = Uuid::new_v4().to_string();
        while sessions.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }

        let session = Arc::new(Session::new(id.clone(), task, page));
        sessions.insert(id, session.clone());
        info!(session_id = %session.id, task = %task, "Session created");
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::SessionExpiredOrNotFound(id.to_string()))
    }

    async fn remove(&self, id: &str) -> bool {
        let Some(session) = self.detach(id).await else {
            return false;
        };
        session.close().await;
        debug!(session_id = %id, "Session removed");
        true
    }

    async fn sweep(&self, max_age: Duration) -> Vec<String> {
        let candidates: Vec<Arc<Session>> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|session| session.idle_for() > max_age)
                .cloned()
                .collect()
        };

        let mut removed = Vec::with_capacity(candidates.len());
        for session in candidates {
            // A call still driving the session keeps it alive.
            let Ok(mut state) = session.try_claim() else {
                debug!(session_id = %session.id, "Skipping busy session in sweep");
                continue;
            };
            let idle = session.idle_for();
            if idle <= max_age {
                continue;
            }

            {
                let mut sessions = self.sessions.write().await;
                let registered = sessions
                    .get(&session.id)
                    .is_some_and(|current| Arc::ptr_eq(current, &session));
                if !registered {
                    continue;
                }
                sessions.remove(&session.id);
            }

            if let Err(err) = state.page.close().await {
                warn!(session_id = %session.id, error = %err, "Failed to close browser page");
            }
            info!(
                session_id = %session.id,
                task = %session.task,
                created_at = %session.created_at,
                idle_secs = idle.as_secs(),
                "Swept idle session"
            );
            removed.push(session.id.clone());
        }
        removed
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
