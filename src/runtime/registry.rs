use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::error::{AppError, Result};
use crate::pipeline::RegimePipeline;
use crate::runtime::event::SessionEvent;
use crate::runtime::session::RealtimeSession;

/// Real-time sessions keyed by id. At most one of them runs at a time.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Arc<RealtimeSession>>,
}

pub fn new_session_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("rt-{}", &id[..8])
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        pipeline: RegimePipeline,
        settings: &EngineSettings,
        events: Option<mpsc::Sender<SessionEvent>>,
    ) -> Result<Arc<RealtimeSession>> {
        let mut session = RealtimeSession::new(new_session_id(), pipeline, settings)?;
        if let Some(tx) = events {
            session = session.with_events(tx);
        }
        Ok(self.insert(session))
    }

    /// Register `session`, replacing any previous one under the same id.
    pub fn insert(&mut self, session: RealtimeSession) -> Arc<RealtimeSession> {
        let id = session.id().to_string();
        let session = Arc::new(session);
        if let Some(existing) = self.sessions.insert(id.clone(), Arc::clone(&session)) {
            if let Err(e) = existing.stop() {
                tracing::warn!(session_id = %id, error = %e, "Replaced session could not be stopped");
            }
        }
        tracing::info!(session_id = %id, "Session registered");
        session
    }

    pub fn get(&self, id: &str) -> Result<Arc<RealtimeSession>> {
        self.sessions
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    /// Start `id` unless a different session is already running.
    ///
    /// Takes `&mut self` so the busy check and the start happen under one
    /// exclusive borrow; share the registry behind a `Mutex` across threads.
    pub fn start(&mut self, id: &str) -> Result<bool> {
        let session = self.get(id)?;
        if let Some(running) = self.running_session_id()? {
            if running != id {
                return Err(AppError::SessionBusy(running));
            }
        }
        session.start()
    }

    pub fn stop(&self, id: &str) -> Result<bool> {
        self.get(id)?.stop()
    }

    /// Stop and drop `id`.
    pub fn remove(&mut self, id: &str) -> Result<Arc<RealtimeSession>> {
        let session = self
            .sessions
            .remove(id)
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;
        session.stop()?;
        tracing::info!(session_id = %id, "Session removed");
        Ok(session)
    }

    pub fn running_session_id(&self) -> Result<Option<String>> {
        for (id, session) in &self.sessions {
            if session.is_running()? {
                return Ok(Some(id.clone()));
            }
        }
        Ok(None)
    }

    /// Session ids in lexical order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
