// Session state machine and the collection of known sessions

use log::{debug, info, warn};

use crate::errors::GallopError;
use crate::model::{RaceSession, SessionCollection, SessionProgress, SessionStatus};
use crate::storage::SessionStore;

/// Storage key of the session collection.
pub const SESSIONS_KEY: &str = "race_sessions";

/// What the caller has to do to pick a resolved session back up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumePlan {
    /// No race has started yet, begin with the first one
    Fresh,
    /// A race was cut short, reset it before going on
    Restart { index: usize },
    /// Carry on after the race last started
    Continue { current_race_index: Option<usize> },
    /// Every race is scored, nothing left to run
    Finished,
}

#[derive(Clone, Debug)]
pub struct Resumption {
    pub session: RaceSession,
    pub plan: ResumePlan,
}

/// Owns every session and is the only place that mutates them.
pub struct SessionLifecycle {
    store: Box<dyn SessionStore + Send>,
    key: String,
    sessions: Vec<RaceSession>,
    current: Option<String>,
}

impl SessionLifecycle {
    pub fn new(store: Box<dyn SessionStore + Send>) -> Self {
        Self::with_key(store, SESSIONS_KEY)
    }

    /// Load the sessions stored under `key`. Unreadable storage behaves as if
    /// nothing had been saved; invalid sessions are skipped.
    pub fn with_key(store: Box<dyn SessionStore + Send>, key: &str) -> Self {
        let collection = match store.load(key) {
            Ok(collection) => collection.unwrap_or_default(),
            Err(e) => {
                warn!("Could not load saved sessions, starting empty: {}", e);
                SessionCollection::default()
            }
        };

        let sessions: Vec<RaceSession> = collection
            .sessions
            .into_iter()
            .filter_map(|raw| match RaceSession::from_snapshot(raw) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!("Skipping saved session: {}", e);
                    None
                }
            })
            .collect();
        debug!("Loaded {} sessions", sessions.len());

        Self {
            store,
            key: key.to_string(),
            sessions,
            current: None,
        }
    }

    pub fn persist(&mut self) -> Result<(), GallopError> {
        let collection = SessionCollection::new(
            self.sessions
                .iter()
                .map(RaceSession::to_snapshot)
                .collect(),
        );
        self.store.save(&self.key, &collection)
    }

    fn position(&self, id: &str) -> Result<usize, GallopError> {
        self.sessions
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| GallopError::SessionNotFound { id: id.to_string() })
    }

    fn current_mut(&mut self) -> Result<&mut RaceSession, GallopError> {
        let id = self.current.as_deref().ok_or(GallopError::NoCurrentSession)?;
        let index = self.position(id)?;
        Ok(&mut self.sessions[index])
    }

    /// Create an active session and make it current.
    pub fn create_session(&mut self, name: &str) -> Result<RaceSession, GallopError> {
        let session = RaceSession::new(RaceSession::generate_id(), name.to_string());
        info!("Created session {} ({})", session.name(), session.id());
        self.current = Some(session.id().to_string());
        self.sessions.push(session.clone());
        self.persist()?;
        Ok(session)
    }

    pub fn current(&self) -> Option<&RaceSession> {
        let id = self.current.as_deref()?;
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn session(&self, id: &str) -> Option<&RaceSession> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    /// Store race-day progress into the current session and persist it.
    pub fn record_progress(&mut self, progress: SessionProgress) -> Result<(), GallopError> {
        self.current_mut()?.record_progress(progress)?;
        self.persist()
    }

    pub fn complete_current(&mut self) -> Result<(), GallopError> {
        let session = self.current_mut()?;
        session.complete()?;
        info!("Session {} completed", session.id());
        self.persist()
    }

    /// Interrupt the current session. Only sessions that started a race can be interrupted.
    pub fn interrupt_current(&mut self) -> Result<(), GallopError> {
        let session = self.current_mut()?;
        if !session.has_started_any_race() {
            return Err(GallopError::NoRaceStarted {
                id: session.id().to_string(),
            });
        }
        session.interrupt()?;
        info!("Session {} interrupted", session.id());
        self.persist()
    }

    /// Leave the current session. An active session that raced is interrupted,
    /// one that never started a race is dropped.
    pub fn exit_to_welcome(&mut self, started_any_race: bool) -> Result<(), GallopError> {
        let Some(id) = self.current.clone() else {
            return Ok(());
        };
        let Ok(index) = self.position(&id) else {
            self.current = None;
            return Ok(());
        };

        let session = &mut self.sessions[index];
        let result = match session.status() {
            SessionStatus::Active if started_any_race || session.has_started_any_race() => {
                session.interrupt().map(|_| {
                    info!("Session {} interrupted", id);
                })
            }
            SessionStatus::Active => {
                self.sessions.remove(index);
                info!("Discarded session {} that never started a race", id);
                Ok(())
            }
            SessionStatus::Interrupted | SessionStatus::Completed => Ok(()),
        };

        self.current = None;
        result?;
        self.persist()
    }

    /// Make `id` the current session and tell the caller how to pick it up.
    /// Interrupted sessions become active again.
    pub fn resolve_session(&mut self, id: &str) -> Result<Resumption, GallopError> {
        let index = self.position(id)?;
        let session = &mut self.sessions[index];

        if session.status() == SessionStatus::Interrupted {
            session.resume()?;
        } else {
            session.touch();
        }

        let plan = if session.status() == SessionStatus::Completed {
            ResumePlan::Finished
        } else if let Some(index) = session.interrupted_race_index() {
            ResumePlan::Restart { index }
        } else if session.has_started_any_race() {
            ResumePlan::Continue {
                current_race_index: session.current_race_index(),
            }
        } else {
            ResumePlan::Fresh
        };

        let session = session.clone();
        debug!("Resolved session {} with {:?}", id, plan);
        self.current = Some(id.to_string());
        self.persist()?;
        Ok(Resumption { session, plan })
    }

    /// Put the current session's race at `index` back to pending.
    pub fn reset_race(&mut self, index: usize) -> Result<RaceSession, GallopError> {
        let session = self.current_mut()?;
        session.restart_race(index)?;
        session.touch();
        info!(
            "Race {} of session {} reset to start again",
            index + 1,
            session.id()
        );
        let session = session.clone();
        self.persist()?;
        Ok(session)
    }

    pub fn all_sessions(&self) -> &[RaceSession] {
        &self.sessions
    }

    pub fn completed_sessions(&self) -> Vec<&RaceSession> {
        self.with_status(SessionStatus::Completed)
    }

    pub fn interrupted_sessions(&self) -> Vec<&RaceSession> {
        self.with_status(SessionStatus::Interrupted)
    }

    fn with_status(&self, status: SessionStatus) -> Vec<&RaceSession> {
        self.sessions.iter().filter(|s| s.status() == status).collect()
    }

    /// The interrupted session accessed most recently.
    pub fn last_interrupted_session(&self) -> Option<&RaceSession> {
        self.interrupted_sessions()
            .into_iter()
            .max_by_key(|s| s.last_accessed_at())
    }

    pub fn delete_session(&mut self, id: &str) -> Result<(), GallopError> {
        let index = self.position(id)?;
        self.sessions.remove(index);
        if self.current.as_deref() == Some(id) {
            self.current = None;
        }
        info!("Deleted session {}", id);
        self.persist()
    }

    /// Forget every session, including what storage holds.
    pub fn clear_all(&mut self) -> Result<(), GallopError> {
        self.sessions.clear();
        self.current = None;
        self.store.clear(&self.key)
    }
}
