// Race session envelope and its persisted snapshot form

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::debug;
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};

use crate::errors::GallopError;
use crate::program::scheduler::{RACE_DISTANCES, validate_program};

use super::{Horse, Race, RaceOutcome, RaceStatus};

/// Current format of persisted session collections.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Lifecycle of a race day session.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Being raced, or ready to be raced
    Active,
    /// Left while a race was under way, can be resumed
    Interrupted,
    /// All races scored
    Completed,
}

impl SessionStatus {
    /// Transition table for session statuses. Completed is terminal.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Active, Interrupted) | (Active, Completed) => true,
            (Interrupted, Active) => true,
            (Active, Active) | (Interrupted, _) | (Completed, _) => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Interrupted => write!(f, "interrupted"),
            SessionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Progress recorded into a session by auto-save and after every race.
///
/// Holds no live horse positions: an interrupted race restarts from the gate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionProgress {
    pub horses: Vec<Horse>,
    pub program: Vec<Race>,
    pub results: Vec<RaceOutcome>,
    pub current_race_index: Option<usize>,
}

/// Plain serialized form of a session, as handed to and received from storage.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub id: String,
    pub name: String,
    pub created_at: SystemTime,
    #[serde(default)]
    pub last_accessed_at: Option<SystemTime>,
    pub status: SessionStatus,
    #[serde(default)]
    pub horses: Vec<Horse>,
    #[serde(default)]
    pub program: Vec<Race>,
    #[serde(default)]
    pub results: Vec<RaceOutcome>,
    #[serde(default)]
    pub current_race_index: Option<usize>,
    /// Whether a race was ever started, kept once a cut-short race is reset
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub completed_races: usize,
    #[serde(default = "default_total_races")]
    pub total_races: usize,
}

fn default_total_races() -> usize {
    RACE_DISTANCES.len()
}

fn races_started(program: &[Race], results: &[RaceOutcome]) -> bool {
    !results.is_empty() || program.iter().any(|r| r.status != RaceStatus::Pending)
}

/// Everything persisted under one storage key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionCollection {
    pub version: u32,
    pub sessions: Vec<SessionSnapshot>,
}

impl SessionCollection {
    pub fn new(sessions: Vec<SessionSnapshot>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            sessions,
        }
    }
}

impl Default for SessionCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// A complete race day: horse pool, program, results and status.
///
/// Fields are read through accessors; every mutation goes through the
/// session lifecycle so status changes follow the transition table.
#[derive(Clone, Debug, PartialEq)]
pub struct RaceSession {
    id: String,
    name: String,
    created_at: SystemTime,
    last_accessed_at: SystemTime,
    status: SessionStatus,
    horses: Vec<Horse>,
    program: Vec<Race>,
    results: Vec<RaceOutcome>,
    current_race_index: Option<usize>,
    started: bool,
}

impl RaceSession {
    pub fn new(id: String, name: String) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            name,
            created_at: now,
            last_accessed_at: now,
            status: SessionStatus::Active,
            horses: Vec::new(),
            program: Vec::new(),
            results: Vec::new(),
            current_race_index: None,
            started: false,
        }
    }

    /// Generate a unique session identifier, e.g. `race_1718000000000_k3j9x0a1b`.
    pub fn generate_id() -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(9)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        format!("race_{}_{}", millis, suffix)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> SystemTime {
        self.last_accessed_at
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn horses(&self) -> &[Horse] {
        &self.horses
    }

    pub fn program(&self) -> &[Race] {
        &self.program
    }

    pub fn results(&self) -> &[RaceOutcome] {
        &self.results
    }

    /// Index of the race last started, `None` before the first one.
    pub fn current_race_index(&self) -> Option<usize> {
        self.current_race_index
    }

    pub fn completed_races(&self) -> usize {
        self.results.len()
    }

    pub fn total_races(&self) -> usize {
        if self.program.is_empty() {
            RACE_DISTANCES.len()
        } else {
            self.program.len()
        }
    }

    pub fn has_started_any_race(&self) -> bool {
        self.started || races_started(&self.program, &self.results)
    }

    /// Index of the race that was cut short, if any.
    pub fn interrupted_race_index(&self) -> Option<usize> {
        self.program.iter().position(|r| r.status.needs_restart())
    }

    pub(crate) fn progress(&self) -> SessionProgress {
        SessionProgress {
            horses: self.horses.clone(),
            program: self.program.clone(),
            results: self.results.clone(),
            current_race_index: self.current_race_index,
        }
    }

    /// Bump the last access time, keeping it strictly increasing on coarse clocks.
    pub(crate) fn touch(&mut self) {
        let now = SystemTime::now();
        self.last_accessed_at = if now > self.last_accessed_at {
            now
        } else {
            self.last_accessed_at + Duration::from_millis(1)
        };
    }

    pub(crate) fn transition(&mut self, next: SessionStatus) -> Result<(), GallopError> {
        if !self.status.can_transition_to(next) {
            return Err(GallopError::InvalidSessionTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        debug!("Session {} moves from {} to {}", self.id, self.status, next);
        self.status = next;
        Ok(())
    }

    pub(crate) fn record_progress(&mut self, progress: SessionProgress) -> Result<(), GallopError> {
        if self.status == SessionStatus::Completed {
            return Err(GallopError::SessionClosed {
                id: self.id.clone(),
            });
        }
        self.horses = progress.horses;
        self.program = progress.program;
        self.results = progress.results;
        self.current_race_index = progress.current_race_index;
        self.started = self.has_started_any_race();
        self.touch();
        Ok(())
    }

    /// Active -> Interrupted. The race under way, if any, is marked interrupted.
    pub(crate) fn interrupt(&mut self) -> Result<(), GallopError> {
        self.transition(SessionStatus::Interrupted)?;
        for race in self.program.iter_mut() {
            if race.status == RaceStatus::Running {
                race.transition(RaceStatus::Interrupted)?;
            }
        }
        self.touch();
        Ok(())
    }

    /// Interrupted -> Active.
    pub(crate) fn resume(&mut self) -> Result<(), GallopError> {
        self.transition(SessionStatus::Active)?;
        self.touch();
        Ok(())
    }

    /// Active -> Completed, only once every race has been scored.
    pub(crate) fn complete(&mut self) -> Result<(), GallopError> {
        if self.program.is_empty()
            || self
                .program
                .iter()
                .any(|r| r.status != RaceStatus::Completed)
        {
            return Err(GallopError::ProgramIncomplete {
                id: self.id.clone(),
            });
        }
        self.transition(SessionStatus::Completed)?;
        self.touch();
        Ok(())
    }

    /// Put the race at `index` back to pending so it runs again from the start.
    ///
    /// Earlier races still marked running are closed as completed, later races
    /// are left untouched, and the current index moves to the race before.
    pub(crate) fn restart_race(&mut self, index: usize) -> Result<(), GallopError> {
        if self.status == SessionStatus::Completed {
            return Err(GallopError::SessionClosed {
                id: self.id.clone(),
            });
        }
        if index >= self.program.len() {
            return Err(GallopError::InvalidProgram {
                reason: format!(
                    "cannot restart race {} of a {} race program",
                    index + 1,
                    self.program.len()
                ),
            });
        }
        self.program[index].transition(RaceStatus::Pending)?;
        self.started = true;
        for race in self.program[..index].iter_mut() {
            if race.status == RaceStatus::Running {
                race.transition(RaceStatus::Completed)?;
            }
        }
        self.current_race_index = index.checked_sub(1);
        Ok(())
    }

    pub fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            last_accessed_at: Some(self.last_accessed_at),
            status: self.status,
            horses: self.horses.clone(),
            program: self.program.clone(),
            results: self.results.clone(),
            current_race_index: self.current_race_index,
            started: self.started,
            completed_races: self.completed_races(),
            total_races: self.total_races(),
        }
    }

    /// Rebuild a session from its plain snapshot, validating everything that
    /// crossed the storage boundary.
    pub fn from_snapshot(raw: SessionSnapshot) -> Result<Self, GallopError> {
        let invalid = |reason: String| GallopError::InvalidSnapshot {
            id: raw.id.clone(),
            reason,
        };

        if raw.id.trim().is_empty() {
            return Err(invalid("session id is empty".to_string()));
        }

        let mut colors = HashSet::new();
        for horse in &raw.horses {
            horse.validate().map_err(|e| invalid(e.to_string()))?;
            if !colors.insert(horse.color.as_str()) {
                return Err(invalid(format!(
                    "color {} is used by more than one horse",
                    horse.color
                )));
            }
        }

        if !raw.program.is_empty() {
            validate_program(&raw.program).map_err(&invalid)?;
            for race in &raw.program {
                for horse in &race.horses {
                    horse.validate().map_err(|e| invalid(e.to_string()))?;
                }
            }
        }
        let running = raw
            .program
            .iter()
            .filter(|r| r.status == RaceStatus::Running)
            .count();
        if running > 1 {
            return Err(invalid(format!("{} races are marked running", running)));
        }

        if raw.results.len() > raw.program.len() {
            return Err(invalid(format!(
                "{} results recorded for a {} race program",
                raw.results.len(),
                raw.program.len()
            )));
        }
        for result in &raw.results {
            result.validate().map_err(&invalid)?;
        }

        if let Some(index) = raw.current_race_index {
            if index >= raw.program.len() {
                return Err(invalid(format!(
                    "current race index {} is outside the program",
                    index
                )));
            }
        }

        if raw.status == SessionStatus::Completed
            && raw
                .program
                .iter()
                .any(|r| matches!(r.status, RaceStatus::Pending | RaceStatus::Running))
        {
            return Err(invalid(
                "completed session still has races to run".to_string(),
            ));
        }

        if raw.completed_races != raw.results.len() {
            debug!(
                "Session {} reported {} completed races but holds {} results",
                raw.id,
                raw.completed_races,
                raw.results.len()
            );
        }

        Ok(Self {
            last_accessed_at: raw.last_accessed_at.unwrap_or(raw.created_at),
            id: raw.id,
            name: raw.name,
            created_at: raw.created_at,
            status: raw.status,
            horses: raw.horses,
            program: raw.program,
            results: raw.results,
            current_race_index: raw.current_race_index,
            started: raw.started,
        })
    }
}
