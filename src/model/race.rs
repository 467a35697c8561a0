use serde::{Deserialize, Serialize};

use crate::errors::GallopError;

use super::Horse;

/// Lifecycle of a single race within a program.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RaceStatus {
    /// Not started yet
    #[default]
    Pending,
    /// Currently animating; at most one race per program
    Running,
    /// Scored, its result is recorded
    Completed,
    /// Was running when its session got interrupted
    Interrupted,
}

impl RaceStatus {
    /// Transition table for race statuses.
    pub fn can_transition_to(self, next: RaceStatus) -> bool {
        use RaceStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Running, Completed) | (Running, Interrupted) | (Running, Pending) => true,
            (Interrupted, Pending) => true,
            (Pending, _) | (Running, _) | (Interrupted, _) | (Completed, _) => false,
        }
    }

    /// Whether a race in this status was cut short and must be run again.
    pub fn needs_restart(self) -> bool {
        matches!(self, RaceStatus::Running | RaceStatus::Interrupted)
    }
}

impl std::fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaceStatus::Pending => write!(f, "pending"),
            RaceStatus::Running => write!(f, "running"),
            RaceStatus::Completed => write!(f, "completed"),
            RaceStatus::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// One round of the program: a fixed distance run by a field of horses.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Race {
    /// Round number, starting at 1
    pub round: u32,
    /// Distance in meters
    pub distance: u32,
    /// Horses entered in this race
    pub horses: Vec<Horse>,
    #[serde(default)]
    pub status: RaceStatus,
}

impl Race {
    pub fn new(round: u32, distance: u32, horses: Vec<Horse>) -> Self {
        Self {
            round,
            distance,
            horses,
            status: RaceStatus::Pending,
        }
    }

    /// Move the race to `next`, rejecting transitions outside the table.
    pub fn transition(&mut self, next: RaceStatus) -> Result<(), GallopError> {
        if !self.status.can_transition_to(next) {
            return Err(GallopError::InvalidRaceTransition {
                round: self.round,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Round number with its English ordinal suffix ("1st", "12th", "22nd").
    pub fn ordinal(&self) -> String {
        ordinal(self.round)
    }

    /// Display title, e.g. "1st Lap - 1200m".
    pub fn title(&self) -> String {
        format!("{} Lap - {}m", self.ordinal(), self.distance)
    }
}

pub(crate) fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}
