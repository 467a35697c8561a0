use serde::{Deserialize, Serialize};

use crate::errors::GallopError;

/// Lowest condition score a horse can have.
pub const MIN_CONDITION: u8 = 1;
/// Highest condition score a horse can have.
pub const MAX_CONDITION: u8 = 100;

/// A racing horse. Its condition drives race performance and its color
/// identifies it on the track, so colors are unique within a pool.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Horse {
    /// Unique identifier within the pool
    pub id: u32,
    /// Display name, e.g. "Thunder Runner"
    pub name: String,
    /// Condition score (1-100)
    pub condition: u8,
    /// Hex color used to draw the horse
    pub color: String,
}

impl Horse {
    /// Create a horse, rejecting out-of-range conditions and empty names.
    pub fn new(id: u32, name: String, condition: u8, color: String) -> Result<Self, GallopError> {
        let horse = Self {
            id,
            name,
            condition,
            color,
        };
        horse.validate()?;
        Ok(horse)
    }

    /// Check the invariants of a horse that crossed a serialization boundary.
    pub fn validate(&self) -> Result<(), GallopError> {
        if self.name.trim().is_empty() {
            return Err(GallopError::InvalidHorse {
                field: "name".to_string(),
                reason: format!("horse {} has an empty name", self.id),
            });
        }
        if !(MIN_CONDITION..=MAX_CONDITION).contains(&self.condition) {
            return Err(GallopError::InvalidHorse {
                field: "condition".to_string(),
                reason: format!(
                    "condition {} of horse {} is outside {}-{}",
                    self.condition, self.id, MIN_CONDITION, MAX_CONDITION
                ),
            });
        }
        Ok(())
    }

    /// Condition as a fraction in (0, 1].
    pub fn condition_ratio(&self) -> f64 {
        f64::from(self.condition) / f64::from(MAX_CONDITION)
    }
}

impl std::fmt::Display for Horse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {} ({}%)", self.id, self.name, self.condition)
    }
}
