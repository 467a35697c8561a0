// Race day data model: horses, races, results and sessions

pub mod horse;
pub mod outcome;
pub mod race;
pub mod session;

// Re-export commonly used types
pub use horse::Horse;
pub use outcome::{RaceOutcome, Ranking};
pub use race::{Race, RaceStatus};
pub use session::{
    RaceSession, SessionCollection, SessionProgress, SessionSnapshot, SessionStatus,
};
