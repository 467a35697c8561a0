// Race simulation: speed model, ranking and real-time animation

pub mod animator;
pub mod outcome;
pub mod performance;

pub use animator::{HorsePosition, RaceAnimator, RaceRun, race_duration};
pub use outcome::{base_time, compute_outcome, rank_field, sample_speeds};
pub use performance::speed_factor;
