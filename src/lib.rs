// Library interface for gallop
// This allows integration tests and benchmarks to access internal modules

pub mod config;
pub mod errors;
pub mod model;
pub mod program;
pub mod session;
pub mod simulation;
pub mod storage;
pub mod writer;

// Re-export commonly used types
pub use config::RaceConfig;
pub use errors::GallopError;
pub use model::{Horse, Race, RaceOutcome, RaceSession, RaceStatus, Ranking, SessionStatus};
pub use session::{ProgramRun, RaceDirector, RacePhase, ResumePlan, SessionLifecycle};
pub use simulation::{HorsePosition, RaceAnimator, RaceRun};
pub use storage::{FileBasedStorage, MemoryStorage, SessionStore};
