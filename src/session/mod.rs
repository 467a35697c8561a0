// Session lifecycle, race-day orchestration and the timers they own

pub mod director;
pub mod lifecycle;
pub mod timers;

pub use director::{ProgramRun, RaceDirector, RacePhase};
pub use lifecycle::{ResumePlan, Resumption, SESSIONS_KEY, SessionLifecycle};
pub use timers::TimerHandle;
