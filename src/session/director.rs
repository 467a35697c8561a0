// Orchestrates a race day: runs races one after another and keeps the
// current session in step with what happens on the track.

use std::{
    collections::HashMap,
    ops::ControlFlow,
    sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc::Sender},
    time::Duration,
};

use log::{debug, info, warn};
use tokio::time::{Instant, sleep};

use crate::{
    config::RaceConfig,
    errors::GallopError,
    model::{Horse, Race, RaceOutcome, RaceSession, RaceStatus, SessionProgress, SessionStatus},
    program::{build_program, generate_pool},
    simulation::{HorsePosition, RaceAnimator, RaceRun},
};

use super::{
    lifecycle::{ResumePlan, Resumption, SessionLifecycle},
    timers::TimerHandle,
};

/// What the track is showing right now.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RacePhase {
    #[default]
    Idle,
    /// Horses are on the track, waiting to be rendered
    Preparing,
    Countdown,
    Running,
    /// Showing the result of the race that just finished
    Announcing(RaceOutcome),
    /// Every race of the program is done
    Finished,
}

/// How a call to `start_all_races` ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramRun {
    Completed,
    Cancelled,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live state of the race day. Positions and the race clock never leave memory.
#[derive(Debug, Default)]
struct RaceDay {
    horses: Vec<Horse>,
    program: Vec<Race>,
    results: Vec<RaceOutcome>,
    current_race_index: Option<usize>,
    racing: bool,
    has_started_any_race: bool,
    positions: HashMap<u32, HorsePosition>,
    phase: RacePhase,
    race_started_at: Option<Instant>,
    race_clock: Duration,
    /// Bumped on every pause so loops started earlier notice they are stale
    epoch: u64,
    /// Bumped whenever the whole day is replaced by another session or pool
    generation: u64,
}

impl RaceDay {
    fn from_session(session: &RaceSession, epoch: u64, generation: u64) -> Self {
        Self {
            horses: session.horses().to_vec(),
            program: session.program().to_vec(),
            results: session.results().to_vec(),
            current_race_index: session.current_race_index(),
            has_started_any_race: session.has_started_any_race(),
            phase: if session.status() == SessionStatus::Completed {
                RacePhase::Finished
            } else {
                RacePhase::Idle
            },
            epoch,
            generation,
            ..Default::default()
        }
    }

    fn progress(&self) -> SessionProgress {
        SessionProgress {
            horses: self.horses.clone(),
            program: self.program.clone(),
            results: self.results.clone(),
            current_race_index: self.current_race_index,
        }
    }

    fn next_index(&self) -> usize {
        self.current_race_index.map_or(0, |index| index + 1)
    }

    fn has_more_races(&self) -> bool {
        self.next_index() < self.program.len()
    }
}

/// Cheap to clone handle driving one race day. Clones share all state, so a
/// clone can stop a race another clone is running.
#[derive(Clone)]
pub struct RaceDirector {
    day: Arc<Mutex<RaceDay>>,
    lifecycle: Arc<Mutex<SessionLifecycle>>,
    config: RaceConfig,
    animator: RaceAnimator,
    timers: TimerHandle,
    results_feed: Option<Sender<RaceOutcome>>,
}

impl RaceDirector {
    pub fn new(lifecycle: SessionLifecycle, config: RaceConfig) -> Self {
        Self {
            day: Arc::new(Mutex::new(RaceDay::default())),
            lifecycle: Arc::new(Mutex::new(lifecycle)),
            animator: config.animator(),
            config,
            timers: TimerHandle::new(),
            results_feed: None,
        }
    }

    /// Send every finished race result to `feed` as well.
    pub fn with_results_feed(mut self, feed: Sender<RaceOutcome>) -> Self {
        self.results_feed = Some(feed);
        self
    }

    fn day(&self) -> MutexGuard<'_, RaceDay> {
        lock(&self.day)
    }

    fn lifecycle(&self) -> MutexGuard<'_, SessionLifecycle> {
        lock(&self.lifecycle)
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn timers(&self) -> &TimerHandle {
        &self.timers
    }

    /// Create a session and prepare a fresh horse pool and program for it.
    pub fn initialize_game(&self, name: &str) -> Result<RaceSession, GallopError> {
        self.exit_to_welcome()?;
        self.lifecycle().create_session(name)?;

        let horses = generate_pool(self.config.pool_size)?;
        self.reset_day(horses);
        self.generate_program()?;
        self.save_progress()?;

        self.current_session().ok_or(GallopError::NoCurrentSession)
    }

    fn reset_day(&self, horses: Vec<Horse>) {
        let mut day = self.day();
        *day = RaceDay {
            horses,
            epoch: day.epoch,
            generation: day.generation + 1,
            ..Default::default()
        };
    }

    /// Draw a new program from the current horse pool.
    pub fn generate_program(&self) -> Result<(), GallopError> {
        let mut day = self.day();
        let program = build_program(&day.horses)?;
        day.program = program;
        day.current_race_index = None;
        Ok(())
    }

    /// Replace horses and program. Only allowed before the first race starts.
    pub fn regenerate(&self) -> Result<(), GallopError> {
        if !self.can_regenerate() {
            return Err(GallopError::RegenerationNotAllowed);
        }

        self.pause_racing();
        let horses = generate_pool(self.config.pool_size)?;
        self.reset_day(horses);
        self.generate_program()?;
        info!("Regenerated horses and program");
        self.save_progress()
    }

    fn save_progress(&self) -> Result<(), GallopError> {
        let progress = self.day().progress();
        self.lifecycle().record_progress(progress)
    }

    /// Run the next pending race of the program.
    ///
    /// Returns `None` when a race is already running or none is left. A race
    /// stopped by `pause_racing` or `exit_to_welcome` yields
    /// `RaceRun::Cancelled`, records nothing and is pending again, so the
    /// next call runs it from the gate.
    pub async fn start_next_race(&self) -> Result<Option<RaceRun>, GallopError> {
        let (index, generation, race) = {
            let mut day = self.day();
            if day.racing || !day.has_more_races() {
                return Ok(None);
            }
            let index = day.next_index();
            day.program[index].transition(RaceStatus::Running)?;
            day.current_race_index = Some(index);
            day.racing = true;
            day.has_started_any_race = true;
            day.positions.clear();
            day.race_clock = Duration::ZERO;
            day.phase = RacePhase::Preparing;
            (index, day.generation, day.program[index].clone())
        };
        info!("Starting {} with {} horses", race.title(), race.horses.len());

        sleep(self.config.render_delay()).await;
        if !self.is_racing() {
            return self.abandon_race(index, generation);
        }
        self.day().phase = RacePhase::Countdown;
        sleep(self.config.countdown()).await;
        if !self.is_racing() {
            return self.abandon_race(index, generation);
        }

        self.timers.cancel_all();
        self.start_race_timers();
        self.day().phase = RacePhase::Running;

        let day = Arc::clone(&self.day);
        let run = self
            .animator
            .animate(&race, self.config.race_duration(race.distance), move |positions| {
                let mut day = lock(&day);
                if !day.racing {
                    return ControlFlow::Break(());
                }
                for position in positions {
                    day.positions.insert(position.horse_id, *position);
                }
                ControlFlow::Continue(())
            })
            .await;

        self.timers.cancel_all();

        let RaceRun::Finished(outcome) = run else {
            debug!("{} produced no result", race.title());
            return self.abandon_race(index, generation);
        };
        outcome
            .validate()
            .map_err(|reason| GallopError::InvalidOutcome { reason })?;

        {
            // Check and record under one lock
            let mut day = self.day();
            if !day.racing || day.generation != generation {
                drop(day);
                return self.abandon_race(index, generation);
            }
            let Some(finished) = day.program.get_mut(index) else {
                drop(day);
                return self.abandon_race(index, generation);
            };
            finished.transition(RaceStatus::Completed)?;
            day.results.push(outcome.clone());
            day.racing = false;
            day.race_started_at = None;
            day.phase = RacePhase::Announcing(outcome.clone());
            self.lifecycle().record_progress(day.progress())?;
        }

        if let Some(feed) = &self.results_feed {
            feed.send(outcome.clone())?;
        }
        Ok(Some(RaceRun::Finished(outcome)))
    }

    /// Put a cancelled race back to pending unless the day moved on meanwhile.
    fn abandon_race(&self, index: usize, generation: u64) -> Result<Option<RaceRun>, GallopError> {
        let mut day = self.day();
        if day.generation != generation || day.racing {
            return Ok(Some(RaceRun::Cancelled));
        }
        let running = day
            .program
            .get(index)
            .is_some_and(|race| race.status == RaceStatus::Running);
        if running {
            day.program[index].transition(RaceStatus::Pending)?;
            day.current_race_index = index.checked_sub(1);
            day.positions.clear();
            day.race_clock = Duration::ZERO;
            day.phase = RacePhase::Idle;
            info!("Race {} will start again from the gate", index + 1);
        }
        Ok(Some(RaceRun::Cancelled))
    }

    fn start_race_timers(&self) {
        self.day().race_started_at = Some(Instant::now());

        let day = Arc::clone(&self.day);
        self.timers
            .start("race clock", self.config.clock_interval(), move || {
                let mut day = lock(&day);
                if let Some(started) = day.race_started_at {
                    day.race_clock = started.elapsed();
                }
            });

        let day = Arc::clone(&self.day);
        let lifecycle = Arc::clone(&self.lifecycle);
        self.timers
            .start("autosave", self.config.autosave_interval(), move || {
                let progress = {
                    let day = lock(&day);
                    if !day.racing {
                        return;
                    }
                    day.progress()
                };
                if let Err(e) = lock(&lifecycle).record_progress(progress) {
                    warn!("Auto-save failed: {}", e);
                }
            });
    }

    /// Run every remaining race, announcing each result, then complete the
    /// session. A race cut short earlier is reset and run again first.
    pub async fn start_all_races(&self) -> Result<ProgramRun, GallopError> {
        let restart = self
            .day()
            .program
            .iter()
            .position(|r| r.status.needs_restart());
        if let Some(index) = restart {
            self.reset_interrupted_race(index)?;
        }

        let epoch = {
            let mut day = self.day();
            day.has_started_any_race = true;
            day.epoch
        };
        let still_current = || self.day().epoch == epoch;

        loop {
            let has_more = self.day().has_more_races();
            if !has_more {
                break;
            }

            match self.start_next_race().await? {
                Some(RaceRun::Finished(outcome)) => {
                    info!("{}", outcome);
                }
                Some(RaceRun::Cancelled) | None => return Ok(ProgramRun::Cancelled),
            }

            sleep(self.config.announcement()).await;
            if !still_current() {
                return Ok(ProgramRun::Cancelled);
            }
            self.day().phase = RacePhase::Idle;
            self.save_progress()?;

            sleep(self.config.between_races()).await;
            if !still_current() {
                return Ok(ProgramRun::Cancelled);
            }
        }

        self.day().phase = RacePhase::Finished;
        let active = self
            .current_session()
            .is_some_and(|s| s.status() == SessionStatus::Active);
        if active {
            self.lifecycle().complete_current()?;
        }
        Ok(ProgramRun::Completed)
    }

    /// Stop racing and cancel every timer. The race in flight, if any, ends
    /// as cancelled at its next tick.
    pub fn pause_racing(&self) {
        let cancelled = self.timers.cancel_all();
        let mut day = self.day();
        if day.racing {
            info!("Racing paused");
        }
        day.racing = false;
        day.race_started_at = None;
        day.epoch += 1;
        debug!("Paused with {} timers cancelled", cancelled);
    }

    /// Leave the current session: racing stops, progress is saved and the
    /// session is interrupted, or dropped if it never started a race.
    pub fn exit_to_welcome(&self) -> Result<(), GallopError> {
        self.pause_racing();

        let (started, progress) = {
            let day = self.day();
            (day.has_started_any_race, day.progress())
        };
        {
            let mut lifecycle = self.lifecycle();
            let active = lifecycle
                .current()
                .is_some_and(|s| s.status() == SessionStatus::Active);
            if started && active {
                lifecycle.record_progress(progress)?;
            }
            lifecycle.exit_to_welcome(started)?;
        }

        self.reset_day(Vec::new());
        Ok(())
    }

    /// Open a known session, resetting a race that was cut short.
    pub fn open_session(&self, id: &str) -> Result<Resumption, GallopError> {
        let switching = self.current_session().is_some_and(|s| s.id() != id);
        if switching {
            self.exit_to_welcome()?;
        }
        self.pause_racing();

        let mut resumption = self.lifecycle().resolve_session(id)?;
        self.load_day(&resumption.session);

        if let ResumePlan::Restart { index } = resumption.plan {
            self.reset_interrupted_race(index)?;
            if let Some(session) = self.current_session() {
                resumption.session = session;
            }
        }
        info!(
            "Opened session {} at {} of {} races",
            resumption.session.name(),
            resumption.session.completed_races(),
            resumption.session.total_races()
        );
        Ok(resumption)
    }

    /// Put the race at `index` back to pending so it runs again from the
    /// start, with every timer cancelled first.
    pub fn reset_interrupted_race(&self, index: usize) -> Result<(), GallopError> {
        self.pause_racing();
        let session = self.lifecycle().reset_race(index)?;
        self.load_day(&session);
        Ok(())
    }

    fn load_day(&self, session: &RaceSession) {
        let mut day = self.day();
        *day = RaceDay::from_session(session, day.epoch, day.generation + 1);
    }

    pub fn phase(&self) -> RacePhase {
        self.day().phase.clone()
    }

    pub fn is_racing(&self) -> bool {
        self.day().racing
    }

    /// Live positions of the race under way, by horse id.
    pub fn positions(&self) -> Vec<HorsePosition> {
        let mut positions: Vec<HorsePosition> = self.day().positions.values().copied().collect();
        positions.sort_by_key(|p| p.horse_id);
        positions
    }

    /// Horse furthest ahead in the race under way.
    pub fn leader(&self) -> Option<(Horse, HorsePosition)> {
        let day = self.day();
        let position = *day
            .positions
            .values()
            .max_by(|a, b| a.progress.total_cmp(&b.progress))?;
        let horse = day
            .horses
            .iter()
            .find(|h| h.id == position.horse_id)?
            .clone();
        Some((horse, position))
    }

    /// Time since the current race left the gate.
    pub fn race_clock(&self) -> Duration {
        self.day().race_clock
    }

    pub fn horses(&self) -> Vec<Horse> {
        self.day().horses.clone()
    }

    pub fn program(&self) -> Vec<Race> {
        self.day().program.clone()
    }

    pub fn results(&self) -> Vec<RaceOutcome> {
        self.day().results.clone()
    }

    pub fn completed_races(&self) -> usize {
        self.day().results.len()
    }

    pub fn current_race_index(&self) -> Option<usize> {
        self.day().current_race_index
    }

    pub fn current_race(&self) -> Option<Race> {
        let day = self.day();
        day.program.get(day.current_race_index?).cloned()
    }

    pub fn has_more_races(&self) -> bool {
        self.day().has_more_races()
    }

    pub fn can_regenerate(&self) -> bool {
        let day = self.day();
        !day.has_started_any_race && day.results.is_empty()
    }

    pub fn current_session(&self) -> Option<RaceSession> {
        self.lifecycle().current().cloned()
    }

    pub fn sessions(&self) -> Vec<RaceSession> {
        self.lifecycle().all_sessions().to_vec()
    }

    pub fn last_interrupted_session(&self) -> Option<RaceSession> {
        self.lifecycle().last_interrupted_session().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn director() -> RaceDirector {
        RaceDirector::new(
            SessionLifecycle::new(Box::new(MemoryStorage::new())),
            RaceConfig::default(),
        )
    }

    #[test]
    fn test_initialize_game_prepares_program() {
        let director = director();
        let session = director.initialize_game("Opening Day").unwrap();

        assert_eq!(session.name(), "Opening Day");
        assert_eq!(session.horses().len(), 20);
        assert_eq!(session.program().len(), 6);
        assert_eq!(director.program().len(), 6);
        assert_eq!(director.phase(), RacePhase::Idle);
        assert!(director.can_regenerate());
        assert!(director.has_more_races());
    }

    #[test]
    fn test_generate_program_without_horses() {
        let director = director();
        assert!(matches!(
            director.generate_program(),
            Err(GallopError::NoHorsesAvailable)
        ));
    }

    #[test]
    fn test_regenerate_replaces_pool_before_racing() {
        let director = director();
        director.initialize_game("Redraw").unwrap();
        let before = director.program();

        director.regenerate().unwrap();

        assert_eq!(director.program().len(), 6);
        assert_ne!(director.program(), before);
        assert_eq!(director.current_session().unwrap().program(), director.program());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_race_updates_day_and_session() {
        let director = director();
        director.initialize_game("One Race").unwrap();

        let run = director.start_next_race().await.unwrap().unwrap();

        let outcome = run.outcome().unwrap().clone();
        assert_eq!(director.phase(), RacePhase::Announcing(outcome.clone()));
        assert_eq!(director.results(), vec![outcome]);
        assert_eq!(director.current_race_index(), Some(0));
        assert_eq!(director.timers().active_count(), 0);
        assert!(!director.is_racing());
        assert!(director.race_clock() > Duration::ZERO);

        let session = director.current_session().unwrap();
        assert_eq!(session.completed_races(), 1);
        assert_eq!(session.program()[0].status, RaceStatus::Completed);
        assert_eq!(session.program()[1].status, RaceStatus::Pending);

        assert!(matches!(
            director.regenerate(),
            Err(GallopError::RegenerationNotAllowed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_countdown_cancels() {
        let director = director();
        director.initialize_game("Paused").unwrap();
        let runner = director.clone();

        let handle = tokio::spawn(async move { runner.start_next_race().await });
        sleep(Duration::from_secs(2)).await;
        assert_eq!(director.phase(), RacePhase::Countdown);
        director.pause_racing();

        let run = handle.await.unwrap().unwrap();
        assert_eq!(run, Some(RaceRun::Cancelled));
        assert!(director.results().is_empty());
        assert_eq!(director.timers().active_count(), 0);
        assert_eq!(director.program()[0].status, RaceStatus::Pending);
        assert_eq!(director.current_race_index(), None);
        assert_eq!(director.phase(), RacePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_race_after_pause_is_the_same_round() {
        let director = director();
        director.initialize_game("Second Try").unwrap();
        let runner = director.clone();

        let handle = tokio::spawn(async move { runner.start_next_race().await });
        sleep(Duration::from_secs(2)).await;
        director.pause_racing();
        assert!(handle.await.unwrap().unwrap().unwrap().is_cancelled());

        let run = director.start_next_race().await.unwrap().unwrap();

        assert_eq!(run.outcome().unwrap().race_round, 1);
        assert_eq!(director.results().len(), 1);
        assert_eq!(director.program()[0].status, RaceStatus::Completed);
        assert_eq!(director.program()[1].status, RaceStatus::Pending);
        assert_eq!(director.current_race_index(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_mid_race_then_run_the_whole_program() {
        let director = director();
        director.initialize_game("Paused Day").unwrap();
        let runner = director.clone();

        let handle = tokio::spawn(async move { runner.start_all_races().await });
        sleep(Duration::from_secs(10)).await;
        assert_eq!(director.phase(), RacePhase::Running);
        director.pause_racing();
        assert_eq!(handle.await.unwrap().unwrap(), ProgramRun::Cancelled);
        assert_eq!(director.program()[0].status, RaceStatus::Pending);

        assert_eq!(director.start_all_races().await.unwrap(), ProgramRun::Completed);

        let rounds: Vec<u32> = director.results().iter().map(|o| o.race_round).collect();
        assert_eq!(rounds, vec![1, 2, 3, 4, 5, 6]);
        let session = director.current_session().unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.completed_races(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_while_running_cancels_without_error() {
        let director = director();
        let id = director.initialize_game("Walk Out").unwrap().id().to_string();
        let runner = director.clone();

        let handle = tokio::spawn(async move { runner.start_next_race().await });
        sleep(Duration::from_secs(10)).await;
        director.exit_to_welcome().unwrap();

        let run = handle.await.unwrap().unwrap();
        assert_eq!(run, Some(RaceRun::Cancelled));
        assert!(director.current_session().is_none());
        assert!(director.program().is_empty());
        assert_eq!(
            director.last_interrupted_session().unwrap().id(),
            id.as_str()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_clock_and_positions_while_running() {
        let director = director();
        director.initialize_game("Live").unwrap();
        let runner = director.clone();

        let handle = tokio::spawn(async move { runner.start_next_race().await });
        sleep(Duration::from_secs(10)).await;

        assert_eq!(director.phase(), RacePhase::Running);
        assert_eq!(director.timers().active_count(), 2);
        assert_eq!(director.positions().len(), 10);
        assert!(director.leader().is_some());
        assert!(director.race_clock() >= Duration::from_secs(5));
        assert_eq!(director.current_race().unwrap().status, RaceStatus::Running);

        director.pause_racing();
        assert!(handle.await.unwrap().unwrap().unwrap().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_session_opens_as_finished() {
        let director = director();
        let id = director.initialize_game("Full Day").unwrap().id().to_string();

        assert_eq!(director.start_all_races().await.unwrap(), ProgramRun::Completed);
        assert_eq!(director.phase(), RacePhase::Finished);
        director.exit_to_welcome().unwrap();

        let resumption = director.open_session(&id).unwrap();
        assert_eq!(resumption.plan, ResumePlan::Finished);
        assert_eq!(director.phase(), RacePhase::Finished);
        assert_eq!(director.completed_races(), 6);
        assert_eq!(director.start_all_races().await.unwrap(), ProgramRun::Completed);
    }
}
