// Real-time race animation converging on a pre-computed ranking

use std::{
    f64::consts::TAU,
    ops::ControlFlow,
    time::{Duration, SystemTime},
};

use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::model::{Race, RaceOutcome};

use super::outcome::compute_outcome;

/// Duration of the shortest race.
const BASE_DURATION_MS: i64 = 30_000;
/// Distance the base duration refers to.
const REFERENCE_DISTANCE: i64 = 1200;
/// Extra animation time per meter above the reference distance.
const MS_PER_METER: i64 = 25;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SAFETY_TIMEOUT_FACTOR: f64 = 1.5;

/// Progress at which a horse crosses the line.
const FINISH_THRESHOLD: f64 = 1.0;
/// Furthest a horse may get while the horse ranked just ahead has not finished.
const HOLD_PROGRESS: f64 = 0.999;
/// Every horse must be this far before the race ends on its own.
const COMPLETION_THRESHOLD: f64 = 1.05;
/// Horses run a little past the line so they visibly finish.
const MAX_PROGRESS: f64 = 1.1;
/// Scales speed factors so a typical field finishes within the nominal duration.
const PACE_GAIN: f64 = 3.0;

const RANK_STEP: f64 = 0.003;
const MIN_RANK_MULTIPLIER: f64 = 0.98;
const MIN_DYNAMIC_MULTIPLIER: f64 = 0.95;
const MAX_DYNAMIC_MULTIPLIER: f64 = 1.12;
/// Slowdowns are damped so surges read stronger than fades.
const SLOWDOWN_DAMPING: f64 = 0.4;

/// Nominal animation time of a race. Only paces the animation, never the ranking.
pub fn race_duration(distance: u32) -> Duration {
    let millis = BASE_DURATION_MS + (i64::from(distance) - REFERENCE_DISTANCE) * MS_PER_METER;
    Duration::from_millis(u64::try_from(millis).unwrap_or_default())
}

/// Live position of one horse, reported on every tick.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct HorsePosition {
    pub horse_id: u32,
    /// Meters covered
    pub distance: f64,
    /// Fraction of the race covered, from 0.0 up to 1.1
    pub progress: f64,
}

/// How an animated race ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RaceRun {
    Finished(RaceOutcome),
    /// Stopped on request; no result was produced.
    Cancelled,
}

impl RaceRun {
    pub fn outcome(&self) -> Option<&RaceOutcome> {
        match self {
            RaceRun::Finished(outcome) => Some(outcome),
            RaceRun::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RaceRun::Cancelled)
    }
}

/// Per-horse sine wave that makes horses surge and fade during a race.
#[derive(Clone, Copy, Debug)]
struct SpeedPattern {
    frequency: f64,
    phase: f64,
    amplitude: f64,
}

impl SpeedPattern {
    fn sample(rng: &mut impl Rng) -> Self {
        Self {
            frequency: rng.gen_range(5.0..10.0),
            phase: rng.gen_range(0.0..TAU),
            amplitude: rng.gen_range(0.06..0.12),
        }
    }

    fn variation(&self, movement: f64) -> f64 {
        let wave = (movement * self.frequency + self.phase).sin() * self.amplitude;
        if wave > 0. { wave } else { wave * SLOWDOWN_DAMPING }
    }
}

#[derive(Debug)]
struct Runner {
    horse_id: u32,
    /// Position of the horse in the race field
    slot: usize,
    speed: f64,
    rank_multiplier: f64,
    pattern: SpeedPattern,
    progress: f64,
    finished_at: Option<f64>,
}

impl Runner {
    /// Move the horse on. It cannot cross the line before the horse ranked
    /// just ahead of it, so arrivals follow the ranking.
    fn advance(
        &mut self,
        movement: f64,
        elapsed_s: f64,
        distance: u32,
        ahead_finished: bool,
    ) -> HorsePosition {
        let dynamic = (self.rank_multiplier * (1. + self.pattern.variation(movement)))
            .clamp(MIN_DYNAMIC_MULTIPLIER, MAX_DYNAMIC_MULTIPLIER);
        let mut raw = (movement * self.speed * dynamic * PACE_GAIN).min(MAX_PROGRESS);
        if !ahead_finished {
            raw = raw.min(HOLD_PROGRESS);
        }

        self.progress = raw.max(self.progress);
        if self.progress >= FINISH_THRESHOLD && self.finished_at.is_none() {
            self.finished_at = Some(elapsed_s);
        }

        HorsePosition {
            horse_id: self.horse_id,
            distance: self.progress * f64::from(distance),
            progress: self.progress,
        }
    }
}

/// Drives races tick by tick, reporting live positions through a callback.
#[derive(Clone, Copy, Debug)]
pub struct RaceAnimator {
    tick_interval: Duration,
    safety_timeout_factor: f64,
}

impl Default for RaceAnimator {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL, DEFAULT_SAFETY_TIMEOUT_FACTOR)
    }
}

impl RaceAnimator {
    pub fn new(tick_interval: Duration, safety_timeout_factor: f64) -> Self {
        Self {
            tick_interval: tick_interval.max(Duration::from_millis(1)),
            safety_timeout_factor,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Run `race` over roughly `duration`.
    ///
    /// The ranking is decided before the first tick and horses cross the
    /// line in that order. `on_progress` receives the field's positions on
    /// every tick, in field order; returning `ControlFlow::Break` stops the
    /// race at once with `RaceRun::Cancelled`. Progress never decreases
    /// between two reports. The finished outcome keeps the ranking and
    /// carries the time at which each horse actually crossed the line.
    pub async fn animate<F>(&self, race: &Race, duration: Duration, on_progress: F) -> RaceRun
    where
        F: FnMut(&[HorsePosition]) -> ControlFlow<()>,
    {
        let canonical = compute_outcome(race, &mut rand::thread_rng());
        self.animate_ranked(race, canonical, duration, on_progress)
            .await
    }

    /// Animate towards an already computed outcome.
    pub(crate) async fn animate_ranked<F>(
        &self,
        race: &Race,
        canonical: RaceOutcome,
        duration: Duration,
        mut on_progress: F,
    ) -> RaceRun
    where
        F: FnMut(&[HorsePosition]) -> ControlFlow<()>,
    {
        // Ordered by canonical rank
        let mut runners: Vec<Runner> = {
            let mut rng = rand::thread_rng();
            canonical
                .rankings
                .iter()
                .enumerate()
                .filter_map(|(rank, ranking)| {
                    let slot = race.horses.iter().position(|h| h.id == ranking.horse.id)?;
                    Some(Runner {
                        horse_id: ranking.horse.id,
                        slot,
                        speed: ranking.speed,
                        rank_multiplier: (1. - rank as f64 * RANK_STEP).max(MIN_RANK_MULTIPLIER),
                        pattern: SpeedPattern::sample(&mut rng),
                        progress: 0.,
                        finished_at: None,
                    })
                })
                .collect()
        };

        let nominal_s = duration.max(self.tick_interval).as_secs_f64();
        debug!(
            "Animating {} with {} horses over {:.1}s",
            race.title(),
            runners.len(),
            nominal_s
        );

        let start = Instant::now();
        let mut ticker = interval_at(start + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let elapsed_s = loop {
            ticker.tick().await;
            let elapsed_s = start.elapsed().as_secs_f64();
            let fraction = elapsed_s / nominal_s;
            let movement = fraction.min(1.);

            let mut ahead_finished = true;
            let mut positions: Vec<(usize, HorsePosition)> = Vec::with_capacity(runners.len());
            for runner in runners.iter_mut() {
                let position = runner.advance(movement, elapsed_s, race.distance, ahead_finished);
                ahead_finished = runner.finished_at.is_some();
                positions.push((runner.slot, position));
            }
            positions.sort_by_key(|(slot, _)| *slot);
            let positions: Vec<HorsePosition> =
                positions.into_iter().map(|(_, position)| position).collect();

            if on_progress(&positions).is_break() {
                info!("{} cancelled after {:.1}s", race.title(), elapsed_s);
                return RaceRun::Cancelled;
            }

            let slowest = positions
                .iter()
                .map(|p| p.progress)
                .fold(f64::INFINITY, f64::min);
            if slowest >= COMPLETION_THRESHOLD {
                break elapsed_s;
            }
            if fraction >= self.safety_timeout_factor {
                warn!(
                    "{} hit the safety timeout with a horse at {:.0}%",
                    race.title(),
                    slowest * 100.
                );
                break elapsed_s;
            }
        };

        let final_positions: Vec<HorsePosition> = race
            .horses
            .iter()
            .map(|horse| HorsePosition {
                horse_id: horse.id,
                distance: f64::from(race.distance) * MAX_PROGRESS,
                progress: MAX_PROGRESS,
            })
            .collect();
        // The race is over, a late cancellation has nothing left to stop
        let _ = on_progress(&final_positions);

        let outcome = finalize(canonical, &runners, elapsed_s);
        if let Some(winner) = outcome.winner() {
            info!(
                "{} won by {} in {:.2}s",
                outcome.title(),
                winner.horse.name,
                winner.time_s
            );
        }
        RaceRun::Finished(outcome)
    }
}

/// Replace estimated times with observed finish times. Horses arrive in
/// ranking order, so positions stay as computed and times never decrease.
/// A horse that never crossed gets the time the race ended.
fn finalize(mut outcome: RaceOutcome, runners: &[Runner], elapsed_s: f64) -> RaceOutcome {
    for ranking in outcome.rankings.iter_mut() {
        ranking.time_s = runners
            .iter()
            .find(|runner| runner.horse_id == ranking.horse.id)
            .and_then(|runner| runner.finished_at)
            .unwrap_or(elapsed_s);
    }
    outcome.completed_at = SystemTime::now();
    outcome
}
