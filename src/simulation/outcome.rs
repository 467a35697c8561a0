use std::time::SystemTime;

use rand::Rng;

use crate::model::{Race, RaceOutcome, Ranking};

use super::performance::speed_factor;

/// Reference velocity in meters per second used for base times.
const REFERENCE_VELOCITY_MPS: f64 = 15.;

/// Time in seconds a horse with a speed factor of 1.0 needs for `distance`.
pub fn base_time(distance: u32) -> f64 {
    f64::from(distance) / REFERENCE_VELOCITY_MPS
}

/// Sample one speed factor per horse, in field order.
pub fn sample_speeds(race: &Race, rng: &mut impl Rng) -> Vec<f64> {
    race.horses
        .iter()
        .map(|horse| speed_factor(horse, race.distance, rng))
        .collect()
}

/// Rank a race from already sampled speeds.
///
/// Deterministic for a given set of speeds: times are `base_time / speed`,
/// sorted ascending, and equal times keep field order.
pub fn rank_field(race: &Race, speeds: &[f64]) -> RaceOutcome {
    let base = base_time(race.distance);
    let mut rankings: Vec<Ranking> = race
        .horses
        .iter()
        .zip(speeds)
        .map(|(horse, &speed)| Ranking {
            position: 0,
            horse: horse.clone(),
            time_s: base / speed,
            speed,
        })
        .collect();

    rankings.sort_by(|a, b| a.time_s.total_cmp(&b.time_s));
    for (index, ranking) in rankings.iter_mut().enumerate() {
        ranking.position = index as u32 + 1;
    }

    RaceOutcome {
        race_round: race.round,
        distance: race.distance,
        rankings,
        completed_at: SystemTime::now(),
    }
}

/// Sample speeds and rank the race in one go, with no animation.
pub fn compute_outcome(race: &Race, rng: &mut impl Rng) -> RaceOutcome {
    let speeds = sample_speeds(race, rng);
    rank_field(race, &speeds)
}
