// Race program scheduling: six rounds at fixed, increasing distances

use log::info;
use rand::Rng;

use crate::errors::GallopError;
use crate::model::{Horse, Race};

use super::generator::select_random_horses;

/// Distances in meters of the six rounds, in running order.
pub const RACE_DISTANCES: [u32; 6] = [1200, 1400, 1600, 1800, 2000, 2200];

/// Number of horses entered in every race.
pub const FIELD_SIZE: usize = 10;

/// Build a complete program from the pool. Each round draws its own field,
/// so a horse may run in several rounds.
pub fn build_program(pool: &[Horse]) -> Result<Vec<Race>, GallopError> {
    build_program_with(pool, &mut rand::thread_rng())
}

pub fn build_program_with(pool: &[Horse], rng: &mut impl Rng) -> Result<Vec<Race>, GallopError> {
    if pool.is_empty() {
        return Err(GallopError::NoHorsesAvailable);
    }
    if pool.len() < FIELD_SIZE {
        return Err(GallopError::InsufficientHorses {
            available: pool.len(),
            required: FIELD_SIZE,
        });
    }

    let program: Vec<Race> = RACE_DISTANCES
        .iter()
        .enumerate()
        .map(|(index, &distance)| {
            Race::new(
                index as u32 + 1,
                distance,
                select_random_horses(pool, FIELD_SIZE, rng),
            )
        })
        .collect();

    info!(
        "Generated a {} race program from a pool of {} horses",
        program.len(),
        pool.len()
    );
    Ok(program)
}

/// Distance of a round (1-based), if the round is part of the program.
pub fn distance_for_round(round: u32) -> Option<u32> {
    let index = usize::try_from(round.checked_sub(1)?).ok()?;
    RACE_DISTANCES.get(index).copied()
}

/// Check round count, field sizes and the round to distance mapping.
pub fn validate_program(program: &[Race]) -> Result<(), String> {
    if program.len() != RACE_DISTANCES.len() {
        return Err(format!(
            "expected {} races, found {}",
            RACE_DISTANCES.len(),
            program.len()
        ));
    }

    for (index, race) in program.iter().enumerate() {
        if race.round != index as u32 + 1 {
            return Err(format!(
                "race {} is numbered as round {}",
                index + 1,
                race.round
            ));
        }
        if race.horses.len() != FIELD_SIZE {
            return Err(format!(
                "{} has {} horses, expected {}",
                race.title(),
                race.horses.len(),
                FIELD_SIZE
            ));
        }
        if race.distance != RACE_DISTANCES[index] {
            return Err(format!(
                "round {} is {}m, expected {}m",
                race.round, race.distance, RACE_DISTANCES[index]
            ));
        }
    }

    Ok(())
}
