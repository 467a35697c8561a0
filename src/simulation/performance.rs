use rand::Rng;

use crate::model::Horse;

/// Share of the speed factor driven by condition (0.0 - 0.5).
const CONDITION_WEIGHT: f64 = 0.5;
/// Share left to luck (0.0 - 0.8).
const RANDOM_WEIGHT: f64 = 0.8;
/// Stamina bonus at the longest distance for a horse in perfect condition (0.0 - 0.2).
const STAMINA_WEIGHT: f64 = 0.2;
/// Distance at which the stamina bonus reaches its full weight.
const STAMINA_REFERENCE_DISTANCE: f64 = 2200.;
/// Floor that keeps even the unluckiest horse moving.
const BASE_SPEED: f64 = 0.3;

/// Speed factor of a horse over `distance` meters.
///
/// Consumes randomness on every call: sample it once per horse per race and
/// reuse the value, otherwise a race's ranking shifts under its feet.
pub fn speed_factor(horse: &Horse, distance: u32, rng: &mut impl Rng) -> f64 {
    let condition = horse.condition_ratio();
    let condition_factor = condition * CONDITION_WEIGHT;
    let random_factor = rng.r#gen::<f64>() * RANDOM_WEIGHT;
    let stamina_bonus =
        (f64::from(distance) / STAMINA_REFERENCE_DISTANCE) * condition * STAMINA_WEIGHT;

    BASE_SPEED + condition_factor + random_factor + stamina_bonus
}
