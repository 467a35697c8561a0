// Horse pool generation and race program scheduling

pub mod generator;
pub mod scheduler;

pub use generator::{generate_pool, select_random_horses};
pub use scheduler::{
    FIELD_SIZE, RACE_DISTANCES, build_program, distance_for_round, validate_program,
};
