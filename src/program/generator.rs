// Random horse pool generation

use rand::{Rng, seq::SliceRandom};

use crate::errors::GallopError;
use crate::model::Horse;

/// Default number of horses in a pool.
pub const DEFAULT_POOL_SIZE: usize = 20;

const FIRST_NAMES: [&str; 50] = [
    "Thunder", "Lightning", "Storm", "Shadow", "Midnight", "Golden", "Silver", "Ruby", "Crystal",
    "Diamond", "Blazing", "Wild", "Royal", "Noble", "Mystic", "Phoenix", "Dragon", "Tiger",
    "Eagle", "Falcon", "Spirit", "Dream", "Victory", "Glory", "Honor", "Brave", "Swift", "Flash",
    "Sonic", "Turbo", "Magic", "Lucky", "Champion", "Star", "Comet", "Rocket", "Arrow", "Bullet",
    "Dash", "Sprint", "Ocean", "River", "Mountain", "Forest", "Desert", "Fire", "Ice", "Wind",
    "Earth", "Sunset",
];

const LAST_NAMES: [&str; 50] = [
    "Runner", "Chaser", "Striker", "Warrior", "Knight", "Prince", "King", "Queen", "Baron", "Duke",
    "Storm", "Blaze", "Flash", "Thunder", "Lightning", "Wind", "Flame", "Frost", "Shadow", "Light",
    "Star", "Moon", "Sun", "Sky", "Cloud", "Racer", "Sprinter", "Galloper", "Flyer", "Dancer",
    "Fighter", "Hunter", "Seeker", "Finder", "Winner", "Legend", "Hero", "Champion", "Victor",
    "Master", "Spirit", "Soul", "Heart", "Dream", "Hope", "Power", "Force", "Might", "Glory",
    "Pride",
];

/// Consecutive entries sit on opposite sides of the color wheel.
pub const COLORS: [&str; 20] = [
    "#FF0000", "#00FFFF", "#FF8800", "#0088FF", "#FFFF00", "#0000FF", "#00FF00", "#FF00FF",
    "#FFD700", "#0066FF", "#FF0080", "#00FF80", "#FF4400", "#00CCFF", "#AAFF00", "#5500FF",
    "#FF6600", "#00FFAA", "#CC00FF", "#00DD00",
];

const MIN_GENERATED_CONDITION: u8 = 20;
const MAX_GENERATED_CONDITION: u8 = 100;

/// Generate a horse with a random name and condition. The color is picked by
/// id so horses of one pool never share a color.
pub fn generate_horse(id: u32, rng: &mut impl Rng) -> Horse {
    let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
    let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
    let condition = rng.gen_range(MIN_GENERATED_CONDITION..=MAX_GENERATED_CONDITION);
    let color = COLORS[(id.saturating_sub(1) as usize) % COLORS.len()];

    Horse {
        id,
        name: format!("{} {}", first, last),
        condition,
        color: color.to_string(),
    }
}

/// Generate a pool of `count` horses with ids 1..=count.
pub fn generate_pool(count: usize) -> Result<Vec<Horse>, GallopError> {
    generate_pool_with(count, &mut rand::thread_rng())
}

pub fn generate_pool_with(count: usize, rng: &mut impl Rng) -> Result<Vec<Horse>, GallopError> {
    if count == 0 || count > COLORS.len() {
        return Err(GallopError::InvalidPoolSize {
            requested: count,
            max: COLORS.len(),
        });
    }
    Ok((1..=count as u32).map(|id| generate_horse(id, rng)).collect())
}

/// Draw `count` distinct horses from the pool, in random order.
pub fn select_random_horses(pool: &[Horse], count: usize, rng: &mut impl Rng) -> Vec<Horse> {
    pool.choose_multiple(rng, count).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_pool_has_unique_ids_and_colors() {
        let pool = generate_pool(20).unwrap();

        assert_eq!(pool.len(), 20);
        assert!(pool.iter().map(|h| h.id).all_unique());
        assert!(pool.iter().map(|h| h.color.as_str()).all_unique());
        assert_eq!(pool[0].id, 1);
        assert_eq!(pool[19].id, 20);
    }

    #[test]
    fn test_generated_horses_are_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for id in 1..=200 {
            let horse = generate_horse(id, &mut rng);
            assert!(horse.validate().is_ok());
            assert!(horse.condition >= MIN_GENERATED_CONDITION);
            assert_eq!(horse.name.split(' ').count(), 2);
        }
    }

    #[test]
    fn test_invalid_pool_sizes() {
        assert!(matches!(
            generate_pool(0),
            Err(GallopError::InvalidPoolSize { requested: 0, .. })
        ));
        assert!(matches!(
            generate_pool(21),
            Err(GallopError::InvalidPoolSize { max: 20, .. })
        ));
    }

    #[test]
    fn test_selection_without_replacement() {
        let pool = generate_pool(20).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let selected = select_random_horses(&pool, 10, &mut rng);

        assert_eq!(selected.len(), 10);
        assert!(selected.iter().map(|h| h.id).all_unique());
        assert!(selected.iter().all(|h| pool.contains(h)));
    }

    #[test]
    fn test_selection_from_small_pool_takes_everyone() {
        let pool = generate_pool(4).unwrap();
        let selected = select_random_horses(&pool, 10, &mut rand::thread_rng());
        assert_eq!(selected.len(), 4);
    }
}
