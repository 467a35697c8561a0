use std::time::SystemTime;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{Horse, race::ordinal};

/// Placement of one horse in a finished race.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Ranking {
    /// Finishing position, 1 is the winner
    pub position: u32,
    pub horse: Horse,
    /// Finishing time in seconds
    pub time_s: f64,
    /// Speed factor sampled for this race
    pub speed: f64,
}

/// The scored result of a completed race.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RaceOutcome {
    pub race_round: u32,
    pub distance: u32,
    /// Rankings ordered by position
    pub rankings: Vec<Ranking>,
    pub completed_at: SystemTime,
}

impl RaceOutcome {
    pub fn winner(&self) -> Option<&Ranking> {
        self.rankings.first()
    }

    /// The top three finishers.
    pub fn podium(&self) -> &[Ranking] {
        &self.rankings[..self.rankings.len().min(3)]
    }

    pub fn title(&self) -> String {
        format!("{} Lap - {}m", ordinal(self.race_round), self.distance)
    }

    /// Positions must be 1..=n in order and times must never decrease with position.
    pub fn validate(&self) -> Result<(), String> {
        for (index, ranking) in self.rankings.iter().enumerate() {
            let expected = index as u32 + 1;
            if ranking.position != expected {
                return Err(format!(
                    "{}: ranking {} has position {}, expected {}",
                    self.title(),
                    index,
                    ranking.position,
                    expected
                ));
            }
            if !ranking.time_s.is_finite() || ranking.time_s < 0. {
                return Err(format!(
                    "{}: {} has invalid time {}",
                    self.title(),
                    ranking.horse.name,
                    ranking.time_s
                ));
            }
        }
        if let Some((a, b)) = self
            .rankings
            .iter()
            .tuple_windows()
            .find(|(a, b)| b.time_s < a.time_s)
        {
            return Err(format!(
                "{}: position {} ({:.2}s) is faster than position {} ({:.2}s)",
                self.title(),
                b.position,
                b.time_s,
                a.position,
                a.time_s
            ));
        }
        if self.rankings.iter().map(|r| r.horse.id).all_unique() {
            Ok(())
        } else {
            Err(format!("{}: a horse is ranked more than once", self.title()))
        }
    }
}

impl std::fmt::Display for RaceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.title(),
            self.podium()
                .iter()
                .map(|r| format!("{}. {} {:.2}s", r.position, r.horse.name, r.time_s))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(position: u32, id: u32, time_s: f64) -> Ranking {
        Ranking {
            position,
            horse: Horse::new(id, format!("Horse {}", id), 50, "#FFFFFF".to_string()).unwrap(),
            time_s,
            speed: 1.0,
        }
    }

    fn outcome(rankings: Vec<Ranking>) -> RaceOutcome {
        RaceOutcome {
            race_round: 2,
            distance: 1400,
            rankings,
            completed_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_winner_and_podium() {
        let result = outcome(vec![
            ranking(1, 4, 60.0),
            ranking(2, 9, 61.5),
            ranking(3, 1, 62.0),
            ranking(4, 2, 70.0),
        ]);

        assert_eq!(result.winner().unwrap().horse.id, 4);
        assert_eq!(result.podium().len(), 3);
        assert_eq!(result.podium()[2].horse.id, 1);
        assert_eq!(result.title(), "2nd Lap - 1400m");
    }

    #[test]
    fn test_podium_of_small_field() {
        let result = outcome(vec![ranking(1, 4, 60.0)]);
        assert_eq!(result.podium().len(), 1);
    }

    #[test]
    fn test_validate_accepts_ties() {
        let result = outcome(vec![ranking(1, 1, 60.0), ranking(2, 2, 60.0)]);
        assert!(result.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_gaps_and_reversed_times() {
        let gap = outcome(vec![ranking(1, 1, 60.0), ranking(3, 2, 61.0)]);
        assert!(gap.validate().is_err());

        let reversed = outcome(vec![ranking(1, 1, 62.0), ranking(2, 2, 61.0)]);
        assert!(reversed.validate().is_err());

        let duplicate = outcome(vec![ranking(1, 1, 60.0), ranking(2, 1, 61.0)]);
        assert!(duplicate.validate().is_err());
    }
}
