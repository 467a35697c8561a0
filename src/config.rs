use std::{
    fs::File,
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    errors::GallopError,
    program::generator::DEFAULT_POOL_SIZE,
    simulation::{RaceAnimator, race_duration},
};

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR_NAME: &str = "gallop";

/// Timings and sizes of a race day. Every delay and race duration is
/// multiplied by `pace`; the ranking never depends on it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RaceConfig {
    pub pool_size: usize,
    pub tick_interval_ms: u64,
    pub clock_interval_ms: u64,
    pub autosave_interval_ms: u64,
    pub render_delay_ms: u64,
    pub countdown_ms: u64,
    pub announcement_ms: u64,
    pub between_races_ms: u64,
    pub safety_timeout_factor: f64,
    pub pace: f64,
    /// Where sessions are stored, defaults to the user data directory
    pub storage_dir: Option<PathBuf>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            tick_interval_ms: 100,
            clock_interval_ms: 100,
            autosave_interval_ms: 2000,
            render_delay_ms: 500,
            countdown_ms: 3500,
            announcement_ms: 3000,
            between_races_ms: 500,
            safety_timeout_factor: 1.5,
            pace: 1.0,
            storage_dir: None,
        }
    }
}

impl RaceConfig {
    /// Location of the user's config file, `None` without a config directory.
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load the user's config file, `None` when there is none yet.
    pub fn from_local_file() -> Result<Option<Self>, GallopError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, GallopError> {
        let file = File::open(path).map_err(|e| GallopError::ConfigIOError { source: e })?;
        let config: RaceConfig = serde_json::from_reader(file)
            .map_err(|e| GallopError::ConfigSerializeError { source: e })?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save as the user's config file, returning where it was written.
    pub fn save(&self) -> Result<PathBuf, GallopError> {
        let path = Self::default_path().ok_or(GallopError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), GallopError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GallopError::ConfigIOError { source: e })?;
        }

        let file = File::create(path).map_err(|e| GallopError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| GallopError::ConfigSerializeError { source: e })
    }

    pub fn validate(&self) -> Result<(), GallopError> {
        let intervals = [
            ("tick_interval_ms", self.tick_interval_ms),
            ("clock_interval_ms", self.clock_interval_ms),
            ("autosave_interval_ms", self.autosave_interval_ms),
        ];
        if let Some((field, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(GallopError::InvalidConfig {
                field: field.to_string(),
                reason: "interval must be greater than zero".to_string(),
            });
        }
        if self.pool_size == 0 {
            return Err(GallopError::InvalidConfig {
                field: "pool_size".to_string(),
                reason: "the pool needs at least one horse".to_string(),
            });
        }
        if !(self.pace.is_finite() && self.pace > 0.) {
            return Err(GallopError::InvalidConfig {
                field: "pace".to_string(),
                reason: format!("must be a positive number, got {}", self.pace),
            });
        }
        if !(self.safety_timeout_factor > 1.) {
            return Err(GallopError::InvalidConfig {
                field: "safety_timeout_factor".to_string(),
                reason: format!("must be greater than 1, got {}", self.safety_timeout_factor),
            });
        }
        Ok(())
    }

    fn paced(&self, millis: u64) -> Duration {
        Duration::from_millis(millis).mul_f64(self.pace)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn clock_interval(&self) -> Duration {
        Duration::from_millis(self.clock_interval_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }

    pub fn render_delay(&self) -> Duration {
        self.paced(self.render_delay_ms)
    }

    pub fn countdown(&self) -> Duration {
        self.paced(self.countdown_ms)
    }

    pub fn announcement(&self) -> Duration {
        self.paced(self.announcement_ms)
    }

    pub fn between_races(&self) -> Duration {
        self.paced(self.between_races_ms)
    }

    /// Animation length of a race over `distance` at this pace.
    pub fn race_duration(&self, distance: u32) -> Duration {
        race_duration(distance).mul_f64(self.pace)
    }

    pub fn animator(&self) -> RaceAnimator {
        RaceAnimator::new(self.tick_interval(), self.safety_timeout_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RaceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_size, 20);
        assert_eq!(config.autosave_interval(), Duration::from_secs(2));
        assert_eq!(config.race_duration(1200), Duration::from_secs(30));
    }

    #[test]
    fn test_pace_scales_delays_but_not_intervals() {
        let config = RaceConfig {
            pace: 0.5,
            ..Default::default()
        };

        assert_eq!(config.countdown(), Duration::from_millis(1750));
        assert_eq!(config.race_duration(2200), Duration::from_millis(27_500));
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_tick = RaceConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_tick.validate(),
            Err(GallopError::InvalidConfig { field, .. }) if field == "tick_interval_ms"
        ));

        let frozen = RaceConfig {
            pace: 0.,
            ..Default::default()
        };
        assert!(frozen.validate().is_err());

        let no_margin = RaceConfig {
            safety_timeout_factor: 1.0,
            ..Default::default()
        };
        assert!(no_margin.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = RaceConfig {
            pace: 0.5,
            storage_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        let loaded = RaceConfig::from_file(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_default_path_is_under_app_dir() {
        if let Some(path) = RaceConfig::default_path() {
            assert!(path.ends_with(Path::new(APP_DIR_NAME).join(CONFIG_FILE_NAME)));
        }
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{ "countdown_ms": 1000 }"#).unwrap();

        let loaded = RaceConfig::from_file(&path).unwrap();

        assert_eq!(loaded.countdown_ms, 1000);
        assert_eq!(loaded.announcement_ms, 3000);
        assert_eq!(loaded.storage_dir, None);
    }
}
