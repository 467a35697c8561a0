// Durable storage for session collections

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

use crate::errors::GallopError;
use crate::model::SessionCollection;

/// Number of backups kept per key.
const MAX_BACKUPS: usize = 5;

/// Key-value store for session collections.
pub trait SessionStore {
    /// Load the collection stored under `key`, `None` if nothing was saved yet
    fn load(&self, key: &str) -> Result<Option<SessionCollection>, GallopError>;

    /// Replace the collection stored under `key`
    fn save(&mut self, key: &str, sessions: &SessionCollection) -> Result<(), GallopError>;

    /// Remove everything stored under `key`
    fn clear(&mut self, key: &str) -> Result<(), GallopError>;
}

/// One pretty-printed JSON file per key, written atomically with rolling backups.
pub struct FileBasedStorage {
    storage_path: PathBuf,
}

impl FileBasedStorage {
    pub fn new(storage_path: PathBuf) -> Result<Self, GallopError> {
        if !storage_path.exists() {
            fs::create_dir_all(&storage_path)
                .map_err(|e| GallopError::StorageIOError { source: e })?;
        }
        Ok(Self { storage_path })
    }

    /// Storage in the default application data directory
    pub fn new_default() -> Result<Self, GallopError> {
        Self::new(Self::default_storage_path()?)
    }

    pub fn default_storage_path() -> Result<PathBuf, GallopError> {
        let app_data_dir = dirs::data_dir().ok_or(GallopError::NoDataDir)?;
        Ok(app_data_dir.join("gallop").join("sessions"))
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn normalize_key(key: &str) -> String {
        key.to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect()
    }

    fn file_path_for_key(&self, key: &str) -> PathBuf {
        self.storage_path
            .join(format!("{}.json", Self::normalize_key(key)))
    }

    fn read_collection(path: &Path) -> Result<SessionCollection, GallopError> {
        let content = fs::read_to_string(path).map_err(|e| GallopError::FileOperationError {
            operation: "read_sessions".to_string(),
            reason: format!("Failed to read {}: {}", path.display(), e),
        })?;
        if content.trim().is_empty() {
            return Err(GallopError::FileOperationError {
                operation: "read_sessions".to_string(),
                reason: format!("{} is empty", path.display()),
            });
        }
        serde_json::from_str(&content).map_err(|e| GallopError::StorageSerializeError { source: e })
    }

    /// Backups of `key`, newest first.
    fn backups_for_key(&self, key: &str) -> Result<Vec<PathBuf>, GallopError> {
        let prefix = format!("{}.json.backup.", Self::normalize_key(key));
        let entries =
            fs::read_dir(&self.storage_path).map_err(|e| GallopError::FileOperationError {
                operation: "list_backups".to_string(),
                reason: format!("Cannot read directory: {}", e),
            })?;

        let mut backups: Vec<(u128, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let stamp = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix(&prefix)?
                    .parse::<u128>()
                    .ok()?;
                Some((stamp, path))
            })
            .collect();

        backups.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(backups.into_iter().map(|(_, path)| path).collect())
    }

    fn create_backup_if_exists(&self, key: &str) -> Result<(), GallopError> {
        let file_path = self.file_path_for_key(key);
        if !file_path.exists() {
            return Ok(());
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GallopError::FileOperationError {
                operation: "create_backup".to_string(),
                reason: format!("Failed to get timestamp: {}", e),
            })?
            .as_millis();
        let backup_path = file_path.with_extension(format!("json.backup.{}", timestamp));

        fs::copy(&file_path, &backup_path).map_err(|e| GallopError::FileOperationError {
            operation: "create_backup".to_string(),
            reason: format!("Failed to create backup: {}", e),
        })?;
        debug!("Created backup: {:?}", backup_path);
        Ok(())
    }

    fn cleanup_old_backups(&self, key: &str) -> Result<(), GallopError> {
        for old_backup in self.backups_for_key(key)?.into_iter().skip(MAX_BACKUPS) {
            if let Err(e) = fs::remove_file(&old_backup) {
                warn!("Failed to remove old backup {:?}: {}", old_backup, e);
            } else {
                debug!("Removed old backup: {:?}", old_backup);
            }
        }
        Ok(())
    }

    /// Write through a temporary file so a crash never leaves half a file behind.
    fn write_atomically(&self, key: &str, content: &str) -> Result<(), GallopError> {
        let file_path = self.file_path_for_key(key);
        let temp_path = file_path.with_extension("json.tmp");

        {
            let mut temp_file =
                fs::File::create(&temp_path).map_err(|e| GallopError::FileOperationError {
                    operation: "create_temp_file".to_string(),
                    reason: format!("Failed to create temporary file: {}", e),
                })?;
            temp_file
                .write_all(content.as_bytes())
                .map_err(|e| GallopError::FileOperationError {
                    operation: "write_temp_file".to_string(),
                    reason: format!("Failed to write to temporary file: {}", e),
                })?;
            temp_file
                .sync_all()
                .map_err(|e| GallopError::FileOperationError {
                    operation: "sync_temp_file".to_string(),
                    reason: format!("Failed to sync temporary file: {}", e),
                })?;
        }

        fs::rename(&temp_path, &file_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            GallopError::FileOperationError {
                operation: "atomic_move".to_string(),
                reason: format!("Failed to move temporary file to final location: {}", e),
            }
        })
    }
}

impl SessionStore for FileBasedStorage {
    fn load(&self, key: &str) -> Result<Option<SessionCollection>, GallopError> {
        let file_path = self.file_path_for_key(key);
        if !file_path.exists() {
            debug!("No session file at {:?}", file_path);
            return Ok(None);
        }

        let error = match Self::read_collection(&file_path) {
            Ok(collection) => return Ok(Some(collection)),
            Err(e) => e,
        };
        warn!("Could not read {:?}: {}", file_path, error);

        for backup_path in self.backups_for_key(key)? {
            match Self::read_collection(&backup_path) {
                Ok(collection) => {
                    info!("Recovered sessions from backup {:?}", backup_path);
                    return Ok(Some(collection));
                }
                Err(e) => debug!("Skipping unreadable backup {:?}: {}", backup_path, e),
            }
        }

        Err(error)
    }

    fn save(&mut self, key: &str, sessions: &SessionCollection) -> Result<(), GallopError> {
        let content = serde_json::to_string_pretty(sessions)
            .map_err(|e| GallopError::StorageSerializeError { source: e })?;

        if let Err(e) = self.create_backup_if_exists(key) {
            warn!("Failed to create backup: {}", e);
        }

        self.write_atomically(key, &content)?;
        debug!(
            "Saved {} sessions under {}",
            sessions.sessions.len(),
            key
        );

        if let Err(e) = self.cleanup_old_backups(key) {
            warn!("Failed to clean up old backups: {}", e);
        }
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<(), GallopError> {
        let file_path = self.file_path_for_key(key);
        let paths = self
            .backups_for_key(key)?
            .into_iter()
            .chain(std::iter::once(file_path));

        for path in paths {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| GallopError::StorageIOError { source: e })?;
            }
        }
        info!("Cleared sessions stored under {}", key);
        Ok(())
    }
}

/// In-memory store. Collections are kept serialized so callers still cross
/// the same plain-data boundary as with files.
#[derive(Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored JSON, for inspecting what actually got persisted.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl SessionStore for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<SessionCollection>, GallopError> {
        self.entries
            .get(key)
            .map(|raw| {
                serde_json::from_str(raw)
                    .map_err(|e| GallopError::StorageSerializeError { source: e })
            })
            .transpose()
    }

    fn save(&mut self, key: &str, sessions: &SessionCollection) -> Result<(), GallopError> {
        let raw = serde_json::to_string(sessions)
            .map_err(|e| GallopError::StorageSerializeError { source: e })?;
        self.entries.insert(key.to_string(), raw);
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<(), GallopError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RaceSession;
    use tempfile::TempDir;

    const KEY: &str = "race_sessions";

    fn collection(names: &[&str]) -> SessionCollection {
        SessionCollection::new(
            names
                .iter()
                .map(|name| RaceSession::new(RaceSession::generate_id(), name.to_string()).to_snapshot())
                .collect(),
        )
    }

    fn names(collection: &SessionCollection) -> Vec<String> {
        collection.sessions.iter().map(|s| s.name.clone()).collect()
    }

    #[test]
    fn test_file_storage_creation() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().join("sessions");

        let storage = FileBasedStorage::new(storage_path.clone()).unwrap();

        assert!(storage_path.exists());
        assert_eq!(storage.storage_path(), storage_path);
    }

    #[test]
    fn test_load_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileBasedStorage::new(temp_dir.path().to_path_buf()).unwrap();

        assert!(storage.load(KEY).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let mut storage = FileBasedStorage::new(temp_dir.path().to_path_buf()).unwrap();
        let sessions = collection(&["Monday", "Tuesday"]);

        storage.save(KEY, &sessions).unwrap();
        let loaded = storage.load(KEY).unwrap().unwrap();

        assert_eq!(loaded, sessions);
        assert!(!temp_dir.path().join("race_sessions.json.tmp").exists());
    }

    #[test]
    fn test_backups_are_capped() {
        let temp_dir = TempDir::new().unwrap();
        let mut storage = FileBasedStorage::new(temp_dir.path().to_path_buf()).unwrap();

        for round in 0..(MAX_BACKUPS + 3) {
            let name = format!("Day {}", round);
            storage.save(KEY, &collection(&[&name])).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let backups = storage.backups_for_key(KEY).unwrap();
        assert_eq!(backups.len(), MAX_BACKUPS);
        let latest = storage.load(KEY).unwrap().unwrap();
        assert_eq!(names(&latest), vec![format!("Day {}", MAX_BACKUPS + 2)]);
    }

    #[test]
    fn test_corrupted_file_falls_back_to_backup() {
        let temp_dir = TempDir::new().unwrap();
        let mut storage = FileBasedStorage::new(temp_dir.path().to_path_buf()).unwrap();

        storage.save(KEY, &collection(&["First"])).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        storage.save(KEY, &collection(&["Second"])).unwrap();
        fs::write(temp_dir.path().join("race_sessions.json"), "{ not json").unwrap();

        let recovered = storage.load(KEY).unwrap().unwrap();

        assert_eq!(names(&recovered), vec!["First".to_string()]);
    }

    #[test]
    fn test_corrupted_file_without_backup_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileBasedStorage::new(temp_dir.path().to_path_buf()).unwrap();
        fs::write(temp_dir.path().join("race_sessions.json"), "").unwrap();

        assert!(storage.load(KEY).is_err());
    }

    #[test]
    fn test_clear_removes_file_and_backups() {
        let temp_dir = TempDir::new().unwrap();
        let mut storage = FileBasedStorage::new(temp_dir.path().to_path_buf()).unwrap();
        storage.save(KEY, &collection(&["A"])).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        storage.save(KEY, &collection(&["B"])).unwrap();

        storage.clear(KEY).unwrap();

        assert!(storage.load(KEY).unwrap().is_none());
        assert!(storage.backups_for_key(KEY).unwrap().is_empty());
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(
            FileBasedStorage::normalize_key("Race Sessions/2024"),
            "race_sessions_2024"
        );
    }

    #[test]
    fn test_memory_storage() {
        let mut storage = MemoryStorage::new();
        assert!(storage.load(KEY).unwrap().is_none());

        let sessions = collection(&["Only"]);
        storage.save(KEY, &sessions).unwrap();
        assert_eq!(storage.load(KEY).unwrap().unwrap(), sessions);
        assert!(storage.raw(KEY).unwrap().contains("\"Only\""));

        storage.clear(KEY).unwrap();
        assert!(storage.load(KEY).unwrap().is_none());
    }
}
