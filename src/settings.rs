use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

pub const DB_PATH_ENV: &str = "INTERVAULT_DB_PATH";
pub const QUOTA_ENV: &str = "INTERVAULT_QUOTA_BYTES";
pub const DEBUG_ENV: &str = "INTERVAULT_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageSettings {
    pub db_path: PathBuf,
    /// Caps the total bytes held by the key/value store.
    pub quota_bytes: Option<u64>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("intervault.sqlite3"),
            quota_bytes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistenceSettings {
    pub primary_throttle_ms: u64,
    pub flush_delay_ms: u64,
    pub autosave_interval_ms: u64,
    pub draft_debounce_ms: u64,
    pub clock_tick_ms: u64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            primary_throttle_ms: 100,
            flush_delay_ms: 100,
            autosave_interval_ms: 5_000,
            draft_debounce_ms: 2_000,
            clock_tick_ms: 1_000,
        }
    }
}

impl PersistenceSettings {
    pub fn primary_throttle(&self) -> Duration {
        Duration::from_millis(self.primary_throttle_ms)
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms.max(1))
    }

    pub fn draft_debounce(&self) -> Duration {
        Duration::from_millis(self.draft_debounce_ms)
    }

    pub fn clock_tick(&self) -> Duration {
        Duration::from_millis(self.clock_tick_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub storage: StorageSettings,
    pub persistence: PersistenceSettings,
    pub debug: bool,
}

impl Settings {
    /// Applies `INTERVAULT_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(DB_PATH_ENV).filter(|p| !p.is_empty()) {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(quota) = lookup(QUOTA_ENV).and_then(|q| q.trim().parse().ok()) {
            self.storage.quota_bytes = Some(quota);
        }
        if let Some(debug) = lookup(DEBUG_ENV) {
            self.debug = debug == "1" || debug.eq_ignore_ascii_case("true");
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads `path` if it exists. A file that does not parse yields defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data: Settings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("ignoring unreadable settings file {}: {err}", path.display());
                Settings::default()
            })
        } else {
            Settings::default()
        };
        data.apply_env(|key| std::env::var(key).ok());

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn settings(&self) -> Settings {
        self.read().clone()
    }

    pub fn update_persistence(&self, persistence: PersistenceSettings) -> Result<()> {
        let mut guard = self.write();
        guard.persistence = persistence;
        self.persist(&guard)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"persistence":{"flushDelayMs":250}}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().settings();
        assert_eq!(settings.persistence.flush_delay_ms, 250);
        assert_eq!(settings.persistence.autosave_interval_ms, 5_000);
    }

    #[test]
    fn env_overrides_win() {
        let mut settings = Settings::default();
        settings.apply_env(|key| match key {
            DB_PATH_ENV => Some("/tmp/other.sqlite3".into()),
            QUOTA_ENV => Some("4096".into()),
            DEBUG_ENV => Some("true".into()),
            _ => None,
        });
        assert_eq!(settings.storage.db_path, PathBuf::from("/tmp/other.sqlite3"));
        assert_eq!(settings.storage.quota_bytes, Some(4096));
        assert!(settings.debug);
    }

    #[test]
    fn update_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        let mut persistence = store.settings().persistence;
        persistence.draft_debounce_ms = 500;
        store.update_persistence(persistence).unwrap();

        let reloaded: Settings = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(reloaded.persistence.draft_debounce_ms, 500);
    }
}
