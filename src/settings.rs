use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::log_warn;

const ENABLE_LOGS: bool = true;

pub const DEFAULT_COMPLETION_REFLECTION: &str = "Session completed successfully.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// How long the Completed screen stays up before returning to Idle.
    pub completion_reset_delay_ms: u64,
    /// Reflection sent with naturally completed sessions.
    pub completion_reflection: String,
    /// Run the countdown on a local-only handle when the server can't be reached.
    pub allow_offline_start: bool,
    pub tick_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            completion_reset_delay_ms: 3_000,
            completion_reflection: DEFAULT_COMPLETION_REFLECTION.into(),
            allow_offline_start: false,
            tick_interval_ms: 1_000,
        }
    }
}

impl SessionSettings {
    pub fn completion_reset_delay(&self) -> Duration {
        Duration::from_millis(self.completion_reset_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    session: SessionSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!(
                    "Ignoring unreadable settings at {}: {err}",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn session(&self) -> SessionSettings {
        self.read().session.clone()
    }

    pub fn update_session(&self, settings: SessionSettings) -> Result<()> {
        let mut guard = self.write();
        guard.session = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: UserSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", self.path.display()))?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = SettingsStore::new(dir.path().join("settings.json")).expect("store");
        let settings = store.session();
        assert_eq!(settings, SessionSettings::default());
        assert_eq!(settings.completion_reset_delay(), Duration::from_secs(3));
        assert!(!settings.allow_offline_start);
    }

    #[test]
    fn updates_are_persisted() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).expect("store");

        let mut settings = store.session();
        settings.allow_offline_start = true;
        settings.completion_reset_delay_ms = 5_000;
        store.update_session(settings.clone()).expect("update");

        let reopened = SettingsStore::new(path).expect("reopen");
        assert_eq!(reopened.session(), settings);
    }

    #[test]
    fn partial_and_corrupt_files_fall_back_to_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");

        fs::write(&path, r#"{ "session": { "allow_offline_start": true } }"#).unwrap();
        let store = SettingsStore::new(path.clone()).expect("store");
        let settings = store.session();
        assert!(settings.allow_offline_start);
        assert_eq!(settings.completion_reflection, DEFAULT_COMPLETION_REFLECTION);

        fs::write(&path, "not json").unwrap();
        let store = SettingsStore::new(path.clone()).expect("store");
        assert_eq!(store.session(), SessionSettings::default());
        assert!(store.reload().is_err());
    }
}
