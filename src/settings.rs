use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::timer::SessionDurations;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TARGET_CYCLES: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub api_base_url: String,
    pub user_id: String,
    pub auth_token: Option<String>,
    pub ai_personality: String,
    pub default_target_cycles: u32,
    pub focus_duration_secs: u32,
    pub break_duration_secs: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        let durations = SessionDurations::default();
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            user_id: "local".into(),
            auth_token: None,
            ai_personality: "strict".into(),
            default_target_cycles: DEFAULT_TARGET_CYCLES,
            focus_duration_secs: durations.focus_secs,
            break_duration_secs: durations.break_secs,
        }
    }
}

impl UserSettings {
    pub fn durations(&self) -> SessionDurations {
        SessionDurations {
            focus_secs: self.focus_duration_secs.max(1),
            break_secs: self.break_duration_secs.max(1),
        }
    }

    /// Apply `RIVAL_*` environment overrides through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RIVAL_API_URL") {
            self.api_base_url = url;
        }
        if let Some(token) = lookup("RIVAL_AUTH_TOKEN") {
            self.auth_token = Some(token);
        }
        if let Some(user_id) = lookup("RIVAL_USER_ID") {
            self.user_id = user_id;
        }
        self
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }
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
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
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

    pub fn get(&self) -> UserSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: UserSettings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
