//! Difficulty levels and the threshold pairs they select.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::settings::{SettingsStore, DIFFICULTY_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl DifficultyLevel {
    pub const ALL: [DifficultyLevel; 3] = [Self::Easy, Self::Medium, Self::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Easy => "Легкий",
            Self::Medium => "Средний",
            Self::Hard => "Сложный",
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown difficulty level '{other}'"
            ))),
        }
    }
}

/// Thresholds gating how lenient a verdict is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyProfile {
    pub confidence_threshold: f32,
    pub similarity_threshold: f32,
}

const EASY: DifficultyProfile = DifficultyProfile {
    confidence_threshold: 0.65,
    similarity_threshold: 0.5,
};

const MEDIUM: DifficultyProfile = DifficultyProfile {
    confidence_threshold: 0.75,
    similarity_threshold: 0.6,
};

const HARD: DifficultyProfile = DifficultyProfile {
    confidence_threshold: 0.85,
    similarity_threshold: 0.7,
};

pub fn profile(level: DifficultyLevel) -> DifficultyProfile {
    match level {
        DifficultyLevel::Easy => EASY,
        DifficultyLevel::Medium => MEDIUM,
        DifficultyLevel::Hard => HARD,
    }
}

/// Holds the selected level and writes every change through to the settings store.
pub struct DifficultyStore {
    settings: SettingsStore,
    current: Mutex<DifficultyLevel>,
}

impl DifficultyStore {
    pub fn new(settings: SettingsStore) -> Self {
        let current = crate::settings::get_settings(&settings).difficulty;
        log::info!("Difficulty restored: {current}");
        Self {
            settings,
            current: Mutex::new(current),
        }
    }

    pub fn get(&self, level: DifficultyLevel) -> DifficultyProfile {
        profile(level)
    }

    pub fn current(&self) -> DifficultyLevel {
        self.current
            .lock()
            .map(|guard| *guard)
            .unwrap_or_default()
    }

    pub fn current_profile(&self) -> DifficultyProfile {
        profile(self.current())
    }

    pub fn select(&self, level: DifficultyLevel) -> Result<(), EngineError> {
        {
            let mut guard = self
                .current
                .lock()
                .map_err(|_| EngineError::Settings("difficulty store is poisoned".to_string()))?;
            *guard = level;
        }

        self.settings.set(
            DIFFICULTY_KEY,
            serde_json::Value::String(level.as_str().to_string()),
        );
        self.settings.save()?;

        log::info!("Difficulty set to {level}");
        Ok(())
    }

    /// Selects a level by name; anything but easy/medium/hard is an `InvalidArgument`.
    pub fn select_named(&self, name: &str) -> Result<DifficultyLevel, EngineError> {
        let level = name.parse::<DifficultyLevel>()?;
        self.select(level)?;
        Ok(level)
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }
}
