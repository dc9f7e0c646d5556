//! User settings, persisted as JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::playback::PlaybackConfig;
use crate::script::Hosts;
use crate::speech::{Backend, Gender, VoiceSelector};

/// Environment variable that overrides the stored Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

pub const MIN_RATE: f32 = 0.5;
pub const MAX_RATE: f32 = 2.0;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to write settings: {0}")]
    Write(#[from] std::io::Error),
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hosts: Hosts,
    pub voice_a: VoiceSelector,
    pub voice_b: VoiceSelector,
    pub speaking_rate: f32,
    /// How many comments are sent to the script generator.
    pub comment_count: usize,
    /// Drop "<user> writes:" attributions from comments.
    pub skip_usernames: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    pub backend: Backend,
    /// Pace utterances to their duration. Off makes recording as fast as
    /// synthesis allows.
    pub realtime: bool,
    pub sample_rate: u32,
    pub library_dir: PathBuf,
    /// Abort an utterance that takes longer than this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utterance_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hosts: Hosts::default(),
            voice_a: VoiceSelector::Gender(Gender::Male),
            voice_b: VoiceSelector::Gender(Gender::Female),
            speaking_rate: 1.0,
            comment_count: 10,
            skip_usernames: true,
            gemini_api_key: None,
            backend: Backend::System,
            realtime: true,
            sample_rate: 24_000,
            library_dir: PathBuf::from("podcasts"),
            utterance_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str::<Settings>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings at {}, using defaults", path.display());
                Settings::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        settings.with_env().validated()
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn with_env(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.gemini_api_key = Some(key.trim().to_string());
            }
        }
        self
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        if !(MIN_RATE..=MAX_RATE).contains(&self.speaking_rate) {
            return Err(ConfigError::Invalid {
                key: "speaking_rate",
                message: format!(
                    "{} is outside {MIN_RATE}..={MAX_RATE}",
                    self.speaking_rate
                ),
            });
        }
        if self.sample_rate < 8_000 {
            return Err(ConfigError::Invalid {
                key: "sample_rate",
                message: format!("{} Hz is too low", self.sample_rate),
            });
        }
        if self.hosts.a.trim().is_empty() || self.hosts.b.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "hosts",
                message: "host names must not be empty".to_string(),
            });
        }
        Ok(self)
    }

    /// Controller settings derived from these settings.
    pub fn playback(&self) -> PlaybackConfig {
        PlaybackConfig {
            voice_a: self.voice_a.clone(),
            voice_b: self.voice_b.clone(),
            rate: self.speaking_rate,
            utterance_timeout: self.utterance_timeout_secs.map(Duration::from_secs),
        }
    }
}
