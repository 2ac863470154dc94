use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub recording: RecordingConfig,
    pub transcription: TranscriptionConfig,
    pub scheduler: SchedulerConfig,
    pub meeting: MeetingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 3870 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for stored artifacts. Empty = data dir default.
    pub root_dir: String,
    /// Lifetime of signed download URLs, in seconds.
    pub signed_url_ttl_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: String::new(),
            signed_url_ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Container format for recordings (mp4, webm, mkv).
    pub format: String,
    /// Output resolution as WxH.
    pub resolution: String,
    pub fps: u32,
    /// Target video bitrate, ffmpeg syntax (e.g. "2000k").
    pub bitrate: String,
    /// Kick off transcription automatically once a recording is finalized.
    pub auto_transcribe: bool,
    /// Explicit ffmpeg binary path. Empty = discover via PATH.
    pub ffmpeg_path: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            format: "mp4".to_string(),
            resolution: "1280x720".to_string(),
            fps: 30,
            bitrate: "2000k".to_string(),
            auto_transcribe: true,
            ffmpeg_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub api_key: Option<String>,
    pub api_endpoint: Option<String>,
    pub language: String,
    pub speaker_labels: bool,
    pub poll_interval_seconds: u64,
    pub poll_max_attempts: u32,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_endpoint: None,
            language: "en".to_string(),
            speaker_labels: true,
            poll_interval_seconds: 5,
            poll_max_attempts: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub meeting_expiry_interval_minutes: u64,
    pub attendance_interval_minutes: u64,
    /// Open attendance sessions older than this are force punched out.
    pub attendance_threshold_hours: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            meeting_expiry_interval_minutes: 1,
            attendance_interval_minutes: 15,
            attendance_threshold_hours: 9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingConfig {
    pub max_participants: u32,
    /// Default meeting duration in minutes when a request omits one.
    pub default_duration_minutes: u32,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            max_participants: 50,
            default_duration_minutes: 60,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", config_path))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file {:?}", config_path))?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.api.port, 3870);
        assert_eq!(parsed.recording.format, "mp4");
        assert_eq!(parsed.recording.resolution, "1280x720");
        assert_eq!(parsed.scheduler.attendance_threshold_hours, 9);
        assert_eq!(parsed.transcription.poll_max_attempts, 120);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [recording]
            format = "webm"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.recording.format, "webm");
        assert_eq!(parsed.recording.fps, 30);
        assert_eq!(parsed.meeting.max_participants, 50);
        assert!(parsed.recording.auto_transcribe);
    }
}
