//! Configuration loading (`vars.json`)
//!
//! The configuration is read once at start-up and then passed around as an
//! immutable value. Nothing in the crate reads it from global state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::generate::{AutomatorConfig, GenerationParameters, PageSelectors};

/// File name looked up when no explicit config path is given
pub const CONFIG_FILE_NAME: &str = "vars.json";

/// Upper bound for any configured wait
pub const MAX_CONFIGURED_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Top-level configuration for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project root; `"."` means the directory holding the config file
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    pub beatsage: BeatSageConfig,
    pub postprocess: PostprocessConfig,
}

/// Directory names relative to `base_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub songs: PathBuf,
    pub maps: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            songs: PathBuf::from("songs"),
            maps: PathBuf::from("maps"),
        }
    }
}

/// Settings for the yt-dlp stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default)]
    pub playlist_url: String,
    /// Preferred yt-dlp format code (140 is m4a 128k on YouTube)
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    #[serde(default = "default_true")]
    pub progress_bar: bool,
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp_path: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            playlist_url: String::new(),
            audio_format: default_audio_format(),
            progress_bar: true,
            yt_dlp_path: default_yt_dlp(),
        }
    }
}

/// Settings for the Beat Sage automation stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatSageConfig {
    pub url: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    pub artist_name: String,
    pub difficulty_label: String,
    pub model_value: String,
    #[serde(default = "default_timeout_minutes")]
    pub download_timeout_minutes: f64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: f64,
    #[serde(default)]
    pub selectors: PageSelectors,
}

/// Settings for the cleanup stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostprocessConfig {
    pub author_name: String,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_audio_format() -> String {
    "140".to_string()
}

fn default_yt_dlp() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_true() -> bool {
    true
}

fn default_timeout_minutes() -> f64 {
    10.0
}

fn default_poll_interval() -> f64 {
    5.0
}

impl Config {
    /// Per-user config location, e.g. `~/.config/cartographer/vars.json`
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cartographer").join(CONFIG_FILE_NAME))
    }

    /// Find the config file: explicit path, then `./vars.json`, then the
    /// per-user config directory.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Ok(local);
        }

        if let Some(user) = Self::user_config_path().filter(|p| p.is_file()) {
            return Ok(user);
        }

        Err(Error::Config(format!(
            "no {} found in the current directory or user config directory",
            CONFIG_FILE_NAME
        )))
    }

    /// Load and resolve the configuration
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = Self::locate(explicit)?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;

        let config_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let config = Self::from_json(&content, &config_dir)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration text, resolving `base_dir` against `config_dir`
    pub fn from_json(content: &str, config_dir: &Path) -> Result<Self> {
        let mut config: Config = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))?;
        config.base_dir = resolve_base_dir(&config.base_dir, config_dir)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("beatsage.url", &self.beatsage.url),
            ("beatsage.artist_name", &self.beatsage.artist_name),
            ("beatsage.difficulty_label", &self.beatsage.difficulty_label),
            ("beatsage.model_value", &self.beatsage.model_value),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", name)));
            }
        }
        self.poll_interval()?;
        self.max_wait()?;
        Ok(())
    }

    fn poll_interval(&self) -> Result<Duration> {
        configured_wait(
            "beatsage.poll_interval_seconds",
            self.beatsage.poll_interval_seconds,
        )
    }

    fn max_wait(&self) -> Result<Duration> {
        configured_wait(
            "beatsage.download_timeout_minutes",
            self.beatsage.download_timeout_minutes * 60.0,
        )
    }

    /// Directory the downloader writes audio into
    pub fn songs_dir(&self) -> PathBuf {
        self.base_dir.join(&self.paths.songs)
    }

    /// Directory holding downloaded archives and extracted map folders
    pub fn maps_dir(&self) -> PathBuf {
        self.base_dir.join(&self.paths.maps)
    }

    /// Browser download directory, emptied before every job
    pub fn staging_dir(&self) -> PathBuf {
        self.maps_dir().join(".staging")
    }

    /// The `songlist` file written by the download stage
    pub fn songlist_path(&self) -> PathBuf {
        self.base_dir.join("songlist")
    }

    /// Values applied to every generation job of a run
    pub fn generation_parameters(&self) -> GenerationParameters {
        GenerationParameters {
            artist_name: self.beatsage.artist_name.clone(),
            difficulty_label: self.beatsage.difficulty_label.clone(),
            model: self.beatsage.model_value.clone(),
            headless: self.beatsage.headless,
        }
    }

    /// Settings for the map generation automator. Waits that fail
    /// validation fall back to the automator defaults.
    pub fn automator_config(&self) -> AutomatorConfig {
        let defaults = AutomatorConfig::default();
        AutomatorConfig {
            service_url: self.beatsage.url.clone(),
            params: self.generation_parameters(),
            selectors: self.beatsage.selectors.clone(),
            max_wait: self.max_wait().unwrap_or(defaults.max_wait),
            poll_interval: self.poll_interval().unwrap_or(defaults.poll_interval),
            maps_dir: self.maps_dir(),
            staging_dir: self.staging_dir(),
            ..defaults
        }
    }
}

/// A positive wait of at most [`MAX_CONFIGURED_WAIT`]
fn configured_wait(name: &str, seconds: f64) -> Result<Duration> {
    if seconds.is_nan() || seconds <= 0.0 {
        return Err(Error::Config(format!("{} must be positive", name)));
    }
    match Duration::try_from_secs_f64(seconds) {
        Ok(wait) if wait <= MAX_CONFIGURED_WAIT => Ok(wait),
        _ => Err(Error::Config(format!(
            "{} must be at most {} hours",
            name,
            MAX_CONFIGURED_WAIT.as_secs() / 3600
        ))),
    }
}

fn resolve_base_dir(base_dir: &Path, config_dir: &Path) -> Result<PathBuf> {
    let resolved = if base_dir == Path::new(".") {
        config_dir.to_path_buf()
    } else {
        base_dir.to_path_buf()
    };

    if resolved.is_absolute() {
        return Ok(resolved);
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(resolved))
}
