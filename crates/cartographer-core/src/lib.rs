//! # cartographer-core
//!
//! Core library for turning a YouTube playlist into Beat Saber maps that
//! open cleanly in ChroMapper.
//!
//! This crate provides the foundational functionality for:
//! - Downloading playlist audio through yt-dlp
//! - Generating maps with Beat Sage through browser automation
//! - Unpacking generated archives and stripping generator metadata
//!
//! ## Modules
//!
//! - [`config`] - `vars.json` loading and path resolution
//! - [`error`] - Error types and Result alias
//! - [`generate`] - Beat Sage session, submission, polling and download
//! - [`normalize`] - Archive extraction and map cleanup
//! - [`source`] - Playlist expansion and audio download
//!
//! ## Example
//!
//! ```no_run
//! use cartographer_core::{audio_tracks, ChromiumLauncher, Config, MapAutomator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> cartographer_core::Result<()> {
//! let config = Config::load(None)?;
//! let tracks = audio_tracks(&config.songs_dir())?;
//!
//! let automator = MapAutomator::new(config.automator_config(), ChromiumLauncher);
//! let report = automator.run(&tracks, &CancellationToken::new()).await?;
//! println!("Generated {} of {} maps", report.succeeded.len(), report.total());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod generate;
pub mod normalize;
pub mod source;

// Error types
pub use error::{Error, FailureKind, Result};

// Configuration
pub use config::{
    BeatSageConfig, Config, DownloadConfig, PathsConfig, PostprocessConfig, CONFIG_FILE_NAME,
};

// Audio source
pub use source::{
    audio_tracks, AudioTrack, DownloadProgress, DownloadProgressCallback, DownloadSummary, YtDlp,
};

// Map generation
pub use generate::{
    AutomatorConfig, FailureRecord, GeneratedArchive, GenerationJob, GenerationParameters,
    GenerationPhase, GenerationProgress, GenerationProgressCallback, JobState, Launcher,
    MapAutomator, PageDriver, PageSelectors, RunReport,
};
#[cfg(feature = "chromium")]
pub use generate::ChromiumLauncher;

// Cleanup
pub use normalize::{clean_name, NormalizeError, NormalizeReport, Normalizer};
