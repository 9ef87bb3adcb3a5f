//! Run loop: one browser session, every audio file in order

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, FailureKind, Result};
use crate::generate::download::{clear_staging, ArchiveRetriever, StabilizeSettings};
use crate::generate::driver::{LaunchOptions, Launcher, PageDriver};
use crate::generate::job::{GenerationParameters, JobState};
use crate::generate::poll::JobPoller;
use crate::generate::selectors::PageSelectors;
use crate::generate::session::Session;
use crate::generate::submit::SubmissionController;
use crate::source::AudioTrack;

/// Settings for one automator run. Immutable once the run starts.
#[derive(Debug, Clone)]
pub struct AutomatorConfig {
    /// Entry page of the generation service
    pub service_url: String,
    pub params: GenerationParameters,
    pub selectors: PageSelectors,
    /// Longest time a single job may take before it is `TimedOut`
    pub max_wait: Duration,
    /// Spacing between page polls
    pub poll_interval: Duration,
    /// How long to wait for a form control to appear
    pub element_timeout: Duration,
    pub stabilize: StabilizeSettings,
    /// Finished archives end up here
    pub maps_dir: PathBuf,
    /// Browser download directory
    pub staging_dir: PathBuf,
    /// Skip tracks that already have an archive in `maps_dir`
    pub skip_existing: bool,
}

impl Default for AutomatorConfig {
    fn default() -> Self {
        Self {
            service_url: "https://beatsage.com/".to_string(),
            params: GenerationParameters::default(),
            selectors: PageSelectors::default(),
            max_wait: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_secs(5),
            element_timeout: Duration::from_secs(10),
            stabilize: StabilizeSettings::default(),
            maps_dir: PathBuf::from("maps"),
            staging_dir: PathBuf::from("maps").join(".staging"),
            skip_existing: true,
        }
    }
}

/// An archive handed off for unpacking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArchive {
    pub archive: PathBuf,
    pub track: AudioTrack,
}

/// A track that produced no archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub audio: PathBuf,
    pub kind: FailureKind,
    pub reason: String,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub succeeded: Vec<GeneratedArchive>,
    pub failed: Vec<FailureRecord>,
    /// Tracks whose archive already existed
    pub skipped: Vec<AudioTrack>,
}

impl RunReport {
    /// Total number of tracks handled
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    /// True when no job failed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Phase of the job currently being driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationPhase {
    #[default]
    Submitting,
    Rendering,
    Downloading,
    Skipped,
}

impl std::fmt::Display for GenerationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitting => write!(f, "Submitting"),
            Self::Rendering => write!(f, "Rendering"),
            Self::Downloading => write!(f, "Downloading"),
            Self::Skipped => write!(f, "Skipped"),
        }
    }
}

/// Progress information for generation callbacks
#[derive(Debug, Clone, Default)]
pub struct GenerationProgress {
    /// 1-based index of the current track
    pub current: usize,
    pub total: usize,
    pub current_name: String,
    pub phase: GenerationPhase,
}

/// Progress callback type
pub type GenerationProgressCallback = Box<dyn Fn(GenerationProgress) + Send + Sync>;

/// How a single job ended, when it ended without an error
enum JobOutcome {
    Archive(PathBuf),
    Failed(FailureKind, String),
}

/// Drives the remote generation service for a list of audio files
pub struct MapAutomator<L: Launcher> {
    config: AutomatorConfig,
    launcher: L,
    progress_callback: Option<GenerationProgressCallback>,
}

impl<L: Launcher> MapAutomator<L> {
    pub fn new(config: AutomatorConfig, launcher: L) -> Self {
        Self {
            config,
            launcher,
            progress_callback: None,
        }
    }

    /// Set the progress callback
    pub fn with_progress_callback(mut self, callback: GenerationProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &AutomatorConfig {
        &self.config
    }

    fn report_progress(&self, current: usize, total: usize, track: &AudioTrack, phase: GenerationPhase) {
        if let Some(ref cb) = self.progress_callback {
            cb(GenerationProgress {
                current,
                total,
                current_name: track.display_name(),
                phase,
            });
        }
    }

    /// Generate a map for every track, in order.
    ///
    /// A job-level failure is recorded and the run moves on. Only a browser
    /// that cannot start or a cancellation ends the run early; the session
    /// is released in every case.
    pub async fn run(&self, tracks: &[AudioTrack], cancel: &CancellationToken) -> Result<RunReport> {
        tokio::fs::create_dir_all(&self.config.maps_dir).await?;

        let options = LaunchOptions {
            headless: self.config.params.headless,
            download_dir: self.config.staging_dir.clone(),
        };
        let mut session = Session::acquire(&self.launcher, &options).await?;

        let result = self.drive(&mut session, tracks, cancel).await;

        if let Err(e) = session.release().await {
            tracing::warn!("Failed to close browser cleanly: {}", e);
        }
        if result.is_err() {
            if let Err(e) = clear_staging(&self.config.staging_dir).await {
                tracing::warn!("Failed to clear staging directory: {}", e);
            }
        }

        result
    }

    async fn drive(
        &self,
        session: &mut Session<L::Driver>,
        tracks: &[AudioTrack],
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();
        let total = tracks.len();

        for (index, track) in tracks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if self.config.skip_existing {
                if let Some(existing) = skippable_archive(&self.config.maps_dir, track) {
                    tracing::info!(
                        "Map already exists for {}: {}",
                        track.display_name(),
                        existing.display()
                    );
                    self.report_progress(index + 1, total, track, GenerationPhase::Skipped);
                    report.skipped.push(track.clone());
                    continue;
                }
            }

            tracing::info!("Generating map for {}", track.display_name());
            match self.process(session, index + 1, total, track, cancel).await {
                Ok(JobOutcome::Archive(archive)) => {
                    report.succeeded.push(GeneratedArchive {
                        archive,
                        track: track.clone(),
                    });
                }
                Ok(JobOutcome::Failed(kind, reason)) => {
                    tracing::warn!("{} {}: {}", kind, track.display_name(), reason);
                    report.failed.push(FailureRecord {
                        audio: track.path.clone(),
                        kind,
                        reason,
                    });
                }
                Err(e) => match e.failure_kind() {
                    Some(kind) => {
                        tracing::error!("Failed for {}: {}", track.display_name(), e);
                        report.failed.push(FailureRecord {
                            audio: track.path.clone(),
                            kind,
                            reason: e.to_string(),
                        });
                    }
                    None => return Err(e),
                },
            }
        }

        Ok(report)
    }

    /// Drive one track from upload to a saved archive
    async fn process(
        &self,
        session: &mut Session<L::Driver>,
        current: usize,
        total: usize,
        track: &AudioTrack,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome> {
        let config = &self.config;
        clear_staging(&config.staging_dir).await?;

        self.report_progress(current, total, track, GenerationPhase::Submitting);
        let submitter =
            SubmissionController::new(&config.service_url, &config.selectors, config.element_timeout);
        let mut job = submitter
            .submit(session, &track.path, &config.params, cancel)
            .await?;

        self.report_progress(current, total, track, GenerationPhase::Rendering);
        let poller = JobPoller::new(
            &config.selectors,
            &config.staging_dir,
            config.poll_interval,
            config.max_wait,
        );
        let state = poller.wait_for_terminal(session, &mut job, cancel).await?;

        match state {
            JobState::Completed => {
                self.report_progress(current, total, track, GenerationPhase::Downloading);
                let retriever = ArchiveRetriever::new(
                    &config.selectors,
                    &config.staging_dir,
                    &config.maps_dir,
                    config.stabilize,
                );
                match retriever.retrieve(session, &mut job, cancel).await {
                    Ok(archive) => Ok(JobOutcome::Archive(archive)),
                    Err(e) => {
                        discard_staging(&config.staging_dir).await;
                        Err(e)
                    }
                }
            }
            JobState::Failed => {
                let reason = job
                    .failure()
                    .unwrap_or("remote service reported an error")
                    .to_string();
                Ok(JobOutcome::Failed(FailureKind::Failed, reason))
            }
            _ => {
                discard_staging(&config.staging_dir).await;
                Ok(JobOutcome::Failed(
                    FailureKind::TimedOut,
                    format!("no result within {}s", config.max_wait.as_secs()),
                ))
            }
        }
    }
}

async fn discard_staging(dir: &Path) {
    if let Err(e) = clear_staging(dir).await {
        tracing::warn!("Failed to discard partial download: {}", e);
    }
}

/// An archive in `maps_dir` whose name contains `stem`
pub fn existing_archive(maps_dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
    if stem.is_empty() {
        return Ok(None);
    }

    let entries = match std::fs::read_dir(maps_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        let is_zip = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy().contains(stem))
            .unwrap_or(false);
        if is_zip && matches && path.is_file() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// The archive that lets `track` be skipped. A maps directory that cannot
/// be read counts as having no archive.
fn skippable_archive(maps_dir: &Path, track: &AudioTrack) -> Option<PathBuf> {
    match existing_archive(maps_dir, &track.stem()) {
        Ok(existing) => existing,
        Err(e) => {
            tracing::warn!(
                "Cannot check {} for an existing map of {}: {}",
                maps_dir.display(),
                track.display_name(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_existing_archive_matches_stem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Beat Sage_Levitating - Dua Lipa (v2-flow E).zip"),
            b"PK",
        )
        .unwrap();
        std::fs::write(dir.path().join("Other - Song.txt"), b"x").unwrap();

        let found = existing_archive(dir.path(), "Levitating - Dua Lipa").unwrap();
        assert!(found.is_some());
        assert!(existing_archive(dir.path(), "Other - Song").unwrap().is_none());
        assert!(existing_archive(dir.path(), "").unwrap().is_none());
    }

    #[test]
    fn test_existing_archive_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(existing_archive(&dir.path().join("missing"), "x").unwrap().is_none());
    }

    #[test]
    fn test_unreadable_maps_dir_is_not_skipped() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("maps");
        std::fs::write(&not_a_dir, b"x").unwrap();
        let track = AudioTrack::from_path(&dir.path().join("Levitating - Dua Lipa.m4a"));

        assert!(existing_archive(&not_a_dir, &track.stem()).is_err());
        assert!(skippable_archive(&not_a_dir, &track).is_none());
    }

    #[test]
    fn test_report_counts() {
        let mut report = RunReport::default();
        assert!(report.is_success());
        report.failed.push(FailureRecord {
            audio: PathBuf::from("a.m4a"),
            kind: FailureKind::TimedOut,
            reason: "no result within 120s".to_string(),
        });
        report.skipped.push(AudioTrack::from_path(Path::new("b - c.m4a")));
        assert_eq!(report.total(), 2);
        assert!(!report.is_success());
    }
}
