//! Stage runners for the command line
//!
//! Each stage is a thin shell around a cartographer-core component: it
//! resolves paths from the config, wires progress output, and prints a
//! summary. `run` chains the stages in order.

use std::fmt;
use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use cartographer_core::generate::GenerationProgress;
use cartographer_core::source::{write_songlist, DownloadProgress};
use cartographer_core::{
    audio_tracks, ChromiumLauncher, Config, DownloadSummary, MapAutomator, NormalizeReport,
    Normalizer, RunReport, YtDlp,
};

/// One step of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Generate,
    Clean,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => write!(f, "Download Songs"),
            Self::Generate => write!(f, "Generate Maps"),
            Self::Clean => write!(f, "Clean/Finalize Maps"),
        }
    }
}

/// Command-line choices that affect how stages run
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Playlist URL overriding the config
    pub playlist: Option<String>,
    /// Ask before each stage
    pub confirm: bool,
    /// Machine-readable output only
    pub json: bool,
}

/// What each stage produced; `None` for stages that did not run
#[derive(Debug, Default, Serialize)]
pub struct Outcome {
    pub download: Option<DownloadSummary>,
    pub generate: Option<RunReport>,
    pub clean: Option<NormalizeReport>,
}

impl Outcome {
    /// True when map generation ran and at least one job failed
    pub fn has_failed_jobs(&self) -> bool {
        self.generate
            .as_ref()
            .map(|report| !report.is_success())
            .unwrap_or(false)
    }
}

/// Ask `Run step '<name>'? [Y/n]`. Anything but `n`/`no` means yes.
pub fn confirm<R: BufRead, W: Write>(stage: Stage, input: &mut R, output: &mut W) -> io::Result<bool> {
    write!(output, "Run step '{}'? [Y/n] ", stage)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer != "n" && answer != "no")
}

/// Run `stages` in order, stopping at the first stage that errors
pub async fn run(
    config: &Config,
    stages: &[Stage],
    options: &Options,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    let mut outcome = Outcome::default();

    for &stage in stages {
        if cancel.is_cancelled() {
            bail!("Cancelled before '{}'", stage);
        }

        eprintln!();
        eprintln!("=== {} ===", stage);

        if options.confirm {
            let accepted = confirm(stage, &mut io::stdin().lock(), &mut io::stderr())
                .context("Failed to read answer")?;
            if !accepted {
                eprintln!("[SKIP] {}", stage);
                continue;
            }
        }

        match stage {
            Stage::Download => {
                let playlist = options.playlist.as_deref();
                let summary = run_download(config, playlist, options.json, cancel)
                    .await
                    .with_context(|| format!("Step '{}' failed", stage))?;
                if !options.json {
                    print_download_summary(&summary);
                }
                outcome.download = Some(summary);
            }
            Stage::Generate => {
                let report = run_generate(config, options.json, cancel)
                    .await
                    .with_context(|| format!("Step '{}' failed", stage))?;
                if !options.json {
                    print_run_report(&report);
                }
                outcome.generate = Some(report);
            }
            Stage::Clean => {
                let report = run_clean(config)
                    .await
                    .with_context(|| format!("Step '{}' failed", stage))?;
                if !options.json {
                    print_normalize_report(&report);
                }
                outcome.clean = Some(report);
            }
        }

        eprintln!("[OK] {} completed.", stage);
    }

    Ok(outcome)
}

/// Resolve the playlist, write `songlist`, download every entry
pub async fn run_download(
    config: &Config,
    playlist: Option<&str>,
    json: bool,
    cancel: &CancellationToken,
) -> Result<DownloadSummary> {
    let playlist_url = playlist
        .filter(|url| !url.trim().is_empty())
        .unwrap_or(config.download.playlist_url.as_str());
    if playlist_url.trim().is_empty() {
        bail!("No playlist URL provided (--playlist or download.playlist_url in vars.json)");
    }

    tracing::info!("Using playlist: {}", playlist_url);
    let ytdlp = YtDlp::new(&config.download.yt_dlp_path);
    let urls = ytdlp.playlist_entries(playlist_url).await?;
    tracing::info!("Found {} videos in playlist", urls.len());

    let songlist = write_songlist(&config.songlist_path(), &urls)?;
    tracing::info!("Wrote songlist to {}", songlist.display());

    let show_progress = config.download.progress_bar && !json;
    let progress_callback: Box<dyn Fn(DownloadProgress) + Send + Sync> = if show_progress {
        Box::new(|progress: DownloadProgress| {
            eprint!(
                "\rDownloading audio: {}/{} - {}",
                progress.current, progress.total, progress.url
            );
        })
    } else {
        Box::new(|_| {})
    };

    let summary = ytdlp
        .download_all(
            &urls,
            &config.songs_dir(),
            &config.download.audio_format,
            Some(&progress_callback),
            cancel,
        )
        .await;

    if show_progress {
        eprintln!(); // New line after progress
    }
    Ok(summary?)
}

/// Generate a map for every audio file in the songs directory
pub async fn run_generate(config: &Config, json: bool, cancel: &CancellationToken) -> Result<RunReport> {
    let songs_dir = config.songs_dir();
    let tracks = if songs_dir.is_dir() {
        audio_tracks(&songs_dir)?
    } else {
        Vec::new()
    };

    if tracks.is_empty() {
        tracing::warn!("No audio files found in {}", songs_dir.display());
        return Ok(RunReport::default());
    }
    tracing::info!("Found {} audio files in {}", tracks.len(), songs_dir.display());

    let mut automator = MapAutomator::new(config.automator_config(), ChromiumLauncher);
    if !json {
        automator = automator.with_progress_callback(Box::new(|progress: GenerationProgress| {
            eprint!(
                "\r[{}/{}] {}: {}",
                progress.current, progress.total, progress.phase, progress.current_name
            );
        }));
    }

    let report = automator.run(&tracks, cancel).await;
    if !json {
        eprintln!();
    }
    Ok(report?)
}

/// Unzip archives and clean map metadata
pub async fn run_clean(config: &Config) -> Result<NormalizeReport> {
    let normalizer = Normalizer::new(config.maps_dir(), config.postprocess.author_name.clone());
    let report = tokio::task::spawn_blocking(move || normalizer.run())
        .await
        .context("Cleanup task panicked")??;
    Ok(report)
}

fn print_download_summary(summary: &DownloadSummary) {
    println!("Download Complete:");
    println!("  Downloaded: {}", summary.downloaded);
    println!("  Failed:     {}", summary.failed.len());

    if !summary.failed.is_empty() {
        println!();
        println!("Errors:");
        for (url, message) in &summary.failed {
            println!("  - [{}] {}", url, message);
        }
    }
}

fn print_run_report(report: &RunReport) {
    println!("Generation Complete:");
    println!("  Generated: {}", report.succeeded.len());
    println!("  Failed:    {}", report.failed.len());
    println!("  Skipped:   {}", report.skipped.len());

    if !report.succeeded.is_empty() {
        println!();
        println!("Maps:");
        for archive in &report.succeeded {
            println!("  - {} -> {}", archive.track.display_name(), archive.archive.display());
        }
    }

    if !report.failed.is_empty() {
        println!();
        println!("Failures:");
        for failure in &report.failed {
            println!(
                "  - [{}] {}: {}",
                failure.kind,
                failure.audio.display(),
                failure.reason
            );
        }
    }
}

fn print_normalize_report(report: &NormalizeReport) {
    println!("Cleanup Complete:");
    println!("  Extracted:           {}", report.extracted);
    println!("  Already extracted:   {}", report.skipped);
    println!("  Info.dat updated:    {}", report.info_updated);
    println!("  Difficulties cleaned: {}", report.difficulties_cleaned);

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &report.errors {
            println!("  - [{}] {}", error.path.display(), error.message);
        }
    }
}
