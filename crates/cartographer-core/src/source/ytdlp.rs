//! yt-dlp wrapper

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Output template; the track parser relies on the `title - uploader` shape
pub const OUTPUT_TEMPLATE: &str = "%(title)s - %(uploader)s.%(ext)s";

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Progress for each playlist entry
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub current: usize,
    pub total: usize,
    pub url: String,
}

/// Download progress callback type
pub type DownloadProgressCallback = Box<dyn Fn(DownloadProgress) + Send + Sync>;

/// Outcome of downloading a whole playlist
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadSummary {
    pub downloaded: usize,
    /// `(url, error message)` for each entry that could not be fetched
    pub failed: Vec<(String, String)>,
}

/// Runs the `yt-dlp` binary
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        tracing::debug!("yt-dlp {}", args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Download(format!("cannot run {}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Download(format!(
                "exit status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Video URLs of a playlist, without downloading anything
    pub async fn playlist_entries(&self, playlist_url: &str) -> Result<Vec<String>> {
        let stdout = self
            .run(&["--flat-playlist", "--dump-single-json", "--quiet", playlist_url])
            .await?;
        let info: Value = serde_json::from_slice(&stdout)?;
        let urls = entry_urls(&info);
        if urls.is_empty() {
            return Err(Error::Download(format!(
                "playlist has no entries: {}",
                playlist_url
            )));
        }
        Ok(urls)
    }

    /// Download one video's audio into `songs_dir`.
    ///
    /// Prefers `audio_format`, falling back to the best m4a, then anything.
    pub async fn download_audio(&self, url: &str, songs_dir: &Path, audio_format: &str) -> Result<()> {
        let format = format_selector(audio_format);
        let template = songs_dir.join(OUTPUT_TEMPLATE);
        let template = template.to_string_lossy();
        self.run(&[
            "--format",
            format.as_str(),
            "--output",
            template.as_ref(),
            "--quiet",
            "--no-progress",
            url,
        ])
        .await?;
        Ok(())
    }

    /// Download every URL in order. Failures are logged and collected; they
    /// never stop the remaining downloads.
    pub async fn download_all(
        &self,
        urls: &[String],
        songs_dir: &Path,
        audio_format: &str,
        progress: Option<&DownloadProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<DownloadSummary> {
        tokio::fs::create_dir_all(songs_dir).await?;
        let mut summary = DownloadSummary::default();

        for (index, url) in urls.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Some(cb) = progress {
                cb(DownloadProgress {
                    current: index + 1,
                    total: urls.len(),
                    url: url.clone(),
                });
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = self.download_audio(url, songs_dir, audio_format) => result,
            };
            match result {
                Ok(()) => summary.downloaded += 1,
                Err(e) => {
                    tracing::error!("Failed to download {}: {}", url, e);
                    summary.failed.push((url.clone(), e.to_string()));
                }
            }
        }

        Ok(summary)
    }
}

/// yt-dlp format selector with fallbacks
pub fn format_selector(audio_format: &str) -> String {
    format!("{}/bestaudio[ext=m4a]/bestaudio/best", audio_format)
}

/// Extract watch URLs from a flat playlist dump.
///
/// Bare video IDs become full watch URLs; duplicates are dropped, keeping
/// the first occurrence.
pub fn entry_urls(info: &Value) -> Vec<String> {
    let entries = match info.get("entries").and_then(Value::as_array) {
        Some(entries) => entries,
        None => return Vec::new(),
    };

    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(|entry| {
            entry
                .get("webpage_url")
                .and_then(Value::as_str)
                .filter(|u| !u.is_empty())
                .or_else(|| entry.get("url").and_then(Value::as_str))
        })
        .filter(|url| !url.is_empty())
        .map(|url| {
            if url.starts_with("http") {
                url.to_string()
            } else {
                format!("{}{}", WATCH_URL, url)
            }
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Write the `songlist` file, one URL per line
pub fn write_songlist(path: &Path, urls: &[String]) -> Result<PathBuf> {
    let mut content = urls.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    std::fs::write(path, content)?;
    Ok(path.to_path_buf())
}
