//! Archive download and handoff
//!
//! The browser writes downloads into a staging directory. A file is only
//! handed to the next stage once it has stopped growing; anything left in
//! staging after a failed job is deleted.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::generate::driver::PageDriver;
use crate::generate::job::{GenerationJob, JobState};
use crate::generate::selectors::PageSelectors;
use crate::generate::session::Session;

/// Suffixes browsers use for downloads that are still being written
const PARTIAL_SUFFIXES: &[&str] = &["crdownload", "part", "tmp", "download"];

/// How long and how often to check that a download has settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizeSettings {
    /// Spacing between size checks
    pub interval: Duration,
    /// Consecutive checks with the same non-zero size required
    pub checks: u32,
    /// Give up after this long
    pub timeout: Duration,
}

impl Default for StabilizeSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            checks: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

/// True for files a browser is still writing
pub fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            PARTIAL_SUFFIXES
                .iter()
                .any(|partial| ext.eq_ignore_ascii_case(partial))
        })
        .unwrap_or(false)
}

/// Files currently in `dir` as `(path, size)`, partial ones flagged separately
async fn scan_staging(dir: &Path) -> Result<(Vec<(PathBuf, u64)>, bool)> {
    let mut finished = Vec::new();
    let mut has_partial = false;

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((finished, false)),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        if is_partial(&path) {
            has_partial = true;
        } else {
            finished.push((path, metadata.len()));
        }
    }

    finished.sort();
    Ok((finished, has_partial))
}

/// Whether anything, finished or not, has landed in `dir`
pub async fn staging_has_files(dir: &Path) -> Result<bool> {
    let (finished, has_partial) = scan_staging(dir).await?;
    Ok(!finished.is_empty() || has_partial)
}

/// Finished non-empty files in `dir`, and whether a download is still
/// being written there
pub async fn staged_downloads(dir: &Path) -> Result<(usize, bool)> {
    let (finished, has_partial) = scan_staging(dir).await?;
    let count = finished.iter().filter(|(_, size)| *size > 0).count();
    Ok((count, has_partial))
}

/// `dir/file_name`, or `name (1).ext`, `name (2).ext`, ... when taken
pub fn unique_target(dir: &Path, file_name: &OsStr) -> PathBuf {
    let first = dir.join(file_name);
    if !first.exists() {
        return first;
    }

    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy().into_owned());

    (1u32..)
        .map(|n| match &ext {
            Some(ext) => dir.join(format!("{} ({}).{}", stem, n, ext)),
            None => dir.join(format!("{} ({})", stem, n)),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Remove everything in the staging directory, recreating it empty
pub async fn clear_staging(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

/// Wait for a finished file in `dir` whose size stays the same for
/// `settings.checks` consecutive checks.
pub async fn wait_for_stable_file(
    dir: &Path,
    settings: StabilizeSettings,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let deadline = Instant::now() + settings.timeout;
    let required = settings.checks.max(1);
    let mut last: Option<(PathBuf, u64)> = None;
    let mut stable_count = 0u32;

    loop {
        let (finished, has_partial) = scan_staging(dir).await?;

        match finished.into_iter().next() {
            Some(current) if !has_partial && current.1 > 0 => {
                if last.as_ref() == Some(&current) {
                    stable_count += 1;
                } else {
                    stable_count = 1;
                }
                last = Some(current);
            }
            other => {
                stable_count = 0;
                last = other;
            }
        }

        if stable_count >= required {
            if let Some((path, size)) = last {
                tracing::debug!("Download settled: {} ({} bytes)", path.display(), size);
                return Ok(path);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            let reason = match last {
                Some((path, size)) => format!(
                    "{} was still changing after {}s ({} bytes)",
                    path.display(),
                    settings.timeout.as_secs(),
                    size
                ),
                None => format!(
                    "no finished file appeared in {} within {}s",
                    dir.display(),
                    settings.timeout.as_secs()
                ),
            };
            return Err(Error::DownloadIncomplete { reason });
        }

        let nap = settings.interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(nap) => {}
        }
    }
}

/// Fetches the archive of a completed job into the maps directory
pub struct ArchiveRetriever<'a> {
    selectors: &'a PageSelectors,
    staging_dir: &'a Path,
    maps_dir: &'a Path,
    settings: StabilizeSettings,
}

impl<'a> ArchiveRetriever<'a> {
    pub fn new(
        selectors: &'a PageSelectors,
        staging_dir: &'a Path,
        maps_dir: &'a Path,
        settings: StabilizeSettings,
    ) -> Self {
        Self {
            selectors,
            staging_dir,
            maps_dir,
            settings,
        }
    }

    /// Download the archive of `job` and move it into the maps directory.
    ///
    /// Only `Completed` jobs are accepted. On success the job is handed off
    /// and the returned path points at a closed, fully written file.
    pub async fn retrieve<D: PageDriver>(
        &self,
        session: &mut Session<D>,
        job: &mut GenerationJob,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        job.ensure_state(JobState::Completed)?;

        // The service may have started the download on its own already
        if !staging_has_files(self.staging_dir).await? {
            session
                .driver()
                .click(&self.selectors.download_ready, None)
                .await?;
        }

        let staged = wait_for_stable_file(self.staging_dir, self.settings, cancel).await?;
        let file_name = staged
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| Error::Other(format!("bad download name: {}", staged.display())))?;

        tokio::fs::create_dir_all(self.maps_dir).await?;
        let target = unique_target(self.maps_dir, &file_name);
        if target.file_name() != Some(file_name.as_os_str()) {
            tracing::warn!(
                "{} already exists in {}, saving as {}",
                file_name.to_string_lossy(),
                self.maps_dir.display(),
                target.display()
            );
        }
        tokio::fs::rename(&staged, &target).await?;

        job.hand_off(target.clone())?;
        tracing::info!("Saved map to {}", target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast() -> StabilizeSettings {
        StabilizeSettings {
            interval: Duration::from_millis(100),
            checks: 2,
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_is_partial() {
        assert!(is_partial(Path::new("map.zip.crdownload")));
        assert!(is_partial(Path::new("map.zip.PART")));
        assert!(!is_partial(Path::new("map.zip")));
        assert!(!is_partial(Path::new("README")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_file_is_returned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Beat Sage_song.zip");
        std::fs::write(&path, b"PK\x03\x04 archive").unwrap();

        let found = wait_for_stable_file(dir.path(), fast(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found, path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_file_never_settles() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("song.zip.crdownload"), b"PK").unwrap();

        let err = wait_for_stable_file(dir.path(), fast(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadIncomplete { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_file_never_settles() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("song.zip"), b"").unwrap();

        let err = wait_for_stable_file(dir.path(), fast(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadIncomplete { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_dir_times_out() {
        let dir = TempDir::new().unwrap();
        let err = wait_for_stable_file(&dir.path().join("nope"), fast(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadIncomplete { .. }));
    }

    #[tokio::test]
    async fn test_clear_staging_empties_directory() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join(".staging");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("left.zip.crdownload"), b"x").unwrap();

        clear_staging(&staging).await.unwrap();

        assert!(staging.is_dir());
        assert!(!staging_has_files(&staging).await.unwrap());
    }

    #[tokio::test]
    async fn test_staged_downloads_counts_finished_files() {
        let dir = TempDir::new().unwrap();
        assert_eq!(staged_downloads(&dir.path().join("nope")).await.unwrap(), (0, false));

        std::fs::write(dir.path().join("empty.zip"), b"").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"x").unwrap();
        assert_eq!(staged_downloads(dir.path()).await.unwrap(), (0, false));

        std::fs::write(dir.path().join("next.zip.crdownload"), b"PK").unwrap();
        assert_eq!(staged_downloads(dir.path()).await.unwrap(), (0, true));

        std::fs::write(dir.path().join("Beat Sage_song.zip"), b"PK\x03\x04").unwrap();
        assert_eq!(staged_downloads(dir.path()).await.unwrap(), (1, true));
    }

    #[test]
    fn test_unique_target_keeps_free_name() {
        let dir = TempDir::new().unwrap();
        let target = unique_target(dir.path(), OsStr::new("Beat Sage_song.zip"));
        assert_eq!(target, dir.path().join("Beat Sage_song.zip"));
    }

    #[test]
    fn test_unique_target_numbers_taken_names() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Beat Sage_song.zip"), b"old").unwrap();
        std::fs::write(dir.path().join("Beat Sage_song (1).zip"), b"older").unwrap();

        let target = unique_target(dir.path(), OsStr::new("Beat Sage_song.zip"));
        assert_eq!(target, dir.path().join("Beat Sage_song (2).zip"));

        std::fs::write(dir.path().join("README"), b"x").unwrap();
        let target = unique_target(dir.path(), OsStr::new("README"));
        assert_eq!(target, dir.path().join("README (1)"));
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = wait_for_stable_file(dir.path(), fast(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
