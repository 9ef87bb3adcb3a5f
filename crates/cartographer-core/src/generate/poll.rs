//! Completion polling
//!
//! The remote service never tells us when a job is done; the page has to be
//! looked at until it shows a download control, an error, or we run out of
//! time. The service may also start the download by itself, so a finished
//! file in the browser's download directory counts as a download control.
//! Each poll is a read-only snapshot. Anything that looks ambiguous keeps
//! the job in `Rendering`: waiting a bit longer is cheaper than handing a
//! bogus archive downstream.

use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::generate::download::staged_downloads;
use crate::generate::driver::PageDriver;
use crate::generate::job::{GenerationJob, JobState};
use crate::generate::selectors::PageSelectors;
use crate::generate::session::Session;

/// Snapshot of the indicators on the page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageObservation {
    pub progress: usize,
    pub download_ready: usize,
    pub errors: usize,
    pub error_text: Option<String>,
    /// Finished, non-empty files already saved by the browser
    pub staged: usize,
}

/// What a snapshot means for the job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// No indicator at all
    Nothing,
    /// Job acknowledged or in progress
    Progress,
    /// Exactly one download control
    DownloadReady,
    /// Explicit error indicator, with its text
    Error(String),
    /// Conflicting or duplicated indicators
    Ambiguous,
}

/// Interpret a snapshot
pub fn classify(observation: &PageObservation) -> Signal {
    let ready = observation.download_ready;
    let errors = observation.errors;

    if observation.staged > 0 {
        return if errors > 0 {
            Signal::Ambiguous
        } else {
            Signal::DownloadReady
        };
    }
    if (ready > 0 && errors > 0) || ready > 1 {
        return Signal::Ambiguous;
    }
    if ready == 1 {
        return Signal::DownloadReady;
    }
    if errors > 0 {
        let text = observation
            .error_text
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "remote service reported an error".to_string());
        return Signal::Error(text);
    }
    if observation.progress > 0 {
        return Signal::Progress;
    }
    Signal::Nothing
}

/// State the job moves to for `signal`, if any.
///
/// A job has to be seen `Rendering` before it can complete or fail, so the
/// first poll after submission never yields a terminal state.
pub fn next_state(current: JobState, signal: &Signal) -> Option<JobState> {
    match (current, signal) {
        (JobState::Submitted, Signal::Nothing) => None,
        (JobState::Submitted, _) => Some(JobState::Rendering),
        (JobState::Rendering, Signal::DownloadReady) => Some(JobState::Completed),
        (JobState::Rendering, Signal::Error(_)) => Some(JobState::Failed),
        _ => None,
    }
}

/// Read the current page indicators and the download directory without
/// touching anything. A download still being written counts as progress.
pub async fn observe<D: PageDriver>(
    driver: &mut D,
    selectors: &PageSelectors,
    download_dir: &Path,
) -> Result<PageObservation> {
    let (staged, downloading) = staged_downloads(download_dir).await?;
    let progress = driver.count(&selectors.progress).await? + usize::from(downloading);
    let download_ready = driver.count(&selectors.download_ready).await?;
    let errors = driver.count(&selectors.job_error).await?;

    let error_text = if errors > 0 {
        Some(driver.texts(&selectors.job_error).await?.join(" ").trim().to_string())
    } else {
        None
    };

    Ok(PageObservation {
        progress,
        download_ready,
        errors,
        error_text,
        staged,
    })
}

/// Polls a submitted job until it reaches a terminal state
#[derive(Debug, Clone)]
pub struct JobPoller<'a> {
    selectors: &'a PageSelectors,
    download_dir: &'a Path,
    interval: Duration,
    max_wait: Duration,
}

impl<'a> JobPoller<'a> {
    pub fn new(
        selectors: &'a PageSelectors,
        download_dir: &'a Path,
        interval: Duration,
        max_wait: Duration,
    ) -> Self {
        Self {
            selectors,
            download_dir,
            interval,
            max_wait,
        }
    }

    /// Poll until `Completed`, `Failed` or `TimedOut`.
    ///
    /// The deadline is `max_wait` from the call; the job is only declared
    /// `TimedOut` once that much time has really passed.
    pub async fn wait_for_terminal<D: PageDriver>(
        &self,
        session: &mut Session<D>,
        job: &mut GenerationJob,
        cancel: &CancellationToken,
    ) -> Result<JobState> {
        let started = Instant::now();
        let deadline = started + self.max_wait;
        let mut polls = 0u32;

        loop {
            let observation =
                observe(session.driver(), self.selectors, self.download_dir).await?;
            polls += 1;

            let signal = classify(&observation);
            if signal == Signal::Ambiguous {
                tracing::debug!(
                    "{}: ambiguous page state {:?}, still waiting",
                    job.audio.display(),
                    observation
                );
            }

            if let Some(next) = next_state(job.state(), &signal) {
                match signal {
                    Signal::Error(reason) if next == JobState::Failed => job.fail(reason)?,
                    _ => job.transition(next)?,
                }
            }

            if job.state().is_terminal() {
                tracing::debug!(
                    "{}: {} after {} polls ({:.1}s)",
                    job.audio.display(),
                    job.state(),
                    polls,
                    started.elapsed().as_secs_f64()
                );
                return Ok(job.state());
            }

            let now = Instant::now();
            if now >= deadline {
                job.transition(JobState::TimedOut)?;
                tracing::warn!(
                    "{}: no result after {}s",
                    job.audio.display(),
                    self.max_wait.as_secs()
                );
                return Ok(JobState::TimedOut);
            }

            let nap = self.interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(progress: usize, ready: usize, errors: usize) -> PageObservation {
        PageObservation {
            progress,
            download_ready: ready,
            errors,
            error_text: (errors > 0).then(|| "Audio too long".to_string()),
            staged: 0,
        }
    }

    fn saved(progress: usize, ready: usize, errors: usize) -> PageObservation {
        PageObservation {
            staged: 1,
            ..obs(progress, ready, errors)
        }
    }

    #[test]
    fn test_saved_download_counts_as_ready() {
        assert_eq!(classify(&saved(1, 0, 0)), Signal::DownloadReady);
        assert_eq!(classify(&saved(0, 0, 0)), Signal::DownloadReady);
        assert_eq!(classify(&saved(0, 2, 0)), Signal::DownloadReady);
        assert_eq!(classify(&saved(0, 0, 1)), Signal::Ambiguous);
        assert_eq!(
            next_state(JobState::Submitted, &classify(&saved(0, 0, 0))),
            Some(JobState::Rendering)
        );
    }

    #[test]
    fn test_classify_single_indicators() {
        assert_eq!(classify(&obs(0, 0, 0)), Signal::Nothing);
        assert_eq!(classify(&obs(1, 0, 0)), Signal::Progress);
        assert_eq!(classify(&obs(1, 1, 0)), Signal::DownloadReady);
        assert_eq!(
            classify(&obs(0, 0, 1)),
            Signal::Error("Audio too long".to_string())
        );
    }

    #[test]
    fn test_classify_conflicts_are_ambiguous() {
        assert_eq!(classify(&obs(0, 1, 1)), Signal::Ambiguous);
        assert_eq!(classify(&obs(0, 2, 0)), Signal::Ambiguous);
    }

    #[test]
    fn test_blank_error_text_gets_fallback() {
        let observation = PageObservation {
            errors: 1,
            error_text: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            classify(&observation),
            Signal::Error("remote service reported an error".to_string())
        );
    }

    #[test]
    fn test_submitted_never_jumps_to_terminal() {
        for signal in [
            Signal::Progress,
            Signal::DownloadReady,
            Signal::Error("x".to_string()),
            Signal::Ambiguous,
        ] {
            assert_eq!(
                next_state(JobState::Submitted, &signal),
                Some(JobState::Rendering)
            );
        }
        assert_eq!(next_state(JobState::Submitted, &Signal::Nothing), None);
    }

    #[test]
    fn test_rendering_transitions() {
        assert_eq!(
            next_state(JobState::Rendering, &Signal::DownloadReady),
            Some(JobState::Completed)
        );
        assert_eq!(
            next_state(JobState::Rendering, &Signal::Error("x".to_string())),
            Some(JobState::Failed)
        );
        assert_eq!(next_state(JobState::Rendering, &Signal::Ambiguous), None);
        assert_eq!(next_state(JobState::Rendering, &Signal::Progress), None);
        assert_eq!(next_state(JobState::Rendering, &Signal::Nothing), None);
    }

    #[test]
    fn test_terminal_states_stay_put() {
        assert_eq!(next_state(JobState::Completed, &Signal::Error("x".into())), None);
        assert_eq!(next_state(JobState::TimedOut, &Signal::DownloadReady), None);
    }
}
