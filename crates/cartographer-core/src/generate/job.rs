//! Generation job model and its state transitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Values applied to every job of a run. Never mutated by the automator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationParameters {
    /// Artist label typed into the remote form
    pub artist_name: String,
    /// Visible text of the difficulty toggle to enable
    pub difficulty_label: String,
    /// Model option value, e.g. `v2-flow`
    pub model: String,
    /// Run the browser without a window
    pub headless: bool,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            artist_name: String::new(),
            difficulty_label: "Expert".to_string(),
            model: "v2-flow".to_string(),
            headless: true,
        }
    }
}

/// Lifecycle state of a [`GenerationJob`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Generation was triggered, nothing observed yet
    Submitted,
    /// The remote page acknowledged the job or shows progress
    Rendering,
    /// A download control for the result is available
    Completed,
    /// The remote page reported an error
    Failed,
    /// No terminal state was observed before the deadline
    TimedOut,
    /// The archive was persisted and handed off
    Discarded,
}

impl JobState {
    /// `Completed`, `Failed` and `TimedOut` end polling
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Submitted, Rendering) => true,
            (Rendering, Completed) | (Rendering, Failed) => true,
            (Submitted, TimedOut) | (Rendering, TimedOut) => true,
            (Completed, Discarded) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "Submitted"),
            Self::Rendering => write!(f, "Rendering"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::TimedOut => write!(f, "TimedOut"),
            Self::Discarded => write!(f, "Discarded"),
        }
    }
}

/// One request to the remote service for one audio file
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub audio: PathBuf,
    pub params: GenerationParameters,
    pub submitted_at: DateTime<Utc>,
    state: JobState,
    archive: Option<PathBuf>,
    failure: Option<String>,
}

impl GenerationJob {
    /// Create a job for a freshly triggered generation
    pub fn submitted(audio: &Path, params: &GenerationParameters) -> Self {
        Self {
            audio: audio.to_path_buf(),
            params: params.clone(),
            submitted_at: Utc::now(),
            state: JobState::Submitted,
            archive: None,
            failure: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Local archive path, set once the download was confirmed
    pub fn archive(&self) -> Option<&Path> {
        self.archive.as_deref()
    }

    /// Failure reason reported by the remote page
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidJobState {
                path: self.audio.clone(),
                state: self.state.to_string(),
                expected: format!("a state that can become {}", next),
            });
        }
        tracing::debug!("{}: {} -> {}", self.audio.display(), self.state, next);
        self.state = next;
        Ok(())
    }

    /// Transition to `Failed`, keeping the reason shown by the page
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(JobState::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }

    /// Record the persisted archive and mark the job as handed off
    pub fn hand_off(&mut self, archive: PathBuf) -> Result<()> {
        self.transition(JobState::Discarded)?;
        self.archive = Some(archive);
        Ok(())
    }

    /// Fail with `InvalidJobState` unless the job is in `expected`
    pub fn ensure_state(&self, expected: JobState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidJobState {
                path: self.audio.clone(),
                state: self.state.to_string(),
                expected: expected.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> GenerationJob {
        GenerationJob::submitted(Path::new("song.m4a"), &GenerationParameters::default())
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = job();
        assert_eq!(job.state(), JobState::Submitted);
        job.transition(JobState::Rendering).unwrap();
        job.transition(JobState::Completed).unwrap();
        job.hand_off(PathBuf::from("maps/song.zip")).unwrap();
        assert_eq!(job.state(), JobState::Discarded);
        assert_eq!(job.archive(), Some(Path::new("maps/song.zip")));
    }

    #[test]
    fn test_submitted_cannot_complete_directly() {
        let mut job = job();
        assert!(job.transition(JobState::Completed).is_err());
        assert_eq!(job.state(), JobState::Submitted);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = job();
        job.transition(JobState::TimedOut).unwrap();
        assert!(job.state().is_terminal());
        assert!(job.transition(JobState::Rendering).is_err());
        assert!(job.hand_off(PathBuf::from("x.zip")).is_err());
        assert!(job.archive().is_none());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut job = job();
        job.transition(JobState::Rendering).unwrap();
        job.fail("Audio too long").unwrap();
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.failure(), Some("Audio too long"));
    }

    #[test]
    fn test_ensure_state() {
        let job = job();
        assert!(job.ensure_state(JobState::Submitted).is_ok());
        assert!(matches!(
            job.ensure_state(JobState::Completed),
            Err(Error::InvalidJobState { .. })
        ));
    }
}
