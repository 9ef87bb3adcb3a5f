//! Map generation through the Beat Sage web application
//!
//! There is no API, so generation is automated through a browser:
//!
//! 1. [`session`] owns the browser for the whole run and closes it on every
//!    exit path
//! 2. [`submit`] uploads an audio file, fills the form and triggers
//!    generation
//! 3. [`poll`] watches the page until the job completes, fails or times out
//! 4. [`download`] saves the archive once it has finished writing
//! 5. [`automator`] runs the above for each track, isolating failures
//!
//! All page selectors live in [`selectors`].

pub mod automator;
#[cfg(feature = "chromium")]
pub mod chromium;
pub mod download;
pub mod driver;
pub mod job;
pub mod poll;
pub mod selectors;
pub mod session;
pub mod submit;

pub use automator::{
    existing_archive, AutomatorConfig, FailureRecord, GeneratedArchive, GenerationPhase,
    GenerationProgress, GenerationProgressCallback, MapAutomator, RunReport,
};
#[cfg(feature = "chromium")]
pub use chromium::{ChromiumLauncher, ChromiumPage};
pub use download::{clear_staging, wait_for_stable_file, ArchiveRetriever, StabilizeSettings};
pub use driver::{wait_for_element, LaunchOptions, Launcher, PageDriver};
pub use job::{GenerationJob, GenerationParameters, JobState};
pub use poll::{classify, next_state, JobPoller, PageObservation, Signal};
pub use selectors::PageSelectors;
pub use session::Session;
pub use submit::SubmissionController;
