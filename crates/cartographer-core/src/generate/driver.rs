//! Page automation capabilities
//!
//! The remote service has no API, so the automator only ever talks to a web
//! page through three kinds of capability: locating elements, reading
//! indicators, and triggering actions. [`PageDriver`] is that capability set;
//! [`Launcher`] starts one. The production implementation lives in
//! [`crate::generate::chromium`].

#![allow(async_fn_in_trait)]

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Spacing between element lookups while waiting for a control to appear
pub const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How to start the automation context
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run without a visible window
    pub headless: bool,
    /// Where the browser saves downloads
    pub download_dir: PathBuf,
}

/// Starts a browser and hands back a driver for one page
pub trait Launcher {
    type Driver: PageDriver;

    /// Fails with [`Error::SessionStart`] when the runtime cannot be started
    async fn launch(&self, options: &LaunchOptions) -> Result<Self::Driver>;
}

/// One page of an automation context.
///
/// Actions on a selector that matches nothing return
/// [`Error::ElementNotFound`].
pub trait PageDriver {
    /// Load `url` and wait for the navigation to settle
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Number of elements matching `selector` right now
    async fn count(&mut self, selector: &str) -> Result<usize>;

    /// Visible text of every element matching `selector`
    async fn texts(&mut self, selector: &str) -> Result<Vec<String>>;

    /// Put `file` into the first matching file input
    async fn upload(&mut self, selector: &str, file: &Path) -> Result<()>;

    /// Replace the value of the first matching text input
    async fn fill(&mut self, selector: &str, value: &str) -> Result<()>;

    /// Click the first match, or the first whose text contains `text`
    async fn click(&mut self, selector: &str, text: Option<&str>) -> Result<()>;

    /// Choose the option with value `value` in the first matching `<select>`
    async fn select(&mut self, selector: &str, value: &str) -> Result<()>;

    /// Press on the first match at fraction `from` of its width and
    /// release at fraction `to`, moving horizontally
    async fn drag(&mut self, selector: &str, from: f64, to: f64) -> Result<()>;

    /// Shut the automation context down
    async fn close(&mut self) -> Result<()>;
}

/// Wait until `selector` matches at least one element.
///
/// Gives up with [`Error::ElementNotFound`] after `timeout`.
pub async fn wait_for_element<D: PageDriver>(
    driver: &mut D,
    selector: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    match wait_for_any(driver, &[selector], timeout, cancel).await? {
        Some(_) => Ok(()),
        None => Err(Error::ElementNotFound {
            selector: selector.to_string(),
        }),
    }
}

/// Wait until one of `selectors` matches, returning its index, or `None`
/// once `timeout` has passed.
pub async fn wait_for_any<D: PageDriver>(
    driver: &mut D,
    selectors: &[&str],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Option<usize>> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        for (index, selector) in selectors.iter().enumerate() {
            if driver.count(selector).await? > 0 {
                return Ok(Some(index));
            }
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(None);
        }

        let nap = ELEMENT_POLL_INTERVAL.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(nap) => {}
        }
    }
}
