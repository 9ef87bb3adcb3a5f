//! Browser session lifecycle

use crate::error::Result;
use crate::generate::driver::{LaunchOptions, Launcher, PageDriver};

/// Exclusive ownership of one automation context.
///
/// Created by [`Session::acquire`] and closed by [`Session::release`], which
/// may be called any number of times. The run loop releases on every exit
/// path; dropping an unreleased session only logs a warning and leaves the
/// cleanup to the driver's own `Drop`.
pub struct Session<D: PageDriver> {
    driver: D,
    released: bool,
}

impl<D: PageDriver> Session<D> {
    /// Launch the automation context.
    ///
    /// Creates the download directory first so the browser can write to it.
    pub async fn acquire<L>(launcher: &L, options: &LaunchOptions) -> Result<Self>
    where
        L: Launcher<Driver = D>,
    {
        tokio::fs::create_dir_all(&options.download_dir).await?;

        tracing::info!(
            "Starting browser ({})",
            if options.headless { "headless" } else { "visible" }
        );
        let driver = launcher.launch(options).await?;

        Ok(Self {
            driver,
            released: false,
        })
    }

    /// The page driver, for the submission and polling components
    pub fn driver(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Close the automation context. Later calls are no-ops.
    pub async fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        tracing::info!("Closing browser");
        self.driver.close().await
    }
}

impl<D: PageDriver> Drop for Session<D> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("Browser session dropped without being released");
        }
    }
}
