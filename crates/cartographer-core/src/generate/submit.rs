//! Upload and form filling on the remote generation page

use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::generate::driver::{wait_for_any, wait_for_element, PageDriver};
use crate::generate::job::{GenerationJob, GenerationParameters};
use crate::generate::selectors::PageSelectors;
use crate::generate::session::Session;

/// Where the slider drag starts and ends, as a fraction of its width
const SLIDE_FROM: f64 = 0.2;
const SLIDE_TO: f64 = 0.8;

/// Drives the upload → configure → trigger sequence for one audio file
pub struct SubmissionController<'a> {
    service_url: &'a str,
    selectors: &'a PageSelectors,
    element_timeout: Duration,
}

impl<'a> SubmissionController<'a> {
    pub fn new(service_url: &'a str, selectors: &'a PageSelectors, element_timeout: Duration) -> Self {
        Self {
            service_url,
            selectors,
            element_timeout,
        }
    }

    /// Upload `audio`, apply `params` and trigger generation.
    ///
    /// Returns the job in the `Submitted` state. A control that never shows
    /// up is reported as [`Error::ElementNotFound`]; a file the service
    /// refuses as [`Error::UploadRejected`].
    pub async fn submit<D: PageDriver>(
        &self,
        session: &mut Session<D>,
        audio: &Path,
        params: &GenerationParameters,
        cancel: &CancellationToken,
    ) -> Result<GenerationJob> {
        check_readable(audio)?;

        let selectors = self.selectors;
        let timeout = self.element_timeout;
        let driver = session.driver();

        driver.navigate(self.service_url).await?;

        wait_for_element(driver, &selectors.file_input, timeout, cancel).await?;
        driver.upload(&selectors.file_input, audio).await?;
        tracing::debug!("Uploaded {}", audio.display());

        // The form only appears once the file was accepted
        let outcome = wait_for_any(
            driver,
            &[
                selectors.artist_input.as_str(),
                selectors.upload_error.as_str(),
            ],
            timeout,
            cancel,
        )
        .await?;
        match outcome {
            Some(0) => {}
            Some(_) => {
                let reason = driver.texts(&selectors.upload_error).await?.join(" ");
                return Err(Error::UploadRejected {
                    path: audio.to_path_buf(),
                    reason: non_empty(reason, "upload refused by the service"),
                });
            }
            None => {
                return Err(Error::ElementNotFound {
                    selector: selectors.artist_input.clone(),
                })
            }
        }

        driver.fill(&selectors.artist_input, &params.artist_name).await?;

        wait_for_element(driver, &selectors.difficulty_label, timeout, cancel).await?;
        driver
            .click(&selectors.difficulty_label, Some(&params.difficulty_label))
            .await?;

        wait_for_element(driver, &selectors.advanced_toggle, timeout, cancel).await?;
        driver.click(&selectors.advanced_toggle, None).await?;

        let model_select = selectors.model_select(&params.model);
        wait_for_element(driver, &model_select, timeout, cancel).await?;
        driver.select(&model_select, &params.model).await?;

        wait_for_element(driver, &selectors.generate_slider, timeout, cancel).await?;
        driver
            .drag(&selectors.generate_slider, SLIDE_FROM, SLIDE_TO)
            .await?;

        tracing::info!(
            "Submitted {} ({}, {})",
            audio.display(),
            params.difficulty_label,
            params.model
        );
        Ok(GenerationJob::submitted(audio, params))
    }
}

fn check_readable(audio: &Path) -> Result<()> {
    match std::fs::File::open(audio) {
        Ok(_) if audio.is_file() => Ok(()),
        Ok(_) => Err(Error::UploadRejected {
            path: audio.to_path_buf(),
            reason: "not a regular file".to_string(),
        }),
        Err(e) => Err(Error::UploadRejected {
            path: audio.to_path_buf(),
            reason: format!("cannot read audio file: {}", e),
        }),
    }
}

fn non_empty(text: String, fallback: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
