//! CSS selectors for the remote generation page
//!
//! Every lookup the automator performs against the remote page goes through
//! this table. When the site changes its markup, this is the only place
//! that needs editing (or the `beatsage.selectors` block of `vars.json`).

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the model identifier in [`PageSelectors::model_select`]
pub const MODEL_PLACEHOLDER: &str = "{model}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSelectors {
    /// Audio file upload control
    pub file_input: String,
    /// Notification shown when the uploaded file is refused
    pub upload_error: String,
    /// Artist text field, visible once a file has been accepted
    pub artist_input: String,
    /// Difficulty toggles; the one whose text matches the label is clicked
    pub difficulty_label: String,
    /// Chevron that expands the advanced options panel
    pub advanced_toggle: String,
    /// Model dropdown; `{model}` is substituted with the model identifier
    pub model_select: String,
    /// Slide-to-generate handle
    pub generate_slider: String,
    /// Any sign that the job was accepted and is being processed
    pub progress: String,
    /// Control that downloads the finished archive
    pub download_ready: String,
    /// Explicit failure notification for the running job
    pub job_error: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            file_input: "input[type='file']".to_string(),
            upload_error: ".notification.is-danger".to_string(),
            artist_input: "input[placeholder='Song Artist']".to_string(),
            difficulty_label: "span.control-label".to_string(),
            advanced_toggle: "svg:has(path[d='M3 6L9 12L15 6'])".to_string(),
            model_select: "select:has(option[value='{model}'])".to_string(),
            generate_slider: "div.level-right svg#red".to_string(),
            progress: "progress.progress, .button.is-loading, .generating".to_string(),
            download_ready: "a[download], a[href$='.zip']".to_string(),
            job_error: ".notification.is-danger, .message.is-danger".to_string(),
        }
    }
}

impl PageSelectors {
    /// Selector for the model dropdown offering `model`
    pub fn model_select(&self, model: &str) -> String {
        self.model_select.replace(MODEL_PLACEHOLDER, model)
    }
}
