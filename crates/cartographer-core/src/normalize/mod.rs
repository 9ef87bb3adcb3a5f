//! Archive unpacking and map cleanup
//!
//! Turns downloaded archives into folders ChroMapper opens without
//! complaint: clean folder names, the configured mapper name, and no
//! generator custom data.

mod metadata;
mod names;
mod unpack;

pub use metadata::*;
pub use names::clean_name;
pub use unpack::*;

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// A file the cleanup could not handle
#[derive(Debug, Clone, Serialize)]
pub struct NormalizeError {
    pub path: PathBuf,
    pub message: String,
}

/// Counts from one cleanup pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizeReport {
    pub extracted: usize,
    /// Archives whose folder already existed
    pub skipped: usize,
    pub info_updated: usize,
    pub difficulties_cleaned: usize,
    pub errors: Vec<NormalizeError>,
}

impl NormalizeReport {
    pub fn record_error(&mut self, path: &Path, error: Error) {
        self.errors.push(NormalizeError {
            path: path.to_path_buf(),
            message: error.to_string(),
        });
    }

    /// Check if the pass completed without errors
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs all cleanup steps over a maps directory
#[derive(Debug, Clone)]
pub struct Normalizer {
    maps_dir: PathBuf,
    author_name: String,
}

impl Normalizer {
    pub fn new(maps_dir: impl Into<PathBuf>, author_name: impl Into<String>) -> Self {
        Self {
            maps_dir: maps_dir.into(),
            author_name: author_name.into(),
        }
    }

    /// Unzip, rewrite `Info.dat`, then clean difficulty files
    pub fn run(&self) -> Result<NormalizeReport> {
        let mut report = NormalizeReport::default();

        tracing::info!("Unzipping maps in {}", self.maps_dir.display());
        unzip_all(&self.maps_dir, &mut report)?;

        tracing::info!("Updating Info.dat author and removing custom data");
        update_info_dat(&self.maps_dir, &self.author_name, &mut report)?;

        tracing::info!("Cleaning difficulty files");
        clean_difficulty_files(&self.maps_dir, &mut report)?;

        Ok(report)
    }
}
