//! Audio source: playlist download and audio file discovery

mod ytdlp;

pub use ytdlp::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Extensions accepted as audio input for map generation
pub const AUDIO_EXTENSIONS: &[&str] = &["m4a", "mp3", "wav", "ogg", "flac", "aac", "aiff"];

/// One downloaded audio file with the display metadata taken from its name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
}

impl AudioTrack {
    /// Build a track from a `"<title> - <uploader>.<ext>"` file name.
    ///
    /// Names without a separator keep the whole stem as the title.
    pub fn from_path(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let (title, artist) = match stem.rsplit_once(" - ") {
            Some((title, artist)) if !title.trim().is_empty() => {
                (title.trim().to_string(), artist.trim().to_string())
            }
            _ => (stem.trim().to_string(), String::new()),
        };

        Self {
            path: path.to_path_buf(),
            title,
            artist,
        }
    }

    /// File stem, used to recognise archives generated for this track
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// `"Title - Artist"`, or just the title
    pub fn display_name(&self) -> String {
        if self.artist.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.artist)
        }
    }
}

/// Whether `path` has one of the [`AUDIO_EXTENSIONS`]
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| AUDIO_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

/// Audio files directly inside `songs_dir`, sorted by file name
pub fn audio_tracks(songs_dir: &Path) -> Result<Vec<AudioTrack>> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(songs_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_audio_file(p))
        .collect();
    paths.sort();

    Ok(paths.iter().map(|p| AudioTrack::from_path(p)).collect())
}
