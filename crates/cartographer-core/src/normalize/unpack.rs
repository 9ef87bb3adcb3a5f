//! Archive extraction into per-song folders

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::normalize::names::clean_name;
use crate::normalize::NormalizeReport;

/// Zip archives directly inside `maps_dir`, sorted by name
pub fn zip_archives(maps_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut zips: Vec<PathBuf> = fs::read_dir(maps_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .map(|e| e.eq_ignore_ascii_case("zip"))
                .unwrap_or(false)
        })
        .collect();
    zips.sort();
    Ok(zips)
}

/// Extract a zip archive into `dest`, creating it
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    fs::create_dir_all(dest)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| Error::Other(format!("Unsafe path in archive: {}", entry.name())))?
            .to_path_buf();
        let out_path = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&out_path)?;
        io::copy(&mut entry, &mut output)?;
    }

    Ok(archive.len())
}

/// Target folder for an archive: its cleaned name inside `maps_dir`
pub fn target_folder(maps_dir: &Path, archive_path: &Path) -> PathBuf {
    let stem = archive_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let cleaned = clean_name(&stem);
    let name = if cleaned.is_empty() { stem } else { cleaned };
    maps_dir.join(name)
}

/// Extract every archive in `maps_dir` into a folder named after it.
///
/// Folders that already exist are left alone. A failed extraction removes
/// whatever it had written so far.
pub fn unzip_all(maps_dir: &Path, report: &mut NormalizeReport) -> Result<()> {
    if !maps_dir.is_dir() {
        return Err(Error::Other(format!(
            "Maps directory does not exist: {}",
            maps_dir.display()
        )));
    }

    let zips = zip_archives(maps_dir)?;
    if zips.is_empty() {
        tracing::info!("No ZIP files found in {}", maps_dir.display());
        return Ok(());
    }

    for zip_path in zips {
        let extract_path = target_folder(maps_dir, &zip_path);
        let zip_name = zip_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if extract_path.exists() {
            tracing::info!(
                "Folder already exists for {}: {}",
                zip_name,
                extract_path.display()
            );
            report.skipped += 1;
            continue;
        }

        tracing::info!("Unzipping {} -> {}/", zip_name, extract_path.display());
        match extract_archive(&zip_path, &extract_path) {
            Ok(_) => report.extracted += 1,
            Err(e) => {
                tracing::error!("Failed to extract {}: {}", zip_name, e);
                if let Err(cleanup) = fs::remove_dir_all(&extract_path) {
                    tracing::warn!(
                        "Could not remove partial folder {}: {}",
                        extract_path.display(),
                        cleanup
                    );
                }
                report.record_error(&zip_path, e);
            }
        }
    }

    Ok(())
}
