//! Info.dat and difficulty file rewriting

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::normalize::NormalizeReport;

/// Object arrays in difficulty files that may carry per-object custom data
pub const DIFFICULTY_OBJECT_KEYS: &[&str] = &[
    "_notes",
    "_sliders",
    "_obstacles",
    "_events",
    "_chains",
    "_waypoints",
];

const CUSTOM_DATA: &str = "_customData";

/// Map folders inside `maps_dir`, skipping hidden ones such as `.staging`
pub fn map_folders(maps_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut folders: Vec<PathBuf> = walkdir::WalkDir::new(maps_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.into_path())
        .collect();
    folders.sort();
    Ok(folders)
}

/// `Info.dat` in `folder`, matched case-insensitively
pub fn find_info_dat(folder: &Path) -> Option<PathBuf> {
    let direct = folder.join("Info.dat");
    if direct.is_file() {
        return Some(direct);
    }

    fs::read_dir(folder)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.is_file()
                && p.file_name()
                    .map(|n| n.to_string_lossy().eq_ignore_ascii_case("info.dat"))
                    .unwrap_or(false)
        })
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)?;
    Ok(())
}

fn root_object<'a>(value: &'a mut Value, path: &Path) -> Result<&'a mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| Error::Other(format!("{} is not a JSON object", path.display())))
}

/// Set the mapper name and strip generator metadata from an `Info.dat` value
pub fn clean_info(info: &mut Map<String, Value>, author_name: &str) {
    info.insert(
        "_levelAuthorName".to_string(),
        Value::String(author_name.to_string()),
    );
    info.shift_remove("_creator");
    info.shift_remove(CUSTOM_DATA);
}

/// Remove custom data from a difficulty value. Returns whether it changed.
pub fn clean_difficulty(difficulty: &mut Map<String, Value>) -> bool {
    let mut modified = difficulty.shift_remove(CUSTOM_DATA).is_some();

    for key in DIFFICULTY_OBJECT_KEYS {
        let Some(Value::Array(objects)) = difficulty.get_mut(*key) else {
            continue;
        };
        for object in objects.iter_mut() {
            if let Value::Object(object) = object {
                if object.shift_remove(CUSTOM_DATA).is_some() {
                    modified = true;
                }
            }
        }
    }

    modified
}

/// Rewrite `Info.dat` in every map folder
pub fn update_info_dat(maps_dir: &Path, author_name: &str, report: &mut NormalizeReport) -> Result<()> {
    for folder in map_folders(maps_dir)? {
        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let Some(info_path) = find_info_dat(&folder) else {
            tracing::warn!("No Info.dat found in {}", folder_name);
            continue;
        };

        let result = read_json(&info_path).and_then(|mut value| {
            clean_info(root_object(&mut value, &info_path)?, author_name);
            write_json(&info_path, &value)
        });

        match result {
            Ok(()) => {
                tracing::info!("Cleaned Info.dat in {}", folder_name);
                report.info_updated += 1;
            }
            Err(e) => {
                tracing::error!("Failed to update Info.dat in {}: {}", folder_name, e);
                report.record_error(&info_path, e);
            }
        }
    }
    Ok(())
}

/// Strip custom data from every difficulty `.dat` file
pub fn clean_difficulty_files(maps_dir: &Path, report: &mut NormalizeReport) -> Result<()> {
    for folder in map_folders(maps_dir)? {
        let mut dat_files: Vec<PathBuf> = fs::read_dir(&folder)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .map(|e| e.eq_ignore_ascii_case("dat"))
                    .unwrap_or(false)
            })
            .filter(|p| {
                !p.file_name()
                    .map(|n| n.to_string_lossy().eq_ignore_ascii_case("info.dat"))
                    .unwrap_or(false)
            })
            .collect();
        dat_files.sort();

        for dat_path in dat_files {
            let result = read_json(&dat_path).and_then(|mut value| {
                let modified = clean_difficulty(root_object(&mut value, &dat_path)?);
                if modified {
                    write_json(&dat_path, &value)?;
                }
                Ok(modified)
            });

            match result {
                Ok(true) => {
                    tracing::info!("Removed custom data from {}", dat_path.display());
                    report.difficulties_cleaned += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("Failed to clean {}: {}", dat_path.display(), e);
                    report.record_error(&dat_path, e);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_clean_info_preserves_key_order() {
        let mut value = json!({
            "_version": "2.0.0",
            "_songName": "Levitating",
            "_levelAuthorName": "Beat Sage",
            "_creator": "beatsage",
            "_customData": { "_generator": "v2-flow" },
            "_beatsPerMinute": 103
        });
        clean_info(value.as_object_mut().unwrap(), "Mapper");

        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["_version", "_songName", "_levelAuthorName", "_beatsPerMinute"]
        );
        assert_eq!(value["_levelAuthorName"], "Mapper");
    }

    #[test]
    fn test_clean_difficulty_strips_nested_custom_data() {
        let mut value = json!({
            "_version": "2.0.0",
            "_customData": { "_time": 1 },
            "_notes": [
                { "_time": 1.0, "_customData": { "_color": [1, 0, 0] } },
                { "_time": 2.0 }
            ],
            "_obstacles": "not an array"
        });
        assert!(clean_difficulty(value.as_object_mut().unwrap()));
        assert_eq!(
            value,
            json!({
                "_version": "2.0.0",
                "_notes": [ { "_time": 1.0 }, { "_time": 2.0 } ],
                "_obstacles": "not an array"
            })
        );
    }

    #[test]
    fn test_clean_difficulty_reports_unmodified() {
        let mut value = json!({ "_notes": [ { "_time": 1.0 } ] });
        assert!(!clean_difficulty(value.as_object_mut().unwrap()));
    }

    #[test]
    fn test_update_folders_on_disk() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("Song - Artist");
        fs::create_dir_all(&folder).unwrap();
        fs::create_dir_all(dir.path().join(".staging")).unwrap();
        fs::write(
            folder.join("info.dat"),
            r#"{"_songName":"Song","_creator":"x"}"#,
        )
        .unwrap();
        fs::write(
            folder.join("ExpertStandard.dat"),
            r#"{"_notes":[{"_time":1,"_customData":{}}]}"#,
        )
        .unwrap();
        fs::write(folder.join("NormalStandard.dat"), r#"{"_notes":[]}"#).unwrap();

        let mut report = NormalizeReport::default();
        update_info_dat(dir.path(), "Mapper", &mut report).unwrap();
        clean_difficulty_files(dir.path(), &mut report).unwrap();

        assert_eq!(report.info_updated, 1);
        assert_eq!(report.difficulties_cleaned, 1);
        assert!(report.errors.is_empty());

        let info = fs::read_to_string(folder.join("info.dat")).unwrap();
        assert_eq!(
            info,
            "{\n  \"_songName\": \"Song\",\n  \"_levelAuthorName\": \"Mapper\"\n}"
        );
        let untouched = fs::read_to_string(folder.join("NormalStandard.dat")).unwrap();
        assert_eq!(untouched, r#"{"_notes":[]}"#);
    }

    #[test]
    fn test_invalid_json_is_recorded() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("Broken");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("Info.dat"), "{ not json").unwrap();

        let mut report = NormalizeReport::default();
        update_info_dat(dir.path(), "Mapper", &mut report).unwrap();

        assert_eq!(report.info_updated, 0);
        assert_eq!(report.errors.len(), 1);
    }
}
