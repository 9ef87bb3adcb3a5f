//! Integration tests for the `cartographer` binary
//!
//! These tests run the built binary against a throwaway project directory.
//! Only stages that need neither network nor a browser are exercised end to
//! end: cleanup, generation over an empty songs folder, and argument and
//! configuration errors.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde_json::Value;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// A project directory with a `vars.json`
struct Project {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl Project {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();

        let vars = serde_json::json!({
            "base_dir": ".",
            "paths": { "songs": "songs", "maps": "maps" },
            "download": { "audio_format": "140", "progress_bar": false },
            "beatsage": {
                "url": "https://beatsage.com/",
                "headless": true,
                "artist_name": "Cartographer",
                "difficulty_label": "Expert",
                "model_value": "v2-flow"
            },
            "postprocess": { "author_name": "Test Mapper" }
        });
        fs::write(
            root.join("vars.json"),
            serde_json::to_string_pretty(&vars).unwrap(),
        )
        .expect("Failed to write vars.json");
        fs::create_dir_all(root.join("songs")).expect("Failed to create songs dir");
        fs::create_dir_all(root.join("maps")).expect("Failed to create maps dir");

        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    fn config(&self) -> PathBuf {
        self.root.join("vars.json")
    }

    fn maps(&self) -> PathBuf {
        self.root.join("maps")
    }

    /// Write a generated-looking archive into the maps directory
    fn add_archive(&self, name: &str) {
        let file = File::create(self.maps().join(name)).unwrap();
        let mut zip = ZipWriter::new(file);
        let files: [(&str, &str); 2] = [
            (
                "Info.dat",
                r#"{"_songName":"Levitating","_levelAuthorName":"Beat Sage","_creator":"beatsage","_customData":{"_generator":"v2-flow"}}"#,
            ),
            (
                "ExpertStandard.dat",
                r#"{"_notes":[{"_time":1.0,"_customData":{"_color":[1,0,0]}}]}"#,
            ),
        ];
        for (entry, content) in files {
            zip.start_file(entry, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn run(&self, args: &[&str], stdin: &str) -> Output {
        let mut child = Command::new(env!("CARGO_BIN_EXE_cartographer"))
            .args(args)
            .current_dir(&self.root)
            .env_remove("CARTOGRAPHER_CONFIG")
            .env("RUST_LOG", "warn")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to start cartographer");

        child
            .stdin
            .take()
            .unwrap()
            .write_all(stdin.as_bytes())
            .unwrap();
        child.wait_with_output().expect("Failed to wait for cartographer")
    }
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_clean_extracts_and_normalizes_archives() {
    let project = Project::new();
    project.add_archive("Beat Sage_Levitating - Dua Lipa.m4a (v2-flow HEE+,S9,DO).zip");
    let config = project.config();

    let output = project.run(&["clean", "--json", "--config", config.to_str().unwrap()], "");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let result = stdout_json(&output);
    assert!(result["download"].is_null());
    assert!(result["generate"].is_null());
    assert_eq!(result["clean"]["extracted"], 1);
    assert_eq!(result["clean"]["info_updated"], 1);
    assert_eq!(result["clean"]["difficulties_cleaned"], 1);

    let folder = project.maps().join("Levitating - Dua Lipa");
    let info = read_json(&folder.join("Info.dat"));
    assert_eq!(info["_levelAuthorName"], "Test Mapper");
    assert!(info.get("_creator").is_none());
    assert!(info.get("_customData").is_none());

    let expert = read_json(&folder.join("ExpertStandard.dat"));
    assert!(expert["_notes"][0].get("_customData").is_none());
}

#[test]
fn test_generate_with_no_audio_succeeds_without_browser() {
    let project = Project::new();
    let config = project.config();

    let output = project.run(&["generate", "--json", "--config", config.to_str().unwrap()], "");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let result = stdout_json(&output);
    assert_eq!(result["generate"]["succeeded"], serde_json::json!([]));
    assert_eq!(result["generate"]["failed"], serde_json::json!([]));
}

#[test]
fn test_run_prompts_and_honours_no() {
    let project = Project::new();
    project.add_archive("Beat Sage_Song - Artist (v2).zip");
    let config = project.config();

    let output = project.run(
        &[
            "run",
            "--json",
            "--skip-download",
            "--skip-generate",
            "--config",
            config.to_str().unwrap(),
        ],
        "n\n",
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Run step 'Clean/Finalize Maps'? [Y/n]"));
    assert!(stderr.contains("[SKIP] Clean/Finalize Maps"));
    assert!(stdout_json(&output)["clean"].is_null());
    assert!(!project.maps().join("Song - Artist").exists());
}

#[test]
fn test_run_with_yes_does_not_prompt() {
    let project = Project::new();
    project.add_archive("Beat Sage_Song - Artist (v2).zip");
    let config = project.config();

    let output = project.run(
        &[
            "run",
            "--yes",
            "--skip-download",
            "--skip-generate",
            "--config",
            config.to_str().unwrap(),
        ],
        "",
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("[Y/n]"));
    assert!(project.maps().join("Song - Artist").join("Info.dat").is_file());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Cleanup Complete:"));
}

#[test]
fn test_download_without_playlist_fails() {
    let project = Project::new();
    let config = project.config();

    let output = project.run(&["download", "--config", config.to_str().unwrap()], "");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No playlist URL provided"));
}

#[test]
fn test_missing_config_fails() {
    let project = Project::new();
    let missing = project.root.join("nope.json");

    let output = project.run(&["clean", "--config", missing.to_str().unwrap()], "");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load configuration"));
}
