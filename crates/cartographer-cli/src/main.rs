//! cartographer - YouTube playlist to ChroMapper-ready Beat Saber maps
//!
//! Usage:
//!   cartographer run        Download, generate and clean in one go
//!   cartographer download   Fetch playlist audio with yt-dlp
//!   cartographer generate   Generate maps with Beat Sage
//!   cartographer clean      Unzip and normalize generated maps
//!   cartographer --help     Show help

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartographer_core::Config;

mod pipeline;

use pipeline::{Options, Stage};

/// Command-line arguments for cartographer
#[derive(Parser, Debug)]
#[command(name = "cartographer")]
#[command(about = "Turn a YouTube playlist into Beat Saber maps ready for ChroMapper")]
#[command(version)]
struct Cli {
    /// Path to vars.json
    #[arg(short, long, global = true, env = "CARTOGRAPHER_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every stage in order
    Run(RunArgs),
    /// Download playlist audio into the songs directory
    Download(PlaylistArgs),
    /// Generate a map for every audio file in the songs directory
    Generate,
    /// Unzip generated archives and clean their metadata
    Clean,
}

#[derive(Args, Debug, Default)]
struct PlaylistArgs {
    /// Playlist URL, overriding download.playlist_url
    #[arg(short, long)]
    playlist: Option<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    playlist: PlaylistArgs,

    #[arg(long)]
    skip_download: bool,

    #[arg(long)]
    skip_generate: bool,

    #[arg(long)]
    skip_clean: bool,

    /// Run all stages without prompting
    #[arg(short, long)]
    yes: bool,
}

impl RunArgs {
    fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::new();
        if !self.skip_download {
            stages.push(Stage::Download);
        }
        if !self.skip_generate {
            stages.push(Stage::Generate);
        }
        if !self.skip_clean {
            stages.push(Stage::Clean);
        }
        stages
    }
}

fn init_logging() {
    // stdout is reserved for results, logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cartographer=info,cartographer_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Forward Ctrl-C presses to [`handle_interrupts`]
fn install_ctrl_c(cancel: CancellationToken) {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    tokio::spawn(handle_interrupts(rx, cancel));
}

/// Cancel the run on the first interrupt. Later ones only log, the browser
/// still has to be closed. Returns the number of interrupts seen.
async fn handle_interrupts(
    mut interrupts: mpsc::Receiver<()>,
    cancel: CancellationToken,
) -> usize {
    let mut seen = 0;
    while interrupts.recv().await.is_some() {
        seen += 1;
        if seen == 1 {
            tracing::warn!("Interrupted, stopping after cleanup");
            cancel.cancel();
        } else {
            tracing::warn!("Still closing the browser, please wait");
        }
    }
    seen
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    tracing::info!("Using base directory: {}", config.base_dir.display());

    let cancel = CancellationToken::new();
    install_ctrl_c(cancel.clone());

    let (stages, playlist, confirm) = match cli.command {
        Command::Run(args) => (args.stages(), args.playlist.playlist.clone(), !args.yes),
        Command::Download(args) => (vec![Stage::Download], args.playlist, false),
        Command::Generate => (vec![Stage::Generate], None, false),
        Command::Clean => (vec![Stage::Clean], None, false),
    };

    let options = Options {
        playlist,
        confirm,
        json: cli.json,
    };
    let outcome = pipeline::run(&config, &stages, &options, &cancel).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    if outcome.has_failed_jobs() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_skips() {
        let cli = Cli::try_parse_from([
            "cartographer",
            "run",
            "--skip-download",
            "--yes",
            "--config",
            "/tmp/vars.json",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/vars.json")));
        match cli.command {
            Command::Run(args) => {
                assert!(args.yes);
                assert_eq!(args.stages(), vec![Stage::Generate, Stage::Clean]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_download_with_playlist() {
        let cli = Cli::try_parse_from([
            "cartographer",
            "--json",
            "download",
            "--playlist",
            "https://www.youtube.com/playlist?list=PL123",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Command::Download(args) => assert_eq!(
                args.playlist.as_deref(),
                Some("https://www.youtube.com/playlist?list=PL123")
            ),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_run_defaults_to_all_stages() {
        let cli = Cli::try_parse_from(["cartographer", "run"]).unwrap();
        match cli.command {
            Command::Run(args) => {
                assert!(!args.yes);
                assert_eq!(
                    args.stages(),
                    vec![Stage::Download, Stage::Generate, Stage::Clean]
                );
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_interrupt_cancels() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        let handler = tokio::spawn(handle_interrupts(rx, cancel.clone()));

        tx.send(()).await.unwrap();
        cancel.cancelled().await;
        drop(tx);

        assert_eq!(handler.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_repeated_interrupts_keep_running() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        for _ in 0..3 {
            tx.send(()).await.unwrap();
        }
        drop(tx);

        // Returning at all means no interrupt ended the process
        assert_eq!(handle_interrupts(rx, cancel.clone()).await, 3);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["cartographer"]).is_err());
    }
}
