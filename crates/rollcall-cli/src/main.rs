use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::enrollment::load_reference_image;
use rollcall_core::Roster;
use rollcall_hw::Camera;
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.rollcall.Session1",
    default_service = "org.rollcall.Session1",
    default_path = "/org/rollcall/Session1"
)]
trait Session {
    async fn status(&self) -> zbus::Result<String>;
    async fn roster(&self) -> zbus::Result<String>;
    async fn overlay(&self) -> zbus::Result<String>;
    async fn export_csv(&self) -> zbus::Result<String>;
    async fn save_report(&self) -> zbus::Result<String>;
    async fn pause(&self) -> zbus::Result<bool>;
    async fn resume(&self) -> zbus::Result<bool>;
    async fn stop(&self) -> zbus::Result<bool>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Classroom attendance session CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show session status
    Status,
    /// Show attendance for every student
    Roster,
    /// Show the boxes and labels from the latest frame
    Overlay,
    /// Export the attendance report as CSV
    Export {
        /// Write to this file instead of stdout ("-" is stdout)
        #[arg(short, long, conflicts_with = "save")]
        output: Option<PathBuf>,
        /// Have rollcalld save the report into its report directory
        #[arg(long)]
        save: bool,
    },
    /// Pause sampling
    Pause,
    /// Resume sampling (re-learns student faces)
    Resume,
    /// End the session's video stream
    Stop,
    /// List V4L2 capture devices
    Devices,
    /// Validate a roster file and decode every reference image
    CheckRoster {
        /// Roster TOML file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => print_json(&connect().await?.status().await?)?,
        Commands::Roster => print_roster(&connect().await?.roster().await?)?,
        Commands::Overlay => print_json(&connect().await?.overlay().await?)?,
        Commands::Export { save: true, .. } => {
            let saved = connect().await?.save_report().await?;
            println!("Report saved by rollcalld: {saved}");
        }
        Commands::Export { output: None, .. } => print!("{}", connect().await?.export_csv().await?),
        Commands::Export { output: Some(path), .. } if path.as_os_str() == "-" => {
            print!("{}", connect().await?.export_csv().await?)
        }
        Commands::Export { output: Some(path), .. } => {
            let csv = connect().await?.export_csv().await?;
            std::fs::write(&path, csv)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        Commands::Pause => {
            report_transition(connect().await?.pause().await?, "paused", "not playing")
        }
        Commands::Resume => {
            report_transition(connect().await?.resume().await?, "resumed", "already playing")
        }
        Commands::Stop => {
            report_transition(connect().await?.stop().await?, "stopped", "already stopped")
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::CheckRoster { file } => check_roster(&file)?,
    }

    Ok(())
}

async fn connect() -> Result<SessionProxy<'static>> {
    tracing::debug!(service = "org.rollcall.Session1", "connecting to session bus");
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    SessionProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("invalid reply from rollcalld")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_roster(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("invalid reply from rollcalld")?;
    let entries = value["entries"].as_array().cloned().unwrap_or_default();
    for entry in &entries {
        println!(
            "{:<24} {:<8} {}",
            entry["identity"].as_str().unwrap_or("?"),
            entry["status"].as_str().unwrap_or("?"),
            entry["timestamp"].as_str().unwrap_or("-"),
        );
    }
    Ok(())
}

fn report_transition(changed: bool, done: &str, noop: &str) {
    if changed {
        println!("Session {done}");
    } else {
        println!("Nothing to do: {noop}");
    }
}

/// Load `file`, decode every reference image, and fail if none decode.
fn check_roster(file: &Path) -> Result<()> {
    let roster = Roster::load(file).with_context(|| format!("invalid roster {}", file.display()))?;
    let loadable = roster_report(&roster, |line| println!("{line}"));
    println!("{loadable}/{} reference images loadable", roster.len());
    if loadable == 0 {
        bail!("no reference image in {} could be decoded", file.display());
    }
    Ok(())
}

fn roster_report(roster: &Roster, mut emit: impl FnMut(String)) -> usize {
    let mut loadable = 0;
    for identity in roster.identities() {
        match load_reference_image(&identity.image) {
            Ok(img) => {
                loadable += 1;
                emit(format!("  ok    {} ({}x{})", identity.name, img.width(), img.height()));
            }
            Err(e) => {
                tracing::debug!(name = %identity.name, error = %e, "reference image not loadable");
                emit(format!("  FAIL  {}: {}: {e}", identity.name, identity.image.display()))
            }
        }
    }
    loadable
}
