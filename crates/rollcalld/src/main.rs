use anyhow::{Context, Result};
use rollcall_core::backend::HelperBackend;
use rollcall_core::{FaceBackend, Roster};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod sampler;
mod session;
mod stream;
mod sync;
#[cfg(test)]
mod testing;

use config::Config;
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};
use engine::{EngineError, EngineHandle, EngineSettings};
use session::{Session, SessionPhase, SessionSettings, SessionShared};

const SYNC_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();
    let roster = Roster::load(&config.roster_path)
        .with_context(|| format!("failed to load roster {}", config.roster_path.display()))?;
    tracing::info!(
        roster = %config.roster_path.display(),
        identities = roster.len(),
        threshold = config.distance_threshold,
        "configuration loaded"
    );

    let shared = Arc::new(SessionShared::new(roster, config.report_dir.clone()));

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, AttendanceService::new(Arc::clone(&shared)))?
        .build()
        .await
        .context("failed to register on the session bus")?;
    tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "D-Bus interface registered");

    let (marks_tx, sync_task) = match config.api_url.as_deref() {
        Some(url) => {
            let (tx, rx) = mpsc::unbounded_channel();
            match sync::spawn_sync(url, &shared.roster, rx) {
                Ok(task) => (Some(tx), Some(task)),
                Err(e) => {
                    tracing::warn!(error = %e, "attendance sync disabled");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    match start_engine(&config, &shared).await {
        Ok(engine) => {
            let settings = SessionSettings {
                threshold: config.distance_threshold,
                display: config.display_size,
                interval: config.sample_interval,
            };
            let mut session = Session::new(Arc::new(engine), Arc::clone(&shared), settings);
            if let Some(tx) = marks_tx {
                session = session.with_marks(tx);
            }
            shared.stream.play();
            tracing::info!("rollcalld ready");
            session.run(shutdown_signal()).await;
        }
        Err(e) => {
            shared.set_phase(SessionPhase::SetupFailed {
                error: format!("{e:#}"),
            });
            drop(marks_tx);
            shutdown_signal().await;
        }
    }

    tracing::info!("rollcalld shutting down");

    if let Err(e) = shared.save_report() {
        tracing::error!(error = %e, "final report not written");
    }

    if let Some(task) = sync_task {
        if tokio::time::timeout(SYNC_DRAIN_TIMEOUT, task).await.is_err() {
            tracing::warn!("attendance sync did not drain in time");
        }
    }

    Ok(())
}

/// Load models in the helper, then open the camera on the engine thread.
async fn start_engine(config: &Config, shared: &SessionShared) -> Result<EngineHandle> {
    shared.set_phase(SessionPhase::LoadingModels);
    let program = config.helper_program.clone();
    let args = config.helper_args.clone();
    let backend = tokio::task::spawn_blocking(move || -> Result<HelperBackend, EngineError> {
        let mut backend = HelperBackend::spawn(&program, &args)?;
        backend.load_models()?;
        Ok(backend)
    })
    .await
    .context("model loading task failed")??;
    tracing::info!(helper = %config.helper_program, "models loaded");

    shared.set_phase(SessionPhase::StartingCamera);
    let settings = EngineSettings {
        camera_device: config.camera_device.clone(),
        capture_width: config.capture_width,
        capture_height: config.capture_height,
        warmup_frames: config.warmup_frames,
    };
    let engine = engine::spawn_engine(settings, backend).await?;
    Ok(engine)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for SIGINT");
    }
}
