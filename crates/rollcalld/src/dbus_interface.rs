use crate::session::SessionShared;
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Session1";
pub const OBJECT_PATH: &str = "/org/rollcall/Session1";

/// D-Bus interface for the attendance session daemon.
///
/// Bus name: org.rollcall.Session1
/// Object path: /org/rollcall/Session1
pub struct AttendanceService {
    shared: Arc<SessionShared>,
}

impl AttendanceService {
    pub fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }
}

#[interface(name = "org.rollcall.Session1")]
impl AttendanceService {
    /// Return session status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.shared.status().to_string())
    }

    /// Attendance snapshot (version and one entry per roster identity) as JSON.
    async fn roster(&self) -> zbus::fdo::Result<String> {
        serde_json::to_string(&self.shared.tracker.snapshot())
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Boxes and labels from the latest processed frame as JSON.
    async fn overlay(&self) -> zbus::fdo::Result<String> {
        serde_json::to_string(&self.shared.overlay())
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Render the attendance report without touching disk.
    async fn export_csv(&self) -> zbus::fdo::Result<String> {
        self.shared
            .export_csv()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Write the report into the configured directory and return its path.
    async fn save_report(&self) -> zbus::fdo::Result<String> {
        tracing::info!("save_report requested");
        self.shared
            .save_report()
            .map(|path| path.display().to_string())
            .map_err(|e| {
                tracing::warn!(error = %e, "report save failed");
                zbus::fdo::Error::IOError(e.to_string())
            })
    }

    async fn pause(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("pause requested");
        Ok(self.shared.stream.pause())
    }

    /// Resume playback; this re-runs enrollment and restarts sampling.
    async fn resume(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("resume requested");
        let phase = self.shared.phase();
        if phase.is_terminal() {
            return Err(zbus::fdo::Error::Failed(phase.message().to_string()));
        }
        Ok(self.shared.stream.play())
    }

    /// End the stream and stop sampling. Attendance is kept.
    async fn stop(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("stop requested");
        Ok(self.shared.stream.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPhase;
    use crate::stream::StreamState;
    use crate::testing::roster;

    fn service() -> AttendanceService {
        let dir = std::env::temp_dir().join("rollcall-dbus-test");
        AttendanceService::new(Arc::new(SessionShared::new(roster(&["A", "B"]), dir)))
    }

    #[tokio::test]
    async fn test_roster_lists_every_identity() {
        let svc = service();
        let json: serde_json::Value = serde_json::from_str(&svc.roster().await.unwrap()).unwrap();
        let entries = json["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["identity"], "A");
        assert_eq!(entries[0]["status"], "absent");
        assert!(entries[0]["timestamp"].is_null());
    }

    #[tokio::test]
    async fn test_stream_controls() {
        let svc = service();
        assert!(!svc.pause().await.unwrap());
        assert!(svc.resume().await.unwrap());
        assert_eq!(svc.shared.stream.state(), StreamState::Playing);
        assert!(svc.pause().await.unwrap());
        assert!(svc.stop().await.unwrap());
        assert_eq!(svc.shared.stream.state(), StreamState::Ended);
    }

    #[tokio::test]
    async fn test_resume_refused_after_terminal_phase() {
        let svc = service();
        svc.shared.set_phase(SessionPhase::NoIdentitiesLearned);
        assert!(svc.resume().await.is_err());
        assert_eq!(svc.shared.stream.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn test_status_and_export() {
        let svc = service();
        let status: serde_json::Value = serde_json::from_str(&svc.status().await.unwrap()).unwrap();
        assert_eq!(status["message"], "Initializing Webcam...");
        assert_eq!(status["total"], 2);
        assert_eq!(status["present"], 0);

        let csv = svc.export_csv().await.unwrap();
        assert!(csv.starts_with("Student Name,Status,Timestamp\n"));
        assert_eq!(csv.lines().count(), 3);
    }
}
