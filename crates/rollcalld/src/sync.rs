//! Push present marks to the attendance API.
//!
//! Local tracker state is authoritative; a failed call is logged and the
//! mark is not retried.

use crate::sampler::MarkEvent;
use rollcall_core::Roster;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttendancePayload<'a> {
    student_id: i64,
    status: &'a str,
}

pub fn attendance_url(base_url: &str) -> String {
    format!("{}/api/attendance", base_url.trim_end_matches('/'))
}

pub struct AttendanceSync {
    client: reqwest::Client,
    url: String,
    student_ids: HashMap<String, i64>,
}

impl AttendanceSync {
    pub fn new(base_url: &str, roster: &Roster) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let student_ids = roster
            .identities()
            .iter()
            .filter_map(|i| i.student_id.map(|id| (i.name.clone(), id)))
            .collect();
        Ok(Self {
            client,
            url: attendance_url(base_url),
            student_ids,
        })
    }

    pub async fn post_present(&self, student_id: i64) -> Result<(), SyncError> {
        let response = self
            .client
            .post(&self.url)
            .json(&AttendancePayload {
                student_id,
                status: "present",
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::Status(response.status()));
        }
        Ok(())
    }

    /// Drain mark events until every sender is dropped.
    pub async fn run(self, mut marks: mpsc::UnboundedReceiver<MarkEvent>) {
        tracing::info!(url = %self.url, ids = self.student_ids.len(), "attendance sync started");
        while let Some(mark) = marks.recv().await {
            let Some(&student_id) = self.student_ids.get(&mark.name) else {
                tracing::debug!(name = %mark.name, "no student id; not synced");
                continue;
            };
            match self.post_present(student_id).await {
                Ok(()) => tracing::info!(name = %mark.name, student_id, "attendance synced"),
                Err(e) => tracing::warn!(name = %mark.name, student_id, error = %e, "attendance sync failed"),
            }
        }
        tracing::info!("attendance sync finished");
    }
}

pub fn spawn_sync(
    base_url: &str,
    roster: &Roster,
    marks: mpsc::UnboundedReceiver<MarkEvent>,
) -> Result<JoinHandle<()>, SyncError> {
    let sync = AttendanceSync::new(base_url, roster)?;
    Ok(tokio::spawn(sync.run(marks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use rollcall_core::Identity;

    #[test]
    fn test_payload_shape() {
        let json = serde_json::to_value(AttendancePayload {
            student_id: 7,
            status: "present",
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"studentId": 7, "status": "present"}));
    }

    #[test]
    fn test_attendance_url() {
        assert_eq!(attendance_url("http://localhost:5000"), "http://localhost:5000/api/attendance");
        assert_eq!(attendance_url("http://host/"), "http://host/api/attendance");
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_sync() {
        let mut with_id = Identity::new("A", "a.png");
        with_id.student_id = Some(1);
        let roster = Roster::new(vec![with_id, Identity::new("B", "b.png")]).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        // Nothing listens on the discard port.
        let handle = spawn_sync("http://127.0.0.1:9", &roster, rx).unwrap();
        for name in ["A", "B", "A"] {
            tx.send(MarkEvent {
                name: name.into(),
                at: Local::now(),
            })
            .unwrap();
        }
        drop(tx);
        handle.await.unwrap();
    }
}
