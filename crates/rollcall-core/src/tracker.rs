//! Per-identity attendance state machine.
//!
//! Each roster identity starts `Absent` and moves to `Present(timestamp)` on
//! its first positive match. `Present` is terminal for the session: repeat
//! matches never move the timestamp. All writes go through
//! [`AttendanceTracker::apply_at`], which holds the write lock for the whole
//! read-modify-write; readers get whole-roster snapshots.

use crate::roster::Roster;
use crate::types::MatchResult;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Absent,
    Present,
}

/// One roster row as seen by readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceEntry {
    pub identity: String,
    pub status: AttendanceStatus,
    pub timestamp: Option<DateTime<Local>>,
}

/// Outcome of applying one match result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Identity moved from absent to present at this time.
    Marked(DateTime<Local>),
    /// Identity was already present since this time; nothing changed.
    AlreadyPresent(DateTime<Local>),
    /// Unknown label or a label outside the roster.
    Ignored,
}

/// Consistent view of the whole roster, in roster order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSnapshot {
    /// Number of transitions applied so far.
    pub version: u64,
    pub entries: Vec<AttendanceEntry>,
}

impl AttendanceSnapshot {
    pub fn present_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == AttendanceStatus::Present)
            .count()
    }
}

struct TrackerState {
    order: Vec<String>,
    /// `None` = absent, `Some(t)` = present since `t`.
    marks: HashMap<String, Option<DateTime<Local>>>,
    version: u64,
}

pub struct AttendanceTracker {
    state: RwLock<TrackerState>,
}

impl AttendanceTracker {
    /// Create a tracker with every roster identity absent.
    pub fn new(roster: &Roster) -> Self {
        let order: Vec<String> = roster.names().map(str::to_string).collect();
        let marks = order.iter().map(|name| (name.clone(), None)).collect();
        Self {
            state: RwLock::new(TrackerState {
                order,
                marks,
                version: 0,
            }),
        }
    }

    pub fn apply(&self, result: &MatchResult) -> Transition {
        self.apply_at(result, Local::now())
    }

    pub fn apply_at(&self, result: &MatchResult, now: DateTime<Local>) -> Transition {
        let Some(name) = result.identity() else {
            return Transition::Ignored;
        };

        let mut guard = self.state.write();
        let state = &mut *guard;

        let transition = match state.marks.get_mut(name) {
            None => Transition::Ignored,
            Some(Some(since)) => Transition::AlreadyPresent(*since),
            Some(slot @ None) => {
                *slot = Some(now);
                Transition::Marked(now)
            }
        };

        if let Transition::Marked(at) = transition {
            state.version += 1;
            tracing::info!(name, at = %at, version = state.version, "marked present");
        }

        transition
    }

    pub fn snapshot(&self) -> AttendanceSnapshot {
        let state = self.state.read();
        let entries = state
            .order
            .iter()
            .map(|name| entry_for(name, state.marks.get(name).copied().flatten()))
            .collect();
        AttendanceSnapshot {
            version: state.version,
            entries,
        }
    }

    pub fn entry(&self, name: &str) -> Option<AttendanceEntry> {
        let state = self.state.read();
        state.marks.get(name).map(|mark| entry_for(name, *mark))
    }

    pub fn version(&self) -> u64 {
        self.state.read().version
    }
}

fn entry_for(name: &str, mark: Option<DateTime<Local>>) -> AttendanceEntry {
    AttendanceEntry {
        identity: name.to_string(),
        status: if mark.is_some() {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::Absent
        },
        timestamp: mark,
    }
}
