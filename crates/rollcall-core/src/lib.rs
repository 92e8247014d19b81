//! rollcall-core: roster enrollment, face matching and attendance tracking.
//!
//! Face detection and embedding extraction are delegated to an external
//! recognition backend; this crate owns everything downstream of an
//! embedding: the matcher, the per-identity attendance state machine and
//! the CSV report.

pub mod backend;
pub mod enrollment;
pub mod matcher;
pub mod report;
pub mod roster;
pub mod tracker;
pub mod types;

pub use backend::{BackendError, FaceBackend};
pub use enrollment::{EnrollError, Enrollment, Gallery};
pub use matcher::{EuclideanMatcher, GalleryMatcher, Matcher, DEFAULT_DISTANCE_THRESHOLD};
pub use roster::{Identity, Roster, RosterError};
pub use tracker::{AttendanceEntry, AttendanceSnapshot, AttendanceStatus, AttendanceTracker, Transition};
pub use types::{BoundingBox, Detection, Embedding, LabeledEmbedding, MatchLabel, MatchResult};
