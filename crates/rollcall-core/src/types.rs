use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounding box for a detected face, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub confidence: f32,
}

impl BoundingBox {
    /// Map a box from `from` (width, height) space into `to` space.
    ///
    /// Used to carry detections from camera frame coordinates to the
    /// display size negotiated at setup. A zero-sized source returns the
    /// box unchanged.
    pub fn rescale(&self, from: (u32, u32), to: (u32, u32)) -> BoundingBox {
        if from.0 == 0 || from.1 == 0 {
            return *self;
        }
        let sx = to.0 as f32 / from.0 as f32;
        let sy = to.1 as f32 / from.1 as f32;
        BoundingBox {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
            confidence: self.confidence,
        }
    }
}

/// Face embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Embeddings of different dimension come from different models and are
    /// treated as infinitely far apart.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in a frame, as returned by the recognition backend.
///
/// Lives for a single sampling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Reference embedding learned for one roster identity.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledEmbedding {
    pub label: String,
    pub embedding: Embedding,
}

/// Outcome label of a match: a roster identity or "unknown".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchLabel {
    Identity(String),
    Unknown,
}

impl MatchLabel {
    pub fn identity(&self) -> Option<&str> {
        match self {
            MatchLabel::Identity(name) => Some(name),
            MatchLabel::Unknown => None,
        }
    }
}

impl fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchLabel::Identity(name) => f.write_str(name),
            MatchLabel::Unknown => f.write_str("unknown"),
        }
    }
}

/// Result of matching one probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub label: MatchLabel,
    /// Euclidean distance to the nearest gallery entry (infinite for an empty gallery).
    pub distance: f32,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self {
            label: MatchLabel::Unknown,
            distance,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.label.identity()
    }
}

/// Overlay label format: `"<label> (<distance>)"`.
impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2})", self.label, self.distance)
    }
}
