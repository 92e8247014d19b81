//! Learn one reference embedding per roster identity.

use crate::backend::FaceBackend;
use crate::roster::Roster;
use crate::types::LabeledEmbedding;
use image::GrayImage;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollError {
    #[error("no identities learned: every reference image failed enrollment")]
    NoIdentitiesLearned,
}

/// Why an identity was left out of the gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum ExclusionReason {
    ImageLoad(String),
    NoFaceFound,
    Extraction(String),
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::ImageLoad(e) => write!(f, "image load failed: {e}"),
            ExclusionReason::NoFaceFound => f.write_str("no face found"),
            ExclusionReason::Extraction(e) => write!(f, "extraction failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Excluded {
    pub name: String,
    pub reason: ExclusionReason,
}

/// Outcome of enrolling a roster. `learned` keeps roster order.
#[derive(Debug, Clone, Default)]
pub struct Enrollment {
    pub learned: Vec<LabeledEmbedding>,
    pub excluded: Vec<Excluded>,
}

impl Enrollment {
    pub fn into_gallery(self) -> Result<Gallery, EnrollError> {
        Gallery::new(self.learned)
    }
}

/// Non-empty set of reference embeddings.
#[derive(Debug, Clone)]
pub struct Gallery {
    entries: Vec<LabeledEmbedding>,
}

impl Gallery {
    pub fn new(entries: Vec<LabeledEmbedding>) -> Result<Self, EnrollError> {
        if entries.is_empty() {
            return Err(EnrollError::NoIdentitiesLearned);
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[LabeledEmbedding] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decode a reference photo into an 8-bit grayscale image.
pub fn load_reference_image(path: &Path) -> Result<GrayImage, image::ImageError> {
    Ok(image::open(path)?.to_luma8())
}

/// Enroll every roster identity from its reference image on disk.
pub fn enroll<B: FaceBackend + ?Sized>(roster: &Roster, backend: &mut B) -> Enrollment {
    enroll_with(roster, backend, load_reference_image)
}

/// Enroll with a caller-supplied image loader.
///
/// A failure for one identity is logged and recorded in
/// [`Enrollment::excluded`]; it never aborts the remaining identities.
pub fn enroll_with<B, L, E>(roster: &Roster, backend: &mut B, mut load: L) -> Enrollment
where
    B: FaceBackend + ?Sized,
    L: FnMut(&Path) -> Result<GrayImage, E>,
    E: fmt::Display,
{
    let mut enrollment = Enrollment::default();

    for identity in roster.identities() {
        let name = identity.name.as_str();

        let image = match load(&identity.image) {
            Ok(image) => image,
            Err(e) => {
                tracing::error!(name, image = %identity.image.display(), error = %e, "failed to load reference image");
                enrollment.excluded.push(Excluded {
                    name: name.to_string(),
                    reason: ExclusionReason::ImageLoad(e.to_string()),
                });
                continue;
            }
        };

        match backend.detect_single(image.as_raw(), image.width(), image.height()) {
            Ok(Some(detection)) => {
                tracing::debug!(name, confidence = detection.bbox.confidence, "reference face learned");
                enrollment.learned.push(LabeledEmbedding {
                    label: name.to_string(),
                    embedding: detection.embedding,
                });
            }
            Ok(None) => {
                tracing::warn!(name, image = %identity.image.display(), "no face found in reference image");
                enrollment.excluded.push(Excluded {
                    name: name.to_string(),
                    reason: ExclusionReason::NoFaceFound,
                });
            }
            Err(e) => {
                tracing::error!(name, error = %e, "reference embedding extraction failed");
                enrollment.excluded.push(Excluded {
                    name: name.to_string(),
                    reason: ExclusionReason::Extraction(e.to_string()),
                });
            }
        }
    }

    tracing::info!(
        learned = enrollment.learned.len(),
        excluded = enrollment.excluded.len(),
        "enrollment finished"
    );

    enrollment
}
