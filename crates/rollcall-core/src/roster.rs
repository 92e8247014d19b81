//! Static class roster, loaded once at startup.
//!
//! Rosters are TOML files with one `[[student]]` table per identity:
//!
//! ```toml
//! [[student]]
//! name = "Ashri Singh"
//! image = "faces/Ashri_singh.jpg"
//! student_id = 1
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("failed to read roster {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid roster TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("roster has no students")]
    Empty,
    #[error("student #{0} has a blank name")]
    BlankName(usize),
    #[error("duplicate student name: {0}")]
    DuplicateName(String),
}

/// One known person: display name (the tracking key) and reference photo.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Identity {
    pub name: String,
    pub image: PathBuf,
    /// Backend student ID, used only when syncing attendance upstream.
    #[serde(default)]
    pub student_id: Option<i64>,
}

impl Identity {
    pub fn new(name: impl Into<String>, image: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            student_id: None,
        }
    }
}

#[derive(Deserialize)]
struct RosterFile {
    #[serde(default, rename = "student")]
    students: Vec<Identity>,
}

/// Ordered, non-empty list of identities with unique names.
///
/// Declaration order is preserved and drives report row order.
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    identities: Vec<Identity>,
}

impl Roster {
    pub fn new(identities: Vec<Identity>) -> Result<Self, RosterError> {
        if identities.is_empty() {
            return Err(RosterError::Empty);
        }

        let mut seen = HashSet::with_capacity(identities.len());
        for (i, identity) in identities.iter().enumerate() {
            if identity.name.trim().is_empty() {
                return Err(RosterError::BlankName(i + 1));
            }
            if !seen.insert(identity.name.as_str()) {
                return Err(RosterError::DuplicateName(identity.name.clone()));
            }
        }

        Ok(Self { identities })
    }

    /// Load a roster file. Relative image paths resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let src = std::fs::read_to_string(path).map_err(|source| RosterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&src, base_dir)
    }

    pub fn from_toml_str(src: &str, base_dir: &Path) -> Result<Self, RosterError> {
        let file: RosterFile = toml::from_str(src)?;
        let identities = file
            .students
            .into_iter()
            .map(|mut identity| {
                if identity.image.is_relative() {
                    identity.image = base_dir.join(&identity.image);
                }
                identity
            })
            .collect();
        Self::new(identities)
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().map(|i| i.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[student]]
name = "Ashri Singh"
image = "faces/Ashri_singh.jpg"
student_id = 7

[[student]]
name = "Shilpi"
image = "/srv/faces/Shilpi.jpg"
"#;

    #[test]
    fn test_parse_preserves_order_and_resolves_paths() {
        let roster = Roster::from_toml_str(SAMPLE, Path::new("/etc/rollcall")).unwrap();
        assert_eq!(roster.names().collect::<Vec<_>>(), vec!["Ashri Singh", "Shilpi"]);
        assert_eq!(
            roster.identities()[0].image,
            PathBuf::from("/etc/rollcall/faces/Ashri_singh.jpg")
        );
        assert_eq!(roster.identities()[0].student_id, Some(7));
        assert_eq!(roster.identities()[1].image, PathBuf::from("/srv/faces/Shilpi.jpg"));
        assert_eq!(roster.identities()[1].student_id, None);
    }

    #[test]
    fn test_empty_roster_rejected() {
        let err = Roster::from_toml_str("", Path::new(".")).unwrap_err();
        assert!(matches!(err, RosterError::Empty));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = Roster::new(vec![Identity::new("A", "a.jpg"), Identity::new("A", "b.jpg")])
            .unwrap_err();
        assert!(matches!(err, RosterError::DuplicateName(name) if name == "A"));
    }

    #[test]
    fn test_blank_name_rejected() {
        let err = Roster::new(vec![Identity::new("A", "a.jpg"), Identity::new("  ", "b.jpg")])
            .unwrap_err();
        assert!(matches!(err, RosterError::BlankName(2)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let roster = Roster::load(&path).unwrap();
        assert_eq!(roster.len(), 2);
        let first = &roster.identities()[0];
        assert_eq!(first.name, "Ashri Singh");
        assert_eq!(first.image, dir.path().join("faces/Ashri_singh.jpg"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Roster::load(Path::new("/nonexistent/roster.toml")).unwrap_err();
        assert!(matches!(err, RosterError::Io { .. }));
    }
}
