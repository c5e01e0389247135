//! Reference string inspection.
//!
//! References are opaque to the runtime: they are registry keys, and the
//! gateway decides how to load them. The helpers here only exist to give
//! records a readable name and a coarse classification.

use std::fmt;

/// Coarse shape of a reference string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// Artifact coordinate, e.g. `mvn:group/artifact/version`.
    Coordinate,
    /// URL with a scheme, e.g. `https://...` or `file:...`.
    Url,
    /// Plain filesystem path.
    Path,
}

impl ReferenceKind {
    /// Classify a reference string.
    #[must_use]
    pub fn classify(reference: &str) -> Self {
        if reference.starts_with("mvn:") {
            Self::Coordinate
        } else if reference.contains("://") || reference.starts_with("file:") {
            Self::Url
        } else {
            Self::Path
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Coordinate => "coordinate",
            Self::Url => "url",
            Self::Path => "path",
        })
    }
}

/// Short display name for a reference.
///
/// Coordinates yield their artifact segment; URLs and paths yield the file
/// stem with any `-<version>` suffix removed. Falls back to the reference
/// itself when nothing better can be extracted.
#[must_use]
pub fn short_name(reference: &str) -> String {
    let name = match ReferenceKind::classify(reference) {
        ReferenceKind::Coordinate => coordinate_artifact(reference),
        ReferenceKind::Url | ReferenceKind::Path => file_stem(reference),
    };
    match name {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => reference.to_owned(),
    }
}

fn coordinate_artifact(reference: &str) -> Option<&str> {
    let coordinate = reference.strip_prefix("mvn:")?;
    // `mvn:repository!group/artifact/version` carries an explicit repository
    let coordinate = coordinate
        .rsplit_once('!')
        .map_or(coordinate, |(_, rest)| rest);
    coordinate.split('/').nth(1)
}

fn file_stem(reference: &str) -> Option<&str> {
    let path = reference.split(['?', '#']).next()?;
    let file = path.rsplit(['/', '\\', ':']).next()?;
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    Some(strip_version(stem))
}

fn strip_version(stem: &str) -> &str {
    let bytes = stem.as_bytes();
    for (i, window) in bytes.windows(2).enumerate() {
        if window[0] == b'-' && window[1].is_ascii_digit() {
            return &stem[..i];
        }
    }
    stem
}
