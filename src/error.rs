use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by every `schemasnap` subcommand.
#[derive(Debug, Error)]
pub enum Error {
    /// A file or directory could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A file or directory could not be written, renamed, or removed.
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A JSON document (profile, thresholds, patch set) was malformed.
    #[error("Invalid {what} JSON: {source}")]
    Json {
        /// Human-readable name of the document kind.
        what: &'static str,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// An output artifact name was rejected.
    #[error("Invalid output name '{name}': {reason}")]
    InvalidOutputName {
        /// Offending name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A `schema.table` reference could not be parsed.
    #[error("Invalid table reference '{0}'")]
    InvalidTableRef(String),

    /// A `#RRGGBB` color could not be parsed.
    #[error("Invalid color '{0}': expected #RRGGBB")]
    InvalidColor(String),

    /// Image decoding or encoding failed.
    #[error("Image error for {}: {source}", path.display())]
    Image {
        /// Image path.
        path: PathBuf,
        /// Underlying image error.
        source: image::ImageError,
    },

    /// No `_vX.Y.Z.md` files were found where some were expected.
    #[error("No versioned files found in {}", .0.display())]
    NoVersionedFiles(PathBuf),

    /// A version's patch component is already at its maximum.
    #[error("Version {0} cannot be bumped")]
    VersionOverflow(String),

    /// Establishing a database connection failed.
    #[cfg(feature = "db")]
    #[error("Database connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    /// A database query failed.
    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Write {
            path: path.into(),
            source,
        }
    }
}

/// Read a text file, replacing invalid UTF-8 sequences with U+FFFD.
pub fn read_text_lossy(path: &std::path::Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| Error::read(path, e))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}
