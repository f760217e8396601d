//! Collapse accumulated `PostgreSQL` migration dumps into idempotent snapshots,
//! and run the maintenance chores that surround them: row copies between
//! environments, logo clean-up, source patches, and knowledge-base syncs.
#![warn(missing_docs)]

/// Image utilities for logo and icon assets.
pub mod assets;
/// Project profiles loaded from JSON.
pub mod config;
/// Table copies between two databases.
pub mod copier;
/// Crate-wide error type.
pub mod error;
/// Knowledge-base versioning and migration directory clean-up.
pub mod housekeeping;
/// File output and markdown report generation.
pub mod output;
/// SQL dump normalization, splitting, and statement classification.
pub mod parser;
/// Literal-anchor patches for source files.
pub mod patch;
/// Snapshot building and in-place sanitizing.
pub mod snapshot;

pub use config::Profile;
pub use error::{Error, Result};
