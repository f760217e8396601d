/// Snapshot and sanitize drivers.
pub mod builder;
/// Ordered replay of statements with last-definition-wins semantics.
pub mod catalog;
/// Idempotency rewrites.
pub mod guards;
/// Profile-driven literal replacements.
pub mod rewrite;

pub use builder::{build_snapshot, sanitize_dump, Sanitized, SanitizeReport, Snapshot, SnapshotOptions, SnapshotReport};
pub use guards::GuardOptions;
