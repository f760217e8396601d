/// Writes generated scripts and reports to disk.
pub mod formatter;
/// Builds Markdown summaries of snapshot and sanitize runs.
pub mod report;
