use std::fmt::Write;

use crate::snapshot::{SanitizeReport, SnapshotReport};

/// Build a Markdown summary of a snapshot run.
pub fn build_report(report: &SnapshotReport) -> String {
    let mut out = String::new();

    writeln!(out, "# Schema Snapshot Report").unwrap();
    writeln!(out).unwrap();
    if let Some(title) = &report.title {
        writeln!(out, "Project: **{title}**").unwrap();
        writeln!(out).unwrap();
    }

    writeln!(out, "## Sections").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "| Section | Statements |").unwrap();
    writeln!(out, "|---------|------------|").unwrap();
    for (section, count) in &report.sections {
        writeln!(out, "| {} | {count} |", section.title()).unwrap();
    }
    writeln!(out, "| **Total** | {} |", report.total_emitted()).unwrap();

    let stats = &report.stats;
    writeln!(out).unwrap();
    writeln!(out, "## Replay").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "- Statements read: {}", stats.statements).unwrap();
    writeln!(out, "- Redefinitions collapsed: {}", stats.replaced).unwrap();
    writeln!(out, "- Verbatim duplicates dropped: {}", stats.duplicate_text).unwrap();
    writeln!(out, "- Removed by DROP: {}", stats.removed_by_drop).unwrap();
    writeln!(out, "- Narrative lines commented out: {}", stats.stray_lines).unwrap();
    writeln!(out, "- Literal replacements: {}", report.replacements).unwrap();
    writeln!(out, "- Tokenizer fallbacks: {}", stats.parse_fallbacks).unwrap();

    if !stats.skipped.is_empty() {
        writeln!(out).unwrap();
        writeln!(out, "## Skipped").unwrap();
        writeln!(out).unwrap();
        for (reason, count) in &stats.skipped {
            writeln!(out, "- {}: {count}", reason.label()).unwrap();
        }
    }

    if !report.issues.is_empty() {
        writeln!(out).unwrap();
        writeln!(out, "## Parse Issues").unwrap();
        writeln!(out).unwrap();
        writeln!(out, "| Line | Statement | Message |").unwrap();
        writeln!(out, "|------|-----------|---------|").unwrap();
        for issue in &report.issues {
            writeln!(
                out,
                "| {} | `{}` | {} |",
                issue.line,
                issue.summary,
                escape_cell(&issue.message)
            )
            .unwrap();
        }
    }

    out
}

/// Build a Markdown summary of a sanitize run.
pub fn build_sanitize_report(report: &SanitizeReport) -> String {
    let mut out = String::new();
    writeln!(out, "# Sanitize Report").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "- Statements: {}", report.statements).unwrap();
    writeln!(out, "- Guarded: {}", report.guarded).unwrap();
    writeln!(out, "- Existing drops merged into guards: {}", report.merged_drops).unwrap();
    writeln!(out, "- Narrative lines commented out: {}", report.stray_lines).unwrap();
    writeln!(out, "- Literal replacements: {}", report.replacements).unwrap();
    writeln!(out, "- Tokenizer fallbacks: {}", report.parse_fallbacks).unwrap();
    out
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
