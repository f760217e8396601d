use std::path::{Component, Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::output::report;
use crate::snapshot::{Sanitized, Snapshot};

/// Write `{name}_schema.sql`, `{name}_seed.sql` (when split) and
/// `{name}_report.md` to `output_dir`. Returns the paths written.
pub fn write_snapshot(output_dir: &Path, name: &str, snapshot: &Snapshot) -> Result<Vec<PathBuf>> {
    validate_output_name(name)?;
    std::fs::create_dir_all(output_dir).map_err(|e| Error::write(output_dir, e))?;

    let mut written = Vec::new();
    written.push(write_file(
        &output_dir.join(format!("{name}_schema.sql")),
        &snapshot.schema,
    )?);
    if let Some(seed) = &snapshot.seed {
        written.push(write_file(&output_dir.join(format!("{name}_seed.sql")), seed)?);
    }
    written.push(write_file(
        &output_dir.join(format!("{name}_report.md")),
        &report::build_report(&snapshot.report),
    )?);
    Ok(written)
}

/// Write `{name}_sanitized.sql` and `{name}_sanitize_report.md` to
/// `output_dir`. Returns the paths written.
pub fn write_sanitized(output_dir: &Path, name: &str, sanitized: &Sanitized) -> Result<Vec<PathBuf>> {
    validate_output_name(name)?;
    std::fs::create_dir_all(output_dir).map_err(|e| Error::write(output_dir, e))?;

    Ok(vec![
        write_file(&output_dir.join(format!("{name}_sanitized.sql")), &sanitized.sql)?,
        write_file(
            &output_dir.join(format!("{name}_sanitize_report.md")),
            &report::build_sanitize_report(&sanitized.report),
        )?,
    ])
}

fn write_file(path: &Path, contents: &str) -> Result<PathBuf> {
    std::fs::write(path, contents).map_err(|e| Error::write(path, e))?;
    info!(path = %path.display(), bytes = contents.len(), "wrote output");
    Ok(path.to_path_buf())
}

/// Reject names that would escape the output directory.
pub fn validate_output_name(name: &str) -> Result<()> {
    let invalid = |reason| Error::InvalidOutputName {
        name: name.to_string(),
        reason,
    };
    if name.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return Err(invalid("absolute paths are not allowed"));
    }
    if candidate.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    }) {
        return Err(invalid("traversal segments are not allowed"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("path separators are not allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::snapshot::{build_snapshot, SnapshotOptions};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_path(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}_{nanos}"))
    }

    fn snapshot(split_seed: bool) -> Snapshot {
        build_snapshot(
            "CREATE TABLE plans (id int PRIMARY KEY);\nINSERT INTO plans VALUES (1);",
            &Profile::default(),
            &SnapshotOptions {
                split_seed,
                ..SnapshotOptions::default()
            },
        )
    }

    #[test]
    fn write_snapshot_reports_directory_creation_errors() {
        let path = unique_path("schemasnap_formatter_file");
        std::fs::write(&path, "not a directory").expect("should create marker file");

        let err = write_snapshot(&path, "output", &snapshot(true))
            .expect_err("directory creation should fail");
        assert!(err.to_string().contains("Failed to write"));
    }

    #[test]
    fn write_snapshot_rejects_unsafe_name_paths() {
        let dir = unique_path("schemasnap_formatter_dir");
        std::fs::create_dir_all(&dir).expect("should create temp directory");

        for name in ["nested/output", "../escape", "", "/abs"] {
            let err = write_snapshot(&dir, name, &snapshot(true))
                .expect_err("unsafe output name should fail validation");
            assert!(err.to_string().contains("Invalid output name"), "{name}: {err}");
        }
    }

    #[test]
    fn write_snapshot_writes_all_artifacts_on_success() {
        let dir = unique_path("schemasnap_formatter_ok");
        let written = write_snapshot(&dir, "rentmate", &snapshot(true)).expect("should write");
        assert_eq!(written.len(), 3);

        let schema = std::fs::read_to_string(dir.join("rentmate_schema.sql")).expect("schema file");
        let seed = std::fs::read_to_string(dir.join("rentmate_seed.sql")).expect("seed file");
        let report = std::fs::read_to_string(dir.join("rentmate_report.md")).expect("report");
        assert!(schema.contains("CREATE TABLE IF NOT EXISTS plans"));
        assert!(seed.contains("ON CONFLICT DO NOTHING"));
        assert!(report.contains("# Schema Snapshot Report"));
    }

    #[test]
    fn inline_seed_writes_no_seed_file() {
        let dir = unique_path("schemasnap_formatter_inline");
        let written = write_snapshot(&dir, "rentmate", &snapshot(false)).expect("should write");
        assert_eq!(written.len(), 2);
        assert!(!dir.join("rentmate_seed.sql").exists());
    }
}
