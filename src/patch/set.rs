use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{read_text_lossy, Error, Result};
use crate::patch::ops::{apply_patch, PatchOp, PatchOutcome};

/// A file edit as written in a patch-set JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Target file, relative to the patch root.
    pub file: PathBuf,
    /// Free-form label used in reports.
    #[serde(default)]
    pub description: Option<String>,
    /// Treat the patch as applied when the file already contains this.
    #[serde(default)]
    pub skip_if_contains: Option<String>,
    /// The edit.
    #[serde(flatten)]
    pub op: PatchOp,
}

/// An ordered list of patches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    /// Free-form label.
    #[serde(default)]
    pub description: Option<String>,
    /// Patches, applied in order; several may target the same file.
    pub patches: Vec<Patch>,
}

impl PatchSet {
    /// Parse a patch set from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| Error::Json {
            what: "patch set",
            source,
        })
    }

    /// Load a patch-set file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&read_text_lossy(path)?)
    }
}

/// Outcome of one patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchResult {
    /// Target file, relative to the root.
    pub file: PathBuf,
    /// Label from the patch.
    pub description: Option<String>,
    /// What happened.
    pub outcome: PatchOutcome,
}

/// Summary of [`apply_patch_set`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    /// One entry per patch, in order.
    pub results: Vec<PatchResult>,
    /// Files rewritten (or that would be, in a dry run).
    pub changed_files: Vec<PathBuf>,
    /// Whether files were left untouched.
    pub dry_run: bool,
}

impl PatchReport {
    /// Number of patches with the given outcome.
    pub fn count(&self, outcome: PatchOutcome) -> usize {
        self.results
            .iter()
            .filter(|result| result.outcome == outcome)
            .count()
    }

    /// Whether any patch could not find its target.
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|result| {
            matches!(
                result.outcome,
                PatchOutcome::AnchorNotFound | PatchOutcome::FileMissing
            )
        })
    }
}

struct FileState {
    original: String,
    current: String,
    crlf: bool,
}

/// Apply every patch under `root`. Files are read once, patched in memory
/// in order, and written at the end unless `dry_run`.
///
/// Files with CRLF line endings are patched as LF and written back as CRLF,
/// so anchors can be written with plain newlines.
pub fn apply_patch_set(root: &Path, set: &PatchSet, dry_run: bool) -> Result<PatchReport> {
    let mut files: BTreeMap<PathBuf, Option<FileState>> = BTreeMap::new();
    let mut report = PatchReport {
        dry_run,
        ..PatchReport::default()
    };

    for patch in &set.patches {
        let path = root.join(&patch.file);
        if !files.contains_key(&path) {
            let state = if path.is_file() {
                let raw = read_text_lossy(&path)?;
                let crlf = raw.contains("\r\n");
                let text = if crlf { raw.replace("\r\n", "\n") } else { raw };
                Some(FileState {
                    original: text.clone(),
                    current: text,
                    crlf,
                })
            } else {
                None
            };
            files.insert(path.clone(), state);
        }

        let outcome = match files.get_mut(&path).and_then(Option::as_mut) {
            None => PatchOutcome::FileMissing,
            Some(state) => match &patch.skip_if_contains {
                Some(marker) if state.current.contains(marker.as_str()) => {
                    PatchOutcome::AlreadyApplied
                }
                _ => {
                    let (patched, outcome) = apply_patch(&state.current, &patch.op, root)?;
                    state.current = patched;
                    outcome
                }
            },
        };
        let label = patch.description.as_deref().unwrap_or("");
        match outcome {
            PatchOutcome::AnchorNotFound | PatchOutcome::FileMissing => {
                warn!(file = %patch.file.display(), patch = label, outcome = ?outcome, "patch not applied")
            }
            _ => info!(file = %patch.file.display(), patch = label, outcome = ?outcome, "patch checked"),
        }
        report.results.push(PatchResult {
            file: patch.file.clone(),
            description: patch.description.clone(),
            outcome,
        });
    }

    for (path, state) in &files {
        let Some(state) = state else { continue };
        if state.current == state.original {
            continue;
        }
        if !dry_run {
            let contents = if state.crlf {
                state.current.replace('\n', "\r\n")
            } else {
                state.current.clone()
            };
            std::fs::write(path, contents).map_err(|e| Error::write(path, e))?;
        }
        report
            .changed_files
            .push(path.strip_prefix(root).unwrap_or(path).to_path_buf());
    }
    Ok(report)
}
