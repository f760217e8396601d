use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One edit to a text file. Anchors are matched literally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PatchOp {
    /// Replace `find` with `replace` (first occurrence, or all with `all`).
    Replace {
        /// Text to find.
        find: String,
        /// Replacement text.
        replace: String,
        /// Replace every occurrence.
        #[serde(default)]
        all: bool,
    },
    /// Insert `text` right before the first `anchor`.
    InsertBefore {
        /// Text to insert in front of.
        anchor: String,
        /// Inserted text.
        text: String,
    },
    /// Insert `text` right after the first `anchor`.
    InsertAfter {
        /// Text to insert behind.
        anchor: String,
        /// Inserted text.
        text: String,
    },
    /// Replace everything from `start` through `end` with `text`.
    ReplaceBlock {
        /// Opening anchor (replaced).
        start: String,
        /// Closing anchor, searched after `start`.
        end: String,
        /// New block content.
        text: String,
        /// Leave the closing anchor in place.
        #[serde(default)]
        keep_end: bool,
        /// Indent every line of `text` like the line holding `start`.
        #[serde(default)]
        reindent: bool,
    },
    /// Replace `find` with a base64 `data:` URI of `asset`.
    EmbedDataUri {
        /// Text to replace, typically a URL or placeholder.
        find: String,
        /// Asset path, relative to the patch root.
        asset: PathBuf,
        /// MIME type; guessed from the extension when absent.
        #[serde(default)]
        mime: Option<String>,
    },
}

/// Result of applying one [`PatchOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOutcome {
    /// The text changed.
    Applied,
    /// The edit is already present.
    AlreadyApplied,
    /// Neither the anchor nor the edit's result was found.
    AnchorNotFound,
    /// The target file does not exist.
    FileMissing,
}

/// Apply `op` to `text`. `root` resolves asset paths.
///
/// Returns the new text (unchanged unless the outcome is `Applied`).
pub fn apply_patch(text: &str, op: &PatchOp, root: &Path) -> Result<(String, PatchOutcome)> {
    let unchanged =
        |outcome: PatchOutcome| -> Result<(String, PatchOutcome)> { Ok((text.to_string(), outcome)) };
    match op {
        PatchOp::Replace { find, replace, all } => {
            if !replace.is_empty() && text.contains(replace.as_str()) {
                unchanged(PatchOutcome::AlreadyApplied)
            } else if !find.is_empty() && text.contains(find.as_str()) {
                let patched = if *all {
                    text.replace(find.as_str(), replace)
                } else {
                    text.replacen(find.as_str(), replace, 1)
                };
                Ok((patched, PatchOutcome::Applied))
            } else {
                unchanged(PatchOutcome::AnchorNotFound)
            }
        }
        PatchOp::InsertBefore { anchor, text: insert } => {
            insert_at(text, anchor, insert, &format!("{insert}{anchor}"), false)
        }
        PatchOp::InsertAfter { anchor, text: insert } => {
            insert_at(text, anchor, insert, &format!("{anchor}{insert}"), true)
        }
        PatchOp::ReplaceBlock {
            start,
            end,
            text: block,
            keep_end,
            reindent,
        } => Ok(replace_block(text, start, end, block, *keep_end, *reindent)),
        PatchOp::EmbedDataUri { find, asset, mime } => {
            let path = root.join(asset);
            let bytes = std::fs::read(&path).map_err(|e| Error::read(&path, e))?;
            let mime = mime.clone().unwrap_or_else(|| guess_mime(asset).to_string());
            let uri = format!("data:{mime};base64,{}", STANDARD.encode(bytes));
            if !find.is_empty() && text.contains(find.as_str()) {
                Ok((text.replace(find.as_str(), &uri), PatchOutcome::Applied))
            } else if text.contains(&uri) {
                unchanged(PatchOutcome::AlreadyApplied)
            } else {
                unchanged(PatchOutcome::AnchorNotFound)
            }
        }
    }
}

fn insert_at(
    text: &str,
    anchor: &str,
    insert: &str,
    applied_form: &str,
    after: bool,
) -> Result<(String, PatchOutcome)> {
    if text.contains(applied_form) {
        return Ok((text.to_string(), PatchOutcome::AlreadyApplied));
    }
    let Some(idx) = (!anchor.is_empty()).then(|| text.find(anchor)).flatten() else {
        return Ok((text.to_string(), PatchOutcome::AnchorNotFound));
    };
    let at = if after { idx + anchor.len() } else { idx };
    let mut patched = String::with_capacity(text.len() + insert.len());
    patched.push_str(&text[..at]);
    patched.push_str(insert);
    patched.push_str(&text[at..]);
    Ok((patched, PatchOutcome::Applied))
}

fn replace_block(
    text: &str,
    start: &str,
    end: &str,
    block: &str,
    keep_end: bool,
    reindent: bool,
) -> (String, PatchOutcome) {
    let located = (!start.is_empty() && !end.is_empty())
        .then(|| text.find(start))
        .flatten()
        .and_then(|begin| {
            text[begin + start.len()..]
                .find(end)
                .map(|offset| (begin, begin + start.len() + offset))
        });

    let Some((begin, end_at)) = located else {
        let outcome = if !block.trim().is_empty() && text.contains(block.trim()) {
            PatchOutcome::AlreadyApplied
        } else {
            PatchOutcome::AnchorNotFound
        };
        return (text.to_string(), outcome);
    };

    let replacement = if reindent {
        indent_block(block, line_indent(text, begin))
    } else {
        block.to_string()
    };
    let stop = if keep_end { end_at } else { end_at + end.len() };
    if text[begin..stop] == replacement {
        return (text.to_string(), PatchOutcome::AlreadyApplied);
    }
    let mut patched = String::with_capacity(text.len() + replacement.len());
    patched.push_str(&text[..begin]);
    patched.push_str(&replacement);
    patched.push_str(&text[stop..]);
    (patched, PatchOutcome::Applied)
}

/// Leading whitespace of the line containing byte `at`.
fn line_indent(text: &str, at: usize) -> &str {
    let line_start = text[..at].rfind('\n').map_or(0, |idx| idx + 1);
    let line = &text[line_start..];
    &line[..line.len() - line.trim_start_matches([' ', '\t']).len()]
}

/// Indent every line after the first with `indent`; the first line lands
/// where the start anchor was, which already carries the indentation.
fn indent_block(block: &str, indent: &str) -> String {
    let base = common_indent(block);
    block
        .split('\n')
        .enumerate()
        .map(|(idx, line)| {
            let line = line.get(base.min(line.len())..).unwrap_or(line);
            if idx == 0 || line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{indent}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn common_indent(block: &str) -> usize {
    block
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0)
}

fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}
