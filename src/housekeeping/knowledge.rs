//! Versioned knowledge-base files (`name_v1.2.3.md`): bump, archive, mirror.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{read_text_lossy, Error, Result};

static VERSIONED_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)_v(\d+)\.(\d+)\.(\d+)\.md$").expect("valid regex"));

/// Default name of the index file rewritten on each sync.
pub const DEFAULT_INDEX_FILE: &str = "README_UPLOAD_GUIDE.md";

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Version {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl Version {
    /// Parse `1.2.3`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('.').map(|part| part.parse::<u32>().ok());
        let version = Self {
            major: parts.next()??,
            minor: parts.next()??,
            patch: parts.next()??,
        };
        parts.next().is_none().then_some(version)
    }

    /// Next patch release.
    pub fn bump_patch(self) -> Result<Self> {
        let patch = self
            .patch
            .checked_add(1)
            .ok_or_else(|| Error::VersionOverflow(self.to_string()))?;
        Ok(Self { patch, ..self })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Split `guide_v1.2.3.md` into `("guide", 1.2.3)`.
pub fn versioned_file(name: &str) -> Option<(&str, Version)> {
    let caps = VERSIONED_FILE.captures(name)?;
    let stem = caps.get(1)?.as_str();
    let number = |idx| caps.get(idx).and_then(|m| m.as_str().parse().ok());
    Some((
        stem,
        Version {
            major: number(2)?,
            minor: number(3)?,
            patch: number(4)?,
        },
    ))
}

/// Where and how to sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Directory holding the versioned files.
    pub source: PathBuf,
    /// Where previous versions are copied; defaults to `source/archive`.
    pub archive: Option<PathBuf>,
    /// Index file inside `source` whose version references are rewritten.
    pub index_file: String,
    /// Directory mirrored with the new versions (e.g. a synced drive).
    pub mirror: Option<PathBuf>,
    /// Report what would happen without touching files.
    pub dry_run: bool,
}

impl SyncOptions {
    /// Options for `source` with every default.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            archive: None,
            index_file: DEFAULT_INDEX_FILE.to_string(),
            mirror: None,
            dry_run: false,
        }
    }

    fn archive_dir(&self) -> PathBuf {
        self.archive
            .clone()
            .unwrap_or_else(|| self.source.join("archive"))
    }
}

/// What a sync did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Highest version found.
    pub from: Version,
    /// Version every file now carries.
    pub to: Version,
    /// `(old name, new name)` pairs, one per stem.
    pub renamed: Vec<(String, String)>,
    /// Older copies of a stem moved into the archive without a successor.
    pub superseded: Vec<String>,
    /// Whether the index file was rewritten.
    pub index_updated: bool,
    /// Files copied to the mirror, when one was configured and exists.
    pub mirrored: Option<usize>,
}

/// Bump every versioned file to the next patch version of the highest
/// version present, archiving the old copies.
///
/// Only the newest file of each stem carries over; older copies of the same
/// stem are moved into the archive.
pub fn sync_knowledge(options: &SyncOptions) -> Result<SyncReport> {
    let names = list_files(&options.source)?;
    let mut stems: BTreeMap<&str, Vec<(Version, &str)>> = BTreeMap::new();
    for name in &names {
        if let Some((stem, version)) = versioned_file(name) {
            stems.entry(stem).or_default().push((version, name.as_str()));
        }
    }
    let Some(from) = stems.values().flatten().map(|(version, _)| *version).max() else {
        return Err(Error::NoVersionedFiles(options.source.clone()));
    };
    let to = from.bump_patch()?;
    info!(%from, %to, stems = stems.len(), "syncing knowledge files");

    let archive = options.archive_dir();
    if !options.dry_run {
        std::fs::create_dir_all(&archive).map_err(|e| Error::write(&archive, e))?;
    }

    let mut renamed = Vec::new();
    let mut superseded = Vec::new();
    for (stem, mut files) in stems {
        files.sort();
        let Some((_, newest)) = files.pop() else {
            continue;
        };
        for (_, older) in files {
            if !options.dry_run {
                let old_path = options.source.join(older);
                let archived = archive.join(older);
                std::fs::rename(&old_path, &archived).map_err(|e| Error::write(&archived, e))?;
            }
            superseded.push(older.to_string());
        }
        let new_name = format!("{stem}_v{to}.md");
        if !options.dry_run {
            let old_path = options.source.join(newest);
            let archived = archive.join(newest);
            std::fs::copy(&old_path, &archived).map_err(|e| Error::write(&archived, e))?;
            let new_path = options.source.join(&new_name);
            std::fs::rename(&old_path, &new_path).map_err(|e| Error::write(&new_path, e))?;
        }
        renamed.push((newest.to_string(), new_name));
    }
    if !superseded.is_empty() {
        debug!(count = superseded.len(), "archived superseded versions");
    }

    let index_path = options.source.join(&options.index_file);
    let index_updated = if index_path.is_file() {
        let content = read_text_lossy(&index_path)?;
        let updated = content
            .replace(&format!("v{from}"), &format!("v{to}"))
            .replace(&format!("Version {from}"), &format!("Version {to}"));
        let changed = updated != content;
        if changed && !options.dry_run {
            std::fs::write(&index_path, updated).map_err(|e| Error::write(&index_path, e))?;
        }
        changed
    } else {
        false
    };

    let mirrored = match &options.mirror {
        Some(mirror) if mirror.is_dir() => Some(mirror_files(options, mirror, &renamed, &index_path)?),
        Some(mirror) => {
            warn!(mirror = %mirror.display(), "mirror directory not found, skipping");
            None
        }
        None => None,
    };

    Ok(SyncReport {
        from,
        to,
        renamed,
        superseded,
        index_updated,
        mirrored,
    })
}

fn mirror_files(
    options: &SyncOptions,
    mirror: &Path,
    renamed: &[(String, String)],
    index_path: &Path,
) -> Result<usize> {
    if options.dry_run {
        return Ok(renamed.len() + usize::from(index_path.is_file()));
    }
    for name in list_files(mirror)? {
        if versioned_file(&name).is_some() || name == options.index_file {
            let stale = mirror.join(&name);
            std::fs::remove_file(&stale).map_err(|e| Error::write(&stale, e))?;
        }
    }
    let mut copied = 0;
    for (_, new_name) in renamed {
        let target = mirror.join(new_name);
        std::fs::copy(options.source.join(new_name), &target).map_err(|e| Error::write(&target, e))?;
        copied += 1;
    }
    if index_path.is_file() {
        let target = mirror.join(&options.index_file);
        std::fs::copy(index_path, &target).map_err(|e| Error::write(&target, e))?;
        copied += 1;
    }
    info!(mirror = %mirror.display(), copied, "mirrored knowledge files");
    Ok(copied)
}

/// Sorted names of the regular files directly inside `dir`.
pub(crate) fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| Error::read(dir, e))? {
        let entry = entry.map_err(|e| Error::read(dir, e))?;
        if entry.path().is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
