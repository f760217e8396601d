//! Detect migration files that were saved twice under different prefixes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::housekeeping::knowledge::list_files;

/// A date-prefixed migration identical to a timestamp-prefixed sibling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedundantMigration {
    /// File to remove (e.g. `20240101_add_rent.sql`).
    pub file: String,
    /// Identical file that stays (e.g. `20240101120000_add_rent.sql`).
    pub duplicate_of: String,
}

/// Prefix kind of a migration file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    /// Exactly eight digits (`YYYYMMDD`).
    Date,
    /// More than eight digits.
    Timestamp,
    Other,
}

fn split_name(file: &str) -> (Prefix, &str) {
    let Some((prefix, rest)) = file.split_once('_') else {
        return (Prefix::Other, file);
    };
    let kind = match prefix.len() {
        _ if !prefix.bytes().all(|b| b.is_ascii_digit()) => Prefix::Other,
        8 => Prefix::Date,
        len if len > 8 => Prefix::Timestamp,
        _ => Prefix::Other,
    };
    (kind, rest)
}

/// Find date-only-prefixed `.sql` files whose bytes equal a
/// timestamp-prefixed file with the same name after the first `_`.
pub fn find_redundant_migrations(dir: &Path) -> Result<Vec<RedundantMigration>> {
    let mut groups: BTreeMap<&str, Vec<(Prefix, &str)>> = BTreeMap::new();
    let files = list_files(dir)?;
    for file in files.iter().filter(|file| file.ends_with(".sql")) {
        let (prefix, name) = split_name(file);
        groups.entry(name).or_default().push((prefix, file.as_str()));
    }

    let mut redundant = Vec::new();
    for (name, versions) in &groups {
        let timestamped: Vec<&str> = versions
            .iter()
            .filter(|(prefix, _)| *prefix == Prefix::Timestamp)
            .map(|(_, file)| *file)
            .collect();
        if timestamped.is_empty() {
            continue;
        }
        for (_, dated) in versions.iter().filter(|(prefix, _)| *prefix == Prefix::Date) {
            let dated_bytes = read_bytes(&dir.join(dated))?;
            let mut matched = None;
            for candidate in &timestamped {
                if read_bytes(&dir.join(candidate))? == dated_bytes {
                    matched = Some(*candidate);
                    break;
                }
            }
            match matched {
                Some(keep) => redundant.push(RedundantMigration {
                    file: (*dated).to_string(),
                    duplicate_of: keep.to_string(),
                }),
                None => debug!(name, file = dated, "same name but different content, keeping"),
            }
        }
    }
    Ok(redundant)
}

/// Find redundant migrations and, when `apply`, delete them.
pub fn prune_migrations(dir: &Path, apply: bool) -> Result<Vec<RedundantMigration>> {
    let redundant = find_redundant_migrations(dir)?;
    if apply {
        for migration in &redundant {
            let path = dir.join(&migration.file);
            std::fs::remove_file(&path).map_err(|e| Error::write(&path, e))?;
            info!(file = %migration.file, duplicate_of = %migration.duplicate_of, "removed redundant migration");
        }
    }
    Ok(redundant)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::read(path, e))
}
