//! Snapshot profiles: the per-project knobs that used to be hardcoded.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{read_text_lossy, Error, Result};
use crate::parser::names::normalize_relation_name;

/// A literal text substitution applied to the whole dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    /// Text to find.
    pub from: String,
    /// Replacement text.
    pub to: String,
}

/// A column that must exist even when its table predates the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightColumn {
    /// Table name, optionally schema-qualified.
    pub table: String,
    /// Column name.
    pub column: String,
    /// Column type and modifiers, e.g. `BOOLEAN DEFAULT FALSE`.
    pub data_type: String,
}

/// Project profile controlling snapshot and sanitize runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Title written at the top of generated files.
    #[serde(default)]
    pub title: Option<String>,
    /// Literal substitutions (project references, secret lookups, …).
    #[serde(default)]
    pub replacements: Vec<Replacement>,
    /// Tables whose `INSERT`s are data dumps rather than seed rows.
    #[serde(default)]
    pub bulk_tables: Vec<String>,
    /// When non-empty, only these tables (and their policies, triggers,
    /// indexes, alterations, seed rows) are kept.
    #[serde(default)]
    pub keep_tables: Vec<String>,
    /// When non-empty, only these functions and procedures are kept.
    #[serde(default)]
    pub keep_functions: Vec<String>,
    /// Extensions guaranteed by the snapshot header.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Columns added with `ADD COLUMN IF NOT EXISTS` right after the tables.
    #[serde(default)]
    pub preflight_columns: Vec<PreflightColumn>,
}

impl Profile {
    /// Parse a profile from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| Error::Json {
            what: "profile",
            source,
        })
    }

    /// Load a profile file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&read_text_lossy(path)?)
    }

    /// Whether `relation` is listed in `bulk_tables`.
    pub fn is_bulk_table(&self, relation: &str) -> bool {
        contains_relation(&self.bulk_tables, relation)
    }

    /// Whether a table survives the `keep_tables` whitelist.
    pub fn keeps_table(&self, relation: &str) -> bool {
        self.keep_tables.is_empty() || contains_relation(&self.keep_tables, relation)
    }

    /// Whether a routine survives the `keep_functions` whitelist.
    pub fn keeps_function(&self, relation: &str) -> bool {
        self.keep_functions.is_empty() || contains_relation(&self.keep_functions, relation)
    }
}

fn contains_relation(list: &[String], relation: &str) -> bool {
    let relation = normalize_relation_name(relation);
    list.iter()
        .any(|entry| normalize_relation_name(entry) == relation)
}
