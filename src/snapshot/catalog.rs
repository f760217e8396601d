//! Replays a dump statement by statement, keeping the last definition of
//! every named object.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::config::Profile;
use crate::parser::classify::{DropStatement, ObjectType, SqlObject};
use crate::parser::statement::Statement;

/// Output sections, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// `CREATE EXTENSION`
    Extensions,
    /// `CREATE SCHEMA`
    Schemas,
    /// Types, enums, and domains.
    Types,
    /// `CREATE TABLE`
    Tables,
    /// `ALTER TABLE`, `ALTER TYPE`, and `DO` blocks.
    Alterations,
    /// Functions and procedures.
    Functions,
    /// Views and materialized views.
    Views,
    /// Indexes.
    Indexes,
    /// Row-level security policies.
    Policies,
    /// Triggers.
    Triggers,
    /// Grants, comments, scheduled jobs, and other statements.
    Other,
    /// Reference-data `INSERT`s.
    Seed,
}

impl Section {
    /// Every section, in emission order.
    pub const ALL: [Section; 12] = [
        Section::Extensions,
        Section::Schemas,
        Section::Types,
        Section::Tables,
        Section::Alterations,
        Section::Functions,
        Section::Views,
        Section::Indexes,
        Section::Policies,
        Section::Triggers,
        Section::Other,
        Section::Seed,
    ];

    /// Heading used in generated files and reports.
    pub fn title(self) -> &'static str {
        match self {
            Section::Extensions => "Extensions",
            Section::Schemas => "Schemas",
            Section::Types => "Types",
            Section::Tables => "Tables",
            Section::Alterations => "Alterations",
            Section::Functions => "Functions",
            Section::Views => "Views",
            Section::Indexes => "Indexes",
            Section::Policies => "Policies",
            Section::Triggers => "Triggers",
            Section::Other => "Other",
            Section::Seed => "Seed data",
        }
    }

    fn of(object: &SqlObject) -> Section {
        match object {
            SqlObject::Extension { .. } => Section::Extensions,
            SqlObject::Schema { .. } => Section::Schemas,
            SqlObject::Type { .. } => Section::Types,
            SqlObject::Table { .. } => Section::Tables,
            SqlObject::AlterTable { .. } | SqlObject::AlterType { .. } | SqlObject::Block => {
                Section::Alterations
            }
            SqlObject::Routine { .. } => Section::Functions,
            SqlObject::View { .. } => Section::Views,
            SqlObject::Index { .. } => Section::Indexes,
            SqlObject::Policy { .. } => Section::Policies,
            SqlObject::Trigger { .. } => Section::Triggers,
            SqlObject::Insert { .. } => Section::Seed,
            _ => Section::Other,
        }
    }
}

/// Why a statement was left out of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Session or transaction control.
    Session,
    /// `UPDATE`, `DELETE`, `TRUNCATE`, or `COPY`.
    DataFix,
    /// `INSERT` into a bulk table.
    BulkData,
    /// Comments with no statement.
    CommentOnly,
    /// Outside the profile's table or function whitelist.
    Filtered,
    /// A `DROP` whose target was never defined.
    DropWithoutTarget,
}

impl SkipReason {
    /// Human-readable label for reports.
    pub fn label(self) -> &'static str {
        match self {
            SkipReason::Session => "session control",
            SkipReason::DataFix => "one-off data fixes",
            SkipReason::BulkData => "bulk data inserts",
            SkipReason::CommentOnly => "comment-only chunks",
            SkipReason::Filtered => "filtered by whitelist",
            SkipReason::DropWithoutTarget => "drops of undefined objects",
        }
    }
}

/// A surviving statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Identity the entry is stored under.
    pub key: String,
    /// Output section.
    pub section: Section,
    /// `table:…` key of the owning table, for cascade on `DROP TABLE`.
    pub owner: Option<String>,
    /// The statement itself.
    pub statement: Statement,
}

/// Replay counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    /// Statements seen.
    pub statements: usize,
    /// Named objects redefined later in the dump.
    pub replaced: usize,
    /// Unnamed statements repeated verbatim.
    pub duplicate_text: usize,
    /// Entries removed by `DROP` (cascades included).
    pub removed_by_drop: usize,
    /// Statements skipped, by reason.
    pub skipped: BTreeMap<SkipReason, usize>,
    /// Narrative lines commented out.
    pub stray_lines: usize,
    /// Statements the tokenizer could not classify.
    pub parse_fallbacks: usize,
}

/// Ordered set of object definitions.
///
/// Redefining an object keeps its first position so dependents defined in
/// between still come after it.
#[derive(Debug)]
pub struct Catalog<'p> {
    profile: &'p Profile,
    slots: Vec<Option<CatalogEntry>>,
    index: HashMap<String, usize>,
    stats: CatalogStats,
}

impl<'p> Catalog<'p> {
    /// Empty catalog filtered by `profile`.
    pub fn new(profile: &'p Profile) -> Self {
        Self {
            profile,
            slots: Vec::new(),
            index: HashMap::new(),
            stats: CatalogStats::default(),
        }
    }

    /// Replay one statement.
    pub fn apply(&mut self, statement: Statement) {
        self.stats.statements += 1;
        self.stats.stray_lines += statement.stray_lines;
        if !statement.classified {
            self.stats.parse_fallbacks += 1;
        }

        if statement.is_comment_only() {
            return self.skip(SkipReason::CommentOnly);
        }
        match &statement.object {
            SqlObject::Session => return self.skip(SkipReason::Session),
            SqlObject::DataFix { .. } => return self.skip(SkipReason::DataFix),
            SqlObject::Drop(drop) => return self.apply_drop(drop),
            SqlObject::Insert { table } if self.profile.is_bulk_table(&table.relation()) => {
                return self.skip(SkipReason::BulkData)
            }
            _ => {}
        }
        if !self.passes_whitelist(&statement.object) {
            return self.skip(SkipReason::Filtered);
        }

        let named = statement.object.key();
        let key = named
            .clone()
            .unwrap_or_else(|| format!("text:{}", collapse_whitespace(&statement.body)));
        let entry = CatalogEntry {
            key: key.clone(),
            section: Section::of(&statement.object),
            owner: statement.object.owner_table(),
            statement,
        };

        match self.index.get(&key) {
            Some(&slot) if named.is_some() => {
                debug!(key = %key, "redefinition replaces earlier statement");
                self.stats.replaced += 1;
                self.slots[slot] = Some(entry);
            }
            Some(_) => self.stats.duplicate_text += 1,
            None => {
                self.index.insert(key, self.slots.len());
                self.slots.push(Some(entry));
            }
        }
    }

    /// Surviving entries of `section`, in catalog order.
    pub fn section(&self, section: Section) -> impl Iterator<Item = &CatalogEntry> {
        self.entries().filter(move |entry| entry.section == section)
    }

    /// All surviving entries, in catalog order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.slots.iter().flatten()
    }

    /// Whether an entry is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Number of surviving entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// `true` when nothing survived.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Replay counters so far.
    pub fn stats(&self) -> &CatalogStats {
        &self.stats
    }

    fn skip(&mut self, reason: SkipReason) {
        *self.stats.skipped.entry(reason).or_default() += 1;
    }

    fn passes_whitelist(&self, object: &SqlObject) -> bool {
        match object {
            SqlObject::Routine { name, .. } => self.profile.keeps_function(&name.relation()),
            _ => object
                .target_relation()
                .is_none_or(|relation| self.profile.keeps_table(&relation)),
        }
    }

    fn apply_drop(&mut self, drop: &DropStatement) {
        let mut removed = 0;
        for key in drop.keys() {
            if key.ends_with('(') {
                let overloads: Vec<String> = self
                    .index
                    .keys()
                    .filter(|candidate| candidate.starts_with(&key))
                    .cloned()
                    .collect();
                for overload in overloads {
                    removed += self.remove(&overload);
                }
            } else {
                removed += self.remove(&key);
            }
            if drop.object_type == ObjectType::Table {
                removed += self.remove_owned_by(&key);
            }
        }
        if removed == 0 {
            self.skip(SkipReason::DropWithoutTarget);
        } else {
            self.stats.removed_by_drop += removed;
        }
    }

    fn remove(&mut self, key: &str) -> usize {
        match self.index.remove(key) {
            Some(slot) => {
                self.slots[slot] = None;
                1
            }
            None => 0,
        }
    }

    fn remove_owned_by(&mut self, table_key: &str) -> usize {
        let mut removed = 0;
        for slot in &mut self.slots {
            if slot
                .as_ref()
                .is_some_and(|entry| entry.owner.as_deref() == Some(table_key))
            {
                if let Some(entry) = slot.take() {
                    self.index.remove(&entry.key);
                    removed += 1;
                }
            }
        }
        removed
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
