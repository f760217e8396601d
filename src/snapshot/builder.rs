use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Profile;
use crate::parser::classify::SqlObject;
use crate::parser::names::{quote_identifier, ObjectName};
use crate::parser::normalize::normalize_dump;
use crate::parser::statement::{parse_normalized, Statement};
use crate::parser::verify::{verify_statements, ParseIssue};
use crate::snapshot::catalog::{Catalog, CatalogStats, Section};
use crate::snapshot::guards::{guard_statement, GuardOptions};
use crate::snapshot::rewrite::apply_replacements;

const SESSION_HEADER: &str = "SET check_function_bodies = false;";

/// Knobs for [`build_snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Emit seed `INSERT`s as a separate file.
    pub split_seed: bool,
    /// Keep comments that precede each statement.
    pub keep_comments: bool,
    /// Drop routines before recreating them.
    pub drop_routines: bool,
    /// Re-parse surviving statements with sqlparser and report rejects.
    pub verify: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            split_seed: true,
            keep_comments: true,
            drop_routines: true,
            verify: false,
        }
    }
}

/// What a snapshot run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotReport {
    /// Title from the profile.
    pub title: Option<String>,
    /// Statements emitted per section.
    pub sections: BTreeMap<Section, usize>,
    /// Replay counters.
    pub stats: CatalogStats,
    /// Literal replacements made before splitting.
    pub replacements: usize,
    /// Statements sqlparser rejected (only with `verify`).
    pub issues: Vec<ParseIssue>,
}

impl SnapshotReport {
    /// Statements emitted across all sections.
    pub fn total_emitted(&self) -> usize {
        self.sections.values().sum()
    }
}

/// Result of [`build_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Idempotent schema script.
    pub schema: String,
    /// Seed script, when split.
    pub seed: Option<String>,
    /// Run summary.
    pub report: SnapshotReport,
}

/// Collapse a migration dump into an idempotent snapshot.
///
/// Only the last definition of each named object survives; dropped objects
/// and their dependents disappear. Statements are emitted grouped by
/// [`Section`] and guarded with [`guard_statement`].
pub fn build_snapshot(sql: &str, profile: &Profile, options: &SnapshotOptions) -> Snapshot {
    let (text, replacements) = apply_replacements(&normalize_dump(sql), &profile.replacements);
    let statements = parse_normalized(&text);
    info!(statements = statements.len(), replacements, "parsed dump");

    let mut catalog = Catalog::new(profile);
    for statement in statements {
        catalog.apply(statement);
    }

    let guard = GuardOptions {
        drop_routines: options.drop_routines,
    };
    let mut report = SnapshotReport {
        title: profile.title.clone(),
        stats: catalog.stats().clone(),
        replacements,
        ..SnapshotReport::default()
    };

    let mut schema = header(profile, "Idempotent schema snapshot");
    schema.push_str(SESSION_HEADER);
    schema.push('\n');

    for section in Section::ALL {
        if section == Section::Seed {
            continue;
        }
        let mut rendered: Vec<String> = catalog
            .section(section)
            .map(|entry| {
                entry
                    .statement
                    .render(&guard_statement(&entry.statement, &guard), options.keep_comments)
            })
            .collect();
        if section == Section::Extensions {
            rendered.extend(missing_extensions(profile, &catalog));
        }
        push_section(&mut schema, &mut report, section, section.title(), &rendered);

        if section == Section::Tables {
            let preflight = preflight_columns(profile);
            if !preflight.is_empty() {
                push_block(&mut schema, "Pre-flight columns", &preflight);
                debug!(columns = preflight.len(), "emitted pre-flight columns");
            }
        }
    }

    let seed_rows: Vec<String> = catalog
        .section(Section::Seed)
        .map(|entry| {
            entry
                .statement
                .render(&guard_statement(&entry.statement, &guard), options.keep_comments)
        })
        .collect();
    let seed = if options.split_seed {
        let mut seed = header(profile, "Seed data");
        for row in &seed_rows {
            seed.push('\n');
            seed.push_str(row);
            seed.push('\n');
        }
        *report.sections.entry(Section::Seed).or_default() += seed_rows.len();
        Some(seed)
    } else {
        push_section(&mut schema, &mut report, Section::Seed, Section::Seed.title(), &seed_rows);
        None
    };

    if options.verify {
        let survivors: Vec<Statement> = catalog
            .entries()
            .map(|entry| entry.statement.clone())
            .collect();
        report.issues = verify_statements(&survivors);
        if !report.issues.is_empty() {
            warn!(issues = report.issues.len(), "sqlparser rejected some statements");
        }
    }

    info!(
        emitted = report.total_emitted(),
        replaced = report.stats.replaced,
        removed = report.stats.removed_by_drop,
        "snapshot built"
    );
    Snapshot {
        schema,
        seed,
        report,
    }
}

fn header(profile: &Profile, what: &str) -> String {
    let mut out = String::new();
    if let Some(title) = &profile.title {
        out.push_str(&format!("-- {title}\n"));
    }
    out.push_str(&format!("-- {what} generated by schemasnap. Safe to run repeatedly.\n\n"));
    out
}

fn push_section(
    out: &mut String,
    report: &mut SnapshotReport,
    section: Section,
    title: &str,
    rendered: &[String],
) {
    if rendered.is_empty() {
        return;
    }
    *report.sections.entry(section).or_default() += rendered.len();
    push_block(out, title, rendered);
}

fn push_block(out: &mut String, title: &str, rendered: &[String]) {
    out.push_str(&format!("\n-- ==== {title} ====\n"));
    for statement in rendered {
        out.push('\n');
        out.push_str(statement);
        out.push('\n');
    }
}

fn missing_extensions(profile: &Profile, catalog: &Catalog<'_>) -> Vec<String> {
    profile
        .extensions
        .iter()
        .filter(|name| {
            let key = format!("extension:{}", ObjectName::parse(name).relation());
            !catalog.contains(&key)
        })
        .map(|name| {
            format!(
                "CREATE EXTENSION IF NOT EXISTS {};",
                quote_identifier(&ObjectName::parse(name).relation())
            )
        })
        .collect()
}

fn preflight_columns(profile: &Profile) -> Vec<String> {
    profile
        .preflight_columns
        .iter()
        .map(|column| {
            format!(
                "ALTER TABLE IF EXISTS {} ADD COLUMN IF NOT EXISTS {} {};",
                ObjectName::parse(&column.table).to_sql(),
                column.column,
                column.data_type
            )
        })
        .collect()
}

/// What a sanitize run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeReport {
    /// Statements seen.
    pub statements: usize,
    /// Statements whose text a guard changed.
    pub guarded: usize,
    /// Narrative lines commented out.
    pub stray_lines: usize,
    /// Literal replacements made.
    pub replacements: usize,
    /// Existing `DROP`s folded into a guard of the next statement.
    pub merged_drops: usize,
    /// Statements the tokenizer could not classify.
    pub parse_fallbacks: usize,
}

/// Result of [`sanitize_dump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// Rewritten script.
    pub sql: String,
    /// Run summary.
    pub report: SanitizeReport,
}

/// Make a dump re-runnable in place: same statements, same order, each one
/// guarded, narrative lines commented out.
///
/// Running it on its own output changes nothing.
pub fn sanitize_dump(sql: &str, profile: &Profile, guard: &GuardOptions) -> Sanitized {
    let (text, replacements) = apply_replacements(&normalize_dump(sql), &profile.replacements);
    let statements = parse_normalized(&text);
    let mut report = SanitizeReport {
        statements: statements.len(),
        replacements,
        ..SanitizeReport::default()
    };

    let has_session_header = statements.iter().any(|statement| {
        matches!(statement.object, SqlObject::Session)
            && statement
                .body
                .to_ascii_lowercase()
                .contains("check_function_bodies")
    });

    let mut emitted: Vec<Emitted> = Vec::with_capacity(statements.len());
    for statement in statements {
        report.stray_lines += statement.stray_lines;
        if !statement.classified {
            report.parse_fallbacks += 1;
        }

        let guarded = guard_statement(&statement, guard);
        if guarded != statement.body {
            report.guarded += 1;
        }

        let mut leading = Vec::new();
        if let Some(key) = guard_drop_key(&statement, guard) {
            // A drop emitted by an earlier sanitize pass: the guard re-creates it.
            // Multi-target and overload-wide drops remove more than the guard does.
            if emitted
                .last()
                .is_some_and(|last| last.drop_key.as_deref() == Some(key.as_str()))
            {
                if let Some(previous) = emitted.pop() {
                    leading = previous.leading;
                }
                report.merged_drops += 1;
            }
        }
        leading.extend(statement.leading.iter().cloned());

        let drop_key = match &statement.object {
            SqlObject::Drop(drop) if drop.targets.len() == 1 => drop.keys().pop(),
            _ => None,
        };
        let rendered = Statement {
            leading: leading.clone(),
            ..statement
        }
        .render(&guarded, true);
        emitted.push(Emitted {
            drop_key,
            leading,
            rendered,
        });
    }

    let mut out = String::new();
    if !has_session_header {
        out.push_str(SESSION_HEADER);
        out.push_str("\n\n");
    }
    out.push_str(
        &emitted
            .into_iter()
            .map(|emitted| emitted.rendered)
            .collect::<Vec<_>>()
            .join("\n\n"),
    );
    out.push('\n');

    info!(
        statements = report.statements,
        guarded = report.guarded,
        stray = report.stray_lines,
        "sanitized dump"
    );
    Sanitized { sql: out, report }
}

struct Emitted {
    drop_key: Option<String>,
    leading: Vec<String>,
    rendered: String,
}

/// Key of the object a guard drops before recreating, if any.
fn guard_drop_key(statement: &Statement, guard: &GuardOptions) -> Option<String> {
    match &statement.object {
        SqlObject::Policy { .. } | SqlObject::Trigger { .. } => statement.object.key(),
        SqlObject::Routine { .. } if guard.drop_routines => statement.object.key(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
CREATE EXTENSION IF NOT EXISTS pgcrypto;
CREATE TABLE units (id uuid PRIMARY KEY);
CREATE POLICY \"Owners read\" ON units USING (true);
INSERT INTO plans (id) VALUES (1);
CREATE TABLE units (id uuid PRIMARY KEY, rent numeric);
CREATE FUNCTION touch() RETURNS trigger LANGUAGE plpgsql AS $$ BEGIN RETURN NEW; END $$;
";

    #[test]
    fn schema_lists_sections_in_dependency_order() {
        let snapshot = build_snapshot(DUMP, &Profile::default(), &SnapshotOptions::default());
        let schema = &snapshot.schema;
        let tables = schema.find("-- ==== Tables ====").expect("tables section");
        let functions = schema.find("-- ==== Functions ====").expect("functions section");
        let policies = schema.find("-- ==== Policies ====").expect("policies section");
        assert!(schema.find("-- ==== Extensions ====").expect("extensions") < tables);
        assert!(tables < functions && functions < policies);
        assert!(schema.contains("CREATE TABLE IF NOT EXISTS units (id uuid PRIMARY KEY, rent numeric);"));
        assert_eq!(schema.matches("CREATE TABLE").count(), 1);
        assert!(schema.starts_with("-- Idempotent schema snapshot"));
        assert!(schema.contains(SESSION_HEADER));
    }

    #[test]
    fn seed_is_split_unless_disabled() {
        let split = build_snapshot(DUMP, &Profile::default(), &SnapshotOptions::default());
        let seed = split.seed.expect("seed file");
        assert!(seed.contains("INSERT INTO plans (id) VALUES (1) ON CONFLICT DO NOTHING;"));
        assert!(!split.schema.contains("INSERT INTO"));

        let inline = build_snapshot(
            DUMP,
            &Profile::default(),
            &SnapshotOptions {
                split_seed: false,
                ..SnapshotOptions::default()
            },
        );
        assert!(inline.seed.is_none());
        assert!(inline.schema.contains("-- ==== Seed data ===="));
        assert_eq!(inline.report.sections.get(&Section::Seed), Some(&1));
    }

    #[test]
    fn profile_extensions_and_preflight_columns_are_emitted() {
        let profile = Profile::from_json(
            r#"{
                "title": "RentMate",
                "extensions": ["pgcrypto", "uuid-ossp"],
                "preflight_columns": [
                    {"table": "public.units", "column": "archived", "data_type": "boolean DEFAULT false"}
                ]
            }"#,
        )
        .expect("profile");
        let snapshot = build_snapshot(DUMP, &profile, &SnapshotOptions::default());
        assert!(snapshot.schema.starts_with("-- RentMate\n"));
        assert!(snapshot.schema.contains("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\";"));
        assert_eq!(snapshot.schema.matches("pgcrypto").count(), 1);
        let preflight = snapshot
            .schema
            .find("ALTER TABLE IF EXISTS public.units ADD COLUMN IF NOT EXISTS archived boolean DEFAULT false;")
            .expect("preflight column");
        assert!(snapshot.schema.find("-- ==== Tables ====").expect("tables") < preflight);
    }

    #[test]
    fn replacements_are_counted_in_report() {
        let profile = Profile::from_json(
            r#"{"replacements": [{"from": "units", "to": "rental_units"}]}"#,
        )
        .expect("profile");
        let snapshot = build_snapshot(DUMP, &profile, &SnapshotOptions::default());
        assert_eq!(snapshot.report.replacements, 3);
        assert!(snapshot.schema.contains("rental_units"));
    }

    #[test]
    fn sanitize_keeps_order_and_is_idempotent() {
        let guard = GuardOptions {
            drop_routines: true,
        };
        let first = sanitize_dump(DUMP, &Profile::default(), &guard);
        assert!(first.sql.starts_with(SESSION_HEADER));
        assert_eq!(first.sql.matches("CREATE TABLE IF NOT EXISTS units").count(), 2);
        assert!(first.sql.contains("DROP POLICY IF EXISTS \"Owners read\" ON units;"));
        assert!(first.sql.contains("DROP FUNCTION IF EXISTS touch() CASCADE;"));
        assert_eq!(first.report.statements, 6);

        let second = sanitize_dump(&first.sql, &Profile::default(), &guard);
        assert_eq!(second.sql, first.sql);
        assert_eq!(second.report.merged_drops, 2);
    }

    #[test]
    fn sanitize_comments_out_narrative() {
        let sanitized = sanitize_dump(
            "CREATE TABLE a (id int);\nThis adds the owner's column\nALTER TABLE a ADD COLUMN b int;\n",
            &Profile::default(),
            &GuardOptions::default(),
        );
        assert_eq!(sanitized.report.stray_lines, 1);
        assert!(sanitized.sql.contains("-- [stray] This adds the owner's column\nALTER TABLE a ADD COLUMN IF NOT EXISTS b int;"));
    }

    #[test]
    fn sanitize_keeps_drops_naming_more_than_the_guard() {
        let guard = GuardOptions {
            drop_routines: true,
        };
        let multi = sanitize_dump(
            "DROP FUNCTION IF EXISTS a(), b();\nCREATE FUNCTION a() RETURNS int LANGUAGE sql AS $$ SELECT 1 $$;\n",
            &Profile::default(),
            &guard,
        );
        assert_eq!(multi.report.merged_drops, 0);
        assert!(multi.sql.contains("DROP FUNCTION IF EXISTS a(), b();"));
        assert!(multi.sql.contains("DROP FUNCTION IF EXISTS a() CASCADE;\nCREATE OR REPLACE FUNCTION a()"));
        assert_eq!(sanitize_dump(&multi.sql, &Profile::default(), &guard).sql, multi.sql);

        let overloads = sanitize_dump(
            "DROP FUNCTION IF EXISTS f;\nCREATE FUNCTION f(a int) RETURNS int LANGUAGE sql AS $$ SELECT a $$;\n",
            &Profile::default(),
            &guard,
        );
        assert_eq!(overloads.report.merged_drops, 0);
        assert!(overloads.sql.contains("DROP FUNCTION IF EXISTS f;"));
        assert!(overloads.sql.contains("DROP FUNCTION IF EXISTS f(int) CASCADE;"));
        assert_eq!(sanitize_dump(&overloads.sql, &Profile::default(), &guard).sql, overloads.sql);
    }
}
