mod support;

use schemasnap::output::formatter;
use schemasnap::output::report::build_report;
use schemasnap::snapshot::catalog::{Section, SkipReason};
use schemasnap::snapshot::{build_snapshot, SnapshotOptions};
use schemasnap::Profile;

use support::{load_fixture_profile, read, read_fixture_sql, unique_temp_dir};

fn rentmate_snapshot() -> schemasnap::snapshot::Snapshot {
    build_snapshot(
        &read_fixture_sql("rentmate_dump"),
        &load_fixture_profile("rentmate_dump"),
        &SnapshotOptions::default(),
    )
}

#[test]
fn last_definition_of_each_object_wins() {
    let snapshot = rentmate_snapshot();
    let schema = &snapshot.schema;

    assert_eq!(
        schema.matches("CREATE TABLE IF NOT EXISTS public.units").count(),
        1,
        "units should be emitted once, got:\n{schema}"
    );
    assert!(schema.contains("monthly_rent numeric(10,2)"));
    assert!(schema.contains("p.owner_id = (select auth.uid())"));
    assert!(!schema.contains("WHERE id = p_property AND owner_id"));
    assert_eq!(schema.matches("CREATE POLICY").count(), 1);
    assert!(schema.contains("USING (public.is_owner(id))"));
    assert_eq!(snapshot.report.stats.replaced, 3);
}

#[test]
fn dropped_tables_take_their_indexes_with_them() {
    let snapshot = rentmate_snapshot();
    assert!(
        !snapshot.schema.contains("legacy_notes"),
        "dropped table and its index should disappear, got:\n{}",
        snapshot.schema
    );
    assert_eq!(snapshot.report.stats.removed_by_drop, 2);
    assert!(!snapshot.report.sections.contains_key(&Section::Indexes));
}

#[test]
fn every_statement_is_guarded() {
    let schema = rentmate_snapshot().schema;

    assert!(schema.contains("CREATE EXTENSION IF NOT EXISTS pgcrypto;"));
    assert!(schema.contains("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\";"));
    assert!(schema.contains("DO $guard$ BEGIN\nCREATE TYPE public.lease_status"));
    assert!(schema.contains("EXCEPTION WHEN duplicate_object THEN NULL;"));
    assert!(schema.contains("DROP FUNCTION IF EXISTS public.is_owner(uuid) CASCADE;\nCREATE OR REPLACE FUNCTION public.is_owner"));
    assert!(schema.contains(
        "DROP POLICY IF EXISTS \"Owners manage properties\" ON public.properties;\nCREATE POLICY"
    ));
    assert!(schema.contains(
        "ALTER TABLE IF EXISTS public.units ADD COLUMN IF NOT EXISTS archived_at timestamptz;"
    ));
}

#[test]
fn transaction_control_and_data_fixes_are_skipped() {
    let snapshot = rentmate_snapshot();
    let skipped = &snapshot.report.stats.skipped;

    assert_eq!(skipped.get(&SkipReason::Session), Some(&2));
    assert_eq!(skipped.get(&SkipReason::DataFix), Some(&1));
    assert_eq!(skipped.get(&SkipReason::BulkData), Some(&1));
    assert!(!snapshot.schema.contains("\nBEGIN;"));
    assert!(!snapshot.schema.contains("COMMIT"));
    assert!(!snapshot.schema.contains("UPDATE public.properties"));
}

#[test]
fn seed_file_holds_reference_rows_only() {
    let snapshot = rentmate_snapshot();
    let seed = snapshot.seed.expect("seed should be split by default");

    assert!(seed.starts_with("-- RentMate\n"));
    assert!(seed.contains(
        "INSERT INTO public.plans (code, label) VALUES ('basic', 'Basic') ON CONFLICT DO NOTHING;"
    ));
    assert!(!seed.contains("audit_log"));
    assert!(!snapshot.schema.contains("INSERT INTO"));
}

#[test]
fn narrative_lines_survive_as_comments() {
    let snapshot = rentmate_snapshot();
    assert_eq!(snapshot.report.stats.stray_lines, 1);
    assert!(snapshot
        .schema
        .contains("-- [stray] Adds rent tracking to units; see ticket in the tracker"));

    let stripped = build_snapshot(
        &read_fixture_sql("rentmate_dump"),
        &load_fixture_profile("rentmate_dump"),
        &SnapshotOptions {
            keep_comments: false,
            ..SnapshotOptions::default()
        },
    );
    assert!(!stripped.schema.contains("[stray]"));
    assert!(!stripped.schema.contains("20240201000000_units_rent.sql"));
}

#[test]
fn snapshot_of_a_snapshot_is_stable() {
    let first = rentmate_snapshot();
    let second = build_snapshot(&first.schema, &Profile::default(), &SnapshotOptions::default());

    assert_eq!(second.report.stats.replaced, 0);
    assert_eq!(
        second.schema.matches("CREATE TABLE IF NOT EXISTS").count(),
        first.schema.matches("CREATE TABLE IF NOT EXISTS").count()
    );
}

#[test]
fn written_files_match_in_memory_snapshot() {
    let snapshot = rentmate_snapshot();
    let out_dir = unique_temp_dir("schemasnap_snapshot");

    let written = formatter::write_snapshot(&out_dir, "rentmate", &snapshot)
        .expect("snapshot should be written");

    assert_eq!(written.len(), 3);
    assert_eq!(read(&out_dir.join("rentmate_schema.sql")), snapshot.schema);
    assert_eq!(
        Some(read(&out_dir.join("rentmate_seed.sql"))),
        snapshot.seed
    );
    let report = read(&out_dir.join("rentmate_report.md"));
    assert_eq!(report, build_report(&snapshot.report));
    assert!(report.contains("| Tables | 2 |"));
    assert!(report.contains("- Removed by DROP: 2"));
    assert!(report.contains("- bulk data inserts: 1"));
}
