mod support;

use schemasnap::housekeeping::{prune_migrations, sync_knowledge, SyncOptions};
use schemasnap::Error;

use support::{read, unique_temp_dir};

fn write(path: &std::path::Path, contents: &str) {
    std::fs::write(path, contents).unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
}

#[test]
fn knowledge_files_are_bumped_archived_and_mirrored() {
    let root = unique_temp_dir("schemasnap_knowledge");
    let source = root.join("knowledge");
    let mirror = root.join("mirror");
    std::fs::create_dir_all(&source).expect("should create source");
    std::fs::create_dir_all(&mirror).expect("should create mirror");
    write(&source.join("01_overview_v1.2.3.md"), "overview");
    write(&source.join("02_schema_v1.2.2.md"), "schema");
    write(
        &source.join("README_UPLOAD_GUIDE.md"),
        "Version 1.2.3\nUpload 01_overview_v1.2.3.md first.\n",
    );
    write(&mirror.join("01_overview_v1.2.0.md"), "stale");
    write(&mirror.join("notes.txt"), "keep me");

    let mut options = SyncOptions::new(&source);
    options.mirror = Some(mirror.clone());
    let report = sync_knowledge(&options).expect("sync should succeed");

    assert_eq!(report.from.to_string(), "1.2.3");
    assert_eq!(report.to.to_string(), "1.2.4");
    assert!(report.index_updated);
    assert_eq!(report.mirrored, Some(3));

    assert_eq!(read(&source.join("01_overview_v1.2.4.md")), "overview");
    assert_eq!(read(&source.join("02_schema_v1.2.4.md")), "schema");
    assert!(!source.join("01_overview_v1.2.3.md").exists());
    assert_eq!(read(&source.join("archive/02_schema_v1.2.2.md")), "schema");
    assert_eq!(
        read(&source.join("README_UPLOAD_GUIDE.md")),
        "Version 1.2.4\nUpload 01_overview_v1.2.4.md first.\n"
    );

    assert!(!mirror.join("01_overview_v1.2.0.md").exists());
    assert!(mirror.join("02_schema_v1.2.4.md").exists());
    assert_eq!(read(&mirror.join("notes.txt")), "keep me");
}

#[test]
fn dry_run_sync_touches_nothing() {
    let source = unique_temp_dir("schemasnap_knowledge_dry");
    write(&source.join("guide_v0.9.9.md"), "guide");

    let mut options = SyncOptions::new(&source);
    options.dry_run = true;
    let report = sync_knowledge(&options).expect("dry run should succeed");

    assert_eq!(
        report.renamed,
        vec![("guide_v0.9.9.md".to_string(), "guide_v0.9.10.md".to_string())]
    );
    assert!(source.join("guide_v0.9.9.md").exists());
    assert!(!source.join("archive").exists());
}

#[test]
fn only_the_newest_copy_of_a_stem_carries_over() {
    let source = unique_temp_dir("schemasnap_knowledge_stems");
    write(&source.join("guide_v1.0.9.md"), "old nine");
    write(&source.join("guide_v1.0.10.md"), "new ten");
    write(&source.join("schema_v1.0.2.md"), "schema");

    let report = sync_knowledge(&SyncOptions::new(&source)).expect("sync should succeed");

    assert_eq!(report.to.to_string(), "1.0.11");
    assert_eq!(
        report.renamed,
        vec![
            ("guide_v1.0.10.md".to_string(), "guide_v1.0.11.md".to_string()),
            ("schema_v1.0.2.md".to_string(), "schema_v1.0.11.md".to_string()),
        ]
    );
    assert_eq!(report.superseded, vec!["guide_v1.0.9.md".to_string()]);
    assert_eq!(read(&source.join("guide_v1.0.11.md")), "new ten");
    assert!(!source.join("guide_v1.0.9.md").exists());
    assert!(!source.join("guide_v1.0.10.md").exists());
    assert_eq!(read(&source.join("archive/guide_v1.0.9.md")), "old nine");
    assert_eq!(read(&source.join("archive/guide_v1.0.10.md")), "new ten");
}

#[test]
fn sync_without_versioned_files_is_an_error() {
    let source = unique_temp_dir("schemasnap_knowledge_empty");
    write(&source.join("notes.md"), "nothing versioned");

    let err = sync_knowledge(&SyncOptions::new(&source)).expect_err("should fail");
    assert!(matches!(err, Error::NoVersionedFiles(_)));
}

#[test]
fn identical_date_prefixed_migrations_are_pruned() {
    let dir = unique_temp_dir("schemasnap_migrations");
    write(&dir.join("20240105_add_rent.sql"), "ALTER TABLE units ADD COLUMN rent numeric;\n");
    write(&dir.join("20240105093000_add_rent.sql"), "ALTER TABLE units ADD COLUMN rent numeric;\n");
    write(&dir.join("20240106_add_notes.sql"), "ALTER TABLE units ADD COLUMN notes text;\n");
    write(&dir.join("20240106101500_add_notes.sql"), "ALTER TABLE units ADD COLUMN notes text NOT NULL;\n");

    let listed = prune_migrations(&dir, false).expect("listing should succeed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].file, "20240105_add_rent.sql");
    assert_eq!(listed[0].duplicate_of, "20240105093000_add_rent.sql");
    assert!(dir.join("20240105_add_rent.sql").exists());

    let removed = prune_migrations(&dir, true).expect("pruning should succeed");
    assert_eq!(removed, listed);
    assert!(!dir.join("20240105_add_rent.sql").exists());
    assert!(dir.join("20240105093000_add_rent.sql").exists());
    assert!(dir.join("20240106_add_notes.sql").exists());
}
