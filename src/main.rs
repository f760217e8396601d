//! CLI entry point for `schemasnap`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use schemasnap::assets::{self, Palette, Thresholds};
use schemasnap::error::read_text_lossy;
use schemasnap::housekeeping::{self, SyncOptions};
use schemasnap::output::formatter;
use schemasnap::parser::statement::parse_statements;
use schemasnap::parser::verify::verify_statements;
use schemasnap::patch::{self, PatchOutcome, PatchSet};
use schemasnap::snapshot::{self, GuardOptions, SnapshotOptions};
use schemasnap::{Profile, Result};

#[derive(Parser)]
#[command(
    name = "schemasnap",
    version,
    about = "Collapse PostgreSQL migration dumps into idempotent snapshots, plus the chores around them"
)]
struct Cli {
    /// Print debug diagnostics (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a deduplicated, idempotent schema snapshot (plus seed file) from dumps
    Snapshot(SnapshotArgs),
    /// Guard every statement of a dump in place, keeping order and duplicates
    Sanitize(SanitizeArgs),
    /// List the statements of a dump as schemasnap classifies them
    Inspect(InspectArgs),
    /// Copy rows of the given tables from one database to another (upsert)
    #[cfg(feature = "db")]
    Copy(CopyArgs),
    /// Show the columns and primary key of a table
    #[cfg(feature = "db")]
    Describe(DescribeArgs),
    /// Run a SQL file against a database in one transaction
    #[cfg(feature = "db")]
    ApplySql(ApplySqlArgs),
    /// Logo and icon utilities
    #[command(subcommand)]
    Image(ImageCommand),
    /// Apply a JSON patch set to source files
    Patch(PatchArgs),
    /// Bump, archive, and mirror versioned knowledge-base files
    KnowledgeSync(KnowledgeSyncArgs),
    /// Remove date-prefixed migrations duplicated by timestamped ones
    PruneMigrations(PruneArgs),
}

#[derive(Args)]
struct InputArgs {
    /// Input SQL files, concatenated in order
    #[arg(required_unless_present = "schema_dir")]
    input: Vec<PathBuf>,

    /// Also read every .sql file in this directory (sorted by name)
    #[arg(long)]
    schema_dir: Option<PathBuf>,

    /// Profile JSON (replacements, whitelists, bulk tables, …)
    #[arg(long)]
    profile: Option<PathBuf>,
}

#[derive(Args)]
struct SnapshotArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Output directory
    #[arg(long, default_value = "schemasnap-output")]
    output_dir: PathBuf,

    /// Base name of output files (defaults to the first input's stem)
    #[arg(long)]
    name: Option<String>,

    /// Append seed INSERTs to the schema instead of a separate file
    #[arg(long)]
    inline_seed: bool,

    /// Drop comments preceding statements
    #[arg(long)]
    strip_comments: bool,

    /// Do not emit DROP FUNCTION before recreating routines
    #[arg(long)]
    keep_routines: bool,

    /// Re-parse surviving statements with sqlparser and report rejects
    #[arg(long)]
    verify: bool,
}

#[derive(Args)]
struct SanitizeArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Output directory
    #[arg(long, default_value = "schemasnap-output")]
    output_dir: PathBuf,

    /// Base name of output files (defaults to the first input's stem)
    #[arg(long)]
    name: Option<String>,

    /// Emit DROP FUNCTION before each routine
    #[arg(long)]
    drop_functions: bool,
}

#[derive(Args)]
struct InspectArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Also re-parse each statement with sqlparser
    #[arg(long)]
    verify: bool,
}

#[cfg(feature = "db")]
#[derive(Args)]
struct CopyArgs {
    /// Source database URL
    #[arg(long, env = "SCHEMASNAP_SOURCE_URL", hide_env_values = true)]
    source_url: String,

    /// Target database URL
    #[arg(long, env = "SCHEMASNAP_TARGET_URL", hide_env_values = true)]
    target_url: String,

    /// Tables to copy, in order (`schema.table`, default schema `public`)
    #[arg(required = true)]
    tables: Vec<schemasnap::copier::TableRef>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[cfg(feature = "db")]
#[derive(Args)]
struct DescribeArgs {
    /// Database URL
    #[arg(long, env = "SCHEMASNAP_DATABASE_URL", hide_env_values = true)]
    url: String,

    /// Table to describe
    table: schemasnap::copier::TableRef,
}

#[cfg(feature = "db")]
#[derive(Args)]
struct ApplySqlArgs {
    /// Database URL
    #[arg(long, env = "SCHEMASNAP_DATABASE_URL", hide_env_values = true)]
    url: String,

    /// SQL file to run
    file: PathBuf,
}

#[derive(Subcommand)]
enum ImageCommand {
    /// Make light and light-gray background pixels transparent
    Clean(ImageIo),
    /// Snap dark and accent pixels to a palette
    Recolor {
        #[command(flatten)]
        io: ImageIo,
        /// Replacement for dark pixels
        #[arg(long, default_value = "#000000")]
        dark: String,
        /// Replacement for accent pixels
        #[arg(long, default_value = "#C5A059")]
        accent: String,
        /// Make every other pixel transparent
        #[arg(long)]
        strict: bool,
    },
    /// Trim, square, pad, and resize to an app icon
    Icon {
        #[command(flatten)]
        io: ImageIo,
        /// Edge length in pixels
        #[arg(long, default_value_t = 512)]
        size: u32,
        /// Padding on each side in pixels
        #[arg(long, default_value_t = 0)]
        padding: u32,
        /// Background color (transparent when absent)
        #[arg(long)]
        background: Option<String>,
    },
    /// Keep the top part of a stacked logo
    CropTop {
        #[command(flatten)]
        io: ImageIo,
        /// Fraction of the height to keep
        #[arg(long, default_value_t = 0.65)]
        fraction: f32,
    },
}

#[derive(Args)]
struct ImageIo {
    /// Input image
    input: PathBuf,
    /// Output PNG
    output: PathBuf,
    /// Thresholds JSON overriding the defaults
    #[arg(long)]
    thresholds: Option<PathBuf>,
}

#[derive(Args)]
struct PatchArgs {
    /// Patch-set JSON file
    patch_set: PathBuf,
    /// Directory patch paths are relative to
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Report without writing files
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct KnowledgeSyncArgs {
    /// Directory holding `*_vX.Y.Z.md` files
    source: PathBuf,
    /// Archive directory (defaults to SOURCE/archive)
    #[arg(long)]
    archive: Option<PathBuf>,
    /// Index file inside SOURCE whose version references are updated
    #[arg(long, default_value = housekeeping::knowledge::DEFAULT_INDEX_FILE)]
    index_file: String,
    /// Directory to mirror the new versions into
    #[arg(long)]
    mirror: Option<PathBuf>,
    /// Report without touching files
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct PruneArgs {
    /// Migrations directory
    dir: PathBuf,
    /// Delete the redundant files (otherwise only list them)
    #[arg(long)]
    apply: bool,
}

/// How a command finished without erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Clean,
    Problems,
}

impl Status {
    fn from_problems(found: bool) -> Self {
        if found {
            Status::Problems
        } else {
            Status::Clean
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Command::Snapshot(args) => run_snapshot(&args),
        Command::Sanitize(args) => run_sanitize(&args),
        Command::Inspect(args) => run_inspect(&args),
        #[cfg(feature = "db")]
        Command::Copy(args) => run_copy(&args),
        #[cfg(feature = "db")]
        Command::Describe(args) => run_describe(&args),
        #[cfg(feature = "db")]
        Command::ApplySql(args) => {
            schemasnap::copier::pg::apply_sql_file(&args.url, &args.file).map(|()| Status::Clean)
        }
        Command::Image(command) => run_image(&command),
        Command::Patch(args) => run_patch(&args),
        Command::KnowledgeSync(args) => run_knowledge_sync(&args),
        Command::PruneMigrations(args) => run_prune(&args),
    };

    match outcome {
        Ok(Status::Clean) => ExitCode::SUCCESS,
        Ok(Status::Problems) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "schemasnap=debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Concatenated SQL of all inputs, the output base name, and the profile.
fn load_inputs(inputs: &InputArgs) -> Result<(String, String, Profile)> {
    let mut sql_files = inputs.input.clone();
    if let Some(dir) = &inputs.schema_dir {
        let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| schemasnap::Error::Read {
                path: dir.clone(),
                source: e,
            })?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "sql"))
            .collect();
        found.sort();
        sql_files.extend(found);
    }

    let mut combined_sql = String::new();
    for path in &sql_files {
        combined_sql.push_str(&read_text_lossy(path)?);
        combined_sql.push('\n');
    }

    let name = sql_files
        .first()
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();

    let profile = match &inputs.profile {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };
    Ok((combined_sql, name, profile))
}

fn run_snapshot(args: &SnapshotArgs) -> Result<Status> {
    let (sql, default_name, profile) = load_inputs(&args.inputs)?;
    let options = SnapshotOptions {
        split_seed: !args.inline_seed,
        keep_comments: !args.strip_comments,
        drop_routines: !args.keep_routines,
        verify: args.verify,
    };
    let snapshot = snapshot::build_snapshot(&sql, &profile, &options);
    let name = args.name.clone().unwrap_or(default_name);
    let written = formatter::write_snapshot(&args.output_dir, &name, &snapshot)?;

    for path in &written {
        println!("{}", path.display());
    }
    let report = &snapshot.report;
    eprintln!(
        "{} statements read, {} emitted, {} redefinitions collapsed, {} removed by DROP",
        report.stats.statements,
        report.total_emitted(),
        report.stats.replaced,
        report.stats.removed_by_drop
    );
    Ok(Status::from_problems(!report.issues.is_empty()))
}

fn run_sanitize(args: &SanitizeArgs) -> Result<Status> {
    let (sql, default_name, profile) = load_inputs(&args.inputs)?;
    let guard = GuardOptions {
        drop_routines: args.drop_functions,
    };
    let sanitized = snapshot::sanitize_dump(&sql, &profile, &guard);
    let name = args.name.clone().unwrap_or(default_name);
    for path in formatter::write_sanitized(&args.output_dir, &name, &sanitized)? {
        println!("{}", path.display());
    }
    Ok(Status::from_problems(sanitized.report.parse_fallbacks > 0))
}

#[derive(Serialize)]
struct InspectRow {
    line: usize,
    kind: String,
    key: Option<String>,
    classified: bool,
    stray_lines: usize,
}

fn run_inspect(args: &InspectArgs) -> Result<Status> {
    let (sql, _, _) = load_inputs(&args.inputs)?;
    let statements = parse_statements(&sql);
    let rows: Vec<InspectRow> = statements
        .iter()
        .filter(|statement| !statement.is_comment_only())
        .map(|statement| InspectRow {
            line: statement.line,
            kind: statement.object.label(),
            key: statement.object.key(),
            classified: statement.classified,
            stray_lines: statement.stray_lines,
        })
        .collect();
    let issues = if args.verify {
        verify_statements(&statements)
    } else {
        Vec::new()
    };

    if args.json {
        #[derive(Serialize)]
        struct InspectOutput<'a> {
            statements: &'a [InspectRow],
            issues: &'a [schemasnap::parser::verify::ParseIssue],
        }
        let json = serde_json::to_string_pretty(&InspectOutput {
            statements: &rows,
            issues: &issues,
        })
        .map_err(|source| schemasnap::Error::Json {
            what: "inspect output",
            source,
        })?;
        println!("{json}");
    } else {
        for row in &rows {
            let marker = if row.classified { ' ' } else { '?' };
            println!(
                "{:>6}{marker} {:<26} {}",
                row.line,
                row.kind,
                row.key.as_deref().unwrap_or("")
            );
        }
        for issue in &issues {
            eprintln!("line {}: {} ({})", issue.line, issue.message, issue.summary);
        }
    }

    let fallbacks = rows.iter().filter(|row| !row.classified).count();
    Ok(Status::from_problems(fallbacks > 0 || !issues.is_empty()))
}

#[cfg(feature = "db")]
fn run_copy(args: &CopyArgs) -> Result<Status> {
    use schemasnap::copier::pg::{copy_tables, TableOutcome};

    let report = copy_tables(&args.source_url, &args.target_url, &args.tables)?;
    if args.json {
        let json = serde_json::to_string_pretty(&report).map_err(|source| schemasnap::Error::Json {
            what: "copy report",
            source,
        })?;
        println!("{json}");
    } else {
        for table in &report.tables {
            match &table.outcome {
                TableOutcome::Copied { rows, failed } => {
                    println!("{}: {rows} rows copied, {failed} failed", table.table)
                }
                TableOutcome::Skipped { reason } => println!("{}: skipped ({reason})", table.table),
                TableOutcome::Failed { error } => println!("{}: failed ({error})", table.table),
            }
        }
    }
    Ok(Status::from_problems(report.has_failures()))
}

#[cfg(feature = "db")]
fn run_describe(args: &DescribeArgs) -> Result<Status> {
    let Some(shape) = schemasnap::copier::pg::describe_table(&args.url, &args.table)? else {
        eprintln!("{}: table not found", args.table);
        return Ok(Status::Problems);
    };
    for column in &shape.columns {
        let key = if shape.primary_key.contains(&column.name) {
            " [pk]"
        } else {
            ""
        };
        let generated = if column.generated { " [generated]" } else { "" };
        println!("{} {}{key}{generated}", column.name, column.data_type);
    }
    Ok(Status::Clean)
}

fn load_thresholds(path: Option<&Path>) -> Result<Thresholds> {
    path.map_or_else(|| Ok(Thresholds::default()), Thresholds::load)
}

fn run_image(command: &ImageCommand) -> Result<Status> {
    match command {
        ImageCommand::Clean(io) => {
            let thresholds = load_thresholds(io.thresholds.as_deref())?;
            let mut image = assets::load_image(&io.input)?;
            let cleared = assets::remove_background(&mut image, &thresholds);
            assets::save_png(&io.output, &image)?;
            eprintln!("{cleared} background pixels cleared");
        }
        ImageCommand::Recolor {
            io,
            dark,
            accent,
            strict,
        } => {
            let thresholds = load_thresholds(io.thresholds.as_deref())?;
            let palette = Palette {
                dark: assets::parse_hex_color(dark)?,
                accent: assets::parse_hex_color(accent)?,
            };
            let mut image = assets::load_image(&io.input)?;
            let changed = assets::recolor(&mut image, &palette, &thresholds, *strict);
            assets::save_png(&io.output, &image)?;
            eprintln!("{changed} pixels recolored");
        }
        ImageCommand::Icon {
            io,
            size,
            padding,
            background,
        } => {
            let background = background.as_deref().map(assets::parse_hex_color).transpose()?;
            let image = assets::load_image(&io.input)?;
            assets::save_png(&io.output, &assets::square_icon(&image, *size, *padding, background))?;
        }
        ImageCommand::CropTop { io, fraction } => {
            let image = assets::load_image(&io.input)?;
            assets::save_png(&io.output, &assets::crop_top(&image, *fraction))?;
        }
    }
    Ok(Status::Clean)
}

fn run_patch(args: &PatchArgs) -> Result<Status> {
    let set = PatchSet::load(&args.patch_set)?;
    let report = patch::apply_patch_set(&args.root, &set, args.dry_run)?;
    for result in &report.results {
        let status = match result.outcome {
            PatchOutcome::Applied => "applied",
            PatchOutcome::AlreadyApplied => "already applied",
            PatchOutcome::AnchorNotFound => "ANCHOR NOT FOUND",
            PatchOutcome::FileMissing => "FILE MISSING",
        };
        println!(
            "{}: {status}{}",
            result.file.display(),
            result
                .description
                .as_deref()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default()
        );
    }
    let verb = if report.dry_run { "would change" } else { "changed" };
    eprintln!("{} files {verb}", report.changed_files.len());
    Ok(Status::from_problems(report.has_failures()))
}

fn run_knowledge_sync(args: &KnowledgeSyncArgs) -> Result<Status> {
    let options = SyncOptions {
        source: args.source.clone(),
        archive: args.archive.clone(),
        index_file: args.index_file.clone(),
        mirror: args.mirror.clone(),
        dry_run: args.dry_run,
    };
    let report = housekeeping::sync_knowledge(&options)?;
    for (old, new) in &report.renamed {
        println!("{old} -> {new}");
    }
    for old in &report.superseded {
        println!("{old} -> archive");
    }
    eprintln!("version {} -> {}", report.from, report.to);
    if let Some(count) = report.mirrored {
        eprintln!("{count} files mirrored");
    }
    Ok(Status::Clean)
}

fn run_prune(args: &PruneArgs) -> Result<Status> {
    let redundant = housekeeping::prune_migrations(&args.dir, args.apply)?;
    for migration in &redundant {
        println!("{} == {}", migration.file, migration.duplicate_of);
    }
    let verb = if args.apply { "removed" } else { "redundant" };
    eprintln!("{} {verb}", redundant.len());
    Ok(Status::Clean)
}
