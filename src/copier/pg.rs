//! PostgreSQL side of the copier, built on diesel.

use std::path::Path;

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Text};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::copier::plan::{plan_copy, ColumnInfo, PlanSkip, TableRef, TableShape};
use crate::error::{read_text_lossy, Result};

#[derive(QueryableByName)]
struct ColumnRow {
    #[diesel(sql_type = Text)]
    column_name: String,
    #[diesel(sql_type = Text)]
    data_type: String,
    #[diesel(sql_type = Bool)]
    generated: bool,
}

#[derive(QueryableByName)]
struct KeyRow {
    #[diesel(sql_type = Text)]
    column_name: String,
}

#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = Text)]
    payload: String,
}

/// Open a connection.
pub fn connect(url: &str) -> Result<PgConnection> {
    Ok(PgConnection::establish(url)?)
}

/// Read a table's columns and primary key. `None` when the table has no
/// columns visible to this connection.
pub fn load_shape(conn: &mut PgConnection, table: &TableRef) -> Result<Option<TableShape>> {
    let columns: Vec<ColumnRow> = diesel::sql_query(
        "SELECT column_name::text AS column_name,
                data_type::text AS data_type,
                (is_generated = 'ALWAYS') AS generated
         FROM information_schema.columns
         WHERE table_schema = $1 AND table_name = $2
         ORDER BY ordinal_position",
    )
    .bind::<Text, _>(&table.schema)
    .bind::<Text, _>(&table.name)
    .load(conn)?;
    if columns.is_empty() {
        return Ok(None);
    }

    let keys: Vec<KeyRow> = diesel::sql_query(
        "SELECT a.attname::text AS column_name
         FROM pg_index i
         JOIN pg_class c ON c.oid = i.indrelid
         JOIN pg_namespace n ON n.oid = c.relnamespace
         JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
         WHERE n.nspname = $1 AND c.relname = $2 AND i.indisprimary
         ORDER BY array_position(i.indkey::int2[], a.attnum)",
    )
    .bind::<Text, _>(&table.schema)
    .bind::<Text, _>(&table.name)
    .load(conn)?;

    Ok(Some(TableShape {
        table: table.clone(),
        columns: columns
            .into_iter()
            .map(|row| ColumnInfo {
                name: row.column_name,
                data_type: row.data_type,
                generated: row.generated,
            })
            .collect(),
        primary_key: keys.into_iter().map(|row| row.column_name).collect(),
    }))
}

/// What happened to one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    /// Rows were upserted; `failed` rows were rolled back individually.
    Copied {
        /// Rows written.
        rows: usize,
        /// Rows rejected by the target.
        failed: usize,
    },
    /// The table was not attempted.
    Skipped {
        /// Why.
        reason: PlanSkip,
    },
    /// Reading or writing the table failed as a whole.
    Failed {
        /// Error message.
        error: String,
    },
}

/// Per-table result of [`copy_tables`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCopy {
    /// Table copied.
    pub table: TableRef,
    /// Outcome.
    pub outcome: TableOutcome,
}

/// Summary of a copy run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    /// One entry per requested table, in request order.
    pub tables: Vec<TableCopy>,
}

impl CopyReport {
    /// Rows written across all tables.
    pub fn rows_copied(&self) -> usize {
        self.tables
            .iter()
            .map(|table| match table.outcome {
                TableOutcome::Copied { rows, .. } => rows,
                _ => 0,
            })
            .sum()
    }

    /// Whether any row or table failed.
    pub fn has_failures(&self) -> bool {
        self.tables.iter().any(|table| match table.outcome {
            TableOutcome::Copied { failed, .. } => failed > 0,
            TableOutcome::Failed { .. } => true,
            TableOutcome::Skipped { .. } => false,
        })
    }
}

/// Copy `tables` from `source_url` into `target_url`, in order.
///
/// Each table runs in its own target transaction and each row in its own
/// savepoint, so one bad row or table never aborts the rest.
pub fn copy_tables(source_url: &str, target_url: &str, tables: &[TableRef]) -> Result<CopyReport> {
    let mut source = connect(source_url)?;
    let mut target = connect(target_url)?;
    info!(tables = tables.len(), "connected to source and target");

    let mut report = CopyReport::default();
    for table in tables {
        let outcome = match copy_table(&mut source, &mut target, table) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(table = %table, error = %err, "table copy failed");
                TableOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        info!(table = %table, outcome = ?outcome, "table done");
        report.tables.push(TableCopy {
            table: table.clone(),
            outcome,
        });
    }
    Ok(report)
}

fn copy_table(
    source: &mut PgConnection,
    target: &mut PgConnection,
    table: &TableRef,
) -> Result<TableOutcome> {
    let Some(source_shape) = load_shape(source, table)? else {
        return Ok(TableOutcome::Skipped {
            reason: PlanSkip::MissingInSource,
        });
    };
    let Some(target_shape) = load_shape(target, table)? else {
        return Ok(TableOutcome::Skipped {
            reason: PlanSkip::MissingInTarget,
        });
    };
    let plan = match plan_copy(&source_shape, &target_shape) {
        Ok(plan) => plan,
        Err(reason) => return Ok(TableOutcome::Skipped { reason }),
    };

    let rows: Vec<JsonRow> = diesel::sql_query(plan.select_sql()).load(source)?;
    debug!(table = %table, rows = rows.len(), columns = plan.columns.len(), "read source rows");

    let upsert = plan.upsert_sql();
    let (copied, failed) = target.transaction(|conn| {
        let mut copied = 0;
        let mut failed = 0;
        for row in &rows {
            let written = conn.transaction(|conn| {
                diesel::sql_query(&upsert)
                    .bind::<Text, _>(&row.payload)
                    .execute(conn)
            });
            match written {
                Ok(_) => copied += 1,
                Err(err) => {
                    debug!(table = %table, error = %err, "row rejected");
                    failed += 1;
                }
            }
        }
        Ok::<_, diesel::result::Error>((copied, failed))
    })?;

    Ok(TableOutcome::Copied {
        rows: copied,
        failed,
    })
}

/// Describe a table on the database at `url`.
pub fn describe_table(url: &str, table: &TableRef) -> Result<Option<TableShape>> {
    let mut conn = connect(url)?;
    load_shape(&mut conn, table)
}

/// Run a SQL file in a single transaction.
pub fn apply_sql_file(url: &str, path: &Path) -> Result<()> {
    let sql = read_text_lossy(path)?;
    let mut conn = connect(url)?;
    conn.transaction(|conn| conn.batch_execute(&sql))?;
    info!(path = %path.display(), "applied SQL file");
    Ok(())
}
