//! Pure planning for table copies: which columns move and how rows are
//! written.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::parser::names::{quote_identifier, ObjectName, DEFAULT_SCHEMA};

/// A `schema.table` reference with case-folded parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableRef {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
}

impl TableRef {
    /// Parse `table`, `schema.table`, or their quoted forms.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidTableRef(text.to_string());
        if text.trim().is_empty() {
            return Err(invalid());
        }
        let name = ObjectName::parse(text.trim());
        if name.parts().count() > 2 || name.parts().any(|part| part.value.is_empty()) {
            return Err(invalid());
        }
        Ok(Self {
            schema: name.schema().unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            name: name.relation(),
        })
    }

    /// Quoted `"schema"."table"` reference.
    pub fn to_sql(&self) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(&self.name))
    }
}

impl FromStr for TableRef {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        Self::parse(text)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// One column as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Data type as reported by the catalog.
    pub data_type: String,
    /// `GENERATED ALWAYS AS (…) STORED` columns cannot be written.
    pub generated: bool,
}

/// Columns and primary key of a table on one side of a copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableShape {
    /// Table described.
    pub table: TableRef,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnInfo>,
    /// Primary-key columns in key order.
    pub primary_key: Vec<String>,
}

impl TableShape {
    fn writable(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|column| !column.generated)
    }
}

/// Why a table is not copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSkip {
    /// The source database has no such table.
    MissingInSource,
    /// The target database has no such table.
    MissingInTarget,
    /// No writable column exists on both sides.
    NoSharedColumns,
    /// The target has no primary key to upsert on.
    NoPrimaryKey,
    /// Some target key column is missing from the source.
    PrimaryKeyNotShared,
}

impl fmt::Display for PlanSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlanSkip::MissingInSource => "table missing in source",
            PlanSkip::MissingInTarget => "table missing in target",
            PlanSkip::NoSharedColumns => "no shared writable columns",
            PlanSkip::NoPrimaryKey => "target has no primary key",
            PlanSkip::PrimaryKeyNotShared => "primary key not present in source",
        })
    }
}

/// How one table's rows move from source to target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyPlan {
    /// Table copied (same name on both sides).
    pub table: TableRef,
    /// Shared writable columns, in target order.
    pub columns: Vec<String>,
    /// Target primary key.
    pub primary_key: Vec<String>,
}

/// Plan a copy between two shapes of the same table.
pub fn plan_copy(source: &TableShape, target: &TableShape) -> std::result::Result<CopyPlan, PlanSkip> {
    let columns: Vec<String> = target
        .writable()
        .filter(|column| source.columns.iter().any(|other| other.name == column.name))
        .map(|column| column.name.clone())
        .collect();
    if columns.is_empty() {
        return Err(PlanSkip::NoSharedColumns);
    }
    if target.primary_key.is_empty() {
        return Err(PlanSkip::NoPrimaryKey);
    }
    if !target.primary_key.iter().all(|key| columns.contains(key)) {
        return Err(PlanSkip::PrimaryKeyNotShared);
    }
    Ok(CopyPlan {
        table: target.table.clone(),
        columns,
        primary_key: target.primary_key.clone(),
    })
}

impl CopyPlan {
    /// Query returning each source row as one JSON text value named `payload`.
    pub fn select_sql(&self) -> String {
        format!(
            "SELECT row_to_json(src)::text AS payload FROM (SELECT {} FROM {}) AS src",
            column_list(&self.columns),
            self.table.to_sql()
        )
    }

    /// Upsert of one JSON row bound as `$1`.
    ///
    /// `json_populate_record` converts each field to the target column type,
    /// so source and target types only need compatible text forms.
    pub fn upsert_sql(&self) -> String {
        let columns = column_list(&self.columns);
        let updates: Vec<String> = self
            .columns
            .iter()
            .filter(|column| !self.primary_key.contains(column))
            .map(|column| {
                let column = quote_identifier(column);
                format!("{column} = EXCLUDED.{column}")
            })
            .collect();
        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        format!(
            "INSERT INTO {table} ({columns}) OVERRIDING SYSTEM VALUE \
             SELECT {columns} FROM json_populate_record(NULL::{table}, $1::json) \
             ON CONFLICT ({keys}) {action}",
            table = self.table.to_sql(),
            keys = column_list(&self.primary_key),
        )
    }
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: "text".to_string(),
            generated: false,
        }
    }

    fn shape(columns: Vec<ColumnInfo>, primary_key: &[&str]) -> TableShape {
        TableShape {
            table: TableRef::parse("public.payments").expect("table"),
            columns,
            primary_key: primary_key.iter().map(|key| key.to_string()).collect(),
        }
    }

    #[test]
    fn table_refs_default_to_public_and_fold_case() {
        let table = TableRef::parse("Payments").expect("table");
        assert_eq!(table.schema, "public");
        assert_eq!(table.name, "payments");
        let table: TableRef = "auth.\"Users\"".parse().expect("table");
        assert_eq!(table.to_sql(), "\"auth\".\"Users\"");
        assert_eq!(table.to_string(), "auth.Users");
    }

    #[test]
    fn table_refs_reject_garbage() {
        for text in ["", "a.b.c", "a.", " "] {
            let err = TableRef::parse(text).expect_err("should reject");
            assert!(err.to_string().contains("Invalid table reference"));
        }
    }

    #[test]
    fn plan_uses_shared_writable_columns_in_target_order() {
        let source = shape(vec![column("note"), column("id"), column("legacy")], &["id"]);
        let mut total = column("total");
        total.generated = true;
        let target = shape(vec![column("id"), column("note"), total, column("extra")], &["id"]);

        let plan = plan_copy(&source, &target).expect("plan");
        assert_eq!(plan.columns, vec!["id", "note"]);
        assert_eq!(
            plan.upsert_sql(),
            "INSERT INTO \"public\".\"payments\" (\"id\", \"note\") OVERRIDING SYSTEM VALUE \
             SELECT \"id\", \"note\" FROM json_populate_record(NULL::\"public\".\"payments\", $1::json) \
             ON CONFLICT (\"id\") DO UPDATE SET \"note\" = EXCLUDED.\"note\""
        );
        assert_eq!(
            plan.select_sql(),
            "SELECT row_to_json(src)::text AS payload FROM (SELECT \"id\", \"note\" FROM \"public\".\"payments\") AS src"
        );
    }

    #[test]
    fn key_only_plans_do_nothing_on_conflict() {
        let source = shape(vec![column("id")], &["id"]);
        let target = shape(vec![column("id")], &["id"]);
        let plan = plan_copy(&source, &target).expect("plan");
        assert!(plan.upsert_sql().ends_with("ON CONFLICT (\"id\") DO NOTHING"));
    }

    #[test]
    fn plans_are_skipped_without_columns_or_keys() {
        let source = shape(vec![column("a")], &[]);
        assert_eq!(
            plan_copy(&source, &shape(vec![column("b")], &["b"])),
            Err(PlanSkip::NoSharedColumns)
        );
        assert_eq!(
            plan_copy(&source, &shape(vec![column("a")], &[])),
            Err(PlanSkip::NoPrimaryKey)
        );
        assert_eq!(
            plan_copy(&source, &shape(vec![column("a"), column("id")], &["id"])),
            Err(PlanSkip::PrimaryKeyNotShared)
        );
    }
}
