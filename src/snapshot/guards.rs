//! Rewrites that make individual statements safe to re-run.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::parser::classify::SqlObject;
use crate::parser::names::quote_identifier;
use crate::parser::statement::{ends_in_line_comment, terminate, Statement};

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^(CREATE\s+(?:(?:GLOBAL|LOCAL)\s+)?(?:(?:TEMPORARY|TEMP|UNLOGGED)\s+)?TABLE)\s+(IF\s+NOT\s+EXISTS\s+)?",
    )
    .expect("valid regex")
});
static CREATE_INDEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(CREATE\s+(?:UNIQUE\s+)?INDEX(?:\s+CONCURRENTLY)?)\s+(IF\s+NOT\s+EXISTS\s+)?")
        .expect("valid regex")
});
static CREATE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(CREATE\s+EXTENSION)\s+(IF\s+NOT\s+EXISTS\s+)?").expect("valid regex")
});
static CREATE_SCHEMA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(CREATE\s+SCHEMA)\s+(IF\s+NOT\s+EXISTS\s+)?").expect("valid regex")
});
static CREATE_MATVIEW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(CREATE\s+MATERIALIZED\s+VIEW)\s+(IF\s+NOT\s+EXISTS\s+)?")
        .expect("valid regex")
});
static CREATE_VIEW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^CREATE\s+(?:OR\s+REPLACE\s+)?((?:(?:TEMP|TEMPORARY)\s+)?(?:RECURSIVE\s+)?VIEW)\b")
        .expect("valid regex")
});
static CREATE_ROUTINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^CREATE\s+(?:OR\s+REPLACE\s+)?(FUNCTION|PROCEDURE)\b").expect("valid regex")
});
static ADD_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bADD\s+COLUMN\s+(IF\s+NOT\s+EXISTS\s+)?").expect("valid regex")
});
static DROP_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bDROP\s+COLUMN\s+(IF\s+EXISTS\s+)?").expect("valid regex")
});
static DROP_CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bDROP\s+CONSTRAINT\s+(IF\s+EXISTS\s+)?").expect("valid regex")
});
static ADD_CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bADD\s+(?:CONSTRAINT|PRIMARY\s+KEY|UNIQUE|FOREIGN\s+KEY|CHECK|EXCLUDE)\b")
        .expect("valid regex")
});
static ADD_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bADD\s+VALUE\s+(IF\s+NOT\s+EXISTS\s+)?").expect("valid regex")
});
static ON_CONFLICT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bON\s+CONFLICT\b").expect("valid regex"));
static RETURNING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bRETURNING\b").expect("valid regex"));

/// Dollar-quote tag used for generated `DO` blocks.
pub const GUARD_TAG: &str = "$guard$";

/// Knobs for [`guard_statement`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardOptions {
    /// Emit `DROP FUNCTION IF EXISTS … CASCADE` before each routine so that
    /// signature or return-type changes apply cleanly.
    pub drop_routines: bool,
}

/// Return the statement body rewritten so that running it twice is harmless.
///
/// The result never carries the final `;`; guards that prepend a statement
/// (policy and trigger drops) terminate that one themselves. Statements that
/// already carry a guard come back unchanged.
pub fn guard_statement(statement: &Statement, options: &GuardOptions) -> String {
    let body = statement.body.as_str();
    match &statement.object {
        SqlObject::Table { .. } => add_modifier(&CREATE_TABLE, body, "IF NOT EXISTS"),
        SqlObject::Index { name: Some(_), .. } => add_modifier(&CREATE_INDEX, body, "IF NOT EXISTS"),
        SqlObject::Extension { .. } => add_modifier(&CREATE_EXTENSION, body, "IF NOT EXISTS"),
        SqlObject::Schema { .. } => add_modifier(&CREATE_SCHEMA, body, "IF NOT EXISTS"),
        SqlObject::View {
            materialized: true, ..
        } => add_modifier(&CREATE_MATVIEW, body, "IF NOT EXISTS"),
        SqlObject::View { .. } => CREATE_VIEW
            .replace(body, "CREATE OR REPLACE $1")
            .into_owned(),
        SqlObject::Routine {
            name,
            args,
            procedure,
        } => {
            let create = CREATE_ROUTINE.replace(body, "CREATE OR REPLACE $1");
            if options.drop_routines {
                let keyword = if *procedure { "PROCEDURE" } else { "FUNCTION" };
                format!(
                    "DROP {keyword} IF EXISTS {}({}) CASCADE;\n{create}",
                    name.to_sql(),
                    args.join(", ")
                )
            } else {
                create.into_owned()
            }
        }
        SqlObject::Policy { name, table } => format!(
            "DROP POLICY IF EXISTS {} ON {};\n{body}",
            quote_identifier(&name.folded()),
            table.to_sql()
        ),
        SqlObject::Trigger { name, table } => format!(
            "DROP TRIGGER IF EXISTS {} ON {};\n{body}",
            quote_identifier(&name.folded()),
            table.to_sql()
        ),
        SqlObject::Type { .. } => wrap_in_block(body, "duplicate_object"),
        SqlObject::AlterTable { .. } => guard_alter_table(body),
        SqlObject::AlterType { .. } => ensure_each(&ADD_VALUE, body, "ADD VALUE IF NOT EXISTS "),
        SqlObject::Insert { .. } => guard_insert(body),
        _ => body.to_string(),
    }
}

/// Insert `modifier` after the head captured by group 1 unless group 2
/// (the modifier) already matched.
fn add_modifier(re: &Regex, body: &str, modifier: &str) -> String {
    let Some(caps) = re.captures(body) else {
        return body.to_string();
    };
    if caps.get(2).is_some() {
        return body.to_string();
    }
    let (Some(whole), Some(head)) = (caps.get(0), caps.get(1)) else {
        return body.to_string();
    };
    format!("{} {modifier} {}", head.as_str(), &body[whole.end()..])
}

/// Replace every match lacking group 1 with `replacement`.
fn ensure_each(re: &Regex, body: &str, replacement: &str) -> String {
    re.replace_all(body, |caps: &Captures<'_>| {
        if caps.get(1).is_some() {
            caps[0].to_string()
        } else {
            replacement.to_string()
        }
    })
    .into_owned()
}

fn guard_alter_table(body: &str) -> String {
    let body = ensure_each(&ADD_COLUMN, body, "ADD COLUMN IF NOT EXISTS ");
    let body = ensure_each(&DROP_COLUMN, &body, "DROP COLUMN IF EXISTS ");
    let body = ensure_each(&DROP_CONSTRAINT, &body, "DROP CONSTRAINT IF EXISTS ");
    if ADD_CONSTRAINT.is_match(&body) {
        wrap_in_block(
            &body,
            "duplicate_object OR duplicate_table OR invalid_table_definition",
        )
    } else {
        body
    }
}

fn guard_insert(body: &str) -> String {
    if ON_CONFLICT.is_match(body) || RETURNING.is_match(body) {
        return body.to_string();
    }
    if ends_in_line_comment(body) {
        format!("{body}\nON CONFLICT DO NOTHING")
    } else {
        format!("{body} ON CONFLICT DO NOTHING")
    }
}

/// Wrap `body` in a `DO` block that swallows the named exception conditions.
pub fn wrap_in_block(body: &str, conditions: &str) -> String {
    format!(
        "DO {GUARD_TAG} BEGIN\n{}\nEXCEPTION WHEN {conditions} THEN NULL;\nEND {GUARD_TAG}",
        terminate(body)
    )
}
