use serde::Serialize;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::parser::names::{quote_identifier, NamePart, ObjectName, DEFAULT_SCHEMA};

/// Kinds of schema objects a statement can create or drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ObjectType {
    /// `CREATE EXTENSION`
    Extension,
    /// `CREATE SCHEMA`
    Schema,
    /// `CREATE TYPE` / `CREATE DOMAIN`
    Type,
    /// `CREATE TABLE`
    Table,
    /// `CREATE [MATERIALIZED] VIEW`
    View,
    /// `CREATE FUNCTION`
    Function,
    /// `CREATE PROCEDURE`
    Procedure,
    /// `CREATE POLICY`
    Policy,
    /// `CREATE TRIGGER`
    Trigger,
    /// `CREATE INDEX`
    Index,
}

impl ObjectType {
    /// SQL keyword(s) naming this object type.
    pub fn keyword(self) -> &'static str {
        match self {
            ObjectType::Extension => "EXTENSION",
            ObjectType::Schema => "SCHEMA",
            ObjectType::Type => "TYPE",
            ObjectType::Table => "TABLE",
            ObjectType::View => "VIEW",
            ObjectType::Function => "FUNCTION",
            ObjectType::Procedure => "PROCEDURE",
            ObjectType::Policy => "POLICY",
            ObjectType::Trigger => "TRIGGER",
            ObjectType::Index => "INDEX",
        }
    }

    fn is_routine(self) -> bool {
        matches!(self, ObjectType::Function | ObjectType::Procedure)
    }
}

/// One object named by a `DROP` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget {
    /// Dropped object name.
    pub name: ObjectName,
    /// Routine argument types, when the drop spells out a signature.
    pub args: Option<Vec<String>>,
}

/// A parsed `DROP` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropStatement {
    /// Kind of object being dropped.
    pub object_type: ObjectType,
    /// Objects named in the statement (`DROP TABLE a, b`).
    pub targets: Vec<DropTarget>,
    /// Owning table for `DROP POLICY|TRIGGER … ON table`.
    pub table: Option<ObjectName>,
}

impl DropStatement {
    /// Catalog keys removed by this drop. Routine drops without a signature
    /// return a prefix matching every overload (ending in `(`).
    pub fn keys(&self) -> Vec<String> {
        self.targets
            .iter()
            .filter_map(|target| match self.object_type {
                ObjectType::Function | ObjectType::Procedure => Some(match &target.args {
                    Some(args) => routine_key(&target.name, args),
                    None => format!("routine:{}(", target.name.key()),
                }),
                ObjectType::Policy | ObjectType::Trigger => {
                    let table = self.table.as_ref()?;
                    Some(member_key(self.object_type, table, target.name.terminal()))
                }
                ObjectType::Extension | ObjectType::Schema => Some(format!(
                    "{}:{}",
                    prefix(self.object_type),
                    target.name.relation()
                )),
                ObjectType::Index => Some(format!("index:{}", target.name.key())),
                other => Some(format!("{}:{}", prefix(other), target.name.key())),
            })
            .collect()
    }
}

/// What a single statement does, as far as snapshot building cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlObject {
    /// `CREATE EXTENSION`
    Extension {
        /// Extension name.
        name: ObjectName,
    },
    /// `CREATE SCHEMA`
    Schema {
        /// Schema name.
        name: ObjectName,
    },
    /// `CREATE TYPE` or `CREATE DOMAIN`.
    Type {
        /// Type name.
        name: ObjectName,
    },
    /// `CREATE TABLE`
    Table {
        /// Table name.
        name: ObjectName,
    },
    /// `CREATE [MATERIALIZED] VIEW`
    View {
        /// View name.
        name: ObjectName,
        /// Whether this is a materialized view.
        materialized: bool,
    },
    /// `CREATE FUNCTION` / `CREATE PROCEDURE`
    Routine {
        /// Routine name.
        name: ObjectName,
        /// Input argument types as written (names, modes, defaults removed).
        args: Vec<String>,
        /// `true` for procedures.
        procedure: bool,
    },
    /// `CREATE POLICY name ON table`
    Policy {
        /// Policy name.
        name: NamePart,
        /// Table the policy is attached to.
        table: ObjectName,
    },
    /// `CREATE TRIGGER name … ON table`
    Trigger {
        /// Trigger name.
        name: NamePart,
        /// Table the trigger fires on.
        table: ObjectName,
    },
    /// `CREATE [UNIQUE] INDEX [name] ON table`
    Index {
        /// Index name, absent for auto-named indexes.
        name: Option<NamePart>,
        /// Indexed table.
        table: ObjectName,
    },
    /// `ALTER TABLE`
    AlterTable {
        /// Altered table.
        table: ObjectName,
    },
    /// `ALTER TYPE`
    AlterType {
        /// Altered type.
        name: ObjectName,
    },
    /// Anonymous `DO` block.
    Block,
    /// `INSERT INTO table`
    Insert {
        /// Target table.
        table: ObjectName,
    },
    /// `UPDATE`, `DELETE`, `TRUNCATE`, `COPY`: one-off data fixes.
    DataFix {
        /// Target table when recognizable.
        table: Option<ObjectName>,
    },
    /// `DROP …`
    Drop(DropStatement),
    /// Session and transaction control (`SET`, `BEGIN`, `COMMIT`, …).
    Session,
    /// Anything else (`GRANT`, `COMMENT ON`, `SELECT cron.schedule(…)`, …).
    Other {
        /// Leading keyword(s), when present.
        keyword: Option<String>,
    },
}

impl SqlObject {
    /// Stable identity used for deduplication, when the statement defines a
    /// named object.
    pub fn key(&self) -> Option<String> {
        match self {
            SqlObject::Extension { name } | SqlObject::Schema { name } => Some(format!(
                "{}:{}",
                prefix(self.object_type()?),
                name.relation()
            )),
            SqlObject::Type { name } | SqlObject::Table { name } | SqlObject::View { name, .. } => {
                Some(format!("{}:{}", prefix(self.object_type()?), name.key()))
            }
            SqlObject::Routine { name, args, .. } => Some(routine_key(name, args)),
            SqlObject::Policy { name, table } => {
                Some(member_key(ObjectType::Policy, table, name))
            }
            SqlObject::Trigger { name, table } => {
                Some(member_key(ObjectType::Trigger, table, name))
            }
            SqlObject::Index {
                name: Some(name),
                table,
            } => {
                let schema = table.schema().unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
                Some(format!("index:{schema}.{}", name.folded()))
            }
            _ => None,
        }
    }

    /// Short uppercase label, e.g. `CREATE POLICY` or `DROP FUNCTION`.
    pub fn label(&self) -> String {
        if let Some(object_type) = self.object_type() {
            return match self {
                SqlObject::View {
                    materialized: true, ..
                } => "CREATE MATERIALIZED VIEW".to_string(),
                _ => format!("CREATE {}", object_type.keyword()),
            };
        }
        match self {
            SqlObject::AlterTable { .. } => "ALTER TABLE".to_string(),
            SqlObject::AlterType { .. } => "ALTER TYPE".to_string(),
            SqlObject::Block => "DO".to_string(),
            SqlObject::Insert { .. } => "INSERT".to_string(),
            SqlObject::DataFix { .. } => "DATA FIX".to_string(),
            SqlObject::Drop(drop) => format!("DROP {}", drop.object_type.keyword()),
            SqlObject::Session => "SESSION".to_string(),
            SqlObject::Other { keyword } => keyword.clone().unwrap_or_else(|| "COMMENT".to_string()),
            _ => "UNKNOWN".to_string(),
        }
    }

    /// Object type created by this statement, if any.
    pub fn object_type(&self) -> Option<ObjectType> {
        Some(match self {
            SqlObject::Extension { .. } => ObjectType::Extension,
            SqlObject::Schema { .. } => ObjectType::Schema,
            SqlObject::Type { .. } => ObjectType::Type,
            SqlObject::Table { .. } => ObjectType::Table,
            SqlObject::View { .. } => ObjectType::View,
            SqlObject::Routine {
                procedure: true, ..
            } => ObjectType::Procedure,
            SqlObject::Routine { .. } => ObjectType::Function,
            SqlObject::Policy { .. } => ObjectType::Policy,
            SqlObject::Trigger { .. } => ObjectType::Trigger,
            SqlObject::Index { .. } => ObjectType::Index,
            _ => return None,
        })
    }

    /// Key of the table this statement depends on (policies, triggers,
    /// indexes, table alterations, seed rows).
    pub fn owner_table(&self) -> Option<String> {
        match self {
            SqlObject::Policy { table, .. }
            | SqlObject::Trigger { table, .. }
            | SqlObject::Index { table, .. }
            | SqlObject::AlterTable { table }
            | SqlObject::Insert { table } => Some(format!("table:{}", table.key())),
            _ => None,
        }
    }

    /// Name of the table or routine this statement targets, for whitelist
    /// filtering.
    pub fn target_relation(&self) -> Option<String> {
        match self {
            SqlObject::Table { name } => Some(name.relation()),
            SqlObject::Policy { table, .. }
            | SqlObject::Trigger { table, .. }
            | SqlObject::Index { table, .. }
            | SqlObject::AlterTable { table }
            | SqlObject::Insert { table } => Some(table.relation()),
            SqlObject::DataFix { table } => table.as_ref().map(ObjectName::relation),
            _ => None,
        }
    }
}

fn prefix(object_type: ObjectType) -> &'static str {
    match object_type {
        ObjectType::Extension => "extension",
        ObjectType::Schema => "schema",
        ObjectType::Type => "type",
        ObjectType::Table => "table",
        ObjectType::View => "view",
        ObjectType::Function | ObjectType::Procedure => "routine",
        ObjectType::Policy => "policy",
        ObjectType::Trigger => "trigger",
        ObjectType::Index => "index",
    }
}

fn member_key(object_type: ObjectType, table: &ObjectName, name: &NamePart) -> String {
    format!("{}:{}:{}", prefix(object_type), table.key(), name.folded())
}

/// Identity of a routine overload: `routine:schema.name(type,type)`.
pub fn routine_key(name: &ObjectName, args: &[String]) -> String {
    let signature = args
        .iter()
        .map(|arg| canonical_type(arg))
        .collect::<Vec<_>>()
        .join(",");
    format!("routine:{}({signature})", name.key())
}

/// Canonical spelling of a type for signature comparison.
///
/// Type modifiers are dropped (PostgreSQL ignores them in signatures), common
/// aliases are expanded, and a `public.` qualifier is removed.
pub fn canonical_type(ty: &str) -> String {
    let lower = ty.trim().to_ascii_lowercase();
    let mut without_modifiers = String::with_capacity(lower.len());
    let mut depth = 0usize;
    for ch in lower.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => without_modifiers.push(ch),
            _ => {}
        }
    }
    let (base, array_suffix) = match without_modifiers.find('[') {
        Some(idx) => (
            without_modifiers[..idx].trim().to_string(),
            without_modifiers[idx..].replace(' ', ""),
        ),
        None => (without_modifiers.trim().to_string(), String::new()),
    };
    let base = base.strip_prefix("public.").unwrap_or(&base);
    let base = base.split_whitespace().collect::<Vec<_>>().join(" ");
    let canonical = match base.as_str() {
        "int" | "int4" => "integer",
        "int8" => "bigint",
        "int2" => "smallint",
        "bool" => "boolean",
        "varchar" | "char varying" => "character varying",
        "char" => "character",
        "timestamptz" => "timestamp with time zone",
        "timestamp without time zone" => "timestamp",
        "timetz" => "time with time zone",
        "time without time zone" => "time",
        "float8" => "double precision",
        "float4" => "real",
        "decimal" => "numeric",
        other => other,
    };
    format!("{canonical}{array_suffix}")
}

/// Classify a statement body. Returns `None` when the text cannot be tokenized.
pub fn classify(body: &str) -> Option<SqlObject> {
    let tokens: Vec<Token> = Tokenizer::new(&PostgreSqlDialect {}, body)
        .tokenize()
        .ok()?
        .into_iter()
        .filter(|token| !matches!(token, Token::Whitespace(_)))
        .collect();
    let mut cursor = Cursor::new(&tokens);

    let Some(first) = cursor.keyword() else {
        return Some(SqlObject::Other { keyword: None });
    };

    let object = match first.as_str() {
        "CREATE" => classify_create(&mut cursor),
        "ALTER" => classify_alter(&mut cursor),
        "DROP" => classify_drop(&mut cursor),
        "INSERT" => {
            cursor.eat("INTO");
            cursor.object_name().map(|table| SqlObject::Insert { table })
        }
        "UPDATE" => {
            cursor.eat("ONLY");
            Some(SqlObject::DataFix {
                table: cursor.object_name(),
            })
        }
        "DELETE" => {
            cursor.eat("FROM");
            cursor.eat("ONLY");
            Some(SqlObject::DataFix {
                table: cursor.object_name(),
            })
        }
        "TRUNCATE" => {
            cursor.eat("TABLE");
            cursor.eat("ONLY");
            Some(SqlObject::DataFix {
                table: cursor.object_name(),
            })
        }
        "COPY" => Some(SqlObject::DataFix {
            table: cursor.object_name(),
        }),
        "DO" => Some(SqlObject::Block),
        "SET" | "RESET" | "BEGIN" | "START" | "COMMIT" | "END" | "ROLLBACK" | "ABORT"
        | "SAVEPOINT" | "RELEASE" => Some(SqlObject::Session),
        _ => None,
    };

    Some(object.unwrap_or(SqlObject::Other {
        keyword: Some(first),
    }))
}

fn classify_create(cursor: &mut Cursor<'_>) -> Option<SqlObject> {
    cursor.eat_seq(&["OR", "REPLACE"]);
    while cursor.eat_any(&[
        "UNIQUE",
        "TEMP",
        "TEMPORARY",
        "UNLOGGED",
        "GLOBAL",
        "LOCAL",
        "RECURSIVE",
        "CONSTRAINT",
    ]) {}

    match cursor.keyword()?.as_str() {
        "TABLE" => {
            cursor.if_not_exists();
            Some(SqlObject::Table {
                name: cursor.object_name()?,
            })
        }
        "VIEW" => Some(SqlObject::View {
            name: cursor.object_name()?,
            materialized: false,
        }),
        "MATERIALIZED" => {
            cursor.eat("VIEW");
            cursor.if_not_exists();
            Some(SqlObject::View {
                name: cursor.object_name()?,
                materialized: true,
            })
        }
        kind @ ("FUNCTION" | "PROCEDURE") => {
            let name = cursor.object_name()?;
            let args = cursor
                .paren_group()
                .map(|group| signature_types(&group))
                .unwrap_or_default();
            Some(SqlObject::Routine {
                name,
                args,
                procedure: kind == "PROCEDURE",
            })
        }
        "POLICY" => {
            let name = cursor.name_part()?;
            cursor.skip_to_keyword("ON").then_some(())?;
            Some(SqlObject::Policy {
                name,
                table: cursor.object_name()?,
            })
        }
        "TRIGGER" => {
            let name = cursor.name_part()?;
            cursor.skip_to_keyword("ON").then_some(())?;
            Some(SqlObject::Trigger {
                name,
                table: cursor.object_name()?,
            })
        }
        "INDEX" => {
            cursor.eat("CONCURRENTLY");
            cursor.if_not_exists();
            let name = if cursor.peek_keyword().as_deref() == Some("ON") {
                None
            } else {
                cursor.object_name().map(|name| name.terminal().clone())
            };
            cursor.skip_to_keyword("ON").then_some(())?;
            cursor.eat("ONLY");
            Some(SqlObject::Index {
                name,
                table: cursor.object_name()?,
            })
        }
        "EXTENSION" => {
            cursor.if_not_exists();
            Some(SqlObject::Extension {
                name: cursor.object_name()?,
            })
        }
        "SCHEMA" => {
            cursor.if_not_exists();
            Some(SqlObject::Schema {
                name: cursor.object_name()?,
            })
        }
        "TYPE" | "DOMAIN" => Some(SqlObject::Type {
            name: cursor.object_name()?,
        }),
        other => Some(SqlObject::Other {
            keyword: Some(format!("CREATE {other}")),
        }),
    }
}

fn classify_alter(cursor: &mut Cursor<'_>) -> Option<SqlObject> {
    match cursor.keyword()?.as_str() {
        "TABLE" => {
            cursor.if_exists();
            cursor.eat("ONLY");
            Some(SqlObject::AlterTable {
                table: cursor.object_name()?,
            })
        }
        "TYPE" => Some(SqlObject::AlterType {
            name: cursor.object_name()?,
        }),
        other => Some(SqlObject::Other {
            keyword: Some(format!("ALTER {other}")),
        }),
    }
}

fn classify_drop(cursor: &mut Cursor<'_>) -> Option<SqlObject> {
    let object_type = match cursor.keyword()?.as_str() {
        "TABLE" => ObjectType::Table,
        "VIEW" => ObjectType::View,
        "MATERIALIZED" => {
            cursor.eat("VIEW");
            ObjectType::View
        }
        "FUNCTION" | "ROUTINE" => ObjectType::Function,
        "PROCEDURE" => ObjectType::Procedure,
        "POLICY" => ObjectType::Policy,
        "TRIGGER" => ObjectType::Trigger,
        "INDEX" => ObjectType::Index,
        "TYPE" | "DOMAIN" => ObjectType::Type,
        "EXTENSION" => ObjectType::Extension,
        "SCHEMA" => ObjectType::Schema,
        other => {
            return Some(SqlObject::Other {
                keyword: Some(format!("DROP {other}")),
            })
        }
    };
    cursor.eat("CONCURRENTLY");
    cursor.if_exists();

    let mut targets = Vec::new();
    loop {
        let name = cursor.object_name()?;
        let args = if object_type.is_routine() && cursor.peek() == Some(&Token::LParen) {
            cursor.paren_group().map(|group| signature_types(&group))
        } else {
            None
        };
        targets.push(DropTarget { name, args });
        if !cursor.eat_token(&Token::Comma) {
            break;
        }
    }
    let table = if cursor.eat("ON") {
        cursor.object_name()
    } else {
        None
    };

    Some(SqlObject::Drop(DropStatement {
        object_type,
        targets,
        table,
    }))
}

/// Input argument types of a routine parameter list.
fn signature_types(args: &[&[Token]]) -> Vec<String> {
    args.iter().filter_map(|arg| argument_type(arg)).collect()
}

/// Type of one `[mode] [name] type [DEFAULT expr]` parameter; `None` for `OUT`.
fn argument_type(tokens: &[Token]) -> Option<String> {
    let end = tokens
        .iter()
        .position(|token| token == &Token::Eq || unquoted_keyword(token).as_deref() == Some("DEFAULT"))
        .unwrap_or(tokens.len());
    let mut tokens = &tokens[..end];

    match tokens.first().and_then(unquoted_keyword).as_deref() {
        Some("OUT") => return None,
        Some("IN" | "INOUT" | "VARIADIC") => tokens = &tokens[1..],
        _ => {}
    }

    if let [Token::Word(first), Token::Word(second), ..] = tokens {
        if !is_multiword_type(&first.value, &second.value) {
            tokens = &tokens[1..];
        }
    }

    (!tokens.is_empty()).then(|| render_tokens(tokens))
}

fn is_multiword_type(first: &str, second: &str) -> bool {
    matches!(
        (
            first.to_ascii_uppercase().as_str(),
            second.to_ascii_uppercase().as_str()
        ),
        ("DOUBLE", "PRECISION")
            | ("CHARACTER" | "CHAR" | "BIT", "VARYING")
            | ("NATIONAL", "CHARACTER" | "CHAR")
            | ("TIMESTAMP" | "TIME", "WITH" | "WITHOUT")
            | ("INTERVAL", _)
    )
}

/// Render tokens back to compact SQL, lowercasing unquoted words.
fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut previous_was_word = false;
    for token in tokens {
        let (text, is_word) = match token {
            Token::Word(word) if word.quote_style.is_some() => (quote_identifier(&word.value), true),
            Token::Word(word) => (word.value.to_ascii_lowercase(), true),
            Token::Number(number, _) => (number.clone(), true),
            other => (other.to_string(), false),
        };
        if is_word && previous_was_word {
            out.push(' ');
        }
        out.push_str(&text);
        previous_was_word = is_word;
    }
    out
}

fn unquoted_keyword(token: &Token) -> Option<String> {
    match token {
        Token::Word(word) if word.quote_style.is_none() => Some(word.value.to_ascii_uppercase()),
        _ => None,
    }
}

/// Forward-only view over significant tokens.
struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_keyword(&self) -> Option<String> {
        self.peek().and_then(unquoted_keyword)
    }

    fn keyword(&mut self) -> Option<String> {
        let keyword = self.peek_keyword()?;
        self.pos += 1;
        Some(keyword)
    }

    fn eat(&mut self, keyword: &str) -> bool {
        if self.peek_keyword().as_deref() == Some(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_any(&mut self, keywords: &[&str]) -> bool {
        keywords.iter().any(|keyword| self.eat(keyword))
    }

    fn eat_seq(&mut self, keywords: &[&str]) -> bool {
        let saved = self.pos;
        if keywords.iter().all(|keyword| self.eat(keyword)) {
            true
        } else {
            self.pos = saved;
            false
        }
    }

    fn eat_token(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn if_not_exists(&mut self) -> bool {
        self.eat_seq(&["IF", "NOT", "EXISTS"])
    }

    fn if_exists(&mut self) -> bool {
        self.eat_seq(&["IF", "EXISTS"])
    }

    fn name_part(&mut self) -> Option<NamePart> {
        match self.peek()? {
            Token::Word(word) => {
                self.pos += 1;
                Some(if word.quote_style.is_some() {
                    NamePart::quoted(word.value.clone())
                } else {
                    NamePart::bare(word.value.clone())
                })
            }
            _ => None,
        }
    }

    fn object_name(&mut self) -> Option<ObjectName> {
        let mut parts = vec![self.name_part()?];
        while self.eat_token(&Token::Period) {
            parts.push(self.name_part()?);
        }
        ObjectName::new(parts)
    }

    /// Advance past the next top-level occurrence of `keyword`.
    fn skip_to_keyword(&mut self, keyword: &str) -> bool {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                _ if depth == 0 && unquoted_keyword(token).as_deref() == Some(keyword) => {
                    self.pos += 1;
                    return true;
                }
                _ => {}
            }
            self.pos += 1;
        }
        false
    }

    /// Consume a parenthesized list, returning its comma-separated items.
    fn paren_group(&mut self) -> Option<Vec<&'a [Token]>> {
        if !self.eat_token(&Token::LParen) {
            return None;
        }
        let mut items = Vec::new();
        let mut depth = 0usize;
        let mut start = self.pos;
        while let Some(token) = self.peek() {
            match token {
                Token::LParen | Token::LBracket => depth += 1,
                Token::RBracket => depth = depth.saturating_sub(1),
                Token::RParen if depth == 0 => {
                    if start < self.pos {
                        items.push(&self.tokens[start..self.pos]);
                    }
                    self.pos += 1;
                    return Some(items);
                }
                Token::RParen => depth -= 1,
                Token::Comma if depth == 0 => {
                    items.push(&self.tokens[start..self.pos]);
                    start = self.pos + 1;
                }
                _ => {}
            }
            self.pos += 1;
        }
        None
    }
}
