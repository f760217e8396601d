use std::fmt;

/// Schema assumed for unqualified object names.
pub const DEFAULT_SCHEMA: &str = "public";

/// Return the identifier without surrounding double quotes.
pub fn unquote_identifier(ident: &str) -> &str {
    ident
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(ident)
}

/// Normalize an identifier for case-insensitive matching.
///
/// Trims whitespace, removes surrounding double quotes on a single identifier,
/// and lowercases the result.
pub fn normalize_identifier(ident: &str) -> String {
    unquote_identifier(ident.trim()).to_ascii_lowercase()
}

/// Split a potentially schema-qualified name into `(schema, relation)`.
///
/// Handles dots inside quoted identifiers, e.g. `"my.schema"."table.name"`.
pub fn split_schema_and_relation(name: &str) -> Option<(String, String)> {
    let mut in_quotes = false;
    let mut start = 0usize;
    let mut parts: Vec<&str> = Vec::new();

    for (idx, ch) in name.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => {
                parts.push(name[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(name[start..].trim());

    if parts.len() < 2 {
        return None;
    }

    let schema = unquote_identifier(parts[parts.len() - 2]).to_string();
    let relation = unquote_identifier(parts[parts.len() - 1]).to_string();
    Some((schema, relation))
}

/// Normalize an object name to its terminal relation/function identifier.
///
/// Examples:
/// - `"public.docs"` -> `"docs"`
/// - `"\"auth\".\"users\""` -> `"users"`
/// - `"PAYMENTS"` -> `"payments"`
pub fn normalize_relation_name(name: &str) -> String {
    if let Some((_, relation)) = split_schema_and_relation(name.trim()) {
        return normalize_identifier(&relation);
    }
    normalize_identifier(name)
}

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// One dot-separated component of an [`ObjectName`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamePart {
    /// Identifier text without quotes.
    pub value: String,
    /// Whether the identifier was written double-quoted.
    pub quoted: bool,
}

impl NamePart {
    /// An unquoted identifier.
    pub fn bare(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            quoted: false,
        }
    }

    /// A double-quoted identifier.
    pub fn quoted(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            quoted: true,
        }
    }

    /// Case-folded form: quoted identifiers keep their case.
    pub fn folded(&self) -> String {
        if self.quoted {
            self.value.clone()
        } else {
            self.value.to_ascii_lowercase()
        }
    }

    fn to_sql(&self) -> String {
        if self.quoted {
            quote_identifier(&self.value)
        } else {
            self.value.clone()
        }
    }
}

/// A possibly schema-qualified SQL object name, quoting preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectName {
    qualifiers: Vec<NamePart>,
    terminal: NamePart,
}

impl ObjectName {
    /// Build a name from its components, outermost (schema) first.
    /// Returns `None` for an empty list.
    pub fn new(mut parts: Vec<NamePart>) -> Option<Self> {
        let terminal = parts.pop()?;
        Some(Self {
            qualifiers: parts,
            terminal,
        })
    }

    /// Name components, outermost (schema) first.
    pub fn parts(&self) -> impl Iterator<Item = &NamePart> {
        self.qualifiers.iter().chain(std::iter::once(&self.terminal))
    }

    /// Parse a name written the way it appears in SQL (`public."My Table"`).
    pub fn parse(text: &str) -> Self {
        let mut parts = Vec::new();
        let mut in_quotes = false;
        let mut start = 0usize;
        for (idx, ch) in text.char_indices() {
            match ch {
                '"' => in_quotes = !in_quotes,
                '.' if !in_quotes => {
                    parts.push(Self::parse_part(&text[start..idx]));
                    start = idx + 1;
                }
                _ => {}
            }
        }
        Self {
            qualifiers: parts,
            terminal: Self::parse_part(&text[start..]),
        }
    }

    fn parse_part(raw: &str) -> NamePart {
        let raw = raw.trim();
        if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
            NamePart::quoted(raw[1..raw.len() - 1].replace("\"\"", "\""))
        } else {
            NamePart::bare(raw)
        }
    }

    /// Terminal component (relation, function, or policy name).
    pub fn terminal(&self) -> &NamePart {
        &self.terminal
    }

    /// Terminal component, case-folded.
    pub fn relation(&self) -> String {
        self.terminal().folded()
    }

    /// Explicit schema, case-folded, when the name is qualified.
    pub fn schema(&self) -> Option<String> {
        self.qualifiers.last().map(NamePart::folded)
    }

    /// Re-emit the name as a valid SQL reference.
    pub fn to_sql(&self) -> String {
        self.parts()
            .map(NamePart::to_sql)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Identity used for deduplication: case-folded and `public`-qualified.
    pub fn key(&self) -> String {
        self.key_in_schema(DEFAULT_SCHEMA)
    }

    /// Like [`ObjectName::key`] but qualifying unqualified names with `schema`.
    pub fn key_in_schema(&self, schema: &str) -> String {
        let schema = self.schema().unwrap_or_else(|| schema.to_string());
        format!("{schema}.{}", self.relation())
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}
