use tracing::debug;

use crate::parser::classify::{classify, SqlObject};
use crate::parser::normalize::normalize_dump;
use crate::parser::splitter::{split_statements, RawStatement};

/// A classified statement together with its surrounding comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 1-based line in the normalized input.
    pub line: usize,
    /// Comment lines preceding the statement.
    pub leading: Vec<String>,
    /// Statement text without the terminating `;`.
    pub body: String,
    /// What the statement does.
    pub object: SqlObject,
    /// Narrative lines commented out in front of this statement.
    pub stray_lines: usize,
    /// `false` when the tokenizer rejected the body and `object` is a fallback.
    pub classified: bool,
}

impl Statement {
    /// Classify a raw statement.
    pub fn from_raw(raw: RawStatement) -> Self {
        let (object, classified) = if raw.body.is_empty() {
            (SqlObject::Other { keyword: None }, true)
        } else {
            match classify(&raw.body) {
                Some(object) => (object, true),
                None => {
                    debug!(line = raw.line, "tokenizer rejected statement, keeping it verbatim");
                    let keyword = raw
                        .body
                        .split_whitespace()
                        .next()
                        .map(str::to_ascii_uppercase);
                    (SqlObject::Other { keyword }, false)
                }
            }
        };
        Self {
            line: raw.line,
            leading: raw.leading,
            body: raw.body,
            object,
            stray_lines: raw.stray_lines,
            classified,
        }
    }

    /// `true` for chunks that hold only comments.
    pub fn is_comment_only(&self) -> bool {
        self.body.is_empty()
    }

    /// Statement as SQL, comments included.
    pub fn to_sql(&self) -> String {
        self.render(&self.body, true)
    }

    /// Render with `body` in place of the original text (e.g. after guarding).
    ///
    /// `body` must already carry its own terminating `;` when it consists of
    /// several statements; a single trailing `;` is always appended.
    pub fn render(&self, body: &str, with_comments: bool) -> String {
        let mut out = String::new();
        if with_comments {
            for comment in &self.leading {
                out.push_str(comment);
                out.push('\n');
            }
        }
        if body.is_empty() {
            return out.trim_end().to_string();
        }
        out.push_str(&terminate(body));
        out
    }
}

/// Append `;`, moving it to its own line when the last line holds a `--`
/// comment that would otherwise swallow it.
pub fn terminate(body: &str) -> String {
    if ends_in_line_comment(body) {
        format!("{body}\n;")
    } else {
        format!("{body};")
    }
}

/// Whether text appended to `body` would land inside a `--` comment.
///
/// Conservative: a `--` inside a string on the last line also counts.
pub fn ends_in_line_comment(body: &str) -> bool {
    body.rsplit('\n')
        .next()
        .is_some_and(|last| last.contains("--"))
}

/// Normalize, split, and classify a dump in one go.
pub fn parse_statements(sql: &str) -> Vec<Statement> {
    parse_normalized(&normalize_dump(sql))
}

/// Split and classify text that is already normalized.
pub fn parse_normalized(sql: &str) -> Vec<Statement> {
    split_statements(sql)
        .into_iter()
        .map(Statement::from_raw)
        .collect()
}
