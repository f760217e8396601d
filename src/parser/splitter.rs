/// Keywords that may open a top-level PostgreSQL statement.
///
/// A line at a statement boundary that starts with anything else (and is not a
/// comment or an opening parenthesis) is treated as stray narrative text.
pub const COMMAND_KEYWORDS: &[&str] = &[
    "ABORT", "ALTER", "ANALYZE", "BEGIN", "CALL", "CHECKPOINT", "CLOSE", "CLUSTER", "COMMENT",
    "COMMIT", "COPY", "CREATE", "DEALLOCATE", "DELETE", "DISCARD", "DO", "DROP", "END", "EXECUTE",
    "EXPLAIN", "FETCH", "GRANT", "IMPORT", "INSERT", "LISTEN", "LOCK", "MERGE", "MOVE", "NOTIFY",
    "PREPARE", "REASSIGN", "REFRESH", "REINDEX", "RELEASE", "RESET", "REVOKE", "ROLLBACK",
    "SAVEPOINT", "SECURITY", "SELECT", "SET", "SHOW", "START", "TABLE", "TRUNCATE", "UNLISTEN",
    "UPDATE", "VACUUM", "VALUES", "WITH",
];

/// One `;`-terminated chunk of a dump, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    /// 1-based line of the first body character (or of the trailing comments).
    pub line: usize,
    /// Comment lines preceding the body, stray narrative lines included.
    pub leading: Vec<String>,
    /// Statement text without the terminating `;`. Empty for comment-only tails.
    pub body: String,
    /// How many narrative lines were turned into `-- [stray]` comments.
    pub stray_lines: usize,
}

/// Prefix used when a narrative line is commented out.
pub const STRAY_PREFIX: &str = "-- [stray] ";

/// Split SQL text into statements at top-level semicolons.
///
/// Quoted strings (including `E''` escapes), quoted identifiers, dollar-quoted
/// bodies, and comments never terminate a statement.
pub fn split_statements(sql: &str) -> Vec<RawStatement> {
    let mut scanner = Scanner {
        src: sql,
        pos: 0,
        line: 1,
    };
    std::iter::from_fn(|| scanner.next_statement()).collect()
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl Scanner<'_> {
    fn len(&self) -> usize {
        self.src.len()
    }

    fn advance_to(&mut self, new_pos: usize) {
        let new_pos = new_pos.min(self.len());
        self.line += self.src.as_bytes()[self.pos..new_pos]
            .iter()
            .filter(|b| **b == b'\n')
            .count();
        self.pos = new_pos;
    }

    fn skip_line(&mut self, eol: usize) {
        self.advance_to(eol + 1);
    }

    fn next_statement(&mut self) -> Option<RawStatement> {
        let mut leading = Vec::new();
        let mut stray_lines = 0;

        loop {
            if self.pos >= self.len() {
                if leading.is_empty() {
                    return None;
                }
                return Some(RawStatement {
                    line: self.line,
                    leading,
                    body: String::new(),
                    stray_lines,
                });
            }

            let eol = line_end(self.src.as_bytes(), self.pos);
            let line = &self.src[self.pos..eol];
            let trimmed = line.trim_start();
            let indent = line.len() - trimmed.len();

            if trimmed.trim_end().is_empty() {
                self.skip_line(eol);
                continue;
            }
            if trimmed.starts_with("--") {
                leading.push(trimmed.trim_end().to_string());
                self.skip_line(eol);
                continue;
            }
            if trimmed.starts_with("/*") {
                let start = self.pos + indent;
                let end = block_comment_end(self.src.as_bytes(), start);
                leading.push(self.src[start..end].to_string());
                self.advance_to(end);
                let eol = line_end(self.src.as_bytes(), self.pos);
                if self.src[self.pos..eol].trim().is_empty() {
                    self.skip_line(eol);
                }
                continue;
            }
            if trimmed.starts_with(';') {
                self.advance_to(self.pos + indent + 1);
                continue;
            }
            if starts_with_command(trimmed) {
                let start = self.pos + indent;
                self.advance_to(start);
                let line = self.line;
                let end = find_statement_end(self.src, start);
                let body = self.src[start..end].trim_end().to_string();
                self.advance_to(end + 1);
                return Some(RawStatement {
                    line,
                    leading,
                    body,
                    stray_lines,
                });
            }

            leading.push(format!("{STRAY_PREFIX}{}", trimmed.trim_end()));
            stray_lines += 1;
            self.skip_line(eol);
        }
    }
}

/// True when `text` opens with a statement keyword or a parenthesis.
pub fn starts_with_command(text: &str) -> bool {
    let text = text.trim_start();
    if text.starts_with('(') {
        return true;
    }
    let word_len = text
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    if word_len == 0 {
        return false;
    }
    if text
        .as_bytes()
        .get(word_len)
        .is_some_and(|b| is_ident_byte(*b))
    {
        return false;
    }
    let word = text[..word_len].to_ascii_uppercase();
    COMMAND_KEYWORDS.contains(&word.as_str())
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |offset| from + offset)
}

/// Index just past the `*/` closing the (possibly nested) comment at `open`.
fn block_comment_end(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth = depth.saturating_sub(1);
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Index just past the quote closing the literal opened at `open`.
fn quoted_end(bytes: &[u8], open: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// If a dollar-quote tag (`$$` or `$name$`) starts at `i`, return the index past it.
fn dollar_tag_end(bytes: &[u8], i: usize) -> Option<usize> {
    let mut j = i + 1;
    match bytes.get(j) {
        Some(b'$') => return Some(j + 1),
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return None,
    }
    while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
        j += 1;
    }
    (bytes.get(j) == Some(&b'$')).then_some(j + 1)
}

/// Index of the `;` ending the statement starting at `start`, or the text length.
fn find_statement_end(src: &str, start: usize) -> usize {
    let bytes = src.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b';' => return i,
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = line_end(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = block_comment_end(bytes, i),
            b'\'' => {
                let escapes = i > 0
                    && matches!(bytes[i - 1], b'E' | b'e')
                    && (i < 2 || !is_ident_byte(bytes[i - 2]));
                i = quoted_end(bytes, i, b'\'', escapes);
            }
            b'"' => i = quoted_end(bytes, i, b'"', false),
            b'$' if i == 0 || !is_ident_byte(bytes[i - 1]) => match dollar_tag_end(bytes, i) {
                Some(tag_end) => {
                    let tag = &src[i..tag_end];
                    i = src[tag_end..]
                        .find(tag)
                        .map_or(bytes.len(), |offset| tag_end + offset + tag.len());
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bodies(sql: &str) -> Vec<String> {
        split_statements(sql).into_iter().map(|s| s.body).collect()
    }

    #[test]
    fn splits_on_top_level_semicolons() {
        assert_eq!(
            bodies("CREATE TABLE a (id int);\nCREATE TABLE b (id int);"),
            vec!["CREATE TABLE a (id int)", "CREATE TABLE b (id int)"]
        );
    }

    #[test]
    fn semicolons_inside_dollar_bodies_do_not_split() {
        let sql = "CREATE FUNCTION f() RETURNS void AS $body$\nBEGIN\n  PERFORM 1;\nEND;\n$body$ LANGUAGE plpgsql;\nSELECT 1;";
        let parts = bodies(sql);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with("LANGUAGE plpgsql"));
        assert_eq!(parts[1], "SELECT 1");
    }

    #[test]
    fn positional_parameters_are_not_dollar_tags() {
        let parts = bodies("SELECT $1, 'a;b';\nSELECT 2;");
        assert_eq!(parts, vec!["SELECT $1, 'a;b'", "SELECT 2"]);
    }

    #[test]
    fn escaped_and_doubled_quotes_stay_inside_literals() {
        let parts = bodies("SELECT E'it\\'s;', 'don''t;';\nSELECT \"we;ird\";");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], "SELECT \"we;ird\"");
    }

    #[test]
    fn comments_attach_to_the_following_statement() {
        let stmts = split_statements("-- users\n/* multi\nline */\nCREATE TABLE u (id int); -- trailing\n");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].leading, vec!["-- users", "/* multi\nline */"]);
        assert_eq!(stmts[0].line, 4);
        assert_eq!(stmts[1].body, "");
        assert_eq!(stmts[1].leading, vec!["-- trailing"]);
    }

    #[test]
    fn nested_block_comments_close_at_the_matching_end() {
        let stmts = split_statements("/* outer /* inner; */ still; */\nCREATE TABLE a (id int);");
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].leading, vec!["/* outer /* inner; */ still; */"]);
        assert_eq!(stmts[0].body, "CREATE TABLE a (id int)");

        assert_eq!(
            bodies("SELECT 1 /* a /* b; */ c; */ + 1;\nSELECT 2;"),
            vec!["SELECT 1 /* a /* b; */ c; */ + 1", "SELECT 2"]
        );
    }

    #[test]
    fn narrative_lines_become_stray_comments() {
        let sql = "Migration: don't forget the payments table\nCREATE TABLE p (id int);";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].stray_lines, 1);
        assert_eq!(
            stmts[0].leading,
            vec!["-- [stray] Migration: don't forget the payments table"]
        );
        assert_eq!(stmts[0].body, "CREATE TABLE p (id int)");
    }

    #[test]
    fn unterminated_tail_is_kept() {
        assert_eq!(bodies("SELECT 1;\nSELECT 2"), vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn command_detection_requires_a_whole_keyword() {
        assert!(starts_with_command("  create table x"));
        assert!(starts_with_command("(SELECT 1)"));
        assert!(!starts_with_command("created_at timestamptz"));
        assert!(!starts_with_command("Function for triggers"));
    }
}
