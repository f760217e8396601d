use serde::Serialize;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::parser::statement::Statement;

/// A statement that the SQL parser rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseIssue {
    /// 1-based line where the statement starts.
    pub line: usize,
    /// Leading keyword(s) of the statement.
    pub summary: String,
    /// Parser error message.
    pub message: String,
}

/// Re-parse each statement with sqlparser's PostgreSQL dialect.
///
/// Advisory only: sqlparser does not cover the whole PostgreSQL grammar, so
/// an issue means "look at this", not "this will fail".
pub fn verify_statements(statements: &[Statement]) -> Vec<ParseIssue> {
    let dialect = PostgreSqlDialect {};
    statements
        .iter()
        .filter(|statement| !statement.is_comment_only())
        .filter_map(|statement| {
            Parser::parse_sql(&dialect, &statement.body)
                .err()
                .map(|error| ParseIssue {
                    line: statement.line,
                    summary: summarize(&statement.body),
                    message: error.to_string(),
                })
        })
        .collect()
}

fn summarize(body: &str) -> String {
    let words: Vec<&str> = body.split_whitespace().take(4).collect();
    words.join(" ")
}
