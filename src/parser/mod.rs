/// Token-level classification of statements into schema objects.
pub mod classify;
/// Identifier and object-name helpers (schema-qualified names, quoted identifiers).
pub mod names;
/// Dump clean-up applied before splitting.
pub mod normalize;
/// Lexical splitting of SQL text into statements.
pub mod splitter;
/// Classified statements.
pub mod statement;
/// Advisory re-parse of statements with sqlparser.
pub mod verify;
