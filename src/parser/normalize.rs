use std::sync::LazyLock;

use regex::Regex;

static EXTRACTION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[\w.-]+\.sql:\d+:").expect("extraction prefix regex is valid")
});

/// Clean up a raw migration dump before splitting it into statements.
///
/// - removes every U+FEFF byte-order mark (concatenated files leave them mid-text)
/// - converts CRLF and lone CR line endings to LF
/// - strips `name.sql:123:` prefixes left behind by `grep -n` style extraction
pub fn normalize_dump(text: &str) -> String {
    let without_bom = text.replace('\u{feff}', "");
    let unix = without_bom.replace("\r\n", "\n").replace('\r', "\n");
    EXTRACTION_PREFIX.replace_all(&unix, "").into_owned()
}
